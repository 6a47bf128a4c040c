use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::AppState;

/// Redirects to the cached or freshly generated thumbnail. Not wrapped in
/// the JSON envelope: clients embed these URLs directly in image tags.
#[utoipa::path(
    get,
    path = "/api/v1/thumbnail/{owner_type}/{owner_id}/{size}",
    params(
        ("owner_type" = String, Path, description = "Object type the thumbnail belongs to"),
        ("owner_id" = Uuid, Path, description = "Owner id"),
        ("size" = String, Path, description = "Requested size in pixels")
    ),
    responses(
        (status = 301, description = "Redirect to the thumbnail image"),
        (status = 404, description = "Unknown owner, type, size or format")
    ),
    tag = "thumbnails"
)]
pub async fn resolve_thumbnail(
    State(state): State<AppState>,
    Path((owner_type, owner_id, size)): Path<(String, Uuid, String)>,
) -> Result<Response, ServiceError> {
    let size = parse_size(&size)?;
    redirect(&state, &owner_type, owner_id, size, None).await
}

#[utoipa::path(
    get,
    path = "/api/v1/thumbnail/{owner_type}/{owner_id}/{size}/{format}",
    params(
        ("owner_type" = String, Path, description = "Object type the thumbnail belongs to"),
        ("owner_id" = Uuid, Path, description = "Owner id"),
        ("size" = String, Path, description = "Requested size in pixels"),
        ("format" = String, Path, description = "avif or webp")
    ),
    responses(
        (status = 301, description = "Redirect to the thumbnail image"),
        (status = 404, description = "Unknown owner, type, size or format")
    ),
    tag = "thumbnails"
)]
pub async fn resolve_thumbnail_with_format(
    State(state): State<AppState>,
    Path((owner_type, owner_id, size, format)): Path<(String, Uuid, String, String)>,
) -> Result<Response, ServiceError> {
    let size = parse_size(&size)?;
    let format = format.to_lowercase();
    redirect(&state, &owner_type, owner_id, size, Some(&format)).await
}

/// A size segment that is not a number is a 404, not a bad request.
fn parse_size(raw: &str) -> Result<i32, ServiceError> {
    raw.parse::<i32>()
        .map_err(|_| ServiceError::NotFound("Thumbnail".to_string()))
}

async fn redirect(
    state: &AppState,
    owner_type: &str,
    owner_id: Uuid,
    size: i32,
    format: Option<&str>,
) -> Result<Response, ServiceError> {
    let resolved = state
        .thumbnail_service
        .resolve(owner_type, owner_id, size, format)
        .await?;
    Ok((
        StatusCode::MOVED_PERMANENTLY,
        [
            (header::LOCATION, resolved.url),
            (header::CONTENT_TYPE, resolved.content_type),
        ],
    )
        .into_response())
}
