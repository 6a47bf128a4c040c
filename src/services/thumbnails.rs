use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use strum::{Display, EnumString};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::{media_asset, thumbnail};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Size buckets thumbnails are generated at. Requests snap to the nearest
/// bucket, ties snapping down.
pub const THUMBNAIL_SIZES: [i32; 8] = [32, 64, 128, 256, 512, 1024, 2048, 4096];

/// Object types that may carry thumbnails. Anything else 404s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ThumbnailOwnerType {
    User,
    Category,
    Collection,
    ProductMedia,
    App,
}

/// Snaps a requested pixel size to the nearest allowed bucket. Callers
/// reject non-positive sizes before snapping.
pub fn get_thumbnail_size(requested: i32) -> i32 {
    let mut best = THUMBNAIL_SIZES[0];
    let mut best_distance = (requested - best).abs();
    for &size in &THUMBNAIL_SIZES[1..] {
        let distance = (requested - size).abs();
        if distance < best_distance {
            best = size;
            best_distance = distance;
        }
    }
    best
}

/// Output formats a thumbnail may be requested in, besides keeping the
/// source format.
pub fn is_supported_format(format: &str) -> bool {
    matches!(format, "avif" | "webp")
}

fn content_type_for(path: &str) -> &'static str {
    match path.rsplit('.').next() {
        Some("avif") => "image/avif",
        Some("webp") => "image/webp",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}

/// Produces the stored thumbnail file for a source image. The default
/// implementation only derives storage paths; object storage backends
/// plug in here.
#[async_trait]
pub trait ThumbnailRenderer: Send + Sync {
    async fn render(
        &self,
        source_path: &str,
        size: i32,
        format: Option<&str>,
    ) -> Result<String, ServiceError>;
}

/// Derives `<stem>_thumbnail_<size>.<ext>` next to the source image.
#[derive(Debug, Clone, Default)]
pub struct StorageRenderer;

#[async_trait]
impl ThumbnailRenderer for StorageRenderer {
    async fn render(
        &self,
        source_path: &str,
        size: i32,
        format: Option<&str>,
    ) -> Result<String, ServiceError> {
        let (stem, source_ext) = match source_path.rsplit_once('.') {
            Some((stem, ext)) => (stem, ext),
            None => (source_path, "jpg"),
        };
        let ext = format.unwrap_or(source_ext);
        Ok(format!("{}_thumbnail_{}.{}", stem, size, ext))
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ResolvedThumbnail {
    pub url: String,
    pub content_type: String,
    /// Size bucket the request snapped to.
    pub size: i32,
}

/// Resolves thumbnail URLs, generating and caching on first request.
#[derive(Clone)]
pub struct ThumbnailService {
    db: Arc<DbPool>,
    renderer: Arc<dyn ThumbnailRenderer>,
    media_base_url: String,
    event_sender: Option<Arc<EventSender>>,
}

impl ThumbnailService {
    pub fn new(
        db: Arc<DbPool>,
        renderer: Arc<dyn ThumbnailRenderer>,
        media_base_url: String,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db,
            renderer,
            media_base_url,
            event_sender,
        }
    }

    /// Returns the URL a thumbnail request should redirect to.
    ///
    /// Unknown owner types, unknown owners, missing source images and
    /// unsupported formats all surface as not-found, never as server
    /// errors.
    #[instrument(skip(self))]
    pub async fn resolve(
        &self,
        owner_type: &str,
        owner_id: Uuid,
        requested_size: i32,
        format: Option<&str>,
    ) -> Result<ResolvedThumbnail, ServiceError> {
        let owner_type = ThumbnailOwnerType::from_str(owner_type)
            .map_err(|_| ServiceError::NotFound("Thumbnail".to_string()))?;
        if requested_size <= 0 {
            return Err(ServiceError::NotFound("Thumbnail".to_string()));
        }
        if let Some(fmt) = format {
            if !is_supported_format(fmt) {
                return Err(ServiceError::NotFound("Thumbnail".to_string()));
            }
        }
        let size = get_thumbnail_size(requested_size);
        let format_key = format.unwrap_or_default().to_string();

        let cached = thumbnail::Entity::find()
            .filter(thumbnail::Column::OwnerType.eq(owner_type.to_string()))
            .filter(thumbnail::Column::OwnerId.eq(owner_id))
            .filter(thumbnail::Column::Size.eq(size))
            .filter(thumbnail::Column::Format.eq(format_key.clone()))
            .one(self.db.as_ref())
            .await?;
        if let Some(cached) = cached {
            return Ok(self.resolved(cached.image_path, size));
        }

        let asset = media_asset::Entity::find()
            .filter(media_asset::Column::OwnerType.eq(owner_type.to_string()))
            .filter(media_asset::Column::OwnerId.eq(owner_id))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound("Thumbnail".to_string()))?;

        let image_path = self
            .renderer
            .render(&asset.image_path, size, format)
            .await?;

        let created = thumbnail::ActiveModel {
            id: Set(Uuid::new_v4()),
            owner_type: Set(owner_type.to_string()),
            owner_id: Set(owner_id),
            size: Set(size),
            format: Set(format_key),
            image_path: Set(image_path.clone()),
            created_at: Set(Utc::now()),
        }
        .insert(self.db.as_ref())
        .await?;

        info!(thumbnail_id = %created.id, size, "thumbnail generated");
        if let Some(sender) = &self.event_sender {
            let _ = sender
                .send(Event::ThumbnailCreated {
                    thumbnail_id: created.id,
                })
                .await;
        }
        Ok(self.resolved(image_path, size))
    }

    fn resolved(&self, image_path: String, size: i32) -> ResolvedThumbnail {
        let content_type = content_type_for(&image_path).to_string();
        let url = format!(
            "{}/{}",
            self.media_base_url.trim_end_matches('/'),
            image_path.trim_start_matches('/')
        );
        ResolvedThumbnail {
            url,
            content_type,
            size,
        }
    }
}
