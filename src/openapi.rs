use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "0.1.0",
        description = r#"
Order pricing, payment orchestration and thumbnail resolution for a
storefront backend.

- **Orders**: draft orders with voucher and manual discounts, repriced on
  every change
- **Payments**: legacy gateway operations (authorize, capture, refund,
  void, confirm) against registered payment extensions
- **Transactions**: initialize/process payment sessions with idempotency
  keys and an append-only event log
- **Thumbnails**: size-bucketed, cached thumbnail redirects
"#
    ),
    paths(
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::add_order_line,
        crate::handlers::orders::attach_voucher,
        crate::handlers::orders::add_manual_discount,
        crate::handlers::orders::update_discount,
        crate::handlers::orders::remove_discount,
        crate::handlers::orders::recalculate_order,
        crate::handlers::payments::create_payment,
        crate::handlers::payments::get_payment,
        crate::handlers::payments::list_transactions,
        crate::handlers::payments::process,
        crate::handlers::payments::authorize,
        crate::handlers::payments::capture,
        crate::handlers::payments::refund,
        crate::handlers::payments::void,
        crate::handlers::payments::confirm,
        crate::handlers::transactions::initialize,
        crate::handlers::transactions::process,
        crate::handlers::transactions::get_transaction,
        crate::handlers::transactions::request_charge,
        crate::handlers::transactions::request_refund,
        crate::handlers::transactions::request_cancel,
        crate::handlers::thumbnails::resolve_thumbnail,
        crate::handlers::thumbnails::resolve_thumbnail_with_format,
    ),
    components(schemas(
        crate::services::orders::CreateOrderRequest,
        crate::services::orders::CreateOrderLineRequest,
        crate::services::orders::AttachVoucherRequest,
        crate::services::orders::ManualDiscountRequest,
        crate::handlers::payments::CreatePaymentRequest,
        crate::handlers::payments::TokenRequest,
        crate::handlers::payments::AmountRequest,
        crate::services::transactions::TransactionInitializeRequest,
        crate::services::transactions::TransactionProcessRequest,
        crate::services::transactions::TransactionActionRequest,
        crate::errors::ErrorResponse,
    ))
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_generates() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Storefront API"));
        assert!(json.contains("/api/v1/orders"));
        assert!(json.contains("/api/v1/transactions/initialize"));
    }
}
