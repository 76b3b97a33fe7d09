use utoipa::OpenApi;
use utoipa::openapi::OpenApi as OpenApiSpec;
use utoipa_scalar::{Scalar, Servable};

use crate::{
    models::{
        ItemStatus, KitchenOrder, KitchenStatus, Order, OrderItem, OrderPricing, OrderStatus,
        OrderType, PaymentMethod,
    },
    response::{ApiResponse, Meta},
    routes::{health, webhooks},
};

#[derive(OpenApi)]
#[openapi(
    paths(health::health_check, webhooks::payment_webhook),
    components(
        schemas(
            Order,
            OrderItem,
            OrderPricing,
            OrderStatus,
            OrderType,
            ItemStatus,
            KitchenOrder,
            KitchenStatus,
            PaymentMethod,
            health::HealthData,
            webhooks::WebhookAck,
            Meta,
            ApiResponse<health::HealthData>,
            ApiResponse<webhooks::WebhookAck>
        )
    ),
    tags(
        (name = "Health", description = "Liveness and database status"),
        (name = "Payments", description = "Payment gateway callbacks"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
