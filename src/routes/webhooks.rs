use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    response::{ApiResponse, Meta},
    services::payment_service::{self, ReconcileOutcome},
    state::AppState,
};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    /// `applied`, `already_paid` or `ignored`.
    pub outcome: String,
    pub order_id: Option<Uuid>,
    pub event_type: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/payment", post(payment_webhook))
}

#[utoipa::path(
    post,
    path = "/webhooks/payment",
    request_body(content = String, description = "Raw gateway event body", content_type = "application/json"),
    params(
        ("stripe-signature" = String, Header, description = "t=<unix>,v1=<hex hmac-sha256>")
    ),
    responses(
        (status = 200, description = "Event accepted", body = ApiResponse<WebhookAck>),
        (status = 400, description = "Bad signature or malformed event"),
        (status = 409, description = "Order cannot be paid"),
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<ApiResponse<WebhookAck>>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::InvalidSignature)?;

    let ack = match payment_service::reconcile_payment(&state, &body, signature).await? {
        ReconcileOutcome::Applied(order) => WebhookAck {
            outcome: "applied".into(),
            order_id: Some(order.id),
            event_type: None,
        },
        ReconcileOutcome::AlreadyPaid(order_id) => WebhookAck {
            outcome: "already_paid".into(),
            order_id: Some(order_id),
            event_type: None,
        },
        ReconcileOutcome::Ignored { kind, .. } => WebhookAck {
            outcome: "ignored".into(),
            order_id: None,
            event_type: Some(kind),
        },
    };

    Ok(Json(ApiResponse::success("Webhook processed", ack, Some(Meta::empty()))))
}
