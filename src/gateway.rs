//! Payment gateway port and its Stripe-compatible REST adapter.

use std::collections::HashMap;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use uuid::Uuid;

use crate::config::PaymentConfig;
use crate::error::{AppError, AppResult};

/// Webhooks older than this are treated as replays.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// The gateway captured the money for `order_id`.
    PaymentSucceeded {
        event_id: String,
        intent_id: String,
        order_id: Uuid,
        amount: i64,
    },
    /// Any event the engine does not act on.
    Ignored { event_id: String, kind: String },
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(
        &self,
        amount: i64,
        destination_account: Option<&str>,
        metadata: &HashMap<String, String>,
    ) -> AppResult<PaymentIntent>;

    /// Checks the signature header against `secret` and decodes the event.
    fn verify_and_parse_webhook(
        &self,
        raw_body: &[u8],
        signature: &str,
        secret: &str,
    ) -> AppResult<GatewayEvent>;
}

pub struct StripeGateway {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    currency: String,
}

impl StripeGateway {
    pub fn new(config: &PaymentConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            currency: config.currency.clone(),
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_intent(
        &self,
        amount: i64,
        destination_account: Option<&str>,
        metadata: &HashMap<String, String>,
    ) -> AppResult<PaymentIntent> {
        let mut form: Vec<(String, String)> = vec![
            ("amount".into(), amount.to_string()),
            ("currency".into(), self.currency.clone()),
            ("automatic_payment_methods[enabled]".into(), "true".into()),
        ];
        if let Some(account) = destination_account {
            form.push(("transfer_data[destination]".into(), account.to_string()));
        }
        for (key, value) in metadata {
            form.push((format!("metadata[{key}]"), value.clone()));
        }

        let resp: serde_json::Value = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .basic_auth(&self.api_key, None::<&str>)
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::Gateway(e.to_string()))?
            .json()
            .await
            .map_err(|e| AppError::Gateway(e.to_string()))?;

        match (resp["id"].as_str(), resp["client_secret"].as_str()) {
            (Some(id), Some(secret)) => Ok(PaymentIntent {
                id: id.to_string(),
                client_secret: secret.to_string(),
            }),
            _ => Err(AppError::Gateway(format!("create payment intent failed: {resp}"))),
        }
    }

    fn verify_and_parse_webhook(
        &self,
        raw_body: &[u8],
        signature: &str,
        secret: &str,
    ) -> AppResult<GatewayEvent> {
        verify_signature(raw_body, signature, secret, chrono::Utc::now().timestamp())?;
        parse_event(raw_body)
    }
}

/// Verifies a `t=<unix>,v1=<hex hmac-sha256>` header over `<t>.<body>`.
pub fn verify_signature(payload: &[u8], header: &str, secret: &str, now: i64) -> AppResult<()> {
    if secret.is_empty() {
        return Err(AppError::InvalidSignature);
    }
    let mut timestamp = "";
    let mut signatures = Vec::new();
    for part in header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = t;
        } else if let Some(v) = part.strip_prefix("v1=") {
            signatures.push(v);
        }
    }
    if timestamp.is_empty() || signatures.is_empty() {
        return Err(AppError::InvalidSignature);
    }

    let ts: i64 = timestamp.parse().map_err(|_| AppError::InvalidSignature)?;
    if (now - ts).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(AppError::InvalidSignature);
    }

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::InvalidSignature)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);

    // Several v1 entries appear while the secret is being rolled.
    let matched = signatures.iter().any(|candidate| {
        hex::decode(candidate)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });
    if matched {
        Ok(())
    } else {
        Err(AppError::InvalidSignature)
    }
}

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    data: RawEventData,
}

#[derive(Deserialize)]
struct RawEventData {
    object: RawIntent,
}

#[derive(Deserialize)]
struct RawIntent {
    #[serde(default)]
    id: String,
    #[serde(default)]
    amount: i64,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

pub fn parse_event(raw_body: &[u8]) -> AppResult<GatewayEvent> {
    let event: RawEvent = serde_json::from_slice(raw_body)
        .map_err(|e| AppError::BadRequest(format!("malformed webhook payload: {e}")))?;

    if event.kind != "payment_intent.succeeded" {
        return Ok(GatewayEvent::Ignored {
            event_id: event.id,
            kind: event.kind,
        });
    }

    let order_id = event
        .data
        .object
        .metadata
        .get("order_id")
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or_else(|| AppError::BadRequest("payment event carries no order_id".into()))?;

    Ok(GatewayEvent::PaymentSucceeded {
        event_id: event.id,
        intent_id: event.data.object.id,
        order_id,
        amount: event.data.object.amount,
    })
}
