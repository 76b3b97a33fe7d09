//! JSON envelope shared by every handler and by `AppError` responses.

use serde::Serialize;
use utoipa::ToSchema;

/// Paging information for list payloads; empty for single objects.
#[derive(Debug, Serialize, ToSchema, Clone, Default)]
pub struct Meta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
}

impl Meta {
    pub fn new(page: i64, per_page: i64, total: i64) -> Self {
        Self {
            page: Some(page),
            per_page: Some(per_page),
            total: Some(total),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub message: String,
    pub data: Option<T>,
    pub meta: Option<Meta>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T, meta: Option<Meta>) -> Self {
        Self {
            message: message.into(),
            data: Some(data),
            meta,
        }
    }

    /// Failure envelope: `data` carries the machine-readable details.
    pub fn failure(message: impl Into<String>, details: T) -> Self {
        Self {
            message: message.into(),
            data: Some(details),
            meta: Some(Meta::empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_meta_serializes_without_fields() {
        let body = ApiResponse::success("Ok", 1, Some(Meta::empty()));
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["meta"], serde_json::json!({}));

        let paged = serde_json::to_value(Meta::new(2, 20, 41)).unwrap();
        assert_eq!(paged, serde_json::json!({ "page": 2, "per_page": 20, "total": 41 }));
    }
}
