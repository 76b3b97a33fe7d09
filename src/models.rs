//! Domain types shared by the services: status enums and the order, session,
//! table and menu views handed to callers, caches and notifications.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(AppError::Internal(anyhow::anyhow!(
                        "unknown {} value {other:?}",
                        stringify!($name)
                    ))),
                }
            }
        }
    };
}

string_enum!(
    OrderType {
        DineIn => "dine_in",
        Togo => "togo",
    }
);

string_enum!(
    /// Persisted order status. `Paid` and `Cancelled` are terminal.
    OrderStatus {
        Open => "open",
        AwaitingPayment => "awaiting_payment",
        Paid => "paid",
        Cancelled => "cancelled",
    }
);

string_enum!(
    /// Persisted per-item status.
    ItemStatus {
        AwaitingPayment => "awaiting_payment",
        Pending => "pending",
        Preparing => "preparing",
        Ready => "ready",
        Delivered => "delivered",
        Cancelled => "cancelled",
    }
);

string_enum!(
    /// Derived kitchen-display status, never stored.
    KitchenStatus {
        Pending => "pending",
        Preparing => "preparing",
        Ready => "ready",
        Delivered => "delivered",
    }
);

string_enum!(
    SessionStatus {
        Active => "active",
        Closed => "closed",
    }
);

string_enum!(
    TableState {
        Available => "available",
        Occupied => "occupied",
        Reserved => "reserved",
    }
);

string_enum!(
    PaymentMethod {
        Cash => "cash",
        Card => "card",
        Online => "online",
    }
);

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Cancelled)
    }
}

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Delivered | ItemStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OrderPricing {
    pub subtotal: i64,
    pub tax: i64,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub food_id: Uuid,
    pub name: String,
    pub price: i64,
    pub quantity: i32,
    pub status: ItemStatus,
    pub deletion_reason: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub order_token: String,
    pub table_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub customer_name: Option<String>,
    pub waiter_id: Option<Uuid>,
    pub pricing: OrderPricing,
    pub is_paid: bool,
    pub payment_method: Option<PaymentMethod>,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

/// An order as pushed to kitchen screens and notification subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct KitchenOrder {
    #[serde(flatten)]
    pub order: Order,
    pub kitchen_status: KitchenStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TableSession {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub table_id: Uuid,
    pub status: SessionStatus,
    pub order_ids: Vec<Uuid>,
    pub total_amount: i64,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Table {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub label: String,
    pub state: TableState,
    pub waiter_serving: Option<Uuid>,
    pub active_session_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MenuItem {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub price: i64,
    pub stock: i32,
    pub is_available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Restaurant {
    pub id: Uuid,
    pub name: String,
    pub payment_account: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_round_trip_through_storage_form() {
        for status in [
            ItemStatus::AwaitingPayment,
            ItemStatus::Pending,
            ItemStatus::Preparing,
            ItemStatus::Ready,
            ItemStatus::Delivered,
            ItemStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<ItemStatus>().unwrap(), status);
        }
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn serde_uses_storage_names() {
        let json = serde_json::to_string(&OrderStatus::AwaitingPayment).unwrap();
        assert_eq!(json, "\"awaiting_payment\"");
        let json = serde_json::to_string(&OrderType::DineIn).unwrap();
        assert_eq!(json, "\"dine_in\"");
    }

    #[test]
    fn terminal_states() {
        assert!(OrderStatus::Paid.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::AwaitingPayment.is_terminal());
        assert!(ItemStatus::Delivered.is_terminal());
        assert!(!ItemStatus::Ready.is_terminal());
    }
}
