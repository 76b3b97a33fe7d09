use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{ItemStatus, Order, OrderStatus, OrderType, PaymentMethod};

/// Who is acting on an order, as resolved by the auth layer.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: String,
}

impl Actor {
    pub fn label(&self) -> String {
        format!("{}:{}", self.role, self.user_id)
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct OrderLineRequest {
    pub food_id: Uuid,
    pub quantity: i32,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub restaurant_id: Uuid,
    pub order_type: OrderType,
    pub table_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub customer_name: Option<String>,
    pub waiter_id: Option<Uuid>,
    pub items: Vec<OrderLineRequest>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AppendItemsRequest {
    pub items: Vec<OrderLineRequest>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateItemStatusRequest {
    pub status: ItemStatus,
    pub deletion_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    pub cancellation_reason: Option<String>,
    pub payment_method: Option<PaymentMethod>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SelectPaymentMethodRequest {
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentSelection {
    pub order: Order,
    /// Present for online payments: handed to the client SDK.
    pub client_secret: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}
