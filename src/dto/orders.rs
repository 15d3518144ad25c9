use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Order, OrderItem, OrderStatus, ShippingAddress};

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct OrderLineInput {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct PlaceOrderRequest {
    pub items: Vec<OrderLineInput>,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    /// Total the client displayed at checkout, in minor units. The server
    /// recomputes pricing from the catalog and rejects the order if this
    /// disagrees with the authoritative total.
    pub expected_total: Option<i64>,
    pub notes: Option<String>,
}

/// Opaque confirmation from the (simulated) payment provider, stored
/// verbatim on the order.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct PayOrderRequest {
    pub transaction_id: String,
    pub status: String,
    pub update_time: DateTime<Utc>,
    pub payer_email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    pub tracking_number: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}
