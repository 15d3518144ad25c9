use chrono::{DateTime, Utc};
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::services::pricing;

/// Product category. Bottled water needs a declared size; dispensers and
/// accessories do not.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum ProductCategory {
    #[sea_orm(string_value = "bottle")]
    Bottle,
    #[sea_orm(string_value = "gallon")]
    Gallon,
    #[sea_orm(string_value = "dispenser")]
    Dispenser,
    #[sea_orm(string_value = "accessory")]
    Accessory,
}

impl ProductCategory {
    pub fn requires_size(self) -> bool {
        matches!(self, ProductCategory::Bottle | ProductCategory::Gallon)
    }
}

/// Fulfillment state of an order. Transitions go through
/// [`OrderStatus::can_transition_to`]; nothing else may rewrite the status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl OrderStatus {
    /// Legal moves: pending -> processing -> shipped -> delivered, and any
    /// not-yet-delivered order may be cancelled. Delivered and cancelled are
    /// terminal; self-transitions are rejected.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Pending, Processing) | (Processing, Shipped) | (Shipped, Delivered) => true,
            (Pending | Processing | Shipped, Cancelled) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Admin view of a user with order statistics aggregated on demand.
#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
pub struct UserWithStats {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub total_orders: i64,
    pub total_spent: i64,
    pub average_order_value: i64,
    pub last_order_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub category: ProductCategory,
    pub size: Option<String>,
    pub image_url: Option<String>,
    pub stock: i32,
    pub is_active: bool,
    pub discount_percent: i32,
    pub discount_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Unit price with any unexpired discount applied, in minor units.
    pub fn effective_price(&self, now: DateTime<Utc>) -> i64 {
        pricing::discounted_unit_price(self.price, self.discount_percent, self.discount_expires_at, now)
    }
}

/// Shipping address captured verbatim on the order at placement time.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ShippingAddress {
    pub full_name: String,
    pub line1: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub items_price: i64,
    pub tax_price: i64,
    pub shipping_price: i64,
    pub total_price: i64,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_result: Option<serde_json::Value>,
    pub is_delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One line of an order with the product name and unit price snapshotted at
/// placement time, so later catalog edits never rewrite history.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub price: i64,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}
