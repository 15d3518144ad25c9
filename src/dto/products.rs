use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Product, ProductCategory};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub category: ProductCategory,
    pub size: Option<String>,
    pub image_url: Option<String>,
    pub stock: i32,
    pub discount_percent: Option<i32>,
    pub discount_expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub category: Option<ProductCategory>,
    pub size: Option<String>,
    pub image_url: Option<String>,
    pub stock: Option<i32>,
    pub discount_percent: Option<i32>,
    pub discount_expires_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, ToSchema)]
pub struct ProductList {
    pub items: Vec<Product>,
}
