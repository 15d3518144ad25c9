use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{delete, get, put},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::AppResult,
    middleware::auth::AuthUser,
    models::{Order, UserWithStats},
    response::ApiResponse,
    routes::params::Pagination,
    services::admin_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/analytics", get(analytics))
        .route("/users", get(list_users))
        .route("/users/{id}/status", put(set_user_status))
        .route("/users/{id}", delete(delete_user))
        .route("/products/bulk-stock", put(bulk_update_stock))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateUserStatusRequest {
    pub is_active: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkStockEntry {
    pub product_id: Uuid,
    pub stock: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkStockRequest {
    pub items: Vec<BulkStockEntry>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkStockResult {
    pub updated: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserList {
    pub items: Vec<UserWithStats>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardData {
    pub total_products: i64,
    pub total_users: i64,
    pub total_orders: i64,
    pub pending_orders: i64,
    pub paid_revenue: i64,
    pub recent_orders: Vec<Order>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AnalyticsQuery {
    /// Trailing window in days, default 30.
    pub days: Option<i32>,
}

/// One day of sales activity.
#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
pub struct SalesBucket {
    pub day: DateTime<Utc>,
    pub orders: i64,
    pub revenue: i64,
}

#[utoipa::path(
    get,
    path = "/api/admin/dashboard",
    responses(
        (status = 200, description = "Aggregate counts and recent orders", body = ApiResponse<DashboardData>),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn dashboard(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<DashboardData>>> {
    let resp = admin_service::dashboard(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/admin/analytics",
    params(
        ("days" = Option<i32>, Query, description = "Trailing window in days, default 30")
    ),
    responses(
        (status = 200, description = "Time-bucketed sales aggregates", body = ApiResponse<Vec<SalesBucket>>),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn analytics(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<AnalyticsQuery>,
) -> AppResult<Json<ApiResponse<Vec<SalesBucket>>>> {
    let resp = admin_service::analytics(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/admin/users",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
    ),
    responses(
        (status = 200, description = "Users with order statistics", body = ApiResponse<UserList>),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_users(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<UserList>>> {
    let resp = admin_service::list_users(&state, &user, pagination).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/admin/users/{id}/status",
    params(
        ("id" = Uuid, Path, description = "User ID")
    ),
    request_body = UpdateUserStatusRequest,
    responses(
        (status = 200, description = "User status updated"),
        (status = 400, description = "Self-targeting rejected"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn set_user_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserStatusRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = admin_service::set_user_status(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/admin/users/{id}",
    params(
        ("id" = Uuid, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User deleted"),
        (status = 400, description = "User has orders or is the caller"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn delete_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = admin_service::delete_user(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/admin/products/bulk-stock",
    request_body = BulkStockRequest,
    responses(
        (status = 200, description = "Stock overwritten", body = ApiResponse<BulkStockResult>),
        (status = 400, description = "Negative stock or empty batch"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Unknown product in batch"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn bulk_update_stock(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<BulkStockRequest>,
) -> AppResult<Json<ApiResponse<BulkStockResult>>> {
    let resp = admin_service::bulk_update_stock(&state, &user, payload).await?;
    Ok(Json(resp))
}
