use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::{OrderList, UpdateOrderStatusRequest},
    entity::{
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders},
        products::{Column as ProdCol, Entity as Products},
        users::{ActiveModel as UserActive, Entity as Users},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Order, OrderStatus, UserWithStats},
    response::{ApiResponse, Meta},
    routes::admin::{
        AnalyticsQuery, BulkStockRequest, BulkStockResult, DashboardData, SalesBucket,
        UpdateUserStatusRequest, UserList,
    },
    routes::params::{OrderListQuery, Pagination, SortOrder},
    services::order_service::order_from_entity,
    state::AppState,
};

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination().normalize();

    let mut condition = Condition::all();
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status));
    }

    let mut finder = Orders::find().filter(condition);

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Orders",
        OrderList { items: orders },
        Some(meta),
    ))
}

/// Move an order through the fulfillment state machine. Illegal transitions
/// are rejected; only the delivered transition touches the delivered fields.
pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;

    let txn = state.orm.begin().await?;
    let existing = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let current = existing.status;
    let next = payload.status;
    if !current.can_transition_to(next) {
        return Err(AppError::BadRequest(format!(
            "Illegal status transition: {} -> {}",
            current.as_str(),
            next.as_str()
        )));
    }

    let mut active: OrderActive = existing.into();
    active.status = Set(next);
    if next == OrderStatus::Delivered {
        active.is_delivered = Set(true);
        active.delivered_at = Set(Some(Utc::now().into()));
    }
    if let Some(tracking) = payload.tracking_number {
        active.tracking_number = Set(Some(tracking));
    }
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_status_update",
        Some("orders"),
        Some(serde_json::json!({
            "order_id": order.id,
            "from": current.as_str(),
            "to": next.as_str(),
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order updated",
        order_from_entity(order),
        Some(Meta::empty()),
    ))
}

/// Overwrite stock counts for several products at once. All-or-nothing: an
/// unknown id or negative count aborts the whole batch.
pub async fn bulk_update_stock(
    state: &AppState,
    user: &AuthUser,
    payload: BulkStockRequest,
) -> AppResult<ApiResponse<BulkStockResult>> {
    ensure_admin(user)?;
    if payload.items.is_empty() {
        return Err(AppError::BadRequest("No stock entries supplied".into()));
    }

    let txn = state.orm.begin().await?;
    for entry in &payload.items {
        if entry.stock < 0 {
            return Err(AppError::BadRequest("Stock must not be negative".into()));
        }
        let result = Products::update_many()
            .col_expr(ProdCol::Stock, Expr::value(entry.stock))
            .filter(ProdCol::Id.eq(entry.product_id))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(AppError::NotFound);
        }
    }
    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "bulk_stock_update",
        Some("products"),
        Some(serde_json::json!({ "count": payload.items.len() })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Stock updated",
        BulkStockResult {
            updated: payload.items.len() as i64,
        },
        Some(Meta::empty()),
    ))
}

/// Users with their order statistics, aggregated on demand.
pub async fn list_users(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<UserList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = pagination.normalize();

    let items: Vec<UserWithStats> = sqlx::query_as(
        r#"
        SELECT u.id, u.name, u.email, u.role, u.is_active, u.created_at,
               count(o.id) AS total_orders,
               COALESCE(SUM(o.total_price), 0)::BIGINT AS total_spent,
               COALESCE(AVG(o.total_price), 0)::BIGINT AS average_order_value,
               MAX(o.created_at) AS last_order_at
        FROM users u
        LEFT JOIN orders o ON o.user_id = u.id
        GROUP BY u.id
        ORDER BY u.created_at DESC
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: (i64,) = sqlx::query_as("SELECT count(*) FROM users")
        .fetch_one(&state.pool)
        .await?;

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success("Users", UserList { items }, Some(meta)))
}

/// Activate or deactivate an account. Admins cannot target themselves, so
/// there is always at least one way back in.
pub async fn set_user_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateUserStatusRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    if id == user.user_id {
        return Err(AppError::BadRequest(
            "Admins cannot change their own account status".into(),
        ));
    }

    let existing = Users::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: UserActive = existing.into();
    active.is_active = Set(payload.is_active);
    let updated = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "user_status_update",
        Some("users"),
        Some(serde_json::json!({ "target": updated.id, "is_active": updated.is_active })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "User status updated",
        serde_json::json!({ "id": updated.id, "is_active": updated.is_active }),
        Some(Meta::empty()),
    ))
}

/// Hard delete is only allowed for users with no order history; everyone
/// else must be deactivated so their orders keep a valid owner.
pub async fn delete_user(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    if id == user.user_id {
        return Err(AppError::BadRequest(
            "Admins cannot delete their own account".into(),
        ));
    }

    let order_count = Orders::find()
        .filter(OrderCol::UserId.eq(id))
        .count(&state.orm)
        .await?;
    if order_count > 0 {
        return Err(AppError::BadRequest(
            "User has orders; deactivate the account instead".into(),
        ));
    }

    let result = Users::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "user_delete",
        Some("users"),
        Some(serde_json::json!({ "target": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "User deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn dashboard(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<DashboardData>> {
    ensure_admin(user)?;

    let (total_products, total_users, total_orders, pending_orders, paid_revenue): (
        i64,
        i64,
        i64,
        i64,
        i64,
    ) = sqlx::query_as(
        r#"
        SELECT
            (SELECT count(*) FROM products WHERE is_active),
            (SELECT count(*) FROM users),
            (SELECT count(*) FROM orders),
            (SELECT count(*) FROM orders WHERE status = 'pending'),
            (SELECT COALESCE(SUM(total_price), 0) FROM orders WHERE is_paid)::BIGINT
        "#,
    )
    .fetch_one(&state.pool)
    .await?;

    let recent_orders = Orders::find()
        .order_by_desc(OrderCol::CreatedAt)
        .limit(5)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect();

    let data = DashboardData {
        total_products,
        total_users,
        total_orders,
        pending_orders,
        paid_revenue,
        recent_orders,
    };
    Ok(ApiResponse::success("Dashboard", data, Some(Meta::empty())))
}

/// Per-day order counts and revenue over a trailing window.
pub async fn analytics(
    state: &AppState,
    user: &AuthUser,
    query: AnalyticsQuery,
) -> AppResult<ApiResponse<Vec<SalesBucket>>> {
    ensure_admin(user)?;
    let days = query.days.unwrap_or(30).clamp(1, 365);

    let buckets: Vec<SalesBucket> = sqlx::query_as(
        r#"
        SELECT date_trunc('day', created_at) AS day,
               count(*) AS orders,
               COALESCE(SUM(total_price), 0)::BIGINT AS revenue
        FROM orders
        WHERE created_at >= now() - make_interval(days => $1)
        GROUP BY day
        ORDER BY day ASC
        "#,
    )
    .bind(days)
    .fetch_all(&state.pool)
    .await?;

    Ok(ApiResponse::success(
        "Analytics",
        buckets,
        Some(Meta::empty()),
    ))
}
