use std::collections::HashSet;

use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::{OrderList, OrderWithItems, PayOrderRequest, PlaceOrderRequest},
    entity::{
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        products::{Column as ProdCol, Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderItem, OrderStatus, ShippingAddress},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::pricing,
    state::AppState,
};

pub async fn list_my_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
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
        "Ok",
        OrderList { items: orders },
        Some(meta),
    ))
}

/// Place an order from explicit line items.
///
/// Runs as one transaction: every referenced product is loaded with a row
/// lock and validated before any write happens, pricing is recomputed from
/// the catalog, and each stock decrement is a conditional update guarded by
/// `stock >= quantity`. A guard that matches zero rows aborts the whole
/// transaction, so stock can never go negative even under concurrent
/// placements racing for the last units.
pub async fn place_order(
    state: &AppState,
    user: &AuthUser,
    mut payload: PlaceOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    if payload.items.is_empty() {
        return Err(AppError::BadRequest("Order has no items".into()));
    }
    let mut seen: HashSet<Uuid> = HashSet::new();
    for line in &payload.items {
        if line.quantity < 1 {
            return Err(AppError::BadRequest("Quantity must be at least 1".into()));
        }
        if !seen.insert(line.product_id) {
            return Err(AppError::BadRequest(format!(
                "Duplicate product {} in order",
                line.product_id
            )));
        }
    }

    // Lock rows in a globally consistent order; two orders referencing the
    // same products in a different sequence must not deadlock.
    payload.items.sort_by_key(|line| line.product_id);

    let txn = state.orm.begin().await?;
    let now = Utc::now();

    // Validate-all before mutate-all: lock and check every product first.
    let mut priced: Vec<(ProductModel, i32, i64)> = Vec::with_capacity(payload.items.len());
    for line in &payload.items {
        let product = Products::find_by_id(line.product_id)
            .lock(LockType::Update)
            .one(&txn)
            .await?
            .filter(|p| p.is_active)
            .ok_or(AppError::NotFound)?;

        if product.stock < line.quantity {
            return Err(AppError::BadRequest(format!(
                "Insufficient stock for {}",
                product.name
            )));
        }

        let unit_price = pricing::discounted_unit_price(
            product.price,
            product.discount_percent,
            product.discount_expires_at.map(|dt| dt.with_timezone(&Utc)),
            now,
        );
        priced.push((product, line.quantity, unit_price));
    }

    let items_price: i64 = priced
        .iter()
        .map(|(_, qty, unit)| unit * i64::from(*qty))
        .sum();
    let breakdown = pricing::compute_breakdown(items_price);

    if let Some(expected) = payload.expected_total {
        if expected != breakdown.total_price {
            return Err(AppError::BadRequest(format!(
                "Order total mismatch: expected {}, catalog says {}",
                expected, breakdown.total_price
            )));
        }
    }

    let order_id = Uuid::new_v4();
    let order = OrderActive {
        id: Set(order_id),
        order_number: Set(build_order_number(order_id)),
        user_id: Set(user.user_id),
        // New orders always start as pending.
        status: Set(OrderStatus::Pending),
        items_price: Set(breakdown.items_price),
        tax_price: Set(breakdown.tax_price),
        shipping_price: Set(breakdown.shipping_price),
        total_price: Set(breakdown.total_price),
        shipping_full_name: Set(payload.shipping_address.full_name.clone()),
        shipping_line1: Set(payload.shipping_address.line1.clone()),
        shipping_city: Set(payload.shipping_address.city.clone()),
        shipping_postal_code: Set(payload.shipping_address.postal_code.clone()),
        shipping_country: Set(payload.shipping_address.country.clone()),
        shipping_phone: Set(payload.shipping_address.phone.clone()),
        payment_method: Set(payload.payment_method.clone()),
        is_paid: Set(false),
        paid_at: Set(None),
        payment_result: Set(None),
        is_delivered: Set(false),
        delivered_at: Set(None),
        tracking_number: Set(None),
        notes: Set(payload.notes.clone()),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut order_items: Vec<OrderItem> = Vec::with_capacity(priced.len());
    for (product, quantity, unit_price) in &priced {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(product.id),
            name: Set(product.name.clone()),
            price: Set(*unit_price),
            quantity: Set(*quantity),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
        order_items.push(order_item_from_entity(item));

        // Conditional decrement; the stock >= quantity guard is what keeps
        // concurrent placements from overselling.
        let result = Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).sub(*quantity))
            .filter(ProdCol::Id.eq(product.id))
            .filter(ProdCol::Stock.gte(*quantity))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(AppError::BadRequest(format!(
                "Insufficient stock for {}",
                product.name
            )));
        }
    }

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_placed",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "total": order.total_price })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order placed",
        OrderWithItems {
            order: order_from_entity(order),
            items: order_items,
        },
        Some(Meta::empty()),
    ))
}

/// The owning customer records payment for their order. Admins are not
/// accepted here; only the owner may confirm payment.
pub async fn pay_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: PayOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let txn = state.orm.begin().await?;

    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if order.is_paid {
        return Err(AppError::BadRequest("Order already paid".into()));
    }
    if order.status == OrderStatus::Cancelled {
        return Err(AppError::BadRequest("Order is cancelled".into()));
    }

    let next_status = if order.status.can_transition_to(OrderStatus::Processing) {
        OrderStatus::Processing
    } else {
        order.status
    };

    let mut active: OrderActive = order.into();
    active.is_paid = Set(true);
    active.paid_at = Set(Some(Utc::now().into()));
    // The payment-result descriptor is stored verbatim; no gateway exists
    // to verify it against.
    active.payment_result = Set(Some(serde_json::to_value(&payload).map_err(
        |e| AppError::Internal(anyhow::anyhow!(e)),
    )?));
    active.status = Set(next_status);
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&txn)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_paid",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Payment recorded",
        OrderWithItems {
            order: order_from_entity(order),
            items,
        },
        Some(Meta::empty()),
    ))
}

/// Fetch one order. The owner sees their own; admins see any; anyone else
/// gets a 403 rather than a 404, so ownership failures are distinguishable
/// from missing orders.
pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    if order.user_id != user.user_id && !user.is_admin() {
        return Err(AppError::Forbidden);
    }

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "OK",
        OrderWithItems {
            order: order_from_entity(order),
            items,
        },
        Some(Meta::empty()),
    ))
}

pub(crate) fn order_from_entity(model: OrderModel) -> Order {
    Order {
        id: model.id,
        order_number: model.order_number,
        user_id: model.user_id,
        status: model.status,
        items_price: model.items_price,
        tax_price: model.tax_price,
        shipping_price: model.shipping_price,
        total_price: model.total_price,
        shipping_address: ShippingAddress {
            full_name: model.shipping_full_name,
            line1: model.shipping_line1,
            city: model.shipping_city,
            postal_code: model.shipping_postal_code,
            country: model.shipping_country,
            phone: model.shipping_phone,
        },
        payment_method: model.payment_method,
        is_paid: model.is_paid,
        paid_at: model.paid_at.map(|dt| dt.with_timezone(&Utc)),
        payment_result: model.payment_result,
        is_delivered: model.is_delivered,
        delivered_at: model.delivered_at.map(|dt| dt.with_timezone(&Utc)),
        tracking_number: model.tracking_number,
        notes: model.notes,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

pub(crate) fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        name: model.name,
        price: model.price,
        quantity: model.quantity,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

fn build_order_number(order_id: Uuid) -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix = order_id.to_string();
    let short = &suffix[..8];
    format!("ORD-{}-{}", date, short)
}
