use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use uuid::Uuid;
use waterstore_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    dto::orders::{OrderLineInput, PayOrderRequest, PlaceOrderRequest, UpdateOrderStatusRequest},
    entity::{
        Products,
        products::ActiveModel as ProductActive,
        users::ActiveModel as UserActive,
    },
    error::AppError,
    middleware::auth::AuthUser,
    models::{OrderStatus, ProductCategory, ShippingAddress},
    routes::admin::{BulkStockEntry, BulkStockRequest, UpdateUserStatusRequest},
    routes::params::ProductQuery,
    services::{admin_service, order_service, product_service},
    state::AppState,
};

// Each test seeds its own users/products with unique names so the suite can
// share one database without truncation.

async fn setup_state() -> anyhow::Result<Option<AppState>> {
    let database_url =
        match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
            Ok(url) => url,
            Err(_) => {
                eprintln!(
                    "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
                );
                return Ok(None);
            }
        };

    let pool = create_pool(&database_url).await?;
    let orm = create_orm_conn(&database_url).await?;
    run_migrations(&orm).await?;
    Ok(Some(AppState { pool, orm }))
}

async fn create_user(state: &AppState, role: &str) -> anyhow::Result<AuthUser> {
    let id = Uuid::new_v4();
    UserActive {
        id: Set(id),
        name: Set(format!("{role}-{id}")),
        email: Set(format!("{id}@example.com")),
        password_hash: Set("dummy".into()),
        role: Set(role.into()),
        is_active: Set(true),
        address: Set(None),
        phone: Set(None),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(AuthUser {
        user_id: id,
        role: role.into(),
    })
}

async fn create_product(
    state: &AppState,
    price: i64,
    stock: i32,
) -> anyhow::Result<waterstore_api::entity::products::Model> {
    let id = Uuid::new_v4();
    let product = ProductActive {
        id: Set(id),
        name: Set(format!("Gallon {id}")),
        description: Set(Some("19 litre refill".into())),
        price: Set(price),
        category: Set(ProductCategory::Gallon),
        size: Set(Some("19L".into())),
        image_url: Set(None),
        stock: Set(stock),
        is_active: Set(true),
        discount_percent: Set(0),
        discount_expires_at: Set(None),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(product)
}

fn shipping_address() -> ShippingAddress {
    ShippingAddress {
        full_name: "Test Customer".into(),
        line1: "1 Water St".into(),
        city: "Springfield".into(),
        postal_code: "12345".into(),
        country: "ID".into(),
        phone: None,
    }
}

fn order_request(product_id: Uuid, quantity: i32) -> PlaceOrderRequest {
    PlaceOrderRequest {
        items: vec![OrderLineInput {
            product_id,
            quantity,
        }],
        shipping_address: shipping_address(),
        payment_method: "bank_transfer".into(),
        expected_total: None,
        notes: None,
    }
}

async fn stock_of(state: &AppState, id: Uuid) -> anyhow::Result<i32> {
    let product = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .expect("product exists");
    Ok(product.stock)
}

// Place -> pay -> ship -> deliver, with the stock=5 / two requests of qty=3
// scenario folded in.
#[tokio::test]
async fn place_pay_and_fulfill_flow() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let customer = create_user(&state, "customer").await?;
    let admin = create_user(&state, "admin").await?;
    let product = create_product(&state, 22_000, 5).await?;

    let placed = order_service::place_order(&state, &customer, order_request(product.id, 3))
        .await?
        .data
        .unwrap();
    let order = placed.order;
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.items_price, 66_000);
    // items >= free-shipping threshold, so shipping is zero here
    assert_eq!(
        order.total_price,
        order.items_price + order.tax_price + order.shipping_price
    );
    assert_eq!(placed.items.len(), 1);
    assert_eq!(placed.items[0].name, product.name);
    assert_eq!(placed.items[0].price, 22_000);
    assert_eq!(stock_of(&state, product.id).await?, 2);

    // Second request for 3 of the remaining 2 must fail and leave stock alone.
    let err = order_service::place_order(&state, &customer, order_request(product.id, 3))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(stock_of(&state, product.id).await?, 2);

    // Owner pays; the order moves to processing and records the descriptor.
    let paid = order_service::pay_order(
        &state,
        &customer,
        order.id,
        PayOrderRequest {
            transaction_id: "TX-1".into(),
            status: "COMPLETED".into(),
            update_time: chrono::Utc::now(),
            payer_email: "payer@example.com".into(),
        },
    )
    .await?
    .data
    .unwrap();
    assert!(paid.order.is_paid);
    assert!(paid.order.paid_at.is_some());
    assert_eq!(paid.order.status, OrderStatus::Processing);

    // Skipping a state is rejected.
    let err = admin_service::update_order_status(
        &state,
        &admin,
        order.id,
        UpdateOrderStatusRequest {
            status: OrderStatus::Delivered,
            tracking_number: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let shipped = admin_service::update_order_status(
        &state,
        &admin,
        order.id,
        UpdateOrderStatusRequest {
            status: OrderStatus::Shipped,
            tracking_number: Some("TRK-42".into()),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(shipped.status, OrderStatus::Shipped);
    assert_eq!(shipped.tracking_number.as_deref(), Some("TRK-42"));
    // Only the delivered transition touches the delivered fields.
    assert!(!shipped.is_delivered);
    assert!(shipped.delivered_at.is_none());

    let delivered = admin_service::update_order_status(
        &state,
        &admin,
        order.id,
        UpdateOrderStatusRequest {
            status: OrderStatus::Delivered,
            tracking_number: None,
        },
    )
    .await?
    .data
    .unwrap();
    assert!(delivered.is_delivered);
    assert!(delivered.delivered_at.is_some());

    // Delivered is terminal.
    let err = admin_service::update_order_status(
        &state,
        &admin,
        order.id,
        UpdateOrderStatusRequest {
            status: OrderStatus::Cancelled,
            tracking_number: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    Ok(())
}

// An order with one valid and one invalid line must not touch any stock.
#[tokio::test]
async fn multi_item_validation_is_all_or_nothing() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let customer = create_user(&state, "customer").await?;
    let plenty = create_product(&state, 10_000, 50).await?;
    let scarce = create_product(&state, 10_000, 1).await?;

    let request = PlaceOrderRequest {
        items: vec![
            OrderLineInput {
                product_id: plenty.id,
                quantity: 2,
            },
            OrderLineInput {
                product_id: scarce.id,
                quantity: 5,
            },
        ],
        shipping_address: shipping_address(),
        payment_method: "bank_transfer".into(),
        expected_total: None,
        notes: None,
    };

    let err = order_service::place_order(&state, &customer, request)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(stock_of(&state, plenty.id).await?, 50);
    assert_eq!(stock_of(&state, scarce.id).await?, 1);

    Ok(())
}

// A stale client total is rejected; the catalog price wins.
#[tokio::test]
async fn client_total_mismatch_is_rejected() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let customer = create_user(&state, "customer").await?;
    let product = create_product(&state, 22_000, 10).await?;

    let mut request = order_request(product.id, 1);
    request.expected_total = Some(1);
    let err = order_service::place_order(&state, &customer, request)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(stock_of(&state, product.id).await?, 10);

    Ok(())
}

#[tokio::test]
async fn ownership_and_admin_access() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let owner = create_user(&state, "customer").await?;
    let other = create_user(&state, "customer").await?;
    let admin = create_user(&state, "admin").await?;
    let product = create_product(&state, 5_000, 10).await?;

    let order = order_service::place_order(&state, &owner, order_request(product.id, 1))
        .await?
        .data
        .unwrap()
        .order;

    // Another customer gets a 403, not a 404.
    let err = order_service::get_order(&state, &other, order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    assert!(order_service::get_order(&state, &owner, order.id).await.is_ok());
    assert!(order_service::get_order(&state, &admin, order.id).await.is_ok());

    // Only the owner may confirm payment.
    let err = order_service::pay_order(
        &state,
        &admin,
        order.id,
        PayOrderRequest {
            transaction_id: "TX-2".into(),
            status: "COMPLETED".into(),
            update_time: chrono::Utc::now(),
            payer_email: "payer@example.com".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    Ok(())
}

#[tokio::test]
async fn admin_self_protection_and_user_deletion_rules() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let admin = create_user(&state, "admin").await?;
    let customer = create_user(&state, "customer").await?;
    let product = create_product(&state, 5_000, 10).await?;

    order_service::place_order(&state, &customer, order_request(product.id, 1)).await?;

    // Self-targeting is rejected for both operations.
    let err = admin_service::set_user_status(
        &state,
        &admin,
        admin.user_id,
        UpdateUserStatusRequest { is_active: false },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = admin_service::delete_user(&state, &admin, admin.user_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    // A user with order history cannot be hard-deleted.
    let err = admin_service::delete_user(&state, &admin, customer.user_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    // Deactivation still works.
    admin_service::set_user_status(
        &state,
        &admin,
        customer.user_id,
        UpdateUserStatusRequest { is_active: false },
    )
    .await?;

    // A fresh user with no orders can be deleted.
    let disposable = create_user(&state, "customer").await?;
    admin_service::delete_user(&state, &admin, disposable.user_id).await?;

    Ok(())
}

#[tokio::test]
async fn soft_delete_hides_product_but_keeps_snapshots() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let customer = create_user(&state, "customer").await?;
    let admin = create_user(&state, "admin").await?;
    let product = create_product(&state, 8_000, 10).await?;

    let placed = order_service::place_order(&state, &customer, order_request(product.id, 2))
        .await?
        .data
        .unwrap();

    product_service::delete_product(&state, &admin, product.id).await?;

    // Gone from public listing and detail.
    let listing = product_service::list_products(
        &state,
        ProductQuery {
            page: Some(1),
            per_page: Some(100),
            q: Some(product.name.clone()),
            category: None,
            min_price: None,
            max_price: None,
            sort_by: None,
            sort_order: None,
        },
    )
    .await?
    .data
    .unwrap();
    assert!(listing.items.iter().all(|p| p.id != product.id));

    let err = product_service::get_product(&state, product.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    // Not orderable any more.
    let err = order_service::place_order(&state, &customer, order_request(product.id, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    // The historical snapshot is untouched.
    let fetched = order_service::get_order(&state, &customer, placed.order.id)
        .await?
        .data
        .unwrap();
    assert_eq!(fetched.items[0].name, product.name);
    assert_eq!(fetched.items[0].price, 8_000);

    Ok(())
}

// Two orders referencing the same products in opposite line order must both
// complete; lock acquisition is id-sorted, so neither can deadlock the other.
#[tokio::test]
async fn opposite_line_orders_place_concurrently() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let first_customer = create_user(&state, "customer").await?;
    let second_customer = create_user(&state, "customer").await?;
    let first = create_product(&state, 5_000, 10).await?;
    let second = create_product(&state, 5_000, 10).await?;

    let forward = PlaceOrderRequest {
        items: vec![
            OrderLineInput {
                product_id: first.id,
                quantity: 1,
            },
            OrderLineInput {
                product_id: second.id,
                quantity: 1,
            },
        ],
        shipping_address: shipping_address(),
        payment_method: "bank_transfer".into(),
        expected_total: None,
        notes: None,
    };
    let reversed = PlaceOrderRequest {
        items: vec![
            OrderLineInput {
                product_id: second.id,
                quantity: 1,
            },
            OrderLineInput {
                product_id: first.id,
                quantity: 1,
            },
        ],
        shipping_address: shipping_address(),
        payment_method: "bank_transfer".into(),
        expected_total: None,
        notes: None,
    };

    let (a, b) = tokio::join!(
        order_service::place_order(&state, &first_customer, forward),
        order_service::place_order(&state, &second_customer, reversed),
    );
    a?;
    b?;

    assert_eq!(stock_of(&state, first.id).await?, 8);
    assert_eq!(stock_of(&state, second.id).await?, 8);

    Ok(())
}

#[tokio::test]
async fn bulk_stock_overwrite_is_transactional() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let admin = create_user(&state, "admin").await?;
    let first = create_product(&state, 5_000, 10).await?;
    let second = create_product(&state, 5_000, 10).await?;

    // Unknown id aborts the whole batch.
    let err = admin_service::bulk_update_stock(
        &state,
        &admin,
        BulkStockRequest {
            items: vec![
                BulkStockEntry {
                    product_id: first.id,
                    stock: 99,
                },
                BulkStockEntry {
                    product_id: Uuid::new_v4(),
                    stock: 1,
                },
            ],
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound));
    assert_eq!(stock_of(&state, first.id).await?, 10);

    // A clean batch lands everywhere.
    admin_service::bulk_update_stock(
        &state,
        &admin,
        BulkStockRequest {
            items: vec![
                BulkStockEntry {
                    product_id: first.id,
                    stock: 7,
                },
                BulkStockEntry {
                    product_id: second.id,
                    stock: 0,
                },
            ],
        },
    )
    .await?;
    assert_eq!(stock_of(&state, first.id).await?, 7);
    assert_eq!(stock_of(&state, second.id).await?, 0);

    Ok(())
}
