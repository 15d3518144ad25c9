use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU32, Ordering},
};

use chrono::Utc;
use uuid::Uuid;
use waterstore_api::dto::orders::PlaceOrderRequest;
use waterstore_api::models::{Order, OrderStatus, ShippingAddress};
use waterstore_api::services::pricing::compute_breakdown;
use waterstore_api::storefront::{
    CheckoutForm, CheckoutLine, OrderApi, OrderCache, StorefrontOrder,
};

#[derive(Clone, Default)]
struct FakeApi {
    place_calls: Arc<AtomicU32>,
    orders: Arc<Mutex<Vec<Order>>>,
}

impl OrderApi for FakeApi {
    async fn place_order(&self, request: &PlaceOrderRequest) -> anyhow::Result<Order> {
        self.place_calls.fetch_add(1, Ordering::SeqCst);
        let order = sample_order(request);
        self.orders.lock().unwrap().insert(0, order.clone());
        Ok(order)
    }

    async fn fetch_my_orders(&self) -> anyhow::Result<Vec<Order>> {
        Ok(self.orders.lock().unwrap().clone())
    }
}

fn sample_order(request: &PlaceOrderRequest) -> Order {
    let id = Uuid::new_v4();
    Order {
        id,
        order_number: format!("ORD-TEST-{id}"),
        user_id: Uuid::new_v4(),
        status: OrderStatus::Pending,
        items_price: 10_000,
        tax_price: 1_000,
        shipping_price: 1_500,
        total_price: 12_500,
        shipping_address: request.shipping_address.clone(),
        payment_method: request.payment_method.clone(),
        is_paid: false,
        paid_at: None,
        payment_result: None,
        is_delivered: false,
        delivered_at: None,
        tracking_number: None,
        notes: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn address() -> ShippingAddress {
    ShippingAddress {
        full_name: "Demo Shopper".into(),
        line1: "1 Water St".into(),
        city: "Springfield".into(),
        postal_code: "12345".into(),
        country: "ID".into(),
        phone: None,
    }
}

fn catalog_form() -> CheckoutForm {
    CheckoutForm {
        lines: vec![CheckoutLine::Catalog {
            product_id: Uuid::new_v4(),
            name: "Refill Gallon 19L".into(),
            price: 22_000,
            quantity: 2,
        }],
        shipping_address: address(),
        payment_method: "bank_transfer".into(),
    }
}

fn demo_form() -> CheckoutForm {
    CheckoutForm {
        lines: vec![CheckoutLine::Demo {
            name: "Sample Gallon".into(),
            price: 22_000,
            quantity: 1,
        }],
        shipping_address: address(),
        payment_method: "cash".into(),
    }
}

#[tokio::test]
async fn authenticated_catalog_checkout_goes_remote() -> anyhow::Result<()> {
    let api = FakeApi::default();
    let calls = api.place_calls.clone();
    let mut cache = OrderCache::new(Some(api));

    let placed = cache.checkout(catalog_form()).await?;
    assert!(matches!(placed, StorefrontOrder::Remote(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Reconciled against the backend's own list.
    assert_eq!(cache.remote_orders().len(), 1);
    assert!(cache.demo_orders().is_empty());
    Ok(())
}

#[tokio::test]
async fn unauthenticated_checkout_fabricates_demo_order() -> anyhow::Result<()> {
    let mut cache: OrderCache<FakeApi> = OrderCache::new(None);

    let placed = cache.checkout(catalog_form()).await?;
    let StorefrontOrder::Demo(demo) = placed else {
        panic!("expected demo order");
    };
    assert_eq!(demo.status, OrderStatus::Processing);
    assert!(demo.tracking_number.starts_with("DEMO-"));

    // Catalog lines keep their displayed name and price offline, so the
    // fabricated totals are real amounts, not placeholders.
    assert_eq!(demo.lines[0].name, "Refill Gallon 19L");
    assert_eq!(demo.lines[0].price, 22_000);
    let breakdown = compute_breakdown(44_000);
    assert_eq!(demo.total_price, breakdown.total_price);

    assert!(cache.remote_orders().is_empty());
    assert_eq!(cache.demo_orders().len(), 1);
    Ok(())
}

// A demo line in the form must keep the backend out of the loop entirely,
// even for an authenticated session.
#[tokio::test]
async fn demo_line_bypasses_backend() -> anyhow::Result<()> {
    let api = FakeApi::default();
    let calls = api.place_calls.clone();
    let mut cache = OrderCache::new(Some(api));

    let placed = cache.checkout(demo_form()).await?;
    assert!(matches!(placed, StorefrontOrder::Demo(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn only_demo_orders_are_persisted() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = dir.path().join("orders.json");

    let api = FakeApi::default();
    let mut cache = OrderCache::new(Some(api.clone())).with_store(store.clone())?;
    cache.checkout(catalog_form()).await?;
    cache.checkout(demo_form()).await?;
    assert_eq!(cache.remote_orders().len(), 1);
    assert_eq!(cache.demo_orders().len(), 1);

    // A reload sees the demo order but must refetch remote state.
    let reloaded = OrderCache::new(Some(api)).with_store(store)?;
    assert_eq!(reloaded.demo_orders().len(), 1);
    assert_eq!(reloaded.demo_orders()[0].lines[0].name, "Sample Gallon");
    assert!(reloaded.remote_orders().is_empty());

    let mut reloaded = reloaded;
    reloaded.refresh().await?;
    assert_eq!(reloaded.remote_orders().len(), 1);
    Ok(())
}

#[tokio::test]
async fn refresh_replaces_remote_mirror() -> anyhow::Result<()> {
    let api = FakeApi::default();
    let orders = api.orders.clone();
    let mut cache = OrderCache::new(Some(api));

    cache.checkout(catalog_form()).await?;
    assert_eq!(cache.remote_orders().len(), 1);

    // The server forgets everything; the mirror follows it.
    orders.lock().unwrap().clear();
    cache.refresh().await?;
    assert!(cache.remote_orders().is_empty());
    Ok(())
}

#[tokio::test]
async fn empty_checkout_is_rejected() {
    let mut cache: OrderCache<FakeApi> = OrderCache::new(None);
    let result = cache
        .checkout(CheckoutForm {
            lines: vec![],
            shipping_address: address(),
            payment_method: "cash".into(),
        })
        .await;
    assert!(result.is_err());
}
