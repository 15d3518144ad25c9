//! Client-side order cache embedded by storefront and kiosk builds.
//!
//! Two kinds of orders live here and are never conflated:
//!
//! - [`RemoteOrder`]: fetched from the backend through [`OrderApi`]. The
//!   server is the only authority; the cache never mutates these and never
//!   persists them, so a reload always refetches instead of showing stale
//!   data.
//! - [`DemoOrder`]: fabricated locally so an unauthenticated browsing
//!   session can still "complete" a checkout against sample catalog data.
//!   These are the only orders persisted across reloads.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dto::orders::{OrderLineInput, PlaceOrderRequest};
use crate::models::{Order, OrderStatus, ShippingAddress};
use crate::services::pricing;

/// Backend seam used by the cache. The HTTP client implements this in the
/// storefront build; tests substitute an in-memory fake.
pub trait OrderApi {
    fn place_order(
        &self,
        request: &PlaceOrderRequest,
    ) -> impl Future<Output = anyhow::Result<Order>> + Send;
    fn fetch_my_orders(&self) -> impl Future<Output = anyhow::Result<Vec<Order>>> + Send;
}

/// An authoritative order mirrored from the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteOrder {
    pub order: Order,
}

/// A locally fabricated order for demo/unauthenticated checkouts. Never
/// sent to the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoOrder {
    pub local_id: Uuid,
    pub tracking_number: String,
    pub status: OrderStatus,
    pub lines: Vec<DemoLine>,
    pub total_price: i64,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoLine {
    pub name: String,
    pub price: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone)]
pub enum StorefrontOrder {
    Remote(RemoteOrder),
    Demo(DemoOrder),
}

/// One line of a checkout form. Catalog lines reference real products and
/// carry the displayed name and unit price so an offline fabrication still
/// shows real amounts; demo lines carry sample data that was never
/// persisted server-side.
#[derive(Debug, Clone)]
pub enum CheckoutLine {
    Catalog {
        product_id: Uuid,
        name: String,
        price: i64,
        quantity: i32,
    },
    Demo {
        name: String,
        price: i64,
        quantity: i32,
    },
}

#[derive(Debug, Clone)]
pub struct CheckoutForm {
    pub lines: Vec<CheckoutLine>,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
}

pub struct OrderCache<B> {
    backend: Option<B>,
    remote: Vec<RemoteOrder>,
    demo: Vec<DemoOrder>,
    store_path: Option<PathBuf>,
}

impl<B: OrderApi> OrderCache<B> {
    /// `backend: None` models an unauthenticated session; every checkout
    /// then takes the demo path.
    pub fn new(backend: Option<B>) -> Self {
        Self {
            backend,
            remote: Vec::new(),
            demo: Vec::new(),
            store_path: None,
        }
    }

    /// Attach a persistence file and load whatever demo orders it holds.
    /// Remote orders are deliberately absent from the file.
    pub fn with_store(mut self, path: PathBuf) -> anyhow::Result<Self> {
        if path.exists() {
            let raw = fs::read_to_string(&path)?;
            self.demo = serde_json::from_str(&raw)?;
        }
        self.store_path = Some(path);
        Ok(self)
    }

    /// Complete a checkout. Authenticated sessions with all-catalog lines
    /// place the order remotely, prepend the result for immediate UI
    /// feedback, then refetch the authoritative list. Any demo line, or the
    /// absence of a backend, routes to local fabrication instead.
    pub async fn checkout(&mut self, form: CheckoutForm) -> anyhow::Result<StorefrontOrder> {
        if form.lines.is_empty() {
            anyhow::bail!("checkout form has no lines");
        }

        let has_demo_line = form
            .lines
            .iter()
            .any(|line| matches!(line, CheckoutLine::Demo { .. }));

        if !has_demo_line {
            let placed = match &self.backend {
                Some(backend) => {
                    let items = form
                        .lines
                        .iter()
                        .filter_map(|line| match line {
                            CheckoutLine::Catalog {
                                product_id,
                                quantity,
                                ..
                            } => Some(OrderLineInput {
                                product_id: *product_id,
                                quantity: *quantity,
                            }),
                            CheckoutLine::Demo { .. } => None,
                        })
                        .collect();
                    let request = PlaceOrderRequest {
                        items,
                        shipping_address: form.shipping_address.clone(),
                        payment_method: form.payment_method.clone(),
                        expected_total: None,
                        notes: None,
                    };
                    let order = backend.place_order(&request).await?;
                    Some(RemoteOrder { order })
                }
                None => None,
            };

            if let Some(placed) = placed {
                self.remote.insert(0, placed.clone());

                // Eventual reconciliation: the optimistic prepend is replaced
                // by the server's own list. A failed refetch keeps the
                // prepended entry and is retried on the next refresh.
                if let Err(err) = self.refresh().await {
                    tracing::warn!(error = %err, "order list refetch failed");
                }
                return Ok(StorefrontOrder::Remote(placed));
            }
        }

        let demo = fabricate_demo_order(&form);
        self.demo.insert(0, demo.clone());
        self.persist()?;
        Ok(StorefrontOrder::Demo(demo))
    }

    /// Replace the remote mirror with the server's current list.
    pub async fn refresh(&mut self) -> anyhow::Result<()> {
        if let Some(backend) = &self.backend {
            let orders = backend.fetch_my_orders().await?;
            self.remote = orders
                .into_iter()
                .map(|order| RemoteOrder { order })
                .collect();
        }
        Ok(())
    }

    pub fn remote_orders(&self) -> &[RemoteOrder] {
        &self.remote
    }

    pub fn demo_orders(&self) -> &[DemoOrder] {
        &self.demo
    }

    /// All cached orders, demo entries first (they are the newest local
    /// activity for an unauthenticated session).
    pub fn all_orders(&self) -> Vec<StorefrontOrder> {
        self.demo
            .iter()
            .cloned()
            .map(StorefrontOrder::Demo)
            .chain(self.remote.iter().cloned().map(StorefrontOrder::Remote))
            .collect()
    }

    fn persist(&self) -> anyhow::Result<()> {
        if let Some(path) = &self.store_path {
            let raw = serde_json::to_string_pretty(&self.demo)?;
            fs::write(path, raw)?;
        }
        Ok(())
    }
}

fn fabricate_demo_order(form: &CheckoutForm) -> DemoOrder {
    let local_id = Uuid::new_v4();
    let lines: Vec<DemoLine> = form
        .lines
        .iter()
        .map(|line| match line {
            CheckoutLine::Catalog {
                name,
                price,
                quantity,
                ..
            }
            | CheckoutLine::Demo {
                name,
                price,
                quantity,
            } => DemoLine {
                name: name.clone(),
                price: *price,
                quantity: *quantity,
            },
        })
        .collect();
    let items_price: i64 = lines
        .iter()
        .map(|line| line.price * i64::from(line.quantity))
        .sum();
    let breakdown = pricing::compute_breakdown(items_price);

    DemoOrder {
        local_id,
        tracking_number: build_demo_tracking_number(local_id),
        status: OrderStatus::Processing,
        lines,
        total_price: breakdown.total_price,
        shipping_address: form.shipping_address.clone(),
        payment_method: form.payment_method.clone(),
        created_at: Utc::now(),
    }
}

fn build_demo_tracking_number(local_id: Uuid) -> String {
    let suffix = local_id.simple().to_string();
    format!("DEMO-{}", &suffix[..10].to_uppercase())
}
