use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        orders::{
            OrderList, OrderWithItems, PayOrderRequest, PlaceOrderRequest,
            UpdateOrderStatusRequest,
        },
        products::ProductList,
    },
    models::{Order, OrderItem, OrderStatus, Product, ProductCategory, ShippingAddress, User,
        UserWithStats},
    response::{ApiResponse, Meta},
    routes::{admin, auth, health, orders, params, products as product_routes},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        auth::register,
        product_routes::list_products,
        product_routes::create_product,
        product_routes::get_product,
        product_routes::update_product,
        product_routes::delete_product,
        orders::place_order,
        orders::list_my_orders,
        orders::list_all_orders,
        orders::get_order,
        orders::pay_order,
        orders::update_order_status,
        admin::dashboard,
        admin::analytics,
        admin::list_users,
        admin::set_user_status,
        admin::delete_user,
        admin::bulk_update_stock
    ),
    components(
        schemas(
            User,
            UserWithStats,
            Product,
            ProductCategory,
            Order,
            OrderItem,
            OrderStatus,
            ShippingAddress,
            PlaceOrderRequest,
            PayOrderRequest,
            UpdateOrderStatusRequest,
            OrderList,
            OrderWithItems,
            ProductList,
            admin::UpdateUserStatusRequest,
            admin::BulkStockRequest,
            admin::BulkStockEntry,
            admin::BulkStockResult,
            admin::UserList,
            admin::DashboardData,
            admin::AnalyticsQuery,
            admin::SalesBucket,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<admin::DashboardData>,
            ApiResponse<admin::UserList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Products", description = "Catalog endpoints"),
        (name = "Orders", description = "Order placement and fulfillment"),
        (name = "Admin", description = "Admin endpoints"),
        (name = "Auth", description = "Authentication endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
