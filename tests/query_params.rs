use axum::extract::Query;
use axum::http::Uri;
use waterstore_api::models::{OrderStatus, ProductCategory};
use waterstore_api::routes::params::{OrderListQuery, Pagination, ProductQuery};

fn uri(s: &str) -> Uri {
    s.parse().unwrap()
}

#[test]
fn product_query_parses_numeric_and_enum_params() {
    let Query(query) = Query::<ProductQuery>::try_from_uri(&uri(
        "/api/products?page=2&per_page=50&q=gallon&category=gallon&min_price=1000&max_price=30000&sort_order=asc",
    ))
    .unwrap();

    let (page, per_page, offset) = query.pagination().normalize();
    assert_eq!((page, per_page, offset), (2, 50, 50));
    assert_eq!(query.q.as_deref(), Some("gallon"));
    assert_eq!(query.category, Some(ProductCategory::Gallon));
    assert_eq!(query.min_price, Some(1000));
    assert_eq!(query.max_price, Some(30000));
}

#[test]
fn product_query_defaults_when_params_absent() {
    let Query(query) = Query::<ProductQuery>::try_from_uri(&uri("/api/products")).unwrap();
    let (page, per_page, offset) = query.pagination().normalize();
    assert_eq!((page, per_page, offset), (1, 20, 0));
    assert!(query.q.is_none());
    assert!(query.category.is_none());
}

#[test]
fn order_list_query_parses_status_and_pagination() {
    let Query(query) = Query::<OrderListQuery>::try_from_uri(&uri(
        "/api/orders/myorders?status=pending&page=3&per_page=10",
    ))
    .unwrap();

    let (page, per_page, offset) = query.pagination().normalize();
    assert_eq!((page, per_page, offset), (3, 10, 20));
    assert_eq!(query.status, Some(OrderStatus::Pending));
}

#[test]
fn bare_pagination_parses_for_admin_user_list() {
    let Query(pagination) =
        Query::<Pagination>::try_from_uri(&uri("/api/admin/users?page=4&per_page=25")).unwrap();
    assert_eq!(pagination.normalize(), (4, 25, 75));
}
