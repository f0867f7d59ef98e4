use agrobridge_core::{
    normalize_category, CategoryPage, CategoryQuery, Coordinates, NewProduct, Product,
    DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct CategoryParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub lng: Option<f64>,
    pub lat: Option<f64>,
}

pub(super) fn normalize_page_size(page_size: Option<u32>) -> u32 {
    page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE)
}

fn parse_buyer_location(req_id: &str, params: &CategoryParams) -> Result<Coordinates, ApiError> {
    let (Some(lng), Some(lat)) = (params.lng, params.lat) else {
        return Err(ApiError::validation(
            req_id,
            "lng and lat query parameters are required",
        ));
    };
    Coordinates::try_new(lng, lat).map_err(|e| ApiError::validation(req_id, e.to_string()))
}

fn parse_product_id(req_id: &str, raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw)
        .map_err(|_| ApiError::validation(req_id, format!("'{raw}' is not a valid product id")))
}

fn into_products(rows: Vec<agrobridge_db::ProductRow>) -> Vec<Product> {
    rows.into_iter().map(Product::from).collect()
}

/// GET /api/v1/products/category/:category — one page of listings near the
/// buyer, split into deliverable and out-of-range.
pub(super) async fn list_category_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(category): Path<String>,
    params: Result<Query<CategoryParams>, QueryRejection>,
) -> Result<Json<ApiResponse<CategoryPage<Product>>>, ApiError> {
    let rid = &req_id.0;
    let Query(params) = params.map_err(|e| ApiError::validation(rid, e.body_text()))?;

    let page = params.page.unwrap_or(1);
    if page == 0 {
        return Err(ApiError::validation(rid, "page must be at least 1"));
    }
    let page_size = normalize_page_size(params.page_size);
    let buyer = parse_buyer_location(rid, &params)?;
    let query = CategoryQuery {
        category: normalize_category(&category),
        page,
        page_size,
        location: buyer,
    };

    let result = agrobridge_db::list_category_page(&state.pool, &query)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    tracing::debug!(
        request_id = %rid,
        category = %query.category,
        page,
        page_size,
        deliverable = result.deliverable_products.len(),
        non_deliverable = result.non_deliverable_products.len(),
        has_more = result.has_more,
        "served category page"
    );

    Ok(Json(ApiResponse {
        data: result,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// GET /api/v1/products/:id
pub(super) async fn get_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(raw_id): Path<String>,
) -> Result<Json<ApiResponse<Product>>, ApiError> {
    let rid = &req_id.0;
    let id = parse_product_id(rid, &raw_id)?;

    let row = agrobridge_db::get_product(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: Product::from(row),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// POST /api/v1/products — create a listing.
pub(super) async fn create_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    body: Result<Json<NewProduct>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Product>>), ApiError> {
    let rid = &req_id.0;
    let Json(body) = body.map_err(|e| ApiError::validation(rid, e.body_text()))?;
    let body = body
        .validated()
        .map_err(|e| ApiError::validation(rid, e.to_string()))?;

    let row = agrobridge_db::insert_product(&state.pool, body)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    tracing::info!(request_id = %rid, product_id = %row.id, brand = %row.brand, "product created");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data: Product::from(row),
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

/// PUT /api/v1/products/:id — replace a listing's seller-editable fields.
pub(super) async fn update_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(raw_id): Path<String>,
    body: Result<Json<NewProduct>, JsonRejection>,
) -> Result<Json<ApiResponse<Product>>, ApiError> {
    let rid = &req_id.0;
    let id = parse_product_id(rid, &raw_id)?;
    let Json(body) = body.map_err(|e| ApiError::validation(rid, e.body_text()))?;
    let body = body
        .validated()
        .map_err(|e| ApiError::validation(rid, e.to_string()))?;

    let row = agrobridge_db::update_product(&state.pool, id, body)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: Product::from(row),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// DELETE /api/v1/products/:id
pub(super) async fn delete_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(raw_id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let rid = &req_id.0;
    let id = parse_product_id(rid, &raw_id)?;

    agrobridge_db::delete_product(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    tracing::info!(request_id = %rid, product_id = %id, "product deleted");

    Ok(Json(ApiResponse {
        data: serde_json::json!({ "deleted": true }),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// GET /api/v1/sellers/:brand/products — a seller's listings, newest first.
pub(super) async fn list_seller_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(brand): Path<String>,
) -> Result<Json<ApiResponse<Vec<Product>>>, ApiError> {
    let rid = &req_id.0;
    let brand = brand.trim();
    if brand.is_empty() {
        return Err(ApiError::validation(rid, "brand must be non-empty"));
    }

    let rows = agrobridge_db::list_products_by_brand(&state.pool, brand)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: into_products(rows),
        meta: ResponseMeta::new(req_id.0),
    }))
}
