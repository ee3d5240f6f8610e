//! Product catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{Money, Page, ProductId, SortDirection};
use domain::{CreateProduct, UpdateProduct};
use serde::Deserialize;
use store::{Product, ProductQuery, ProductSortField, Store};

use super::page_request;
use crate::error::ApiError;
use crate::extract::RequestCaller;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub active: Option<bool>,
    pub min_price: Option<Money>,
    pub max_price: Option<Money>,
    #[serde(default)]
    pub sort: ProductSortField,
    #[serde(default)]
    pub direction: SortDirection,
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Deserialize)]
pub struct AdjustStockRequest {
    pub delta: i64,
}

/// GET /products — filtered, paginated listing.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestCaller(caller): RequestCaller,
    Query(params): Query<ListParams>,
) -> Result<Json<Page<Product>>, ApiError> {
    let query = ProductQuery {
        category: params.category,
        search: params.search,
        active: params.active,
        min_price: params.min_price,
        max_price: params.max_price,
        sort: params.sort,
        direction: params.direction,
        page: page_request(params.page, params.limit),
    };
    Ok(Json(state.catalog.list(&caller, query).await?))
}

/// POST /products — admin only.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestCaller(caller): RequestCaller,
    Json(req): Json<CreateProduct>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let product = state.catalog.create(&caller, req).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// GET /products/search?q= — name or description contains `q`.
#[tracing::instrument(skip(state))]
pub async fn search<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestCaller(caller): RequestCaller,
    Query(params): Query<SearchParams>,
) -> Result<Json<Page<Product>>, ApiError> {
    let page = page_request(params.page, params.limit);
    Ok(Json(state.catalog.search(&caller, &params.q, page).await?))
}

/// GET /products/category/{category}
#[tracing::instrument(skip(state))]
pub async fn by_category<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestCaller(caller): RequestCaller,
    Path(category): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<Json<Page<Product>>, ApiError> {
    let page = page_request(params.page, params.limit);
    Ok(Json(
        state.catalog.by_category(&caller, &category, page).await?,
    ))
}

/// GET /products/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<ProductId>,
) -> Result<Json<Product>, ApiError> {
    Ok(Json(state.catalog.get(id).await?))
}

/// PATCH /products/{id} — admin only.
#[tracing::instrument(skip(state, req))]
pub async fn update<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestCaller(caller): RequestCaller,
    Path(id): Path<ProductId>,
    Json(req): Json<UpdateProduct>,
) -> Result<Json<Product>, ApiError> {
    Ok(Json(state.catalog.update(&caller, id, req).await?))
}

/// DELETE /products/{id} — admin only; archives the product.
#[tracing::instrument(skip(state))]
pub async fn delete<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestCaller(caller): RequestCaller,
    Path(id): Path<ProductId>,
) -> Result<StatusCode, ApiError> {
    state.catalog.delete(&caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /products/{id}/stock — admin only; signed stock correction.
#[tracing::instrument(skip(state, req))]
pub async fn adjust_stock<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestCaller(caller): RequestCaller,
    Path(id): Path<ProductId>,
    Json(req): Json<AdjustStockRequest>,
) -> Result<Json<Product>, ApiError> {
    Ok(Json(
        state.catalog.adjust_stock(&caller, id, req.delta).await?,
    ))
}
