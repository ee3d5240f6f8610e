//! Order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{Money, OrderId, OrderStatus, Page, SortDirection};
use domain::{OrderLineRequest, OrderStats, UpdateOrder};
use serde::Deserialize;
use store::{Order, OrderQuery, OrderSortField, Store};

use super::page_request;
use crate::error::ApiError;
use crate::extract::RequestCaller;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<OrderStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub min_total: Option<Money>,
    pub max_total: Option<Money>,
    #[serde(default)]
    pub sort: OrderSortField,
    #[serde(default)]
    pub direction: SortDirection,
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderLineRequest>,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

/// GET /orders — the caller's orders; admins see all.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestCaller(caller): RequestCaller,
    Query(params): Query<ListParams>,
) -> Result<Json<Page<Order>>, ApiError> {
    let query = OrderQuery {
        user_id: None,
        status: params.status,
        created_from: params.from,
        created_to: params.to,
        min_total: params.min_total,
        max_total: params.max_total,
        sort: params.sort,
        direction: params.direction,
        page: page_request(params.page, params.limit),
    };
    Ok(Json(state.orders.list(&caller, query).await?))
}

/// POST /orders — create an order from explicit lines.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestCaller(caller): RequestCaller,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state
        .orders
        .create_order(&caller, req.items, req.notes)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders/stats
#[tracing::instrument(skip(state))]
pub async fn stats<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestCaller(caller): RequestCaller,
) -> Result<Json<OrderStats>, ApiError> {
    Ok(Json(state.orders.stats(&caller).await?))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestCaller(caller): RequestCaller,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.orders.get(&caller, id).await?))
}

/// PATCH /orders/{id} — notes (owner or admin) and status (admin).
#[tracing::instrument(skip(state, req))]
pub async fn update<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestCaller(caller): RequestCaller,
    Path(id): Path<OrderId>,
    Json(req): Json<UpdateOrder>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.orders.update(&caller, id, req).await?))
}

/// POST /orders/{id}/cancel
#[tracing::instrument(skip(state))]
pub async fn cancel<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestCaller(caller): RequestCaller,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.orders.cancel(&caller, id).await?))
}

/// PUT /orders/{id}/status — admin only.
#[tracing::instrument(skip(state, req))]
pub async fn set_status<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestCaller(caller): RequestCaller,
    Path(id): Path<OrderId>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(
        state.orders.update_status(&caller, id, req.status).await?,
    ))
}
