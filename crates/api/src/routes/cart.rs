//! Cart endpoints. The cart belongs to the bearer token's user, or to the
//! `X-Session-Id` guest when no token is sent.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{CartItemId, ProductId};
use domain::{CartDetails, CartSummary, CartValidation};
use serde::Deserialize;
use store::{Order, Store};

use crate::error::ApiError;
use crate::extract::RequestCaller;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: u32,
}

#[derive(Deserialize, Default)]
pub struct CheckoutRequest {
    pub notes: Option<String>,
}

/// GET /cart — the caller's cart, created on first use.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestCaller(caller): RequestCaller,
) -> Result<Json<CartDetails>, ApiError> {
    Ok(Json(state.carts.get_or_create(&caller).await?))
}

/// DELETE /cart — remove every line.
#[tracing::instrument(skip(state))]
pub async fn clear<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestCaller(caller): RequestCaller,
) -> Result<StatusCode, ApiError> {
    state.carts.clear(&caller).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /cart/summary
#[tracing::instrument(skip(state))]
pub async fn summary<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestCaller(caller): RequestCaller,
) -> Result<Json<CartSummary>, ApiError> {
    Ok(Json(state.carts.summary(&caller).await?))
}

/// GET /cart/validate
#[tracing::instrument(skip(state))]
pub async fn validate<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestCaller(caller): RequestCaller,
) -> Result<Json<CartValidation>, ApiError> {
    Ok(Json(state.carts.validate(&caller).await?))
}

/// POST /cart/items
#[tracing::instrument(skip(state, req))]
pub async fn add_item<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestCaller(caller): RequestCaller,
    Json(req): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<CartDetails>), ApiError> {
    let cart = state
        .carts
        .add_item(&caller, req.product_id, req.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(cart)))
}

/// PATCH /cart/items/{id}
#[tracing::instrument(skip(state, req))]
pub async fn update_item<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestCaller(caller): RequestCaller,
    Path(id): Path<CartItemId>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<CartDetails>, ApiError> {
    Ok(Json(
        state
            .carts
            .update_item_quantity(&caller, id, req.quantity)
            .await?,
    ))
}

/// DELETE /cart/items/{id}
#[tracing::instrument(skip(state))]
pub async fn remove_item<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestCaller(caller): RequestCaller,
    Path(id): Path<CartItemId>,
) -> Result<Json<CartDetails>, ApiError> {
    Ok(Json(state.carts.remove_item(&caller, id).await?))
}

/// POST /cart/merge — fold the `X-Session-Id` guest cart into the user's.
#[tracing::instrument(skip(state))]
pub async fn merge<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestCaller(caller): RequestCaller,
) -> Result<Json<CartDetails>, ApiError> {
    Ok(Json(state.carts.merge(&caller).await?))
}

/// POST /cart/checkout — turn the cart into an order.
#[tracing::instrument(skip(state, req))]
pub async fn checkout<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestCaller(caller): RequestCaller,
    req: Option<Json<CheckoutRequest>>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let Json(req) = req.unwrap_or_default();
    let order = state.orders.checkout(&caller, req.notes).await?;
    Ok((StatusCode::CREATED, Json(order)))
}
