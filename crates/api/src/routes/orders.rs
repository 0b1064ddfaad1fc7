//! Order placement, administration and query endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{Money, Order, OrderId, OrderStatus, PaymentMethod, ProductId, UserId, VariantId};
use domain::{CartLine, CreateOrder, OrderAction};
use serde::Deserialize;
use store::FulfillmentStore;

use crate::AppState;
use crate::auth::Caller;
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub customer_name: String,
    pub customer_phone: String,
    pub shipping_address: String,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub note: Option<String>,
    /// Client-computed total including shipping.
    pub total_amount: Money,
    pub items: Vec<CartItemRequest>,
}

#[derive(Debug, Deserialize)]
pub struct CartItemRequest {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub quantity: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusFilter {
    pub status: Option<String>,
}

impl StatusFilter {
    fn status(&self) -> Result<Option<OrderStatus>, ApiError> {
        self.status
            .as_deref()
            .filter(|status| !status.trim().is_empty())
            .map(|status| {
                status
                    .parse()
                    .map_err(|e: common::ParseEnumError| ApiError::BadRequest(e.to_string()))
            })
            .transpose()
    }
}

impl CreateOrderRequest {
    fn into_command(self, user_id: UserId) -> CreateOrder {
        CreateOrder {
            user_id,
            customer_name: self.customer_name,
            customer_phone: self.customer_phone,
            shipping_address: self.shipping_address,
            payment_method: self.payment_method,
            note: self.note,
            declared_total: self.total_amount,
            lines: self
                .items
                .into_iter()
                .map(|item| CartLine::new(item.product_id, item.variant_id, item.quantity))
                .collect(),
        }
    }
}

// -- Handlers --

/// POST /orders — place an order for the caller.
#[tracing::instrument(skip(state, req), fields(user_id = %caller.user_id))]
pub async fn create<S: FulfillmentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state
        .orders
        .create_order(req.into_command(caller.user_id))
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders — every order, newest first (admin).
#[tracing::instrument(skip(state))]
pub async fn list<S: FulfillmentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Query(filter): Query<StatusFilter>,
) -> Result<Json<Vec<Order>>, ApiError> {
    caller.require_admin()?;
    let orders = state.orders.list_orders(filter.status()?).await?;
    Ok(Json(orders))
}

/// GET /orders/{id} — one order; customers only see their own.
#[tracing::instrument(skip(state))]
pub async fn get<S: FulfillmentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>, ApiError> {
    let order = if caller.is_admin() {
        state.orders.get_order(id).await?
    } else {
        state.orders.get_order_for_user(id, caller.user_id).await?
    };
    Ok(Json(order))
}

/// GET /users/me/orders — the caller's orders.
#[tracing::instrument(skip(state))]
pub async fn list_mine<S: FulfillmentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Query(filter): Query<StatusFilter>,
) -> Result<Json<Vec<Order>>, ApiError> {
    orders_of(&state, caller.user_id, &filter).await.map(Json)
}

/// GET /users/{user_id}/orders — any user's orders (admin).
#[tracing::instrument(skip(state))]
pub async fn list_for_user<S: FulfillmentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(user_id): Path<UserId>,
    Query(filter): Query<StatusFilter>,
) -> Result<Json<Vec<Order>>, ApiError> {
    caller.require_admin()?;
    orders_of(&state, user_id, &filter).await.map(Json)
}

async fn orders_of<S: FulfillmentStore + Clone + 'static>(
    state: &AppState<S>,
    user_id: UserId,
    filter: &StatusFilter,
) -> Result<Vec<Order>, ApiError> {
    let orders = match filter.status()? {
        Some(status) => {
            state
                .orders
                .list_orders_for_user_by_status(user_id, status)
                .await?
        }
        None => state.orders.list_orders_for_user(user_id).await?,
    };
    Ok(orders)
}

/// PATCH /orders/{id}/process
pub async fn process<S: FulfillmentStore + Clone + 'static>(
    state: State<Arc<AppState<S>>>,
    caller: Caller,
    id: Path<OrderId>,
) -> Result<Json<Order>, ApiError> {
    transition(state, caller, id, OrderAction::Process).await
}

/// PATCH /orders/{id}/ship
pub async fn ship<S: FulfillmentStore + Clone + 'static>(
    state: State<Arc<AppState<S>>>,
    caller: Caller,
    id: Path<OrderId>,
) -> Result<Json<Order>, ApiError> {
    transition(state, caller, id, OrderAction::Ship).await
}

/// PATCH /orders/{id}/deliver
pub async fn deliver<S: FulfillmentStore + Clone + 'static>(
    state: State<Arc<AppState<S>>>,
    caller: Caller,
    id: Path<OrderId>,
) -> Result<Json<Order>, ApiError> {
    transition(state, caller, id, OrderAction::Deliver).await
}

/// PATCH /orders/{id}/cancel
pub async fn cancel<S: FulfillmentStore + Clone + 'static>(
    state: State<Arc<AppState<S>>>,
    caller: Caller,
    id: Path<OrderId>,
) -> Result<Json<Order>, ApiError> {
    transition(state, caller, id, OrderAction::Cancel).await
}

#[tracing::instrument(skip(state))]
async fn transition<S: FulfillmentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<OrderId>,
    action: OrderAction,
) -> Result<Json<Order>, ApiError> {
    caller.require_admin()?;
    let order = state
        .orders
        .transition_order(id, action, caller.actor())
        .await?;
    Ok(Json(order))
}

/// PATCH /orders/{id}/confirm-delivery — the owner confirms receipt.
#[tracing::instrument(skip(state))]
pub async fn confirm_delivery<S: FulfillmentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>, ApiError> {
    let order = state.orders.confirm_delivery(id, caller.user_id).await?;
    Ok(Json(order))
}
