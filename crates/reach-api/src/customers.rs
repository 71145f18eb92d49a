//! Handlers for `/customers` endpoints.
//!
//! | Method  | Path | Notes |
//! |---------|------|-------|
//! | `GET`   | `/customers` | Newest first |
//! | `POST`  | `/customers` | 409 on a duplicate email |
//! | `GET`   | `/customers/{id}` | 404 if not found |
//! | `PATCH` | `/customers/{id}` | Identity fields only |
//! | `GET`   | `/customers/{id}/orders` | Newest first |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use reach_core::{
  customer::{Customer, CustomerPatch, NewCustomer, Order},
  store::CrmStore,
};
use uuid::Uuid;

use crate::{AppState, JsonBody, error::ApiError};

/// `GET /customers`
pub async fn list<S: CrmStore>(
  State(state): State<AppState<S>>,
) -> Result<Json<Vec<Customer>>, ApiError> {
  let customers = state.store.list_customers().await.map_err(ApiError::store)?;
  Ok(Json(customers))
}

/// `POST /customers`
pub async fn create<S: CrmStore>(
  State(state): State<AppState<S>>,
  JsonBody(body): JsonBody<NewCustomer>,
) -> Result<impl IntoResponse, ApiError> {
  body.validate()?;
  let customer = state.store.create_customer(body).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(customer)))
}

/// `GET /customers/{id}`
pub async fn get_one<S: CrmStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Customer>, ApiError> {
  let customer = state
    .store
    .get_customer(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("customer {id} not found")))?;
  Ok(Json(customer))
}

/// `PATCH /customers/{id}`
pub async fn update<S: CrmStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
  JsonBody(patch): JsonBody<CustomerPatch>,
) -> Result<Json<Customer>, ApiError> {
  if patch.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
    return Err(ApiError::BadRequest("customer name must not be empty".into()));
  }
  let customer = state
    .store
    .update_customer(id, patch)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(customer))
}

/// `GET /customers/{id}/orders`
pub async fn orders<S: CrmStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<Order>>, ApiError> {
  if state.store.get_customer(id).await.map_err(ApiError::store)?.is_none() {
    return Err(ApiError::NotFound(format!("customer {id} not found")));
  }
  let orders = state.store.orders_for_customer(id).await.map_err(ApiError::store)?;
  Ok(Json(orders))
}
