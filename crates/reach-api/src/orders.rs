//! `POST /orders`: record an order and refresh the customer's aggregates.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use reach_core::{customer::NewOrder, store::CrmStore};
use tracing::debug;

use crate::{AppState, JsonBody, error::ApiError};

pub async fn create<S: CrmStore>(
  State(state): State<AppState<S>>,
  JsonBody(body): JsonBody<NewOrder>,
) -> Result<impl IntoResponse, ApiError> {
  body.validate()?;
  let order = state.store.record_order(body).await.map_err(ApiError::store)?;
  debug!(order_id = %order.order_id, customer_id = %order.customer_id, "order recorded");
  Ok((StatusCode::CREATED, Json(order)))
}
