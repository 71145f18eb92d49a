//! `POST /delivery-receipt`, the vendor webhook.
//!
//! Body: `{"messageId":"...","status":"DELIVERED"|"FAILED","errorReason":"..."}`.
//! Receipts are idempotent: unknown ids and repeats are acknowledged without
//! changing anything.

use axum::{Json, extract::State};
use reach_core::{message::DeliveryReceipt, store::CrmStore};
use serde::Serialize;

use crate::{AppState, JsonBody, error::ApiError};

#[derive(Debug, Serialize)]
pub struct ReceiptAck {
  /// Whether the message id belonged to a known log entry.
  pub matched: bool,
}

pub async fn receive<S: CrmStore>(
  State(state): State<AppState<S>>,
  JsonBody(receipt): JsonBody<DeliveryReceipt>,
) -> Result<Json<ReceiptAck>, ApiError> {
  let stats = state.reconciler.reconcile(&receipt).await?;
  Ok(Json(ReceiptAck { matched: stats.is_some() }))
}
