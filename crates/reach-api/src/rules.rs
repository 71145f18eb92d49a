//! `POST /ai/segments` — body: `{"query":"..."}`, answers `{"rules":[...]}`.

use axum::{Json, extract::State};
use reach_campaign::rulegen::suggest_rules;
use reach_core::{rule::SegmentRule, store::CrmStore};
use serde::{Deserialize, Serialize};

use crate::{AppState, JsonBody, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct GenerateBody {
  pub query: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
  pub rules: Vec<SegmentRule>,
}

pub async fn generate<S: CrmStore>(
  State(state): State<AppState<S>>,
  JsonBody(body): JsonBody<GenerateBody>,
) -> Result<Json<GenerateResponse>, ApiError> {
  let rules = suggest_rules(state.rules.as_ref(), &body.query).await?;
  Ok(Json(GenerateResponse { rules }))
}
