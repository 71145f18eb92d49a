//! `GET /analytics/overview`

use axum::{Json, extract::State};
use reach_campaign::analytics::{self, Overview};
use reach_core::store::CrmStore;

use crate::{AppState, error::ApiError};

pub async fn overview<S: CrmStore>(
  State(state): State<AppState<S>>,
) -> Result<Json<Overview>, ApiError> {
  Ok(Json(analytics::overview(state.store.as_ref()).await?))
}
