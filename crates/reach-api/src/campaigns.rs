//! Handlers for `/campaigns` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/campaigns` | Newest first |
//! | `POST` | `/campaigns` | Create and launch in one step |
//! | `POST` | `/campaigns/drafts` | Create without launching |
//! | `GET`  | `/campaigns/{id}` | 404 if not found |
//! | `POST` | `/campaigns/{id}/launch` | 409 unless the campaign is a draft |
//! | `GET`  | `/campaigns/{id}/logs` | Communication log, newest first |
//! | `POST` | `/campaigns/{id}/stats` | Recompute delivery aggregates |
//!
//! Launch responses return as soon as deliveries are scheduled; outcomes
//! arrive later through `/delivery-receipt`.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use reach_campaign::LaunchReport;
use reach_core::{
  campaign::{Campaign, CampaignStats, NewCampaign},
  message::CommunicationLog,
  store::CrmStore,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{AppState, JsonBody, error::ApiError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchResponse {
  pub campaign:        Campaign,
  pub messages_queued: usize,
}

impl From<LaunchReport> for LaunchResponse {
  fn from(report: LaunchReport) -> Self {
    Self { messages_queued: report.deliveries.len(), campaign: report.campaign }
  }
}

/// `GET /campaigns`
pub async fn list<S: CrmStore>(
  State(state): State<AppState<S>>,
) -> Result<Json<Vec<Campaign>>, ApiError> {
  let campaigns = state.store.list_campaigns().await.map_err(ApiError::store)?;
  Ok(Json(campaigns))
}

/// `POST /campaigns`
pub async fn create<S: CrmStore>(
  State(state): State<AppState<S>>,
  JsonBody(body): JsonBody<NewCampaign>,
) -> Result<impl IntoResponse, ApiError> {
  let report = state.dispatcher.create_and_launch(body).await?;
  Ok((StatusCode::CREATED, Json(LaunchResponse::from(report))))
}

/// `POST /campaigns/drafts`
pub async fn create_draft<S: CrmStore>(
  State(state): State<AppState<S>>,
  JsonBody(body): JsonBody<NewCampaign>,
) -> Result<impl IntoResponse, ApiError> {
  let campaign = state.dispatcher.create_draft(body).await?;
  Ok((StatusCode::CREATED, Json(campaign)))
}

/// `GET /campaigns/{id}`
pub async fn get_one<S: CrmStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Campaign>, ApiError> {
  let campaign = state
    .store
    .get_campaign(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("campaign {id} not found")))?;
  Ok(Json(campaign))
}

/// `POST /campaigns/{id}/launch`
pub async fn launch<S: CrmStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<LaunchResponse>, ApiError> {
  let report = state.dispatcher.launch(id).await?;
  Ok(Json(report.into()))
}

/// `GET /campaigns/{id}/logs`
pub async fn logs<S: CrmStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<CommunicationLog>>, ApiError> {
  if state.store.get_campaign(id).await.map_err(ApiError::store)?.is_none() {
    return Err(ApiError::NotFound(format!("campaign {id} not found")));
  }
  let logs = state.store.logs_for_campaign(id).await.map_err(ApiError::store)?;
  Ok(Json(logs))
}

/// `POST /campaigns/{id}/stats`
pub async fn stats<S: CrmStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<CampaignStats>, ApiError> {
  Ok(Json(state.reconciler.recompute(id).await?))
}
