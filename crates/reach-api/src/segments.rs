//! Handlers for `/segments` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/segments` | Newest first |
//! | `POST`   | `/segments` | Stores an audience-size snapshot |
//! | `POST`   | `/segments/preview` | Body: `{"rules":[...]}`; live count, nothing stored |
//! | `GET`    | `/segments/{id}` | 404 if not found |
//! | `PATCH`  | `/segments/{id}` | Snapshot retaken when rules change |
//! | `DELETE` | `/segments/{id}` | 409 while a campaign uses it |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use reach_core::{
  rule::SegmentRule,
  segment::{NewSegment, Segment, SegmentPatch},
  store::CrmStore,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, JsonBody, error::ApiError};

/// `GET /segments`
pub async fn list<S: CrmStore>(
  State(state): State<AppState<S>>,
) -> Result<Json<Vec<Segment>>, ApiError> {
  Ok(Json(state.segments.list().await?))
}

/// `POST /segments`
pub async fn create<S: CrmStore>(
  State(state): State<AppState<S>>,
  JsonBody(body): JsonBody<NewSegment>,
) -> Result<impl IntoResponse, ApiError> {
  let segment = state.segments.create(body).await?;
  Ok((StatusCode::CREATED, Json(segment)))
}

// ─── Preview ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PreviewBody {
  #[serde(default)]
  pub rules: Vec<SegmentRule>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
  pub audience_size: u64,
}

/// `POST /segments/preview`
pub async fn preview<S: CrmStore>(
  State(state): State<AppState<S>>,
  JsonBody(body): JsonBody<PreviewBody>,
) -> Result<Json<PreviewResponse>, ApiError> {
  let audience_size = state.segments.preview(body.rules).await?;
  Ok(Json(PreviewResponse { audience_size }))
}

// ─── By id ───────────────────────────────────────────────────────────────────

/// `GET /segments/{id}`
pub async fn get_one<S: CrmStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Segment>, ApiError> {
  Ok(Json(state.segments.get(id).await?))
}

/// `PATCH /segments/{id}`
pub async fn update<S: CrmStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
  JsonBody(patch): JsonBody<SegmentPatch>,
) -> Result<Json<Segment>, ApiError> {
  Ok(Json(state.segments.update(id, patch).await?))
}

/// `DELETE /segments/{id}`
pub async fn delete<S: CrmStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
  state.segments.delete(id).await?;
  Ok(StatusCode::NO_CONTENT)
}
