//! API error type and [`axum::response::IntoResponse`] implementation.

use std::error::Error as StdError;

use axum::{
  Json,
  extract::rejection::JsonRejection,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  /// An upstream service (the rule generator) failed.
  #[error("upstream error: {0}")]
  Upstream(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn StdError + Send + Sync>),
}

impl ApiError {
  /// Classify a backend error.
  ///
  /// Backends wrap domain failures (duplicate email, unknown customer, ...)
  /// in their own error types, so the source chain is searched for a
  /// [`reach_core::Error`] before falling back to a 500.
  pub fn store(e: impl StdError + Send + Sync + 'static) -> Self { Self::from_boxed(Box::new(e)) }

  fn from_boxed(e: Box<dyn StdError + Send + Sync>) -> Self {
    let mut cursor: Option<&(dyn StdError + 'static)> = Some(&*e);
    while let Some(err) = cursor {
      if let Some(core) = err.downcast_ref::<reach_core::Error>()
        && let Some(classified) = Self::classify(core)
      {
        return classified;
      }
      cursor = err.source();
    }
    Self::Store(e)
  }

  fn classify(e: &reach_core::Error) -> Option<Self> {
    use reach_core::Error as E;
    let message = e.to_string();
    match e {
      E::CustomerNotFound(_) | E::SegmentNotFound(_) | E::CampaignNotFound(_) => {
        Some(Self::NotFound(message))
      }
      E::DuplicateEmail(_) | E::SegmentInUse(_) | E::InvalidTransition { .. } => {
        Some(Self::Conflict(message))
      }
      E::InvalidRule { .. } | E::Validation(_) | E::UnknownChannel(_) | E::UnknownStatus(_) => {
        Some(Self::BadRequest(message))
      }
      E::Serialization(_) => None,
    }
  }
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

impl From<reach_core::Error> for ApiError {
  fn from(e: reach_core::Error) -> Self { Self::store(e) }
}

impl From<reach_campaign::Error> for ApiError {
  fn from(e: reach_campaign::Error) -> Self {
    match e {
      reach_campaign::Error::Core(e) => e.into(),
      reach_campaign::Error::Store(e) => Self::from_boxed(e),
      reach_campaign::Error::RuleGenerator(m) | reach_campaign::Error::Receipt(m) => {
        Self::Upstream(m)
      }
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Upstream(m) => (StatusCode::BAD_GATEWAY, m.clone()),
      ApiError::Store(e) => {
        tracing::error!(error = %e, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
