//! Error types for `reach-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::campaign::CampaignStatus;

#[derive(Debug, Error)]
pub enum Error {
  #[error("customer not found: {0}")]
  CustomerNotFound(Uuid),

  #[error("segment not found: {0}")]
  SegmentNotFound(Uuid),

  #[error("campaign not found: {0}")]
  CampaignNotFound(Uuid),

  #[error("segment {0} is still used by a campaign")]
  SegmentInUse(Uuid),

  #[error("a customer with email {0:?} already exists")]
  DuplicateEmail(String),

  #[error("rule {index} is invalid: {reason}")]
  InvalidRule { index: usize, reason: String },

  #[error("validation failed: {0}")]
  Validation(String),

  #[error("campaign cannot move from {from} to {to}")]
  InvalidTransition {
    from: CampaignStatus,
    to:   CampaignStatus,
  },

  #[error("unknown channel: {0:?}")]
  UnknownChannel(String),

  #[error("unknown delivery status: {0:?}")]
  UnknownStatus(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
