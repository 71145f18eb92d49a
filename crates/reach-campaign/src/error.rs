//! Error type for `reach-campaign`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] reach_core::Error),

  /// The storage backend failed; the concrete error is type-erased because
  /// this crate is generic over the backend.
  #[error("store error: {0}")]
  Store(Box<dyn std::error::Error + Send + Sync>),

  #[error("receipt could not be reported: {0}")]
  Receipt(String),

  #[error("rule generator failed: {0}")]
  RuleGenerator(String),
}

impl Error {
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
