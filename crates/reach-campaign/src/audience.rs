//! Live audience resolution.

use std::sync::Arc;

use chrono::Utc;
use reach_core::{
  customer::Customer,
  rule::{SegmentRule, evaluate},
  store::CrmStore,
};

use crate::{Error, Result};

/// Evaluates rule chains against the store's current customer set.
///
/// Results are never cached: two calls with the same rules may differ if
/// customers changed in between.
pub struct AudienceSelector<S> {
  store: Arc<S>,
}

impl<S> Clone for AudienceSelector<S> {
  fn clone(&self) -> Self { Self { store: Arc::clone(&self.store) } }
}

impl<S: CrmStore> AudienceSelector<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  pub async fn count(&self, rules: &[SegmentRule]) -> Result<u64> {
    let predicate = evaluate(rules, Utc::now());
    self.store.count_customers(&predicate).await.map_err(Error::store)
  }

  pub async fn select(&self, rules: &[SegmentRule]) -> Result<Vec<Customer>> {
    let predicate = evaluate(rules, Utc::now());
    self.store.query_customers(&predicate).await.map_err(Error::store)
  }
}
