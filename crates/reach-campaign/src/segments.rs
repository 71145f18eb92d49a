//! Segment management with live audience snapshots.

use std::sync::Arc;

use reach_core::{
  rule::{SegmentRule, normalize_rules, validate_rules},
  segment::{NewSegment, Segment, SegmentPatch},
  store::CrmStore,
};
use tracing::info;
use uuid::Uuid;

use crate::{AudienceSelector, Error, Result};

pub struct SegmentService<S> {
  store:    Arc<S>,
  audience: AudienceSelector<S>,
}

impl<S> Clone for SegmentService<S> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      audience: self.audience.clone(),
    }
  }
}

impl<S: CrmStore> SegmentService<S> {
  pub fn new(store: Arc<S>) -> Self {
    let audience = AudienceSelector::new(Arc::clone(&store));
    Self { store, audience }
  }

  /// Count the customers a rule chain selects right now, without saving it.
  pub async fn preview(&self, rules: Vec<SegmentRule>) -> Result<u64> {
    validate_rules(&rules)?;
    self.audience.count(&normalize_rules(rules)).await
  }

  pub async fn list(&self) -> Result<Vec<Segment>> {
    self.store.list_segments().await.map_err(Error::store)
  }

  pub async fn get(&self, id: Uuid) -> Result<Segment> {
    self
      .store
      .get_segment(id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| reach_core::Error::SegmentNotFound(id).into())
  }

  pub async fn create(&self, input: NewSegment) -> Result<Segment> {
    let input = input.normalized()?;
    let audience_size = self.audience.count(&input.rules).await?;
    let segment = self
      .store
      .create_segment(input, audience_size)
      .await
      .map_err(Error::store)?;
    info!(
      segment_id = %segment.segment_id,
      rules = segment.rules.len(),
      audience_size,
      "segment created"
    );
    Ok(segment)
  }

  /// Apply a patch. The audience snapshot is retaken only when the rules
  /// change.
  pub async fn update(&self, id: Uuid, patch: SegmentPatch) -> Result<Segment> {
    let patch = patch.normalized()?;
    let audience_size = match &patch.rules {
      Some(rules) => Some(self.audience.count(rules).await?),
      None => None,
    };
    self
      .store
      .update_segment(id, patch, audience_size)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| reach_core::Error::SegmentNotFound(id).into())
  }

  /// Delete a segment no campaign refers to.
  pub async fn delete(&self, id: Uuid) -> Result<()> {
    let campaigns = self.store.list_campaigns().await.map_err(Error::store)?;
    if campaigns.iter().any(|c| c.segment_id == id) {
      return Err(reach_core::Error::SegmentInUse(id).into());
    }
    if !self.store.delete_segment(id).await.map_err(Error::store)? {
      return Err(reach_core::Error::SegmentNotFound(id).into());
    }
    info!(segment_id = %id, "segment deleted");
    Ok(())
  }
}
