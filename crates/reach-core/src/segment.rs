//! Segments: named, reusable audience definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  rule::{SegmentRule, normalize_rules, validate_rules},
};

/// A stored rule chain.
///
/// `audience_size` is a snapshot taken when the rules were last written; it
/// goes stale as customers change. Live counts come from the audience
/// selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
  pub segment_id:    Uuid,
  pub name:          String,
  pub description:   Option<String>,
  pub rules:         Vec<SegmentRule>,
  pub audience_size: u64,
  pub created_at:    DateTime<Utc>,
  pub updated_at:    DateTime<Utc>,
}

/// Input to [`crate::store::CrmStore::create_segment`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSegment {
  pub name:        String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub rules:       Vec<SegmentRule>,
}

impl NewSegment {
  /// Validate, then clear the first rule's logic tag.
  pub fn normalized(self) -> Result<Self> {
    if self.name.trim().is_empty() {
      return Err(Error::Validation("segment name is required".into()));
    }
    validate_rules(&self.rules)?;
    Ok(Self { rules: normalize_rules(self.rules), ..self })
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentPatch {
  pub name:        Option<String>,
  pub description: Option<String>,
  pub rules:       Option<Vec<SegmentRule>>,
}

impl SegmentPatch {
  pub fn normalized(self) -> Result<Self> {
    if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
      return Err(Error::Validation("segment name must not be empty".into()));
    }
    let rules = match self.rules {
      Some(rules) => {
        validate_rules(&rules)?;
        Some(normalize_rules(rules))
      }
      None => None,
    };
    Ok(Self { rules, ..self })
  }
}
