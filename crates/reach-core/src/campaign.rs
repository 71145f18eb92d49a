//! Campaigns, their status machine and derived delivery aggregates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::{
  Error, Result,
  message::{CommunicationLog, DeliveryStatus},
};

// ─── Channel ─────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Channel {
  Email,
  Sms,
  Push,
}

// ─── Status ──────────────────────────────────────────────────────────────────

/// `draft → active → completed | failed`.
///
/// A launched campaign stays `active` while any of its messages is still in
/// flight; the receipt reconciler completes it once every log is closed.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CampaignStatus {
  Draft,
  Active,
  Completed,
  Failed,
}

impl CampaignStatus {
  pub fn can_transition_to(self, next: CampaignStatus) -> bool {
    matches!(
      (self, next),
      (Self::Draft, Self::Active)
        | (Self::Active, Self::Completed)
        | (Self::Active, Self::Failed)
    )
  }

  pub fn transition_to(self, next: CampaignStatus) -> Result<CampaignStatus> {
    if self.can_transition_to(next) {
      Ok(next)
    } else {
      Err(Error::InvalidTransition { from: self, to: next })
    }
  }

  pub fn is_terminal(self) -> bool { matches!(self, Self::Completed | Self::Failed) }
}

// ─── Campaign ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
  pub campaign_id:     Uuid,
  pub name:            String,
  pub segment_id:      Uuid,
  /// Template with `{{firstName}}`-style placeholders.
  pub message:         String,
  pub channel:         Channel,
  pub status:          CampaignStatus,
  /// Audience resolved live at launch.
  pub audience_size:   u64,
  pub sent_count:      u64,
  pub delivered_count: u64,
  pub failed_count:    u64,
  /// Percentage of sent messages delivered, two decimal places.
  pub delivery_rate:   f64,
  pub launched_at:     Option<DateTime<Utc>>,
  pub completed_at:    Option<DateTime<Utc>>,
  pub created_at:      DateTime<Utc>,
  pub updated_at:      DateTime<Utc>,
}

/// Input to [`crate::store::CrmStore::create_campaign`]. New campaigns are
/// always drafts.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCampaign {
  pub name:       String,
  pub segment_id: Uuid,
  pub message:    String,
  pub channel:    Channel,
}

impl NewCampaign {
  pub fn validate(&self) -> Result<()> {
    if self.name.trim().is_empty() {
      return Err(Error::Validation("campaign name is required".into()));
    }
    if self.message.trim().is_empty() {
      return Err(Error::Validation("campaign message is required".into()));
    }
    Ok(())
  }
}

// ─── Aggregates ──────────────────────────────────────────────────────────────

/// Delivery aggregates, always derived from a full log snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignStats {
  /// Every attempt the campaign made, whatever its outcome.
  pub sent:          u64,
  pub delivered:     u64,
  pub failed:        u64,
  /// Attempts still waiting for a receipt.
  pub pending:       u64,
  pub delivery_rate: f64,
}

impl CampaignStats {
  pub fn from_logs<'a>(logs: impl IntoIterator<Item = &'a CommunicationLog>) -> Self {
    let mut stats = Self::default();
    for log in logs {
      stats.sent += 1;
      match log.status {
        DeliveryStatus::Sent => stats.pending += 1,
        DeliveryStatus::Delivered => stats.delivered += 1,
        DeliveryStatus::Failed => stats.failed += 1,
      }
    }
    stats.delivery_rate = delivery_rate(stats.delivered, stats.sent);
    stats
  }

  /// Whether every attempt has reached a terminal status.
  pub fn is_settled(&self) -> bool { self.pending == 0 }
}

/// `delivered / sent * 100`, rounded to two places; zero when nothing was sent.
pub fn delivery_rate(delivered: u64, sent: u64) -> f64 {
  if sent == 0 {
    return 0.0;
  }
  let rate = delivered as f64 / sent as f64 * 100.0;
  (rate * 100.0).round() / 100.0
}
