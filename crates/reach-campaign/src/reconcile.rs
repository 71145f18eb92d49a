//! Delivery receipt reconciliation.
//!
//! A receipt closes one communication log row and then triggers a full
//! recompute of the owning campaign's aggregates from a fresh snapshot of its
//! log. Aggregates are never incremented, so duplicate or reordered receipts
//! cannot skew them.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use reach_core::{
  campaign::{CampaignStats, CampaignStatus},
  message::DeliveryReceipt,
  store::CrmStore,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{Error, Result, delivery::ReceiptSink};

pub struct Reconciler<S> {
  store: Arc<S>,
  /// Serialises recomputes per campaign.
  locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl<S> Clone for Reconciler<S> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      locks: Arc::clone(&self.locks),
    }
  }
}

impl<S: CrmStore> Reconciler<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self { store, locks: Arc::new(DashMap::new()) }
  }

  /// Apply one receipt.
  ///
  /// Returns the campaign's recomputed aggregates, or `None` when the
  /// message id is unknown. A `SENT` receipt, or one for a log that is
  /// already closed, changes no log but still recomputes.
  pub async fn reconcile(&self, receipt: &DeliveryReceipt) -> Result<Option<CampaignStats>> {
    let Some(log) = self
      .store
      .log_by_message_id(receipt.message_id)
      .await
      .map_err(Error::store)?
    else {
      warn!(message_id = %receipt.message_id, "receipt for unknown message");
      return Ok(None);
    };

    if receipt.status.is_terminal() {
      let closed = self
        .store
        .close_log(
          receipt.message_id,
          receipt.status,
          receipt.error_reason.clone(),
          Utc::now(),
        )
        .await
        .map_err(Error::store)?;
      match closed {
        Some(_) => debug!(message_id = %receipt.message_id, status = %receipt.status, "log closed"),
        None => debug!(
          message_id = %receipt.message_id,
          current = %log.status,
          "log already closed, receipt ignored"
        ),
      }
    }

    self.recompute(log.campaign_id).await.map(Some)
  }

  /// Rebuild a campaign's aggregates from its full log and write them in one
  /// update. An active campaign whose every attempt has settled is completed
  /// by the same write.
  pub async fn recompute(&self, campaign_id: Uuid) -> Result<CampaignStats> {
    let lock = Arc::clone(self.locks.entry(campaign_id).or_default().value());
    let _guard = lock.lock().await;

    let logs = self
      .store
      .logs_for_campaign(campaign_id)
      .await
      .map_err(Error::store)?;
    let stats = CampaignStats::from_logs(&logs);

    // A campaign with no attempts yet is still being dispatched.
    let complete_at = (stats.sent > 0 && stats.is_settled()).then(Utc::now);

    let campaign = self
      .store
      .write_campaign_stats(campaign_id, stats, complete_at)
      .await
      .map_err(Error::store)?
      .ok_or(reach_core::Error::CampaignNotFound(campaign_id))?;

    if complete_at.is_some() && campaign.status == CampaignStatus::Completed {
      info!(
        campaign_id = %campaign_id,
        sent = stats.sent,
        delivered = stats.delivered,
        failed = stats.failed,
        "campaign completed"
      );
    } else {
      debug!(campaign_id = %campaign_id, pending = stats.pending, "campaign aggregates updated");
    }

    Ok(stats)
  }
}

/// Receipts reported in-process, without a round trip through the API.
#[async_trait]
impl<S: CrmStore + 'static> ReceiptSink for Reconciler<S> {
  async fn report(&self, receipt: &DeliveryReceipt) -> Result<()> {
    self.reconcile(receipt).await.map(|_| ())
  }
}
