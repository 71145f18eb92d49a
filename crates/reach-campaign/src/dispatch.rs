//! Campaign launch.
//!
//! Launching resolves the audience live, activates the campaign, writes one
//! `SENT` log row per recipient and hands the deliveries to the
//! [`DeliveryQueue`]. It returns as soon as the deliveries are scheduled; the
//! campaign stays `active` until the [`crate::Reconciler`] sees every attempt
//! settle.

use std::sync::Arc;

use chrono::Utc;
use reach_core::{
  campaign::{Campaign, CampaignStatus, NewCampaign},
  message::{CommunicationLog, NewLog, render_message},
  store::CrmStore,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
  AudienceSelector, Error, Result,
  delivery::{DeliveryHandle, DeliveryJob, DeliveryQueue},
};

/// What a launch produced.
pub struct LaunchReport {
  /// The campaign as written by the launch: `active`, or `completed` when
  /// the audience was empty.
  pub campaign:   Campaign,
  pub logs:       Vec<CommunicationLog>,
  /// One handle per log row, in the same order. Dropping them is fine.
  pub deliveries: Vec<DeliveryHandle>,
}

pub struct Dispatcher<S> {
  store:    Arc<S>,
  audience: AudienceSelector<S>,
  queue:    DeliveryQueue,
}

impl<S> Clone for Dispatcher<S> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      audience: self.audience.clone(),
      queue:    self.queue.clone(),
    }
  }
}

impl<S: CrmStore> Dispatcher<S> {
  pub fn new(store: Arc<S>, queue: DeliveryQueue) -> Self {
    let audience = AudienceSelector::new(Arc::clone(&store));
    Self { store, audience, queue }
  }

  /// Validate and persist a draft without launching it.
  pub async fn create_draft(&self, input: NewCampaign) -> Result<Campaign> {
    input.validate()?;
    self
      .store
      .get_segment(input.segment_id)
      .await
      .map_err(Error::store)?
      .ok_or(reach_core::Error::SegmentNotFound(input.segment_id))?;

    let campaign = self.store.create_campaign(input).await.map_err(Error::store)?;
    info!(campaign_id = %campaign.campaign_id, name = %campaign.name, "campaign drafted");
    Ok(campaign)
  }

  /// Draft and launch in one call.
  ///
  /// The draft is written first and is not removed if the launch fails; it
  /// stays listed in the `draft` state and can be launched again by id.
  pub async fn create_and_launch(&self, input: NewCampaign) -> Result<LaunchReport> {
    let draft = self.create_draft(input).await?;
    self.launch(draft.campaign_id).await.inspect_err(|e| {
      warn!(campaign_id = %draft.campaign_id, error = %e, "launch failed, draft kept");
    })
  }

  /// Launch a draft campaign.
  ///
  /// Nothing is written until the audience has been resolved. If the log
  /// rows cannot be written after activation the campaign is marked
  /// `failed` and the error returned.
  pub async fn launch(&self, campaign_id: Uuid) -> Result<LaunchReport> {
    let campaign = self.campaign(campaign_id).await?;
    campaign.status.transition_to(CampaignStatus::Active)?;

    let segment = self
      .store
      .get_segment(campaign.segment_id)
      .await
      .map_err(Error::store)?
      .ok_or(reach_core::Error::SegmentNotFound(campaign.segment_id))?;

    let audience = self.audience.select(&segment.rules).await?;
    let launched_at = Utc::now();

    let Some(campaign) = self
      .store
      .activate_campaign(campaign_id, audience.len() as u64, launched_at)
      .await
      .map_err(Error::store)?
    else {
      // Someone else launched it between our read and write.
      let current = self.campaign(campaign_id).await?;
      return Err(
        reach_core::Error::InvalidTransition {
          from: current.status,
          to:   CampaignStatus::Active,
        }
        .into(),
      );
    };

    info!(
      campaign_id = %campaign_id,
      segment_id = %segment.segment_id,
      audience = audience.len(),
      channel = %campaign.channel,
      "campaign launched"
    );

    if audience.is_empty() {
      let campaign = self
        .store
        .finish_campaign(campaign_id, CampaignStatus::Completed, launched_at)
        .await
        .map_err(Error::store)?
        .unwrap_or(campaign);
      info!(campaign_id = %campaign_id, "empty audience, campaign completed");
      return Ok(LaunchReport { campaign, logs: Vec::new(), deliveries: Vec::new() });
    }

    let (new_logs, jobs): (Vec<_>, Vec<_>) = audience
      .into_iter()
      .map(|customer| {
        let message_id = Uuid::new_v4();
        let message = render_message(&campaign.message, &customer);
        let log = NewLog {
          message_id,
          campaign_id,
          customer_id: customer.customer_id,
          channel: campaign.channel,
          message: message.clone(),
        };
        let job = DeliveryJob { message_id, customer, message, channel: campaign.channel };
        (log, job)
      })
      .unzip();

    let logs = match self.store.create_logs(new_logs).await {
      Ok(logs) => logs,
      Err(e) => {
        error!(campaign_id = %campaign_id, error = %e, "could not write communication log");
        if let Err(e) = self
          .store
          .finish_campaign(campaign_id, CampaignStatus::Failed, Utc::now())
          .await
        {
          error!(campaign_id = %campaign_id, error = %e, "could not mark campaign failed");
        }
        return Err(Error::store(e));
      }
    };

    let deliveries = if jobs.len() > self.queue.settings().batch_threshold {
      info!(campaign_id = %campaign_id, jobs = jobs.len(), "delivering in batches");
      self.queue.enqueue_batched(jobs)
    } else {
      jobs.into_iter().map(|job| self.queue.enqueue(job)).collect()
    };

    Ok(LaunchReport { campaign, logs, deliveries })
  }

  async fn campaign(&self, id: Uuid) -> Result<Campaign> {
    self
      .store
      .get_campaign(id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| reach_core::Error::CampaignNotFound(id).into())
  }
}
