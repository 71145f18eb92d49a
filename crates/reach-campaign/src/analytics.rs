//! Dashboard figures.

use reach_core::{
  campaign::{CampaignStatus, delivery_rate},
  store::CrmStore,
};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
  pub total_customers:    u64,
  pub total_campaigns:    u64,
  pub active_campaigns:   u64,
  pub total_segments:     u64,
  /// Sum of every customer's lifetime spend.
  pub total_revenue:      Decimal,
  pub messages_sent:      u64,
  pub messages_delivered: u64,
  /// Delivered over sent across all campaigns, as a percentage.
  pub delivery_rate:      f64,
}

pub async fn overview<S: CrmStore>(store: &S) -> Result<Overview> {
  let customers = store.list_customers().await.map_err(Error::store)?;
  let campaigns = store.list_campaigns().await.map_err(Error::store)?;
  let segments = store.list_segments().await.map_err(Error::store)?;

  let sent: u64 = campaigns.iter().map(|c| c.sent_count).sum();
  let delivered: u64 = campaigns.iter().map(|c| c.delivered_count).sum();

  Ok(Overview {
    total_customers:    customers.len() as u64,
    total_campaigns:    campaigns.len() as u64,
    active_campaigns:   campaigns
      .iter()
      .filter(|c| c.status == CampaignStatus::Active)
      .count() as u64,
    total_segments:     segments.len() as u64,
    total_revenue:      customers
      .iter()
      .fold(Decimal::ZERO, |acc, c| acc.saturating_add(c.total_spend)),
    messages_sent:      sent,
    messages_delivered: delivered,
    delivery_rate:      delivery_rate(delivered, sent),
  })
}
