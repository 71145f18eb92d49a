//! [`MemoryStore`], the in-memory implementation of [`CrmStore`].

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use reach_core::{
  Error, Result,
  campaign::{Campaign, CampaignStats, CampaignStatus, NewCampaign},
  customer::{Customer, CustomerPatch, NewCustomer, NewOrder, Order, OrderTotals},
  message::{CommunicationLog, DeliveryStatus, NewLog},
  rule::Predicate,
  segment::{NewSegment, Segment, SegmentPatch},
  store::CrmStore,
};

// ─── Tables ──────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Tables {
  customers: HashMap<Uuid, Customer>,
  orders:    HashMap<Uuid, Vec<Order>>,
  segments:  HashMap<Uuid, Segment>,
  campaigns: HashMap<Uuid, Campaign>,
  /// Keyed by message id.
  logs:      HashMap<Uuid, CommunicationLog>,
}

fn newest_first<T>(
  rows: impl Iterator<Item = T>,
  created_at: impl Fn(&T) -> DateTime<Utc>,
) -> Vec<T> {
  let mut rows: Vec<T> = rows.collect();
  rows.sort_by_key(|row| std::cmp::Reverse(created_at(row)));
  rows
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Reach store held entirely in memory.
///
/// Clones share the same tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
  tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  /// Insert a fully-formed customer record as-is, aggregates included.
  /// Used to seed fixtures whose visit history predates the store.
  pub fn seed_customer(&self, customer: Customer) {
    self.tables.write().customers.insert(customer.customer_id, customer);
  }

  /// Drop every row.
  pub fn reset(&self) { *self.tables.write() = Tables::default(); }
}

impl CrmStore for MemoryStore {
  type Error = Error;

  // ── Customers ─────────────────────────────────────────────────────────────

  async fn create_customer(&self, input: NewCustomer) -> Result<Customer> {
    let mut tables = self.tables.write();
    if tables.customers.values().any(|c| c.email == input.email) {
      return Err(Error::DuplicateEmail(input.email));
    }

    let now = Utc::now();
    let customer = Customer {
      customer_id:       Uuid::new_v4(),
      external_ref:      input.external_ref,
      name:              input.name,
      email:             input.email,
      phone:             input.phone,
      total_spend:       Default::default(),
      visit_count:       0,
      last_visit:        None,
      registration_date: input.registration_date.unwrap_or(now),
      created_at:        now,
      updated_at:        now,
    };
    tables.customers.insert(customer.customer_id, customer.clone());
    Ok(customer)
  }

  async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>> {
    Ok(self.tables.read().customers.get(&id).cloned())
  }

  async fn customer_by_email(&self, email: &str) -> Result<Option<Customer>> {
    let tables = self.tables.read();
    Ok(tables.customers.values().find(|c| c.email == email).cloned())
  }

  async fn list_customers(&self) -> Result<Vec<Customer>> {
    let tables = self.tables.read();
    Ok(newest_first(tables.customers.values().cloned(), |c| c.created_at))
  }

  async fn update_customer(&self, id: Uuid, patch: CustomerPatch) -> Result<Customer> {
    let mut tables = self.tables.write();
    let customer = tables
      .customers
      .get_mut(&id)
      .ok_or(Error::CustomerNotFound(id))?;

    if let Some(name) = patch.name {
      customer.name = name;
    }
    if let Some(phone) = patch.phone {
      customer.phone = Some(phone);
    }
    if let Some(external_ref) = patch.external_ref {
      customer.external_ref = Some(external_ref);
    }
    customer.updated_at = Utc::now();
    Ok(customer.clone())
  }

  async fn query_customers(&self, predicate: &Predicate) -> Result<Vec<Customer>> {
    let tables = self.tables.read();
    Ok(newest_first(
      tables.customers.values().filter(|c| predicate.matches(c)).cloned(),
      |c| c.created_at,
    ))
  }

  async fn count_customers(&self, predicate: &Predicate) -> Result<u64> {
    let tables = self.tables.read();
    Ok(tables.customers.values().filter(|c| predicate.matches(c)).count() as u64)
  }

  // ── Orders ────────────────────────────────────────────────────────────────

  async fn record_order(&self, input: NewOrder) -> Result<Order> {
    let mut tables = self.tables.write();
    if !tables.customers.contains_key(&input.customer_id) {
      return Err(Error::CustomerNotFound(input.customer_id));
    }

    let order = Order {
      order_id:     Uuid::new_v4(),
      customer_id:  input.customer_id,
      external_ref: input.external_ref,
      amount:       input.amount,
      order_date:   input.order_date,
      items:        input.items,
      created_at:   Utc::now(),
    };

    let history = tables.orders.entry(order.customer_id).or_default();
    let totals = OrderTotals::from_orders(history.iter().chain([&order]))?;
    history.push(order.clone());

    if let Some(customer) = tables.customers.get_mut(&order.customer_id) {
      customer.total_spend = totals.total_spend;
      customer.visit_count = totals.visit_count;
      customer.last_visit = totals.last_visit;
      customer.updated_at = order.created_at;
    }
    Ok(order)
  }

  async fn orders_for_customer(&self, customer_id: Uuid) -> Result<Vec<Order>> {
    let tables = self.tables.read();
    let orders = tables.orders.get(&customer_id).into_iter().flatten().cloned();
    Ok(newest_first(orders, |o| o.order_date))
  }

  // ── Segments ──────────────────────────────────────────────────────────────

  async fn create_segment(&self, input: NewSegment, audience_size: u64) -> Result<Segment> {
    let now = Utc::now();
    let segment = Segment {
      segment_id: Uuid::new_v4(),
      name: input.name,
      description: input.description,
      rules: input.rules,
      audience_size,
      created_at: now,
      updated_at: now,
    };
    self
      .tables
      .write()
      .segments
      .insert(segment.segment_id, segment.clone());
    Ok(segment)
  }

  async fn get_segment(&self, id: Uuid) -> Result<Option<Segment>> {
    Ok(self.tables.read().segments.get(&id).cloned())
  }

  async fn list_segments(&self) -> Result<Vec<Segment>> {
    let tables = self.tables.read();
    Ok(newest_first(tables.segments.values().cloned(), |s| s.created_at))
  }

  async fn update_segment(
    &self,
    id: Uuid,
    patch: SegmentPatch,
    audience_size: Option<u64>,
  ) -> Result<Option<Segment>> {
    let mut tables = self.tables.write();
    let Some(segment) = tables.segments.get_mut(&id) else {
      return Ok(None);
    };

    if let Some(name) = patch.name {
      segment.name = name;
    }
    if let Some(description) = patch.description {
      segment.description = Some(description);
    }
    if let Some(rules) = patch.rules {
      segment.rules = rules;
    }
    if let Some(size) = audience_size {
      segment.audience_size = size;
    }
    segment.updated_at = Utc::now();
    Ok(Some(segment.clone()))
  }

  async fn delete_segment(&self, id: Uuid) -> Result<bool> {
    Ok(self.tables.write().segments.remove(&id).is_some())
  }

  // ── Campaigns ─────────────────────────────────────────────────────────────

  async fn create_campaign(&self, input: NewCampaign) -> Result<Campaign> {
    let mut tables = self.tables.write();
    if !tables.segments.contains_key(&input.segment_id) {
      return Err(Error::SegmentNotFound(input.segment_id));
    }

    let now = Utc::now();
    let campaign = Campaign {
      campaign_id:     Uuid::new_v4(),
      name:            input.name,
      segment_id:      input.segment_id,
      message:         input.message,
      channel:         input.channel,
      status:          CampaignStatus::Draft,
      audience_size:   0,
      sent_count:      0,
      delivered_count: 0,
      failed_count:    0,
      delivery_rate:   0.0,
      launched_at:     None,
      completed_at:    None,
      created_at:      now,
      updated_at:      now,
    };
    tables.campaigns.insert(campaign.campaign_id, campaign.clone());
    Ok(campaign)
  }

  async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>> {
    Ok(self.tables.read().campaigns.get(&id).cloned())
  }

  async fn list_campaigns(&self) -> Result<Vec<Campaign>> {
    let tables = self.tables.read();
    Ok(newest_first(tables.campaigns.values().cloned(), |c| c.created_at))
  }

  async fn activate_campaign(
    &self,
    id: Uuid,
    audience_size: u64,
    launched_at: DateTime<Utc>,
  ) -> Result<Option<Campaign>> {
    let mut tables = self.tables.write();
    let Some(campaign) = tables.campaigns.get_mut(&id) else {
      return Ok(None);
    };
    if campaign.status != CampaignStatus::Draft {
      return Ok(None);
    }

    campaign.status = CampaignStatus::Active;
    campaign.audience_size = audience_size;
    campaign.launched_at = Some(launched_at);
    campaign.updated_at = launched_at;
    Ok(Some(campaign.clone()))
  }

  async fn finish_campaign(
    &self,
    id: Uuid,
    status: CampaignStatus,
    at: DateTime<Utc>,
  ) -> Result<Option<Campaign>> {
    let mut tables = self.tables.write();
    let Some(campaign) = tables.campaigns.get_mut(&id) else {
      return Ok(None);
    };
    if !campaign.status.can_transition_to(status) || !status.is_terminal() {
      return Ok(None);
    }

    campaign.status = status;
    campaign.completed_at = Some(at);
    campaign.updated_at = at;
    Ok(Some(campaign.clone()))
  }

  async fn write_campaign_stats(
    &self,
    id: Uuid,
    stats: CampaignStats,
    complete_at: Option<DateTime<Utc>>,
  ) -> Result<Option<Campaign>> {
    let mut tables = self.tables.write();
    let Some(campaign) = tables.campaigns.get_mut(&id) else {
      return Ok(None);
    };

    campaign.sent_count = stats.sent;
    campaign.delivered_count = stats.delivered;
    campaign.failed_count = stats.failed;
    campaign.delivery_rate = stats.delivery_rate;
    campaign.updated_at = Utc::now();
    if let Some(at) = complete_at
      && campaign.status == CampaignStatus::Active
    {
      campaign.status = CampaignStatus::Completed;
      campaign.completed_at = Some(at);
    }
    Ok(Some(campaign.clone()))
  }

  // ── Communication log ─────────────────────────────────────────────────────

  async fn create_logs(&self, logs: Vec<NewLog>) -> Result<Vec<CommunicationLog>> {
    let mut tables = self.tables.write();
    if let Some(dup) = logs.iter().find(|l| tables.logs.contains_key(&l.message_id)) {
      return Err(Error::Validation(format!(
        "message id {} is already in use",
        dup.message_id
      )));
    }

    let now = Utc::now();
    let created: Vec<CommunicationLog> = logs
      .into_iter()
      .map(|l| CommunicationLog {
        message_id:   l.message_id,
        campaign_id:  l.campaign_id,
        customer_id:  l.customer_id,
        status:       DeliveryStatus::Sent,
        channel:      l.channel,
        message:      l.message,
        error_reason: None,
        sent_at:      now,
        delivered_at: None,
        created_at:   now,
      })
      .collect();

    for log in &created {
      tables.logs.insert(log.message_id, log.clone());
    }
    Ok(created)
  }

  async fn log_by_message_id(&self, message_id: Uuid) -> Result<Option<CommunicationLog>> {
    Ok(self.tables.read().logs.get(&message_id).cloned())
  }

  async fn logs_for_campaign(&self, campaign_id: Uuid) -> Result<Vec<CommunicationLog>> {
    let tables = self.tables.read();
    Ok(newest_first(
      tables
        .logs
        .values()
        .filter(|l| l.campaign_id == campaign_id)
        .cloned(),
      |l| l.created_at,
    ))
  }

  async fn close_log(
    &self,
    message_id: Uuid,
    status: DeliveryStatus,
    error_reason: Option<String>,
    at: DateTime<Utc>,
  ) -> Result<Option<CommunicationLog>> {
    let mut tables = self.tables.write();
    let Some(log) = tables.logs.get_mut(&message_id) else {
      return Ok(None);
    };
    if log.status != DeliveryStatus::Sent || !status.is_terminal() {
      return Ok(None);
    }

    log.status = status;
    if status == DeliveryStatus::Delivered {
      log.delivered_at = Some(at);
    }
    if error_reason.is_some() {
      log.error_reason = error_reason;
    }
    Ok(Some(log.clone()))
  }
}
