//! The `CrmStore` trait.
//!
//! The trait is implemented by storage backends (`reach-store-memory`,
//! `reach-store-sqlite`). Higher layers (`reach-campaign`, `reach-api`) depend
//! on this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  campaign::{Campaign, CampaignStats, CampaignStatus, NewCampaign},
  customer::{Customer, CustomerPatch, NewCustomer, NewOrder, Order},
  message::{CommunicationLog, DeliveryStatus, NewLog},
  rule::Predicate,
  segment::{NewSegment, Segment, SegmentPatch},
};

/// Abstraction over a Reach storage backend.
///
/// Every method that changes more than one column does so atomically. All
/// methods return `Send` futures so the trait can be used from spawned tasks
/// in a multi-threaded tokio runtime.
pub trait CrmStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Customers ─────────────────────────────────────────────────────────

  /// Persist a new customer with zeroed aggregates. Emails are unique.
  fn create_customer(
    &self,
    input: NewCustomer,
  ) -> impl Future<Output = Result<Customer, Self::Error>> + Send + '_;

  fn get_customer(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Customer>, Self::Error>> + Send + '_;

  fn customer_by_email<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<Option<Customer>, Self::Error>> + Send + 'a;

  /// All customers, newest first.
  fn list_customers(
    &self,
  ) -> impl Future<Output = Result<Vec<Customer>, Self::Error>> + Send + '_;

  /// Apply an identity patch. Fails if the customer does not exist.
  fn update_customer(
    &self,
    id: Uuid,
    patch: CustomerPatch,
  ) -> impl Future<Output = Result<Customer, Self::Error>> + Send + '_;

  /// Every customer the predicate matches. Unpaginated.
  fn query_customers<'a>(
    &'a self,
    predicate: &'a Predicate,
  ) -> impl Future<Output = Result<Vec<Customer>, Self::Error>> + Send + 'a;

  fn count_customers<'a>(
    &'a self,
    predicate: &'a Predicate,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  // ── Orders ────────────────────────────────────────────────────────────

  /// Record an order and recompute the owning customer's aggregates from
  /// the customer's full order history. Fails if the customer is unknown.
  fn record_order(
    &self,
    input: NewOrder,
  ) -> impl Future<Output = Result<Order, Self::Error>> + Send + '_;

  /// A customer's orders, newest first.
  fn orders_for_customer(
    &self,
    customer_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Order>, Self::Error>> + Send + '_;

  // ── Segments ──────────────────────────────────────────────────────────

  fn create_segment(
    &self,
    input: NewSegment,
    audience_size: u64,
  ) -> impl Future<Output = Result<Segment, Self::Error>> + Send + '_;

  fn get_segment(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Segment>, Self::Error>> + Send + '_;

  fn list_segments(
    &self,
  ) -> impl Future<Output = Result<Vec<Segment>, Self::Error>> + Send + '_;

  /// Apply a patch; `audience_size` replaces the snapshot when given.
  /// Returns `None` if the segment does not exist.
  fn update_segment(
    &self,
    id: Uuid,
    patch: SegmentPatch,
    audience_size: Option<u64>,
  ) -> impl Future<Output = Result<Option<Segment>, Self::Error>> + Send + '_;

  /// Returns `false` if there was nothing to delete.
  fn delete_segment(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Campaigns ─────────────────────────────────────────────────────────

  /// Persist a new campaign in the `Draft` state with zeroed aggregates.
  fn create_campaign(
    &self,
    input: NewCampaign,
  ) -> impl Future<Output = Result<Campaign, Self::Error>> + Send + '_;

  fn get_campaign(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Campaign>, Self::Error>> + Send + '_;

  /// All campaigns, newest first.
  fn list_campaigns(
    &self,
  ) -> impl Future<Output = Result<Vec<Campaign>, Self::Error>> + Send + '_;

  /// In one write, move a `Draft` campaign to `Active` and record its
  /// audience size and launch time. Returns `None` unless the campaign exists
  /// and was a draft.
  fn activate_campaign(
    &self,
    id: Uuid,
    audience_size: u64,
    launched_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<Campaign>, Self::Error>> + Send + '_;

  /// Move an `Active` campaign to a terminal status. Returns `None` unless
  /// the campaign exists and was active.
  fn finish_campaign(
    &self,
    id: Uuid,
    status: CampaignStatus,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<Campaign>, Self::Error>> + Send + '_;

  /// Overwrite the four delivery aggregates in one write. When `complete_at`
  /// is given and the campaign is `Active`, the same write completes it.
  fn write_campaign_stats(
    &self,
    id: Uuid,
    stats: CampaignStats,
    complete_at: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<Option<Campaign>, Self::Error>> + Send + '_;

  // ── Communication log ─────────────────────────────────────────────────

  /// Create `Sent` log rows for one dispatch, all or none.
  fn create_logs(
    &self,
    logs: Vec<NewLog>,
  ) -> impl Future<Output = Result<Vec<CommunicationLog>, Self::Error>> + Send + '_;

  fn log_by_message_id(
    &self,
    message_id: Uuid,
  ) -> impl Future<Output = Result<Option<CommunicationLog>, Self::Error>> + Send + '_;

  /// A campaign's log, newest first.
  fn logs_for_campaign(
    &self,
    campaign_id: Uuid,
  ) -> impl Future<Output = Result<Vec<CommunicationLog>, Self::Error>> + Send + '_;

  /// Close a `Sent` log with a terminal status. `Delivered` stamps
  /// `delivered_at = at`. Returns `None` when no `Sent` row matched, so a
  /// log transitions at most once.
  fn close_log(
    &self,
    message_id: Uuid,
    status: DeliveryStatus,
    error_reason: Option<String>,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<CommunicationLog>, Self::Error>> + Send + '_;
}
