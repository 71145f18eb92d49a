//! Communication log entries, delivery receipts and message rendering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::{campaign::Channel, customer::Customer};

// ─── Status ──────────────────────────────────────────────────────────────────

/// Outcome of one delivery attempt. `Sent` is the only non-terminal state and
/// moves to `Delivered` or `Failed` exactly once.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum DeliveryStatus {
  Sent,
  Delivered,
  Failed,
}

impl DeliveryStatus {
  pub fn is_terminal(self) -> bool { !matches!(self, Self::Sent) }
}

// ─── Log ─────────────────────────────────────────────────────────────────────

/// The durable record of one (campaign, customer) delivery attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunicationLog {
  /// Correlation key used by asynchronous delivery receipts.
  pub message_id:   Uuid,
  pub campaign_id:  Uuid,
  pub customer_id:  Uuid,
  pub status:       DeliveryStatus,
  pub channel:      Channel,
  /// The rendered message, placeholders already substituted.
  pub message:      String,
  /// Only ever set on `Failed`.
  pub error_reason: Option<String>,
  pub sent_at:      DateTime<Utc>,
  pub delivered_at: Option<DateTime<Utc>>,
  pub created_at:   DateTime<Utc>,
}

/// Input to [`crate::store::CrmStore::create_logs`]. Logs are always created
/// in the `Sent` state.
#[derive(Debug, Clone)]
pub struct NewLog {
  pub message_id:  Uuid,
  pub campaign_id: Uuid,
  pub customer_id: Uuid,
  pub channel:     Channel,
  pub message:     String,
}

// ─── Receipt ─────────────────────────────────────────────────────────────────

/// What the delivery vendor reports back for one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReceipt {
  pub message_id:   Uuid,
  pub status:       DeliveryStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error_reason: Option<String>,
}

impl DeliveryReceipt {
  pub fn delivered(message_id: Uuid) -> Self {
    Self { message_id, status: DeliveryStatus::Delivered, error_reason: None }
  }

  pub fn failed(message_id: Uuid, reason: impl Into<String>) -> Self {
    Self {
      message_id,
      status: DeliveryStatus::Failed,
      error_reason: Some(reason.into()),
    }
  }
}

// ─── Rendering ───────────────────────────────────────────────────────────────

/// Substitute customer placeholders into a message template.
///
/// | Placeholder | Value |
/// |-------------|-------|
/// | `{{firstName}}` | first whitespace-separated token of the name |
/// | `{{name}}` | full name |
/// | `{{email}}` | email address |
///
/// The template is scanned once, so substituted values are never themselves
/// expanded.
pub fn render_message(template: &str, customer: &Customer) -> String {
  let mut out = String::with_capacity(template.len());
  let mut rest = template;
  while let Some(start) = rest.find("{{") {
    out.push_str(&rest[..start]);
    rest = &rest[start..];
    let Some(end) = rest.find("}}") else {
      break;
    };
    match &rest[2..end] {
      "firstName" => out.push_str(customer.first_name()),
      "name" => out.push_str(&customer.name),
      "email" => out.push_str(&customer.email),
      _ => out.push_str(&rest[..end + 2]),
    }
    rest = &rest[end + 2..];
  }
  out.push_str(rest);
  out
}
