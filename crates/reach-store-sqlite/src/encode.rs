//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microsecond
//! precision, `Z` suffix) so that string comparison in SQL orders them
//! correctly. Decimals are stored as text, rule chains and order items as
//! compact JSON, UUIDs as hyphenated lowercase strings.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use reach_core::{
  campaign::Campaign,
  customer::{Customer, Order},
  message::CommunicationLog,
  segment::Segment,
};
use rusqlite::Row;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

pub fn encode_decimal(d: Decimal) -> String { d.normalize().to_string() }

/// Order-preserving text key for a non-negative decimal: 29 integer digits,
/// a point, then 28 fraction digits. `None` for negative values.
pub fn encode_spend_key(d: Decimal) -> Option<String> {
  if d.is_sign_negative() && !d.is_zero() {
    return None;
  }
  let text = d.abs().to_string();
  let (int, frac) = text.split_once('.').unwrap_or((&text, ""));
  Some(format!("{int:0>29}.{frac:0<28}"))
}

fn decode_decimal(s: &str) -> Result<Decimal> { Ok(Decimal::from_str(s)?) }

/// Parse a `strum`-style enum column.
fn decode_enum<T: FromStr>(column: &'static str, value: String) -> Result<T> {
  value.parse().map_err(|_| Error::BadEnum { column, value })
}

fn decode_count(n: i64) -> u64 { u64::try_from(n).unwrap_or_default() }

// ─── Customers ───────────────────────────────────────────────────────────────

pub const CUSTOMER_COLUMNS: &str = "customer_id, external_ref, name, email, phone, \
  total_spend, visit_count, last_visit, registration_date, created_at, updated_at";

/// Raw strings read directly from a `customers` row.
pub struct RawCustomer {
  customer_id:       String,
  external_ref:      Option<String>,
  name:              String,
  email:             String,
  phone:             Option<String>,
  total_spend:       String,
  visit_count:       u32,
  last_visit:        Option<String>,
  registration_date: String,
  created_at:        String,
  updated_at:        String,
}

impl RawCustomer {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      customer_id:       row.get(0)?,
      external_ref:      row.get(1)?,
      name:              row.get(2)?,
      email:             row.get(3)?,
      phone:             row.get(4)?,
      total_spend:       row.get(5)?,
      visit_count:       row.get(6)?,
      last_visit:        row.get(7)?,
      registration_date: row.get(8)?,
      created_at:        row.get(9)?,
      updated_at:        row.get(10)?,
    })
  }

  pub fn into_customer(self) -> Result<Customer> {
    Ok(Customer {
      customer_id:       decode_uuid(&self.customer_id)?,
      external_ref:      self.external_ref,
      name:              self.name,
      email:             self.email,
      phone:             self.phone,
      total_spend:       decode_decimal(&self.total_spend)?,
      visit_count:       self.visit_count,
      last_visit:        decode_opt_dt(self.last_visit)?,
      registration_date: decode_dt(&self.registration_date)?,
      created_at:        decode_dt(&self.created_at)?,
      updated_at:        decode_dt(&self.updated_at)?,
    })
  }
}

// ─── Orders ──────────────────────────────────────────────────────────────────

pub const ORDER_COLUMNS: &str =
  "order_id, customer_id, external_ref, amount, order_date, items, created_at";

pub struct RawOrder {
  order_id:     String,
  customer_id:  String,
  external_ref: Option<String>,
  amount:       String,
  order_date:   String,
  items:        String,
  created_at:   String,
}

impl RawOrder {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      order_id:     row.get(0)?,
      customer_id:  row.get(1)?,
      external_ref: row.get(2)?,
      amount:       row.get(3)?,
      order_date:   row.get(4)?,
      items:        row.get(5)?,
      created_at:   row.get(6)?,
    })
  }

  pub fn into_order(self) -> Result<Order> {
    Ok(Order {
      order_id:     decode_uuid(&self.order_id)?,
      customer_id:  decode_uuid(&self.customer_id)?,
      external_ref: self.external_ref,
      amount:       decode_decimal(&self.amount)?,
      order_date:   decode_dt(&self.order_date)?,
      items:        serde_json::from_str(&self.items)?,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

// ─── Segments ────────────────────────────────────────────────────────────────

pub const SEGMENT_COLUMNS: &str =
  "segment_id, name, description, rules, audience_size, created_at, updated_at";

pub struct RawSegment {
  segment_id:    String,
  name:          String,
  description:   Option<String>,
  rules:         String,
  audience_size: i64,
  created_at:    String,
  updated_at:    String,
}

impl RawSegment {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      segment_id:    row.get(0)?,
      name:          row.get(1)?,
      description:   row.get(2)?,
      rules:         row.get(3)?,
      audience_size: row.get(4)?,
      created_at:    row.get(5)?,
      updated_at:    row.get(6)?,
    })
  }

  pub fn into_segment(self) -> Result<Segment> {
    Ok(Segment {
      segment_id:    decode_uuid(&self.segment_id)?,
      name:          self.name,
      description:   self.description,
      rules:         serde_json::from_str(&self.rules)?,
      audience_size: decode_count(self.audience_size),
      created_at:    decode_dt(&self.created_at)?,
      updated_at:    decode_dt(&self.updated_at)?,
    })
  }
}

// ─── Campaigns ───────────────────────────────────────────────────────────────

pub const CAMPAIGN_COLUMNS: &str = "campaign_id, name, segment_id, message, channel, \
  status, audience_size, sent_count, delivered_count, failed_count, delivery_rate, \
  launched_at, completed_at, created_at, updated_at";

pub struct RawCampaign {
  campaign_id:     String,
  name:            String,
  segment_id:      String,
  message:         String,
  channel:         String,
  status:          String,
  audience_size:   i64,
  sent_count:      i64,
  delivered_count: i64,
  failed_count:    i64,
  delivery_rate:   f64,
  launched_at:     Option<String>,
  completed_at:    Option<String>,
  created_at:      String,
  updated_at:      String,
}

impl RawCampaign {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      campaign_id:     row.get(0)?,
      name:            row.get(1)?,
      segment_id:      row.get(2)?,
      message:         row.get(3)?,
      channel:         row.get(4)?,
      status:          row.get(5)?,
      audience_size:   row.get(6)?,
      sent_count:      row.get(7)?,
      delivered_count: row.get(8)?,
      failed_count:    row.get(9)?,
      delivery_rate:   row.get(10)?,
      launched_at:     row.get(11)?,
      completed_at:    row.get(12)?,
      created_at:      row.get(13)?,
      updated_at:      row.get(14)?,
    })
  }

  pub fn into_campaign(self) -> Result<Campaign> {
    Ok(Campaign {
      campaign_id:     decode_uuid(&self.campaign_id)?,
      name:            self.name,
      segment_id:      decode_uuid(&self.segment_id)?,
      message:         self.message,
      channel:         decode_enum("channel", self.channel)?,
      status:          decode_enum("status", self.status)?,
      audience_size:   decode_count(self.audience_size),
      sent_count:      decode_count(self.sent_count),
      delivered_count: decode_count(self.delivered_count),
      failed_count:    decode_count(self.failed_count),
      delivery_rate:   self.delivery_rate,
      launched_at:     decode_opt_dt(self.launched_at)?,
      completed_at:    decode_opt_dt(self.completed_at)?,
      created_at:      decode_dt(&self.created_at)?,
      updated_at:      decode_dt(&self.updated_at)?,
    })
  }
}

// ─── Communication log ───────────────────────────────────────────────────────

pub const LOG_COLUMNS: &str = "message_id, campaign_id, customer_id, status, channel, \
  message, error_reason, sent_at, delivered_at, created_at";

pub struct RawLog {
  message_id:   String,
  campaign_id:  String,
  customer_id:  String,
  status:       String,
  channel:      String,
  message:      String,
  error_reason: Option<String>,
  sent_at:      String,
  delivered_at: Option<String>,
  created_at:   String,
}

impl RawLog {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      message_id:   row.get(0)?,
      campaign_id:  row.get(1)?,
      customer_id:  row.get(2)?,
      status:       row.get(3)?,
      channel:      row.get(4)?,
      message:      row.get(5)?,
      error_reason: row.get(6)?,
      sent_at:      row.get(7)?,
      delivered_at: row.get(8)?,
      created_at:   row.get(9)?,
    })
  }

  pub fn into_log(self) -> Result<CommunicationLog> {
    Ok(CommunicationLog {
      message_id:   decode_uuid(&self.message_id)?,
      campaign_id:  decode_uuid(&self.campaign_id)?,
      customer_id:  decode_uuid(&self.customer_id)?,
      status:       decode_enum("status", self.status)?,
      channel:      decode_enum("channel", self.channel)?,
      message:      self.message,
      error_reason: self.error_reason,
      sent_at:      decode_dt(&self.sent_at)?,
      delivered_at: decode_opt_dt(self.delivered_at)?,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}
