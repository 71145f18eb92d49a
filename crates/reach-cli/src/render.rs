//! Plain-text tables for terminal output.

use std::fmt::Write as _;

use reach_core::{
  campaign::{Campaign, CampaignStats},
  customer::{Customer, Order},
  message::CommunicationLog,
  rule::SegmentRule,
  segment::Segment,
};
use serde_json::Value;

const DATE: &str = "%Y-%m-%d %H:%M";

pub fn customers(customers: &[Customer]) -> String {
  let mut out = format!(
    "{:<36}  {:<24}  {:<28}  {:>12}  {:>6}  {}\n",
    "ID", "NAME", "EMAIL", "SPEND", "VISITS", "LAST VISIT"
  );
  for c in customers {
    let last = c
      .last_visit
      .map(|d| d.format(DATE).to_string())
      .unwrap_or_else(|| "never".into());
    let _ = writeln!(
      out,
      "{:<36}  {:<24}  {:<28}  {:>12}  {:>6}  {}",
      c.customer_id,
      truncate(&c.name, 24),
      truncate(&c.email, 28),
      c.total_spend,
      c.visit_count,
      last
    );
  }
  out
}

pub fn orders(orders: &[Order]) -> String {
  let mut out = format!("{:<36}  {:>12}  {:<16}  {}\n", "ID", "AMOUNT", "DATE", "ITEMS");
  for o in orders {
    let _ = writeln!(
      out,
      "{:<36}  {:>12}  {:<16}  {}",
      o.order_id,
      o.amount,
      o.order_date.format(DATE),
      o.items.join(", ")
    );
  }
  out
}

pub fn segments(segments: &[Segment]) -> String {
  let mut out = format!("{:<36}  {:<24}  {:>8}  {}\n", "ID", "NAME", "AUDIENCE", "RULES");
  for s in segments {
    let _ = writeln!(
      out,
      "{:<36}  {:<24}  {:>8}  {}",
      s.segment_id,
      truncate(&s.name, 24),
      s.audience_size,
      rules(&s.rules)
    );
  }
  out
}

/// One-line rendering of a rule chain, e.g.
/// `totalSpend greater_than 10000 OR visitCount lt 5`.
pub fn rules(rules: &[SegmentRule]) -> String {
  if rules.is_empty() {
    return "(everyone)".into();
  }
  let mut out = String::new();
  for (i, rule) in rules.iter().enumerate() {
    if i > 0 {
      let logic = rule
        .logic
        .map(|l| format!("{l:?}").to_uppercase())
        .unwrap_or_else(|| "AND".into());
      let _ = write!(out, " {logic} ");
    }
    let _ = write!(out, "{} {} {}", rule.field, rule.operator, rule.value);
  }
  out
}

pub fn campaigns(campaigns: &[Campaign]) -> String {
  let mut out = format!(
    "{:<36}  {:<24}  {:<7}  {:<9}  {:>8}  {:>6}  {:>7}\n",
    "ID", "NAME", "CHANNEL", "STATUS", "AUDIENCE", "SENT", "RATE"
  );
  for c in campaigns {
    let _ = writeln!(
      out,
      "{:<36}  {:<24}  {:<7}  {:<9}  {:>8}  {:>6}  {:>6.2}%",
      c.campaign_id,
      truncate(&c.name, 24),
      c.channel,
      c.status,
      c.audience_size,
      c.sent_count,
      c.delivery_rate
    );
  }
  out
}

pub fn campaign(c: &Campaign) -> String {
  let when = |d: Option<chrono::DateTime<chrono::Utc>>| {
    d.map(|d| d.format(DATE).to_string()).unwrap_or_else(|| "-".into())
  };
  format!(
    "{name} ({id})\n\
     status:    {status}\n\
     channel:   {channel}\n\
     segment:   {segment}\n\
     message:   {message}\n\
     audience:  {audience}\n\
     sent:      {sent}\n\
     delivered: {delivered}\n\
     failed:    {failed}\n\
     rate:      {rate:.2}%\n\
     launched:  {launched}\n\
     completed: {completed}\n",
    name = c.name,
    id = c.campaign_id,
    status = c.status,
    channel = c.channel,
    segment = c.segment_id,
    message = c.message,
    audience = c.audience_size,
    sent = c.sent_count,
    delivered = c.delivered_count,
    failed = c.failed_count,
    rate = c.delivery_rate,
    launched = when(c.launched_at),
    completed = when(c.completed_at),
  )
}

pub fn logs(logs: &[CommunicationLog]) -> String {
  let mut out = format!("{:<36}  {:<36}  {:<9}  {}\n", "MESSAGE", "CUSTOMER", "STATUS", "DETAIL");
  for l in logs {
    let detail = l.error_reason.as_deref().unwrap_or(&l.message);
    let _ = writeln!(
      out,
      "{:<36}  {:<36}  {:<9}  {}",
      l.message_id,
      l.customer_id,
      l.status,
      truncate(detail, 48)
    );
  }
  out
}

pub fn stats(s: &CampaignStats) -> String {
  format!(
    "sent {} · delivered {} · failed {} · pending {} · rate {:.2}%\n",
    s.sent, s.delivered, s.failed, s.pending, s.delivery_rate
  )
}

/// One aligned line per top-level field of the overview object.
pub fn overview(body: &Value) -> String {
  let mut out = String::new();
  if let Some(fields) = body.as_object() {
    for (key, value) in fields {
      let value = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
      };
      let _ = writeln!(out, "{key:<18} {value}");
    }
  }
  out
}

fn truncate(s: &str, width: usize) -> String {
  if s.chars().count() <= width {
    return s.to_owned();
  }
  let mut cut: String = s.chars().take(width.saturating_sub(1)).collect();
  cut.push('…');
  cut
}
