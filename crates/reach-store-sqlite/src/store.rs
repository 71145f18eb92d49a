//! [`SqliteStore`], the SQLite implementation of [`CrmStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension as _, Row, params, params_from_iter, types::Type};
use rust_decimal::Decimal;
use uuid::Uuid;

use reach_core::{
  campaign::{Campaign, CampaignStats, CampaignStatus, NewCampaign},
  customer::{Customer, CustomerPatch, NewCustomer, NewOrder, Order, add_spend},
  message::{CommunicationLog, DeliveryStatus, NewLog},
  rule::Predicate,
  segment::{NewSegment, Segment, SegmentPatch},
  store::CrmStore,
};

use crate::{
  Error, Result,
  encode::{
    CAMPAIGN_COLUMNS, CUSTOMER_COLUMNS, LOG_COLUMNS, ORDER_COLUMNS, RawCampaign, RawCustomer,
    RawLog, RawOrder, RawSegment, SEGMENT_COLUMNS, encode_decimal, encode_dt, encode_spend_key,
    encode_uuid,
  },
  filter::Filter,
  schema::SCHEMA,
};

// ─── Row helpers ─────────────────────────────────────────────────────────────

fn fetch_customer(conn: &Connection, id: &str) -> rusqlite::Result<Option<RawCustomer>> {
  conn
    .query_row(
      &format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE customer_id = ?1"),
      params![id],
      RawCustomer::from_row,
    )
    .optional()
}

fn fetch_segment(conn: &Connection, id: &str) -> rusqlite::Result<Option<RawSegment>> {
  conn
    .query_row(
      &format!("SELECT {SEGMENT_COLUMNS} FROM segments WHERE segment_id = ?1"),
      params![id],
      RawSegment::from_row,
    )
    .optional()
}

fn fetch_campaign(conn: &Connection, id: &str) -> rusqlite::Result<Option<RawCampaign>> {
  conn
    .query_row(
      &format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE campaign_id = ?1"),
      params![id],
      RawCampaign::from_row,
    )
    .optional()
}

fn fetch_log(conn: &Connection, id: &str) -> rusqlite::Result<Option<RawLog>> {
  conn
    .query_row(
      &format!("SELECT {LOG_COLUMNS} FROM communication_log WHERE message_id = ?1"),
      params![id],
      RawLog::from_row,
    )
    .optional()
}

fn exists(conn: &Connection, sql: &str, id: &str) -> rusqlite::Result<bool> {
  Ok(conn.query_row(sql, params![id], |_| Ok(())).optional()?.is_some())
}

fn decimal_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
  let text: String = row.get(idx)?;
  text
    .parse()
    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// How a `record_order` transaction ended.
enum Recorded {
  Done,
  NoCustomer,
  Overflow,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Reach store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn select_customers(&self, filter: Filter) -> Result<Vec<Customer>> {
    let raws: Vec<RawCustomer> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE {} ORDER BY created_at DESC",
          filter.clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(params_from_iter(filter.params.iter()), RawCustomer::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCustomer::into_customer).collect()
  }
}

// ─── CrmStore impl ───────────────────────────────────────────────────────────

impl CrmStore for SqliteStore {
  type Error = Error;

  // ── Customers ─────────────────────────────────────────────────────────────

  async fn create_customer(&self, input: NewCustomer) -> Result<Customer> {
    let now = Utc::now();
    let customer = Customer {
      customer_id:       Uuid::new_v4(),
      external_ref:      input.external_ref,
      name:              input.name,
      email:             input.email,
      phone:             input.phone,
      total_spend:       Decimal::ZERO,
      visit_count:       0,
      last_visit:        None,
      registration_date: input.registration_date.unwrap_or(now),
      created_at:        now,
      updated_at:        now,
    };

    let id_str   = encode_uuid(customer.customer_id);
    let ext_ref  = customer.external_ref.clone();
    let name     = customer.name.clone();
    let email    = customer.email.clone();
    let phone    = customer.phone.clone();
    let reg_str  = encode_dt(customer.registration_date);
    let now_str  = encode_dt(now);
    let zero_key = encode_spend_key(Decimal::ZERO);

    let inserted = self
      .conn
      .call(move |conn| {
        if exists(conn, "SELECT 1 FROM customers WHERE email = ?1", &email)? {
          return Ok(false);
        }
        conn.execute(
          "INSERT INTO customers (
             customer_id, external_ref, name, email, phone,
             spend_key, registration_date, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
          params![id_str, ext_ref, name, email, phone, zero_key, reg_str, now_str],
        )?;
        Ok(true)
      })
      .await?;

    if !inserted {
      return Err(reach_core::Error::DuplicateEmail(customer.email).into());
    }
    Ok(customer)
  }

  async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>> {
    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| Ok(fetch_customer(conn, &id_str)?))
      .await?;
    raw.map(RawCustomer::into_customer).transpose()
  }

  async fn customer_by_email(&self, email: &str) -> Result<Option<Customer>> {
    let email = email.to_owned();
    let raw: Option<RawCustomer> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE email = ?1"),
              params![email],
              RawCustomer::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawCustomer::into_customer).transpose()
  }

  async fn list_customers(&self) -> Result<Vec<Customer>> {
    self.select_customers(Filter::new(&Predicate::All)).await
  }

  async fn update_customer(&self, id: Uuid, patch: CustomerPatch) -> Result<Customer> {
    let id_str  = encode_uuid(id);
    let now_str = encode_dt(Utc::now());

    let raw = self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE customers SET
             name         = COALESCE(?2, name),
             phone        = COALESCE(?3, phone),
             external_ref = COALESCE(?4, external_ref),
             updated_at   = ?5
           WHERE customer_id = ?1",
          params![id_str, patch.name, patch.phone, patch.external_ref, now_str],
        )?;
        Ok(fetch_customer(conn, &id_str)?)
      })
      .await?;

    raw
      .ok_or(reach_core::Error::CustomerNotFound(id))?
      .into_customer()
  }

  async fn query_customers(&self, predicate: &Predicate) -> Result<Vec<Customer>> {
    self.select_customers(Filter::new(predicate)).await
  }

  async fn count_customers(&self, predicate: &Predicate) -> Result<u64> {
    let filter = Filter::new(predicate);
    let count: i64 = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT COUNT(*) FROM customers WHERE {}", filter.clause);
        Ok(conn.query_row(&sql, params_from_iter(filter.params.iter()), |r| r.get(0))?)
      })
      .await?;
    Ok(u64::try_from(count).unwrap_or_default())
  }

  // ── Orders ────────────────────────────────────────────────────────────────

  async fn record_order(&self, input: NewOrder) -> Result<Order> {
    let order = Order {
      order_id:     Uuid::new_v4(),
      customer_id:  input.customer_id,
      external_ref: input.external_ref,
      amount:       input.amount,
      order_date:   input.order_date,
      items:        input.items,
      created_at:   Utc::now(),
    };

    let order_str    = encode_uuid(order.order_id);
    let customer_str = encode_uuid(order.customer_id);
    let ext_ref      = order.external_ref.clone();
    let amount_str   = encode_decimal(order.amount);
    let date_str     = encode_dt(order.order_date);
    let items_str    = serde_json::to_string(&order.items)?;
    let now_str      = encode_dt(order.created_at);

    let recorded = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if !exists(&tx, "SELECT 1 FROM customers WHERE customer_id = ?1", &customer_str)? {
          return Ok(Recorded::NoCustomer);
        }

        tx.execute(
          "INSERT INTO orders (
             order_id, customer_id, external_ref, amount, order_date, items, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          params![order_str, customer_str, ext_ref, amount_str, date_str, items_str, now_str],
        )?;

        // Aggregates are rebuilt from the full history, never incremented.
        let (total, visits, last_visit) = {
          let mut stmt =
            tx.prepare("SELECT amount, order_date FROM orders WHERE customer_id = ?1")?;
          let mut rows = stmt.query(params![customer_str])?;
          let mut total = Decimal::ZERO;
          let mut visits: u32 = 0;
          let mut last_visit: Option<String> = None;
          while let Some(row) = rows.next()? {
            // Dropping `tx` uncommitted rolls the insert back.
            let Ok(sum) = add_spend(total, decimal_column(row, 0)?) else {
              return Ok(Recorded::Overflow);
            };
            total = sum;
            visits += 1;
            let at: String = row.get(1)?;
            if last_visit.as_deref().is_none_or(|last| at.as_str() > last) {
              last_visit = Some(at);
            }
          }
          (total, visits, last_visit)
        };

        tx.execute(
          "UPDATE customers SET
             total_spend = ?2, spend_key = ?3, visit_count = ?4, last_visit = ?5, updated_at = ?6
           WHERE customer_id = ?1",
          params![
            customer_str,
            encode_decimal(total),
            encode_spend_key(total),
            visits,
            last_visit,
            now_str
          ],
        )?;
        tx.commit()?;
        Ok(Recorded::Done)
      })
      .await?;

    match recorded {
      Recorded::Done => Ok(order),
      Recorded::NoCustomer => {
        Err(reach_core::Error::CustomerNotFound(order.customer_id).into())
      }
      Recorded::Overflow => {
        Err(reach_core::Error::Validation("total spend overflow".into()).into())
      }
    }
  }

  async fn orders_for_customer(&self, customer_id: Uuid) -> Result<Vec<Order>> {
    let id_str = encode_uuid(customer_id);
    let raws: Vec<RawOrder> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ORDER_COLUMNS} FROM orders WHERE customer_id = ?1 ORDER BY order_date DESC"
        ))?;
        let rows = stmt
          .query_map(params![id_str], RawOrder::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawOrder::into_order).collect()
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

    let id_str    = encode_uuid(segment.segment_id);
    let name      = segment.name.clone();
    let desc      = segment.description.clone();
    let rules_str = serde_json::to_string(&segment.rules)?;
    let size      = audience_size as i64;
    let now_str   = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO segments (
             segment_id, name, description, rules, audience_size, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
          params![id_str, name, desc, rules_str, size, now_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(segment)
  }

  async fn get_segment(&self, id: Uuid) -> Result<Option<Segment>> {
    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| Ok(fetch_segment(conn, &id_str)?))
      .await?;
    raw.map(RawSegment::into_segment).transpose()
  }

  async fn list_segments(&self) -> Result<Vec<Segment>> {
    let raws: Vec<RawSegment> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SEGMENT_COLUMNS} FROM segments ORDER BY created_at DESC"
        ))?;
        let rows = stmt
          .query_map([], RawSegment::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawSegment::into_segment).collect()
  }

  async fn update_segment(
    &self,
    id: Uuid,
    patch: SegmentPatch,
    audience_size: Option<u64>,
  ) -> Result<Option<Segment>> {
    let id_str    = encode_uuid(id);
    let rules_str = patch.rules.as_ref().map(serde_json::to_string).transpose()?;
    let size      = audience_size.map(|n| n as i64);
    let now_str   = encode_dt(Utc::now());

    let raw = self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE segments SET
             name          = COALESCE(?2, name),
             description   = COALESCE(?3, description),
             rules         = COALESCE(?4, rules),
             audience_size = COALESCE(?5, audience_size),
             updated_at    = ?6
           WHERE segment_id = ?1",
          params![id_str, patch.name, patch.description, rules_str, size, now_str],
        )?;
        Ok(fetch_segment(conn, &id_str)?)
      })
      .await?;
    raw.map(RawSegment::into_segment).transpose()
  }

  async fn delete_segment(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);
    let deleted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM segments WHERE segment_id = ?1", params![id_str])?)
      })
      .await?;
    Ok(deleted > 0)
  }

  // ── Campaigns ─────────────────────────────────────────────────────────────

  async fn create_campaign(&self, input: NewCampaign) -> Result<Campaign> {
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

    let id_str      = encode_uuid(campaign.campaign_id);
    let name        = campaign.name.clone();
    let segment_str = encode_uuid(campaign.segment_id);
    let message     = campaign.message.clone();
    let channel     = campaign.channel.to_string();
    let status      = campaign.status.to_string();
    let now_str     = encode_dt(now);

    let created = self
      .conn
      .call(move |conn| {
        if !exists(conn, "SELECT 1 FROM segments WHERE segment_id = ?1", &segment_str)? {
          return Ok(false);
        }
        conn.execute(
          "INSERT INTO campaigns (
             campaign_id, name, segment_id, message, channel, status, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
          params![id_str, name, segment_str, message, channel, status, now_str],
        )?;
        Ok(true)
      })
      .await?;

    if !created {
      return Err(reach_core::Error::SegmentNotFound(campaign.segment_id).into());
    }
    Ok(campaign)
  }

  async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>> {
    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| Ok(fetch_campaign(conn, &id_str)?))
      .await?;
    raw.map(RawCampaign::into_campaign).transpose()
  }

  async fn list_campaigns(&self) -> Result<Vec<Campaign>> {
    let raws: Vec<RawCampaign> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {CAMPAIGN_COLUMNS} FROM campaigns ORDER BY created_at DESC"
        ))?;
        let rows = stmt
          .query_map([], RawCampaign::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawCampaign::into_campaign).collect()
  }

  async fn activate_campaign(
    &self,
    id: Uuid,
    audience_size: u64,
    launched_at: DateTime<Utc>,
  ) -> Result<Option<Campaign>> {
    let id_str = encode_uuid(id);
    let size   = audience_size as i64;
    let at_str = encode_dt(launched_at);

    let raw = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE campaigns SET
             status = 'active', audience_size = ?2, launched_at = ?3, updated_at = ?3
           WHERE campaign_id = ?1 AND status = 'draft'",
          params![id_str, size, at_str],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        Ok(fetch_campaign(conn, &id_str)?)
      })
      .await?;
    raw.map(RawCampaign::into_campaign).transpose()
  }

  async fn finish_campaign(
    &self,
    id: Uuid,
    status: CampaignStatus,
    at: DateTime<Utc>,
  ) -> Result<Option<Campaign>> {
    if !CampaignStatus::Active.can_transition_to(status) {
      return Ok(None);
    }
    let id_str     = encode_uuid(id);
    let status_str = status.to_string();
    let at_str     = encode_dt(at);

    let raw = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE campaigns SET status = ?2, completed_at = ?3, updated_at = ?3
           WHERE campaign_id = ?1 AND status = 'active'",
          params![id_str, status_str, at_str],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        Ok(fetch_campaign(conn, &id_str)?)
      })
      .await?;
    raw.map(RawCampaign::into_campaign).transpose()
  }

  async fn write_campaign_stats(
    &self,
    id: Uuid,
    stats: CampaignStats,
    complete_at: Option<DateTime<Utc>>,
  ) -> Result<Option<Campaign>> {
    let id_str      = encode_uuid(id);
    let now_str     = encode_dt(Utc::now());
    let complete_at = complete_at.map(encode_dt);

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let changed = tx.execute(
          "UPDATE campaigns SET
             sent_count = ?2, delivered_count = ?3, failed_count = ?4,
             delivery_rate = ?5, updated_at = ?6
           WHERE campaign_id = ?1",
          params![
            id_str,
            stats.sent as i64,
            stats.delivered as i64,
            stats.failed as i64,
            stats.delivery_rate,
            now_str,
          ],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        if let Some(at) = complete_at {
          tx.execute(
            "UPDATE campaigns SET status = 'completed', completed_at = ?2
             WHERE campaign_id = ?1 AND status = 'active'",
            params![id_str, at],
          )?;
        }
        let raw = fetch_campaign(&tx, &id_str)?;
        tx.commit()?;
        Ok(raw)
      })
      .await?;
    raw.map(RawCampaign::into_campaign).transpose()
  }

  // ── Communication log ─────────────────────────────────────────────────────

  async fn create_logs(&self, logs: Vec<NewLog>) -> Result<Vec<CommunicationLog>> {
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

    let rows: Vec<[String; 6]> = created
      .iter()
      .map(|l| {
        [
          encode_uuid(l.message_id),
          encode_uuid(l.campaign_id),
          encode_uuid(l.customer_id),
          l.status.to_string(),
          l.channel.to_string(),
          l.message.clone(),
        ]
      })
      .collect();
    let now_str = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO communication_log (
               message_id, campaign_id, customer_id, status, channel, message,
               sent_at, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
          )?;
          for [message_id, campaign_id, customer_id, status, channel, message] in &rows {
            stmt.execute(params![
              message_id,
              campaign_id,
              customer_id,
              status,
              channel,
              message,
              now_str
            ])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(created)
  }

  async fn log_by_message_id(&self, message_id: Uuid) -> Result<Option<CommunicationLog>> {
    let id_str = encode_uuid(message_id);
    let raw = self
      .conn
      .call(move |conn| Ok(fetch_log(conn, &id_str)?))
      .await?;
    raw.map(RawLog::into_log).transpose()
  }

  async fn logs_for_campaign(&self, campaign_id: Uuid) -> Result<Vec<CommunicationLog>> {
    let id_str = encode_uuid(campaign_id);
    let raws: Vec<RawLog> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {LOG_COLUMNS} FROM communication_log
           WHERE campaign_id = ?1 ORDER BY created_at DESC"
        ))?;
        let rows = stmt
          .query_map(params![id_str], RawLog::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawLog::into_log).collect()
  }

  async fn close_log(
    &self,
    message_id: Uuid,
    status: DeliveryStatus,
    error_reason: Option<String>,
    at: DateTime<Utc>,
  ) -> Result<Option<CommunicationLog>> {
    if !status.is_terminal() {
      return Ok(None);
    }
    let id_str       = encode_uuid(message_id);
    let status_str   = status.to_string();
    let delivered_at = (status == DeliveryStatus::Delivered).then(|| encode_dt(at));

    let raw = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE communication_log SET
             status       = ?2,
             error_reason = COALESCE(?3, error_reason),
             delivered_at = ?4
           WHERE message_id = ?1 AND status = 'SENT'",
          params![id_str, status_str, error_reason, delivered_at],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        Ok(fetch_log(conn, &id_str)?)
      })
      .await?;
    raw.map(RawLog::into_log).transpose()
  }
}
