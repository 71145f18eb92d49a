//! Customers and the orders that drive their aggregate attributes.
//!
//! A customer's `total_spend`, `visit_count` and `last_visit` are never edited
//! directly; they are recomputed from the customer's full order history every
//! time an order is recorded (see [`OrderTotals`]).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Customer ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
  pub customer_id:       Uuid,
  /// Identifier in the system the record was imported from, if any.
  pub external_ref:      Option<String>,
  pub name:              String,
  pub email:             String,
  pub phone:             Option<String>,
  pub total_spend:       Decimal,
  pub visit_count:       u32,
  pub last_visit:        Option<DateTime<Utc>>,
  pub registration_date: DateTime<Utc>,
  pub created_at:        DateTime<Utc>,
  pub updated_at:        DateTime<Utc>,
}

impl Customer {
  /// The first whitespace-separated token of the customer's name.
  pub fn first_name(&self) -> &str { self.name.split_whitespace().next().unwrap_or("") }
}

/// Input to [`crate::store::CrmStore::create_customer`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCustomer {
  pub name:              String,
  pub email:             String,
  #[serde(default)]
  pub phone:             Option<String>,
  #[serde(default)]
  pub external_ref:      Option<String>,
  /// Defaults to the time of insertion.
  #[serde(default)]
  pub registration_date: Option<DateTime<Utc>>,
}

impl NewCustomer {
  pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
    Self {
      name:              name.into(),
      email:             email.into(),
      phone:             None,
      external_ref:      None,
      registration_date: None,
    }
  }

  /// Reject empty names and addresses without an `@`.
  pub fn validate(&self) -> Result<()> {
    if self.name.trim().is_empty() {
      return Err(Error::Validation("customer name is required".into()));
    }
    if !self.email.contains('@') {
      return Err(Error::Validation(format!("invalid email address {:?}", self.email)));
    }
    Ok(())
  }
}

/// Editable identity attributes. Aggregates are not patchable.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerPatch {
  pub name:         Option<String>,
  pub phone:        Option<String>,
  pub external_ref: Option<String>,
}

// ─── Order ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  pub order_id:     Uuid,
  pub customer_id:  Uuid,
  pub external_ref: Option<String>,
  pub amount:       Decimal,
  pub order_date:   DateTime<Utc>,
  pub items:        Vec<String>,
  pub created_at:   DateTime<Utc>,
}

/// Input to [`crate::store::CrmStore::record_order`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
  pub customer_id:  Uuid,
  pub amount:       Decimal,
  pub order_date:   DateTime<Utc>,
  #[serde(default)]
  pub external_ref: Option<String>,
  #[serde(default)]
  pub items:        Vec<String>,
}

impl NewOrder {
  pub fn validate(&self) -> Result<()> {
    if self.amount <= Decimal::ZERO {
      return Err(Error::Validation(format!(
        "order amount must be positive, got {}",
        self.amount
      )));
    }
    Ok(())
  }
}

// ─── Aggregates ──────────────────────────────────────────────────────────────

/// Customer aggregates derived from a full order history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
  pub total_spend: Decimal,
  pub visit_count: u32,
  pub last_visit:  Option<DateTime<Utc>>,
}

impl OrderTotals {
  /// Fails with [`Error::Validation`] when the spend no longer fits a
  /// [`Decimal`].
  pub fn from_orders<'a>(orders: impl IntoIterator<Item = &'a Order>) -> Result<Self> {
    orders.into_iter().try_fold(
      Self { total_spend: Decimal::ZERO, visit_count: 0, last_visit: None },
      |acc, order| {
        Ok(Self {
          total_spend: add_spend(acc.total_spend, order.amount)?,
          visit_count: acc.visit_count.saturating_add(1),
          last_visit:  acc.last_visit.max(Some(order.order_date)),
        })
      },
    )
  }
}

/// Checked spend addition shared by every store.
pub fn add_spend(total: Decimal, amount: Decimal) -> Result<Decimal> {
  total
    .checked_add(amount)
    .ok_or_else(|| Error::Validation("total spend overflow".into()))
}
