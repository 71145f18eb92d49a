//! Segment rules and their compilation into customer predicates.
//!
//! A rule chain is folded strictly left to right: `A OR B AND C` means
//! `(A OR B) AND C`. There is no operator precedence and no grouping. A rule
//! that names an unknown field or operator, or carries a value that cannot be
//! read as a number, compiles to [`Predicate::Nothing`] instead of failing.

use std::{fmt, str::FromStr};

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{Error, Result, customer::Customer};

// ─── Rule ────────────────────────────────────────────────────────────────────

/// How a rule joins the accumulated predicate of the rules before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Logic {
  #[serde(rename = "AND", alias = "and")]
  And,
  #[serde(rename = "OR", alias = "or")]
  Or,
}

/// Rule operands arrive either as JSON numbers or as strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleValue {
  Number(serde_json::Number),
  Text(String),
}

impl RuleValue {
  /// Parse the operand as a decimal number, if it is one.
  pub fn as_decimal(&self) -> Option<Decimal> {
    let text = match self {
      Self::Number(n) => n.to_string(),
      Self::Text(s) => s.trim().to_owned(),
    };
    Decimal::from_str(&text)
      .or_else(|_| Decimal::from_scientific(&text))
      .ok()
  }
}

impl fmt::Display for RuleValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Number(n) => write!(f, "{n}"),
      Self::Text(s) => write!(f, "{s:?}"),
    }
  }
}

impl From<i32> for RuleValue {
  fn from(v: i32) -> Self { Self::Number(v.into()) }
}

impl From<i64> for RuleValue {
  fn from(v: i64) -> Self { Self::Number(v.into()) }
}

impl From<&str> for RuleValue {
  fn from(v: &str) -> Self { Self::Text(v.to_owned()) }
}

/// One user-authored condition. `field` and `operator` are kept as the raw
/// strings the author supplied so that unknown names survive to compilation,
/// where they fail closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRule {
  pub field:    String,
  pub operator: String,
  pub value:    RuleValue,
  /// Ignored on the first rule of a chain; `None` means AND elsewhere.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub logic:    Option<Logic>,
}

impl SegmentRule {
  pub fn new(
    field: impl Into<String>,
    operator: impl Into<String>,
    value: impl Into<RuleValue>,
  ) -> Self {
    Self {
      field:    field.into(),
      operator: operator.into(),
      value:    value.into(),
      logic:    None,
    }
  }

  pub fn and(mut self) -> Self {
    self.logic = Some(Logic::And);
    self
  }

  pub fn or(mut self) -> Self {
    self.logic = Some(Logic::Or);
    self
  }
}

// ─── Vocabulary ──────────────────────────────────────────────────────────────

/// Customer attributes a rule may test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum Field {
  #[strum(to_string = "totalSpend", serialize = "total_spend")]
  TotalSpend,
  #[strum(to_string = "visitCount", serialize = "visit_count")]
  VisitCount,
  #[strum(to_string = "lastVisit", serialize = "last_visit")]
  LastVisit,
  #[strum(to_string = "registrationDate", serialize = "registration_date")]
  RegistrationDate,
}

impl Field {
  fn date_field(self) -> Option<DateField> {
    match self {
      Self::LastVisit => Some(DateField::LastVisit),
      Self::RegistrationDate => Some(DateField::RegistrationDate),
      Self::TotalSpend | Self::VisitCount => None,
    }
  }
}

/// Rule operators, including the long-form spellings the rule builder and the
/// rule generator emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum Operator {
  #[strum(to_string = "gt", serialize = "greater than", serialize = "greater_than")]
  Greater,
  #[strum(to_string = "lt", serialize = "less than", serialize = "less_than")]
  Less,
  #[strum(
    to_string = "gte",
    serialize = "greater than or equal",
    serialize = "greater_than_or_equal"
  )]
  GreaterOrEqual,
  #[strum(
    to_string = "lte",
    serialize = "less than or equal",
    serialize = "less_than_or_equal"
  )]
  LessOrEqual,
  #[strum(
    to_string = "eq",
    serialize = "equal to",
    serialize = "equal_to",
    serialize = "equals"
  )]
  Equal,
  #[strum(
    to_string = "days_ago",
    serialize = "more than days ago",
    serialize = "more_than_days_ago"
  )]
  DaysAgo,
  #[strum(to_string = "less_than_days_ago", serialize = "less than days ago")]
  LessThanDaysAgo,
}

impl Operator {
  fn comparison(self) -> Option<Comparison> {
    match self {
      Self::Greater => Some(Comparison::Greater),
      Self::Less => Some(Comparison::Less),
      Self::GreaterOrEqual => Some(Comparison::GreaterOrEqual),
      Self::LessOrEqual => Some(Comparison::LessOrEqual),
      Self::Equal => Some(Comparison::Equal),
      Self::DaysAgo | Self::LessThanDaysAgo => None,
    }
  }
}

// ─── Predicate ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
  Greater,
  Less,
  GreaterOrEqual,
  LessOrEqual,
  Equal,
}

impl Comparison {
  /// `lhs <op> rhs`
  pub fn holds<T: PartialOrd>(self, lhs: &T, rhs: &T) -> bool {
    match self {
      Self::Greater => lhs > rhs,
      Self::Less => lhs < rhs,
      Self::GreaterOrEqual => lhs >= rhs,
      Self::LessOrEqual => lhs <= rhs,
      Self::Equal => lhs == rhs,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateField {
  LastVisit,
  RegistrationDate,
}

/// A compiled selection over customers.
///
/// Callers apply it with [`Predicate::matches`]; storage backends may instead
/// translate it into their own query language. Relative date thresholds are
/// resolved to absolute instants at compile time.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
  All,
  Nothing,
  Spend(Comparison, Decimal),
  Visits(Comparison, i64),
  Date(DateField, Comparison, DateTime<Utc>),
  /// A head followed by links, each folded into the running result in turn:
  /// `((head op₁ p₁) op₂ p₂) …`. Kept flat so long chains never nest.
  Chain(Box<Predicate>, Vec<(Logic, Predicate)>),
}

impl Predicate {
  pub fn matches(&self, customer: &Customer) -> bool {
    match self {
      Self::All => true,
      Self::Nothing => false,
      Self::Spend(cmp, value) => cmp.holds(&customer.total_spend, value),
      Self::Visits(cmp, value) => cmp.holds(&i64::from(customer.visit_count), value),
      // A customer who never visited matches no last-visit condition.
      Self::Date(DateField::LastVisit, cmp, threshold) => customer
        .last_visit
        .is_some_and(|at| cmp.holds(&at, threshold)),
      Self::Date(DateField::RegistrationDate, cmp, threshold) => {
        cmp.holds(&customer.registration_date, threshold)
      }
      Self::Chain(head, links) => {
        links.iter().fold(head.matches(customer), |acc, (logic, link)| match logic {
          Logic::And => acc && link.matches(customer),
          Logic::Or => acc || link.matches(customer),
        })
      }
    }
  }
}

// ─── Compilation ─────────────────────────────────────────────────────────────

/// Compile a single rule into an atomic predicate. Never fails.
pub fn compile(rule: &SegmentRule, now: DateTime<Utc>) -> Predicate {
  let (Ok(field), Ok(operator)) =
    (rule.field.parse::<Field>(), rule.operator.parse::<Operator>())
  else {
    return Predicate::Nothing;
  };
  let Some(value) = rule.value.as_decimal() else {
    return Predicate::Nothing;
  };

  match (field, operator.comparison()) {
    (Field::TotalSpend, Some(cmp)) => Predicate::Spend(cmp, value),
    (Field::VisitCount, Some(cmp)) => value
      .trunc()
      .to_i64()
      .map_or(Predicate::Nothing, |visits| Predicate::Visits(cmp, visits)),
    (Field::LastVisit | Field::RegistrationDate, None) => {
      relative_date(field, operator, value, now)
    }
    _ => Predicate::Nothing,
  }
}

fn relative_date(
  field: Field,
  operator: Operator,
  days: Decimal,
  now: DateTime<Utc>,
) -> Predicate {
  let Some(date_field) = field.date_field() else {
    return Predicate::Nothing;
  };
  // `days_ago`: the timestamp is older than the threshold.
  let cmp = match operator {
    Operator::DaysAgo => Comparison::Less,
    Operator::LessThanDaysAgo => Comparison::Greater,
    _ => return Predicate::Nothing,
  };
  days
    .trunc()
    .to_i64()
    .and_then(TimeDelta::try_days)
    .and_then(|delta| now.checked_sub_signed(delta))
    .map_or(Predicate::Nothing, |threshold| {
      Predicate::Date(date_field, cmp, threshold)
    })
}

/// Fold a rule chain into one predicate, left to right.
///
/// The first rule's logic is ignored; later rules without logic join with
/// AND. An empty chain selects every customer.
pub fn evaluate(rules: &[SegmentRule], now: DateTime<Utc>) -> Predicate {
  let Some((first, rest)) = rules.split_first() else {
    return Predicate::All;
  };
  let head = compile(first, now);
  if rest.is_empty() {
    return head;
  }
  let links = rest
    .iter()
    .map(|rule| (rule.logic.unwrap_or(Logic::And), compile(rule, now)))
    .collect();
  Predicate::Chain(Box::new(head), links)
}

// ─── Validation ──────────────────────────────────────────────────────────────

/// Clear the logic tag on the first rule; it has nothing to join.
pub fn normalize_rules(mut rules: Vec<SegmentRule>) -> Vec<SegmentRule> {
  if let Some(first) = rules.first_mut() {
    first.logic = None;
  }
  rules
}

/// Longest rule chain a segment may carry.
pub const MAX_RULES: usize = 100;

/// Reject over-long chains and rules on known fields whose operand is
/// unusable.
///
/// Unknown fields and operators pass: they are not malformed, they simply
/// select nobody.
pub fn validate_rules(rules: &[SegmentRule]) -> Result<()> {
  if rules.len() > MAX_RULES {
    return Err(Error::InvalidRule {
      index:  MAX_RULES,
      reason: format!("at most {MAX_RULES} rules are allowed, got {}", rules.len()),
    });
  }
  for (index, rule) in rules.iter().enumerate() {
    let Ok(field) = rule.field.parse::<Field>() else {
      continue;
    };
    let value = rule.value.as_decimal().ok_or_else(|| Error::InvalidRule {
      index,
      reason: format!("{field} expects a number, got {}", rule.value),
    })?;
    if field.date_field().is_some() && value.is_sign_negative() {
      return Err(Error::InvalidRule {
        index,
        reason: format!("day count must not be negative, got {value}"),
      });
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use uuid::Uuid;

  use super::*;

  fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
      .unwrap()
      .with_timezone(&Utc)
  }

  fn customer(spend: &str, visits: u32, last_visit_days_ago: Option<i64>) -> Customer {
    Customer {
      customer_id:       Uuid::new_v4(),
      external_ref:      None,
      name:              "Test Customer".into(),
      email:             format!("{}@example.com", Uuid::new_v4()),
      phone:             None,
      total_spend:       spend.parse().unwrap(),
      visit_count:       visits,
      last_visit:        last_visit_days_ago.map(|d| now() - TimeDelta::days(d)),
      registration_date: now() - TimeDelta::days(400),
      created_at:        now(),
      updated_at:        now(),
    }
  }

  fn select<'a>(rules: &[SegmentRule], customers: &'a [Customer]) -> Vec<&'a Customer> {
    let predicate = evaluate(rules, now());
    customers.iter().filter(|c| predicate.matches(c)).collect()
  }

  // ── Chain folding ─────────────────────────────────────────────────────────

  #[test]
  fn chain_is_left_associative() {
    let a = SegmentRule::new("totalSpend", "gt", 10000);
    let b = SegmentRule::new("visitCount", "gt", 5).or();
    let c = SegmentRule::new("lastVisit", "less_than_days_ago", 30).and();

    let customers = vec![
      // A only: (A OR B) AND C is false, A OR (B AND C) would be true.
      customer("15000", 1, Some(60)),
      // A and C.
      customer("15000", 1, Some(5)),
      // B and C.
      customer("100", 9, Some(5)),
      // None.
      customer("100", 1, Some(60)),
    ];

    let selected = select(&[a.clone(), b.clone(), c.clone()], &customers);

    let (pa, pb, pc) = (compile(&a, now()), compile(&b, now()), compile(&c, now()));
    let left: Vec<_> = customers
      .iter()
      .filter(|x| (pa.matches(x) || pb.matches(x)) && pc.matches(x))
      .collect();
    let right: Vec<_> = customers
      .iter()
      .filter(|x| pa.matches(x) || (pb.matches(x) && pc.matches(x)))
      .collect();

    assert_eq!(selected, left);
    assert_ne!(selected, right);
    assert_eq!(selected.len(), 2);
  }

  #[test]
  fn long_chains_stay_flat() {
    // OR links revive the failing head; the closing AND decides.
    let mut rules = vec![SegmentRule::new("totalSpend", "gt", 1_000_000)];
    rules.extend((1..5_000).map(|i| {
      let rule = SegmentRule::new("visitCount", "gte", i % 3);
      if i % 2 == 0 { rule.or() } else { rule.and() }
    }));
    rules.push(SegmentRule::new("visitCount", "gte", 3).and());
    let predicate = evaluate(&rules, now());
    let Predicate::Chain(_, links) = &predicate else {
      panic!("expected a flat chain, got {predicate:?}");
    };
    assert_eq!(links.len(), 5_000);
    assert!(predicate.matches(&customer("10", 3, None)));
    assert!(!predicate.matches(&customer("10", 1, None)));
  }

  #[test]
  fn single_rule_compiles_without_a_chain() {
    let rule = SegmentRule::new("visitCount", "gt", 2);
    assert_eq!(evaluate(std::slice::from_ref(&rule), now()), compile(&rule, now()));
  }

  #[test]
  fn empty_chain_selects_everyone() {
    let customers = vec![customer("0", 0, None), customer("50", 2, Some(3))];
    assert_eq!(select(&[], &customers).len(), 2);
    assert_eq!(evaluate(&[], now()), Predicate::All);
  }

  #[test]
  fn missing_logic_defaults_to_and() {
    let rules = [
      SegmentRule::new("totalSpend", "gt", 100),
      SegmentRule::new("visitCount", "gt", 2),
    ];
    let customers = vec![customer("500", 1, None), customer("500", 3, None)];
    assert_eq!(select(&rules, &customers).len(), 1);
  }

  #[test]
  fn first_rule_logic_is_ignored() {
    let rules = [SegmentRule::new("totalSpend", "gt", 100).or()];
    let customers = vec![customer("500", 1, None), customer("5", 1, None)];
    assert_eq!(select(&rules, &customers).len(), 1);
  }

  // ── Fail-closed compilation ───────────────────────────────────────────────

  #[test]
  fn unknown_field_selects_nobody() {
    let rules = [SegmentRule::new("favouriteColour", "eq", "blue")];
    let customers = vec![customer("500", 1, None), customer("5", 1, None)];
    assert!(select(&rules, &customers).is_empty());
  }

  #[test]
  fn unknown_operator_selects_nobody() {
    let rules = [SegmentRule::new("totalSpend", "between", 100)];
    let customers = vec![customer("500", 1, None)];
    assert!(select(&rules, &customers).is_empty());
  }

  #[test]
  fn date_operator_on_numeric_field_selects_nobody() {
    let rule = SegmentRule::new("totalSpend", "days_ago", 10);
    assert_eq!(compile(&rule, now()), Predicate::Nothing);
  }

  #[test]
  fn unparseable_value_selects_nobody() {
    let rule = SegmentRule::new("totalSpend", "gt", "lots");
    assert_eq!(compile(&rule, now()), Predicate::Nothing);
  }

  // ── Numeric conditions ────────────────────────────────────────────────────

  #[test]
  fn spend_threshold_counts_two_of_three() {
    let rules = [SegmentRule::new("totalSpend", "gt", 10000)];
    let customers = vec![
      customer("5000", 1, None),
      customer("15000", 1, None),
      customer("25000", 1, None),
    ];
    assert_eq!(select(&rules, &customers).len(), 2);
  }

  #[test]
  fn long_form_operator_aliases_are_accepted() {
    for op in ["greater than", "greater_than", "GT", "gt"] {
      let rule = SegmentRule::new("totalSpend", op, "100");
      assert!(
        matches!(compile(&rule, now()), Predicate::Spend(Comparison::Greater, _)),
        "operator {op:?}"
      );
    }
    let rule = SegmentRule::new("visitCount", "equal to", 3);
    assert_eq!(compile(&rule, now()), Predicate::Visits(Comparison::Equal, 3));
  }

  #[test]
  fn visit_count_operand_is_truncated() {
    let rule = SegmentRule::new("visitCount", "gte", "4.9");
    assert_eq!(
      compile(&rule, now()),
      Predicate::Visits(Comparison::GreaterOrEqual, 4)
    );
  }

  #[test]
  fn spend_is_compared_exactly() {
    let rules = [SegmentRule::new("totalSpend", "eq", "99.99")];
    let customers = vec![customer("99.99", 1, None), customer("99.990001", 1, None)];
    assert_eq!(select(&rules, &customers).len(), 1);
  }

  // ── Date conditions ───────────────────────────────────────────────────────

  #[test]
  fn days_ago_selects_customers_older_than_threshold() {
    let rules = [SegmentRule::new("lastVisit", "days_ago", 30)];
    let customers = vec![
      customer("0", 1, Some(45)),
      customer("0", 1, Some(10)),
      customer("0", 0, None),
    ];
    let selected = select(&rules, &customers);
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].customer_id, customers[0].customer_id);
  }

  #[test]
  fn less_than_days_ago_is_the_complement_for_visited_customers() {
    let rules = [SegmentRule::new("lastVisit", "less than days ago", 30)];
    let customers = vec![
      customer("0", 1, Some(45)),
      customer("0", 1, Some(10)),
      customer("0", 0, None),
    ];
    let selected = select(&rules, &customers);
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].customer_id, customers[1].customer_id);
  }

  #[test]
  fn registration_date_resolves_threshold_at_compile_time() {
    let rule = SegmentRule::new("registrationDate", "days_ago", 365);
    assert_eq!(
      compile(&rule, now()),
      Predicate::Date(
        DateField::RegistrationDate,
        Comparison::Less,
        now() - TimeDelta::days(365)
      )
    );
  }

  // ── Validation ────────────────────────────────────────────────────────────

  #[test]
  fn validation_rejects_non_numeric_operand_on_known_field() {
    let rules = [
      SegmentRule::new("totalSpend", "gt", 10),
      SegmentRule::new("visitCount", "gt", "many").and(),
    ];
    let err = validate_rules(&rules).unwrap_err();
    assert!(matches!(err, Error::InvalidRule { index: 1, .. }), "{err}");
  }

  #[test]
  fn validation_rejects_negative_day_count() {
    let rules = [SegmentRule::new("lastVisit", "days_ago", -3)];
    assert!(validate_rules(&rules).is_err());
  }

  #[test]
  fn validation_caps_chain_length() {
    let rules = vec![SegmentRule::new("visitCount", "gt", 1); MAX_RULES];
    assert!(validate_rules(&rules).is_ok());

    let rules = vec![SegmentRule::new("visitCount", "gt", 1); MAX_RULES + 1];
    let err = validate_rules(&rules).unwrap_err();
    assert!(matches!(err, Error::InvalidRule { index: MAX_RULES, .. }), "{err}");
  }

  #[test]
  fn validation_lets_unknown_fields_through() {
    let rules = [SegmentRule::new("shoeSize", "gt", "large")];
    assert!(validate_rules(&rules).is_ok());
  }

  #[test]
  fn normalize_clears_first_logic_only() {
    let rules = normalize_rules(vec![
      SegmentRule::new("totalSpend", "gt", 1).or(),
      SegmentRule::new("visitCount", "gt", 1).or(),
    ]);
    assert_eq!(rules[0].logic, None);
    assert_eq!(rules[1].logic, Some(Logic::Or));
  }

  #[test]
  fn rules_deserialize_from_builder_json() {
    let json = r#"[
      {"field": "totalSpend", "operator": "gt", "value": "10000"},
      {"field": "visitCount", "operator": "lt", "value": 5, "logic": "OR"}
    ]"#;
    let rules: Vec<SegmentRule> = serde_json::from_str(json).unwrap();
    assert_eq!(rules.len(), 2);
    assert_eq!(rules[1].logic, Some(Logic::Or));
    assert_eq!(rules[1].value.as_decimal(), Some(Decimal::from(5)));
  }
}
