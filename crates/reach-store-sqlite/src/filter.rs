//! Translation of compiled audience predicates into SQL.
//!
//! Placeholders are anonymous `?`, bound in the order the clause is rendered.
//! A comparison against a `NULL` column yields `NULL`, which a `WHERE` clause
//! treats as false, so customers without a last visit fall out of every
//! last-visit condition exactly as they do in memory.
//!
//! Spend is compared on `spend_key`, so decimals are ordered exactly rather
//! than through a lossy `REAL` cast.
//!
//! A chain is rendered without nesting. Folding `c₀ op₁ c₁ … opₙ cₙ` left to
//! right is true exactly when some anchor `cⱼ` (the head, or any `OR` link)
//! holds together with every `AND` link after it, so the clause is an `OR` of
//! such conjunctions and its depth does not grow with the chain.

use reach_core::rule::{Comparison, DateField, Logic, Predicate};
use rusqlite::types::Value;

use crate::encode::{encode_dt, encode_spend_key};

/// A rendered `WHERE` clause body and its bound values.
pub struct Filter {
  pub clause: String,
  pub params: Vec<Value>,
}

impl Filter {
  pub fn new(predicate: &Predicate) -> Self {
    let mut params = Vec::new();
    let clause = render(predicate, &mut params);
    Self { clause, params }
  }
}

fn op(cmp: Comparison) -> &'static str {
  match cmp {
    Comparison::Greater => ">",
    Comparison::Less => "<",
    Comparison::GreaterOrEqual => ">=",
    Comparison::LessOrEqual => "<=",
    Comparison::Equal => "=",
  }
}

fn render(predicate: &Predicate, params: &mut Vec<Value>) -> String {
  match predicate {
    Predicate::All => "1 = 1".to_owned(),
    Predicate::Nothing => "0 = 1".to_owned(),
    Predicate::Spend(cmp, value) => match encode_spend_key(*value) {
      Some(key) => {
        params.push(Value::Text(key));
        format!("spend_key {} ?", op(*cmp))
      }
      // Spend is never negative.
      None => match cmp {
        Comparison::Greater | Comparison::GreaterOrEqual => "1 = 1".to_owned(),
        _ => "0 = 1".to_owned(),
      },
    },
    Predicate::Visits(cmp, value) => {
      params.push(Value::Integer(*value));
      format!("visit_count {} ?", op(*cmp))
    }
    Predicate::Date(field, cmp, threshold) => {
      let column = match field {
        DateField::LastVisit => "last_visit",
        DateField::RegistrationDate => "registration_date",
      };
      params.push(Value::Text(encode_dt(*threshold)));
      format!("{column} {} ?", op(*cmp))
    }
    Predicate::Chain(head, links) => {
      let terms: Vec<(Logic, &Predicate)> = std::iter::once((Logic::Or, &**head))
        .chain(links.iter().map(|(logic, link)| (*logic, link)))
        .collect();
      let mut disjuncts = Vec::new();
      for (i, (logic, anchor)) in terms.iter().enumerate() {
        if *logic != Logic::Or {
          continue;
        }
        let mut conjuncts = vec![render(anchor, params)];
        for (logic, link) in &terms[i + 1..] {
          if *logic == Logic::And {
            conjuncts.push(render(link, params));
          }
        }
        disjuncts.push(format!("({})", conjuncts.join(" AND ")));
      }
      format!("({})", disjuncts.join(" OR "))
    }
  }
}
