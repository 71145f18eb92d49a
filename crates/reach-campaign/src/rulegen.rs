//! Turning a free-text audience description into a rule chain.
//!
//! The generator itself is a boundary: [`CannedRuleGenerator`] answers every
//! query with the same chain and needs no network, [`HttpRuleGenerator`]
//! delegates to an external service. Either way the output goes through
//! [`suggest_rules`], which validates it and clears the first rule's logic.

use async_trait::async_trait;
use reach_core::rule::{SegmentRule, normalize_rules, validate_rules};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

#[async_trait]
pub trait RuleGenerator: Send + Sync {
  async fn generate(&self, query: &str) -> Result<Vec<SegmentRule>>;
}

/// Ask `generator` for rules matching `query`.
pub async fn suggest_rules(
  generator: &dyn RuleGenerator,
  query: &str,
) -> Result<Vec<SegmentRule>> {
  let query = query.trim();
  if query.is_empty() {
    return Err(reach_core::Error::Validation("query is required".into()).into());
  }
  let rules = generator.generate(query).await?;
  validate_rules(&rules)?;
  debug!(query, rules = rules.len(), "rules generated");
  Ok(normalize_rules(rules))
}

// ─── Canned ──────────────────────────────────────────────────────────────────

/// Always answers with the same rules.
#[derive(Debug, Clone)]
pub struct CannedRuleGenerator {
  rules: Vec<SegmentRule>,
}

impl CannedRuleGenerator {
  pub fn new(rules: Vec<SegmentRule>) -> Self { Self { rules } }
}

impl Default for CannedRuleGenerator {
  /// High spenders, or anyone who rarely visits.
  fn default() -> Self {
    Self::new(vec![
      SegmentRule::new("totalSpend", "greater_than", 10000).and(),
      SegmentRule::new("visitCount", "less_than", 5).or(),
    ])
  }
}

#[async_trait]
impl RuleGenerator for CannedRuleGenerator {
  async fn generate(&self, _query: &str) -> Result<Vec<SegmentRule>> { Ok(self.rules.clone()) }
}

// ─── HTTP ────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct GenerateRequest<'a> {
  query: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
  rules: Vec<SegmentRule>,
}

/// Posts `{"query": ...}` to an endpoint that answers `{"rules": [...]}`.
#[derive(Debug, Clone)]
pub struct HttpRuleGenerator {
  client:   reqwest::Client,
  endpoint: String,
}

impl HttpRuleGenerator {
  pub fn new(endpoint: impl Into<String>) -> Self {
    Self { client: reqwest::Client::new(), endpoint: endpoint.into() }
  }
}

#[async_trait]
impl RuleGenerator for HttpRuleGenerator {
  async fn generate(&self, query: &str) -> Result<Vec<SegmentRule>> {
    let response: GenerateResponse = self
      .client
      .post(&self.endpoint)
      .json(&GenerateRequest { query })
      .send()
      .await
      .and_then(reqwest::Response::error_for_status)
      .map_err(|e| Error::RuleGenerator(e.to_string()))?
      .json()
      .await
      .map_err(|e| Error::RuleGenerator(e.to_string()))?;
    Ok(response.rules)
  }
}
