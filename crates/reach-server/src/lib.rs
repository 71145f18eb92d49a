//! Process wiring for the Reach server.
//!
//! Turns a [`ServerConfig`] into a running engine: the delivery queue and
//! its receipt sinks, the rule generator, and the HTTP router with the JSON
//! API mounted under `/api`.

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::Router;
use reach_api::{AppState, api_router};
use reach_campaign::{
  CannedRuleGenerator, DeliveryQueue, DeliverySettings, FallbackSink, HttpReceiptSink,
  HttpRuleGenerator, Reconciler, ReceiptSink, RuleGenerator, SimulatedVendor,
};
use reach_core::store::CrmStore;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `REACH_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:               String,
  #[serde(default = "default_port")]
  pub port:               u16,
  /// Public address of this server. Receipt callbacks are posted here.
  #[serde(default = "default_base_url")]
  pub base_url:           String,
  #[serde(default = "default_store_path")]
  pub store_path:         PathBuf,
  /// When unset, a canned generator answers every query.
  #[serde(default)]
  pub rule_generator_url: Option<String>,
  #[serde(default)]
  pub delivery:           DeliveryConfig,
}

fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 8080 }
fn default_base_url() -> String { "http://localhost:8080".to_string() }
fn default_store_path() -> PathBuf { PathBuf::from("reach.db") }

/// The `[delivery]` section. Durations are in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
  pub success_rate:     f64,
  pub min_latency_ms:   u64,
  pub max_latency_ms:   u64,
  pub max_jitter_ms:    u64,
  pub batch_threshold:  usize,
  pub batch_size:       usize,
  pub batch_pause_ms:   u64,
  /// Report receipts through the public webhook instead of in-process.
  pub receipt_callback: bool,
}

impl Default for DeliveryConfig {
  fn default() -> Self {
    let settings = DeliverySettings::default();
    Self {
      success_rate:     0.9,
      min_latency_ms:   1000,
      max_latency_ms:   4000,
      max_jitter_ms:    settings.max_jitter.as_millis() as u64,
      batch_threshold:  settings.batch_threshold,
      batch_size:       settings.batch_size,
      batch_pause_ms:   settings.batch_pause.as_millis() as u64,
      receipt_callback: true,
    }
  }
}

impl DeliveryConfig {
  pub fn settings(&self) -> DeliverySettings {
    DeliverySettings {
      max_jitter:      Duration::from_millis(self.max_jitter_ms),
      batch_threshold: self.batch_threshold,
      batch_size:      self.batch_size.max(1),
      batch_pause:     Duration::from_millis(self.batch_pause_ms),
    }
  }

  /// An inverted or empty latency range collapses to its lower bound.
  pub fn vendor(&self) -> SimulatedVendor {
    let upper = self.max_latency_ms.max(self.min_latency_ms + 1);
    SimulatedVendor::new(self.min_latency_ms..upper, self.success_rate)
  }
}

// ─── Wiring ───────────────────────────────────────────────────────────────────

/// Build the shared application state for `store`.
///
/// In-process receipts go straight to the reconciler. With
/// `receipt_callback` set they are posted to `{base_url}/api/delivery-receipt`
/// first, falling back to the reconciler when the webhook is unreachable.
pub fn build_state<S>(store: Arc<S>, config: &ServerConfig) -> AppState<S>
where
  S: CrmStore + 'static,
{
  let reconciler = Reconciler::new(Arc::clone(&store));
  let direct: Arc<dyn ReceiptSink> = Arc::new(reconciler.clone());
  let sink: Arc<dyn ReceiptSink> = if config.delivery.receipt_callback {
    Arc::new(FallbackSink::new(Arc::new(HttpReceiptSink::new(&config.base_url)), direct))
  } else {
    direct
  };

  let queue = DeliveryQueue::new(
    Arc::new(config.delivery.vendor()),
    sink,
    config.delivery.settings(),
  );

  let rules: Arc<dyn RuleGenerator> = match &config.rule_generator_url {
    Some(url) => Arc::new(HttpRuleGenerator::new(url.clone())),
    None => Arc::new(CannedRuleGenerator::default()),
  };

  AppState::new(store, queue, reconciler, rules)
}

/// The top-level router: the JSON API under `/api`, wrapped in request
/// tracing.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: CrmStore + 'static,
{
  Router::new()
    .nest("/api", api_router(state))
    .layer(TraceLayer::new_for_http())
}
