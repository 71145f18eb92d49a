//! Async HTTP client wrapping the Reach JSON API.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reach_core::{
  campaign::{Campaign, CampaignStats},
  customer::{Customer, Order},
  message::CommunicationLog,
  rule::SegmentRule,
  segment::Segment,
};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use uuid::Uuid;

/// Result of a create-and-launch or launch call.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchSummary {
  pub campaign:        Campaign,
  pub messages_queued: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignInput {
  pub name:       String,
  pub segment_id: Uuid,
  pub message:    String,
  pub channel:    String,
}

/// Async HTTP client for the Reach JSON REST API.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct ApiClient {
  client:   Client,
  base_url: String,
}

impl ApiClient {
  pub fn new(base_url: impl Into<String>) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client, base_url: base_url.into() })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/api{}", self.base_url.trim_end_matches('/'), path)
  }

  fn request(&self, method: Method, path: &str) -> RequestBuilder {
    self.client.request(method, self.url(path))
  }

  /// Send `req` and fail with the server's `{"error"}` message on a
  /// non-2xx status.
  async fn send(&self, req: RequestBuilder, label: &str) -> Result<Response> {
    let resp = req.send().await.with_context(|| format!("{label} failed"))?;
    let status = resp.status();
    if status.is_success() {
      return Ok(resp);
    }
    let message = resp
      .json::<Value>()
      .await
      .ok()
      .and_then(|body| body.get("error").and_then(Value::as_str).map(str::to_owned))
      .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_owned());
    Err(anyhow!("{label} → {status}: {message}"))
  }

  async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
    let label = format!("GET {path}");
    let resp = self.send(self.request(Method::GET, path), &label).await?;
    resp.json().await.with_context(|| format!("deserialising {label}"))
  }

  async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
    &self,
    path: &str,
    body: &B,
  ) -> Result<T> {
    let label = format!("POST {path}");
    let resp = self.send(self.request(Method::POST, path).json(body), &label).await?;
    resp.json().await.with_context(|| format!("deserialising {label}"))
  }

  // ── Customers & orders ────────────────────────────────────────────────────

  pub async fn list_customers(&self) -> Result<Vec<Customer>> { self.get("/customers").await }

  pub async fn get_customer(&self, id: Uuid) -> Result<Customer> {
    self.get(&format!("/customers/{id}")).await
  }

  pub async fn create_customer(
    &self,
    name: &str,
    email: &str,
    phone: Option<&str>,
  ) -> Result<Customer> {
    self
      .post("/customers", &json!({ "name": name, "email": email, "phone": phone }))
      .await
  }

  pub async fn customer_orders(&self, id: Uuid) -> Result<Vec<Order>> {
    self.get(&format!("/customers/{id}/orders")).await
  }

  /// `amount` is sent verbatim; the server parses and validates it.
  pub async fn record_order(
    &self,
    customer_id: Uuid,
    amount: &str,
    order_date: chrono::DateTime<chrono::Utc>,
    items: &[String],
  ) -> Result<Order> {
    self
      .post(
        "/orders",
        &json!({
          "customerId": customer_id,
          "amount": amount,
          "orderDate": order_date,
          "items": items,
        }),
      )
      .await
  }

  // ── Segments ──────────────────────────────────────────────────────────────

  pub async fn list_segments(&self) -> Result<Vec<Segment>> { self.get("/segments").await }

  pub async fn preview_segment(&self, rules: &[SegmentRule]) -> Result<u64> {
    let body: Value = self.post("/segments/preview", &json!({ "rules": rules })).await?;
    body
      .get("audienceSize")
      .and_then(Value::as_u64)
      .ok_or_else(|| anyhow!("preview response has no audienceSize"))
  }

  pub async fn create_segment(
    &self,
    name: &str,
    description: Option<&str>,
    rules: &[SegmentRule],
  ) -> Result<Segment> {
    self
      .post(
        "/segments",
        &json!({ "name": name, "description": description, "rules": rules }),
      )
      .await
  }

  pub async fn delete_segment(&self, id: Uuid) -> Result<()> {
    let path = format!("/segments/{id}");
    self.send(self.request(Method::DELETE, &path), &format!("DELETE {path}")).await?;
    Ok(())
  }

  pub async fn suggest_rules(&self, query: &str) -> Result<Vec<SegmentRule>> {
    #[derive(Deserialize)]
    struct Suggestion {
      rules: Vec<SegmentRule>,
    }
    let body: Suggestion = self.post("/ai/segments", &json!({ "query": query })).await?;
    Ok(body.rules)
  }

  // ── Campaigns ─────────────────────────────────────────────────────────────

  pub async fn list_campaigns(&self) -> Result<Vec<Campaign>> { self.get("/campaigns").await }

  pub async fn get_campaign(&self, id: Uuid) -> Result<Campaign> {
    self.get(&format!("/campaigns/{id}")).await
  }

  pub async fn create_and_launch(&self, input: &CampaignInput) -> Result<LaunchSummary> {
    self.post("/campaigns", input).await
  }

  pub async fn create_draft(&self, input: &CampaignInput) -> Result<Campaign> {
    self.post("/campaigns/drafts", input).await
  }

  pub async fn launch(&self, id: Uuid) -> Result<LaunchSummary> {
    self.post(&format!("/campaigns/{id}/launch"), &json!({})).await
  }

  pub async fn campaign_logs(&self, id: Uuid) -> Result<Vec<CommunicationLog>> {
    self.get(&format!("/campaigns/{id}/logs")).await
  }

  pub async fn refresh_stats(&self, id: Uuid) -> Result<CampaignStats> {
    self.post(&format!("/campaigns/{id}/stats"), &json!({})).await
  }

  // ── Analytics ─────────────────────────────────────────────────────────────

  /// The overview is printed field by field, so it stays untyped here.
  pub async fn overview(&self) -> Result<Value> { self.get("/analytics/overview").await }
}
