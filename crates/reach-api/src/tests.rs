//! Router tests driven through `tower::ServiceExt::oneshot`.

use std::{sync::Arc, time::Duration};

use axum::{
  body::Body,
  http::{Request, StatusCode, header},
};
use reach_campaign::{
  CannedRuleGenerator, DeliveryQueue, DeliverySettings, Reconciler, SimulatedVendor,
};
use reach_store_memory::MemoryStore;
use serde_json::{Value, json};
use tower::ServiceExt as _;
use uuid::Uuid;

use crate::{AppState, api_router};

fn make_state() -> AppState<MemoryStore> {
  let store = Arc::new(MemoryStore::new());
  let reconciler = Reconciler::new(Arc::clone(&store));
  let queue = DeliveryQueue::new(
    Arc::new(SimulatedVendor::new(0..1, 1.0)),
    Arc::new(reconciler.clone()),
    DeliverySettings { max_jitter: Duration::ZERO, ..Default::default() },
  );
  AppState::new(store, queue, reconciler, Arc::new(CannedRuleGenerator::default()))
}

async fn call(
  state: &AppState<MemoryStore>,
  method: &str,
  uri: &str,
  body: Option<Value>,
) -> (StatusCode, Value) {
  let builder = Request::builder()
    .method(method)
    .uri(uri)
    .header(header::CONTENT_TYPE, "application/json");
  let req = match body {
    Some(json) => builder.body(Body::from(json.to_string())).unwrap(),
    None => builder.body(Body::empty()).unwrap(),
  };
  let resp = api_router(state.clone()).oneshot(req).await.unwrap();
  let status = resp.status();
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let value = if bytes.is_empty() {
    Value::Null
  } else {
    serde_json::from_slice(&bytes).unwrap()
  };
  (status, value)
}

async fn add_customer(state: &AppState<MemoryStore>, name: &str, spend: &str) -> String {
  let email = format!("{}@example.com", name.to_lowercase());
  let (status, customer) =
    call(state, "POST", "/customers", Some(json!({ "name": name, "email": email }))).await;
  assert_eq!(status, StatusCode::CREATED);
  let id = customer["customerId"].as_str().unwrap().to_owned();

  let (status, _) = call(
    state,
    "POST",
    "/orders",
    Some(json!({
      "customerId": id,
      "amount": spend,
      "orderDate": "2025-01-15T10:00:00Z",
      "items": ["saree"],
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  id
}

async fn add_segment(state: &AppState<MemoryStore>, rules: Value) -> String {
  let (status, segment) =
    call(state, "POST", "/segments", Some(json!({ "name": "Audience", "rules": rules }))).await;
  assert_eq!(status, StatusCode::CREATED, "{segment}");
  segment["segmentId"].as_str().unwrap().to_owned()
}

// ─── Customers & orders ──────────────────────────────────────────────────────

#[tokio::test]
async fn customers_are_created_once_per_email() {
  let state = make_state();
  let body = json!({ "name": "Priya Patel", "email": "priya@example.com" });

  let (status, _) = call(&state, "POST", "/customers", Some(body.clone())).await;
  assert_eq!(status, StatusCode::CREATED);
  let (status, err) = call(&state, "POST", "/customers", Some(body)).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert!(err["error"].as_str().unwrap().contains("priya@example.com"));

  let (status, _) = call(
    &state,
    "POST",
    "/customers",
    Some(json!({ "name": "No Email", "email": "nope" })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn orders_update_customer_aggregates() {
  let state = make_state();
  let id = add_customer(&state, "Raj", "2500.50").await;

  let (status, customer) = call(&state, "GET", &format!("/customers/{id}"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(customer["visitCount"], 1);
  assert_eq!(customer["totalSpend"], "2500.50");
  assert_eq!(customer["lastVisit"], "2025-01-15T10:00:00Z");

  let (status, orders) = call(&state, "GET", &format!("/customers/{id}/orders"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(orders.as_array().unwrap().len(), 1);

  let (status, _) = call(
    &state,
    "POST",
    "/orders",
    Some(json!({ "customerId": id, "amount": "-5", "orderDate": "2025-01-16T10:00:00Z" })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, _) = call(
    &state,
    "POST",
    "/orders",
    Some(json!({
      "customerId": Uuid::new_v4(),
      "amount": "5",
      "orderDate": "2025-01-16T10:00:00Z",
    })),
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn customer_patch_keeps_aggregates() {
  let state = make_state();
  let id = add_customer(&state, "Sneha", "100").await;

  let (status, customer) = call(
    &state,
    "PATCH",
    &format!("/customers/{id}"),
    Some(json!({ "phone": "+91 90000 00000" })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(customer["phone"], "+91 90000 00000");
  assert_eq!(customer["visitCount"], 1);

  let (status, _) = call(&state, "GET", &format!("/customers/{}", Uuid::new_v4()), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

// ─── Segments ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn preview_counts_without_storing() {
  let state = make_state();
  add_customer(&state, "Priya", "15000").await;
  add_customer(&state, "Raj", "5000").await;

  let rules = json!([
    { "field": "totalSpend", "operator": "greater than", "value": 10000 },
    { "field": "visitCount", "operator": "gt", "value": "5", "logic": "OR" },
  ]);
  let (status, body) =
    call(&state, "POST", "/segments/preview", Some(json!({ "rules": rules }))).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["audienceSize"], 1);

  let (_, segments) = call(&state, "GET", "/segments", None).await;
  assert!(segments.as_array().unwrap().is_empty());

  let (status, _) = call(
    &state,
    "POST",
    "/segments/preview",
    Some(json!({ "rules": [{ "field": "totalSpend", "operator": "gt", "value": "lots" }] })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, err) = call(
    &state,
    "POST",
    "/segments/preview",
    Some(json!({ "rules": [
      { "field": "totalSpend", "operator": "gt", "value": 1 },
      { "field": "visitCount", "operator": "gt", "value": 1, "logic": "XOR" },
    ] })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(err["error"].is_string());

  let too_many: Vec<_> = (0..=reach_core::rule::MAX_RULES)
    .map(|_| json!({ "field": "visitCount", "operator": "gt", "value": 1, "logic": "OR" }))
    .collect();
  let (status, _) =
    call(&state, "POST", "/segments/preview", Some(json!({ "rules": too_many }))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn segments_store_a_normalised_snapshot() {
  let state = make_state();
  add_customer(&state, "Priya", "15000").await;

  let id = add_segment(
    &state,
    json!([{ "field": "totalSpend", "operator": "gt", "value": 1000, "logic": "OR" }]),
  )
  .await;

  let (status, segment) = call(&state, "GET", &format!("/segments/{id}"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(segment["audienceSize"], 1);
  assert!(segment["rules"][0].get("logic").is_none());

  let (status, segment) = call(
    &state,
    "PATCH",
    &format!("/segments/{id}"),
    Some(json!({ "rules": [{ "field": "totalSpend", "operator": "gt", "value": 50000 }] })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(segment["audienceSize"], 0);

  let (status, _) = call(&state, "DELETE", &format!("/segments/{id}"), None).await;
  assert_eq!(status, StatusCode::NO_CONTENT);
  let (status, _) = call(&state, "GET", &format!("/segments/{id}"), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rule_generator_returns_normalised_rules() {
  let state = make_state();
  let (status, body) = call(
    &state,
    "POST",
    "/ai/segments",
    Some(json!({ "query": "big spenders who rarely visit" })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  let rules = body["rules"].as_array().unwrap();
  assert_eq!(rules.len(), 2);
  assert!(rules[0].get("logic").is_none());
  assert_eq!(rules[1]["logic"], "OR");

  let (status, _) = call(&state, "POST", "/ai/segments", Some(json!({ "query": "" }))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ─── Campaigns ───────────────────────────────────────────────────────────────

async fn wait_until_completed(state: &AppState<MemoryStore>, id: &str) -> Value {
  for _ in 0..200 {
    let (_, campaign) = call(state, "GET", &format!("/campaigns/{id}"), None).await;
    if campaign["status"] == "completed" {
      return campaign;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  panic!("campaign {id} never completed");
}

#[tokio::test]
async fn campaign_launch_runs_to_completion() {
  let state = make_state();
  add_customer(&state, "Priya", "15000").await;
  add_customer(&state, "Amit", "20000").await;
  let segment_id = add_segment(&state, json!([])).await;

  let (status, body) = call(
    &state,
    "POST",
    "/campaigns",
    Some(json!({
      "name": "Diwali",
      "segmentId": segment_id,
      "message": "Hi {{firstName}}, 20% off!",
      "channel": "sms",
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED, "{body}");
  assert_eq!(body["messagesQueued"], 2);
  assert_eq!(body["campaign"]["audienceSize"], 2);
  let id = body["campaign"]["campaignId"].as_str().unwrap().to_owned();

  let campaign = wait_until_completed(&state, &id).await;
  assert_eq!(campaign["sentCount"], 2);
  assert_eq!(campaign["deliveredCount"], 2);
  assert_eq!(campaign["deliveryRate"], 100.0);

  let (status, logs) = call(&state, "GET", &format!("/campaigns/{id}/logs"), None).await;
  assert_eq!(status, StatusCode::OK);
  let logs = logs.as_array().unwrap();
  assert_eq!(logs.len(), 2);
  assert!(logs.iter().all(|l| l["status"] == "DELIVERED"));
  assert!(logs.iter().any(|l| l["message"] == "Hi Priya, 20% off!"));

  let (status, stats) = call(&state, "POST", &format!("/campaigns/{id}/stats"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(stats["sent"], 2);
  assert_eq!(stats["pending"], 0);

  let (status, overview) = call(&state, "GET", "/analytics/overview", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(overview["totalCampaigns"], 1);
  assert_eq!(overview["totalCustomers"], 2);
  assert_eq!(overview["deliveryRate"], 100.0);
}

#[tokio::test]
async fn drafts_launch_once() {
  let state = make_state();
  let segment_id = add_segment(&state, json!([])).await;

  let (status, draft) = call(
    &state,
    "POST",
    "/campaigns/drafts",
    Some(json!({
      "name": "Quiet",
      "segmentId": segment_id,
      "message": "hello",
      "channel": "email",
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(draft["status"], "draft");
  let id = draft["campaignId"].as_str().unwrap();

  // Nobody to reach, so the launch completes on the spot.
  let (status, body) = call(&state, "POST", &format!("/campaigns/{id}/launch"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["campaign"]["status"], "completed");
  assert_eq!(body["messagesQueued"], 0);

  let (status, _) = call(&state, "POST", &format!("/campaigns/{id}/launch"), None).await;
  assert_eq!(status, StatusCode::CONFLICT);

  let (status, _) = call(&state, "DELETE", &format!("/segments/{segment_id}"), None).await;
  assert_eq!(status, StatusCode::CONFLICT);

  let missing = Uuid::new_v4();
  let (status, _) = call(&state, "POST", &format!("/campaigns/{missing}/launch"), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn campaigns_need_a_known_segment_and_channel() {
  let state = make_state();
  let (status, _) = call(
    &state,
    "POST",
    "/campaigns",
    Some(json!({
      "name": "Orphan",
      "segmentId": Uuid::new_v4(),
      "message": "hello",
      "channel": "email",
    })),
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  let segment_id = add_segment(&state, json!([])).await;
  let (status, _) = call(
    &state,
    "POST",
    "/campaigns",
    Some(json!({
      "name": "Fax blast",
      "segmentId": segment_id,
      "message": "hello",
      "channel": "fax",
    })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (_, campaigns) = call(&state, "GET", "/campaigns", None).await;
  assert!(campaigns.as_array().unwrap().is_empty());
}

// ─── Receipts ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn receipts_for_unknown_messages_are_acknowledged() {
  let state = make_state();
  let (status, body) = call(
    &state,
    "POST",
    "/delivery-receipt",
    Some(json!({ "messageId": Uuid::new_v4(), "status": "DELIVERED" })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["matched"], false);
}
