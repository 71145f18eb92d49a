//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{TimeDelta, Utc};
use reach_core::{
  campaign::{CampaignStats, CampaignStatus, Channel, NewCampaign},
  customer::{CustomerPatch, NewCustomer, NewOrder},
  message::{DeliveryStatus, NewLog},
  rule::{MAX_RULES, Predicate, SegmentRule, evaluate},
  segment::{NewSegment, SegmentPatch},
  store::CrmStore,
};
use reach_store_memory::MemoryStore;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn dec(s: &str) -> Decimal { s.parse().unwrap() }

fn order(customer_id: Uuid, amount: &str, days_ago: i64) -> NewOrder {
  NewOrder {
    customer_id,
    amount: dec(amount),
    order_date: Utc::now() - TimeDelta::days(days_ago),
    external_ref: None,
    items: vec!["item".into()],
  }
}

// ─── Customers ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_customer() {
  let s = store().await;
  let created = s
    .create_customer(NewCustomer::new("Priya Patel", "priya@example.com"))
    .await
    .unwrap();

  let fetched = s.get_customer(created.customer_id).await.unwrap().unwrap();
  assert_eq!(fetched.name, "Priya Patel");
  assert_eq!(fetched.total_spend, Decimal::ZERO);
  assert_eq!(fetched.visit_count, 0);
  assert!(fetched.last_visit.is_none());

  let by_email = s.customer_by_email("priya@example.com").await.unwrap();
  assert_eq!(by_email.map(|c| c.customer_id), Some(created.customer_id));
}

#[tokio::test]
async fn duplicate_email_is_rejected() {
  let s = store().await;
  s.create_customer(NewCustomer::new("A", "same@example.com"))
    .await
    .unwrap();
  let err = s
    .create_customer(NewCustomer::new("B", "same@example.com"))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(reach_core::Error::DuplicateEmail(_))));
}

#[tokio::test]
async fn patch_leaves_unset_fields_alone() {
  let s = store().await;
  let c = s
    .create_customer(NewCustomer::new("Sneha Gupta", "sneha@example.com"))
    .await
    .unwrap();

  let patched = s
    .update_customer(c.customer_id, CustomerPatch {
      phone: Some("+91 98765 43210".into()),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(patched.name, "Sneha Gupta");
  assert_eq!(patched.phone.as_deref(), Some("+91 98765 43210"));

  let err = s
    .update_customer(Uuid::new_v4(), CustomerPatch::default())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(reach_core::Error::CustomerNotFound(_))));
}

// ─── Orders ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn orders_rebuild_aggregates() {
  let s = store().await;
  let c = s
    .create_customer(NewCustomer::new("Vikram Singh", "vikram@example.com"))
    .await
    .unwrap();

  s.record_order(order(c.customer_id, "999.99", 10)).await.unwrap();
  let latest = s.record_order(order(c.customer_id, "0.01", 1)).await.unwrap();
  s.record_order(order(c.customer_id, "500", 40)).await.unwrap();

  let c = s.get_customer(c.customer_id).await.unwrap().unwrap();
  assert_eq!(c.total_spend, dec("1500"));
  assert_eq!(c.visit_count, 3);
  assert_eq!(c.last_visit, Some(latest.order_date));

  let orders = s.orders_for_customer(c.customer_id).await.unwrap();
  assert_eq!(orders.len(), 3);
  assert_eq!(orders[0].order_id, latest.order_id);
  assert_eq!(orders[0].items, vec!["item".to_owned()]);
}

#[tokio::test]
async fn order_for_unknown_customer_fails() {
  let s = store().await;
  let err = s.record_order(order(Uuid::new_v4(), "10", 0)).await.unwrap_err();
  assert!(matches!(err, Error::Core(reach_core::Error::CustomerNotFound(_))));
}

#[tokio::test]
async fn spend_overflow_rolls_the_order_back() {
  let s = store().await;
  let c = s
    .create_customer(NewCustomer::new("Big Spender", "big@example.com"))
    .await
    .unwrap();
  let max = Decimal::MAX.to_string();

  s.record_order(order(c.customer_id, &max, 2)).await.unwrap();
  let err = s.record_order(order(c.customer_id, &max, 1)).await.unwrap_err();
  assert!(
    matches!(&err, Error::Core(reach_core::Error::Validation(msg)) if msg == "total spend overflow"),
    "{err}"
  );

  let after = s.get_customer(c.customer_id).await.unwrap().unwrap();
  assert_eq!(after.total_spend, Decimal::MAX);
  assert_eq!(after.visit_count, 1);
  assert_eq!(s.orders_for_customer(c.customer_id).await.unwrap().len(), 1);

  // The connection survives and keeps serving writes.
  s.create_customer(NewCustomer::new("Next", "next@example.com"))
    .await
    .unwrap();
}

// ─── Audience queries ────────────────────────────────────────────────────────

async fn names<S: CrmStore>(s: &S, predicate: &Predicate) -> Vec<String> {
  let mut names: Vec<String> = s
    .query_customers(predicate)
    .await
    .unwrap()
    .into_iter()
    .map(|c| c.name)
    .collect();
  names.sort();
  names
}

/// (name, [(amount, days_ago)])
const FIXTURE: &[(&str, &[(&str, i64)])] = &[
  ("Raj", &[("12000", 3), ("500", 50)]),
  ("Priya", &[("2500", 90)]),
  ("Amit", &[("30000", 1), ("100", 2), ("100", 3), ("100", 4), ("100", 5), ("100", 6)]),
  ("Sneha", &[]),
  ("Vikram", &[("10000", 45)]),
];

async fn load<S: CrmStore>(s: &S) {
  for (name, orders) in FIXTURE {
    let c = s
      .create_customer(NewCustomer::new(*name, format!("{name}@example.com")))
      .await
      .unwrap();
    for (amount, days_ago) in *orders {
      s.record_order(order(c.customer_id, amount, *days_ago)).await.unwrap();
    }
  }
}

#[tokio::test]
async fn sql_filters_agree_with_in_memory_predicates() {
  let sqlite = store().await;
  let memory = MemoryStore::new();
  load(&sqlite).await;
  load(&memory).await;

  let chains: Vec<Vec<SegmentRule>> = vec![
    vec![],
    vec![SegmentRule::new("totalSpend", "gt", 10000)],
    vec![SegmentRule::new("totalSpend", "gte", 10000)],
    vec![SegmentRule::new("totalSpend", "eq", "10000")],
    vec![
      SegmentRule::new("totalSpend", "greater_than", 10000),
      SegmentRule::new("visitCount", "less_than", 5).or(),
    ],
    vec![SegmentRule::new("lastVisit", "days_ago", 30)],
    vec![SegmentRule::new("lastVisit", "less_than_days_ago", 30)],
    vec![
      SegmentRule::new("visitCount", "gt", 1),
      SegmentRule::new("lastVisit", "less_than_days_ago", 30).or(),
      SegmentRule::new("totalSpend", "lt", 20000).and(),
    ],
    vec![SegmentRule::new("favouriteColour", "eq", "blue")],
    vec![SegmentRule::new("totalSpend", "gt", "lots")],
  ];

  for rules in chains {
    let predicate = evaluate(&rules, Utc::now());
    let from_sql = names(&sqlite, &predicate).await;
    let from_memory = names(&memory, &predicate).await;
    assert_eq!(from_sql, from_memory, "rules: {rules:?}");
    assert_eq!(
      sqlite.count_customers(&predicate).await.unwrap(),
      from_sql.len() as u64
    );
  }
}

#[tokio::test]
async fn spend_comparisons_keep_full_precision() {
  let sqlite = store().await;
  let memory = MemoryStore::new();
  let spends = [
    ("Above", "10000000000000000.01"),
    ("Exact", "10000000000000000"),
    ("Below", "9999999999999999.99"),
    ("Small", "0.5"),
  ];
  for (name, amount) in spends {
    let c = sqlite
      .create_customer(NewCustomer::new(name, format!("{name}@example.com")))
      .await
      .unwrap();
    sqlite.record_order(order(c.customer_id, amount, 1)).await.unwrap();
    let c = memory
      .create_customer(NewCustomer::new(name, format!("{name}@example.com")))
      .await
      .unwrap();
    memory.record_order(order(c.customer_id, amount, 1)).await.unwrap();
  }

  let expected: &[(&str, &[&str])] = &[
    ("gt", &["Above"]),
    ("gte", &["Above", "Exact"]),
    ("eq", &["Exact"]),
    ("lt", &["Below", "Small"]),
    ("lte", &["Below", "Exact", "Small"]),
  ];
  for (op, want) in expected {
    let rule = SegmentRule::new("totalSpend", *op, "10000000000000000");
    let predicate = evaluate(&[rule], Utc::now());
    assert_eq!(names(&sqlite, &predicate).await, *want, "sqlite {op}");
    assert_eq!(names(&memory, &predicate).await, *want, "memory {op}");
  }

  let predicate = evaluate(&[SegmentRule::new("totalSpend", "gt", -1)], Utc::now());
  assert_eq!(sqlite.count_customers(&predicate).await.unwrap(), 4);
}

#[tokio::test]
async fn longest_allowed_chain_runs_in_sql() {
  let sqlite = store().await;
  let memory = MemoryStore::new();
  load(&sqlite).await;
  load(&memory).await;

  let mut rules = vec![SegmentRule::new("totalSpend", "gt", 100000)];
  rules.extend((1..MAX_RULES).map(|i| {
    let rule = SegmentRule::new("visitCount", "gte", (i % 4) as i64);
    if i % 3 == 0 { rule.or() } else { rule.and() }
  }));
  assert_eq!(rules.len(), MAX_RULES);

  let predicate = evaluate(&rules, Utc::now());
  let from_sql = names(&sqlite, &predicate).await;
  assert_eq!(from_sql, names(&memory, &predicate).await);
  assert!(!from_sql.is_empty());
}

#[tokio::test]
async fn never_visited_customers_match_no_last_visit_rule() {
  let s = store().await;
  load(&s).await;
  for op in ["days_ago", "less_than_days_ago"] {
    let predicate = evaluate(&[SegmentRule::new("lastVisit", op, 0)], Utc::now());
    let names: Vec<String> = s
      .query_customers(&predicate)
      .await
      .unwrap()
      .into_iter()
      .map(|c| c.name)
      .collect();
    assert!(!names.contains(&"Sneha".to_owned()), "{op}: {names:?}");
  }
}

// ─── Segments ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn segment_rules_round_trip_through_json() {
  let s = store().await;
  let rules = vec![
    SegmentRule::new("totalSpend", "gt", 10000),
    SegmentRule::new("visitCount", "lt", "5").or(),
  ];
  let seg = s
    .create_segment(
      NewSegment { name: "High value".into(), description: None, rules: rules.clone() },
      7,
    )
    .await
    .unwrap();

  let fetched = s.get_segment(seg.segment_id).await.unwrap().unwrap();
  assert_eq!(fetched.rules, rules);
  assert_eq!(fetched.audience_size, 7);

  let updated = s
    .update_segment(
      seg.segment_id,
      SegmentPatch { name: Some("Whales".into()), ..Default::default() },
      None,
    )
    .await
    .unwrap()
    .unwrap();
  assert_eq!(updated.name, "Whales");
  assert_eq!(updated.rules, rules);
  assert_eq!(updated.audience_size, 7);

  assert!(s.delete_segment(seg.segment_id).await.unwrap());
  assert!(!s.delete_segment(seg.segment_id).await.unwrap());
  assert!(s.update_segment(seg.segment_id, SegmentPatch::default(), None).await.unwrap().is_none());
}

// ─── Campaigns & logs ────────────────────────────────────────────────────────

async fn campaign(s: &SqliteStore) -> (Uuid, Uuid) {
  let customer = s
    .create_customer(NewCustomer::new("Raj Sharma", "raj@example.com"))
    .await
    .unwrap();
  let seg = s
    .create_segment(
      NewSegment { name: "Everyone".into(), description: None, rules: vec![] },
      1,
    )
    .await
    .unwrap();
  let campaign = s
    .create_campaign(NewCampaign {
      name:       "Welcome".into(),
      segment_id: seg.segment_id,
      message:    "Hi {{firstName}}".into(),
      channel:    Channel::Email,
    })
    .await
    .unwrap();
  (campaign.campaign_id, customer.customer_id)
}

#[tokio::test]
async fn campaign_for_unknown_segment_fails() {
  let s = store().await;
  let err = s
    .create_campaign(NewCampaign {
      name:       "Orphan".into(),
      segment_id: Uuid::new_v4(),
      message:    "hello".into(),
      channel:    Channel::Push,
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(reach_core::Error::SegmentNotFound(_))));
}

#[tokio::test]
async fn campaign_moves_through_its_lifecycle() {
  let s = store().await;
  let (id, _) = campaign(&s).await;

  let draft = s.get_campaign(id).await.unwrap().unwrap();
  assert_eq!(draft.status, CampaignStatus::Draft);
  assert_eq!(draft.channel, Channel::Email);

  // A draft cannot finish.
  assert!(s.finish_campaign(id, CampaignStatus::Completed, Utc::now()).await.unwrap().is_none());

  let active = s.activate_campaign(id, 1, Utc::now()).await.unwrap().unwrap();
  assert_eq!(active.status, CampaignStatus::Active);
  assert!(s.activate_campaign(id, 1, Utc::now()).await.unwrap().is_none());

  let failed = s
    .finish_campaign(id, CampaignStatus::Failed, Utc::now())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(failed.status, CampaignStatus::Failed);
  assert!(failed.completed_at.is_some());
  assert_eq!(s.list_campaigns().await.unwrap().len(), 1);
}

#[tokio::test]
async fn logs_close_once_and_stats_complete_the_campaign() {
  let s = store().await;
  let (campaign_id, customer_id) = campaign(&s).await;
  s.activate_campaign(campaign_id, 1, Utc::now()).await.unwrap();

  let message_id = Uuid::new_v4();
  let created = s
    .create_logs(vec![NewLog {
      message_id,
      campaign_id,
      customer_id,
      channel: Channel::Email,
      message: "Hi Raj".into(),
    }])
    .await
    .unwrap();
  assert_eq!(created[0].status, DeliveryStatus::Sent);

  let closed = s
    .close_log(message_id, DeliveryStatus::Delivered, None, Utc::now())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(closed.status, DeliveryStatus::Delivered);
  assert!(closed.delivered_at.is_some());
  assert!(
    s.close_log(message_id, DeliveryStatus::Failed, Some("late".into()), Utc::now())
      .await
      .unwrap()
      .is_none()
  );

  let logs = s.logs_for_campaign(campaign_id).await.unwrap();
  let stats = CampaignStats::from_logs(&logs);
  let campaign = s
    .write_campaign_stats(campaign_id, stats, Some(Utc::now()))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(campaign.status, CampaignStatus::Completed);
  assert_eq!(campaign.sent_count, 1);
  assert_eq!(campaign.delivered_count, 1);
  assert_eq!(campaign.delivery_rate, 100.0);
}

#[tokio::test]
async fn log_batch_is_all_or_nothing() {
  let s = store().await;
  let (campaign_id, customer_id) = campaign(&s).await;
  let reused = Uuid::new_v4();
  let log = |message_id| NewLog {
    message_id,
    campaign_id,
    customer_id,
    channel: Channel::Email,
    message: "hi".into(),
  };

  assert!(s.create_logs(vec![log(Uuid::new_v4()), log(reused), log(reused)]).await.is_err());
  assert!(s.logs_for_campaign(campaign_id).await.unwrap().is_empty());
}
