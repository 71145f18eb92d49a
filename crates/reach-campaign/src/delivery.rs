//! Message delivery: the vendor boundary, a simulated vendor, receipt
//! reporting and the fire-and-forget delivery queue.
//!
//! A delivery attempt runs as its own tokio task. It waits out a random
//! jitter, asks the [`DeliveryVendor`] for an outcome and hands the resulting
//! receipt to a [`ReceiptSink`]. Nothing is retried: a failed attempt is
//! final.

use std::{ops::Range, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::future::join_all;
use rand::{Rng, seq::SliceRandom};
use reach_core::{
  campaign::Channel,
  customer::Customer,
  message::{DeliveryReceipt, DeliveryStatus},
};
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Jobs ────────────────────────────────────────────────────────────────────

/// One message to one customer.
#[derive(Debug, Clone)]
pub struct DeliveryJob {
  pub message_id: Uuid,
  pub customer:   Customer,
  /// Already rendered for this customer.
  pub message:    String,
  pub channel:    Channel,
}

// ─── Vendor ──────────────────────────────────────────────────────────────────

/// A messaging provider. Implementations decide the outcome of one attempt;
/// they never fail outright, a failed delivery is a `FAILED` receipt.
#[async_trait]
pub trait DeliveryVendor: Send + Sync {
  async fn deliver(&self, job: &DeliveryJob) -> DeliveryReceipt;
}

const EMAIL_FAILURES: &[&str] = &[
  "Invalid email address",
  "Mailbox full",
  "Email bounced",
  "Spam filter blocked",
  "Domain not found",
];

const SMS_FAILURES: &[&str] = &[
  "Invalid phone number",
  "Network error",
  "Number unreachable",
  "SMS limit exceeded",
  "Carrier blocked",
];

const PUSH_FAILURES: &[&str] = &[
  "Device not registered",
  "App not installed",
  "Notification disabled",
  "Device offline",
  "Token expired",
];

/// The failure reasons a vendor may report for a channel.
pub fn failure_reasons(channel: Channel) -> &'static [&'static str] {
  match channel {
    Channel::Email => EMAIL_FAILURES,
    Channel::Sms => SMS_FAILURES,
    Channel::Push => PUSH_FAILURES,
  }
}

/// A vendor that pretends to send: it sleeps for a random latency and then
/// reports success with a fixed probability.
#[derive(Debug, Clone)]
pub struct SimulatedVendor {
  latency_ms:   Range<u64>,
  success_rate: f64,
}

impl Default for SimulatedVendor {
  fn default() -> Self { Self { latency_ms: 1000..4000, success_rate: 0.9 } }
}

impl SimulatedVendor {
  pub fn new(latency_ms: Range<u64>, success_rate: f64) -> Self {
    Self { latency_ms, success_rate: success_rate.clamp(0.0, 1.0) }
  }
}

#[async_trait]
impl DeliveryVendor for SimulatedVendor {
  async fn deliver(&self, job: &DeliveryJob) -> DeliveryReceipt {
    // `ThreadRng` is not `Send`; draw everything before the first await.
    let (latency, failure) = {
      let mut rng = rand::thread_rng();
      let latency = if self.latency_ms.is_empty() {
        self.latency_ms.start
      } else {
        rng.gen_range(self.latency_ms.clone())
      };
      let failure = (!rng.gen_bool(self.success_rate)).then(|| {
        failure_reasons(job.channel)
          .choose(&mut rng)
          .copied()
          .unwrap_or("Delivery failed")
      });
      (latency, failure)
    };

    tokio::time::sleep(Duration::from_millis(latency)).await;

    match failure {
      None => DeliveryReceipt::delivered(job.message_id),
      Some(reason) => DeliveryReceipt::failed(job.message_id, reason),
    }
  }
}

// ─── Receipt sinks ───────────────────────────────────────────────────────────

/// Where a vendor's receipts are sent.
#[async_trait]
pub trait ReceiptSink: Send + Sync {
  async fn report(&self, receipt: &DeliveryReceipt) -> Result<()>;
}

/// Posts receipts to a Reach server's `/api/delivery-receipt` endpoint, the
/// way an external vendor's webhook would.
#[derive(Debug, Clone)]
pub struct HttpReceiptSink {
  client: reqwest::Client,
  url:    String,
}

impl HttpReceiptSink {
  pub fn new(base_url: &str) -> Self {
    Self {
      client: reqwest::Client::new(),
      url:    format!("{}/api/delivery-receipt", base_url.trim_end_matches('/')),
    }
  }
}

#[async_trait]
impl ReceiptSink for HttpReceiptSink {
  async fn report(&self, receipt: &DeliveryReceipt) -> Result<()> {
    self
      .client
      .post(&self.url)
      .json(receipt)
      .send()
      .await
      .and_then(reqwest::Response::error_for_status)
      .map_err(|e| Error::Receipt(e.to_string()))?;
    Ok(())
  }
}

/// Tries `primary` first and hands the receipt to `fallback` if that fails,
/// so an unreachable webhook never loses a status.
pub struct FallbackSink {
  primary:  Arc<dyn ReceiptSink>,
  fallback: Arc<dyn ReceiptSink>,
}

impl FallbackSink {
  pub fn new(primary: Arc<dyn ReceiptSink>, fallback: Arc<dyn ReceiptSink>) -> Self {
    Self { primary, fallback }
  }
}

#[async_trait]
impl ReceiptSink for FallbackSink {
  async fn report(&self, receipt: &DeliveryReceipt) -> Result<()> {
    match self.primary.report(receipt).await {
      Ok(()) => Ok(()),
      Err(e) => {
        warn!(
          message_id = %receipt.message_id,
          error = %e,
          "receipt webhook failed, reconciling directly"
        );
        self.fallback.report(receipt).await
      }
    }
  }
}

// ─── Queue ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DeliverySettings {
  /// Upper bound (exclusive) of the random delay before a single job starts.
  pub max_jitter:      Duration,
  /// Audiences larger than this are delivered in batches.
  pub batch_threshold: usize,
  pub batch_size:      usize,
  /// Pause between consecutive batches.
  pub batch_pause:     Duration,
}

impl Default for DeliverySettings {
  fn default() -> Self {
    Self {
      max_jitter:      Duration::from_millis(5000),
      batch_threshold: 100,
      batch_size:      100,
      batch_pause:     Duration::from_millis(1000),
    }
  }
}

/// Resolves to the final receipt of one enqueued job. Dropping it does not
/// cancel the job.
pub struct DeliveryHandle {
  message_id: Uuid,
  rx:         oneshot::Receiver<DeliveryReceipt>,
}

impl DeliveryHandle {
  pub fn message_id(&self) -> Uuid { self.message_id }

  /// Wait for the attempt to finish. `None` if the task died first.
  pub async fn outcome(self) -> Option<DeliveryReceipt> { self.rx.await.ok() }
}

/// Schedules delivery jobs on the tokio runtime.
#[derive(Clone)]
pub struct DeliveryQueue {
  vendor:   Arc<dyn DeliveryVendor>,
  sink:     Arc<dyn ReceiptSink>,
  settings: DeliverySettings,
}

impl DeliveryQueue {
  pub fn new(
    vendor: Arc<dyn DeliveryVendor>,
    sink: Arc<dyn ReceiptSink>,
    settings: DeliverySettings,
  ) -> Self {
    Self { vendor, sink, settings }
  }

  pub fn settings(&self) -> &DeliverySettings { &self.settings }

  /// Spawn one attempt after a random jitter and return immediately.
  pub fn enqueue(&self, job: DeliveryJob) -> DeliveryHandle {
    let (tx, rx) = oneshot::channel();
    let message_id = job.message_id;
    let jitter = self.jitter();
    let queue = self.clone();

    tokio::spawn(async move {
      tokio::time::sleep(jitter).await;
      let receipt = queue.attempt(&job).await;
      let _ = tx.send(receipt);
    });

    DeliveryHandle { message_id, rx }
  }

  /// Deliver `jobs` in one background task, `batch_size` at a time, pausing
  /// between batches. Jobs within a batch run concurrently.
  pub fn enqueue_batched(&self, jobs: Vec<DeliveryJob>) -> Vec<DeliveryHandle> {
    let mut handles = Vec::with_capacity(jobs.len());
    let mut pending = Vec::with_capacity(jobs.len());
    for job in jobs {
      let (tx, rx) = oneshot::channel();
      handles.push(DeliveryHandle { message_id: job.message_id, rx });
      pending.push((job, tx));
    }

    let queue = self.clone();
    tokio::spawn(async move {
      let batch_size = queue.settings.batch_size.max(1);
      let batches = pending.len().div_ceil(batch_size);
      let mut pending = pending.into_iter();

      for index in 0..batches {
        let batch: Vec<_> = pending.by_ref().take(batch_size).collect();
        debug!(batch = index + 1, of = batches, size = batch.len(), "delivering batch");

        join_all(batch.into_iter().map(|(job, tx)| {
          let queue = &queue;
          async move {
            let receipt = queue.attempt(&job).await;
            let _ = tx.send(receipt);
          }
        }))
        .await;

        if index + 1 < batches {
          tokio::time::sleep(queue.settings.batch_pause).await;
        }
      }
    });

    handles
  }

  fn jitter(&self) -> Duration {
    let max = u64::try_from(self.settings.max_jitter.as_millis()).unwrap_or(u64::MAX);
    if max == 0 {
      return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..max))
  }

  /// Deliver and report. If the receipt cannot be reported anywhere the
  /// caller is told the attempt failed, although the stored log keeps
  /// whatever state it had.
  async fn attempt(&self, job: &DeliveryJob) -> DeliveryReceipt {
    let receipt = self.vendor.deliver(job).await;
    debug!(
      message_id = %job.message_id,
      customer_id = %job.customer.customer_id,
      status = %receipt.status,
      "vendor responded"
    );

    match self.sink.report(&receipt).await {
      Ok(()) => receipt,
      Err(e) => {
        warn!(message_id = %job.message_id, error = %e, "receipt was not recorded");
        DeliveryReceipt {
          message_id:   job.message_id,
          status:       DeliveryStatus::Failed,
          error_reason: Some("Internal error updating status".into()),
        }
      }
    }
  }
}
