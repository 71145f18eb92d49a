//! JSON REST API for Reach.
//!
//! Exposes an axum [`Router`] backed by any [`reach_core::store::CrmStore`].
//! Auth and TLS are left to the caller.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", reach_api::api_router(state))
//! ```

pub mod analytics;
pub mod campaigns;
pub mod customers;
pub mod error;
pub mod orders;
pub mod receipts;
pub mod rules;
pub mod segments;

use std::sync::Arc;

use axum::{
  Router,
  extract::FromRequest,
  routing::{get, post},
};
use reach_campaign::{DeliveryQueue, Dispatcher, Reconciler, RuleGenerator, SegmentService};
use reach_core::store::CrmStore;

pub use error::ApiError;

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct AppState<S> {
  pub store:      Arc<S>,
  pub dispatcher: Dispatcher<S>,
  pub reconciler: Reconciler<S>,
  pub segments:   SegmentService<S>,
  pub rules:      Arc<dyn RuleGenerator>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:      Arc::clone(&self.store),
      dispatcher: self.dispatcher.clone(),
      reconciler: self.reconciler.clone(),
      segments:   self.segments.clone(),
      rules:      Arc::clone(&self.rules),
    }
  }
}

impl<S: CrmStore> AppState<S> {
  /// `reconciler` should be the same one `queue` reports receipts to, so
  /// that in-process and webhook receipts share one set of campaign locks.
  pub fn new(
    store: Arc<S>,
    queue: DeliveryQueue,
    reconciler: Reconciler<S>,
    rules: Arc<dyn RuleGenerator>,
  ) -> Self {
    Self {
      dispatcher: Dispatcher::new(Arc::clone(&store), queue),
      segments: SegmentService::new(Arc::clone(&store)),
      store,
      reconciler,
      rules,
    }
  }
}

// ─── Extractors ──────────────────────────────────────────────────────────────

/// `axum::Json` whose rejections surface as [`ApiError::BadRequest`], so a
/// malformed body is a 400 like any other validation failure.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: AppState<S>) -> Router<()>
where
  S: CrmStore + 'static,
{
  Router::new()
    // Customers & orders
    .route("/customers", get(customers::list::<S>).post(customers::create::<S>))
    .route(
      "/customers/{id}",
      get(customers::get_one::<S>).patch(customers::update::<S>),
    )
    .route("/customers/{id}/orders", get(customers::orders::<S>))
    .route("/orders", post(orders::create::<S>))
    // Segments
    .route("/segments", get(segments::list::<S>).post(segments::create::<S>))
    .route("/segments/preview", post(segments::preview::<S>))
    .route(
      "/segments/{id}",
      get(segments::get_one::<S>)
        .patch(segments::update::<S>)
        .delete(segments::delete::<S>),
    )
    .route("/ai/segments", post(rules::generate::<S>))
    // Campaigns
    .route("/campaigns", get(campaigns::list::<S>).post(campaigns::create::<S>))
    .route("/campaigns/drafts", post(campaigns::create_draft::<S>))
    .route("/campaigns/{id}", get(campaigns::get_one::<S>))
    .route("/campaigns/{id}/launch", post(campaigns::launch::<S>))
    .route("/campaigns/{id}/logs", get(campaigns::logs::<S>))
    .route("/campaigns/{id}/stats", post(campaigns::stats::<S>))
    // Delivery
    .route("/delivery-receipt", post(receipts::receive::<S>))
    // Analytics
    .route("/analytics/overview", get(analytics::overview::<S>))
    .with_state(state)
}

#[cfg(test)]
mod tests;
