//! Campaign orchestration for Reach: audience selection, dispatch, simulated
//! delivery and receipt reconciliation.
//!
//! Everything here is generic over [`reach_core::store::CrmStore`]; the
//! delivery side is abstracted behind [`DeliveryVendor`] and [`ReceiptSink`]
//! so tests and the server can wire different implementations.

pub mod analytics;
pub mod audience;
pub mod delivery;
pub mod dispatch;
pub mod error;
pub mod reconcile;
pub mod rulegen;
pub mod segments;

pub use audience::AudienceSelector;
pub use delivery::{
  DeliveryHandle, DeliveryJob, DeliveryQueue, DeliverySettings, DeliveryVendor, FallbackSink,
  HttpReceiptSink, ReceiptSink, SimulatedVendor,
};
pub use dispatch::{Dispatcher, LaunchReport};
pub use error::{Error, Result};
pub use reconcile::Reconciler;
pub use rulegen::{CannedRuleGenerator, HttpRuleGenerator, RuleGenerator};
pub use segments::SegmentService;
