//! Core types and trait definitions for the Reach marketing platform.
//!
//! This crate is deliberately free of HTTP, runtime and database
//! dependencies. Rule compilation and evaluation are pure and synchronous;
//! everything that waits lives in `reach-campaign` or a store backend.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod campaign;
pub mod customer;
pub mod error;
pub mod message;
pub mod rule;
pub mod segment;
pub mod store;

pub use error::{Error, Result};
