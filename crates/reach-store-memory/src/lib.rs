//! In-memory backend for the Reach store.
//!
//! Holds every table behind one lock, so each trait method is trivially
//! atomic. Intended for tests and local demos; nothing survives the process.

mod store;

pub use store::MemoryStore;
