// src/action/mod.rs

//! Destructive action layer.
//!
//! - [`backend`] provides the `ActionBackend` trait and the store-backed
//!   implementation used in production.
//! - [`registry`] maps action variants to backends.

pub mod backend;
pub mod registry;

pub use backend::{ActionBackend, ActionOptions, ActionOutcome, RecordError, StoreActionBackend};
pub use registry::ActionRegistry;
