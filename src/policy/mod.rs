// src/policy/mod.rs

//! Cleanup policies: definitions, storage and evaluation.
//!
//! - [`model`] holds the policy data model (criteria, action, safety).
//! - [`validate`] performs structural validation before anything is stored.
//! - [`store`] is the CRUD layer with write-through persistence.
//! - [`engine`] turns a policy into a [`CandidateSet`] against the record
//!   store.

pub mod engine;
pub mod model;
pub mod store;
pub mod validate;

pub use engine::{Candidate, CandidateSet, EvaluationOptions, PolicyEngine};
pub use model::{
    ActionKind, CleanupAction, NewPolicy, Policy, PolicyCriteria, PolicyId, SafetyConfig,
};
pub use store::PolicyStore;
pub use validate::validate_policy;
