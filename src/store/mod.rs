// src/store/mod.rs

//! Record store boundary and local persistence.
//!
//! - [`record`] defines the mail record shape and the conjunctive
//!   [`SearchCriteria`] query understood by every store.
//! - [`memory`] is an in-process [`RecordStore`] that can load and save a
//!   JSON mailbox snapshot.
//! - [`documents`] persists policies and jobs either to a JSON file or to
//!   memory, selected by `[storage].mode`.
//!
//! The automation core only ever talks to the [`RecordStore`] trait; the real
//! mailbox index lives behind it.

pub mod documents;
pub mod memory;
pub mod record;

pub use documents::{open_document_store, DocumentStore, FileDocumentStore, MemoryDocumentStore};
pub use memory::MemoryRecordStore;
pub use record::{EmailRecord, SearchCriteria, StoreUsage};

use crate::errors::Result;
use crate::types::BoxFuture;

/// Abstract, criteria-based query surface over the mailbox index.
pub trait RecordStore: Send + Sync {
    /// Return every live record matching `criteria`, oldest first (ties
    /// broken by record id).
    fn search<'a>(&'a self, criteria: &'a SearchCriteria)
    -> BoxFuture<'a, Result<Vec<EmailRecord>>>;

    /// Fetch live (non-deleted) records by id, in the order given. Unknown
    /// and deleted ids are omitted.
    fn get_many<'a>(&'a self, ids: &'a [String]) -> BoxFuture<'a, Result<Vec<EmailRecord>>>;

    /// Insert or replace records by id. Returns the number of records written.
    fn bulk_upsert(&self, records: Vec<EmailRecord>) -> BoxFuture<'_, Result<usize>>;

    /// Count live records matching `criteria`.
    fn count<'a>(&'a self, criteria: &'a SearchCriteria) -> BoxFuture<'a, Result<usize>>;

    /// Aggregate size of the live (non-deleted) records.
    fn usage(&self) -> BoxFuture<'_, Result<StoreUsage>>;
}
