// src/store/memory.rs

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::RwLock;

use tracing::{debug, info};

use crate::errors::Result;
use crate::store::record::{EmailRecord, SearchCriteria, StoreUsage};
use crate::store::RecordStore;
use crate::sync::{read, write};
use crate::types::BoxFuture;

/// In-process record store.
///
/// Used by the CLI against a JSON mailbox snapshot and by tests. Searches are
/// a linear scan, which is fine for the snapshot sizes this is used with.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<BTreeMap<String, EmailRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = EmailRecord>) -> Self {
        let map = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self {
            records: RwLock::new(map),
        }
    }

    /// Load a JSON array of records. A missing file yields an empty store.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(?path, "mailbox snapshot missing; starting with an empty store");
            return Ok(Self::new());
        }

        let contents = fs::read_to_string(path)?;
        let records: Vec<EmailRecord> = serde_json::from_str(&contents)?;
        info!(?path, records = records.len(), "loaded mailbox snapshot");
        Ok(Self::with_records(records))
    }

    /// Write every record (including soft-deleted ones) back as JSON.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let records: Vec<EmailRecord> = read(&self.records).values().cloned().collect();
        let json = serde_json::to_string_pretty(&records)?;
        fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Look up one record by id, including soft-deleted ones.
    pub fn get(&self, id: &str) -> Option<EmailRecord> {
        read(&self.records).get(id).cloned()
    }

    pub fn len(&self) -> usize {
        read(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn search_sync(&self, criteria: &SearchCriteria) -> Vec<EmailRecord> {
        let mut hits: Vec<EmailRecord> = read(&self.records)
            .values()
            .filter(|r| criteria.matches(r))
            .cloned()
            .collect();
        hits.sort_by(|a, b| {
            a.received_at
                .cmp(&b.received_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits
    }
}

impl RecordStore for MemoryRecordStore {
    fn search<'a>(
        &'a self,
        criteria: &'a SearchCriteria,
    ) -> BoxFuture<'a, Result<Vec<EmailRecord>>> {
        Box::pin(async move { Ok(self.search_sync(criteria)) })
    }

    fn get_many<'a>(&'a self, ids: &'a [String]) -> BoxFuture<'a, Result<Vec<EmailRecord>>> {
        Box::pin(async move {
            let map = read(&self.records);
            Ok(ids
                .iter()
                .filter_map(|id| map.get(id))
                .filter(|r| !r.deleted)
                .cloned()
                .collect())
        })
    }

    fn bulk_upsert(&self, records: Vec<EmailRecord>) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move {
            let mut map = write(&self.records);
            let written = records.len();
            for record in records {
                map.insert(record.id.clone(), record);
            }
            Ok(written)
        })
    }

    fn count<'a>(&'a self, criteria: &'a SearchCriteria) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            Ok(read(&self.records)
                .values()
                .filter(|r| criteria.matches(r))
                .count())
        })
    }

    fn usage(&self) -> BoxFuture<'_, Result<StoreUsage>> {
        Box::pin(async move {
            let map = read(&self.records);
            let mut usage = StoreUsage::default();
            for record in map.values().filter(|r| !r.deleted) {
                usage.total_records += 1;
                usage.total_bytes += record.size_bytes;
            }
            Ok(usage)
        })
    }
}
