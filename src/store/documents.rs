// src/store/documents.rs

//! Whole-collection persistence for policies and jobs.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::errors::Result;
use crate::types::StorageMode;

/// Abstract storage for one collection of documents.
///
/// Callers always hand over the full collection; stores are free to rewrite
/// everything on each save.
pub trait DocumentStore<T>: Send + Sync {
    fn load_all(&self) -> Result<Vec<T>>;
    fn save_all(&mut self, items: &[T]) -> Result<()>;
}

/// Stores documents as a JSON array in `<state_dir>/<name>.json`.
///
/// Saves go through a temporary file in the same directory that is renamed
/// over the target, so a crash mid-write leaves the previous version intact.
pub struct FileDocumentStore {
    path: PathBuf,
}

impl FileDocumentStore {
    pub fn new(state_dir: impl AsRef<Path>, name: &str) -> Self {
        Self {
            path: state_dir.as_ref().join(format!("{name}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T> DocumentStore<T> for FileDocumentStore
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn load_all(&self) -> Result<Vec<T>> {
        if !self.path.exists() {
            debug!(path = ?self.path, "document file missing; starting empty");
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)?;
        let items: Vec<T> = serde_json::from_reader(BufReader::new(file))?;
        info!(path = ?self.path, count = items.len(), "loaded documents (file)");
        Ok(items)
    }

    fn save_all(&mut self, items: &[T]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let tmp = NamedTempFile::new_in(&dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer_pretty(&mut writer, items)?;
            writer.flush()?;
        }
        tmp.persist(&self.path).map_err(|e| e.error)?;

        debug!(path = ?self.path, count = items.len(), "saved documents (file)");
        Ok(())
    }
}

/// Keeps the last saved collection in memory only.
pub struct MemoryDocumentStore<T> {
    items: Vec<T>,
}

impl<T> MemoryDocumentStore<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> Default for MemoryDocumentStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DocumentStore<T> for MemoryDocumentStore<T>
where
    T: Clone + Send + Sync,
{
    fn load_all(&self) -> Result<Vec<T>> {
        Ok(self.items.clone())
    }

    fn save_all(&mut self, items: &[T]) -> Result<()> {
        self.items = items.to_vec();
        Ok(())
    }
}

/// Build the document store selected by `[storage].mode`.
pub fn open_document_store<T>(
    mode: StorageMode,
    state_dir: &Path,
    name: &str,
) -> Box<dyn DocumentStore<T>>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    match mode {
        StorageMode::File => Box::new(FileDocumentStore::new(state_dir, name)),
        StorageMode::Memory => Box::new(MemoryDocumentStore::new()),
    }
}
