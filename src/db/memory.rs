//! In-process document store

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{Document, DocumentStore, StoreError};

/// HashMap-backed store; counts writes so callers can check how often
/// documents were initialized or merged
#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<HashMap<(String, String), Document>>,
    sets: AtomicUsize,
    updates: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of full-document writes so far
    pub fn set_count(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    /// Number of field-merge writes so far
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>, StoreError> {
        let docs = self.docs.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(docs.get(&(collection.to_string(), key.to_string())).cloned())
    }

    async fn set(&self, collection: &str, key: &str, document: &Document) -> Result<(), StoreError> {
        let mut docs = self.docs.lock().map_err(|_| StoreError::Poisoned)?;
        docs.insert((collection.to_string(), key.to_string()), document.clone());
        self.sets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update(&self, collection: &str, key: &str, fields: &Document) -> Result<(), StoreError> {
        let mut docs = self.docs.lock().map_err(|_| StoreError::Poisoned)?;
        let doc = docs
            .get_mut(&(collection.to_string(), key.to_string()))
            .ok_or_else(|| StoreError::not_found(collection, key))?;
        doc.extend(fields.clone());
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
