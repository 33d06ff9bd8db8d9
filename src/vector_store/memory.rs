//! In-memory vector store implementation.
//!
//! Useful for testing and small datasets. Nothing survives the process.

use super::{
    check_binding, check_dimensions, rank, IndexEntry, IndexedModel, IndexedSource, QueryFilter,
    SearchHit, VectorStore,
};
use crate::error::{BusbotError, Result};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    /// Entry id -> (insertion sequence, entry).
    entries: HashMap<Uuid, (u64, IndexEntry)>,
    next_seq: u64,
    model: Option<IndexedModel>,
}

impl MemoryState {
    fn insert(&mut self, entry: &IndexEntry) -> Result<()> {
        check_dimensions(self.model.as_ref(), entry)?;
        let seq = match self.entries.get(&entry.id) {
            Some((seq, _)) => *seq,
            None => {
                self.next_seq += 1;
                self.next_seq
            }
        };
        self.entries.insert(entry.id, (seq, entry.clone()));
        Ok(())
    }
}

/// In-memory vector store.
#[derive(Default)]
pub struct MemoryVectorStore {
    state: RwLock<MemoryState>,
}

impl MemoryVectorStore {
    /// Create a new in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|e| BusbotError::VectorStore(format!("Failed to acquire lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|e| BusbotError::VectorStore(format!("Failed to acquire lock: {}", e)))
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn bind_model(&self, model_id: &str, dimensions: usize) -> Result<()> {
        let mut state = self.write()?;
        if check_binding(state.model.as_ref(), model_id, dimensions)? {
            state.model = Some(IndexedModel {
                model_id: model_id.to_string(),
                dimensions,
            });
        }
        Ok(())
    }

    async fn indexed_model(&self) -> Result<Option<IndexedModel>> {
        Ok(self.read()?.model.clone())
    }

    async fn upsert(&self, entry: &IndexEntry) -> Result<()> {
        self.write()?.insert(entry)
    }

    async fn upsert_batch(&self, entries: &[IndexEntry]) -> Result<usize> {
        let mut state = self.write()?;
        for entry in entries {
            state.insert(entry)?;
        }
        Ok(entries.len())
    }

    async fn query(&self, embedding: &[f32], k: usize, filter: &QueryFilter) -> Result<Vec<SearchHit>> {
        let state = self.read()?;
        let candidates = state
            .entries
            .values()
            .map(|(seq, entry)| (*seq, entry.clone()));
        Ok(rank(candidates, embedding, k, filter))
    }

    async fn delete_by_source(&self, source_id: &str) -> Result<usize> {
        let mut state = self.write()?;
        let initial_len = state.entries.len();
        state
            .entries
            .retain(|_, (_, entry)| entry.segment.source_id != source_id);
        Ok(initial_len - state.entries.len())
    }

    async fn truncate_source(&self, source_id: &str, len: u32) -> Result<usize> {
        let mut state = self.write()?;
        let initial_len = state.entries.len();
        state.entries.retain(|_, (_, entry)| {
            entry.segment.source_id != source_id || entry.segment.position < len
        });
        Ok(initial_len - state.entries.len())
    }

    async fn clear(&self) -> Result<usize> {
        let mut state = self.write()?;
        let removed = state.entries.len();
        state.entries.clear();
        state.model = None;
        Ok(removed)
    }

    async fn list_sources(&self) -> Result<Vec<IndexedSource>> {
        let state = self.read()?;

        let mut sources: HashMap<String, IndexedSource> = HashMap::new();
        for (_, entry) in state.entries.values() {
            let source = sources
                .entry(entry.segment.source_id.clone())
                .or_insert_with(|| IndexedSource {
                    source_id: entry.segment.source_id.clone(),
                    segment_count: 0,
                    indexed_at: entry.indexed_at,
                });
            source.segment_count += 1;
            if entry.indexed_at > source.indexed_at {
                source.indexed_at = entry.indexed_at;
            }
        }

        let mut sources: Vec<IndexedSource> = sources.into_values().collect();
        sources.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        Ok(sources)
    }

    async fn get_by_source(&self, source_id: &str) -> Result<Vec<IndexEntry>> {
        let state = self.read()?;
        let mut result: Vec<IndexEntry> = state
            .entries
            .values()
            .filter(|(_, e)| e.segment.source_id == source_id)
            .map(|(_, e)| e.clone())
            .collect();
        result.sort_by_key(|e| e.segment.position);
        Ok(result)
    }

    async fn provider_names(&self) -> Result<Vec<String>> {
        let state = self.read()?;
        let names: BTreeSet<String> = state
            .entries
            .values()
            .filter_map(|(_, e)| e.segment.metadata.provider.clone())
            .collect();
        Ok(names.into_iter().collect())
    }

    async fn entry_count(&self) -> Result<usize> {
        Ok(self.read()?.entries.len())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
