//! Vector index abstraction for busbot.
//!
//! Provides a trait-based interface for different vector storage backends. The
//! index records which embedding model produced its vectors and refuses to mix
//! models.

mod memory;
mod sqlite;

pub use memory::MemoryVectorStore;
pub use sqlite::SqliteVectorStore;

use crate::chunking::Segment;
use crate::error::{BusbotError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A segment and its embedding as stored in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Derived from the segment's source and position; see [`Segment::entry_id`].
    pub id: Uuid,
    pub segment: Segment,
    pub embedding: Vec<f32>,
    /// When this entry was last written.
    pub indexed_at: DateTime<Utc>,
}

impl IndexEntry {
    pub fn new(segment: Segment, embedding: Vec<f32>) -> Self {
        Self {
            id: segment.entry_id(),
            segment,
            embedding,
            indexed_at: Utc::now(),
        }
    }
}

/// A query match with its similarity score.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub entry: IndexEntry,
    /// Cosine similarity (higher is better).
    pub score: f32,
}

/// Restrictions applied to a similarity query.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    /// Drop hits scoring below this value.
    pub min_score: Option<f32>,
    /// Only consider segments whose provider metadata equals this (lowercased) name.
    pub provider: Option<String>,
}

impl QueryFilter {
    pub fn with_min_score(mut self, min_score: Option<f32>) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_provider(mut self, provider: Option<String>) -> Self {
        self.provider = provider;
        self
    }
}

/// The embedding model an index was built with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedModel {
    pub model_id: String,
    pub dimensions: usize,
}

/// Summary information about an indexed source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedSource {
    pub source_id: String,
    pub segment_count: u32,
    /// Most recent write for this source.
    pub indexed_at: DateTime<Utc>,
}

/// Trait for vector index implementations.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Record the embedding model on first use, or verify it matches the recorded one.
    async fn bind_model(&self, model_id: &str, dimensions: usize) -> Result<()>;

    /// The model recorded for this index, if any.
    async fn indexed_model(&self) -> Result<Option<IndexedModel>>;

    /// Store or replace an entry keyed by its id. Replacing keeps the original insertion order.
    async fn upsert(&self, entry: &IndexEntry) -> Result<()>;

    /// Bulk upsert entries.
    async fn upsert_batch(&self, entries: &[IndexEntry]) -> Result<usize>;

    /// The `k` most similar entries, best first. Equal scores keep insertion order.
    async fn query(&self, embedding: &[f32], k: usize, filter: &QueryFilter) -> Result<Vec<SearchHit>>;

    /// Delete all entries of a source document.
    async fn delete_by_source(&self, source_id: &str) -> Result<usize>;

    /// Delete the entries of a source at positions `>= len`, left over after it shrank.
    async fn truncate_source(&self, source_id: &str, len: u32) -> Result<usize>;

    /// Delete every entry and forget the recorded model.
    async fn clear(&self) -> Result<usize>;

    /// List all indexed sources.
    async fn list_sources(&self) -> Result<Vec<IndexedSource>>;

    /// All entries of a source, in position order.
    async fn get_by_source(&self, source_id: &str) -> Result<Vec<IndexEntry>>;

    /// Distinct provider names present in segment metadata, sorted.
    async fn provider_names(&self) -> Result<Vec<String>>;

    /// Get total entry count.
    async fn entry_count(&self) -> Result<usize>;

    /// Flush pending writes. The store stays usable afterwards.
    async fn close(&self) -> Result<()>;
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Decide whether binding `model_id` is allowed. Returns true when nothing was recorded yet.
pub(crate) fn check_binding(
    existing: Option<&IndexedModel>,
    model_id: &str,
    dimensions: usize,
) -> Result<bool> {
    match existing {
        None => Ok(true),
        Some(m) if m.model_id == model_id && m.dimensions == dimensions => Ok(false),
        Some(m) => Err(BusbotError::ModelMismatch {
            indexed: m.model_id.clone(),
            configured: model_id.to_string(),
        }),
    }
}

/// Reject vectors whose length disagrees with the recorded model.
pub(crate) fn check_dimensions(model: Option<&IndexedModel>, entry: &IndexEntry) -> Result<()> {
    match model {
        Some(m) if m.dimensions != entry.embedding.len() => Err(BusbotError::VectorStore(format!(
            "Entry {} has {} dimensions but the index expects {}",
            entry.segment.key(),
            entry.embedding.len(),
            m.dimensions
        ))),
        _ => Ok(()),
    }
}

/// Score candidates, apply the filter, and keep the best `k`.
///
/// Candidates carry their insertion sequence; ties are broken by it, earliest first.
pub(crate) fn rank(
    candidates: impl IntoIterator<Item = (u64, IndexEntry)>,
    query: &[f32],
    k: usize,
    filter: &QueryFilter,
) -> Vec<SearchHit> {
    if k == 0 {
        return Vec::new();
    }

    let mut scored: Vec<(u64, SearchHit)> = candidates
        .into_iter()
        .filter(|(_, entry)| match &filter.provider {
            Some(p) => entry.segment.metadata.provider.as_deref() == Some(p.as_str()),
            None => true,
        })
        .map(|(seq, entry)| {
            let score = cosine_similarity(query, &entry.embedding);
            (seq, SearchHit { entry, score })
        })
        .filter(|(_, hit)| filter.min_score.map_or(true, |min| hit.score >= min))
        .collect();

    scored.sort_by(|(seq_a, a), (seq_b, b)| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(seq_a.cmp(seq_b))
    });
    scored.truncate(k);

    scored.into_iter().map(|(_, hit)| hit).collect()
}
