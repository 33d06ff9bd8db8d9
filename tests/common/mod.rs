//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use busbot::config::Settings;
use busbot::embedding::{Embedder, HashingEmbedder};
use busbot::pipeline::Pipeline;
use busbot::rag::Generator;
use busbot::vector_store::{
    IndexEntry, IndexedModel, IndexedSource, MemoryVectorStore, QueryFilter, SearchHit, VectorStore,
};
use busbot::{BusbotError, Result};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const HANIF_PROFILE: &str = "Hanif Enterprise operates daily coaches between Dhaka, Rajshahi and Sylhet. \
Contact details: hotline 01713-049530, head office at Kallyanpur, Dhaka. \
Tickets can be cancelled up to six hours before departure for a ninety percent refund. \
Each passenger may carry twenty kilograms of luggage free of charge.";

pub const ENA_PROFILE: &str = "Ena Transport runs air-conditioned buses between Dhaka and Sylhet. \
Contact details: hotline 01700-111222, counter at Mohakhali bus terminal. \
Refunds are not available within three hours of departure. Pets are not allowed on board.";

pub const CATALOG: &str = r#"{
    "districts": [
        {"name": "Dhaka", "dropping_points": [
            {"name": "Gabtoli", "price": 0},
            {"name": "Kallyanpur", "price": 50}
        ]},
        {"name": "Rajshahi", "dropping_points": [
            {"name": "Shaheb Bazar", "price": 450},
            {"name": "Rail Gate", "price": 480}
        ]},
        {"name": "Sylhet", "dropping_points": [
            {"name": "Kadamtali", "price": 600}
        ]}
    ],
    "bus_providers": [
        {"name": "Hanif", "coverage_districts": ["Dhaka", "Rajshahi", "Sylhet"]},
        {"name": "Ena", "coverage_districts": ["Dhaka", "Sylhet"]}
    ]
}"#;

pub const DIMENSIONS: usize = 384;

/// A document directory with the catalog and two provider profiles.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let fixture = Self::empty();
        fixture.write_catalog(CATALOG);
        fixture.write_profile("hanif", HANIF_PROFILE);
        fixture.write_profile("ena", ENA_PROFILE);
        fixture
    }

    /// Only the (empty) profiles directory, no catalog.
    pub fn empty() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("attachment")).unwrap();
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_catalog(&self, json: &str) {
        std::fs::write(self.path().join("data.json"), json).unwrap();
    }

    pub fn write_profile(&self, provider: &str, text: &str) {
        std::fs::write(self.path().join("attachment").join(format!("{}.txt", provider)), text).unwrap();
    }

    /// Settings pointing every path into the fixture directory, with local embeddings
    /// and small chunks so each profile spans several windows.
    pub fn settings(&self) -> Settings {
        let mut settings = Settings::default();
        let dir = self.path();
        settings.general.data_dir = dir.display().to_string();
        settings.documents.catalog_path = dir.join("data.json").display().to_string();
        settings.documents.profiles_dir = dir.join("attachment").display().to_string();
        settings.embedding.provider = "hashing".to_string();
        settings.embedding.dimensions = DIMENSIONS as u32;
        settings.chunking.chunk_size = 120;
        settings.chunking.chunk_overlap = 30;
        settings.vector_store.sqlite_path = dir.join("index.db").display().to_string();
        settings.booking.sqlite_path = dir.join("bookings.db").display().to_string();
        settings
    }

    /// Pipeline over an in-memory index.
    pub fn pipeline(&self, generator: Arc<ScriptedGenerator>) -> Pipeline {
        self.pipeline_with(Arc::new(MemoryVectorStore::new()), DIMENSIONS, generator)
    }

    pub fn pipeline_with(
        &self,
        store: Arc<dyn VectorStore>,
        dimensions: usize,
        generator: Arc<ScriptedGenerator>,
    ) -> Pipeline {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(dimensions));
        Pipeline::with_components(self.settings(), store, embedder, generator).unwrap()
    }
}

/// Generator double that replies with a fixed text, or fails, and records every prompt.
pub struct ScriptedGenerator {
    reply: Option<String>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedGenerator {
    pub fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(text.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// The user prompt of the last call.
    pub fn last_user_prompt(&self) -> Option<String> {
        self.calls.lock().unwrap().last().map(|(_, user)| user.clone())
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((system.to_string(), user.to_string()));
        self.reply
            .clone()
            .ok_or_else(|| BusbotError::GenerationUnavailable("scripted outage".to_string()))
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// Index whose backing storage is gone: every call fails.
pub struct UnavailableStore;

impl UnavailableStore {
    fn fail<T>() -> Result<T> {
        Err(BusbotError::VectorStore("database disk image is malformed".to_string()))
    }
}

#[async_trait]
impl VectorStore for UnavailableStore {
    async fn bind_model(&self, _model_id: &str, _dimensions: usize) -> Result<()> {
        Self::fail()
    }

    async fn indexed_model(&self) -> Result<Option<IndexedModel>> {
        Self::fail()
    }

    async fn upsert(&self, _entry: &IndexEntry) -> Result<()> {
        Self::fail()
    }

    async fn upsert_batch(&self, _entries: &[IndexEntry]) -> Result<usize> {
        Self::fail()
    }

    async fn query(&self, _embedding: &[f32], _k: usize, _filter: &QueryFilter) -> Result<Vec<SearchHit>> {
        Self::fail()
    }

    async fn delete_by_source(&self, _source_id: &str) -> Result<usize> {
        Self::fail()
    }

    async fn truncate_source(&self, _source_id: &str, _len: u32) -> Result<usize> {
        Self::fail()
    }

    async fn clear(&self) -> Result<usize> {
        Self::fail()
    }

    async fn list_sources(&self) -> Result<Vec<IndexedSource>> {
        Self::fail()
    }

    async fn get_by_source(&self, _source_id: &str) -> Result<Vec<IndexEntry>> {
        Self::fail()
    }

    async fn provider_names(&self) -> Result<Vec<String>> {
        Self::fail()
    }

    async fn entry_count(&self) -> Result<usize> {
        Self::fail()
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
