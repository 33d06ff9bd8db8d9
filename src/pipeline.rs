//! Pipeline service object for busbot.
//!
//! Owns every component of the question-answering pipeline: the document store,
//! chunker, embedder, vector index and generation backend. Construction is the
//! explicit initialisation step and [`Pipeline::shutdown`] the explicit teardown.

use crate::catalog::CatalogService;
use crate::chunking::{segment_document, TextChunker};
use crate::config::{Prompts, Settings};
use crate::documents::{DocumentStore, SourceDocument};
use crate::embedding::{create_embedder, Embedder};
use crate::error::{BusbotError, Result};
use crate::rag::{Answer, AnswerGenerator, Generator, OpenAIGenerator, RagEngine, RetrievalResult, Retriever};
use crate::vector_store::{IndexEntry, SqliteVectorStore, VectorStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// A source written to the index during an ingestion pass.
#[derive(Debug, Clone, Serialize)]
pub struct IngestedSource {
    pub source_id: String,
    pub segments: usize,
    /// Entries removed because the source shrank.
    pub stale_removed: usize,
}

/// A source left out of an ingestion pass.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedSource {
    /// Source id, or the file path when the document could not be read at all.
    pub source: String,
    pub reason: String,
}

/// Outcome of an ingestion pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub indexed: Vec<IngestedSource>,
    pub skipped: Vec<SkippedSource>,
    /// Entries removed before ingesting (full reindex only).
    pub cleared: usize,
}

impl IngestReport {
    pub fn total_segments(&self) -> usize {
        self.indexed.iter().map(|s| s.segments).sum()
    }
}

/// The busbot pipeline.
pub struct Pipeline {
    settings: Settings,
    prompts: Prompts,
    documents: DocumentStore,
    chunker: TextChunker,
    embedder: Arc<dyn Embedder>,
    vector_store: Arc<dyn VectorStore>,
    generator: Arc<dyn Generator>,
}

impl Pipeline {
    /// Validate the configuration, build every component, open the index and
    /// verify that it was built with the configured embedding model.
    pub async fn open(settings: Settings) -> Result<Self> {
        let pipeline = Self::open_for_reindex(settings)?;
        pipeline.verify_model().await?;
        Ok(pipeline)
    }

    /// Like [`Pipeline::open`] but tolerates an index built with another model,
    /// which [`Pipeline::reindex`] is about to discard.
    pub fn open_for_reindex(settings: Settings) -> Result<Self> {
        settings.validate()?;

        let embedder = create_embedder(&settings)?;
        let generator: Arc<dyn Generator> = Arc::new(OpenAIGenerator::from_settings(&settings)?);
        let vector_store: Arc<dyn VectorStore> =
            Arc::new(SqliteVectorStore::new(&settings.sqlite_path())?);

        info!(
            "Pipeline ready (embedding: {}, generation: {})",
            embedder.model_id(),
            generator.model()
        );

        Self::with_components(settings, vector_store, embedder, generator)
    }

    /// Create a pipeline with custom components.
    pub fn with_components(
        settings: Settings,
        vector_store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;
        let chunker = TextChunker::new(settings.chunking.chunk_size, settings.chunking.chunk_overlap)?;
        let documents = DocumentStore::new(settings.catalog_path(), settings.profiles_dir());

        Ok(Self {
            settings,
            prompts,
            documents,
            chunker,
            embedder,
            vector_store,
            generator,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    pub fn vector_store(&self) -> Arc<dyn VectorStore> {
        self.vector_store.clone()
    }

    pub fn embedder(&self) -> Arc<dyn Embedder> {
        self.embedder.clone()
    }

    /// Fail with [`BusbotError::ModelMismatch`] if the index was built with another model.
    pub async fn verify_model(&self) -> Result<()> {
        let configured = self.embedder.model_id();
        match self.vector_store.indexed_model().await? {
            Some(indexed) if indexed.model_id != configured => Err(BusbotError::ModelMismatch {
                indexed: indexed.model_id,
                configured,
            }),
            _ => Ok(()),
        }
    }

    /// Load, segment, embed and index every source document.
    ///
    /// Unreadable documents and embedding failures skip that document only.
    #[instrument(skip(self))]
    pub async fn ingest(&self) -> Result<IngestReport> {
        self.vector_store
            .bind_model(&self.embedder.model_id(), self.embedder.dimensions())
            .await?;

        let loaded = self.documents.load();
        let mut report = IngestReport {
            skipped: loaded
                .failures
                .into_iter()
                .map(|f| SkippedSource {
                    source: f.path.display().to_string(),
                    reason: f.reason,
                })
                .collect(),
            ..Default::default()
        };

        for doc in &loaded.documents {
            match self.ingest_document(doc).await {
                Ok(indexed) => report.indexed.push(indexed),
                Err(e @ BusbotError::Embedding(_)) => {
                    warn!("Skipping source '{}': {}", doc.id, e);
                    report.skipped.push(SkippedSource {
                        source: doc.id.clone(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            "Indexed {} segments from {} sources ({} skipped)",
            report.total_segments(),
            report.indexed.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    async fn ingest_document(&self, doc: &SourceDocument) -> Result<IngestedSource> {
        let segments = segment_document(doc, &self.chunker);
        let inputs: Vec<String> = segments.iter().map(|s| s.embedding_input()).collect();

        let embeddings = self.embedder.embed_batch(&inputs).await?;
        if embeddings.len() != segments.len() {
            return Err(BusbotError::Embedding(format!(
                "Expected {} embeddings for '{}', got {}",
                segments.len(),
                doc.id,
                embeddings.len()
            )));
        }

        let entries: Vec<IndexEntry> = segments
            .into_iter()
            .zip(embeddings)
            .map(|(segment, embedding)| IndexEntry::new(segment, embedding))
            .collect();

        let written = self.vector_store.upsert_batch(&entries).await?;
        let stale_removed = self
            .vector_store
            .truncate_source(&doc.id, entries.len() as u32)
            .await?;

        info!("Indexed {} segments of '{}'", written, doc.id);
        Ok(IngestedSource {
            source_id: doc.id.clone(),
            segments: written,
            stale_removed,
        })
    }

    /// Drop the whole index (and its recorded model), then ingest from scratch.
    #[instrument(skip(self))]
    pub async fn reindex(&self) -> Result<IngestReport> {
        let cleared = self.vector_store.clear().await?;
        info!("Cleared {} entries, rebuilding index", cleared);

        let mut report = self.ingest().await?;
        report.cleared = cleared;
        Ok(report)
    }

    /// A retriever configured from the `retrieval` settings.
    pub fn retriever(&self) -> Retriever {
        let retrieval = &self.settings.retrieval;
        Retriever::new(self.vector_store.clone(), self.embedder.clone())
            .with_top_k(retrieval.top_k)
            .with_min_score(retrieval.min_score)
            .with_provider_filter(retrieval.filter_by_provider)
    }

    /// A RAG engine over this pipeline's index and generation backend.
    pub fn engine(&self) -> RagEngine {
        let answers = AnswerGenerator::new(self.generator.clone()).with_prompts(self.prompts.clone());
        RagEngine::new(self.retriever(), answers)
    }

    /// Answer a question with the configured top-k.
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        self.engine().ask(question).await
    }

    /// Retrieve without generating. `min_score` overrides the configured threshold.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        min_score: Option<f32>,
    ) -> Result<RetrievalResult> {
        let retriever = match min_score {
            Some(min) => self.retriever().with_min_score(Some(min)),
            None => self.retriever(),
        };
        retriever.retrieve(query, k).await
    }

    /// Catalog lookups over the current catalog file.
    pub fn catalog(&self) -> Result<CatalogService> {
        Ok(CatalogService::new(self.documents.load_catalog()?))
    }

    /// Flush and close the index.
    pub async fn shutdown(self) -> Result<()> {
        self.vector_store.close().await?;
        info!("Pipeline shut down");
        Ok(())
    }
}
