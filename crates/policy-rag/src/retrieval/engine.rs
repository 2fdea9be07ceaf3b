//! The retrieval engine: ingestion, search and context assembly over a
//! persistent index
//!
//! Searches clone the current `Arc<IndexSnapshot>` and never block on
//! writers. Writers (ingest, clear, delete) are serialised by one async
//! mutex, commit to SQLite in a single transaction and only then publish a
//! new snapshot, so a failed call leaves both copies of the index as they
//! were.

use parking_lot::RwLock;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::config::RagConfig;
use crate::error::{Error, Result};
use crate::ingestion::{discover_documents, DocumentSource, IngestPipeline};
use crate::providers::EmbeddingProvider;
use crate::storage::{IndexChangeSet, IndexDb, IndexMeta, NewDocument};
use crate::types::{
    Chunk, ContextResponse, Document, DocumentSummary, IndexStats, IngestFailure, IngestOptions,
    IngestSummary, SearchHit,
};

use super::context::assemble_context;
use super::index::IndexSnapshot;

fn join_error(e: tokio::task::JoinError) -> Error {
    Error::internal(format!("Task join error: {}", e))
}

/// Documents parsed and chunked by one ingest call, before embedding
#[derive(Default)]
struct PreparedBatch {
    documents: Vec<(Document, Vec<Chunk>)>,
    replaced: Vec<Uuid>,
    added: usize,
    updated: usize,
    unchanged: usize,
    failed: Vec<IngestFailure>,
}

/// Owned retrieval engine, opened on startup and flushed on shutdown
pub struct RetrievalEngine {
    config: RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    db: Arc<IndexDb>,
    snapshot: RwLock<Arc<IndexSnapshot>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl RetrievalEngine {
    /// Open (or create) the index under `config.index.storage_path` and load
    /// it into memory
    pub async fn open(config: RagConfig, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        config.validate()?;

        let path = config.index_file();
        let rebuild_on_corrupt = config.index.rebuild_on_corrupt;
        let embedder_meta = meta_of(embedder.as_ref());

        let (db, snapshot) = tokio::task::spawn_blocking(move || {
            open_index(&path, rebuild_on_corrupt, &embedder_meta)
        })
        .await
        .map_err(join_error)??;

        tracing::info!(
            "Opened index {}: {} documents, {} entries (dimension {}, {})",
            config.index_file().display(),
            snapshot.document_count(),
            snapshot.entry_count(),
            snapshot.meta().dimension,
            config.index.metric
        );

        let engine = Self {
            config,
            embedder,
            db: Arc::new(db),
            snapshot: RwLock::new(Arc::new(snapshot)),
            write_lock: tokio::sync::Mutex::new(()),
        };

        if let Err(e) = engine.check_compatible(&engine.current()) {
            tracing::warn!("{}", e);
        }

        Ok(engine)
    }

    /// Configuration the engine was opened with
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Embedding provider in use
    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    fn current(&self) -> Arc<IndexSnapshot> {
        self.snapshot.read().clone()
    }

    fn publish(&self, snapshot: IndexSnapshot) {
        *self.snapshot.write() = Arc::new(snapshot);
    }

    /// A non-empty index built by a different embedder cannot be searched or
    /// extended, only rebuilt
    fn check_compatible(&self, snapshot: &IndexSnapshot) -> Result<()> {
        let stored = snapshot.meta();
        let current = meta_of(self.embedder.as_ref());
        if snapshot.is_empty() || *stored == current {
            return Ok(());
        }
        Err(Error::index(format!(
            "index was built with {}/{} (dimension {}) but the embedder is {}/{} (dimension {}); \
             re-ingest with force_rebuild",
            stored.provider,
            stored.model,
            stored.dimension,
            current.provider,
            current.model,
            current.dimension
        )))
    }

    /// Extract, chunk, embed and index the given documents
    pub async fn ingest(
        &self,
        sources: Vec<DocumentSource>,
        options: IngestOptions,
    ) -> Result<IngestSummary> {
        self.ingest_inner(sources, options, None).await
    }

    /// Ingest every supported file under `root`. Documents previously
    /// ingested from under `root` whose file is gone are removed.
    pub async fn ingest_directory(
        &self,
        root: impl AsRef<Path>,
        options: IngestOptions,
    ) -> Result<IngestSummary> {
        let root = root.as_ref().to_path_buf();
        let discover_root = root.clone();
        let files = tokio::task::spawn_blocking(move || discover_documents(&discover_root))
            .await
            .map_err(join_error)??;

        tracing::info!("Found {} supported files under {}", files.len(), root.display());

        let sources = files.iter().map(DocumentSource::from_path).collect();
        self.ingest_inner(sources, options, Some(root)).await
    }

    async fn ingest_inner(
        &self,
        sources: Vec<DocumentSource>,
        options: IngestOptions,
        prune_root: Option<PathBuf>,
    ) -> Result<IngestSummary> {
        let start = Instant::now();
        options.chunking.validate()?;

        let _guard = self.write_lock.lock().await;
        let current = self.current();
        let rebuild = options.force_rebuild;
        if !rebuild {
            self.check_compatible(&current)?;
        }

        // Parse and chunk off the async runtime
        let pipeline = IngestPipeline::new(options.chunking);
        let snapshot = current.clone();
        let mut batch = tokio::task::spawn_blocking(move || {
            prepare_batch(&pipeline, sources, &snapshot, rebuild)
        })
        .await
        .map_err(join_error)??;

        let mut removed: Vec<Uuid> = Vec::new();
        if let (Some(root), false) = (&prune_root, rebuild) {
            for doc in current.documents() {
                let path = Path::new(&doc.path);
                if path.starts_with(root) && !path.exists() {
                    tracing::info!("Removing {}: file no longer exists", doc.path);
                    removed.push(doc.id);
                }
            }
        }

        let insert = self.embed_documents(std::mem::take(&mut batch.documents)).await?;
        let chunks_created: usize = insert.iter().map(|d| d.chunks.len()).sum();

        let mut delete_documents = batch.replaced.clone();
        delete_documents.extend(removed.iter().copied());

        let embedder_meta = meta_of(self.embedder.as_ref());
        let changes = IndexChangeSet {
            clear_all: rebuild,
            delete_documents,
            insert,
            meta: Some(embedder_meta.clone()),
        };

        if rebuild || !changes.delete_documents.is_empty() || !changes.insert.is_empty() {
            let added_documents: Vec<Document> =
                changes.insert.iter().map(|d| d.document.clone()).collect();
            let removed_set: HashSet<Uuid> = changes.delete_documents.iter().copied().collect();

            let db = self.db.clone();
            let inserted = tokio::task::spawn_blocking(move || db.apply(&changes))
                .await
                .map_err(join_error)??;

            self.publish(current.with_changes(
                rebuild,
                &removed_set,
                added_documents,
                inserted,
                Some(embedder_meta),
            ));
        }

        let stats = self.stats();
        let summary = IngestSummary {
            success: stats.documents > 0,
            rebuilt: rebuild,
            documents_added: batch.added,
            documents_updated: batch.updated,
            documents_unchanged: batch.unchanged,
            documents_removed: removed.len(),
            chunks_created,
            failed: batch.failed,
            processing_time_ms: start.elapsed().as_millis() as u64,
            stats,
        };

        tracing::info!(
            "Ingest finished in {}ms: {} added, {} updated, {} unchanged, {} removed, {} failed, {} chunks",
            summary.processing_time_ms,
            summary.documents_added,
            summary.documents_updated,
            summary.documents_unchanged,
            summary.documents_removed,
            summary.failed.len(),
            summary.chunks_created
        );

        Ok(summary)
    }

    /// Embed every chunk of the batch in one provider call. Any failure
    /// aborts the ingest.
    async fn embed_documents(
        &self,
        documents: Vec<(Document, Vec<Chunk>)>,
    ) -> Result<Vec<NewDocument>> {
        let texts: Vec<String> = documents
            .iter()
            .flat_map(|(_, chunks)| chunks.iter().map(|c| c.text.clone()))
            .collect();

        if texts.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!("Embedding {} chunks with {}", texts.len(), self.embedder.name());
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != texts.len() {
            return Err(Error::embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        let dimension = self.embedder.dimensions();
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dimension) {
            return Err(Error::embedding(format!(
                "expected dimension {}, got {}",
                dimension,
                bad.len()
            )));
        }

        let mut embeddings = embeddings.into_iter();
        Ok(documents
            .into_iter()
            .map(|(document, chunks)| NewDocument {
                document,
                chunks: chunks.into_iter().zip(embeddings.by_ref()).collect(),
            })
            .collect())
    }

    /// Top `k` chunks most similar to `query` with similarity at least
    /// `min_similarity`
    pub async fn search(&self, query: &str, k: usize, min_similarity: f32) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if !min_similarity.is_finite() {
            return Err(Error::invalid_request("min_similarity must be a finite number"));
        }

        let snapshot = self.current();
        if snapshot.is_empty() {
            return Ok(Vec::new());
        }
        self.check_compatible(&snapshot)?;

        let query_embedding = self.embedder.embed(query).await?;
        if query_embedding.len() != snapshot.meta().dimension {
            return Err(Error::embedding(format!(
                "query embedding has dimension {}, index has {}",
                query_embedding.len(),
                snapshot.meta().dimension
            )));
        }

        let metric = self.config.index.metric;
        let hits = tokio::task::spawn_blocking(move || {
            snapshot.search(&query_embedding, k, min_similarity, metric)
        })
        .await
        .map_err(join_error)?;

        tracing::debug!("Search returned {} hits (k={})", hits.len(), k);
        Ok(hits)
    }

    /// Retrieve the top `k` chunks and join them into one bounded string
    pub async fn get_context(&self, query: &str, k: usize) -> Result<ContextResponse> {
        let hits = self
            .search(query, k, self.config.retrieval.context_min_similarity)
            .await?;
        let assembled = assemble_context(&hits, self.config.retrieval.context_max_chars);

        Ok(ContextResponse {
            query: query.to_string(),
            context: assembled.context,
            sources: assembled.sources,
            truncated: assembled.truncated,
        })
    }

    /// Read-only index statistics
    pub fn stats(&self) -> IndexStats {
        let snapshot = self.current();
        IndexStats {
            documents: snapshot.document_count(),
            chunks: snapshot.entry_count(),
            index_size: snapshot.entry_count(),
            embedding_dimension: snapshot.meta().dimension,
            embedding_provider: snapshot.meta().provider.clone(),
            embedding_model: snapshot.meta().model.clone(),
            similarity_metric: self.config.index.metric.to_string(),
            storage_bytes: self.db.size_bytes(),
            vector_db_path: self.config.index.storage_path.display().to_string(),
            documents_path: self.config.documents.path.display().to_string(),
            chunk_size: self.config.chunking.chunk_size,
            chunk_overlap: self.config.chunking.chunk_overlap,
        }
    }

    /// Indexed documents, sorted by path
    pub fn list_documents(&self) -> Vec<DocumentSummary> {
        self.current()
            .documents()
            .into_iter()
            .map(DocumentSummary::from)
            .collect()
    }

    /// Remove one document and its entries
    pub async fn delete_document(&self, id: Uuid) -> Result<DocumentSummary> {
        let _guard = self.write_lock.lock().await;
        let current = self.current();
        let document = current
            .document(&id)
            .map(DocumentSummary::from)
            .ok_or_else(|| Error::DocumentNotFound(id.to_string()))?;

        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.delete_document(&id))
            .await
            .map_err(join_error)??;

        let removed: HashSet<Uuid> = [id].into_iter().collect();
        self.publish(current.with_changes(false, &removed, Vec::new(), Vec::new(), None));

        tracing::info!("Deleted document {} ({})", document.filename, id);
        Ok(document)
    }

    /// Remove every document and entry
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let meta = meta_of(self.embedder.as_ref());

        let db = self.db.clone();
        let changes = IndexChangeSet {
            clear_all: true,
            meta: Some(meta.clone()),
            ..Default::default()
        };
        tokio::task::spawn_blocking(move || db.apply(&changes))
            .await
            .map_err(join_error)??;

        self.publish(IndexSnapshot::empty(meta));
        tracing::info!("Index cleared");
        Ok(())
    }

    /// Checkpoint the index so the database file is self-contained
    pub async fn flush(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.checkpoint())
            .await
            .map_err(join_error)??;
        tracing::info!("Index flushed");
        Ok(())
    }
}

fn meta_of(embedder: &dyn EmbeddingProvider) -> IndexMeta {
    IndexMeta {
        dimension: embedder.dimensions(),
        provider: embedder.name().to_string(),
        model: embedder.model().to_string(),
    }
}

/// Parse and chunk every source, collecting per-file failures. Any other
/// error aborts the batch.
fn prepare_batch(
    pipeline: &IngestPipeline,
    sources: Vec<DocumentSource>,
    current: &IndexSnapshot,
    rebuild: bool,
) -> Result<PreparedBatch> {
    let chunking = pipeline.chunking();
    let mut batch = PreparedBatch::default();
    let mut seen = HashSet::new();

    for source in sources {
        if !seen.insert(source.path.clone()) {
            tracing::warn!("Skipping duplicate source {}", source.path);
            continue;
        }

        let parsed = match pipeline.parse(&source) {
            Ok(parsed) => parsed,
            Err(e) if !e.is_ingestion() => return Err(e),
            Err(e) => {
                tracing::warn!("Failed to ingest {}: {}", source.path, e);
                batch.failed.push(IngestFailure {
                    path: source.path.clone(),
                    error: e.to_string(),
                });
                continue;
            }
        };

        let existing = if rebuild {
            None
        } else {
            current.document_by_path(&source.path)
        };

        if let Some(existing) = existing {
            if existing.is_unchanged(&parsed.content_hash, chunking.chunk_size, chunking.chunk_overlap) {
                tracing::debug!("Unchanged: {}", source.path);
                batch.unchanged += 1;
                continue;
            }
            batch.replaced.push(existing.id);
            batch.updated += 1;
        } else {
            batch.added += 1;
        }

        let (document, chunks) = pipeline.create_chunks(&source.path, &parsed);
        tracing::debug!("Chunked {} into {} chunks", source.path, chunks.len());
        batch.documents.push((document, chunks));
    }

    Ok(batch)
}

/// Open the index, moving a corrupt file aside when allowed
fn open_index(
    path: &Path,
    rebuild_on_corrupt: bool,
    embedder_meta: &IndexMeta,
) -> Result<(IndexDb, IndexSnapshot)> {
    match load_index(path, embedder_meta) {
        Err(Error::Index(reason)) if rebuild_on_corrupt => {
            let moved = quarantine(path)?;
            tracing::warn!(
                "Index {} is unusable ({}); moved to {} and starting empty",
                path.display(),
                reason,
                moved.display()
            );
            load_index(path, embedder_meta)
        }
        other => other,
    }
}

fn load_index(path: &Path, embedder_meta: &IndexMeta) -> Result<(IndexDb, IndexSnapshot)> {
    let db = IndexDb::open(path)?;

    let snapshot = match db.meta()? {
        Some(stored) => {
            let loaded = db.load(stored.dimension)?;
            if loaded.entries.is_empty() && stored != *embedder_meta {
                db.set_meta(embedder_meta)?;
                IndexSnapshot::new(embedder_meta.clone(), loaded.documents, Vec::new())
            } else {
                IndexSnapshot::new(stored, loaded.documents, loaded.entries)
            }
        }
        None => {
            let loaded = db.load(embedder_meta.dimension)?;
            db.set_meta(embedder_meta)?;
            IndexSnapshot::new(embedder_meta.clone(), loaded.documents, loaded.entries)
        }
    };

    Ok((db, snapshot))
}

/// Rename the index file (and its WAL/SHM companions) to
/// `<name>.corrupt-<unix-ts>`
fn quarantine(path: &Path) -> Result<PathBuf> {
    let suffix = format!("corrupt-{}", chrono::Utc::now().timestamp());
    let target = PathBuf::from(format!("{}.{}", path.display(), suffix));

    if path.exists() {
        std::fs::rename(path, &target)?;
    }
    for companion in ["wal", "shm"] {
        let from = PathBuf::from(format!("{}-{}", path.display(), companion));
        if from.exists() {
            let to = PathBuf::from(format!("{}-{}.{}", path.display(), companion, suffix));
            std::fs::rename(&from, &to)?;
        }
    }

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChunkingConfig, INDEX_FILE_NAME};
    use crate::providers::MockEmbedder;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Mock embedder that can be switched into failure mode
    struct ToggleEmbedder {
        inner: MockEmbedder,
        fail: AtomicBool,
    }

    #[async_trait]
    impl EmbeddingProvider for ToggleEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::embedding("provider unavailable"));
            }
            self.inner.embed(text).await
        }

        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }

        fn name(&self) -> &str {
            self.inner.name()
        }

        fn model(&self) -> &str {
            self.inner.model()
        }
    }

    fn config(dir: &Path) -> RagConfig {
        let mut config = RagConfig::default();
        config.index.storage_path = dir.join("index");
        config.documents.path = dir.join("docs");
        config.embeddings.dimensions = 256;
        config
    }

    async fn open(dir: &Path) -> RetrievalEngine {
        let config = config(dir);
        let embedder = Arc::new(MockEmbedder::new(config.embeddings.dimensions));
        RetrievalEngine::open(config, embedder).await.unwrap()
    }

    fn options(size: usize, overlap: usize) -> IngestOptions {
        IngestOptions::new(ChunkingConfig::new(size, overlap).unwrap())
    }

    fn policies() -> Vec<DocumentSource> {
        vec![
            DocumentSource::from_bytes("hr/leave.txt", "Employees get 15 vacation days."),
            DocumentSource::from_bytes(
                "hr/remote.md",
                "Remote work requires manager approval. Equipment is provided by IT.",
            ),
            DocumentSource::from_bytes(
                "hr/conduct.html",
                "<body><p>Treat colleagues with respect.</p></body>",
            ),
        ]
    }

    #[tokio::test]
    async fn test_vacation_example() {
        let dir = tempfile::tempdir().unwrap();
        let engine = open(dir.path()).await;

        engine
            .ingest(
                vec![DocumentSource::from_bytes("leave.txt", "Employees get 15 vacation days.")],
                options(1000, 200),
            )
            .await
            .unwrap();

        let hits = engine.search("How many vacation days?", 1, 0.0).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.text, "Employees get 15 vacation days.");
        assert!(hits[0].similarity > 0.0);
        assert_eq!(hits[0].document.filename, "leave.txt");
    }

    #[tokio::test]
    async fn test_blank_query_and_zero_k() {
        let dir = tempfile::tempdir().unwrap();
        let engine = open(dir.path()).await;
        engine.ingest(policies(), options(50, 5)).await.unwrap();

        assert!(engine.search("   ", 5, 0.0).await.unwrap().is_empty());
        assert!(engine.search("vacation", 0, 0.0).await.unwrap().is_empty());
        assert!(engine.search("vacation", 3, f32::NAN).await.is_err());
    }

    #[tokio::test]
    async fn test_unchanged_reingest_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let engine = open(dir.path()).await;

        let first = engine.ingest(policies(), options(8, 2)).await.unwrap();
        assert_eq!(first.documents_added, 3);
        let chunks = engine.stats().chunks;
        assert_eq!(first.chunks_created, chunks);

        let second = engine.ingest(policies(), options(8, 2)).await.unwrap();
        assert_eq!(second.documents_unchanged, 3);
        assert_eq!(second.documents_added, 0);
        assert_eq!(second.chunks_created, 0);
        assert_eq!(engine.stats().chunks, chunks);
    }

    #[tokio::test]
    async fn test_changed_document_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let engine = open(dir.path()).await;
        engine.ingest(policies(), options(1000, 10)).await.unwrap();
        let before = engine.list_documents();

        let summary = engine
            .ingest(
                vec![DocumentSource::from_bytes("hr/leave.txt", "Employees get 20 vacation days.")],
                options(1000, 10),
            )
            .await
            .unwrap();
        assert_eq!(summary.documents_updated, 1);
        assert_eq!(summary.stats.documents, 3);
        assert_eq!(summary.stats.chunks, 3);

        let after = engine.list_documents();
        let old = before.iter().find(|d| d.path == "hr/leave.txt").unwrap();
        let new = after.iter().find(|d| d.path == "hr/leave.txt").unwrap();
        assert_ne!(old.id, new.id);

        let hits = engine.search("vacation days", 3, 0.0).await.unwrap();
        assert!(hits.iter().any(|h| h.chunk.text.contains("20 vacation")));
        assert!(!hits.iter().any(|h| h.chunk.text.contains("15 vacation")));
    }

    #[tokio::test]
    async fn test_chunk_parameter_change_reindexes() {
        let dir = tempfile::tempdir().unwrap();
        let engine = open(dir.path()).await;
        engine.ingest(policies(), options(1000, 10)).await.unwrap();

        let summary = engine.ingest(policies(), options(4, 1)).await.unwrap();
        assert_eq!(summary.documents_updated, 3);
        assert!(summary.stats.chunks > 3);
    }

    #[tokio::test]
    async fn test_per_file_failures_do_not_abort() {
        let dir = tempfile::tempdir().unwrap();
        let engine = open(dir.path()).await;

        let mut sources = policies();
        sources.push(DocumentSource::from_bytes("blank.txt", "  \n "));
        sources.push(DocumentSource::from_bytes("tool.exe", "MZ"));
        sources.push(DocumentSource::from_path(dir.path().join("missing.txt")));

        let summary = engine.ingest(sources, options(100, 10)).await.unwrap();
        assert!(summary.success);
        assert_eq!(summary.documents_added, 3);
        assert_eq!(summary.failed.len(), 3);
        assert!(summary.failed.iter().any(|f| f.path == "blank.txt" && f.error.contains("no text")));
        assert_eq!(summary.stats.documents, 3);
    }

    #[tokio::test]
    async fn test_embedding_failure_leaves_index_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let embedder = Arc::new(ToggleEmbedder {
            inner: MockEmbedder::new(config.embeddings.dimensions),
            fail: AtomicBool::new(false),
        });
        let engine = RetrievalEngine::open(config, embedder.clone()).await.unwrap();

        engine.ingest(policies(), options(8, 2)).await.unwrap();
        let before = engine.stats();
        let docs_before = engine.list_documents();

        embedder.fail.store(true, Ordering::SeqCst);
        let err = engine
            .ingest(
                vec![
                    DocumentSource::from_bytes("hr/leave.txt", "Employees get 30 vacation days."),
                    DocumentSource::from_bytes("hr/new.txt", "Brand new policy."),
                ],
                options(8, 2),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));

        let err = engine.ingest(policies(), options(8, 2).rebuild()).await.unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));

        embedder.fail.store(false, Ordering::SeqCst);
        let after = engine.stats();
        assert_eq!(after.documents, before.documents);
        assert_eq!(after.chunks, before.chunks);
        let ids: Vec<_> = engine.list_documents().iter().map(|d| d.id).collect();
        assert_eq!(ids, docs_before.iter().map(|d| d.id).collect::<Vec<_>>());

        let hits = engine.search("vacation days", 10, 0.0).await.unwrap();
        assert!(hits.iter().all(|h| !h.chunk.text.contains("30")));

        // The on-disk copy matches too
        drop(engine);
        let reopened = open(dir.path()).await;
        assert_eq!(reopened.stats().chunks, before.chunks);
    }

    #[tokio::test]
    async fn test_force_rebuild_replaces_everything() {
        let dir = tempfile::tempdir().unwrap();
        let engine = open(dir.path()).await;
        engine.ingest(policies(), options(100, 10)).await.unwrap();

        let summary = engine
            .ingest(
                vec![DocumentSource::from_bytes("only.txt", "Only this policy remains.")],
                options(100, 10).rebuild(),
            )
            .await
            .unwrap();

        assert!(summary.rebuilt);
        assert_eq!(summary.documents_added, 1);
        assert_eq!(summary.stats.documents, 1);
        assert_eq!(engine.list_documents()[0].path, "only.txt");
    }

    #[tokio::test]
    async fn test_index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let hits_before = {
            let engine = open(dir.path()).await;
            engine.ingest(policies(), options(8, 2)).await.unwrap();
            engine.flush().await.unwrap();
            engine.search("remote work approval", 3, 0.0).await.unwrap()
        };

        let engine = open(dir.path()).await;
        assert_eq!(engine.stats().documents, 3);
        let hits_after = engine.search("remote work approval", 3, 0.0).await.unwrap();
        assert_eq!(hits_before, hits_after);
        assert!(engine.stats().storage_bytes > 0);
    }

    #[tokio::test]
    async fn test_dimension_change_requires_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        {
            let engine = open(dir.path()).await;
            engine.ingest(policies(), options(100, 10)).await.unwrap();
        }

        let mut config = config(dir.path());
        config.embeddings.dimensions = 64;
        let engine = RetrievalEngine::open(config, Arc::new(MockEmbedder::new(64)))
            .await
            .unwrap();
        assert_eq!(engine.stats().embedding_dimension, 256);

        assert!(matches!(engine.search("vacation", 3, 0.0).await, Err(Error::Index(_))));
        assert!(matches!(
            engine.ingest(policies(), options(100, 10)).await,
            Err(Error::Index(_))
        ));

        engine.ingest(policies(), options(100, 10).rebuild()).await.unwrap();
        assert_eq!(engine.stats().embedding_dimension, 64);
        assert!(!engine.search("vacation", 3, 0.0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_index_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let index_dir = dir.path().join("index");
        std::fs::create_dir_all(&index_dir).unwrap();
        std::fs::write(index_dir.join(INDEX_FILE_NAME), b"garbage ".repeat(1024)).unwrap();

        let mut strict = config(dir.path());
        strict.index.rebuild_on_corrupt = false;
        let result = RetrievalEngine::open(strict, Arc::new(MockEmbedder::new(256))).await;
        assert!(matches!(result, Err(Error::Index(_))));

        let engine = open(dir.path()).await;
        assert_eq!(engine.stats().documents, 0);
        let moved = std::fs::read_dir(&index_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().contains(".corrupt-"));
        assert!(moved);

        engine.ingest(policies(), options(100, 10)).await.unwrap();
        assert_eq!(engine.stats().documents, 3);
    }

    #[tokio::test]
    async fn test_ingest_directory_prunes_deleted_files() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("docs");
        std::fs::create_dir_all(docs.join("hr")).unwrap();
        std::fs::write(docs.join("hr/leave.txt"), "Employees get 15 vacation days.").unwrap();
        std::fs::write(docs.join("dress.md"), "Business casual on weekdays.").unwrap();
        std::fs::write(docs.join("logo.png"), [0u8; 16]).unwrap();

        let engine = open(dir.path()).await;
        let summary = engine.ingest_directory(&docs, options(100, 10)).await.unwrap();
        assert_eq!(summary.documents_added, 2);
        assert!(summary.failed.is_empty());

        std::fs::remove_file(docs.join("dress.md")).unwrap();
        let summary = engine.ingest_directory(&docs, options(100, 10)).await.unwrap();
        assert_eq!(summary.documents_removed, 1);
        assert_eq!(summary.documents_unchanged, 1);
        assert_eq!(summary.stats.documents, 1);

        let err = engine
            .ingest_directory(dir.path().join("nope"), options(100, 10))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DocumentsPathNotFound(_)));
    }

    #[tokio::test]
    async fn test_get_context() {
        let dir = tempfile::tempdir().unwrap();
        let engine = open(dir.path()).await;

        let empty = engine.get_context("vacation", 3).await.unwrap();
        assert_eq!(empty.context, "No relevant documents found.");
        assert!(empty.sources.is_empty());

        engine.ingest(policies(), options(1000, 10)).await.unwrap();
        let ctx = engine.get_context("How many vacation days?", 2).await.unwrap();
        assert!(ctx.context.starts_with("[1] leave.txt (similarity "));
        assert!(ctx.context.contains("Employees get 15 vacation days."));
        assert!(ctx.sources.len() <= 2);
        assert!(ctx.context.chars().count() <= engine.config().retrieval.context_max_chars);
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let engine = open(dir.path()).await;
        engine.ingest(policies(), options(100, 10)).await.unwrap();

        let target = engine.list_documents()[0].clone();
        let deleted = engine.delete_document(target.id).await.unwrap();
        assert_eq!(deleted.id, target.id);
        assert_eq!(engine.stats().documents, 2);
        assert!(matches!(
            engine.delete_document(target.id).await,
            Err(Error::DocumentNotFound(_))
        ));

        engine.clear().await.unwrap();
        let stats = engine.stats();
        assert_eq!((stats.documents, stats.chunks), (0, 0));
        assert!(engine.search("vacation", 3, 0.0).await.unwrap().is_empty());

        drop(engine);
        assert_eq!(open(dir.path()).await.stats().documents, 0);
    }

    #[tokio::test]
    async fn test_concurrent_search_during_ingest() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(open(dir.path()).await);
        engine.ingest(policies(), options(8, 2)).await.unwrap();

        let writer = {
            let engine = engine.clone();
            tokio::spawn(async move {
                for i in 0..5 {
                    let text = format!("Employees get {} vacation days.", 15 + i);
                    engine
                        .ingest(vec![DocumentSource::from_bytes("hr/leave.txt", text)], options(8, 2))
                        .await
                        .unwrap();
                }
            })
        };

        for _ in 0..20 {
            let hits = engine.search("vacation days", 50, 0.0).await.unwrap();
            // One version of leave.txt at a time
            let versions: HashSet<_> = hits
                .iter()
                .filter(|h| h.document.path == "hr/leave.txt")
                .map(|h| h.document.id)
                .collect();
            assert!(versions.len() <= 1);
        }

        writer.await.unwrap();
    }
}
