//! SQLite persistence for indexed documents and their entries
//!
//! Embeddings are stored as little-endian `f32` blobs. Every write of one
//! ingest call goes through [`IndexDb::apply`], which runs in a single
//! transaction.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{Chunk, Document, EntryMetadata, FileType, IndexEntry};

const SCHEMA_VERSION: &str = "1";

/// What an index was built with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    /// Embedding dimension
    pub dimension: usize,
    /// Embedding provider name
    pub provider: String,
    /// Embedding model
    pub model: String,
}

/// Everything persisted in the index
#[derive(Debug, Default)]
pub struct LoadedIndex {
    pub documents: Vec<Document>,
    /// Entries ordered by sequence number
    pub entries: Vec<IndexEntry>,
}

/// A document and its embedded chunks, ready to be written
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub document: Document,
    pub chunks: Vec<(Chunk, Vec<f32>)>,
}

/// All writes of one ingest call
#[derive(Debug, Default)]
pub struct IndexChangeSet {
    /// Remove every document and entry first
    pub clear_all: bool,
    /// Documents (and their entries) to remove
    pub delete_documents: Vec<Uuid>,
    /// Documents and entries to insert
    pub insert: Vec<NewDocument>,
    /// Replace the stored index metadata
    pub meta: Option<IndexMeta>,
}

/// SQLite-backed index store
pub struct IndexDb {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl IndexDb {
    /// Create or open the index at the given path. An unreadable file or
    /// unexpected schema is an index error.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::index(format!("Failed to open {}: {}", path.display(), e)))?;

        let db = Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        };

        db.migrate()
            .map_err(|e| Error::index(format!("Unusable index {}: {}", path.display(), e)))?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let db = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            path: None,
        };
        db.migrate()?;
        Ok(db)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        let status: String = conn.query_row("PRAGMA quick_check", [], |row| row.get(0))?;
        if status != "ok" {
            return Err(Error::index(format!("integrity check failed: {}", status)));
        }

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
        "#,
        )?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                path TEXT NOT NULL UNIQUE,
                filename TEXT NOT NULL,
                file_type TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                total_chunks INTEGER NOT NULL,
                chunk_size INTEGER NOT NULL,
                chunk_overlap INTEGER NOT NULL,
                ingested_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS entries (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                chunk_id TEXT NOT NULL UNIQUE,
                document_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                byte_start INTEGER NOT NULL,
                byte_end INTEGER NOT NULL,
                token_start INTEGER NOT NULL,
                token_end INTEGER NOT NULL,
                overlap_tokens INTEGER NOT NULL,
                overlap_bytes INTEGER NOT NULL,
                embedding BLOB NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_entries_document_id ON entries(document_id);
        "#,
        )?;

        let version: Option<String> = conn
            .query_row(
                "SELECT value FROM index_meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match version.as_deref() {
            None => {
                conn.execute(
                    "INSERT INTO index_meta (key, value) VALUES ('schema_version', ?1)",
                    params![SCHEMA_VERSION],
                )?;
            }
            Some(SCHEMA_VERSION) => {}
            Some(other) => {
                return Err(Error::index(format!("unsupported schema version {}", other)));
            }
        }

        Ok(())
    }

    /// Stored embedder metadata, if any
    pub fn meta(&self) -> Result<Option<IndexMeta>> {
        let conn = self.conn.lock();
        let get = |key: &str| -> Result<Option<String>> {
            Ok(conn
                .query_row("SELECT value FROM index_meta WHERE key = ?1", params![key], |row| {
                    row.get(0)
                })
                .optional()?)
        };

        let (Some(dimension), Some(provider), Some(model)) =
            (get("dimension")?, get("provider")?, get("model")?)
        else {
            return Ok(None);
        };

        let dimension = dimension
            .parse()
            .map_err(|_| Error::index(format!("invalid stored dimension '{}'", dimension)))?;

        Ok(Some(IndexMeta {
            dimension,
            provider,
            model,
        }))
    }

    /// Replace the stored embedder metadata
    pub fn set_meta(&self, meta: &IndexMeta) -> Result<()> {
        let conn = self.conn.lock();
        write_meta(&conn, meta)
    }

    /// Load all documents and entries. Embeddings must have `dimension`
    /// finite values.
    pub fn load(&self, dimension: usize) -> Result<LoadedIndex> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            "SELECT id, path, filename, file_type, content_hash, file_size, total_chunks,
                    chunk_size, chunk_overlap, ingested_at
             FROM documents ORDER BY path",
        )?;
        let documents = stmt
            .query_map([], |row| {
                Ok(RawDocument {
                    id: row.get(0)?,
                    path: row.get(1)?,
                    filename: row.get(2)?,
                    file_type: row.get(3)?,
                    content_hash: row.get(4)?,
                    file_size: row.get(5)?,
                    total_chunks: row.get(6)?,
                    chunk_size: row.get(7)?,
                    chunk_overlap: row.get(8)?,
                    ingested_at: row.get(9)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(RawDocument::decode)
            .collect::<Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(
            "SELECT e.seq, e.chunk_id, e.document_id, e.chunk_index, e.text,
                    e.byte_start, e.byte_end, e.token_start, e.token_end,
                    e.overlap_tokens, e.overlap_bytes, e.embedding,
                    d.path, d.filename, d.file_type
             FROM entries e JOIN documents d ON d.id = e.document_id
             ORDER BY e.seq",
        )?;
        let entries = stmt
            .query_map([], |row| {
                Ok(RawEntry {
                    seq: row.get(0)?,
                    chunk_id: row.get(1)?,
                    document_id: row.get(2)?,
                    chunk_index: row.get(3)?,
                    text: row.get(4)?,
                    offsets: [
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get(8)?,
                        row.get(9)?,
                        row.get(10)?,
                    ],
                    embedding: row.get(11)?,
                    path: row.get(12)?,
                    filename: row.get(13)?,
                    file_type: row.get(14)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(|raw| raw.decode(dimension))
            .collect::<Result<Vec<_>>>()?;

        Ok(LoadedIndex { documents, entries })
    }

    /// Apply a change set in one transaction. Returns the inserted entries
    /// with their assigned sequence numbers, in insertion order.
    pub fn apply(&self, changes: &IndexChangeSet) -> Result<Vec<IndexEntry>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut inserted = Vec::new();

        if changes.clear_all {
            tx.execute("DELETE FROM entries", [])?;
            tx.execute("DELETE FROM documents", [])?;
        }

        for id in &changes.delete_documents {
            delete_document_rows(&tx, id)?;
        }

        for new_doc in &changes.insert {
            let doc = &new_doc.document;
            tx.execute(
                "INSERT INTO documents (id, path, filename, file_type, content_hash, file_size,
                                        total_chunks, chunk_size, chunk_overlap, ingested_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    doc.id.to_string(),
                    doc.path,
                    doc.filename,
                    doc.file_type.as_str(),
                    doc.content_hash,
                    doc.file_size.min(i64::MAX as u64) as i64,
                    doc.total_chunks as i64,
                    to_i64(doc.chunk_size),
                    to_i64(doc.chunk_overlap),
                    doc.ingested_at.to_rfc3339(),
                ],
            )?;

            let metadata = EntryMetadata::for_document(doc);
            let mut stmt = tx.prepare_cached(
                "INSERT INTO entries (chunk_id, document_id, chunk_index, text, byte_start,
                                      byte_end, token_start, token_end, overlap_tokens,
                                      overlap_bytes, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;

            for (chunk, embedding) in &new_doc.chunks {
                stmt.execute(params![
                    chunk.id.to_string(),
                    chunk.document_id.to_string(),
                    chunk.chunk_index as i64,
                    chunk.text,
                    to_i64(chunk.byte_start),
                    to_i64(chunk.byte_end),
                    to_i64(chunk.token_start),
                    to_i64(chunk.token_end),
                    to_i64(chunk.overlap_tokens),
                    to_i64(chunk.overlap_bytes),
                    encode_embedding(embedding),
                ])?;

                inserted.push(IndexEntry {
                    seq: tx.last_insert_rowid(),
                    chunk: chunk.clone(),
                    embedding: embedding.clone(),
                    metadata: metadata.clone(),
                });
            }
        }

        if let Some(meta) = &changes.meta {
            write_meta(&tx, meta)?;
        }

        tx.commit()?;
        Ok(inserted)
    }

    /// Delete one document and its entries. Returns false if it was unknown.
    pub fn delete_document(&self, id: &Uuid) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let deleted = delete_document_rows(&tx, id)?;
        tx.commit()?;
        Ok(deleted)
    }

    /// Fold the WAL into the main database file
    pub fn checkpoint(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        Ok(())
    }

    /// On-disk size of the database and its WAL
    pub fn size_bytes(&self) -> u64 {
        let Some(path) = &self.path else {
            return 0;
        };
        let file_len = |p: &Path| std::fs::metadata(p).map(|m| m.len()).unwrap_or(0);
        let wal = PathBuf::from(format!("{}-wal", path.display()));
        file_len(path) + file_len(&wal)
    }
}

fn write_meta(conn: &Connection, meta: &IndexMeta) -> Result<()> {
    let mut stmt =
        conn.prepare_cached("INSERT OR REPLACE INTO index_meta (key, value) VALUES (?1, ?2)")?;
    stmt.execute(params!["dimension", meta.dimension.to_string()])?;
    stmt.execute(params!["provider", meta.provider])?;
    stmt.execute(params!["model", meta.model])?;
    Ok(())
}

fn delete_document_rows(conn: &Connection, id: &Uuid) -> Result<bool> {
    let id = id.to_string();
    conn.execute("DELETE FROM entries WHERE document_id = ?1", params![id])?;
    let deleted = conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_usize(value: i64, field: &str) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::index(format!("negative {} in index", field)))
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|_| Error::index(format!("invalid id '{}' in index", value)))
}

fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(std::mem::size_of_val(vector));
    for &value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn decode_embedding(blob: &[u8], dimension: usize) -> Result<Vec<f32>> {
    let expected_len = dimension * std::mem::size_of::<f32>();
    if blob.len() != expected_len {
        return Err(Error::index(format!(
            "invalid embedding byte length: expected {}, got {}",
            expected_len,
            blob.len()
        )));
    }

    let mut out = Vec::with_capacity(dimension);
    for chunk in blob.chunks_exact(4) {
        let value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        if !value.is_finite() {
            return Err(Error::index("embedding contains non-finite values"));
        }
        out.push(value);
    }
    Ok(out)
}

struct RawDocument {
    id: String,
    path: String,
    filename: String,
    file_type: String,
    content_hash: String,
    file_size: i64,
    total_chunks: i64,
    chunk_size: i64,
    chunk_overlap: i64,
    ingested_at: String,
}

impl RawDocument {
    fn decode(self) -> Result<Document> {
        Ok(Document {
            id: parse_uuid(&self.id)?,
            path: self.path,
            filename: self.filename,
            file_type: FileType::parse_name(&self.file_type),
            content_hash: self.content_hash,
            file_size: to_usize(self.file_size, "file_size")? as u64,
            total_chunks: to_usize(self.total_chunks, "total_chunks")? as u32,
            chunk_size: to_usize(self.chunk_size, "chunk_size")?,
            chunk_overlap: to_usize(self.chunk_overlap, "chunk_overlap")?,
            ingested_at: DateTime::parse_from_rfc3339(&self.ingested_at)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| Error::index(format!("invalid timestamp: {}", e)))?,
        })
    }
}

struct RawEntry {
    seq: i64,
    chunk_id: String,
    document_id: String,
    chunk_index: i64,
    text: String,
    /// byte_start, byte_end, token_start, token_end, overlap_tokens, overlap_bytes
    offsets: [i64; 6],
    embedding: Vec<u8>,
    path: String,
    filename: String,
    file_type: String,
}

impl RawEntry {
    fn decode(self, dimension: usize) -> Result<IndexEntry> {
        let [byte_start, byte_end, token_start, token_end, overlap_tokens, overlap_bytes] =
            self.offsets;

        Ok(IndexEntry {
            seq: self.seq,
            chunk: Chunk {
                id: parse_uuid(&self.chunk_id)?,
                document_id: parse_uuid(&self.document_id)?,
                chunk_index: to_usize(self.chunk_index, "chunk_index")? as u32,
                text: self.text,
                byte_start: to_usize(byte_start, "byte_start")?,
                byte_end: to_usize(byte_end, "byte_end")?,
                token_start: to_usize(token_start, "token_start")?,
                token_end: to_usize(token_end, "token_end")?,
                overlap_tokens: to_usize(overlap_tokens, "overlap_tokens")?,
                overlap_bytes: to_usize(overlap_bytes, "overlap_bytes")?,
            },
            embedding: decode_embedding(&self.embedding, dimension)?,
            metadata: EntryMetadata {
                path: self.path,
                filename: self.filename,
                file_type: FileType::parse_name(&self.file_type),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_document(path: &str, texts: &[&str]) -> NewDocument {
        let mut document = Document::new(path, FileType::Txt, "hash".into(), 42, 100, 10);
        document.total_chunks = texts.len() as u32;
        let chunks = texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let chunk = Chunk {
                    id: Uuid::new_v4(),
                    document_id: document.id,
                    chunk_index: i as u32,
                    text: text.to_string(),
                    byte_start: 0,
                    byte_end: text.len(),
                    token_start: 0,
                    token_end: 1,
                    overlap_tokens: 0,
                    overlap_bytes: 0,
                };
                (chunk, vec![i as f32, 1.0, -0.5])
            })
            .collect();
        NewDocument { document, chunks }
    }

    fn meta() -> IndexMeta {
        IndexMeta {
            dimension: 3,
            provider: "mock".into(),
            model: "test".into(),
        }
    }

    #[test]
    fn test_apply_and_load() {
        let db = IndexDb::in_memory().unwrap();
        assert!(db.meta().unwrap().is_none());

        let inserted = db
            .apply(&IndexChangeSet {
                insert: vec![new_document("a.txt", &["one", "two"]), new_document("b.txt", &["three"])],
                meta: Some(meta()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(inserted.len(), 3);
        assert!(inserted.windows(2).all(|w| w[0].seq < w[1].seq));
        assert_eq!(db.meta().unwrap(), Some(meta()));

        let loaded = db.load(3).unwrap();
        assert_eq!(loaded.documents.len(), 2);
        assert_eq!(loaded.entries, inserted);
        assert_eq!(loaded.entries[2].metadata.filename, "b.txt");
    }

    #[test]
    fn test_replace_document_keeps_sequence_increasing() {
        let db = IndexDb::in_memory().unwrap();
        let first = new_document("a.txt", &["old"]);
        let first_id = first.document.id;
        let before = db
            .apply(&IndexChangeSet {
                insert: vec![first],
                ..Default::default()
            })
            .unwrap();

        let after = db
            .apply(&IndexChangeSet {
                delete_documents: vec![first_id],
                insert: vec![new_document("a.txt", &["new"])],
                ..Default::default()
            })
            .unwrap();

        assert!(after[0].seq > before[0].seq);
        let loaded = db.load(3).unwrap();
        assert_eq!(loaded.entries.len(), 1);
        assert_eq!(loaded.entries[0].chunk.text, "new");
    }

    #[test]
    fn test_failed_transaction_leaves_index_unchanged() {
        let db = IndexDb::in_memory().unwrap();
        let doc = new_document("a.txt", &["kept"]);
        db.apply(&IndexChangeSet {
            insert: vec![doc.clone()],
            ..Default::default()
        })
        .unwrap();

        // Same path without deleting the old row violates the UNIQUE constraint
        let err = db.apply(&IndexChangeSet {
            insert: vec![new_document("b.txt", &["x"]), new_document("a.txt", &["dup"])],
            ..Default::default()
        });
        assert!(err.is_err());

        let loaded = db.load(3).unwrap();
        assert_eq!(loaded.documents.len(), 1);
        assert_eq!(loaded.entries[0].chunk.text, "kept");
    }

    #[test]
    fn test_delete_and_clear() {
        let db = IndexDb::in_memory().unwrap();
        let doc = new_document("a.txt", &["one"]);
        let id = doc.document.id;
        db.apply(&IndexChangeSet {
            insert: vec![doc, new_document("b.txt", &["two"])],
            ..Default::default()
        })
        .unwrap();

        assert!(db.delete_document(&id).unwrap());
        assert!(!db.delete_document(&id).unwrap());
        assert_eq!(db.load(3).unwrap().entries.len(), 1);

        db.apply(&IndexChangeSet {
            clear_all: true,
            ..Default::default()
        })
        .unwrap();
        let loaded = db.load(3).unwrap();
        assert!(loaded.documents.is_empty() && loaded.entries.is_empty());
    }

    #[test]
    fn test_wrong_dimension_is_index_error() {
        let db = IndexDb::in_memory().unwrap();
        db.apply(&IndexChangeSet {
            insert: vec![new_document("a.txt", &["one"])],
            ..Default::default()
        })
        .unwrap();
        assert!(matches!(db.load(4), Err(Error::Index(_))));
    }

    #[test]
    fn test_garbage_file_is_index_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.sqlite3");
        std::fs::write(&path, b"not an sqlite database ".repeat(512)).unwrap();
        assert!(matches!(IndexDb::open(&path), Err(Error::Index(_))));
    }

    #[test]
    fn test_reopen_and_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/index.sqlite3");
        {
            let db = IndexDb::open(&path).unwrap();
            db.apply(&IndexChangeSet {
                insert: vec![new_document("a.txt", &["persisted"])],
                meta: Some(meta()),
                ..Default::default()
            })
            .unwrap();
            db.checkpoint().unwrap();
            assert!(db.size_bytes() > 0);
        }

        let db = IndexDb::open(&path).unwrap();
        assert_eq!(db.meta().unwrap(), Some(meta()));
        assert_eq!(db.load(3).unwrap().entries[0].chunk.text, "persisted");
    }

    #[test]
    fn test_embedding_blob_validation() {
        let blob = encode_embedding(&[1.0, -2.5]);
        assert_eq!(decode_embedding(&blob, 2).unwrap(), vec![1.0, -2.5]);
        assert!(decode_embedding(&blob[..7], 2).is_err());
        assert!(decode_embedding(&encode_embedding(&[f32::NAN]), 1).is_err());
    }
}
