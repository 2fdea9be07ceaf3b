//! Immutable in-memory index snapshots and brute-force k-NN

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::storage::IndexMeta;
use crate::types::{Document, DocumentRef, IndexEntry, SearchHit};

use super::similarity::SimilarityMetric;

/// A read-consistent view of the whole index. Searches run against one
/// snapshot; writers publish a new snapshot instead of mutating this one.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    meta: IndexMeta,
    /// Documents keyed by source path
    documents: HashMap<String, Document>,
    /// Entries in ascending sequence order
    entries: Vec<Arc<IndexEntry>>,
}

impl IndexSnapshot {
    /// Build a snapshot from loaded documents and entries
    pub fn new(meta: IndexMeta, documents: Vec<Document>, mut entries: Vec<IndexEntry>) -> Self {
        entries.sort_by_key(|e| e.seq);
        Self {
            meta,
            documents: documents.into_iter().map(|d| (d.path.clone(), d)).collect(),
            entries: entries.into_iter().map(Arc::new).collect(),
        }
    }

    /// An index with no documents
    pub fn empty(meta: IndexMeta) -> Self {
        Self::new(meta, Vec::new(), Vec::new())
    }

    /// Embedder metadata the index was built with
    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    /// Document currently indexed under `path`
    pub fn document_by_path(&self, path: &str) -> Option<&Document> {
        self.documents.get(path)
    }

    /// Document by ID
    pub fn document(&self, id: &Uuid) -> Option<&Document> {
        self.documents.values().find(|d| d.id == *id)
    }

    /// All documents, sorted by path
    pub fn documents(&self) -> Vec<&Document> {
        let mut docs: Vec<_> = self.documents.values().collect();
        docs.sort_by(|a, b| a.path.cmp(&b.path));
        docs
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A new snapshot with the given documents removed (or everything, with
    /// `clear_all`) and the new documents and entries added. New entries
    /// must carry higher sequence numbers than existing ones.
    pub fn with_changes(
        &self,
        clear_all: bool,
        removed: &HashSet<Uuid>,
        added_documents: Vec<Document>,
        added_entries: Vec<IndexEntry>,
        meta: Option<IndexMeta>,
    ) -> Self {
        let (mut documents, mut entries): (HashMap<String, Document>, Vec<Arc<IndexEntry>>) =
            if clear_all {
                (HashMap::new(), Vec::new())
            } else {
                let documents = self
                    .documents
                    .iter()
                    .filter(|(_, d)| !removed.contains(&d.id))
                    .map(|(p, d)| (p.clone(), d.clone()))
                    .collect();
                let entries = self
                    .entries
                    .iter()
                    .filter(|e| !removed.contains(&e.chunk.document_id))
                    .cloned()
                    .collect::<Vec<_>>();
                (documents, entries)
            };

        documents.extend(added_documents.into_iter().map(|d| (d.path.clone(), d)));
        entries.extend(added_entries.into_iter().map(Arc::new));

        Self {
            meta: meta.unwrap_or_else(|| self.meta.clone()),
            documents,
            entries,
        }
    }

    /// Top `k` entries by similarity to `query` with similarity at least
    /// `min_similarity`. Ties go to the entry inserted first.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        min_similarity: f32,
        metric: SimilarityMetric,
    ) -> Vec<SearchHit> {
        if k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|e| (metric.score(query, &e.embedding), e.as_ref()))
            .filter(|(s, _)| *s >= min_similarity)
            .collect();

        let rank_order = |a: &(f32, &IndexEntry), b: &(f32, &IndexEntry)| -> Ordering {
            b.0.total_cmp(&a.0).then_with(|| a.1.seq.cmp(&b.1.seq))
        };

        if scored.len() > k {
            scored.select_nth_unstable_by(k - 1, rank_order);
            scored.truncate(k);
        }
        scored.sort_by(rank_order);

        scored
            .into_iter()
            .enumerate()
            .map(|(i, (similarity, entry))| SearchHit {
                rank: i + 1,
                similarity,
                chunk: entry.chunk.clone(),
                document: DocumentRef::from_entry(&entry.chunk, &entry.metadata),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Chunk, EntryMetadata, FileType};
    use proptest::prelude::*;

    fn meta(dimension: usize) -> IndexMeta {
        IndexMeta {
            dimension,
            provider: "mock".into(),
            model: "test".into(),
        }
    }

    fn entry(seq: i64, document: &Document, embedding: Vec<f32>) -> IndexEntry {
        IndexEntry {
            seq,
            chunk: Chunk {
                id: Uuid::new_v4(),
                document_id: document.id,
                chunk_index: seq as u32,
                text: format!("chunk {}", seq),
                byte_start: 0,
                byte_end: 7,
                token_start: 0,
                token_end: 3,
                overlap_tokens: 0,
                overlap_bytes: 0,
            },
            embedding,
            metadata: EntryMetadata::for_document(document),
        }
    }

    fn document(path: &str) -> Document {
        Document::new(path, FileType::Txt, "h".into(), 1, 10, 2)
    }

    #[test]
    fn test_ranked_by_similarity() {
        let doc = document("a.txt");
        let snapshot = IndexSnapshot::new(
            meta(2),
            vec![doc.clone()],
            vec![
                entry(1, &doc, vec![0.0, 1.0]),
                entry(2, &doc, vec![1.0, 0.0]),
                entry(3, &doc, vec![1.0, 1.0]),
            ],
        );

        let hits = snapshot.search(&[1.0, 0.0], 2, 0.0, SimilarityMetric::Cosine);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.text, "chunk 2");
        assert_eq!(hits[1].chunk.text, "chunk 3");
        assert_eq!(hits[0].rank, 1);
        assert_eq!(hits[0].document.filename, "a.txt");
    }

    #[test]
    fn test_ties_go_to_earlier_insertion() {
        let doc = document("a.txt");
        let snapshot = IndexSnapshot::new(
            meta(2),
            vec![doc.clone()],
            vec![
                entry(9, &doc, vec![1.0, 0.0]),
                entry(4, &doc, vec![1.0, 0.0]),
                entry(6, &doc, vec![1.0, 0.0]),
            ],
        );

        let hits = snapshot.search(&[1.0, 0.0], 3, 0.0, SimilarityMetric::Cosine);
        let texts: Vec<_> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["chunk 4", "chunk 6", "chunk 9"]);

        let hits = snapshot.search(&[1.0, 0.0], 1, 0.0, SimilarityMetric::Cosine);
        assert_eq!(hits[0].chunk.text, "chunk 4");
    }

    #[test]
    fn test_threshold_and_k_zero() {
        let doc = document("a.txt");
        let snapshot = IndexSnapshot::new(
            meta(2),
            vec![doc.clone()],
            vec![entry(1, &doc, vec![0.0, 1.0]), entry(2, &doc, vec![1.0, 0.0])],
        );

        assert!(snapshot.search(&[1.0, 0.0], 0, 0.0, SimilarityMetric::Cosine).is_empty());
        assert_eq!(snapshot.search(&[1.0, 0.0], 5, 0.5, SimilarityMetric::Cosine).len(), 1);
        // Zero query vector scores 0.0 against everything
        assert_eq!(snapshot.search(&[0.0, 0.0], 5, 0.0, SimilarityMetric::Cosine).len(), 2);
    }

    #[test]
    fn test_with_changes_replaces_document() {
        let old = document("a.txt");
        let other = document("b.txt");
        let snapshot = IndexSnapshot::new(
            meta(2),
            vec![old.clone(), other.clone()],
            vec![entry(1, &old, vec![1.0, 0.0]), entry(2, &other, vec![0.0, 1.0])],
        );

        let new = document("a.txt");
        let removed: HashSet<Uuid> = [old.id].into_iter().collect();
        let next = snapshot.with_changes(
            false,
            &removed,
            vec![new.clone()],
            vec![entry(3, &new, vec![1.0, 1.0])],
            None,
        );

        assert_eq!(next.document_count(), 2);
        assert_eq!(next.entry_count(), 2);
        assert_eq!(next.document_by_path("a.txt").unwrap().id, new.id);
        // The original snapshot is untouched
        assert_eq!(snapshot.document_by_path("a.txt").unwrap().id, old.id);

        let cleared = next.with_changes(true, &HashSet::new(), Vec::new(), Vec::new(), None);
        assert!(cleared.is_empty());
        assert_eq!(cleared.document_count(), 0);
    }

    proptest! {
        #[test]
        fn prop_search_sorted_and_bounded(
            vectors in prop::collection::vec(prop::collection::vec(-1.0f32..1.0, 3), 0..40),
            query in prop::collection::vec(-1.0f32..1.0, 3),
            k in 1usize..10,
        ) {
            let doc = document("p.txt");
            let entries = vectors
                .into_iter()
                .enumerate()
                .map(|(i, v)| entry(i as i64 + 1, &doc, v))
                .collect();
            let snapshot = IndexSnapshot::new(meta(3), vec![doc], entries);

            let hits = snapshot.search(&query, k, 0.0, SimilarityMetric::Cosine);
            prop_assert!(hits.len() <= k);
            for pair in hits.windows(2) {
                prop_assert!(pair[0].similarity >= pair[1].similarity);
            }

            let stricter = snapshot.search(&query, k, 0.5, SimilarityMetric::Cosine);
            prop_assert!(stricter.len() <= hits.len());
        }
    }
}
