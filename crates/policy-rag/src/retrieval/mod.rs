//! Retrieval: similarity metrics, in-memory index snapshots, context
//! assembly and the engine tying them to storage and embeddings

mod context;
mod engine;
mod index;
mod similarity;

pub use context::{assemble_context, AssembledContext, NO_RESULTS_CONTEXT, SECTION_SEPARATOR};
pub use engine::RetrievalEngine;
pub use index::IndexSnapshot;
pub use similarity::{cosine_similarity, dot_product, SimilarityMetric};
