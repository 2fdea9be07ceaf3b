//! Context assembly for downstream prompting

use crate::types::{ContextSource, SearchHit};

/// Returned when retrieval finds nothing
pub const NO_RESULTS_CONTEXT: &str = "No relevant documents found.";

/// Placed between consecutive sections
pub const SECTION_SEPARATOR: &str = "\n\n---\n\n";

/// Concatenated context and the chunks it was built from
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    pub context: String,
    pub sources: Vec<ContextSource>,
    /// A section was cut short or dropped to stay within the budget
    pub truncated: bool,
}

fn render_section(hit: &SearchHit) -> String {
    format!(
        "[{}] {} (similarity {:.3})\n{}",
        hit.rank, hit.document.filename, hit.similarity, hit.chunk.text
    )
}

fn source_for(hit: &SearchHit) -> ContextSource {
    ContextSource {
        rank: hit.rank,
        chunk_id: hit.chunk.id,
        document_id: hit.document.id,
        filename: hit.document.filename.clone(),
        similarity: hit.similarity,
    }
}

/// Join hits, in order, into one string of at most `max_chars` characters.
/// The first section that does not fit is cut at a character boundary and
/// everything after it is dropped.
pub fn assemble_context(hits: &[SearchHit], max_chars: usize) -> AssembledContext {
    if hits.is_empty() {
        return AssembledContext {
            context: NO_RESULTS_CONTEXT.to_string(),
            sources: Vec::new(),
            truncated: false,
        };
    }

    let separator_chars = SECTION_SEPARATOR.chars().count();
    let mut context = String::new();
    let mut used = 0usize;
    let mut sources = Vec::new();
    let mut truncated = false;

    for (i, hit) in hits.iter().enumerate() {
        let section = render_section(hit);
        let section_chars = section.chars().count();
        let prefix_chars = if i == 0 { 0 } else { separator_chars };

        if used + prefix_chars + section_chars <= max_chars {
            if i > 0 {
                context.push_str(SECTION_SEPARATOR);
            }
            context.push_str(&section);
            used += prefix_chars + section_chars;
            sources.push(source_for(hit));
            continue;
        }

        truncated = true;
        let room = max_chars.saturating_sub(used + prefix_chars);
        if room > 0 {
            if i > 0 {
                context.push_str(SECTION_SEPARATOR);
            }
            context.extend(section.chars().take(room));
            sources.push(source_for(hit));
        }
        break;
    }

    AssembledContext {
        context,
        sources,
        truncated,
    }
}
