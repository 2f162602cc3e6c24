//! Citation deduplication.

use std::collections::HashMap;

use super::types::Citation;

/// Merge citations by `uri`.
///
/// Each uri keeps the position of its first occurrence and the fields of its
/// last occurrence. Idempotent: `dedupe(&dedupe(s)) == dedupe(s)`.
pub fn dedupe(citations: &[Citation]) -> Vec<Citation> {
    let mut positions: HashMap<&str, usize> = HashMap::with_capacity(citations.len());
    let mut merged: Vec<Citation> = Vec::with_capacity(citations.len());

    for citation in citations {
        match positions.get(citation.uri.as_str()) {
            Some(&index) => merged[index] = citation.clone(),
            None => {
                positions.insert(citation.uri.as_str(), merged.len());
                merged.push(citation.clone());
            }
        }
    }

    merged
}
