//! Keyword and relevance heuristics for changed content.
//!
//! Cheap lexical signals only; no model calls. Downstream consumers can layer
//! richer analysis on top of the stored change records.

use std::collections::{HashMap, HashSet};

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "is", "are", "was", "were",
];

/// Extract the top recurring keywords from a document.
///
/// Words are lowercased, stripped to alphanumerics, and filtered by length
/// and a stop-word list; the ten most frequent survive.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut freq: HashMap<String, (usize, usize)> = HashMap::new();
    let mut order = 0usize;

    for raw in text.to_lowercase().split_whitespace() {
        let word: String = raw.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
        if word.len() > 3 && !STOP_WORDS.contains(&word.as_str()) {
            let entry = freq.entry(word).or_insert_with(|| {
                order += 1;
                (0, order)
            });
            entry.0 += 1;
        }
    }

    let mut ranked: Vec<(String, (usize, usize))> = freq.into_iter().collect();
    // Frequency first, then first occurrence for a stable order
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
    ranked.into_iter().take(10).map(|(word, _)| word).collect()
}

/// Score how interesting a content change is on a 1-10 scale.
///
/// Pricing pages that mention prices and product pages that mention launches
/// score higher, as do large size deltas.
pub fn relevance_score(old_content: &str, new_content: &str, url: &str) -> u8 {
    let mut score: u8 = 5;
    let new_lower = new_content.to_lowercase();

    if url.contains("pricing") && (new_content.contains('$') || new_lower.contains("price")) {
        score += 3;
    }

    if (url.contains("product") || url.contains("features"))
        && (new_lower.contains("new") || new_lower.contains("launch"))
    {
        score += 2;
    }

    let length_change = new_content.len().abs_diff(old_content.len());
    if length_change > 1000 {
        score += 2;
    }
    if length_change > 5000 {
        score += 1;
    }

    score.min(10)
}

/// Keywords that appeared or disappeared between two content versions.
///
/// Removed keywords are prefixed with `-`.
pub fn changed_keywords(old_content: &str, new_content: &str) -> Vec<String> {
    let old_keywords = extract_keywords(old_content);
    let new_keywords = extract_keywords(new_content);
    let old_set: HashSet<&String> = old_keywords.iter().collect();
    let new_set: HashSet<&String> = new_keywords.iter().collect();

    let added = new_keywords
        .iter()
        .filter(|k| !old_set.contains(*k))
        .take(5)
        .cloned();
    let removed = old_keywords
        .iter()
        .filter(|k| !new_set.contains(*k))
        .take(5)
        .map(|k| format!("-{k}"));

    added.chain(removed).collect()
}
