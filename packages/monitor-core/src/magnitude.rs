//! Change magnitude scoring: how much content changed, not just whether.
//!
//! Combines a character-level size delta with a word-set similarity measure,
//! then buckets the result into alert-worthy categories.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Percentage thresholds for magnitude categories
const MODERATE_THRESHOLD: f64 = 15.0;
const SIGNIFICANT_THRESHOLD: f64 = 25.0;
const MAJOR_THRESHOLD: f64 = 50.0;

/// Minimum character delta before a change is worth alerting on
const MIN_CHARACTER_CHANGE: usize = 50;

/// Categorical size of a detected change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeMagnitude {
    Minor,
    Moderate,
    Significant,
    Major,
    NewContent,
}

impl ChangeMagnitude {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minor => "minor",
            Self::Moderate => "moderate",
            Self::Significant => "significant",
            Self::Major => "major",
            Self::NewContent => "new_content",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "moderate" => Self::Moderate,
            "significant" => Self::Significant,
            "major" => Self::Major,
            "new_content" => Self::NewContent,
            _ => Self::Minor,
        }
    }
}

/// Full magnitude breakdown for a content change
#[derive(Debug, Clone)]
pub struct MagnitudeReport {
    /// Effective change percentage, rounded to one decimal place
    pub percentage_change: f64,
    pub character_diff: usize,
    pub added_chars: usize,
    pub removed_chars: usize,
    pub old_length: usize,
    pub new_length: usize,
    pub magnitude: ChangeMagnitude,
    pub should_alert: bool,
}

/// Score the magnitude of a change between two content versions.
///
/// The effective change averages two signals: the character-count delta as a
/// share of the larger version, and the inverse Jaccard similarity of the two
/// word sets. Size-only edits and rewording-only edits both register.
pub fn change_magnitude(old_content: &str, new_content: &str) -> MagnitudeReport {
    if old_content.is_empty() || new_content.is_empty() {
        return MagnitudeReport {
            percentage_change: 100.0,
            character_diff: new_content.len(),
            added_chars: new_content.len(),
            removed_chars: old_content.len(),
            old_length: old_content.len(),
            new_length: new_content.len(),
            magnitude: ChangeMagnitude::NewContent,
            should_alert: false,
        };
    }

    let old_length = old_content.len();
    let new_length = new_content.len();
    let character_diff = new_length.abs_diff(old_length);
    let max_length = old_length.max(new_length);
    let size_change = (character_diff as f64 / max_length as f64) * 100.0;

    let similarity = word_similarity(old_content, new_content);
    let semantic_change = (1.0 - similarity) * 100.0;

    let effective_change = (size_change + semantic_change) / 2.0;

    let magnitude = if effective_change >= MAJOR_THRESHOLD {
        ChangeMagnitude::Major
    } else if effective_change >= SIGNIFICANT_THRESHOLD {
        ChangeMagnitude::Significant
    } else if effective_change >= MODERATE_THRESHOLD {
        ChangeMagnitude::Moderate
    } else {
        ChangeMagnitude::Minor
    };

    MagnitudeReport {
        percentage_change: (effective_change * 10.0).round() / 10.0,
        character_diff,
        added_chars: new_length.saturating_sub(old_length),
        removed_chars: old_length.saturating_sub(new_length),
        old_length,
        new_length,
        magnitude,
        should_alert: effective_change >= SIGNIFICANT_THRESHOLD
            && character_diff >= MIN_CHARACTER_CHANGE,
    }
}

/// Jaccard similarity of the lowercased word sets of two documents (0..=1)
fn word_similarity(a: &str, b: &str) -> f64 {
    let words_a: HashSet<String> = a.split_whitespace().map(str::to_lowercase).collect();
    let words_b: HashSet<String> = b.split_whitespace().map(str::to_lowercase).collect();

    let union = words_a.union(&words_b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = words_a.intersection(&words_b).count();
    intersection as f64 / union as f64
}
