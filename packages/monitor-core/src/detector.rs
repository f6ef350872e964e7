use anyhow::{Context, Result};
use chrono::Utc;

use crate::magnitude::change_magnitude;
use crate::relevance::{changed_keywords, extract_keywords, relevance_score};
use crate::traits::{BaselineStore, ChangeStore};
use crate::types::{Baseline, Change, ChangeId, FetchedPage, PageIntelligence, WorklistEntry};

/// Outcome of running change detection for a single fetch
#[derive(Debug, Clone)]
pub enum ChangeDecision {
    /// First observation of this URL; a baseline was created
    BaselineCreated,
    /// Content hash matches the stored baseline
    NoChange,
    /// Content differs; a change record was emitted and the baseline updated
    ChangeDetected(Change),
}

/// Compare freshly fetched content against the stored baseline for its URL.
///
/// Exactly one of baseline-created, no-change, or change-emitted happens per
/// call, and the baseline always reflects the latest fetch afterwards. The
/// first sight of a URL never emits a change record.
pub async fn detect_change(
    entry: &WorklistEntry,
    page: &FetchedPage,
    baselines: &dyn BaselineStore,
    changes: &dyn ChangeStore,
) -> Result<ChangeDecision> {
    let existing = baselines
        .get_by_url(&entry.url)
        .await
        .context("Failed to look up baseline")?;

    let Some(baseline) = existing else {
        let baseline = build_baseline(entry, page);
        baselines
            .upsert(&baseline)
            .await
            .context("Failed to store new baseline")?;
        tracing::info!(
            url = %entry.url,
            company = %entry.company,
            content_hash = %page.content_hash,
            "baseline created"
        );
        return Ok(ChangeDecision::BaselineCreated);
    };

    if baseline.content_hash == page.content_hash {
        tracing::debug!(url = %entry.url, "content unchanged");
        return Ok(ChangeDecision::NoChange);
    }

    let previous_content = baseline.extracted_content.as_str();
    let length_before = previous_content.len();
    let length_after = page.content.len();
    let character_diff = length_after.abs_diff(length_before);

    let percentage_change = if length_before > 0 {
        ((character_diff as f64 / length_before as f64) * 100.0).round() as u32
    } else {
        100
    };

    let report = change_magnitude(previous_content, &page.content);

    let change = Change {
        id: ChangeId::new(),
        url: entry.url.clone(),
        company: entry.company.clone(),
        timestamp: Utc::now(),
        old_hash: baseline.content_hash.clone(),
        new_hash: page.content_hash.clone(),
        content_length_before: length_before,
        content_length_after: length_after,
        percentage_change,
        magnitude: report.magnitude,
        relevance_score: relevance_score(previous_content, &page.content, &entry.url),
        keywords: changed_keywords(previous_content, &page.content),
        title: page.title.clone(),
        summary: format!("Content changed by {character_diff} characters"),
    };

    changes
        .append(&change)
        .await
        .context("Failed to store change record")?;

    let updated = build_baseline(entry, page);
    baselines
        .upsert(&updated)
        .await
        .context("Failed to update baseline")?;

    tracing::info!(
        url = %entry.url,
        company = %entry.company,
        percentage_change,
        magnitude = %report.magnitude.as_str(),
        "change detected"
    );

    Ok(ChangeDecision::ChangeDetected(change))
}

fn build_baseline(entry: &WorklistEntry, page: &FetchedPage) -> Baseline {
    Baseline {
        url: entry.url.clone(),
        company: entry.company.clone(),
        kind: entry.kind.clone(),
        content_hash: page.content_hash.clone(),
        extracted_content: page.content.clone(),
        content_length: page.content_length,
        title: page.title.clone(),
        intelligence: PageIntelligence {
            relevance_score: relevance_score("", &page.content, &entry.url),
            keywords: extract_keywords(&page.content),
        },
        timestamp: Utc::now(),
    }
}
