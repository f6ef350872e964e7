use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::magnitude::ChangeMagnitude;

/// Unique identifier for a change record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeId(pub Uuid);

impl ChangeId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ChangeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Calculate a hex-encoded SHA-256 fingerprint of page content
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Lifecycle status of a batch job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    InProgress,
    PausedError,
    Completed,
    Error,
}

/// Worklist construction mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
    /// Process every configured URL
    All,
    /// Only URLs that do not yet have a baseline
    New,
}

/// A single entry in a job's worklist, fixed at job creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorklistEntry {
    pub company: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// A per-URL failure recorded against a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    pub url: String,
    pub company: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// The persisted state of one batch scan across a worklist of URLs.
///
/// This document is the only state that survives between runner invocations,
/// so its field set is the stable contract any `JobStore` backend must keep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub mode: JobMode,
    pub urls: Vec<WorklistEntry>,
    pub processed_urls: usize,
    pub successful_urls: usize,
    pub failed_urls: usize,
    pub current_batch: usize,
    pub consecutive_errors: usize,
    pub errors: Vec<JobError>,
    pub start_time: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_critical_error: Option<String>,
}

impl Job {
    pub fn new(mode: JobMode, urls: Vec<WorklistEntry>) -> Self {
        let now = Utc::now();
        Self {
            id: format!("baseline_{}", now.format("%Y%m%dT%H%M%S%3fZ")),
            status: JobStatus::InProgress,
            mode,
            urls,
            processed_urls: 0,
            successful_urls: 0,
            failed_urls: 0,
            current_batch: 0,
            consecutive_errors: 0,
            errors: Vec::new(),
            start_time: now,
            last_update: now,
            last_critical_error: None,
        }
    }

    pub fn total(&self) -> usize {
        self.urls.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.processed_urls >= self.urls.len()
    }

    pub fn percent_complete(&self) -> u8 {
        if self.urls.is_empty() {
            return 100;
        }
        ((self.processed_urls as f64 / self.urls.len() as f64) * 100.0).round() as u8
    }

    /// The `n` most recent error entries, oldest first
    pub fn recent_errors(&self, n: usize) -> Vec<JobError> {
        let start = self.errors.len().saturating_sub(n);
        self.errors[start..].to_vec()
    }
}

/// Derived metadata attached to a baseline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageIntelligence {
    pub relevance_score: u8,
    pub keywords: Vec<String>,
}

/// The last known content state of a single monitored URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Baseline {
    pub url: String,
    pub company: String,
    pub kind: String,
    pub content_hash: String,
    pub extracted_content: String,
    pub content_length: usize,
    pub title: Option<String>,
    pub intelligence: PageIntelligence,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate statistics over stored baselines
#[derive(Debug, Clone, Copy, Default)]
pub struct BaselineStats {
    pub total: i64,
    pub companies: i64,
    pub avg_content_length: i64,
}

/// An immutable record of a detected content difference between two fetches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub id: ChangeId,
    pub url: String,
    pub company: String,
    pub timestamp: DateTime<Utc>,
    pub old_hash: String,
    pub new_hash: String,
    pub content_length_before: usize,
    pub content_length_after: usize,
    pub percentage_change: u32,
    pub magnitude: ChangeMagnitude,
    pub relevance_score: u8,
    pub keywords: Vec<String>,
    pub title: Option<String>,
    pub summary: String,
}

/// Successfully fetched page content
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub content: String,
    pub content_hash: String,
    pub title: Option<String>,
    pub content_length: usize,
}

impl FetchedPage {
    pub fn from_content(url: String, content: String, title: Option<String>) -> Self {
        let content_hash = content_hash(&content);
        let content_length = content.len();
        Self {
            url,
            content,
            content_hash,
            title,
            content_length,
        }
    }
}

/// Outcome of a single fetch attempt.
///
/// Ordinary failure modes (timeouts, non-2xx, network errors) come back as
/// `Failed` rather than an `Err`, so the runner can record them per-URL
/// without aborting the batch.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Fetched(FetchedPage),
    Failed { error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_hex_sha256() {
        let hash = content_hash("hello world");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, content_hash("hello world"));
        assert_ne!(hash, content_hash("hello world!"));
    }

    #[test]
    fn test_job_percent_complete() {
        let entries = vec![
            WorklistEntry {
                company: "Acme".into(),
                url: "https://acme.test/pricing".into(),
                kind: "pricing".into(),
            },
            WorklistEntry {
                company: "Acme".into(),
                url: "https://acme.test/blog".into(),
                kind: "blog".into(),
            },
        ];
        let mut job = Job::new(JobMode::All, entries);
        assert_eq!(job.percent_complete(), 0);
        job.processed_urls = 1;
        assert_eq!(job.percent_complete(), 50);
        job.processed_urls = 2;
        assert_eq!(job.percent_complete(), 100);
        assert!(job.is_exhausted());
    }

    #[test]
    fn test_job_recent_errors_keeps_tail() {
        let mut job = Job::new(JobMode::All, Vec::new());
        for i in 0..7 {
            job.errors.push(JobError {
                url: format!("https://example.test/{i}"),
                company: "Example".into(),
                error: "HTTP 500".into(),
                timestamp: Utc::now(),
            });
        }
        let recent = job.recent_errors(5);
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].url, "https://example.test/2");
        assert_eq!(recent[4].url, "https://example.test/6");
    }

    #[test]
    fn test_fetched_page_computes_hash_and_length() {
        let page = FetchedPage::from_content(
            "https://acme.test".into(),
            "Plans start at $29/month".into(),
            Some("Acme Pricing".into()),
        );
        assert_eq!(page.content_length, 24);
        assert_eq!(page.content_hash, content_hash("Plans start at $29/month"));
    }
}
