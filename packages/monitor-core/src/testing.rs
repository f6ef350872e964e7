//! Test doubles for the runner's collaborators.
//!
//! Used by the crate's own tests and available to downstream crates that want
//! to exercise the batch protocol without network or database access.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

pub use crate::storage::memory::InMemoryStore;

use crate::traits::{ContentFetcher, Scheduler};
use crate::types::{FetchOutcome, FetchedPage};

/// Fetcher that replays scripted outcomes per URL.
///
/// The latest scripted outcome for a URL wins and stays in effect until
/// rescripted. Unscripted URLs fail loudly.
#[derive(Default)]
pub struct ScriptedFetcher {
    outcomes: Mutex<HashMap<String, FetchOutcome>>,
    fetch_counts: Mutex<HashMap<String, usize>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful fetch returning `content`
    pub fn ok(&self, url: &str, content: &str) {
        self.outcomes.lock().unwrap().insert(
            url.to_string(),
            FetchOutcome::Fetched(FetchedPage::from_content(
                url.to_string(),
                content.to_string(),
                None,
            )),
        );
    }

    /// Script a failed fetch with the given error message
    pub fn fail(&self, url: &str, error: &str) {
        self.outcomes.lock().unwrap().insert(
            url.to_string(),
            FetchOutcome::Failed {
                error: error.to_string(),
            },
        );
    }

    /// How many times a URL has been fetched
    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetch_counts
            .lock()
            .unwrap()
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    /// Total fetches across all URLs
    pub fn total_fetches(&self) -> usize {
        self.fetch_counts.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl ContentFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> FetchOutcome {
        *self
            .fetch_counts
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default() += 1;

        self.outcomes
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| FetchOutcome::Failed {
                error: format!("no scripted outcome for {url}"),
            })
    }
}

/// Scheduler that records continuation requests instead of firing them
#[derive(Default)]
pub struct RecordingScheduler {
    scheduled: Mutex<Vec<String>>,
    cancelled: AtomicUsize,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scheduled_job_ids(&self) -> Vec<String> {
        self.scheduled.lock().unwrap().clone()
    }

    pub fn scheduled_count(&self) -> usize {
        self.scheduled.lock().unwrap().len()
    }

    pub fn cancel_count(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Scheduler for RecordingScheduler {
    async fn schedule_continuation(&self, job_id: &str) -> Result<()> {
        self.scheduled.lock().unwrap().push(job_id.to_string());
        Ok(())
    }

    async fn cancel_pending(&self) -> Result<()> {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
