//! Batch job runner: checkpointed scans over a URL worklist.
//!
//! The runner drives a long scan to completion on a host that only grants
//! short execution windows. All progress lives in the persisted job document;
//! the runner itself keeps no state between invocations.
//!
//! ```text
//! BatchJobRunner::run_next_batch
//!     │
//!     ├─► JobStore: load or create the job document
//!     ├─► For each URL in the batch window (sequential):
//!     │       ContentFetcher → ChangeDetector → BaselineStore/ChangeStore
//!     ├─► JobStore: persist updated progress
//!     └─► Scheduler: request continuation, or report completed/paused
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::MonitorConfig;
use crate::detector::{detect_change, ChangeDecision};
use crate::traits::{BaselineStore, ChangeStore, ContentFetcher, JobStore, Scheduler};
use crate::types::{FetchOutcome, Job, JobError, JobMode, JobStatus};

/// Tuning for the batch runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// URLs attempted per invocation
    pub batch_size: usize,
    /// Back-to-back failures before the job pauses
    pub max_consecutive_errors: usize,
    /// Per-URL fetch timeout
    pub fetch_timeout: Duration,
    /// Courtesy delay after a successful fetch
    pub success_delay: Duration,
    /// Longer delay after a failed fetch
    pub failure_delay: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            batch_size: 3,
            max_consecutive_errors: 3,
            fetch_timeout: Duration::from_secs(20),
            success_delay: Duration::from_secs(1),
            failure_delay: Duration::from_secs(2),
        }
    }
}

/// Why a resume request was rejected.
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    #[error("no job to resume")]
    NoJob,
    #[error("job is not paused (status: {0:?})")]
    NotPaused(JobStatus),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Status summary returned from every runner entry point.
///
/// `in_progress` means "call me again", not an error.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub status: JobStatus,
    pub message: String,
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub total: usize,
    pub percent_complete: u8,
    pub estimated_minutes_remaining: Option<i64>,
    pub last_error: Option<String>,
    pub recent_errors: Vec<JobError>,
}

/// Drives one batch of the scan per invocation.
pub struct BatchJobRunner {
    fetcher: Arc<dyn ContentFetcher>,
    jobs: Arc<dyn JobStore>,
    baselines: Arc<dyn BaselineStore>,
    changes: Arc<dyn ChangeStore>,
    scheduler: Arc<dyn Scheduler>,
    monitors: MonitorConfig,
    config: RunnerConfig,
}

impl BatchJobRunner {
    pub fn new(
        fetcher: Arc<dyn ContentFetcher>,
        jobs: Arc<dyn JobStore>,
        baselines: Arc<dyn BaselineStore>,
        changes: Arc<dyn ChangeStore>,
        scheduler: Arc<dyn Scheduler>,
        monitors: MonitorConfig,
    ) -> Self {
        Self::with_config(
            fetcher,
            jobs,
            baselines,
            changes,
            scheduler,
            monitors,
            RunnerConfig::default(),
        )
    }

    pub fn with_config(
        fetcher: Arc<dyn ContentFetcher>,
        jobs: Arc<dyn JobStore>,
        baselines: Arc<dyn BaselineStore>,
        changes: Arc<dyn ChangeStore>,
        scheduler: Arc<dyn Scheduler>,
        monitors: MonitorConfig,
        config: RunnerConfig,
    ) -> Self {
        Self {
            fetcher,
            jobs,
            baselines,
            changes,
            scheduler,
            monitors,
            config,
        }
    }

    /// Run the next batch of the active job, creating one if needed.
    ///
    /// Safe to call repeatedly: with a job already active, `mode` and
    /// `clear_existing` are ignored and the existing job continues. Never
    /// returns an `Err`; fatal conditions come back as an `error` summary
    /// with the job document left behind for inspection.
    pub async fn run_next_batch(&self, mode: JobMode, clear_existing: bool) -> RunSummary {
        match self.try_run_next_batch(mode, clear_existing).await {
            Ok(summary) => summary,
            Err(e) => self.record_fatal(e).await,
        }
    }

    async fn try_run_next_batch(
        &self,
        mode: JobMode,
        clear_existing: bool,
    ) -> Result<RunSummary> {
        let existing = self.jobs.get().await.context("Failed to load job document")?;

        // A completed job is cleared when the next run is requested.
        let existing = match existing {
            Some(job) if job.status == JobStatus::Completed => {
                self.jobs
                    .delete()
                    .await
                    .context("Failed to clear completed job")?;
                None
            }
            other => other,
        };

        // Paused and errored jobs only move through resume_job / cancel_job.
        if let Some(job) = &existing {
            match job.status {
                JobStatus::PausedError => return Ok(still_paused_summary(job)),
                JobStatus::Error => return Ok(still_errored_summary(job)),
                _ => {}
            }
        }

        let mut job = match existing {
            Some(job) => job,
            None => match self.create_job(mode, clear_existing).await? {
                Some(job) => job,
                None => return Ok(empty_worklist_summary(mode)),
            },
        };

        let start = job.processed_urls;
        let end = (start + self.config.batch_size).min(job.urls.len());
        info!(
            job_id = %job.id,
            from = start + 1,
            to = end,
            total = job.urls.len(),
            "processing batch window"
        );

        for i in start..end {
            let entry = job.urls[i].clone();
            info!(
                index = i + 1,
                total = job.urls.len(),
                company = %entry.company,
                url = %entry.url,
                "processing url"
            );

            let mut attempt_error: Option<String> = None;
            match self.fetcher.fetch(&entry.url, self.config.fetch_timeout).await {
                FetchOutcome::Fetched(page) => {
                    let detection = detect_change(
                        &entry,
                        &page,
                        self.baselines.as_ref(),
                        self.changes.as_ref(),
                    )
                    .await;
                    match detection {
                        Ok(decision) => {
                            job.successful_urls += 1;
                            job.consecutive_errors = 0;
                            if let ChangeDecision::ChangeDetected(change) = decision {
                                info!(
                                    url = %entry.url,
                                    percentage_change = change.percentage_change,
                                    "change recorded"
                                );
                            }
                        }
                        Err(e) => attempt_error = Some(format!("{e:#}")),
                    }
                }
                FetchOutcome::Failed { error } => attempt_error = Some(error),
            }

            job.processed_urls += 1;

            if let Some(error) = attempt_error {
                warn!(url = %entry.url, error = %error, "url failed");
                job.failed_urls += 1;
                job.consecutive_errors += 1;
                job.errors.push(JobError {
                    url: entry.url.clone(),
                    company: entry.company.clone(),
                    error: error.clone(),
                    timestamp: Utc::now(),
                });

                if job.consecutive_errors >= self.config.max_consecutive_errors {
                    warn!(
                        job_id = %job.id,
                        consecutive_errors = job.consecutive_errors,
                        "too many consecutive errors, pausing job"
                    );
                    job.status = JobStatus::PausedError;
                    job.last_update = Utc::now();
                    self.jobs
                        .set(&job)
                        .await
                        .context("Failed to persist paused job")?;
                    return Ok(paused_summary(&job, error));
                }

                tokio::time::sleep(self.config.failure_delay).await;
            } else {
                tokio::time::sleep(self.config.success_delay).await;
            }
        }

        job.current_batch += 1;
        job.last_update = Utc::now();

        if job.is_exhausted() {
            job.status = JobStatus::Completed;
            self.jobs
                .set(&job)
                .await
                .context("Failed to persist completed job")?;
            info!(
                job_id = %job.id,
                successful = job.successful_urls,
                failed = job.failed_urls,
                "baseline job completed"
            );
            Ok(completed_summary(&job))
        } else {
            self.jobs
                .set(&job)
                .await
                .context("Failed to persist job progress")?;
            self.scheduler
                .schedule_continuation(&job.id)
                .await
                .context("Failed to schedule continuation")?;
            Ok(in_progress_summary(&job))
        }
    }

    async fn create_job(&self, mode: JobMode, clear_existing: bool) -> Result<Option<Job>> {
        info!(mode = ?mode, "creating new baseline job");

        if mode == JobMode::All && clear_existing {
            self.baselines
                .clear()
                .await
                .context("Failed to clear existing baselines")?;
        }

        let mut worklist = self.monitors.worklist();
        if mode == JobMode::New {
            let existing = self
                .baselines
                .existing_urls()
                .await
                .context("Failed to list existing baseline urls")?;
            worklist.retain(|entry| !existing.contains(&entry.url));
        }

        if worklist.is_empty() {
            info!("no urls to process");
            return Ok(None);
        }

        let job = Job::new(mode, worklist);
        self.jobs
            .set(&job)
            .await
            .context("Failed to persist new job")?;
        info!(job_id = %job.id, urls = job.total(), "created job");
        Ok(Some(job))
    }

    /// Resume a job paused by the consecutive-error threshold.
    pub async fn resume_job(&self) -> Result<RunSummary, ResumeError> {
        let mut job = self
            .jobs
            .get()
            .await
            .context("Failed to load job document")?
            .ok_or(ResumeError::NoJob)?;

        if job.status != JobStatus::PausedError {
            return Err(ResumeError::NotPaused(job.status));
        }

        job.consecutive_errors = 0;
        job.status = JobStatus::InProgress;
        job.last_update = Utc::now();
        self.jobs
            .set(&job)
            .await
            .context("Failed to persist resumed job")?;
        info!(job_id = %job.id, "resuming paused job");

        Ok(self.run_next_batch(job.mode, false).await)
    }

    /// Delete the active job and cancel any pending continuation.
    ///
    /// Idempotent: a missing job is not an error. A fetch already in flight
    /// elsewhere is not interrupted; its late write lands against an empty
    /// slot and is dropped.
    pub async fn cancel_job(&self) -> Result<()> {
        self.scheduler
            .cancel_pending()
            .await
            .context("Failed to cancel pending continuation")?;
        self.jobs
            .delete()
            .await
            .context("Failed to delete job document")?;
        info!("job cancelled");
        Ok(())
    }

    async fn record_fatal(&self, error: anyhow::Error) -> RunSummary {
        error!(error = %format!("{error:#}"), "critical error in batch run");

        // Leave the job behind in error status for inspection, best effort.
        let mut job_snapshot = None;
        if let Ok(Some(mut job)) = self.jobs.get().await {
            job.status = JobStatus::Error;
            job.last_critical_error = Some(format!("{error:#}"));
            job.last_update = Utc::now();
            if let Err(save_error) = self.jobs.set(&job).await {
                error!(error = %save_error, "failed to persist error state");
            }
            job_snapshot = Some(job);
        }

        match job_snapshot {
            Some(job) => RunSummary {
                status: JobStatus::Error,
                message: format!("{error:#}"),
                processed: job.processed_urls,
                successful: job.successful_urls,
                failed: job.failed_urls,
                total: job.total(),
                percent_complete: job.percent_complete(),
                estimated_minutes_remaining: None,
                last_error: Some(format!("{error:#}")),
                recent_errors: job.recent_errors(5),
            },
            None => RunSummary {
                status: JobStatus::Error,
                message: format!("{error:#}"),
                processed: 0,
                successful: 0,
                failed: 0,
                total: 0,
                percent_complete: 0,
                estimated_minutes_remaining: None,
                last_error: Some(format!("{error:#}")),
                recent_errors: Vec::new(),
            },
        }
    }
}

fn empty_worklist_summary(mode: JobMode) -> RunSummary {
    let message = match mode {
        JobMode::New => "No new URLs to process",
        JobMode::All => "No URLs found to process",
    };
    RunSummary {
        status: JobStatus::Completed,
        message: message.to_string(),
        processed: 0,
        successful: 0,
        failed: 0,
        total: 0,
        percent_complete: 100,
        estimated_minutes_remaining: None,
        last_error: None,
        recent_errors: Vec::new(),
    }
}

fn completed_summary(job: &Job) -> RunSummary {
    RunSummary {
        status: JobStatus::Completed,
        message: format!(
            "Baseline generation completed! Successfully processed {} of {} URLs.",
            job.successful_urls,
            job.total()
        ),
        processed: job.processed_urls,
        successful: job.successful_urls,
        failed: job.failed_urls,
        total: job.total(),
        percent_complete: 100,
        estimated_minutes_remaining: None,
        last_error: None,
        recent_errors: job.errors.clone(),
    }
}

fn in_progress_summary(job: &Job) -> RunSummary {
    RunSummary {
        status: JobStatus::InProgress,
        message: format!(
            "Processing baseline... {} of {} URLs completed ({} successful, {} failed).",
            job.processed_urls,
            job.total(),
            job.successful_urls,
            job.failed_urls
        ),
        processed: job.processed_urls,
        successful: job.successful_urls,
        failed: job.failed_urls,
        total: job.total(),
        percent_complete: job.percent_complete(),
        estimated_minutes_remaining: estimated_minutes_remaining(job),
        last_error: None,
        recent_errors: job.recent_errors(3),
    }
}

fn paused_summary(job: &Job, last_error: String) -> RunSummary {
    RunSummary {
        status: JobStatus::PausedError,
        message: format!(
            "Job paused due to {} consecutive errors. Last error: {}",
            job.consecutive_errors, last_error
        ),
        processed: job.processed_urls,
        successful: job.successful_urls,
        failed: job.failed_urls,
        total: job.total(),
        percent_complete: job.percent_complete(),
        estimated_minutes_remaining: None,
        last_error: Some(last_error),
        recent_errors: job.recent_errors(5),
    }
}

fn still_paused_summary(job: &Job) -> RunSummary {
    let last_error = job.errors.last().map(|e| e.error.clone());
    RunSummary {
        status: JobStatus::PausedError,
        message: "Job is paused after repeated errors; resume it to continue.".to_string(),
        processed: job.processed_urls,
        successful: job.successful_urls,
        failed: job.failed_urls,
        total: job.total(),
        percent_complete: job.percent_complete(),
        estimated_minutes_remaining: None,
        last_error,
        recent_errors: job.recent_errors(5),
    }
}

fn still_errored_summary(job: &Job) -> RunSummary {
    RunSummary {
        status: JobStatus::Error,
        message: "Job is in error state; cancel it to start over.".to_string(),
        processed: job.processed_urls,
        successful: job.successful_urls,
        failed: job.failed_urls,
        total: job.total(),
        percent_complete: job.percent_complete(),
        estimated_minutes_remaining: None,
        last_error: job.last_critical_error.clone(),
        recent_errors: job.recent_errors(5),
    }
}

/// Naive ETA: average minutes per processed URL times URLs remaining
fn estimated_minutes_remaining(job: &Job) -> Option<i64> {
    if job.processed_urls == 0 {
        return None;
    }
    let elapsed_minutes = (Utc::now() - job.start_time).num_minutes() as f64;
    let avg_per_url = elapsed_minutes / job.processed_urls as f64;
    let remaining = (job.total() - job.processed_urls) as f64;
    Some((avg_per_url * remaining).ceil() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompanyConfig;
    use crate::testing::{InMemoryStore, RecordingScheduler, ScriptedFetcher};
    use crate::types::WorklistEntry;

    fn test_config() -> RunnerConfig {
        RunnerConfig {
            batch_size: 3,
            max_consecutive_errors: 3,
            fetch_timeout: Duration::from_secs(1),
            success_delay: Duration::ZERO,
            failure_delay: Duration::ZERO,
        }
    }

    struct Harness {
        fetcher: Arc<ScriptedFetcher>,
        store: Arc<InMemoryStore>,
        scheduler: Arc<RecordingScheduler>,
        monitors: MonitorConfig,
        config: RunnerConfig,
    }

    impl Harness {
        fn new(urls: &[&str]) -> Self {
            let mut company = CompanyConfig::new("Acme");
            for url in urls {
                company = company.with_url(*url, "unknown");
            }
            Self {
                fetcher: Arc::new(ScriptedFetcher::new()),
                store: Arc::new(InMemoryStore::new()),
                scheduler: Arc::new(RecordingScheduler::new()),
                monitors: MonitorConfig::default().with_company(company),
                config: test_config(),
            }
        }

        /// A fresh runner per call simulates crash-and-restart between
        /// batches: nothing survives except the persisted stores.
        fn runner(&self) -> BatchJobRunner {
            BatchJobRunner::with_config(
                self.fetcher.clone(),
                self.store.clone(),
                self.store.clone(),
                self.store.clone(),
                self.scheduler.clone(),
                self.monitors.clone(),
                self.config.clone(),
            )
        }

        async fn job(&self) -> Option<Job> {
            JobStore::get(self.store.as_ref()).await.unwrap()
        }
    }

    fn five_urls() -> Vec<String> {
        (1..=5).map(|i| format!("https://acme.test/page{i}")).collect()
    }

    fn assert_counters_consistent(job: &Job) {
        assert_eq!(job.processed_urls, job.successful_urls + job.failed_urls);
        assert!(job.processed_urls <= job.urls.len());
    }

    #[tokio::test]
    async fn test_five_urls_complete_in_two_batches() {
        let urls = five_urls();
        let harness = Harness::new(&urls.iter().map(String::as_str).collect::<Vec<_>>());
        for url in &urls {
            harness.fetcher.ok(url, "page content");
        }

        let first = harness.runner().run_next_batch(JobMode::All, false).await;
        assert_eq!(first.status, JobStatus::InProgress);
        assert_eq!(first.processed, 3);
        assert_eq!(first.total, 5);
        assert_eq!(first.percent_complete, 60);
        assert_eq!(harness.scheduler.scheduled_count(), 1);

        let second = harness.runner().run_next_batch(JobMode::All, false).await;
        assert_eq!(second.status, JobStatus::Completed);
        assert_eq!(second.processed, 5);
        assert_eq!(second.successful, 5);
        assert_eq!(second.failed, 0);

        // Window clamped at the tail: each URL fetched exactly once
        for url in &urls {
            assert_eq!(harness.fetcher.fetch_count(url), 1);
        }
    }

    #[tokio::test]
    async fn test_resumption_never_skips_or_repeats_urls() {
        let urls: Vec<String> = (1..=7).map(|i| format!("https://acme.test/p{i}")).collect();
        let harness = Harness::new(&urls.iter().map(String::as_str).collect::<Vec<_>>());
        for url in &urls {
            harness.fetcher.ok(url, "content");
        }

        let mut calls = 0;
        loop {
            calls += 1;
            let summary = harness.runner().run_next_batch(JobMode::All, false).await;
            let job = harness.job().await.unwrap();
            assert_counters_consistent(&job);
            if summary.status == JobStatus::Completed {
                break;
            }
            assert_eq!(summary.status, JobStatus::InProgress);
        }

        assert_eq!(calls, 3);
        assert_eq!(harness.fetcher.total_fetches(), 7);
        for url in &urls {
            assert_eq!(harness.fetcher.fetch_count(url), 1);
        }
    }

    #[tokio::test]
    async fn test_threshold_pause_stops_mid_window() {
        let urls = five_urls();
        let harness = Harness::new(&urls.iter().map(String::as_str).collect::<Vec<_>>());
        for url in &urls {
            harness.fetcher.fail(url, "HTTP 503");
        }
        let mut harness = harness;
        harness.config.batch_size = 5;

        let summary = harness.runner().run_next_batch(JobMode::All, false).await;

        assert_eq!(summary.status, JobStatus::PausedError);
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.failed, 3);
        assert_eq!(summary.last_error.as_deref(), Some("HTTP 503"));
        assert_eq!(summary.recent_errors.len(), 3);

        let job = harness.job().await.unwrap();
        assert_eq!(job.status, JobStatus::PausedError);
        assert_eq!(job.consecutive_errors, 3);
        assert_counters_consistent(&job);

        // The rest of the window was never attempted
        assert_eq!(harness.fetcher.fetch_count(&urls[3]), 0);
        assert_eq!(harness.fetcher.fetch_count(&urls[4]), 0);
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_errors() {
        let urls = five_urls();
        let harness = Harness::new(&urls.iter().map(String::as_str).collect::<Vec<_>>());
        harness.fetcher.fail(&urls[0], "HTTP 500");
        harness.fetcher.fail(&urls[1], "HTTP 500");
        harness.fetcher.ok(&urls[2], "recovered");
        harness.fetcher.fail(&urls[3], "HTTP 500");
        harness.fetcher.fail(&urls[4], "HTTP 500");

        let first = harness.runner().run_next_batch(JobMode::All, false).await;
        assert_eq!(first.status, JobStatus::InProgress);
        let job = harness.job().await.unwrap();
        assert_eq!(job.consecutive_errors, 0);

        // Two more failures after the reset stay under the threshold
        let second = harness.runner().run_next_batch(JobMode::All, false).await;
        assert_eq!(second.status, JobStatus::Completed);
        assert_eq!(second.failed, 4);
        assert_eq!(second.successful, 1);
    }

    #[tokio::test]
    async fn test_empty_new_mode_creates_no_job() {
        let harness = Harness::new(&["https://acme.test/pricing"]);
        harness.fetcher.ok("https://acme.test/pricing", "content");

        // Seed the baseline, then clear the completed job marker
        let done = harness.runner().run_next_batch(JobMode::All, false).await;
        assert_eq!(done.status, JobStatus::Completed);

        let summary = harness.runner().run_next_batch(JobMode::New, false).await;
        assert_eq!(summary.status, JobStatus::Completed);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.message, "No new URLs to process");
        assert!(harness.job().await.is_none());
    }

    #[tokio::test]
    async fn test_new_mode_only_processes_unbaselined_urls() {
        let urls = ["https://acme.test/old", "https://acme.test/new"];
        let harness = Harness::new(&urls);
        harness.fetcher.ok(urls[0], "seen before");
        harness.fetcher.ok(urls[1], "never seen");

        // Baseline only the first URL
        let seeded = crate::types::FetchedPage::from_content(
            urls[0].to_string(),
            "seen before".to_string(),
            None,
        );
        let entry = WorklistEntry {
            company: "Acme".into(),
            url: urls[0].into(),
            kind: "unknown".into(),
        };
        detect_change(&entry, &seeded, harness.store.as_ref(), harness.store.as_ref())
            .await
            .unwrap();

        let summary = harness.runner().run_next_batch(JobMode::New, false).await;
        assert_eq!(summary.status, JobStatus::Completed);
        assert_eq!(summary.total, 1);
        assert_eq!(harness.fetcher.fetch_count(urls[0]), 0);
        assert_eq!(harness.fetcher.fetch_count(urls[1]), 1);
    }

    #[tokio::test]
    async fn test_clear_existing_wipes_baselines() {
        let harness = Harness::new(&["https://acme.test/pricing"]);
        harness.fetcher.ok("https://acme.test/pricing", "v1");

        harness.runner().run_next_batch(JobMode::All, false).await;
        assert_eq!(
            BaselineStore::stats(harness.store.as_ref()).await.unwrap().total,
            1
        );

        harness.fetcher.ok("https://acme.test/pricing", "v2");
        let summary = harness.runner().run_next_batch(JobMode::All, true).await;
        assert_eq!(summary.status, JobStatus::Completed);

        // The old baseline was wiped, so v2 re-baselines instead of diffing
        let changes = ChangeStore::recent(harness.store.as_ref(), 10).await.unwrap();
        assert!(changes.is_empty());
    }

    #[tokio::test]
    async fn test_paused_job_requires_explicit_resume() {
        let urls = five_urls();
        let harness = Harness::new(&urls.iter().map(String::as_str).collect::<Vec<_>>());
        for url in &urls {
            harness.fetcher.fail(url, "HTTP 503");
        }

        harness.runner().run_next_batch(JobMode::All, false).await;
        let fetches_before = harness.fetcher.total_fetches();

        let summary = harness.runner().run_next_batch(JobMode::All, false).await;
        assert_eq!(summary.status, JobStatus::PausedError);
        assert_eq!(harness.fetcher.total_fetches(), fetches_before);
    }

    #[tokio::test]
    async fn test_resume_continues_a_paused_job() {
        let urls = five_urls();
        let harness = Harness::new(&urls.iter().map(String::as_str).collect::<Vec<_>>());
        harness.fetcher.fail(&urls[0], "HTTP 503");
        harness.fetcher.fail(&urls[1], "HTTP 503");
        harness.fetcher.fail(&urls[2], "HTTP 503");
        harness.fetcher.ok(&urls[3], "content");
        harness.fetcher.ok(&urls[4], "content");

        let paused = harness.runner().run_next_batch(JobMode::All, false).await;
        assert_eq!(paused.status, JobStatus::PausedError);

        let resumed = harness.runner().resume_job().await.unwrap();
        assert_eq!(resumed.status, JobStatus::Completed);
        assert_eq!(resumed.processed, 5);
        assert_eq!(resumed.successful, 2);
        assert_eq!(resumed.failed, 3);
    }

    #[tokio::test]
    async fn test_resume_without_job_is_invalid() {
        let harness = Harness::new(&["https://acme.test/pricing"]);
        let err = harness.runner().resume_job().await.unwrap_err();
        assert!(matches!(err, ResumeError::NoJob));
    }

    #[tokio::test]
    async fn test_resume_of_running_job_is_invalid() {
        let urls = five_urls();
        let harness = Harness::new(&urls.iter().map(String::as_str).collect::<Vec<_>>());
        for url in &urls {
            harness.fetcher.ok(url, "content");
        }

        harness.runner().run_next_batch(JobMode::All, false).await;
        let err = harness.runner().resume_job().await.unwrap_err();
        assert!(matches!(err, ResumeError::NotPaused(JobStatus::InProgress)));
    }

    #[tokio::test]
    async fn test_cancel_clears_slot_and_pending_continuation() {
        let urls = five_urls();
        let harness = Harness::new(&urls.iter().map(String::as_str).collect::<Vec<_>>());
        for url in &urls {
            harness.fetcher.ok(url, "content");
        }

        harness.runner().run_next_batch(JobMode::All, false).await;
        assert!(harness.job().await.is_some());

        harness.runner().cancel_job().await.unwrap();
        assert!(harness.job().await.is_none());
        assert_eq!(harness.scheduler.cancel_count(), 1);

        // Idempotent
        harness.runner().cancel_job().await.unwrap();
        assert!(harness.job().await.is_none());
    }

    #[tokio::test]
    async fn test_completed_job_cleared_on_next_run_request() {
        let harness = Harness::new(&["https://acme.test/pricing"]);
        harness.fetcher.ok("https://acme.test/pricing", "v1");

        let first = harness.runner().run_next_batch(JobMode::All, false).await;
        assert_eq!(first.status, JobStatus::Completed);

        harness.fetcher.ok("https://acme.test/pricing", "v2");
        let second = harness.runner().run_next_batch(JobMode::All, false).await;
        assert_eq!(second.status, JobStatus::Completed);

        // A fresh job actually ran: the URL was fetched again and the second
        // pass diffed against the v1 baseline.
        assert_eq!(harness.fetcher.fetch_count("https://acme.test/pricing"), 2);
        let changes = ChangeStore::recent(harness.store.as_ref(), 10).await.unwrap();
        assert_eq!(changes.len(), 1);
    }

    #[tokio::test]
    async fn test_errored_job_blocks_until_cancelled() {
        let harness = Harness::new(&["https://acme.test/pricing"]);
        let mut job = Job::new(JobMode::All, vec![WorklistEntry {
            company: "Acme".into(),
            url: "https://acme.test/pricing".into(),
            kind: "unknown".into(),
        }]);
        job.status = JobStatus::Error;
        job.last_critical_error = Some("store write failed".into());
        JobStore::set(harness.store.as_ref(), &job).await.unwrap();

        let summary = harness.runner().run_next_batch(JobMode::All, false).await;
        assert_eq!(summary.status, JobStatus::Error);
        assert_eq!(summary.last_error.as_deref(), Some("store write failed"));
        assert_eq!(harness.fetcher.total_fetches(), 0);
    }

    #[tokio::test]
    async fn test_job_store_failure_is_fatal() {
        use async_trait::async_trait;

        struct FailingJobStore;

        #[async_trait]
        impl JobStore for FailingJobStore {
            async fn get(&self) -> Result<Option<Job>> {
                Ok(None)
            }
            async fn set(&self, _job: &Job) -> Result<()> {
                anyhow::bail!("connection reset")
            }
            async fn delete(&self) -> Result<()> {
                Ok(())
            }
        }

        let harness = Harness::new(&["https://acme.test/pricing"]);
        harness.fetcher.ok("https://acme.test/pricing", "content");
        let runner = BatchJobRunner::with_config(
            harness.fetcher.clone(),
            Arc::new(FailingJobStore),
            harness.store.clone(),
            harness.store.clone(),
            harness.scheduler.clone(),
            harness.monitors.clone(),
            harness.config.clone(),
        );

        let summary = runner.run_next_batch(JobMode::All, false).await;
        assert_eq!(summary.status, JobStatus::Error);
        assert!(summary.message.contains("Failed to persist new job"));
    }
}
