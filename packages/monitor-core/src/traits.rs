use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{Baseline, BaselineStats, Change, FetchOutcome, Job};

// ============================================================================
// CONTENT FETCHER: network access (mockable)
// ============================================================================

#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch a single URL with a per-call timeout.
    ///
    /// Ordinary failures (timeout, non-2xx, network error) are reported in
    /// the returned outcome, never as a panic or error path.
    async fn fetch(&self, url: &str, timeout: Duration) -> FetchOutcome;
}

// ============================================================================
// JOB STORE: single-slot persistence for the in-flight job document
// ============================================================================

/// Single mutable slot holding at most one job document.
///
/// Last-write-wins, no transactions. The single-slot contract is what
/// enforces the one-active-job invariant.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get(&self) -> Result<Option<Job>>;
    async fn set(&self, job: &Job) -> Result<()>;
    async fn delete(&self) -> Result<()>;
}

// ============================================================================
// BASELINE STORE: one logical row per monitored URL
// ============================================================================

#[async_trait]
pub trait BaselineStore: Send + Sync {
    async fn get_by_url(&self, url: &str) -> Result<Option<Baseline>>;

    /// Insert or overwrite the baseline for its URL
    async fn upsert(&self, baseline: &Baseline) -> Result<()>;

    /// URLs that currently have a baseline (for `new`-mode worklists)
    async fn existing_urls(&self) -> Result<HashSet<String>>;

    /// Wipe all baselines (for `--clear` full regeneration)
    async fn clear(&self) -> Result<()>;

    async fn stats(&self) -> Result<BaselineStats>;

    /// Age-based retention cleanup; returns the number of rows removed
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

// ============================================================================
// CHANGE STORE: append-only change history
// ============================================================================

#[async_trait]
pub trait ChangeStore: Send + Sync {
    async fn append(&self, change: &Change) -> Result<()>;

    /// Most recent changes first
    async fn recent(&self, limit: usize) -> Result<Vec<Change>>;
}

// ============================================================================
// SCHEDULER: fire-and-forget batch continuation
// ============================================================================

/// Requests re-invocation of the batch runner at some later point.
///
/// The runner does not depend on *when* the continuation fires, only that it
/// eventually does.
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn schedule_continuation(&self, job_id: &str) -> Result<()>;

    /// Cancel any pending continuation (used by job cancellation)
    async fn cancel_pending(&self) -> Result<()>;
}

/// Scheduler that does nothing.
///
/// Fits callers that drive batches themselves, like the CLI's follow loop.
pub struct NoopScheduler;

#[async_trait]
impl Scheduler for NoopScheduler {
    async fn schedule_continuation(&self, _job_id: &str) -> Result<()> {
        Ok(())
    }

    async fn cancel_pending(&self) -> Result<()> {
        Ok(())
    }
}
