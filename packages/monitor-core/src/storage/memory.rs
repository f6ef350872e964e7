use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::traits::{BaselineStore, ChangeStore, JobStore};
use crate::types::{Baseline, BaselineStats, Change, Job};

/// In-memory implementation of all three persistence contracts.
///
/// Backs tests and local dry runs; production uses [`super::PostgresStore`].
#[derive(Default)]
pub struct InMemoryStore {
    job: Mutex<Option<Job>>,
    baselines: Mutex<HashMap<String, Baseline>>,
    changes: Mutex<Vec<Change>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryStore {
    async fn get(&self) -> Result<Option<Job>> {
        Ok(self.job.lock().unwrap().clone())
    }

    async fn set(&self, job: &Job) -> Result<()> {
        *self.job.lock().unwrap() = Some(job.clone());
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        *self.job.lock().unwrap() = None;
        Ok(())
    }
}

#[async_trait]
impl BaselineStore for InMemoryStore {
    async fn get_by_url(&self, url: &str) -> Result<Option<Baseline>> {
        Ok(self.baselines.lock().unwrap().get(url).cloned())
    }

    async fn upsert(&self, baseline: &Baseline) -> Result<()> {
        self.baselines
            .lock()
            .unwrap()
            .insert(baseline.url.clone(), baseline.clone());
        Ok(())
    }

    async fn existing_urls(&self) -> Result<HashSet<String>> {
        Ok(self.baselines.lock().unwrap().keys().cloned().collect())
    }

    async fn clear(&self) -> Result<()> {
        self.baselines.lock().unwrap().clear();
        Ok(())
    }

    async fn stats(&self) -> Result<BaselineStats> {
        let baselines = self.baselines.lock().unwrap();
        if baselines.is_empty() {
            return Ok(BaselineStats::default());
        }
        let companies: HashSet<&str> = baselines.values().map(|b| b.company.as_str()).collect();
        let total_length: usize = baselines.values().map(|b| b.content_length).sum();
        Ok(BaselineStats {
            total: baselines.len() as i64,
            companies: companies.len() as i64,
            avg_content_length: (total_length / baselines.len()) as i64,
        })
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut baselines = self.baselines.lock().unwrap();
        let before = baselines.len();
        baselines.retain(|_, b| b.timestamp >= cutoff);
        Ok((before - baselines.len()) as u64)
    }
}

#[async_trait]
impl ChangeStore for InMemoryStore {
    async fn append(&self, change: &Change) -> Result<()> {
        self.changes.lock().unwrap().push(change.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<Change>> {
        let changes = self.changes.lock().unwrap();
        Ok(changes.iter().rev().take(limit).cloned().collect())
    }
}
