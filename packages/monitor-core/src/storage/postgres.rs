use std::collections::HashSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::magnitude::ChangeMagnitude;
use crate::traits::{BaselineStore, ChangeStore, JobStore};
use crate::types::{Baseline, BaselineStats, Change, ChangeId, Job};

/// Slot name for the single active job document
const JOB_SLOT: &str = "baseline_job";

/// Postgres-backed implementation of the three persistence contracts.
///
/// The job document is stored as JSONB in a single-row slot; last write wins,
/// matching the store's single-slot contract.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PostgresStore {
    async fn get(&self) -> Result<Option<Job>> {
        let row = sqlx::query("SELECT document FROM monitor_jobs WHERE slot = $1")
            .bind(JOB_SLOT)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load job document")?;

        row.map(|r| {
            serde_json::from_value(r.get("document")).context("Failed to decode job document")
        })
        .transpose()
    }

    async fn set(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO monitor_jobs (slot, document, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (slot) DO UPDATE SET
                document = EXCLUDED.document,
                updated_at = NOW()
            "#,
        )
        .bind(JOB_SLOT)
        .bind(serde_json::to_value(job)?)
        .execute(&self.pool)
        .await
        .context("Failed to save job document")?;
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        sqlx::query("DELETE FROM monitor_jobs WHERE slot = $1")
            .bind(JOB_SLOT)
            .execute(&self.pool)
            .await
            .context("Failed to delete job document")?;
        Ok(())
    }
}

#[async_trait]
impl BaselineStore for PostgresStore {
    async fn get_by_url(&self, url: &str) -> Result<Option<Baseline>> {
        let row = sqlx::query(
            r#"
            SELECT url, company, kind, content_hash, extracted_content,
                   content_length, title, intelligence, captured_at
            FROM baselines
            WHERE url = $1
            "#,
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get baseline by url")?;

        Ok(row.map(|r| Baseline {
            url: r.get("url"),
            company: r.get("company"),
            kind: r.get("kind"),
            content_hash: r.get("content_hash"),
            extracted_content: r.get("extracted_content"),
            content_length: r.get::<i64, _>("content_length") as usize,
            title: r.get("title"),
            intelligence: serde_json::from_value(r.get("intelligence")).unwrap_or_default(),
            timestamp: r.get("captured_at"),
        }))
    }

    async fn upsert(&self, baseline: &Baseline) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO baselines (
                url, company, kind, content_hash, extracted_content,
                content_length, title, intelligence, captured_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (url) DO UPDATE SET
                company = EXCLUDED.company,
                kind = EXCLUDED.kind,
                content_hash = EXCLUDED.content_hash,
                extracted_content = EXCLUDED.extracted_content,
                content_length = EXCLUDED.content_length,
                title = EXCLUDED.title,
                intelligence = EXCLUDED.intelligence,
                captured_at = EXCLUDED.captured_at
            "#,
        )
        .bind(&baseline.url)
        .bind(&baseline.company)
        .bind(&baseline.kind)
        .bind(&baseline.content_hash)
        .bind(&baseline.extracted_content)
        .bind(baseline.content_length as i64)
        .bind(&baseline.title)
        .bind(serde_json::to_value(&baseline.intelligence)?)
        .bind(baseline.timestamp)
        .execute(&self.pool)
        .await
        .context("Failed to upsert baseline")?;
        Ok(())
    }

    async fn existing_urls(&self) -> Result<HashSet<String>> {
        let rows = sqlx::query("SELECT url FROM baselines")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list baseline urls")?;
        Ok(rows.into_iter().map(|r| r.get("url")).collect())
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM baselines")
            .execute(&self.pool)
            .await
            .context("Failed to clear baselines")?;
        Ok(())
    }

    async fn stats(&self) -> Result<BaselineStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(DISTINCT company) AS companies,
                   COALESCE(AVG(content_length), 0)::BIGINT AS avg_content_length
            FROM baselines
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to compute baseline stats")?;

        Ok(BaselineStats {
            total: row.get("total"),
            companies: row.get("companies"),
            avg_content_length: row.get("avg_content_length"),
        })
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM baselines WHERE captured_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .context("Failed to delete stale baselines")?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ChangeStore for PostgresStore {
    async fn append(&self, change: &Change) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO changes (
                id, url, company, old_hash, new_hash,
                content_length_before, content_length_after, percentage_change,
                magnitude, relevance_score, keywords, title, summary, detected_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(change.id.0)
        .bind(&change.url)
        .bind(&change.company)
        .bind(&change.old_hash)
        .bind(&change.new_hash)
        .bind(change.content_length_before as i64)
        .bind(change.content_length_after as i64)
        .bind(change.percentage_change as i32)
        .bind(change.magnitude.as_str())
        .bind(change.relevance_score as i32)
        .bind(serde_json::to_value(&change.keywords)?)
        .bind(&change.title)
        .bind(&change.summary)
        .bind(change.timestamp)
        .execute(&self.pool)
        .await
        .context("Failed to append change record")?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<Change>> {
        let rows = sqlx::query(
            r#"
            SELECT id, url, company, old_hash, new_hash,
                   content_length_before, content_length_after, percentage_change,
                   magnitude, relevance_score, keywords, title, summary, detected_at
            FROM changes
            ORDER BY detected_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list recent changes")?;

        Ok(rows
            .into_iter()
            .map(|r| Change {
                id: ChangeId(r.get("id")),
                url: r.get("url"),
                company: r.get("company"),
                timestamp: r.get("detected_at"),
                old_hash: r.get("old_hash"),
                new_hash: r.get("new_hash"),
                content_length_before: r.get::<i64, _>("content_length_before") as usize,
                content_length_after: r.get::<i64, _>("content_length_after") as usize,
                percentage_change: r.get::<i32, _>("percentage_change") as u32,
                magnitude: ChangeMagnitude::from_str(r.get("magnitude")),
                relevance_score: r.get::<i32, _>("relevance_score") as u8,
                keywords: serde_json::from_value(r.get("keywords")).unwrap_or_default(),
                title: r.get("title"),
                summary: r.get("summary"),
            })
            .collect())
    }
}
