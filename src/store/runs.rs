use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::info;

use super::{format_timestamp, parse_timestamp, RunCounts, RunOrderRecord, RunOrderStatus, RunRecord, StateStore, StoreError};

impl StateStore {
    /// Open a run record
    pub async fn begin_run(&self, run: &RunRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO workflow_runs (run_id, started_at, env, host)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&run.run_id)
        .bind(format_timestamp(run.started_at))
        .bind(&run.env)
        .bind(&run.host)
        .execute(self.pool())
        .await?;

        info!(run_id = %run.run_id, env = %run.env, "Run started");
        Ok(())
    }

    /// Close a run record with its final counts
    pub async fn close_run(
        &self,
        run_id: &str,
        ended_at: DateTime<Utc>,
        counts: &RunCounts,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE workflow_runs SET
                ended_at = ?2,
                eligible_count = ?3,
                processed_count = ?4,
                held_count = ?5,
                failed_count = ?6
            WHERE run_id = ?1
            "#,
        )
        .bind(run_id)
        .bind(format_timestamp(ended_at))
        .bind(counts.eligible)
        .bind(counts.processed)
        .bind(counts.held)
        .bind(counts.failed)
        .execute(self.pool())
        .await?;

        info!(
            run_id,
            eligible = counts.eligible,
            processed = counts.processed,
            held = counts.held,
            failed = counts.failed,
            "Run closed"
        );
        Ok(())
    }

    pub async fn run(&self, run_id: &str) -> Result<Option<RunRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT run_id, started_at, ended_at, env, host,
                   eligible_count, processed_count, held_count, failed_count
            FROM workflow_runs
            WHERE run_id = ?1
            "#,
        )
        .bind(run_id)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(run_from_row).transpose()
    }

    pub async fn recent_runs(&self, limit: i64) -> Result<Vec<RunRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT run_id, started_at, ended_at, env, host,
                   eligible_count, processed_count, held_count, failed_count
            FROM workflow_runs
            ORDER BY started_at DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(run_from_row).collect()
    }

    /// Record where an order stands within a run
    pub async fn mark_run_order(
        &self,
        run_id: &str,
        order_id: i64,
        status: RunOrderStatus,
        last_step: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO run_orders (run_id, order_id, status, last_step, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(run_id, order_id) DO UPDATE SET
                status = excluded.status,
                last_step = excluded.last_step,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(run_id)
        .bind(order_id)
        .bind(status.as_str())
        .bind(last_step)
        .bind(format_timestamp(Utc::now()))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn run_orders(&self, run_id: &str) -> Result<Vec<RunOrderRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT run_id, order_id, status, last_step, updated_at
            FROM run_orders
            WHERE run_id = ?1
            ORDER BY order_id
            "#,
        )
        .bind(run_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| -> Result<RunOrderRecord, StoreError> {
                let status: String = row.try_get("status")?;
                let updated_at: Option<String> = row.try_get("updated_at")?;
                Ok(RunOrderRecord {
                    run_id: row.try_get("run_id")?,
                    order_id: row.try_get("order_id")?,
                    status: status.parse()?,
                    last_step: row.try_get("last_step")?,
                    updated_at: updated_at.as_deref().and_then(parse_timestamp),
                })
            })
            .collect()
    }

    /// Queue an order for the next run regardless of remote eligibility
    pub async fn enqueue(&self, order_id: i64) -> Result<(), StoreError> {
        let now = format_timestamp(Utc::now());
        sqlx::query(
            r#"
            INSERT INTO manual_queue (order_id, status, queued_at, updated_at)
            VALUES (?1, 'PENDING', ?2, ?2)
            ON CONFLICT(order_id) DO UPDATE SET
                status = 'PENDING',
                updated_at = excluded.updated_at
            "#,
        )
        .bind(order_id)
        .bind(&now)
        .execute(self.pool())
        .await?;

        info!(order_id, "Order queued for processing");
        Ok(())
    }

    /// Pending manual entries in the order they were queued
    pub async fn pending_queue(&self) -> Result<Vec<i64>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT order_id FROM manual_queue
            WHERE status = 'PENDING'
            ORDER BY queued_at ASC, order_id ASC
            "#,
        )
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| row.try_get::<i64, _>("order_id").map_err(StoreError::from))
            .collect()
    }

    pub async fn mark_queue_processed(&self, order_id: i64) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE manual_queue SET status = 'PROCESSED', updated_at = ?2 WHERE order_id = ?1",
        )
        .bind(order_id)
        .bind(format_timestamp(Utc::now()))
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

fn run_from_row(row: &SqliteRow) -> Result<RunRecord, StoreError> {
    let started_at: String = row.try_get("started_at")?;
    let ended_at: Option<String> = row.try_get("ended_at")?;
    Ok(RunRecord {
        run_id: row.try_get("run_id")?,
        started_at: parse_timestamp(&started_at).ok_or_else(|| StoreError::InvalidValue {
            field: "started_at",
            value: started_at.clone(),
        })?,
        ended_at: ended_at.as_deref().and_then(parse_timestamp),
        env: row.try_get("env")?,
        host: row.try_get("host")?,
        counts: RunCounts {
            eligible: row.try_get("eligible_count")?,
            processed: row.try_get("processed_count")?,
            held: row.try_get("held_count")?,
            failed: row.try_get("failed_count")?,
        },
    })
}
