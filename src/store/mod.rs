//! Durable local state for the fulfillment workflow.
//!
//! Every order's progress, the derived identifiers of the artifacts created
//! for it, run records and the reconciliation baselines live in one SQLite
//! database migrated at open time.

mod models;
mod runs;
mod snapshots;

pub use models::*;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::StoreConfig;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid {field} value in state store: {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// Format a timestamp the way every table stores it
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a stored timestamp; naive values are taken as UTC
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .map(|naive| naive.and_utc())
}

fn parse_date(raw: Option<String>) -> Option<NaiveDate> {
    raw.and_then(|value| {
        let value = value.trim();
        value
            .get(..10)
            .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
    })
}

fn format_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

const ORDER_COLUMNS: &str = r#"
    order_id, status, last_step, last_run_id,
    base_item_code, job_site_a, po_number, sales_order_site_b, shipping_request, job_site_b,
    last_error_summary, last_api_entity, last_api_status, last_api_message, last_api_messages, last_api_raw,
    hold_since, last_reminder_sent, escalated_at,
    last_failure_signature, last_substrate_signature,
    first_seen_at, updated_at
"#;

/// Raw API bodies are trimmed before they are persisted
const MAX_RAW_LEN: usize = 4000;

/// SQLite-backed state store
#[derive(Clone)]
pub struct StateStore {
    pool: SqlitePool,
}

impl StateStore {
    /// Open (creating if needed) the store and apply pending migrations
    pub async fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);

        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await?;

        info!(url = %config.url, "Opened state store");
        Self::migrate(pool).await
    }

    /// Private in-memory store; a single connection keeps the database alive
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self, StoreError> {
        debug!("Running state store migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Current state of one order
    pub async fn order(&self, order_id: i64) -> Result<Option<OrderState>, StoreError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM order_state WHERE order_id = ?1");
        let row = sqlx::query(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(order_from_row).transpose()
    }

    /// True when the order is COMPLETE, including orders already moved to the archive
    pub async fn is_complete(&self, order_id: i64) -> Result<bool, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                EXISTS(SELECT 1 FROM order_state WHERE order_id = ?1 AND status = 'COMPLETE')
                OR EXISTS(SELECT 1 FROM order_state_archive WHERE order_id = ?1) AS complete
            "#,
        )
        .bind(order_id)
        .fetch_one(&self.pool)
        .await?;

        let complete: i64 = row.try_get("complete")?;
        Ok(complete != 0)
    }

    /// Record progress for an order.
    ///
    /// Identifiers are only ever filled in, never cleared. Removed orders are
    /// left untouched. The hold clock starts when the order enters HOLD at a
    /// step and survives re-processing that lands on the same hold again.
    pub async fn record_progress(&self, update: &OrderUpdate) -> Result<(), StoreError> {
        let now = format_timestamp(Utc::now());
        let api = update.api.clone().unwrap_or_default();
        let messages = if api.messages.is_empty() {
            None
        } else {
            serde_json::to_string(&api.messages).ok()
        };
        let raw = api.raw.map(|mut raw| {
            if raw.len() > MAX_RAW_LEN {
                let mut cut = MAX_RAW_LEN;
                while !raw.is_char_boundary(cut) {
                    cut -= 1;
                }
                raw.truncate(cut);
            }
            raw
        });

        sqlx::query(
            r#"
            INSERT INTO order_state (
                order_id, status, last_step, last_run_id,
                base_item_code, job_site_a, po_number, sales_order_site_b, shipping_request, job_site_b,
                last_error_summary, last_api_entity, last_api_status, last_api_message, last_api_messages, last_api_raw,
                hold_since, hold_step, first_seen_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                CASE WHEN ?2 = 'HOLD' THEN ?17 ELSE NULL END,
                CASE WHEN ?2 = 'HOLD' THEN ?3 ELSE NULL END,
                ?17, ?17
            )
            ON CONFLICT(order_id) DO UPDATE SET
                status = excluded.status,
                last_step = excluded.last_step,
                last_run_id = COALESCE(excluded.last_run_id, order_state.last_run_id),
                base_item_code = COALESCE(excluded.base_item_code, order_state.base_item_code),
                job_site_a = COALESCE(excluded.job_site_a, order_state.job_site_a),
                po_number = COALESCE(excluded.po_number, order_state.po_number),
                sales_order_site_b = COALESCE(excluded.sales_order_site_b, order_state.sales_order_site_b),
                shipping_request = COALESCE(excluded.shipping_request, order_state.shipping_request),
                job_site_b = COALESCE(excluded.job_site_b, order_state.job_site_b),
                last_error_summary = excluded.last_error_summary,
                last_api_entity = excluded.last_api_entity,
                last_api_status = excluded.last_api_status,
                last_api_message = excluded.last_api_message,
                last_api_messages = excluded.last_api_messages,
                last_api_raw = excluded.last_api_raw,
                hold_since = CASE
                    WHEN excluded.status = 'HOLD'
                         AND order_state.hold_step = excluded.last_step
                         AND order_state.hold_since IS NOT NULL THEN order_state.hold_since
                    WHEN excluded.status = 'HOLD' THEN excluded.updated_at
                    WHEN excluded.status = 'IN_PROGRESS' THEN order_state.hold_since
                    ELSE NULL
                END,
                last_reminder_sent = CASE
                    WHEN excluded.status = 'HOLD' AND order_state.hold_step = excluded.last_step
                        THEN order_state.last_reminder_sent
                    WHEN excluded.status = 'IN_PROGRESS' THEN order_state.last_reminder_sent
                    ELSE NULL
                END,
                escalated_at = CASE
                    WHEN excluded.status = 'HOLD' AND order_state.hold_step = excluded.last_step
                        THEN order_state.escalated_at
                    WHEN excluded.status = 'IN_PROGRESS' THEN order_state.escalated_at
                    ELSE NULL
                END,
                hold_step = CASE
                    WHEN excluded.status = 'HOLD' THEN excluded.last_step
                    WHEN excluded.status = 'IN_PROGRESS' THEN order_state.hold_step
                    ELSE NULL
                END,
                updated_at = excluded.updated_at
            WHERE order_state.status <> 'REMOVED'
            "#,
        )
        .bind(update.order_id)
        .bind(update.status.as_str())
        .bind(&update.last_step)
        .bind(&update.run_id)
        .bind(&update.ids.base_item_code)
        .bind(&update.ids.job_site_a)
        .bind(update.ids.po_number)
        .bind(update.ids.sales_order_site_b)
        .bind(&update.ids.shipping_request)
        .bind(&update.ids.job_site_b)
        .bind(&update.error_summary)
        .bind(&api.entity)
        .bind(api.status)
        .bind(&api.message)
        .bind(messages)
        .bind(raw)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        debug!(
            order_id = update.order_id,
            status = %update.status,
            step = %update.last_step,
            "Recorded order progress"
        );
        Ok(())
    }

    /// Operator retry: back to NEW with diagnostics, signatures and the hold
    /// clock cleared. Derived identifiers are kept so existence checks still
    /// find the artifacts already created.
    pub async fn reset_order(&self, order_id: i64) -> Result<bool, StoreError> {
        let now = format_timestamp(Utc::now());
        let result = sqlx::query(
            r#"
            UPDATE order_state SET
                status = 'NEW',
                last_step = 'ELIGIBLE',
                last_error_summary = NULL,
                last_api_entity = NULL,
                last_api_status = NULL,
                last_api_message = NULL,
                last_api_messages = NULL,
                last_api_raw = NULL,
                last_failure_signature = NULL,
                last_failure_notified_at = NULL,
                last_substrate_signature = NULL,
                last_substrate_notified_at = NULL,
                hold_since = NULL,
                hold_step = NULL,
                last_reminder_sent = NULL,
                escalated_at = NULL,
                updated_at = ?2
            WHERE order_id = ?1
            "#,
        )
        .bind(order_id)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        info!(order_id, "Order reset for retry");
        Ok(result.rows_affected() > 0)
    }

    /// Operator removal: the order is excluded from all future processing
    pub async fn remove_order(&self, order_id: i64) -> Result<(), StoreError> {
        let now = format_timestamp(Utc::now());
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO order_state (order_id, status, last_step, first_seen_at, updated_at)
            VALUES (?1, 'REMOVED', 'REMOVED_BY_USER', ?2, ?2)
            ON CONFLICT(order_id) DO UPDATE SET
                status = 'REMOVED',
                last_step = 'REMOVED_BY_USER',
                hold_since = NULL,
                hold_step = NULL,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(order_id)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM manual_queue WHERE order_id = ?1")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(order_id, "Order removed by operator");
        Ok(())
    }

    /// Orders in a status, optionally narrowed to a set of steps
    pub async fn orders_in(
        &self,
        status: OrderStatus,
        steps: &[&str],
    ) -> Result<Vec<OrderState>, StoreError> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM order_state WHERE status = ?");
        if !steps.is_empty() {
            let placeholders = vec!["?"; steps.len()].join(", ");
            sql.push_str(&format!(" AND last_step IN ({placeholders})"));
        }
        sql.push_str(" ORDER BY updated_at ASC, order_id ASC");

        let mut query = sqlx::query(&sql).bind(status.as_str());
        for step in steps {
            query = query.bind(*step);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(order_from_row).collect()
    }

    /// COMPLETE orders plus HOLD orders parked at one of `hold_steps`, oldest first
    pub async fn reconciliation_candidates(
        &self,
        hold_steps: &[&str],
        limit: i64,
    ) -> Result<Vec<OrderState>, StoreError> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM order_state WHERE status = 'COMPLETE'");
        if !hold_steps.is_empty() {
            let placeholders = vec!["?"; hold_steps.len()].join(", ");
            sql.push_str(&format!(
                " OR (status = 'HOLD' AND last_step IN ({placeholders}))"
            ));
        }
        sql.push_str(" ORDER BY updated_at ASC, order_id ASC LIMIT ?");

        let mut query = sqlx::query(&sql);
        for step in hold_steps {
            query = query.bind(*step);
        }
        let rows = query.bind(limit).fetch_all(&self.pool).await?;
        rows.iter().map(order_from_row).collect()
    }

    /// Store the last notified signature for an order
    pub async fn set_signature(
        &self,
        order_id: i64,
        slot: SignatureSlot,
        signature: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let sql = match slot {
            SignatureSlot::Failure => {
                "UPDATE order_state SET last_failure_signature = ?2, last_failure_notified_at = ?3 WHERE order_id = ?1"
            }
            SignatureSlot::SubstrateMismatch => {
                "UPDATE order_state SET last_substrate_signature = ?2, last_substrate_notified_at = ?3 WHERE order_id = ?1"
            }
        };
        sqlx::query(sql)
            .bind(order_id)
            .bind(signature)
            .bind(format_timestamp(at))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_reminder_sent(&self, order_id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE order_state SET last_reminder_sent = ?2 WHERE order_id = ?1")
            .bind(order_id)
            .bind(format_timestamp(at))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_escalated(&self, order_id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE order_state SET escalated_at = ?2 WHERE order_id = ?1")
            .bind(order_id)
            .bind(format_timestamp(at))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Move COMPLETE orders last updated before `cutoff` into the archive
    pub async fn archive_completed(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let cutoff = format_timestamp(cutoff);
        let now = format_timestamp(Utc::now());
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO order_state_archive (
                order_id, status, last_step, last_run_id,
                base_item_code, job_site_a, po_number, sales_order_site_b, shipping_request, job_site_b,
                last_error_summary, first_seen_at, updated_at, archived_at
            )
            SELECT
                order_id, status, last_step, last_run_id,
                base_item_code, job_site_a, po_number, sales_order_site_b, shipping_request, job_site_b,
                last_error_summary, first_seen_at, updated_at, ?2
            FROM order_state
            WHERE status = 'COMPLETE' AND updated_at < ?1
            "#,
        )
        .bind(&cutoff)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let deleted = sqlx::query("DELETE FROM order_state WHERE status = 'COMPLETE' AND updated_at < ?1")
            .bind(&cutoff)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let archived = deleted.rows_affected();
        info!(archived, cutoff = %cutoff, "Archived completed orders");
        Ok(archived)
    }
}

fn order_from_row(row: &SqliteRow) -> Result<OrderState, StoreError> {
    let status: String = row.try_get("status")?;
    let messages: Option<String> = row.try_get("last_api_messages")?;
    let messages = messages
        .and_then(|raw| serde_json::from_str::<Vec<String>>(&raw).ok())
        .unwrap_or_default();

    let timestamp = |column: &str| -> Result<Option<DateTime<Utc>>, StoreError> {
        let raw: Option<String> = row.try_get(column)?;
        Ok(raw.as_deref().and_then(parse_timestamp))
    };

    Ok(OrderState {
        order_id: row.try_get("order_id")?,
        status: status.parse()?,
        last_step: row.try_get("last_step")?,
        last_run_id: row.try_get("last_run_id")?,
        ids: DerivedIds {
            base_item_code: row.try_get("base_item_code")?,
            job_site_a: row.try_get("job_site_a")?,
            po_number: row.try_get("po_number")?,
            sales_order_site_b: row.try_get("sales_order_site_b")?,
            shipping_request: row.try_get("shipping_request")?,
            job_site_b: row.try_get("job_site_b")?,
        },
        last_error_summary: row.try_get("last_error_summary")?,
        api: ApiDiagnostics {
            entity: row.try_get("last_api_entity")?,
            status: row.try_get("last_api_status")?,
            message: row.try_get("last_api_message")?,
            messages,
            raw: row.try_get("last_api_raw")?,
        },
        hold_since: timestamp("hold_since")?,
        last_reminder_sent: timestamp("last_reminder_sent")?,
        escalated_at: timestamp("escalated_at")?,
        last_failure_signature: row.try_get("last_failure_signature")?,
        last_substrate_signature: row.try_get("last_substrate_signature")?,
        first_seen_at: timestamp("first_seen_at")?,
        updated_at: timestamp("updated_at")?,
    })
}
