use async_trait::async_trait;
use chrono::NaiveDate;
#[cfg(any(test, feature = "testing"))]
use mockall::automock;
use serde_json::{Number, Value};
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::AnyPool;
use sqlx::{Column, Row as _};
use tracing::debug;

use super::errors::GatewayError;
use super::rows::Row;

/// A bound query parameter
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        SqlParam::Int(value)
    }
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        SqlParam::Text(value.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        SqlParam::Text(value)
    }
}

impl From<NaiveDate> for SqlParam {
    fn from(value: NaiveDate) -> Self {
        SqlParam::Date(value)
    }
}

/// Executes named SQL against one of the remote databases.
///
/// The name identifies the query in logs and lets test doubles answer by name.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn fetch(&self, name: &str, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>, GatewayError>;

    async fn execute(&self, name: &str, sql: &str, params: &[SqlParam]) -> Result<u64, GatewayError>;
}

/// Placeholder dialect of the target database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placeholders {
    Question,
    Dollar,
}

impl Placeholders {
    fn for_url(url: &str) -> Self {
        if url.starts_with("postgres:") || url.starts_with("postgresql:") {
            Placeholders::Dollar
        } else {
            Placeholders::Question
        }
    }

    /// Rewrite `?` markers outside string literals into `$n`
    fn rewrite(&self, sql: &str) -> String {
        if *self == Placeholders::Question {
            return sql.to_string();
        }
        let mut out = String::with_capacity(sql.len() + 8);
        let mut index = 0;
        let mut in_literal = false;
        for c in sql.chars() {
            match c {
                '\'' => {
                    in_literal = !in_literal;
                    out.push(c);
                }
                '?' if !in_literal => {
                    index += 1;
                    out.push('$');
                    out.push_str(&index.to_string());
                }
                _ => out.push(c),
            }
        }
        out
    }
}

/// sqlx-backed executor for the remote order database
pub struct AnyQueryExecutor {
    pool: AnyPool,
    placeholders: Placeholders,
}

impl AnyQueryExecutor {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, GatewayError> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(url)
            .await
            .map_err(|e| GatewayError::from_sqlx("connect", e))?;

        Ok(Self {
            pool,
            placeholders: Placeholders::for_url(url),
        })
    }
}

fn bind_all<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Any, sqlx::any::AnyArguments<'q>>,
    params: &[SqlParam],
) -> sqlx::query::Query<'q, sqlx::Any, sqlx::any::AnyArguments<'q>> {
    for param in params {
        query = match param {
            SqlParam::Int(v) => query.bind(*v),
            SqlParam::Float(v) => query.bind(*v),
            SqlParam::Text(v) => query.bind(v.clone()),
            SqlParam::Date(v) => query.bind(v.format("%Y-%m-%d").to_string()),
        };
    }
    query
}

fn row_from_any(row: &AnyRow) -> Row {
    let pairs = row.columns().iter().map(|column| {
        let i = column.ordinal();
        let value = if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
            v.map(Value::from)
        } else if let Ok(v) = row.try_get::<Option<f64>, _>(i) {
            v.and_then(Number::from_f64).map(Value::Number)
        } else if let Ok(v) = row.try_get::<Option<String>, _>(i) {
            v.map(Value::String)
        } else if let Ok(v) = row.try_get::<Option<bool>, _>(i) {
            v.map(Value::Bool)
        } else {
            None
        };
        (column.name().to_string(), value.unwrap_or(Value::Null))
    });
    Row::from_pairs(pairs)
}

#[async_trait]
impl QueryExecutor for AnyQueryExecutor {
    async fn fetch(&self, name: &str, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>, GatewayError> {
        let sql = self.placeholders.rewrite(sql);
        debug!(query = name, params = params.len(), "Running remote query");
        let rows = bind_all(sqlx::query(&sql), params)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| GatewayError::from_sqlx(name, e))?;
        Ok(rows.iter().map(row_from_any).collect())
    }

    async fn execute(&self, name: &str, sql: &str, params: &[SqlParam]) -> Result<u64, GatewayError> {
        let sql = self.placeholders.rewrite(sql);
        debug!(query = name, params = params.len(), "Running remote statement");
        let result = bind_all(sqlx::query(&sql), params)
            .execute(&self.pool)
            .await
            .map_err(|e| GatewayError::from_sqlx(name, e))?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postgres_urls_get_numbered_placeholders() {
        let style = Placeholders::for_url("postgres://radius@db/radius");
        assert_eq!(
            style.rewrite("SELECT 1 FROM t WHERE a = ? AND b = '?' AND c = ?"),
            "SELECT 1 FROM t WHERE a = $1 AND b = '?' AND c = $2"
        );
    }

    #[test]
    fn other_urls_keep_question_marks() {
        let style = Placeholders::for_url("sqlite::memory:");
        assert_eq!(style.rewrite("SELECT ? "), "SELECT ? ");
    }

    #[tokio::test]
    async fn sqlite_round_trip_through_any_driver() {
        let executor = AnyQueryExecutor::connect("sqlite::memory:", 1).await.unwrap();
        executor
            .execute("create", "CREATE TABLE items (code TEXT, status TEXT, qty REAL, n INTEGER)", &[])
            .await
            .unwrap();
        executor
            .execute(
                "insert",
                "INSERT INTO items VALUES (?, ?, ?, ?)",
                &[SqlParam::from("16P4-ABC"), SqlParam::from("APP"), SqlParam::Float(2.5), SqlParam::Int(3)],
            )
            .await
            .unwrap();

        let rows = executor
            .fetch("items", "SELECT code AS ItemCode, status, qty, n FROM items WHERE code = ?", &[SqlParam::from("16P4-ABC")])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text("itemcode").as_deref(), Some("16P4-ABC"));
        assert_eq!(rows[0].float("qty"), Some(2.5));
        assert_eq!(rows[0].int("n"), Some(3));
    }
}
