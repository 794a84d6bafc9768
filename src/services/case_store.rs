// src/services/case_store.rs
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use thiserror::Error;

use super::sql_guard::{StatementKind, ValidatedStatement};
use crate::db::DbPool;
use crate::message::CaseRow;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a case titled '{0}' already exists")]
    DuplicateTitle(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct CaseRecord {
    pub id: i64,
    pub title: String,
    pub status: String,
    pub description: Option<String>,
    pub attorney: Option<String>,
    pub created_at: NaiveDateTime,
}

impl CaseRecord {
    pub fn to_row(&self) -> CaseRow {
        match serde_json::to_value(self) {
            Ok(Value::Object(row)) => row,
            _ => CaseRow::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCase {
    pub title: String,
    pub status: String,
    pub description: String,
    pub attorney: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementOutcome {
    Found(Vec<CaseRow>),
    Updated(u64),
    Deleted(u64),
}

#[async_trait]
pub trait CaseStore: Send + Sync {
    async fn find_by_title(&self, title: &str) -> Result<Option<CaseRecord>, StoreError>;

    /// Inserts a case. A title that already exists yields
    /// [`StoreError::DuplicateTitle`].
    async fn create_case(&self, new_case: NewCase) -> Result<CaseRecord, StoreError>;

    async fn run_statement(&self, statement: &ValidatedStatement) -> Result<StatementOutcome, StoreError>;
}

#[derive(Debug, Clone)]
pub struct SqlCaseStore {
    pool: DbPool,
}

impl SqlCaseStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Inserts without consulting existing rows. The `UNIQUE` constraint on
    /// `title` is the authoritative duplicate check.
    pub async fn insert_case(&self, new_case: &NewCase) -> Result<CaseRecord, StoreError> {
        let inserted = sqlx::query_as::<_, CaseRecord>(
            "INSERT INTO Cases (title, status, description, attorney) VALUES (?, ?, ?, ?) \
             RETURNING id, title, status, description, attorney, created_at",
        )
        .bind(&new_case.title)
        .bind(&new_case.status)
        .bind(&new_case.description)
        .bind(&new_case.attorney)
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(record) => Ok(record),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::DuplicateTitle(new_case.title.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CaseStore for SqlCaseStore {
    async fn find_by_title(&self, title: &str) -> Result<Option<CaseRecord>, StoreError> {
        let record = sqlx::query_as::<_, CaseRecord>(
            "SELECT id, title, status, description, attorney, created_at FROM Cases WHERE title = ?",
        )
        .bind(title)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn create_case(&self, new_case: NewCase) -> Result<CaseRecord, StoreError> {
        // Fast path only; insert_case has the final say.
        if self.find_by_title(&new_case.title).await?.is_some() {
            return Err(StoreError::DuplicateTitle(new_case.title));
        }
        self.insert_case(&new_case).await
    }

    async fn run_statement(&self, statement: &ValidatedStatement) -> Result<StatementOutcome, StoreError> {
        match statement.kind() {
            StatementKind::Select => {
                let rows = sqlx::query(statement.sql()).fetch_all(&self.pool).await?;
                let rows = rows.iter().map(row_to_json).collect::<Result<Vec<_>, _>>()?;
                Ok(StatementOutcome::Found(rows))
            }
            StatementKind::Update => {
                let result = sqlx::query(statement.sql()).execute(&self.pool).await?;
                Ok(StatementOutcome::Updated(result.rows_affected()))
            }
            StatementKind::Delete => {
                let result = sqlx::query(statement.sql()).execute(&self.pool).await?;
                Ok(StatementOutcome::Deleted(result.rows_affected()))
            }
        }
    }
}

/// Converts a row of arbitrary shape into JSON using each value's storage class.
fn row_to_json(row: &SqliteRow) -> Result<CaseRow, sqlx::Error> {
    let mut out = CaseRow::new();
    for column in row.columns() {
        let idx = column.ordinal();
        let raw = row.try_get_raw(idx)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" => Value::from(row.try_get_unchecked::<i64, _>(idx)?),
                "REAL" => Value::from(row.try_get_unchecked::<f64, _>(idx)?),
                "BLOB" => {
                    let bytes = row.try_get_unchecked::<Vec<u8>, _>(idx)?;
                    Value::from(String::from_utf8_lossy(&bytes).into_owned())
                }
                _ => {
                    let text = row.try_get_unchecked::<String, _>(idx)?;
                    if column.name().eq_ignore_ascii_case("created_at") {
                        timestamp_value(text)
                    } else {
                        Value::from(text)
                    }
                }
            }
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

/// SQLite stores `CURRENT_TIMESTAMP` as `YYYY-MM-DD HH:MM:SS`; rows leave in
/// the same ISO-8601 form that [`CaseRecord`] serializes to.
fn timestamp_value(text: String) -> Value {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&text, format).ok())
        .and_then(|parsed| serde_json::to_value(parsed).ok())
        .unwrap_or(Value::String(text))
}

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
