//! SQLite-backed message mirror.
//!
//! Every successfully published message can be appended to a local table so
//! the HTTP face can page through recent traffic. The pool is capped at one
//! connection, which keeps SQLite to a single writer.
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    FromRow, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

use crate::{
    config::{models::SqliteConfig, validation::is_sql_identifier},
    core::model::{MirrorRecord, NewMirrorRecord},
    ports::mirror::{MessageMirror, MirrorError, MirrorResult},
};

pub struct SqliteMirror {
    pool: SqlitePool,
    table_name: String,
}

#[derive(Debug, FromRow)]
struct MirrorRow {
    id: i64,
    topic: String,
    message_key: Option<Vec<u8>>,
    message_value: Vec<u8>,
    partition: i64,
    offset: i64,
    timestamp: String,
}

impl SqliteMirror {
    /// Open (creating if needed) the database file and its schema.
    pub async fn open(config: &SqliteConfig) -> MirrorResult<Self> {
        if !is_sql_identifier(&config.table_name) {
            return Err(MirrorError::InvalidConfig(format!(
                "invalid table name '{}'",
                config.table_name
            )));
        }

        if let Some(dir) = Path::new(&config.db_path).parent()
            && !dir.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                MirrorError::Storage(format!(
                    "failed to create database directory '{}': {e}",
                    dir.display()
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(storage_error)?;

        let mirror = Self {
            pool,
            table_name: config.table_name.clone(),
        };
        if let Err(e) = mirror.init_schema().await {
            mirror.pool.close().await;
            return Err(e);
        }

        tracing::info!(
            db_path = %config.db_path,
            table = %config.table_name,
            "SQLite mirror opened"
        );
        Ok(mirror)
    }

    async fn init_schema(&self) -> MirrorResult<()> {
        let table = &self.table_name;
        let statements = [
            format!(
                r#"CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    topic TEXT NOT NULL,
                    message_key BLOB,
                    message_value BLOB NOT NULL,
                    "partition" INTEGER NOT NULL,
                    "offset" INTEGER NOT NULL,
                    timestamp TEXT NOT NULL,
                    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
                )"#
            ),
            format!("CREATE INDEX IF NOT EXISTS idx_{table}_topic ON {table} (topic)"),
            format!("CREATE INDEX IF NOT EXISTS idx_{table}_timestamp ON {table} (timestamp)"),
        ];

        for statement in &statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(storage_error)?;
        }
        Ok(())
    }

    fn ensure_open(&self) -> MirrorResult<()> {
        if self.pool.is_closed() {
            return Err(MirrorError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl MessageMirror for SqliteMirror {
    async fn save(&self, record: NewMirrorRecord) -> MirrorResult<()> {
        self.ensure_open()?;
        let query = format!(
            r#"INSERT INTO {} (topic, message_key, message_value, "partition", "offset", timestamp)
               VALUES (?, ?, ?, ?, ?, ?)"#,
            self.table_name
        );

        sqlx::query(&query)
            .bind(record.topic.as_str())
            .bind(record.key.as_deref())
            .bind(record.value.as_slice())
            .bind(record.partition)
            .bind(record.offset)
            .bind(format_timestamp(Utc::now()))
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        tracing::debug!(
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            "Message mirrored"
        );
        Ok(())
    }

    async fn query_by_topic(
        &self,
        topic: &str,
        limit: u32,
        offset: u64,
    ) -> MirrorResult<Vec<MirrorRecord>> {
        self.ensure_open()?;
        let query = format!(
            r#"SELECT id, topic, message_key, message_value, "partition", "offset", timestamp
               FROM {}
               WHERE topic = ?
               ORDER BY timestamp DESC, id DESC
               LIMIT ? OFFSET ?"#,
            self.table_name
        );

        let rows = sqlx::query_as::<_, MirrorRow>(&query)
            .bind(topic)
            .bind(i64::from(limit))
            .bind(i64::try_from(offset).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        rows.into_iter().map(MirrorRecord::try_from).collect()
    }

    async fn count(&self) -> MirrorResult<u64> {
        self.ensure_open()?;
        let query = format!("SELECT COUNT(*) FROM {}", self.table_name);
        let count = sqlx::query_scalar::<_, i64>(&query)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(count.max(0) as u64)
    }

    async fn count_by_topic(&self, topic: &str) -> MirrorResult<u64> {
        self.ensure_open()?;
        let query = format!("SELECT COUNT(*) FROM {} WHERE topic = ?", self.table_name);
        let count = sqlx::query_scalar::<_, i64>(&query)
            .bind(topic)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(count.max(0) as u64)
    }

    async fn close(&self) -> MirrorResult<()> {
        if !self.pool.is_closed() {
            self.pool.close().await;
            tracing::info!("SQLite mirror closed");
        }
        Ok(())
    }
}

impl TryFrom<MirrorRow> for MirrorRecord {
    type Error = MirrorError;

    fn try_from(row: MirrorRow) -> Result<Self, Self::Error> {
        let timestamp = DateTime::parse_from_rfc3339(&row.timestamp)
            .map_err(|e| MirrorError::Storage(format!("corrupt timestamp '{}': {e}", row.timestamp)))?
            .with_timezone(&Utc);
        let partition = i32::try_from(row.partition)
            .map_err(|_| MirrorError::Storage(format!("corrupt partition {}", row.partition)))?;

        Ok(MirrorRecord {
            id: row.id,
            topic: row.topic,
            key: row.message_key,
            value: row.message_value,
            partition,
            offset: row.offset,
            timestamp,
        })
    }
}

/// Fixed-width UTC timestamp, so text order equals time order.
fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn storage_error(error: sqlx::Error) -> MirrorError {
    match error {
        sqlx::Error::PoolClosed => MirrorError::Closed,
        other => MirrorError::Storage(other.to_string()),
    }
}
