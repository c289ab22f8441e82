use async_trait::async_trait;
use jiff::Timestamp;
use snip_core::{
    require_url, Backend, BatchCollector, BatchEntry, BatchReport, Result, SaveOutcome,
    ShortCode, Storage, StorageError, UserUrl, MAX_GENERATE_ATTEMPTS,
};
use snip_generator::Generator;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Connection, PgConnection, PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

/// Schema applied by [`PostgresStorage::migrate`].
pub const SCHEMA: &str = include_str!("../ddl/postgres/short_urls.sql");

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// PostgreSQL implementation of the storage contract.
///
/// Uniqueness of codes and of `(original_url, user_id)` pairs is enforced by
/// table constraints. Inserts use `ON CONFLICT DO NOTHING`, so a lost race on
/// either constraint never aborts the surrounding transaction: when no row
/// comes back, an existing row for the pair means the URL is already stored,
/// otherwise the generated code was taken and a new one is tried.
#[derive(Debug, Clone)]
pub struct PostgresStorage<G> {
    pool: PgPool,
    generator: G,
}

impl<G: Generator> PostgresStorage<G> {
    /// Creates a storage from an existing connection pool.
    pub fn new(pool: PgPool, generator: G) -> Self {
        Self { pool, generator }
    }

    /// Opens a new connection pool and applies the schema.
    pub async fn connect(database_dsn: &str, generator: G) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .acquire_timeout(DEFAULT_ACQUIRE_TIMEOUT)
            .connect(database_dsn)
            .await
            .map_err(map_sqlx_error)?;

        let storage = Self::new(pool, generator);
        storage.migrate().await?;
        Ok(storage)
    }

    /// Creates the table and indexes if they do not exist yet.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn save_on(&self, conn: &mut PgConnection, url: &str, owner_id: &str) -> Result<SaveOutcome> {
        require_url(url)?;

        for _ in 0..MAX_GENERATE_ATTEMPTS {
            let code = self.generator.generate(url);

            let inserted: Option<String> = sqlx::query_scalar(
                r#"
                INSERT INTO short_urls (uuid, short_code, original_url, user_id, created_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT DO NOTHING
                RETURNING short_code
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(code.as_str())
            .bind(url)
            .bind(owner_id)
            .bind(Timestamp::now().as_second())
            .fetch_optional(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;

            if let Some(short_code) = inserted {
                return Ok(SaveOutcome::Created(ShortCode::new_unchecked(short_code)));
            }

            let existing: Option<String> = sqlx::query_scalar(
                r#"
                SELECT short_code
                FROM short_urls
                WHERE original_url = $1
                  AND user_id = $2
                "#,
            )
            .bind(url)
            .bind(owner_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;

            if let Some(short_code) = existing {
                return Ok(SaveOutcome::Existing(ShortCode::new_unchecked(short_code)));
            }
        }

        Err(StorageError::CollisionExhausted {
            attempts: MAX_GENERATE_ATTEMPTS,
        })
    }
}

/// SQLSTATE class 08 (connection exception) and the 57P0x shutdown codes.
fn is_connection_sqlstate(code: &str) -> bool {
    code.starts_with("08") || matches!(code, "57P01" | "57P02" | "57P03")
}

fn is_connection_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => true,
        sqlx::Error::Database(db) => db.code().is_some_and(|code| is_connection_sqlstate(&code)),
        _ => false,
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    if is_connection_error(&err) {
        return StorageError::ConnectionFailed(message);
    }

    match err {
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

#[async_trait]
impl<G: Generator> Storage for PostgresStorage<G> {
    async fn save_url(&self, url: &str, owner_id: &str) -> Result<SaveOutcome> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        self.save_on(&mut conn, url, owner_id).await
    }

    async fn save_batch_url(
        &self,
        base_url: &str,
        entries: &[BatchEntry],
        owner_id: &str,
    ) -> Result<BatchReport> {
        let mut batch = BatchCollector::new(base_url, entries.len());
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for entry in entries {
            if !batch.claim(entry) {
                continue;
            }

            // One savepoint per entry: a failing entry rolls back alone.
            let mut savepoint = Connection::begin(&mut *tx).await.map_err(map_sqlx_error)?;
            match self.save_on(&mut savepoint, &entry.original_url, owner_id).await {
                Ok(outcome) => {
                    savepoint.commit().await.map_err(map_sqlx_error)?;
                    batch.succeed(entry.correlation_id.as_str(), &outcome);
                }
                Err(err) if err.is_connection_failure() => return Err(err),
                Err(err) => {
                    savepoint.rollback().await.map_err(map_sqlx_error)?;
                    batch.fail(entry.correlation_id.as_str(), err);
                }
            }
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(batch.finish())
    }

    async fn get_url(&self, code: &ShortCode) -> Result<String> {
        let url: Option<String> = sqlx::query_scalar(
            r#"
            SELECT original_url
            FROM short_urls
            WHERE short_code = $1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        url.ok_or_else(|| StorageError::NotFound(code.to_string()))
    }

    async fn get_user_urls(&self, base_url: &str, owner_id: &str) -> Result<Vec<UserUrl>> {
        if owner_id.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT short_code, original_url
            FROM short_urls
            WHERE user_id = $1
            ORDER BY created_at, short_code
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| {
                let short_code: String = row.try_get("short_code").map_err(map_sqlx_error)?;
                let original_url: String = row.try_get("original_url").map_err(map_sqlx_error)?;
                Ok(UserUrl {
                    short_url: ShortCode::new_unchecked(short_code).to_url(base_url),
                    original_url,
                })
            })
            .collect()
    }

    async fn check_connect(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }

    fn backend(&self) -> Backend {
        Backend::Postgres
    }
}
