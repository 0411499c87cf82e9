use crate::error::{is_unique_violation, map_sqlx_error};
use async_trait::async_trait;
use snip_core::error::{Result, StorageError};
use snip_core::repository::{ReadRepository, Repository, StatRecord, UrlRecord};
use snip_core::shortcode::ShortCode;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Connection, QueryBuilder, Row, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS shortener (
        shortURL VARCHAR(50) UNIQUE NOT NULL,
        LongURL VARCHAR(1000) NOT NULL,
        userID VARCHAR(50) NOT NULL,
        deleted BOOLEAN NOT NULL
    )
"#;

const CREATE_INDEX: &str = "CREATE INDEX IF NOT EXISTS long_url_idx ON shortener (LongURL)";

/// Codes bound per `UPDATE`, well under SQLite's host parameter limit.
const DELETE_CHUNK_SIZE: usize = 1000;

const INSERT_URL: &str = r#"
    INSERT INTO shortener (shortURL, LongURL, userID, deleted)
    VALUES (?, ?, ?, ?)
"#;

/// Connection settings for [`SqliteRepository::connect`].
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
pub struct SqliteSettings {
    /// A sqlx SQLite URL, e.g. `sqlite://snip.db` or `sqlite::memory:`.
    #[builder(setter(into))]
    pub database_url: String,
    /// Upper bound on pooled connections. In-memory databases always use one.
    #[builder(default = 5)]
    pub max_connections: u32,
}

/// SQLite implementation of the repository contract.
///
/// Soft delete is the `deleted` column. Reads of a deleted code fail with
/// `Gone`; listings and stats only see live rows. A code is never reused,
/// deleted or not, since `shortURL` stays unique.
#[derive(Debug, Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Wraps an existing pool, creating the schema if it is missing.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        create_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Opens a pool for `settings.database_url` and prepares the schema.
    ///
    /// Database files are created when they don't exist yet.
    pub async fn connect(settings: &SqliteSettings) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&settings.database_url)
            .map_err(map_sqlx_error)?
            .create_if_missing(true);

        // An in-memory database lives as long as its connection does.
        let pool_options = if settings.database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(settings.max_connections)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(map_sqlx_error)?;

        Self::new(pool).await
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn create_schema(pool: &SqlitePool) -> Result<()> {
    // Dropping the transaction on an early return rolls the schema back.
    let mut tx = pool.begin().await.map_err(map_sqlx_error)?;

    sqlx::query(CREATE_TABLE)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
    sqlx::query(CREATE_INDEX)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

    tx.commit().await.map_err(map_sqlx_error)?;
    info!("sqlite schema ready");
    Ok(())
}

fn map_insert_error(err: sqlx::Error, code: &ShortCode) -> StorageError {
    if is_unique_violation(&err) {
        StorageError::Conflict(code.to_string())
    } else {
        map_sqlx_error(err)
    }
}

fn row_to_record(row: &SqliteRow) -> Result<UrlRecord> {
    let code: String = row.try_get("shortURL").map_err(map_sqlx_error)?;
    let original_url: String = row.try_get("LongURL").map_err(map_sqlx_error)?;
    let owner_id: String = row.try_get("userID").map_err(map_sqlx_error)?;
    let deleted: bool = row.try_get("deleted").map_err(map_sqlx_error)?;

    Ok(UrlRecord {
        code: ShortCode::new_unchecked(code),
        original_url,
        owner_id,
        deleted,
    })
}

fn count(row: &SqliteRow, column: &str) -> Result<u64> {
    let value: i64 = row.try_get(column).map_err(map_sqlx_error)?;
    u64::try_from(value)
        .map_err(|_| StorageError::InvalidData(format!("negative {column} count: {value}")))
}

#[async_trait]
impl ReadRepository for SqliteRepository {
    async fn get(&self, code: &ShortCode) -> Result<String> {
        let row = sqlx::query(
            r#"
            SELECT LongURL, deleted
            FROM shortener
            WHERE shortURL = ?
            LIMIT 1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Err(StorageError::NotFound(code.to_string()));
        };

        let deleted: bool = row.try_get("deleted").map_err(map_sqlx_error)?;
        if deleted {
            return Err(StorageError::Gone(code.to_string()));
        }

        row.try_get("LongURL").map_err(map_sqlx_error)
    }

    async fn lookup(&self, code: &ShortCode) -> Result<Option<UrlRecord>> {
        let row = sqlx::query(
            r#"
            SELECT shortURL, LongURL, userID, deleted
            FROM shortener
            WHERE shortURL = ?
            LIMIT 1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<UrlRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT shortURL, LongURL, userID, deleted
            FROM shortener
            WHERE userID = ?
              AND deleted = ?
            ORDER BY rowid
            "#,
        )
        .bind(owner_id)
        .bind(false)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(row_to_record).collect()
    }

    async fn stats(&self) -> Result<StatRecord> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(DISTINCT shortURL) AS urls, COUNT(DISTINCT userID) AS users
            FROM shortener
            WHERE deleted = ?
            "#,
        )
        .bind(false)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(StatRecord {
            urls: count(&row, "urls")?,
            users: count(&row, "users")?,
        })
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn create(&self, record: UrlRecord) -> Result<()> {
        sqlx::query(INSERT_URL)
            .bind(record.code.as_str())
            .bind(record.original_url.as_str())
            .bind(record.owner_id.as_str())
            .bind(false)
            .execute(&self.pool)
            .await
            .map_err(|err| map_insert_error(err, &record.code))?;

        Ok(())
    }

    async fn create_batch(&self, records: Vec<UrlRecord>) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for record in &records {
            let inserted = sqlx::query(INSERT_URL)
                .bind(record.code.as_str())
                .bind(record.original_url.as_str())
                .bind(record.owner_id.as_str())
                .bind(false)
                .execute(&mut *tx)
                .await;

            if let Err(err) = inserted {
                warn!(code = %record.code, error = %err, "rolling back url batch");
                tx.rollback().await.map_err(map_sqlx_error)?;
                return Err(map_insert_error(err, &record.code));
            }
        }

        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn delete_urls(&self, codes: &[ShortCode], owner_id: &str) -> Result<()> {
        if codes.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let mut deleted = 0;

        for chunk in codes.chunks(DELETE_CHUNK_SIZE) {
            let mut builder = QueryBuilder::<Sqlite>::new("UPDATE shortener SET deleted = ");
            builder
                .push_bind(true)
                .push(" WHERE userID = ")
                .push_bind(owner_id)
                .push(" AND shortURL IN (");
            let mut separated = builder.separated(", ");
            for code in chunk {
                separated.push_bind(code.as_str());
            }
            separated.push_unseparated(")");

            let result = builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
            deleted += result.rows_affected();
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        debug!(
            owner = owner_id,
            requested = codes.len(),
            deleted,
            "soft-deleted urls"
        );
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        conn.ping().await.map_err(map_sqlx_error)
    }

    async fn close(&self) -> Result<()> {
        if self.pool.is_closed() {
            return Err(StorageError::Closed);
        }
        self.pool.close().await;
        Ok(())
    }
}
