//! This module is responsible for reading, writing and managing the SQLite database that holds the
//! posting-date ledger, the fund registry, the reference names and the reloaded statement rows.

mod migrations;
mod table;

pub use table::TableName;

use crate::model::{Cnpj, TransformedRecord};
use crate::Result;
use anyhow::{bail, Context};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

/// The schema version this build of the program expects.
const SCHEMA_VERSION: i32 = 1;

/// Status of a posting date whose position is closed.
const CLOSED_DAY: i64 = 1;

/// Status of an active fund.
const ACTIVE_FUND: i64 = 1;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The number of rows removed and added by a reload of one `(date, entity)` scope.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Replaced {
    pub deleted: u64,
    pub inserted: u64,
}

/// The relational store consumed by the pipeline.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Closed posting dates between `start` and `end`, inclusive, in ascending order.
    async fn list_valid_posting_dates(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<NaiveDate>>;

    /// The registration numbers of the active funds.
    async fn list_entities(&self) -> Result<Vec<Cnpj>>;

    /// The internal reference id registered for a fund's display name, if any.
    async fn resolve_reference(&self, display_name: &str) -> Result<Option<String>>;

    async fn count_rows(&self, table: &TableName, date: &str, entity: &Cnpj) -> Result<u64>;

    async fn delete_rows(&self, table: &TableName, date: &str, entity: &Cnpj) -> Result<u64>;

    async fn insert_rows(&self, table: &TableName, rows: &[TransformedRecord]) -> Result<u64>;

    /// Removes whatever is stored for `(date, entity)` and inserts `rows` in its place. Stores that
    /// support transactions should override this so that the scope is never visibly empty.
    async fn replace_rows(
        &self,
        table: &TableName,
        date: &str,
        entity: &Cnpj,
        rows: &[TransformedRecord],
    ) -> Result<Replaced> {
        let existing = self.count_rows(table, date, entity).await?;
        let deleted = if existing > 0 {
            self.delete_rows(table, date, entity).await?
        } else {
            0
        };
        let inserted = self.insert_rows(table, rows).await?;
        Ok(Replaced { deleted, inserted })
    }
}

/// The SQLite implementation of `Store`.
#[derive(Debug, Clone)]
pub struct Db {
    pool: SqlitePool,
    administrator: Cnpj,
}

impl Db {
    /// - Validates that no file currently exists at `path`
    /// - Creates a new SQLite file at `path`
    /// - Initializes the database schema
    /// - Returns a constructed `Db` object for further operations
    ///
    /// `administrator` scopes reference name lookups to one fund administrator.
    pub(crate) async fn init(path: impl AsRef<Path>, administrator: Cnpj) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            bail!("A database already exists at {}", path.display());
        }
        let pool = connect(path, true).await?;
        bootstrap_schema_version(&pool).await?;
        migrations::run(&pool, 0, SCHEMA_VERSION).await?;
        Ok(Self {
            pool,
            administrator,
        })
    }

    /// - Validates that there is a SQLite file at `path`
    /// - Creates a SQLite client
    /// - Updates the database schema with migrations if it is out-of-date
    /// - Returns a constructed `Db` object for further operations
    pub(crate) async fn load(path: impl AsRef<Path>, administrator: Cnpj) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            bail!("The database file is missing '{}'", path.display());
        }
        let pool = connect(path, false).await?;
        let current = schema_version(&pool).await?;
        if current > SCHEMA_VERSION {
            bail!(
                "The database schema version {current} is newer than this program supports \
                ({SCHEMA_VERSION})"
            );
        }
        migrations::run(&pool, current, SCHEMA_VERSION).await?;
        Ok(Self {
            pool,
            administrator,
        })
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl Store for Db {
    async fn list_valid_posting_dates(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<NaiveDate>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT position_date FROM posting_dates \
             WHERE datetime(position_date) >= datetime(?) \
             AND datetime(position_date) <= datetime(?) \
             AND status_id = ? \
             ORDER BY position_date",
        )
        .bind(start.format(DATETIME_FORMAT).to_string())
        .bind(end.format(DATETIME_FORMAT).to_string())
        .bind(CLOSED_DAY)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query the posting dates")?;

        let mut dates = Vec::with_capacity(rows.len());
        for (raw,) in rows {
            let day = raw.get(..10).unwrap_or(raw.as_str());
            let date = NaiveDate::parse_from_str(day, "%Y-%m-%d")
                .with_context(|| format!("Invalid posting date '{raw}' in the ledger"))?;
            dates.push(date);
        }
        Ok(dates)
    }

    async fn list_entities(&self) -> Result<Vec<Cnpj>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT cnpj FROM funds WHERE status_id = ? ORDER BY cnpj")
                .bind(ACTIVE_FUND)
                .fetch_all(&self.pool)
                .await
                .context("Failed to query the active funds")?;

        let mut entities = Vec::with_capacity(rows.len());
        for (raw,) in rows {
            match Cnpj::from_str(&raw) {
                Ok(cnpj) => {
                    debug!("Found fund {cnpj}");
                    entities.push(cnpj);
                }
                Err(e) => warn!("Ignoring fund with an invalid registration number: {e}"),
            }
        }
        Ok(entities)
    }

    async fn resolve_reference(&self, display_name: &str) -> Result<Option<String>> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT reference_id FROM quota_names \
             WHERE name = ? AND administrator_cnpj = ? \
             ORDER BY rowid LIMIT 1",
        )
        .bind(display_name)
        .bind(self.administrator.digits())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to look up the reference id of '{display_name}'"))?;
        Ok(row.map(|(id,)| id.to_string()))
    }

    async fn count_rows(&self, table: &TableName, date: &str, entity: &Cnpj) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        count_rows(&mut *conn, table, date, entity).await
    }

    async fn delete_rows(&self, table: &TableName, date: &str, entity: &Cnpj) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        delete_rows(&mut *conn, table, date, entity).await
    }

    async fn insert_rows(&self, table: &TableName, rows: &[TransformedRecord]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let inserted = insert_rows(&mut *tx, table, rows).await?;
        tx.commit()
            .await
            .context("Failed to commit the inserted rows")?;
        Ok(inserted)
    }

    async fn replace_rows(
        &self,
        table: &TableName,
        date: &str,
        entity: &Cnpj,
        rows: &[TransformedRecord],
    ) -> Result<Replaced> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin the reload transaction")?;

        let existing = count_rows(&mut *tx, table, date, entity).await?;
        let deleted = if existing > 0 {
            delete_rows(&mut *tx, table, date, entity).await?
        } else {
            0
        };
        let inserted = insert_rows(&mut *tx, table, rows).await?;

        tx.commit()
            .await
            .context("Failed to commit the reload transaction")?;
        Ok(Replaced { deleted, inserted })
    }
}

async fn connect(path: &Path, create: bool) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
        .context("Failed to parse SQLite connection string")?
        .create_if_missing(create);

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open the SQLite database at {}", path.display()))
}

async fn bootstrap_schema_version(pool: &SqlitePool) -> Result<()> {
    sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
        .execute(pool)
        .await
        .context("Failed to create schema_version table")?;

    sqlx::query("INSERT INTO schema_version (version) VALUES (0)")
        .execute(pool)
        .await
        .context("Failed to insert initial schema version")?;
    Ok(())
}

async fn schema_version(pool: &SqlitePool) -> Result<i32> {
    let row: (Option<i32>,) = sqlx::query_as("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await
        .context("Failed to query schema version")?;
    Ok(row.0.unwrap_or(0))
}

async fn count_rows(
    conn: &mut SqliteConnection,
    table: &TableName,
    date: &str,
    entity: &Cnpj,
) -> Result<u64> {
    let sql = format!("SELECT COUNT(*) FROM {table} WHERE position_date = ? AND entity_id = ?");
    let row: (i64,) = sqlx::query_as(&sql)
        .bind(date)
        .bind(entity.digits())
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("Failed to count rows in {table} for {entity} on {date}"))?;
    Ok(u64::try_from(row.0).unwrap_or(0))
}

async fn delete_rows(
    conn: &mut SqliteConnection,
    table: &TableName,
    date: &str,
    entity: &Cnpj,
) -> Result<u64> {
    let sql = format!("DELETE FROM {table} WHERE position_date = ? AND entity_id = ?");
    let result = sqlx::query(&sql)
        .bind(date)
        .bind(entity.digits())
        .execute(&mut *conn)
        .await
        .with_context(|| format!("Failed to delete rows in {table} for {entity} on {date}"))?;
    Ok(result.rows_affected())
}

async fn insert_rows(
    conn: &mut SqliteConnection,
    table: &TableName,
    rows: &[TransformedRecord],
) -> Result<u64> {
    let sql = format!(
        "INSERT INTO {table} (position_date, entity_id, entry_text, total_value, polarity, memo, \
         reference_id, transaction_tag) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
    );
    let mut inserted = 0;
    for row in rows {
        let result = sqlx::query(&sql)
            .bind(&row.position_date)
            .bind(row.entity.digits())
            .bind(&row.entry_text)
            .bind(row.total_value.map(|v| v.to_string()))
            .bind(row.polarity.to_string())
            .bind(&row.memo)
            .bind(row.reference_id)
            .bind(&row.transaction_tag)
            .execute(&mut *conn)
            .await
            .with_context(|| format!("Failed to insert a row into {table}"))?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}
