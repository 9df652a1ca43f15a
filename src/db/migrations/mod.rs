//! Versioned schema migrations for the ledger database.
//!
//! Each migration is a pair of SQL files in this directory:
//! - `migration_NN_up.sql` moves the schema from version `NN-1` to `NN`
//! - `migration_NN_down.sql` moves it back from `NN` to `NN-1`
//!
//! The current version is held in the single-row `schema_version` table.

use anyhow::{bail, Context};
use sqlx::{Executor, SqlitePool};
use tracing::debug;

use crate::Result;

struct Migration {
    /// The version the schema is at after `up_sql` runs.
    version: i32,
    up_sql: &'static str,
    down_sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    up_sql: include_str!("migration_01_up.sql"),
    down_sql: include_str!("migration_01_down.sql"),
}];

/// One SQL script to run and the version it leaves the schema at.
struct Step {
    sql: &'static str,
    version: i32,
}

/// Moves the schema from `current_ver` to `target_ver`, running up or down migrations in order.
/// Every step runs in its own transaction together with its `schema_version` update. Nothing runs
/// unless every migration on the path exists.
pub(crate) async fn run(pool: &SqlitePool, current_ver: i32, target_ver: i32) -> Result<()> {
    if current_ver == target_ver {
        debug!("Database already at target version {target_ver}, no migrations needed");
        return Ok(());
    }
    validate_migrations(current_ver, target_ver)?;

    for step in steps(current_ver, target_ver)? {
        debug!("Migrating the schema to version {:02}", step.version);
        run_step(pool, &step).await?;
    }

    debug!("Migration complete, schema now at version {target_ver}");
    Ok(())
}

fn find(version: i32) -> Result<&'static Migration> {
    MIGRATIONS
        .iter()
        .find(|m| m.version == version)
        .with_context(|| format!("Migration {version} not found"))
}

fn steps(current_ver: i32, target_ver: i32) -> Result<Vec<Step>> {
    if current_ver < target_ver {
        ((current_ver + 1)..=target_ver)
            .map(|v| {
                find(v).map(|m| Step {
                    sql: m.up_sql,
                    version: v,
                })
            })
            .collect()
    } else {
        ((target_ver + 1)..=current_ver)
            .rev()
            .map(|v| {
                find(v).map(|m| Step {
                    sql: m.down_sql,
                    version: v - 1,
                })
            })
            .collect()
    }
}

async fn run_step(pool: &SqlitePool, step: &Step) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .context("Failed to begin migration transaction")?;

    // The scripts hold several statements, so they go through the raw executor.
    tx.execute(step.sql)
        .await
        .context("Failed to execute migration SQL")?;

    sqlx::query("DELETE FROM schema_version")
        .execute(&mut *tx)
        .await
        .context("Failed to clear schema_version")?;

    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(step.version)
        .execute(&mut *tx)
        .await
        .context("Failed to update schema_version")?;

    tx.commit()
        .await
        .context("Failed to commit migration transaction")
}

/// Fails if any migration between `current_version` and `target_version` is missing.
fn validate_migrations(current_version: i32, target_version: i32) -> Result<()> {
    let (start, end) = if current_version < target_version {
        (current_version + 1, target_version)
    } else {
        (target_version + 1, current_version)
    };

    if let Some(missing) = (start..=end).find(|v| !MIGRATIONS.iter().any(|m| m.version == *v)) {
        bail!(
            "Migration {missing} is missing but required to migrate from version \
            {current_version} to {target_version}"
        );
    }
    Ok(())
}
