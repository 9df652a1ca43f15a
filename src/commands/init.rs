use crate::commands::Out;
use crate::db::TableName;
use crate::model::Cnpj;
use crate::{Config, Result};
use anyhow::Context;
use std::path::Path;

/// Creates the home directory and:
/// - Writes an initial `config.json` with the API endpoints, the administrator and the target
///   table
/// - Creates the SQLite ledger at its current schema version
///
/// # Arguments
/// - `home` - The directory that will be the root of the home directory, e.g.
///   `$HOME/statement-etl`
/// - `auth_url` - The endpoint that exchanges the API token and login for a bearer credential
/// - `graphql_url` - The GraphQL endpoint that serves cash statements
/// - `administrator` - The fund administrator whose reference names are used
/// - `target_table` - The table that statement rows are reloaded into
///
/// # Errors
/// - Returns an error if the home directory is already initialized or any file operation fails.
pub async fn init(
    home: &Path,
    auth_url: &str,
    graphql_url: &str,
    administrator: Cnpj,
    target_table: TableName,
) -> Result<Out<()>> {
    let config = Config::create(home, auth_url, graphql_url, administrator, target_table)
        .await
        .context("Unable to create the home directory and config")?;
    Ok(format!(
        "Successfully created the statement-etl home directory at {}",
        config.root().display()
    )
    .into())
}
