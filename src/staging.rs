//! The staging area: one retrieved statement document per fund, kept on disk while a single
//! posting date is processed.

use crate::model::Cnpj;
use crate::{utils, Result};
use anyhow::Context;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

const PREFIX: &str = "extrato_";
const EXTENSION: &str = ".json";

/// A directory of staged statement documents named `extrato_<digits>.json`.
#[derive(Debug, Clone)]
pub struct Staging {
    dir: PathBuf,
}

impl Staging {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The file that holds `entity`'s document.
    pub fn path(&self, entity: &Cnpj) -> PathBuf {
        self.dir
            .join(format!("{PREFIX}{}{EXTENSION}", entity.digits()))
    }

    /// Removes every file in the staging directory, creating the directory if it is missing.
    pub async fn clear(&self) -> Result<()> {
        utils::make_dir(&self.dir).await?;
        let mut dir = utils::read_dir(&self.dir).await?;
        while let Some(entry) = dir
            .next_entry()
            .await
            .context("Failed to read directory entry")?
        {
            let file_type = entry
                .file_type()
                .await
                .context("Failed to read the type of a staged entry")?;
            if file_type.is_file() {
                utils::remove(entry.path()).await?;
            }
        }
        Ok(())
    }

    /// Stages `document` for `entity`, replacing whatever was staged for it before.
    pub async fn write(&self, entity: &Cnpj, document: &Value) -> Result<PathBuf> {
        let path = self.path(entity);
        let json = serde_json::to_string_pretty(document)
            .context("Failed to serialize the statement document")?;
        utils::write(&path, json).await?;
        debug!("Staged the statement of {entity} at {}", path.display());
        Ok(path)
    }

    /// Reads back every staged document, keyed by the fund named in its file name. Files that are
    /// not named like staged documents or that do not hold JSON are logged and skipped.
    pub async fn read_all(&self) -> Result<BTreeMap<Cnpj, Value>> {
        let mut documents = BTreeMap::new();
        let mut dir = utils::read_dir(&self.dir).await?;
        while let Some(entry) = dir
            .next_entry()
            .await
            .context("Failed to read directory entry")?
        {
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            let Some(entity) = parse_file_name(&name) else {
                debug!("Ignoring '{name}' in the staging directory");
                continue;
            };
            match utils::deserialize::<Value>(&entry.path()).await {
                Ok(document) => {
                    documents.insert(entity, document);
                }
                Err(e) => warn!("Skipping the staged statement of {entity}: {e:#}"),
            }
        }
        Ok(documents)
    }
}

/// Recovers the fund from a staged file name such as `extrato_12345678000190.json`.
fn parse_file_name(name: &str) -> Option<Cnpj> {
    let digits = name.strip_prefix(PREFIX)?.strip_suffix(EXTENSION)?;
    Cnpj::from_str(digits).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn cnpj(s: &str) -> Cnpj {
        Cnpj::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_file_name() {
        assert_eq!(
            parse_file_name("extrato_12345678000190.json"),
            Some(cnpj("12345678000190"))
        );
        assert_eq!(parse_file_name("extrato_123.json"), None);
        assert_eq!(parse_file_name("notes.txt"), None);
    }

    #[tokio::test]
    async fn test_write_and_read_all() {
        let dir = TempDir::new().unwrap();
        let staging = Staging::new(dir.path().join("stage"));
        staging.clear().await.unwrap();

        let a = cnpj("12.345.678/0001-90");
        let b = cnpj("98.765.432/0001-10");
        let path = staging.write(&a, &json!({"n": 1})).await.unwrap();
        assert!(path.ends_with("extrato_12345678000190.json"));
        staging.write(&b, &json!({"n": 2})).await.unwrap();
        staging.write(&a, &json!({"n": 3})).await.unwrap();
        utils::write(staging.dir().join("readme.txt"), "x").await.unwrap();

        let documents = staging.read_all().await.unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[&a], json!({"n": 3}));
        assert_eq!(documents[&b], json!({"n": 2}));
    }

    #[tokio::test]
    async fn test_read_all_skips_invalid_json() {
        let dir = TempDir::new().unwrap();
        let staging = Staging::new(dir.path());
        let a = cnpj("12345678000190");
        utils::write(staging.path(&a), "{ not json").await.unwrap();
        assert!(staging.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_removes_previous_documents() {
        let dir = TempDir::new().unwrap();
        let staging = Staging::new(dir.path());
        staging
            .write(&cnpj("12345678000190"), &json!({}))
            .await
            .unwrap();
        staging.clear().await.unwrap();
        assert!(staging.read_all().await.unwrap().is_empty());
        assert!(staging.dir().is_dir());
    }

    #[tokio::test]
    async fn test_clear_keeps_subdirectories() {
        let dir = TempDir::new().unwrap();
        let staging = Staging::new(dir.path());
        let nested = dir.path().join("archive");
        utils::make_dir(&nested).await.unwrap();
        utils::write(nested.join("extrato_12345678000190.json"), "{}")
            .await
            .unwrap();
        staging
            .write(&cnpj("98765432000110"), &json!({}))
            .await
            .unwrap();

        staging.clear().await.unwrap();
        assert!(staging.read_all().await.unwrap().is_empty());
        assert!(nested.join("extrato_12345678000190.json").is_file());
    }
}
