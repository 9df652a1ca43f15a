//! Shared test utilities for creating test environments.
//!
//! This module is only compiled when running tests (`#[cfg(test)]`).

use crate::api::{Credential, StatementApi};
use crate::db::TableName;
use crate::model::Cnpj;
use crate::{Config, Result};
use anyhow::anyhow;
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

/// The administrator that `TestEnv` configurations scope reference lookups to.
pub const ADMINISTRATOR: &str = "22610500000188";

/// Test environment that sets up a home directory with Config and database.
/// Holds TempDir to keep the directory alive for the duration of the test.
pub struct TestEnv {
    _temp_dir: TempDir,
    config: Config,
}

impl TestEnv {
    /// Creates a test environment with Config and initialized database.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("statement-etl");
        let config = Config::create(
            &root,
            "https://api.example.com/auth",
            "https://api.example.com/graphql",
            Cnpj::from_str(ADMINISTRATOR).unwrap(),
            TableName::default(),
        )
        .await
        .unwrap();

        Self {
            _temp_dir: temp_dir,
            config,
        }
    }

    /// Returns a clone of the Config.
    pub fn config(&self) -> Config {
        self.config.clone()
    }

    /// A distinct, well-formed registration number for each `n`.
    pub fn entity(&self, n: u32) -> Cnpj {
        Cnpj::from_str(&format!("{:08}0001{:02}", n, n % 100)).unwrap()
    }

    pub async fn insert_posting_date(&self, position_date: &str, status_id: i64) {
        sqlx::query("INSERT INTO posting_dates (position_date, status_id) VALUES (?, ?)")
            .bind(position_date)
            .bind(status_id)
            .execute(self.config.db().pool())
            .await
            .unwrap();
    }

    /// Registers a fund. `cnpj` is taken verbatim so that malformed numbers can be stored.
    pub async fn insert_fund(&self, cnpj: &str, name: &str, status_id: i64) {
        sqlx::query("INSERT INTO funds (cnpj, name, status_id) VALUES (?, ?, ?)")
            .bind(cnpj)
            .bind(name)
            .bind(status_id)
            .execute(self.config.db().pool())
            .await
            .unwrap();
    }

    pub async fn insert_reference(&self, name: &str, reference_id: i64, administrator: &Cnpj) {
        sqlx::query(
            "INSERT INTO quota_names (name, reference_id, administrator_cnpj) VALUES (?, ?, ?)",
        )
        .bind(name)
        .bind(reference_id)
        .bind(administrator.digits())
        .execute(self.config.db().pool())
        .await
        .unwrap();
    }

    /// The `entry_text` of every row stored for `(position_date, entity)`, in insertion order.
    pub async fn stored_entry_texts(&self, position_date: &str, entity: &Cnpj) -> Vec<String> {
        let rows: Vec<(String,)> = sqlx::query_as(&format!(
            "SELECT entry_text FROM {} WHERE position_date = ? AND entity_id = ? ORDER BY rowid",
            self.config.target_table()
        ))
        .bind(position_date)
        .bind(entity.digits())
        .fetch_all(self.config.db().pool())
        .await
        .unwrap();
        rows.into_iter().map(|(text,)| text).collect()
    }

    /// The `reference_id` of every row stored for `entity`, in insertion order.
    pub async fn stored_reference_ids(&self, entity: &Cnpj) -> Vec<i64> {
        let rows: Vec<(i64,)> = sqlx::query_as(&format!(
            "SELECT reference_id FROM {} WHERE entity_id = ? ORDER BY rowid",
            self.config.target_table()
        ))
        .bind(entity.digits())
        .fetch_all(self.config.db().pool())
        .await
        .unwrap();
        rows.into_iter().map(|(id,)| id).collect()
    }
}

/// A statement document shaped like the API's successful response.
pub fn statement_document(fund_name: &str, entries: Value) -> Value {
    json!({
        "data": {
            "getDemonstrativoCaixa": [{
                "entradas": entries,
                "carteira": "CARTEIRA",
                "nomeDoFundo": fund_name,
            }]
        }
    })
}

/// An in-memory `StatementApi`. Requests for a `(fund, date)` that was not set up fail like a
/// non-success response would.
#[derive(Debug, Default)]
pub struct FakeApi {
    responses: HashMap<(Cnpj, NaiveDate), std::result::Result<Value, String>>,
    requests: AtomicUsize,
}

impl FakeApi {
    pub fn respond(&mut self, entity: &Cnpj, date: NaiveDate, document: Value) {
        self.responses.insert((entity.clone(), date), Ok(document));
    }

    pub fn fail(&mut self, entity: &Cnpj, date: NaiveDate, message: &str) {
        self.responses
            .insert((entity.clone(), date), Err(message.to_string()));
    }

    /// The number of requests received so far.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl StatementApi for FakeApi {
    async fn fetch_statement(
        &self,
        _credential: &Credential,
        entity: &Cnpj,
        date: NaiveDate,
    ) -> Result<Value> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        match self.responses.get(&(entity.clone(), date)) {
            Some(Ok(document)) => Ok(document.clone()),
            Some(Err(message)) => Err(anyhow!("{message}")),
            None => Err(anyhow!("404 Not Found")),
        }
    }
}
