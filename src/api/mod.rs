//! The remote statement API: credential acquisition and per-fund statement retrieval.

mod client;

pub use client::HttpStatementApi;

use crate::model::Cnpj;
use crate::Result;
use chrono::NaiveDate;
use serde_json::Value;
use std::fmt::{Debug, Formatter};

/// A bearer credential for the statement API. Its value is never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub(crate) fn secret(&self) -> &str {
        &self.0
    }
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Retrieves raw cash statement documents.
///
/// An implementation makes a single attempt per call. Transport failures and non-success statuses
/// are returned as errors; the caller decides that they mean "no data for this fund today".
#[async_trait::async_trait]
pub trait StatementApi: Send + Sync {
    async fn fetch_statement(
        &self,
        credential: &Credential,
        entity: &Cnpj,
        date: NaiveDate,
    ) -> Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = Credential::new("abc123");
        assert_eq!(format!("{credential:?}"), "Credential(***)");
        assert_eq!(credential.secret(), "abc123");
    }
}
