//! Turns staged statement documents into one flat set of entries, each tagged with its fund.

use crate::model::{Cnpj, StatementEntry};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// The display name used when a document does not name its fund.
pub const UNKNOWN_FUND: &str = "Fundo desconhecido";

/// The entries of every usable document along with the display name each fund reported.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Normalized {
    pub entries: Vec<StatementEntry>,
    pub display_names: BTreeMap<Cnpj, String>,
}

impl Normalized {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Why a staged document contributed nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
enum Rejection {
    #[error("the API reported errors: {0}")]
    ErrorDocument(String),
    #[error("unexpected structure: {0}")]
    UnexpectedStructure(String),
}

/// Normalizes every staged document. Error documents and documents of an unexpected shape are
/// logged and left out; they never fail the whole set.
pub fn normalize(staged: &BTreeMap<Cnpj, Value>) -> Normalized {
    let mut normalized = Normalized::default();
    for (entity, document) in staged {
        match parse_document(document) {
            Ok((entries, display_name)) => {
                debug!(
                    "Normalized {} entries for {entity} ({display_name})",
                    entries.len()
                );
                normalized
                    .entries
                    .extend(entries.into_iter().map(|mut entry| {
                        entry.entity = Some(entity.clone());
                        entry
                    }));
                normalized
                    .display_names
                    .insert(entity.clone(), display_name);
            }
            Err(rejection) => warn!("Skipping the statement of {entity}: {rejection}"),
        }
    }
    normalized
}

fn parse_document(document: &Value) -> Result<(Vec<StatementEntry>, String), Rejection> {
    if let Some(errors) = document.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            return Err(Rejection::ErrorDocument(describe_errors(errors)));
        }
    }

    let statement = document
        .pointer("/data/getDemonstrativoCaixa/0")
        .ok_or_else(|| {
            Rejection::UnexpectedStructure("missing data.getDemonstrativoCaixa[0]".into())
        })?;

    let raw_entries = statement
        .get("entradas")
        .and_then(Value::as_array)
        .ok_or_else(|| Rejection::UnexpectedStructure("missing the entradas list".into()))?;

    let entries = raw_entries
        .iter()
        .map(|raw| serde_json::from_value::<StatementEntry>(raw.clone()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| Rejection::UnexpectedStructure(e.to_string()))?;

    let display_name = statement
        .get("nomeDoFundo")
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_FUND)
        .to_string();

    Ok((entries, display_name))
}

fn describe_errors(errors: &[Value]) -> String {
    errors
        .iter()
        .map(|e| match e.get("message").and_then(Value::as_str) {
            Some(message) => message.to_string(),
            None => e.to_string(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}
