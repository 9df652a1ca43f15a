use crate::api::{Credential, StatementApi};
use crate::model::Cnpj;
use crate::staging::Staging;
use crate::Result;
use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, warn};

/// What happened when one fund's statement was requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Extraction {
    /// The document was retrieved and written to this file.
    Staged(PathBuf),
    /// Nothing is available for this fund on this date.
    Unavailable(String),
}

impl Extraction {
    pub fn is_staged(&self) -> bool {
        matches!(self, Extraction::Staged(_))
    }
}

/// Requests `date`'s statement for every fund in `entities`, one at a time and once each, and
/// stages the documents that come back. The staging area is emptied first so that only documents
/// for `date` remain in it.
///
/// A failed request is recorded as `Unavailable` and does not stop the remaining requests. Only a
/// failure to prepare the staging area is returned as an error.
pub async fn extract(
    api: &dyn StatementApi,
    staging: &Staging,
    credential: &Credential,
    date: NaiveDate,
    entities: &[Cnpj],
) -> Result<BTreeMap<Cnpj, Extraction>> {
    staging
        .clear()
        .await
        .with_context(|| format!("Unable to prepare the staging area for {date}"))?;

    let mut extractions = BTreeMap::new();
    for entity in entities {
        let extraction = match api.fetch_statement(credential, entity, date).await {
            Ok(document) => match staging.write(entity, &document).await {
                Ok(path) => Extraction::Staged(path),
                Err(e) => {
                    warn!("Unable to stage the statement of {entity} for {date}: {e:#}");
                    Extraction::Unavailable(format!("{e:#}"))
                }
            },
            Err(e) => {
                warn!("No statement for {entity} on {date}: {e:#}");
                Extraction::Unavailable(format!("{e:#}"))
            }
        };
        extractions.insert(entity.clone(), extraction);
    }

    debug!(
        "Staged {} of {} statements for {date}",
        extractions.values().filter(|e| e.is_staged()).count(),
        entities.len()
    );
    Ok(extractions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{statement_document, FakeApi};
    use serde_json::json;
    use std::str::FromStr;
    use tempfile::TempDir;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::from_str(s).unwrap()
    }

    #[tokio::test]
    async fn test_failed_entity_does_not_stop_the_others() {
        let dir = TempDir::new().unwrap();
        let staging = Staging::new(dir.path());
        let a = Cnpj::from_str("12345678000190").unwrap();
        let b = Cnpj::from_str("98765432000110").unwrap();
        let c = Cnpj::from_str("11222333000181").unwrap();
        let date = d("2024-01-05");

        let mut api = FakeApi::default();
        api.fail(&a, date, "timed out");
        let document = statement_document("FUNDO C", json!([{ "historico": "x" }]));
        api.respond(&c, date, document);

        let extractions = extract(
            &api,
            &staging,
            &Credential::new("t"),
            date,
            &[a.clone(), b.clone(), c.clone()],
        )
        .await
        .unwrap();

        assert_eq!(extractions.len(), 3);
        assert!(matches!(extractions[&a], Extraction::Unavailable(_)));
        assert!(matches!(extractions[&b], Extraction::Unavailable(_)));
        assert!(extractions[&c].is_staged());
        assert_eq!(api.requests(), 3);

        let staged = staging.read_all().await.unwrap();
        assert_eq!(staged.keys().collect::<Vec<_>>(), vec![&c]);
    }

    #[tokio::test]
    async fn test_staging_holds_only_the_current_date() {
        let dir = TempDir::new().unwrap();
        let staging = Staging::new(dir.path());
        let a = Cnpj::from_str("12345678000190").unwrap();
        let b = Cnpj::from_str("98765432000110").unwrap();
        let first = d("2024-01-05");
        let second = d("2024-01-08");

        let mut api = FakeApi::default();
        api.respond(&a, first, statement_document("A", json!([])));
        api.respond(&b, first, statement_document("B", json!([])));
        api.respond(&a, second, statement_document("A", json!([])));

        let credential = Credential::new("t");
        let entities = [a.clone(), b.clone()];
        extract(&api, &staging, &credential, first, &entities)
            .await
            .unwrap();
        extract(&api, &staging, &credential, second, &entities)
            .await
            .unwrap();

        let staged = staging.read_all().await.unwrap();
        assert_eq!(staged.keys().collect::<Vec<_>>(), vec![&a]);
    }
}
