use crate::api::{Credential, HttpStatementApi, StatementApi};
use crate::commands::Out;
use crate::dates::{self, DateSelection};
use crate::db::Store;
use crate::model::Cnpj;
use crate::pipeline::{self, RunContext, RunSummary};
use crate::staging::Staging;
use crate::{Config, Result};
use anyhow::Context;
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::future::Future;
use std::time::Instant;
use tracing::{debug, info, warn};

/// What a run did: the dates it considered, the ones the ledger confirmed, and how each of those
/// ended.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    pub candidates: Vec<NaiveDate>,
    pub valid: Vec<NaiveDate>,
    pub entities: Vec<Cnpj>,
    pub summary: RunSummary,
    pub elapsed_secs: f64,
}

/// Runs the pipeline for the dates chosen by `selection`.
///
/// # Arguments
/// - `config` - The loaded configuration, including the opened ledger
/// - `selection` - Which candidate dates to consider
/// - `token`, `login` - The statement API secrets, exchanged for a bearer credential
/// - `entities` - The funds to process. When empty, every active fund in the ledger is processed.
///
/// # Errors
/// The ledger being unreadable or the credential being refused ends the run before any date is
/// processed. Failures within a date never do.
pub async fn run(
    config: Config,
    selection: DateSelection,
    token: &str,
    login: &str,
    entities: Vec<Cnpj>,
) -> Result<Out<RunOutput>> {
    let api = HttpStatementApi::from_config(&config)?;
    let today = Local::now().date_naive();
    execute(&config, &api, selection, today, entities, || {
        api.authenticate(token, login)
    })
    .await
}

async fn execute<F, Fut>(
    config: &Config,
    api: &dyn StatementApi,
    selection: DateSelection,
    today: NaiveDate,
    entities: Vec<Cnpj>,
    authenticate: F,
) -> Result<Out<RunOutput>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Credential>>,
{
    let started = Instant::now();
    let store: &dyn Store = config.db();

    let candidates = selection.candidates(today);
    debug!("Candidate dates: {candidates:?}");
    let valid = dates::reconcile(&candidates, store)
        .await
        .context("Unable to read the posting-date ledger")?;
    info!(
        "{} of {} candidate dates are valid posting dates",
        valid.len(),
        candidates.len()
    );

    if valid.is_empty() {
        let output = RunOutput {
            candidates,
            valid,
            entities: Vec::new(),
            summary: RunSummary::default(),
            elapsed_secs: started.elapsed().as_secs_f64(),
        };
        return Ok(Out::new(
            "No valid posting dates were found, nothing to do",
            output,
        ));
    }

    let credential = authenticate()
        .await
        .context("Unable to obtain a credential for the statement API")?;

    let entities = if entities.is_empty() {
        store
            .list_entities()
            .await
            .context("Unable to list the active funds")?
    } else {
        entities
    };
    if entities.is_empty() {
        warn!("There are no funds to process");
    }

    let ctx = RunContext::new(
        credential,
        Staging::new(config.staging()),
        config.target_table().clone(),
    );
    let summary = pipeline::run_dates(&ctx, api, store, &valid, &entities).await;

    let elapsed_secs = started.elapsed().as_secs_f64();
    let message = format!(
        "Processed {} dates in {elapsed_secs:.1}s: {} loaded, {} skipped, {} rows inserted",
        summary.dates.len(),
        summary.loaded(),
        summary.skipped(),
        summary.rows_inserted()
    );
    Ok(Out::new(
        message,
        RunOutput {
            candidates,
            valid,
            entities,
            summary,
            elapsed_secs,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{statement_document, FakeApi, TestEnv};
    use anyhow::anyhow;
    use serde_json::json;
    use std::str::FromStr;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::from_str(s).unwrap()
    }

    #[tokio::test]
    async fn test_no_valid_dates_ends_before_authenticating() {
        let env = TestEnv::new().await;
        let config = env.config();
        let api = FakeApi::default();

        let out = execute(
            &config,
            &api,
            DateSelection::Single(d("2024-01-06")),
            d("2024-02-01"),
            Vec::new(),
            || async { Err(anyhow!("authentication must not be attempted")) },
        )
        .await
        .unwrap();

        let output = out.structure().unwrap();
        assert_eq!(output.candidates, vec![d("2024-01-06")]);
        assert!(output.valid.is_empty());
        assert_eq!(api.requests(), 0);
    }

    #[tokio::test]
    async fn test_authentication_failure_is_fatal() {
        let env = TestEnv::new().await;
        env.insert_posting_date("2024-01-05", 1).await;
        let api = FakeApi::default();

        let result = execute(
            &env.config(),
            &api,
            DateSelection::Single(d("2024-01-05")),
            d("2024-02-01"),
            Vec::new(),
            || async { Err(anyhow!("401 Unauthorized")) },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(api.requests(), 0);
    }

    #[tokio::test]
    async fn test_lookback_uses_registered_funds() {
        let env = TestEnv::new().await;
        let config = env.config();
        let active = env.entity(1);
        let inactive = env.entity(2);
        env.insert_fund(active.digits(), "FUNDO UM", 1).await;
        env.insert_fund(inactive.digits(), "FUNDO DOIS", 0).await;
        env.insert_posting_date("2024-01-31", 1).await;

        let mut api = FakeApi::default();
        api.respond(
            &active,
            d("2024-01-31"),
            statement_document(
                "FUNDO UM",
                json!([{ "data": "2024-01-31", "historico": "taxa", "saldo": -3 }]),
            ),
        );

        let out = execute(
            &config,
            &api,
            DateSelection::default(),
            d("2024-02-01"),
            Vec::new(),
            || async { Ok(Credential::new("token")) },
        )
        .await
        .unwrap();

        let output = out.structure().unwrap();
        assert_eq!(output.valid, vec![d("2024-01-31")]);
        assert_eq!(output.entities, vec![active.clone()]);
        assert_eq!(output.summary.loaded(), 1);
        assert_eq!(api.requests(), 1);
        assert_eq!(
            env.stored_entry_texts("2024-01-31", &active).await,
            vec!["TAXA".to_string()]
        );
    }

    #[tokio::test]
    async fn test_explicit_funds_override_the_registry() {
        let env = TestEnv::new().await;
        let config = env.config();
        let registered = env.entity(1);
        let requested = env.entity(3);
        env.insert_fund(registered.digits(), "FUNDO UM", 1).await;
        env.insert_posting_date("2024-01-05", 1).await;
        env.insert_posting_date("2024-01-08", 1).await;

        let api = FakeApi::default();
        let out = execute(
            &config,
            &api,
            DateSelection::Range {
                start: d("2024-01-05"),
                end: d("2024-01-08"),
            },
            d("2024-02-01"),
            vec![requested.clone()],
            || async { Ok(Credential::new("token")) },
        )
        .await
        .unwrap();

        let output = out.structure().unwrap();
        assert_eq!(output.candidates.len(), 4);
        assert_eq!(output.valid, vec![d("2024-01-05"), d("2024-01-08")]);
        assert_eq!(output.entities, vec![requested]);
        assert_eq!(output.summary.skipped(), 2);
        assert_eq!(api.requests(), 2);
    }
}
