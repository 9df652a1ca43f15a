//! The per-date reload pipeline.
//!
//! Every valid posting date goes through the same sequence of stages, one date at a time:
//!
//! ```text
//! Pending -> Extracted -> Normalized -> Transformed -> Loaded
//!    \___________\_____________\____________\________-> Skipped
//! ```
//!
//! A date that cannot make progress ends in `Skipped` with a `SkipReason`, and the next date is
//! processed regardless.

pub mod extract;
pub mod load;
pub mod normalize;
pub mod resolve;
pub mod transform;

use crate::api::{Credential, StatementApi};
use crate::db::{Store, TableName};
use crate::error::{SkipReason, TransformError};
use crate::model::Cnpj;
use crate::staging::Staging;
use chrono::NaiveDate;
use load::EntityLoad;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// The stage a date has reached.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateState {
    #[default]
    Pending,
    Extracted,
    Normalized,
    Transformed,
    Loaded,
    Skipped,
}

serde_plain::derive_display_from_serialize!(DateState);
serde_plain::derive_fromstr_from_deserialize!(DateState);

/// Everything the stages share for the length of one run. It is built once per invocation and
/// passed to each stage.
#[derive(Debug, Clone)]
pub struct RunContext {
    credential: Credential,
    staging: Staging,
    table: TableName,
}

impl RunContext {
    pub fn new(credential: Credential, staging: Staging, table: TableName) -> Self {
        Self {
            credential,
            staging,
            table,
        }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn staging(&self) -> &Staging {
        &self.staging
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }
}

/// How a date ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DateOutcome {
    Loaded {
        loads: Vec<EntityLoad>,
        /// Funds whose statements could not be retrieved.
        unavailable: Vec<Cnpj>,
        /// Funds whose reload failed.
        failed: Vec<Cnpj>,
        /// Records dated another day, left out of this date's load.
        out_of_scope: u64,
    },
    Skipped(SkipReason),
}

impl DateOutcome {
    pub fn state(&self) -> DateState {
        match self {
            DateOutcome::Loaded { .. } => DateState::Loaded,
            DateOutcome::Skipped(_) => DateState::Skipped,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateReport {
    pub date: NaiveDate,
    pub outcome: DateOutcome,
}

/// The per-date outcomes of a run, in processing order.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub dates: Vec<DateReport>,
}

impl RunSummary {
    pub fn loaded(&self) -> usize {
        self.count(DateState::Loaded)
    }

    pub fn skipped(&self) -> usize {
        self.count(DateState::Skipped)
    }

    pub fn rows_inserted(&self) -> u64 {
        self.dates
            .iter()
            .filter_map(|r| match &r.outcome {
                DateOutcome::Loaded { loads, .. } => {
                    Some(loads.iter().map(|l| l.inserted).sum::<u64>())
                }
                DateOutcome::Skipped(_) => None,
            })
            .sum()
    }

    fn count(&self, state: DateState) -> usize {
        self.dates
            .iter()
            .filter(|r| r.outcome.state() == state)
            .count()
    }
}

/// Runs every date in `dates` through the pipeline for `entities`, in order. A date that fails is
/// recorded as skipped and never stops the remaining dates.
pub async fn run_dates(
    ctx: &RunContext,
    api: &dyn StatementApi,
    store: &dyn Store,
    dates: &[NaiveDate],
    entities: &[Cnpj],
) -> RunSummary {
    let mut summary = RunSummary::default();
    for &date in dates {
        info!("Processing {date}");
        let outcome = process_date(ctx, api, store, date, entities).await;
        match &outcome {
            DateOutcome::Loaded { loads, failed, .. } => info!(
                "{date} loaded: {} scopes reloaded, {} funds failed",
                loads.len(),
                failed.len()
            ),
            DateOutcome::Skipped(reason) => warn!("{date} skipped: {reason}"),
        }
        summary.dates.push(DateReport { date, outcome });
    }
    summary
}

/// Tracks one date through its stages, logging each transition.
struct DateRun {
    date: NaiveDate,
    state: DateState,
}

impl DateRun {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            state: DateState::Pending,
        }
    }

    fn advance(&mut self, next: DateState) {
        debug!("{}: {} -> {next}", self.date, self.state);
        self.state = next;
    }

    fn skip(mut self, reason: SkipReason) -> DateOutcome {
        self.advance(DateState::Skipped);
        DateOutcome::Skipped(reason)
    }

    fn stage_failed(self, e: crate::Error) -> DateOutcome {
        let date = self.date;
        self.skip(SkipReason::Stage {
            date,
            message: format!("{e:#}"),
        })
    }
}

async fn process_date(
    ctx: &RunContext,
    api: &dyn StatementApi,
    store: &dyn Store,
    date: NaiveDate,
    entities: &[Cnpj],
) -> DateOutcome {
    let mut run = DateRun::new(date);

    let extractions =
        match extract::extract(api, ctx.staging(), ctx.credential(), date, entities).await {
            Ok(extractions) => extractions,
            Err(e) => return run.stage_failed(e),
        };
    let unavailable: Vec<Cnpj> = extractions
        .iter()
        .filter(|(_, extraction)| !extraction.is_staged())
        .map(|(entity, _)| entity.clone())
        .collect();
    if unavailable.len() == extractions.len() {
        return run.skip(SkipReason::NothingExtracted(date));
    }
    run.advance(DateState::Extracted);

    let staged = match ctx.staging().read_all().await {
        Ok(staged) => staged,
        Err(e) => return run.stage_failed(e),
    };
    let normalized = normalize::normalize(&staged);
    if normalized.is_empty() {
        return run.skip(SkipReason::NoEntries(date));
    }
    run.advance(DateState::Normalized);

    let present: Vec<Cnpj> = normalized
        .entries
        .iter()
        .filter_map(|e| e.entity.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let references = match resolve::resolve(&present, &normalized.display_names, store).await {
        Ok(references) => references,
        Err(e) => return run.stage_failed(e),
    };

    let records = match transform::transform(normalized.entries, &references) {
        Ok(records) => records,
        Err(TransformError::MissingEntity(entries)) => {
            warn!(
                "{} entries for {date} have no fund and none of them will be loaded",
                entries.len()
            );
            return run.skip(SkipReason::MissingEntity(date));
        }
        Err(e) => {
            return run.skip(SkipReason::Transform {
                date,
                message: e.to_string(),
            })
        }
    };
    run.advance(DateState::Transformed);

    let report = load::load_all(store, ctx.table(), date, records).await;
    if report.loads.is_empty() && !report.failed.is_empty() {
        return run.skip(SkipReason::LoadFailed(date));
    }
    run.advance(DateState::Loaded);
    DateOutcome::Loaded {
        loads: report.loads,
        unavailable,
        failed: report.failed,
        out_of_scope: report.out_of_scope,
    }
}
