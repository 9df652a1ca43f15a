//! Turns the user's date inputs into the sorted list of posting dates that the ledger knows to be
//! closed.

use crate::db::Store;
use crate::Result;
use anyhow::bail;
use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

/// The lookback used when no date input is supplied at all.
pub const DEFAULT_DAYS_AGO: u32 = 1;

/// The way candidate dates were requested. Exactly one mode is active per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DateSelection {
    /// One explicit date.
    Single(NaiveDate),
    /// Every date from `start` to `end`, inclusive. `start <= end` always holds.
    Range { start: NaiveDate, end: NaiveDate },
    /// The single date `today - days`.
    Lookback(u32),
}

impl Default for DateSelection {
    fn default() -> Self {
        DateSelection::Lookback(DEFAULT_DAYS_AGO)
    }
}

impl DateSelection {
    /// Validates raw inputs and decides which mode is active. Nothing supplied means a one day
    /// lookback.
    ///
    /// # Errors
    /// - More than one mode is supplied.
    /// - Only one end of a range is supplied.
    /// - The range ends before it starts.
    pub fn from_inputs(
        date: Option<NaiveDate>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        days_ago: Option<u32>,
    ) -> Result<Self> {
        let range_given = start.is_some() || end.is_some();
        let modes = [date.is_some(), range_given, days_ago.is_some()]
            .iter()
            .filter(|given| **given)
            .count();
        if modes > 1 {
            bail!("Supply only one of a date, a date range, or a number of days ago");
        }

        if let Some(date) = date {
            return Ok(DateSelection::Single(date));
        }
        match (start, end) {
            (Some(start), Some(end)) => {
                if end < start {
                    bail!("The end date {end} is before the start date {start}");
                }
                return Ok(DateSelection::Range { start, end });
            }
            (Some(_), None) => bail!("A start date was given without an end date"),
            (None, Some(_)) => bail!("An end date was given without a start date"),
            (None, None) => {}
        }
        Ok(DateSelection::Lookback(days_ago.unwrap_or(DEFAULT_DAYS_AGO)))
    }

    /// The candidate dates for this selection, relative to `today` for lookbacks.
    pub fn candidates(&self, today: NaiveDate) -> Vec<NaiveDate> {
        match *self {
            DateSelection::Single(date) => vec![date],
            DateSelection::Range { start, end } => start
                .iter_days()
                .take_while(|d| *d <= end)
                .collect(),
            DateSelection::Lookback(days) => {
                // Only fails when walking off the start of the calendar.
                let date = today
                    .checked_sub_days(Days::new(u64::from(days)))
                    .unwrap_or(NaiveDate::MIN);
                vec![date]
            }
        }
    }
}

/// The first and last instants of the span covered by `first` and `last`.
pub fn day_bounds(first: NaiveDate, last: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let start = first.and_time(NaiveTime::MIN);
    let end = last
        .and_hms_micro_opt(23, 59, 59, 999_999)
        .unwrap_or_else(|| last.and_time(NaiveTime::MIN));
    (start, end)
}

/// Keeps the candidates that appear in `valid`, sorted ascending, without duplicates.
pub fn retain_valid(
    candidates: &[NaiveDate],
    valid: impl IntoIterator<Item = NaiveDate>,
) -> Vec<NaiveDate> {
    let valid: BTreeSet<NaiveDate> = valid.into_iter().collect();
    candidates
        .iter()
        .copied()
        .filter(|d| valid.contains(d))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Reconciles `candidates` against the ledger's closed posting dates. The ledger is queried once
/// for the whole candidate span; candidates missing from the ledger are dropped silently.
pub async fn reconcile(candidates: &[NaiveDate], store: &dyn Store) -> Result<Vec<NaiveDate>> {
    let (Some(first), Some(last)) = (candidates.iter().min(), candidates.iter().max()) else {
        return Ok(Vec::new());
    };
    let (start, end) = day_bounds(*first, *last);
    let valid = store.list_valid_posting_dates(start, end).await?;
    debug!(
        "The ledger has {} closed dates between {first} and {last}",
        valid.len()
    );
    Ok(retain_valid(candidates, valid))
}
