use crate::db::{Replaced, Store, TableName};
use crate::model::{Cnpj, TransformedRecord};
use crate::Result;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// The outcome of reloading one `(position date, fund)` scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityLoad {
    pub entity: Cnpj,
    pub position_date: String,
    pub deleted: u64,
    pub inserted: u64,
}

/// The scopes of one date's records that were reloaded, the funds whose reload failed, and the
/// number of records left out because they were dated another day.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub loads: Vec<EntityLoad>,
    pub failed: Vec<Cnpj>,
    pub out_of_scope: u64,
}

/// Replaces whatever `table` holds for `(date, entity)` with `rows`.
///
/// An empty `rows` is a no-op: the rows already stored for the scope stay where they are.
pub async fn reload(
    store: &dyn Store,
    table: &TableName,
    date: &str,
    entity: &Cnpj,
    rows: &[TransformedRecord],
) -> Result<Replaced> {
    if rows.is_empty() {
        debug!("Nothing to reload for {entity} on '{date}'");
        return Ok(Replaced::default());
    }
    let replaced = store.replace_rows(table, date, entity, rows).await?;
    info!(
        "Reloaded {entity} on '{date}' into {table}: {} deleted, {} inserted",
        replaced.deleted, replaced.inserted
    );
    Ok(replaced)
}

/// Reloads `records` into the `(date, fund)` scope of every fund present in them. Only those
/// scopes are ever deleted from.
///
/// An undated record belongs to the statement of `date` and is stored under it. A record dated any
/// other day is logged and left out so that it never touches another day's rows. A failed reload is
/// logged and recorded and the remaining funds are still loaded.
pub async fn load_all(
    store: &dyn Store,
    table: &TableName,
    date: NaiveDate,
    records: Vec<TransformedRecord>,
) -> LoadReport {
    let scope = date.format("%Y-%m-%d").to_string();
    let mut report = LoadReport::default();
    let mut by_entity: BTreeMap<Cnpj, Vec<TransformedRecord>> = BTreeMap::new();
    for mut record in records {
        if record.position_date.is_empty() {
            record.position_date = scope.clone();
        } else if record.position_date != scope {
            warn!(
                "Leaving out a record of {} dated '{}' from the load of {scope}",
                record.entity, record.position_date
            );
            report.out_of_scope += 1;
            continue;
        }
        by_entity
            .entry(record.entity.clone())
            .or_default()
            .push(record);
    }

    for (entity, rows) in by_entity {
        match reload(store, table, &scope, &entity, &rows).await {
            Ok(replaced) => report.loads.push(EntityLoad {
                entity,
                position_date: scope.clone(),
                deleted: replaced.deleted,
                inserted: replaced.inserted,
            }),
            Err(e) => {
                warn!("Failed to reload {entity} on '{scope}': {e:#}");
                report.failed.push(entity);
            }
        }
    }
    report
}
