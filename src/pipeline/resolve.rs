use crate::db::Store;
use crate::model::Cnpj;
use crate::pipeline::normalize::UNKNOWN_FUND;
use crate::Result;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// The reference id given to a fund whose display name is not registered.
pub const UNRESOLVED_REFERENCE: &str = "0";

/// Maps each distinct fund to the reference id registered for its display name. A fund without a
/// registered name maps to `UNRESOLVED_REFERENCE` so that its rows are still loaded.
///
/// # Errors
/// Only a failed lookup is an error; a missing registration is not.
pub async fn resolve(
    entities: &[Cnpj],
    display_names: &BTreeMap<Cnpj, String>,
    store: &dyn Store,
) -> Result<BTreeMap<Cnpj, String>> {
    let mut references = BTreeMap::new();
    for entity in entities {
        if references.contains_key(entity) {
            continue;
        }
        let name = display_names
            .get(entity)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_FUND);
        let reference = match store.resolve_reference(name).await? {
            Some(id) => {
                debug!("Resolved {entity} ('{name}') to reference {id}");
                id
            }
            None => {
                warn!(
                    "No reference id is registered for {entity} ('{name}'), \
                    using {UNRESOLVED_REFERENCE}"
                );
                UNRESOLVED_REFERENCE.to_string()
            }
        };
        references.insert(entity.clone(), reference);
    }
    Ok(references)
}
