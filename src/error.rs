use crate::model::{Cnpj, StatementEntry};
use chrono::NaiveDate;
use serde::Serialize;

pub type Error = anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// The reason a posting date ended in the `Skipped` state instead of `Loaded`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum SkipReason {
    #[error("no statement could be retrieved for any entity on {0}")]
    NothingExtracted(NaiveDate),

    #[error("no entries were normalized for {0}")]
    NoEntries(NaiveDate),

    #[error("the record set for {0} has no entity identifier and cannot be loaded")]
    MissingEntity(NaiveDate),

    #[error("the record set for {date} could not be transformed: {message}")]
    Transform { date: NaiveDate, message: String },

    #[error("every entity failed to load for {0}")]
    LoadFailed(NaiveDate),

    #[error("{date} failed: {message}")]
    Stage { date: NaiveDate, message: String },
}

/// Errors raised by the record transformer.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// At least one record carries no entity identifier. The input is handed back unchanged.
    #[error("the record set has no entity identifier")]
    MissingEntity(Vec<StatementEntry>),

    #[error("entity {entity} has no reference id mapping")]
    UnmappedEntity { entity: Cnpj },

    #[error("reference id '{value}' for entity {entity} is not an integer")]
    NonNumericReference { entity: Cnpj, value: String },

    #[error("unable to parse the date '{0}'")]
    BadDate(String),
}
