//! Types that represent the core data model, such as `StatementEntry` and `TransformedRecord`.
mod cnpj;
mod entry;
mod record;

pub use cnpj::{Cnpj, CnpjError};
pub use entry::StatementEntry;
pub use record::{Polarity, TransformedRecord};
