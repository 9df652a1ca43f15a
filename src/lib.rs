pub mod api;
pub mod args;
pub mod commands;
mod config;
pub mod dates;
pub mod db;
mod error;
pub mod model;
pub mod pipeline;
mod staging;
mod utils;

#[cfg(test)]
mod test;

pub use config::Config;
pub use error::Error;
pub use error::Result;
pub use error::{SkipReason, TransformError};
pub use staging::Staging;
