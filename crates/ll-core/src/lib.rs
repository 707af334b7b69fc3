pub mod config;
pub mod error;
pub mod fsutil;
pub mod jobs;
pub mod layer;
pub mod paths;
pub mod remote;
pub mod resolver;
pub mod store;
pub mod sync;

pub mod reporter;

#[cfg(test)]
mod testing;

pub use error::{RepoError, Result};
pub use paths::*;
pub use reporter::{NullReporter, Reporter};

/// User Agent string for core operations
pub const USER_AGENT: &str = concat!("ll-core/", env!("CARGO_PKG_VERSION"));
