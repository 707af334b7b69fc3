pub mod completions;
pub mod config;
pub mod info;
pub mod layer;
pub mod resolve;
pub mod store;
pub mod sync;

use anyhow::{Context, Result};
use ll_schema::Reference;

/// Parse a reference argument.
pub(crate) fn parse_ref(s: &str) -> Result<Reference> {
    Reference::parse(s).with_context(|| format!("invalid reference '{s}'"))
}
