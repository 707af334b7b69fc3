//! Version resolution commands

use anyhow::{Context as _, Result};
use ll_core::RepoError;
use ll_core::resolver::{latest_of_ref, local_latest_ref, remote_latest_ref};
use ll_core::store::Repo;
use ll_schema::FuzzyReference;

use crate::context::Context;

/// Resolve `query` locally, remotely, or locally with a remote fallback.
pub async fn latest(ctx: &Context, query: &str, local: bool, remote: bool) -> Result<()> {
    let fuzzy =
        FuzzyReference::parse(query).with_context(|| format!("invalid query '{query}'"))?;
    let engine = ctx.engine()?;
    let repo_name = engine.repo().config().default_repo.clone();

    let found = if remote {
        remote_latest_ref(engine.remote(), &repo_name, &fuzzy).await?
    } else {
        match local_latest_ref(engine.repo(), &fuzzy) {
            Ok(found) => found,
            Err(RepoError::NotFound(_)) if !local => {
                remote_latest_ref(engine.remote(), &repo_name, &fuzzy).await?
            }
            Err(e) => return Err(e.into()),
        }
    };

    println!("{found}");
    Ok(())
}

pub fn latest_layer(ctx: &Context, channel: &str, app_id: &str, prefix: &str) -> Result<()> {
    let found = latest_of_ref(ctx.layout(), channel, app_id, prefix)?;
    println!("{found}");
    Ok(())
}
