//! Sync commands: pull, pull-isolated, push, prune

use std::time::Duration;

use anyhow::Result;
use crossterm::style::Stylize;
use ll_core::sync::format_size;

use super::parse_ref;
use crate::context::Context;

pub async fn pull(ctx: &Context, reference: &str, all: bool, force: bool) -> Result<()> {
    let reference = parse_ref(reference)?;
    let engine = ctx.engine()?;
    if all {
        engine.pull_all(&reference, force).await?;
    } else {
        engine.pull(&reference, force).await?;
    }
    println!("{} {reference}", "pulled".green());
    Ok(())
}

pub async fn pull_isolated(ctx: &Context, url: &str, reference: &str) -> Result<()> {
    let reference = parse_ref(reference)?;
    let engine = ctx.engine()?;
    let commit = engine.pull_isolated(url, &reference).await?;
    println!("{} {reference} {}", "pulled".green(), commit.as_str().dark_grey());
    Ok(())
}

/// Push using `LL_USERNAME` / `LL_PASSWORD`
pub async fn push(ctx: &Context, reference: &str, poll_secs: u64) -> Result<()> {
    let reference = parse_ref(reference)?;
    let engine = ctx
        .engine()?
        .with_poll_interval(Duration::from_secs(poll_secs));
    engine.push(&reference).await?;
    println!("{} {reference}", "pushed".green());
    Ok(())
}

pub fn prune(ctx: &Context, reference: &str) -> Result<()> {
    let reference = parse_ref(reference)?;
    let engine = ctx.engine()?;
    let stats = engine.delete_ref_data(&reference)?;
    println!(
        "{} {reference}: {} of {} objects pruned, {} freed",
        "deleted".green(),
        stats.objects_pruned,
        stats.objects_total,
        format_size(stats.bytes_freed)
    );
    Ok(())
}
