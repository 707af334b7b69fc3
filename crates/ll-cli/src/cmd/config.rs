//! config.yaml commands

use anyhow::{Result, bail};
use ll_core::store::Repo;

use crate::context::Context;

pub fn show(ctx: &Context) -> Result<()> {
    let config = ctx.config()?;
    println!("version: {}", config.version);
    println!("defaultRepo: {}", config.default_repo);
    println!("repos:");
    for (name, url) in &config.repos {
        println!("  {name}: {url}");
    }
    Ok(())
}

pub fn set_default(ctx: &Context, name: &str) -> Result<()> {
    let mut repo = ctx.open_repo()?;
    let mut config = repo.config().clone();
    if !config.repos.contains_key(name) {
        bail!("remote '{name}' is not configured; add it with `ll-repo config add`");
    }
    config.default_repo = name.to_string();
    repo.set_config(config)?;
    println!("default remote is now {name}");
    Ok(())
}

pub fn add(ctx: &Context, name: &str, url: &str) -> Result<()> {
    let mut repo = ctx.open_repo()?;
    let mut config = repo.config().clone();
    config.repos.insert(name.to_string(), url.to_string());
    repo.set_config(config)?;
    println!("remote {name} -> {url}");
    Ok(())
}
