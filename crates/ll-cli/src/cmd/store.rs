//! Store commands: list, import, tag, checkout, remotes

use std::path::Path;

use anyhow::{Context as _, Result, bail};
use crossterm::style::Stylize;
use ll_core::store::Repo;

use super::parse_ref;
use crate::context::Context;
use crate::ui::{print_ref_footer, print_ref_header, print_ref_row};

/// List stored references, sorted
pub fn list(ctx: &Context, filter: Option<&str>) -> Result<()> {
    let repo = ctx.open_repo()?;
    let mut refs = repo.list_local_refs()?;
    if let Some(filter) = filter {
        refs.retain(|r| r.app_id.contains(filter));
    }
    refs.sort();

    if refs.is_empty() {
        println!();
        println!("  No references stored.");
        return Ok(());
    }

    print_ref_header();
    for reference in &refs {
        let commit = repo.resolve_rev(reference)?;
        print_ref_row(reference, commit.as_str());
    }
    print_ref_footer(refs.len());
    Ok(())
}

pub fn import(ctx: &Context, path: &Path, reference: &str) -> Result<()> {
    let reference = parse_ref(reference)?;
    let repo = ctx.open_repo()?;
    repo.import_directory(&reference, path)
        .with_context(|| format!("importing {}", path.display()))?;
    let commit = repo.resolve_rev(&reference)?;
    println!("{} {reference} {}", "committed".green(), commit.as_str().dark_grey());
    Ok(())
}

pub fn tag(ctx: &Context, source: &str, target: &str) -> Result<()> {
    let source = parse_ref(source)?;
    let target = parse_ref(target)?;
    let repo = ctx.open_repo()?;
    repo.import_ref(&source, &target)?;
    println!("{} {source} -> {target}", "tagged".green());
    Ok(())
}

pub fn checkout(
    ctx: &Context,
    reference: &str,
    target: &Path,
    subpath: &str,
    all: bool,
) -> Result<()> {
    let reference = parse_ref(reference)?;
    let repo = ctx.open_repo()?;
    if all {
        repo.checkout_all(&reference, subpath, target)?;
    } else {
        repo.checkout(&reference, subpath, target)?;
    }
    println!("{} {reference} -> {}", "checked out".green(), target.display());
    Ok(())
}

/// List store remotes
pub fn remotes(ctx: &Context) -> Result<()> {
    let repo = ctx.open_repo()?;
    let default = repo.default_remote().to_string();
    for name in repo.remote_list() {
        let marker = if name == default { "*" } else { " " };
        println!("{marker} {name:<16} {}", repo.remote_show_url(&name)?);
    }
    Ok(())
}

/// Print the URL of one store remote
pub fn remote_url(ctx: &Context, name: Option<&str>) -> Result<()> {
    let repo = ctx.open_repo()?;
    let name = name.unwrap_or_else(|| repo.default_remote());
    if !repo.remote_list().iter().any(|r| r == name) {
        bail!("remote '{name}' is not configured");
    }
    println!("{}", repo.remote_show_url(name)?);
    Ok(())
}
