//! Version resolution.
//!
//! Three ways to turn "latest of this app" into a concrete [`Reference`]:
//! scanning the legacy `layers/` checkout directory, scanning refs already in
//! the store, or asking the remote catalog.

use std::fs;
use std::path::Path;

use ll_schema::{
    Architecture, DEFAULT_CHANNEL, FALLBACK_CHANNEL, FuzzyReference, Module, Reference, Version,
    latest_of,
};
use tracing::{debug, info, warn};

use crate::error::{RepoError, Result};
use crate::paths::Layout;
use crate::remote::RemoteApi;
use crate::store::{Repo, package_info};

/// Name of the marker directory that pins the latest version of an app.
pub const LATEST_MARKER: &str = "latest";

/// Latest version of `app_id` checked out under
/// `<root>/layers/<channel>/<app_id>/` whose version starts with `prefix`.
///
/// A `latest` entry in that directory wins over the numeric scan when the
/// version it names matches `prefix`. It may be a symlink to a version
/// directory or a directory carrying `<arch>/info.json`. A prefix of
/// `"latest"` means no prefix.
///
/// The result is for the host architecture.
///
/// # Errors
///
/// `NotFound` when the app directory is missing or no version matches;
/// `InvalidData` when a `latest` marker exists but names no version.
pub fn latest_of_ref(
    layout: &Layout,
    channel: &str,
    app_id: &str,
    prefix: &str,
) -> Result<Reference> {
    let prefix = if prefix == LATEST_MARKER { "" } else { prefix };
    let dir = layout.app_layers_dir(channel, app_id);
    let host = Architecture::host();

    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(RepoError::NotFound(format!("{channel}:{app_id}")));
        }
        Err(e) => return Err(e.into()),
    };

    let mut names = Vec::new();
    for entry in entries {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if name == LATEST_MARKER {
            let version = read_latest_marker(&dir.join(LATEST_MARKER), host)?;
            if version.has_prefix(prefix) {
                debug!(app_id, %version, "using latest marker");
                return Ok(Reference::new(app_id, version, host).with_channel(channel));
            }
            continue;
        }
        names.push(name);
    }

    let candidates: Vec<&str> = names
        .iter()
        .map(String::as_str)
        .filter(|name| Version::parse(name).is_ok_and(|v| v.has_prefix(prefix)))
        .collect();

    let version = latest_of(candidates).ok_or_else(|| {
        RepoError::NotFound(format!("{channel}:{app_id} matching '{prefix}'"))
    })?;
    Ok(Reference::new(app_id, version, host).with_channel(channel))
}

fn read_latest_marker(path: &Path, arch: Architecture) -> Result<Version> {
    let invalid = || RepoError::InvalidData(format!("{} names no version", path.display()));

    if fs::symlink_metadata(path)?.file_type().is_symlink() {
        let target = fs::read_link(path)?;
        let name = target.file_name().ok_or_else(invalid)?;
        return Version::parse(&name.to_string_lossy()).map_err(|_| invalid());
    }

    match package_info(&path.join(arch.as_str())) {
        Ok(info) => Version::parse(&info.version).map_err(|_| invalid()),
        Err(RepoError::NotFound(_)) => Err(invalid()),
        Err(e) => Err(e),
    }
}

/// Greatest stored runtime ref matching `fuzzy`.
///
/// The requested channel (default `main`) is searched first. When that
/// channel is `main`, pinned or not, and has nothing, `linglong` is searched
/// once more.
///
/// # Errors
///
/// `NotFound` if nothing matches.
pub fn local_latest_ref(repo: &dyn Repo, fuzzy: &FuzzyReference) -> Result<Reference> {
    let refs = repo.list_local_refs()?;
    let runtime = Module::runtime();

    let pick = |channel: &str| {
        let query = FuzzyReference {
            channel: Some(channel.to_string()),
            ..fuzzy.clone()
        };
        refs.iter()
            .filter(|r| r.module == runtime && query.matches(r))
            .max_by(|a, b| a.version.cmp(&b.version))
            .cloned()
    };

    let channel = fuzzy.channel_or_default();
    if let Some(found) = pick(channel) {
        return Ok(found);
    }
    if channel == DEFAULT_CHANNEL {
        if let Some(found) = pick(FALLBACK_CHANNEL) {
            return Ok(found);
        }
    }
    Err(RepoError::NotFound(fuzzy.to_string()))
}

/// Newest candidate the remote catalog offers for `fuzzy` in `repo_name`.
///
/// An empty answer on channel `main` is retried once on `linglong`. Candidates
/// with an unparseable version or architecture are skipped; among the rest the
/// greatest version wins and ties keep the first in server order.
///
/// # Errors
///
/// `NotFound` if the final answer is empty, `InvalidData` if no candidate
/// parses, or whatever the remote call fails with.
pub async fn remote_latest_ref(
    remote: &dyn RemoteApi,
    repo_name: &str,
    fuzzy: &FuzzyReference,
) -> Result<Reference> {
    if fuzzy.has_tweak() {
        warn!(reference = %fuzzy, "version pins a tweak; only that build can match");
    }

    let mut query = FuzzyReference {
        channel: Some(fuzzy.channel_or_default().to_string()),
        ..fuzzy.clone()
    };
    let mut candidates = remote.fuzzy_search(&query, repo_name).await?;

    if candidates.is_empty() && query.channel_or_default() == DEFAULT_CHANNEL {
        info!(app_id = %fuzzy.app_id, "nothing on {DEFAULT_CHANNEL}, retrying on {FALLBACK_CHANNEL}");
        query.channel = Some(FALLBACK_CHANNEL.to_string());
        candidates = remote.fuzzy_search(&query, repo_name).await?;
    }

    if candidates.is_empty() {
        return Err(RepoError::NotFound(fuzzy.to_string()));
    }

    let channel = query.channel_or_default();
    let mut best: Option<Reference> = None;
    for candidate in &candidates {
        let reference = match candidate.to_reference(channel) {
            Ok(r) => r,
            Err(e) => {
                warn!(app_id = %candidate.app_id, version = %candidate.version, error = %e, "skipping candidate");
                continue;
            }
        };
        if best.as_ref().is_none_or(|b| reference.version > b.version) {
            best = Some(reference);
        }
    }

    best.ok_or_else(|| {
        RepoError::InvalidData(format!("no usable candidate among {} for {fuzzy}", candidates.len()))
    })
}
