//! Value types shared by the package repository: references, versions,
//! package metadata, repository configuration and layer-archive constants.

pub mod arch;
pub mod hash;
pub mod reference;
pub mod types;
pub mod version;

// Re-exports
pub use arch::*;
pub use hash::*;
pub use reference::{DEFAULT_CHANNEL, FALLBACK_CHANNEL, FuzzyReference, Module, Reference};
pub use types::*;
pub use version::{Version, latest_of};

/// Length of the magic header at the start of every layer archive.
pub const LAYER_MAGIC_LEN: usize = 40;

/// Magic header of a layer archive: the banner text, NUL-padded to
/// [`LAYER_MAGIC_LEN`] bytes.
pub const LAYER_MAGIC: [u8; LAYER_MAGIC_LEN] = *b"<<< deepin linglong layer archive >>>\0\0\0";

/// Errors raised while parsing references and their components.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    /// Wrong number of segments or an empty segment.
    #[error("malformed reference: '{0}'")]
    Malformed(String),

    /// A version component is missing or not numeric.
    #[error("invalid version: '{0}'")]
    Version(String),

    /// Unknown architecture token.
    #[error("unknown architecture: '{0}'")]
    Architecture(String),

    /// Empty or otherwise unusable module name.
    #[error("invalid module: '{0}'")]
    Module(String),
}

/// Errors raised while validating a [`RepoConfig`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The `version` key is not 1.
    #[error("unsupported config version {0}, expected 1")]
    UnsupportedVersion(u32),

    /// `defaultRepo` names a remote missing from `repos`.
    #[error("default repo '{0}' is not configured")]
    UnknownDefault(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_is_banner_then_padding() {
        let banner = b"<<< deepin linglong layer archive >>>";
        assert_eq!(&LAYER_MAGIC[..banner.len()], banner);
        assert!(LAYER_MAGIC[banner.len()..].iter().all(|b| *b == 0));
    }
}
