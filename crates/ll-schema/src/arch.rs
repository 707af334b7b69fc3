//! CPU architectures a package can be built for.

use crate::ReferenceError;

/// CPU architecture of a package build.
///
/// The architecture is the fourth component of a [`Reference`](crate::Reference)
/// and part of the key under which a tree is stored.
///
/// # Example
///
/// ```
/// use ll_schema::Architecture;
///
/// let arch: Architecture = "aarch64".parse().unwrap();
/// assert_eq!(arch.as_str(), "arm64");
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum Architecture {
    /// 64-bit x86 (`x86_64`)
    X86_64,
    /// 64-bit ARM (`arm64`, also accepted as `aarch64`)
    Arm64,
    /// LoongArch, old-world ABI (`loongarch64`)
    Loongarch64,
    /// LoongArch, new-world ABI (`loong64`)
    Loong64,
    /// Sunway (`sw64`)
    Sw64,
    /// 64-bit MIPS little endian (`mips64`)
    Mips64,
}

impl Architecture {
    /// Architecture of the machine this binary was compiled for.
    ///
    /// Falls back to `x86_64` on targets the repository does not publish for.
    pub fn host() -> Self {
        #[cfg(target_arch = "aarch64")]
        {
            Self::Arm64
        }
        #[cfg(target_arch = "loongarch64")]
        {
            Self::Loong64
        }
        #[cfg(target_arch = "mips64")]
        {
            Self::Mips64
        }
        #[cfg(not(any(
            target_arch = "aarch64",
            target_arch = "loongarch64",
            target_arch = "mips64"
        )))]
        {
            Self::X86_64
        }
    }

    /// Canonical token used in references and store paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Arm64 => "arm64",
            Self::Loongarch64 => "loongarch64",
            Self::Loong64 => "loong64",
            Self::Sw64 => "sw64",
            Self::Mips64 => "mips64",
        }
    }

    /// GNU target triple prefix, as used in library directory names.
    pub fn triplet(&self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64-linux-gnu",
            Self::Arm64 => "aarch64-linux-gnu",
            Self::Loongarch64 | Self::Loong64 => "loongarch64-linux-gnu",
            Self::Sw64 => "sw_64-linux-gnu",
            Self::Mips64 => "mips64el-linux-gnuabi64",
        }
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Architecture {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x86_64" => Ok(Self::X86_64),
            "arm64" | "aarch64" => Ok(Self::Arm64),
            "loongarch64" => Ok(Self::Loongarch64),
            "loong64" => Ok(Self::Loong64),
            "sw64" => Ok(Self::Sw64),
            "mips64" => Ok(Self::Mips64),
            _ => Err(ReferenceError::Architecture(s.to_string())),
        }
    }
}

impl TryFrom<String> for Architecture {
    type Error = ReferenceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Architecture> for String {
    fn from(arch: Architecture) -> Self {
        arch.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aarch64_is_an_alias_for_arm64() {
        assert_eq!("aarch64".parse::<Architecture>().unwrap(), Architecture::Arm64);
        assert_eq!(Architecture::Arm64.to_string(), "arm64");
    }

    #[test]
    fn unknown_token_is_rejected() {
        let err = "i386".parse::<Architecture>().unwrap_err();
        assert!(matches!(err, ReferenceError::Architecture(ref s) if s == "i386"));
        // tokens are case sensitive
        assert!("X86_64".parse::<Architecture>().is_err());
    }

    #[test]
    fn serde_uses_the_canonical_token() {
        let json = serde_json::to_string(&Architecture::Loong64).unwrap();
        assert_eq!(json, "\"loong64\"");
        let back: Architecture = serde_json::from_str("\"sw64\"").unwrap();
        assert_eq!(back, Architecture::Sw64);
        assert!(serde_json::from_str::<Architecture>("\"ppc\"").is_err());
    }
}
