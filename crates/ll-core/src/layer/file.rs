//! Reading layer archive headers.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use ll_schema::{LAYER_MAGIC, LAYER_MAGIC_LEN, PackageInfo};

use crate::error::{RepoError, Result};

/// Size of the little-endian length that precedes the metadata.
pub const INFO_LEN_SIZE: usize = 4;

/// An opened layer archive: `magic | u32 LE length N | N bytes info.json | image`.
#[derive(Debug, Clone)]
pub struct LayerFile {
    path: PathBuf,
    raw_info: Vec<u8>,
}

impl LayerFile {
    /// Open `path` and read its header.
    ///
    /// # Errors
    ///
    /// `NotFound` if the file is missing, `InvalidData` if the magic does not
    /// match or the header is truncated.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RepoError::NotFound(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let truncated = |what: &str| {
            RepoError::InvalidData(format!("{}: truncated {what}", path.display()))
        };

        let mut magic = [0u8; LAYER_MAGIC_LEN];
        file.read_exact(&mut magic).map_err(|_| truncated("magic"))?;
        if magic != LAYER_MAGIC {
            return Err(RepoError::InvalidData(format!(
                "{} is not a layer archive",
                path.display()
            )));
        }

        let mut len = [0u8; INFO_LEN_SIZE];
        file.read_exact(&mut len).map_err(|_| truncated("metadata length"))?;
        let len = u32::from_le_bytes(len) as usize;

        let mut raw_info = vec![0u8; len];
        file.read_exact(&mut raw_info).map_err(|_| truncated("metadata"))?;

        Ok(Self {
            path: path.to_path_buf(),
            raw_info,
        })
    }

    /// Archive location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Length of the metadata block.
    pub fn size_of_info(&self) -> u32 {
        u32::try_from(self.raw_info.len()).unwrap_or(u32::MAX)
    }

    /// Metadata bytes exactly as stored.
    pub fn raw_info(&self) -> &[u8] {
        &self.raw_info
    }

    /// Parsed metadata.
    pub fn info(&self) -> Result<PackageInfo> {
        serde_json::from_slice(&self.raw_info)
            .map_err(|e| RepoError::InvalidData(format!("{}: {e}", self.path.display())))
    }

    /// Byte offset of the filesystem image.
    pub fn binary_data_offset(&self) -> u64 {
        (LAYER_MAGIC_LEN + INFO_LEN_SIZE + self.raw_info.len()) as u64
    }

    /// Copy the image bytes into `dest`.
    pub fn extract_image(&self, dest: &Path) -> Result<u64> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.binary_data_offset()))?;
        let mut out = File::create(dest)?;
        Ok(std::io::copy(&mut file, &mut out)?)
    }
}
