//! Packing package directories into layer archives and back.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use ll_schema::LAYER_MAGIC;
use tempfile::TempDir;
use tracing::info;

use super::backend::ImageBackend;
use super::dir::LayerDir;
use super::file::LayerFile;
use crate::error::{RepoError, Result};

/// Converts between [`LayerDir`] and [`LayerFile`] using an image backend.
///
/// Owns a unique working directory under the base it was created with; the
/// directory is removed with the packager.
pub struct LayerPackager {
    workdir: TempDir,
    backend: Box<dyn ImageBackend>,
}

impl std::fmt::Debug for LayerPackager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerPackager")
            .field("workdir", &self.workdir.path())
            .finish_non_exhaustive()
    }
}

impl LayerPackager {
    /// Packager with a fresh working directory under `base`.
    pub fn new(base: &Path, backend: Box<dyn ImageBackend>) -> Result<Self> {
        fs::create_dir_all(base)?;
        let workdir = tempfile::Builder::new()
            .prefix("layer-packager-")
            .tempdir_in(base)?;
        Ok(Self { workdir, backend })
    }

    /// Working directory.
    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    /// Write `dir` as a layer archive at `output`.
    ///
    /// The metadata block is `info.json` byte for byte.
    pub fn pack(&self, dir: &LayerDir, output: &Path) -> Result<LayerFile> {
        let raw_info = dir.raw_info()?;
        let info_len = u32::try_from(raw_info.len())
            .map_err(|_| RepoError::InvalidData("info.json too large".to_string()))?;

        let image = self.workdir.path().join("image");
        self.backend.build_image(dir.path(), &image)?;

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(output)?;
        out.write_all(&LAYER_MAGIC)?;
        out.write_all(&info_len.to_le_bytes())?;
        out.write_all(&raw_info)?;
        std::io::copy(&mut File::open(&image)?, &mut out)?;
        out.sync_all()?;
        fs::remove_file(&image)?;

        info!(source = %dir.path().display(), output = %output.display(), "layer packed");
        LayerFile::open(output)
    }

    /// Unpack `layer` into `dest`. The returned directory is owning; clear its
    /// clean flag to keep it.
    pub fn unpack(&self, layer: &LayerFile, dest: &Path) -> Result<LayerDir> {
        fs::create_dir_all(dest)?;
        let unpacked = LayerDir::owned(dest);
        self.backend.extract_image(
            layer.path(),
            layer.binary_data_offset(),
            dest,
            self.workdir.path(),
        )?;
        info!(layer = %layer.path().display(), dest = %dest.display(), "layer unpacked");
        Ok(unpacked)
    }
}
