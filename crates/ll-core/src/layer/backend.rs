//! Filesystem image backends.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, warn};

use crate::error::{RepoError, Result};
use crate::fsutil::copy_tree;

/// Builds and reads the read-only image embedded in a layer archive.
pub trait ImageBackend: Send + Sync {
    /// Write an image of `source` to `output`.
    fn build_image(&self, source: &Path, output: &Path) -> Result<()>;

    /// Copy the contents of the image that starts `offset` bytes into
    /// `archive` into `dest`. `workdir` is private scratch space.
    fn extract_image(&self, archive: &Path, offset: u64, dest: &Path, workdir: &Path) -> Result<()>;
}

/// EROFS images built with `mkfs.erofs` and read back through `erofsfuse`.
#[derive(Debug, Clone)]
pub struct ErofsBackend {
    mkfs: PathBuf,
    fuse: PathBuf,
    umount: PathBuf,
}

impl ErofsBackend {
    /// Locate the tools on `PATH`.
    ///
    /// # Errors
    ///
    /// `NotFound` naming the first missing tool.
    pub fn locate() -> Result<Self> {
        let find = |tool: &str| {
            which::which(tool).map_err(|_| RepoError::NotFound(format!("{tool} in PATH")))
        };
        Ok(Self {
            mkfs: find("mkfs.erofs")?,
            fuse: find("erofsfuse")?,
            umount: find("umount")?,
        })
    }
}

fn run(cmd: &mut Command) -> Result<()> {
    debug!(?cmd, "running");
    let output = cmd.output()?;
    if output.status.success() {
        return Ok(());
    }
    Err(RepoError::transaction(format!(
        "{:?} failed ({}): {}",
        cmd.get_program(),
        output.status,
        String::from_utf8_lossy(&output.stderr).trim()
    )))
}

impl ImageBackend for ErofsBackend {
    fn build_image(&self, source: &Path, output: &Path) -> Result<()> {
        run(Command::new(&self.mkfs)
            .arg("-zlz4hc,9")
            .arg(output)
            .arg(source))
    }

    fn extract_image(&self, archive: &Path, offset: u64, dest: &Path, workdir: &Path) -> Result<()> {
        let mount_point = workdir.join("unpack");
        std::fs::create_dir_all(&mount_point)?;

        run(Command::new(&self.fuse)
            .arg(format!("--offset={offset}"))
            .arg(archive)
            .arg(&mount_point))?;

        let copied = copy_tree(&mount_point, dest);

        if let Err(e) = run(Command::new(&self.umount).arg(&mount_point)) {
            warn!(mount = %mount_point.display(), error = %e, "unmount failed");
        }
        copied.map(|files| debug!(files, dest = %dest.display(), "image extracted"))
    }
}
