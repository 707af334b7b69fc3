//! Small filesystem helpers shared by the store and the layer codec.

use std::fs;
use std::io::Write;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::Result;

/// Write `data` to `path` via a sibling temp file and rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Remove whatever sits at `path` (file, symlink or directory). Missing is fine.
pub fn remove_any(path: &Path) -> std::io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Recursively copy `src` into `dst`, overwriting existing entries and
/// keeping everything else already in `dst`.
///
/// Symlinks are recreated, not followed. Returns the number of files copied.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<u64> {
    fs::create_dir_all(dst)?;
    let mut copied = 0;

    for entry in WalkDir::new(src).min_depth(1).follow_links(false) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| crate::RepoError::InvalidData(e.to_string()))?;
        let target = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            if fs::symlink_metadata(&target).is_ok_and(|m| !m.is_dir()) {
                remove_any(&target)?;
            }
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            remove_any(&target)?;
            let link = fs::read_link(entry.path())?;
            std::os::unix::fs::symlink(link, &target)?;
        } else {
            if fs::symlink_metadata(&target).is_ok() {
                remove_any(&target)?;
            }
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }

    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_atomic_replaces_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a/b/file");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"two");
    }

    #[test]
    fn copy_tree_merges() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir_all(src.join("bin")).unwrap();
        fs::write(src.join("bin/tool"), "new").unwrap();
        std::os::unix::fs::symlink("tool", src.join("bin/alias")).unwrap();

        fs::create_dir_all(dst.join("bin")).unwrap();
        fs::write(dst.join("bin/tool"), "old").unwrap();
        fs::write(dst.join("keep"), "kept").unwrap();

        assert_eq!(copy_tree(&src, &dst).unwrap(), 1);
        assert_eq!(fs::read_to_string(dst.join("bin/tool")).unwrap(), "new");
        assert_eq!(fs::read_to_string(dst.join("keep")).unwrap(), "kept");
        assert_eq!(
            fs::read_link(dst.join("bin/alias")).unwrap(),
            Path::new("tool")
        );
    }
}
