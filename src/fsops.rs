use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::Path;

use crate::model::OperationKind;

/// Apply `kind` from `src` to `dst`. An existing link destination is replaced
/// only when `replace` is set, since link syscalls never overwrite.
pub fn dispatch(kind: OperationKind, src: &Path, dst: &Path, replace: bool) -> Result<()> {
    match kind {
        OperationKind::Move => mv(src, dst),
        OperationKind::Copy => cp(src, dst).map(|_| ()),
        OperationKind::LinkSoft => {
            if replace {
                clear_destination(dst)?;
            }
            symlink(src, dst)
        }
        OperationKind::LinkHard => {
            if replace {
                clear_destination(dst)?;
            }
            std::fs::hard_link(src, dst).context("hard link failed")
        }
    }
}

/// Create `dir` and its missing parents, using the permissions of `template_dir`.
pub fn ensure_dir(dir: &Path, template_dir: &Path) -> Result<()> {
    if dir.exists() {
        return Ok(());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
        let mode = std::fs::metadata(template_dir)
            .map(|m| m.permissions().mode() & 0o7777)
            .unwrap_or(0o755);
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(mode)
            .create(dir)
            .with_context(|| format!("failed to create {}", dir.display()))
    }
    #[cfg(not(unix))]
    {
        let _ = template_dir;
        std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))
    }
}

/// Move a file or directory, falling back to copy+delete across filesystems.
pub fn mv(src: &Path, dst: &Path) -> Result<()> {
    match std::fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::CrossesDevices => {
            tracing::debug!(src = %src.display(), dst = %dst.display(), "rename crosses devices, copying");
            let metadata = std::fs::symlink_metadata(src)?;
            cp(src, dst)?;
            if metadata.is_dir() {
                std::fs::remove_dir_all(src)?;
            } else {
                std::fs::remove_file(src)?;
            }
            Ok(())
        }
        Err(err) => Err(err).context("rename failed"),
    }
}

/// Copy a file, or a directory tree recursively. Modification times are kept.
pub fn cp(src: &Path, dst: &Path) -> Result<u64> {
    let metadata = std::fs::metadata(src).context("source not found")?;
    if metadata.is_file() {
        let bytes = std::fs::copy(src, dst).context("copy failed")?;
        keep_mtime(&metadata, dst)?;
        Ok(bytes)
    } else if metadata.is_dir() {
        let mut bytes = 0;
        for entry in walkdir::WalkDir::new(src) {
            let entry = entry?;
            let rel_path = entry.path().strip_prefix(src)?;
            let target_path = dst.join(rel_path);

            if entry.file_type().is_dir() {
                std::fs::create_dir_all(&target_path)?;
            } else {
                bytes += std::fs::copy(entry.path(), &target_path)?;
                keep_mtime(&entry.metadata()?, &target_path)?;
            }
        }
        Ok(bytes)
    } else {
        anyhow::bail!("unsupported file type: {:?}", metadata.file_type());
    }
}

fn keep_mtime(metadata: &std::fs::Metadata, dst: &Path) -> Result<()> {
    let mtime = filetime::FileTime::from_last_modification_time(metadata);
    filetime::set_file_mtime(dst, mtime).context("failed to preserve modification time")
}

#[cfg(unix)]
fn symlink(src: &Path, dst: &Path) -> Result<()> {
    std::os::unix::fs::symlink(src, dst).context("symlink failed")
}

#[cfg(windows)]
fn symlink(src: &Path, dst: &Path) -> Result<()> {
    if src.is_dir() {
        std::os::windows::fs::symlink_dir(src, dst).context("symlink failed")
    } else {
        std::os::windows::fs::symlink_file(src, dst).context("symlink failed")
    }
}

fn clear_destination(dst: &Path) -> Result<()> {
    match std::fs::symlink_metadata(dst) {
        Ok(_) => remove_all(dst),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Remove a file, link or directory tree. A symlink is removed itself,
/// never its target. A missing path is an error.
pub fn remove_all(path: &Path) -> Result<()> {
    let metadata = std::fs::symlink_metadata(path)
        .with_context(|| format!("{} does not exist", path.display()))?;
    if metadata.is_dir() {
        std::fs::remove_dir_all(path)?;
    } else {
        std::fs::remove_file(path)?;
    }
    Ok(())
}
