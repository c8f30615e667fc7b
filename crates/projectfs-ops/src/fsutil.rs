//! Blocking file system helpers shared by the operations.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use fs_extra::dir::{CopyOptions, get_dir_content};
use fs_extra::error::{Error as FsExtraError, ErrorKind as FsExtraErrorKind};

/// Check whether anything (including a dangling symlink) exists at `path`.
pub(crate) fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Create the missing ancestors of `path`.
///
/// Returns the topmost folder that had to be created, if any.
pub(crate) fn create_parents(path: &Path) -> io::Result<Option<PathBuf>> {
    let Some(parent) = path.parent() else {
        return Ok(None);
    };

    let mut topmost = None;
    let mut current = parent;
    while !exists(current) {
        topmost = Some(current.to_path_buf());
        match current.parent() {
            Some(next) => current = next,
            None => break,
        }
    }

    if topmost.is_some() {
        fs::create_dir_all(parent)?;
    }
    Ok(topmost)
}

/// Move a file or folder, creating the destination's parents.
pub(crate) fn move_path(from: &Path, to: &Path) -> io::Result<()> {
    create_parents(to)?;

    // Try rename first (fast path for same filesystem)
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }

    // Fall back to copy + delete for cross-filesystem moves
    copy_path(from, to)?;
    remove_path(from)
}

/// Copy a file or a whole folder to `to`, which must not exist.
pub(crate) fn copy_path(from: &Path, to: &Path) -> io::Result<()> {
    if fs::symlink_metadata(from)?.is_dir() {
        let mut options = CopyOptions::new();
        options.copy_inside = true;
        fs_extra::dir::copy(from, to, &options)
            .map(|_| ())
            .map_err(into_io)
    } else {
        fs::copy(from, to).map(|_| ())
    }
}

/// Remove a file or a whole folder.
pub(crate) fn remove_path(path: &Path) -> io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Check if a folder has no entries at all.
pub(crate) fn is_empty_dir(path: &Path) -> io::Result<bool> {
    Ok(fs::read_dir(path)?.next().is_none())
}

/// Files under `dir`, relative to it.
pub(crate) fn relative_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let content = get_dir_content(dir).map_err(into_io)?;
    Ok(relativize(dir, content.files))
}

/// Files and folders under `dir` (excluding `dir`), relative to it.
pub(crate) fn relative_entries(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let content = get_dir_content(dir).map_err(into_io)?;
    let mut entries = relativize(dir, content.directories);
    entries.extend(relativize(dir, content.files));
    entries.sort();
    Ok(entries)
}

fn relativize(base: &Path, paths: Vec<String>) -> Vec<PathBuf> {
    paths
        .into_iter()
        .filter_map(|p| {
            Path::new(&p)
                .strip_prefix(base)
                .ok()
                .filter(|rel| !rel.as_os_str().is_empty())
                .map(Path::to_path_buf)
        })
        .collect()
}

/// Remove `path` if it contains nothing but (nested) empty folders.
///
/// Returns true if the folder was removed. Errors are swallowed.
pub(crate) fn remove_empty_tree(path: &Path) -> bool {
    let Ok(entries) = fs::read_dir(path) else {
        return false;
    };

    let mut empty = true;
    for entry in entries.flatten() {
        let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
        if !(is_dir && remove_empty_tree(&entry.path())) {
            empty = false;
        }
    }

    empty && fs::remove_dir(path).is_ok()
}

/// Remove empty folders from `start` upwards, stopping before `stop_at`.
pub(crate) fn prune_empty_ancestors(start: &Path, stop_at: &Path) {
    let mut current = start;
    while current != stop_at && current.starts_with(stop_at) {
        if fs::remove_dir(current).is_err() {
            break;
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }
}

fn into_io(err: FsExtraError) -> io::Error {
    match err.kind {
        FsExtraErrorKind::Io(source) => source,
        _ => io::Error::other(err.to_string()),
    }
}
