//! JWalk-based project scanner.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use compact_str::CompactString;
use itertools::Itertools;
use jwalk::{Parallelism, WalkDir};

use projectfs_core::{ResourceError, ResourceFilter, ResourceKey};

use crate::tree::{ResourceId, ResourceTree, ScanWarning, TreeBuilder, compare_siblings};

/// Scanner that rebuilds a [`ResourceTree`] from disk.
#[derive(Debug, Clone)]
pub struct ProjectScanner {
    filter: Arc<ResourceFilter>,
}

/// Entry collected during traversal.
#[derive(Debug)]
struct EntryInfo {
    name: CompactString,
    path: PathBuf,
    is_dir: bool,
}

impl ProjectScanner {
    /// Create a scanner applying the given filter.
    pub fn new(filter: ResourceFilter) -> Self {
        Self {
            filter: Arc::new(filter),
        }
    }

    /// Scan `root_path` into a brand-new tree of the given generation.
    ///
    /// Folders whose keys are in `expanded` are flagged expanded.
    pub fn scan(
        &self,
        root_path: &Path,
        generation: u64,
        expanded: &HashSet<ResourceKey>,
    ) -> Result<ResourceTree, ResourceError> {
        let start = Instant::now();

        let root_metadata =
            std::fs::metadata(root_path).map_err(|e| ResourceError::io(root_path, e))?;
        if !root_metadata.is_dir() {
            return Err(ResourceError::InvalidConfig {
                message: format!("project root is not a folder: {}", root_path.display()),
            });
        }

        let mut warnings = Vec::new();
        let mut entries = self.collect_entries(root_path, &mut warnings);

        let mut builder = TreeBuilder::new(generation);
        let root_id = builder.push_folder(
            None,
            CompactString::default(),
            expanded.contains(&ResourceKey::root()),
        );
        Self::build_children(
            &mut builder,
            root_id,
            root_path,
            &ResourceKey::root(),
            0,
            &mut entries,
            expanded,
        );

        let tree = builder.finish(root_path.to_path_buf(), start.elapsed(), warnings);
        tracing::debug!(
            files = tree.stats.files,
            folders = tree.stats.folders,
            elapsed_ms = tree.scan_duration.as_millis() as u64,
            "scanned {}",
            root_path.display()
        );
        Ok(tree)
    }

    /// Collect all entries using jwalk, grouped by parent folder.
    fn collect_entries(
        &self,
        root_path: &Path,
        warnings: &mut Vec<ScanWarning>,
    ) -> HashMap<PathBuf, Vec<EntryInfo>> {
        let filter = Arc::clone(&self.filter);

        let walker = WalkDir::new(root_path)
            .parallelism(Parallelism::RayonDefaultPool {
                busy_timeout: std::time::Duration::from_millis(100),
            })
            .skip_hidden(false)
            .follow_links(false)
            .min_depth(1)
            // Filtered folders are dropped here so they are never descended into
            .process_read_dir(move |_depth, _path, _state, children| {
                children.retain(|entry| match entry {
                    Ok(entry) => {
                        let name = entry.file_name.to_string_lossy();
                        let metadata = if cfg!(windows) {
                            entry.metadata().ok()
                        } else {
                            None
                        };
                        let kind_ok = entry.file_type.is_dir() || entry.file_type.is_file();
                        kind_ok && !filter.should_skip_entry(&name, metadata.as_ref())
                    }
                    Err(_) => true,
                });
            });

        let mut entries_by_parent: HashMap<PathBuf, Vec<EntryInfo>> = HashMap::new();

        for entry_result in walker {
            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    let path = err.path().map(|p| p.to_path_buf()).unwrap_or_default();
                    warnings.push(ScanWarning {
                        path,
                        message: err.to_string(),
                    });
                    continue;
                }
            };

            let path = entry.path();
            let Some(parent) = path.parent() else { continue };

            entries_by_parent
                .entry(parent.to_path_buf())
                .or_default()
                .push(EntryInfo {
                    name: CompactString::new(entry.file_name.to_string_lossy()),
                    is_dir: entry.file_type.is_dir(),
                    path: path.clone(),
                });
        }

        entries_by_parent
    }

    /// Recursively attach the sorted children of `path` under `parent`.
    fn build_children(
        builder: &mut TreeBuilder,
        parent: ResourceId,
        path: &Path,
        key: &ResourceKey,
        depth: usize,
        entries_by_parent: &mut HashMap<PathBuf, Vec<EntryInfo>>,
        expanded: &HashSet<ResourceKey>,
    ) {
        builder.record_depth(depth);

        let children = entries_by_parent
            .remove(path)
            .unwrap_or_default()
            .into_iter()
            .sorted_by(|a, b| compare_siblings(a.is_dir, &a.name, b.is_dir, &b.name));

        for entry in children {
            let Ok(child_key) = key.join(&entry.name) else {
                continue;
            };

            if entry.is_dir {
                let id = builder.push_folder(
                    Some(parent),
                    entry.name,
                    expanded.contains(&child_key),
                );
                Self::build_children(
                    builder,
                    id,
                    &entry.path,
                    &child_key,
                    depth + 1,
                    entries_by_parent,
                    expanded,
                );
            } else {
                builder.push_file(parent, entry.name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use projectfs_core::ProjectConfig;
    use tempfile::TempDir;

    fn scanner_for(temp: &TempDir) -> ProjectScanner {
        let config = ProjectConfig::new(temp.path());
        ProjectScanner::new(ResourceFilter::from_config(&config).unwrap())
    }

    #[test]
    fn test_scan_filters_and_sorts() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::create_dir(root.join("B")).unwrap();
        fs::write(root.join(".hidden"), "h").unwrap();
        fs::write(root.join("~lock"), "l").unwrap();

        let tree = scanner_for(&temp).scan(root, 1, &HashSet::new()).unwrap();

        let names: Vec<_> = tree
            .children(tree.root().id)
            .map(|r| r.name.to_string())
            .collect();
        assert_eq!(names, vec!["B", "a.txt"]);
    }

    #[test]
    fn test_ignored_folders_are_not_descended() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("pkg/__pycache__")).unwrap();
        fs::write(root.join("pkg/__pycache__/mod.cpython.pyc"), "x").unwrap();
        fs::write(root.join("pkg/mod.py"), "x").unwrap();
        fs::create_dir_all(root.join(".projectfs/trash")).unwrap();

        let tree = scanner_for(&temp).scan(root, 1, &HashSet::new()).unwrap();

        assert_eq!(tree.stats.files, 1);
        assert_eq!(tree.stats.folders, 1);
        assert!(tree.find(&ResourceKey::new("pkg/mod.py").unwrap()).is_some());
    }

    #[test]
    fn test_scan_missing_root() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope");
        assert!(scanner_for(&temp)
            .scan(&missing, 1, &HashSet::new())
            .is_err());
    }
}
