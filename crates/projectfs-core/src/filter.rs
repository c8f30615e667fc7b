//! Rules deciding which entries belong to the resource tree.

use std::collections::HashSet;
use std::fs::Metadata;
use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::ProjectConfig;
use crate::error::ResourceError;
use crate::key::{ResourceKey, validate_segment};

/// Filtering shared by the registry scan and the change monitor.
#[derive(Debug, Clone)]
pub struct ResourceFilter {
    ignored_names: HashSet<String>,
    temp_patterns: GlobSet,
}

impl ResourceFilter {
    /// Build a filter from the project configuration.
    pub fn from_config(config: &ProjectConfig) -> Result<Self, ResourceError> {
        let mut ignored_names: HashSet<String> = config
            .ignored_names
            .iter()
            .map(|name| name.to_lowercase())
            .collect();
        ignored_names.insert(config.metadata_folder.to_lowercase());

        let mut builder = GlobSetBuilder::new();
        for pattern in &config.temp_patterns {
            let glob = Glob::new(pattern).map_err(|e| ResourceError::InvalidConfig {
                message: format!("bad temp pattern '{pattern}': {e}"),
            })?;
            builder.add(glob);
        }
        let temp_patterns = builder.build().map_err(|e| ResourceError::InvalidConfig {
            message: e.to_string(),
        })?;

        Ok(Self {
            ignored_names,
            temp_patterns,
        })
    }

    /// Check if an entry name is excluded from the tree.
    ///
    /// Names that can't form a valid key segment are excluded too, since
    /// nothing could address them.
    pub fn is_excluded_name(&self, name: &str) -> bool {
        name.starts_with('.')
            || name.starts_with('~')
            || self.ignored_names.contains(&name.to_lowercase())
            || validate_segment(name).is_err()
    }

    /// Check if a directory entry should be skipped during a scan.
    pub fn should_skip_entry(&self, name: &str, metadata: Option<&Metadata>) -> bool {
        self.is_excluded_name(name) || metadata.is_some_and(is_hidden_or_system)
    }

    /// Check if a file name looks like an editor lock file or build cache artifact.
    pub fn is_temp_file(&self, name: &str) -> bool {
        self.temp_patterns.is_match(name)
    }

    /// Check if any segment of a key is excluded.
    pub fn is_excluded_key(&self, key: &ResourceKey) -> bool {
        key.segments().any(|segment| self.is_excluded_name(segment))
    }

    /// Check if a change at `path` (resolved to `key`) should be dropped.
    ///
    /// Applies the tree filter to every segment, the temp-file heuristic to the
    /// last one, and the OS hidden flag if the entry still exists.
    pub fn is_noise(&self, key: &ResourceKey, path: &Path) -> bool {
        if key.is_root() {
            return true;
        }
        if self.is_excluded_key(key) || self.is_temp_file(key.name()) {
            return true;
        }
        std::fs::symlink_metadata(path)
            .map(|metadata| is_hidden_or_system(&metadata))
            .unwrap_or(false)
    }
}

/// Check the OS hidden/system attributes of an entry.
#[cfg(windows)]
pub fn is_hidden_or_system(metadata: &Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
    const FILE_ATTRIBUTE_SYSTEM: u32 = 0x4;
    metadata.file_attributes() & (FILE_ATTRIBUTE_HIDDEN | FILE_ATTRIBUTE_SYSTEM) != 0
}

#[cfg(not(windows))]
pub fn is_hidden_or_system(_metadata: &Metadata) -> bool {
    false // Unix marks hidden entries by name only
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> ResourceFilter {
        ResourceFilter::from_config(&ProjectConfig::new("/p")).unwrap()
    }

    #[test]
    fn test_prefix_rules() {
        let filter = filter();
        assert!(filter.is_excluded_name(".hidden"));
        assert!(filter.is_excluded_name("~lock"));
        assert!(!filter.is_excluded_name("a.txt"));
    }

    #[test]
    fn test_ignore_set() {
        let filter = filter();
        assert!(filter.is_excluded_name("__pycache__"));
        assert!(filter.is_excluded_name("node_modules"));
        assert!(filter.is_excluded_name("Bin"));
        assert!(!filter.is_excluded_name("src"));
    }

    #[test]
    fn test_temp_files() {
        let filter = filter();
        assert!(filter.is_temp_file("~$report.docx"));
        assert!(filter.is_temp_file("cache.pyc"));
        assert!(filter.is_temp_file("notes.txt~"));
        assert!(filter.is_temp_file(".~lock.sheet.ods#"));
        assert!(!filter.is_temp_file("report.docx"));
    }

    #[test]
    fn test_noise_checks_every_segment() {
        let filter = filter();
        let key = ResourceKey::new("pkg/__pycache__/mod.py").unwrap();
        assert!(filter.is_noise(&key, Path::new("/p/pkg/__pycache__/mod.py")));

        let key = ResourceKey::new("pkg/mod.py").unwrap();
        assert!(!filter.is_noise(&key, Path::new("/p/pkg/mod.py")));
        assert!(filter.is_noise(&ResourceKey::root(), Path::new("/p")));
    }
}
