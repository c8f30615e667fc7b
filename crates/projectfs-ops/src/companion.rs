//! Companion-data files that follow resources through operations.

use std::fmt;
use std::path::PathBuf;

use projectfs_core::{ProjectConfig, ResourceKey};

/// Maps a file resource to the side file holding data about it.
///
/// The engine copies, moves and soft-deletes these files alongside the
/// resources they belong to. Folder operations apply the mapping to every
/// contained file.
pub trait CompanionData: Send + Sync + fmt::Debug {
    /// Location of the companion file for `key`, relative to the project root.
    fn companion_path(&self, key: &ResourceKey) -> PathBuf;
}

/// Mirrors the project hierarchy under the metadata folder:
/// `src/main.py` maps to `.projectfs/data/src/main.py.json`.
#[derive(Debug, Clone)]
pub struct SidecarCompanion {
    base: PathBuf,
    extension: String,
}

impl SidecarCompanion {
    /// Create a sidecar mapping rooted at `base` (relative to the project root).
    pub fn new(base: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            extension: extension.into(),
        }
    }

    /// Sidecar mapping using the configured companion folder and extension.
    pub fn from_config(config: &ProjectConfig) -> Self {
        Self::new(
            config.companion_relative_root(),
            config.companion_extension.clone(),
        )
    }
}

impl CompanionData for SidecarCompanion {
    fn companion_path(&self, key: &ResourceKey) -> PathBuf {
        let mut path = self.base.clone();
        if let Some(parent) = key.parent() {
            path.extend(parent.segments());
        }
        path.push(format!("{}.{}", key.name(), self.extension));
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sidecar_layout() {
        let companion = SidecarCompanion::from_config(&ProjectConfig::new("/p"));
        let key = ResourceKey::new("src/main.py").unwrap();
        assert_eq!(
            companion.companion_path(&key),
            PathBuf::from(".projectfs/data/src/main.py.json")
        );

        let top = ResourceKey::new("readme.md").unwrap();
        assert_eq!(
            companion.companion_path(&top),
            PathBuf::from(".projectfs/data/readme.md.json")
        );
    }
}
