//! Project configuration and key/path resolution.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::ResourceError;
use crate::key::ResourceKey;

/// Default name of the project-local metadata folder.
pub const DEFAULT_METADATA_FOLDER: &str = ".projectfs";

/// Default debounce delay before a rescan, in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 250;

/// Default bound of the undo and redo stacks.
pub const DEFAULT_MAX_UNDO: usize = 50;

/// Folder names excluded from the resource tree regardless of prefix rules.
pub const DEFAULT_IGNORED_NAMES: &[&str] = &[
    DEFAULT_METADATA_FOLDER,
    "bin",
    "obj",
    "target",
    ".git",
    ".svn",
    ".hg",
    "__pycache__",
    ".venv",
    "node_modules",
    ".ipynb_checkpoints",
];

/// File name patterns treated as transient editor or cache artifacts.
pub const DEFAULT_TEMP_PATTERNS: &[&str] = &[
    "~$*",
    "*.tmp",
    "*.temp",
    "*~",
    "*.swp",
    "*.swx",
    "*.pyc",
    "*.pyo",
    ".~lock.*",
    "*.crdownload",
    "*.part",
];

/// Configuration for a project session.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ProjectConfig {
    /// Absolute path of the project folder.
    pub root: PathBuf,

    /// Name of the metadata folder directly under the root.
    #[builder(default = "DEFAULT_METADATA_FOLDER.to_string()")]
    #[serde(default = "default_metadata_folder")]
    pub metadata_folder: String,

    /// Name of the trash folder inside the metadata folder.
    #[builder(default = "\"trash\".to_string()")]
    #[serde(default = "default_trash_folder")]
    pub trash_folder: String,

    /// Name of the companion-data folder inside the metadata folder.
    #[builder(default = "\"data\".to_string()")]
    #[serde(default = "default_companion_folder")]
    pub companion_folder: String,

    /// Extension appended to companion-data files.
    #[builder(default = "\"json\".to_string()")]
    #[serde(default = "default_companion_extension")]
    pub companion_extension: String,

    /// Debounce delay in milliseconds.
    #[builder(default = "DEFAULT_DEBOUNCE_MS")]
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Maximum entries on each of the undo and redo stacks.
    #[builder(default = "DEFAULT_MAX_UNDO")]
    #[serde(default = "default_max_undo")]
    pub max_undo: usize,

    /// Entry names that are never part of the tree.
    #[builder(default = "default_ignored_names()")]
    #[serde(default = "default_ignored_names")]
    pub ignored_names: Vec<String>,

    /// Glob patterns for temporary files ignored by the monitor.
    #[builder(default = "default_temp_patterns()")]
    #[serde(default = "default_temp_patterns")]
    pub temp_patterns: Vec<String>,
}

fn default_metadata_folder() -> String {
    DEFAULT_METADATA_FOLDER.to_string()
}

fn default_trash_folder() -> String {
    "trash".to_string()
}

fn default_companion_folder() -> String {
    "data".to_string()
}

fn default_companion_extension() -> String {
    "json".to_string()
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_max_undo() -> usize {
    DEFAULT_MAX_UNDO
}

fn default_ignored_names() -> Vec<String> {
    DEFAULT_IGNORED_NAMES.iter().map(|s| s.to_string()).collect()
}

fn default_temp_patterns() -> Vec<String> {
    DEFAULT_TEMP_PATTERNS.iter().map(|s| s.to_string()).collect()
}

impl ProjectConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.root {
            Some(ref root) if root.as_os_str().is_empty() => {
                return Err("Root path cannot be empty".to_string());
            }
            None => return Err("Root path is required".to_string()),
            _ => {}
        }

        for (label, value) in [
            ("metadata_folder", &self.metadata_folder),
            ("trash_folder", &self.trash_folder),
            ("companion_folder", &self.companion_folder),
        ] {
            if let Some(name) = value {
                crate::key::validate_segment(name).map_err(|e| format!("{label}: {e}"))?;
            }
        }

        if self.max_undo == Some(0) {
            return Err("max_undo must be at least 1".to_string());
        }

        Ok(())
    }
}

impl ProjectConfig {
    /// Create a new project config builder.
    pub fn builder() -> ProjectConfigBuilder {
        ProjectConfigBuilder::default()
    }

    /// Create a config with defaults for the given project folder.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            metadata_folder: default_metadata_folder(),
            trash_folder: default_trash_folder(),
            companion_folder: default_companion_folder(),
            companion_extension: default_companion_extension(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            max_undo: DEFAULT_MAX_UNDO,
            ignored_names: default_ignored_names(),
            temp_patterns: default_temp_patterns(),
        }
    }

    /// Debounce delay as a duration.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Absolute path of the metadata folder.
    pub fn metadata_root(&self) -> PathBuf {
        self.root.join(&self.metadata_folder)
    }

    /// Absolute path of the trash root.
    pub fn trash_root(&self) -> PathBuf {
        self.metadata_root().join(&self.trash_folder)
    }

    /// Companion-data folder relative to the project root.
    pub fn companion_relative_root(&self) -> PathBuf {
        Path::new(&self.metadata_folder).join(&self.companion_folder)
    }

    /// Absolute path for a key.
    pub fn resolve_path(&self, key: &ResourceKey) -> PathBuf {
        key.segments()
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    /// Key for an absolute (or root-relative) path.
    ///
    /// `.` and `..` components are folded lexically before the prefix check,
    /// so `root/a/../b` resolves to `b` while `root/../x` is rejected.
    pub fn resolve_key(&self, path: &Path) -> Result<ResourceKey, ResourceError> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        let normalized = lexical_normalize(&absolute);
        let root = lexical_normalize(&self.root);

        let relative = normalized
            .strip_prefix(&root)
            .map_err(|_| ResourceError::OutsideProject {
                path: path.to_path_buf(),
            })?;

        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(name) => segments.push(name.to_string_lossy().into_owned()),
                _ => {
                    return Err(ResourceError::OutsideProject {
                        path: path.to_path_buf(),
                    });
                }
            }
        }

        ResourceKey::from_segments(segments)
    }
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

/// Fold `.` and `..` components without touching the file system.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
