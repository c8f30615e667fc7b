//! The resource registry: addressing, lookup and rescan.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::slice::ParallelSliceMut;

use projectfs_core::{
    NotificationHub, ProjectConfig, ResourceError, ResourceFilter, ResourceKey,
    ResourceNotification,
};

use crate::scanner::ProjectScanner;
use crate::tree::{Resource, ResourceTree};

/// Owns the canonical in-memory mirror of a project folder.
///
/// The registry is meant to be owned by one consumer; change monitors ask it
/// to rescan by message rather than touching it directly.
#[derive(Debug)]
pub struct Registry {
    config: Arc<ProjectConfig>,
    scanner: ProjectScanner,
    tree: Arc<ResourceTree>,
    expanded: HashSet<ResourceKey>,
    hub: NotificationHub,
}

impl Registry {
    /// Create a registry holding an empty root. Call [`Registry::rescan`] to populate it.
    pub fn new(config: Arc<ProjectConfig>, hub: NotificationHub) -> Result<Self, ResourceError> {
        let filter = ResourceFilter::from_config(&config)?;
        let tree = Arc::new(ResourceTree::empty(config.root.clone(), 0));

        Ok(Self {
            config,
            scanner: ProjectScanner::new(filter),
            tree,
            expanded: HashSet::new(),
            hub,
        })
    }

    /// Project configuration.
    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// Current tree snapshot. Stays valid across later rescans.
    pub fn tree(&self) -> Arc<ResourceTree> {
        Arc::clone(&self.tree)
    }

    /// The root folder resource.
    pub fn root(&self) -> &Resource {
        self.tree.root()
    }

    /// Key of a resource, built from its parent chain.
    pub fn resolve_resource_key(&self, resource: &Resource) -> Result<ResourceKey, ResourceError> {
        self.tree
            .key_of(resource.id)
            .ok_or_else(|| ResourceError::Stale {
                name: resource.name.to_string(),
            })
    }

    /// Absolute path for a key.
    pub fn resolve_path(&self, key: &ResourceKey) -> PathBuf {
        self.config.resolve_path(key)
    }

    /// Key for a path inside the project.
    pub fn resolve_key(&self, path: &Path) -> Result<ResourceKey, ResourceError> {
        self.config.resolve_key(path)
    }

    /// Find the resource for a key. The empty key is the root.
    pub fn lookup(&self, key: &ResourceKey) -> Result<&Resource, ResourceError> {
        self.tree
            .find(key)
            .ok_or_else(|| ResourceError::not_found(key))
    }

    /// Return `key` with the on-disk casing of every segment.
    ///
    /// An exact name match wins; otherwise the first case-insensitive match
    /// is used. Fails if any segment has no match on disk.
    pub fn normalize(&self, key: &ResourceKey) -> Result<ResourceKey, ResourceError> {
        let mut path = self.config.root.clone();
        let mut real = ResourceKey::root();

        for segment in key.segments() {
            let entries = std::fs::read_dir(&path).map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ResourceError::not_found(key),
                _ => ResourceError::io(&path, e),
            })?;

            let lowered = segment.to_lowercase();
            let mut matched: Option<String> = None;
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name == segment {
                    matched = Some(name);
                    break;
                }
                if matched.is_none() && name.to_lowercase() == lowered {
                    matched = Some(name);
                }
            }

            let name = matched.ok_or_else(|| ResourceError::not_found(key))?;
            path.push(&name);
            real = real.join(&name)?;
        }

        Ok(real)
    }

    /// Rebuild the tree from disk and publish [`ResourceNotification::RegistryUpdated`].
    ///
    /// The previous tree is discarded wholesale; nothing is patched in place.
    pub fn rescan(&mut self) -> Result<(), ResourceError> {
        let generation = self.tree.generation() + 1;
        let tree = self
            .scanner
            .scan(&self.config.root, generation, &self.expanded)?;

        // Forget expanded folders that no longer exist
        self.expanded.retain(|key| tree.find(key).is_some_and(Resource::is_folder));

        for warning in &tree.warnings {
            tracing::debug!("scan warning at {}: {}", warning.path.display(), warning.message);
        }

        self.tree = Arc::new(tree);
        self.hub.publish(ResourceNotification::RegistryUpdated);
        Ok(())
    }

    /// Every file resource as `(key, absolute path)`, sorted by path.
    pub fn all_files(&self) -> Vec<(ResourceKey, PathBuf)> {
        let mut files = Vec::with_capacity(self.tree.stats.files);
        self.tree.walk(|key, resource| {
            if resource.is_file() {
                files.push((key.clone(), self.config.resolve_path(key)));
            }
        });
        files.par_sort_by(|a, b| a.1.cmp(&b.1));
        files
    }

    /// Mark a folder expanded or collapsed. Takes effect at the next rescan.
    pub fn set_folder_expanded(&mut self, key: &ResourceKey, expanded: bool) {
        if expanded {
            self.expanded.insert(key.clone());
        } else {
            self.expanded.remove(key);
        }
    }

    /// Whether a folder is marked expanded.
    pub fn is_folder_expanded(&self, key: &ResourceKey) -> bool {
        self.expanded.contains(key)
    }

    /// All folders marked expanded, sorted.
    pub fn expanded_folders(&self) -> Vec<ResourceKey> {
        let mut keys: Vec<_> = self.expanded.iter().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of file resources in the current tree.
    pub fn file_count(&self) -> usize {
        self.tree.stats.files
    }

    /// Number of folder resources in the current tree, excluding the root.
    pub fn folder_count(&self) -> usize {
        self.tree.stats.folders
    }
}
