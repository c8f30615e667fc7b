//! Arena-backed resource tree.

use std::cmp::Ordering;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use compact_str::CompactString;

use projectfs_core::ResourceKey;

/// Handle to a resource inside one particular [`ResourceTree`].
///
/// Handles carry the generation of the scan that produced them, so a handle
/// kept across a rescan never silently resolves to a different node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId {
    generation: u64,
    index: u32,
}

impl ResourceId {
    /// Generation of the tree this handle belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Type of resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    /// Regular file.
    File,
    /// Folder with ordered children.
    Folder {
        /// Child handles: folders first, then files, each case-insensitively sorted.
        children: Vec<ResourceId>,
        /// Whether consumers show this folder expanded.
        expanded: bool,
    },
}

/// A single file or folder in the tree.
#[derive(Debug, Clone)]
pub struct Resource {
    /// Handle of this node.
    pub id: ResourceId,
    /// Last path segment (empty for the root).
    pub name: CompactString,
    /// Parent folder. Non-owning; `None` only for the root.
    pub parent: Option<ResourceId>,
    /// File or folder payload.
    pub kind: ResourceKind,
}

impl Resource {
    /// Check if this is a folder.
    pub fn is_folder(&self) -> bool {
        matches!(self.kind, ResourceKind::Folder { .. })
    }

    /// Check if this is a file.
    pub fn is_file(&self) -> bool {
        matches!(self.kind, ResourceKind::File)
    }

    /// Child handles (empty for files).
    pub fn children(&self) -> &[ResourceId] {
        match &self.kind {
            ResourceKind::Folder { children, .. } => children,
            ResourceKind::File => &[],
        }
    }

    /// Expanded flag (always false for files).
    pub fn is_expanded(&self) -> bool {
        matches!(self.kind, ResourceKind::Folder { expanded: true, .. })
    }
}

/// Counts gathered while building a tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// Number of file resources.
    pub files: usize,
    /// Number of folder resources, excluding the root.
    pub folders: usize,
    /// Deepest folder nesting reached.
    pub max_depth: usize,
}

/// Non-fatal problem hit while scanning.
#[derive(Debug, Clone)]
pub struct ScanWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
}

/// One immutable snapshot of the project hierarchy.
#[derive(Debug, Clone)]
pub struct ResourceTree {
    generation: u64,
    nodes: Vec<Resource>,
    /// Project folder this tree mirrors.
    pub root_path: PathBuf,
    /// When the snapshot was taken.
    pub scanned_at: SystemTime,
    /// How long the scan took.
    pub scan_duration: Duration,
    /// Summary counts.
    pub stats: TreeStats,
    /// Warnings encountered during the scan.
    pub warnings: Vec<ScanWarning>,
}

impl ResourceTree {
    /// A tree holding only an empty root folder.
    pub fn empty(root_path: PathBuf, generation: u64) -> Self {
        let mut builder = TreeBuilder::new(generation);
        builder.push_folder(None, CompactString::default(), false);
        builder.finish(root_path, Duration::ZERO, Vec::new())
    }

    /// Generation number; increases with every rescan.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The root folder.
    pub fn root(&self) -> &Resource {
        &self.nodes[0]
    }

    /// Resolve a handle. Fails for handles from other generations.
    pub fn get(&self, id: ResourceId) -> Option<&Resource> {
        if id.generation != self.generation {
            return None;
        }
        self.nodes.get(id.index as usize)
    }

    /// Iterate over a folder's children in sorted order.
    pub fn children(&self, id: ResourceId) -> impl Iterator<Item = &Resource> {
        self.get(id)
            .map(Resource::children)
            .unwrap_or_default()
            .iter()
            .filter_map(|child| self.get(*child))
    }

    /// Build a resource's key by walking the parent chain.
    pub fn key_of(&self, id: ResourceId) -> Option<ResourceKey> {
        let mut names = Vec::new();
        let mut current = self.get(id)?;
        while let Some(parent) = current.parent {
            names.push(current.name.as_str());
            current = self.get(parent)?;
        }
        names.reverse();
        ResourceKey::from_segments(names).ok()
    }

    /// Find the resource addressed by a key.
    pub fn find(&self, key: &ResourceKey) -> Option<&Resource> {
        let mut current = self.root();
        for segment in key.segments() {
            current = self
                .children(current.id)
                .find(|child| child.name.as_str() == segment)?;
        }
        Some(current)
    }

    /// Visit every resource depth-first in sorted order, with its key.
    pub fn walk(&self, mut visit: impl FnMut(&ResourceKey, &Resource)) {
        let mut stack = vec![(ResourceKey::root(), self.root())];
        while let Some((key, resource)) = stack.pop() {
            visit(&key, resource);
            // Push in reverse so the first child is visited first
            for child in self.children(resource.id).collect::<Vec<_>>().into_iter().rev() {
                if let Ok(child_key) = key.join(&child.name) {
                    stack.push((child_key, child));
                }
            }
        }
    }

    /// Total number of resources, including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// A tree always holds its root.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Sibling ordering: folders before files, then case-insensitive by name.
pub fn compare_siblings(a_folder: bool, a_name: &str, b_folder: bool, b_name: &str) -> Ordering {
    b_folder
        .cmp(&a_folder)
        .then_with(|| a_name.to_lowercase().cmp(&b_name.to_lowercase()))
        .then_with(|| a_name.cmp(b_name))
}

/// Append-only builder producing a fresh arena for one generation.
#[derive(Debug)]
pub(crate) struct TreeBuilder {
    generation: u64,
    nodes: Vec<Resource>,
    stats: TreeStats,
}

impl TreeBuilder {
    pub(crate) fn new(generation: u64) -> Self {
        Self {
            generation,
            nodes: Vec::new(),
            stats: TreeStats::default(),
        }
    }

    fn next_id(&self) -> ResourceId {
        ResourceId {
            generation: self.generation,
            index: self.nodes.len() as u32,
        }
    }

    pub(crate) fn push_folder(
        &mut self,
        parent: Option<ResourceId>,
        name: CompactString,
        expanded: bool,
    ) -> ResourceId {
        let id = self.next_id();
        if parent.is_some() {
            self.stats.folders += 1;
        }
        self.nodes.push(Resource {
            id,
            name,
            parent,
            kind: ResourceKind::Folder {
                children: Vec::new(),
                expanded,
            },
        });
        self.attach(parent, id);
        id
    }

    pub(crate) fn push_file(&mut self, parent: ResourceId, name: CompactString) -> ResourceId {
        let id = self.next_id();
        self.stats.files += 1;
        self.nodes.push(Resource {
            id,
            name,
            parent: Some(parent),
            kind: ResourceKind::File,
        });
        self.attach(Some(parent), id);
        id
    }

    pub(crate) fn record_depth(&mut self, depth: usize) {
        self.stats.max_depth = self.stats.max_depth.max(depth);
    }

    fn attach(&mut self, parent: Option<ResourceId>, child: ResourceId) {
        let Some(parent) = parent else { return };
        if let Some(ResourceKind::Folder { children, .. }) = self
            .nodes
            .get_mut(parent.index as usize)
            .map(|node| &mut node.kind)
        {
            children.push(child);
        }
    }

    pub(crate) fn finish(
        self,
        root_path: PathBuf,
        scan_duration: Duration,
        warnings: Vec<ScanWarning>,
    ) -> ResourceTree {
        ResourceTree {
            generation: self.generation,
            nodes: self.nodes,
            root_path,
            scanned_at: SystemTime::now(),
            scan_duration,
            stats: self.stats,
            warnings,
        }
    }
}
