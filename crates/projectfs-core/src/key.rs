//! Project-relative resource keys.

use std::fmt;
use std::str::FromStr;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::error::ResourceError;

/// Separator between key segments, independent of the host platform.
pub const KEY_SEPARATOR: char = '/';

/// A normalized, forward-slash delimited path relative to the project root.
///
/// The empty key addresses the root folder. Two keys are equal iff their
/// strings are equal, so keys are always validated on construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceKey(CompactString);

impl ResourceKey {
    /// The key of the project root folder.
    pub fn root() -> Self {
        Self(CompactString::default())
    }

    /// Parse and validate a key.
    pub fn new(key: impl AsRef<str>) -> Result<Self, ResourceError> {
        let key = key.as_ref();
        if key.is_empty() {
            return Ok(Self::root());
        }

        for segment in key.split(KEY_SEPARATOR) {
            validate_segment(segment).map_err(|reason| ResourceError::InvalidKey {
                key: key.to_string(),
                reason,
            })?;
        }

        Ok(Self(CompactString::new(key)))
    }

    /// Build a key from individual segments, validating each one.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, ResourceError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut key = Self::root();
        for segment in segments {
            key = key.join(segment.as_ref())?;
        }
        Ok(key)
    }

    /// Append a single segment.
    pub fn join(&self, segment: &str) -> Result<Self, ResourceError> {
        validate_segment(segment).map_err(|reason| ResourceError::InvalidKey {
            key: format!("{}{KEY_SEPARATOR}{segment}", self.0),
            reason,
        })?;

        if self.is_root() {
            Ok(Self(CompactString::new(segment)))
        } else {
            let mut joined = self.0.clone();
            joined.push(KEY_SEPARATOR);
            joined.push_str(segment);
            Ok(Self(joined))
        }
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Check if this is the root key.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the key's segments. The root key has none.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0
            .as_str()
            .split(KEY_SEPARATOR)
            .filter(|segment| !segment.is_empty())
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Last segment, or the empty string for the root.
    pub fn name(&self) -> &str {
        self.0
            .as_str()
            .rsplit(KEY_SEPARATOR)
            .next()
            .unwrap_or_default()
    }

    /// Parent key. `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind(KEY_SEPARATOR) {
            Some(idx) => Some(Self(CompactString::new(&self.0[..idx]))),
            None => Some(Self::root()),
        }
    }

    /// Check if `self` lies strictly below `ancestor`.
    pub fn is_descendant_of(&self, ancestor: &ResourceKey) -> bool {
        if ancestor.is_root() {
            return !self.is_root();
        }
        self.0.len() > ancestor.0.len()
            && self.0.starts_with(ancestor.as_str())
            && self.0[ancestor.0.len()..].starts_with(KEY_SEPARATOR)
    }

    /// Replace the `from` prefix of this key with `to`.
    ///
    /// Returns `None` if this key is neither `from` nor one of its descendants.
    pub fn rebase(&self, from: &ResourceKey, to: &ResourceKey) -> Option<Self> {
        if self == from {
            return Some(to.clone());
        }
        if !self.is_descendant_of(from) {
            return None;
        }

        let suffix = if from.is_root() {
            self.as_str()
        } else {
            &self.0[from.0.len() + 1..]
        };

        if to.is_root() {
            Some(Self(CompactString::new(suffix)))
        } else {
            Some(Self(CompactString::new(format!(
                "{}{KEY_SEPARATOR}{suffix}",
                to.as_str()
            ))))
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKey {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ResourceKey {
    type Error = ResourceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResourceKey> for String {
    fn from(key: ResourceKey) -> Self {
        key.0.into_string()
    }
}

impl AsRef<str> for ResourceKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Validate a single key segment for cross-platform compatibility.
pub fn validate_segment(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Segment cannot be empty".into());
    }

    if name.len() > 255 {
        return Err("Segment is too long (max 255 bytes)".into());
    }

    if name == "." || name == ".." {
        return Err("'.' and '..' are reserved names".into());
    }

    // Keys are stored on every platform, so reject anything Windows can't hold.
    let invalid_chars = ['/', '\\', '\0', ':', '*', '?', '"', '<', '>', '|'];
    for c in invalid_chars {
        if name.contains(c) {
            return Err(format!("Segment cannot contain '{}'", c.escape_default()));
        }
    }

    if name.chars().any(char::is_control) {
        return Err("Segment cannot contain control characters".into());
    }

    if name.starts_with(' ') || name.ends_with(' ') {
        return Err("Segment cannot start or end with spaces".into());
    }

    if name.ends_with('.') {
        return Err("Segment cannot end with a dot".into());
    }

    #[cfg(target_os = "windows")]
    {
        let reserved = [
            "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7",
            "COM8", "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
        ];
        let upper_name = name.to_uppercase();
        let base_name = upper_name.split('.').next().unwrap_or("");
        if reserved.contains(&base_name) {
            return Err("Reserved filename".into());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_key() {
        let root = ResourceKey::root();
        assert!(root.is_root());
        assert_eq!(root.name(), "");
        assert!(root.parent().is_none());
        assert_eq!(root.segments().count(), 0);
        assert_eq!(ResourceKey::new("").unwrap(), root);
    }

    #[test]
    fn test_parent_and_name() {
        let key = ResourceKey::new("src/lib/util.py").unwrap();
        assert_eq!(key.name(), "util.py");
        assert_eq!(key.depth(), 3);
        assert_eq!(key.parent().unwrap().as_str(), "src/lib");
        assert_eq!(
            ResourceKey::new("top").unwrap().parent(),
            Some(ResourceKey::root())
        );
    }

    #[test]
    fn test_invalid_keys() {
        assert!(ResourceKey::new("/leading").is_err());
        assert!(ResourceKey::new("trailing/").is_err());
        assert!(ResourceKey::new("a//b").is_err());
        assert!(ResourceKey::new("a/../b").is_err());
        assert!(ResourceKey::new("a\\b").is_err());
        assert!(ResourceKey::new("what?").is_err());
        assert!(ResourceKey::new("dot.").is_err());
        assert!(ResourceKey::new(" padded").is_err());
    }

    #[test]
    fn test_descendant_and_rebase() {
        let folder = ResourceKey::new("src").unwrap();
        let file = ResourceKey::new("src/readme.md").unwrap();
        let sibling = ResourceKey::new("srcs/readme.md").unwrap();

        assert!(file.is_descendant_of(&folder));
        assert!(!sibling.is_descendant_of(&folder));
        assert!(!folder.is_descendant_of(&folder));
        assert!(file.is_descendant_of(&ResourceKey::root()));

        let docs = ResourceKey::new("docs/v1").unwrap();
        assert_eq!(file.rebase(&folder, &docs).unwrap().as_str(), "docs/v1/readme.md");
        assert_eq!(folder.rebase(&folder, &docs).unwrap(), docs);
        assert!(sibling.rebase(&folder, &docs).is_none());
        assert_eq!(
            file.rebase(&folder, &ResourceKey::root()).unwrap().as_str(),
            "readme.md"
        );
    }

    #[test]
    fn test_join_and_segments() {
        let key = ResourceKey::from_segments(["a", "b", "c.txt"]).unwrap();
        assert_eq!(key.as_str(), "a/b/c.txt");
        assert_eq!(key.segments().collect::<Vec<_>>(), vec!["a", "b", "c.txt"]);
        assert!(key.join("bad/segment").is_err());
        assert_eq!("x/y".parse::<ResourceKey>().unwrap().to_string(), "x/y");
    }
}
