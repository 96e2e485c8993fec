//! Immutable data-element snapshots.
//!
//! A `DataElement` describes a file, folder, or other addressable node at a
//! point in time. Snapshots are produced by provider modules in response to
//! queries and are never mutated — a newer snapshot supersedes an older one.
//!
//! Equality is structural: two snapshots fetched at different times are equal
//! iff path, kind, size, modification date, and properties all match. The
//! `marked` flag is bookkeeping for cleanup sweeps and takes no part in
//! equality or hashing.

use crate::ElementPath;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// What kind of node a snapshot describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    /// A regular file.
    File,
    /// A folder containing child elements.
    Folder,
    /// An addressable node that is neither file nor folder (device, link).
    Other,
    /// The provider could not determine the kind.
    Unknown,
    /// The path does not exist on the provider.
    Nonexistent,
}

/// An immutable snapshot of an element at a path.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct DataElement {
    path: ElementPath,
    kind: ElementKind,
    /// Size in bytes; 0 for folders and nonexistent elements.
    size: u64,
    /// Modification time as epoch millis; 0 means unknown.
    modified_ms: u64,
    /// Provider-defined string properties. No empty keys by construction
    /// (BTreeMap keys are owned strings; providers decide the vocabulary).
    properties: BTreeMap<String, String>,
    /// Reserved for cleanup sweeps. Excluded from equality.
    #[serde(default)]
    marked: bool,
}

impl DataElement {
    /// Creates a snapshot with explicit fields.
    #[must_use]
    pub fn new(path: ElementPath, kind: ElementKind, size: u64, modified_ms: u64) -> Self {
        Self {
            path,
            kind,
            size,
            modified_ms,
            properties: BTreeMap::new(),
            marked: false,
        }
    }

    /// Creates a file snapshot.
    #[must_use]
    pub fn file(path: ElementPath, size: u64, modified_ms: u64) -> Self {
        Self::new(path, ElementKind::File, size, modified_ms)
    }

    /// Creates a folder snapshot.
    #[must_use]
    pub fn folder(path: ElementPath, modified_ms: u64) -> Self {
        Self::new(path, ElementKind::Folder, 0, modified_ms)
    }

    /// Creates a snapshot recording that the path does not exist.
    #[must_use]
    pub fn nonexistent(path: ElementPath) -> Self {
        Self::new(path, ElementKind::Nonexistent, 0, 0)
    }

    /// Adds a property, returning the extended snapshot.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Returns a copy with a different modification time.
    #[must_use]
    pub fn with_modified_ms(mut self, modified_ms: u64) -> Self {
        self.modified_ms = modified_ms;
        self
    }

    /// Returns a marked copy for a cleanup sweep.
    #[must_use]
    pub fn marked(mut self) -> Self {
        self.marked = true;
        self
    }

    /// The element's path.
    #[must_use]
    pub fn path(&self) -> &ElementPath {
        &self.path
    }

    /// The element's kind.
    #[must_use]
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Modification time as epoch millis; 0 means unknown.
    #[must_use]
    pub fn modified_ms(&self) -> u64 {
        self.modified_ms
    }

    /// Provider-defined properties.
    #[must_use]
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Looks up a single property.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Whether the snapshot is marked for a cleanup sweep.
    #[must_use]
    pub fn is_marked(&self) -> bool {
        self.marked
    }

    /// Whether the snapshot records a missing element.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.kind != ElementKind::Nonexistent
    }
}

// Structural identity: marked is bookkeeping, not identity.
impl PartialEq for DataElement {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
            && self.kind == other.kind
            && self.size == other.size
            && self.modified_ms == other.modified_ms
            && self.properties == other.properties
    }
}

impl Hash for DataElement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
        self.kind.hash(state);
        self.size.hash(state);
        self.modified_ms.hash(state);
        self.properties.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(segments: &[&str]) -> ElementPath {
        ElementPath::new(segments.iter().copied()).unwrap()
    }

    #[test]
    fn structural_equality_ignores_marked() {
        let a = DataElement::file(path(&["docs", "report.txt"]), 10, 1000);
        let b = a.clone().marked();
        assert_eq!(a, b);
        assert!(b.is_marked());
        assert!(!a.is_marked());
    }

    #[test]
    fn equality_covers_properties() {
        let a = DataElement::file(path(&["x"]), 1, 1).with_property("etag", "abc");
        let b = DataElement::file(path(&["x"]), 1, 1).with_property("etag", "def");
        assert_ne!(a, b);
    }

    #[test]
    fn differing_size_is_unequal() {
        let a = DataElement::file(path(&["x"]), 1, 1);
        let b = DataElement::file(path(&["x"]), 2, 1);
        assert_ne!(a, b);
    }

    #[test]
    fn nonexistent_does_not_exist() {
        let e = DataElement::nonexistent(path(&["gone"]));
        assert!(!e.exists());
        assert_eq!(e.size(), 0);
    }
}
