//! Element paths.
//!
//! A path is an ordered, non-empty sequence of segment strings addressing a
//! node in a provider's hierarchy. Validation happens at construction so an
//! invalid path can never enter a queue or a registry.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum number of segments a path may carry.
pub const MAX_PATH_DEPTH: usize = 32;

/// Errors raised by path construction.
///
/// These are defect-class: callers constructing paths from untrusted input
/// must handle them immediately rather than queueing the operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// A path must have at least one segment.
    #[error("path must not be empty")]
    Empty,

    /// Segments must be non-empty strings.
    #[error("path segment {0} is empty")]
    EmptySegment(usize),

    /// Depth exceeds [`MAX_PATH_DEPTH`].
    #[error("path depth {0} exceeds maximum of {MAX_PATH_DEPTH}")]
    TooDeep(usize),
}

/// An ordered, validated sequence of path segments.
///
/// Paths compare lexicographically segment by segment, so `["a"]` sorts
/// before `["a", "b"]` and `["a", "b"]` before `["c"]`. Segments are
/// case-preserving and compared exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ElementPath {
    segments: Vec<String>,
}

impl ElementPath {
    /// Builds a path from segments, validating depth and emptiness.
    pub fn new<I, S>(segments: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(PathError::Empty);
        }
        if segments.len() > MAX_PATH_DEPTH {
            return Err(PathError::TooDeep(segments.len()));
        }
        if let Some(i) = segments.iter().position(String::is_empty) {
            return Err(PathError::EmptySegment(i));
        }
        Ok(Self { segments })
    }

    /// A single-segment path at the hierarchy root.
    pub fn root(segment: impl Into<String>) -> Result<Self, PathError> {
        Self::new([segment.into()])
    }

    /// The path's segments in order.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// The final segment (the element's own name).
    #[must_use]
    pub fn name(&self) -> &str {
        self.segments.last().expect("path is never empty")
    }

    /// The parent path, or `None` for a root-level path.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Whether this path is `prefix` itself or lies underneath it.
    ///
    /// Used for matching subscriptions registered on a root path.
    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// Extends the path by one child segment.
    pub fn child(&self, segment: impl Into<String>) -> Result<Self, PathError> {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self::new(segments)
    }
}

impl PartialOrd for ElementPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ElementPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.segments.cmp(&other.segments)
    }
}

impl fmt::Display for ElementPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

impl FromStr for ElementPath {
    type Err = PathError;

    /// Parses a `/`-separated path. Leading and trailing slashes are
    /// tolerated; interior empty segments are not.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim_matches('/');
        if trimmed.is_empty() {
            return Err(PathError::Empty);
        }
        Self::new(trimmed.split('/'))
    }
}

impl TryFrom<Vec<String>> for ElementPath {
    type Error = PathError;

    fn try_from(segments: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(segments)
    }
}

impl From<ElementPath> for Vec<String> {
    fn from(path: ElementPath) -> Self {
        path.segments
    }
}
