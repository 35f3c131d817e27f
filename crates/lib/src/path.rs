//! Hierarchical paths into the versioned store.
//!
//! A [`Path`] is an ordered list of segments such as `tests/name`. Paths are
//! normalised on construction from strings: leading, trailing and repeated
//! separators are dropped, so `"/tests//name/"` and `"tests/name"` are the same
//! path. Segments themselves can never be empty or contain the separator.
//!
//! # Usage
//!
//! ```rust
//! use layerconf::Path;
//! use std::str::FromStr;
//!
//! let base = Path::from_str("services/web")?;
//! let leaf = base.child("port")?;
//! assert_eq!(leaf.to_string(), "services/web/port");
//! assert_eq!(leaf.parent(), Some(base));
//! # Ok::<(), layerconf::path::PathError>(())
//! ```

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separator used in the string form of a path.
pub const SEPARATOR: char = '/';

/// Error type for path validation failures.
#[non_exhaustive]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PathError {
    /// The operation needs at least one segment.
    #[error("Path is empty")]
    Empty,

    /// A segment was empty or contained the separator.
    #[error("Invalid path segment '{segment}': {reason}")]
    InvalidSegment { segment: String, reason: String },
}

impl PathError {
    /// Check if this error was caused by an empty path.
    pub fn is_empty_path(&self) -> bool {
        matches!(self, PathError::Empty)
    }
}

impl From<PathError> for crate::Error {
    fn from(err: PathError) -> Self {
        crate::Error::Path(err)
    }
}

fn validate_segment(segment: &str) -> Result<(), PathError> {
    if segment.is_empty() {
        return Err(PathError::InvalidSegment {
            segment: segment.to_string(),
            reason: "segments cannot be empty".to_string(),
        });
    }
    if segment.contains(SEPARATOR) {
        return Err(PathError::InvalidSegment {
            segment: segment.to_string(),
            reason: format!("segments cannot contain '{SEPARATOR}'"),
        });
    }
    Ok(())
}

/// An owned, validated location in the hierarchical namespace.
///
/// Equality is segment-wise. The empty path refers to the root of a commit and
/// is valid for reads and listings, but not as a write or removal target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    /// The root path with no segments.
    pub fn root() -> Self {
        Self::default()
    }

    /// Builds a path from individual segments, validating each one.
    ///
    /// Unlike [`Path::from_str`], segments are taken verbatim: an empty segment
    /// or one containing `/` is rejected instead of normalised away.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments = segments
            .into_iter()
            .map(Into::into)
            .collect::<Vec<String>>();
        for segment in &segments {
            validate_segment(segment)?;
        }
        Ok(Self { segments })
    }

    /// Returns a new path with `segment` appended.
    pub fn child(&self, segment: impl Into<String>) -> Result<Self, PathError> {
        let segment = segment.into();
        validate_segment(&segment)?;
        let mut segments = self.segments.clone();
        segments.push(segment);
        Ok(Self { segments })
    }

    /// Returns the concatenation of `self` and `other`.
    pub fn join(&self, other: &Path) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    /// Returns the path without its last segment, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.segments.split_last()?;
        Some(Self {
            segments: rest.to_vec(),
        })
    }

    /// The last segment, if any.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Check whether `prefix` is an ancestor of (or equal to) this path.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// The remainder of this path below `prefix`, or `None` if `prefix` is
    /// not an ancestor of (or equal to) it.
    pub fn strip_prefix(&self, prefix: &Path) -> Option<Path> {
        self.segments
            .strip_prefix(prefix.segments.as_slice())
            .map(|rest| Self {
                segments: rest.to_vec(),
            })
    }

    /// Fails with [`PathError::Empty`] when the path has no segments.
    pub(crate) fn require_non_empty(&self) -> Result<(), PathError> {
        if self.is_empty() {
            Err(PathError::Empty)
        } else {
            Ok(())
        }
    }
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self {
            segments: s
                .split(SEPARATOR)
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        })
    }
}

impl TryFrom<Vec<String>> for Path {
    type Error = PathError;

    fn try_from(segments: Vec<String>) -> Result<Self, Self::Error> {
        Self::from_segments(segments)
    }
}

impl TryFrom<&str> for Path {
    type Error = PathError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::from_str(s)
    }
}

/// Conversion into a validated [`Path`].
///
/// Lets store and record APIs accept `Path`, `&Path`, `"a/b"` strings and
/// segment arrays such as `["a", "b"]` interchangeably.
pub trait IntoPath {
    fn into_path(self) -> Result<Path, PathError>;
}

impl IntoPath for Path {
    fn into_path(self) -> Result<Path, PathError> {
        Ok(self)
    }
}

impl IntoPath for &Path {
    fn into_path(self) -> Result<Path, PathError> {
        Ok(self.clone())
    }
}

impl IntoPath for &str {
    fn into_path(self) -> Result<Path, PathError> {
        Path::from_str(self)
    }
}

impl IntoPath for String {
    fn into_path(self) -> Result<Path, PathError> {
        Path::from_str(&self)
    }
}

impl IntoPath for &String {
    fn into_path(self) -> Result<Path, PathError> {
        Path::from_str(self)
    }
}

impl IntoPath for &[&str] {
    fn into_path(self) -> Result<Path, PathError> {
        Path::from_segments(self.iter().copied())
    }
}

impl<const N: usize> IntoPath for [&str; N] {
    fn into_path(self) -> Result<Path, PathError> {
        Path::from_segments(self)
    }
}

impl IntoPath for Vec<String> {
    fn into_path(self) -> Result<Path, PathError> {
        Path::from_segments(self)
    }
}

impl IntoPath for &[String] {
    fn into_path(self) -> Result<Path, PathError> {
        Path::from_segments(self.iter().cloned())
    }
}

impl From<Path> for Vec<String> {
    fn from(path: Path) -> Self {
        path.segments
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            if !first {
                write!(f, "{SEPARATOR}")?;
            }
            write!(f, "{segment}")?;
            first = false;
        }
        Ok(())
    }
}
