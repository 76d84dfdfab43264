//! Dataset-relative file paths
//!
//! Provides [`DatasetPath`], the path type used for every input and output
//! named by a computation descriptor.

use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Path of a file relative to the dataset root
///
/// Always relative, `/`-separated and free of `.`/`..` components, so it can
/// be joined onto a workspace or dataset root without escaping it.
///
/// # Examples
/// - `out.txt`
/// - `derived/sub/result.csv`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DatasetPath(Vec<String>);

impl DatasetPath {
    /// Get path segments
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Get number of segments
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// A parsed path always has at least one segment
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Final component (the file name)
    #[inline]
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.last().map_or("", String::as_str)
    }

    /// Parent directory, `None` for top-level files
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.0.len() <= 1 {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// Check if this path lies inside `dir` (or is `dir` itself)
    #[must_use]
    pub fn starts_with(&self, dir: &Self) -> bool {
        dir.0.len() <= self.0.len() && self.0[..dir.0.len()] == dir.0[..]
    }

    /// Resolve against a root directory
    #[must_use]
    pub fn to_path(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        for seg in &self.0 {
            path.push(seg);
        }
        path
    }

    /// Express an absolute or relative filesystem path relative to `root`
    ///
    /// # Errors
    /// Returns error if `path` is not below `root` or is not valid UTF-8
    pub fn relative_to(path: &Path, root: &Path) -> Result<Self, PathError> {
        let rel = path.strip_prefix(root).map_err(|_| PathError::NotBelowRoot {
            path: path.display().to_string(),
            root: root.display().to_string(),
        })?;
        let text = rel
            .to_str()
            .ok_or_else(|| PathError::NonUtf8(rel.display().to_string()))?;
        text.replace(std::path::MAIN_SEPARATOR, "/").parse()
    }

    /// String form using `/` as separator
    #[inline]
    #[must_use]
    pub fn as_string(&self) -> String {
        self.0.join("/")
    }
}

impl Display for DatasetPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

impl FromStr for DatasetPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(PathError::Empty);
        }
        if s.starts_with('/') || s.starts_with('\\') || s.contains('\0') {
            return Err(PathError::Absolute(s.to_string()));
        }

        let segments: Vec<String> = s
            .split('/')
            // tolerate `a//b` and a trailing slash the way shells do
            .filter(|seg| !seg.is_empty() && *seg != ".")
            .map(|seg| {
                if seg == ".." {
                    Err(PathError::ParentTraversal(s.to_string()))
                } else {
                    Ok(seg.to_string())
                }
            })
            .collect::<Result<_, _>>()?;

        if segments.is_empty() {
            return Err(PathError::Empty);
        }
        Ok(Self(segments))
    }
}

impl TryFrom<&str> for DatasetPath {
    type Error = PathError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl serde::Serialize for DatasetPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.as_string())
    }
}

impl<'de> serde::Deserialize<'de> for DatasetPath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors related to dataset paths
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PathError {
    /// Empty path
    #[error("path is empty")]
    Empty,

    /// Absolute path where a dataset-relative one is required
    #[error("path must be relative to the dataset: {0}")]
    Absolute(String),

    /// `..` component
    #[error("path leaves the dataset: {0}")]
    ParentTraversal(String),

    /// Path outside the given root
    #[error("path '{path}' is not below '{root}'")]
    NotBelowRoot { path: String, root: String },

    /// Path is not valid UTF-8
    #[error("path is not valid UTF-8: {0}")]
    NonUtf8(String),
}
