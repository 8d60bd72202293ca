use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Characters allowed in a single path segment.
static SEGMENT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:@-]*$").expect("segment pattern is valid"));

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Path cannot be empty")]
    Empty,

    #[error("Path must be absolute: {0}")]
    NotAbsolute(String),

    #[error("Invalid path segment '{segment}' in {path}")]
    InvalidSegment { path: String, segment: String },
}

/// Absolute, slash-delimited path of an item in the content tree.
///
/// Always starts with `/`, never ends with one (except the root itself),
/// and contains no empty, `.` or `..` segments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentPath(String);

impl ContentPath {
    /// The root of the content tree
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Parse and normalize a path. A single trailing slash is accepted.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PathError::Empty);
        }
        if !trimmed.starts_with('/') {
            return Err(PathError::NotAbsolute(trimmed.to_string()));
        }

        let body = trimmed.strip_suffix('/').unwrap_or(trimmed);
        if body.is_empty() {
            return Ok(Self::root());
        }

        for segment in body[1..].split('/') {
            if !SEGMENT_PATTERN.is_match(segment) {
                return Err(PathError::InvalidSegment {
                    path: trimmed.to_string(),
                    segment: segment.to_string(),
                });
            }
        }

        Ok(Self(body.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Path segments, empty for the root
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Last segment, `None` for the root
    pub fn name(&self) -> Option<&str> {
        self.segments().last()
    }

    pub fn parent(&self) -> Option<ContentPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// Append a single validated segment
    pub fn join(&self, segment: &str) -> Result<ContentPath, PathError> {
        if !SEGMENT_PATTERN.is_match(segment) {
            return Err(PathError::InvalidSegment {
                path: self.0.clone(),
                segment: segment.to_string(),
            });
        }
        if self.is_root() {
            Ok(Self(format!("/{}", segment)))
        } else {
            Ok(Self(format!("{}/{}", self.0, segment)))
        }
    }

    /// True if `self` lies strictly below `ancestor`
    pub fn is_descendant_of(&self, ancestor: &ContentPath) -> bool {
        if ancestor.is_root() {
            return !self.is_root();
        }
        self.0.len() > ancestor.0.len()
            && self.0.starts_with(&ancestor.0)
            && self.0.as_bytes()[ancestor.0.len()] == b'/'
    }

    /// True if `self` is a direct child of `parent`
    pub fn is_child_of(&self, parent: &ContentPath) -> bool {
        self.parent().as_ref() == Some(parent)
    }

    /// Directory backing this path under a filesystem store root
    pub fn to_fs_path(&self, store_root: &Path) -> PathBuf {
        self.segments()
            .fold(store_root.to_path_buf(), |acc, segment| acc.join(segment))
    }
}

impl fmt::Display for ContentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContentPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ContentPath> for String {
    fn from(path: ContentPath) -> Self {
        path.0
    }
}

impl AsRef<str> for ContentPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
