use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::StorageError;

/// Name of the zero-content entry that keeps an otherwise empty folder visible.
pub const FOLDER_MARKER: &str = ".folder_marker";

const SEPARATOR: char = '/';

/// Caller-facing logical identifier of a stored document. Never a real filesystem path.
///
/// Grammar: one or more segments separated by `/`. A segment is non-empty, is not
/// `.` or `..`, and holds no `\` or control characters. Callers layer their own
/// conventions on top (`default/<date>/<file>`, `notebooks/<name>/<date>/<file>`);
/// this type only guarantees that segment boundaries are unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VirtualPath(String);

impl VirtualPath {
    /// Parse and validate a `/`-delimited virtual path.
    pub fn parse(raw: &str) -> Result<Self, StorageError> {
        validate(raw)?;
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR)
    }

    /// Everything but the last segment; `None` for single-segment paths.
    pub fn parent(&self) -> Option<VirtualPath> {
        self.0
            .rsplit_once(SEPARATOR)
            .map(|(parent, _)| VirtualPath(parent.to_string()))
    }

    pub fn file_name(&self) -> &str {
        self.0
            .rsplit_once(SEPARATOR)
            .map_or(self.0.as_str(), |(_, name)| name)
    }

    /// Append exactly one segment.
    pub fn child(&self, segment: &str) -> Result<VirtualPath, StorageError> {
        if segment.contains(SEPARATOR) {
            return Err(invalid(segment, "segment must not contain '/'"));
        }
        self.join(segment)
    }

    /// Append a relative path of one or more segments.
    pub fn join(&self, relative: &str) -> Result<VirtualPath, StorageError> {
        validate(relative)?;
        Ok(VirtualPath(format!("{}{SEPARATOR}{relative}", self.0)))
    }

    /// Path of the marker entry that represents this path as a folder.
    pub fn folder_marker(&self) -> VirtualPath {
        VirtualPath(format!("{}{SEPARATOR}{FOLDER_MARKER}", self.0))
    }

    pub fn is_folder_marker(&self) -> bool {
        self.file_name() == FOLDER_MARKER
    }

    /// Segment-aware containment: `notebooks/Work2/x` is not under `notebooks/Work`.
    pub fn starts_with(&self, folder: &VirtualPath) -> bool {
        self.0
            .strip_prefix(folder.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(SEPARATOR))
    }

    /// The part of this path below `folder`, if it lies strictly inside it.
    pub fn relative_to(&self, folder: &VirtualPath) -> Option<&str> {
        self.0
            .strip_prefix(folder.as_str())?
            .strip_prefix(SEPARATOR)
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for VirtualPath {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VirtualPath {
    type Error = StorageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate(&value)?;
        Ok(Self(value))
    }
}

impl From<VirtualPath> for String {
    fn from(value: VirtualPath) -> Self {
        value.0
    }
}

impl AsRef<str> for VirtualPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Folder view over a set of stored paths, recomputed on every call.
///
/// A marker entry names its parent as a folder and any other nested entry implies
/// its parent, so both cases reduce to "the parent of every path that has one".
/// Top-level entries contribute nothing.
pub fn derive_folders<'a>(paths: impl IntoIterator<Item = &'a VirtualPath>) -> Vec<VirtualPath> {
    paths
        .into_iter()
        .filter_map(VirtualPath::parent)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn validate(raw: &str) -> Result<(), StorageError> {
    if raw.is_empty() {
        return Err(invalid(raw, "path is empty"));
    }
    for segment in raw.split(SEPARATOR) {
        if segment.is_empty() {
            return Err(invalid(raw, "empty segment (leading, trailing or doubled '/')"));
        }
        if segment == "." || segment == ".." {
            return Err(invalid(raw, "relative segments are not allowed"));
        }
        if segment.chars().any(|c| c == '\\' || c.is_control()) {
            return Err(invalid(raw, "segment contains '\\' or a control character"));
        }
    }
    Ok(())
}

fn invalid(path: &str, reason: &str) -> StorageError {
    StorageError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vp(raw: &str) -> VirtualPath {
        VirtualPath::parse(raw).expect("valid path")
    }

    #[test]
    fn parses_journal_style_paths() {
        let path = vp("notebooks/Work/2024-05-01/Meeting_120500.enc");
        assert_eq!(path.file_name(), "Meeting_120500.enc");
        assert_eq!(path.parent(), Some(vp("notebooks/Work/2024-05-01")));
        assert_eq!(path.segments().count(), 4);
    }

    #[test]
    fn rejects_malformed_paths() {
        for raw in ["", "/default", "default/", "a//b", "a/../b", "./a", "a\\b", "a/\u{0}"] {
            let err = VirtualPath::parse(raw).expect_err("should reject");
            assert!(matches!(err, StorageError::InvalidPath { .. }), "{raw:?}");
        }
    }

    #[test]
    fn starts_with_respects_segment_boundaries() {
        let work = vp("notebooks/Work");
        assert!(vp("notebooks/Work/2024-01-01/a.enc").starts_with(&work));
        assert!(vp("notebooks/Work").starts_with(&work));
        assert!(!vp("notebooks/Work2/2024-01-01/a.enc").starts_with(&work));
        assert_eq!(
            vp("notebooks/Work/2024-01-01/a.enc").relative_to(&work),
            Some("2024-01-01/a.enc")
        );
        assert_eq!(vp("notebooks/Work").relative_to(&work), None);
    }

    #[test]
    fn child_rejects_nested_segments() {
        let root = vp("notebooks");
        assert_eq!(root.child("Work").expect("child"), vp("notebooks/Work"));
        assert!(root.child("Work/evil").is_err());
        assert_eq!(
            root.join("Work/2024-01-01").expect("join"),
            vp("notebooks/Work/2024-01-01")
        );
    }

    #[test]
    fn folder_marker_round_trips_to_parent() {
        let folder = vp("notebooks/Work");
        let marker = folder.folder_marker();
        assert!(marker.is_folder_marker());
        assert_eq!(marker.parent(), Some(folder));
    }

    #[test]
    fn serde_revalidates_on_deserialize() {
        let json = serde_json::to_string(&vp("default/x.enc")).expect("serialize");
        assert_eq!(json, "\"default/x.enc\"");
        let back: VirtualPath = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, vp("default/x.enc"));
        assert!(serde_json::from_str::<VirtualPath>("\"a//b\"").is_err());
    }

    #[test]
    fn derives_sorted_deduplicated_folders() {
        let paths = [
            vp("notebooks/Work/.folder_marker"),
            vp("default/2024-01-01/a.enc"),
            vp("default/2024-01-01/b.enc"),
            vp("notebooks/Home/2024-02-02/c.enc"),
            vp("loose.enc"),
        ];
        let folders = derive_folders(paths.iter());
        assert_eq!(
            folders,
            vec![
                vp("default/2024-01-01"),
                vp("notebooks/Home/2024-02-02"),
                vp("notebooks/Work"),
            ]
        );
    }
}
