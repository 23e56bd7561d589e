//
// path.rs
//
// C1: canonical identity for documents across OS path conventions and
// `file://` URIs (spec §3, §4.1).
//

use std::hash::{Hash, Hasher};
use std::path::{Component, Path, PathBuf};

use tower_lsp::lsp_types::Url;

use crate::error::{Result, ServerError};

/// A canonical path identity, carrying both the exact URI a client used
/// (so it can be echoed back verbatim) and a normalized filesystem path
/// used for equality, hashing, and ordering.
#[derive(Debug, Clone)]
pub struct NotePath {
    uri: Url,
    canonical: PathBuf,
}

impl NotePath {
    /// Parses either a `file://` URI or an absolute filesystem path.
    pub fn parse(input: &str) -> Result<Self> {
        let uri = if input.starts_with("file://") {
            Url::parse(input).map_err(|_| ServerError::BadPath(input.to_string()))?
        } else {
            let path = Path::new(input);
            if !path.is_absolute() {
                return Err(ServerError::BadPath(input.to_string()));
            }
            Url::from_file_path(path).map_err(|_| ServerError::BadPath(input.to_string()))?
        };

        Self::from_uri(uri)
    }

    /// Builds a `NotePath` from an already-parsed LSP `Url`.
    pub fn from_uri(uri: Url) -> Result<Self> {
        if uri.scheme() != "file" {
            return Err(ServerError::BadPath(uri.to_string()));
        }

        let raw = uri
            .to_file_path()
            .map_err(|_| ServerError::BadPath(uri.to_string()))?;

        if !raw.is_absolute() {
            return Err(ServerError::BadPath(uri.to_string()));
        }

        Ok(Self {
            canonical: normalize(&raw),
            uri,
        })
    }

    /// Builds a `NotePath` from a filesystem path already known to be
    /// under a workspace root (e.g. produced by a directory scan).
    pub fn from_fs_path(path: &Path) -> Result<Self> {
        if !path.is_absolute() {
            return Err(ServerError::BadPath(path.display().to_string()));
        }
        let uri = Url::from_file_path(path)
            .map_err(|_| ServerError::BadPath(path.display().to_string()))?;
        Ok(Self {
            canonical: normalize(path),
            uri,
        })
    }

    /// The exact URI as the client would expect it echoed back.
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    /// The canonical filesystem path, used for reading from disk.
    pub fn as_path(&self) -> &Path {
        &self.canonical
    }

    /// Whether this path lies under `root` (inclusive). Uses the same
    /// case-folding as `compare_key`, so this agrees with equality on
    /// platforms whose filesystem is case-insensitive.
    pub fn is_under(&self, root: &NotePath) -> bool {
        self.folded_path().starts_with(root.folded_path())
    }

    /// The file name with any extension stripped, used as a note's name.
    pub fn note_name(&self) -> Option<&str> {
        self.canonical.file_stem().and_then(|s| s.to_str())
    }

    /// The canonical path, case-folded on platforms whose filesystem is
    /// case-insensitive (Windows), exact elsewhere. Folding happens
    /// before `PathBuf` parses it back out so comparisons still respect
    /// component boundaries (not a raw string prefix match).
    fn folded_path(&self) -> PathBuf {
        if cfg!(windows) {
            PathBuf::from(self.canonical.to_string_lossy().to_lowercase())
        } else {
            self.canonical.clone()
        }
    }

    /// The key used for equality/hashing/ordering.
    fn compare_key(&self) -> String {
        self.folded_path().to_string_lossy().into_owned()
    }
}

impl PartialEq for NotePath {
    fn eq(&self, other: &Self) -> bool {
        self.compare_key() == other.compare_key()
    }
}

impl Eq for NotePath {}

impl Hash for NotePath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.compare_key().hash(state);
    }
}

impl PartialOrd for NotePath {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NotePath {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.compare_key().cmp(&other.compare_key())
    }
}

/// Lexically normalizes a path: resolves `.` and `..` components without
/// touching the filesystem (the path may not exist yet, e.g. `didCreate`),
/// and lowercases a Windows drive-letter prefix for consistent comparison.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            Component::Prefix(prefix) => {
                let text = prefix.as_os_str().to_string_lossy();
                out.push(lowercase_drive_prefix(&text));
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn lowercase_drive_prefix(text: &str) -> String {
    if let Some(rest) = text.strip_suffix(':') {
        if rest.len() == 1 && rest.chars().all(|c| c.is_ascii_alphabetic()) {
            return format!("{}:", rest.to_lowercase());
        }
    }
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_absolute_unix_path() {
        let p = NotePath::parse("/tmp/wiki/a.md").unwrap();
        assert_eq!(p.note_name(), Some("a"));
    }

    #[test]
    fn rejects_relative_path() {
        assert!(NotePath::parse("wiki/a.md").is_err());
    }

    #[test]
    fn normalizes_dot_segments() {
        let a = NotePath::parse("/tmp/wiki/./a.md").unwrap();
        let b = NotePath::parse("/tmp/wiki/sub/../a.md").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn preserves_original_uri_string() {
        let uri = "file:///tmp/wiki/a.md";
        let p = NotePath::parse(uri).unwrap();
        assert_eq!(p.uri().as_str(), uri);
    }

    #[test]
    fn is_under_root() {
        let root = NotePath::parse("/tmp/wiki").unwrap();
        let child = NotePath::parse("/tmp/wiki/a.md").unwrap();
        let outside = NotePath::parse("/tmp/other/a.md").unwrap();
        assert!(child.is_under(&root));
        assert!(!outside.is_under(&root));
    }
}
