//! Server-relative paths in normalized, forward-slash form.
//!
//! Remote servers are either POSIX (`/a/b/c`) or Windows (`C:/a/b`). Input may
//! use backslashes; [`RemotePath::new`] always stores the normalized form so
//! comparisons and joins never have to care.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Operating system family of a remote server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsType {
    #[default]
    Posix,
    Windows,
}

impl OsType {
    /// Root a panel falls back to when no default path is configured.
    pub fn default_root(self) -> RemotePath {
        match self {
            OsType::Posix => RemotePath::new("/"),
            OsType::Windows => RemotePath::new("C:/"),
        }
    }
}

/// A normalized absolute path on a remote server.
///
/// Invariants:
/// - no backslashes, no repeated slashes
/// - Windows drive letters are uppercase and a bare drive is `C:/`
/// - trailing slash only on roots (`/`, `C:/`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct RemotePath(String);

impl RemotePath {
    /// Normalizes `raw` into a `RemotePath`.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(normalize(raw.as_ref()))
    }

    /// The POSIX root `/`.
    pub fn root() -> Self {
        Self("/".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for drive-letter paths.
    pub fn is_windows(&self) -> bool {
        has_drive_prefix(&self.0)
    }

    /// Returns `true` for `/` and bare drive roots.
    pub fn is_root(&self) -> bool {
        self.0 == "/" || (self.is_windows() && self.0.len() == 3)
    }

    /// Appends `name` as a new last segment.
    pub fn join(&self, name: &str) -> RemotePath {
        let name = name.replace('\\', "/");
        let name = name.trim_matches('/');
        if name.is_empty() {
            return self.clone();
        }
        if self.0.ends_with('/') {
            RemotePath::new(format!("{}{}", self.0, name))
        } else {
            RemotePath::new(format!("{}/{}", self.0, name))
        }
    }

    /// The containing directory. Roots are their own parent.
    pub fn parent(&self) -> RemotePath {
        if self.is_root() {
            return self.clone();
        }
        let idx = match self.0.rfind('/') {
            Some(idx) => idx,
            None => return self.clone(),
        };
        if self.is_windows() {
            if idx <= 2 {
                return RemotePath(self.0[..3].to_string());
            }
            return RemotePath(self.0[..idx].to_string());
        }
        if idx == 0 {
            return RemotePath::root();
        }
        RemotePath(self.0[..idx].to_string())
    }

    /// Last segment of the path; empty for roots.
    pub fn file_name(&self) -> &str {
        if self.is_root() {
            return "";
        }
        self.0.rsplit('/').next().unwrap_or("")
    }

    /// Returns `true` if `other` is this path or lies beneath it.
    ///
    /// Comparison is segment-aware: `/a/b` contains `/a/b/c` but not `/a/bc`.
    /// Windows paths compare case-insensitively.
    pub fn contains(&self, other: &RemotePath) -> bool {
        let (this, that) = if self.is_windows() && other.is_windows() {
            (self.0.to_lowercase(), other.0.to_lowercase())
        } else {
            (self.0.clone(), other.0.clone())
        };
        if this == that {
            return true;
        }
        let prefix = if this.ends_with('/') {
            this
        } else {
            format!("{this}/")
        };
        that.starts_with(&prefix)
    }

    /// Renders the path the way the server's OS writes it.
    pub fn to_native(&self, os: OsType) -> String {
        match os {
            OsType::Posix => self.0.clone(),
            OsType::Windows => self.0.replace('/', "\\"),
        }
    }
}

impl Default for RemotePath {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RemotePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for RemotePath {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<&str> for RemotePath {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<RemotePath> for String {
    fn from(path: RemotePath) -> Self {
        path.0
    }
}

fn has_drive_prefix(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn normalize(raw: &str) -> String {
    let replaced = raw.trim().replace('\\', "/");

    let mut collapsed = String::with_capacity(replaced.len());
    let mut prev_slash = false;
    for c in replaced.chars() {
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        collapsed.push(c);
    }

    if has_drive_prefix(&collapsed) {
        let drive = collapsed[..1].to_ascii_uppercase();
        let rest = collapsed[2..].trim_start_matches('/');
        let rest = rest.trim_end_matches('/');
        if rest.is_empty() {
            return format!("{drive}:/");
        }
        return format!("{drive}:/{rest}");
    }

    let trimmed = collapsed.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posix_paths_are_trimmed() {
        assert_eq!(RemotePath::new("/a/b/").as_str(), "/a/b");
        assert_eq!(RemotePath::new("").as_str(), "/");
        assert_eq!(RemotePath::new("//a//b").as_str(), "/a/b");
        assert_eq!(RemotePath::new("a/b").as_str(), "/a/b");
    }

    #[test]
    fn windows_paths_are_normalized() {
        assert_eq!(RemotePath::new("c:").as_str(), "C:/");
        assert_eq!(RemotePath::new("c:\\").as_str(), "C:/");
        assert_eq!(RemotePath::new("d:\\Users\\me\\").as_str(), "D:/Users/me");
        assert_eq!(RemotePath::new("E:data").as_str(), "E:/data");
        assert!(RemotePath::new("C:/x").is_windows());
        assert!(!RemotePath::new("/x").is_windows());
    }

    #[test]
    fn parent_of_posix_paths() {
        assert_eq!(RemotePath::new("/a/b").parent().as_str(), "/a");
        assert_eq!(RemotePath::new("/a").parent().as_str(), "/");
        assert_eq!(RemotePath::root().parent().as_str(), "/");
    }

    #[test]
    fn parent_of_windows_paths() {
        assert_eq!(RemotePath::new("C:/a/b").parent().as_str(), "C:/a");
        assert_eq!(RemotePath::new("C:/a").parent().as_str(), "C:/");
        assert_eq!(RemotePath::new("C:/").parent().as_str(), "C:/");
    }

    #[test]
    fn join_handles_roots_and_slashes() {
        assert_eq!(RemotePath::root().join("x").as_str(), "/x");
        assert_eq!(RemotePath::new("/a").join("/b/").as_str(), "/a/b");
        assert_eq!(RemotePath::new("C:/").join("dir").as_str(), "C:/dir");
        assert_eq!(RemotePath::new("C:/a").join("sub\\f.txt").as_str(), "C:/a/sub/f.txt");
        assert_eq!(RemotePath::new("/a").join("").as_str(), "/a");
    }

    #[test]
    fn file_name_is_last_segment() {
        assert_eq!(RemotePath::new("/a/old.txt").file_name(), "old.txt");
        assert_eq!(RemotePath::new("C:/dir").file_name(), "dir");
        assert_eq!(RemotePath::root().file_name(), "");
    }

    #[test]
    fn contains_is_segment_aware() {
        let ab = RemotePath::new("/a/b");
        assert!(ab.contains(&RemotePath::new("/a/b")));
        assert!(ab.contains(&RemotePath::new("/a/b/c")));
        assert!(!ab.contains(&RemotePath::new("/a/bc")));
        assert!(!ab.contains(&RemotePath::new("/a")));
        assert!(RemotePath::root().contains(&RemotePath::new("/anything")));
    }

    #[test]
    fn windows_contains_ignores_case() {
        let dir = RemotePath::new("C:/Data");
        assert!(dir.contains(&RemotePath::new("c:/data/sub")));
        assert!(!dir.contains(&RemotePath::new("C:/Database")));
    }

    #[test]
    fn native_rendering() {
        let p = RemotePath::new("C:/a/b");
        assert_eq!(p.to_native(OsType::Windows), "C:\\a\\b");
        assert_eq!(p.to_native(OsType::Posix), "C:/a/b");
    }

    #[test]
    fn serde_normalizes_on_read() {
        let p: RemotePath = serde_json::from_str("\"d:\\\\x\\\\\"").unwrap();
        assert_eq!(p.as_str(), "D:/x");
        assert_eq!(serde_json::to_string(&p).unwrap(), "\"D:/x\"");
    }
}
