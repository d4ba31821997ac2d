//! File entry representation.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::fs::path::RemotePath;
use crate::nfc_string;

/// A single file or directory on a remote server.
///
/// `FileEntry` is immutable: create new instances via the constructors or
/// [`FileEntry::renamed`] rather than mutating existing ones. `name` always
/// equals the last segment of `path`. Directory sizes are reported as `0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    path: RemotePath,
    name: String,
    is_directory: bool,
    #[serde(default)]
    size: u64,
    #[serde(default, with = "timestamp")]
    modified: Option<NaiveDateTime>,
}

impl FileEntry {
    /// Creates an entry whose name is derived from `path`.
    pub fn new(
        path: RemotePath,
        is_directory: bool,
        size: u64,
        modified: Option<NaiveDateTime>,
    ) -> Self {
        let name = nfc_string(path.file_name());
        Self {
            path,
            name,
            is_directory,
            size: if is_directory { 0 } else { size },
            modified,
        }
    }

    /// Creates a placeholder for a file that is expected to exist under
    /// `parent` once an in-flight operation completes.
    ///
    /// Placeholders have size `0` and a modification time of "now".
    pub fn placeholder(parent: &RemotePath, name: &str, is_directory: bool) -> Self {
        let now = chrono::Local::now().naive_local();
        Self::new(parent.join(name), is_directory, 0, Some(now))
    }

    /// Returns a copy moved to `new_path`, keeping size and timestamp.
    pub fn renamed(&self, new_path: RemotePath) -> Self {
        Self::new(new_path, self.is_directory, self.size, self.modified)
    }

    pub fn path(&self) -> &RemotePath {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the file size in bytes. Always `0` for directories.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn modified(&self) -> Option<NaiveDateTime> {
        self.modified
    }

    pub fn is_dir(&self) -> bool {
        self.is_directory
    }

    /// Returns `true` if the name starts with `.`.
    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('.')
    }
}

/// A file as it appears in a selection, clipboard or transfer request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferFile {
    pub path: RemotePath,
    pub name: String,
    pub is_directory: bool,
}

impl TransferFile {
    pub fn new(path: RemotePath, is_directory: bool) -> Self {
        let name = path.file_name().to_string();
        Self {
            path,
            name,
            is_directory,
        }
    }
}

impl From<&FileEntry> for TransferFile {
    fn from(entry: &FileEntry) -> Self {
        Self {
            path: entry.path.clone(),
            name: entry.name.clone(),
            is_directory: entry.is_directory,
        }
    }
}

/// `YYYY-MM-DD HH:MM:SS` on the wire; unparseable values read as `None`.
mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(
        value: &Option<NaiveDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_str(&ts.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.and_then(|s| NaiveDateTime::parse_from_str(&s, FORMAT).ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_basename_of_path() {
        let entry = FileEntry::new(RemotePath::new("/remote/file.txt"), false, 1024, None);
        assert_eq!(entry.name(), "file.txt");
        assert_eq!(entry.size(), 1024);
        assert!(!entry.is_dir());
        assert!(!entry.is_hidden());
    }

    #[test]
    fn directory_size_is_zero() {
        let entry = FileEntry::new(RemotePath::new("/remote/docs"), true, 9999, None);
        assert!(entry.is_dir());
        assert_eq!(entry.size(), 0);
    }

    #[test]
    fn hidden_by_leading_dot() {
        let entry = FileEntry::new(RemotePath::new("/remote/.env"), false, 1, None);
        assert!(entry.is_hidden());
    }

    #[test]
    fn placeholder_under_parent() {
        let entry = FileEntry::placeholder(&RemotePath::new("/dst"), "f.txt", false);
        assert_eq!(entry.path().as_str(), "/dst/f.txt");
        assert_eq!(entry.name(), "f.txt");
        assert_eq!(entry.size(), 0);
        assert!(entry.modified().is_some());
    }

    #[test]
    fn renamed_keeps_metadata() {
        let entry = FileEntry::new(RemotePath::new("/a/old.txt"), false, 42, None);
        let renamed = entry.renamed(RemotePath::new("/a/new.txt"));
        assert_eq!(renamed.name(), "new.txt");
        assert_eq!(renamed.size(), 42);
    }

    #[test]
    fn decomposed_names_are_composed() {
        // "가" written as two Jamo
        let entry = FileEntry::new(RemotePath::new("/k/\u{1100}\u{1161}.txt"), false, 0, None);
        assert_eq!(entry.name(), "가.txt");
    }

    #[test]
    fn reads_wire_format() {
        let json = r#"{"name":"a.txt","path":"/x/a.txt","is_directory":false,"size":3,"modified":"2024-05-01 10:20:30"}"#;
        let entry: FileEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.path().as_str(), "/x/a.txt");
        assert_eq!(
            entry.modified().unwrap().format("%H:%M:%S").to_string(),
            "10:20:30"
        );
    }

    #[test]
    fn bad_timestamp_reads_as_none() {
        let json = r#"{"name":"a","path":"/a","is_directory":true,"modified":"yesterday"}"#;
        let entry: FileEntry = serde_json::from_str(json).unwrap();
        assert!(entry.modified().is_none());
    }

    #[test]
    fn transfer_file_from_entry() {
        let entry = FileEntry::new(RemotePath::new("/src/f.txt"), false, 1, None);
        let file = TransferFile::from(&entry);
        assert_eq!(file.name, "f.txt");
        assert_eq!(file.path.as_str(), "/src/f.txt");
        assert!(!file.is_directory);
    }
}
