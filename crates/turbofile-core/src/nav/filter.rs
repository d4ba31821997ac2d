//! Sorting and filtering for file entries.
//!
//! Listings are ordered directories first, then by a case-insensitive
//! natural name order where runs of digits compare by numeric value
//! (`file2` before `file10`). Ties fall back to the raw name and finally the
//! path so the order is total and independent of input order.

use std::cmp::Ordering;

use unicode_normalization::UnicodeNormalization;

use crate::fs::entry::FileEntry;

/// Compares two names in natural, case-insensitive order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let ka = natural_key(a);
    let kb = natural_key(b);
    for (ca, cb) in ka.iter().zip(kb.iter()) {
        let ord = match (ca, cb) {
            (Chunk::Digits(x), Chunk::Digits(y)) => cmp_digits(x, y),
            (Chunk::Text(x), Chunk::Text(y)) => x.cmp(y),
            // Keys alternate text/digits starting with text, so kinds line up.
            (Chunk::Text(_), Chunk::Digits(_)) => Ordering::Greater,
            (Chunk::Digits(_), Chunk::Text(_)) => Ordering::Less,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    ka.len().cmp(&kb.len())
}

/// Listing order: directories first, then [`natural_cmp`] on the name.
pub fn compare_entries(a: &FileEntry, b: &FileEntry) -> Ordering {
    b.is_dir()
        .cmp(&a.is_dir())
        .then_with(|| natural_cmp(a.name(), b.name()))
        .then_with(|| a.name().cmp(b.name()))
        .then_with(|| a.path().cmp(b.path()))
}

/// Returns a **new** sorted `Vec<FileEntry>`; the input slice is never mutated.
pub fn sort_entries(entries: &[FileEntry]) -> Vec<FileEntry> {
    let mut sorted = entries.to_vec();
    sorted.sort_by(compare_entries);
    sorted
}

/// Index at which `entry` would be inserted to keep `sorted` ordered.
pub fn insertion_index(sorted: &[FileEntry], entry: &FileEntry) -> usize {
    sorted.partition_point(|e| compare_entries(e, entry) == Ordering::Less)
}

/// Drops dot-prefixed entries unless `show_hidden` is set.
pub fn filter_hidden(entries: Vec<FileEntry>, show_hidden: bool) -> Vec<FileEntry> {
    if show_hidden {
        return entries;
    }
    entries.into_iter().filter(|e| !e.is_hidden()).collect()
}

/// First entry whose name contains `keyword`, case-insensitively.
pub fn find_first_match<'a>(
    entries: &'a [FileEntry],
    keyword: &str,
) -> Option<(usize, &'a FileEntry)> {
    let needle = fold(keyword.trim());
    if needle.is_empty() {
        return None;
    }
    entries
        .iter()
        .enumerate()
        .find(|(_, e)| fold(e.name()).contains(&needle))
}

#[derive(Debug, PartialEq, Eq)]
enum Chunk {
    Text(String),
    Digits(String),
}

fn natural_key(name: &str) -> Vec<Chunk> {
    let folded = fold(name);
    let mut chunks = Vec::new();
    let mut text = String::new();
    let mut digits = String::new();

    for c in folded.chars() {
        if c.is_ascii_digit() {
            if digits.is_empty() {
                chunks.push(Chunk::Text(std::mem::take(&mut text)));
            }
            digits.push(c);
        } else {
            if !digits.is_empty() {
                chunks.push(Chunk::Digits(std::mem::take(&mut digits)));
            }
            text.push(c);
        }
    }
    if !digits.is_empty() {
        chunks.push(Chunk::Digits(digits));
    } else {
        chunks.push(Chunk::Text(text));
    }
    chunks
}

fn cmp_digits(a: &str, b: &str) -> Ordering {
    let ta = a.trim_start_matches('0');
    let tb = b.trim_start_matches('0');
    ta.len()
        .cmp(&tb.len())
        .then_with(|| ta.cmp(tb))
        .then_with(|| a.len().cmp(&b.len()))
}

fn fold(s: &str) -> String {
    s.nfc().collect::<String>().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::path::RemotePath;

    fn file(name: &str) -> FileEntry {
        FileEntry::new(RemotePath::new(format!("/d/{name}")), false, 0, None)
    }

    fn dir(name: &str) -> FileEntry {
        FileEntry::new(RemotePath::new(format!("/d/{name}")), true, 0, None)
    }

    fn names(entries: &[FileEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name()).collect()
    }

    #[test]
    fn numbers_compare_by_value() {
        let sorted = sort_entries(&[file("file10"), file("file2"), file("file1")]);
        assert_eq!(names(&sorted), vec!["file1", "file2", "file10"]);
    }

    #[test]
    fn case_insensitive() {
        let sorted = sort_entries(&[file("banana"), file("Apple"), file("cherry")]);
        assert_eq!(names(&sorted), vec!["Apple", "banana", "cherry"]);
    }

    #[test]
    fn directories_first() {
        let sorted = sort_entries(&[file("a.txt"), dir("zeta"), file("b.txt"), dir("alpha")]);
        assert_eq!(names(&sorted), vec!["alpha", "zeta", "a.txt", "b.txt"]);
    }

    #[test]
    fn leading_digits_sort_before_letters() {
        let sorted = sort_entries(&[file("a"), file("1a")]);
        assert_eq!(names(&sorted), vec!["1a", "a"]);
    }

    #[test]
    fn order_is_independent_of_input_order() {
        let a = vec![file("A"), file("a"), file("01"), file("1"), dir("x10"), dir("x9")];
        let mut b = a.clone();
        b.reverse();
        assert_eq!(sort_entries(&a), sort_entries(&b));
    }

    #[test]
    fn sorting_is_idempotent() {
        let once = sort_entries(&[file("b2"), file("b10"), dir("c"), file("a")]);
        let twice = sort_entries(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn insertion_index_keeps_order() {
        let sorted = sort_entries(&[dir("d"), file("a"), file("c")]);
        assert_eq!(insertion_index(&sorted, &file("b")), 2);
        assert_eq!(insertion_index(&sorted, &dir("a")), 0);
        assert_eq!(insertion_index(&sorted, &file("z")), 3);
    }

    #[test]
    fn filter_hidden_drops_dotfiles() {
        let entries = vec![file(".env"), file("visible")];
        assert_eq!(filter_hidden(entries.clone(), false).len(), 1);
        assert_eq!(filter_hidden(entries, true).len(), 2);
    }

    #[test]
    fn first_match_is_case_insensitive() {
        let sorted = sort_entries(&[file("Report.pdf"), file("notes.txt")]);
        let (idx, entry) = find_first_match(&sorted, "REP").unwrap();
        assert_eq!(idx, 1);
        assert_eq!(entry.name(), "Report.pdf");
        assert!(find_first_match(&sorted, "").is_none());
        assert!(find_first_match(&sorted, "missing").is_none());
    }
}
