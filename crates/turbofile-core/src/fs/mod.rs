//! Paths and entries as the remote servers report them.
//!
//! [`path::RemotePath`] is the normalized server-side path used for every
//! comparison, and [`entry::FileEntry`] is one row of a directory listing.

pub mod entry;
pub mod path;

pub use entry::{FileEntry, TransferFile};
pub use path::{OsType, RemotePath};
