//! Optimistic patches to panel listings.
//!
//! Mutations are shown before the server confirms them. Each applied
//! [`PatchOp`] yields a [`Patch`] that remembers exactly what changed, so a
//! failed operation can be reverted without reloading. A patch only touches
//! a panel that currently shows the affected directory on the affected
//! server; otherwise nothing happens and no patch is returned.

use std::collections::HashSet;

use crate::fs::entry::{FileEntry, TransferFile};
use crate::fs::path::RemotePath;
use crate::nav::panel::{Panel, PanelSide};
use crate::nav::selection::Selection;

/// A speculative change to one directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOp {
    /// Add placeholders for `files` under `parent`.
    Insert {
        server: String,
        parent: RemotePath,
        files: Vec<TransferFile>,
    },
    /// Drop `paths` from the listing of `parent` and from the selection.
    Remove {
        server: String,
        parent: RemotePath,
        paths: Vec<RemotePath>,
    },
    /// Give the entry at `old_path` the name `new_name`.
    Rename {
        server: String,
        old_path: RemotePath,
        new_name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Undo {
    Uninsert(HashSet<RemotePath>),
    Restore {
        removed: Vec<(usize, FileEntry)>,
        selection: Selection,
    },
    RenameBack {
        from: RemotePath,
        to: RemotePath,
    },
}

/// An applied [`PatchOp`] together with its inverse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    side: PanelSide,
    server: String,
    dir: RemotePath,
    undo: Undo,
}

impl Patch {
    pub fn side(&self) -> PanelSide {
        self.side
    }

    /// Number of listing entries the patch added, removed or renamed.
    pub fn affected(&self) -> usize {
        match &self.undo {
            Undo::Uninsert(paths) => paths.len(),
            Undo::Restore { removed, .. } => removed.len(),
            Undo::RenameBack { .. } => 1,
        }
    }

    /// Undoes the patch. A panel that has since moved elsewhere is left alone.
    pub fn revert(self, panel: &mut Panel) -> bool {
        if panel.side() != self.side || !panel.browse().is_browsing(&self.server, &self.dir) {
            return false;
        }
        match self.undo {
            Undo::Uninsert(paths) => {
                panel.browse_mut().remove_paths(&paths);
                panel.selection_mut().remove_paths(&paths);
            }
            Undo::Restore { removed, selection } => {
                panel.browse_mut().restore(&removed);
                *panel.selection_mut() = selection;
            }
            Undo::RenameBack { from, to } => {
                panel.browse_mut().rename_entry(&from, &to);
                panel.selection_mut().rename(&from, &to);
            }
        }
        true
    }
}

/// Applies `op` to `panel`. Returns `None` if the panel does not show the
/// affected directory or nothing changed.
pub fn apply(panel: &mut Panel, op: PatchOp) -> Option<Patch> {
    match op {
        PatchOp::Insert {
            server,
            parent,
            files,
        } => {
            if !panel.browse().is_browsing(&server, &parent) {
                return None;
            }
            let mut inserted = HashSet::new();
            for file in &files {
                let entry = FileEntry::placeholder(&parent, &file.name, file.is_directory);
                let path = entry.path().clone();
                if panel.browse_mut().insert_entry(entry) {
                    inserted.insert(path);
                }
            }
            if inserted.is_empty() {
                return None;
            }
            tracing::debug!(side = ?panel.side(), count = inserted.len(), "optimistic insert");
            Some(Patch {
                side: panel.side(),
                server,
                dir: parent,
                undo: Undo::Uninsert(inserted),
            })
        }
        PatchOp::Remove {
            server,
            parent,
            paths,
        } => {
            if !panel.browse().is_browsing(&server, &parent) {
                return None;
            }
            let paths: HashSet<RemotePath> = paths.into_iter().collect();
            let selection = panel.selection().clone();
            let removed = panel.browse_mut().remove_paths(&paths);
            let deselected = panel.selection_mut().remove_paths(&paths);
            if removed.is_empty() && deselected == 0 {
                return None;
            }
            tracing::debug!(side = ?panel.side(), count = removed.len(), "optimistic remove");
            Some(Patch {
                side: panel.side(),
                server,
                dir: parent,
                undo: Undo::Restore { removed, selection },
            })
        }
        PatchOp::Rename {
            server,
            old_path,
            new_name,
        } => {
            let parent = old_path.parent();
            if !panel.browse().is_browsing(&server, &parent) {
                return None;
            }
            let new_path = parent.join(&new_name);
            if new_path == old_path {
                return None;
            }
            panel.browse_mut().rename_entry(&old_path, &new_path)?;
            panel.selection_mut().rename(&old_path, &new_path);
            tracing::debug!(side = ?panel.side(), from = %old_path, to = %new_path, "optimistic rename");
            Some(Patch {
                side: panel.side(),
                server,
                dir: parent,
                undo: Undo::RenameBack {
                    from: new_path,
                    to: old_path,
                },
            })
        }
    }
}
