//! The two browse panels.
//!
//! A [`Panel`] pairs a listing window ([`BrowseState`]) with the user's
//! [`Selection`] in it. The workspace owns exactly two: source and target.

use serde::{Deserialize, Serialize};

use crate::browse::state::BrowseState;
use crate::fs::path::RemotePath;
use crate::nav::selection::Selection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelSide {
    Source,
    Target,
}

impl PanelSide {
    pub const BOTH: [PanelSide; 2] = [PanelSide::Source, PanelSide::Target];

    pub fn other(self) -> PanelSide {
        match self {
            PanelSide::Source => PanelSide::Target,
            PanelSide::Target => PanelSide::Source,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Panel {
    side: PanelSide,
    browse: BrowseState,
    selection: Selection,
}

impl Panel {
    pub fn new(side: PanelSide) -> Self {
        Self {
            side,
            browse: BrowseState::new(),
            selection: Selection::new(),
        }
    }

    pub fn side(&self) -> PanelSide {
        self.side
    }

    pub fn browse(&self) -> &BrowseState {
        &self.browse
    }

    pub fn browse_mut(&mut self) -> &mut BrowseState {
        &mut self.browse
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut Selection {
        &mut self.selection
    }

    pub fn server(&self) -> Option<&str> {
        self.browse.server()
    }

    pub fn path(&self) -> Option<&RemotePath> {
        self.browse.path()
    }

    /// Moves to a new location. The selection never survives navigation.
    pub fn navigate(&mut self, server: impl Into<String>, path: RemotePath) {
        let server = server.into();
        if !self.browse.is_browsing(&server, &path) {
            self.selection.clear();
        }
        self.browse.navigate(server, path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::entry::TransferFile;

    #[test]
    fn other_side() {
        assert_eq!(PanelSide::Source.other(), PanelSide::Target);
        assert_eq!(PanelSide::Target.other(), PanelSide::Source);
    }

    #[test]
    fn navigate_clears_selection() {
        let mut panel = Panel::new(PanelSide::Source);
        panel.navigate("S1", RemotePath::new("/a"));
        panel
            .selection_mut()
            .insert(TransferFile::new(RemotePath::new("/a/x"), false));

        panel.navigate("S1", RemotePath::new("/a"));
        assert_eq!(panel.selection().len(), 1);

        panel.navigate("S1", RemotePath::new("/b"));
        assert!(panel.selection().is_empty());
        assert_eq!(panel.path().unwrap().as_str(), "/b");
    }

    #[test]
    fn side_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&PanelSide::Target).unwrap(), "\"target\"");
    }
}
