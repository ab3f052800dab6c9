use std::collections::HashMap;

use crate::api::CommentId;

/// Which reply subtrees the user folded, kept apart from the forest so that it
/// survives rebuilds
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CollapseState(HashMap<CommentId, bool>);

impl CollapseState {
    pub fn is_collapsed(&self, id: CommentId) -> bool {
        self.0.get(&id).copied().unwrap_or(false)
    }

    pub fn set_collapsed(&mut self, id: CommentId, collapsed: bool) {
        self.0.insert(id, collapsed);
    }

    /// Returns the new state
    pub fn toggle(&mut self, id: CommentId) -> bool {
        let collapsed = !self.is_collapsed(id);
        self.set_collapsed(id, collapsed);
        collapsed
    }
}
