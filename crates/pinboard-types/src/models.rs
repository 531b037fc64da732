use serde::Deserialize;

/// Which membership collection on a pin an engagement touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngagementKind {
    Like,
    Save,
}

impl EngagementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementKind::Like => "like",
            EngagementKind::Save => "save",
        }
    }
}

/// Desired end state for the acting user's membership. Toggles are driven
/// by this, never by flipping whatever is currently stored, so a retried
/// request cannot undo itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngagementAction {
    Add,
    Remove,
}

/// Wire action for `PUT /pins/{id}/like`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LikeAction {
    Like,
    Unlike,
}

impl From<LikeAction> for EngagementAction {
    fn from(action: LikeAction) -> Self {
        match action {
            LikeAction::Like => EngagementAction::Add,
            LikeAction::Unlike => EngagementAction::Remove,
        }
    }
}

/// Wire action for `PUT /pins/{id}/save`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveAction {
    Save,
    Unsave,
}

impl From<SaveAction> for EngagementAction {
    fn from(action: SaveAction) -> Self {
        match action {
            SaveAction::Save => EngagementAction::Add,
            SaveAction::Unsave => EngagementAction::Remove,
        }
    }
}
