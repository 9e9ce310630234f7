use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the three persisted note lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Active,
    Deleted,
    Archived,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Active, Collection::Deleted, Collection::Archived];

    /// Key under which the collection's JSON array is stored
    pub fn storage_key(self) -> &'static str {
        match self {
            Collection::Active => "notes",
            Collection::Deleted => "deleted",
            Collection::Archived => "archived",
        }
    }

    /// Whether a note may move directly from `self` to `dest`.
    ///
    /// Active -> Deleted | Archived, Deleted -> Active | Archived,
    /// Archived -> Active. Nothing else.
    pub fn can_move_to(self, dest: Collection) -> bool {
        matches!(
            (self, dest),
            (Collection::Active, Collection::Deleted)
                | (Collection::Active, Collection::Archived)
                | (Collection::Deleted, Collection::Active)
                | (Collection::Deleted, Collection::Archived)
                | (Collection::Archived, Collection::Active)
        )
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Collection::Active => write!(f, "active"),
            Collection::Deleted => write!(f, "deleted"),
            Collection::Archived => write!(f, "archived"),
        }
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" | "notes" => Ok(Collection::Active),
            "deleted" | "trash" => Ok(Collection::Deleted),
            "archived" | "archive" => Ok(Collection::Archived),
            _ => Err(format!(
                "unknown collection '{}' (expected active, deleted or archived)",
                s
            )),
        }
    }
}
