//! Partial-order relationship between predicates, clauses and triggers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How one condition relates to another.
///
/// Reads left to right: `a.relationship(b) == Specializes` means `a` is
/// more specific than `b` (whenever `a` holds, `b` holds too).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    /// Both hold in exactly the same situations.
    Equal,
    /// Left is more specific than right.
    Specializes,
    /// Left is more general than right.
    Generalizes,
    /// Neither contains the other.
    Incomparable,
}

impl RelationshipType {
    /// The relationship seen from the other side.
    #[must_use]
    pub const fn swap(self) -> Self {
        match self {
            Self::Specializes => Self::Generalizes,
            Self::Generalizes => Self::Specializes,
            other => other,
        }
    }

    /// Swaps only when `swapped` is set.
    #[must_use]
    pub const fn swap_if(self, swapped: bool) -> Self {
        if swapped {
            self.swap()
        } else {
            self
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Equal => "Equal",
            Self::Specializes => "Specializes",
            Self::Generalizes => "Generalizes",
            Self::Incomparable => "Incomparable",
        };
        f.write_str(name)
    }
}
