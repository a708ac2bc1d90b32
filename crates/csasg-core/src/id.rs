//! Stable ID newtypes for graph entities.
//!
//! [`NodeId`] addresses a slot in the node arena and [`StrKey`] addresses an
//! interned string. Both are distinct newtype wrappers over `u32`, so a string
//! key can never be passed where a node id is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable node identifier. `NodeId(0)` is the "no node" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// The sentinel meaning "absent edge target" / "no parent".
    pub const NONE: NodeId = NodeId(0);

    /// Returns `true` for the sentinel id.
    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` for any id other than the sentinel.
    pub fn is_some(self) -> bool {
        self.0 != 0
    }

    /// Arena slot index for this id.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Key of an interned string in the [`StrTable`](crate::strtable::StrTable).
///
/// Two keys from the same table compare equal iff their strings are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct StrKey(pub u32);

impl StrKey {
    /// Key of the empty string, present in every table.
    pub const EMPTY: StrKey = StrKey(0);
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for StrKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(raw: u32) -> Self {
        NodeId(raw)
    }
}
