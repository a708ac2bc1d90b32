//! Core error types for csasg-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering every
//! failure mode of the node arena, the filter overlay and the binary codec.

use thiserror::Error;

use crate::id::NodeId;
use crate::schema::EdgeKind;

/// Core errors produced by the csasg-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Id outside the arena, outside the filter container, or naming an
    /// empty slot where a node is required.
    #[error("invalid node id: {id}")]
    InvalidNodeId { id: NodeId },

    /// Unknown or abstract node kind requested.
    #[error("invalid node kind {tag}: {reason}")]
    InvalidNodeKind { tag: u16, reason: String },

    /// Edge target missing, of the wrong kind, or creating an ownership cycle.
    #[error("invalid target {target} for edge {edge:?}: {reason}")]
    InvalidEdgeTarget {
        edge: EdgeKind,
        target: NodeId,
        reason: String,
    },

    /// Edge used against its declaration (wrong owner kind or cardinality).
    #[error("invalid edge: {reason}")]
    InvalidEdge { reason: String },

    /// Attribute used against its declaration.
    #[error("invalid attribute: {reason}")]
    InvalidAttribute { reason: String },

    /// Underlying reader or writer failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The binary input does not follow the `csi` or filter format.
    #[error("format error: {0}")]
    Format(#[from] FormatError),
}

/// Problems found while decoding a `csi` graph or a filter file.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    /// The mandatory metadata block or one of its keys is absent.
    #[error("missing metadata: {what}")]
    MissingMetadata { what: String },

    /// Metadata names a different schema or version than the running one.
    #[error("{field} mismatch: expected '{expected}', found '{found}'")]
    VersionMismatch {
        field: String,
        expected: String,
        found: String,
    },

    /// A stored element count disagrees with the arena.
    #[error("count mismatch: expected {expected}, found {found}")]
    CountMismatch { expected: u64, found: u64 },

    /// Input ended in the middle of a record.
    #[error("unexpected end of input")]
    Truncated,

    /// Structurally invalid content.
    #[error("malformed input: {reason}")]
    Malformed { reason: String },
}

impl CoreError {
    /// Shorthand for a [`FormatError::Malformed`] error.
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        CoreError::Format(FormatError::Malformed {
            reason: reason.into(),
        })
    }
}
