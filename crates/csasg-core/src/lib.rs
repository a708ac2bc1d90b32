//! Storage engine for the C# abstract semantic graph.
//!
//! The [`Factory`] owns every node of a parsed program, addressed by
//! [`NodeId`]. Node kinds, their edges and their attributes are described by
//! the static tables in [`schema`]. On top of the arena sit a visibility
//! [`filter`], lazy filtered iterators ([`ListIter`], [`AssocIter`]), an
//! optional [`ReverseEdges`] index, and the `csi` binary format.

pub mod dump;
pub mod error;
pub mod factory;
pub mod filter;
pub mod header;
pub mod id;
pub mod io;
pub mod iter;
pub mod node;
pub mod persist;
pub mod reverse;
pub mod schema;
pub mod strtable;
pub mod walk;

// Re-export commonly used types
pub use error::{CoreError, FormatError};
pub use factory::{Factory, ROOT_ID};
pub use filter::{FilterGuard, FilterState};
pub use header::Header;
pub use id::{NodeId, StrKey};
pub use iter::{AssocIter, ListIter};
pub use node::{AttrType, AttrValue, EdgeSlot, Node, Range, Span};
pub use reverse::{EdgeSelector, ReverseEdges};
pub use schema::{schema, AttrKind, EdgeKind, NodeKind, Schema};
pub use strtable::StrTable;
pub use walk::{Preorder, Visitor};
