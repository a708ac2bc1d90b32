//! The generic node representation driven by the schema tables.
//!
//! A [`Node`] carries its kind, its owning parent, an optional source
//! [`Range`] and two slot vectors laid out by [`Schema`]: scalar attributes
//! and edges. Mutation goes through [`Factory`](crate::factory::Factory),
//! which enforces the ownership and target-kind rules; `Node` itself only
//! exposes reads.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::id::{NodeId, StrKey};
use crate::schema::{schema, AttrKind, EdgeKind, NodeKind, Schema};

// ---------------------------------------------------------------------------
// Scalar attributes
// ---------------------------------------------------------------------------

/// Declared type of a scalar attribute or an associated edge value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttrType {
    Str,
    Bool,
    Int,
}

/// A scalar attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttrValue {
    /// Key into the factory's string table.
    Str(StrKey),
    Bool(bool),
    Int(i64),
}

impl AttrValue {
    /// The zero value of `ty`, used for freshly created nodes.
    pub fn default_for(ty: AttrType) -> AttrValue {
        match ty {
            AttrType::Str => AttrValue::Str(StrKey::EMPTY),
            AttrType::Bool => AttrValue::Bool(false),
            AttrType::Int => AttrValue::Int(0),
        }
    }

    pub fn ty(&self) -> AttrType {
        match self {
            AttrValue::Str(_) => AttrType::Str,
            AttrValue::Bool(_) => AttrType::Bool,
            AttrValue::Int(_) => AttrType::Int,
        }
    }

    pub fn as_str_key(&self) -> Option<StrKey> {
        match self {
            AttrValue::Str(key) => Some(*key),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Source ranges
// ---------------------------------------------------------------------------

/// Line/column extent inside a source file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

/// Source location of a positioned node.
///
/// `position` is the physical extent; `logical` follows `#line` directives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub path: StrKey,
    pub position: Span,
    pub logical: Span,
}

// ---------------------------------------------------------------------------
// Edge slots
// ---------------------------------------------------------------------------

/// Storage of one declared edge on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeSlot {
    /// `NodeId::NONE` when unset.
    Single(NodeId),
    /// Ordered, duplicates allowed.
    Multiple(Vec<NodeId>),
    /// Ordered list with one associated value per entry; `ids` and `values`
    /// always have the same length.
    Assoc {
        ids: Vec<NodeId>,
        values: Vec<AttrValue>,
    },
}

impl EdgeSlot {
    fn empty_for(edge: EdgeKind) -> EdgeSlot {
        let spec = edge.spec();
        if !spec.is_multiple() {
            EdgeSlot::Single(NodeId::NONE)
        } else if spec.assoc.is_some() {
            EdgeSlot::Assoc {
                ids: Vec::new(),
                values: Vec::new(),
            }
        } else {
            EdgeSlot::Multiple(Vec::new())
        }
    }

    /// Target ids held by this slot. A cleared single edge yields `[NONE]`.
    pub fn ids(&self) -> &[NodeId] {
        match self {
            EdgeSlot::Single(id) => std::slice::from_ref(id),
            EdgeSlot::Multiple(ids) => ids,
            EdgeSlot::Assoc { ids, .. } => ids,
        }
    }

    /// Number of occurrences of `target` in this slot.
    pub fn occurrences(&self, target: NodeId) -> usize {
        self.ids().iter().filter(|&&id| id == target).count()
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// One ASG node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) kind: NodeKind,
    /// Owning parent, `NONE` for the root and for individual nodes.
    pub(crate) parent: NodeId,
    /// `Some` exactly for descendants of `Positioned`.
    pub(crate) position: Option<Range>,
    pub(crate) attrs: SmallVec<[AttrValue; 4]>,
    pub(crate) edges: SmallVec<[EdgeSlot; 4]>,
}

impl Node {
    /// Builds a node of `kind` with default attributes and empty edges.
    pub(crate) fn empty(schema: &Schema, kind: NodeKind, id: NodeId) -> Node {
        Node {
            id,
            kind,
            parent: NodeId::NONE,
            position: schema.is_positioned(kind).then(Range::default),
            attrs: schema
                .attrs_of(kind)
                .iter()
                .map(|a| AttrValue::default_for(a.spec().ty))
                .collect(),
            edges: schema
                .edges_of(kind)
                .iter()
                .map(|&e| EdgeSlot::empty_for(e))
                .collect(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn parent(&self) -> NodeId {
        self.parent
    }

    pub fn range(&self) -> Option<&Range> {
        self.position.as_ref()
    }

    /// Attribute values in slot order.
    pub fn attrs(&self) -> &[AttrValue] {
        &self.attrs
    }

    /// Edge slots in slot order, parallel to `schema().edges_of(kind)`.
    pub fn edge_slots(&self) -> &[EdgeSlot] {
        &self.edges
    }

    /// Value of `attr`, or `None` if this node's kind does not declare it.
    pub fn attr(&self, attr: AttrKind) -> Option<AttrValue> {
        let schema = schema();
        if !schema.has_attr(self.kind, attr) {
            return None;
        }
        self.attrs.get(schema.attr_slot(attr)).copied()
    }

    /// The slot of `edge`, or `None` if this node's kind does not declare it.
    pub fn edge(&self, edge: EdgeKind) -> Option<&EdgeSlot> {
        let schema = schema();
        if !schema.has_edge(self.kind, edge) {
            return None;
        }
        self.edges.get(schema.edge_slot(edge))
    }

    /// Target of a single edge (possibly `NONE`).
    pub fn single(&self, edge: EdgeKind) -> Option<NodeId> {
        match self.edge(edge)? {
            EdgeSlot::Single(id) => Some(*id),
            _ => None,
        }
    }

    /// Raw (unfiltered) target list of a multiple edge.
    pub fn list(&self, edge: EdgeKind) -> Option<&[NodeId]> {
        match self.edge(edge)? {
            EdgeSlot::Single(_) => None,
            slot => Some(slot.ids()),
        }
    }

    /// Associated values of an associated multiple edge.
    pub fn assoc_values(&self, edge: EdgeKind) -> Option<&[AttrValue]> {
        match self.edge(edge)? {
            EdgeSlot::Assoc { values, .. } => Some(values),
            _ => None,
        }
    }

    /// Every non-zero target, paired with the edge holding it, in slot order.
    pub fn targets(&self) -> impl Iterator<Item = (EdgeKind, NodeId)> + '_ {
        schema()
            .edges_of(self.kind)
            .iter()
            .zip(self.edges.iter())
            .flat_map(|(&edge, slot)| slot.ids().iter().map(move |&id| (edge, id)))
            .filter(|(_, id)| id.is_some())
    }

    /// Owned children in slot order.
    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.targets()
            .filter(|(edge, _)| edge.spec().is_owning())
            .map(|(_, id)| id)
    }

    /// `true` if some owning edge of this node currently holds `child`.
    pub fn owns(&self, child: NodeId) -> bool {
        self.children().any(|id| id == child)
    }

    pub(crate) fn slot_mut(&mut self, edge: EdgeKind) -> Option<&mut EdgeSlot> {
        let schema = schema();
        if !schema.has_edge(self.kind, edge) {
            return None;
        }
        self.edges.get_mut(schema.edge_slot(edge))
    }
}
