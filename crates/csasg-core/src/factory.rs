//! Factory: the node arena and the single entry point for graph mutation.
//!
//! The factory owns the nodes, the string table, the filter overlay and the
//! optional reverse edge index, which live and die together. Every mutation
//! goes through factory methods so the following hold at all times:
//!
//! - every non-zero edge target exists and descends from the edge's declared
//!   target kind;
//! - a node has at most one owning parent, and ownership never forms a cycle;
//! - the filter is at least as long as the arena;
//! - the reverse index, when attached, mirrors the current edges.
//!
//! Nodes are never deleted. Persistence lives in [`crate::persist`].

use crate::error::CoreError;
use crate::filter::{Filter, FilterGuard, FilterState};
use crate::id::{NodeId, StrKey};
use crate::iter::{AssocIter, ListIter};
use crate::node::{AttrValue, EdgeSlot, Node, Range};
use crate::reverse::{EdgeSelector, ReverseEdges};
use crate::schema::{schema, AttrKind, EdgeKind, EdgeSpec, NodeKind};
use crate::strtable::StrTable;
use crate::walk::{CollectIds, Preorder};

/// Id of the root `CompilationUnit` in every arena.
pub const ROOT_ID: NodeId = NodeId(1);

/// The node arena.
#[derive(Debug, Clone)]
pub struct Factory {
    /// Slot 0 is always empty.
    pub(crate) nodes: Vec<Option<Node>>,
    root: NodeId,
    pub(crate) strings: StrTable,
    pub(crate) filter: Filter,
    pub(crate) reverse: Option<ReverseEdges>,
}

impl Default for Factory {
    fn default() -> Self {
        Self::new()
    }
}

impl Factory {
    /// A fresh arena holding only the root `CompilationUnit`.
    pub fn new() -> Self {
        let root = Node::empty(schema(), NodeKind::CompilationUnit, ROOT_ID);
        Factory {
            nodes: vec![None, Some(root)],
            root: ROOT_ID,
            strings: StrTable::new(),
            filter: Filter::new(2),
            reverse: None,
        }
    }

    /// Discards every node and string. A reverse index stays attached with
    /// the same selector.
    pub fn reset(&mut self) {
        let selector = self.reverse.as_ref().map(ReverseEdges::selector);
        *self = Factory::new();
        if let Some(selector) = selector {
            self.attach_reverse_edges(selector);
        }
    }

    // -----------------------------------------------------------------------
    // Creation and lookup
    // -----------------------------------------------------------------------

    /// Creates a node of `kind` at the next sequential id.
    pub fn create_node(&mut self, kind: NodeKind) -> Result<NodeId, CoreError> {
        let id = NodeId(self.nodes.len() as u32);
        let node = schema().instantiate(kind, id)?;
        self.nodes.push(Some(node));
        self.grow_overlays();
        Ok(id)
    }

    /// Creates a node of `kind` at an explicit `id`, leaving empty slots
    /// before it if needed. Used when loading.
    pub fn create_node_with_id(&mut self, kind: NodeKind, id: NodeId) -> Result<NodeId, CoreError> {
        if id.is_none() || self.get_ref(id).is_some() {
            return Err(CoreError::InvalidNodeId { id });
        }
        let node = schema().instantiate(kind, id)?;
        if self.nodes.len() <= id.index() {
            self.nodes.resize_with(id.index() + 1, || None);
        }
        self.nodes[id.index()] = Some(node);
        self.grow_overlays();
        Ok(id)
    }

    fn grow_overlays(&mut self) {
        let len = self.nodes.len();
        self.filter.resize_to(len);
        if let Some(reverse) = self.reverse.as_mut() {
            reverse.ensure_len(len);
        }
    }

    /// `Ok(false)` for an empty slot (including id 0), `InvalidNodeId` past
    /// the end of the arena.
    pub fn exists(&self, id: NodeId) -> Result<bool, CoreError> {
        self.nodes
            .get(id.index())
            .map(Option::is_some)
            .ok_or(CoreError::InvalidNodeId { id })
    }

    /// Tolerant lookup: `None` for empty or out-of-range ids.
    pub fn get_ref(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())?.as_ref()
    }

    /// Strict lookup.
    pub fn get_node(&self, id: NodeId) -> Result<&Node, CoreError> {
        self.get_ref(id).ok_or(CoreError::InvalidNodeId { id })
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, CoreError> {
        self.nodes
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(CoreError::InvalidNodeId { id })
    }

    pub fn node_kind(&self, id: NodeId) -> Result<NodeKind, CoreError> {
        Ok(self.get_node(id)?.kind())
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// `true` if the node exists and has no owning parent.
    pub fn is_individual(&self, id: NodeId) -> bool {
        self.get_ref(id).is_some_and(|n| n.parent().is_none())
    }

    /// Slot count, including the sentinel slot 0.
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    /// Live nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter_map(Option::as_ref)
    }

    /// Owning parents of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = self.get_ref(id).map_or(NodeId::NONE, Node::parent);
        while current.is_some() && chain.len() < self.nodes.len() {
            chain.push(current);
            current = self.get_ref(current).map_or(NodeId::NONE, Node::parent);
        }
        chain
    }

    pub fn strings(&self) -> &StrTable {
        &self.strings
    }

    pub fn strings_mut(&mut self) -> &mut StrTable {
        &mut self.strings
    }

    /// Resolves `key` against this factory's string table.
    pub fn resolve(&self, key: StrKey) -> Option<&str> {
        self.strings.resolve(key)
    }

    // -----------------------------------------------------------------------
    // Edges
    // -----------------------------------------------------------------------

    fn edge_spec(&self, owner: NodeId, edge: EdgeKind) -> Result<&'static EdgeSpec, CoreError> {
        let kind = self.node_kind(owner)?;
        if !schema().has_edge(kind, edge) {
            return Err(CoreError::InvalidEdge {
                reason: format!("{} has no edge {:?}", kind.name(), edge),
            });
        }
        Ok(edge.spec())
    }

    fn check_multiple(spec: &EdgeSpec, assoc: Option<AttrValue>) -> Result<(), CoreError> {
        if !spec.is_multiple() {
            return Err(CoreError::InvalidEdge {
                reason: format!("{:?} is a single edge", spec.kind),
            });
        }
        match (spec.assoc, assoc) {
            (None, None) => Ok(()),
            (Some(ty), Some(value)) if value.ty() == ty => Ok(()),
            (Some(ty), Some(value)) => Err(CoreError::InvalidEdge {
                reason: format!("{:?} expects {ty:?} values, got {:?}", spec.kind, value.ty()),
            }),
            (Some(_), None) => Err(CoreError::InvalidEdge {
                reason: format!("{:?} requires an associated value", spec.kind),
            }),
            (None, Some(_)) => Err(CoreError::InvalidEdge {
                reason: format!("{:?} has no associated value", spec.kind),
            }),
        }
    }

    fn check_target(&self, owner: NodeId, spec: &EdgeSpec, target: NodeId) -> Result<(), CoreError> {
        let reject = |reason: String| CoreError::InvalidEdgeTarget {
            edge: spec.kind,
            target,
            reason,
        };
        let node = self
            .get_ref(target)
            .ok_or_else(|| reject("target does not exist".into()))?;
        if !schema().is_descendant(node.kind(), spec.target) {
            return Err(reject(format!(
                "{} is not a {}",
                node.kind().name(),
                spec.target.name()
            )));
        }
        if spec.is_owning() {
            if target == self.root {
                return Err(reject("the root cannot be owned".into()));
            }
            if target == owner
                || (node.children().next().is_some() && self.ancestors(owner).contains(&target))
            {
                return Err(reject("ownership cycle".into()));
            }
        }
        Ok(())
    }

    /// Sets a single edge. `NodeId::NONE` clears it.
    ///
    /// For owning edges the previous target is detached and the new target is
    /// adopted, leaving any previous parent first.
    pub fn set_edge(&mut self, owner: NodeId, edge: EdgeKind, target: NodeId) -> Result<(), CoreError> {
        let spec = self.edge_spec(owner, edge)?;
        if spec.is_multiple() {
            return Err(CoreError::InvalidEdge {
                reason: format!("{edge:?} is a multiple edge"),
            });
        }
        if target.is_some() {
            self.check_target(owner, spec, target)?;
            if spec.is_owning() {
                self.adopt(owner, target)?;
            }
        }

        let old = match self.node_mut(owner)?.slot_mut(edge) {
            Some(EdgeSlot::Single(id)) => std::mem::replace(id, target),
            _ => {
                return Err(CoreError::InvalidEdge {
                    reason: format!("{edge:?} slot is not single"),
                })
            }
        };
        if old == target {
            return Ok(());
        }
        if old.is_some() {
            if spec.is_owning() {
                self.release(owner, old);
            }
            self.sync_reverse(old, owner, edge);
        }
        if target.is_some() {
            self.sync_reverse(target, owner, edge);
        }
        Ok(())
    }

    /// Appends `target` to a multiple edge.
    pub fn add_edge(&mut self, owner: NodeId, edge: EdgeKind, target: NodeId) -> Result<(), CoreError> {
        let spec = self.edge_spec(owner, edge)?;
        Self::check_multiple(spec, None)?;
        self.push_edge(owner, spec, target, None)
    }

    /// Appends `target` with its associated `value` to an associated edge.
    pub fn add_edge_assoc(
        &mut self,
        owner: NodeId,
        edge: EdgeKind,
        target: NodeId,
        value: AttrValue,
    ) -> Result<(), CoreError> {
        let spec = self.edge_spec(owner, edge)?;
        Self::check_multiple(spec, Some(value))?;
        if let AttrValue::Str(key) = value {
            self.check_key(key)
                .map_err(|reason| CoreError::InvalidEdge { reason })?;
        }
        self.push_edge(owner, spec, target, Some(value))
    }

    fn push_edge(
        &mut self,
        owner: NodeId,
        spec: &EdgeSpec,
        target: NodeId,
        value: Option<AttrValue>,
    ) -> Result<(), CoreError> {
        if target.is_none() {
            return Err(CoreError::InvalidEdgeTarget {
                edge: spec.kind,
                target,
                reason: "lists cannot hold the null id".into(),
            });
        }
        self.check_target(owner, spec, target)?;
        if spec.is_owning() {
            self.adopt(owner, target)?;
        }
        match (self.node_mut(owner)?.slot_mut(spec.kind), value) {
            (Some(EdgeSlot::Multiple(ids)), None) => ids.push(target),
            (Some(EdgeSlot::Assoc { ids, values }), Some(value)) => {
                ids.push(target);
                values.push(value);
            }
            _ => {
                return Err(CoreError::InvalidEdge {
                    reason: format!("{:?} slot does not match its declaration", spec.kind),
                })
            }
        }
        self.sync_reverse(target, owner, spec.kind);
        Ok(())
    }

    /// Removes the first occurrence of `target` from a multiple edge.
    ///
    /// Returns `false` if `target` was not in the list.
    pub fn remove_edge(&mut self, owner: NodeId, edge: EdgeKind, target: NodeId) -> Result<bool, CoreError> {
        let spec = self.edge_spec(owner, edge)?;
        if !spec.is_multiple() {
            return Err(CoreError::InvalidEdge {
                reason: format!("{edge:?} is a single edge"),
            });
        }
        let removed = match self.node_mut(owner)?.slot_mut(edge) {
            Some(EdgeSlot::Multiple(ids)) => match ids.iter().position(|&id| id == target) {
                Some(at) => {
                    ids.remove(at);
                    true
                }
                None => false,
            },
            Some(EdgeSlot::Assoc { ids, values }) => match ids.iter().position(|&id| id == target) {
                Some(at) => {
                    ids.remove(at);
                    values.remove(at);
                    true
                }
                None => false,
            },
            _ => false,
        };
        if removed {
            if spec.is_owning() {
                self.release(owner, target);
            }
            self.sync_reverse(target, owner, edge);
        }
        Ok(removed)
    }

    /// Makes `owner` the parent of `child`, stripping `child` from the owning
    /// slots of a different previous parent.
    fn adopt(&mut self, owner: NodeId, child: NodeId) -> Result<(), CoreError> {
        let previous = self.get_node(child)?.parent();
        if previous.is_some() && previous != owner {
            let mut stripped = Vec::new();
            if let Ok(parent) = self.node_mut(previous) {
                let kind = parent.kind();
                for (&edge, slot) in schema().edges_of(kind).iter().zip(parent.edges.iter_mut()) {
                    if !edge.spec().is_owning() {
                        continue;
                    }
                    let hit = match slot {
                        EdgeSlot::Single(id) if *id == child => {
                            *id = NodeId::NONE;
                            true
                        }
                        EdgeSlot::Single(_) => false,
                        EdgeSlot::Multiple(ids) => {
                            let before = ids.len();
                            ids.retain(|&id| id != child);
                            ids.len() != before
                        }
                        EdgeSlot::Assoc { ids, values } => {
                            let before = ids.len();
                            let mut keep = ids.iter().map(|&id| id != child);
                            values.retain(|_| keep.next().unwrap_or(true));
                            ids.retain(|&id| id != child);
                            ids.len() != before
                        }
                    };
                    if hit {
                        stripped.push(edge);
                    }
                }
            }
            for edge in stripped {
                self.sync_reverse(child, previous, edge);
            }
        }
        self.node_mut(child)?.parent = owner;
        Ok(())
    }

    /// Detaches `child` from `owner` unless another slot of `owner` still owns it.
    fn release(&mut self, owner: NodeId, child: NodeId) {
        let still_owned = self.get_ref(owner).is_some_and(|n| n.owns(child));
        if still_owned {
            return;
        }
        if let Ok(node) = self.node_mut(child) {
            if node.parent == owner {
                node.parent = NodeId::NONE;
            }
        }
    }

    fn sync_reverse(&mut self, target: NodeId, source: NodeId, edge: EdgeKind) {
        let Some(reverse) = self.reverse.as_mut() else {
            return;
        };
        let present = self
            .nodes
            .get(source.index())
            .and_then(Option::as_ref)
            .and_then(|n| n.edge(edge))
            .is_some_and(|slot| slot.occurrences(target) > 0);
        reverse.sync(target, source, edge, present);
    }

    /// Target of a single edge.
    pub fn edge_target(&self, owner: NodeId, edge: EdgeKind) -> Result<NodeId, CoreError> {
        self.edge_spec(owner, edge)?;
        self.get_node(owner)?
            .single(edge)
            .ok_or_else(|| CoreError::InvalidEdge {
                reason: format!("{edge:?} is a multiple edge"),
            })
    }

    /// Filtered iterator over a multiple edge, positioned at the first
    /// visible element.
    pub fn list(&self, owner: NodeId, edge: EdgeKind) -> Result<ListIter<'_>, CoreError> {
        let ids = self.list_ids(owner, edge)?;
        Ok(ListIter::begin(self, ids, edge.spec().target))
    }

    /// Filtered iterator over a multiple edge, positioned off the end.
    pub fn list_end(&self, owner: NodeId, edge: EdgeKind) -> Result<ListIter<'_>, CoreError> {
        let ids = self.list_ids(owner, edge)?;
        Ok(ListIter::end(self, ids, edge.spec().target))
    }

    /// Filtered iterator over an associated edge.
    pub fn assoc_list(&self, owner: NodeId, edge: EdgeKind) -> Result<AssocIter<'_>, CoreError> {
        let ids = self.list_ids(owner, edge)?;
        let values = self
            .get_node(owner)?
            .assoc_values(edge)
            .ok_or_else(|| CoreError::InvalidEdge {
                reason: format!("{edge:?} has no associated values"),
            })?;
        Ok(AssocIter::new(ListIter::begin(self, ids, edge.spec().target), values))
    }

    fn list_ids(&self, owner: NodeId, edge: EdgeKind) -> Result<&[NodeId], CoreError> {
        self.edge_spec(owner, edge)?;
        self.get_node(owner)?
            .list(edge)
            .ok_or_else(|| CoreError::InvalidEdge {
                reason: format!("{edge:?} is a single edge"),
            })
    }

    // -----------------------------------------------------------------------
    // Attributes
    // -----------------------------------------------------------------------

    fn check_key(&self, key: StrKey) -> Result<(), String> {
        match self.strings.resolve(key) {
            Some(_) => Ok(()),
            None => Err(format!("string key {key} is not interned")),
        }
    }

    fn attr_slot(&self, id: NodeId, attr: AttrKind) -> Result<usize, CoreError> {
        let kind = self.node_kind(id)?;
        if !schema().has_attr(kind, attr) {
            return Err(CoreError::InvalidAttribute {
                reason: format!("{} has no attribute {:?}", kind.name(), attr),
            });
        }
        Ok(schema().attr_slot(attr))
    }

    pub fn set_attr(&mut self, id: NodeId, attr: AttrKind, value: AttrValue) -> Result<(), CoreError> {
        let slot = self.attr_slot(id, attr)?;
        let expected = attr.spec().ty;
        if value.ty() != expected {
            return Err(CoreError::InvalidAttribute {
                reason: format!("{attr:?} expects {expected:?}, got {:?}", value.ty()),
            });
        }
        if let AttrValue::Str(key) = value {
            self.check_key(key)
                .map_err(|reason| CoreError::InvalidAttribute { reason })?;
        }
        if let Some(entry) = self.node_mut(id)?.attrs.get_mut(slot) {
            *entry = value;
        }
        Ok(())
    }

    pub fn attr(&self, id: NodeId, attr: AttrKind) -> Result<AttrValue, CoreError> {
        let slot = self.attr_slot(id, attr)?;
        self.get_node(id)?
            .attrs()
            .get(slot)
            .copied()
            .ok_or_else(|| CoreError::InvalidAttribute {
                reason: format!("{attr:?} slot missing"),
            })
    }

    /// Interns `value` and stores it in a string attribute.
    pub fn set_str(&mut self, id: NodeId, attr: AttrKind, value: &str) -> Result<StrKey, CoreError> {
        self.attr_slot(id, attr)?;
        let key = self.strings.intern(value);
        self.set_attr(id, attr, AttrValue::Str(key))?;
        Ok(key)
    }

    /// Resolved text of a string attribute.
    pub fn str_attr(&self, id: NodeId, attr: AttrKind) -> Result<&str, CoreError> {
        let key = self
            .attr(id, attr)?
            .as_str_key()
            .ok_or_else(|| CoreError::InvalidAttribute {
                reason: format!("{attr:?} is not a string attribute"),
            })?;
        self.strings
            .resolve(key)
            .ok_or_else(|| CoreError::InvalidAttribute {
                reason: format!("string key {key} is not interned"),
            })
    }

    pub fn set_position(&mut self, id: NodeId, range: Range) -> Result<(), CoreError> {
        self.check_key(range.path)
            .map_err(|reason| CoreError::InvalidAttribute { reason })?;
        let node = self.node_mut(id)?;
        match node.position.as_mut() {
            Some(position) => {
                *position = range;
                Ok(())
            }
            None => Err(CoreError::InvalidAttribute {
                reason: format!("{} is not positioned", node.kind().name()),
            }),
        }
    }

    pub fn position(&self, id: NodeId) -> Result<&Range, CoreError> {
        let node = self.get_node(id)?;
        node.range().ok_or_else(|| CoreError::InvalidAttribute {
            reason: format!("{} is not positioned", node.kind().name()),
        })
    }

    // -----------------------------------------------------------------------
    // Filtering
    // -----------------------------------------------------------------------

    pub fn turn_filter_on(&self) {
        self.filter.set_on(true);
    }

    pub fn turn_filter_off(&self) {
        self.filter.set_on(false);
    }

    pub fn is_filter_on(&self) -> bool {
        self.filter.is_on()
    }

    /// Turns filtering off until the guard is dropped.
    pub fn filter_off(&self) -> FilterGuard<'_> {
        self.filter.turn_off_scoped()
    }

    pub fn filter_state(&self, id: NodeId) -> Result<FilterState, CoreError> {
        self.filter.state(id)
    }

    pub fn is_filtered(&self, id: NodeId) -> Result<bool, CoreError> {
        self.filter.is_filtered(id)
    }

    fn subtree(&self, id: NodeId) -> Result<Vec<NodeId>, CoreError> {
        let _guard = self.filter_off();
        let mut ids = CollectIds::default();
        Preorder::new(self).run_from(id, &mut ids)?;
        Ok(ids.0)
    }

    /// Filters `id` and its whole owned subtree.
    pub fn set_filtered(&mut self, id: NodeId) -> Result<(), CoreError> {
        for node in self.subtree(id)? {
            self.filter.set(node, FilterState::Filtered)?;
        }
        Ok(())
    }

    /// Un-filters `id`, its owned subtree and all of its ancestors.
    pub fn set_not_filtered(&mut self, id: NodeId) -> Result<(), CoreError> {
        let mut ids = self.subtree(id)?;
        ids.extend(self.ancestors(id));
        for node in ids {
            self.filter.set(node, FilterState::NotFiltered)?;
        }
        Ok(())
    }

    /// Un-filters `id` and the filtered ancestors directly above it.
    pub fn set_not_filtered_this_node(&mut self, id: NodeId) -> Result<(), CoreError> {
        self.get_node(id)?;
        self.filter.set(id, FilterState::NotFiltered)?;
        for ancestor in self.ancestors(id) {
            if self.filter.state(ancestor)? == FilterState::NotFiltered {
                break;
            }
            self.filter.set(ancestor, FilterState::NotFiltered)?;
        }
        Ok(())
    }

    /// Filters only `id`. A no-op for the root.
    pub fn set_filtered_this_node_only(&mut self, id: NodeId) -> Result<(), CoreError> {
        self.get_node(id)?;
        if id == self.root {
            return Ok(());
        }
        self.filter.set(id, FilterState::Filtered)
    }

    pub fn set_not_filtered_this_node_only(&mut self, id: NodeId) -> Result<(), CoreError> {
        self.get_node(id)?;
        self.filter.set(id, FilterState::NotFiltered)
    }

    /// Grows the filter to `len` slots. Never shrinks.
    pub fn resize_filter(&mut self, len: usize) {
        self.filter.resize_to(len);
    }

    /// Marks every node NotFiltered.
    pub fn initialize_filter(&mut self) {
        self.filter.initialize();
    }

    pub fn filtered_count(&self) -> usize {
        self.filter.filtered_count()
    }

    pub fn filter_len(&self) -> usize {
        self.filter.len()
    }

    // -----------------------------------------------------------------------
    // Reverse edges
    // -----------------------------------------------------------------------

    /// Builds and attaches a reverse edge index over the current graph.
    pub fn attach_reverse_edges(&mut self, selector: Option<EdgeSelector>) {
        let reverse = ReverseEdges::build(selector, self.nodes.len(), self.nodes());
        self.reverse = Some(reverse);
    }

    /// Rebuilds the reverse index from scratch with a new selector.
    pub fn set_reverse_edges_selector(&mut self, selector: Option<EdgeSelector>) {
        self.attach_reverse_edges(selector);
    }

    pub fn detach_reverse_edges(&mut self) {
        self.reverse = None;
    }

    pub fn reverse_edges(&self) -> Option<&ReverseEdges> {
        self.reverse.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    fn with_namespace() -> (Factory, NodeId) {
        let mut f = Factory::new();
        let ns = f.create_node(NodeKind::NamespaceDeclaration).unwrap();
        f.add_edge(f.root(), EdgeKind::CompilationUnitMembers, ns).unwrap();
        (f, ns)
    }

    #[test]
    fn fresh_factory_has_root_only() {
        let f = Factory::new();
        assert_eq!(f.root(), ROOT_ID);
        assert_eq!(f.size(), 2);
        assert_eq!(f.node_count(), 1);
        assert_eq!(f.node_kind(ROOT_ID).unwrap(), NodeKind::CompilationUnit);
        assert!(f.is_individual(ROOT_ID));
        assert!(f.filter_len() >= f.size());
    }

    #[test]
    fn sentinel_and_lookup_asymmetry() {
        let f = Factory::new();
        assert!(!f.exists(NodeId::NONE).unwrap());
        assert!(f.exists(ROOT_ID).unwrap());
        assert!(matches!(f.exists(NodeId(2)), Err(CoreError::InvalidNodeId { .. })));
        assert!(f.get_ref(NodeId(2)).is_none());
        assert!(f.get_ref(NodeId(500)).is_none());
        assert!(f.get_node(NodeId(2)).is_err());
    }

    #[test]
    fn create_rejects_abstract_kinds() {
        let mut f = Factory::new();
        assert!(matches!(
            f.create_node(NodeKind::Expression),
            Err(CoreError::InvalidNodeKind { .. })
        ));
        assert!(matches!(
            f.create_node(NodeKind::None),
            Err(CoreError::InvalidNodeKind { .. })
        ));
        assert_eq!(f.size(), 2);
    }

    #[test]
    fn create_with_id_fills_gaps() {
        let mut f = Factory::new();
        f.create_node_with_id(NodeKind::Block, NodeId(5)).unwrap();
        assert_eq!(f.size(), 6);
        assert!(!f.exists(NodeId(3)).unwrap());
        assert!(f.exists(NodeId(5)).unwrap());
        assert!(f.filter_len() >= 6);
        assert!(matches!(
            f.create_node_with_id(NodeKind::Block, NodeId(5)),
            Err(CoreError::InvalidNodeId { .. })
        ));
        assert!(f.create_node_with_id(NodeKind::Block, NodeId::NONE).is_err());
        assert_eq!(f.create_node(NodeKind::Block).unwrap(), NodeId(6));
    }

    #[test]
    fn owning_list_sets_parent() {
        let (f, ns) = with_namespace();
        assert_eq!(f.get_node(ns).unwrap().parent(), f.root());
        assert!(!f.is_individual(ns));
    }

    #[test]
    fn incompatible_target_kind_is_rejected() {
        let mut f = Factory::new();
        let using = f.create_node(NodeKind::UsingDirective).unwrap();
        let err = f
            .add_edge(f.root(), EdgeKind::CompilationUnitMembers, using)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidEdgeTarget { .. }));
        assert!(f.list_ids(f.root(), EdgeKind::CompilationUnitMembers).unwrap().is_empty());
        assert!(f.is_individual(using));
    }

    #[test]
    fn lists_reject_null_and_missing_targets() {
        let mut f = Factory::new();
        let root = f.root();
        assert!(matches!(
            f.add_edge(root, EdgeKind::CompilationUnitMembers, NodeId::NONE),
            Err(CoreError::InvalidEdgeTarget { .. })
        ));
        assert!(matches!(
            f.add_edge(root, EdgeKind::CompilationUnitMembers, NodeId(40)),
            Err(CoreError::InvalidEdgeTarget { .. })
        ));
    }

    #[test]
    fn edge_misuse_is_reported() {
        let mut f = Factory::new();
        let block = f.create_node(NodeKind::Block).unwrap();
        let root = f.root();
        assert!(matches!(
            f.add_edge(block, EdgeKind::CompilationUnitMembers, root),
            Err(CoreError::InvalidEdge { .. })
        ));
        let using = f.create_node(NodeKind::UsingDirective).unwrap();
        assert!(matches!(
            f.set_edge(root, EdgeKind::CompilationUnitUsings, using),
            Err(CoreError::InvalidEdge { .. })
        ));
        let list = f.create_node(NodeKind::AttributeList).unwrap();
        assert!(matches!(
            f.add_edge(root, EdgeKind::CompilationUnitAttributeLists, list),
            Err(CoreError::InvalidEdge { .. })
        ));
        assert!(matches!(
            f.add_edge_assoc(root, EdgeKind::CompilationUnitAttributeLists, list, AttrValue::Int(1)),
            Err(CoreError::InvalidEdge { .. })
        ));
        assert!(matches!(
            f.add_edge(NodeId(99), EdgeKind::CompilationUnitMembers, list),
            Err(CoreError::InvalidNodeId { .. })
        ));
    }

    #[test]
    fn single_owning_edge_replaces_and_clears() {
        let mut f = Factory::new();
        let using = f.create_node(NodeKind::UsingDirective).unwrap();
        let a = f.create_node(NodeKind::IdentifierName).unwrap();
        let b = f.create_node(NodeKind::QualifiedName).unwrap();

        f.set_edge(using, EdgeKind::UsingDirectiveName, a).unwrap();
        assert_eq!(f.get_node(a).unwrap().parent(), using);

        f.set_edge(using, EdgeKind::UsingDirectiveName, b).unwrap();
        assert_eq!(f.get_node(a).unwrap().parent(), NodeId::NONE);
        assert_eq!(f.get_node(b).unwrap().parent(), using);
        assert_eq!(f.edge_target(using, EdgeKind::UsingDirectiveName).unwrap(), b);

        f.set_edge(using, EdgeKind::UsingDirectiveName, NodeId::NONE).unwrap();
        assert!(f.is_individual(b));
        assert_eq!(f.edge_target(using, EdgeKind::UsingDirectiveName).unwrap(), NodeId::NONE);
    }

    #[test]
    fn reference_edges_leave_parent_alone() {
        let (mut f, ns) = with_namespace();
        let class = f.create_node(NodeKind::ClassDeclaration).unwrap();
        let ctor = f.create_node(NodeKind::ConstructorDeclaration).unwrap();
        let init = f.create_node(NodeKind::ConstructorInitializer).unwrap();
        f.add_edge(ns, EdgeKind::NamespaceDeclarationMembers, class).unwrap();
        f.add_edge(class, EdgeKind::TypeDeclarationMembers, ctor).unwrap();
        f.set_edge(ctor, EdgeKind::ConstructorDeclarationInitializer, init).unwrap();
        f.set_edge(init, EdgeKind::ConstructorInitializerConstructorCall, ctor).unwrap();

        assert_eq!(f.get_node(ctor).unwrap().parent(), class);
        assert_eq!(f.get_node(init).unwrap().parent(), ctor);
        let kids: Vec<_> = f.get_node(init).unwrap().children().collect();
        assert!(kids.is_empty());
    }

    #[test]
    fn adopting_out_of_assoc_list_keeps_values_parallel() {
        let mut f = Factory::new();
        let root = f.root();
        let mut lists = Vec::new();
        for target in ["assembly", "module", "field"] {
            let list = f.create_node(NodeKind::AttributeList).unwrap();
            let key = f.strings_mut().intern(target);
            f.add_edge_assoc(root, EdgeKind::CompilationUnitAttributeLists, list, AttrValue::Str(key))
                .unwrap();
            lists.push(list);
        }

        let other = f.create_node(NodeKind::CompilationUnit).unwrap();
        let module = f.strings_mut().intern("module");
        f.add_edge_assoc(other, EdgeKind::CompilationUnitAttributeLists, lists[1], AttrValue::Str(module))
            .unwrap();

        let node = f.get_node(root).unwrap();
        let ids = node.list(EdgeKind::CompilationUnitAttributeLists).unwrap();
        let values = node.assoc_values(EdgeKind::CompilationUnitAttributeLists).unwrap();
        assert_eq!(ids, &[lists[0], lists[2]]);
        let names: Vec<&str> = values
            .iter()
            .map(|v| f.resolve(v.as_str_key().unwrap()).unwrap())
            .collect();
        assert_eq!(names, vec!["assembly", "field"]);
        assert_eq!(f.get_node(lists[1]).unwrap().parent(), other);
    }

    #[test]
    fn adopting_moves_child_between_parents() {
        let (mut f, ns) = with_namespace();
        let class = f.create_node(NodeKind::ClassDeclaration).unwrap();
        f.add_edge(f.root(), EdgeKind::CompilationUnitMembers, class).unwrap();
        f.add_edge(ns, EdgeKind::NamespaceDeclarationMembers, class).unwrap();

        assert_eq!(f.get_node(class).unwrap().parent(), ns);
        assert_eq!(
            f.list_ids(f.root(), EdgeKind::CompilationUnitMembers).unwrap(),
            &[ns]
        );
    }

    #[test]
    fn ownership_cycles_are_rejected() {
        let (mut f, ns) = with_namespace();
        let inner = f.create_node(NodeKind::NamespaceDeclaration).unwrap();
        f.add_edge(ns, EdgeKind::NamespaceDeclarationMembers, inner).unwrap();

        for target in [ns, inner] {
            assert!(matches!(
                f.add_edge(inner, EdgeKind::NamespaceDeclarationMembers, target),
                Err(CoreError::InvalidEdgeTarget { .. })
            ));
        }
        let class = f.create_node(NodeKind::ClassDeclaration).unwrap();
        let root = f.root();
        let block = f.create_node(NodeKind::Block).unwrap();
        assert!(f.add_edge(block, EdgeKind::BlockStatements, block).is_err());
        assert!(f.add_edge(class, EdgeKind::TypeDeclarationMembers, class).is_err());
        let id_name = f.create_node(NodeKind::IdentifierName).unwrap();
        f.set_edge(id_name, EdgeKind::IdentifierNameDeclaration, root).unwrap();
    }

    #[test]
    fn remove_edge_detaches_and_keeps_duplicates() {
        let mut f = Factory::new();
        let call = f.create_node(NodeKind::InvocationExpression).unwrap();
        let m = f.create_node(NodeKind::MethodDeclaration).unwrap();
        f.add_edge(call, EdgeKind::InvocationExpressionCandidates, m).unwrap();
        f.add_edge(call, EdgeKind::InvocationExpressionCandidates, m).unwrap();
        assert!(f.remove_edge(call, EdgeKind::InvocationExpressionCandidates, m).unwrap());
        assert_eq!(
            f.list_ids(call, EdgeKind::InvocationExpressionCandidates).unwrap(),
            &[m]
        );

        let (mut f, ns) = with_namespace();
        let root = f.root();
        assert!(f.remove_edge(root, EdgeKind::CompilationUnitMembers, ns).unwrap());
        assert!(f.is_individual(ns));
        assert!(!f.remove_edge(root, EdgeKind::CompilationUnitMembers, ns).unwrap());
    }

    #[test]
    fn attributes_are_typed() {
        let mut f = Factory::new();
        let class = f.create_node(NodeKind::ClassDeclaration).unwrap();
        f.set_str(class, AttrKind::BaseTypeDeclarationIdentifier, "Program").unwrap();
        f.set_attr(class, AttrKind::ClassDeclarationIsPartial, AttrValue::Bool(true)).unwrap();
        f.set_attr(class, AttrKind::MemberDeclarationAccessibility, AttrValue::Int(1)).unwrap();

        assert_eq!(f.str_attr(class, AttrKind::BaseTypeDeclarationIdentifier).unwrap(), "Program");
        assert_eq!(
            f.attr(class, AttrKind::ClassDeclarationIsPartial).unwrap(),
            AttrValue::Bool(true)
        );
        assert!(matches!(
            f.set_attr(class, AttrKind::ClassDeclarationIsPartial, AttrValue::Int(1)),
            Err(CoreError::InvalidAttribute { .. })
        ));
        assert!(matches!(
            f.set_str(class, AttrKind::UsingDirectiveAlias, "x"),
            Err(CoreError::InvalidAttribute { .. })
        ));
        assert!(matches!(
            f.set_attr(class, AttrKind::BaseTypeDeclarationIdentifier, AttrValue::Str(StrKey(77))),
            Err(CoreError::InvalidAttribute { .. })
        ));
    }

    #[test]
    fn positions_only_on_positioned_nodes() {
        let mut f = Factory::new();
        let path = f.strings_mut().intern("Program.cs");
        let range = Range {
            path,
            position: crate::node::Span {
                line: 1,
                column: 1,
                end_line: 3,
                end_column: 2,
            },
            logical: Default::default(),
        };
        let root = f.root();
        f.set_position(root, range).unwrap();
        assert_eq!(f.position(root).unwrap(), &range);
        let bad = Range {
            path: StrKey(42),
            ..range
        };
        assert!(f.set_position(root, bad).is_err());
    }

    #[test]
    fn filter_subtree_and_ancestor_restoration() {
        let (mut f, ns) = with_namespace();
        let class = f.create_node(NodeKind::ClassDeclaration).unwrap();
        let method = f.create_node(NodeKind::MethodDeclaration).unwrap();
        f.add_edge(ns, EdgeKind::NamespaceDeclarationMembers, class).unwrap();
        f.add_edge(class, EdgeKind::TypeDeclarationMembers, method).unwrap();

        f.set_filtered(ns).unwrap();
        for id in [ns, class, method] {
            assert!(f.is_filtered(id).unwrap());
        }
        assert!(!f.is_filtered(f.root()).unwrap());
        assert!(f.is_filter_on());

        f.set_not_filtered_this_node(method).unwrap();
        assert!(!f.is_filtered(method).unwrap());
        assert!(!f.is_filtered(class).unwrap());
        assert!(!f.is_filtered(ns).unwrap());

        f.set_filtered(ns).unwrap();
        f.set_not_filtered(class).unwrap();
        assert!(!f.is_filtered(ns).unwrap());
        assert!(!f.is_filtered(method).unwrap());
    }

    #[test]
    fn filter_only_variants_and_root() {
        let (mut f, ns) = with_namespace();
        let root = f.root();
        f.set_filtered_this_node_only(root).unwrap();
        assert!(!f.is_filtered(root).unwrap());

        f.set_filtered_this_node_only(ns).unwrap();
        assert!(f.is_filtered(ns).unwrap());
        assert_eq!(f.filtered_count(), 1);
        f.turn_filter_off();
        assert!(!f.is_filtered(ns).unwrap());
        assert_eq!(f.filter_state(ns).unwrap(), FilterState::Filtered);
        f.turn_filter_on();
        f.set_not_filtered_this_node_only(ns).unwrap();
        assert_eq!(f.filtered_count(), 0);
        assert!(matches!(
            f.is_filtered(NodeId(1000)),
            Err(CoreError::InvalidNodeId { .. })
        ));
    }

    #[test]
    fn reverse_index_follows_mutations() {
        let mut f = Factory::new();
        f.attach_reverse_edges(None);
        let call = f.create_node(NodeKind::InvocationExpression).unwrap();
        let m1 = f.create_node(NodeKind::MethodDeclaration).unwrap();
        let m2 = f.create_node(NodeKind::MethodDeclaration).unwrap();

        f.set_edge(call, EdgeKind::InvocationExpressionMethodCall, m1).unwrap();
        f.add_edge(call, EdgeKind::InvocationExpressionCandidates, m1).unwrap();
        f.add_edge(call, EdgeKind::InvocationExpressionCandidates, m1).unwrap();
        let sources: Vec<_> = f.reverse_edges().unwrap().sources(m1).unwrap().collect();
        assert_eq!(
            sources,
            vec![
                (call, EdgeKind::InvocationExpressionMethodCall),
                (call, EdgeKind::InvocationExpressionCandidates),
            ]
        );

        f.set_edge(call, EdgeKind::InvocationExpressionMethodCall, m2).unwrap();
        f.remove_edge(call, EdgeKind::InvocationExpressionCandidates, m1).unwrap();
        let reverse = f.reverse_edges().unwrap();
        let still: Vec<_> = reverse.sources(m1).unwrap().collect();
        assert_eq!(still, vec![(call, EdgeKind::InvocationExpressionCandidates)]);
        let by_call: Vec<_> = reverse
            .sources_by_edge(m2, EdgeKind::InvocationExpressionMethodCall)
            .unwrap()
            .collect();
        assert_eq!(by_call, vec![call]);

        f.remove_edge(call, EdgeKind::InvocationExpressionCandidates, m1).unwrap();
        assert_eq!(f.reverse_edges().unwrap().sources(m1).unwrap().count(), 0);
    }

    #[test]
    fn reverse_selector_rebuilds_from_scratch() {
        let (mut f, ns) = with_namespace();
        let id_name = f.create_node(NodeKind::IdentifierName).unwrap();
        f.set_edge(id_name, EdgeKind::IdentifierNameDeclaration, ns).unwrap();

        f.attach_reverse_edges(None);
        assert_eq!(f.reverse_edges().unwrap().sources(ns).unwrap().count(), 2);

        fn references(edge: EdgeKind) -> bool {
            !edge.spec().is_owning()
        }
        f.set_reverse_edges_selector(Some(references));
        let sources: Vec<_> = f.reverse_edges().unwrap().sources(ns).unwrap().collect();
        assert_eq!(sources, vec![(id_name, EdgeKind::IdentifierNameDeclaration)]);

        f.detach_reverse_edges();
        assert!(f.reverse_edges().is_none());
    }

    #[test]
    fn reset_keeps_reverse_selector() {
        let (mut f, _) = with_namespace();
        f.attach_reverse_edges(None);
        f.reset();
        assert_eq!(f.node_count(), 1);
        assert!(f.reverse_edges().is_some());
        assert_eq!(f.reverse_edges().unwrap().pair_count(), 0);
    }
}
