//! Reverse edge index: for each target, which nodes point at it.

use indexmap::IndexSet;

use crate::error::CoreError;
use crate::id::NodeId;
use crate::node::Node;
use crate::schema::EdgeKind;

/// Chooses which edge kinds the reverse index tracks.
pub type EdgeSelector = fn(EdgeKind) -> bool;

/// `target -> ordered set of (source, edge)`.
///
/// A pair is present while at least one occurrence of `target` remains in
/// the `edge` slot of `source`.
#[derive(Debug, Clone)]
pub struct ReverseEdges {
    selector: Option<EdgeSelector>,
    index: Vec<IndexSet<(NodeId, EdgeKind)>>,
}

impl ReverseEdges {
    /// Builds the index over `nodes`, visiting sources in the given order.
    pub(crate) fn build<'a>(
        selector: Option<EdgeSelector>,
        size: usize,
        nodes: impl Iterator<Item = &'a Node>,
    ) -> Self {
        let mut reverse = ReverseEdges {
            selector,
            index: vec![IndexSet::new(); size],
        };
        for node in nodes {
            for (edge, target) in node.targets() {
                if reverse.accepts(edge) {
                    reverse.ensure_len(target.index() + 1);
                    reverse.index[target.index()].insert((node.id(), edge));
                }
            }
        }
        reverse
    }

    pub fn selector(&self) -> Option<EdgeSelector> {
        self.selector
    }

    /// `true` if `edge` is tracked. Without a selector every edge is.
    pub fn accepts(&self, edge: EdgeKind) -> bool {
        self.selector.map_or(true, |select| select(edge))
    }

    pub(crate) fn ensure_len(&mut self, len: usize) {
        if self.index.len() < len {
            self.index.resize_with(len, IndexSet::new);
        }
    }

    /// Brings the `(source, edge)` entry of `target` in line with `present`.
    pub(crate) fn sync(&mut self, target: NodeId, source: NodeId, edge: EdgeKind, present: bool) {
        if target.is_none() || !self.accepts(edge) {
            return;
        }
        self.ensure_len(target.index() + 1);
        let set = &mut self.index[target.index()];
        if present {
            set.insert((source, edge));
        } else {
            set.shift_remove(&(source, edge));
        }
    }

    fn entry(&self, target: NodeId) -> Result<&IndexSet<(NodeId, EdgeKind)>, CoreError> {
        self.index
            .get(target.index())
            .ok_or(CoreError::InvalidNodeId { id: target })
    }

    /// Sources pointing at `target`, in insertion order.
    pub fn sources(
        &self,
        target: NodeId,
    ) -> Result<impl Iterator<Item = (NodeId, EdgeKind)> + '_, CoreError> {
        Ok(self.entry(target)?.iter().copied())
    }

    /// Sources pointing at `target` through `edge`.
    pub fn sources_by_edge(
        &self,
        target: NodeId,
        edge: EdgeKind,
    ) -> Result<impl Iterator<Item = NodeId> + '_, CoreError> {
        Ok(self
            .entry(target)?
            .iter()
            .filter(move |(_, e)| *e == edge)
            .map(|(source, _)| *source))
    }

    /// Number of tracked `(target, source, edge)` triples.
    pub fn pair_count(&self) -> usize {
        self.index.iter().map(IndexSet::len).sum()
    }
}
