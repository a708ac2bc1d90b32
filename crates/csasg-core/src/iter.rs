//! Lazy filtered iteration over multiple edges.
//!
//! [`ListIter`] is a cursor over a borrowed id slice. Visibility is checked
//! against the factory's filter on every step and never cached. Because the
//! iterator borrows the factory, the backing list cannot be mutated while
//! an iterator over it is alive.

use crate::error::CoreError;
use crate::factory::Factory;
use crate::id::NodeId;
use crate::node::{AttrValue, Node};
use crate::schema::{schema, NodeKind};

#[derive(Clone)]
pub struct ListIter<'a> {
    factory: &'a Factory,
    ids: &'a [NodeId],
    /// `ids.len()` means off the end.
    pos: usize,
    expected: NodeKind,
}

impl<'a> ListIter<'a> {
    /// Positioned at the first visible element.
    pub(crate) fn begin(factory: &'a Factory, ids: &'a [NodeId], expected: NodeKind) -> Self {
        let mut iter = ListIter {
            factory,
            ids,
            pos: 0,
            expected,
        };
        iter.skip_filtered();
        iter
    }

    /// Positioned off the end.
    pub(crate) fn end(factory: &'a Factory, ids: &'a [NodeId], expected: NodeKind) -> Self {
        ListIter {
            factory,
            ids,
            pos: ids.len(),
            expected,
        }
    }

    fn visible(&self, id: NodeId) -> bool {
        !self.factory.is_filtered(id).unwrap_or(false)
    }

    fn skip_filtered(&mut self) {
        while self.pos < self.ids.len() && !self.visible(self.ids[self.pos]) {
            self.pos += 1;
        }
    }

    /// Moves one slot forward, then past any filtered ids.
    pub fn advance(&mut self) {
        if self.pos < self.ids.len() {
            self.pos += 1;
        }
        self.skip_filtered();
    }

    /// Moves one slot back, then forward past any filtered ids.
    ///
    /// Retreating from the first slot runs off the end, and retreating onto
    /// a filtered id lands on the next visible id after it, not before.
    pub fn retreat(&mut self) {
        if self.pos == 0 {
            self.pos = self.ids.len();
            return;
        }
        self.pos -= 1;
        self.skip_filtered();
    }

    pub fn is_end(&self) -> bool {
        self.pos >= self.ids.len()
    }

    /// Raw slot index of the cursor.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn id(&self) -> Option<NodeId> {
        self.ids.get(self.pos).copied()
    }

    /// The current node, or `None` off the end.
    pub fn value(&self) -> Option<&'a Node> {
        self.factory.get_ref(self.id()?)
    }

    pub fn expected(&self) -> NodeKind {
        self.expected
    }

    /// Re-types the iterator to a more specific kind, keeping the cursor.
    pub fn narrow(self, kind: NodeKind) -> Result<ListIter<'a>, CoreError> {
        if !schema().is_descendant(kind, self.expected) {
            return Err(CoreError::InvalidNodeKind {
                tag: kind.tag(),
                reason: format!("{} is not a {}", kind.name(), self.expected.name()),
            });
        }
        Ok(ListIter {
            expected: kind,
            ..self
        })
    }

    /// The current node, checked against the expected kind.
    pub fn typed_value(&self) -> Result<Option<&'a Node>, CoreError> {
        match self.value() {
            Some(node) if !schema().is_descendant(node.kind(), self.expected) => {
                Err(CoreError::InvalidNodeKind {
                    tag: node.kind().tag(),
                    reason: format!("{} is not a {}", node.kind().name(), self.expected.name()),
                })
            }
            other => Ok(other),
        }
    }
}

impl<'a> Iterator for ListIter<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<&'a Node> {
        while !self.is_end() {
            let current = self.value();
            self.advance();
            if current.is_some() {
                return current;
            }
        }
        None
    }
}

impl std::fmt::Debug for ListIter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListIter")
            .field("pos", &self.pos)
            .field("len", &self.ids.len())
            .field("expected", &self.expected)
            .finish()
    }
}

/// [`ListIter`] over an associated edge, yielding each node with its value.
#[derive(Debug, Clone)]
pub struct AssocIter<'a> {
    inner: ListIter<'a>,
    values: &'a [AttrValue],
}

impl<'a> AssocIter<'a> {
    pub(crate) fn new(inner: ListIter<'a>, values: &'a [AttrValue]) -> Self {
        AssocIter { inner, values }
    }

    pub fn advance(&mut self) {
        self.inner.advance();
    }

    pub fn retreat(&mut self) {
        self.inner.retreat();
    }

    pub fn is_end(&self) -> bool {
        self.inner.is_end()
    }

    pub fn value(&self) -> Option<(&'a Node, AttrValue)> {
        let node = self.inner.value()?;
        let value = self.values.get(self.inner.position()).copied()?;
        Some((node, value))
    }
}

impl<'a> Iterator for AssocIter<'a> {
    type Item = (&'a Node, AttrValue);

    fn next(&mut self) -> Option<Self::Item> {
        while !self.is_end() {
            let current = self.value();
            self.advance();
            if current.is_some() {
                return current;
            }
        }
        None
    }
}
