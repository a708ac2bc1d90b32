//! Deterministic content hashing for ASGs using blake3.
//!
//! Digests are derived state, never written into `csi` files. String
//! attributes are hashed by their resolved text, not their key, so a graph
//! and its reloaded copy hash identically even when the string table was
//! renumbered.
//!
//! # Levels
//!
//! - **Node digest**: kind, parent, position, attributes and edge targets
//! - **Graph digest**: every node digest composed in `NodeId` order

use blake3::Hasher;

use csasg_core::{schema, AttrValue, EdgeSlot, Factory, Node, Span, StrKey};

fn update_str(hasher: &mut Hasher, factory: &Factory, key: StrKey) {
    let text = factory.resolve(key).unwrap_or("");
    hasher.update(&(text.len() as u64).to_le_bytes());
    hasher.update(text.as_bytes());
}

fn update_span(hasher: &mut Hasher, span: &Span) {
    for v in [span.line, span.column, span.end_line, span.end_column] {
        hasher.update(&v.to_le_bytes());
    }
}

fn update_value(hasher: &mut Hasher, factory: &Factory, value: &AttrValue) {
    match value {
        AttrValue::Str(key) => {
            hasher.update(&[0]);
            update_str(hasher, factory, *key);
        }
        AttrValue::Bool(b) => {
            hasher.update(&[1, u8::from(*b)]);
        }
        AttrValue::Int(i) => {
            hasher.update(&[2]);
            hasher.update(&i.to_le_bytes());
        }
    }
}

/// Computes the digest of one node's content.
///
/// The node's own id is not part of the digest; target ids are.
pub fn node_digest(factory: &Factory, node: &Node) -> blake3::Hash {
    let mut hasher = Hasher::new();
    hasher.update(&node.kind().tag().to_le_bytes());
    hasher.update(&node.parent().0.to_le_bytes());

    match node.range() {
        Some(range) => {
            hasher.update(&[1]);
            update_str(&mut hasher, factory, range.path);
            update_span(&mut hasher, &range.position);
            update_span(&mut hasher, &range.logical);
        }
        None => {
            hasher.update(&[0]);
        }
    }

    for value in node.attrs() {
        update_value(&mut hasher, factory, value);
    }

    let edges = schema().edges_of(node.kind());
    for (edge, slot) in edges.iter().zip(node.edge_slots()) {
        hasher.update(&edge.tag().to_le_bytes());
        let ids = slot.ids();
        hasher.update(&(ids.len() as u64).to_le_bytes());
        for id in ids {
            hasher.update(&id.0.to_le_bytes());
        }
        if let EdgeSlot::Assoc { values, .. } = slot {
            for value in values {
                update_value(&mut hasher, factory, value);
            }
        }
    }

    hasher.finalize()
}

/// Computes the digest of a whole graph.
///
/// Nodes are composed in ascending id order, each prefixed by its id.
/// Filter states are not included.
pub fn graph_digest(factory: &Factory) -> blake3::Hash {
    let mut hasher = Hasher::new();
    for node in factory.nodes() {
        hasher.update(&node.id().0.to_le_bytes());
        hasher.update(node_digest(factory, node).as_bytes());
    }
    hasher.finalize()
}
