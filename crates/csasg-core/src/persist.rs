//! Binary save/load of a [`Factory`] in the `csi` format, plus the separate
//! filter file.
//!
//! After the header comes the node stream, one record per live node:
//!
//! ```text
//! u32 id  u16 kind  u32 parent  [Range]  attrs...  edges...
//! ```
//!
//! terminated by `(0, 0)`, then the string table. `Range` is present only for
//! positioned kinds. Attributes and edges follow the kind's slot order.
//! A failed load leaves a fresh arena behind.

use std::collections::BTreeSet;
use std::io::{Read, Write};

use crate::error::CoreError;
use crate::factory::Factory;
use crate::header::{Header, MAGIC};
use crate::id::{NodeId, StrKey};
use crate::io::{BinaryReader, BinaryWriter, MAX_PREALLOC};
use crate::node::{AttrType, AttrValue, EdgeSlot, Node, Range, Span};
use crate::schema::{schema, NodeKind};
use crate::strtable::StrTable;
use crate::walk::{Preorder, Visitor};

impl Factory {
    /// Writes the whole graph, filtered nodes included.
    ///
    /// `header` is written as given; use [`Header::new`] for a loadable file.
    pub fn save<W: Write>(&self, writer: W, header: &Header) -> Result<(), CoreError> {
        let _unfiltered = self.filter_off();
        let mut w = BinaryWriter::new(writer);
        w.write_bytes(&MAGIC)?;
        header.write(&mut w)?;

        let mut records = RecordWriter {
            w: &mut w,
            keys: BTreeSet::new(),
            error: None,
        };
        Preorder::new(self).run_all(&mut records);
        if let Some(err) = records.error {
            return Err(err);
        }
        let keys = records.keys;

        w.write_u32(0)?;
        w.write_u16(0)?;
        self.strings.save(&mut w, keys)?;
        w.flush()
    }

    /// Replaces the graph with the one stored in `reader`.
    ///
    /// Returns `Ok(None)`, leaving a fresh arena, when the input does not
    /// start with the `csi` magic. Any other failure also leaves a fresh
    /// arena and returns the error.
    pub fn load<R: Read>(&mut self, reader: R) -> Result<Option<Header>, CoreError> {
        match self.load_stream(reader) {
            Ok(header) => Ok(header),
            Err(err) => {
                self.reset();
                Err(err)
            }
        }
    }

    fn load_stream<R: Read>(&mut self, reader: R) -> Result<Option<Header>, CoreError> {
        self.reset();
        let mut r = BinaryReader::new(reader);
        if !r.read_magic(&MAGIC)? {
            return Ok(None);
        }
        let header = Header::read(&mut r)?;
        header.validate()?;

        let mut records = Vec::new();
        loop {
            let id = NodeId(r.read_u32()?);
            let tag = r.read_u16()?;
            if id.is_none() && tag == 0 {
                break;
            }
            let kind = NodeKind::from_tag(tag)
                .filter(|k| k.is_concrete())
                .ok_or_else(|| CoreError::malformed(format!("node {id} has invalid kind tag {tag}")))?;
            records.push(read_payload(&mut r, kind, id)?);
        }

        // Ids are dense, so a stream of n records names exactly 1..=n.
        let limit = records.len();
        let mut root_loaded = false;
        for node in records {
            let id = node.id();
            let kind = node.kind();
            if id.index() > limit {
                return Err(CoreError::malformed(format!(
                    "node id {id} exceeds the {limit} records in the stream"
                )));
            }
            if id == self.root() {
                if kind != NodeKind::CompilationUnit || root_loaded {
                    return Err(CoreError::malformed(format!("invalid root record of kind {}", kind.name())));
                }
                root_loaded = true;
            } else {
                self.create_node_with_id(kind, id)
                    .map_err(|_| CoreError::malformed(format!("duplicate or null node id {id}")))?;
            }
            if let Some(slot) = self.nodes.get_mut(id.index()) {
                *slot = Some(node);
            }
        }

        self.strings = StrTable::load(&mut r)?;
        self.validate_loaded()?;

        let len = self.size();
        self.filter.resize_to(len);
        if let Some(selector) = self.reverse.as_ref().map(|reverse| reverse.selector()) {
            self.attach_reverse_edges(selector);
        }
        Ok(Some(header))
    }

    /// Checks the cross-node invariants the stream cannot express locally.
    fn validate_loaded(&self) -> Result<(), CoreError> {
        let schema = schema();
        let key_ok = |key: StrKey| self.strings.resolve(key).is_some();

        for node in self.nodes() {
            let id = node.id();
            let parent = node.parent();
            if parent.is_some() && !self.get_ref(parent).is_some_and(|p| p.owns(id)) {
                return Err(CoreError::malformed(format!(
                    "node {id} names parent {parent} which does not own it"
                )));
            }
            for (edge, target) in node.targets() {
                let spec = edge.spec();
                let target_node = self.get_ref(target).ok_or_else(|| {
                    CoreError::malformed(format!("node {id} edge {} targets missing node {target}", spec.name))
                })?;
                if !schema.is_descendant(target_node.kind(), spec.target) {
                    return Err(CoreError::malformed(format!(
                        "node {id} edge {} targets a {}",
                        spec.name,
                        target_node.kind().name()
                    )));
                }
                if spec.is_owning() && target_node.parent() != id {
                    return Err(CoreError::malformed(format!(
                        "node {target} is owned by {id} but names parent {}",
                        target_node.parent()
                    )));
                }
            }
            let strings_ok = node.attrs().iter().all(|v| v.as_str_key().map_or(true, key_ok))
                && node.range().map_or(true, |r| key_ok(r.path))
                && node.edge_slots().iter().all(|slot| match slot {
                    EdgeSlot::Assoc { values, .. } => {
                        values.iter().all(|v| v.as_str_key().map_or(true, key_ok))
                    }
                    _ => true,
                });
            if !strings_ok {
                return Err(CoreError::malformed(format!("node {id} uses an unknown string key")));
            }
        }
        if !self.get_ref(self.root()).is_some_and(|r| r.parent().is_none()) {
            return Err(CoreError::malformed("root has a parent"));
        }
        Ok(())
    }

    /// Writes the filter states of every arena slot.
    pub fn save_filter<W: Write>(&self, writer: W) -> Result<(), CoreError> {
        let mut w = BinaryWriter::new(writer);
        self.filter.save(&mut w, self.size())?;
        w.flush()
    }

    /// Restores filter states saved for an arena of the same size.
    pub fn load_filter<R: Read>(&mut self, reader: R) -> Result<(), CoreError> {
        let mut r = BinaryReader::new(reader);
        let len = self.size();
        self.filter.load(&mut r, len)
    }
}

/// Visitor writing one node record per visit.
///
/// Stops writing after the first error, which `save` then reports.
struct RecordWriter<'w, W: Write> {
    w: &'w mut BinaryWriter<W>,
    keys: BTreeSet<StrKey>,
    error: Option<CoreError>,
}

impl<W: Write> Visitor for RecordWriter<'_, W> {
    fn visit(&mut self, node: &Node) {
        if self.error.is_some() {
            return;
        }
        if let Err(err) = self.write_node(node) {
            self.error = Some(err);
        }
    }
}

impl<W: Write> RecordWriter<'_, W> {
    fn write_node(&mut self, node: &Node) -> Result<(), CoreError> {
        self.w.write_u32(node.id().0)?;
        self.w.write_u16(node.kind().tag())?;
        self.w.write_u32(node.parent().0)?;
        if let Some(range) = node.range() {
            self.keys.insert(range.path);
            self.w.write_u32(range.path.0)?;
            for span in [&range.position, &range.logical] {
                self.w.write_u32(span.line)?;
                self.w.write_u32(span.column)?;
                self.w.write_u32(span.end_line)?;
                self.w.write_u32(span.end_column)?;
            }
        }
        for value in node.attrs() {
            self.write_value(*value)?;
        }
        for slot in node.edge_slots() {
            match slot {
                EdgeSlot::Single(id) => self.w.write_u32(id.0)?,
                EdgeSlot::Multiple(ids) => {
                    self.w.write_u32(ids.len() as u32)?;
                    for id in ids {
                        self.w.write_u32(id.0)?;
                    }
                }
                EdgeSlot::Assoc { ids, values } => {
                    self.w.write_u32(ids.len() as u32)?;
                    for (id, value) in ids.iter().zip(values) {
                        self.w.write_u32(id.0)?;
                        self.write_value(*value)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn write_value(&mut self, value: AttrValue) -> Result<(), CoreError> {
        match value {
            AttrValue::Str(key) => {
                self.keys.insert(key);
                self.w.write_u32(key.0)
            }
            AttrValue::Bool(b) => self.w.write_bool(b),
            AttrValue::Int(i) => self.w.write_i64(i),
        }
    }
}

fn read_value<R: Read>(r: &mut BinaryReader<R>, ty: AttrType) -> Result<AttrValue, CoreError> {
    Ok(match ty {
        AttrType::Str => AttrValue::Str(StrKey(r.read_u32()?)),
        AttrType::Bool => AttrValue::Bool(r.read_bool()?),
        AttrType::Int => AttrValue::Int(r.read_i64()?),
    })
}

fn read_span<R: Read>(r: &mut BinaryReader<R>) -> Result<Span, CoreError> {
    Ok(Span {
        line: r.read_u32()?,
        column: r.read_u32()?,
        end_line: r.read_u32()?,
        end_column: r.read_u32()?,
    })
}

fn read_ids<R: Read>(r: &mut BinaryReader<R>, count: u32) -> Result<Vec<NodeId>, CoreError> {
    let mut ids = Vec::with_capacity((count as usize).min(MAX_PREALLOC));
    for _ in 0..count {
        ids.push(NodeId(r.read_u32()?));
    }
    Ok(ids)
}

/// Reads the payload following `(id, kind)` into a complete node.
fn read_payload<R: Read>(r: &mut BinaryReader<R>, kind: NodeKind, id: NodeId) -> Result<Node, CoreError> {
    let schema = schema();
    let mut node = schema.instantiate(kind, id)?;
    node.parent = NodeId(r.read_u32()?);
    if schema.is_positioned(kind) {
        let path = StrKey(r.read_u32()?);
        let position = read_span(r)?;
        let logical = read_span(r)?;
        node.position = Some(Range {
            path,
            position,
            logical,
        });
    }
    for (value, attr) in node.attrs.iter_mut().zip(schema.attrs_of(kind)) {
        *value = read_value(r, attr.spec().ty)?;
    }
    for (slot, edge) in node.edges.iter_mut().zip(schema.edges_of(kind)) {
        let spec = edge.spec();
        *slot = match (spec.is_multiple(), spec.assoc) {
            (false, _) => EdgeSlot::Single(NodeId(r.read_u32()?)),
            (true, None) => {
                let count = r.read_u32()?;
                let ids = read_ids(r, count)?;
                if ids.iter().any(|id| id.is_none()) {
                    return Err(CoreError::malformed(format!("node {id} list {} holds id 0", spec.name)));
                }
                EdgeSlot::Multiple(ids)
            }
            (true, Some(ty)) => {
                let count = r.read_u32()?;
                let cap = (count as usize).min(MAX_PREALLOC);
                let mut ids = Vec::with_capacity(cap);
                let mut values = Vec::with_capacity(cap);
                for _ in 0..count {
                    let target = NodeId(r.read_u32()?);
                    if target.is_none() {
                        return Err(CoreError::malformed(format!("node {id} list {} holds id 0", spec.name)));
                    }
                    ids.push(target);
                    values.push(read_value(r, ty)?);
                }
                EdgeSlot::Assoc { ids, values }
            }
        };
    }
    Ok(node)
}
