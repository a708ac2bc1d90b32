//! Human-readable renderings of a factory, used by the CLI.

use serde_json::{json, Map, Value};

use crate::factory::Factory;
use crate::node::{AttrValue, EdgeSlot, Node};
use crate::schema::schema;
use crate::walk::{Preorder, Visitor};

/// Renders the visible graph as an indented preorder listing.
///
/// One line per node (`Kind #id` plus non-default attributes), children
/// indented by two spaces, reference edges as `edge -> #id` lines.
pub fn render_tree(factory: &Factory) -> String {
    let mut printer = TreePrinter {
        factory,
        out: String::new(),
        depth: 0,
    };
    Preorder::new(factory).skip_filtered(true).run_all(&mut printer);
    printer.out
}

struct TreePrinter<'a> {
    factory: &'a Factory,
    out: String,
    depth: usize,
}

impl TreePrinter<'_> {
    fn line(&mut self, depth: usize, text: &str) {
        for _ in 0..depth {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn format_value(&self, value: AttrValue) -> Option<String> {
        match value {
            AttrValue::Str(key) => {
                let s = self.factory.resolve(key)?;
                (!s.is_empty()).then(|| format!("{s:?}"))
            }
            AttrValue::Bool(b) => b.then(|| "true".to_string()),
            AttrValue::Int(i) => (i != 0).then(|| i.to_string()),
        }
    }
}

impl Visitor for TreePrinter<'_> {
    fn visit(&mut self, node: &Node) {
        let mut text = format!("{} #{}", node.kind().name(), node.id());
        for (attr, value) in schema().attrs_of(node.kind()).iter().zip(node.attrs()) {
            if let Some(shown) = self.format_value(*value) {
                text.push_str(&format!(" {}={}", attr.name(), shown));
            }
        }
        self.line(self.depth, &text);

        for (edge, target) in node.targets() {
            if !edge.spec().is_owning() {
                self.line(self.depth + 1, &format!("{} -> #{}", edge.name(), target));
            }
        }
        self.depth += 1;
    }

    fn visit_end(&mut self, _node: &Node) {
        self.depth = self.depth.saturating_sub(1);
    }
}

/// JSON view of every live node with strings resolved.
pub fn render_json(factory: &Factory) -> Value {
    let _unfiltered = factory.filter_off();
    let nodes: Vec<Value> = factory.nodes().map(|node| node_json(factory, node)).collect();
    Value::Array(nodes)
}

fn value_json(factory: &Factory, value: AttrValue) -> Value {
    match value {
        AttrValue::Str(key) => json!(factory.resolve(key)),
        AttrValue::Bool(b) => json!(b),
        AttrValue::Int(i) => json!(i),
    }
}

fn node_json(factory: &Factory, node: &Node) -> Value {
    let schema = schema();
    let mut attrs = Map::new();
    for (attr, value) in schema.attrs_of(node.kind()).iter().zip(node.attrs()) {
        attrs.insert(attr.name().to_string(), value_json(factory, *value));
    }
    let mut edges = Map::new();
    for (edge, slot) in schema.edges_of(node.kind()).iter().zip(node.edge_slots()) {
        let shown = match slot {
            EdgeSlot::Single(id) if id.is_none() => continue,
            EdgeSlot::Single(id) => json!(id.0),
            EdgeSlot::Multiple(ids) if ids.is_empty() => continue,
            EdgeSlot::Multiple(ids) => json!(ids.iter().map(|id| id.0).collect::<Vec<_>>()),
            EdgeSlot::Assoc { ids, .. } if ids.is_empty() => continue,
            EdgeSlot::Assoc { ids, values } => json!(ids
                .iter()
                .zip(values)
                .map(|(id, v)| json!([id.0, value_json(factory, *v)]))
                .collect::<Vec<_>>()),
        };
        edges.insert(edge.name().to_string(), shown);
    }
    let mut obj = json!({
        "id": node.id().0,
        "kind": node.kind().name(),
        "parent": node.parent().0,
        "filtered": factory.filter_state(node.id()).map(|s| s == crate::filter::FilterState::Filtered).unwrap_or(false),
        "attrs": attrs,
        "edges": edges,
    });
    if let (Some(range), Some(map)) = (node.range(), obj.as_object_mut()) {
        map.insert(
            "range".to_string(),
            json!({
                "path": factory.resolve(range.path),
                "position": range.position,
                "logical": range.logical,
            }),
        );
    }
    obj
}
