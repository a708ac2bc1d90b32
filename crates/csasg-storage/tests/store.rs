//! Store behaviour across backends, crafted files and reloads.

use proptest::prelude::*;

use csasg_core::io::BinaryWriter;
use csasg_core::{
    schema, AttrKind, AttrType, EdgeKind, Factory, Header, NodeId, NodeKind,
};
use csasg_storage::hash::graph_digest;
use csasg_storage::integrity::{check, Finding};
use csasg_storage::{FileStore, GraphStore, InMemoryStore, StorageError, StoreConfig};

fn program(names: &[String]) -> Factory {
    let mut f = Factory::new();
    let root = f.root();
    let ns = f.create_node(NodeKind::NamespaceDeclaration).unwrap();
    f.add_edge(root, EdgeKind::CompilationUnitMembers, ns).unwrap();
    for name in names {
        let class = f.create_node(NodeKind::ClassDeclaration).unwrap();
        f.set_str(class, AttrKind::BaseTypeDeclarationIdentifier, name)
            .unwrap();
        f.add_edge(ns, EdgeKind::NamespaceDeclarationMembers, class)
            .unwrap();
    }
    f
}

/// Header bytes of a freshly saved, empty graph.
fn header_bytes() -> Vec<u8> {
    let mut bytes = Vec::new();
    Factory::new().save(&mut bytes, &Header::new()).unwrap();
    // magic, u32 block count, then the metadata block: u16 tag, u64 len, payload
    let meta_len = u64::from_le_bytes(bytes[10..18].try_into().unwrap()) as usize;
    bytes.truncate(18 + meta_len);
    bytes
}

/// Writes one node record with default attributes and the given edges.
fn record(
    w: &mut BinaryWriter<&mut Vec<u8>>,
    id: u32,
    kind: NodeKind,
    parent: u32,
    edges: &[(EdgeKind, &[u32])],
) {
    let schema = schema();
    w.write_u32(id).unwrap();
    w.write_u16(kind.tag()).unwrap();
    w.write_u32(parent).unwrap();
    if schema.is_positioned(kind) {
        for _ in 0..9 {
            w.write_u32(0).unwrap();
        }
    }
    for attr in schema.attrs_of(kind) {
        match attr.spec().ty {
            AttrType::Str => w.write_u32(0).unwrap(),
            AttrType::Bool => w.write_bool(false).unwrap(),
            AttrType::Int => w.write_i64(0).unwrap(),
        }
    }
    for &edge in schema.edges_of(kind) {
        let ids = edges
            .iter()
            .find(|(e, _)| *e == edge)
            .map(|(_, ids)| *ids)
            .unwrap_or(&[]);
        let spec = edge.spec();
        if !spec.is_multiple() {
            w.write_u32(ids.first().copied().unwrap_or(0)).unwrap();
            continue;
        }
        w.write_u32(ids.len() as u32).unwrap();
        for &id in ids {
            w.write_u32(id).unwrap();
            match spec.assoc {
                Some(AttrType::Str) => w.write_u32(0).unwrap(),
                Some(AttrType::Bool) => w.write_bool(false).unwrap(),
                Some(AttrType::Int) => w.write_i64(0).unwrap(),
                None => {}
            }
        }
    }
}

/// Two namespaces owning each other, detached from the root.
fn ownership_ring() -> Vec<u8> {
    let mut bytes = header_bytes();
    {
        let mut w = BinaryWriter::new(&mut bytes);
        record(&mut w, 1, NodeKind::CompilationUnit, 0, &[]);
        record(
            &mut w,
            2,
            NodeKind::NamespaceDeclaration,
            3,
            &[(EdgeKind::NamespaceDeclarationMembers, &[3])],
        );
        record(
            &mut w,
            3,
            NodeKind::NamespaceDeclaration,
            2,
            &[(EdgeKind::NamespaceDeclarationMembers, &[2])],
        );
        w.write_u32(0).unwrap();
        w.write_u16(0).unwrap();
        // empty string table
        w.write_u32(0).unwrap();
        w.flush().unwrap();
    }
    bytes
}

#[test]
fn ownership_ring_loads_but_fails_integrity() {
    let mut f = Factory::new();
    f.load(&ownership_ring()[..]).unwrap().unwrap();
    assert_eq!(f.node_count(), 3);
    assert_eq!(
        check(&f),
        vec![Finding::OwnershipCycle {
            nodes: vec![NodeId(2), NodeId(3)]
        }]
    );
}

#[test]
fn stores_refuse_ownership_rings() {
    let mut memory = InMemoryStore::new();
    memory.insert_bytes("ring", ownership_ring()).unwrap();
    let mut f = program(&["Kept".to_string()]);
    assert!(matches!(
        memory.load_verified("ring", &mut f),
        Err(StorageError::Integrity { reason }) if reason.contains("cycle")
    ));
    assert_eq!(f.node_count(), 1);

    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path(), StoreConfig::default()).unwrap();
    std::fs::write(store.graph_path("ring"), ownership_ring()).unwrap();
    let mut g = Factory::new();
    assert!(matches!(
        store.load_graph("ring", &mut g),
        Err(StorageError::Integrity { .. })
    ));
    assert_eq!(g.node_count(), 1);

    let lax = FileStore::open(
        dir.path(),
        StoreConfig {
            verify_on_load: false,
            ..StoreConfig::default()
        },
    )
    .unwrap();
    lax.load_graph("ring", &mut g).unwrap();
    assert_eq!(g.node_count(), 3);
}

#[test]
fn memory_store_checks_on_load_like_file_store() {
    let mut strict = InMemoryStore::new();
    assert!(strict.config().verify_on_load);
    strict.insert_bytes("ring", ownership_ring()).unwrap();
    let mut f = program(&["Kept".to_string()]);
    assert!(matches!(
        strict.load_graph("ring", &mut f),
        Err(StorageError::Integrity { reason }) if reason.contains("cycle")
    ));
    assert_eq!(f.node_count(), 1);

    let mut lax = InMemoryStore::with_config(StoreConfig {
        verify_on_load: false,
        ..StoreConfig::default()
    });
    lax.insert_bytes("ring", ownership_ring()).unwrap();
    lax.load_graph("ring", &mut f).unwrap();
    assert_eq!(f.node_count(), 3);
}

#[test]
fn file_store_roundtrip_with_filter() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = FileStore::open(dir.path(), StoreConfig::default()).unwrap();
    let mut f = program(&["Alpha".to_string(), "Beta".to_string()]);
    f.set_filtered(NodeId(3)).unwrap();

    let summary = store
        .save_graph("app", &f, &Header::new().with_property("tool", "store-test"))
        .unwrap();
    store.save_filter("app", &f).unwrap();
    assert!(store.contains("app").unwrap());
    assert_eq!(store.list().unwrap(), vec!["app"]);

    let mut g = Factory::new();
    let header = store.load_graph("app", &mut g).unwrap();
    assert_eq!(header.property("tool"), Some("store-test"));
    assert!(store.load_filter("app", &mut g).unwrap());
    assert!(g.is_filtered(NodeId(3)).unwrap());
    assert!(!g.is_filtered(NodeId(4)).unwrap());
    assert_eq!(graph_digest(&g).to_hex().to_string(), summary.digest);

    store.delete("app").unwrap();
    assert!(!store.contains("app").unwrap());
    assert!(!store.filter_path("app").exists());
    assert!(matches!(
        store.load_graph("app", &mut g),
        Err(StorageError::NotFound { .. })
    ));
}

#[test]
fn both_backends_write_identical_bytes() {
    let f = program(&["Same".to_string()]);
    let mut memory = InMemoryStore::new();
    memory.save_graph("g", &f, &Header::new()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let mut files = FileStore::open(dir.path(), StoreConfig::default()).unwrap();
    files.save_graph("g", &f, &Header::new()).unwrap();

    let on_disk = std::fs::read(files.graph_path("g")).unwrap();
    assert_eq!(memory.bytes("g").unwrap(), on_disk.as_slice());
}

proptest! {
    #[test]
    fn digest_survives_store_roundtrip(names in prop::collection::vec("[A-Z][a-z]{0,8}", 0..12)) {
        let f = program(&names);
        let mut store = InMemoryStore::new();
        let summary = store.save_graph("p", &f, &Header::new()).unwrap();
        let mut g = Factory::new();
        store.load_verified("p", &mut g).unwrap();
        prop_assert_eq!(graph_digest(&g).to_hex().to_string(), summary.digest);
        prop_assert!(check(&g).is_empty());
    }
}
