use std::sync::Arc;
use std::thread;

use super::*;
use crate::node::NodeKind;
use crate::typesys::{TypeNode, TypeVtable};

fn dummy_node(key: Key) -> Arc<NodeHeader> {
    let type_key = Key::string("T").unwrap();
    Arc::new(NodeHeader::new(
        key,
        type_key,
        0,
        NodeKind::Type(TypeNode::new(0, TypeVtable::trivial())),
    ))
}

#[test]
fn add_unique_rejects_duplicate() {
    let map = Map::new();
    let k = Key::uint(1);
    assert!(map.add_unique(k.clone(), dummy_node(k.clone())).is_ok());
    assert!(map.add_unique(k.clone(), dummy_node(k)).is_err());
    assert_eq!(map.count(), 1);
}

#[test]
fn del_then_lookup_not_found() {
    let map = Map::new();
    let k = Key::uint(7);
    map.add_unique(k.clone(), dummy_node(k.clone())).unwrap();
    assert!(map.lookup(&k).is_some());
    map.del(&k).unwrap();
    assert!(map.lookup(&k).is_none());
}

#[test]
fn double_delete_fails() {
    let map = Map::new();
    let k = Key::uint(3);
    map.add_unique(k.clone(), dummy_node(k.clone())).unwrap();
    assert!(map.del(&k).is_ok());
    assert!(matches!(map.del(&k), Err(RegistryError::NodeIsRemoved)));
}

#[test]
fn concurrent_add_unique_has_single_winner() {
    let map = Arc::new(Map::new());
    let key = Key::uint(42);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let map = map.clone();
            let key = key.clone();
            thread::spawn(move || map.add_unique(key.clone(), dummy_node(key)).is_ok())
        })
        .collect();

    let wins: usize = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|&ok| ok)
        .count();

    assert_eq!(wins, 1);
    assert_eq!(map.count(), 1);
}

#[test]
fn resize_preserves_live_entries() {
    let map = Map::with_bucket_count(2);
    for i in 0..32 {
        let k = Key::uint(i);
        map.add_unique(k.clone(), dummy_node(k)).unwrap();
    }
    assert_eq!(map.count(), 32);
    for i in 0..32 {
        assert!(map.lookup(&Key::uint(i)).is_some());
    }
}

#[test]
fn iter_snapshot_skips_deleted() {
    let map = Map::new();
    for i in 0..5 {
        let k = Key::uint(i);
        map.add_unique(k.clone(), dummy_node(k)).unwrap();
    }
    map.del(&Key::uint(2)).unwrap();
    let snapshot = map.iter_snapshot();
    assert_eq!(snapshot.len(), 4);
}
