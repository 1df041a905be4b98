use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use shelfdb::btree::node::Node;
use shelfdb::btree::BTree;
use shelfdb::core::error::ErrorKind;
use shelfdb::core::types::{compare_keys, Key, Value};
use shelfdb::storage::file_provider::DiskFileProvider;
use shelfdb::storage::node_store::NodeStore;

fn tree_in(dir: &TempDir, page_size: usize, unique: bool) -> BTree {
    let store = NodeStore::new(Arc::new(DiskFileProvider), dir.path().to_path_buf(), 64);
    BTree::new(store, None, page_size, unique)
}

fn reopen(dir: &TempDir, root: Option<String>, page_size: usize, unique: bool) -> BTree {
    let store = NodeStore::new(Arc::new(DiskFileProvider), dir.path().to_path_buf(), 64);
    BTree::new(store, root, page_size, unique)
}

fn key(i: i64) -> Key {
    vec![Value::Int(i)]
}

fn load_nodes(dir: &Path) -> HashMap<String, Node> {
    let mut nodes = HashMap::new();
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            let data = std::fs::read(&path).unwrap();
            let node: Node = serde_json::from_slice(&data).unwrap();
            nodes.insert(node.id.clone(), node);
        }
    }
    nodes
}

/// Walks the persisted tree and asserts every structural invariant: sorted
/// keys per node, child counts, occupancy bounds, separator bounds, equal
/// leaf depth and a consistent doubly-linked leaf chain. Returns all keys
/// in leaf-chain order.
fn check_invariants(dir: &Path, root_id: &str, page_size: usize, unique: bool) -> Vec<Key> {
    let nodes = load_nodes(dir);
    let mut leaves_in_order: Vec<String> = Vec::new();
    let mut leaf_depths: Vec<usize> = Vec::new();

    fn visit(
        nodes: &HashMap<String, Node>,
        id: &str,
        lower: Option<&Key>,
        upper: Option<&Key>,
        depth: usize,
        root_id: &str,
        page_size: usize,
        unique: bool,
        leaves: &mut Vec<String>,
        depths: &mut Vec<usize>,
    ) {
        let node = nodes.get(id).unwrap_or_else(|| panic!("missing node file {}", id));
        assert_eq!(node.page_size, page_size);

        for pair in node.keys.windows(2) {
            let ord = compare_keys(&pair[0], &pair[1]);
            if unique {
                assert_eq!(ord, Ordering::Less, "keys must be strictly ascending in {}", id);
            } else {
                // Duplicate runs may straddle leaves, so a non-unique tree
                // can carry equal separators too.
                assert_ne!(ord, Ordering::Greater, "keys must be ascending in {}", id);
            }
        }
        for k in &node.keys {
            if let Some(lower) = lower {
                assert_ne!(
                    compare_keys(k, lower),
                    Ordering::Less,
                    "key below separator bound in {}",
                    id
                );
            }
            if let Some(upper) = upper {
                let ord = compare_keys(k, upper);
                if unique {
                    assert_eq!(ord, Ordering::Less, "key above separator bound in {}", id);
                } else {
                    assert_ne!(ord, Ordering::Greater, "key above separator bound in {}", id);
                }
            }
        }

        if id != root_id {
            let min = (page_size + 1) / 2;
            assert!(
                node.keys.len() >= min && node.keys.len() <= page_size,
                "occupancy violation in {}: {} keys with page size {}",
                id,
                node.keys.len(),
                page_size
            );
        }

        if node.is_leaf() {
            assert_eq!(node.keys.len(), node.values.len());
            assert!(node.children.is_empty());
            leaves.push(id.to_string());
            depths.push(depth);
        } else {
            assert_eq!(node.children.len(), node.keys.len() + 1);
            assert!(node.values.is_empty());
            for (i, child_id) in node.children.iter().enumerate() {
                let child = nodes
                    .get(child_id)
                    .unwrap_or_else(|| panic!("missing child {}", child_id));
                assert_eq!(child.parent.as_deref(), Some(id));
                let child_lower = if i == 0 { lower } else { Some(&node.keys[i - 1]) };
                let child_upper = if i == node.keys.len() {
                    upper
                } else {
                    Some(&node.keys[i])
                };
                visit(
                    nodes, child_id, child_lower, child_upper, depth + 1, root_id, page_size,
                    unique, leaves, depths,
                );
            }
        }
    }

    visit(
        &nodes,
        root_id,
        None,
        None,
        0,
        root_id,
        page_size,
        unique,
        &mut leaves_in_order,
        &mut leaf_depths,
    );

    assert!(
        leaf_depths.windows(2).all(|w| w[0] == w[1]),
        "all leaves must sit at the same depth"
    );

    // The leaf chain must mirror in-order traversal.
    for (i, leaf_id) in leaves_in_order.iter().enumerate() {
        let leaf = &nodes[leaf_id];
        let expected_prev = if i == 0 { None } else { Some(leaves_in_order[i - 1].as_str()) };
        let expected_next = if i + 1 == leaves_in_order.len() {
            None
        } else {
            Some(leaves_in_order[i + 1].as_str())
        };
        assert_eq!(leaf.prev.as_deref(), expected_prev, "prev link of {}", leaf_id);
        assert_eq!(leaf.next.as_deref(), expected_next, "next link of {}", leaf_id);
    }

    let mut all_keys = Vec::new();
    for leaf_id in &leaves_in_order {
        all_keys.extend(nodes[leaf_id].keys.iter().cloned());
    }
    assert!(
        all_keys
            .windows(2)
            .all(|w| compare_keys(&w[0], &w[1]) != Ordering::Greater),
        "leaf chain must be globally sorted"
    );
    all_keys
}

#[test]
fn insert_into_empty_tree_creates_a_single_leaf_root() {
    let tmp = TempDir::new().unwrap();
    let mut tree = tree_in(&tmp, 4, true);
    tree.insert(key(1), Value::Int(10)).unwrap();

    let nodes = load_nodes(tmp.path());
    assert_eq!(nodes.len(), 1);
    let root = &nodes[tree.root_id().unwrap()];
    assert!(root.is_leaf());
    assert_eq!(root.keys, vec![key(1)]);
}

#[test]
fn overflow_triggers_exactly_one_split() {
    let tmp = TempDir::new().unwrap();
    let mut tree = tree_in(&tmp, 3, true);
    for i in [2, 1, 3] {
        tree.insert(key(i), Value::Int(i * 10)).unwrap();
    }
    // Three keys fit in one leaf with page size 3.
    assert_eq!(load_nodes(tmp.path()).len(), 1);

    tree.insert(key(4), Value::Int(40)).unwrap();
    // One leaf split plus a new root.
    let nodes = load_nodes(tmp.path());
    assert_eq!(nodes.len(), 3);
    let keys = check_invariants(tmp.path(), tree.root_id().unwrap(), 3, true);
    assert_eq!(keys, vec![key(1), key(2), key(3), key(4)]);
}

#[test]
fn many_inserts_keep_every_invariant() {
    let tmp = TempDir::new().unwrap();
    let mut tree = tree_in(&tmp, 4, true);

    // Deterministic shuffle of 0..60.
    let mut order: Vec<i64> = (0..60).collect();
    for i in 0..order.len() {
        let j = (i * 37 + 11) % order.len();
        order.swap(i, j);
    }
    for i in &order {
        tree.insert(key(*i), Value::Int(i * 100)).unwrap();
    }

    let keys = check_invariants(tmp.path(), tree.root_id().unwrap(), 4, true);
    assert_eq!(keys.len(), 60);

    for i in 0..60 {
        let found = tree.search(Some(&key(i))).unwrap();
        assert_eq!(found, vec![Value::Int(i * 100)], "lookup of {}", i);
    }
    let all = tree.search(None).unwrap();
    assert_eq!(all.len(), 60);
    assert_eq!(all[0], Value::Int(0));
    assert_eq!(all[59], Value::Int(5900));
}

#[test]
fn unique_tree_rejects_duplicate_before_modifying_anything() {
    let tmp = TempDir::new().unwrap();
    let mut tree = tree_in(&tmp, 4, true);
    tree.insert(key(7), Value::Int(1)).unwrap();

    let err = tree.insert(key(7), Value::Int(2)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ConstraintViolation);
    assert_eq!(tree.search(Some(&key(7))).unwrap(), vec![Value::Int(1)]);
}

#[test]
fn duplicates_stay_fifo_even_across_leaf_splits() {
    let tmp = TempDir::new().unwrap();
    let mut tree = tree_in(&tmp, 3, false);

    // Enough equal keys to force the duplicate run across several leaves.
    for i in 0..10 {
        tree.insert(key(5), Value::Int(i)).unwrap();
    }
    tree.insert(key(1), Value::Int(100)).unwrap();
    tree.insert(key(9), Value::Int(900)).unwrap();

    check_invariants(tmp.path(), tree.root_id().unwrap(), 3, false);

    let found = tree.search(Some(&key(5))).unwrap();
    let expected: Vec<Value> = (0..10).map(Value::Int).collect();
    assert_eq!(found, expected, "duplicates must come back oldest first");

    tree.delete(&key(5)).unwrap();
    assert!(tree.search(Some(&key(5))).unwrap().is_empty());
    let rest = tree.search(None).unwrap();
    assert_eq!(rest, vec![Value::Int(100), Value::Int(900)]);
    check_invariants(tmp.path(), tree.root_id().unwrap(), 3, false);
}

#[test]
fn delete_rebalances_until_the_tree_is_empty() {
    let tmp = TempDir::new().unwrap();
    let mut tree = tree_in(&tmp, 4, true);
    for i in 0..30 {
        tree.insert(key(i), Value::Int(i)).unwrap();
    }

    // Remove in an order that exercises borrows and merges on both sides.
    let mut order: Vec<i64> = (0..30).collect();
    for i in 0..order.len() {
        let j = (i * 17 + 5) % order.len();
        order.swap(i, j);
    }
    for (n, i) in order.iter().enumerate() {
        tree.delete(&key(*i)).unwrap();
        assert!(tree.search(Some(&key(*i))).unwrap().is_empty());
        if let Some(root) = tree.root_id() {
            let keys = check_invariants(tmp.path(), root, 4, true);
            assert_eq!(keys.len(), 30 - n - 1);
        }
    }

    assert!(tree.root_id().is_none());
    assert_eq!(tree.search(None).unwrap(), Vec::<Value>::new());
    // Every node file is gone once the tree is empty.
    assert!(load_nodes(tmp.path()).is_empty());
}

#[test]
fn delete_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let mut tree = tree_in(&tmp, 4, true);
    tree.insert(key(1), Value::Int(1)).unwrap();

    tree.delete(&key(1)).unwrap();
    tree.delete(&key(1)).unwrap();
    tree.delete(&key(99)).unwrap();
    assert!(tree.search(Some(&key(1))).unwrap().is_empty());
}

#[test]
fn update_replaces_value_on_unique_tree_only() {
    let tmp = TempDir::new().unwrap();
    let mut tree = tree_in(&tmp, 4, true);
    tree.insert(key(1), Value::Int(1)).unwrap();

    tree.update(&key(1), Value::Int(2)).unwrap();
    assert_eq!(tree.search(Some(&key(1))).unwrap(), vec![Value::Int(2)]);

    let err = tree.update(&key(42), Value::Int(0)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let tmp2 = TempDir::new().unwrap();
    let mut non_unique = tree_in(&tmp2, 4, false);
    non_unique.insert(key(1), Value::Int(1)).unwrap();
    let err = non_unique.update(&key(1), Value::Int(2)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unsupported);
}

#[test]
fn update_on_empty_tree_reports_tree_empty() {
    let tmp = TempDir::new().unwrap();
    let mut tree = tree_in(&tmp, 4, true);
    let err = tree.update(&key(1), Value::Int(1)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[test]
fn odd_page_size_survives_heavy_deletion() {
    let tmp = TempDir::new().unwrap();
    let mut tree = tree_in(&tmp, 5, true);
    for i in 0..100 {
        tree.insert(key(i), Value::Int(i)).unwrap();
    }
    for i in (0..100).filter(|i| i % 3 != 0) {
        tree.delete(&key(i)).unwrap();
    }
    let keys = check_invariants(tmp.path(), tree.root_id().unwrap(), 5, true);
    assert_eq!(keys.len(), 34);
    for i in (0..100).filter(|i| i % 3 == 0) {
        assert_eq!(tree.search(Some(&key(i))).unwrap(), vec![Value::Int(i)]);
    }
}

#[test]
fn reopening_from_root_id_sees_persisted_data() {
    let tmp = TempDir::new().unwrap();
    let root = {
        let mut tree = tree_in(&tmp, 3, true);
        for i in 0..12 {
            tree.insert(key(i), Value::Int(i)).unwrap();
        }
        tree.root_id().cloned()
    };

    let mut tree = reopen(&tmp, root, 3, true);
    assert_eq!(tree.search(None).unwrap().len(), 12);
    assert_eq!(tree.search(Some(&key(7))).unwrap(), vec![Value::Int(7)]);
}

#[test]
fn full_scan_breaks_leaf_chain_cycles() {
    let tmp = TempDir::new().unwrap();

    // A hand-crafted single leaf whose next pointer loops back to itself.
    let mut leaf = Node::new_leaf("loop".to_string(), 4);
    leaf.keys.push(key(1));
    leaf.values.push(Value::Int(1));
    leaf.next = Some("loop".to_string());
    std::fs::write(
        tmp.path().join("loop.json"),
        serde_json::to_vec_pretty(&leaf).unwrap(),
    )
    .unwrap();

    let mut tree = reopen(&tmp, Some("loop".to_string()), 4, true);
    let all = tree.search(None).unwrap();
    assert_eq!(all, vec![Value::Int(1)], "cycle must be visited exactly once");
}

#[test]
fn full_scan_stops_at_a_missing_sibling() {
    let tmp = TempDir::new().unwrap();

    let mut leaf = Node::new_leaf("head".to_string(), 4);
    leaf.keys.push(key(1));
    leaf.values.push(Value::Int(1));
    leaf.next = Some("vanished".to_string());
    std::fs::write(
        tmp.path().join("head.json"),
        serde_json::to_vec_pretty(&leaf).unwrap(),
    )
    .unwrap();

    let mut tree = reopen(&tmp, Some("head".to_string()), 4, true);
    let all = tree.search(None).unwrap();
    assert_eq!(all, vec![Value::Int(1)]);
}

#[test]
fn range_scan_respects_bounds_offset_and_limit() {
    let tmp = TempDir::new().unwrap();
    let mut tree = tree_in(&tmp, 3, true);
    for i in 0..20 {
        tree.insert(key(i), Value::Int(i)).unwrap();
    }

    let (values, has_more) = tree
        .range_scan(Some(&key(5)), Some(&key(15)), 4, 2)
        .unwrap();
    assert_eq!(
        values,
        vec![Value::Int(7), Value::Int(8), Value::Int(9), Value::Int(10)]
    );
    assert!(has_more);

    let (values, has_more) = tree.range_scan(Some(&key(18)), None, 0, 0).unwrap();
    assert_eq!(values, vec![Value::Int(18), Value::Int(19)]);
    assert!(!has_more);
}
