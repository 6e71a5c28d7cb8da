//! Property tests for the resolvers and for reconciliation on live nodes.
//!
//! - Edit sets never list a key in two of add / remove / update.
//! - Reconciling any state into any other reproduces the desired JSON.
//! - A second reconcile with the same state queues nothing.

use std::collections::{BTreeMap, HashSet};

use json_joy_observable::{resolve_indexed, resolve_keyed, EditSet, PropertyMap, Runtime};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn arb_item() -> impl Strategy<Value = Value> {
    prop_oneof![
        (0i64..4).prop_map(Value::from),
        Just(json!("a")),
        Just(json!(null)),
        (0i64..3).prop_map(|n| json!({"id": n})),
        (0i64..3).prop_map(|n| json!([n, {"k": n}])),
    ]
}

fn arb_list() -> impl Strategy<Value = Vec<Value>> {
    proptest::collection::vec(arb_item(), 0..7)
}

fn arb_object() -> impl Strategy<Value = Map<String, Value>> {
    proptest::collection::btree_map(
        prop_oneof![Just("a"), Just("b"), Just("c"), Just("d")].prop_map(str::to_string),
        arb_item(),
        0..4,
    )
    .prop_map(|m| m.into_iter().collect())
}

fn assert_disjoint(edits: &EditSet) -> Result<(), TestCaseError> {
    let add: HashSet<&String> = edits.add.keys().collect();
    let remove: HashSet<&String> = edits.remove.keys().collect();
    let update: HashSet<&String> = edits.update.keys().collect();
    prop_assert!(add.is_disjoint(&remove));
    prop_assert!(add.is_disjoint(&update));
    prop_assert!(remove.is_disjoint(&update));
    Ok(())
}

proptest! {
    #[test]
    fn prop_keyed_edits_partition_changes(current in arb_object(), desired in arb_object()) {
        let current_map: PropertyMap = current.clone().into_iter().collect();
        let edits = resolve_keyed(&desired, &current_map);
        assert_disjoint(&edits)?;
        prop_assert!(edits.moves.is_empty());

        let changed: HashSet<&String> = current
            .keys()
            .chain(desired.keys())
            .filter(|k| current.get(*k) != desired.get(*k))
            .collect();
        let touched: HashSet<&String> = edits
            .add
            .keys()
            .chain(edits.remove.keys())
            .chain(edits.update.keys())
            .collect();
        prop_assert_eq!(touched, changed);
    }

    #[test]
    fn prop_indexed_edits_are_disjoint(current in arb_list(), desired in arb_list()) {
        let current_map: BTreeMap<usize, Value> = current.into_iter().enumerate().collect();
        let edits = resolve_indexed(&desired, &current_map);
        assert_disjoint(&edits)?;

        let destinations: HashSet<&String> = edits.moves.values().collect();
        prop_assert_eq!(destinations.len(), edits.moves.len());
        for dest in destinations {
            prop_assert!(!edits.add.contains_key(dest));
            prop_assert!(!edits.update.contains_key(dest));
        }
    }

    #[test]
    fn prop_indexed_reconcile_reaches_desired(current in arb_list(), desired in arb_list()) {
        let rt = Runtime::new();
        let node = rt.indexed(&Value::Array(current)).unwrap();
        rt.flush();

        let target = Value::Array(desired);
        node.reconcile(&target).unwrap();
        prop_assert_eq!(node.to_json(), target.clone());
        rt.flush();

        node.reconcile(&target).unwrap();
        prop_assert_eq!(rt.pending(), 0);
    }

    #[test]
    fn prop_keyed_reconcile_reaches_desired(current in arb_object(), desired in arb_object()) {
        let rt = Runtime::new();
        let node = rt.keyed(&Value::Object(current)).unwrap();
        rt.flush();

        let target = Value::Object(desired);
        node.reconcile(&target).unwrap();
        prop_assert_eq!(node.to_json(), target.clone());
        rt.flush();

        node.reconcile(&target).unwrap();
        prop_assert_eq!(rt.pending(), 0);
    }

    #[test]
    fn prop_moves_keep_structured_identity(current in arb_list(), desired in arb_list()) {
        let rt = Runtime::new();
        let node = rt.indexed(&Value::Array(current.clone())).unwrap();
        let current_map: BTreeMap<usize, Value> = current.into_iter().enumerate().collect();
        let edits = resolve_indexed(&desired, &current_map);
        let before: Vec<(String, String, _)> = edits
            .moves
            .iter()
            .filter_map(|(origin, dest)| node.child(origin).map(|c| (origin.clone(), dest.clone(), c)))
            .collect();

        node.reconcile(&Value::Array(desired)).unwrap();
        for (_origin, dest, child) in before {
            let now = node.child(&dest);
            prop_assert!(now.is_some_and(|n| n.ptr_eq(&child)));
        }
    }
}
