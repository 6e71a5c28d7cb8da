use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use serde_json::Value;

use super::{struct_hash, EditSet, MoveMap, PropertyMap};

/// Resolve edits for an array-like node.
///
/// 1. Indices whose value is unchanged are kept untouched.
/// 2. Each remaining desired item claims the lowest unclaimed current index
///    holding an equal value elsewhere; that pair becomes a move.
/// 3. Leftover current indices still inside the desired length, and not the
///    target of a move, become in-place updates; the rest are removed.
/// 4. Desired indices still unfilled become adds.
///
/// Applied in the order remove, move, update, add, every move destination is
/// free by the time moves run and every add lands in an empty slot.
pub fn resolve_indexed(desired: &[Value], current: &BTreeMap<usize, Value>) -> EditSet {
    let kept: HashSet<usize> = desired
        .iter()
        .enumerate()
        .filter(|(i, val)| current.get(i) == Some(*val))
        .map(|(i, _)| i)
        .collect();

    let mut candidates: HashMap<String, VecDeque<usize>> = HashMap::new();
    for (idx, val) in current {
        if !kept.contains(idx) {
            candidates.entry(struct_hash(val)).or_default().push_back(*idx);
        }
    }

    let mut moves = MoveMap::new();
    let mut origins: HashSet<usize> = HashSet::new();
    let mut destinations: HashSet<usize> = HashSet::new();
    for (dest, val) in desired.iter().enumerate() {
        if kept.contains(&dest) {
            continue;
        }
        let Some(slots) = candidates.get_mut(&struct_hash(val)) else {
            continue;
        };
        let found = slots
            .iter()
            .position(|origin| *origin != dest && current.get(origin) == Some(val));
        if let Some(origin) = found.and_then(|pos| slots.remove(pos)) {
            moves.insert(origin.to_string(), dest.to_string());
            origins.insert(origin);
            destinations.insert(dest);
        }
    }

    let mut update = PropertyMap::new();
    let mut remove = PropertyMap::new();
    for (idx, val) in current {
        if kept.contains(idx) || origins.contains(idx) {
            continue;
        }
        match desired.get(*idx) {
            Some(now) if !destinations.contains(idx) => {
                update.insert(idx.to_string(), now.clone());
            }
            _ => {
                remove.insert(idx.to_string(), val.clone());
            }
        }
    }

    let mut add = PropertyMap::new();
    for (idx, val) in desired.iter().enumerate() {
        let key = idx.to_string();
        if kept.contains(&idx) || destinations.contains(&idx) || update.contains_key(&key) {
            continue;
        }
        add.insert(key, val.clone());
    }

    EditSet {
        add,
        remove,
        update,
        moves,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn current(items: Value) -> BTreeMap<usize, Value> {
        items
            .as_array()
            .map(|arr| arr.iter().cloned().enumerate().collect())
            .unwrap_or_default()
    }

    fn desired(items: &Value) -> &[Value] {
        items.as_array().unwrap()
    }

    fn pairs(moves: &MoveMap) -> Vec<(&str, &str)> {
        moves.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect()
    }

    #[test]
    fn unchanged_list_yields_no_edits() {
        let items = json!([1, {"a": 2}, "x"]);
        assert!(resolve_indexed(desired(&items), &current(items.clone())).is_empty());
    }

    #[test]
    fn insert_at_front_moves_existing_items() {
        let now = json!(["x", "a", "b", "c"]);
        let edits = resolve_indexed(desired(&now), &current(json!(["a", "b", "c"])));
        assert_eq!(pairs(&edits.moves), vec![("0", "1"), ("1", "2"), ("2", "3")]);
        assert_eq!(edits.add.len(), 1);
        assert_eq!(edits.add["0"], json!("x"));
        assert!(edits.remove.is_empty());
        assert!(edits.update.is_empty());
    }

    #[test]
    fn remove_from_front_moves_items_down() {
        let now = json!(["b", "c"]);
        let edits = resolve_indexed(desired(&now), &current(json!(["a", "b", "c"])));
        assert_eq!(pairs(&edits.moves), vec![("1", "0"), ("2", "1")]);
        assert!(edits.add.is_empty());
        assert!(edits.update.is_empty());
        assert_eq!(edits.remove.len(), 1);
        assert_eq!(edits.remove["0"], json!("a"));
    }

    #[test]
    fn same_index_change_is_update() {
        let now = json!([1, 5, 3]);
        let edits = resolve_indexed(desired(&now), &current(json!([1, 2, 3])));
        assert_eq!(edits.update["1"], json!(5));
        assert_eq!(edits.len(), 1);
    }

    #[test]
    fn swap_is_two_moves() {
        let now = json!([{"id": 2}, {"id": 1}]);
        let edits = resolve_indexed(desired(&now), &current(json!([{"id": 1}, {"id": 2}])));
        assert_eq!(pairs(&edits.moves), vec![("1", "0"), ("0", "1")]);
        assert_eq!(edits.len(), 2);
    }

    #[test]
    fn evicted_destination_is_removed() {
        // "b" moves onto index 0, whose old value has no place in the result.
        let now = json!(["b", "q"]);
        let edits = resolve_indexed(desired(&now), &current(json!(["a", "b"])));
        assert_eq!(pairs(&edits.moves), vec![("1", "0")]);
        assert_eq!(edits.remove["0"], json!("a"));
        assert_eq!(edits.add["1"], json!("q"));
        assert!(edits.update.is_empty());
    }

    #[test]
    fn duplicates_keep_matching_index_before_moving() {
        // Index 1 already holds "a", so only index 0 has to travel.
        let now = json!(["z", "a", "a"]);
        let edits = resolve_indexed(desired(&now), &current(json!(["a", "a"])));
        assert_eq!(pairs(&edits.moves), vec![("0", "2")]);
        assert_eq!(edits.add["0"], json!("z"));
        assert_eq!(edits.len(), 2);
    }

    #[test]
    fn shrink_removes_tail() {
        let now = json!([1]);
        let edits = resolve_indexed(desired(&now), &current(json!([1, 2, 3])));
        assert_eq!(edits.remove.keys().collect::<Vec<_>>(), vec!["1", "2"]);
        assert_eq!(edits.len(), 2);
    }
}
