use serde_json::{Map, Value};

use super::{EditSet, MoveMap, PropertyMap};

/// Resolve edits for an object-like node.
///
/// `add` and `remove` start as the by-value differences in each direction;
/// any key present in both is a change of value in place and becomes an
/// `update`. Keyed nodes never produce moves.
pub fn resolve_keyed(desired: &Map<String, Value>, current: &PropertyMap) -> EditSet {
    let mut add: PropertyMap = desired
        .iter()
        .filter(|(key, val)| current.get(key.as_str()) != Some(*val))
        .map(|(key, val)| (key.clone(), val.clone()))
        .collect();
    let mut remove: PropertyMap = current
        .iter()
        .filter(|(key, val)| desired.get(key.as_str()) != Some(*val))
        .map(|(key, val)| (key.clone(), val.clone()))
        .collect();

    let mut update = PropertyMap::new();
    remove.retain(|key, _| match add.shift_remove(key) {
        Some(now) => {
            update.insert(key.clone(), now);
            false
        }
        None => true,
    });

    EditSet {
        add,
        remove,
        update,
        moves: MoveMap::new(),
    }
}
