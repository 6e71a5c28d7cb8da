//! Edit-set resolvers: compute the minimal edits that turn a node's current
//! state into a desired state.
//!
//! | Resolver               | Node shape | Edits produced                  |
//! |------------------------|------------|---------------------------------|
//! | [`resolve_keyed`]      | keyed      | add / remove / update           |
//! | [`resolve_indexed`]    | indexed    | add / remove / update / move    |
//!
//! Both are pure functions over plain `serde_json` values; they never touch a
//! node. Within an [`EditSet`] the `add`, `remove` and `update` key sets are
//! pairwise disjoint. A move is keyed by its origin and may share that key
//! with an `add` filling the vacated slot.

mod hash;
mod indexed;
mod keyed;

use indexmap::IndexMap;
use serde_json::Value;

pub use indexed::resolve_indexed;
pub use keyed::resolve_keyed;
pub(crate) use hash::struct_hash;

/// Property key → value.
pub type PropertyMap = IndexMap<String, Value>;

/// Origin key → destination key.
pub type MoveMap = IndexMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditSet {
    pub add: PropertyMap,
    pub remove: PropertyMap,
    pub update: PropertyMap,
    pub moves: MoveMap,
}

impl EditSet {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty() && self.update.is_empty() && self.moves.is_empty()
    }

    /// Total number of edits across all four sets.
    pub fn len(&self) -> usize {
        self.add.len() + self.remove.len() + self.update.len() + self.moves.len()
    }
}
