//! List-style editing over an indexed node.

use serde_json::Value;

use crate::error::{ObservableError, Result};
use crate::event::{ChangeEvent, ListenerId};
use crate::node::{Node, Shape};
use crate::resolver::{MoveMap, PropertyMap};

/// An indexed [`Node`] viewed as a dense list.
///
/// Insertions and removals shift trailing items with `Move` records instead
/// of rewriting them, so structured items keep their identity.
#[derive(Debug, Clone)]
pub struct ArrayNode {
    node: Node,
}

impl Node {
    /// View this node as a list; `None` for keyed nodes.
    pub fn as_array(&self) -> Option<ArrayNode> {
        (self.shape() == Shape::Indexed).then(|| ArrayNode { node: self.clone() })
    }
}

impl ArrayNode {
    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn len(&self) -> usize {
        self.node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.node.get(&index.to_string())
    }

    pub fn to_json(&self) -> Value {
        self.node.to_json()
    }

    pub fn append(&self, items: impl IntoIterator<Item = Value>) -> Result<&Self> {
        let len = self.len();
        let add: PropertyMap = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| ((len + i).to_string(), item))
            .collect();
        if !add.is_empty() {
            self.node.create_properties(&add)?;
        }
        Ok(self)
    }

    /// Insert `items` before `index`; `index == len` appends.
    pub fn insert(&self, index: usize, items: impl IntoIterator<Item = Value>) -> Result<&Self> {
        let len = self.len();
        if index > len {
            return Err(ObservableError::IndexOutOfBounds { index, len });
        }
        let items: Vec<Value> = items.into_iter().collect();
        if items.is_empty() {
            return Ok(self);
        }
        let shift = items.len();
        let moves: MoveMap = (index..len)
            .rev()
            .map(|i| (i.to_string(), (i + shift).to_string()))
            .collect();
        let add: PropertyMap = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| ((index + i).to_string(), item))
            .collect();
        if !moves.is_empty() {
            self.node.relocate(&moves)?;
        }
        self.node.create_properties(&add)?;
        Ok(self)
    }

    /// Remove `count` items starting at `index`, closing the gap.
    pub fn remove(&self, index: usize, count: usize) -> Result<&Self> {
        let len = self.len();
        if index.saturating_add(count) > len {
            return Err(ObservableError::IndexOutOfBounds { index, len });
        }
        if count == 0 {
            return Ok(self);
        }
        let removed: PropertyMap = (index..index + count)
            .filter_map(|i| {
                let key = i.to_string();
                self.node.get(&key).map(|v| (key, v))
            })
            .collect();
        let moves: MoveMap = (index + count..len)
            .map(|i| (i.to_string(), (i - count).to_string()))
            .collect();
        self.node.remove_properties(&removed)?;
        if !moves.is_empty() {
            self.node.move_properties(&moves)?;
        }
        Ok(self)
    }

    /// Subscribe to every change on this list's own indices.
    pub fn observe<F>(&self, listener: F) -> Result<ListenerId>
    where
        F: Fn(&ChangeEvent) + 'static,
    {
        Ok(self.node.notifier()?.add_listener(listener))
    }

    pub fn release(&self, id: ListenerId) -> Result<bool> {
        Ok(self.node.notifier()?.remove_listener(id))
    }
}
