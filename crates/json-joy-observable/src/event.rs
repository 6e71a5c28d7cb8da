use std::rc::{Rc, Weak};

use serde_json::Value;

use crate::node::{Node, NodeInner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Move,
    Add,
    Remove,
    Update,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Move => "move",
            ChangeKind::Add => "add",
            ChangeKind::Remove => "remove",
            ChangeKind::Update => "update",
        }
    }
}

/// Handle returned by listener registration, used to release the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

/// One delivered change, as seen by a listener at some level of the cascade.
///
/// `path` runs from the listening node down to the changed property, so a
/// listener on the originating node sees `[property]` while its grandparent
/// sees `[key_in_grandparent, key_in_parent, property]`.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub property: String,
    pub now: Option<Value>,
    pub was: Option<Value>,
    pub path: Vec<String>,
    pub(crate) origin: Weak<NodeInner>,
}

impl ChangeEvent {
    /// The node whose property changed, if it is still alive.
    pub fn origin(&self) -> Option<Node> {
        self.origin.upgrade().map(Node::from_inner)
    }
}

impl PartialEq for ChangeEvent {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.property == other.property
            && self.now == other.now
            && self.was == other.was
            && self.path == other.path
            && Weak::ptr_eq(&self.origin, &other.origin)
    }
}

pub type Listener = Rc<dyn Fn(&ChangeEvent)>;
