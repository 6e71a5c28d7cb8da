//! Observable tree nodes.
//!
//! A [`Node`] is a cheap, cloneable handle to one position in the tree. It
//! stores each property as a [`PropertySlot`]: either a plain scalar value or
//! a nested child node built by the node's [`ChildFactory`] chain. All edits
//! go through four primitives (create, update, remove, move) that validate
//! every key first, mutate, and queue one change record per property.
//! [`Node::reconcile`] composes them from a resolved [`EditSet`].
//!
//! [`ChildFactory`]: crate::factory::ChildFactory

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{ObservableError, Result};
use crate::event::ChangeKind;
use crate::factory::{ChildFactory, TypeTag};
use crate::notifier::Notifier;
use crate::resolver::{resolve_indexed, resolve_keyed, EditSet, MoveMap, PropertyMap};
use crate::runtime::RuntimeInner;

// ── Shape & slots ─────────────────────────────────────────────────────────

/// How a node lays out its keys: object-like or array-like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Keyed,
    Indexed,
}

#[derive(Debug, Clone)]
pub enum PropertySlot {
    Scalar(Value),
    Child(Node),
}

impl PropertySlot {
    pub fn to_json(&self) -> Value {
        match self {
            PropertySlot::Scalar(v) => v.clone(),
            PropertySlot::Child(node) => node.to_json(),
        }
    }
}

// ── Node ──────────────────────────────────────────────────────────────────

pub(crate) struct NodeInner {
    shape: Shape,
    tag: TypeTag,
    runtime: Weak<RuntimeInner>,
    notifier: Rc<Notifier>,
    slots: RefCell<IndexMap<String, PropertySlot>>,
}

#[derive(Clone)]
pub struct Node {
    inner: Rc<NodeInner>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("shape", &self.inner.shape)
            .field("tag", &self.inner.tag)
            .field("value", &self.to_json())
            .finish()
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl Node {
    pub(crate) fn new(runtime: &Rc<RuntimeInner>, shape: Shape, tag: TypeTag) -> Self {
        let queue = Rc::downgrade(&runtime.queue);
        let inner = Rc::new_cyclic(|this| NodeInner {
            shape,
            tag,
            runtime: Rc::downgrade(runtime),
            notifier: Notifier::bound(this.clone(), queue),
            slots: RefCell::new(IndexMap::new()),
        });
        Self { inner }
    }

    pub(crate) fn from_inner(inner: Rc<NodeInner>) -> Self {
        Self { inner }
    }

    fn runtime(&self) -> Result<Rc<RuntimeInner>> {
        self.inner.runtime.upgrade().ok_or(ObservableError::NotAnObservable)
    }

    pub fn shape(&self) -> Shape {
        self.inner.shape
    }

    pub fn type_tag(&self) -> TypeTag {
        self.inner.tag
    }

    /// `true` when both handles point at the same node.
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// The node's notifier, for subscription management.
    pub fn notifier(&self) -> Result<Rc<Notifier>> {
        self.runtime()?;
        Ok(self.inner.notifier.clone())
    }

    /// Build an unmounted node in this node's runtime and chain, seeded with `value`.
    ///
    /// Meant for factory functions; the caller mounts the result.
    pub fn spawn_child(&self, shape: Shape, value: &Value) -> Result<Node> {
        let runtime = self.runtime()?;
        let child = Node::new(&runtime, shape, self.inner.tag);
        child.reconcile(value)?;
        Ok(child)
    }

    // ── Reads ─────────────────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.inner.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.slots.borrow().is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.slots.borrow().contains_key(key)
    }

    /// Current value of `key`; structured children are rendered to JSON.
    pub fn get(&self, key: &str) -> Option<Value> {
        let slot = self.inner.slots.borrow().get(key).cloned()?;
        Some(slot.to_json())
    }

    pub fn child(&self, key: &str) -> Option<Node> {
        match self.inner.slots.borrow().get(key) {
            Some(PropertySlot::Child(node)) => Some(node.clone()),
            _ => None,
        }
    }

    pub fn slot(&self, key: &str) -> Option<PropertySlot> {
        self.inner.slots.borrow().get(key).cloned()
    }

    /// Keys in iteration order: insertion order for keyed nodes, index
    /// order for indexed nodes.
    pub fn keys(&self) -> Vec<String> {
        self.ordered_slots().into_iter().map(|(k, _)| k).collect()
    }

    fn ordered_slots(&self) -> Vec<(String, PropertySlot)> {
        let slots = self.inner.slots.borrow();
        let mut entries: Vec<(String, PropertySlot)> =
            slots.iter().map(|(k, s)| (k.clone(), s.clone())).collect();
        if self.inner.shape == Shape::Indexed {
            entries.sort_by_key(|(k, _)| k.parse::<usize>().unwrap_or(usize::MAX));
        }
        entries
    }

    /// Lazy pass over the current `(key, value)` pairs.
    ///
    /// The key set is captured when `iter` is called; later edits do not
    /// show up in an iterator already handed out.
    pub fn iter(&self) -> Properties {
        Properties {
            entries: self.ordered_slots().into_iter(),
        }
    }

    /// Render the subtree as a plain JSON value.
    ///
    /// Indexed nodes with gaps (left by direct primitive use) render the
    /// missing positions as `null`.
    pub fn to_json(&self) -> Value {
        match self.inner.shape {
            Shape::Keyed => {
                let map: Map<String, Value> = self.iter().collect();
                Value::Object(map)
            }
            Shape::Indexed => {
                let indexed = self.indexed_values();
                let len = indexed.keys().next_back().map_or(0, |last| last + 1);
                let mut out = vec![Value::Null; len];
                for (idx, val) in indexed {
                    out[idx] = val;
                }
                Value::Array(out)
            }
        }
    }

    fn keyed_values(&self) -> PropertyMap {
        self.iter().collect()
    }

    fn indexed_values(&self) -> BTreeMap<usize, Value> {
        self.iter()
            .filter_map(|(k, v)| k.parse::<usize>().ok().map(|idx| (idx, v)))
            .collect()
    }

    // ── Reconciliation ────────────────────────────────────────────────────

    /// Compute the edits that would bring this node to `desired`, without
    /// applying them.
    pub fn resolve(&self, desired: &Value) -> Result<EditSet> {
        match (self.inner.shape, desired) {
            (Shape::Keyed, Value::Object(map)) => Ok(resolve_keyed(map, &self.keyed_values())),
            (Shape::Indexed, Value::Array(items)) => Ok(resolve_indexed(items, &self.indexed_values())),
            (shape, other) => Err(ObservableError::invalid(format!(
                "{shape:?} node cannot take {} as its state",
                json_kind(other)
            ))),
        }
    }

    /// Replace this node's whole state with `desired`.
    ///
    /// Edits are applied as remove, move, update, add. A failure part way
    /// leaves earlier edit groups applied.
    pub fn reconcile(&self, desired: &Value) -> Result<&Self> {
        self.runtime()?;
        let edits = self.resolve(desired)?;
        if edits.is_empty() {
            return Ok(self);
        }
        tracing::debug!(
            shape = ?self.inner.shape,
            add = edits.add.len(),
            remove = edits.remove.len(),
            update = edits.update.len(),
            moves = edits.moves.len(),
            "reconciling node"
        );
        if !edits.remove.is_empty() {
            self.remove_properties(&edits.remove)?;
        }
        if !edits.moves.is_empty() {
            self.relocate(&edits.moves)?;
        }
        if !edits.update.is_empty() {
            self.update_properties(&edits.update)?;
        }
        if !edits.add.is_empty() {
            self.create_properties(&edits.add)?;
        }
        Ok(self)
    }

    /// Assign a new value to an existing property. Equal values are a no-op.
    pub fn set(&self, key: &str, value: Value) -> Result<&Self> {
        let mut source = PropertyMap::new();
        source.insert(key.to_string(), value);
        self.update_properties(&source)
    }

    // ── Primitives ────────────────────────────────────────────────────────

    fn check_key(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(ObservableError::invalid("property key must not be empty"));
        }
        if self.inner.shape == Shape::Indexed {
            match key.parse::<usize>() {
                Ok(idx) if idx.to_string() == key => {}
                _ => {
                    return Err(ObservableError::invalid(format!(
                        "`{key}` is not an index"
                    )))
                }
            }
        }
        Ok(())
    }

    /// Indexed nodes only take positions below `bound`, which keeps the
    /// highest index under the node's size.
    fn check_index(&self, key: &str, bound: usize) -> Result<()> {
        if self.inner.shape != Shape::Indexed {
            return Ok(());
        }
        match key.parse::<usize>() {
            Ok(index) if index < bound => Ok(()),
            Ok(index) => Err(ObservableError::IndexOutOfBounds {
                index,
                len: self.len(),
            }),
            Err(_) => Err(ObservableError::invalid(format!("`{key}` is not an index"))),
        }
    }

    /// Everything `attach` rejects, checked without mounting.
    fn check_mount(&self, child: &Node, key: &str) -> Result<()> {
        if child.ptr_eq(self) {
            return Err(ObservableError::invalid("a node cannot be its own child"));
        }
        if let Some((parent, at)) = child.inner.notifier.cascade_parent() {
            if !Rc::ptr_eq(&parent, &self.inner.notifier) {
                return Err(ObservableError::invalid(format!(
                    "child for `{key}` is already mounted elsewhere"
                )));
            }
            if at != key {
                return Err(ObservableError::invalid(format!(
                    "child for `{key}` is already mounted under `{at}`"
                )));
            }
        }
        let mut cursor = self.inner.notifier.cascade_parent();
        while let Some((ancestor, _)) = cursor {
            if Rc::ptr_eq(&ancestor, &child.inner.notifier) {
                return Err(ObservableError::invalid(format!(
                    "mounting under `{key}` would create a cascade cycle"
                )));
            }
            cursor = ancestor.cascade_parent();
        }
        Ok(())
    }

    fn attach(&self, child: &Node, key: &str) -> Result<()> {
        self.check_mount(child, key)?;
        child.inner.notifier.set_cascade_parent(&self.inner.notifier, key)
    }

    /// Run `build` and, if it fails, drop the records it queued.
    ///
    /// Factories may spawn and seed children while a primitive prepares its
    /// slots; those children stay unmounted and their `Add` records must not
    /// reach listeners.
    fn staged<T>(&self, runtime: &RuntimeInner, build: impl FnOnce() -> Result<T>) -> Result<T> {
        let mark = runtime.queue.len();
        let result = build();
        if result.is_err() {
            runtime.queue.truncate(mark);
        }
        result
    }

    /// Ask the chain for `key` and check that a produced child can be
    /// mounted there and is not already claimed by another key of the batch.
    fn plan_slot(
        &self,
        chain: &ChildFactory,
        key: &str,
        value: &Value,
        previous: Option<&Node>,
        claimed: &mut Vec<Node>,
    ) -> Result<PropertySlot> {
        match chain.process(self, key, value, previous)? {
            Some(child) => {
                self.check_mount(&child, key)?;
                if claimed.iter().any(|c| c.ptr_eq(&child)) {
                    return Err(ObservableError::invalid(format!(
                        "child for `{key}` is claimed twice in one batch"
                    )));
                }
                claimed.push(child.clone());
                Ok(PropertySlot::Child(child))
            }
            None => Ok(PropertySlot::Scalar(value.clone())),
        }
    }

    /// Create every property in `source`.
    ///
    /// Keys are checked and every slot is built before the first insert, so
    /// a conflict, a bad index or a failing factory leaves the node and the
    /// queue as they were.
    pub fn create_properties(&self, source: &PropertyMap) -> Result<&Self> {
        let runtime = self.runtime()?;
        let chain = runtime.factories.chain(self.inner.tag);
        {
            let slots = self.inner.slots.borrow();
            let bound = slots.len() + source.len();
            for key in source.keys() {
                self.check_key(key)?;
                if slots.contains_key(key) {
                    return Err(ObservableError::PropertyConflict(key.clone()));
                }
                self.check_index(key, bound)?;
            }
        }
        let built = self.staged(&runtime, || {
            let mut claimed = Vec::new();
            source
                .iter()
                .map(|(key, value)| self.plan_slot(&chain, key, value, None, &mut claimed))
                .collect::<Result<Vec<_>>>()
        })?;
        for ((key, value), slot) in source.iter().zip(built) {
            if let PropertySlot::Child(child) = &slot {
                self.attach(child, key)?;
            }
            self.inner.slots.borrow_mut().insert(key.clone(), slot);
            self.inner
                .notifier
                .queue(key, ChangeKind::Add, Some(value.clone()), None)?;
        }
        Ok(self)
    }

    /// Give existing properties new values.
    ///
    /// The factory chain sees the current child. When it hands that same
    /// child back, the child reconciles itself and this node queues nothing;
    /// its own records cascade up instead. Replacement slots are all built
    /// before anything changes, and kept children reconcile before any
    /// replacement lands, so a failure leaves this node's slots untouched.
    pub fn update_properties(&self, source: &PropertyMap) -> Result<&Self> {
        let runtime = self.runtime()?;
        let chain = runtime.factories.chain(self.inner.tag);
        {
            let slots = self.inner.slots.borrow();
            if let Some(missing) = source.keys().find(|k| !slots.contains_key(k.as_str())) {
                return Err(ObservableError::PropertyNotFound(missing.clone()));
            }
        }
        let plan = self.staged(&runtime, || {
            let mut claimed = Vec::new();
            let mut plan = Vec::new();
            for (key, value) in source {
                let Some(slot) = self.slot(key) else {
                    return Err(ObservableError::PropertyNotFound(key.clone()));
                };
                let was = slot.to_json();
                if was == *value {
                    continue;
                }
                let previous = match slot {
                    PropertySlot::Child(node) => Some(node),
                    PropertySlot::Scalar(_) => None,
                };
                let next = self.plan_slot(&chain, key, value, previous.as_ref(), &mut claimed)?;
                let step = match (next, previous) {
                    (PropertySlot::Child(child), Some(prev)) if child.ptr_eq(&prev) => {
                        UpdateStep::Keep(child)
                    }
                    (next, previous) => UpdateStep::Replace {
                        next,
                        previous,
                        was,
                    },
                };
                plan.push((key, value, step));
            }
            Ok(plan)
        })?;

        for (_, value, step) in &plan {
            if let UpdateStep::Keep(child) = step {
                child.reconcile(value)?;
            }
        }
        for (key, value, step) in plan {
            let UpdateStep::Replace {
                next,
                previous,
                was,
            } = step
            else {
                continue;
            };
            if let PropertySlot::Child(child) = &next {
                self.attach(child, key)?;
            }
            if let Some(prev) = previous {
                prev.inner.notifier.reset_cascade_parent();
            }
            self.inner.slots.borrow_mut().insert(key.clone(), next);
            self.inner
                .notifier
                .queue(key, ChangeKind::Update, Some(value.clone()), Some(was))?;
        }
        Ok(self)
    }

    /// Remove the keys of `source` (its values are ignored). Fails with
    /// `PropertyNotFound` before touching anything if a key is missing.
    pub fn remove_properties(&self, source: &PropertyMap) -> Result<&Self> {
        self.runtime()?;
        {
            let slots = self.inner.slots.borrow();
            if let Some(missing) = source.keys().find(|k| !slots.contains_key(k.as_str())) {
                return Err(ObservableError::PropertyNotFound(missing.clone()));
            }
        }
        for key in source.keys() {
            let removed = self.inner.slots.borrow_mut().shift_remove(key);
            let was = match removed {
                Some(PropertySlot::Scalar(v)) => v,
                Some(PropertySlot::Child(child)) => {
                    child.inner.notifier.reset_cascade_parent();
                    child.to_json()
                }
                None => return Err(ObservableError::PropertyNotFound(key.clone())),
            };
            self.inner
                .notifier
                .queue(key, ChangeKind::Remove, None, Some(was))?;
        }
        Ok(self)
    }

    /// Relocate properties from origin to destination keys without
    /// rebuilding them; children keep their identity and listeners.
    ///
    /// All origins are lifted before any destination is filled, so a batch
    /// may rotate keys among themselves. A destination that exists and is not
    /// itself moved away is a `PropertyConflict`. On an indexed node every
    /// destination must lie below the current length.
    pub fn move_properties(&self, source: &MoveMap) -> Result<&Self> {
        let len = self.len();
        for dest in source.values() {
            self.check_key(dest)?;
            self.check_index(dest, len)?;
        }
        self.relocate(source)
    }

    /// [`Node::move_properties`] without the length bound, for callers that
    /// fill the positions they open in the same operation.
    pub(crate) fn relocate(&self, source: &MoveMap) -> Result<&Self> {
        self.runtime()?;
        {
            let slots = self.inner.slots.borrow();
            let mut destinations: HashSet<&str> = HashSet::new();
            for (origin, dest) in source {
                self.check_key(dest)?;
                if !slots.contains_key(origin) {
                    return Err(ObservableError::PropertyNotFound(origin.clone()));
                }
                let taken = slots.contains_key(dest) && !source.contains_key(dest);
                if taken || !destinations.insert(dest.as_str()) {
                    return Err(ObservableError::PropertyConflict(dest.clone()));
                }
            }
        }
        let lifted: Vec<(&String, &String, PropertySlot)> = {
            let mut slots = self.inner.slots.borrow_mut();
            source
                .iter()
                .filter_map(|(origin, dest)| slots.shift_remove(origin).map(|s| (origin, dest, s)))
                .collect()
        };
        for (origin, dest, slot) in lifted {
            if let PropertySlot::Child(child) = &slot {
                child.inner.notifier.rename_cascade_key(dest);
            }
            self.inner.slots.borrow_mut().insert(dest.clone(), slot);
            self.inner.notifier.queue(
                origin,
                ChangeKind::Move,
                Some(Value::String(dest.clone())),
                Some(Value::String(origin.clone())),
            )?;
        }
        Ok(self)
    }
}

enum UpdateStep {
    Keep(Node),
    Replace {
        next: PropertySlot,
        previous: Option<Node>,
        was: Value,
    },
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ── Iteration ─────────────────────────────────────────────────────────────

pub struct Properties {
    entries: std::vec::IntoIter<(String, PropertySlot)>,
}

impl Iterator for Properties {
    type Item = (String, Value);

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next().map(|(k, slot)| (k, slot.to_json()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl ExactSizeIterator for Properties {}

impl<'a> IntoIterator for &'a Node {
    type Item = (String, Value);
    type IntoIter = Properties;

    fn into_iter(self) -> Properties {
        self.iter()
    }
}
