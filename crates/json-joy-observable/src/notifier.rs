//! Per-node listener registry and the cascading dispatch walk.
//!
//! A [`Notifier`] belongs to exactly one node for that node's whole life.
//! Mounting the node under another node points the notifier's cascade parent
//! at the parent's notifier; dispatch then climbs that chain, renaming the key
//! at each step to the slot the child occupies in its parent. Listener
//! registrations live on the notifier, so they survive moves.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{ObservableError, Result};
use crate::event::{ChangeEvent, ChangeKind, Listener, ListenerId};
use crate::node::NodeInner;
use crate::queue::{ChangeQueue, ChangeRecord, DispatchOptions};

struct CascadeParent {
    notifier: Weak<Notifier>,
    key: String,
}

pub struct Notifier {
    origin: Weak<NodeInner>,
    queue: Weak<ChangeQueue>,
    named: RefCell<IndexMap<String, Vec<(ListenerId, Listener)>>>,
    any: RefCell<Vec<(ListenerId, Listener)>>,
    parent: RefCell<Option<CascadeParent>>,
    next_id: Cell<u64>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("named", &self.named.borrow().keys().collect::<Vec<_>>())
            .field("any", &self.any.borrow().len())
            .field(
                "parent_key",
                &self.parent.borrow().as_ref().map(|p| p.key.clone()),
            )
            .finish()
    }
}

impl Notifier {
    /// A notifier not attached to any node. Its events carry no origin.
    pub fn new(queue: &Rc<ChangeQueue>) -> Rc<Self> {
        Self::bound(Weak::new(), Rc::downgrade(queue))
    }

    pub(crate) fn bound(origin: Weak<NodeInner>, queue: Weak<ChangeQueue>) -> Rc<Self> {
        Rc::new(Self {
            origin,
            queue,
            named: RefCell::new(IndexMap::new()),
            any: RefCell::new(Vec::new()),
            parent: RefCell::new(None),
            next_id: Cell::new(1),
        })
    }

    fn next_listener_id(&self) -> ListenerId {
        let id = self.next_id.get();
        self.next_id.set(id.saturating_add(1));
        ListenerId(id)
    }

    // ── Registration ──────────────────────────────────────────────────────

    /// Register a wildcard listener, called for every event at this node.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ChangeEvent) + 'static,
    {
        let id = self.next_listener_id();
        self.any.borrow_mut().push((id, Rc::new(listener)));
        id
    }

    /// Register a listener for events whose key at this node is `key`.
    pub fn add_named_listener<F>(&self, key: &str, listener: F) -> Result<ListenerId>
    where
        F: Fn(&ChangeEvent) + 'static,
    {
        if key.is_empty() {
            return Err(ObservableError::invalid("listener key must not be empty"));
        }
        let id = self.next_listener_id();
        self.named
            .borrow_mut()
            .entry(key.to_string())
            .or_default()
            .push((id, Rc::new(listener)));
        Ok(id)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut any = self.any.borrow_mut();
        let before = any.len();
        any.retain(|(lid, _)| *lid != id);
        any.len() != before
    }

    pub fn remove_named_listener(&self, key: &str, id: ListenerId) -> bool {
        let mut named = self.named.borrow_mut();
        let Some(list) = named.get_mut(key) else {
            return false;
        };
        let before = list.len();
        list.retain(|(lid, _)| *lid != id);
        let removed = list.len() != before;
        if list.is_empty() {
            named.shift_remove(key);
        }
        removed
    }

    pub fn remove_all_listeners(&self) {
        self.any.borrow_mut().clear();
    }

    pub fn remove_all_named_listeners(&self, key: &str) {
        self.named.borrow_mut().shift_remove(key);
    }

    pub fn listener_count(&self) -> usize {
        self.any.borrow().len() + self.named.borrow().values().map(Vec::len).sum::<usize>()
    }

    // ── Cascade ───────────────────────────────────────────────────────────

    /// Point this notifier's cascade at `parent`, under `key`.
    ///
    /// Replaces any previous link. Fails if the link would close a cycle.
    pub fn set_cascade_parent(self: &Rc<Self>, parent: &Rc<Notifier>, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(ObservableError::invalid("cascade key must not be empty"));
        }
        let mut cursor = Some(parent.clone());
        while let Some(current) = cursor {
            if Rc::ptr_eq(&current, self) {
                return Err(ObservableError::invalid(format!(
                    "mounting under `{key}` would create a cascade cycle"
                )));
            }
            cursor = current.cascade_parent().map(|(p, _)| p);
        }
        *self.parent.borrow_mut() = Some(CascadeParent {
            notifier: Rc::downgrade(parent),
            key: key.to_string(),
        });
        Ok(())
    }

    /// Keep the current parent but record a new slot key, after a move.
    pub(crate) fn rename_cascade_key(&self, key: &str) {
        if let Some(link) = self.parent.borrow_mut().as_mut() {
            link.key = key.to_string();
        }
    }

    pub fn reset_cascade_parent(&self) {
        self.parent.borrow_mut().take();
    }

    pub fn cascade_parent(&self) -> Option<(Rc<Notifier>, String)> {
        let parent = self.parent.borrow();
        let link = parent.as_ref()?;
        Some((link.notifier.upgrade()?, link.key.clone()))
    }

    // ── Emission ──────────────────────────────────────────────────────────

    /// Append one change record to the runtime queue. Never blocks.
    pub fn queue(
        self: &Rc<Self>,
        key: &str,
        kind: ChangeKind,
        now: Option<Value>,
        was: Option<Value>,
    ) -> Result<()> {
        if key.is_empty() {
            return Err(ObservableError::invalid("change key must not be empty"));
        }
        let queue = self.queue.upgrade().ok_or(ObservableError::NotAnObservable)?;
        queue.push(ChangeRecord {
            notifier: self.clone(),
            key: key.to_string(),
            kind,
            now,
            was,
        });
        Ok(())
    }

    fn listeners_for(&self, key: &str) -> Vec<Listener> {
        let mut out: Vec<Listener> = self
            .named
            .borrow()
            .get(key)
            .map(|list| list.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default();
        out.extend(self.any.borrow().iter().map(|(_, l)| l.clone()));
        out
    }
}

// ── Dispatch ──────────────────────────────────────────────────────────────

pub(crate) fn dispatch(record: ChangeRecord, options: DispatchOptions) {
    let ChangeRecord {
        notifier,
        key,
        kind,
        now,
        was,
    } = record;
    let origin = notifier.origin.clone();
    let mut path: VecDeque<String> = VecDeque::new();
    let mut target = Some(notifier);
    let mut prop = key.clone();
    let mut depth = 0usize;

    while let Some(current) = target {
        if depth == options.max_depth {
            tracing::warn!(property = %key, depth, "cascade depth limit reached, dropping remaining levels");
            break;
        }
        depth += 1;
        path.push_front(prop.clone());
        let event = ChangeEvent {
            kind,
            property: key.clone(),
            now: now.clone(),
            was: was.clone(),
            path: path.iter().cloned().collect(),
            origin: origin.clone(),
        };
        for listener in current.listeners_for(&prop) {
            call_listener(&listener, &event, options.isolate_panics);
        }
        target = match current.cascade_parent() {
            Some((parent, parent_key)) => {
                prop = parent_key;
                Some(parent)
            }
            None => None,
        };
    }
}

fn call_listener(listener: &Listener, event: &ChangeEvent, isolate: bool) {
    if !isolate {
        listener(event);
        return;
    }
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| listener(event))) {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        tracing::error!(
            property = %event.property,
            kind = event.kind.as_str(),
            panic = %message,
            "change listener panicked"
        );
    }
}
