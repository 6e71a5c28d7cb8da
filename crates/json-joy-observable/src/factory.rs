//! Child construction: decides whether a value becomes a nested node.
//!
//! Each [`TypeTag`] owns an ordered [`ChildFactory`] chain. When a node
//! creates or updates a property it asks its chain; the first function that
//! returns `Some(node)` wins, and `None` from every function leaves the value
//! a plain scalar. A function handed the previous child may return that same
//! node to keep it, in which case the owner reconciles it in place.
//!
//! Chains are extended during setup and sealed the first time they are
//! consulted.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use crate::error::{ObservableError, Result};
use crate::node::{Node, Shape};

// ── TypeTag ───────────────────────────────────────────────────────────────

/// Selects the factory chain shared by a node and the children it builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeTag(&'static str);

impl TypeTag {
    pub const DEFAULT: TypeTag = TypeTag("observable");

    pub const fn new(name: &'static str) -> Self {
        TypeTag(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for TypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

// ── Factory functions ─────────────────────────────────────────────────────

/// `(owner, key, value, previous_child) -> Ok(Some(child))` to claim the value.
pub type FactoryFn = Rc<dyn Fn(&Node, &str, &Value, Option<&Node>) -> Result<Option<Node>>>;

/// Box a closure as a [`FactoryFn`].
pub fn factory_fn<F>(f: F) -> FactoryFn
where
    F: Fn(&Node, &str, &Value, Option<&Node>) -> Result<Option<Node>> + 'static,
{
    Rc::new(f)
}

/// Arrays become indexed children; an indexed previous child is kept.
pub fn indexed_child_factory() -> FactoryFn {
    shape_factory(Shape::Indexed, Value::is_array)
}

/// Objects become keyed children; a keyed previous child is kept.
pub fn keyed_child_factory() -> FactoryFn {
    shape_factory(Shape::Keyed, Value::is_object)
}

fn shape_factory(shape: Shape, accepts: fn(&Value) -> bool) -> FactoryFn {
    factory_fn(move |owner, _key, value, previous| {
        if !accepts(value) {
            return Ok(None);
        }
        if let Some(prev) = previous.filter(|p| p.shape() == shape) {
            return Ok(Some(prev.clone()));
        }
        owner.spawn_child(shape, value).map(Some)
    })
}

// ── ChildFactory ──────────────────────────────────────────────────────────

#[derive(Default)]
pub struct ChildFactory {
    fns: RefCell<Vec<FactoryFn>>,
    sealed: Cell<bool>,
}

impl std::fmt::Debug for ChildFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildFactory")
            .field("len", &self.fns.borrow().len())
            .field("sealed", &self.sealed.get())
            .finish()
    }
}

impl ChildFactory {
    pub fn len(&self) -> usize {
        self.fns.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.fns.borrow().is_empty()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.get()
    }

    /// Run the chain in registration order; the first claim wins.
    pub fn process(
        &self,
        owner: &Node,
        key: &str,
        value: &Value,
        previous: Option<&Node>,
    ) -> Result<Option<Node>> {
        self.sealed.set(true);
        let fns = self.fns.borrow().clone();
        for f in fns {
            if let Some(child) = f(owner, key, value, previous)? {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }
}

// ── Registry ──────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct FactoryRegistry {
    chains: RefCell<HashMap<TypeTag, Rc<ChildFactory>>>,
}

impl FactoryRegistry {
    /// A registry with the array and object factories on [`TypeTag::DEFAULT`].
    pub fn with_defaults() -> Self {
        let registry = Self::default();
        registry
            .chain(TypeTag::DEFAULT)
            .fns
            .borrow_mut()
            .extend([indexed_child_factory(), keyed_child_factory()]);
        registry
    }

    /// The chain for `tag`, created empty on first request.
    pub fn chain(&self, tag: TypeTag) -> Rc<ChildFactory> {
        self.chains.borrow_mut().entry(tag).or_default().clone()
    }

    /// Append `fns` to the chain for `tag`.
    pub fn register(&self, tag: TypeTag, fns: impl IntoIterator<Item = FactoryFn>) -> Result<()> {
        let chain = self.chain(tag);
        if chain.is_sealed() {
            return Err(ObservableError::FactorySealed(tag));
        }
        chain.fns.borrow_mut().extend(fns);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Runtime;
    use serde_json::json;

    const TAG: TypeTag = TypeTag::new("factory-test");

    #[test]
    fn first_claim_wins_in_registration_order() {
        let rt = Runtime::new();
        rt.register_child_factory(
            TAG,
            [
                factory_fn(|owner, key, _, _| {
                    if !key.starts_with('a') {
                        return Ok(None);
                    }
                    owner.spawn_child(Shape::Keyed, &json!({"by": "first"})).map(Some)
                }),
                factory_fn(|owner, _, _, _| {
                    owner.spawn_child(Shape::Keyed, &json!({"by": "second"})).map(Some)
                }),
            ],
        )
        .unwrap();
        let root = rt.node(Shape::Keyed, TAG, &json!({"a1": 1, "b1": 2})).unwrap();
        assert_eq!(root.child("a1").unwrap().to_json(), json!({"by": "first"}));
        assert_eq!(root.child("b1").unwrap().to_json(), json!({"by": "second"}));
        assert_eq!(root.to_json(), json!({"a1": {"by": "first"}, "b1": {"by": "second"}}));
    }

    #[test]
    fn chain_seals_on_first_use() {
        let rt = Runtime::new();
        rt.register_child_factory(TAG, [keyed_child_factory()])
            .unwrap()
            .register_child_factory(TAG, [indexed_child_factory()])
            .unwrap();
        assert_eq!(rt.factories().chain(TAG).len(), 2);

        rt.node(Shape::Keyed, TAG, &json!({"a": [1]})).unwrap();
        assert_eq!(
            rt.register_child_factory(TAG, [keyed_child_factory()]).unwrap_err(),
            ObservableError::FactorySealed(TAG)
        );
    }

    #[test]
    fn empty_chain_keeps_everything_scalar() {
        let rt = Runtime::new();
        let root = rt.node(Shape::Keyed, TAG, &json!({"a": {"b": 1}, "c": [1]})).unwrap();
        assert!(root.child("a").is_none());
        assert_eq!(root.get("a"), Some(json!({"b": 1})));
        assert_eq!(root.get("c"), Some(json!([1])));
    }

    #[test]
    fn default_factories_reuse_matching_shape_only() {
        let rt = Runtime::new();
        let root = rt.keyed(&json!({"a": {"x": 1}})).unwrap();
        let before = root.child("a").unwrap();

        root.reconcile(&json!({"a": {"x": 2}})).unwrap();
        assert!(root.child("a").unwrap().ptr_eq(&before));

        root.reconcile(&json!({"a": [2]})).unwrap();
        let after = root.child("a").unwrap();
        assert!(!after.ptr_eq(&before));
        assert_eq!(after.shape(), Shape::Indexed);
    }
}
