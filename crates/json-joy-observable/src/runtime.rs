//! The shared context every node of one tree lives in.
//!
//! A [`Runtime`] owns the change queue and the factory registry. Nodes keep
//! only a weak reference back to it, so dropping the last `Runtime` handle
//! detaches every node built from it: reads keep working, while edits and
//! subscriptions fail with [`ObservableError::NotAnObservable`].
//!
//! [`ObservableError::NotAnObservable`]: crate::ObservableError::NotAnObservable

use std::rc::Rc;

use serde_json::Value;

use crate::config::ObservableConfig;
use crate::error::Result;
use crate::factory::{FactoryFn, FactoryRegistry, TypeTag};
use crate::node::{Node, Shape};
use crate::queue::{ChangeQueue, DispatchOptions, ManualScheduler, Scheduler};

pub(crate) struct RuntimeInner {
    pub(crate) config: ObservableConfig,
    pub(crate) queue: Rc<ChangeQueue>,
    pub(crate) factories: FactoryRegistry,
}

#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("pending", &self.inner.queue.len())
            .finish()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Default configuration, flushed manually through [`Runtime::flush`].
    pub fn new() -> Self {
        Self::with_config(ObservableConfig::default())
    }

    pub fn with_config(config: ObservableConfig) -> Self {
        Self::with_scheduler(config, ManualScheduler)
    }

    pub fn with_scheduler(config: ObservableConfig, scheduler: impl Scheduler + 'static) -> Self {
        let options = DispatchOptions {
            isolate_panics: config.isolate_listener_panics,
            max_depth: config.max_cascade_depth,
        };
        let factories = if config.install_default_factories {
            FactoryRegistry::with_defaults()
        } else {
            FactoryRegistry::default()
        };
        tracing::debug!(?config, "runtime created");
        Self {
            inner: Rc::new(RuntimeInner {
                queue: ChangeQueue::with_options(Box::new(scheduler), options),
                factories,
                config,
            }),
        }
    }

    pub fn config(&self) -> &ObservableConfig {
        &self.inner.config
    }

    pub fn factories(&self) -> &FactoryRegistry {
        &self.inner.factories
    }

    pub fn queue(&self) -> &Rc<ChangeQueue> {
        &self.inner.queue
    }

    /// Append child factories to the chain for `tag`.
    ///
    /// Must happen before any node of that tag creates a property.
    pub fn register_child_factory(
        &self,
        tag: TypeTag,
        fns: impl IntoIterator<Item = FactoryFn>,
    ) -> Result<&Self> {
        self.inner.factories.register(tag, fns)?;
        Ok(self)
    }

    // ── Roots ─────────────────────────────────────────────────────────────

    /// Build a root node and reconcile it to `value`.
    ///
    /// The initial population queues `Add` records like any other edit.
    pub fn node(&self, shape: Shape, tag: TypeTag, value: &Value) -> Result<Node> {
        let node = Node::new(&self.inner, shape, tag);
        node.reconcile(value)?;
        Ok(node)
    }

    pub fn keyed(&self, value: &Value) -> Result<Node> {
        self.node(Shape::Keyed, TypeTag::DEFAULT, value)
    }

    pub fn indexed(&self, value: &Value) -> Result<Node> {
        self.node(Shape::Indexed, TypeTag::DEFAULT, value)
    }

    // ── Flushing ──────────────────────────────────────────────────────────

    /// Deliver all pending records now. Returns how many were dispatched.
    pub fn flush(&self) -> usize {
        self.inner.queue.flush()
    }

    pub fn pending(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn is_flush_scheduled(&self) -> bool {
        self.inner.queue.is_scheduled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ObservableError;
    use serde_json::json;

    #[test]
    fn root_population_is_queued() {
        let rt = Runtime::new();
        let root = rt.keyed(&json!({"a": 1, "b": [1, 2]})).unwrap();
        // Two adds at the root, two more inside the array child.
        assert_eq!(rt.pending(), 4);
        assert!(rt.is_flush_scheduled());
        assert_eq!(rt.flush(), 4);
        assert_eq!(rt.pending(), 0);
        assert_eq!(root.to_json(), json!({"a": 1, "b": [1, 2]}));
    }

    #[test]
    fn without_default_factories_values_stay_scalar() {
        let rt = Runtime::with_config(ObservableConfig {
            install_default_factories: false,
            ..ObservableConfig::default()
        });
        let root = rt.keyed(&json!({"a": {"b": 1}})).unwrap();
        assert!(root.child("a").is_none());
        assert_eq!(rt.pending(), 1);
    }

    #[test]
    fn root_rejects_mismatched_value() {
        let rt = Runtime::new();
        assert!(matches!(
            rt.indexed(&json!({"a": 1})),
            Err(ObservableError::InvalidArgument(_))
        ));
    }
}
