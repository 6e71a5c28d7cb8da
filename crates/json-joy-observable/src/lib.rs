//! json-joy-observable - observable JSON node trees.
//!
//! A tree of [`Node`]s mirrors a plain JSON document. Handing a node a new
//! desired state with [`Node::reconcile`] computes a minimal edit set
//! (add / remove / update, plus moves for array-like nodes), applies it in
//! place, and queues one change record per touched property. Records are
//! delivered in batches when the [`Runtime`] flushes, to listeners on the
//! changed node and then to every ancestor, with the key path rewritten at
//! each level.
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use json_joy_observable::{ChangeKind, Runtime};
//! use serde_json::json;
//!
//! let rt = Runtime::new();
//! let root = rt.keyed(&json!({"user": {"name": "ada"}})).unwrap();
//! rt.flush();
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = seen.clone();
//! root.notifier()
//!     .unwrap()
//!     .add_listener(move |ev| sink.borrow_mut().push((ev.kind, ev.path.clone())));
//!
//! root.reconcile(&json!({"user": {"name": "grace"}})).unwrap();
//! assert_eq!(rt.flush(), 1);
//! assert_eq!(
//!     *seen.borrow(),
//!     [(ChangeKind::Update, vec!["user".to_string(), "name".to_string()])]
//! );
//! ```

pub mod array;
pub mod config;
pub mod error;
pub mod event;
pub mod factory;
pub mod node;
pub mod notifier;
pub mod queue;
pub mod resolver;
pub mod runtime;

pub use array::ArrayNode;
pub use config::ObservableConfig;
pub use error::{ObservableError, Result};
pub use event::{ChangeEvent, ChangeKind, Listener, ListenerId};
pub use factory::{
    factory_fn, indexed_child_factory, keyed_child_factory, ChildFactory, FactoryFn,
    FactoryRegistry, TypeTag,
};
pub use node::{Node, Properties, PropertySlot, Shape};
pub use notifier::Notifier;
pub use queue::{ChangeQueue, DeferredScheduler, ManualScheduler, Scheduler};
pub use resolver::{resolve_indexed, resolve_keyed, EditSet, MoveMap, PropertyMap};
pub use runtime::Runtime;
