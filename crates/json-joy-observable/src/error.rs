//! Error type shared by every observable-tree operation.

use thiserror::Error;

use crate::factory::TypeTag;

// ── Error ─────────────────────────────────────────────────────────────────

/// Errors raised synchronously by the primitive that detects them.
///
/// None of these are retried internally. A failing primitive leaves its own
/// node untouched, but [`Node::reconcile`](crate::Node::reconcile) does not
/// roll back primitives that already completed before the failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ObservableError {
    /// Malformed input shape, e.g. a scalar handed to `reconcile`.
    #[error("INVALID_ARGUMENT: {0}")]
    InvalidArgument(String),
    /// The receiver is no longer bound to a live runtime.
    #[error("NOT_AN_OBSERVABLE")]
    NotAnObservable,
    /// A create or move destination collides with an existing key.
    #[error("PROPERTY_CONFLICT: {0}")]
    PropertyConflict(String),
    /// A remove, update or move origin references a missing key.
    #[error("PROPERTY_NOT_FOUND: {0}")]
    PropertyNotFound(String),
    /// An index lies past the positions an indexed node can take.
    #[error("INDEX_OUT_OF_BOUNDS: {index} (len {len})")]
    IndexOutOfBounds { index: usize, len: usize },
    /// The factory chain was already consulted and can no longer be extended.
    #[error("FACTORY_SEALED: {0}")]
    FactorySealed(TypeTag),
}

impl ObservableError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ObservableError::InvalidArgument(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, ObservableError>;
