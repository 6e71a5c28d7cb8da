//! Batched change queue and its flush scheduling.
//!
//! Every [`Notifier`] appends to the queue of the runtime it was created
//! in. The first append after a flush asks the [`Scheduler`] for exactly one
//! deferred flush; later appends ride along in the same batch. A flush drains
//! the number of records present when it starts, so anything a listener
//! queues while being notified lands in the following batch.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use serde_json::Value;

use crate::event::ChangeKind;
use crate::notifier::{dispatch, Notifier};

// ── Records ───────────────────────────────────────────────────────────────

pub(crate) struct ChangeRecord {
    pub(crate) notifier: Rc<Notifier>,
    pub(crate) key: String,
    pub(crate) kind: ChangeKind,
    pub(crate) now: Option<Value>,
    pub(crate) was: Option<Value>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct DispatchOptions {
    pub(crate) isolate_panics: bool,
    pub(crate) max_depth: usize,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            isolate_panics: true,
            max_depth: 1024,
        }
    }
}

// ── Scheduling ────────────────────────────────────────────────────────────

/// Decides when a pending queue gets flushed.
///
/// `schedule` is called once per idle→pending transition and must not flush
/// synchronously; it should arrange for `queue.flush()` to run after the
/// current call stack unwinds.
pub trait Scheduler {
    fn schedule(&self, queue: Weak<ChangeQueue>);
}

/// Leaves flushing to the host, which calls [`ChangeQueue::flush`] itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualScheduler;

impl Scheduler for ManualScheduler {
    fn schedule(&self, _queue: Weak<ChangeQueue>) {}
}

/// Hands a flush task to a host "run later" hook, e.g. an event loop.
pub struct DeferredScheduler {
    defer: Box<dyn Fn(Box<dyn FnOnce()>)>,
}

impl DeferredScheduler {
    pub fn new(defer: impl Fn(Box<dyn FnOnce()>) + 'static) -> Self {
        Self {
            defer: Box::new(defer),
        }
    }
}

impl Scheduler for DeferredScheduler {
    fn schedule(&self, queue: Weak<ChangeQueue>) {
        (self.defer)(Box::new(move || {
            if let Some(queue) = queue.upgrade() {
                queue.flush();
            }
        }));
    }
}

// ── ChangeQueue ───────────────────────────────────────────────────────────

pub struct ChangeQueue {
    records: RefCell<VecDeque<ChangeRecord>>,
    scheduled: Cell<bool>,
    flushing: Cell<bool>,
    scheduler: Box<dyn Scheduler>,
    options: DispatchOptions,
    this: Weak<ChangeQueue>,
}

impl ChangeQueue {
    pub fn new(scheduler: impl Scheduler + 'static) -> Rc<Self> {
        Self::with_options(Box::new(scheduler), DispatchOptions::default())
    }

    pub(crate) fn with_options(scheduler: Box<dyn Scheduler>, options: DispatchOptions) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            records: RefCell::new(VecDeque::new()),
            scheduled: Cell::new(false),
            flushing: Cell::new(false),
            scheduler,
            options,
            this: this.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    /// Drop every record queued after the first `len`.
    pub(crate) fn truncate(&self, len: usize) {
        self.records.borrow_mut().truncate(len);
    }

    /// `true` while a flush has been requested from the scheduler but has not run.
    pub fn is_scheduled(&self) -> bool {
        self.scheduled.get()
    }

    pub(crate) fn push(&self, record: ChangeRecord) {
        tracing::trace!(
            key = %record.key,
            kind = record.kind.as_str(),
            "queued change"
        );
        self.records.borrow_mut().push_back(record);
        if !self.scheduled.replace(true) {
            self.scheduler.schedule(self.this.clone());
        }
    }

    /// Deliver every record queued before this call, in submission order.
    ///
    /// Returns the number of records dispatched. Calling `flush` from inside
    /// a listener is a no-op returning 0. If a listener panic unwinds out of
    /// the flush, the records not yet dispatched go back to the head of the
    /// queue for the next flush.
    pub fn flush(&self) -> usize {
        if self.flushing.get() {
            return 0;
        }
        self.scheduled.set(false);
        let batch: VecDeque<ChangeRecord> = {
            let mut records = self.records.borrow_mut();
            let len = records.len();
            records.drain(..len).collect()
        };
        if batch.is_empty() {
            return 0;
        }
        tracing::debug!(records = batch.len(), "flushing change queue");
        self.flushing.set(true);
        let _reset = FlushGuard(&self.flushing);
        let count = batch.len();
        let mut pending = Undelivered {
            queue: self,
            rest: batch,
        };
        while let Some(record) = pending.rest.pop_front() {
            dispatch(record, self.options);
        }
        count
    }
}

struct FlushGuard<'a>(&'a Cell<bool>);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Records of an interrupted flush, put back ahead of anything queued since.
struct Undelivered<'a> {
    queue: &'a ChangeQueue,
    rest: VecDeque<ChangeRecord>,
}

impl Drop for Undelivered<'_> {
    fn drop(&mut self) {
        if self.rest.is_empty() {
            return;
        }
        tracing::warn!(records = self.rest.len(), "flush interrupted, requeueing");
        let mut records = self.queue.records.borrow_mut();
        while let Some(record) = self.rest.pop_back() {
            records.push_front(record);
        }
    }
}
