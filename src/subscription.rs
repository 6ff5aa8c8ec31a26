// Live query handles
//
// Each subscription owns a single slot that the store worker overwrites with
// the newest result. A reader that falls behind skips straight to the latest
// snapshot. The worker fills the slot on attach, again after every commit
// that touches the query, and at most once with a terminal error.

use crate::error::{StoreError, StoreResult};
use crate::record::{TaskId, TaskRecord};
use crate::worker::Command;
use std::sync::mpsc::{RecvError, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub type SubscriptionId = u64;

/// Query a subscription is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    All,
    ById(TaskId),
}

impl Query {
    /// Whether a committed write to `id` can change this query's result
    pub fn is_affected_by(&self, id: TaskId) -> bool {
        match self {
            Query::All => true,
            Query::ById(bound) => *bound == id,
        }
    }
}

struct SlotState<T> {
    pending: Option<StoreResult<T>>,
    /// Writer dropped; nothing more will arrive
    closed: bool,
    /// Reader dropped or detached
    detached: bool,
}

struct Shared<T> {
    state: Mutex<SlotState<T>>,
    ready: Condvar,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Single-value channel holding only the newest result
pub(crate) fn latest<T>() -> (Emitter<T>, Latest<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(SlotState {
            pending: None,
            closed: false,
            detached: false,
        }),
        ready: Condvar::new(),
    });
    (Emitter(shared.clone()), Latest(shared))
}

/// Writing end, held by the worker
pub(crate) struct Emitter<T>(Arc<Shared<T>>);

impl<T> Emitter<T> {
    /// Replace the pending value. A pending error is terminal and stays.
    /// Returns false once the reader is gone.
    pub(crate) fn emit(&self, item: StoreResult<T>) -> bool {
        let mut state = self.0.lock();
        if state.detached {
            return false;
        }
        if !matches!(state.pending, Some(Err(_))) {
            state.pending = Some(item);
        }
        self.0.ready.notify_all();
        true
    }
}

impl<T> Drop for Emitter<T> {
    fn drop(&mut self) {
        self.0.lock().closed = true;
        self.0.ready.notify_all();
    }
}

/// Reading end, held by [`QuerySubscription`]
pub(crate) struct Latest<T>(Arc<Shared<T>>);

impl<T> Latest<T> {
    fn waiting(state: &mut SlotState<T>) -> bool {
        state.pending.is_none() && !state.closed
    }

    pub(crate) fn recv(&self) -> Result<StoreResult<T>, RecvError> {
        let guard = self.0.lock();
        let mut state = self
            .0
            .ready
            .wait_while(guard, Self::waiting)
            .unwrap_or_else(PoisonError::into_inner);
        state.pending.take().ok_or(RecvError)
    }

    pub(crate) fn recv_timeout(&self, timeout: Duration) -> Result<StoreResult<T>, RecvTimeoutError> {
        let guard = self.0.lock();
        let (mut state, _) = self
            .0
            .ready
            .wait_timeout_while(guard, timeout, Self::waiting)
            .unwrap_or_else(PoisonError::into_inner);
        match state.pending.take() {
            Some(item) => Ok(item),
            None if state.closed => Err(RecvTimeoutError::Disconnected),
            None => Err(RecvTimeoutError::Timeout),
        }
    }

    pub(crate) fn try_recv(&self) -> Result<StoreResult<T>, TryRecvError> {
        let mut state = self.0.lock();
        match state.pending.take() {
            Some(item) => Ok(item),
            None if state.closed => Err(TryRecvError::Disconnected),
            None => Err(TryRecvError::Empty),
        }
    }
}

impl<T> Drop for Latest<T> {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        state.detached = true;
        state.pending = None;
    }
}

/// Worker-side end of a subscription
pub(crate) enum Subscriber {
    All(Emitter<Vec<TaskRecord>>),
    ById(TaskId, Emitter<Option<TaskRecord>>),
}

impl Subscriber {
    pub(crate) fn query(&self) -> Query {
        match self {
            Subscriber::All(_) => Query::All,
            Subscriber::ById(id, _) => Query::ById(*id),
        }
    }

    /// Deliver a terminal error; the subscriber is dropped afterwards
    pub(crate) fn terminate(self, err: StoreError) {
        // A receiver that is already gone needs no notice
        match self {
            Subscriber::All(tx) => {
                tx.emit(Err(err));
            }
            Subscriber::ById(_, tx) => {
                tx.emit(Err(err));
            }
        }
    }
}

/// Consumer-side handle of a live query
///
/// Dropping the handle detaches it.
pub struct QuerySubscription<T> {
    id: SubscriptionId,
    query: Query,
    rx: Option<Latest<T>>,
    commands: Sender<Command>,
}

impl<T> QuerySubscription<T> {
    pub(crate) fn new(id: SubscriptionId, query: Query, rx: Latest<T>, commands: Sender<Command>) -> Self {
        Self {
            id,
            query,
            rx: Some(rx),
            commands,
        }
    }

    pub fn query(&self) -> Query {
        self.query
    }

    /// False once detached, terminated by an error, or the store has shut down
    pub fn is_active(&self) -> bool {
        self.rx.is_some()
    }

    /// Block until the next emission. `None` means the stream has ended.
    /// Results that were superseded before being read are skipped.
    pub fn recv(&mut self) -> Option<StoreResult<T>> {
        let received = self.rx.as_ref()?.recv();
        match received {
            Ok(item) => self.accept(item),
            Err(_) => {
                self.rx = None;
                None
            }
        }
    }

    /// Like `recv`, but gives up after `timeout`. Check `is_active` to tell
    /// a timeout from the end of the stream.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<StoreResult<T>> {
        let received = self.rx.as_ref()?.recv_timeout(timeout);
        match received {
            Ok(item) => self.accept(item),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                self.rx = None;
                None
            }
        }
    }

    /// Non-blocking poll
    pub fn try_recv(&mut self) -> Option<StoreResult<T>> {
        let received = self.rx.as_ref()?.try_recv();
        match received {
            Ok(item) => self.accept(item),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.rx = None;
                None
            }
        }
    }

    /// Take the first emission, then detach
    pub fn first(mut self) -> Option<StoreResult<T>> {
        let item = self.recv();
        self.detach();
        item
    }

    /// Stop receiving. Safe to call more than once; never blocks.
    pub fn detach(&mut self) {
        if self.rx.take().is_some() {
            // Worker may already be gone
            let _ = self.commands.send(Command::Detach(self.id));
        }
    }

    fn accept(&mut self, item: StoreResult<T>) -> Option<StoreResult<T>> {
        if item.is_err() {
            // Worker has already dropped its end
            self.rx = None;
        }
        Some(item)
    }
}

impl<T> Iterator for QuerySubscription<T> {
    type Item = StoreResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

impl<T> Drop for QuerySubscription<T> {
    fn drop(&mut self) {
        self.detach();
    }
}

impl<T> std::fmt::Debug for QuerySubscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuerySubscription")
            .field("id", &self.id)
            .field("query", &self.query)
            .field("active", &self.is_active())
            .finish()
    }
}
