// Task store: SQLite table behind a single worker thread, with live queries

use crate::error::{StoreError, StoreResult};
use crate::record::{TaskDraft, TaskId, TaskRecord};
use crate::subscription::{Latest, Query, QuerySubscription, Subscriber, latest};
use crate::table::Table;
use crate::worker::{Command, Worker};
use fs2::FileExt;
use mockable::Clock;
use rusqlite::Connection;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

pub const DB_FILE: &str = "todostore.db";
pub const LOCK_FILE: &str = "todostore.lock";

/// Exclusive owner of the tasks table
///
/// Construct one per process at the composition root and share it by
/// reference. All writes are queued to a dedicated worker thread and return
/// immediately; results reach callers through subscriptions or, optionally,
/// through the returned [`Completion`].
pub struct TaskStore {
    base_path: Option<PathBuf>,
    commands: Sender<Command>,
    next_subscription: AtomicU64,
    worker: Option<JoinHandle<()>>,
    // Held for the life of the store; released on drop
    _lock: Option<File>,
}

impl TaskStore {
    /// Open or create a store in the given directory
    ///
    /// Fails with [`StoreError::Locked`] if another store already owns it.
    pub fn open<P: AsRef<Path>>(path: P, clock: impl Clock + Send + 'static) -> StoreResult<Self> {
        let base_path = path.as_ref().to_path_buf();

        fs::create_dir_all(&base_path)?;

        let lock = File::options()
            .create(true)
            .truncate(false)
            .write(true)
            .open(base_path.join(LOCK_FILE))?;
        if lock.try_lock_exclusive().is_err() {
            warn!(path = %base_path.display(), "Store directory is locked");
            return Err(StoreError::Locked(base_path));
        }

        let db = Connection::open(base_path.join(DB_FILE))?;
        info!(path = %base_path.display(), "Opened task store");

        Self::start(db, Box::new(clock), Some(base_path), Some(lock))
    }

    /// Store backed by an in-memory database
    pub fn open_in_memory(clock: impl Clock + Send + 'static) -> StoreResult<Self> {
        let db = Connection::open_in_memory()?;
        debug!("Opened in-memory task store");
        Self::start(db, Box::new(clock), None, None)
    }

    fn start(db: Connection, clock: Box<dyn Clock + Send>, base_path: Option<PathBuf>, lock: Option<File>) -> StoreResult<Self> {
        let table = Table::new(db, clock)?;
        let (commands, inbox) = mpsc::channel();

        let worker = thread::Builder::new()
            .name("todostore-disk-io".to_string())
            .spawn(move || Worker::new(table).run(inbox))?;

        Ok(Self {
            base_path,
            commands,
            next_subscription: AtomicU64::new(1),
            worker: Some(worker),
            _lock: lock,
        })
    }

    /// Directory the store lives in; `None` for in-memory stores
    pub fn base_path(&self) -> Option<&Path> {
        self.base_path.as_deref()
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Queue an insert. The completion yields the assigned id.
    pub fn insert(&self, draft: TaskDraft) -> Completion<TaskId> {
        self.submit(|reply| Command::Insert(draft, reply))
    }

    /// Queue an update of `record.id`. Yields false if no such row exists;
    /// the row is not created.
    pub fn update(&self, record: TaskRecord) -> Completion<bool> {
        self.submit(|reply| Command::Update(record, reply))
    }

    /// Queue a delete. Yields false if the row was already absent.
    pub fn delete(&self, id: TaskId) -> Completion<bool> {
        self.submit(|reply| Command::Delete(id, reply))
    }

    fn submit<T>(&self, command: impl FnOnce(Sender<StoreResult<T>>) -> Command) -> Completion<T> {
        let (reply, rx) = mpsc::channel();
        if self.commands.send(command(reply)).is_err() {
            warn!("Write submitted after the store worker stopped");
        }
        Completion { rx }
    }

    // ========================================================================
    // Live queries
    // ========================================================================

    /// Every task, most recently written first
    pub fn get_all(&self) -> QuerySubscription<Vec<TaskRecord>> {
        let (tx, rx) = latest();
        self.subscribe(Query::All, Subscriber::All(tx), rx)
    }

    /// One task, or `None` while no row has this id
    pub fn get_by_id(&self, id: TaskId) -> QuerySubscription<Option<TaskRecord>> {
        let (tx, rx) = latest();
        self.subscribe(Query::ById(id), Subscriber::ById(id, tx), rx)
    }

    fn subscribe<T>(&self, query: Query, subscriber: Subscriber, rx: Latest<T>) -> QuerySubscription<T> {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        // On failure the sender is dropped with the command and the
        // subscription simply ends
        let _ = self.commands.send(Command::Subscribe(id, subscriber));
        QuerySubscription::new(id, query, rx, self.commands.clone())
    }

    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> StoreResult<()> {
        self.submit(|reply| Command::Execute(sql.to_string(), reply)).wait()
    }
}

impl Drop for TaskStore {
    /// Queued writes are flushed before the worker exits
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Store worker panicked");
            }
        }
    }
}

impl std::fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskStore").field("base_path", &self.base_path).finish()
    }
}

/// Outcome of a queued write
///
/// Dropping it does not cancel the write.
#[derive(Debug)]
pub struct Completion<T> {
    rx: Receiver<StoreResult<T>>,
}

impl<T> Completion<T> {
    /// Block until the write has been committed or has failed
    pub fn wait(self) -> StoreResult<T> {
        self.rx.recv().unwrap_or(Err(StoreError::Closed))
    }
}
