//! Store handle and transactions.

use crate::config::StoreConfig;
use crate::entity::Entity;
use crate::entity_box::EntityBox;
use crate::error::{CoreError, CoreResult};
use crate::id::IdCell;
use parking_lot::{Mutex, ReentrantMutex};
use relbox_codec::BuilderPool;
use relbox_store::{Id, MemoryBackend, StoreBackend};
use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Undo step for in-memory state changed inside a write transaction.
type Rollback = Box<dyn FnOnce() + Send>;

struct StoreInner {
    config: StoreConfig,
    backend: Arc<dyn StoreBackend>,
    /// Set when the backend is ours and can be written to a snapshot file.
    memory: Option<Arc<MemoryBackend>>,
    /// Serializes writers; the cell counts nested transaction frames.
    writer: ReentrantMutex<Cell<u32>>,
    /// Undo steps of the current write transaction, run newest first on
    /// abort.
    rollback: Mutex<Vec<Rollback>>,
    pool: BuilderPool,
    closed: AtomicBool,
}

impl StoreInner {
    /// Aborts the backend write and undoes the in-memory changes made in
    /// it: assigned ids, relation bindings and applied pending edits.
    fn abort_write(&self) {
        if let Err(e) = self.backend.abort_write() {
            tracing::warn!(error = %e, "abort failed");
        }
        let steps = std::mem::take(&mut *self.rollback.lock());
        let reverted = steps.len();
        for undo in steps.into_iter().rev() {
            undo();
        }
        tracing::debug!(reverted, "in-memory changes of aborted transaction undone");
    }

    fn save_snapshot(&self) -> CoreResult<()> {
        if let (Some(memory), Some(path)) = (&self.memory, &self.config.snapshot_path) {
            memory.save_snapshot(path)?;
        }
        Ok(())
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        if self.closed.load(Ordering::Acquire) || !self.config.save_on_close {
            return;
        }
        if let Err(e) = self.save_snapshot() {
            tracing::warn!(error = %e, "failed to save snapshot on drop");
        }
    }
}

/// Entry point for boxes and transactions.
///
/// A `Store` is a cheap, cloneable handle. Relations hold a [`StoreRef`]
/// instead, so an entity never keeps its store alive.
///
/// # Transactions
///
/// Only one write transaction runs at a time. Nested
/// [`run_in_transaction`](Self::run_in_transaction) calls on the same thread
/// join the outermost one; only the outermost frame commits or aborts.
///
/// # Example
///
/// ```rust
/// use relbox_core::{CoreError, Store};
///
/// let store = Store::in_memory();
/// let result: Result<(), CoreError> = store.run_in_transaction(|| {
///     store.run_in_transaction(|| Ok(()))?;
///     Err(CoreError::illegal_state("roll everything back"))
/// });
/// assert!(result.is_err());
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        let memory = Arc::new(MemoryBackend::new());
        Self::build(
            StoreConfig::default(),
            Arc::clone(&memory) as Arc<dyn StoreBackend>,
            Some(memory),
        )
    }

    /// Opens a store with the given configuration.
    ///
    /// If `snapshot_path` points at an existing file, it is loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot exists but cannot be read.
    pub fn open(config: StoreConfig) -> CoreResult<Self> {
        let memory = match &config.snapshot_path {
            Some(path) if path.exists() => Arc::new(MemoryBackend::load_snapshot(path)?),
            _ => Arc::new(MemoryBackend::new()),
        };
        Ok(Self::build(
            config,
            Arc::clone(&memory) as Arc<dyn StoreBackend>,
            Some(memory),
        ))
    }

    /// Creates a store on top of an external backend.
    ///
    /// Snapshot settings in `config` are ignored.
    #[must_use]
    pub fn with_backend(backend: Arc<dyn StoreBackend>, config: StoreConfig) -> Self {
        Self::build(config, backend, None)
    }

    fn build(
        config: StoreConfig,
        backend: Arc<dyn StoreBackend>,
        memory: Option<Arc<MemoryBackend>>,
    ) -> Self {
        tracing::debug!(
            snapshot = ?config.snapshot_path,
            persistent = memory.is_some() && config.snapshot_path.is_some(),
            "store opened"
        );
        let pool = BuilderPool::new(
            config.initial_builder_capacity,
            config.max_retained_builder_capacity,
        );
        Self {
            inner: Arc::new(StoreInner {
                config,
                backend,
                memory,
                writer: ReentrantMutex::new(Cell::new(0)),
                rollback: Mutex::new(Vec::new()),
                pool,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Returns a typed box for entity `T`.
    #[must_use]
    pub fn box_for<T: Entity>(&self) -> EntityBox<T> {
        EntityBox::new(self.clone())
    }

    /// Returns a non-owning reference to this store.
    #[must_use]
    pub fn downgrade(&self) -> StoreRef {
        StoreRef(Arc::downgrade(&self.inner))
    }

    /// Returns the store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Returns the builder pool used by puts.
    #[must_use]
    pub fn builder_pool(&self) -> &BuilderPool {
        &self.inner.pool
    }

    /// Returns true if both handles refer to the same store.
    #[must_use]
    pub fn same_store(&self, other: &Store) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn backend(&self) -> &dyn StoreBackend {
        self.inner.backend.as_ref()
    }

    /// Executes `f` within a write transaction.
    ///
    /// If `f` returns `Ok`, the transaction is committed. If it returns
    /// `Err`, the transaction is aborted. Nested calls on the same thread
    /// run inside the outermost transaction, and an error anywhere aborts
    /// all of it once it reaches the outermost frame.
    ///
    /// # Errors
    ///
    /// `StoreClosed`, errors from `f`, or backend errors on begin/commit.
    pub fn run_in_transaction<R>(&self, f: impl FnOnce() -> CoreResult<R>) -> CoreResult<R> {
        self.ensure_open()?;
        let frame = self.inner.writer.lock();
        let depth = frame.get();
        if depth > 0 {
            let _nested = DepthGuard::enter(&frame, depth);
            return f();
        }

        self.inner.backend.begin_write()?;
        let pending = PendingWrite::new(&self.inner);
        let result = {
            let _outer = DepthGuard::enter(&frame, 0);
            f()
        };

        match result {
            Ok(value) => {
                pending.commit()?;
                tracing::debug!("transaction committed");
                Ok(value)
            }
            Err(e) => {
                pending.abort();
                tracing::debug!(error = %e, "transaction aborted");
                Err(e)
            }
        }
    }

    /// Writes `id` into `cell` for the running write transaction, to be
    /// reset if it aborts.
    pub(crate) fn assign_id(&self, cell: &IdCell, id: Id) {
        let write = cell.assign(id);
        self.on_abort(move || write.revert());
    }

    /// Registers `undo` to run if the write transaction open on this thread
    /// aborts. Outside a write transaction `undo` is dropped.
    pub(crate) fn on_abort(&self, undo: impl FnOnce() + Send + 'static) {
        // another thread's writer makes try_lock fail
        let in_write = self
            .inner
            .writer
            .try_lock()
            .is_some_and(|frame| frame.get() > 0);
        if in_write {
            self.inner.rollback.lock().push(Box::new(undo));
        }
    }

    /// Executes `f` against one consistent snapshot.
    ///
    /// Inside a write transaction on the same thread, reads see that
    /// transaction's changes.
    ///
    /// # Errors
    ///
    /// `StoreClosed`, errors from `f`, or backend errors.
    pub fn run_in_read_transaction<R>(&self, f: impl FnOnce() -> CoreResult<R>) -> CoreResult<R> {
        self.ensure_open()?;
        self.inner.backend.begin_read()?;
        let result = f();
        self.inner.backend.end_read()?;
        result
    }

    /// Writes the snapshot file now.
    ///
    /// No-op for stores without a snapshot path or with an external backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_snapshot(&self) -> CoreResult<()> {
        self.inner.save_snapshot()
    }

    /// Closes the store.
    ///
    /// Writes the snapshot when `save_on_close` is set. Later operations
    /// fail with `StoreClosed`. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    pub fn close(&self) -> CoreResult<()> {
        let _writer = self.inner.writer.lock();
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::debug!("store closed");
        if self.inner.config.save_on_close {
            if let Err(e) = self.inner.save_snapshot() {
                tracing::warn!(error = %e, "failed to save snapshot on close");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Returns true after [`close`](Self::close).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_open(&self) -> CoreResult<()> {
        if self.is_closed() {
            Err(CoreError::StoreClosed)
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("snapshot_path", &self.inner.config.snapshot_path)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Non-owning reference to a [`Store`], held by relations.
#[derive(Clone)]
pub struct StoreRef(Weak<StoreInner>);

impl StoreRef {
    /// Returns the store if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Store> {
        self.0.upgrade().map(|inner| Store { inner })
    }
}

impl fmt::Debug for StoreRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreRef(alive: {})", self.0.strong_count() > 0)
    }
}

/// Restores the frame depth when a transaction body returns or unwinds.
struct DepthGuard<'a> {
    depth: &'a Cell<u32>,
    previous: u32,
}

impl<'a> DepthGuard<'a> {
    fn enter(depth: &'a Cell<u32>, previous: u32) -> Self {
        depth.set(previous + 1);
        Self { depth, previous }
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.previous);
    }
}

/// Rolls the write back unless it was committed, also when the body
/// unwinds.
struct PendingWrite<'a> {
    inner: &'a StoreInner,
    armed: bool,
}

impl<'a> PendingWrite<'a> {
    fn new(inner: &'a StoreInner) -> Self {
        Self { inner, armed: true }
    }

    fn commit(mut self) -> CoreResult<()> {
        self.armed = false;
        if let Err(e) = self.inner.backend.commit_write() {
            self.inner.abort_write();
            return Err(e.into());
        }
        self.inner.rollback.lock().clear();
        Ok(())
    }

    fn abort(mut self) {
        self.armed = false;
        self.inner.abort_write();
    }
}

impl Drop for PendingWrite<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.abort_write();
        }
    }
}
