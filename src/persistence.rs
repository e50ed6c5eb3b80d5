//! In-memory write-behind session
//!
//! Stands in for a persistence engine that buffers writes until flush or
//! commit. Only the notification timing is modelled; nothing is stored.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::listener::{LifecycleEvent, LifecycleListener, Operation, Phase, Record};
use crate::unit_of_work::{Completion, UnitOfWork};

const TARGET: &str = "call_chain_tagger::persistence";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushMode {
    /// Notifications fire as soon as a write is requested
    Immediate,
    /// Writes are queued until `flush` or `commit`
    #[default]
    Deferred,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWrite {
    pub operation: Operation,
    pub record_kind: String,
    pub record_id: Option<String>,
}

pub struct WriteBehindSession {
    mode: FlushMode,
    listeners: Vec<Arc<dyn LifecycleListener>>,
    pending: Mutex<Vec<PendingWrite>>,
}

impl WriteBehindSession {
    pub fn new(mode: FlushMode) -> Self {
        Self {
            mode,
            listeners: Vec::new(),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn LifecycleListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn mode(&self) -> FlushMode {
        self.mode
    }

    pub fn create<R: Record + ?Sized>(&self, record: &R) {
        self.write(Operation::Create, record);
    }

    pub fn update<R: Record + ?Sized>(&self, record: &R) {
        self.write(Operation::Update, record);
    }

    pub fn delete<R: Record + ?Sized>(&self, record: &R) {
        self.write(Operation::Delete, record);
    }

    /// Reads are never buffered
    pub fn load<R: Record + ?Sized>(&self, record: &R) {
        self.notify(&LifecycleEvent::for_record(Operation::Load, Phase::Before, record));
        self.notify(&LifecycleEvent::for_record(Operation::Load, Phase::After, record));
    }

    pub fn pending(&self) -> Vec<PendingWrite> {
        self.lock_pending().clone()
    }

    /// Emits every queued write in request order. Returns how many were flushed.
    pub fn flush(&self) -> usize {
        let writes = std::mem::take(&mut *self.lock_pending());
        if !writes.is_empty() {
            debug!(target: TARGET, writes = writes.len(), "flushing pending writes");
        }

        for write in &writes {
            self.emit(write);
        }
        writes.len()
    }

    /// Flushes, then commits the unit of work
    pub fn commit(&self, uow: UnitOfWork) -> Completion {
        self.flush();
        uow.commit()
    }

    /// Discards queued writes, then rolls the unit of work back
    pub fn rollback(&self, uow: UnitOfWork) -> Completion {
        let discarded = std::mem::take(&mut *self.lock_pending()).len();
        if discarded > 0 {
            debug!(target: TARGET, discarded, "pending writes discarded");
        }
        uow.rollback()
    }

    fn write<R: Record + ?Sized>(&self, operation: Operation, record: &R) {
        let write = PendingWrite {
            operation,
            record_kind: record.record_kind().to_string(),
            record_id: record.record_id(),
        };

        match self.mode {
            FlushMode::Immediate => self.emit(&write),
            FlushMode::Deferred => self.lock_pending().push(write),
        }
    }

    fn emit(&self, write: &PendingWrite) {
        for phase in [Phase::Before, Phase::After] {
            let mut event = LifecycleEvent::new(write.operation, phase, &write.record_kind);
            event.record_id = write.record_id.clone();
            self.notify(&event);
        }
    }

    fn notify(&self, event: &LifecycleEvent<'_>) {
        for listener in &self.listeners {
            listener.on_event(event);
        }
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Vec<PendingWrite>> {
        // Listeners run outside the lock, so a poisoned queue is still consistent
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
