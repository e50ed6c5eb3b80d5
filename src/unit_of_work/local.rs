//! Call-local unit-of-work manager
//!
//! A minimal transaction-synchronization registry living in the same call
//! slot as the markers. Nested `begin` calls join the outer unit; only the
//! outermost completion fires the registered callbacks, exactly once.

use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, warn};
use uuid::Uuid;

use super::{Completion, CompletionCallback, UnitOfWorkManager, TARGET};
use crate::context::local::with_slot;
use crate::error::UnitOfWorkError;

#[derive(Default)]
pub(crate) struct UnitOfWorkState {
    depth: u32,
    id: Option<Uuid>,
    rollback_only: bool,
    callbacks: Vec<CompletionCallback>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalUnitOfWorkManager;

impl LocalUnitOfWorkManager {
    pub fn new() -> Self {
        Self
    }

    /// Starts a unit of work, or joins the one already active on this call
    pub fn begin(&self) -> UnitOfWork {
        let entered = with_slot(|slot| {
            let state = &mut slot.unit_of_work;
            state.depth += 1;
            if state.depth == 1 {
                state.id = Some(Uuid::new_v4());
                state.rollback_only = false;
            }
            (state.id, state.depth)
        });

        match entered {
            Some((id, depth)) => {
                if depth == 1 {
                    debug!(target: TARGET, uow = ?id, "unit of work started");
                } else {
                    debug!(target: TARGET, uow = ?id, depth, "joined active unit of work");
                }
                UnitOfWork {
                    id,
                    attached: true,
                    finished: false,
                }
            }
            None => {
                debug!(target: TARGET, "call slot unavailable; unit of work detached");
                UnitOfWork {
                    id: None,
                    attached: false,
                    finished: false,
                }
            }
        }
    }

    /// Runs `work` inside a unit of work: commit on `Ok`, roll back on `Err`
    pub fn run<T, E>(&self, work: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        let uow = self.begin();
        match work() {
            Ok(value) => {
                uow.commit();
                Ok(value)
            }
            Err(e) => {
                uow.rollback();
                Err(e)
            }
        }
    }

    pub fn current_id(&self) -> Option<Uuid> {
        with_slot(|slot| slot.unit_of_work.id).flatten()
    }

    pub fn depth(&self) -> u32 {
        with_slot(|slot| slot.unit_of_work.depth).unwrap_or(0)
    }
}

impl UnitOfWorkManager for LocalUnitOfWorkManager {
    fn is_active(&self) -> bool {
        self.depth() > 0
    }

    fn register_completion(&self, callback: CompletionCallback) -> Result<(), UnitOfWorkError> {
        with_slot(|slot| {
            let state = &mut slot.unit_of_work;
            if state.depth == 0 {
                return Err(UnitOfWorkError::NotActive);
            }
            state.callbacks.push(callback);
            Ok(())
        })
        .unwrap_or(Err(UnitOfWorkError::SlotUnavailable))
    }
}

/// Guard for an active unit of work. Dropping it without committing rolls back.
///
/// The guard must complete on the call that began it: the same thread for
/// synchronous code, or the same task scope for async code.
#[must_use = "dropping a unit of work rolls it back"]
#[derive(Debug)]
pub struct UnitOfWork {
    id: Option<Uuid>,
    attached: bool,
    finished: bool,
}

impl UnitOfWork {
    pub fn id(&self) -> Option<Uuid> {
        self.id
    }

    /// Commits. Returns the outcome of the outermost unit when this guard
    /// completes it; a joined guard reports its own request.
    pub fn commit(mut self) -> Completion {
        self.finish(Completion::Committed)
    }

    pub fn rollback(mut self) -> Completion {
        self.finish(Completion::RolledBack)
    }

    fn finish(&mut self, requested: Completion) -> Completion {
        if self.finished {
            return requested;
        }
        self.finished = true;
        if !self.attached {
            return requested;
        }

        let completed = with_slot(|slot| {
            let state = &mut slot.unit_of_work;
            state.depth = state.depth.saturating_sub(1);
            if requested == Completion::RolledBack {
                state.rollback_only = true;
            }
            if state.depth > 0 {
                return None;
            }

            let outcome = if state.rollback_only {
                Completion::RolledBack
            } else {
                Completion::Committed
            };
            state.id = None;
            state.rollback_only = false;
            Some((outcome, std::mem::take(&mut state.callbacks)))
        })
        .flatten();

        let Some((outcome, callbacks)) = completed else {
            return requested;
        };

        debug!(
            target: TARGET,
            uow = ?self.id,
            ?outcome,
            callbacks = callbacks.len(),
            "unit of work completed"
        );

        // Callbacks run with the slot released so they may touch it themselves
        for callback in callbacks {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(outcome))).is_err() {
                warn!(target: TARGET, uow = ?self.id, "completion callback panicked");
            }
        }

        outcome
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if !self.finished {
            self.finish(Completion::RolledBack);
        }
    }
}
