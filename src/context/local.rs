//! Call-local slot shared by the context store, the data-access guard and the
//! local unit of work.
//!
//! A call is either a synchronous worker thread (`thread_local!`) or an async
//! task running inside [`scope`] (`task_local!`). When both are reachable the
//! task-local slot wins, so a task that migrates between runtime workers keeps
//! its markers and never sees another task's.

use std::cell::RefCell;
use std::future::Future;

use tracing::debug;

use crate::context::types::CallContext;
use crate::unit_of_work::local::UnitOfWorkState;

#[derive(Default)]
pub(crate) struct CallSlot {
    pub(crate) context: CallContext,
    /// Data-access reentrancy depth
    pub(crate) access_depth: u32,
    /// Fingerprint of the last error line, so a re-raised error is logged once
    pub(crate) reported_error: Option<String>,
    pub(crate) unit_of_work: UnitOfWorkState,
}

thread_local! {
    static THREAD_SLOT: RefCell<CallSlot> = RefCell::new(CallSlot::default());
}

tokio::task_local! {
    static TASK_SLOT: RefCell<CallSlot>;
}

/// Whether the current code runs inside a task-local call scope
pub fn in_task_scope() -> bool {
    TASK_SLOT.try_with(|_| ()).is_ok()
}

/// Runs `fut` with a fresh task-local call slot.
///
/// Use it at the request boundary of async code, around the unit of work and
/// the outermost service call. The slot is dropped with the future, so nothing
/// outlives the request.
pub async fn scope<F: Future>(fut: F) -> F::Output {
    TASK_SLOT.scope(RefCell::new(CallSlot::default()), fut).await
}

/// Applies `f` to the current call slot.
///
/// Returns `None` when the slot is already borrowed further up the stack or
/// the thread is being torn down; callers treat that as "nothing to do".
pub(crate) fn with_slot<R>(f: impl FnOnce(&mut CallSlot) -> R) -> Option<R> {
    if in_task_scope() {
        TASK_SLOT.try_with(|slot| apply(slot, f)).ok().flatten()
    } else {
        THREAD_SLOT.try_with(|slot| apply(slot, f)).ok().flatten()
    }
}

fn apply<R>(slot: &RefCell<CallSlot>, f: impl FnOnce(&mut CallSlot) -> R) -> Option<R> {
    match slot.try_borrow_mut() {
        Ok(mut guard) => Some(f(&mut guard)),
        Err(_) => {
            debug!(
                target: "call_chain_tagger::context",
                "call slot busy; skipping context operation"
            );
            None
        }
    }
}
