//! Unit-of-work lifecycle hook
//!
//! Persistence engines commonly buffer writes until commit, well after the
//! service method that caused them has returned. While a unit of work is
//! active the context store therefore leaves clearing to a one-shot completion
//! callback registered here.

pub mod local;

use std::sync::Arc;

use tracing::debug;

use crate::context::{self, local::with_slot};
use crate::error::UnitOfWorkError;
use crate::metrics::TaggerMetrics;

pub use local::{LocalUnitOfWorkManager, UnitOfWork};

const TARGET: &str = "call_chain_tagger::unit_of_work";

/// How a unit of work ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Committed,
    RolledBack,
}

/// One-shot callback fired when the unit of work commits or rolls back
pub type CompletionCallback = Box<dyn FnOnce(Completion) + Send + 'static>;

/// The transaction manager as seen by the tagging subsystem.
///
/// Both methods answer for the current call only. Implementations must fire
/// every registered callback exactly once, on the completing call, whatever
/// the outcome.
#[cfg_attr(test, mockall::automock)]
pub trait UnitOfWorkManager: Send + Sync {
    fn is_active(&self) -> bool;

    fn register_completion(&self, callback: CompletionCallback) -> Result<(), UnitOfWorkError>;
}

/// Manager for hosts without transactions; clearing always happens at service exit
#[derive(Debug, Default, Clone, Copy)]
pub struct NoUnitOfWork;

impl UnitOfWorkManager for NoUnitOfWork {
    fn is_active(&self) -> bool {
        false
    }

    fn register_completion(&self, _callback: CompletionCallback) -> Result<(), UnitOfWorkError> {
        Err(UnitOfWorkError::NotActive)
    }
}

/// Registers the clearing callback once per unit of work.
///
/// The flag is raised before registering so later markers inside the same
/// unit of work see it; a rejected registration lowers it again.
pub(crate) fn register_completion_hook(
    manager: &dyn UnitOfWorkManager,
    metrics: &Arc<TaggerMetrics>,
) {
    if !manager.is_active() {
        return;
    }

    let claimed = with_slot(|slot| slot.context.claim_registration()).unwrap_or(false);
    if !claimed {
        return;
    }

    let fired = Arc::clone(metrics);
    let callback: CompletionCallback = Box::new(move |outcome| {
        context::force_clear_all();
        fired.record_callback_fired();
        debug!(target: TARGET, ?outcome, "unit of work completed; call context cleared");
    });

    match manager.register_completion(callback) {
        Ok(()) => {
            metrics.record_callback_registered();
            debug!(target: TARGET, "completion callback registered");
        }
        Err(e) => {
            with_slot(|slot| slot.context.release_registration());
            debug!(target: TARGET, "completion callback not registered: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{snapshot, ContextStore};
    use std::sync::Mutex;

    #[test]
    fn test_no_unit_of_work_rejects_registration() {
        let manager = NoUnitOfWork;
        assert!(!manager.is_active());
        assert_eq!(
            manager.register_completion(Box::new(|_| {})),
            Err(UnitOfWorkError::NotActive)
        );
    }

    #[test]
    fn test_inactive_manager_is_never_asked_to_register() {
        let mut manager = MockUnitOfWorkManager::new();
        manager.expect_is_active().return_const(false);
        manager.expect_register_completion().never();

        let store = ContextStore::new(Arc::new(manager));
        store.set_service_marker("serviceA", "methodX");
        store.add_access_marker("repoA", "find");
        assert!(!snapshot().is_registered());
        store.force_clear_all();
    }

    #[test]
    fn test_registers_at_most_once_per_unit_of_work() {
        let mut manager = MockUnitOfWorkManager::new();
        manager.expect_is_active().return_const(true);
        manager
            .expect_register_completion()
            .times(1)
            .returning(|_| Ok(()));

        let store = ContextStore::new(Arc::new(manager));
        store.set_service_marker("serviceA", "methodX");
        for i in 0..25 {
            store.add_access_marker("repoA", &format!("find{i}"));
            store.set_service_marker("serviceB", "nested");
        }
        assert!(snapshot().is_registered());
        assert_eq!(store.metrics().completion_callbacks_registered.get(), 1);
        store.force_clear_all();
    }

    #[test]
    fn test_rejected_registration_lowers_flag_and_retries() {
        let mut manager = MockUnitOfWorkManager::new();
        manager.expect_is_active().return_const(true);
        manager
            .expect_register_completion()
            .times(2)
            .returning(|_| Err(UnitOfWorkError::Rejected("synchronization inactive".into())));

        let store = ContextStore::new(Arc::new(manager));
        store.set_service_marker("serviceA", "methodX");
        assert!(!snapshot().is_registered());
        store.add_access_marker("repoA", "find");
        assert!(!snapshot().is_registered());
        assert_eq!(store.metrics().completion_callbacks_registered.get(), 0);
        store.force_clear_all();
    }

    #[test]
    fn test_callback_clears_context_on_either_outcome() {
        for outcome in [Completion::Committed, Completion::RolledBack] {
            let captured: Arc<Mutex<Option<CompletionCallback>>> = Arc::new(Mutex::new(None));
            let sink = Arc::clone(&captured);

            let mut manager = MockUnitOfWorkManager::new();
            manager.expect_is_active().return_const(true);
            manager
                .expect_register_completion()
                .times(1)
                .returning(move |callback| {
                    *sink.lock().unwrap() = Some(callback);
                    Ok(())
                });

            let store = ContextStore::new(Arc::new(manager));
            store.set_service_marker("serviceA", "methodX");
            store.add_access_marker("repoB", "save");
            store.clear_service_scope();
            assert_eq!(
                store.current_tag().unwrap().as_str(),
                "serviceA.methodX.repoB.save"
            );

            let callback = captured.lock().unwrap().take().unwrap();
            callback(outcome);

            assert!(store.current_tag().is_none());
            assert!(snapshot().is_empty());
            assert_eq!(store.metrics().completion_callbacks_fired.get(), 1);
        }
    }
}
