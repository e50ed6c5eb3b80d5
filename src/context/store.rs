//! Context store: the call-scoped marker API
//!
//! Every operation is fail-open. A busy or missing slot turns writes into
//! no-ops and reads into `None`; nothing here returns an error or panics into
//! business code.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::trace;

use crate::config::TaggerConfig;
use crate::context::local::with_slot;
use crate::context::types::{marker, CallContext, CallTag};
use crate::metrics::TaggerMetrics;
use crate::unit_of_work::{self, UnitOfWorkManager};

const TARGET: &str = "call_chain_tagger::context";

/// Process-wide handle onto the call-scoped markers.
///
/// The markers themselves live in call-local slots; the store only carries
/// the collaborators needed to decide when clearing must be deferred.
pub struct ContextStore {
    manager: Arc<dyn UnitOfWorkManager>,
    metrics: Arc<TaggerMetrics>,
    config: Arc<ArcSwap<TaggerConfig>>,
}

impl ContextStore {
    pub fn new(manager: Arc<dyn UnitOfWorkManager>) -> Self {
        Self::with_parts(
            manager,
            Arc::new(TaggerMetrics::new()),
            Arc::new(ArcSwap::from_pointee(TaggerConfig::default())),
        )
    }

    pub fn with_parts(
        manager: Arc<dyn UnitOfWorkManager>,
        metrics: Arc<TaggerMetrics>,
        config: Arc<ArcSwap<TaggerConfig>>,
    ) -> Self {
        Self {
            manager,
            metrics,
            config,
        }
    }

    /// Sets the service marker if none is set yet and returns whether this call
    /// took ownership. Attempts unit-of-work registration either way.
    pub fn set_service_marker(&self, component: &str, method: &str) -> bool {
        let owner = with_slot(|slot| slot.context.set_service(marker(component, method)))
            .unwrap_or(false);

        if owner {
            trace!(target: TARGET, "service marker set: {}.{}", component, method);
        }

        unit_of_work::register_completion_hook(self.manager.as_ref(), &self.metrics);
        owner
    }

    /// Records the data-access operation now running, keeping the previous one
    /// as the last-access backup.
    pub fn add_access_marker(&self, component: &str, method: &str) {
        with_slot(|slot| slot.context.push_access(marker(component, method)));
        trace!(target: TARGET, "access marker set: {}.{}", component, method);

        unit_of_work::register_completion_hook(self.manager.as_ref(), &self.metrics);
    }

    pub fn current_tag(&self) -> Option<CallTag> {
        current_tag()
    }

    pub fn clear_access_scope(&self) {
        clear_access_scope();
    }

    /// Clears everything unless a completion callback will do it later.
    ///
    /// While a unit of work is active a deferred write may still fire after
    /// this call returns, so the clear is left to the registered callback. A
    /// rejected registration leaves nothing to clear the slot, so it is
    /// cleared here.
    pub fn clear_service_scope(&self) {
        if self.completion_pending() {
            trace!(
                target: TARGET,
                "unit of work active; clear deferred to completion"
            );
            return;
        }
        force_clear_all();
    }

    /// Whether an active unit of work holds a callback that will clear this call
    pub fn completion_pending(&self) -> bool {
        self.manager.is_active()
            && with_slot(|slot| slot.context.is_registered()).unwrap_or(false)
    }

    pub fn force_clear_all(&self) {
        force_clear_all();
    }

    pub fn manager(&self) -> &Arc<dyn UnitOfWorkManager> {
        &self.manager
    }

    pub fn metrics(&self) -> &Arc<TaggerMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> Arc<TaggerConfig> {
        self.config.load_full()
    }

    pub(crate) fn config_handle(&self) -> &Arc<ArcSwap<TaggerConfig>> {
        &self.config
    }
}

/// Tag for the current call, if a service marker is set
pub fn current_tag() -> Option<CallTag> {
    with_slot(|slot| slot.context.tag()).flatten()
}

/// Clears the access marker only; service and last-access survive
pub fn clear_access_scope() {
    with_slot(|slot| slot.context.clear_access());
}

/// Wipes all four fields, including the registration flag, and forgets the
/// last reported error
pub fn force_clear_all() {
    with_slot(|slot| {
        slot.context.clear();
        slot.reported_error = None;
    });
}

/// Copy of the current call's markers
pub fn snapshot() -> CallContext {
    with_slot(|slot| slot.context.clone()).unwrap_or_default()
}

pub(crate) fn has_service_marker() -> bool {
    with_slot(|slot| slot.context.service().is_some()).unwrap_or(false)
}
