//! Data-access wrapper

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::{report_error, ComponentId, Layer};
use crate::context::local::with_slot;
use crate::context::{self, store::has_service_marker, ContextStore};
use crate::error::Categorize;

/// Decorates one data-access component (repository, DAO, mapper).
///
/// Only the outermost data-access call records a marker; a repository that
/// delegates to another repository keeps the outer identity. The access
/// marker is never cleared here: a write buffered by the persistence engine
/// may still need it after this call returns.
#[derive(Clone)]
pub struct DataAccessInterceptor {
    component: ComponentId,
    store: Arc<ContextStore>,
}

impl DataAccessInterceptor {
    pub fn new(component: impl Into<ComponentId>, store: Arc<ContextStore>) -> Self {
        Self {
            component: component.into(),
            store,
        }
    }

    pub fn component(&self) -> &ComponentId {
        &self.component
    }

    pub fn enter(&self, method: &str) -> AccessScope<'_> {
        if !self.store.config().enabled {
            return AccessScope::inert(&self.store);
        }

        let depth = with_slot(|slot| {
            slot.access_depth += 1;
            slot.reported_error = None;
            slot.access_depth
        });
        let Some(depth) = depth else {
            return AccessScope::inert(&self.store);
        };

        let outermost = depth == 1;
        if outermost {
            self.store
                .add_access_marker(self.component.as_str(), method);
        }

        AccessScope {
            store: &self.store,
            entered: true,
            outermost,
        }
    }

    pub fn invoke<T, E, F>(&self, method: &str, call: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: Categorize + fmt::Display,
    {
        let _scope = self.enter(method);
        let result = call();
        if let Err(e) = &result {
            self.report(method, e);
        }
        result
    }

    pub fn run<T>(&self, method: &str, call: impl FnOnce() -> T) -> T {
        let _scope = self.enter(method);
        call()
    }

    pub async fn invoke_async<T, E, Fut>(&self, method: &str, call: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        E: Categorize + fmt::Display,
    {
        if context::in_task_scope() {
            self.invoke_scoped(method, call).await
        } else {
            context::scope(self.invoke_scoped(method, call)).await
        }
    }

    async fn invoke_scoped<T, E, Fut>(&self, method: &str, call: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        E: Categorize + fmt::Display,
    {
        let _scope = self.enter(method);
        let result = call.await;
        if let Err(e) = &result {
            self.report(method, e);
        }
        result
    }

    fn report<E: Categorize + fmt::Display>(&self, method: &str, err: &E) {
        if self.store.config().enabled {
            report_error(&self.store, Layer::DataAccess, &self.component, method, err);
        }
    }
}

/// Reentrancy guard for one data-access call
#[must_use = "the access scope ends when this guard is dropped"]
pub struct AccessScope<'a> {
    store: &'a ContextStore,
    entered: bool,
    outermost: bool,
}

impl<'a> AccessScope<'a> {
    fn inert(store: &'a ContextStore) -> Self {
        Self {
            store,
            entered: false,
            outermost: false,
        }
    }

    /// Whether this call recorded the access marker
    pub fn is_outermost(&self) -> bool {
        self.outermost
    }
}

impl Drop for AccessScope<'_> {
    fn drop(&mut self) {
        if !self.entered {
            return;
        }

        with_slot(|slot| slot.access_depth = slot.access_depth.saturating_sub(1));

        // No service owns this access and no completion callback will clear it
        if self.outermost && !has_service_marker() && !self.store.completion_pending() {
            self.store.force_clear_all();
        }
    }
}
