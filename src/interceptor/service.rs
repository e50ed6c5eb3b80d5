//! Business-service wrapper

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::{report_error, reset_reported_error, ComponentId, Layer};
use crate::context::{self, ContextStore};
use crate::error::Categorize;

/// Decorates one business-service component.
///
/// The outermost service call on a call owns the service marker and is the
/// only one that clears it; nested calls observe it.
#[derive(Clone)]
pub struct ServiceInterceptor {
    component: ComponentId,
    store: Arc<ContextStore>,
}

impl ServiceInterceptor {
    pub fn new(component: impl Into<ComponentId>, store: Arc<ContextStore>) -> Self {
        Self {
            component: component.into(),
            store,
        }
    }

    pub fn component(&self) -> &ComponentId {
        &self.component
    }

    /// Marks entry into `method`. Dropping the returned scope performs the
    /// exit bookkeeping.
    pub fn enter(&self, method: &str) -> ServiceScope<'_> {
        if !self.store.config().enabled {
            return ServiceScope {
                store: &self.store,
                owner: false,
            };
        }

        reset_reported_error();
        let owner = self
            .store
            .set_service_marker(self.component.as_str(), method);

        ServiceScope {
            store: &self.store,
            owner,
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

    /// Wraps a method that cannot fail
    pub fn run<T>(&self, method: &str, call: impl FnOnce() -> T) -> T {
        let _scope = self.enter(method);
        call()
    }

    /// Async variant of [`invoke`](Self::invoke).
    ///
    /// Opens a task-local call scope when the caller has not, so the markers
    /// follow the task across worker threads.
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
            report_error(&self.store, Layer::Service, &self.component, method, err);
        }
    }
}

/// Exit guard for one service call
#[must_use = "the service scope ends when this guard is dropped"]
pub struct ServiceScope<'a> {
    store: &'a ContextStore,
    owner: bool,
}

impl ServiceScope<'_> {
    /// Whether this call set the service marker
    pub fn is_owner(&self) -> bool {
        self.owner
    }
}

impl Drop for ServiceScope<'_> {
    fn drop(&mut self) {
        if self.owner {
            self.store.clear_service_scope();
        }
    }
}
