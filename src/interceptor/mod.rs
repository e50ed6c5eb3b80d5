//! Explicit interception wrappers
//!
//! Service and data-access components are decorated at construction time
//! instead of being matched by naming convention at runtime. Each wrapper
//! sets the relevant marker on entry, runs the wrapped call, logs one
//! categorized line if the call fails and hands the error back untouched.
//! Cleanup is tied to a `Drop` guard, so it also runs on unwind and when an
//! async call is cancelled.

pub mod access;
pub mod service;

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use tracing::{error, warn};

use crate::context::local::with_slot;
use crate::context::{snapshot, ContextStore};
use crate::error::Categorize;

pub use access::{AccessScope, DataAccessInterceptor};
pub use service::{ServiceInterceptor, ServiceScope};

const TARGET: &str = "call_chain_tagger::interceptor";

/// Wrapper types that never name a component themselves
const TRANSPARENT_WRAPPERS: &[&str] = &[
    "Box",
    "Arc",
    "Rc",
    "RefCell",
    "Mutex",
    "RwLock",
    "ServiceInterceptor",
    "DataAccessInterceptor",
];

/// Stable name of an intercepted component, used as the first half of a marker
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentId(Arc<str>);

impl ComponentId {
    /// Explicit name; preferred over anything derived from types
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Derives a name from `T`'s type name.
    ///
    /// Smart pointers and decorators are unwrapped to the capability they
    /// carry, so `Arc<dyn shop::OrderRepository + Send>` and
    /// `shop::OrderRepository` both become `orderRepository`.
    pub fn of<T: ?Sized>() -> Self {
        Self::from_type_name(type_name::<T>())
    }

    pub fn from_type_name(raw: &str) -> Self {
        let resolved = resolve_type_name(raw);
        if resolved.is_empty() {
            Self::new(raw)
        } else {
            Self::new(decapitalize(&resolved))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ComponentId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ComponentId {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

fn resolve_type_name(raw: &str) -> String {
    let mut current = raw.trim();

    loop {
        current = current.trim_start_matches('&').trim();
        current = current.strip_prefix("mut ").unwrap_or(current).trim();
        current = current.strip_prefix("dyn ").unwrap_or(current).trim();

        let open = current.find('<');
        // Trait-object bounds: `Repo + Send + Sync`
        if let Some(plus) = current.find('+') {
            if open.map_or(true, |lt| plus < lt) {
                current = current[..plus].trim();
                continue;
            }
        }

        let (base, inner) = match (open, current.rfind('>')) {
            (Some(lt), Some(gt)) if gt > lt => (&current[..lt], Some(&current[lt + 1..gt])),
            _ => (current, None),
        };
        let name = base.rsplit("::").next().unwrap_or(base).trim();

        match inner {
            Some(inner) if TRANSPARENT_WRAPPERS.contains(&name) => current = inner,
            _ => return name.to_string(),
        }
    }
}

/// `OrderRepository` -> `orderRepository`; leading acronyms such as `URLCache` stay as-is
fn decapitalize(name: &str) -> String {
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(first), Some(second)) if first.is_uppercase() && second.is_uppercase() => {
            name.to_string()
        }
        (Some(first), _) => {
            let mut out = String::with_capacity(name.len());
            out.extend(first.to_lowercase());
            out.push_str(&name[first.len_utf8()..]);
            out
        }
        (None, _) => String::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Layer {
    Service,
    DataAccess,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Service => f.write_str("service"),
            Layer::DataAccess => f.write_str("data-access"),
        }
    }
}

/// Forgets the last reported error; called on every wrapper entry
pub(crate) fn reset_reported_error() {
    with_slot(|slot| slot.reported_error = None);
}

/// Emits the single categorized line for a failed call.
///
/// An error propagating unchanged through several wrappers is reported by
/// the innermost one only.
pub(crate) fn report_error<E>(
    store: &ContextStore,
    layer: Layer,
    component: &ComponentId,
    method: &str,
    err: &E,
) where
    E: Categorize + fmt::Display + ?Sized,
{
    let category = err.category();
    let fingerprint = format!("{category}:{err}");
    let fresh = with_slot(move |slot| {
        if slot.reported_error.as_deref() == Some(fingerprint.as_str()) {
            false
        } else {
            slot.reported_error = Some(fingerprint);
            true
        }
    })
    .unwrap_or(true);

    if !fresh {
        return;
    }

    store.metrics().record_intercepted_error(category);

    if !store.config().interceptor.log_errors {
        return;
    }

    let ctx = snapshot();
    let service = ctx.service().unwrap_or("-");
    let access = ctx.access().or(ctx.last_access()).unwrap_or("-");

    if category.is_severe() {
        error!(
            target: TARGET,
            %category,
            service,
            access,
            "{} error [{}] in {}.{}: {}",
            layer,
            category,
            component,
            method,
            err
        );
    } else {
        warn!(
            target: TARGET,
            %category,
            service,
            access,
            "{} error [{}] in {}.{}: {}",
            layer,
            category,
            component,
            method,
            err
        );
    }
}
