//! Markers held per call and the tag derived from them

use std::fmt;

/// Joins a component and a method into a `"component.method"` marker
pub fn marker(component: &str, method: &str) -> String {
    format!("{component}.{method}")
}

/// Human-readable call-chain identifier: `service.method.access.method`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallTag(String);

impl CallTag {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CallTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<&str> for CallTag {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// The four per-call fields.
///
/// `access` and `last_access` only mean something while `service` is set, or
/// right after a service exit whose clear was deferred to a unit of work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    service: Option<String>,
    access: Option<String>,
    last_access: Option<String>,
    registered: bool,
}

impl CallContext {
    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    pub fn access(&self) -> Option<&str> {
        self.access.as_deref()
    }

    pub fn last_access(&self) -> Option<&str> {
        self.last_access.as_deref()
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub fn is_empty(&self) -> bool {
        *self == CallContext::default()
    }

    /// Sets the service marker unless one is already present. Returns ownership.
    pub(crate) fn set_service(&mut self, marker: String) -> bool {
        if self.service.is_some() {
            return false;
        }
        self.service = Some(marker);
        true
    }

    pub(crate) fn push_access(&mut self, marker: String) {
        if let Some(previous) = self.access.take() {
            self.last_access = Some(previous);
        }
        self.access = Some(marker);
    }

    pub(crate) fn clear_access(&mut self) {
        self.access = None;
    }

    /// Flips the registration flag; `false` if it was already set
    pub(crate) fn claim_registration(&mut self) -> bool {
        !std::mem::replace(&mut self.registered, true)
    }

    pub(crate) fn release_registration(&mut self) {
        self.registered = false;
    }

    pub(crate) fn clear(&mut self) {
        *self = CallContext::default();
    }

    pub fn tag(&self) -> Option<CallTag> {
        let service = self.service.as_deref()?;
        match self.access.as_deref().or(self.last_access.as_deref()) {
            Some(access) => Some(CallTag(format!("{service}.{access}"))),
            None => Some(CallTag(service.to_string())),
        }
    }
}
