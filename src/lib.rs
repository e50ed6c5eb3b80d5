pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod interceptor;
pub mod listener;
pub mod logging;
pub mod metrics;
pub mod persistence;
pub mod tagger;
pub mod unit_of_work;

#[cfg(test)]
pub(crate) mod test_utils;

pub use context::{current_tag, CallTag, ContextStore};
pub use error::{Categorize, ErrorCategory, Result, TaggerError};
pub use interceptor::{ComponentId, DataAccessInterceptor, ServiceInterceptor};
pub use listener::{LifecycleEvent, LifecycleListener, Operation, Phase, Record, TaggingListener};
pub use tagger::Tagger;
pub use unit_of_work::{LocalUnitOfWorkManager, NoUnitOfWork, UnitOfWork, UnitOfWorkManager};
