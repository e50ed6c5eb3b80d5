//! Call-chain context
//!
//! Holds, per call, the identity of the outermost business-service method and
//! of the most recent data-access method it invoked. Together they form the
//! [`CallTag`] attached to persistence diagnostics.
//!
//! # Storage
//!
//! - **Synchronous calls**: one slot per OS thread (`thread_local!`)
//! - **Async calls**: one slot per task, established by [`scope`]
//!   (`tokio::task_local!`)
//!
//! There is no shared map keyed by thread identity, so no call can observe
//! another call's markers.
//!
//! # State machine
//!
//! ```text
//! UNSET --set_service_marker--> SERVICE_ACTIVE --add_access_marker--> WITH_ACCESS (self-loop)
//! WITH_ACCESS --service exit, no unit of work--> UNSET
//! WITH_ACCESS --unit-of-work commit/rollback--> UNSET
//! ```
//!
//! # Example Usage
//!
//! ```rust
//! use call_chain_tagger::context::{self, ContextStore};
//! use call_chain_tagger::unit_of_work::NoUnitOfWork;
//! use std::sync::Arc;
//!
//! let store = ContextStore::new(Arc::new(NoUnitOfWork));
//! store.set_service_marker("orderService", "placeOrder");
//! store.add_access_marker("orderRepository", "save");
//! assert_eq!(
//!     context::current_tag().unwrap().as_str(),
//!     "orderService.placeOrder.orderRepository.save"
//! );
//! store.clear_service_scope();
//! assert!(context::current_tag().is_none());
//! ```

pub(crate) mod local;
pub mod store;
pub mod types;

pub use local::{in_task_scope, scope};
pub use store::{clear_access_scope, current_tag, force_clear_all, snapshot, ContextStore};
pub use types::{marker, CallContext, CallTag};
