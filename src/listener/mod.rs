//! Persistence event listener
//!
//! Receives lifecycle notifications from the persistence engine and emits one
//! diagnostic line per notification, correlated with the current call tag.
//! Nothing in here may disturb the operation being observed: label failures
//! fall back to the raw type name and panics are contained and demoted to
//! `debug!`.
//!
//! Line format:
//!
//! ```text
//! <VERB> <RecordKind> <storage_label> <before|after> tag=<service.method.access.method>
//! ```

pub mod label;

use std::any::type_name;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use regex::RegexSet;
use tracing::{debug, info, trace};

use crate::config::{compile_tracked_kinds, EventLevel, TaggerConfig};
use crate::context::{self, CallTag};
use crate::error::Result;
use crate::metrics::TaggerMetrics;

pub use label::{derive_storage_label, short_name, snake_case, LabelError};

const TARGET: &str = "call_chain_tagger::listener";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Update,
    Delete,
    Load,
}

impl Operation {
    pub fn verb(&self) -> &'static str {
        match self {
            Operation::Create => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
            Operation::Load => "SELECT",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Before,
    After,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Before => f.write_str("before"),
            Phase::After => f.write_str("after"),
        }
    }
}

/// Something the persistence engine stores
pub trait Record {
    /// Type name of the record; module path and generics are tolerated
    fn record_kind(&self) -> &str {
        type_name::<Self>()
    }

    fn record_id(&self) -> Option<String> {
        None
    }
}

/// One lifecycle notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent<'a> {
    pub operation: Operation,
    pub phase: Phase,
    pub record_kind: &'a str,
    pub record_id: Option<String>,
}

impl<'a> LifecycleEvent<'a> {
    pub fn new(operation: Operation, phase: Phase, record_kind: &'a str) -> Self {
        Self {
            operation,
            phase,
            record_kind,
            record_id: None,
        }
    }

    pub fn for_record<R: Record + ?Sized>(
        operation: Operation,
        phase: Phase,
        record: &'a R,
    ) -> Self {
        Self {
            operation,
            phase,
            record_kind: record.record_kind(),
            record_id: record.record_id(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.record_id = Some(id.into());
        self
    }

    /// Before-load notifications carry nothing worth reporting
    pub fn is_observed(&self) -> bool {
        !(self.operation == Operation::Load && self.phase == Phase::Before)
    }
}

/// Hook called by the persistence engine around each record operation.
///
/// Implementations must not fail or panic into the caller.
pub trait LifecycleListener: Send + Sync {
    fn on_event(&self, event: &LifecycleEvent<'_>);
}

#[derive(Debug, Clone)]
struct KindLabels {
    short: String,
    storage: String,
}

/// Listener that writes tagged diagnostic lines through `tracing`
pub struct TaggingListener {
    config: Arc<ArcSwap<TaggerConfig>>,
    metrics: Arc<TaggerMetrics>,
    labels: DashMap<String, KindLabels>,
    tracked: ArcSwap<Option<RegexSet>>,
}

impl TaggingListener {
    pub fn new(config: Arc<ArcSwap<TaggerConfig>>, metrics: Arc<TaggerMetrics>) -> Result<Self> {
        let tracked = compile_tracked_kinds(&config.load().listener.tracked_kinds)?;
        Ok(Self {
            config,
            metrics,
            labels: DashMap::new(),
            tracked: ArcSwap::from_pointee(tracked),
        })
    }

    /// Recompiles the tracked-kind filter from the current configuration
    pub fn reload(&self) -> Result<()> {
        let tracked = compile_tracked_kinds(&self.config.load().listener.tracked_kinds)?;
        self.tracked.store(Arc::new(tracked));
        debug!(target: TARGET, "tracked record kinds reloaded");
        Ok(())
    }

    pub fn cached_labels(&self) -> usize {
        self.labels.len()
    }

    fn handle(&self, event: &LifecycleEvent<'_>) {
        let config = self.config.load();
        if !config.listener_active() || !event.is_observed() {
            return;
        }

        let labels = self.labels_for(event.record_kind);
        if !self.is_tracked(&labels.short) {
            return;
        }

        let Some(tag) = context::current_tag() else {
            self.metrics.record_event(false);
            trace!(
                target: TARGET,
                "{} {} {} untagged",
                event.operation,
                labels.short,
                event.phase
            );
            return;
        };

        self.metrics.record_event(true);
        let level = config.listener.event_level;
        let id = event.record_id.as_deref().unwrap_or("-");

        emit(
            level,
            id,
            &tag,
            format_args!(
                "{} {} {} {} tag={}",
                event.operation, labels.short, labels.storage, event.phase, tag
            ),
        );

        let completed_write = event.phase == Phase::After
            && matches!(event.operation, Operation::Create | Operation::Update);
        if completed_write && config.listener.confirmation_lines {
            emit(
                level,
                id,
                &tag,
                format_args!(
                    "{} {} completed in {} tag={}",
                    event.operation, labels.short, labels.storage, tag
                ),
            );
        }
    }

    fn labels_for(&self, raw: &str) -> KindLabels {
        if let Some(hit) = self.labels.get(raw) {
            return hit.clone();
        }

        let labels = match short_name(raw) {
            Ok(short) => KindLabels {
                short: short.to_string(),
                storage: snake_case(short),
            },
            Err(e) => {
                debug!(target: TARGET, "storage label fallback for {}: {}", raw, e);
                KindLabels {
                    short: raw.to_string(),
                    storage: raw.to_string(),
                }
            }
        };
        self.labels.insert(raw.to_string(), labels.clone());
        labels
    }

    fn is_tracked(&self, short: &str) -> bool {
        let tracked = self.tracked.load();
        match &**tracked {
            Some(set) => set.is_match(short),
            None => true,
        }
    }
}

impl LifecycleListener for TaggingListener {
    fn on_event(&self, event: &LifecycleEvent<'_>) {
        if panic::catch_unwind(AssertUnwindSafe(|| self.handle(event))).is_err() {
            self.metrics.record_listener_fault();
            // The sink that failed may fail again; the fault is already counted
            let _ = panic::catch_unwind(AssertUnwindSafe(|| {
                debug!(
                    target: TARGET,
                    operation = %event.operation,
                    phase = %event.phase,
                    "listener fault contained for {}",
                    event.record_kind
                );
            }));
        }
    }
}

fn emit(level: EventLevel, record_id: &str, tag: &CallTag, line: fmt::Arguments<'_>) {
    match level {
        EventLevel::Trace => trace!(target: TARGET, record_id, %tag, "{}", line),
        EventLevel::Debug => debug!(target: TARGET, record_id, %tag, "{}", line),
        EventLevel::Info => info!(target: TARGET, record_id, %tag, "{}", line),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextStore;
    use crate::test_utils::capture_logs;
    use crate::unit_of_work::NoUnitOfWork;

    mod shop {
        use super::Record;

        pub struct OrderLine {
            pub id: u64,
        }

        impl Record for OrderLine {
            fn record_id(&self) -> Option<String> {
                Some(self.id.to_string())
            }
        }

        pub struct AuditEntry;

        impl Record for AuditEntry {}
    }

    struct Fixture {
        store: ContextStore,
        listener: TaggingListener,
    }

    fn fixture(config: TaggerConfig) -> Fixture {
        let config = Arc::new(ArcSwap::from_pointee(config));
        let metrics = Arc::new(TaggerMetrics::new());
        let store = ContextStore::with_parts(
            Arc::new(NoUnitOfWork),
            metrics.clone(),
            config.clone(),
        );
        let listener = TaggingListener::new(config, metrics).unwrap();
        Fixture { store, listener }
    }

    #[test]
    fn test_tagged_create_emits_event_and_confirmation() {
        let fx = fixture(TaggerConfig::default());
        fx.store.set_service_marker("serviceA", "methodX");
        fx.store.add_access_marker("repoB", "save");

        let line = shop::OrderLine { id: 7 };
        let (_, logs) = capture_logs(|| {
            fx.listener
                .on_event(&LifecycleEvent::for_record(Operation::Create, Phase::Before, &line));
            fx.listener
                .on_event(&LifecycleEvent::for_record(Operation::Create, Phase::After, &line));
        });
        fx.store.force_clear_all();

        assert!(
            logs.contains("INSERT OrderLine order_line before tag=serviceA.methodX.repoB.save")
        );
        assert!(logs.contains("INSERT OrderLine order_line after tag=serviceA.methodX.repoB.save"));
        assert_eq!(logs.count("INSERT OrderLine completed in order_line"), 1);
        assert!(logs.contains("record_id=\"7\""));
        assert_eq!(fx.store.metrics().tagged_events.get(), 2);
    }

    #[test]
    fn test_delete_and_load_lines() {
        let fx = fixture(TaggerConfig::default());
        fx.store.set_service_marker("serviceA", "methodX");
        fx.store.add_access_marker("repoA", "find");

        let (_, logs) = capture_logs(|| {
            let entry = shop::AuditEntry;
            fx.listener
                .on_event(&LifecycleEvent::for_record(Operation::Load, Phase::Before, &entry));
            fx.listener
                .on_event(&LifecycleEvent::for_record(Operation::Load, Phase::After, &entry));
            fx.listener
                .on_event(&LifecycleEvent::for_record(Operation::Delete, Phase::After, &entry));
        });
        fx.store.force_clear_all();

        assert!(!logs.contains("SELECT AuditEntry audit_entry before"));
        assert!(
            logs.contains("SELECT AuditEntry audit_entry after tag=serviceA.methodX.repoA.find")
        );
        assert!(
            logs.contains("DELETE AuditEntry audit_entry after tag=serviceA.methodX.repoA.find")
        );
        assert_eq!(logs.count("completed in"), 0);
    }

    #[test]
    fn test_untagged_event_is_counted_not_logged() {
        let fx = fixture(TaggerConfig::default());

        let (_, logs) = capture_logs(|| {
            fx.listener
                .on_event(&LifecycleEvent::new(Operation::Update, Phase::After, "Order"));
        });

        assert!(!logs.contains("tag="));
        assert!(logs.contains("UPDATE Order after untagged"));
        assert_eq!(fx.store.metrics().untagged_events.get(), 1);
    }

    #[test]
    fn test_malformed_kind_falls_back_to_raw_name() {
        let fx = fixture(TaggerConfig::default());
        fx.store.set_service_marker("serviceA", "methodX");

        let (_, logs) = capture_logs(|| {
            fx.listener
                .on_event(&LifecycleEvent::new(Operation::Delete, Phase::Before, "Envelope<Order"));
        });
        fx.store.force_clear_all();

        assert!(logs.contains("DELETE Envelope<Order Envelope<Order before tag=serviceA.methodX"));
        assert!(logs.contains("storage label fallback"));
    }

    #[test]
    fn test_tracked_kinds_filter_and_reload() {
        let mut config = TaggerConfig::default();
        config.listener.tracked_kinds = vec!["^Order".to_string()];
        let fx = fixture(config);
        fx.store.set_service_marker("serviceA", "methodX");

        let (_, logs) = capture_logs(|| {
            fx.listener
                .on_event(&LifecycleEvent::new(Operation::Create, Phase::Before, "shop::Customer"));
            fx.listener
                .on_event(&LifecycleEvent::new(
                    Operation::Create,
                    Phase::Before,
                    "shop::OrderLine",
                ));
        });
        assert!(!logs.contains("Customer"));
        assert!(logs.contains("INSERT OrderLine"));

        let mut widened = (*fx.store.config()).clone();
        widened.listener.tracked_kinds.clear();
        fx.store.config_handle().store(Arc::new(widened));
        fx.listener.reload().unwrap();

        let (_, logs) = capture_logs(|| {
            fx.listener
                .on_event(&LifecycleEvent::new(Operation::Create, Phase::Before, "shop::Customer"));
        });
        fx.store.force_clear_all();
        assert!(logs.contains("INSERT Customer customer before"));
    }

    #[test]
    fn test_confirmation_lines_and_level_configurable() {
        let mut config = TaggerConfig::default();
        config.listener.confirmation_lines = false;
        config.listener.event_level = EventLevel::Debug;
        let fx = fixture(config);
        fx.store.set_service_marker("serviceA", "methodX");

        let (_, logs) = capture_logs(|| {
            fx.listener
                .on_event(&LifecycleEvent::new(Operation::Update, Phase::After, "Order"));
        });
        fx.store.force_clear_all();

        assert!(logs.contains("DEBUG"));
        assert!(logs.contains("UPDATE Order order after tag=serviceA.methodX"));
        assert!(!logs.contains("completed in"));
    }

    #[test]
    fn test_labels_are_cached_per_kind() {
        let fx = fixture(TaggerConfig::default());
        for _ in 0..3 {
            fx.listener
                .on_event(&LifecycleEvent::new(Operation::Load, Phase::After, "shop::Order"));
        }
        fx.listener
            .on_event(&LifecycleEvent::new(Operation::Load, Phase::After, "shop::Invoice"));
        assert_eq!(fx.listener.cached_labels(), 2);
    }

    struct PlainRecord;

    impl Record for PlainRecord {}

    #[test]
    fn test_listener_disabled_ignores_events() {
        let mut config = TaggerConfig::default();
        config.listener.enabled = false;
        let fx = fixture(config);
        fx.store.set_service_marker("serviceA", "methodX");

        let (_, logs) = capture_logs(|| {
            fx.listener.on_event(&LifecycleEvent::for_record(
                Operation::Create,
                Phase::After,
                &PlainRecord,
            ));
        });
        fx.store.force_clear_all();

        assert!(!logs.contains("INSERT"));
        assert_eq!(fx.store.metrics().tagged_events.get(), 0);
    }

    /// Log sink that fails on event lines only
    struct FailingSink;

    impl std::io::Write for FailingSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if String::from_utf8_lossy(buf).contains("tag=") {
                panic!("log sink failure");
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_fault_while_logging_is_contained() {
        let fx = fixture(TaggerConfig::default());
        fx.store.set_service_marker("serviceA", "methodX");

        let subscriber = tracing_subscriber::fmt()
            .with_writer(|| FailingSink)
            .with_max_level(tracing::Level::TRACE)
            .finish();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            tracing::subscriber::with_default(subscriber, || {
                fx.listener
                    .on_event(&LifecycleEvent::new(Operation::Create, Phase::Before, "Order"));
                fx.listener
                    .on_event(&LifecycleEvent::new(Operation::Update, Phase::Before, "Order"));
            });
        }));
        fx.store.force_clear_all();

        assert!(outcome.is_ok());
        assert_eq!(fx.store.metrics().listener_faults.get(), 2);
    }

    #[test]
    fn test_record_kind_defaults_to_type_name() {
        let entry = shop::AuditEntry;
        let event = LifecycleEvent::for_record(Operation::Load, Phase::After, &entry);
        assert!(event.record_kind.ends_with("shop::AuditEntry"));
        assert_eq!(event.record_id, None);

        let event = LifecycleEvent::new(Operation::Load, Phase::After, "Order").with_id("42");
        assert_eq!(event.record_id.as_deref(), Some("42"));
    }
}
