use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::ErrorCategory;

/// In-process counters for the tagging subsystem.
///
/// Each instance owns its own registry so several taggers (or tests) never
/// collide on metric names.
pub struct TaggerMetrics {
    registry: Registry,

    // Listener metrics
    pub tagged_events: IntCounter,
    pub untagged_events: IntCounter,
    pub listener_faults: IntCounter,

    // Interceptor metrics
    pub intercepted_errors: IntCounterVec,

    // Unit-of-work hook metrics
    pub completion_callbacks_registered: IntCounter,
    pub completion_callbacks_fired: IntCounter,
}

impl Default for TaggerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TaggerMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let tagged_events = IntCounter::new(
            "call_tagger_events_tagged_total",
            "Lifecycle notifications emitted with a resolvable call tag",
        )
        .expect("metric creation failed");
        let untagged_events = IntCounter::new(
            "call_tagger_events_untagged_total",
            "Lifecycle notifications observed without a call tag",
        )
        .expect("metric creation failed");
        let listener_faults = IntCounter::new(
            "call_tagger_listener_faults_total",
            "Internal listener failures contained and demoted to debug",
        )
        .expect("metric creation failed");

        let intercepted_errors = IntCounterVec::new(
            Opts::new(
                "call_tagger_intercepted_errors_total",
                "Errors observed by the service and data-access interceptors",
            ),
            &["category"],
        )
        .expect("metric creation failed");

        let completion_callbacks_registered = IntCounter::new(
            "call_tagger_completion_callbacks_registered_total",
            "Unit-of-work completion callbacks registered",
        )
        .expect("metric creation failed");
        let completion_callbacks_fired = IntCounter::new(
            "call_tagger_completion_callbacks_fired_total",
            "Unit-of-work completion callbacks fired",
        )
        .expect("metric creation failed");

        registry.register(Box::new(tagged_events.clone())).unwrap();
        registry.register(Box::new(untagged_events.clone())).unwrap();
        registry
            .register(Box::new(listener_faults.clone()))
            .unwrap();
        registry
            .register(Box::new(intercepted_errors.clone()))
            .unwrap();
        registry
            .register(Box::new(completion_callbacks_registered.clone()))
            .unwrap();
        registry
            .register(Box::new(completion_callbacks_fired.clone()))
            .unwrap();

        Self {
            registry,
            tagged_events,
            untagged_events,
            listener_faults,
            intercepted_errors,
            completion_callbacks_registered,
            completion_callbacks_fired,
        }
    }

    pub fn record_event(&self, tagged: bool) {
        if tagged {
            self.tagged_events.inc();
        } else {
            self.untagged_events.inc();
        }
    }

    pub fn record_listener_fault(&self) {
        self.listener_faults.inc();
    }

    pub fn record_intercepted_error(&self, category: ErrorCategory) {
        self.intercepted_errors
            .with_label_values(&[category.as_str()])
            .inc();
    }

    pub fn intercepted_error_count(&self, category: ErrorCategory) -> u64 {
        self.intercepted_errors
            .with_label_values(&[category.as_str()])
            .get()
    }

    pub fn record_callback_registered(&self) {
        self.completion_callbacks_registered.inc();
    }

    pub fn record_callback_fired(&self) {
        self.completion_callbacks_fired.inc();
    }

    pub fn gather_metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// Renders the registry in the Prometheus text exposition format
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&self.gather_metrics(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
