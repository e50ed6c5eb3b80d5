#![allow(dead_code)]

use std::io;
use std::sync::{Arc, Mutex};

use call_chain_tagger::context;
use call_chain_tagger::listener::{LifecycleEvent, LifecycleListener, Operation, Phase, Record};
use tracing_subscriber::fmt::MakeWriter;

/// Listener that records every notification together with the tag visible
/// at that moment
#[derive(Default)]
pub struct TagRecorder {
    seen: Mutex<Vec<(Operation, Phase, String, Option<String>)>>,
}

impl TagRecorder {
    pub fn seen(&self) -> Vec<(Operation, Phase, String, Option<String>)> {
        self.seen.lock().unwrap().clone()
    }

    pub fn tags(&self) -> Vec<Option<String>> {
        self.seen().into_iter().map(|(_, _, _, tag)| tag).collect()
    }
}

impl LifecycleListener for TagRecorder {
    fn on_event(&self, event: &LifecycleEvent<'_>) {
        self.seen.lock().unwrap().push((
            event.operation,
            event.phase,
            event.record_kind.to_string(),
            context::current_tag().map(|t| t.into_string()),
        ));
    }
}

pub struct Order(pub u64);

impl Record for Order {
    fn record_kind(&self) -> &str {
        "shop::Order"
    }

    fn record_id(&self) -> Option<String> {
        Some(self.0.to_string())
    }
}

#[derive(Clone, Default)]
pub struct Logs(Arc<Mutex<Vec<u8>>>);

impl Logs {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.text().lines().filter(|l| l.contains(needle)).count()
    }
}

pub struct LogsWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogsWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Logs {
    type Writer = LogsWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogsWriter(self.0.clone())
    }
}

pub fn with_logs<R>(f: impl FnOnce() -> R) -> (R, Logs) {
    let logs = Logs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .without_time()
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, logs)
}
