//! Outbound log emission.

use buildtrace_shared::LogLine;

/// Receives every log line of a finished build, one call per line.
pub trait LogSink: Send + Sync {
    fn emit(&self, build_id: &str, line: &LogLine);
}

/// Production sink: one structured tracing event per line, tagged with the
/// build ID and the line's own timestamp.
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, build_id: &str, line: &LogLine) {
        tracing::info!(build_id, build_timestamp = %line.timestamp, "{}", line.line);
    }
}

/// Collects emitted lines for assertions.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct CollectSink {
    pub lines: std::sync::Mutex<Vec<(String, LogLine)>>,
}

#[cfg(test)]
impl CollectSink {
    pub fn emitted(&self) -> Vec<(String, LogLine)> {
        self.lines.lock().expect("sink lock").clone()
    }
}

#[cfg(test)]
impl LogSink for CollectSink {
    fn emit(&self, build_id: &str, line: &LogLine) {
        self.lines
            .lock()
            .expect("sink lock")
            .push((build_id.to_string(), line.clone()));
    }
}
