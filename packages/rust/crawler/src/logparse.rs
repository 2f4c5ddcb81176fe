//! Console-output splitting and timestamp extraction.

use regex::Regex;

use buildtrace_shared::{BuildtraceError, LogLine, Result};

/// Splits raw console text into timestamped lines.
///
/// The capture pattern is injected per crawler flavor — Jenkins and TeamCity
/// emit different console markup — and must expose two groups: timestamp and
/// remaining line text.
#[derive(Debug, Clone)]
pub struct LogSplitter {
    pattern: Regex,
}

impl LogSplitter {
    /// Compile the capture pattern. An invalid pattern is a configuration
    /// error, fatal at crawler construction.
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| {
            BuildtraceError::config(format!("invalid log pattern '{pattern}': {e}"))
        })?;
        Ok(Self { pattern })
    }

    /// Split raw console text on line breaks, dropping lines blank after
    /// trimming. Lines that do not match the pattern keep their original
    /// content with an empty timestamp.
    pub fn split(&self, raw: &str) -> Vec<LogLine> {
        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| self.extract_timestamp(line))
            .collect()
    }

    fn extract_timestamp(&self, line: &str) -> LogLine {
        match self.pattern.captures(line) {
            Some(caps) if caps.len() > 2 => LogLine::stamped(
                caps.get(1).map_or("", |m| m.as_str()),
                caps.get(2).map_or("", |m| m.as_str()),
            ),
            _ => LogLine::bare(line),
        }
    }
}
