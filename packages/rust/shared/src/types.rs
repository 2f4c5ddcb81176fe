//! Core domain types for normalized build records.
//!
//! These are the shapes persisted by every storage backend; serialized field
//! names are part of the stored format and must not change.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// LogLine
// ---------------------------------------------------------------------------

/// One line of console output, with the timestamp separated out when the
/// console markup carried one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    /// Extracted timestamp, or empty when the line carried none.
    #[serde(default)]
    pub timestamp: String,
    /// The line text with console markup stripped.
    pub line: String,
}

impl LogLine {
    /// A line with no extractable timestamp.
    pub fn bare(line: impl Into<String>) -> Self {
        Self {
            timestamp: String::new(),
            line: line.into(),
        }
    }

    /// A line with an extracted timestamp.
    pub fn stamped(timestamp: impl Into<String>, line: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            line: line.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// A node in a build's execution hierarchy.
///
/// A stage is either a leaf carrying direct `logs` or a composite carrying
/// `sub_stages`, depending on whether its source execution exposed a
/// flow-node graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub name: String,
    /// Direct log lines (leaf stages only).
    #[serde(default, rename = "log")]
    pub logs: Vec<LogLine>,
    /// Reported length of the raw log behind `logs`.
    #[serde(default)]
    pub log_length: i64,
    /// Child stages (composite stages only).
    #[serde(default, rename = "substage")]
    pub sub_stages: Vec<Stage>,
    /// Stage start, milliseconds since the Unix epoch.
    #[serde(default)]
    pub start_time: i64,
    /// Stage duration in milliseconds.
    #[serde(default)]
    pub duration: i64,
    /// Originating task label, resolved from the flow-node parent chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    /// Parameter description carried by the source flow node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// BuildRecord
// ---------------------------------------------------------------------------

/// Normalized, persisted representation of one CI build's status and log
/// hierarchy. `build_id` is the storage key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildRecord {
    /// Top-level stages, sorted ascending by `start_time` after extraction.
    #[serde(default)]
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub name: String,
    /// The CI system's own identifier for the build.
    #[serde(default)]
    pub id: String,
    /// The storage key, assigned by the trigger caller or generated.
    #[serde(default)]
    pub build_id: String,
    /// Build start, milliseconds since the Unix epoch.
    #[serde(default)]
    pub start_time: i64,
    /// Build end, milliseconds since the Unix epoch.
    #[serde(default)]
    pub end_time: i64,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub queue_duration: i64,
    #[serde(default)]
    pub pause_duration: i64,
}

impl BuildRecord {
    /// An empty placeholder record, written when a crawl is first triggered.
    pub fn placeholder(build_id: impl Into<String>) -> Self {
        Self {
            build_id: build_id.into(),
            ..Self::default()
        }
    }

    /// Whether this record's status ends the polling loop. Any non-empty
    /// status other than `IN_PROGRESS` is terminal.
    pub fn is_terminal(&self) -> bool {
        !self.status.is_empty() && self.status != "IN_PROGRESS"
    }

    /// Flatten all stage logs into one ordered list via pre-order traversal:
    /// a stage's own logs, if any, before its children's, in `sub_stages`
    /// order.
    pub fn leaf_logs(&self) -> Vec<LogLine> {
        let mut lines = Vec::new();
        let mut pending: Vec<&Stage> = self.stages.iter().rev().collect();
        while let Some(stage) = pending.pop() {
            lines.extend(stage.logs.iter().cloned());
            pending.extend(stage.sub_stages.iter().rev());
        }
        lines
    }
}
