//! Jenkins workflow-API wire format.
//!
//! Transient shapes: deserialized during one extraction call and discarded
//! once the stage tree is built. Every field defaults so a malformed or
//! partial response degrades to empty data instead of aborting the crawl.

use serde::Deserialize;

/// A relative link deeper into the Jenkins API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Link {
    #[serde(default)]
    pub href: String,
}

/// The `_links` block carried by every workflow-API document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Links {
    #[serde(default, rename = "self")]
    pub own: Link,
    #[serde(default)]
    pub log: Link,
}

/// Job wrapper document from `<build>/wfapi/describe`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobData {
    #[serde(default, rename = "_links")]
    pub links: Links,
    #[serde(default)]
    pub stages: Vec<JobStage>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub start_time_millis: i64,
    #[serde(default)]
    pub end_time_millis: i64,
    #[serde(default)]
    pub duration_millis: i64,
    #[serde(default)]
    pub queue_duration_millis: i64,
    #[serde(default)]
    pub pause_duration_millis: i64,
}

/// One stage entry in the job wrapper; its self-link leads to the execution
/// detail.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobStage {
    #[serde(default, rename = "_links")]
    pub links: Links,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub name: String,
}

/// Execution detail behind a stage's self-link.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobExecution {
    #[serde(default, rename = "_links")]
    pub links: Links,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub start_time_millis: i64,
    #[serde(default)]
    pub duration_millis: i64,
    #[serde(default)]
    pub stage_flow_nodes: Vec<FlowNode>,
}

/// One node of an execution's flow graph. `parents` point upward; the graph
/// is resolved during extraction and never persisted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowNode {
    #[serde(default, rename = "_links")]
    pub links: Links,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "parentNodes", alias = "parents")]
    pub parents: Vec<String>,
    #[serde(default)]
    pub start_time_millis: i64,
    #[serde(default)]
    pub duration_millis: i64,
    #[serde(default)]
    pub parameter_description: String,
}

/// Structured log payload behind a node or execution log link.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeLog {
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub node_status: String,
    #[serde(default)]
    pub length: i64,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub console_url: String,
}
