//! Resolution of a build's stage/execution/flow-node graph into an ordered
//! stage tree.

use std::collections::{HashMap, HashSet};

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use buildtrace_shared::{BuildRecord, Stage};

use crate::jenkins::wire::{FlowNode, JobData, JobExecution, NodeLog};
use crate::logparse::LogSplitter;

/// Marker inside a flow node's parameter description naming the task that
/// scheduled it.
const TASK_MARKER: &str = "from task";

/// Fetches and resolves one build's execution graph.
///
/// Fetch or parse failures at any level are logged and degrade to empty data
/// for that node or stage; extraction itself never fails.
pub struct GraphExtractor {
    client: Client,
    splitter: LogSplitter,
}

impl GraphExtractor {
    pub fn new(client: Client, splitter: LogSplitter) -> Self {
        Self { client, splitter }
    }

    /// Resolve the full stage tree for the build behind `job_uri` (the job
    /// wrapper endpoint). Top-level stages come back sorted ascending by
    /// start time, ties keeping document order.
    pub async fn extract(&self, job_uri: &Url, build_id: &str) -> BuildRecord {
        let job: JobData = self.fetch_json(job_uri).await;

        let mut stages = Vec::with_capacity(job.stages.len());
        for stage in &job.stages {
            let execution = self.fetch_execution(job_uri, &stage.links.own.href).await;
            stages.push(self.stage_from_execution(&execution, job_uri).await);
        }
        stages.sort_by_key(|s| s.start_time);

        BuildRecord {
            stages,
            status: job.status,
            name: job.name,
            id: job.id,
            build_id: build_id.to_string(),
            start_time: job.start_time_millis,
            end_time: job.end_time_millis,
            duration: job.duration_millis,
            queue_duration: job.queue_duration_millis,
            pause_duration: job.pause_duration_millis,
        }
    }

    async fn fetch_execution(&self, base: &Url, href: &str) -> JobExecution {
        if href.is_empty() {
            warn!("stage entry without a self-link, skipping execution fetch");
            return JobExecution::default();
        }
        self.fetch_json(&link_url(base, href)).await
    }

    async fn stage_from_execution(&self, execution: &JobExecution, base: &Url) -> Stage {
        debug!(id = %execution.id, "resolving execution");
        if !execution.stage_flow_nodes.is_empty() {
            return self.composite_stage(execution, base).await;
        }
        if execution.links.log.href.is_empty() {
            // Neither a flow-node graph nor a log link: keep the execution's
            // identity with no output.
            return Stage {
                status: execution.status.clone(),
                name: execution.name.clone(),
                start_time: execution.start_time_millis,
                duration: execution.duration_millis,
                ..Stage::default()
            };
        }
        self.leaf_stage(execution, base).await
    }

    /// A stage whose execution exposes a flow-node graph: one child stage per
    /// node with a log link, the parent carrying no direct logs.
    async fn composite_stage(&self, execution: &JobExecution, base: &Url) -> Stage {
        let nodes_by_id: HashMap<&str, &FlowNode> = execution
            .stage_flow_nodes
            .iter()
            .map(|node| (node.id.as_str(), node))
            .collect();

        let mut children = Vec::new();
        for node in &execution.stage_flow_nodes {
            if node.links.log.href.is_empty() {
                continue;
            }
            let log_uri = link_url(base, &node.links.log.href);
            debug!(uri = %log_uri, node = %node.id, "crawling flow node log");
            let node_log: NodeLog = self.fetch_json(&log_uri).await;
            let task = resolve_task(node, &nodes_by_id);

            children.push(Stage {
                status: node_log.node_status,
                name: format!("{} - {}", execution.name, node.name),
                logs: self.splitter.split(&node_log.text),
                log_length: node_log.length,
                start_time: node.start_time_millis,
                duration: node.duration_millis,
                task: (!task.is_empty()).then_some(task),
                description: (!node.parameter_description.is_empty())
                    .then(|| node.parameter_description.clone()),
                ..Stage::default()
            });
        }

        Stage {
            status: execution.status.clone(),
            name: execution.name.clone(),
            sub_stages: children,
            start_time: execution.start_time_millis,
            duration: execution.duration_millis,
            ..Stage::default()
        }
    }

    /// A stage whose execution carries its own log link and no flow nodes.
    async fn leaf_stage(&self, execution: &JobExecution, base: &Url) -> Stage {
        let log_uri = link_url(base, &execution.links.log.href);
        let node_log: NodeLog = self.fetch_json(&log_uri).await;

        Stage {
            status: node_log.node_status,
            name: execution.name.clone(),
            logs: self.splitter.split(&node_log.text),
            log_length: node_log.length,
            start_time: execution.start_time_millis,
            duration: execution.duration_millis,
            ..Stage::default()
        }
    }

    async fn fetch_json<T>(&self, uri: &Url) -> T
    where
        T: DeserializeOwned + Default,
    {
        let response = match self.client.get(uri.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(uri = %uri, error = %e, "fetch failed, continuing with empty data");
                return T::default();
            }
        };

        if !response.status().is_success() {
            warn!(uri = %uri, status = %response.status(), "unexpected response status");
            return T::default();
        }

        match response.json::<T>().await {
            Ok(value) => value,
            Err(e) => {
                warn!(uri = %uri, error = %e, "malformed response, continuing with empty data");
                T::default()
            }
        }
    }
}

/// Rebase a workflow-API link path onto the build URI's scheme and host.
fn link_url(base: &Url, path: &str) -> Url {
    let mut uri = base.clone();
    uri.set_path(path);
    uri.set_query(None);
    uri
}

/// Resolve the task label that scheduled `node` by walking the parent chain.
///
/// A `"from task"` marker in the parameter description wins at any level; a
/// node with no parents resolves to the empty label. The walk is iterative
/// with a visited set, so a malformed graph with a parent cycle terminates
/// instead of recursing forever.
fn resolve_task(node: &FlowNode, nodes_by_id: &HashMap<&str, &FlowNode>) -> String {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut current = node;

    loop {
        if let Some((_, rest)) = current.parameter_description.split_once(TASK_MARKER) {
            return rest.trim().to_string();
        }
        let Some(parent_id) = current.parents.first() else {
            return String::new();
        };
        if !visited.insert(current.id.as_str()) {
            return String::new();
        }
        match nodes_by_id.get(parent_id.as_str()) {
            Some(parent) => current = parent,
            None => return String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn node(id: &str, parents: &[&str], description: &str) -> FlowNode {
        FlowNode {
            id: id.into(),
            parents: parents.iter().map(|p| p.to_string()).collect(),
            parameter_description: description.into(),
            ..FlowNode::default()
        }
    }

    fn index(nodes: &[FlowNode]) -> HashMap<&str, &FlowNode> {
        nodes.iter().map(|n| (n.id.as_str(), n)).collect()
    }

    // -----------------------------------------------------------------------
    // Task resolution
    // -----------------------------------------------------------------------

    #[test]
    fn task_from_own_description() {
        let nodes = [node("13", &[], "triggered from task nightly-deploy")];
        let idx = index(&nodes);
        assert_eq!(resolve_task(&nodes[0], &idx), "nightly-deploy");
    }

    #[test]
    fn task_from_parent_chain() {
        let nodes = [
            node("6", &[], "scheduled from task integration"),
            node("13", &["6"], ""),
            node("21", &["13"], "no marker here"),
        ];
        let idx = index(&nodes);
        assert_eq!(resolve_task(&nodes[2], &idx), "integration");
    }

    #[test]
    fn task_empty_without_parents_or_marker() {
        let nodes = [node("13", &[], "plain description")];
        let idx = index(&nodes);
        assert_eq!(resolve_task(&nodes[0], &idx), "");
    }

    #[test]
    fn task_empty_on_unknown_parent() {
        let nodes = [node("13", &["99"], "")];
        let idx = index(&nodes);
        assert_eq!(resolve_task(&nodes[0], &idx), "");
    }

    #[test]
    fn task_walk_terminates_on_cycle() {
        // Artificial parent cycle: 13 -> 21 -> 13
        let nodes = [node("13", &["21"], ""), node("21", &["13"], "")];
        let idx = index(&nodes);
        assert_eq!(resolve_task(&nodes[0], &idx), "");
        assert_eq!(resolve_task(&nodes[1], &idx), "");
    }

    // -----------------------------------------------------------------------
    // Extraction over HTTP
    // -----------------------------------------------------------------------

    fn extractor() -> GraphExtractor {
        GraphExtractor::new(
            reqwest::Client::new(),
            LogSplitter::new(r"\[(.*?)\]\s*(.*)").expect("pattern"),
        )
    }

    async fn mount_json(server: &MockServer, route: &str, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    fn job_uri(server: &MockServer) -> Url {
        Url::parse(&format!("{}/job/tingle/7/wfapi/describe", server.uri())).expect("uri")
    }

    #[tokio::test]
    async fn resolves_flow_node_graph_into_substages() {
        let server = MockServer::start().await;

        mount_json(
            &server,
            "/job/tingle/7/wfapi/describe",
            json!({
                "id": "7",
                "name": "#7",
                "status": "SUCCESS",
                "startTimeMillis": 1_000,
                "endTimeMillis": 9_000,
                "durationMillis": 8_000,
                "queueDurationMillis": 50,
                "pauseDurationMillis": 0,
                "stages": [
                    {"id": "6", "name": "Deploy", "status": "SUCCESS",
                     "_links": {"self": {"href": "/job/tingle/7/execution/node/6/wfapi/describe"}}}
                ]
            }),
        )
        .await;

        mount_json(
            &server,
            "/job/tingle/7/execution/node/6/wfapi/describe",
            json!({
                "id": "6",
                "name": "Deploy",
                "status": "SUCCESS",
                "startTimeMillis": 2_000,
                "durationMillis": 5_000,
                "stageFlowNodes": [
                    {"id": "13", "name": "Shell Script", "status": "SUCCESS",
                     "startTimeMillis": 2_100, "durationMillis": 400,
                     "parameterDescription": "deploy.sh from task nightly",
                     "_links": {"log": {"href": "/job/tingle/7/execution/node/13/wfapi/log"}}},
                    {"id": "21", "name": "No Log", "status": "SUCCESS",
                     "parentNodes": ["13"],
                     "_links": {}}
                ]
            }),
        )
        .await;

        mount_json(
            &server,
            "/job/tingle/7/execution/node/13/wfapi/log",
            json!({
                "nodeId": "13",
                "nodeStatus": "SUCCESS",
                "length": 26,
                "hasMore": false,
                "text": "[2020-01-01T00:00:00Z] done\n"
            }),
        )
        .await;

        let record = extractor().extract(&job_uri(&server), "b-7").await;

        assert_eq!(record.build_id, "b-7");
        assert_eq!(record.status, "SUCCESS");
        assert_eq!(record.duration, 8_000);
        assert_eq!(record.stages.len(), 1);

        let deploy = &record.stages[0];
        assert_eq!(deploy.name, "Deploy");
        assert!(deploy.logs.is_empty(), "composite stage carries no direct logs");
        // The node without a log link is skipped.
        assert_eq!(deploy.sub_stages.len(), 1);

        let child = &deploy.sub_stages[0];
        assert_eq!(child.name, "Deploy - Shell Script");
        assert_eq!(child.status, "SUCCESS");
        assert_eq!(child.log_length, 26);
        assert_eq!(child.task.as_deref(), Some("nightly"));
        assert_eq!(child.logs.len(), 1);
        assert_eq!(child.logs[0].timestamp, "2020-01-01T00:00:00Z");
        assert_eq!(child.logs[0].line, "done");
    }

    #[tokio::test]
    async fn stages_sorted_ascending_by_start_time() {
        let server = MockServer::start().await;

        // Document order is descending by start time.
        mount_json(
            &server,
            "/job/tingle/7/wfapi/describe",
            json!({
                "id": "7", "name": "#7", "status": "SUCCESS",
                "stages": [
                    {"name": "Late", "_links": {"self": {"href": "/exec/late"}}},
                    {"name": "Early", "_links": {"self": {"href": "/exec/early"}}}
                ]
            }),
        )
        .await;

        for (route, name, start) in [("/exec/late", "Late", 5_000), ("/exec/early", "Early", 1_000)]
        {
            mount_json(
                &server,
                route,
                json!({
                    "name": name,
                    "status": "SUCCESS",
                    "startTimeMillis": start,
                    "_links": {"log": {"href": format!("{route}/log")}}
                }),
            )
            .await;
            mount_json(
                &server,
                &format!("{route}/log"),
                json!({"nodeStatus": "SUCCESS", "length": 0, "text": ""}),
            )
            .await;
        }

        let record = extractor().extract(&job_uri(&server), "b-7").await;

        let names: Vec<&str> = record.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Early", "Late"]);
    }

    #[tokio::test]
    async fn execution_without_nodes_or_log_yields_empty_stage() {
        let server = MockServer::start().await;

        mount_json(
            &server,
            "/job/tingle/7/wfapi/describe",
            json!({
                "id": "7", "status": "SUCCESS",
                "stages": [{"name": "Ghost", "_links": {"self": {"href": "/exec/ghost"}}}]
            }),
        )
        .await;
        mount_json(
            &server,
            "/exec/ghost",
            json!({"name": "Ghost", "status": "NOT_EXECUTED", "startTimeMillis": 10}),
        )
        .await;

        let record = extractor().extract(&job_uri(&server), "b-7").await;

        assert_eq!(record.stages.len(), 1);
        let ghost = &record.stages[0];
        assert_eq!(ghost.status, "NOT_EXECUTED");
        assert!(ghost.logs.is_empty());
        assert!(ghost.sub_stages.is_empty());
    }

    #[tokio::test]
    async fn unreachable_job_endpoint_degrades_to_empty_record() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/job/tingle/7/wfapi/describe"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let record = extractor().extract(&job_uri(&server), "b-7").await;

        assert_eq!(record.build_id, "b-7");
        assert!(record.status.is_empty(), "empty status keeps the poll loop alive");
        assert!(record.stages.is_empty());
    }
}
