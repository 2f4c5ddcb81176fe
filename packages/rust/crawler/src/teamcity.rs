//! TeamCity crawler: flat build-log ingestion.
//!
//! Deliberately partial next to the Jenkins variant: one build-info fetch and
//! one raw log fetch, both authenticated with a bearer token, and the parsed
//! lines go straight to the sink. No hierarchical stage tree is persisted —
//! the asymmetry is existing behavior to preserve, not a gap to fill quietly.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use buildtrace_shared::{AppConfig, BuildtraceError, LogLine, Result, teamcity_token};

use crate::logparse::LogSplitter;
use crate::sink::LogSink;
use crate::{Crawler, http_client};

/// TeamCity REST build-info payload (subset).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildInfo {
    #[serde(default)]
    id: i64,
    #[serde(default)]
    build_type_id: String,
    #[serde(default)]
    number: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    start_date: String,
    #[serde(default)]
    finish_date: String,
}

/// Crawls TeamCity builds: build metadata plus the raw build log.
#[derive(Clone)]
pub struct TeamCityCrawler {
    client: reqwest::Client,
    sink: Arc<dyn LogSink>,
    splitter: LogSplitter,
    base_url: Url,
    token: String,
}

impl TeamCityCrawler {
    /// Create a crawler from configuration. Fails on an invalid log pattern,
    /// an unusable base URL, or a missing access token.
    pub fn new(config: &AppConfig, sink: Arc<dyn LogSink>) -> Result<Self> {
        let token = teamcity_token(config)?;
        Self::with_token(config, sink, token)
    }

    fn with_token(config: &AppConfig, sink: Arc<dyn LogSink>, token: String) -> Result<Self> {
        let splitter = LogSplitter::new(&config.crawler.teamcity_log_pattern)?;
        let base_url = Url::parse(&config.teamcity.base_url).map_err(|e| {
            BuildtraceError::config(format!(
                "invalid teamcity base_url '{}': {e}",
                config.teamcity.base_url
            ))
        })?;
        Ok(Self {
            client: http_client()?,
            sink,
            splitter,
            base_url,
            token,
        })
    }

    fn build_info_url(&self, build_id: &str) -> Url {
        let mut uri = self.base_url.clone();
        uri.set_path(&format!("/app/rest/builds/id:{build_id}"));
        uri.set_query(Some(
            "fields=id,buildTypeId,number,status,startDate,finishDate",
        ));
        uri
    }

    /// One crawl cycle: metadata, raw log, split, hand off for emission.
    async fn crawl_build(self, uri: Url, build_id: String, log_tx: mpsc::Sender<Vec<LogLine>>) {
        let info = self.fetch_build_info(&build_id).await;
        let raw = self.fetch_build_log(&uri).await;
        let lines = self.splitter.split(&raw);

        info!(
            build_id = %build_id,
            id = info.id,
            status = %info.status,
            number = %info.number,
            build_type = %info.build_type_id,
            started = %info.start_date,
            finished = %info.finish_date,
            lines = lines.len(),
            "build finished"
        );
        let _ = log_tx.send(lines).await;
    }

    async fn fetch_build_info(&self, build_id: &str) -> BuildInfo {
        let uri = self.build_info_url(build_id);
        match self.authorized_get(&uri).await {
            Ok(body) => serde_json::from_str(&body).unwrap_or_else(|e| {
                warn!(uri = %uri, error = %e, "malformed build info, using defaults");
                BuildInfo::default()
            }),
            Err(e) => {
                warn!(uri = %uri, error = %e, "build info fetch failed");
                BuildInfo::default()
            }
        }
    }

    async fn fetch_build_log(&self, uri: &Url) -> String {
        match self.authorized_get(uri).await {
            Ok(body) => body,
            Err(e) => {
                warn!(uri = %uri, error = %e, "build log fetch failed");
                String::new()
            }
        }
    }

    async fn authorized_get(&self, uri: &Url) -> Result<String> {
        let response = self
            .client
            .get(uri.clone())
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| BuildtraceError::Network(format!("{uri}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BuildtraceError::Network(format!("{uri}: HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| BuildtraceError::Network(format!("{uri}: body read failed: {e}")))
    }

    async fn run_log_emission(self, mut log_rx: mpsc::Receiver<Vec<LogLine>>, build_id: String) {
        while let Some(lines) = log_rx.recv().await {
            debug!("got request to emit the build logs");
            for line in &lines {
                self.sink.emit(&build_id, line);
            }
        }
    }
}

#[async_trait]
impl Crawler for TeamCityCrawler {
    fn name(&self) -> &'static str {
        "teamcity"
    }

    async fn start(&self, build_uri: &str, build_id: &str) -> Result<()> {
        let uri = Url::parse(build_uri).map_err(|e| {
            BuildtraceError::validation(format!("invalid build URI '{build_uri}': {e}"))
        })?;

        let (log_tx, log_rx) = mpsc::channel::<Vec<LogLine>>(1);
        tokio::spawn(self.clone().run_log_emission(log_rx, build_id.to_string()));
        tokio::spawn(self.clone().crawl_build(uri, build_id.to_string(), log_tx));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::sink::CollectSink;

    fn test_crawler(server_uri: &str, sink: Arc<CollectSink>) -> TeamCityCrawler {
        let mut config = AppConfig::default();
        config.teamcity.base_url = server_uri.to_string();
        TeamCityCrawler::with_token(&config, sink, "sekrit".into()).expect("crawler")
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn fetches_with_bearer_token_and_emits_lines() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/app/rest/builds/id:b-123"))
            .and(query_param(
                "fields",
                "id,buildTypeId,number,status,startDate,finishDate",
            ))
            .and(header("Authorization", "Bearer sekrit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 123,
                "buildTypeId": "Tingle_Main",
                "number": "123",
                "status": "SUCCESS",
                "startDate": "20200101T000000+0000",
                "finishDate": "20200101T000500+0000"
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/downloadBuildLog.html"))
            .and(header("Authorization", "Bearer sekrit"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("[00:00:01]Step 1/2: compile\nno stamp here\n\n"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let sink = Arc::new(CollectSink::default());
        let crawler = test_crawler(&server.uri(), sink.clone());

        let log_uri = format!("{}/downloadBuildLog.html", server.uri());
        crawler.start(&log_uri, "b-123").await.expect("start");

        wait_until(|| sink.emitted().len() >= 2).await;

        let emitted = sink.emitted();
        assert_eq!(emitted.len(), 2);
        assert!(emitted.iter().all(|(id, _)| id == "b-123"));
        assert_eq!(emitted[0].1, LogLine::stamped("00:00:01", "Step 1/2: compile"));
        assert_eq!(emitted[1].1, LogLine::bare("no stamp here"));
    }

    #[tokio::test]
    async fn unreachable_endpoints_emit_nothing_but_do_not_panic() {
        let server = MockServer::start().await;
        // No mocks mounted: both fetches fail.

        let sink = Arc::new(CollectSink::default());
        let crawler = test_crawler(&server.uri(), sink.clone());

        let log_uri = format!("{}/downloadBuildLog.html", server.uri());
        crawler.start(&log_uri, "b-404").await.expect("start");

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(sink.emitted().is_empty());
    }

    #[test]
    fn missing_token_is_fatal() {
        let mut config = AppConfig::default();
        config.teamcity.token_env = "BT_TC_TEST_MISSING_TOKEN".into();
        let result = TeamCityCrawler::new(&config, Arc::new(CollectSink::default()));
        assert!(result.is_err());
    }
}
