//! Build crawling: polling orchestration, stage-graph extraction, and
//! console log parsing.
//!
//! [`Crawler`] is implemented once per CI system:
//! - [`JenkinsCrawler`] — polls the workflow API and resolves the
//!   stage/execution/flow-node graph into a hierarchical record
//! - [`TeamCityCrawler`] — flat variant: one build-info fetch, one raw log
//!   fetch, parsed lines forwarded straight to the sink

pub mod jenkins;
pub mod logparse;
pub mod sink;
pub mod teamcity;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use buildtrace_shared::{AppConfig, BuildtraceError, Result};
use buildtrace_storage::StoragePort;

pub use jenkins::JenkinsCrawler;
pub use logparse::LogSplitter;
pub use sink::{LogSink, TracingSink};
pub use teamcity::TeamCityCrawler;

/// User-Agent string for crawl requests.
const USER_AGENT: &str = concat!("buildtrace/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A CI-specific crawler ingesting one build per `start` call.
#[async_trait]
pub trait Crawler: Send + Sync {
    /// Begin crawling `build_uri`, storing the record under `build_id`.
    ///
    /// Returns once the crawl tasks are dispatched; the crawl itself runs in
    /// the background until a terminal status is observed. Errors only on an
    /// unusable `build_uri`.
    async fn start(&self, build_uri: &str, build_id: &str) -> Result<()>;

    /// Crawler flavor name for tracing and service metadata.
    fn name(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// Flavor selection
// ---------------------------------------------------------------------------

/// Build the crawler flavor named in the configuration.
///
/// Fails on an invalid log pattern or unknown flavor: configuration errors
/// are fatal at construction, before any crawl is accepted.
pub fn build_crawler(
    config: &AppConfig,
    storage: Arc<dyn StoragePort>,
    sink: Arc<dyn LogSink>,
) -> Result<Arc<dyn Crawler>> {
    match config.crawler.flavor.as_str() {
        "jenkins" => Ok(Arc::new(JenkinsCrawler::new(config, storage, sink)?)),
        "teamcity" => Ok(Arc::new(TeamCityCrawler::new(config, sink)?)),
        other => Err(BuildtraceError::config(format!(
            "unknown crawler flavor '{other}' (expected jenkins or teamcity)"
        ))),
    }
}

pub(crate) fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| BuildtraceError::Network(format!("failed to build HTTP client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildtrace_storage::MemoryStorage;

    #[test]
    fn jenkins_flavor_builds() {
        let config = AppConfig::default();
        let crawler = build_crawler(
            &config,
            Arc::new(MemoryStorage::new()),
            Arc::new(TracingSink),
        )
        .expect("build jenkins crawler");
        assert_eq!(crawler.name(), "jenkins");
    }

    #[test]
    fn invalid_log_pattern_is_fatal() {
        let mut config = AppConfig::default();
        config.crawler.jenkins_log_pattern = "([unclosed".into();
        let result = build_crawler(
            &config,
            Arc::new(MemoryStorage::new()),
            Arc::new(TracingSink),
        );
        assert!(result.is_err());
        assert!(result.err().unwrap().to_string().contains("config error"));
    }

    #[test]
    fn unknown_flavor_rejected() {
        let mut config = AppConfig::default();
        config.crawler.flavor = "bamboo".into();
        let result = build_crawler(
            &config,
            Arc::new(MemoryStorage::new()),
            Arc::new(TracingSink),
        );
        assert!(result.is_err());
        assert!(result.err().unwrap().to_string().contains("bamboo"));
    }
}
