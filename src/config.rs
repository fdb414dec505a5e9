//! Pool and judge configuration

use crate::error::ConfigError;
use crate::proxy::ProxySource;
use std::time::Duration;

/// Default number of adjudicator workers
const DEFAULT_ADJUDICATORS: usize = 16;

/// Default number of reviewer workers
const DEFAULT_REVIEWERS: usize = 4;

/// Default interval between source crawls in seconds
const DEFAULT_FEED_INTERVAL_SECS: u64 = 600;

/// Default interval between review passes in seconds
const DEFAULT_REVIEW_INTERVAL_SECS: u64 = 60;

/// Default pause before each review enqueue in milliseconds
const DEFAULT_REVIEW_PACING_MS: u64 = 10;

/// Default interval between status reports in seconds
const DEFAULT_REPORT_INTERVAL_SECS: u64 = 30;

/// Default per-probe timeout in seconds
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 4;

/// Default slow threshold in milliseconds
const DEFAULT_SLOW_THRESHOLD_MS: u64 = 2000;

const DEFAULT_PROBE_HOST: &str = "api.bilibili.com";
const DEFAULT_PROBE_PATH: &str = "/x/relation/stat";
const DEFAULT_PROBE_PARAM: &str = "vmid";
const DEFAULT_PROBE_VALUE_A: &str = "7";
const DEFAULT_PROBE_VALUE_B: &str = "1850091";
const DEFAULT_IDENTIFIER_POINTER: &str = "/data/mid";

/// What a bounded queue does when it is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overflow {
    /// Producer waits until a slot frees up
    #[default]
    Block,
    /// Oldest queued item is discarded to make room
    DropOldest,
    /// The new item is refused with `QueueError::Full`
    Reject,
}

/// Capacity policy for a work queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueBound {
    #[default]
    Unbounded,
    Bounded { capacity: usize, overflow: Overflow },
}

impl QueueBound {
    pub fn bounded(capacity: usize, overflow: Overflow) -> Self {
        QueueBound::Bounded { capacity, overflow }
    }

    fn validate(&self, queue: &'static str) -> Result<(), ConfigError> {
        match self {
            QueueBound::Bounded { capacity: 0, .. } => Err(ConfigError::ZeroCapacity(queue)),
            _ => Ok(()),
        }
    }
}

/// Configuration for the two-probe judge
#[derive(Debug, Clone)]
pub struct JudgeConfig {
    /// Timeout for each probe request
    pub timeout: Duration,
    /// Latencies above this are graded slow
    pub slow_threshold: Duration,
    /// Host of the reference endpoint
    pub probe_host: String,
    /// Path of the reference endpoint
    pub probe_path: String,
    /// Query parameter that distinguishes the two probes
    pub probe_param: String,
    /// Query value for probe A
    pub probe_value_a: String,
    /// Query value for probe B
    pub probe_value_b: String,
    /// JSON pointer of the identifier compared between the probes
    pub identifier_pointer: String,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            slow_threshold: Duration::from_millis(DEFAULT_SLOW_THRESHOLD_MS),
            probe_host: DEFAULT_PROBE_HOST.to_string(),
            probe_path: DEFAULT_PROBE_PATH.to_string(),
            probe_param: DEFAULT_PROBE_PARAM.to_string(),
            probe_value_a: DEFAULT_PROBE_VALUE_A.to_string(),
            probe_value_b: DEFAULT_PROBE_VALUE_B.to_string(),
            identifier_pointer: DEFAULT_IDENTIFIER_POINTER.to_string(),
        }
    }
}

impl JudgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    pub fn with_probe_host(mut self, host: String) -> Self {
        self.probe_host = host;
        self
    }

    pub fn with_probe_path(mut self, path: String) -> Self {
        self.probe_path = path;
        self
    }

    /// Build the probe URL for a scheme and query value
    pub fn probe_url(&self, scheme: &str, value: &str) -> String {
        format!(
            "{}://{}{}?{}={}",
            scheme, self.probe_host, self.probe_path, self.probe_param, value
        )
    }
}

/// Configuration for the proxy pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of adjudicator workers
    pub adjudicators: usize,
    /// Number of reviewer workers
    pub reviewers: usize,
    /// Interval between source crawls
    pub feed_interval: Duration,
    /// Interval between review passes
    pub review_interval: Duration,
    /// Pause before each review enqueue
    pub review_pacing: Duration,
    /// Interval between status reports
    pub report_interval: Duration,
    /// Bound of the candidate queue
    pub candidate_queue: QueueBound,
    /// Bound of the review queue
    pub review_queue: QueueBound,
    /// Sources crawled by the feeder
    pub sources: Vec<ProxySource>,
    /// Judge settings
    pub judge: JudgeConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            adjudicators: DEFAULT_ADJUDICATORS,
            reviewers: DEFAULT_REVIEWERS,
            feed_interval: Duration::from_secs(DEFAULT_FEED_INTERVAL_SECS),
            review_interval: Duration::from_secs(DEFAULT_REVIEW_INTERVAL_SECS),
            review_pacing: Duration::from_millis(DEFAULT_REVIEW_PACING_MS),
            report_interval: Duration::from_secs(DEFAULT_REPORT_INTERVAL_SECS),
            candidate_queue: QueueBound::Unbounded,
            review_queue: QueueBound::Unbounded,
            sources: Vec::new(),
            judge: JudgeConfig::default(),
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_adjudicators(mut self, count: usize) -> Self {
        self.adjudicators = count;
        self
    }

    pub fn with_reviewers(mut self, count: usize) -> Self {
        self.reviewers = count;
        self
    }

    pub fn with_feed_interval(mut self, interval: Duration) -> Self {
        self.feed_interval = interval;
        self
    }

    pub fn with_review_interval(mut self, interval: Duration) -> Self {
        self.review_interval = interval;
        self
    }

    pub fn with_review_pacing(mut self, pacing: Duration) -> Self {
        self.review_pacing = pacing;
        self
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    pub fn with_candidate_queue(mut self, bound: QueueBound) -> Self {
        self.candidate_queue = bound;
        self
    }

    pub fn with_review_queue(mut self, bound: QueueBound) -> Self {
        self.review_queue = bound;
        self
    }

    pub fn with_sources(mut self, sources: Vec<ProxySource>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_judge(mut self, judge: JudgeConfig) -> Self {
        self.judge = judge;
        self
    }

    /// Check that every worker count, interval and capacity is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.adjudicators == 0 {
            return Err(ConfigError::ZeroWorkers("adjudicators"));
        }
        if self.reviewers == 0 {
            return Err(ConfigError::ZeroWorkers("reviewers"));
        }
        for (name, interval) in [
            ("feed_interval", self.feed_interval),
            ("review_interval", self.review_interval),
            ("report_interval", self.report_interval),
            ("judge.timeout", self.judge.timeout),
        ] {
            if interval.is_zero() {
                return Err(ConfigError::ZeroInterval(name));
            }
        }
        self.candidate_queue.validate("candidate")?;
        self.review_queue.validate("review")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.adjudicators, 16);
        assert_eq!(config.reviewers, 4);
        assert_eq!(config.feed_interval, Duration::from_secs(600));
        assert_eq!(config.review_interval, Duration::from_secs(60));
        assert_eq!(config.report_interval, Duration::from_secs(30));
        assert_eq!(config.candidate_queue, QueueBound::Unbounded);
        assert_eq!(config.judge.timeout, Duration::from_secs(4));
        assert_eq!(config.judge.slow_threshold, Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pool_config_builder() {
        let config = PoolConfig::new()
            .with_adjudicators(2)
            .with_reviewers(1)
            .with_review_interval(Duration::from_millis(50))
            .with_candidate_queue(QueueBound::bounded(8, Overflow::Reject));

        assert_eq!(config.adjudicators, 2);
        assert_eq!(config.reviewers, 1);
        assert_eq!(config.review_interval, Duration::from_millis(50));
        assert_eq!(
            config.candidate_queue,
            QueueBound::Bounded {
                capacity: 8,
                overflow: Overflow::Reject
            }
        );
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = PoolConfig::new().with_adjudicators(0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroWorkers("adjudicators"))
        );

        let config = PoolConfig::new().with_reviewers(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroWorkers("reviewers")));
    }

    #[test]
    fn test_validate_rejects_zero_capacity_and_interval() {
        let config = PoolConfig::new().with_review_queue(QueueBound::bounded(0, Overflow::Block));
        assert_eq!(config.validate(), Err(ConfigError::ZeroCapacity("review")));

        let config = PoolConfig::new().with_report_interval(Duration::ZERO);
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroInterval("report_interval"))
        );
    }

    #[test]
    fn test_probe_url() {
        let config = JudgeConfig::default();
        assert_eq!(
            config.probe_url("https", "7"),
            "https://api.bilibili.com/x/relation/stat?vmid=7"
        );

        let config = JudgeConfig::new()
            .with_probe_host("probe.test".to_string())
            .with_probe_path("/id".to_string());
        assert_eq!(config.probe_url("http", "42"), "http://probe.test/id?vmid=42");
    }
}
