//! Proxy crawler module for fetching candidate proxies from websites
//!
//! This module provides functionality for:
//! - Fetching proxy list pages from configured sources
//! - Extracting proxy entries line by line or by IP:PORT pattern
//! - Crawling many sources concurrently, one result per source

use crate::proxy::models::{Proxy, ProxyType};
use crate::proxy::parser::ProxyParser;
use crate::Result;
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Default timeout for HTTP requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default user agent for HTTP requests
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Regex pattern to match IP:PORT patterns in text
static IP_PORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}):(\d{1,5})\b")
        .expect("Invalid IP:PORT regex")
});

/// Result of crawling a single source
#[derive(Debug, Clone)]
pub struct CrawlResult {
    /// The source that was crawled
    pub source: String,
    /// Proxies extracted from the source
    pub proxies: Vec<Proxy>,
    /// Error message if crawling failed
    pub error: Option<String>,
}

impl CrawlResult {
    pub fn success(source: String, proxies: Vec<Proxy>) -> Self {
        Self {
            source,
            proxies,
            error: None,
        }
    }

    pub fn failure(source: String, error: String) -> Self {
        Self {
            source,
            proxies: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Configuration for proxy crawler
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Timeout for HTTP requests
    pub timeout: Duration,
    /// User agent for HTTP requests
    pub user_agent: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl CrawlerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A website that publishes a proxy list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySource {
    pub name: String,
    pub url: String,
    /// Scheme given to entries that do not carry one
    pub proxy_type: ProxyType,
}

impl ProxySource {
    pub fn new(name: &str, url: &str, proxy_type: ProxyType) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            proxy_type,
        }
    }

    /// A source named after its own URL
    pub fn from_url(url: &str, proxy_type: ProxyType) -> Self {
        Self::new(url, url, proxy_type)
    }
}

/// Proxy crawler for fetching proxies from websites
pub struct ProxyCrawler {
    client: Client,
}

impl ProxyCrawler {
    /// Create a new proxy crawler with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(CrawlerConfig::default())
    }

    /// Create a new proxy crawler with custom configuration
    pub fn with_config(config: CrawlerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self { client })
    }

    /// Fetch and parse proxies from a single URL
    pub async fn crawl_url(&self, url: &str, proxy_type: ProxyType) -> Result<Vec<Proxy>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let content = response.text().await?;
        Ok(Self::parse_proxies_from_text(&content, proxy_type))
    }

    /// Fetch and parse proxies from a ProxySource
    pub async fn crawl_source(&self, source: &ProxySource) -> CrawlResult {
        match self.crawl_url(&source.url, source.proxy_type.clone()).await {
            Ok(proxies) => CrawlResult::success(source.name.clone(), proxies),
            Err(e) => CrawlResult::failure(source.name.clone(), e.to_string()),
        }
    }

    /// Crawl every source concurrently, one result per source in input order
    pub async fn crawl_sources_with_results(&self, sources: &[ProxySource]) -> Vec<CrawlResult> {
        join_all(sources.iter().map(|source| self.crawl_source(source))).await
    }

    /// Parse proxies from raw text content
    ///
    /// Line-by-line parsing is tried first; if no line parses, IP:PORT pairs
    /// are extracted from anywhere in the text. Duplicates are removed.
    pub fn parse_proxies_from_text(content: &str, proxy_type: ProxyType) -> Vec<Proxy> {
        let mut proxies = ProxyParser::parse_string(content, proxy_type.clone());

        if proxies.is_empty() {
            proxies = Self::extract_proxies_with_regex(content, proxy_type);
        }

        proxies.sort_by(|a, b| (&a.host, a.port).cmp(&(&b.host, b.port)));
        proxies.dedup_by(|a, b| a.host == b.host && a.port == b.port);

        proxies
    }

    fn extract_proxies_with_regex(content: &str, proxy_type: ProxyType) -> Vec<Proxy> {
        IP_PORT_REGEX
            .captures_iter(content)
            .filter_map(|cap| {
                let host: Ipv4Addr = cap.get(1)?.as_str().parse().ok()?;
                let port: u16 = cap.get(2)?.as_str().parse().ok()?;
                if port == 0 {
                    return None;
                }
                Some(Proxy::new(host.to_string(), port, proxy_type.clone()))
            })
            .collect()
    }

    /// Get a list of common free proxy sources
    pub fn get_common_sources() -> Vec<ProxySource> {
        vec![
            ProxySource::new(
                "free-proxy-list.net",
                "https://free-proxy-list.net/",
                ProxyType::Http,
            ),
            ProxySource::new("sslproxies", "https://www.sslproxies.org/", ProxyType::Http),
            ProxySource::new("us-proxy.org", "https://www.us-proxy.org/", ProxyType::Http),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crawler_config_builder() {
        let config = CrawlerConfig::new().with_timeout(Duration::from_secs(60));

        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(
            CrawlerConfig::default().timeout,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_proxy_source_from_url() {
        let source = ProxySource::from_url("https://example.com/list.txt", ProxyType::Http);
        assert_eq!(source.name, "https://example.com/list.txt");
        assert_eq!(source.url, source.name);
    }

    #[test]
    fn test_crawl_result_failure() {
        let result =
            CrawlResult::failure("test-source".to_string(), "Connection failed".to_string());
        assert!(!result.is_success());
        assert!(result.proxies.is_empty());
        assert_eq!(result.error, Some("Connection failed".to_string()));
    }

    #[test]
    fn test_parse_proxies_from_text_with_comments() {
        let content = r#"
# HTTP Proxies
192.168.1.1:8080
# Another comment
192.168.1.2:3128
"#;
        let proxies = ProxyCrawler::parse_proxies_from_text(content, ProxyType::Http);
        assert_eq!(proxies.len(), 2);
    }

    #[test]
    fn test_parse_proxies_from_html_like_content() {
        let content = r#"
<html>
<body>
<table>
<tr><td>192.168.1.1</td><td>8080</td></tr>
</table>
Some text with 10.0.0.1:3128 embedded
</body>
</html>
"#;
        let proxies = ProxyCrawler::parse_proxies_from_text(content, ProxyType::Http);
        assert_eq!(proxies.len(), 1);
        assert_eq!(proxies[0].url(), "http://10.0.0.1:3128");
    }

    #[test]
    fn test_parse_proxies_deduplication() {
        let content = r#"
192.168.1.1:8080
192.168.1.1:8080
192.168.1.2:3128
192.168.1.1:8080
"#;
        let proxies = ProxyCrawler::parse_proxies_from_text(content, ProxyType::Http);
        assert_eq!(proxies.len(), 2);
    }

    #[test]
    fn test_extract_proxies_rejects_invalid_ip_and_port() {
        let content = "bad ip 999.999.999.999:8080, zero port 192.168.1.1:0, good 10.0.0.1:3128";
        let proxies = ProxyCrawler::extract_proxies_with_regex(content, ProxyType::Http);
        assert_eq!(proxies.len(), 1);
        assert_eq!(proxies[0].host, "10.0.0.1");
    }

    #[tokio::test]
    async fn test_crawl_source_reports_failure() {
        let crawler = ProxyCrawler::with_config(
            CrawlerConfig::new().with_timeout(Duration::from_millis(500)),
        )
        .unwrap();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let source = ProxySource::from_url(&format!("http://{addr}/list"), ProxyType::Http);
        let results = crawler.crawl_sources_with_results(&[source]).await;
        assert_eq!(results.len(), 1);
        assert!(!results[0].is_success());
    }
}
