//! Judge module deciding whether a proxy genuinely relays traffic
//!
//! Two probes with different query values are sent through the candidate.
//! Identical identifiers in both answers mean the proxy (or something behind
//! it) served a cached body instead of relaying two requests.

use crate::config::JudgeConfig;
use crate::error::ProbeError;
use crate::proxy::models::{Protocol, Verdict};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::{Client, Proxy as ReqwestProxy};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

/// Decides pass, slow or fail for a single proxy
#[async_trait]
pub trait Judge: Send + Sync {
    async fn judge(&self, proxy: &str) -> Verdict;
}

/// Answer of a completed probe pair
#[derive(Debug)]
struct ProbePair {
    status: u16,
    cached: bool,
}

/// Judge that probes a reference JSON endpoint through the proxy
#[derive(Debug, Clone, Default)]
pub struct HttpJudge {
    config: JudgeConfig,
}

impl HttpJudge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: JudgeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &JudgeConfig {
        &self.config
    }

    /// Judge many proxies with at most `concurrency` in flight
    pub async fn judge_all(
        &self,
        proxies: Vec<String>,
        concurrency: usize,
    ) -> Vec<(String, Verdict)> {
        stream::iter(proxies)
            .map(|proxy| async move {
                let verdict = self.judge(&proxy).await;
                (proxy, verdict)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await
    }

    /// Create a reqwest client that sends everything through the proxy
    fn create_client(&self, proxy: &str) -> Result<Client, ProbeError> {
        let reqwest_proxy = ReqwestProxy::all(proxy).map_err(ProbeError::Client)?;

        Client::builder()
            .proxy(reqwest_proxy)
            .timeout(self.config.timeout)
            .build()
            .map_err(ProbeError::Client)
    }

    async fn probe(
        &self,
        client: &Client,
        protocol: Protocol,
        value: &str,
    ) -> Result<(u16, Value), ProbeError> {
        let url = self.config.probe_url(protocol.scheme(), value);
        let response = client.get(&url).send().await.map_err(ProbeError::Request)?;
        let status = response.status().as_u16();
        let body: Value = response.json().await.map_err(ProbeError::Decode)?;

        let identifier = body
            .pointer(&self.config.identifier_pointer)
            .cloned()
            .ok_or_else(|| ProbeError::MissingIdentifier {
                pointer: self.config.identifier_pointer.clone(),
            })?;

        Ok((status, identifier))
    }

    async fn probe_pair(
        &self,
        client: &Client,
        protocol: Protocol,
    ) -> Result<ProbePair, ProbeError> {
        let (_, first) = self.probe(client, protocol, &self.config.probe_value_a).await?;
        let (status, second) = self.probe(client, protocol, &self.config.probe_value_b).await?;

        Ok(ProbePair {
            status,
            cached: first == second,
        })
    }

    fn verdict(&self, protocol: Protocol, pair: ProbePair, elapsed: Duration) -> Verdict {
        Verdict::probed(
            protocol,
            pair.status,
            elapsed / 2,
            pair.cached,
            self.config.slow_threshold,
        )
    }
}

#[async_trait]
impl Judge for HttpJudge {
    async fn judge(&self, proxy: &str) -> Verdict {
        let client = match self.create_client(proxy) {
            Ok(client) => client,
            Err(e) => {
                debug!(proxy, error = %e, "proxy rejected before probing");
                return Verdict::unreachable(Duration::ZERO);
            }
        };

        let start = Instant::now();
        match self.probe_pair(&client, Protocol::Https).await {
            Ok(pair) => return self.verdict(Protocol::Https, pair, start.elapsed()),
            Err(e) => debug!(proxy, error = %e, "https probe failed, falling back to http"),
        }

        let start = Instant::now();
        match self.probe_pair(&client, Protocol::Http).await {
            Ok(pair) => self.verdict(Protocol::Http, pair, start.elapsed()),
            Err(e) => {
                debug!(proxy, error = %e, "http probe failed");
                Verdict::unreachable(start.elapsed() / 2)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::models::{Grade, NON_OK_LATENCY};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// How the fake proxy answers relayed GETs
    #[derive(Clone, Copy)]
    enum Answer {
        /// 200 with the query value echoed as identifier
        Live,
        /// 200 with the same identifier for every request
        Cached,
        /// The given status with a live body
        Status(u16),
        /// 200 with a body that is not JSON
        Garbage,
        /// Accept the request and never answer
        Hang,
    }

    /// Fake forward proxy: refuses CONNECT, relays nothing, answers GETs itself
    async fn spawn_fake_proxy(answer: Answer, delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                if let Ok((socket, _)) = listener.accept().await {
                    tokio::spawn(serve(socket, answer, delay));
                }
            }
        });

        format!("http://{addr}")
    }

    async fn serve(mut socket: TcpStream, answer: Answer, delay: Duration) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        }
        let head = String::from_utf8_lossy(&buf).to_string();

        if head.starts_with("CONNECT") {
            let _ = socket
                .write_all(b"HTTP/1.1 502 Bad Gateway\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await;
            return;
        }

        let value = head
            .split_once("vmid=")
            .map(|(_, rest)| rest.split(|c: char| c == ' ' || c == '&').next().unwrap_or(""))
            .unwrap_or("")
            .to_string();

        tokio::time::sleep(delay).await;
        let (status, body) = match answer {
            Answer::Live => (200, format!(r#"{{"data":{{"mid":{value}}}}}"#)),
            Answer::Cached => (200, r#"{"data":{"mid":1}}"#.to_string()),
            Answer::Status(code) => (code, format!(r#"{{"data":{{"mid":{value}}}}}"#)),
            Answer::Garbage => (200, "<html>blocked</html>".to_string()),
            Answer::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return;
            }
        };

        let response = format!(
            "HTTP/1.1 {status} Whatever\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = socket.write_all(response.as_bytes()).await;
    }

    fn test_judge() -> HttpJudge {
        HttpJudge::with_config(
            JudgeConfig::new()
                .with_timeout(Duration::from_millis(500))
                .with_probe_host("probe.test".to_string()),
        )
    }

    #[test]
    fn test_http_judge_default_config() {
        let judge = HttpJudge::new();
        assert_eq!(judge.config().timeout, Duration::from_secs(4));
        assert_eq!(judge.config().identifier_pointer, "/data/mid");
    }

    #[tokio::test]
    async fn test_live_proxy_passes_over_http_after_https_fallback() {
        let proxy = spawn_fake_proxy(Answer::Live, Duration::ZERO).await;
        let verdict = test_judge().judge(&proxy).await;

        assert_eq!(verdict.grade, Grade::Pass);
        assert_eq!(verdict.protocol, Protocol::Http);
        assert_eq!(verdict.status, Some(200));
        assert!(!verdict.cached);
        assert_eq!(verdict.label(), "http");
    }

    #[tokio::test]
    async fn test_identical_identifiers_are_cached_but_pass() {
        let proxy = spawn_fake_proxy(Answer::Cached, Duration::ZERO).await;
        let verdict = test_judge().judge(&proxy).await;

        assert!(verdict.cached);
        assert!(verdict.passed());
        assert_eq!(verdict.protocol, Protocol::Http);
        assert_eq!(verdict.label(), "cached");
    }

    #[tokio::test]
    async fn test_non_ok_status_fails_with_sentinel_latency() {
        let proxy = spawn_fake_proxy(Answer::Status(403), Duration::ZERO).await;
        let verdict = test_judge().judge(&proxy).await;

        assert_eq!(verdict.grade, Grade::Fail);
        assert_eq!(verdict.status, Some(403));
        assert_eq!(verdict.latency, NON_OK_LATENCY);
        assert_eq!(verdict.protocol, Protocol::Http);
    }

    #[tokio::test]
    async fn test_slow_proxy_is_graded_slow() {
        let proxy = spawn_fake_proxy(Answer::Live, Duration::from_millis(150)).await;
        let judge = HttpJudge::with_config(
            JudgeConfig::new()
                .with_timeout(Duration::from_secs(2))
                .with_slow_threshold(Duration::from_millis(50))
                .with_probe_host("probe.test".to_string()),
        );
        let verdict = judge.judge(&proxy).await;

        assert_eq!(verdict.grade, Grade::Slow);
        assert!(!verdict.passed());
        assert!(verdict.latency >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_undecodable_body_is_unreachable() {
        let proxy = spawn_fake_proxy(Answer::Garbage, Duration::ZERO).await;
        let verdict = test_judge().judge(&proxy).await;

        assert_eq!(verdict.grade, Grade::Fail);
        assert_eq!(verdict.protocol, Protocol::Unknown);
        assert_eq!(verdict.status, None);
    }

    #[tokio::test]
    async fn test_hanging_proxy_times_out() {
        let proxy = spawn_fake_proxy(Answer::Hang, Duration::ZERO).await;
        let verdict = test_judge().judge(&proxy).await;

        assert_eq!(verdict.protocol, Protocol::Unknown);
        assert!(!verdict.passed());
        assert!(verdict.latency >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_dead_and_malformed_proxies_fail() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let judge = test_judge();
        let verdict = judge.judge(&format!("http://{addr}")).await;
        assert_eq!(verdict.protocol, Protocol::Unknown);
        assert!(!verdict.passed());

        let verdict = judge.judge("not a proxy").await;
        assert_eq!(verdict.protocol, Protocol::Unknown);
        assert!(!verdict.passed());
    }

    #[tokio::test]
    async fn test_judge_all_returns_every_proxy() {
        let live = spawn_fake_proxy(Answer::Live, Duration::ZERO).await;
        let bad = spawn_fake_proxy(Answer::Status(500), Duration::ZERO).await;

        let results = test_judge()
            .judge_all(vec![live.clone(), bad.clone()], 4)
            .await;

        assert_eq!(results.len(), 2);
        let live_verdict = &results.iter().find(|(p, _)| *p == live).unwrap().1;
        let bad_verdict = &results.iter().find(|(p, _)| *p == bad).unwrap().1;
        assert!(live_verdict.passed());
        assert!(!bad_verdict.passed());
    }
}
