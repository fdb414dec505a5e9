//! Proxy and verdict data models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Latency reported for a probe answered with a non-200 status
pub const NON_OK_LATENCY: Duration = Duration::from_millis(9900);

/// Proxy type enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProxyType {
    #[default]
    Http,
    Https,
    Socks4,
    Socks5,
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyType::Http => write!(f, "http"),
            ProxyType::Https => write!(f, "https"),
            ProxyType::Socks4 => write!(f, "socks4"),
            ProxyType::Socks5 => write!(f, "socks5"),
        }
    }
}

/// Proxy authentication credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

impl ProxyAuth {
    pub fn new(username: String, password: String) -> Self {
        Self { username, password }
    }
}

/// A parsed proxy descriptor.
///
/// The pool itself only ever stores the canonical URI from [`Proxy::url`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proxy {
    pub host: String,
    pub port: u16,
    pub proxy_type: ProxyType,
    pub auth: Option<ProxyAuth>,
}

impl Proxy {
    /// Create a new proxy without authentication
    pub fn new(host: String, port: u16, proxy_type: ProxyType) -> Self {
        Self {
            host,
            port,
            proxy_type,
            auth: None,
        }
    }

    /// Create a new proxy with authentication
    pub fn with_auth(
        host: String,
        port: u16,
        proxy_type: ProxyType,
        username: String,
        password: String,
    ) -> Self {
        Self {
            host,
            port,
            proxy_type,
            auth: Some(ProxyAuth::new(username, password)),
        }
    }

    /// Canonical URI, the key the pool uses for this proxy
    pub fn url(&self) -> String {
        let auth_part = self.auth.as_ref().map_or(String::new(), |auth| {
            format!("{}:{}@", auth.username, auth.password)
        });

        format!("{}://{}{}:{}", self.proxy_type, auth_part, self.host, self.port)
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url())
    }
}

/// Transport a verdict was obtained over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
    /// No attempt got a response
    Unknown,
}

impl Protocol {
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// Latency class of a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grade {
    Pass,
    /// Status 200 but above the slow threshold
    Slow,
    Fail,
}

impl Grade {
    /// The one classification both adjudicators and reviewers rely on
    pub fn classify(status: Option<u16>, latency: Duration, slow_threshold: Duration) -> Self {
        match status {
            Some(200) if latency <= slow_threshold => Grade::Pass,
            Some(200) => Grade::Slow,
            _ => Grade::Fail,
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grade::Pass => write!(f, "PASS"),
            Grade::Slow => write!(f, "SLOW"),
            Grade::Fail => write!(f, "FAIL"),
        }
    }
}

/// Outcome of one judge invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub grade: Grade,
    /// Status of the last probe, if any response came back
    pub status: Option<u16>,
    /// Per-request latency estimate
    #[serde(with = "latency_secs")]
    pub latency: Duration,
    pub protocol: Protocol,
    /// Both probes returned the same identifier
    pub cached: bool,
}

impl Verdict {
    /// Verdict for a completed probe pair
    pub fn probed(
        protocol: Protocol,
        status: u16,
        latency: Duration,
        cached: bool,
        slow_threshold: Duration,
    ) -> Self {
        let latency = if status == 200 || cached {
            latency
        } else {
            NON_OK_LATENCY
        };
        Self {
            grade: Grade::classify(Some(status), latency, slow_threshold),
            status: Some(status),
            latency,
            protocol,
            cached,
        }
    }

    /// Verdict for a proxy no attempt could get through
    pub fn unreachable(latency: Duration) -> Self {
        Self {
            grade: Grade::Fail,
            status: None,
            latency,
            protocol: Protocol::Unknown,
            cached: false,
        }
    }

    pub fn pass(protocol: Protocol, latency: Duration) -> Self {
        Self {
            grade: Grade::Pass,
            status: Some(200),
            latency,
            protocol,
            cached: false,
        }
    }

    pub fn fail(protocol: Protocol) -> Self {
        Self {
            grade: Grade::Fail,
            status: None,
            latency: NON_OK_LATENCY,
            protocol,
            cached: false,
        }
    }

    pub fn passed(&self) -> bool {
        self.grade == Grade::Pass
    }

    pub fn latency_secs(&self) -> f64 {
        self.latency.as_secs_f64()
    }

    /// Four-way label: cached, or the transport protocol
    pub fn label(&self) -> &'static str {
        if self.cached {
            "cached"
        } else {
            self.protocol.scheme()
        }
    }
}

mod latency_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(latency: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(latency.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
