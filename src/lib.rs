//! Proxy Pool - Live Pool of Verified Proxies
//!
//! Candidates are ingested into a queue, judged by a pool of adjudicators,
//! and the passing ones are kept in protocol-partitioned available sets.
//! A review scheduler keeps re-submitting the available proxies to a pool of
//! reviewers which evict the ones that degrade or die.

pub mod config;
pub mod error;
pub mod pool;
pub mod proxy;

pub use config::{JudgeConfig, Overflow, PoolConfig, QueueBound};
pub use error::{ConfigError, ProbeError, QueueError};
pub use pool::{BackgroundPool, PoolStats, ProxyPool, RunningPool};
pub use proxy::*;

/// Application result type
pub type Result<T> = anyhow::Result<T>;
