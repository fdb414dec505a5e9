//! Proxy module for describing, finding and judging proxies
//!
//! This module provides functionality for:
//! - Parsing proxies from various formats into canonical URIs
//! - Crawling proxy websites to extract candidate lists
//! - Judging a proxy with the two-probe protocol

pub mod crawler;
pub mod judge;
pub mod models;
pub mod parser;

pub use crawler::{CrawlResult, CrawlerConfig, ProxyCrawler, ProxySource};
pub use judge::{HttpJudge, Judge};
pub use models::{Grade, Protocol, Proxy, ProxyAuth, ProxyType, Verdict, NON_OK_LATENCY};
pub use parser::ProxyParser;
