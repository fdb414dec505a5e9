//! Proxy pool: the validation pipeline and its lifecycle
//!
//! Producers feed the candidate queue, adjudicators admit passing
//! candidates into the available sets, the review scheduler re-submits every
//! available proxy on an interval, and reviewers evict the ones that no
//! longer pass. All of it runs as tokio tasks sharing one [`Shared`] state.

pub mod available;
pub mod queue;
mod workers;

use crate::config::PoolConfig;
use crate::error::QueueError;
use crate::proxy::{HttpJudge, Judge, ProxyCrawler};
use crate::Result;
use available::AvailableSets;
use chrono::{DateTime, Utc};
use queue::WorkQueue;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// State shared by every pipeline task
pub(crate) struct Shared {
    config: PoolConfig,
    judge: Arc<dyn Judge>,
    candidates: WorkQueue,
    reviews: WorkQueue,
    available: AvailableSets,
    total_judged: AtomicU64,
}

/// Point-in-time view of the pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub taken_at: DateTime<Utc>,
    /// Candidates waiting for an adjudicator
    pub unjudged: usize,
    /// Available proxies waiting for a reviewer
    pub pending_review: usize,
    pub total_judged: u64,
    pub http: usize,
    pub https: usize,
    pub available: usize,
    /// Candidates discarded by a drop-oldest bound
    pub dropped: u64,
}

/// Handle to a proxy pool. Cloning is cheap and shares the same pool.
#[derive(Clone)]
pub struct ProxyPool {
    shared: Arc<Shared>,
}

impl ProxyPool {
    /// Create an idle pool; nothing runs until [`ProxyPool::start`]
    pub fn new(config: PoolConfig, judge: Arc<dyn Judge>) -> Result<Self> {
        config.validate()?;

        let shared = Shared {
            candidates: WorkQueue::new("candidate", config.candidate_queue),
            reviews: WorkQueue::new("review", config.review_queue),
            available: AvailableSets::new(),
            total_judged: AtomicU64::new(0),
            judge,
            config,
        };

        Ok(Self {
            shared: Arc::new(shared),
        })
    }

    /// Create an idle pool judging with [`HttpJudge`] and `config.judge`
    pub fn with_config(config: PoolConfig) -> Result<Self> {
        let judge = Arc::new(HttpJudge::with_config(config.judge.clone()));
        Self::new(config, judge)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Queue a candidate, waiting for room if the queue blocks on overflow
    pub async fn ingest(&self, proxy: &str) -> std::result::Result<(), QueueError> {
        self.shared.candidates.push(proxy.to_string()).await
    }

    /// Queue a batch of candidates, skipping the ones the queue refuses.
    ///
    /// Returns how many were queued.
    pub async fn ingest_all<I>(&self, proxies: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        self.shared.ingest_all(proxies).await
    }

    /// Queue a candidate without waiting; usable from any thread
    pub fn try_ingest(&self, proxy: &str) -> std::result::Result<(), QueueError> {
        self.shared.candidates.try_push(proxy.to_string())
    }

    /// Every available proxy, HTTP ones first
    pub fn list_all(&self) -> Vec<String> {
        self.shared.available.all()
    }

    pub fn list_http(&self) -> Vec<String> {
        self.shared.available.http()
    }

    pub fn list_https(&self) -> Vec<String> {
        self.shared.available.https()
    }

    pub fn total_judged(&self) -> u64 {
        self.shared.total_judged.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> PoolStats {
        self.shared.stats()
    }

    /// Spawn every pipeline task on the current tokio runtime
    pub fn start(&self) -> RunningPool {
        let token = CancellationToken::new();
        let mut tasks = JoinSet::new();
        let config = &self.shared.config;

        for id in 0..config.adjudicators {
            tasks.spawn(workers::adjudicator(
                Arc::clone(&self.shared),
                id,
                token.clone(),
            ));
        }
        for id in 0..config.reviewers {
            tasks.spawn(workers::reviewer(
                Arc::clone(&self.shared),
                id,
                token.clone(),
            ));
        }
        tasks.spawn(workers::review_scheduler(
            Arc::clone(&self.shared),
            token.clone(),
        ));
        tasks.spawn(workers::reporter(Arc::clone(&self.shared), token.clone()));

        if !config.sources.is_empty() {
            match ProxyCrawler::new() {
                Ok(crawler) => {
                    tasks.spawn(workers::feeder(
                        Arc::clone(&self.shared),
                        crawler,
                        token.clone(),
                    ));
                }
                Err(e) => warn!(error = %e, "feeder disabled, crawler could not be built"),
            }
        }

        info!(
            adjudicators = config.adjudicators,
            reviewers = config.reviewers,
            sources = config.sources.len(),
            "proxy pool started"
        );

        RunningPool { token, tasks }
    }

    /// Run the pool on a dedicated thread with its own single-threaded runtime
    pub fn spawn_background(&self) -> std::io::Result<BackgroundPool> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let token = CancellationToken::new();

        let pool = self.clone();
        let stop = token.clone();
        let thread = thread::Builder::new()
            .name("pool-core".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    let running = pool.start();
                    stop.cancelled().await;
                    running.shutdown().await;
                });
            })?;

        Ok(BackgroundPool {
            pool: self.clone(),
            token,
            thread: Some(thread),
        })
    }
}

impl Shared {
    async fn ingest_all<I>(&self, proxies: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let mut queued = 0;
        for proxy in proxies {
            match self.candidates.push(proxy).await {
                Ok(()) => queued += 1,
                Err(e) => warn!(error = %e, "candidate not queued"),
            }
        }
        queued
    }

    fn stats(&self) -> PoolStats {
        let (http, https) = self.available.counts();
        PoolStats {
            taken_at: Utc::now(),
            unjudged: self.candidates.len(),
            pending_review: self.reviews.len(),
            total_judged: self.total_judged.load(Ordering::Relaxed),
            http,
            https,
            available: http + https,
            dropped: self.candidates.dropped(),
        }
    }
}

/// Pipeline tasks running on a tokio runtime
pub struct RunningPool {
    token: CancellationToken,
    tasks: JoinSet<()>,
}

impl RunningPool {
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel every task and wait for them to finish
    pub async fn shutdown(mut self) {
        self.token.cancel();
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    error!(error = %e, "pool task panicked");
                }
            }
        }
        info!("proxy pool stopped");
    }
}

/// A pool running on its own thread
pub struct BackgroundPool {
    pool: ProxyPool,
    token: CancellationToken,
    thread: Option<thread::JoinHandle<()>>,
}

impl BackgroundPool {
    pub fn pool(&self) -> &ProxyPool {
        &self.pool
    }

    /// Stop the pipeline and join the background thread
    pub fn stop(mut self) {
        self.join();
    }

    fn join(&mut self) {
        self.token.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("pool thread panicked");
            }
        }
    }
}

impl Drop for BackgroundPool {
    fn drop(&mut self) {
        self.join();
    }
}
