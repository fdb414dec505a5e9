//! Pipeline tasks: adjudicators, reviewers, review scheduler, reporter, feeder

use super::Shared;
use crate::proxy::{Proxy, ProxyCrawler, Verdict};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

impl Shared {
    /// Run the judge for one proxy, isolating panics from the worker loop
    async fn run_judge(&self, worker: &str, proxy: &str) -> Option<Verdict> {
        match AssertUnwindSafe(self.judge.judge(proxy)).catch_unwind().await {
            Ok(verdict) => {
                info!(
                    worker,
                    grade = %verdict.grade,
                    status = ?verdict.status,
                    latency = %format_args!("{:.1}s", verdict.latency_secs()),
                    protocol = verdict.label(),
                    proxy,
                    "verdict"
                );
                Some(verdict)
            }
            Err(panic) => {
                error!(worker, proxy, panic = panic_message(&*panic), "judge panicked");
                None
            }
        }
    }

    /// First-time judgement of a candidate.
    ///
    /// Counts towards `total_judged` whatever the outcome. Adjudicators run
    /// this to completion even after cancellation, so every dequeued
    /// candidate is counted once.
    pub(super) async fn adjudicate(&self, worker: &str, proxy: &str) -> Option<Verdict> {
        let verdict = self.run_judge(worker, proxy).await;
        if let Some(verdict) = &verdict {
            if verdict.passed() {
                self.available.admit(proxy, verdict.protocol);
            }
        }
        self.total_judged.fetch_add(1, Ordering::Relaxed);
        verdict
    }

    /// Re-judgement of an available proxy; anything but a pass evicts it
    pub(super) async fn review(&self, worker: &str, proxy: &str) -> Option<Verdict> {
        let verdict = self.run_judge(worker, proxy).await?;
        if !verdict.passed() {
            if let Some(protocol) = self.available.evict(proxy) {
                info!(worker, proxy, %protocol, "evicted");
            }
        }
        Some(verdict)
    }

    /// Queue every currently available proxy for review, paced
    pub(super) async fn schedule_reviews(&self) -> usize {
        let snapshot = self.available.all();
        let mut queued = 0;
        for proxy in snapshot {
            time::sleep(self.config.review_pacing).await;
            match self.reviews.push(proxy).await {
                Ok(()) => queued += 1,
                Err(e) => warn!(error = %e, "review not queued"),
            }
        }
        debug!(queued, "review pass queued");
        queued
    }
}

pub(super) async fn adjudicator(shared: Arc<Shared>, id: usize, token: CancellationToken) {
    let worker = format!("adjudicator-{id:02}");
    loop {
        let proxy = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            proxy = shared.candidates.pop() => proxy,
        };
        // bounded by the judge timeout
        shared.adjudicate(&worker, &proxy).await;
    }
    debug!(worker, "stopped");
}

pub(super) async fn reviewer(shared: Arc<Shared>, id: usize, token: CancellationToken) {
    let worker = format!("reviewer-{id:02}");
    loop {
        let proxy = tokio::select! {
            _ = token.cancelled() => break,
            proxy = shared.reviews.pop() => proxy,
        };
        tokio::select! {
            _ = token.cancelled() => break,
            _ = shared.review(&worker, &proxy) => {}
        }
    }
    debug!(worker, "stopped");
}

pub(super) async fn review_scheduler(shared: Arc<Shared>, token: CancellationToken) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = time::sleep(shared.config.review_interval) => {}
        }
        tokio::select! {
            _ = token.cancelled() => break,
            _ = shared.schedule_reviews() => {}
        }
    }
}

pub(super) async fn reporter(shared: Arc<Shared>, token: CancellationToken) {
    let mut ticker = time::interval(shared.config.report_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let stats = shared.stats();
        info!(
            unjudged = stats.unjudged,
            pending_review = stats.pending_review,
            total_judged = stats.total_judged,
            http = stats.http,
            https = stats.https,
            available = stats.available,
            dropped = stats.dropped,
            "pool status"
        );
    }
}

/// Crawl every configured source and ingest what they list
async fn feed_once(shared: &Shared, crawler: &ProxyCrawler) -> usize {
    let mut ingested = 0;
    for result in crawler.crawl_sources_with_results(&shared.config.sources).await {
        if let Some(error) = &result.error {
            warn!(source = %result.source, error = %error, "crawl failed");
            continue;
        }
        debug!(source = %result.source, found = result.proxies.len(), "crawled");
        ingested += shared.ingest_all(result.proxies.iter().map(Proxy::url)).await;
    }
    ingested
}

pub(super) async fn feeder(shared: Arc<Shared>, crawler: ProxyCrawler, token: CancellationToken) {
    let mut ticker = time::interval(shared.config.feed_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        tokio::select! {
            _ = token.cancelled() => break,
            ingested = feed_once(&shared, &crawler) => info!(ingested, "sources crawled"),
        }
    }
}
