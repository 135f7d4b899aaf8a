//! External push delivery
//!
//! Pushes never run on the request path. Callers enqueue a [`PushJob`] on a
//! bounded channel; a single worker task delivers jobs through a
//! [`PushGateway`] and records the outcome in [`PushStats`]. A full queue or a
//! failed delivery is logged and otherwise ignored.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::rooms::short;

/// Body posted to the push API for a new quote offer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteOfferPush {
    pub seller_id: String,
    pub price: f64,
    pub delivery_time: i64,
    pub description: String,
    pub currency: String,
}

/// One push to deliver
#[derive(Debug, Clone, PartialEq)]
pub struct PushJob {
    /// Recipient, for logs only
    pub user_id: String,
    /// Quote request the offer belongs to; keys the push endpoint
    pub quote_id: String,
    pub payload: QuoteOfferPush,
}

/// Outbound push transport
#[async_trait]
pub trait PushGateway: Send + Sync + 'static {
    async fn deliver(&self, job: &PushJob) -> Result<()>;
}

/// Posts jobs to `{base_url}/quotes/{quote_id}/offers`
pub struct HttpPushGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPushGateway {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build push HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PushGateway for HttpPushGateway {
    async fn deliver(&self, job: &PushJob) -> Result<()> {
        let url = format!("{}/quotes/{}/offers", self.base_url, job.quote_id);

        let response = self
            .client
            .post(&url)
            .json(&job.payload)
            .send()
            .await
            .context("Push API unreachable")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Push API returned {}: {}", status, body);
        }

        Ok(())
    }
}

/// Delivery counters, reported by the admin endpoint
#[derive(Debug, Default)]
pub struct PushStats {
    sent: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl PushStats {
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Producer side of the push queue
#[derive(Clone)]
pub struct PushQueue {
    tx: mpsc::Sender<PushJob>,
    stats: Arc<PushStats>,
}

impl PushQueue {
    /// Start the delivery worker. It exits once every `PushQueue` clone is
    /// dropped and the queue is drained.
    pub fn start(gateway: Arc<dyn PushGateway>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let stats = Arc::new(PushStats::default());
        let worker = tokio::spawn(run_worker(gateway, rx, stats.clone()));
        (Self { tx, stats }, worker)
    }

    /// Queue a job without waiting. Returns false if it was dropped.
    pub fn enqueue(&self, job: PushJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Push queue full, dropping push for quote {}", short(&job.quote_id));
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Push worker stopped, dropping push for quote {}", short(&job.quote_id));
                false
            }
        }
    }

    pub fn stats(&self) -> Arc<PushStats> {
        self.stats.clone()
    }
}

async fn run_worker(
    gateway: Arc<dyn PushGateway>,
    mut rx: mpsc::Receiver<PushJob>,
    stats: Arc<PushStats>,
) {
    debug!("Push worker started");
    while let Some(job) = rx.recv().await {
        match gateway.deliver(&job).await {
            Ok(()) => {
                stats.sent.fetch_add(1, Ordering::Relaxed);
                info!(
                    "Push sent to user {} for quote {}",
                    short(&job.user_id),
                    short(&job.quote_id)
                );
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Push failed for user {} (quote {}): {:#}",
                    short(&job.user_id),
                    short(&job.quote_id),
                    e
                );
            }
        }
    }
    info!("Push worker drained and stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        jobs: Mutex<Vec<PushJob>>,
    }

    #[async_trait]
    impl PushGateway for Recording {
        async fn deliver(&self, job: &PushJob) -> Result<()> {
            self.jobs.lock().await.push(job.clone());
            if job.payload.price < 0.0 {
                anyhow::bail!("rejected");
            }
            Ok(())
        }
    }

    fn job(price: f64) -> PushJob {
        PushJob {
            user_id: "user-1".into(),
            quote_id: "project-1".into(),
            payload: QuoteOfferPush {
                seller_id: "seller-1".into(),
                price,
                delivery_time: 7,
                description: "desc".into(),
                currency: "EUR".into(),
            },
        }
    }

    #[tokio::test]
    async fn worker_counts_outcomes_and_drains_on_close() {
        let gateway = Arc::new(Recording::default());
        let (queue, worker) = PushQueue::start(gateway.clone(), 8);
        let stats_handle = queue.stats();

        assert!(queue.enqueue(job(120.0)));
        assert!(queue.enqueue(job(-1.0)));
        drop(queue);
        worker.await.unwrap();

        assert_eq!(gateway.jobs.lock().await.len(), 2);
        assert_eq!(stats_handle.sent(), 1);
        assert_eq!(stats_handle.failed(), 1);
    }

    #[test]
    fn payload_uses_snake_case_fields() {
        let value = serde_json::to_value(&job(99.5).payload).unwrap();
        assert_eq!(value["seller_id"], "seller-1");
        assert_eq!(value["delivery_time"], 7);
        assert_eq!(value["currency"], "EUR");
    }
}
