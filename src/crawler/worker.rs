//! Crawler worker loop and the reliable multicast to storage barrels.

use anyhow::{Result, bail};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::barrel::client::BarrelClient;
use crate::barrel::protocol::UpdateIndexRequest;
use crate::config::Config;
use crate::dispatcher::client::DispatcherClient;

use super::fetch::PageFetcher;
use super::types::PendingUpdate;

/// Sleep when the dispatcher's queue is empty.
pub const IDLE_SLEEP: Duration = Duration::from_secs(5);
/// Sleep between dispatcher reconnect attempts.
pub const RECONNECT_SLEEP: Duration = Duration::from_secs(10);
/// Snippet length, in tokens.
pub const SNIPPET_TOKENS: usize = 30;

const UPDATE_ATTEMPTS: usize = 3;
const UPDATE_BACKOFF: Duration = Duration::from_secs(1);

/// One crawl loop. Workers in a process share the dispatcher handle and the
/// barrel list but keep their own pending-update queues, so updates for the
/// same URL reach each barrel in the order this worker produced them.
pub struct CrawlerWorker<F: PageFetcher> {
    id: usize,
    dispatcher: DispatcherClient,
    barrels: Arc<Mutex<Vec<BarrelClient>>>,
    pending: HashMap<String, VecDeque<PendingUpdate>>,
    fetcher: Arc<F>,
    config: Config,
}

impl<F: PageFetcher> CrawlerWorker<F> {
    pub fn new(
        id: usize,
        dispatcher: DispatcherClient,
        barrels: Arc<Mutex<Vec<BarrelClient>>>,
        fetcher: Arc<F>,
        config: Config,
    ) -> Self {
        Self {
            id,
            dispatcher,
            barrels,
            pending: HashMap::new(),
            fetcher,
            config,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("[Crawler {}] started", self.id);

        loop {
            match self.dispatcher.next_url().await {
                Ok(Some(url)) => {
                    tracing::info!("[Crawler {}] processing {}", self.id, url);
                    self.process_url(&url).await;
                    self.retry_pending().await;
                }
                Ok(None) => {
                    tokio::time::sleep(IDLE_SLEEP).await;
                }
                Err(e) => {
                    tracing::warn!("[Crawler {}] lost the dispatcher: {}", self.id, e);
                    self.reconnect_dispatcher().await;
                }
            }
        }
    }

    /// Fetches and indexes one URL. A fetch failure abandons the URL: it is
    /// already in the dispatcher's visited set and will not come back.
    pub async fn process_url(&mut self, url: &str) {
        let page = match self.fetcher.fetch(url).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!("[Crawler {}] fetch of {} failed: {}", self.id, url, e);
                return;
            }
        };

        let snippet = build_snippet(&page.tokens);
        let terms: HashSet<String> = page.tokens.iter().cloned().collect();

        for link in &page.links {
            if let Err(e) = self.dispatcher.submit_url(link).await {
                // The next queue pull will notice the outage and reconnect.
                tracing::warn!("[Crawler {}] abandoning {}: {}", self.id, url, e);
                return;
            }
        }

        let update = UpdateIndexRequest {
            url: url.to_string(),
            title: page.title,
            snippet,
            terms,
            outgoing_links: page.links,
        };
        self.multicast_update(update).await;

        tracing::info!("[Crawler {}] finished {}", self.id, url);
    }

    /// Reliable multicast: every barrel gets the update, with bounded
    /// retries (backoff grows with the attempt number). A barrel that stays
    /// down gets the update queued and is removed from the active list
    /// until a later retry pass re-resolves it.
    pub async fn multicast_update(&mut self, update: UpdateIndexRequest) {
        let targets: Vec<BarrelClient> = self.barrels.lock().await.clone();

        for barrel in targets {
            let mut delivered = false;
            for attempt in 1..=UPDATE_ATTEMPTS {
                match barrel.update_index(&update).await {
                    Ok(()) => {
                        delivered = true;
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(
                            "[Crawler {}] update to {} failed (attempt {}/{}): {}",
                            self.id,
                            barrel.name,
                            attempt,
                            UPDATE_ATTEMPTS,
                            e
                        );
                        if attempt < UPDATE_ATTEMPTS {
                            tokio::time::sleep(UPDATE_BACKOFF * attempt as u32).await;
                        }
                    }
                }
            }

            if !delivered {
                tracing::warn!(
                    "[Crawler {}] queueing pending update for {} ({})",
                    self.id,
                    barrel.name,
                    update.url
                );
                self.pending
                    .entry(barrel.name.clone())
                    .or_default()
                    .push_back(PendingUpdate::new(update.clone()));

                let mut barrels = self.barrels.lock().await;
                barrels.retain(|b| b.name != barrel.name);
            }
        }
    }

    /// Drains pending queues for barrels that answer probes again. Replays
    /// strictly in FIFO order and stops a queue at the first failure so
    /// ordering is preserved for the next pass.
    pub async fn retry_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        let names: Vec<String> = self.pending.keys().cloned().collect();
        for name in names {
            let Some(url) = self.config.barrel_url(&name) else {
                continue;
            };
            let stub = BarrelClient::new(name.clone(), url);
            if !stub.probe().await {
                continue;
            }

            tracing::info!(
                "[Crawler {}] barrel {} is back; draining pending updates",
                self.id,
                name
            );

            {
                let mut barrels = self.barrels.lock().await;
                if !barrels.iter().any(|b| b.name == name) {
                    barrels.push(stub.clone());
                }
            }

            if let Some(queue) = self.pending.get_mut(&name) {
                while let Some(pending) = queue.front() {
                    match stub.update_index(&pending.update).await {
                        Ok(()) => {
                            queue.pop_front();
                        }
                        Err(e) => {
                            tracing::warn!(
                                "[Crawler {}] drain to {} stopped: {}",
                                self.id,
                                name,
                                e
                            );
                            break;
                        }
                    }
                }
                if queue.is_empty() {
                    self.pending.remove(&name);
                }
            }
        }
    }

    /// Updates queued for barrels that are currently down, per barrel name.
    pub fn pending_counts(&self) -> HashMap<String, usize> {
        self.pending
            .iter()
            .map(|(name, queue)| (name.clone(), queue.len()))
            .collect()
    }

    async fn reconnect_dispatcher(&self) {
        loop {
            if self.dispatcher.probe().await {
                tracing::info!("[Crawler {}] dispatcher reconnected", self.id);
                return;
            }
            tokio::time::sleep(RECONNECT_SLEEP).await;
        }
    }
}

/// Citation shown with search hits: the first 30 tokens, space-joined.
pub fn build_snippet(tokens: &[String]) -> String {
    tokens
        .iter()
        .take(SNIPPET_TOKENS)
        .cloned()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// Resolves the dispatcher and every reachable barrel. A crawler process
/// refuses to start without the dispatcher and at least one barrel.
pub async fn connect_services(
    config: &Config,
) -> Result<(DispatcherClient, Vec<BarrelClient>)> {
    let dispatcher = DispatcherClient::new(config.gateway_url());
    if !dispatcher.probe().await {
        bail!("dispatcher is not reachable at {}", config.gateway_url());
    }

    let mut barrels = Vec::new();
    for name in config.barrel_names() {
        let Some(url) = config.barrel_url(&name) else {
            continue;
        };
        let stub = BarrelClient::new(name.clone(), url);
        if stub.probe().await {
            barrels.push(stub);
        } else {
            tracing::warn!("Barrel {} is not reachable", name);
        }
    }

    if barrels.is_empty() {
        bail!("no storage barrels reachable");
    }

    Ok((dispatcher, barrels))
}
