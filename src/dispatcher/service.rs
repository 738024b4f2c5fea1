//! Dispatcher core logic.
//!
//! All state lives in concurrent structures so inbound RPC tasks never take
//! explicit locks beyond the short queue/log critical sections. The barrel
//! list is mutated by failover (drop) and reconnect (repopulate); every
//! iteration works on a snapshot clone so concurrent mutation is harmless.
//! The handle itself is a cheap clone over shared state, which is what the
//! detached queue-backup and stats-push tasks capture.

use dashmap::{DashMap, DashSet};
use std::collections::VecDeque;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use crate::barrel::client::BarrelClient;
use crate::barrel::types::{QueueSnapshot, SearchResult};
use crate::config::Config;
use crate::error::RpcError;

use super::protocol::StatsPush;

pub const URL_LOG_FILE: &str = "indexed_urls.log";

const RECOVERY_ATTEMPTS: usize = 5;
const RECOVERY_DELAY: Duration = Duration::from_secs(2);
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    pending: Mutex<VecDeque<String>>,
    visited: DashSet<String>,
    replicas: RwLock<Vec<BarrelClient>>,
    next_replica: AtomicI64,
    top_searches: DashMap<String, u64>,
    response_time_total: DashMap<String, u64>,
    response_count: DashMap<String, u64>,
    callbacks: DashSet<String>,
    last_digest: Mutex<String>,
    log_lock: Mutex<()>,
    http: reqwest::Client,
}

impl Dispatcher {
    /// Builds a dispatcher around an explicit replica list. No recovery is
    /// attempted; callers that want the full startup sequence use
    /// [`Dispatcher::connect`].
    pub fn with_replicas(config: Config, replicas: Vec<BarrelClient>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                pending: Mutex::new(VecDeque::new()),
                visited: DashSet::new(),
                replicas: RwLock::new(replicas),
                next_replica: AtomicI64::new(0),
                top_searches: DashMap::new(),
                response_time_total: DashMap::new(),
                response_count: DashMap::new(),
                callbacks: DashSet::new(),
                last_digest: Mutex::new(String::new()),
                log_lock: Mutex::new(()),
                http: reqwest::Client::new(),
            }),
        }
    }

    /// Full startup: recover the URL queue from whichever barrel has the
    /// richest snapshot, then connect to every reachable barrel.
    pub async fn connect(config: Config) -> Self {
        let stubs = configured_stubs(&config);
        let dispatcher = Self::with_replicas(config, Vec::new());
        dispatcher.recover_queue(&stubs).await;
        dispatcher.reconnect_replicas().await;
        dispatcher
    }

    /// Spawns the statistics monitor tick.
    pub fn start(&self) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let period = Duration::from_millis(
                dispatcher.inner.config.statistics_monitor_interval_ms.max(1),
            );
            tracing::info!("Statistics monitor started (every {:?})", period);
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // the first tick fires immediately
            loop {
                interval.tick().await;
                dispatcher.notify_if_changed().await;
            }
        });
    }

    // -- URL queue -------------------------------------------------------

    /// Accepts a URL for indexing. First submission wins: the URL enters
    /// `visited` and the crawl queue exactly once; later submissions are
    /// silent no-ops.
    pub fn submit_url(&self, url: &str) {
        if !self.inner.visited.insert(url.to_string()) {
            return;
        }

        tracing::info!("New URL queued for indexing: {}", url);
        self.inner
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(url.to_string());
        self.append_url_log(url);
        self.spawn_queue_backup();
        self.spawn_stats_push();
    }

    /// Pops the next URL for a crawler, or `None` when the queue is empty.
    pub fn next_url(&self) -> Option<String> {
        let url = self
            .inner
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        if url.is_some() {
            self.spawn_queue_backup();
            self.spawn_stats_push();
        }
        url
    }

    fn append_url_log(&self, url: &str) {
        let _guard = self.inner.log_lock.lock().unwrap_or_else(|e| e.into_inner());
        let path = self.url_log_path();
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| writeln!(file, "{}", url));
        if let Err(e) = result {
            tracing::error!("Failed to append {} to {}: {}", url, path.display(), e);
        }
    }

    pub fn url_log_path(&self) -> PathBuf {
        self.inner.config.data_dir.join(URL_LOG_FILE)
    }

    fn queue_snapshot(&self) -> QueueSnapshot {
        let pending = self
            .inner
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect();
        let visited = self.inner.visited.iter().map(|e| e.key().clone()).collect();
        QueueSnapshot { pending, visited }
    }

    /// Ships the current queue snapshot to every barrel from a detached
    /// task; the mutating caller never waits on it. Barrels that refuse the
    /// snapshot are dropped and picked up again by the next reconnect pass.
    fn spawn_queue_backup(&self) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            dispatcher.backup_queue_to_replicas().await;
        });
    }

    async fn backup_queue_to_replicas(&self) {
        let mut replicas = self.replica_snapshot();
        if replicas.is_empty() {
            self.reconnect_replicas().await;
            replicas = self.replica_snapshot();
            if replicas.is_empty() {
                tracing::warn!("No barrels reachable for queue backup");
                return;
            }
        }

        let snapshot = self.queue_snapshot();
        for replica in replicas {
            if let Err(e) = replica.backup_queue(&snapshot).await {
                tracing::warn!("Queue backup to {} failed: {}", replica.name, e);
                self.drop_replica(&replica.name);
            }
        }
    }

    /// Queries every provided barrel (with bounded retry) for its queue
    /// snapshot and seeds the queue from the one covering the most URLs.
    pub async fn recover_queue(&self, stubs: &[BarrelClient]) {
        let mut best: Option<QueueSnapshot> = None;

        for stub in stubs {
            for attempt in 1..=RECOVERY_ATTEMPTS {
                match stub.restore_queue().await {
                    Ok(snapshot) => {
                        tracing::info!(
                            "Barrel {} holds a snapshot: {} pending, {} visited",
                            stub.name,
                            snapshot.pending.len(),
                            snapshot.visited.len()
                        );
                        if best
                            .as_ref()
                            .is_none_or(|b| snapshot.coverage() > b.coverage())
                        {
                            best = Some(snapshot);
                        }
                        break;
                    }
                    Err(_) if attempt < RECOVERY_ATTEMPTS => {
                        tokio::time::sleep(RECOVERY_DELAY).await;
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Could not recover queue from {} after {} attempts: {}",
                            stub.name,
                            RECOVERY_ATTEMPTS,
                            e
                        );
                    }
                }
            }
        }

        match best {
            Some(snapshot) if snapshot.coverage() > 0 => {
                tracing::info!(
                    "URL queue recovered: {} pending, {} visited",
                    snapshot.pending.len(),
                    snapshot.visited.len()
                );
                let mut pending = self
                    .inner
                    .pending
                    .lock()
                    .unwrap_or_else(|e| e.into_inner());
                pending.extend(snapshot.pending);
                for url in snapshot.visited {
                    self.inner.visited.insert(url);
                }
            }
            _ => tracing::info!("No queue snapshot found; starting empty"),
        }
    }

    // -- replica routing -------------------------------------------------

    fn replica_snapshot(&self) -> Vec<BarrelClient> {
        self.inner
            .replicas
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn replica_count(&self) -> usize {
        self.inner
            .replicas
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    fn drop_replica(&self, name: &str) {
        let mut replicas = self
            .inner
            .replicas
            .write()
            .unwrap_or_else(|e| e.into_inner());
        replicas.retain(|replica| replica.name != name);
    }

    /// Round-robin selection. The counter only grows; the absolute value of
    /// the modulus keeps the index valid after a wrap.
    fn pick_replica(&self) -> Option<BarrelClient> {
        let replicas = self.inner.replicas.read().unwrap_or_else(|e| e.into_inner());
        if replicas.is_empty() {
            return None;
        }
        let ticket = self.inner.next_replica.fetch_add(1, Ordering::Relaxed);
        let index = (ticket.unsigned_abs() as usize) % replicas.len();
        Some(replicas[index].clone())
    }

    /// Rebuilds the replica list from the configured names, keeping only
    /// barrels that answer a probe.
    pub async fn reconnect_replicas(&self) {
        let mut connected = Vec::new();
        for stub in configured_stubs(&self.inner.config) {
            if stub.probe().await {
                tracing::info!("Connected to barrel {}", stub.name);
                connected.push(stub);
            } else {
                tracing::warn!("Barrel {} is not reachable", stub.name);
            }
        }
        if connected.is_empty() {
            tracing::warn!("No barrels reachable after reconnect pass");
        }
        *self
            .inner
            .replicas
            .write()
            .unwrap_or_else(|e| e.into_inner()) = connected;
    }

    /// Search across the cluster: lower-case and split the query, route via
    /// round-robin with failover, record response times, and return results
    /// ordered by relevance (backlink count) descending.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, RpcError> {
        let normalized = query.to_lowercase();
        let terms: Vec<String> = normalized.split_whitespace().map(str::to_string).collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        *self.inner.top_searches.entry(normalized).or_insert(0) += 1;
        self.spawn_stats_push();

        // Attempt count is fixed at entry; the list shrinking mid-loop just
        // means fewer effective tries.
        let attempts = self.replica_count().max(1);
        for _ in 0..attempts {
            let replica = match self.acquire_replica().await {
                Some(replica) => replica,
                None => return Err(RpcError::NoReplicas),
            };

            let started = Instant::now();
            match replica.search(&terms).await {
                Ok(mut results) => {
                    let elapsed = (started.elapsed().as_nanos() / 100_000) as u64;
                    *self
                        .inner
                        .response_time_total
                        .entry(replica.name.clone())
                        .or_insert(0) += elapsed;
                    *self
                        .inner
                        .response_count
                        .entry(replica.name.clone())
                        .or_insert(0) += 1;

                    results.sort_by(|a, b| b.relevance.cmp(&a.relevance));
                    return Ok(results);
                }
                Err(e) => {
                    tracing::warn!(
                        "Barrel {} failed a search: {}. Trying next.",
                        replica.name,
                        e
                    );
                    self.drop_replica(&replica.name);
                }
            }
        }

        Err(RpcError::NoReplicas)
    }

    /// Backlink lookup with the same routing policy as `search`.
    pub async fn get_backlinks(&self, url: &str) -> Result<Vec<String>, RpcError> {
        let attempts = self.replica_count().max(1);
        for _ in 0..attempts {
            let replica = match self.acquire_replica().await {
                Some(replica) => replica,
                None => return Err(RpcError::NoReplicas),
            };

            match replica.backlinks(url).await {
                Ok(links) => return Ok(links),
                Err(e) => {
                    tracing::warn!(
                        "Barrel {} failed a backlink lookup: {}. Trying next.",
                        replica.name,
                        e
                    );
                    self.drop_replica(&replica.name);
                }
            }
        }

        Err(RpcError::NoReplicas)
    }

    async fn acquire_replica(&self) -> Option<BarrelClient> {
        if let Some(replica) = self.pick_replica() {
            return Some(replica);
        }
        self.reconnect_replicas().await;
        self.pick_replica()
    }

    // -- statistics ------------------------------------------------------

    /// Builds the digest. Replica rows are live calls: a barrel that fails
    /// here renders as "Inaccessible." and is dropped from the active list.
    pub async fn build_statistics(&self) -> String {
        let mut digest = String::from("== Statistics ==\n");

        digest.push_str("\n-- Top 10 Searches --\n");
        let mut top: Vec<(String, u64)> = self
            .inner
            .top_searches
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        for (query, count) in top.into_iter().take(10) {
            digest.push_str(&format!("'{}': {} searches\n", query, count));
        }

        digest.push_str("\n-- Active Replicas --\n");
        for replica in self.replica_snapshot() {
            match replica.stats().await {
                Ok(stats) => digest.push_str(&format!("[{}] {}\n", replica.name, stats)),
                Err(_) => {
                    digest.push_str(&format!("[{}] Inaccessible.\n", replica.name));
                    self.drop_replica(&replica.name);
                }
            }
        }

        digest.push_str("\n-- Mean Response (100-µs units) --\n");
        let mut names: Vec<String> = self
            .inner
            .response_count
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        for name in names {
            let count = self
                .inner
                .response_count
                .get(&name)
                .map(|v| *v)
                .unwrap_or(0);
            let total = self
                .inner
                .response_time_total
                .get(&name)
                .map(|v| *v)
                .unwrap_or(0);
            let mean = if count == 0 { 0 } else { total / count };
            digest.push_str(&format!(
                "[{}] Mean: {} (total: {}, searches: {})\n",
                name, mean, total, count
            ));
        }

        digest
    }

    /// Registers a callback URL and immediately delivers the current digest
    /// to it. A failed initial delivery unregisters the subscriber again.
    pub async fn subscribe(&self, callback_url: &str) {
        if !self.inner.callbacks.insert(callback_url.to_string()) {
            return;
        }
        tracing::info!("Subscriber registered: {}", callback_url);

        let digest = self.build_statistics().await;
        if !self.deliver(callback_url, &digest).await {
            tracing::warn!("Initial digest delivery failed; removing {}", callback_url);
            self.inner.callbacks.remove(callback_url);
        }
    }

    pub fn unsubscribe(&self, callback_url: &str) {
        self.inner.callbacks.remove(callback_url);
        tracing::info!("Subscriber removed: {}", callback_url);
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.callbacks.len()
    }

    fn spawn_stats_push(&self) {
        if self.inner.callbacks.is_empty() {
            return;
        }
        let dispatcher = self.clone();
        tokio::spawn(async move {
            dispatcher.notify_if_changed().await;
        });
    }

    /// Rebuilds the digest and pushes it to every subscriber, but only when
    /// it differs byte-wise from the last pushed one. Sequential delivery;
    /// any failing subscriber is dropped.
    pub async fn notify_if_changed(&self) {
        if self.inner.callbacks.is_empty() {
            return;
        }

        let digest = self.build_statistics().await;
        {
            let mut last = self
                .inner
                .last_digest
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if *last == digest {
                return;
            }
            *last = digest.clone();
        }

        let subscribers: Vec<String> = self
            .inner
            .callbacks
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        tracing::info!(
            "Statistics changed; notifying {} subscriber(s)",
            subscribers.len()
        );

        for callback_url in subscribers {
            if !self.deliver(&callback_url, &digest).await {
                tracing::warn!("Removing unreachable subscriber {}", callback_url);
                self.inner.callbacks.remove(&callback_url);
            }
        }
    }

    async fn deliver(&self, callback_url: &str, digest: &str) -> bool {
        let push = StatsPush {
            digest: digest.to_string(),
        };
        matches!(
            self.inner
                .http
                .post(callback_url)
                .json(&push)
                .timeout(CALLBACK_TIMEOUT)
                .send()
                .await,
            Ok(response) if response.status().is_success()
        )
    }
}

fn configured_stubs(config: &Config) -> Vec<BarrelClient> {
    config
        .barrel_names()
        .into_iter()
        .filter_map(|name| {
            let url = config.barrel_url(&name)?;
            Some(BarrelClient::new(name, url))
        })
        .collect()
}
