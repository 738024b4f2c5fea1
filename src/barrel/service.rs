//! Barrel node lifecycle: identity, startup recovery, queue replica and the
//! primary's autosave loop.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::config::Config;

use super::client::BarrelClient;
use super::store::BarrelStore;
use super::types::QueueSnapshot;

pub const STATE_FILE: &str = "barrel_state_primary.bin";
pub const QUEUE_FILE: &str = "barrel_urlqueue_backup.bin";

pub struct BarrelNode {
    pub name: String,
    pub index: usize,
    /// Barrel 0 is the primary: the only node that snapshots the full index
    /// state to disk.
    pub is_primary: bool,
    pub store: BarrelStore,
    peer_names: Vec<String>,
    queue_replica: RwLock<QueueSnapshot>,
    data_dir: PathBuf,
    autosave_interval: Duration,
}

impl BarrelNode {
    pub fn new(config: &Config, index: usize) -> Self {
        let names = config.barrel_names();
        let name = names[index].clone();
        let peer_names = names.into_iter().filter(|n| *n != name).collect();

        Self {
            name,
            index,
            is_primary: index == 0,
            store: BarrelStore::new(
                config.bloom_expected_elements,
                config.bloom_false_positive_rate,
            ),
            peer_names,
            queue_replica: RwLock::new(QueueSnapshot::default()),
            data_dir: config.data_dir.clone(),
            autosave_interval: Duration::from_secs(config.barrel_autosave_interval_secs.max(1)),
        }
    }

    pub fn state_file(&self) -> PathBuf {
        self.data_dir.join(STATE_FILE)
    }

    pub fn queue_file(&self) -> PathBuf {
        self.data_dir.join(QUEUE_FILE)
    }

    /// Startup recovery, first success wins: copy a live peer's state, else
    /// load the primary's disk snapshot, else start empty. The Bloom filter
    /// is rebuilt from the index keys on every path that loads data.
    pub async fn recover(&self, peers: &[BarrelClient]) {
        for peer in peers {
            if peer.name == self.name {
                continue;
            }
            match self.sync_from_peer(peer).await {
                Ok(()) => {
                    tracing::info!(
                        "[{}] Synced from peer {}: {} words, {} URLs. {}",
                        self.name,
                        peer.name,
                        self.store.word_count(),
                        self.store.url_count(),
                        self.store.stats_line()
                    );
                    return;
                }
                Err(e) => {
                    tracing::warn!("[{}] Sync from {} failed: {}", self.name, peer.name, e);
                }
            }
        }

        match self.store.load_state(&self.state_file()) {
            Ok(true) => {
                tracing::info!(
                    "[{}] State loaded from {}: {} words, {} URLs",
                    self.name,
                    self.state_file().display(),
                    self.store.word_count(),
                    self.store.url_count()
                );
            }
            Ok(false) => {
                tracing::info!("[{}] No peers and no snapshot; starting empty", self.name);
            }
            Err(e) => {
                tracing::error!("[{}] Failed to load state snapshot: {}", self.name, e);
            }
        }
    }

    async fn sync_from_peer(&self, peer: &BarrelClient) -> Result<(), crate::error::RpcError> {
        let index = peer.export_index().await?;
        let backlinks = peer.export_backlinks().await?;
        let pages = peer.export_pages().await?;

        self.store.merge(index, backlinks, pages);
        self.store.rebuild_bloom();
        Ok(())
    }

    /// Names of the other configured barrels, used to build peer stubs.
    pub fn peer_names(&self) -> &[String] {
        &self.peer_names
    }

    /// Overwrites the local queue replica and persists it. The write lock
    /// doubles as the file mutex, so concurrent backups cannot interleave
    /// the temp file. Disk failures are logged and swallowed: the in-memory
    /// replica still serves restores.
    pub fn store_queue_backup(&self, snapshot: QueueSnapshot) {
        let mut replica = self.queue_replica.write().unwrap_or_else(|e| e.into_inner());
        *replica = snapshot;

        match bincode::serialize(&*replica) {
            Ok(encoded) => {
                let path = self.queue_file();
                let tmp = path.with_extension("tmp");
                if let Err(e) =
                    std::fs::write(&tmp, &encoded).and_then(|_| std::fs::rename(&tmp, &path))
                {
                    tracing::error!("[{}] Failed to persist queue snapshot: {}", self.name, e);
                }
            }
            Err(e) => {
                tracing::error!("[{}] Failed to encode queue snapshot: {}", self.name, e);
            }
        }
    }

    /// Returns the last known queue snapshot, reloading it from disk first
    /// when this node was cold-started since the last backup.
    pub fn restore_queue(&self) -> QueueSnapshot {
        {
            let replica = self.queue_replica.read().unwrap_or_else(|e| e.into_inner());
            if replica.coverage() > 0 {
                return replica.clone();
            }
        }

        let path = self.queue_file();
        if let Ok(bytes) = std::fs::read(&path) {
            match bincode::deserialize::<QueueSnapshot>(&bytes) {
                Ok(snapshot) => {
                    let mut replica =
                        self.queue_replica.write().unwrap_or_else(|e| e.into_inner());
                    if replica.coverage() == 0 {
                        *replica = snapshot;
                    }
                    return replica.clone();
                }
                Err(e) => {
                    tracing::error!("[{}] Corrupt queue snapshot on disk: {}", self.name, e);
                }
            }
        }

        QueueSnapshot::default()
    }

    /// Spawns the periodic state snapshot on the primary. Other barrels rely
    /// on peer sync and never write the state file.
    pub fn start(self: Arc<Self>) {
        if !self.is_primary {
            return;
        }

        let node = self;
        tokio::spawn(async move {
            tracing::info!(
                "[{}] Autosave started (every {:?})",
                node.name,
                node.autosave_interval
            );
            let mut interval = tokio::time::interval(node.autosave_interval);
            interval.tick().await; // the first tick fires immediately
            loop {
                interval.tick().await;
                match node.store.save_state(&node.state_file()) {
                    Ok(()) => tracing::info!(
                        "[{}] State saved to {}",
                        node.name,
                        node.state_file().display()
                    ),
                    Err(e) => tracing::error!("[{}] Autosave failed: {}", node.name, e),
                }
            }
        });
    }
}
