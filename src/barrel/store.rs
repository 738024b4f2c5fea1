//! In-memory index state of a barrel.
//!
//! Three concurrent maps (inverted index, backlinks, page metadata) plus the
//! Bloom filter that short-circuits searches. All inserts go through
//! `DashMap::entry`, so readers on other shards never observe a
//! half-inserted set; cross-key atomicity is not promised and not needed.

use anyhow::Result;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, RwLock};

use crate::bloom::BloomFilter;

use super::types::{PageRecord, SearchResult};

pub struct BarrelStore {
    inverted_index: DashMap<String, HashSet<String>>,
    backlinks: DashMap<String, HashSet<String>>,
    page_info: DashMap<String, PageRecord>,
    bloom: RwLock<BloomFilter>,
    bloom_expected_elements: usize,
    bloom_false_positive_rate: f64,
    /// Serializes state snapshots with each other; readers keep going.
    save_lock: Mutex<()>,
}

/// On-disk form of the full barrel state. The Bloom filter is deliberately
/// absent: it is rebuilt from the index keys on every load.
#[derive(Serialize, Deserialize)]
struct BarrelState {
    inverted_index: HashMap<String, HashSet<String>>,
    backlinks: HashMap<String, HashSet<String>>,
    page_info: HashMap<String, PageRecord>,
}

impl BarrelStore {
    pub fn new(bloom_expected_elements: usize, bloom_false_positive_rate: f64) -> Self {
        Self {
            inverted_index: DashMap::new(),
            backlinks: DashMap::new(),
            page_info: DashMap::new(),
            bloom: RwLock::new(BloomFilter::new(
                bloom_expected_elements,
                bloom_false_positive_rate,
            )),
            bloom_expected_elements,
            bloom_false_positive_rate,
            save_lock: Mutex::new(()),
        }
    }

    /// Conjunctive search: every term must match. Results carry the current
    /// backlink count as relevance; ordering is left to the dispatcher.
    pub fn search(&self, terms: &[String]) -> Vec<SearchResult> {
        if terms.is_empty() {
            return Vec::new();
        }

        let terms: Vec<String> = terms.iter().map(|t| t.to_lowercase()).collect();

        // A Bloom "no" is definitive, so the whole query can be cut short
        // before any index lookups.
        {
            let bloom = self.bloom.read().unwrap_or_else(|e| e.into_inner());
            for term in &terms {
                if !bloom.might_contain(term) {
                    tracing::debug!("Bloom filter rejected term '{}'", term);
                    return Vec::new();
                }
            }
        }

        let mut matching: HashSet<String> = match self.inverted_index.get(&terms[0]) {
            Some(urls) => urls.clone(),
            // The Bloom filter had a false positive for the first term.
            None => return Vec::new(),
        };

        for term in &terms[1..] {
            match self.inverted_index.get(term) {
                Some(urls) => matching.retain(|url| urls.contains(url)),
                None => return Vec::new(),
            }
            if matching.is_empty() {
                return Vec::new();
            }
        }

        matching
            .into_iter()
            .filter_map(|url| {
                let page = self.page_info.get(&url)?;
                let relevance = self
                    .backlinks
                    .get(&url)
                    .map(|sources| sources.len() as u32)
                    .unwrap_or(0);
                Some(SearchResult {
                    url: url.clone(),
                    title: page.title.clone(),
                    snippet: page.snippet.clone(),
                    relevance,
                })
            })
            .collect()
    }

    /// Applies one crawled page. Idempotent: re-indexing the same page with
    /// the same data changes nothing observable.
    pub fn update_index(
        &self,
        url: &str,
        title: &str,
        snippet: &str,
        terms: &HashSet<String>,
        outgoing_links: &HashSet<String>,
    ) {
        self.page_info.insert(
            url.to_string(),
            PageRecord {
                title: title.to_string(),
                snippet: snippet.to_string(),
            },
        );

        {
            let mut bloom = self.bloom.write().unwrap_or_else(|e| e.into_inner());
            for term in terms {
                let term = term.to_lowercase();
                bloom.add(&term);
                self.inverted_index
                    .entry(term)
                    .or_default()
                    .insert(url.to_string());
            }
        }

        for link in outgoing_links {
            self.backlinks
                .entry(link.clone())
                .or_default()
                .insert(url.to_string());
        }
    }

    /// Pages known to link to `url`. Unordered, duplicate-free.
    pub fn backlinks_of(&self, url: &str) -> Vec<String> {
        self.backlinks
            .get(url)
            .map(|sources| sources.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn word_count(&self) -> usize {
        self.inverted_index.len()
    }

    pub fn url_count(&self) -> usize {
        self.page_info.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inverted_index.is_empty() && self.page_info.is_empty()
    }

    pub fn stats_line(&self) -> String {
        let bloom = self.bloom.read().unwrap_or_else(|e| e.into_inner());
        format!(
            "Index: {} words, {} URLs. {}",
            self.word_count(),
            self.url_count(),
            bloom.stats()
        )
    }

    // -- whole-map exports, used only for peer sync ----------------------

    pub fn export_index(&self) -> HashMap<String, HashSet<String>> {
        self.inverted_index
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn export_backlinks(&self) -> HashMap<String, HashSet<String>> {
        self.backlinks
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn export_pages(&self) -> HashMap<String, PageRecord> {
        self.page_info
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Bulk-merges a peer's state into ours. Callers must follow up with
    /// [`BarrelStore::rebuild_bloom`].
    pub fn merge(
        &self,
        index: HashMap<String, HashSet<String>>,
        backlinks: HashMap<String, HashSet<String>>,
        pages: HashMap<String, PageRecord>,
    ) {
        for (term, urls) in index {
            self.inverted_index.entry(term).or_default().extend(urls);
        }
        for (target, sources) in backlinks {
            self.backlinks.entry(target).or_default().extend(sources);
        }
        for (url, page) in pages {
            self.page_info.insert(url, page);
        }
    }

    /// Replaces the Bloom filter with a fresh one seeded from every index
    /// key. Called after any bulk load.
    pub fn rebuild_bloom(&self) {
        let mut fresh = BloomFilter::new(
            self.bloom_expected_elements,
            self.bloom_false_positive_rate,
        );
        for entry in self.inverted_index.iter() {
            fresh.add(entry.key());
        }
        *self.bloom.write().unwrap_or_else(|e| e.into_inner()) = fresh;
    }

    // -- disk snapshot ---------------------------------------------------

    /// Serializes the three maps to `path`. Takes map snapshots first so
    /// concurrent readers and writers are never blocked, and writes through
    /// a temp file so a failed save leaves the previous snapshot intact.
    pub fn save_state(&self, path: &Path) -> Result<()> {
        let _guard = self.save_lock.lock().unwrap_or_else(|e| e.into_inner());

        let state = BarrelState {
            inverted_index: self.export_index(),
            backlinks: self.export_backlinks(),
            page_info: self.export_pages(),
        };

        let encoded = bincode::serialize(&state)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &encoded)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Loads a snapshot if one exists, merging it into the current maps and
    /// rebuilding the Bloom filter. Returns whether anything was loaded.
    pub fn load_state(&self, path: &Path) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }

        let bytes = std::fs::read(path)?;
        let state: BarrelState = bincode::deserialize(&bytes)?;
        self.merge(state.inverted_index, state.backlinks, state.page_info);
        self.rebuild_bloom();
        Ok(true)
    }
}
