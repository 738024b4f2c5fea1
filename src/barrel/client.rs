//! Client stub for a single barrel.
//!
//! A thin reqwest wrapper: one method per remote operation, each returning
//! `RpcError::Unreachable` when the node cannot be reached. Read-only calls
//! retry connection-level transients with jittered backoff; mutations are
//! single-shot because their retry policies live with the callers (the
//! crawler's multicast loop, the dispatcher's failover).

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::error::RpcError;

use super::protocol::*;
use super::types::{PageRecord, QueueSnapshot, SearchResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
const EXPORT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct BarrelClient {
    pub name: String,
    base_url: String,
    http: reqwest::Client,
}

impl BarrelClient {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Cheap reachability check, used by reconnect passes.
    pub async fn probe(&self) -> bool {
        self.stats().await.is_ok()
    }

    pub async fn search(&self, terms: &[String]) -> Result<Vec<SearchResult>, RpcError> {
        let request = SearchTermsRequest {
            terms: terms.to_vec(),
        };
        let response = self
            .post_json(ENDPOINT_SEARCH, &request, REQUEST_TIMEOUT)
            .await?;
        let body: SearchResponse = response.json().await?;
        Ok(body.results)
    }

    pub async fn update_index(&self, update: &UpdateIndexRequest) -> Result<(), RpcError> {
        let response = self
            .http
            .post(self.url(ENDPOINT_UPDATE_INDEX))
            .json(update)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        self.expect_success(response.status(), ENDPOINT_UPDATE_INDEX)
    }

    pub async fn backlinks(&self, url: &str) -> Result<Vec<String>, RpcError> {
        let response = self
            .get_with_retry(
                format!("{}{}?url={}", self.base_url, ENDPOINT_BACKLINKS, encode(url)),
                REQUEST_TIMEOUT,
            )
            .await?;
        let body: BacklinksResponse = response.json().await?;
        Ok(body.links)
    }

    pub async fn stats(&self) -> Result<String, RpcError> {
        let response = self
            .get_with_retry(self.url(ENDPOINT_STATS), REQUEST_TIMEOUT)
            .await?;
        let body: BarrelStatsResponse = response.json().await?;
        Ok(body.stats)
    }

    pub async fn export_index(&self) -> Result<HashMap<String, HashSet<String>>, RpcError> {
        let response = self
            .get_with_retry(self.url(ENDPOINT_EXPORT_INDEX), EXPORT_TIMEOUT)
            .await?;
        let body: IndexExportResponse = response.json().await?;
        Ok(body.entries)
    }

    pub async fn export_backlinks(&self) -> Result<HashMap<String, HashSet<String>>, RpcError> {
        let response = self
            .get_with_retry(self.url(ENDPOINT_EXPORT_BACKLINKS), EXPORT_TIMEOUT)
            .await?;
        let body: IndexExportResponse = response.json().await?;
        Ok(body.entries)
    }

    pub async fn export_pages(&self) -> Result<HashMap<String, PageRecord>, RpcError> {
        let response = self
            .get_with_retry(self.url(ENDPOINT_EXPORT_PAGES), EXPORT_TIMEOUT)
            .await?;
        let body: PageExportResponse = response.json().await?;
        Ok(body.entries)
    }

    pub async fn backup_queue(&self, snapshot: &QueueSnapshot) -> Result<(), RpcError> {
        let response = self
            .http
            .post(self.url(ENDPOINT_QUEUE_BACKUP))
            .json(snapshot)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        self.expect_success(response.status(), ENDPOINT_QUEUE_BACKUP)
    }

    pub async fn restore_queue(&self) -> Result<QueueSnapshot, RpcError> {
        let response = self
            .get_with_retry(self.url(ENDPOINT_QUEUE_RESTORE), REQUEST_TIMEOUT)
            .await?;
        Ok(response.json().await?)
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    fn expect_success(
        &self,
        status: reqwest::StatusCode,
        endpoint: &str,
    ) -> Result<(), RpcError> {
        if status.is_success() {
            Ok(())
        } else {
            Err(RpcError::Unreachable(format!(
                "{}{} returned {}",
                self.name, endpoint, status
            )))
        }
    }

    async fn post_json<T: serde::Serialize>(
        &self,
        endpoint: &str,
        payload: &T,
        timeout: Duration,
    ) -> Result<reqwest::Response, RpcError> {
        let mut delay_ms = 150u64;

        for attempt in 0..READ_ATTEMPTS {
            let response = self
                .http
                .post(self.url(endpoint))
                .json(payload)
                .timeout(timeout)
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    return Err(RpcError::Unreachable(format!(
                        "{}{} returned {}",
                        self.name,
                        endpoint,
                        resp.status()
                    )));
                }
                Err(e) => {
                    if attempt + 1 == READ_ATTEMPTS {
                        return Err(e.into());
                    }
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(RpcError::Unreachable("retry attempts exhausted".into()))
    }

    async fn get_with_retry(
        &self,
        url: String,
        timeout: Duration,
    ) -> Result<reqwest::Response, RpcError> {
        let mut delay_ms = 150u64;

        for attempt in 0..READ_ATTEMPTS {
            let response = self.http.get(url.clone()).timeout(timeout).send().await;

            match response {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    return Err(RpcError::Unreachable(format!(
                        "{} returned {}",
                        url,
                        resp.status()
                    )));
                }
                Err(e) => {
                    if attempt + 1 == READ_ATTEMPTS {
                        return Err(e.into());
                    }
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(RpcError::Unreachable("retry attempts exhausted".into()))
    }
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
