//! Client stub for the dispatcher, used by crawler workers.

use std::time::Duration;

use crate::error::RpcError;

use super::protocol::*;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct DispatcherClient {
    base_url: String,
    http: reqwest::Client,
}

impl DispatcherClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Cheap reachability check used by the crawler's reconnect loop.
    pub async fn probe(&self) -> bool {
        self.http
            .get(format!("{}{}", self.base_url, ENDPOINT_STATISTICS))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map(|response| response.status().is_success())
            .unwrap_or(false)
    }

    /// Reports a discovered URL. Duplicates are the dispatcher's problem.
    pub async fn submit_url(&self, url: &str) -> Result<(), RpcError> {
        let request = SubmitUrlRequest {
            url: url.to_string(),
        };
        let response = self
            .http
            .post(format!("{}{}", self.base_url, ENDPOINT_SUBMIT_URL))
            .json(&request)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(RpcError::Unreachable(format!(
                "submit returned {}",
                response.status()
            )))
        }
    }

    /// Pulls the next URL to crawl; `None` means an empty queue.
    pub async fn next_url(&self) -> Result<Option<String>, RpcError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, ENDPOINT_NEXT_URL))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RpcError::Unreachable(format!(
                "next returned {}",
                response.status()
            )));
        }
        let body: NextUrlResponse = response.json().await?;
        Ok(body.url)
    }
}
