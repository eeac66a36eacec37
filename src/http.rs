use std::time::Duration;

use anyhow::{ Context, Result };
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{ debug, trace };

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")] Transport(#[source] reqwest::Error),
    #[error("{url} responded with {status}")] Status {
        url: String,
        status: StatusCode,
    },
    #[error("cannot decode response from {url}: {source}")] Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Upstream answered 404, which reputation sources use for "never seen this IP".
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }
}

#[derive(Clone, Debug)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        HttpClient { client: reqwest::Client::new() }
    }
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<HttpClient> {
        let client = reqwest::Client
            ::builder()
            .timeout(timeout)
            .build()
            .context("cannot build HTTP client")?;
        Ok(HttpClient { client })
    }

    /// GET `url` and decode a 2xx JSON body into `T`. Any other status is
    /// returned as `FetchError::Status`, whose message carries the status line.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        query: &[(&str, &str)]
    ) -> Result<T, FetchError> {
        debug!("GET {}", url);
        let mut req = self.client.get(url);
        for (k, v) in headers {
            req = req.header(*k, *v);
        }
        if !query.is_empty() {
            req = req.query(query);
        }
        let resp = req.send().await.map_err(FetchError::Transport)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status { url: url.to_string(), status });
        }
        let text = resp.text().await.map_err(FetchError::Transport)?;
        trace!("{} returned {} bytes", url, text.len());
        serde_json::from_str(&text).map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })
    }
}
