//! Stream reachability checks

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::debug;

/// Outcome of a single reachability check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStatus {
    Reachable,
    AccessDenied,
    Other(ProbeFailure),
}

/// Why a stream was neither reachable nor access-denied
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeFailure {
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Network(String),
}

/// Checks whether a stream URL can be fetched, without decoding it.
///
/// Implementations report failures through [`ProbeStatus::Other`] instead of
/// returning errors.
pub trait StreamProbe: Send + Sync {
    fn check(&self, url: &str) -> impl Future<Output = ProbeStatus> + Send;
}

/// Map an HTTP status onto a probe outcome.
pub fn classify(status: StatusCode) -> ProbeStatus {
    if status.is_success() {
        ProbeStatus::Reachable
    } else if status == StatusCode::FORBIDDEN {
        ProbeStatus::AccessDenied
    } else {
        ProbeStatus::Other(ProbeFailure::Status(status.as_u16()))
    }
}

/// Probes with a plain GET, like a browser fetching the playlist
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl StreamProbe for HttpProbe {
    async fn check(&self, url: &str) -> ProbeStatus {
        let status = match self.client.get(url).send().await {
            Ok(response) => classify(response.status()),
            Err(e) => ProbeStatus::Other(ProbeFailure::Network(e.to_string())),
        };
        debug!("Probe {} -> {:?}", url, status);
        status
    }
}
