//! HTTP access to remote services.

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("Server error for {url}: HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Invalid URL: {url} - {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },
}

/// Retrieves the body of a remote document as text.
///
/// No retries and no timeout are applied here; the scheduler running the job
/// owns both concerns.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get_text(&self, url: &Url) -> Result<String, TransportError>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| TransportError::Request {
                url: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get_text(&self, url: &Url) -> Result<String, TransportError> {
        debug!(%url, "GET");
        let request_error = |e: reqwest::Error| TransportError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(request_error)
    }
}

pub fn parse_url(url: &str) -> Result<Url, TransportError> {
    Url::parse(url).map_err(|e| TransportError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

/// Rebuilds `original` on the scheme and host of `destination`.
///
/// Upstream indexes publish item URLs on hosts that differ from the
/// configured source; path, query and fragment are kept.
pub fn reroute_url(original: &str, destination: &str) -> Result<Url, TransportError> {
    let destination = parse_url(destination)?;
    let mut rerouted = parse_url(original)?;

    let invalid = |reason: &str| TransportError::InvalidUrl {
        url: original.to_string(),
        reason: reason.to_string(),
    };

    rerouted
        .set_scheme(destination.scheme())
        .map_err(|_| invalid("cannot change scheme"))?;
    rerouted
        .set_host(destination.host_str())
        .map_err(|e| invalid(&e.to_string()))?;
    rerouted
        .set_port(destination.port())
        .map_err(|_| invalid("cannot change port"))?;

    Ok(rerouted)
}
