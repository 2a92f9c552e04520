use std::sync::Arc;

use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::client::{parse_url, Fetcher, TransportError};

use super::{record_id, DATASET_LIMIT};

#[derive(Debug, Deserialize)]
struct ListingPage {
    items: Vec<Value>,
    next: Option<String>,
}

/// Walks the paginated OpenCity dataset listing.
#[derive(Clone)]
pub struct OpenCityClient {
    fetcher: Arc<dyn Fetcher>,
    base_url: String,
    limit: u32,
}

impl OpenCityClient {
    pub fn new(fetcher: Arc<dyn Fetcher>, base_url: &str) -> Self {
        Self {
            fetcher,
            base_url: base_url.trim_end_matches('/').to_string(),
            limit: DATASET_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn first_page_url(&self) -> Result<Url, TransportError> {
        let mut url = parse_url(&self.base_url)?;
        url.query_pairs_mut()
            .append_pair("limit", &self.limit.to_string());
        Ok(url)
    }

    async fn fetch_page(&self, url: &Url) -> Result<ListingPage, TransportError> {
        debug!(%url, "Retrieving OpenCity page");
        let body = self.fetcher.get_text(url).await?;
        serde_json::from_str(&body).map_err(|e| TransportError::Malformed {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    /// Every dataset of every page, in listing order.
    ///
    /// Pages are requested only as the stream is polled; the first failing
    /// page ends the stream with its error.
    pub fn records(self) -> BoxStream<'static, Result<Value, TransportError>> {
        let start = Some(self.first_page_url());
        stream::try_unfold((self, start), |(client, next)| async move {
            let Some(url) = next else {
                return Ok::<_, TransportError>(None);
            };
            let page = client.fetch_page(&url?).await?;
            let next = page
                .next
                .filter(|next| !next.is_empty())
                .map(|next| parse_url(&next));
            Ok(Some((page.items, (client, next))))
        })
        .map_ok(|items| stream::iter(items.into_iter().map(Ok::<_, TransportError>)))
        .try_flatten()
        .inspect_ok(|item| {
            info!(
                id = %record_id(item),
                title = item["title"].as_str().unwrap_or_default(),
                "Found OpenCity dataset"
            )
        })
        .boxed()
    }
}
