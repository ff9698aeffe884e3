use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::utils::timing::log_remote_timing;

const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const RESULT_COUNT: u32 = 35;
const RESULT_OFFSET: u32 = 0;
const MARKET: &str = "en-us";

#[derive(Debug, Error)]
pub enum ImageSearchError {
    #[error("Image search request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("Image search request failed with status {0}")]
    Status(reqwest::StatusCode),
    #[error("Invalid image search response: {0}")]
    Decode(#[source] reqwest::Error),
}

/// Body of a Bing image search response. Individual results are kept as raw
/// JSON because only `contentUrl` is ever read from them.
#[derive(Debug, Default, Deserialize)]
pub struct ImageSearchResponse {
    #[serde(default)]
    pub value: Option<Value>,
}

impl ImageSearchResponse {
    /// The result array, or `None` when it is missing, not an array, or empty.
    pub fn results(&self) -> Option<&[Value]> {
        self.value
            .as_ref()
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .filter(|results| !results.is_empty())
    }
}

#[async_trait]
pub trait ImageSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<ImageSearchResponse, ImageSearchError>;
}

#[derive(Debug, Clone)]
pub struct BingImageSearch {
    client: Client,
    endpoint: String,
    api_key: String,
}

pub fn search_term(query: &str) -> String {
    query.replace(' ', "+")
}

impl BingImageSearch {
    pub fn new(client: Client, endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        BingImageSearch {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    async fn fetch(&self, query: &str) -> Result<ImageSearchResponse, ImageSearchError> {
        let term = search_term(query);
        let count = RESULT_COUNT.to_string();
        let offset = RESULT_OFFSET.to_string();

        let response = self
            .client
            .get(&self.endpoint)
            .header(SUBSCRIPTION_KEY_HEADER, &self.api_key)
            .query(&[
                ("q", term.as_str()),
                ("safeSearch", "off"),
                ("mkt", MARKET),
                ("count", count.as_str()),
                ("offset", offset.as_str()),
            ])
            .send()
            .await
            .map_err(ImageSearchError::Request)?;

        if !response.status().is_success() {
            return Err(ImageSearchError::Status(response.status()));
        }

        let body: Option<ImageSearchResponse> =
            response.json().await.map_err(ImageSearchError::Decode)?;
        Ok(body.unwrap_or_default())
    }
}

#[async_trait]
impl ImageSearch for BingImageSearch {
    async fn search(&self, query: &str) -> Result<ImageSearchResponse, ImageSearchError> {
        info!("Calling Bing image search with query: {}", query);
        log_remote_timing("bing", "images_search", || self.fetch(query)).await
    }
}
