use std::sync::Arc;

use reqwest::Client;

use crate::config::Config;
use crate::search::BingImageSearch;

/// Immutable per-process context handed to every update handler.
#[derive(Clone)]
pub struct AppState {
    pub search: Arc<BingImageSearch>,
    pub self_username: Arc<str>,
}

impl AppState {
    pub fn new(config: &Config, http_client: Client, self_username: String) -> Self {
        let search = BingImageSearch::new(
            http_client,
            config.bing_search_endpoint.clone(),
            config.bing_api_key.clone(),
        );
        AppState {
            search: Arc::new(search),
            self_username: Arc::from(self_username),
        }
    }
}
