use std::env;

use anyhow::{anyhow, Result};
use tracing::warn;

pub const DEFAULT_BING_SEARCH_ENDPOINT: &str = "https://api.bing.microsoft.com/v7.0/images/search";

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub bot_username: Option<String>,
    pub bing_api_key: String,
    pub bing_search_endpoint: String,
    pub log_level: String,
    pub http_timeout_seconds: u64,
}

fn lookup_string<F>(lookup: &F, name: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).unwrap_or_else(|| default.to_string())
}

fn lookup_u64<F>(lookup: &F, name: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) => match value.trim().parse::<u64>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!("Invalid {name} value '{value}'; defaulting to {default}.");
                default
            }
        },
        None => default,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn normalize_username(value: &str) -> String {
    value.trim().trim_start_matches('@').to_string()
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bot_token = non_empty(lookup("BOT_TOKEN"))
            .or_else(|| non_empty(lookup("TELEGRAM_TOKEN")))
            .ok_or_else(|| anyhow!("BOT_TOKEN is required"))?;

        let bing_api_key =
            non_empty(lookup("BING_KEY")).ok_or_else(|| anyhow!("BING_KEY is required"))?;

        let bot_username = non_empty(lookup("BOT_USERNAME"))
            .map(|value| normalize_username(&value))
            .filter(|value| !value.is_empty());

        let mut bing_search_endpoint = lookup_string(
            &lookup,
            "BING_SEARCH_ENDPOINT",
            DEFAULT_BING_SEARCH_ENDPOINT,
        );
        if bing_search_endpoint.trim().is_empty() {
            bing_search_endpoint = DEFAULT_BING_SEARCH_ENDPOINT.to_string();
        }

        Ok(Config {
            bot_token,
            bot_username,
            bing_api_key,
            bing_search_endpoint,
            log_level: lookup_string(&lookup, "LOG_LEVEL", "info").to_lowercase(),
            http_timeout_seconds: lookup_u64(&lookup, "HTTP_TIMEOUT_SECONDS", 30).max(1),
        })
    }
}
