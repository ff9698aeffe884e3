use anyhow::Result;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{InlineQueryResult, InlineQueryResultPhoto};
use tracing::{debug, warn};
use url::Url;

use crate::handlers::remember_caption;
use crate::search::{extract_candidates, ImageSearch};
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineResult {
    pub id: String,
    pub photo_url: String,
    pub thumbnail_url: String,
    pub caption: String,
}

#[async_trait]
pub trait InlineAnswerSink: Send + Sync {
    async fn answer(&self, results: Vec<InlineResult>) -> Result<()>;
}

pub struct TelegramInlineSink {
    bot: Bot,
    query: InlineQuery,
}

impl TelegramInlineSink {
    pub fn new(bot: Bot, query: InlineQuery) -> Self {
        TelegramInlineSink { bot, query }
    }
}

fn to_telegram_result(result: InlineResult) -> Option<InlineQueryResult> {
    let photo_url = match Url::parse(&result.photo_url) {
        Ok(url) => url,
        Err(err) => {
            warn!("Invalid inline photo URL '{}': {}", result.photo_url, err);
            return None;
        }
    };
    let thumbnail_url = match Url::parse(&result.thumbnail_url) {
        Ok(url) => url,
        Err(err) => {
            warn!("Invalid inline thumbnail URL '{}': {}", result.thumbnail_url, err);
            return None;
        }
    };

    let mut photo = InlineQueryResultPhoto::new(result.id, photo_url, thumbnail_url);
    photo.caption = Some(result.caption);
    Some(InlineQueryResult::Photo(photo))
}

#[async_trait]
impl InlineAnswerSink for TelegramInlineSink {
    async fn answer(&self, results: Vec<InlineResult>) -> Result<()> {
        let results: Vec<InlineQueryResult> =
            results.into_iter().filter_map(to_telegram_result).collect();
        self.bot
            .answer_inline_query(self.query.id.clone(), results)
            .await?;
        Ok(())
    }
}

/// One photo result per candidate, in candidate order, captioned with the
/// inline query text exactly as typed.
pub fn build_inline_results(candidates: &[String], query: &str) -> Vec<InlineResult> {
    let caption = remember_caption(query);
    candidates
        .iter()
        .enumerate()
        .map(|(idx, url)| InlineResult {
            id: idx.to_string(),
            photo_url: url.clone(),
            thumbnail_url: url.clone(),
            caption: caption.clone(),
        })
        .collect()
}

/// Answers the inline query when at least one candidate exists. Returns
/// whether an answer was sent; queries without candidates stay unanswered.
pub async fn run_inline<S, A>(search: &S, sink: &A, query: &str) -> Result<bool>
where
    S: ImageSearch + ?Sized,
    A: InlineAnswerSink + ?Sized,
{
    if query.is_empty() {
        return Ok(false);
    }

    let response = search.search(query).await?;
    let candidates = response
        .results()
        .map(extract_candidates)
        .unwrap_or_default();
    if candidates.is_empty() {
        debug!("No inline candidates for query {query:?}");
        return Ok(false);
    }

    sink.answer(build_inline_results(&candidates, query)).await?;
    Ok(true)
}

pub async fn inline_handler(bot: Bot, state: AppState, query: InlineQuery) -> Result<()> {
    let text = query.query.clone();
    let sink = TelegramInlineSink::new(bot, query);
    run_inline(state.search.as_ref(), &sink, &text).await?;
    Ok(())
}
