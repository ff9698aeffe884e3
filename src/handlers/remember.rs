use anyhow::Result;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use teloxide::prelude::*;
use teloxide::types::{InputFile, MessageId, ReplyParameters};
use thiserror::Error;
use tracing::{error, warn};
use url::Url;

use crate::handlers::{remember_caption, REMEMBER_PREFIX};
use crate::search::{extract_candidates, pick_random, ImageSearch};
use crate::state::AppState;
use crate::utils::timing::{complete_command_timer, start_command_timer};

pub const NO_RESULTS_TEXT: &str = "No results found";

const SEND_ATTEMPTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    RetriedThenSent,
    NoResults,
    SearchFailed,
}

impl DeliveryOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryOutcome::Sent => "sent",
            DeliveryOutcome::RetriedThenSent => "retried_then_sent",
            DeliveryOutcome::NoResults => "no_results",
            DeliveryOutcome::SearchFailed => "search_failed",
        }
    }
}

#[derive(Debug, Error)]
#[error("Failed to send image after {attempts} attempts: {message}")]
pub struct DeliveryError {
    pub attempts: usize,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum RememberError {
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error(transparent)]
    Reply(#[from] anyhow::Error),
}

#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn reply_photo(&self, url: &str, caption: &str, spoiler: bool) -> Result<()>;
    async fn reply_text(&self, text: &str) -> Result<()>;
}

/// Replies in the chat of the triggering message, threaded to it.
pub struct TelegramReplySink {
    bot: Bot,
    chat_id: ChatId,
    message_id: MessageId,
}

impl TelegramReplySink {
    pub fn for_message(bot: Bot, message: &Message) -> Self {
        TelegramReplySink {
            bot,
            chat_id: message.chat.id,
            message_id: message.id,
        }
    }
}

#[async_trait]
impl ReplySink for TelegramReplySink {
    async fn reply_photo(&self, url: &str, caption: &str, spoiler: bool) -> Result<()> {
        let url = Url::parse(url)?;
        self.bot
            .send_photo(self.chat_id, InputFile::url(url))
            .caption(caption)
            .has_spoiler(spoiler)
            .reply_parameters(ReplyParameters::new(self.message_id))
            .await?;
        Ok(())
    }

    async fn reply_text(&self, text: &str) -> Result<()> {
        self.bot
            .send_message(self.chat_id, text)
            .reply_parameters(ReplyParameters::new(self.message_id))
            .await?;
        Ok(())
    }
}

/// Returns the search query of a `#remember ` message with its whitespace
/// collapsed, or `None` when the text is not a trigger or the query is blank.
pub fn parse_remember_query(text: &str) -> Option<String> {
    let rest = text.strip_prefix(REMEMBER_PREFIX)?;
    let query = rest.split_whitespace().collect::<Vec<_>>().join(" ");
    if query.is_empty() {
        None
    } else {
        Some(query)
    }
}

pub async fn run_remember<S, D, R>(
    search: &S,
    sink: &D,
    rng: &mut R,
    query: &str,
) -> Result<DeliveryOutcome, RememberError>
where
    S: ImageSearch + ?Sized,
    D: ReplySink + ?Sized,
    R: Rng + Send + ?Sized,
{
    let response = match search.search(query).await {
        Ok(response) => response,
        Err(err) => {
            error!("Error finding image for query {query:?}: {err}");
            sink.reply_text(&format!("Error finding image: {err}"))
                .await?;
            return Ok(DeliveryOutcome::SearchFailed);
        }
    };

    let candidates = response
        .results()
        .map(extract_candidates)
        .unwrap_or_default();
    let Some(first_pick) = pick_random(&candidates, rng) else {
        sink.reply_text(NO_RESULTS_TEXT).await?;
        return Ok(DeliveryOutcome::NoResults);
    };

    let caption = remember_caption(query);
    let first_err = match sink.reply_photo(first_pick, &caption, true).await {
        Ok(()) => return Ok(DeliveryOutcome::Sent),
        Err(err) => err,
    };
    warn!("Error replying with image {first_pick}: {first_err:#}; retrying once");

    let retry_pick = pick_random(&candidates, rng).unwrap_or(first_pick);
    match sink.reply_photo(retry_pick, &caption, true).await {
        Ok(()) => Ok(DeliveryOutcome::RetriedThenSent),
        Err(retry_err) => Err(DeliveryError {
            attempts: SEND_ATTEMPTS,
            message: format!("{retry_err:#}"),
        }
        .into()),
    }
}

/// Runs the pipeline and, when both sends failed, tells the user once before
/// handing the error back.
pub async fn remember_and_report<S, D, R>(
    search: &S,
    sink: &D,
    rng: &mut R,
    query: &str,
) -> Result<DeliveryOutcome, RememberError>
where
    S: ImageSearch + ?Sized,
    D: ReplySink + ?Sized,
    R: Rng + Send + ?Sized,
{
    let result = run_remember(search, sink, rng, query).await;
    if let Err(RememberError::Delivery(delivery_err)) = &result {
        if let Err(reply_err) = sink
            .reply_text(&format!("Error sending image: {delivery_err}"))
            .await
        {
            warn!("Failed to report delivery failure: {reply_err}");
        }
    }
    result
}

pub async fn remember_handler(
    bot: Bot,
    state: AppState,
    message: Message,
    query: String,
) -> Result<()> {
    let mut timer = start_command_timer("remember", &message);
    let sink = TelegramReplySink::for_message(bot, &message);
    let mut rng = StdRng::from_entropy();

    match remember_and_report(state.search.as_ref(), &sink, &mut rng, &query).await {
        Ok(outcome) => {
            complete_command_timer(&mut timer, outcome.as_str(), None);
            Ok(())
        }
        Err(err) => {
            complete_command_timer(&mut timer, "error", Some(err.to_string()));
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use anyhow::anyhow;
    use reqwest::StatusCode;
    use serde_json::{json, Value};

    use super::*;
    use crate::search::bing::{ImageSearchError, ImageSearchResponse};

    enum FakeSearch {
        Results(Value),
        Fails,
    }

    #[async_trait]
    impl ImageSearch for FakeSearch {
        async fn search(&self, _query: &str) -> Result<ImageSearchResponse, ImageSearchError> {
            match self {
                FakeSearch::Results(value) => Ok(ImageSearchResponse {
                    value: Some(value.clone()),
                }),
                FakeSearch::Fails => Err(ImageSearchError::Status(StatusCode::BAD_GATEWAY)),
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        failures_left: AtomicUsize,
        photos: Mutex<Vec<(String, String, bool)>>,
        texts: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        fn failing(times: usize) -> Self {
            RecordingSink {
                failures_left: AtomicUsize::new(times),
                ..Default::default()
            }
        }

        fn photos(&self) -> Vec<(String, String, bool)> {
            self.photos.lock().unwrap().clone()
        }

        fn texts(&self) -> Vec<String> {
            self.texts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReplySink for RecordingSink {
        async fn reply_photo(&self, url: &str, caption: &str, spoiler: bool) -> Result<()> {
            self.photos
                .lock()
                .unwrap()
                .push((url.to_string(), caption.to_string(), spoiler));
            let failures_left = self.failures_left.load(Ordering::SeqCst);
            if failures_left > 0 {
                self.failures_left.store(failures_left - 1, Ordering::SeqCst);
                return Err(anyhow!("wrong file identifier/HTTP URL specified"));
            }
            Ok(())
        }

        async fn reply_text(&self, text: &str) -> Result<()> {
            self.texts.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn sunset_results() -> FakeSearch {
        FakeSearch::Results(json!([
            {"contentUrl": "https://x/a.jpg"},
            {"contentUrl": "https://x/b.png"},
            {"contentUrl": "https://x/c.jpeg"}
        ]))
    }

    const JPEG_CANDIDATES: [&str; 2] = ["https://x/a.jpg", "https://x/c.jpeg"];

    #[test]
    fn parses_trigger_and_collapses_whitespace() {
        assert_eq!(
            parse_remember_query("#remember sunset beach").as_deref(),
            Some("sunset beach")
        );
        assert_eq!(
            parse_remember_query("#remember   sunset \t  beach  ").as_deref(),
            Some("sunset beach")
        );
    }

    #[test]
    fn ignores_non_triggers_and_blank_queries() {
        assert!(parse_remember_query("#remember ").is_none());
        assert!(parse_remember_query("#remember    ").is_none());
        assert!(parse_remember_query("#remember").is_none());
        assert!(parse_remember_query("#rememberme cats").is_none());
        assert!(parse_remember_query("#Remember cats").is_none());
        assert!(parse_remember_query("please #remember cats").is_none());
    }

    #[tokio::test]
    async fn delivers_a_spoiler_candidate_with_caption() {
        let sink = RecordingSink::default();
        let mut rng = StdRng::seed_from_u64(3);

        let outcome = run_remember(&sunset_results(), &sink, &mut rng, "sunset beach")
            .await
            .expect("delivery succeeds");

        assert_eq!(outcome, DeliveryOutcome::Sent);
        let photos = sink.photos();
        assert_eq!(photos.len(), 1);
        assert!(JPEG_CANDIDATES.contains(&photos[0].0.as_str()));
        assert_eq!(photos[0].1, "#remember sunset beach");
        assert!(photos[0].2, "photo must carry the spoiler flag");
        assert!(sink.texts().is_empty());
    }

    #[tokio::test]
    async fn replies_no_results_when_nothing_qualifies() {
        let searches = [
            FakeSearch::Results(json!([{"contentUrl": "https://x/b.png"}])),
            FakeSearch::Results(json!([])),
            FakeSearch::Results(json!({"unexpected": true})),
        ];
        for search in searches {
            let sink = RecordingSink::default();
            let mut rng = StdRng::seed_from_u64(5);

            let outcome = run_remember(&search, &sink, &mut rng, "cats")
                .await
                .expect("no-results path succeeds");

            assert_eq!(outcome, DeliveryOutcome::NoResults);
            assert_eq!(sink.texts(), vec![NO_RESULTS_TEXT.to_string()]);
            assert!(sink.photos().is_empty());
        }
    }

    #[tokio::test]
    async fn search_failure_is_reported_to_the_user() {
        let sink = RecordingSink::default();
        let mut rng = StdRng::seed_from_u64(9);

        let outcome = run_remember(&FakeSearch::Fails, &sink, &mut rng, "cats")
            .await
            .expect("search failure is handled");

        assert_eq!(outcome, DeliveryOutcome::SearchFailed);
        let texts = sink.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].starts_with("Error finding image: "));
        assert!(texts[0].contains("502"));
        assert!(sink.photos().is_empty());
    }

    #[tokio::test]
    async fn retries_once_after_a_failed_send() {
        let sink = RecordingSink::failing(1);
        let mut rng = StdRng::seed_from_u64(11);

        let outcome = run_remember(&sunset_results(), &sink, &mut rng, "sunset beach")
            .await
            .expect("retry succeeds");

        assert_eq!(outcome, DeliveryOutcome::RetriedThenSent);
        let photos = sink.photos();
        assert_eq!(photos.len(), 2);
        for (url, caption, spoiler) in &photos {
            assert!(JPEG_CANDIDATES.contains(&url.as_str()));
            assert_eq!(caption, "#remember sunset beach");
            assert!(*spoiler);
        }
        assert!(sink.texts().is_empty());
    }

    #[tokio::test]
    async fn second_send_failure_propagates_after_two_attempts() {
        let sink = RecordingSink::failing(2);
        let mut rng = StdRng::seed_from_u64(13);

        let err = run_remember(&sunset_results(), &sink, &mut rng, "sunset beach")
            .await
            .expect_err("second failure propagates");

        let delivery_err = match err {
            RememberError::Delivery(delivery_err) => delivery_err,
            other => panic!("expected a delivery error, got {other:?}"),
        };
        assert_eq!(delivery_err.attempts, 2);
        assert!(delivery_err.message.contains("wrong file identifier"));
        assert_eq!(sink.photos().len(), 2);
        assert!(sink.texts().is_empty());
    }

    #[tokio::test]
    async fn reports_delivery_failure_once_and_still_propagates() {
        let sink = RecordingSink::failing(2);
        let mut rng = StdRng::seed_from_u64(17);

        let err = remember_and_report(&sunset_results(), &sink, &mut rng, "sunset beach")
            .await
            .expect_err("delivery failure propagates");

        assert!(matches!(err, RememberError::Delivery(ref e) if e.attempts == 2));
        assert_eq!(sink.photos().len(), 2);
        let texts = sink.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].starts_with("Error sending image: Failed to send image after 2 attempts"));
        assert!(texts[0].contains("wrong file identifier"));
    }

    #[tokio::test]
    async fn successful_delivery_sends_no_error_text() {
        let sink = RecordingSink::failing(1);
        let mut rng = StdRng::seed_from_u64(19);

        let outcome = remember_and_report(&sunset_results(), &sink, &mut rng, "sunset beach")
            .await
            .expect("retry succeeds");

        assert_eq!(outcome, DeliveryOutcome::RetriedThenSent);
        assert_eq!(sink.photos().len(), 2);
        assert!(sink.texts().is_empty());
    }
}
