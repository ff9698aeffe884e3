use std::error::Error;

use anyhow::anyhow;
use dotenvy::dotenv;
use teloxide::prelude::*;
use tracing::{error, info};

mod config;
mod handlers;
mod search;
mod state;
mod utils;

use config::{normalize_username, Config};
use handlers::{inline, remember, spoiler};
use state::AppState;
use utils::http::build_http_client;
use utils::logging::init_logging;

type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

async fn resolve_self_username(bot: &Bot, config: &Config) -> anyhow::Result<String> {
    if let Some(username) = &config.bot_username {
        return Ok(username.clone());
    }
    let me = bot.get_me().await?;
    me.user
        .username
        .as_deref()
        .map(normalize_username)
        .ok_or_else(|| anyhow!("Bot account has no username; set BOT_USERNAME"))
}

#[tokio::main]
async fn main() -> HandlerResult {
    dotenv().ok();
    let config = Config::load()?;
    let _guards = init_logging(&config.log_level);

    let bot = Bot::new(config.bot_token.clone());
    let self_username = resolve_self_username(&bot, &config).await?;
    info!("Starting remember bot as @{self_username}");

    let http_client = build_http_client(config.http_timeout_seconds)?;
    let state = AppState::new(&config, http_client, self_username);

    let message_handler = Update::filter_message()
        .branch(
            dptree::filter(|msg: Message| msg.photo().is_some()).endpoint(handle_photo_message),
        )
        .branch(dptree::filter(|msg: Message| msg.text().is_some()).endpoint(handle_text_message))
        .endpoint(ignore_message);

    let handler = dptree::entry()
        .branch(message_handler)
        .branch(Update::filter_inline_query().endpoint(handle_inline_query));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_text_message(bot: Bot, state: AppState, message: Message) -> HandlerResult {
    let Some(query) = message.text().and_then(remember::parse_remember_query) else {
        return Ok(());
    };

    tokio::spawn(async move {
        let message_id = message.id.0;
        let text = message.text().unwrap_or_default().to_string();
        if let Err(err) = remember::remember_handler(bot, state, message, query).await {
            error!(
                message_id,
                text = %text,
                "remember handler failed: {err:#}"
            );
        }
    });
    Ok(())
}

async fn handle_photo_message(bot: Bot, state: AppState, message: Message) -> HandlerResult {
    tokio::spawn(async move {
        let message_id = message.id.0;
        if let Err(err) = spoiler::spoiler_handler(bot, state, message).await {
            error!(message_id, "spoiler handler failed: {err:#}");
        }
    });
    Ok(())
}

async fn handle_inline_query(bot: Bot, state: AppState, query: InlineQuery) -> HandlerResult {
    tokio::spawn(async move {
        let text = query.query.clone();
        if let Err(err) = inline::inline_handler(bot, state, query).await {
            error!(query = %text, "inline handler failed: {err:#}");
        }
    });
    Ok(())
}

async fn ignore_message(_message: Message) -> HandlerResult {
    Ok(())
}
