use std::future::Future;
use std::time::Instant;

use chrono::{DateTime, Utc};
use teloxide::types::Message;
use tracing::info;

use crate::utils::logging::TIMING_TARGET;

const MAX_LOGGED_TEXT_CHARS: usize = 300;

#[derive(Debug)]
pub struct CommandTimer {
    command: String,
    chat_id: i64,
    user_id: Option<i64>,
    message_id: i32,
    text: Option<String>,
    started_at: DateTime<Utc>,
    started_perf: Instant,
    status: String,
    detail: Option<String>,
    completed: bool,
}

fn clip_text(value: &str) -> String {
    value
        .replace('\n', " ")
        .chars()
        .take(MAX_LOGGED_TEXT_CHARS)
        .collect()
}

impl CommandTimer {
    pub fn from_message(command: &str, message: &Message) -> Self {
        CommandTimer {
            command: command.to_string(),
            chat_id: message.chat.id.0,
            user_id: message
                .from
                .as_ref()
                .and_then(|user| i64::try_from(user.id.0).ok()),
            message_id: message.id.0,
            text: message.text().map(clip_text),
            started_at: Utc::now(),
            started_perf: Instant::now(),
            status: "success".to_string(),
            detail: None,
            completed: false,
        }
    }

    fn log_received(&self) {
        info!(
            target: TIMING_TARGET,
            "event=command_received command={} chat_id={} user_id={:?} message_id={} received_at={} text={:?}",
            self.command,
            self.chat_id,
            self.user_id,
            self.message_id,
            self.started_at.to_rfc3339(),
            self.text
        );
    }

    fn log_completed(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        info!(
            target: TIMING_TARGET,
            "event=command_completed command={} chat_id={} user_id={:?} message_id={} started_at={} completed_at={} duration_s={:.3} status={} detail={}",
            self.command,
            self.chat_id,
            self.user_id,
            self.message_id,
            self.started_at.to_rfc3339(),
            Utc::now().to_rfc3339(),
            self.started_perf.elapsed().as_secs_f64(),
            self.status,
            self.detail.as_deref().unwrap_or_default()
        );
    }
}

pub fn start_command_timer(command: &str, message: &Message) -> CommandTimer {
    let timer = CommandTimer::from_message(command, message);
    timer.log_received();
    timer
}

pub fn complete_command_timer(timer: &mut CommandTimer, status: &str, detail: Option<String>) {
    timer.status = status.to_string();
    timer.detail = detail;
    timer.log_completed();
}

pub async fn log_remote_timing<T, E, F, Fut>(provider: &str, operation: &str, call: F) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let started_perf = Instant::now();
    info!(
        target: TIMING_TARGET,
        "event=remote_request provider={} operation={} started_at={}",
        provider,
        operation,
        Utc::now().to_rfc3339()
    );

    let result = call().await;
    let status = if result.is_ok() { "success" } else { "error" };

    info!(
        target: TIMING_TARGET,
        "event=remote_response provider={} operation={} completed_at={} duration_s={:.3} status={}",
        provider,
        operation,
        Utc::now().to_rfc3339(),
        started_perf.elapsed().as_secs_f64(),
        status
    );

    result
}
