use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{FileId, InputFile, InputMedia, InputMediaPhoto, MessageId, PhotoSize, User};
use tracing::info;

use crate::state::AppState;

/// An in-place media edit that re-sends a photo with the spoiler flag set.
#[derive(Debug, Clone, PartialEq)]
pub struct SpoilerEdit {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub file_id: FileId,
    pub caption: Option<String>,
}

pub fn is_self_attributed(via_bot: Option<&User>, self_username: &str) -> bool {
    via_bot.is_some_and(|user| {
        user.is_bot
            && user
                .username
                .as_deref()
                .is_some_and(|username| username.eq_ignore_ascii_case(self_username))
    })
}

pub fn lowest_resolution(photos: &[PhotoSize]) -> Option<&PhotoSize> {
    photos
        .iter()
        .min_by_key(|photo| u64::from(photo.width) * u64::from(photo.height))
}

/// Photos that arrived in a group or channel through this bot's inline mode
/// get their smallest variant re-applied as a spoiler, keeping the caption.
pub fn spoiler_edit_for(message: &Message, self_username: &str) -> Option<SpoilerEdit> {
    if message.chat.is_private() || !is_self_attributed(message.via_bot.as_ref(), self_username) {
        return None;
    }
    let photo = lowest_resolution(message.photo()?)?;
    Some(SpoilerEdit {
        chat_id: message.chat.id,
        message_id: message.id,
        file_id: photo.file.id.clone(),
        caption: message.caption().map(str::to_string),
    })
}

pub fn spoiler_media(edit: SpoilerEdit) -> InputMedia {
    let mut media = InputMediaPhoto::new(InputFile::file_id(edit.file_id));
    media.has_spoiler = true;
    if let Some(caption) = edit.caption {
        media = media.caption(caption);
    }
    InputMedia::Photo(media)
}

pub async fn apply_spoiler(bot: &Bot, edit: SpoilerEdit) -> Result<()> {
    let (chat_id, message_id) = (edit.chat_id, edit.message_id);
    bot.edit_message_media(chat_id, message_id, spoiler_media(edit))
        .await?;
    Ok(())
}

pub async fn spoiler_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let Some(edit) = spoiler_edit_for(&message, &state.self_username) else {
        return Ok(());
    };
    info!(
        chat_id = edit.chat_id.0,
        message_id = edit.message_id.0,
        "Re-applying spoiler to inline photo"
    );
    apply_spoiler(&bot, edit).await
}
