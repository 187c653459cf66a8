//! Rendering of state machine responses as Telegram messages

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::InputFile;
use tracing::{debug, warn};

use crate::event::{Response, VideoPayload};
use crate::localization::t_lang;

use super::ui_builder::menu_keyboard;

const PHOTO_FILE_NAME: &str = "result.png";
const VIDEO_FILE_NAME: &str = "video.mp4";

/// Text sent for a video that is delivered as a link
pub fn link_message(caption: &str, link: &str) -> String {
    format!("{caption}\n{link}")
}

/// Send one response to the chat
pub async fn send_response(
    bot: &Bot,
    chat_id: ChatId,
    response: Response,
    lang: Option<&str>,
) -> Result<()> {
    match response {
        Response::Message(text) => {
            bot.send_message(chat_id, text).await?;
        }
        Response::Photo { bytes, caption } => {
            debug!(chat_id = %chat_id, size_bytes = bytes.len(), "Sending photo");
            let sent = bot
                .send_photo(chat_id, InputFile::memory(bytes.clone()).file_name(PHOTO_FILE_NAME))
                .caption(caption.clone())
                .await;
            if let Err(e) = sent {
                warn!(chat_id = %chat_id, error = %e, "Photo rejected, sending as a document");
                let sent = bot
                    .send_document(chat_id, InputFile::memory(bytes).file_name(PHOTO_FILE_NAME))
                    .caption(caption)
                    .await;
                if let Err(e) = sent {
                    warn!(chat_id = %chat_id, error = %e, "Document rejected too");
                    bot.send_message(chat_id, t_lang("upload-failed", lang)).await?;
                }
            }
        }
        Response::Video {
            payload: VideoPayload::Inline(bytes),
            caption,
        } => {
            debug!(chat_id = %chat_id, size_bytes = bytes.len(), "Sending video");
            let sent = bot
                .send_video(chat_id, InputFile::memory(bytes).file_name(VIDEO_FILE_NAME))
                .caption(caption)
                .await;
            if let Err(e) = sent {
                warn!(chat_id = %chat_id, error = %e, "Video rejected");
                bot.send_message(chat_id, t_lang("upload-failed", lang)).await?;
            }
        }
        Response::Video {
            payload: VideoPayload::Link(link),
            caption,
        } => {
            bot.send_message(chat_id, link_message(&caption, &link)).await?;
        }
        Response::MenuPrompt { text, options } => {
            bot.send_message(chat_id, text)
                .reply_markup(menu_keyboard(&options))
                .await?;
        }
    }
    Ok(())
}
