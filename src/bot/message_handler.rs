//! Message Handler module for processing incoming Telegram messages

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, FileId};
use tracing::{debug, error, info};

use crate::event::{parse_command, Event, EventKind};
use crate::localization::{t_args_lang, t_lang};
use crate::media::imaging;
use crate::session::UserKey;
use crate::staging::StagedFile;

use super::responder::send_response;
use super::BotState;

/// Download a Telegram file into a staged file under `staging_dir`
pub async fn download_file(bot: &Bot, file_id: FileId, staging_dir: &Path) -> Result<StagedFile> {
    let file = bot.get_file(file_id).await?;
    let url = format!(
        "https://api.telegram.org/file/bot{}/{}",
        bot.token(),
        file.path
    );

    let response = reqwest::get(&url).await?.error_for_status()?;
    let bytes = response.bytes().await?;

    let staged = StagedFile::write(staging_dir, &bytes, imaging::suffix_for(&bytes))?;
    Ok(staged)
}

/// Translate the text of a message into a command, reset, or free-text event
pub fn text_event(user: UserKey, text: &str) -> Event {
    match parse_command(text) {
        Some((name, _)) if name == "reset" => Event::reset(user),
        Some((name, args)) => Event::new(user, EventKind::Command { name, args }),
        None => Event::text(user, text),
    }
}

/// Read a downloaded image into a photo event
pub async fn photo_event(user: UserKey, staged: &StagedFile) -> std::io::Result<Event> {
    let bytes = staged.read().await?;
    info!(user_id = %user, size_bytes = bytes.len(), "Image received");
    Ok(Event::photo(user, bytes))
}

/// File id of the image a message carries, if any
fn image_file_id(msg: &Message) -> Option<FileId> {
    if let Some(photos) = msg.photo() {
        // Telegram lists sizes smallest first
        return photos.last().map(|photo| photo.file.id.clone());
    }
    msg.document()
        .filter(|doc| {
            doc.mime_type
                .as_ref()
                .is_some_and(|mime| mime.essence_str().starts_with("image/"))
        })
        .map(|doc| doc.file.id.clone())
}

pub async fn message_handler(bot: Bot, msg: Message, state: Arc<BotState>) -> Result<()> {
    let Some(from) = msg.from.as_ref() else {
        debug!(chat_id = %msg.chat.id, "Ignoring message without a sender");
        return Ok(());
    };
    let user = UserKey(from.id.0);
    let language_code = from.language_code.clone();
    let lang = language_code.as_deref();

    // The staged download is held until the event is handled, then removed
    let (event, _staged) = if let Some(text) = msg.text() {
        (text_event(user, text), None)
    } else if let Some(file_id) = image_file_id(&msg) {
        let staging_dir = &state.machine.config().staging_dir;
        let staged = match download_file(&bot, file_id, staging_dir).await {
            Ok(staged) => staged,
            Err(e) => {
                error!(user_id = %user, error = %e, "Failed to download image for user");
                bot.send_message(msg.chat.id, t_lang("error-download-failed", lang))
                    .await?;
                return Ok(());
            }
        };
        match photo_event(user, &staged).await {
            Ok(event) => (event, Some(staged)),
            Err(e) => {
                error!(user_id = %user, error = %e, "Failed to read downloaded image");
                bot.send_message(msg.chat.id, t_lang("error-download-failed", lang))
                    .await?;
                return Ok(());
            }
        }
    } else {
        debug!(user_id = %user, "Unsupported message kind");
        bot.send_message(msg.chat.id, t_lang("unsupported-message", lang))
            .await?;
        return Ok(());
    };

    if let Some(platform) = state.machine.pending_video_download(&state.store, &event).await {
        let notice = t_args_lang(
            "video-downloading",
            &[("platform", platform.display_name())],
            lang,
        );
        bot.send_message(msg.chat.id, notice).await?;
        if let Err(e) = bot.send_chat_action(msg.chat.id, ChatAction::UploadVideo).await {
            debug!(user_id = %user, error = %e, "Failed to send chat action");
        }
    }

    let response = state
        .machine
        .handle_event(&state.store, event.with_language(language_code.clone()))
        .await;
    send_response(&bot, msg.chat.id, response, lang).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_event_routing() {
        let user = UserKey(42);
        assert_eq!(text_event(user, "/reset"), Event::reset(user));
        assert_eq!(text_event(user, "/RESET@SuperBot now"), Event::reset(user));
        assert_eq!(
            text_event(user, "/resize 800 600"),
            Event::command(user, "resize", &["800", "600"])
        );
        assert_eq!(
            text_event(user, "https://youtu.be/abc"),
            Event::text(user, "https://youtu.be/abc")
        );
    }

    #[tokio::test]
    async fn test_photo_event_reads_staged_bytes() {
        let root = tempfile::tempdir().unwrap();
        let user = UserKey(42);
        let staged = StagedFile::write(root.path(), b"jpeg bytes", ".jpg").unwrap();
        assert_eq!(
            photo_event(user, &staged).await.unwrap(),
            Event::photo(user, b"jpeg bytes".to_vec())
        );

        // A staged file that vanished is an error for the caller to report
        std::fs::remove_file(staged.path()).unwrap();
        assert!(photo_event(user, &staged).await.is_err());
    }
}
