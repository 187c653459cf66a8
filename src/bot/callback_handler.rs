//! Callback Handler module for processing inline keyboard callback queries

use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use tracing::{debug, warn};

use crate::event::{Event, Response, Selection};
use crate::session::UserKey;

use super::responder::send_response;
use super::ui_builder::menu_keyboard;
use super::BotState;

/// Handle callback queries from inline keyboards
pub async fn callback_handler(bot: Bot, q: CallbackQuery, state: Arc<BotState>) -> Result<()> {
    debug!(user_id = %q.from.id, data = ?q.data, "Received callback query from user");

    // Answer right away so the button stops spinning during slow operations
    // An expired query cannot be answered, but the selection still applies
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        warn!(user_id = %q.from.id, error = %e, "Failed to answer callback query");
    }

    let Some(selection) = q.data.as_deref().and_then(Selection::from_tag) else {
        warn!(user_id = %q.from.id, data = ?q.data, "Unknown callback data");
        return Ok(());
    };

    let user = UserKey(q.from.id.0);
    let lang = q.from.language_code.as_deref();
    let event = Event::selection(user, selection).with_language(q.from.language_code.clone());
    let response = state.machine.handle_event(&state.store, event).await;

    let chat_id = q
        .message
        .as_ref()
        .map(|msg| msg.chat().id)
        .unwrap_or_else(|| ChatId::from(q.from.id));

    // Menus replace the keyboard they were opened from
    if let (Some(msg), Response::MenuPrompt { text, options }) = (q.message.as_ref(), &response) {
        match bot
            .edit_message_text(msg.chat().id, msg.id(), text.clone())
            .reply_markup(menu_keyboard(options))
            .await
        {
            Ok(_) => return Ok(()),
            Err(e) => {
                warn!(user_id = %q.from.id, error = %e, "Failed to edit menu message, sending a new one")
            }
        }
    }

    send_response(&bot, chat_id, response, lang).await
}
