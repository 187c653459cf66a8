//! Bot module for handling Telegram interactions
//!
//! This module is split into several submodules:
//! - `message_handler`: Turns text, photo, and document messages into events
//! - `callback_handler`: Turns inline keyboard presses into menu selections
//! - `ui_builder`: Creates inline keyboards from menu prompts
//! - `responder`: Renders state machine responses as bot API calls

pub mod callback_handler;
pub mod message_handler;
pub mod responder;
pub mod ui_builder;

use crate::session::SessionStore;
use crate::state_machine::SessionMachine;

// Re-export main handler functions for use in main.rs
pub use callback_handler::callback_handler;
pub use message_handler::message_handler;

pub use message_handler::download_file;
pub use responder::send_response;
pub use ui_builder::menu_keyboard;

/// Shared state injected into every handler
pub struct BotState {
    pub machine: SessionMachine,
    pub store: SessionStore,
}

impl BotState {
    pub fn new(machine: SessionMachine) -> Self {
        Self {
            machine,
            store: SessionStore::new(),
        }
    }
}
