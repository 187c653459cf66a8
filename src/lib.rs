//! # Super Bot
//!
//! A Telegram bot that removes, recolors and replaces photo backgrounds,
//! resizes images, downloads short videos, and hands out temporary mailboxes
//! and phone numbers. Each user's button presses, commands and uploads are
//! interpreted by a per-user session state machine.

pub mod bot;
pub mod config;
pub mod contacts;
pub mod errors;
pub mod event;
pub mod localization;
pub mod media;
pub mod menus;
pub mod publisher;
pub mod session;
pub mod staging;
pub mod state_machine;
