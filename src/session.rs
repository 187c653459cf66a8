//! # Session Module
//!
//! Per-user session state: the pending action that decides what the next
//! photo or text means, the parameters the actions consult, and the store
//! that hands out one guarded session per user.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::staging::StagedFile;

/// Stable identifier of the user an event came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserKey(pub u64);

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Social platforms the video downloader accepts links for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    YouTube,
    TikTok,
    Facebook,
    Instagram,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::YouTube,
        Platform::TikTok,
        Platform::Facebook,
        Platform::Instagram,
    ];

    /// Lowercase tag used in callback data (`video_<tag>`)
    pub fn tag(&self) -> &'static str {
        match self {
            Platform::YouTube => "youtube",
            Platform::TikTok => "tiktok",
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.tag() == tag)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::YouTube => "YouTube",
            Platform::TikTok => "TikTok",
            Platform::Facebook => "Facebook",
            Platform::Instagram => "Instagram",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// What the next photo or text from the user will be interpreted as
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingAction {
    #[default]
    None,
    RemoveBackground,
    RecolorBackground,
    AwaitingBackgroundImage,
    ReplaceBackground,
    Resize,
    DownloadVideo(Platform),
}

/// Output dimensions for the resize action, both strictly positive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeTarget {
    width: u32,
    height: u32,
}

impl ResizeTarget {
    pub fn new(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl fmt::Display for ResizeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

lazy_static! {
    static ref HEX_COLOR: Regex =
        Regex::new(r"^#?(?:[0-9a-fA-F]{6}|[0-9a-fA-F]{3})$").expect("Hex color pattern should be valid");
}

const NAMED_COLORS: &[(&str, [u8; 3])] = &[
    ("white", [255, 255, 255]),
    ("black", [0, 0, 0]),
    ("red", [255, 0, 0]),
    ("green", [0, 128, 0]),
    ("lime", [0, 255, 0]),
    ("blue", [0, 0, 255]),
    ("yellow", [255, 255, 0]),
    ("cyan", [0, 255, 255]),
    ("magenta", [255, 0, 255]),
    ("gray", [128, 128, 128]),
    ("grey", [128, 128, 128]),
    ("orange", [255, 165, 0]),
    ("purple", [128, 0, 128]),
    ("pink", [255, 192, 203]),
    ("brown", [165, 42, 42]),
    ("navy", [0, 0, 128]),
];

/// Solid background color, as the user wrote it and resolved to RGB
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundColor {
    spec: String,
    rgb: [u8; 3],
}

impl BackgroundColor {
    /// The default replacement color, `#00FF00`
    pub fn green() -> Self {
        Self {
            spec: crate::config::DEFAULT_BACKGROUND_COLOR.to_string(),
            rgb: [0, 255, 0],
        }
    }

    pub fn spec(&self) -> &str {
        &self.spec
    }

    pub fn rgb(&self) -> [u8; 3] {
        self.rgb
    }

    /// Names accepted by [`FromStr`]
    pub fn named_colors() -> impl Iterator<Item = &'static str> {
        NAMED_COLORS.iter().map(|(name, _)| *name)
    }
}

impl fmt::Display for BackgroundColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spec)
    }
}

/// Input that is neither a known color name nor a hex code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorParseError(pub String);

impl fmt::Display for ColorParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized color: {}", self.0)
    }
}

impl std::error::Error for ColorParseError {}

impl FromStr for BackgroundColor {
    type Err = ColorParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let lowered = trimmed.to_ascii_lowercase();

        if let Some((name, rgb)) = NAMED_COLORS.iter().find(|(name, _)| *name == lowered) {
            return Ok(Self {
                spec: (*name).to_string(),
                rgb: *rgb,
            });
        }

        if !HEX_COLOR.is_match(trimmed) {
            return Err(ColorParseError(trimmed.to_string()));
        }

        let digits = trimmed.trim_start_matches('#');
        let expanded: String = if digits.len() == 3 {
            digits.chars().flat_map(|c| [c, c]).collect()
        } else {
            digits.to_string()
        };

        let channel = |i: usize| {
            u8::from_str_radix(&expanded[i..i + 2], 16)
                .map_err(|_| ColorParseError(trimmed.to_string()))
        };

        Ok(Self {
            spec: format!("#{}", expanded.to_ascii_uppercase()),
            rgb: [channel(0)?, channel(2)?, channel(4)?],
        })
    }
}

/// A provisioned temporary mailbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mailbox {
    pub login: String,
    pub domain: String,
}

impl Mailbox {
    pub fn address(&self) -> String {
        format!("{}@{}", self.login, self.domain)
    }
}

/// An outstanding temporary phone number order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneOrder {
    pub order_id: u64,
    pub phone: String,
}

/// Everything the bot remembers about one user
#[derive(Debug)]
pub struct Session {
    pub pending_action: PendingAction,
    pub resize_target: Option<ResizeTarget>,
    pub background_color: Option<BackgroundColor>,
    /// Retained background for the replace action, deleted when dropped
    pub background_image: Option<StagedFile>,
    pub pending_phone_order: Option<PhoneOrder>,
    pub pending_mailbox: Option<Mailbox>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            pending_action: PendingAction::None,
            resize_target: None,
            background_color: None,
            background_image: None,
            pending_phone_order: None,
            pending_mailbox: None,
            updated_at: Utc::now(),
        }
    }
}

impl Session {
    /// Replace the pending action; the previous one is discarded
    pub fn set_action(&mut self, action: PendingAction) {
        self.pending_action = action;
    }

    /// Store a new background image, releasing the previous one
    pub fn replace_background_image(&mut self, image: StagedFile) {
        self.background_image = Some(image);
    }

    /// Clear every field, releasing any retained file
    pub fn reset(&mut self) {
        *self = Session::default();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            pending_action: self.pending_action,
            resize_target: self.resize_target,
            background_color: self.background_color.clone(),
            background_image: self
                .background_image
                .as_ref()
                .map(|image| image.path().to_path_buf()),
            pending_phone_order: self.pending_phone_order.clone(),
            pending_mailbox: self.pending_mailbox.clone(),
        }
    }
}

/// Owned copy of a session's observable fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub pending_action: PendingAction,
    pub resize_target: Option<ResizeTarget>,
    pub background_color: Option<BackgroundColor>,
    pub background_image: Option<PathBuf>,
    pub pending_phone_order: Option<PhoneOrder>,
    pub pending_mailbox: Option<Mailbox>,
}

/// In-memory map of sessions with one async guard per user.
///
/// Handling of one user's events is serialized by holding that user's guard;
/// different users only share the map's shards.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<UserKey, Arc<Mutex<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the session for `user`, creating it on first use
    pub async fn lock(&self, user: UserKey) -> OwnedMutexGuard<Session> {
        let cell = Arc::clone(&*self.sessions.entry(user).or_default());
        cell.lock_owned().await
    }

    /// Copy of the user's session fields, if the user has a session
    pub async fn snapshot(&self, user: UserKey) -> Option<SessionSnapshot> {
        let cell = self.sessions.get(&user).map(|entry| Arc::clone(entry.value()))?;
        let session = cell.lock().await;
        Some(session.snapshot())
    }

    /// Drop sessions idle for longer than `max_idle` as of `now`.
    ///
    /// Sessions that are locked or about to be locked are kept. Dropping a
    /// session removes its retained background file. Returns how many were
    /// evicted.
    pub fn evict_idle(&self, now: DateTime<Utc>, max_idle: Duration) -> usize {
        let Ok(max_idle) = chrono::Duration::from_std(max_idle) else {
            return 0;
        };
        let cutoff = now - max_idle;
        let before = self.sessions.len();
        self.sessions.retain(|_, cell| {
            if Arc::strong_count(cell) > 1 {
                return true;
            }
            match cell.try_lock() {
                Ok(session) => session.updated_at >= cutoff,
                Err(_) => true,
            }
        });
        before.saturating_sub(self.sessions.len())
    }

    pub fn contains(&self, user: UserKey) -> bool {
        self.sessions.contains_key(&user)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
