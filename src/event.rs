//! # Event Module
//!
//! Transport-independent events delivered to the state machine and the
//! responses it produces. The Telegram host translates updates into
//! [`Event`]s and renders [`Response`]s back into bot API calls.

use crate::session::{Platform, UserKey};

/// Menu buttons a user can press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    MainMenu,
    BackgroundTools,
    VideoTools,
    TempMail,
    TempNumber,
    RemoveBackground,
    ChangeColor,
    ReplaceBackground,
    Resize,
    DownloadVideo(Platform),
}

impl Selection {
    /// Callback data carried by the inline keyboard button
    pub fn tag(&self) -> String {
        match self {
            Selection::MainMenu => "back_main".to_string(),
            Selection::BackgroundTools => "submenu_bg".to_string(),
            Selection::VideoTools => "submenu_video".to_string(),
            Selection::TempMail => "temp_gmail".to_string(),
            Selection::TempNumber => "temp_number".to_string(),
            Selection::RemoveBackground => "removebg".to_string(),
            Selection::ChangeColor => "bgcolor".to_string(),
            Selection::ReplaceBackground => "bgimage".to_string(),
            Selection::Resize => "resize".to_string(),
            Selection::DownloadVideo(platform) => format!("video_{}", platform.tag()),
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        let selection = match tag {
            "back_main" => Selection::MainMenu,
            "submenu_bg" => Selection::BackgroundTools,
            "submenu_video" => Selection::VideoTools,
            "temp_gmail" => Selection::TempMail,
            "temp_number" => Selection::TempNumber,
            "removebg" => Selection::RemoveBackground,
            "bgcolor" => Selection::ChangeColor,
            "bgimage" => Selection::ReplaceBackground,
            "resize" => Selection::Resize,
            other => {
                let platform = other.strip_prefix("video_").and_then(Platform::from_tag)?;
                Selection::DownloadVideo(platform)
            }
        };
        Some(selection)
    }
}

/// What happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Selection(Selection),
    Command { name: String, args: Vec<String> },
    Photo(Vec<u8>),
    Text(String),
    Reset,
}

/// One incoming event, tagged with the user it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub user: UserKey,
    /// IETF language tag reported by the client, used for replies
    pub language_code: Option<String>,
    pub kind: EventKind,
}

impl Event {
    pub fn new(user: UserKey, kind: EventKind) -> Self {
        Self {
            user,
            language_code: None,
            kind,
        }
    }

    pub fn with_language(mut self, language_code: Option<String>) -> Self {
        self.language_code = language_code;
        self
    }

    pub fn selection(user: UserKey, selection: Selection) -> Self {
        Self::new(user, EventKind::Selection(selection))
    }

    pub fn command(user: UserKey, name: &str, args: &[&str]) -> Self {
        Self::new(
            user,
            EventKind::Command {
                name: name.to_string(),
                args: args.iter().map(|a| a.to_string()).collect(),
            },
        )
    }

    pub fn photo(user: UserKey, bytes: Vec<u8>) -> Self {
        Self::new(user, EventKind::Photo(bytes))
    }

    pub fn text(user: UserKey, text: &str) -> Self {
        Self::new(user, EventKind::Text(text.to_string()))
    }

    pub fn reset(user: UserKey) -> Self {
        Self::new(user, EventKind::Reset)
    }
}

/// One button of a menu prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuOption {
    pub label: String,
    pub selection: Selection,
}

/// A produced video, either sent as-is or as a link to the published file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoPayload {
    Inline(Vec<u8>),
    Link(String),
}

/// What the host should send back to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Message(String),
    Photo { bytes: Vec<u8>, caption: String },
    Video { payload: VideoPayload, caption: String },
    MenuPrompt { text: String, options: Vec<MenuOption> },
}

impl Response {
    /// Text of a `Message` response
    pub fn as_message(&self) -> Option<&str> {
        match self {
            Response::Message(text) => Some(text),
            _ => None,
        }
    }
}

/// Split `/name[@bot] args...` into a lowercase command name and its arguments
pub fn parse_command(text: &str) -> Option<(String, Vec<String>)> {
    let body = text.trim().strip_prefix('/')?;
    let mut parts = body.split_whitespace();
    let head = parts.next()?;
    let name = head.split('@').next().unwrap_or(head);
    if name.is_empty() {
        return None;
    }
    let args = parts.map(|s| s.to_string()).collect();
    Some((name.to_ascii_lowercase(), args))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_tags_round_trip() {
        let all = [
            Selection::MainMenu,
            Selection::BackgroundTools,
            Selection::VideoTools,
            Selection::TempMail,
            Selection::TempNumber,
            Selection::RemoveBackground,
            Selection::ChangeColor,
            Selection::ReplaceBackground,
            Selection::Resize,
            Selection::DownloadVideo(Platform::Instagram),
        ];
        for selection in all {
            assert_eq!(Selection::from_tag(&selection.tag()), Some(selection));
        }
    }

    #[test]
    fn test_unknown_tags() {
        assert_eq!(Selection::from_tag("video_vimeo"), None);
        assert_eq!(Selection::from_tag("video_"), None);
        assert_eq!(Selection::from_tag(""), None);
        assert_eq!(
            Selection::from_tag("video_tiktok"),
            Some(Selection::DownloadVideo(Platform::TikTok))
        );
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(
            parse_command("/resize 800 600"),
            Some(("resize".to_string(), vec!["800".to_string(), "600".to_string()]))
        );
        assert_eq!(
            parse_command("/Start@SuperBot"),
            Some(("start".to_string(), vec![]))
        );
        assert_eq!(
            parse_command("  /color   red  "),
            Some(("color".to_string(), vec!["red".to_string()]))
        );
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command("/"), None);
        assert_eq!(parse_command("/@bot"), None);
    }
}
