//! # Configuration Module
//!
//! Runtime configuration for the bot: session defaults, delivery limits for
//! produced artifacts, collaborator timeouts, and the credentials read from
//! the environment at startup.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::session::{BackgroundColor, ResizeTarget};

// Constants for session defaults
pub const DEFAULT_RESIZE_WIDTH: u32 = 512;
pub const DEFAULT_RESIZE_HEIGHT: u32 = 512;
pub const DEFAULT_BACKGROUND_COLOR: &str = "#00FF00";
pub const MAX_RESIZE_DIMENSION: u32 = 10_000;

// Constants for delivery
pub const VIDEO_INLINE_LIMIT: u64 = 50 * 1024 * 1024; // 50MB, Telegram bot upload cap
pub const PHOTO_INLINE_LIMIT: u64 = 10 * 1024 * 1024; // 10MB, Telegram sendPhoto cap
pub const PHOTO_MAX_DIMENSION_SUM: u32 = 10_000; // width + height accepted by sendPhoto
pub const FILEIO_ENDPOINT: &str = "https://file.io";
pub const REMOVE_BG_ENDPOINT: &str = "https://api.remove.bg/v1.0/removebg";
pub const MAILBOX_API_ENDPOINT: &str = "https://www.1secmail.com/api/v1/";
pub const PHONE_API_ENDPOINT: &str = "https://5sim.net/v1";
pub const YTDLP_BIN: &str = "yt-dlp";
pub const SESSION_IDLE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Values a session falls back to when the user never configured them
#[derive(Debug, Clone)]
pub struct SessionDefaults {
    pub resize_target: ResizeTarget,
    pub background_color: BackgroundColor,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            resize_target: ResizeTarget::new(DEFAULT_RESIZE_WIDTH, DEFAULT_RESIZE_HEIGHT)
                .expect("default resize target is positive"),
            background_color: BackgroundColor::green(),
        }
    }
}

/// Size thresholds above which a result is published instead of sent inline
#[derive(Debug, Clone)]
pub struct DeliveryLimits {
    /// Videos strictly smaller than this are sent inline
    pub video_inline_limit: u64,
    /// Photos up to this size are sent inline
    pub photo_inline_limit: u64,
    /// Photos whose width plus height exceeds this are published
    pub photo_max_dimension_sum: u32,
}

impl Default for DeliveryLimits {
    fn default() -> Self {
        Self {
            video_inline_limit: VIDEO_INLINE_LIMIT,
            photo_inline_limit: PHOTO_INLINE_LIMIT,
            photo_max_dimension_sum: PHOTO_MAX_DIMENSION_SUM,
        }
    }
}

/// Upper bounds for calls to external collaborators
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Mailbox and phone-number lookups
    pub lookup: Duration,
    /// Background removal, compositing, resizing
    pub media: Duration,
    /// Video retrieval
    pub video: Duration,
    /// Artifact publishing
    pub publish: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            lookup: Duration::from_secs(10),
            media: Duration::from_secs(60),
            video: Duration::from_secs(180),
            publish: Duration::from_secs(120),
        }
    }
}

/// Configuration consumed by the session state machine
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub defaults: SessionDefaults,
    pub limits: DeliveryLimits,
    pub timeouts: TimeoutConfig,
    /// Largest width or height accepted by `/resize`
    pub max_resize_dimension: u32,
    /// Directory where retained and staged files are written
    pub staging_dir: PathBuf,
    /// Sessions untouched for this long are dropped by the idle sweep
    pub session_idle_ttl: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            defaults: SessionDefaults::default(),
            limits: DeliveryLimits::default(),
            timeouts: TimeoutConfig::default(),
            max_resize_dimension: MAX_RESIZE_DIMENSION,
            staging_dir: env::temp_dir(),
            session_idle_ttl: SESSION_IDLE_TTL,
        }
    }
}

/// Full application configuration, including credentials
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub telegram_token: String,
    pub remove_bg_api_key: Option<String>,
    pub temp_number_api_key: Option<String>,
    pub fileio_endpoint: String,
    pub ytdlp_bin: String,
    pub core: CoreConfig,
}

impl AppConfig {
    /// Read configuration from the process environment.
    ///
    /// `TELEGRAM_TOKEN` is required; everything else has a default.
    pub fn from_env() -> Result<Self> {
        let telegram_token =
            env::var("TELEGRAM_TOKEN").context("TELEGRAM_TOKEN must be set")?;
        Self::from_lookup(telegram_token, |key| env::var(key).ok())
    }

    /// Build a configuration from a token and an arbitrary key lookup
    pub fn from_lookup<F>(telegram_token: String, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if telegram_token.trim().is_empty() {
            anyhow::bail!("TELEGRAM_TOKEN is empty");
        }

        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let mut core = CoreConfig::default();

        if let Some(dir) = non_empty("STAGING_DIR") {
            core.staging_dir = PathBuf::from(dir);
        }
        if let Some(mb) = non_empty("VIDEO_INLINE_LIMIT_MB") {
            core.limits.video_inline_limit = parse_megabytes("VIDEO_INLINE_LIMIT_MB", &mb)?;
        }
        if let Some(mb) = non_empty("PHOTO_INLINE_LIMIT_MB") {
            core.limits.photo_inline_limit = parse_megabytes("PHOTO_INLINE_LIMIT_MB", &mb)?;
        }
        if let Some(secs) = non_empty("MEDIA_TIMEOUT_SECS") {
            core.timeouts.media = parse_seconds("MEDIA_TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = non_empty("VIDEO_TIMEOUT_SECS") {
            core.timeouts.video = parse_seconds("VIDEO_TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = non_empty("SESSION_IDLE_TTL_SECS") {
            core.session_idle_ttl = parse_seconds("SESSION_IDLE_TTL_SECS", &secs)?;
        }

        Ok(Self {
            telegram_token,
            remove_bg_api_key: non_empty("REMOVE_BG_API_KEY"),
            temp_number_api_key: non_empty("TEMP_NUMBER_API_KEY"),
            fileio_endpoint: non_empty("FILEIO_ENDPOINT")
                .unwrap_or_else(|| FILEIO_ENDPOINT.to_string()),
            ytdlp_bin: non_empty("YTDLP_BIN").unwrap_or_else(|| YTDLP_BIN.to_string()),
            core,
        })
    }
}

fn parse_megabytes(key: &str, value: &str) -> Result<u64> {
    let mb: u64 = value
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a whole number of megabytes"))?;
    mb.checked_mul(1024 * 1024)
        .with_context(|| format!("{key} is too large"))
}

fn parse_seconds(key: &str, value: &str) -> Result<Duration> {
    let secs: u64 = value
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a whole number of seconds"))?;
    if secs == 0 {
        anyhow::bail!("{key} must be greater than zero");
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_core_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.defaults.resize_target.width(), 512);
        assert_eq!(config.defaults.resize_target.height(), 512);
        assert_eq!(config.defaults.background_color.rgb(), [0, 255, 0]);
        assert_eq!(config.limits.video_inline_limit, 50 * 1024 * 1024);
        assert_eq!(config.limits.photo_inline_limit, 10 * 1024 * 1024);
        assert_eq!(config.limits.photo_max_dimension_sum, 10_000);
        assert!(config.timeouts.lookup < config.timeouts.video);
    }

    #[test]
    fn test_from_lookup_uses_defaults() {
        let config = AppConfig::from_lookup("123:abc".to_string(), lookup_from(&[])).unwrap();
        assert_eq!(config.fileio_endpoint, FILEIO_ENDPOINT);
        assert_eq!(config.ytdlp_bin, "yt-dlp");
        assert!(config.remove_bg_api_key.is_none());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = AppConfig::from_lookup(
            "123:abc".to_string(),
            lookup_from(&[
                ("REMOVE_BG_API_KEY", "key"),
                ("VIDEO_INLINE_LIMIT_MB", "20"),
                ("PHOTO_INLINE_LIMIT_MB", "5"),
                ("VIDEO_TIMEOUT_SECS", "30"),
                ("SESSION_IDLE_TTL_SECS", "600"),
                ("TEMP_NUMBER_API_KEY", "  "),
            ]),
        )
        .unwrap();
        assert_eq!(config.remove_bg_api_key.as_deref(), Some("key"));
        assert!(config.temp_number_api_key.is_none());
        assert_eq!(config.core.limits.video_inline_limit, 20 * 1024 * 1024);
        assert_eq!(config.core.limits.photo_inline_limit, 5 * 1024 * 1024);
        assert_eq!(config.core.timeouts.video, Duration::from_secs(30));
        assert_eq!(config.core.session_idle_ttl, Duration::from_secs(600));
    }

    #[test]
    fn test_from_lookup_rejects_bad_numbers() {
        let result = AppConfig::from_lookup(
            "123:abc".to_string(),
            lookup_from(&[("VIDEO_TIMEOUT_SECS", "0")]),
        );
        assert!(result.is_err());

        let result = AppConfig::from_lookup(
            "123:abc".to_string(),
            lookup_from(&[("VIDEO_INLINE_LIMIT_MB", "lots")]),
        );
        assert!(result.is_err());

        let result = AppConfig::from_lookup(
            "123:abc".to_string(),
            lookup_from(&[("PHOTO_INLINE_LIMIT_MB", "18446744073709551615")]),
        );
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "PHOTO_INLINE_LIMIT_MB is too large");
    }

    #[test]
    fn test_empty_token_is_fatal() {
        assert!(AppConfig::from_lookup("  ".to_string(), lookup_from(&[])).is_err());
    }
}
