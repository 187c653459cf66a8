use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use superbot::bot::message_handler::text_event;
use superbot::bot::{callback_handler, menu_keyboard, BotState};
use superbot::config::{AppConfig, CoreConfig, DEFAULT_BACKGROUND_COLOR};
use superbot::errors::ServiceError;
use superbot::event::{Event, Response, Selection};
use superbot::localization::{init_localization, t_lang};
use superbot::contacts::TempContactService;
use superbot::media::{imaging, LocalMediaOperations, RemoveBgClient, VideoFetcher};
use superbot::menus;
use superbot::publisher::FileIoPublisher;
use superbot::session::{PendingAction, Platform, UserKey};
use superbot::staging::StagedFile;
use superbot::state_machine::SessionMachine;
use teloxide::types::{CallbackQuery, InlineKeyboardButtonKind};
use teloxide::Bot;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn setup_localization() {
    // Initialize localization if not already done
    let _ = init_localization();
}

fn callback_tags(response: &Response) -> Vec<String> {
    let Response::MenuPrompt { options, .. } = response else {
        panic!("expected a menu, got {response:?}");
    };
    menu_keyboard(options)
        .inline_keyboard
        .iter()
        .flatten()
        .map(|button| match &button.kind {
            InlineKeyboardButtonKind::CallbackData(data) => data.clone(),
            other => panic!("unexpected button kind {other:?}"),
        })
        .collect()
}

/// Test core configuration defaults
#[test]
fn test_core_config_defaults_reasonable() {
    let config = CoreConfig::default();

    assert_eq!(config.defaults.resize_target.width(), 512);
    assert_eq!(config.defaults.resize_target.height(), 512);
    assert_eq!(config.defaults.background_color.spec(), DEFAULT_BACKGROUND_COLOR);
    assert_eq!(config.limits.video_inline_limit, 50 * 1024 * 1024);
    assert_eq!(config.limits.photo_inline_limit, 10 * 1024 * 1024);
    assert_eq!(config.limits.photo_max_dimension_sum, 10_000);
    assert_eq!(config.session_idle_ttl, Duration::from_secs(24 * 60 * 60));
    assert!(config.timeouts.lookup < config.timeouts.media);
    assert!(config.timeouts.media < config.timeouts.video);
    assert_eq!(config.max_resize_dimension, 10_000);
}

#[test]
fn test_app_config_rejects_bad_values() {
    let lookup = |key: &str| match key {
        "VIDEO_TIMEOUT_SECS" => Some("0".to_string()),
        _ => None,
    };
    assert!(AppConfig::from_lookup("token".to_string(), lookup).is_err());
    assert!(AppConfig::from_lookup("   ".to_string(), |_| None).is_err());

    let config = AppConfig::from_lookup("token".to_string(), |key| match key {
        "VIDEO_TIMEOUT_SECS" => Some("30".to_string()),
        _ => None,
    })
    .unwrap();
    assert_eq!(config.core.timeouts.video, Duration::from_secs(30));
    assert!(config.remove_bg_api_key.is_none());
}

/// Test error message formatting
#[test]
fn test_error_message_formatting() {
    let error = ServiceError::Process("yt-dlp failed: ERROR: Private video".to_string());
    assert_eq!(
        error.to_string(),
        "Process error: yt-dlp failed: ERROR: Private video"
    );
    assert_eq!(ServiceError::EmptyResult.to_string(), "Operation returned no result");
}

#[test]
fn test_temp_file_cleanup() {
    let root = tempfile::tempdir().unwrap();
    let staged = StagedFile::write(root.path(), b"photo bytes", ".jpg").unwrap();
    let path = staged.path().to_path_buf();
    assert!(path.exists());
    assert!(staged.file_name().ends_with(".jpg"));

    drop(staged);
    assert!(!path.exists());
    assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
}

#[test]
fn test_image_format_validation() {
    assert!(!imaging::is_supported_image(b"GIF"));
    assert!(!imaging::is_supported_image(b"%PDF-1.7 not an image"));
    // JPEG magic bytes followed by padding
    let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0];
    jpeg.extend_from_slice(&[0; 16]);
    assert!(imaging::is_supported_image(&jpeg));
    assert_eq!(imaging::suffix_for(&jpeg), ".jpg");
}

#[test]
fn test_start_menu_keyboard() {
    setup_localization();
    let tags = callback_tags(&menus::main_menu(true, Some("en")));
    assert_eq!(
        tags,
        vec!["temp_gmail", "temp_number", "submenu_video", "submenu_bg", "resize"]
    );
}

#[test]
fn test_submenu_keyboards() {
    setup_localization();
    assert_eq!(
        callback_tags(&menus::background_menu(None)),
        vec!["removebg", "bgcolor", "bgimage", "back_main"]
    );
    assert_eq!(
        callback_tags(&menus::video_menu(None)),
        vec![
            "video_youtube",
            "video_tiktok",
            "video_facebook",
            "video_instagram",
            "back_main"
        ]
    );
}

#[test]
fn test_callback_data_parsing() {
    for tag in ["removebg", "bgcolor", "bgimage", "resize", "submenu_bg", "back_main"] {
        let selection = Selection::from_tag(tag).expect("known tag");
        assert_eq!(selection.tag(), tag);
    }
    assert_eq!(
        Selection::from_tag("video_facebook"),
        Some(Selection::DownloadVideo(Platform::Facebook))
    );
    assert_eq!(Selection::from_tag("delete_0"), None);
}

#[test]
fn test_help_command_response_contains_expected_content() {
    setup_localization();
    let help = t_lang("help", Some("en"));
    for command in ["/start", "/resize", "/color", "/inbox", "/read", "/otp", "/reset"] {
        assert!(help.contains(command), "help should mention {command}");
    }
}

#[test]
fn test_message_text_routing() {
    let user = UserKey(7);
    assert_eq!(text_event(user, "/reset"), Event::reset(user));
    assert_eq!(
        text_event(user, "/color #ff8800"),
        Event::command(user, "color", &["#ff8800"])
    );
    assert_eq!(text_event(user, "hello"), Event::text(user, "hello"));
}

/// Local stand-in for the Bot API that records the methods called.
///
/// `answerCallbackQuery` is rejected the way Telegram rejects expired
/// queries; every other method succeeds with a minimal message.
async fn start_bot_api() -> (reqwest::Url, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = reqwest::Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
    let methods = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&methods);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let methods = Arc::clone(&recorded);
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut chunk = [0u8; 4096];
                let header_end = loop {
                    let read = socket.read(&mut chunk).await.unwrap();
                    if read == 0 {
                        return;
                    }
                    request.extend_from_slice(&chunk[..read]);
                    if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                        break pos + 4;
                    }
                };
                let head = String::from_utf8_lossy(&request[..header_end]).to_string();
                let content_length = head
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                while request.len() < header_end + content_length {
                    let read = socket.read(&mut chunk).await.unwrap();
                    if read == 0 {
                        break;
                    }
                    request.extend_from_slice(&chunk[..read]);
                }

                let method = head
                    .split_whitespace()
                    .nth(1)
                    .and_then(|path| path.rsplit('/').next())
                    .unwrap_or_default()
                    .to_string();
                let body = if method == "answerCallbackQuery" {
                    r#"{"ok":false,"error_code":400,"description":"Bad Request: query is too old and response timeout expired or query ID is invalid"}"#
                } else {
                    r#"{"ok":true,"result":{"message_id":1,"date":0,"chat":{"id":5,"type":"private","first_name":"Ada"},"text":"ok"}}"#
                };
                methods.lock().unwrap().push(method);

                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    });

    (url, methods)
}

fn offline_state(staging: &std::path::Path) -> Arc<BotState> {
    let http = reqwest::Client::new();
    let media = LocalMediaOperations::new(
        RemoveBgClient::new(http.clone(), "http://127.0.0.1:9/", None),
        VideoFetcher::new("yt-dlp", staging),
    );
    let publisher = FileIoPublisher::new(http.clone(), "http://127.0.0.1:9/");
    let contacts = TempContactService::new(http, "http://127.0.0.1:9/", "http://127.0.0.1:9", None);
    let machine = SessionMachine::new(
        Arc::new(media),
        Arc::new(publisher),
        Arc::new(contacts),
        CoreConfig {
            staging_dir: staging.to_path_buf(),
            ..CoreConfig::default()
        },
    );
    Arc::new(BotState::new(machine))
}

#[tokio::test]
async fn test_selection_applies_when_callback_answer_fails() {
    setup_localization();
    let staging = tempfile::tempdir().unwrap();
    let state = offline_state(staging.path());
    let (api_url, methods) = start_bot_api().await;
    let bot = Bot::new("123:test").set_api_url(api_url);

    let query: CallbackQuery = serde_json::from_str(
        r#"{
            "id": "q-1",
            "from": {"id": 5, "is_bot": false, "first_name": "Ada", "language_code": "en"},
            "chat_instance": "ci-1",
            "data": "removebg"
        }"#,
    )
    .unwrap();

    callback_handler(bot, query, Arc::clone(&state)).await.unwrap();

    let snapshot = state.store.snapshot(UserKey(5)).await.unwrap();
    assert_eq!(snapshot.pending_action, PendingAction::RemoveBackground);
    assert_eq!(
        *methods.lock().unwrap(),
        vec!["answerCallbackQuery".to_string(), "sendMessage".to_string()]
    );
}
