//! # Session State Machine Module
//!
//! Decides what each incoming event means for the user who sent it. A menu
//! selection sets the single pending action (last write wins), commands tune
//! the session's parameters, and photos or links are routed to the media
//! operation the pending action names. Every collaborator failure becomes a
//! localized message and leaves the session as it was.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::CoreConfig;
use crate::contacts::ContactProvider;
use crate::errors::ServiceError;
use crate::event::{Event, EventKind, Response, Selection, VideoPayload};
use crate::localization::{t_args_lang, t_lang};
use crate::media::{imaging, MediaOperations};
use crate::menus;
use crate::publisher::ArtifactPublisher;
use crate::session::{
    BackgroundColor, PendingAction, Platform, ResizeTarget, Session, SessionStore, UserKey,
};
use crate::staging::StagedFile;

/// Messages listed by `/inbox`
pub const INBOX_LIMIT: usize = 10;
/// Longest mail body shown by `/read`, in characters
pub const MAIL_BODY_LIMIT: usize = 3500;

/// Operations named in failure messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    BackgroundRemoval,
    BackgroundColor,
    BackgroundReplacement,
    SaveBackground,
    Resize,
    VideoDownload,
    TempMail,
    Inbox,
    ReadMail,
    TempNumber,
    Otp,
}

impl Operation {
    fn message_key(&self) -> &'static str {
        match self {
            Operation::BackgroundRemoval => "operation-background-removal",
            Operation::BackgroundColor => "operation-background-color",
            Operation::BackgroundReplacement => "operation-background-replacement",
            Operation::SaveBackground => "operation-save-background",
            Operation::Resize => "operation-resize",
            Operation::VideoDownload => "operation-video-download",
            Operation::TempMail => "operation-temp-mail",
            Operation::Inbox => "operation-inbox",
            Operation::ReadMail => "operation-read-mail",
            Operation::TempNumber => "operation-temp-number",
            Operation::Otp => "operation-otp",
        }
    }
}

/// Run `future`, failing with [`ServiceError::Timeout`] after `limit`
pub async fn bounded<T, F>(limit: Duration, future: F) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| ServiceError::Timeout(limit))?
}

/// Parse `/resize W H` arguments; each side must be within `1..=max`
pub fn parse_resize_args(args: &[String], max: u32) -> Option<ResizeTarget> {
    let [width, height] = args else {
        return None;
    };
    let width: u32 = width.parse().ok()?;
    let height: u32 = height.parse().ok()?;
    if width > max || height > max {
        return None;
    }
    ResizeTarget::new(width, height)
}

/// Whether `text` is an absolute http(s) URL with a host
pub fn is_well_formed_url(text: &str) -> bool {
    match reqwest::Url::parse(text.trim()) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().is_some_and(|host| !host.is_empty())
        }
        Err(_) => false,
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(limit).collect();
    truncated.push('…');
    truncated
}

fn event_label(kind: &EventKind) -> String {
    match kind {
        EventKind::Selection(selection) => format!("selection:{}", selection.tag()),
        EventKind::Command { name, .. } => format!("command:{name}"),
        EventKind::Photo(bytes) => format!("photo:{}B", bytes.len()),
        EventKind::Text(_) => "text".to_string(),
        EventKind::Reset => "reset".to_string(),
    }
}

/// The per-user session state machine
pub struct SessionMachine {
    media: Arc<dyn MediaOperations>,
    publisher: Arc<dyn ArtifactPublisher>,
    contacts: Arc<dyn ContactProvider>,
    config: CoreConfig,
}

impl SessionMachine {
    pub fn new(
        media: Arc<dyn MediaOperations>,
        publisher: Arc<dyn ArtifactPublisher>,
        contacts: Arc<dyn ContactProvider>,
        config: CoreConfig,
    ) -> Self {
        Self {
            media,
            publisher,
            contacts,
            config,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Platform whose video `event` would start downloading, if any.
    ///
    /// Lets the host acknowledge a link before the slow fetch begins.
    pub async fn pending_video_download(&self, store: &SessionStore, event: &Event) -> Option<Platform> {
        let EventKind::Text(text) = &event.kind else {
            return None;
        };
        if !is_well_formed_url(text) {
            return None;
        }
        match store.snapshot(event.user).await?.pending_action {
            PendingAction::DownloadVideo(platform) => Some(platform),
            _ => None,
        }
    }

    /// Handle one event for its user.
    ///
    /// The user's session guard is held until the response is built, so
    /// events of one user never interleave.
    pub async fn handle_event(&self, store: &SessionStore, event: Event) -> Response {
        let Event {
            user,
            language_code,
            kind,
        } = event;
        let lang = language_code.as_deref();

        let mut session = store.lock(user).await;
        debug!(
            user_id = %user,
            event = %event_label(&kind),
            state = ?session.pending_action,
            "Handling event"
        );

        let response = match kind {
            EventKind::Selection(selection) => {
                self.on_selection(&mut session, user, selection, lang).await
            }
            EventKind::Command { name, args } => {
                self.on_command(&mut session, user, &name, &args, lang).await
            }
            EventKind::Photo(bytes) => self.on_photo(&mut session, user, bytes, lang).await,
            EventKind::Text(text) => self.on_text(&mut session, user, &text, lang).await,
            EventKind::Reset => {
                session.reset();
                info!(user_id = %user, "Session reset");
                Response::Message(t_lang("reset-done", lang))
            }
        };

        session.touch();
        response
    }

    fn failure(&self, user: UserKey, operation: Operation, error: &ServiceError, lang: Option<&str>) -> Response {
        warn!(
            user_id = %user,
            operation = ?operation,
            error = %error,
            transient = error.is_transient(),
            "Operation failed"
        );
        let operation_name = t_lang(operation.message_key(), lang);
        let detail = error.to_string();
        Response::Message(t_args_lang(
            "operation-failed",
            &[("operation", &operation_name), ("error", &detail)],
            lang,
        ))
    }

    fn resize_target(&self, session: &Session) -> ResizeTarget {
        session
            .resize_target
            .unwrap_or(self.config.defaults.resize_target)
    }

    fn background_color(&self, session: &Session) -> BackgroundColor {
        session
            .background_color
            .clone()
            .unwrap_or_else(|| self.config.defaults.background_color.clone())
    }

    async fn on_selection(
        &self,
        session: &mut Session,
        user: UserKey,
        selection: Selection,
        lang: Option<&str>,
    ) -> Response {
        match selection {
            Selection::MainMenu => menus::main_menu(false, lang),
            Selection::BackgroundTools => menus::background_menu(lang),
            Selection::VideoTools => menus::video_menu(lang),
            Selection::RemoveBackground => {
                session.set_action(PendingAction::RemoveBackground);
                Response::Message(t_lang("prompt-remove-background", lang))
            }
            Selection::ChangeColor => {
                if session.background_color.is_none() {
                    session.background_color = Some(self.config.defaults.background_color.clone());
                }
                session.set_action(PendingAction::RecolorBackground);
                let color = self.background_color(session);
                Response::Message(t_args_lang(
                    "prompt-change-color",
                    &[("color", color.spec())],
                    lang,
                ))
            }
            Selection::ReplaceBackground => {
                session.set_action(PendingAction::AwaitingBackgroundImage);
                Response::Message(t_lang("prompt-replace-background", lang))
            }
            Selection::Resize => {
                if session.resize_target.is_none() {
                    session.resize_target = Some(self.config.defaults.resize_target);
                }
                session.set_action(PendingAction::Resize);
                let size = self.resize_target(session).to_string();
                Response::Message(t_args_lang("prompt-resize", &[("size", &size)], lang))
            }
            Selection::DownloadVideo(platform) => {
                session.set_action(PendingAction::DownloadVideo(platform));
                Response::Message(t_args_lang(
                    "prompt-video",
                    &[("platform", platform.display_name())],
                    lang,
                ))
            }
            Selection::TempMail => {
                let created = bounded(self.config.timeouts.lookup, self.contacts.create_mailbox()).await;
                match created {
                    Ok(mailbox) => {
                        let address = mailbox.address();
                        session.pending_mailbox = Some(mailbox);
                        info!(user_id = %user, "Temporary mailbox assigned");
                        Response::Message(t_args_lang("temp-mail-ready", &[("address", &address)], lang))
                    }
                    Err(e) => self.failure(user, Operation::TempMail, &e, lang),
                }
            }
            Selection::TempNumber => {
                let ordered = bounded(self.config.timeouts.lookup, self.contacts.order_number()).await;
                match ordered {
                    Ok(order) => {
                        let phone = order.phone.clone();
                        session.pending_phone_order = Some(order);
                        info!(user_id = %user, "Temporary number assigned");
                        Response::Message(t_args_lang("temp-number-ready", &[("phone", &phone)], lang))
                    }
                    Err(e) => self.failure(user, Operation::TempNumber, &e, lang),
                }
            }
        }
    }

    async fn on_command(
        &self,
        session: &mut Session,
        user: UserKey,
        name: &str,
        args: &[String],
        lang: Option<&str>,
    ) -> Response {
        match name {
            "start" => menus::main_menu(true, lang),
            "help" => Response::Message(t_lang("help", lang)),
            "resize" => match parse_resize_args(args, self.config.max_resize_dimension) {
                Some(target) => {
                    session.resize_target = Some(target);
                    debug!(user_id = %user, size = %target, "Resize target set");
                    Response::Message(t_args_lang(
                        "resize-set",
                        &[("size", &target.to_string())],
                        lang,
                    ))
                }
                None => {
                    let max = self.config.max_resize_dimension.to_string();
                    Response::Message(t_args_lang("resize-usage", &[("max", &max)], lang))
                }
            },
            "color" => {
                let parsed = match args {
                    [spec] => spec.parse::<BackgroundColor>().ok(),
                    _ => None,
                };
                match parsed {
                    Some(color) => {
                        let spec = color.spec().to_string();
                        session.background_color = Some(color);
                        Response::Message(t_args_lang("color-set", &[("color", &spec)], lang))
                    }
                    None => {
                        let names = BackgroundColor::named_colors().collect::<Vec<_>>().join(", ");
                        Response::Message(t_args_lang("color-usage", &[("names", &names)], lang))
                    }
                }
            }
            "inbox" => self.inbox(session, user, lang).await,
            "read" => self.read_mail(session, user, args, lang).await,
            "otp" => self.check_otp(session, user, lang).await,
            "reset" => {
                session.reset();
                info!(user_id = %user, "Session reset");
                Response::Message(t_lang("reset-done", lang))
            }
            other => {
                debug!(user_id = %user, command = other, "Unknown command");
                Response::Message(t_lang("unknown-command", lang))
            }
        }
    }

    async fn inbox(&self, session: &Session, user: UserKey, lang: Option<&str>) -> Response {
        let Some(mailbox) = session.pending_mailbox.as_ref() else {
            return Response::Message(t_lang("need-mailbox-first", lang));
        };
        let address = mailbox.address();

        let listed = bounded(self.config.timeouts.lookup, self.contacts.list_messages(mailbox)).await;
        let messages = match listed {
            Ok(messages) => messages,
            Err(e) => return self.failure(user, Operation::Inbox, &e, lang),
        };

        if messages.is_empty() {
            return Response::Message(t_args_lang("inbox-empty", &[("address", &address)], lang));
        }

        let mut lines = vec![t_args_lang("inbox-header", &[("address", &address)], lang)];
        for message in messages.iter().take(INBOX_LIMIT) {
            let id = message.id.to_string();
            lines.push(t_args_lang(
                "inbox-entry",
                &[
                    ("id", &id),
                    ("from", &message.from),
                    ("subject", &message.subject),
                ],
                lang,
            ));
        }
        lines.push(t_lang("inbox-footer", lang));
        Response::Message(lines.join("\n"))
    }

    async fn read_mail(
        &self,
        session: &Session,
        user: UserKey,
        args: &[String],
        lang: Option<&str>,
    ) -> Response {
        let Some(mailbox) = session.pending_mailbox.as_ref() else {
            return Response::Message(t_lang("need-mailbox-first", lang));
        };
        let Some(id) = (match args {
            [id] => id.trim_start_matches('#').parse::<u64>().ok(),
            _ => None,
        }) else {
            return Response::Message(t_lang("read-usage", lang));
        };

        let read = bounded(self.config.timeouts.lookup, self.contacts.read_message(mailbox, id)).await;
        match read {
            Ok(message) => {
                let body = truncate_chars(message.readable_body().trim(), MAIL_BODY_LIMIT);
                Response::Message(t_args_lang(
                    "mail-message",
                    &[
                        ("from", &message.from),
                        ("subject", &message.subject),
                        ("date", &message.date),
                        ("body", &body),
                    ],
                    lang,
                ))
            }
            Err(e) => self.failure(user, Operation::ReadMail, &e, lang),
        }
    }

    async fn check_otp(&self, session: &Session, user: UserKey, lang: Option<&str>) -> Response {
        let Some(order) = session.pending_phone_order.as_ref() else {
            return Response::Message(t_lang("need-number-first", lang));
        };
        match bounded(self.config.timeouts.lookup, self.contacts.check_sms(order)).await {
            Ok(Some(code)) => Response::Message(t_args_lang("otp-received", &[("code", &code)], lang)),
            Ok(None) => Response::Message(t_lang("otp-pending", lang)),
            Err(e) => self.failure(user, Operation::Otp, &e, lang),
        }
    }

    async fn on_photo(
        &self,
        session: &mut Session,
        user: UserKey,
        photo: Vec<u8>,
        lang: Option<&str>,
    ) -> Response {
        match session.pending_action {
            PendingAction::AwaitingBackgroundImage => self.save_background(session, user, &photo, lang),
            PendingAction::ReplaceBackground => {
                let Some(background) = session.background_image.as_ref() else {
                    return Response::Message(t_lang("need-background-first", lang));
                };
                let operation = Operation::BackgroundReplacement;
                let result = async {
                    let background = background.read().await?;
                    let cutout = self.cut_out(&photo).await?;
                    bounded(self.config.timeouts.media, self.media.composite(&cutout, &background)).await
                }
                .await;
                self.deliver_photo(user, operation, result, t_lang("caption-replaced", lang), lang)
                    .await
            }
            PendingAction::RemoveBackground => {
                let result = self.cut_out(&photo).await;
                self.deliver_photo(
                    user,
                    Operation::BackgroundRemoval,
                    result,
                    t_lang("caption-removed", lang),
                    lang,
                )
                .await
            }
            PendingAction::RecolorBackground => {
                let color = self.background_color(session);
                let result = async {
                    let cutout = self.cut_out(&photo).await?;
                    bounded(self.config.timeouts.media, self.media.fill_background(&cutout, &color)).await
                }
                .await;
                let caption = t_args_lang("caption-recolored", &[("color", color.spec())], lang);
                self.deliver_photo(user, Operation::BackgroundColor, result, caption, lang)
                    .await
            }
            PendingAction::Resize => {
                let target = self.resize_target(session);
                let result = bounded(
                    self.config.timeouts.media,
                    self.media.resize(&photo, target.width(), target.height()),
                )
                .await;
                let caption = t_args_lang("caption-resized", &[("size", &target.to_string())], lang);
                self.deliver_photo(user, Operation::Resize, result, caption, lang)
                    .await
            }
            PendingAction::None | PendingAction::DownloadVideo(_) => {
                Response::Message(t_lang("select-option-first", lang))
            }
        }
    }

    async fn cut_out(&self, photo: &[u8]) -> Result<Vec<u8>, ServiceError> {
        let cutout = bounded(self.config.timeouts.media, self.media.remove_background(photo)).await?;
        if cutout.is_empty() {
            return Err(ServiceError::EmptyResult);
        }
        Ok(cutout)
    }

    /// Keep the photo as the user's background image, replacing any earlier one
    fn save_background(
        &self,
        session: &mut Session,
        user: UserKey,
        photo: &[u8],
        lang: Option<&str>,
    ) -> Response {
        if !imaging::is_supported_image(photo) {
            return self.failure(user, Operation::SaveBackground, &ServiceError::UnsupportedImage, lang);
        }
        let staged = StagedFile::write(&self.config.staging_dir, photo, imaging::suffix_for(photo));
        match staged {
            Ok(file) => {
                info!(user_id = %user, path = %file.path().display(), "Background image saved");
                session.replace_background_image(file);
                session.set_action(PendingAction::ReplaceBackground);
                Response::Message(t_lang("background-saved", lang))
            }
            Err(e) => self.failure(user, Operation::SaveBackground, &ServiceError::Io(e), lang),
        }
    }

    async fn deliver_photo(
        &self,
        user: UserKey,
        operation: Operation,
        result: Result<Vec<u8>, ServiceError>,
        caption: String,
        lang: Option<&str>,
    ) -> Response {
        let bytes = match result {
            Ok(bytes) if bytes.is_empty() => {
                return self.failure(user, operation, &ServiceError::EmptyResult, lang)
            }
            Ok(bytes) => bytes,
            Err(e) => return self.failure(user, operation, &e, lang),
        };

        if self.fits_inline(&bytes) {
            info!(user_id = %user, operation = ?operation, size_bytes = bytes.len(), "Returning photo");
            return Response::Photo { bytes, caption };
        }

        let published = match StagedFile::write(&self.config.staging_dir, &bytes, ".png") {
            Ok(file) => self.publish(file.path().to_path_buf()).await,
            Err(e) => Err(ServiceError::Io(e)),
        };
        match published {
            Ok(link) => Response::Message(t_args_lang("photo-large-link", &[("link", &link)], lang)),
            Err(e) => {
                warn!(user_id = %user, error = %e, "Publishing photo failed");
                Response::Message(t_lang("upload-failed", lang))
            }
        }
    }

    /// Whether a photo is within the host's inline size and dimension caps
    fn fits_inline(&self, bytes: &[u8]) -> bool {
        let limits = &self.config.limits;
        if bytes.len() as u64 > limits.photo_inline_limit {
            return false;
        }
        imaging::dimensions(bytes).map_or(true, |(width, height)| {
            u64::from(width) + u64::from(height) <= u64::from(limits.photo_max_dimension_sum)
        })
    }

    async fn publish(&self, path: PathBuf) -> Result<String, ServiceError> {
        bounded(self.config.timeouts.publish, self.publisher.publish(&path)).await
    }

    async fn on_text(
        &self,
        session: &mut Session,
        user: UserKey,
        text: &str,
        lang: Option<&str>,
    ) -> Response {
        match session.pending_action {
            PendingAction::DownloadVideo(platform) => {
                if is_well_formed_url(text) {
                    self.download_video(user, text.trim(), platform, lang).await
                } else {
                    Response::Message(t_lang("send-valid-link", lang))
                }
            }
            _ => Response::Message(t_lang("select-option-first", lang)),
        }
    }

    async fn download_video(
        &self,
        user: UserKey,
        url: &str,
        platform: Platform,
        lang: Option<&str>,
    ) -> Response {
        info!(user_id = %user, %platform, "Fetching video");
        let fetched = bounded(self.config.timeouts.video, self.media.fetch_video(url, platform)).await;
        let video = match fetched {
            Ok(video) => video,
            Err(e) => return self.failure(user, Operation::VideoDownload, &e, lang),
        };

        let size = match video.len() {
            Ok(0) => return self.failure(user, Operation::VideoDownload, &ServiceError::EmptyResult, lang),
            Ok(size) => size,
            Err(e) => return self.failure(user, Operation::VideoDownload, &ServiceError::Io(e), lang),
        };

        if size < self.config.limits.video_inline_limit {
            return match video.read().await {
                Ok(bytes) => Response::Video {
                    payload: VideoPayload::Inline(bytes),
                    caption: t_lang("caption-video", lang),
                },
                Err(e) => self.failure(user, Operation::VideoDownload, &ServiceError::Io(e), lang),
            };
        }

        info!(user_id = %user, size_bytes = size, "Video too large to send, publishing");
        match self.publish(video.path().to_path_buf()).await {
            Ok(link) => Response::Video {
                payload: VideoPayload::Link(link),
                caption: t_lang("video-large-link", lang),
            },
            Err(e) => {
                warn!(user_id = %user, error = %e, "Publishing video failed");
                Response::Message(t_lang("upload-failed", lang))
            }
        }
    }
}
