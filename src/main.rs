use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use teloxide::prelude::*;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use superbot::bot::{self, BotState};
use superbot::config::{AppConfig, MAILBOX_API_ENDPOINT, PHONE_API_ENDPOINT, REMOVE_BG_ENDPOINT};
use superbot::contacts::TempContactService;
use superbot::localization::init_localization;
use superbot::media::{LocalMediaOperations, RemoveBgClient, VideoFetcher};
use superbot::publisher::FileIoPublisher;
use superbot::state_machine::SessionMachine;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Periodically drop idle sessions so their retained files are removed
fn spawn_idle_sweep(state: Arc<BotState>, ttl: Duration) {
    let period = (ttl / 4).clamp(Duration::from_secs(60), Duration::from_secs(60 * 60));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let evicted = state.store.evict_idle(chrono::Utc::now(), ttl);
            if evicted > 0 {
                info!(evicted, remaining = state.store.len(), "Evicted idle sessions");
            } else {
                debug!(remaining = state.store.len(), "Idle sweep found nothing to evict");
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    init_tracing();
    info!("Starting Super Bot");

    let config = AppConfig::from_env()?;
    init_localization()?;

    std::fs::create_dir_all(&config.core.staging_dir).with_context(|| {
        format!(
            "Failed to create staging directory {}",
            config.core.staging_dir.display()
        )
    })?;

    let http = reqwest::Client::builder()
        .user_agent(concat!("superbot/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let media = LocalMediaOperations::new(
        RemoveBgClient::new(http.clone(), REMOVE_BG_ENDPOINT, config.remove_bg_api_key.clone()),
        VideoFetcher::new(&config.ytdlp_bin, &config.core.staging_dir),
    );
    let publisher = FileIoPublisher::new(http.clone(), &config.fileio_endpoint);
    let contacts = TempContactService::new(
        http,
        MAILBOX_API_ENDPOINT,
        PHONE_API_ENDPOINT,
        config.temp_number_api_key.clone(),
    );

    let machine = SessionMachine::new(
        Arc::new(media),
        Arc::new(publisher),
        Arc::new(contacts),
        config.core.clone(),
    );
    let state = Arc::new(BotState::new(machine));
    spawn_idle_sweep(Arc::clone(&state), config.core.session_idle_ttl);

    let bot = Bot::new(config.telegram_token.clone());

    info!(
        staging_dir = %config.core.staging_dir.display(),
        "Bot initialized, starting dispatcher"
    );

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(bot::message_handler))
        .branch(Update::filter_callback_query().endpoint(bot::callback_handler));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
