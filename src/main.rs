use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::ChatKind;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use chatrelay::chatbot::command::Command;
use chatrelay::chatbot::openai::Client as OpenAiClient;
use chatrelay::chatbot::{ConversationMode, HistoryLog, IncomingMessage, RelayConfig, RelayEngine, TelegramClient};
use chatrelay::config::{Config, ConfigError};
use chatrelay::telegram_log::OperatorLogLayer;
use chatrelay::translations::Translations;
use chatrelay::user_config::UserConfigStore;

struct BotState {
    engine: RelayEngine,
}

impl BotState {
    async fn new(config: &Config, bot: &Bot, telegram: Arc<TelegramClient>) -> Result<Self, ConfigError> {
        let me = bot
            .get_me()
            .await
            .map_err(|e| ConfigError::Validation(format!("failed to get bot info: {e}")))?;
        info!("Bot user ID: {}, username: @{}", me.id, me.username());

        let translations = Translations::load(&config.translations_path)?;
        if !translations.contains(&config.language) {
            return Err(ConfigError::Validation(format!(
                "LANGUAGE '{}' is not in {} (available: {})",
                config.language,
                config.translations_path.display(),
                translations.codes().collect::<Vec<_>>().join(", ")
            )));
        }

        let user_config = UserConfigStore::load_or_default(&config.user_config_path())?;
        let mode = ConversationMode::from_continuous(config.continuous_conversation);
        let backend = Arc::new(OpenAiClient::new(config.openai_api_key.clone(), config.openai_api_base.clone()));
        let relay_config = RelayConfig::from_config(config, me.username().to_string());

        let mut engine = RelayEngine::new(relay_config, telegram, backend, translations, user_config, mode);
        if mode == ConversationMode::Accumulate {
            engine = engine.with_history(HistoryLog::new(config.history_path()));
        }
        info!("Conversation mode: {:?}", mode);

        Ok(Self { engine })
    }
}

/// Log a startup failure and exit.
fn fail_startup(e: ConfigError) -> ! {
    // Logging may not be set up yet when the config itself is broken
    tracing_subscriber::fmt().with_writer(std::io::stderr).try_init().ok();
    error!("{e}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| fail_startup(e));

    let bot = Bot::new(&config.telegram_bot_token);

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("chatrelay.log"))
        .unwrap_or_else(|e| fail_startup(ConfigError::Validation(format!("failed to open log file: {e}"))));
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    let registry = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        );

    if let Some(log_chat_id) = config.log_chat_id {
        registry.with(OperatorLogLayer::new(bot.clone(), log_chat_id)).init();
    } else {
        registry.init();
    }

    info!("🚀 Starting chatrelay...");
    info!("Model: {}, data dir: {:?}", config.completion.model, config.data_dir);

    let telegram = Arc::new(TelegramClient::new(bot.clone()));
    let state = match BotState::new(&config, &bot, telegram.clone()).await {
        Ok(state) => Arc::new(state),
        Err(e) => fail_startup(e),
    };

    let pack = state.engine.language_pack().await;
    let commands: Vec<(&str, &str)> = Command::ALL
        .iter()
        .map(|c| (c.name(), pack.command_descriptions.for_command(c.name()).unwrap_or_default()))
        .collect();
    telegram.set_commands(&commands).await.ok();

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handle_message));

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state.clone()])
        .enable_ctrlc_handler()
        .build();

    let shutdown = dispatcher.shutdown_token();
    tokio::spawn(async move {
        wait_for_terminate().await;
        info!("Exiting...");
        match shutdown.shutdown() {
            Ok(stopped) => stopped.await,
            Err(e) => warn!("Dispatcher was not running: {:?}", e),
        }
    });

    info!("Bot started!");
    dispatcher.dispatch().await;
    info!("Bot stopped");
}

#[cfg(unix)]
async fn wait_for_terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {e}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_terminate() {
    std::future::pending::<()>().await;
}

async fn handle_message(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let Some(incoming) = telegram_to_incoming(&msg) else {
        return Ok(());
    };

    info!(
        "📨 {} in chat {}: \"{}\"",
        incoming.display_username(),
        incoming.chat_id,
        incoming.text.chars().take(50).collect::<String>()
    );
    state.engine.handle_message(incoming).await;
    Ok(())
}

fn telegram_to_incoming(msg: &Message) -> Option<IncomingMessage> {
    let text = msg.text()?;

    Some(IncomingMessage {
        message_id: msg.id.0 as i64,
        chat_id: msg.chat.id.0,
        is_private: matches!(msg.chat.kind, ChatKind::Private(_)),
        username: msg.from.as_ref().and_then(|u| u.username.clone()),
        text: text.to_string(),
    })
}
