//! Relay engine - routes Telegram messages to commands or completions.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::chatbot::command::{parse_command, starts_with_command, Command, ParsedCommand};
use crate::chatbot::conversation::{format_exchange, ConversationMode, ConversationStore, HistoryLog, HistoryRecord};
use crate::chatbot::format::{format_variables, Persona, PromptContext};
use crate::chatbot::message::{contains_mention, escape_delimiters, strip_mention, IncomingMessage};
use crate::chatbot::openai::{self, price_per_token, Backend, CompletionParams};
use crate::chatbot::presence::{PresenceIndicator, PRESENCE_INTERVAL};
use crate::chatbot::telegram::{Gateway, Presence};
use crate::config::Config;
use crate::translations::{LanguagePack, Translations};
use crate::user_config::{UserConfig, UserConfigStore};

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Bot username without `@`, from `getMe`.
    pub bot_username: String,
    pub prompt_start: String,
    pub personality: String,
    pub bot_name: String,
    pub input_suffix: String,
    pub language: String,
    pub completion: CompletionParams,
    pub presence_interval: Duration,
}

impl RelayConfig {
    pub fn from_config(config: &Config, bot_username: String) -> Self {
        Self {
            bot_username,
            prompt_start: config.prompt_start.clone(),
            personality: config.personality.clone(),
            bot_name: config.bot_name.clone(),
            input_suffix: config.input_suffix.clone(),
            language: config.language.clone(),
            completion: config.completion.clone(),
            presence_interval: PRESENCE_INTERVAL,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bot_username: String::new(),
            prompt_start: "Conversation with $personality.".to_string(),
            personality: "an AI".to_string(),
            bot_name: "openAI".to_string(),
            input_suffix: "$username".to_string(),
            language: "en".to_string(),
            completion: CompletionParams {
                model: "text-davinci-003".to_string(),
                max_tokens: 300,
                temperature: 0.5,
                frequency_penalty: 1.0,
                presence_penalty: None,
            },
            presence_interval: PRESENCE_INTERVAL,
        }
    }
}

/// The relay engine.
pub struct RelayEngine {
    config: RelayConfig,
    gateway: Arc<dyn Gateway>,
    backend: Arc<dyn Backend>,
    translations: Translations,
    user_config: UserConfigStore,
    conversations: ConversationStore,
    /// Written in accumulate mode only.
    history: Option<HistoryLog>,
}

impl RelayEngine {
    pub fn new(
        config: RelayConfig,
        gateway: Arc<dyn Gateway>,
        backend: Arc<dyn Backend>,
        translations: Translations,
        user_config: UserConfigStore,
        mode: ConversationMode,
    ) -> Self {
        Self {
            config,
            gateway,
            backend,
            translations,
            user_config,
            conversations: ConversationStore::new(mode),
            history: None,
        }
    }

    pub fn with_history(mut self, history: HistoryLog) -> Self {
        self.history = Some(history);
        self
    }

    /// Strings in the active language.
    pub async fn language_pack(&self) -> &LanguagePack {
        let user = self.user_config.get().await;
        self.pack_for(&user)
    }

    fn pack_for(&self, user: &UserConfig) -> &LanguagePack {
        self.translations.resolve(&user.language, &self.config.language)
    }

    fn persona(&self, user: &UserConfig) -> Persona {
        Persona::resolve(user, &self.config.personality, &self.config.bot_name)
    }

    /// Handle an incoming text message.
    pub async fn handle_message(&self, msg: IncomingMessage) {
        if let Some(parsed) = parse_command(&msg.text) {
            self.handle_command(&msg, parsed).await;
        } else if starts_with_command(&msg.text) {
            debug!("Ignoring malformed command in chat {}", msg.chat_id);
        } else if msg.is_private || contains_mention(&msg.text, &self.config.bot_username) {
            self.handle_chat(&msg).await;
        } else {
            debug!("Ignoring message {} in chat {}: not addressed to us", msg.message_id, msg.chat_id);
        }
    }

    async fn reply(&self, msg: &IncomingMessage, text: &str) {
        self.gateway.send_message(msg.chat_id, text, Some(msg.message_id)).await.ok();
    }

    async fn handle_command(&self, msg: &IncomingMessage, parsed: ParsedCommand<'_>) {
        let addressed = match parsed.mention {
            Some(_) => parsed.mentions(&self.config.bot_username),
            None => msg.is_private,
        };
        if !addressed {
            debug!("Ignoring {} in chat {}: not addressed to us", parsed.token, msg.chat_id);
            return;
        }

        let user = self.user_config.get().await;
        let pack = self.pack_for(&user);
        let persona = self.persona(&user);

        let argument = match (parsed.argument(), parsed.command.requires_argument()) {
            (Some(argument), _) => argument,
            (None, false) => "",
            (None, true) => {
                info!("{} without parameter in chat {}", parsed.token, msg.chat_id);
                let text = format_variables(
                    &pack.errors.no_parameter_command,
                    &persona,
                    PromptContext::command(parsed.token),
                );
                self.reply(msg, &text).await;
                return;
            }
        };

        info!("⚙️ {} in chat {}", parsed.token, msg.chat_id);

        match parsed.command {
            Command::Start => {
                let text = format_variables(&pack.general.start_message, &persona, PromptContext::default());
                self.reply(msg, &text).await;
            }
            Command::Personality => {
                let value = argument.to_string();
                match self.user_config.update(|c| c.personality = value).await {
                    Ok(updated) => {
                        let persona = self.persona(&updated);
                        let text = format_variables(&pack.general.personality_switch, &persona, PromptContext::default());
                        self.reply(msg, &text).await;
                    }
                    Err(e) => {
                        error!("Failed to save personality: {}", e);
                        self.reply(msg, &pack.errors.generic_error).await;
                    }
                }
            }
            Command::Name => {
                let value = argument.to_string();
                match self.user_config.update(|c| c.bot_name = value).await {
                    Ok(updated) => {
                        let persona = self.persona(&updated);
                        let text = format_variables(&pack.general.name_switch, &persona, PromptContext::default());
                        self.reply(msg, &text).await;
                    }
                    Err(e) => {
                        error!("Failed to save bot name: {}", e);
                        self.reply(msg, &pack.errors.generic_error).await;
                    }
                }
            }
            Command::Language => {
                let Some(new_pack) = self.translations.get(argument) else {
                    info!("Unknown language {:?}", argument);
                    let text = pack.errors.invalid_language.replacen("$language", argument, 1);
                    self.reply(msg, &text).await;
                    return;
                };
                let code = argument.to_string();
                match self.user_config.update(|c| c.language = code).await {
                    Ok(_) => self.reply(msg, &new_pack.general.language_switch).await,
                    Err(e) => {
                        error!("Failed to save language: {}", e);
                        self.reply(msg, &pack.errors.generic_error).await;
                    }
                }
            }
            Command::Reset => {
                self.conversations.reset(msg.chat_id).await;
                self.reply(msg, &pack.general.memory_reset).await;
            }
            Command::Imagine => self.handle_imagine(msg, argument, pack).await,
        }
    }

    async fn handle_imagine(&self, msg: &IncomingMessage, prompt: &str, pack: &LanguagePack) {
        let presence = PresenceIndicator::start(
            self.gateway.clone(),
            msg.chat_id,
            Presence::UploadPhoto,
            self.config.presence_interval,
        );

        let result = match self.backend.generate_image(prompt).await {
            Ok(url) => self
                .gateway
                .send_photo(msg.chat_id, &url, Some(msg.message_id))
                .await
                .map(|_| ())
                .map_err(openai::Error::Http),
            Err(e) => Err(e),
        };
        presence.stop().await;

        match result {
            Ok(()) => {}
            Err(openai::Error::ContentPolicy(reason)) => {
                warn!("Image prompt rejected: {}", reason);
                self.reply(msg, &pack.errors.image_safety).await;
            }
            Err(e) => {
                error!("Image generation failed: {}", e);
                self.reply(msg, &pack.errors.generic_error).await;
            }
        }
    }

    async fn handle_chat(&self, msg: &IncomingMessage) {
        let user = self.user_config.get().await;
        let pack = self.pack_for(&user);
        let persona = self.persona(&user);
        let ctx = PromptContext::user(msg.display_username());

        let text = escape_delimiters(&strip_mention(&msg.text, &self.config.bot_username));
        let user_label = format_variables(&self.config.input_suffix, &persona, ctx);
        let bot_label = format_variables(&persona.bot_name, &persona, ctx);
        let prompt_start = format_variables(&self.config.prompt_start, &persona, ctx);
        let turn = format!("{user_label}: ###{text}###\n{bot_label}: ###");

        let transcript = self.conversations.snapshot(msg.chat_id).await;
        let prompt = format!("{prompt_start}\n\n{transcript}{turn}");

        let presence = PresenceIndicator::start(
            self.gateway.clone(),
            msg.chat_id,
            Presence::Typing,
            self.config.presence_interval,
        );
        let result = self.backend.complete(&prompt, &self.config.completion).await;
        presence.stop().await;

        let completion = match result {
            Ok(completion) => completion,
            Err(e) => {
                error!("Completion failed: {}", e);
                self.reply(msg, &pack.errors.generic_error).await;
                return;
            }
        };

        info!("\n{}: \"{}\"\n{}: \"{}\"", user_label, text, bot_label, completion.text);
        match completion.total_tokens {
            Some(tokens) => {
                let cost = tokens as f64 * price_per_token(&self.config.completion.model);
                info!("[usage: {} tokens (${:.6})]", tokens, cost);
            }
            None => info!("[usage: unknown]"),
        }

        let exchange = format_exchange(&user_label, &text, &bot_label, &completion.text);
        self.conversations.record(msg.chat_id, &exchange).await;

        if self.conversations.mode() == ConversationMode::Accumulate
            && let Some(ref history) = self.history
        {
            let record = HistoryRecord {
                prompt: turn,
                completion: completion.text.clone(),
            };
            if let Err(e) = history.append(&record) {
                warn!("Failed to append history: {}", e);
            }
        }

        if let Err(e) = self
            .gateway
            .send_message(msg.chat_id, &completion.text, Some(msg.message_id))
            .await
        {
            error!("Failed to deliver completion: {}", e);
            self.reply(msg, &pack.errors.generic_error).await;
        }
    }

    /// Current transcript for a chat.
    pub async fn conversation(&self, chat_id: i64) -> String {
        self.conversations.snapshot(chat_id).await
    }

    pub async fn user_config(&self) -> UserConfig {
        self.user_config.get().await
    }
}
