use std::fmt;
use std::path::PathBuf;

use teloxide::types::ChatId;

use crate::chatbot::openai::CompletionParams;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    Missing(&'static str),
    /// A variable is set but could not be parsed.
    InvalidValue { key: &'static str, value: String },
    /// Failed to read a file the bot needs at startup.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse a JSON file.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(key) => write!(f, "please provide {key} in the environment or the .env file"),
            Self::InvalidValue { key, value } => write!(f, "invalid value for {key}: '{value}'"),
            Self::ReadFile { path, source } => {
                write!(f, "failed to read '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Missing(_) | Self::InvalidValue { .. } | Self::Validation(_) => None,
        }
    }
}

/// Process configuration, read from the environment once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_bot_token: String,
    pub openai_api_key: String,
    /// Base URL of the OpenAI-compatible API, without trailing slash.
    pub openai_api_base: String,
    /// Template opening every prompt.
    pub prompt_start: String,
    /// Used when the user config has no personality.
    pub personality: String,
    /// Used when the user config has no bot name.
    pub bot_name: String,
    /// Template for the label in front of user turns.
    pub input_suffix: String,
    pub completion: CompletionParams,
    /// Accumulate every exchange instead of keeping only the last one.
    pub continuous_conversation: bool,
    /// Used when the user config has no language.
    pub language: String,
    /// Directory for state files (user config, history, logs).
    pub data_dir: PathBuf,
    pub translations_path: PathBuf,
    /// Chat receiving warnings and errors.
    pub log_chat_id: Option<ChatId>,
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let telegram_bot_token = get("TELEGRAM_BOT_API_KEY").ok_or(ConfigError::Missing("TELEGRAM_BOT_API_KEY"))?;
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_valid = match telegram_bot_token.split_once(':') {
            Some((id, secret)) => id.parse::<u64>().is_ok() && !secret.is_empty() && !secret.contains(':'),
            None => false,
        };
        if !token_valid {
            return Err(ConfigError::Validation(
                "TELEGRAM_BOT_API_KEY appears invalid (expected format: 123456789:ABCdefGHI...)".into(),
            ));
        }

        let openai_api_key = get("OPENAI_API_KEY").ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;

        let completion = CompletionParams {
            model: get("MODEL").unwrap_or_else(|| "text-davinci-003".to_string()),
            max_tokens: parse_or(get("MAX_TOKENS"), "MAX_TOKENS", 300)?,
            temperature: parse_or(get("TEMPERATURE"), "TEMPERATURE", 0.5)?,
            frequency_penalty: parse_or(get("FREQUENCY_PENALTY"), "FREQUENCY_PENALTY", 1.0)?,
            presence_penalty: match get("PRESENCE_PENALTY") {
                Some(v) => Some(parse_value(&v, "PRESENCE_PENALTY")?),
                None => None,
            },
        };

        let log_chat_id = match get("LOG_CHAT_ID") {
            Some(v) => Some(ChatId(parse_value(&v, "LOG_CHAT_ID")?)),
            None => None,
        };

        Ok(Self {
            telegram_bot_token,
            openai_api_key,
            openai_api_base: get("OPENAI_API_BASE")
                .map(|base| base.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            prompt_start: get("PROMPT_START").unwrap_or_else(|| "Conversation with $personality.".to_string()),
            personality: get("PERSONALITY").unwrap_or_else(|| "an AI".to_string()),
            bot_name: get("BOT_NAME").unwrap_or_else(|| "openAI".to_string()),
            input_suffix: get("INPUT_SUFFIX").unwrap_or_else(|| "$username".to_string()),
            completion,
            continuous_conversation: parse_or(get("CONTINUOUS_CONVERSATION"), "CONTINUOUS_CONVERSATION", true)?,
            language: get("LANGUAGE").unwrap_or_else(|| "en".to_string()),
            data_dir: get("DATA_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
            translations_path: get("TRANSLATIONS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("translations.json")),
            log_chat_id,
        })
    }

    pub fn user_config_path(&self) -> PathBuf {
        self.data_dir.join("user-config.json")
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("history.jsonl")
    }
}

fn parse_value<T: std::str::FromStr>(value: &str, key: &'static str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError> {
    match value {
        Some(v) => parse_value(&v, key),
        None => Ok(default),
    }
}
