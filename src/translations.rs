//! Localized user-facing strings, loaded once from a JSON asset.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::config::ConfigError;

/// Language used when neither the user config nor the default resolves.
pub const FALLBACK_LANGUAGE: &str = "en";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct General {
    pub personality_switch: String,
    pub name_switch: String,
    pub default_start: String,
    pub default_personality: String,
    pub memory_reset: String,
    pub language_switch: String,
    pub start_message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandDescriptions {
    pub personality: String,
    pub name: String,
    pub reset: String,
    pub imagine: String,
    pub language: String,
    pub start: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Errors {
    pub generic_error: String,
    pub image_safety: String,
    pub no_parameter_command: String,
    pub invalid_language: String,
}

/// All strings for one language.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LanguagePack {
    pub general: General,
    pub command_descriptions: CommandDescriptions,
    pub errors: Errors,
}

impl CommandDescriptions {
    /// Description for a command name, as registered with Telegram.
    pub fn for_command(&self, command: &str) -> Option<&str> {
        match command {
            "start" => Some(&self.start),
            "personality" => Some(&self.personality),
            "name" => Some(&self.name),
            "imagine" => Some(&self.imagine),
            "reset" => Some(&self.reset),
            "language" => Some(&self.language),
            _ => None,
        }
    }
}

/// Language code → strings. Immutable after load, never empty.
#[derive(Debug, Clone)]
pub struct Translations {
    packs: BTreeMap<String, LanguagePack>,
    /// Always a key of `packs`.
    fallback: String,
}

impl Translations {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content).map_err(|e| ConfigError::ParseJson {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        let packs: BTreeMap<String, LanguagePack> = serde_json::from_str(json)?;
        let fallback = if packs.contains_key(FALLBACK_LANGUAGE) {
            FALLBACK_LANGUAGE.to_string()
        } else {
            packs
                .keys()
                .next()
                .cloned()
                .ok_or_else(|| <serde_json::Error as serde::de::Error>::custom("no languages defined"))?
        };
        Ok(Self { packs, fallback })
    }

    pub fn contains(&self, code: &str) -> bool {
        self.packs.contains_key(code)
    }

    pub fn get(&self, code: &str) -> Option<&LanguagePack> {
        self.packs.get(code)
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.packs.keys().map(String::as_str)
    }

    /// The preferred code if known, else the default, else
    /// [`FALLBACK_LANGUAGE`] (or the first language when that is missing).
    pub fn resolve(&self, preferred: &str, default: &str) -> &LanguagePack {
        self.get(preferred)
            .or_else(|| self.get(default))
            .unwrap_or(&self.packs[&self.fallback])
    }
}
