//! Placeholder substitution for prompts and user-facing templates.
//!
//! Four tokens are recognized and substituted in a fixed order:
//! `$personality`, `$name`, `$username`, `$command`. Only the first
//! occurrence of each token is replaced; later occurrences are left as-is.

use crate::user_config::UserConfig;

const DEFAULT_USERNAME: &str = "username";
const DEFAULT_COMMAND: &str = "command";

/// The active persona: user config values with environment defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub personality: String,
    pub bot_name: String,
}

impl Persona {
    pub fn resolve(user: &UserConfig, default_personality: &str, default_bot_name: &str) -> Self {
        Self {
            personality: non_empty_or(&user.personality, default_personality),
            bot_name: non_empty_or(&user.bot_name, default_bot_name),
        }
    }
}

fn non_empty_or(value: &str, default: &str) -> String {
    let chosen = if value.is_empty() { default } else { value };
    chosen.to_string()
}

/// Per-request values for `$username` and `$command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptContext<'a> {
    pub username: Option<&'a str>,
    pub command: Option<&'a str>,
}

impl<'a> PromptContext<'a> {
    pub fn user(username: &'a str) -> Self {
        Self {
            username: Some(username),
            command: None,
        }
    }

    pub fn command(command: &'a str) -> Self {
        Self {
            username: None,
            command: Some(command),
        }
    }
}

/// Substitute the recognized placeholders in `template`.
pub fn format_variables(template: &str, persona: &Persona, ctx: PromptContext<'_>) -> String {
    template
        .replacen("$personality", &persona.personality, 1)
        .replacen("$name", &persona.bot_name, 1)
        .replacen("$username", non_blank(ctx.username).unwrap_or(DEFAULT_USERNAME), 1)
        .replacen("$command", non_blank(ctx.command).unwrap_or(DEFAULT_COMMAND), 1)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
