//! Slash-command recognition.

use std::sync::LazyLock;

use regex::Regex;

static COMMAND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^/(\w+)(?:@(\w+))?(?:\s+(.*))?$").expect("command regex is valid")
});

/// Commands the bot registers with Telegram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Personality,
    Name,
    Language,
    Reset,
    Imagine,
}

impl Command {
    /// In the order they are registered with Telegram.
    pub const ALL: [Command; 6] = [
        Command::Start,
        Command::Personality,
        Command::Name,
        Command::Imagine,
        Command::Reset,
        Command::Language,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Personality => "personality",
            Command::Name => "name",
            Command::Language => "language",
            Command::Reset => "reset",
            Command::Imagine => "imagine",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    /// Whether the command is meaningless without an argument.
    pub fn requires_argument(self) -> bool {
        !matches!(self, Command::Start | Command::Reset)
    }
}

/// A recognized command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand<'a> {
    pub command: Command,
    /// The command token as typed, mention included (e.g. `/name@my_bot`).
    pub token: &'a str,
    /// Bot username after `@`, if any.
    pub mention: Option<&'a str>,
    /// Everything after the first whitespace following the token.
    pub raw_argument: Option<&'a str>,
}

impl ParsedCommand<'_> {
    /// Whether the mention names the given bot (case-insensitive).
    pub fn mentions(&self, bot_username: &str) -> bool {
        self.mention.is_some_and(|m| m.eq_ignore_ascii_case(bot_username))
    }

    /// The argument with surrounding whitespace removed, `None` when blank.
    pub fn argument(&self) -> Option<&str> {
        self.raw_argument.map(str::trim).filter(|a| !a.is_empty())
    }
}

/// Recognize a registered command. Unknown `/words` are not commands.
pub fn parse_command(text: &str) -> Option<ParsedCommand<'_>> {
    let caps = COMMAND_RE.captures(text)?;
    let name = caps.get(1)?.as_str();
    let command = Command::from_name(name)?;
    let token_end = caps.get(2).or(caps.get(1)).map_or(0, |m| m.end());

    Some(ParsedCommand {
        command,
        token: &text[..token_end],
        mention: caps.get(2).map(|m| m.as_str()),
        raw_argument: caps.get(3).map(|m| m.as_str()),
    })
}

/// Whether the text begins with a registered command name, such as
/// `/reset.` or `/startle`, even if it does not parse as one.
pub fn starts_with_command(text: &str) -> bool {
    text.strip_prefix('/')
        .is_some_and(|rest| Command::ALL.iter().any(|c| rest.starts_with(c.name())))
}
