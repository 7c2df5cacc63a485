//! Colored terminal output
//!
//! Every line starts with a colored marker: `*` for Discord events, `+` for what the bot does
//! on its own and `!` for failures (on stderr).

use crate::mirror::reaction::ReactionKind;
use serenity::all::{ChannelId, GuildId, Http, ReactionType, UserId};
use std::io::IsTerminal;
use std::sync::{Arc, LazyLock};

pub enum Color {
    Default,
    Event,
    Internal,
    Error,
    User,
    Channel,
    Guild,
    Reaction,
    Glue,
}

impl Color {
    fn code(&self) -> &'static str {
        match self {
            Color::Default => "\x1b[0m",
            Color::Event | Color::Reaction => "\x1b[33m",
            Color::Internal => "\x1b[35m",
            Color::Error => "\x1b[31m",
            Color::User => "\x1b[32m",
            Color::Channel => "\x1b[36m",
            Color::Guild => "\x1b[38;5;33m",
            Color::Glue => "\x1b[90m",
        }
    }

    /// `text` wrapped in this color, reset afterwards.
    pub fn paint(&self, text: impl std::fmt::Display) -> String {
        format!("{}{}{}", self, text, Color::Default)
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        // Redirected output stays plain.
        static COLORED: LazyLock<bool> = LazyLock::new(|| std::io::stdout().is_terminal());

        if *COLORED {
            f.write_str(self.code())
        } else {
            Ok(())
        }
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __log_line {
    ($print:ident, $color:ident, $marker:literal, $fmtstr:expr $(, $args:expr)* $(,)?) => {{
        $print!(
            concat!("{}", $marker, "{} ", $fmtstr),
            $crate::logging::Color::$color,
            $crate::logging::Color::Default
            $(, $args)*
        )
    }};
}

/// Something Discord told us about
#[macro_export]
macro_rules! log_event {
    ($($line:tt)*) => {
        $crate::__log_line!(println, Event, "*", $($line)*)
    };
}

/// Something the bot did by itself
#[macro_export]
macro_rules! log_internal {
    ($($line:tt)*) => {
        $crate::__log_line!(println, Internal, "+", $($line)*)
    };
}

/// Recoverable failures
#[macro_export]
macro_rules! log_error {
    ($($line:tt)*) => {
        $crate::__log_line!(eprintln, Error, "!", $($line)*)
    };
}

pub trait PrintColor {
    fn color(&self) -> String;
}

/// Colored output that needs a lookup, e.g. a channel's name
#[serenity::async_trait]
pub trait AsyncPrintColor {
    async fn color(&self, http: &Arc<Http>) -> String;
}

/// Field separator
pub struct Glue;

impl PrintColor for Glue {
    fn color(&self) -> String {
        Color::Glue.paint(":")
    }
}

impl PrintColor for serenity::all::CurrentUser {
    fn color(&self) -> String {
        Color::User.paint(&self.name)
    }
}

impl PrintColor for serenity::all::User {
    fn color(&self) -> String {
        Color::User.paint(&self.name)
    }
}

/// Shown the way it is written in the configuration, so votes are easy to match up.
impl PrintColor for ReactionType {
    fn color(&self) -> String {
        match ReactionKind::from_reaction_type(self) {
            Some(kind) => Color::Reaction.paint(kind),
            None => Color::Reaction.paint("<unknown-emoji>"),
        }
    }
}

#[serenity::async_trait]
impl AsyncPrintColor for Option<UserId> {
    async fn color(&self, http: &Arc<Http>) -> String {
        let user = match self {
            Some(user_id) => user_id.to_user(http).await.ok(),
            None => None,
        };
        match user {
            Some(user) => Color::User.paint(user.name),
            None => Color::User.paint("<unknown-user>"),
        }
    }
}

#[serenity::async_trait]
impl AsyncPrintColor for ChannelId {
    async fn color(&self, http: &Arc<Http>) -> String {
        match self.name(http).await {
            Ok(name) => Color::Channel.paint(name),
            Err(_) => Color::Channel.paint(format!("<channel {}>", self)),
        }
    }
}

#[serenity::async_trait]
impl AsyncPrintColor for Option<GuildId> {
    async fn color(&self, http: &Arc<Http>) -> String {
        let Some(guild_id) = self else {
            return Color::Guild.paint("<direct-message>");
        };
        match guild_id.to_partial_guild(http).await {
            Ok(guild) => Color::Guild.paint(guild.name),
            Err(_) => Color::Guild.paint("<unknown-guild>"),
        }
    }
}
