//! Reaction identity.
//!
//! Discord reports standard emoji as their unicode string and custom emoji as an `(id, name)`
//! pair whose name may change or be missing.  Scores are only correct if both forms compare on
//! a single key, so every reaction goes through [`ReactionKind::from_reaction_type`] (platform
//! data) or [`ReactionKind::parse`] (configuration) before it is compared.

use anyhow::{anyhow, Result};
use serenity::all::{EmojiId, ReactionType};
use std::fmt;

/// A trackable reaction, compared by identifier only.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ReactionKind {
    /// Unicode emoji, e.g. `👍`
    Standard(String),
    /// Server-specific emoji, identified by id.  Name and animation are ignored.
    Custom(EmojiId),
}

impl ReactionKind {
    /// Normalize a reaction as reported by Discord.  Returns `None` for representations we don't
    /// know about; those never score.
    pub fn from_reaction_type(reaction: &ReactionType) -> Option<Self> {
        match reaction {
            ReactionType::Custom { id, .. } => Some(Self::Custom(*id)),
            ReactionType::Unicode(s) if !s.is_empty() => Some(Self::Standard(s.clone())),
            _ => None,
        }
    }

    /// Parse a configured reaction.
    ///
    /// Accepts:
    /// - a bare custom emoji id: `123456789012345678`
    /// - a custom emoji mention: `<:upvote:123456789012345678>` or `<a:party:123...>`
    /// - anything else non-empty as a unicode emoji: `👍`
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow!("Empty reaction"));
        }

        if let Some(inner) = s.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
            let id = inner
                .rsplit(':')
                .next()
                .ok_or(anyhow!("Malformed custom emoji `{}`", s))?;
            return parse_emoji_id(id).map(Self::Custom);
        }

        if s.bytes().all(|b| b.is_ascii_digit()) {
            return parse_emoji_id(s).map(Self::Custom);
        }

        Ok(Self::Standard(s.to_owned()))
    }

    /// Form accepted by Discord when adding a reaction.
    pub fn to_reaction_type(&self) -> ReactionType {
        match self {
            Self::Standard(s) => ReactionType::Unicode(s.clone()),
            Self::Custom(id) => ReactionType::Custom {
                animated: false,
                id: *id,
                name: None,
            },
        }
    }
}

fn parse_emoji_id(s: &str) -> Result<EmojiId> {
    match s.parse::<u64>() {
        Ok(0) | Err(_) => Err(anyhow!("Invalid custom emoji id `{}`", s)),
        Ok(id) => Ok(EmojiId::new(id)),
    }
}

impl fmt::Display for ReactionKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Standard(s) => write!(f, "{}", s),
            Self::Custom(id) => write!(f, "{}", id),
        }
    }
}

impl TryFrom<String> for ReactionKind {
    type Error = anyhow::Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<ReactionKind> for String {
    fn from(kind: ReactionKind) -> Self {
        kind.to_string()
    }
}
