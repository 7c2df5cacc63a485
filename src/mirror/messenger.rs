//! The chat platform as seen by the mirror engine.
//!
//! The engine only ever talks to a [`Messenger`], so it can be driven by Discord in production
//! and by an in-memory fake in tests.

use super::reaction::ReactionKind;
use anyhow::Result;
use serenity::all::{
    ChannelId, CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter, CreateMessage, GetMessages,
    Http, Message, MessageId, Timestamp,
};
use std::sync::Arc;

/// Discord caps embed descriptions at 4096 characters.
const EMBED_DESCRIPTION_LIMIT: usize = 4096;
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];
const JUMP_TITLE: &str = "Jump to message";

/// What the engine needs to know about a source message.
#[derive(Clone, Debug)]
pub struct SourceMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub author_name: String,
    pub author_avatar: Option<String>,
    pub content: String,
    /// Back-link to the original
    pub link: String,
    pub image_url: Option<String>,
    pub timestamp: Option<Timestamp>,
    /// Normalized reactions and their current counts.  Unrecognized reactions are dropped.
    pub reactions: Vec<(ReactionKind, u64)>,
}

/// A mirror found in a target channel, pointing back at its source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MirrorRef {
    pub source_id: MessageId,
    pub mirror_id: MessageId,
}

/// Result of deleting a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyAbsent,
    Failed(String),
}

impl DeleteOutcome {
    /// Both `Deleted` and `AlreadyAbsent` mean the mirror is gone.
    pub fn is_success(&self) -> bool {
        matches!(self, DeleteOutcome::Deleted | DeleteOutcome::AlreadyAbsent)
    }
}

#[serenity::async_trait]
pub trait Messenger: Send + Sync {
    /// Fetch a message with fresh reaction counts.  `Ok(None)` if it no longer exists.
    async fn fetch_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<Option<SourceMessage>>;

    /// Ids of the most recent messages in a channel, newest first.
    async fn recent_messages(&self, channel_id: ChannelId, limit: u8) -> Result<Vec<MessageId>>;

    /// Post a mirror of `source` into `target`, returning the new message's id.
    async fn send_mirror(&self, target: ChannelId, source: &SourceMessage) -> Result<MessageId>;

    async fn delete_message(&self, channel_id: ChannelId, message_id: MessageId)
        -> DeleteOutcome;

    /// Mirrors this bot previously posted in `target`, among its most recent messages.
    async fn recent_mirrors(&self, target: ChannelId, limit: u8) -> Result<Vec<MirrorRef>>;
}

/// [`Messenger`] backed by Discord's HTTP API.
pub struct DiscordMessenger {
    http: Arc<Http>,
}

impl DiscordMessenger {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[serenity::async_trait]
impl Messenger for DiscordMessenger {
    async fn fetch_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<Option<SourceMessage>> {
        match channel_id.message(&self.http, message_id).await {
            Ok(msg) => Ok(Some(SourceMessage::from_message(&msg))),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn recent_messages(&self, channel_id: ChannelId, limit: u8) -> Result<Vec<MessageId>> {
        let messages = channel_id
            .messages(&self.http, GetMessages::new().limit(limit))
            .await?;
        Ok(messages.iter().map(|msg| msg.id).collect())
    }

    async fn send_mirror(&self, target: ChannelId, source: &SourceMessage) -> Result<MessageId> {
        let msg = target
            .send_message(&self.http, CreateMessage::new().embed(mirror_embed(source)))
            .await?;
        Ok(msg.id)
    }

    async fn delete_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> DeleteOutcome {
        match channel_id.delete_message(&self.http, message_id).await {
            Ok(()) => DeleteOutcome::Deleted,
            Err(e) if is_not_found(&e) => DeleteOutcome::AlreadyAbsent,
            Err(e) => DeleteOutcome::Failed(e.to_string()),
        }
    }

    async fn recent_mirrors(&self, target: ChannelId, limit: u8) -> Result<Vec<MirrorRef>> {
        let me = self.http.get_current_user().await?.id;
        let messages = target
            .messages(&self.http, GetMessages::new().limit(limit))
            .await?;

        Ok(messages
            .iter()
            .filter(|msg| msg.author.id == me)
            .filter_map(|msg| {
                let source_id = msg
                    .embeds
                    .iter()
                    .filter_map(|embed| embed.url.as_deref())
                    .find_map(source_id_from_link)?;
                Some(MirrorRef {
                    source_id,
                    mirror_id: msg.id,
                })
            })
            .collect())
    }
}

impl SourceMessage {
    pub fn from_message(msg: &Message) -> Self {
        let author_name = msg
            .member
            .as_ref()
            .and_then(|member| member.nick.clone())
            .or_else(|| msg.author.global_name.clone())
            .unwrap_or_else(|| msg.author.name.clone());

        let reactions = msg
            .reactions
            .iter()
            .filter_map(|r| ReactionKind::from_reaction_type(&r.reaction_type).map(|k| (k, r.count)))
            .collect();

        Self {
            id: msg.id,
            channel_id: msg.channel_id,
            author_name,
            author_avatar: Some(msg.author.face()),
            content: msg.content.clone(),
            link: msg.link(),
            image_url: first_image_url(msg),
            timestamp: Some(msg.timestamp),
            reactions,
        }
    }
}

/// First image attached to the message, falling back to images of link embeds.
fn first_image_url(msg: &Message) -> Option<String> {
    msg.attachments
        .iter()
        .find(|a| is_image(&a.filename, a.content_type.as_deref()))
        .map(|a| a.url.clone())
        .or_else(|| {
            msg.embeds.iter().find_map(|embed| {
                embed
                    .image
                    .as_ref()
                    .map(|image| image.url.clone())
                    .or_else(|| embed.thumbnail.as_ref().map(|thumb| thumb.url.clone()))
            })
        })
}

pub fn is_image(filename: &str, content_type: Option<&str>) -> bool {
    if let Some(content_type) = content_type {
        return content_type.starts_with("image/");
    }

    filename
        .rsplit_once('.')
        .map(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Whether there is anything worth voting on, i.e. an image.
pub fn has_image(msg: &Message) -> bool {
    first_image_url(msg).is_some()
}

/// Build the embed posted into a target channel.
pub fn mirror_embed(source: &SourceMessage) -> CreateEmbed {
    let mut author = CreateEmbedAuthor::new(&source.author_name);
    if let Some(avatar) = &source.author_avatar {
        author = author.icon_url(avatar);
    }

    let mut embed = CreateEmbed::new()
        .author(author)
        .title(JUMP_TITLE)
        .url(&source.link)
        .field("Source", format!("<#{}>", source.channel_id), true)
        .footer(CreateEmbedFooter::new(source.id.to_string()));

    if !source.content.is_empty() {
        embed = embed.description(truncate(&source.content, EMBED_DESCRIPTION_LIMIT));
    }
    if let Some(image_url) = &source.image_url {
        embed = embed.image(image_url);
    }
    if let Some(timestamp) = source.timestamp {
        embed = embed.timestamp(timestamp);
    }

    embed
}

/// Recover the source message id from a back-link such as
/// `https://discord.com/channels/<guild>/<channel>/<message>`.
pub fn source_id_from_link(link: &str) -> Option<MessageId> {
    let (_, path) = link.split_once("/channels/")?;
    let parts: Vec<&str> = path.trim_end_matches('/').split('/').collect();
    let [_guild, _channel, message] = parts.as_slice() else {
        return None;
    };
    match message.parse::<u64>() {
        Ok(0) | Err(_) => None,
        Ok(id) => Some(MessageId::new(id)),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_owned(),
        None => s.to_owned(),
    }
}

fn is_not_found(err: &serenity::Error) -> bool {
    match err {
        serenity::Error::Http(e) => e.status_code().map(|s| s.as_u16()) == Some(404),
        _ => false,
    }
}
