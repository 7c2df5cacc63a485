use crate::{
    config::Config,
    context::{Context, MirrorEngine},
    event::Event,
};
use serenity::all::{ChannelId, GuildId, Message, MessageId, Reaction, Ready};
use tokio::sync::RwLock;

/// Discord event handler
pub struct Handler {
    cfg: RwLock<Config>,
    mirror: MirrorEngine,
}

impl<'a> Handler {
    pub fn new(cfg: Config, mirror: MirrorEngine) -> Self {
        Self {
            cfg: RwLock::new(cfg),
            mirror,
        }
    }

    fn ctx(&'a self, discord_ctx: &'a serenity::all::Context) -> Context<'a> {
        Context {
            cfg: &self.cfg,
            mirror: &self.mirror,
            cache: &discord_ctx.cache,
            http: &discord_ctx.http,
            cache_http: discord_ctx,
        }
    }
}

#[serenity::async_trait]
impl serenity::all::EventHandler for Handler {
    async fn ready(&self, discord_ctx: serenity::all::Context, ready: Ready) {
        Event::Ready(ready).handle(self.ctx(&discord_ctx)).await;
    }

    async fn message(&self, discord_ctx: serenity::all::Context, msg: Message) {
        Event::Message(msg).handle(self.ctx(&discord_ctx)).await;
    }

    async fn message_delete(
        &self,
        discord_ctx: serenity::all::Context,
        channel_id: ChannelId,
        message_id: MessageId,
        _guild_id: Option<GuildId>,
    ) {
        Event::MessageDelete {
            channel_id,
            message_id,
        }
        .handle(self.ctx(&discord_ctx))
        .await;
    }

    async fn reaction_add(&self, discord_ctx: serenity::all::Context, reaction: Reaction) {
        Event::ReactionAdd(reaction)
            .handle(self.ctx(&discord_ctx))
            .await;
    }

    async fn reaction_remove(&self, discord_ctx: serenity::all::Context, reaction: Reaction) {
        Event::ReactionRemove(reaction)
            .handle(self.ctx(&discord_ctx))
            .await;
    }

    async fn reaction_remove_all(
        &self,
        discord_ctx: serenity::all::Context,
        channel_id: ChannelId,
        message_id: MessageId,
    ) {
        Event::ReactionRemoveAll {
            channel_id,
            message_id,
        }
        .handle(self.ctx(&discord_ctx))
        .await;
    }

    async fn reaction_remove_emoji(&self, discord_ctx: serenity::all::Context, reaction: Reaction) {
        Event::ReactionRemoveEmoji(reaction)
            .handle(self.ctx(&discord_ctx))
            .await;
    }
}
