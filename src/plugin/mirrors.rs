use crate::{event::*, plugin::*};
use anyhow::Result;
use serenity::all::{ChannelId, MessageId};
use std::collections::BTreeMap;

/// Reports what the mirror store currently holds
pub struct Mirrors;

#[serenity::async_trait]
impl Plugin for Mirrors {
    fn name(&self) -> &'static str {
        "mirrors"
    }

    async fn usage(&self, ctx: &Context) -> Option<String> {
        let prefix = &ctx.cfg.read().await.general.command_prefix;
        Some(format!(
            "{}{} [message-id] - show live mirrors, overall or of one message",
            prefix,
            self.name()
        ))
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Some((msg, args)) = event.is_bot_cmd(ctx, self.name()).await else {
            return Ok(EventHandled::No);
        };

        let reply = match args.first() {
            None => summary(ctx).await,
            Some(id) => match id.parse::<u64>() {
                Ok(id) if id != 0 => record(ctx, MessageId::new(id), msg.guild_id).await,
                _ => format!("`{}` is not a message id", id),
            },
        };

        msg.reply(ctx.cache_http, reply).await?;
        Ok(EventHandled::Yes)
    }
}

async fn summary(ctx: &Context<'_>) -> String {
    let store = ctx.mirror.store().await;
    if store.is_empty() {
        return "No messages are currently mirrored".to_owned();
    }

    let mut per_target: BTreeMap<ChannelId, usize> = BTreeMap::new();
    for (_, record) in store.records() {
        for target in record.keys() {
            *per_target.entry(*target).or_default() += 1;
        }
    }

    let mut reply = format!("{} message(s) currently mirrored:", store.len());
    for (target, count) in per_target {
        reply.push_str(&format!("\n<#{}>: {}", target, count));
    }
    reply
}

async fn record(
    ctx: &Context<'_>,
    source_id: MessageId,
    guild_id: Option<serenity::all::GuildId>,
) -> String {
    let store = ctx.mirror.store().await;
    let Some(record) = store.get(source_id) else {
        return format!("Message {} is not mirrored anywhere", source_id);
    };

    let mut targets: Vec<_> = record.iter().collect();
    targets.sort();

    let guild = guild_id.map_or("@me".to_owned(), |id| id.to_string());
    let mut reply = format!("Message {} is mirrored in:", source_id);
    for (target, mirror_id) in targets {
        reply.push_str(&format!(
            "\n<#{}>: https://discord.com/channels/{}/{}/{}",
            target, guild, target, mirror_id
        ));
    }
    reply
}
