use crate::{
    event::*,
    log_error, log_internal,
    mirror::{messenger::has_image, BacklogReport},
    plugin::*,
};
use anyhow::Result;
use serenity::all::{ChannelId, Message, MessageId};

/// Reaction voting: seeds reactions on new posts, keeps mirrors in line with votes and rebuilds
/// the mirror store on startup.
pub struct Mirror;

#[serenity::async_trait]
impl Plugin for Mirror {
    fn name(&self) -> &'static str {
        "mirror"
    }

    async fn usage(&self, _ctx: &Context) -> Option<String> {
        None
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        match event {
            Event::Ready(_) => {
                let report = scan_backlog(ctx).await;
                log_internal!("Backlog scan done: {:?}", report);
                Ok(EventHandled::Yes)
            }
            Event::Message(msg) => seed(ctx, msg).await,
            // Includes this bot's own reactions; they count towards the score too.
            _ => match event.reconcile_target() {
                Some((channel_id, message_id)) => reconcile(ctx, channel_id, message_id).await,
                None => Ok(EventHandled::No),
            },
        }
    }
}

async fn reconcile(
    ctx: &Context<'_>,
    channel_id: ChannelId,
    message_id: MessageId,
) -> Result<EventHandled> {
    let (spec, min_threshold) = {
        let cfg = ctx.cfg.read().await;
        if !cfg.mirror.is_watched(channel_id) {
            return Ok(EventHandled::No);
        }
        (cfg.mirror.score_spec(), cfg.mirror.min_threshold)
    };

    let report = ctx
        .mirror
        .reconcile(channel_id, message_id, &spec, min_threshold)
        .await?;
    if !report.failed.is_empty() {
        log_error!(
            "{} target(s) of message {} left out of date until its next reaction",
            report.failed.len(),
            message_id
        );
    }
    Ok(EventHandled::Yes)
}

/// Add the voting reactions to a new image post.
async fn seed(ctx: &Context<'_>, msg: &Message) -> Result<EventHandled> {
    let spec = {
        let cfg = ctx.cfg.read().await;
        if !cfg.mirror.seed_reactions || !cfg.mirror.is_watched(msg.channel_id) {
            return Ok(EventHandled::No);
        }
        cfg.mirror.score_spec()
    };

    if msg.author.bot || !has_image(msg) {
        return Ok(EventHandled::No);
    }

    for kind in spec.seed_reactions() {
        if let Err(e) = msg.react(ctx.cache_http, kind.to_reaction_type()).await {
            log_error!("Could not seed {} on message {}: {}", kind, msg.id, e);
        }
    }
    Ok(EventHandled::Yes)
}

/// Adopt existing mirrors and reconcile the recent history of every watched channel.
pub async fn scan_backlog(ctx: &Context<'_>) -> BacklogReport {
    let (watched, spec, min_threshold, limit) = {
        let cfg = ctx.cfg.read().await;
        (
            cfg.mirror.watched_channels(),
            cfg.mirror.score_spec(),
            cfg.mirror.min_threshold,
            cfg.mirror.backlog_message_count,
        )
    };

    log_internal!(
        "Scanning the last {} messages of {} watched channel(s)... ",
        limit,
        watched.len()
    );
    ctx.mirror
        .scan_backlog(&watched, &spec, min_threshold, limit)
        .await
}
