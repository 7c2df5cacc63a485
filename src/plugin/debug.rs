use crate::{event::*, log_event, logging::*, plugin::*};
use anyhow::Result;

/// Prints debug information about event to stdout
pub struct Debug;

#[serenity::async_trait]
impl Plugin for Debug {
    fn name(&self) -> &'static str {
        "debug"
    }

    async fn usage(&self, _ctx: &Context) -> Option<String> {
        None
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        match event {
            Event::Ready(ready) => {
                log_event!(
                    "Connected to {} server(s) as {}",
                    ready.guilds.len(),
                    ready.user.color(),
                );
            }
            Event::Message(msg) => {
                log_event!(
                    "{}{}{}{}{}{} {}",
                    msg.guild_id.color(ctx.http).await,
                    Glue {}.color(),
                    msg.channel_id.color(ctx.http).await,
                    Glue {}.color(),
                    msg.author.color(),
                    Glue {}.color(),
                    msg.content,
                );
            }
            Event::MessageDelete {
                channel_id,
                message_id,
            } => {
                log_event!(
                    "Message {} deleted in \"{}\"",
                    message_id,
                    channel_id.color(ctx.http).await,
                );
            }
            Event::ReactionAdd(reaction) => {
                log_event!(
                    "{} reacted to message {} in \"{}\" with \"{}\"",
                    reaction.user_id.color(ctx.http).await,
                    reaction.message_id,
                    reaction.channel_id.color(ctx.http).await,
                    reaction.emoji.color(),
                );
            }
            Event::ReactionRemove(reaction) => {
                log_event!(
                    "{} removed reaction \"{}\" from message {} in \"{}\"",
                    reaction.user_id.color(ctx.http).await,
                    reaction.emoji.color(),
                    reaction.message_id,
                    reaction.channel_id.color(ctx.http).await,
                );
            }
            Event::ReactionRemoveAll {
                channel_id,
                message_id,
            } => {
                log_event!(
                    "All reactions removed from message {} in \"{}\"",
                    message_id,
                    channel_id.color(ctx.http).await,
                );
            }
            Event::ReactionRemoveEmoji(reaction) => {
                log_event!(
                    "Reaction \"{}\" cleared from message {} in \"{}\"",
                    reaction.emoji.color(),
                    reaction.message_id,
                    reaction.channel_id.color(ctx.http).await,
                );
            }
        }

        Ok(EventHandled::No)
    }
}
