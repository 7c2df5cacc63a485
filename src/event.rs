//! The Serenity crate we're using for the Discord API is designed around callbacks to handle
//! events.  However, this does not mesh well with our plugin framework here.  To resolve this,
//! the handler translates the callbacks into a distinct Event enum.

use crate::{context::Context, log_error};
use serenity::all::{ChannelId, Message, MessageId, Reaction, Ready};

/// A Discord event
pub enum Event {
    Ready(Ready),
    Message(Message),
    MessageDelete {
        channel_id: ChannelId,
        message_id: MessageId,
    },
    ReactionAdd(Reaction),
    ReactionRemove(Reaction),
    /// A moderator cleared every reaction from a message
    ReactionRemoveAll {
        channel_id: ChannelId,
        message_id: MessageId,
    },
    /// A moderator cleared one emoji from a message
    ReactionRemoveEmoji(Reaction),
}

impl Event {
    // When an event occurs, iterate over all the plugins to see if any can/should handle it.
    pub async fn handle(self, ctx: Context<'_>) {
        for plugin in crate::plugin::plugins() {
            match plugin.handle(&ctx, &self).await {
                Ok(EventHandled::Yes) => return,
                Ok(EventHandled::No) => continue,
                Err(err) => log_error!("Error in plugin {}: {}", plugin.name(), err),
            }
        }
    }

    /// Check if a message should be interpreted as a special bot command.
    ///
    /// These are prefixed with the configured command prefix, e. g. `;cmd foo bar baz`.  Returns
    /// the message and the arguments following the command.
    pub async fn is_bot_cmd(&self, ctx: &Context<'_>, cmd: &str) -> Option<(&Message, Vec<&str>)> {
        let Event::Message(msg) = self else {
            return None;
        };

        let prefix = ctx.cfg.read().await.general.command_prefix.clone();
        let mut terms = msg.content.split_ascii_whitespace();
        let first = terms.next()?;
        if first.strip_prefix(prefix.as_str()) != Some(cmd) {
            return None;
        }

        Some((msg, terms.collect()))
    }

    /// The source message this event may change the score of.
    pub fn reconcile_target(&self) -> Option<(ChannelId, MessageId)> {
        match self {
            Event::ReactionAdd(reaction)
            | Event::ReactionRemove(reaction)
            | Event::ReactionRemoveEmoji(reaction) => {
                Some((reaction.channel_id, reaction.message_id))
            }
            Event::ReactionRemoveAll {
                channel_id,
                message_id,
            }
            | Event::MessageDelete {
                channel_id,
                message_id,
            } => Some((*channel_id, *message_id)),
            Event::Ready(_) | Event::Message(_) => None,
        }
    }
}

pub enum EventHandled {
    Yes,
    No,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reaction(user_id: u64) -> Reaction {
        serde_json::from_value(json!({
            "channel_id": "5",
            "message_id": "1",
            "user_id": user_id.to_string(),
            "emoji": { "id": null, "name": "\u{1F44D}" },
            "burst": false,
            "burst_colors": [],
            "type": 0
        }))
        .unwrap()
    }

    #[test]
    fn every_reaction_change_is_reconciled() {
        let expected = Some((ChannelId::new(5), MessageId::new(1)));
        // 42 stands in for the bot itself; its seeded reactions are counted like anybody's.
        for user_id in [42, 43] {
            assert_eq!(Event::ReactionAdd(reaction(user_id)).reconcile_target(), expected);
            assert_eq!(Event::ReactionRemove(reaction(user_id)).reconcile_target(), expected);
            assert_eq!(
                Event::ReactionRemoveEmoji(reaction(user_id)).reconcile_target(),
                expected
            );
        }
        assert_eq!(
            Event::ReactionRemoveAll {
                channel_id: ChannelId::new(5),
                message_id: MessageId::new(1),
            }
            .reconcile_target(),
            expected
        );
    }
}
