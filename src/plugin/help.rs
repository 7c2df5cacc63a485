use crate::{event::*, plugin::*};
use anyhow::Result;

/// Lists the commands and how voting works here.
pub struct Help;

#[serenity::async_trait]
impl Plugin for Help {
    fn name(&self) -> &'static str {
        "help"
    }

    async fn usage(&self, ctx: &Context) -> Option<String> {
        let prefix = &ctx.cfg.read().await.general.command_prefix;
        Some(format!("{}{} - what this bot does", prefix, self.name()))
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Some((msg, _)) = event.is_bot_cmd(ctx, self.name()).await else {
            return Ok(EventHandled::No);
        };

        let voting = {
            let cfg = ctx.cfg.read().await;
            let channels: Vec<String> = cfg
                .mirror
                .watched_channels()
                .iter()
                .map(|c| format!("<#{}>", c))
                .collect();
            let reactions: Vec<String> = cfg
                .mirror
                .scored
                .iter()
                .map(|s| match s.target_channel {
                    Some(target) => format!("{} → <#{}>", s.reaction, target),
                    None => format!("{} (not mirrored)", s.reaction),
                })
                .collect();
            format!(
                "Vote on posts in {} with {}.  The top reaction gets the post mirrored.\n",
                channels.join(" "),
                reactions.join(", ")
            )
        };

        let mut usages = Vec::new();
        for plugin in crate::plugin::plugins() {
            if let Some(usage) = plugin.usage(ctx).await {
                usages.push(usage);
            }
        }

        let reply = format!("{}```\n{}\n```", voting, usages.join("\n"));
        msg.reply(ctx.cache_http, &reply).await?;
        Ok(EventHandled::Yes)
    }
}
