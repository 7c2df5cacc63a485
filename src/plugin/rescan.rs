use crate::helper::MessageHelper;
use crate::{event::*, log_internal, plugin::*};
use anyhow::Result;

/// Reruns the startup backlog scan on demand
pub struct Rescan;

#[serenity::async_trait]
impl Plugin for Rescan {
    fn name(&self) -> &'static str {
        "rescan"
    }

    async fn usage(&self, ctx: &Context) -> Option<String> {
        let prefix = &ctx.cfg.read().await.general.command_prefix;
        Some(format!(
            "{}{} - re-check recent posts in watched channels (bot owner only)",
            prefix,
            self.name()
        ))
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Some((msg, _)) = event.is_bot_cmd(ctx, self.name()).await else {
            return Ok(EventHandled::No);
        };

        if !msg.is_from_owner(ctx).await {
            msg.reply(ctx.cache_http, "Only bot owners may rescan").await?;
            return Ok(EventHandled::Yes);
        }

        let typing = msg.channel_id.start_typing(ctx.http);
        let report = super::mirror::scan_backlog(ctx).await;
        typing.stop();

        log_internal!("Rescan requested by {}: {:?}", msg.author.name, report);
        let mut reply = format!(
            "Checked {} message(s), adopted {} existing mirror(s)",
            report.reconciled, report.adopted
        );
        if report.duplicates_removed > 0 {
            reply.push_str(&format!(
                ", removed {} duplicate mirror(s)",
                report.duplicates_removed
            ));
        }
        if report.failed_messages > 0 {
            reply.push_str(&format!(", {} message(s) failed", report.failed_messages));
        }
        if !report.skipped_channels.is_empty() {
            let channels: Vec<String> = report
                .skipped_channels
                .iter()
                .map(|c| format!("<#{}>", c))
                .collect();
            reply.push_str(&format!(", skipped {}", channels.join(" ")));
        }

        msg.reply(ctx.cache_http, reply).await?;
        Ok(EventHandled::Yes)
    }
}
