mod config;
mod context;
mod document_store;
mod event;
mod handler;
mod helper;
mod logging;
mod mirror;
mod plugin;

use mirror::{DiscordMessenger, Reconciler};
use serenity::{
    all::{GatewayIntents, Http},
    Client,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = crate::config::Config::load().await?;
    let token = cfg.general.discord_token.clone();

    // The engine gets its own HTTP client so it exists before the gateway client does.
    let http = Arc::new(Http::new(&token));
    let mut reconciler = Reconciler::new(DiscordMessenger::new(http), cfg.mirror.timeout());
    if let Some(store_cfg) = &cfg.document_store {
        reconciler = reconciler.with_persistence(store_cfg.open()?);
        // Not fatal; the backlog scan rebuilds what it can.
        if let Err(e) = reconciler.restore().await {
            crate::log_error!("Could not restore mirrors: {}", e);
        }
    }

    let handler = handler::Handler::new(cfg, reconciler);

    // Things we want discord to tell us about.
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_MESSAGE_REACTIONS
        | GatewayIntents::MESSAGE_CONTENT;

    Client::builder(&token, intents)
        .event_handler(handler)
        .await?
        .start()
        .await
        .map_err(Into::into)
}
