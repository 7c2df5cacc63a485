use crate::mirror::{
    reaction::ReactionKind,
    reconcile::DEFAULT_TIMEOUT,
    score::{ScoreSpec, ScoredReaction, SCORED_COUNT},
    DEFAULT_MIN_THRESHOLD,
};
use anyhow::{anyhow, Result};
use serenity::all::ChannelId;
use std::{path::PathBuf, time::Duration};
use tokio::io::AsyncReadExt;

const CONFIG_DIR_REL_HOME: &str = ".config/hutbot";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Bot configuration
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Config {
    pub general: General,
    pub mirror: Mirror,
    /// Where to keep a copy of the mirror store.  Memory only if absent.
    pub document_store: Option<DocumentStoreConfig>,
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct General {
    pub discord_token: String,
    pub bot_owners: Vec<String>,
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct Mirror {
    /// Channels whose messages are voted on
    pub watched_channels: Vec<u64>,
    /// Exactly three, in score order
    pub scored: [ScoredReactionConfig; SCORED_COUNT],
    pub neutral: Option<ReactionKind>,
    #[serde(default = "default_min_threshold")]
    pub min_threshold: u64,
    #[serde(default = "default_backlog_message_count")]
    pub backlog_message_count: u8,
    #[serde(default = "default_collaborator_timeout_seconds")]
    pub collaborator_timeout_seconds: u64,
    /// Add the scored and neutral reactions to new image posts
    #[serde(default = "default_seed_reactions")]
    pub seed_reactions: bool,
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct ScoredReactionConfig {
    pub reaction: ReactionKind,
    pub target_channel: Option<u64>,
}

#[derive(Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentStoreConfig {
    /// Relative paths are relative to the configuration directory.
    File { path: PathBuf },
    JsonBin {
        bin_id: String,
        api_key: String,
        #[serde(default = "default_json_bin_url")]
        base_url: String,
    },
}

fn default_command_prefix() -> String {
    ";".to_owned()
}

fn default_min_threshold() -> u64 {
    DEFAULT_MIN_THRESHOLD
}

fn default_backlog_message_count() -> u8 {
    50
}

fn default_collaborator_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_seed_reactions() -> bool {
    true
}

fn default_json_bin_url() -> String {
    crate::document_store::DEFAULT_BASE_URL.to_owned()
}

impl Config {
    pub fn config_dir() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|p| p.join(CONFIG_DIR_REL_HOME))
            .ok_or(anyhow!("Could not find home directory"))
    }

    fn config_path() -> Result<PathBuf> {
        Self::config_dir().map(|p| p.join(CONFIG_FILE_NAME))
    }

    pub async fn load() -> Result<Self> {
        let path = Self::config_path()?;

        let mut file = tokio::fs::File::open(&path).await.map_err(|e| {
            anyhow!(
                "Could not open configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        let mut contents = String::new();
        file.read_to_string(&mut contents).await.map_err(|e| {
            anyhow!(
                "Could not read configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        Self::parse(&contents).map_err(|e| {
            anyhow!(
                "Could not parse configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let mirror = &self.mirror;
        if mirror.watched_channels.contains(&0) {
            return Err(anyhow!("`mirror.watched_channels` contains an invalid id 0"));
        }
        if mirror.scored.iter().any(|s| s.target_channel == Some(0)) {
            return Err(anyhow!("`mirror.scored` contains an invalid target channel 0"));
        }
        if mirror.backlog_message_count > 100 {
            return Err(anyhow!(
                "`mirror.backlog_message_count` must be at most 100 (Discord limit)"
            ));
        }
        if mirror.collaborator_timeout_seconds == 0 {
            return Err(anyhow!("`mirror.collaborator_timeout_seconds` must be positive"));
        }

        let targets: Vec<u64> = mirror.scored.iter().filter_map(|s| s.target_channel).collect();
        if let Some(id) = mirror.watched_channels.iter().find(|&&id| targets.contains(&id)) {
            // Mirrors would be voted on and mirrored again.
            return Err(anyhow!("Channel {} is both watched and a mirror target", id));
        }

        Ok(())
    }

    pub async fn reload(&mut self) -> Result<()> {
        let new = Self::load().await?;
        *self = new;
        Ok(())
    }
}

impl Mirror {
    pub fn score_spec(&self) -> ScoreSpec {
        ScoreSpec {
            scored: self.scored.each_ref().map(|s| ScoredReaction {
                reaction: s.reaction.clone(),
                target_channel: s.target_channel.map(ChannelId::new),
            }),
            neutral: self.neutral.clone(),
        }
    }

    pub fn watched_channels(&self) -> Vec<ChannelId> {
        self.watched_channels
            .iter()
            .copied()
            .map(ChannelId::new)
            .collect()
    }

    pub fn is_watched(&self, channel_id: ChannelId) -> bool {
        self.watched_channels.contains(&channel_id.get())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.collaborator_timeout_seconds)
    }
}
