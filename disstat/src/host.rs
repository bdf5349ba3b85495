//! Host bot collaborator interface

use async_trait::async_trait;
use std::time::Duration;

/// Read-only view of the bot process the client reports on
#[async_trait]
pub trait BotHost: Send + Sync {
    /// Id of the logged-in bot user, once known
    fn current_user_id(&self) -> Option<u64>;

    /// Shard count, only for sharded bots
    fn shard_count(&self) -> Option<u32>;

    fn user_count(&self) -> u32;

    fn guild_count(&self) -> u32;

    /// Members across all guilds
    fn all_members_count(&self) -> u32;

    /// Gateway heartbeat latency
    fn api_latency(&self) -> Option<Duration>;

    /// Resolves once the bot has connected and cached its state
    async fn wait_until_ready(&self);

    fn is_closed(&self) -> bool;
}

/// A command invocation observed by the host bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub name: String,
    pub user_id: u64,
    /// `None` for direct messages
    pub guild_id: Option<u64>,
}

impl CommandInvocation {
    pub fn new(name: impl Into<String>, user_id: u64, guild_id: Option<u64>) -> Self {
        Self {
            name: name.into(),
            user_id,
            guild_id,
        }
    }
}
