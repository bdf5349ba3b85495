//! Statistics service backends
//!
//! Both supported services share the same reporting architecture and differ only
//! in their endpoints, payload field names, accepted statuses and in how custom
//! metrics and commands are accumulated. Each service is described by a static
//! [`Backend`] value selected through [`BackendKind`].

use crate::metrics::{CustomMetricEntry, MetricsSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Selects which statistics service the client talks to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// DisStat (`/v1/bot/{id}`)
    #[default]
    Disstat,
    /// DiscordStats (`/api/bots/{id}/stats`)
    DiscordStats,
}

impl BackendKind {
    pub fn backend(self) -> &'static Backend {
        match self {
            BackendKind::Disstat => &Backend::DISSTAT,
            BackendKind::DiscordStats => &Backend::DISCORD_STATS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Disstat => "disstat",
            BackendKind::DiscordStats => "discordstats",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How custom metrics accumulate between ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    /// Every event is kept in arrival order
    Append,
    /// One entry per graph id; new data points extend the existing entry
    MergeById,
}

/// How command invocations are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandMode {
    /// Each invocation is sent as a `command` custom event
    Immediate,
    /// Invocations are counted locally and sent with the next stats report
    Aggregate,
}

/// Statuses a backend treats as success
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessStatus {
    Exact(u16),
    /// Any 2xx status
    AnySuccess,
}

impl SuccessStatus {
    pub fn accepts(self, status: u16) -> bool {
        match self {
            SuccessStatus::Exact(expected) => status == expected,
            SuccessStatus::AnySuccess => (200..300).contains(&status),
        }
    }
}

/// Payload field names used by a backend. `None` means the metric is not sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMap {
    pub cpu: &'static str,
    pub ram_used: &'static str,
    pub ram_total: &'static str,
    pub users: &'static str,
    pub guilds: &'static str,
    pub shards: &'static str,
    pub members: Option<&'static str>,
    pub api_latency: Option<&'static str>,
    pub bandwidth: Option<&'static str>,
    pub custom: &'static str,
    pub commands: Option<&'static str>,
}

/// One endpoint of a service and the statuses it answers with on success
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// Path template; `{id}` is replaced by the bot id
    pub path: &'static str,
    pub success: SuccessStatus,
}

impl Endpoint {
    pub fn path_for(&self, bot_id: u64) -> String {
        Backend::path(self.path, bot_id)
    }
}

/// Static description of one statistics service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backend {
    pub kind: BackendKind,
    /// Name used in error messages
    pub display_name: &'static str,
    pub default_base_url: &'static str,
    /// `None` when the service has no such endpoint
    pub bot_info: Option<Endpoint>,
    pub custom: Option<Endpoint>,
    pub stats: Endpoint,
    pub fields: FieldMap,
    pub queue_mode: QueueMode,
    pub command_mode: CommandMode,
    /// Send `custom`/`commands` even when there is nothing queued
    pub send_empty_collections: bool,
}

impl Backend {
    pub const DISSTAT: Backend = Backend {
        kind: BackendKind::Disstat,
        display_name: "Disstat",
        default_base_url: "https://disstat-api.tomatenkuchen.com",
        bot_info: Some(Endpoint {
            path: "/v1/bot/{id}",
            success: SuccessStatus::Exact(200),
        }),
        custom: Some(Endpoint {
            path: "/v1/bot/{id}/custom",
            success: SuccessStatus::Exact(200),
        }),
        stats: Endpoint {
            path: "/v1/bot/{id}",
            success: SuccessStatus::Exact(204),
        },
        fields: FieldMap {
            cpu: "cpu",
            ram_used: "ramUsage",
            ram_total: "ramTotal",
            users: "users",
            guilds: "guilds",
            shards: "shards",
            members: None,
            api_latency: Some("apiPing"),
            bandwidth: Some("bandwidth"),
            custom: "custom",
            commands: None,
        },
        queue_mode: QueueMode::Append,
        command_mode: CommandMode::Immediate,
        send_empty_collections: false,
    };

    pub const DISCORD_STATS: Backend = Backend {
        kind: BackendKind::DiscordStats,
        display_name: "DiscordStats",
        default_base_url: "https://discordstatsbot.de",
        bot_info: None,
        custom: None,
        stats: Endpoint {
            path: "/api/bots/{id}/stats",
            success: SuccessStatus::AnySuccess,
        },
        fields: FieldMap {
            cpu: "cpuUsage",
            ram_used: "ramUsage",
            ram_total: "totalRam",
            users: "userCount",
            guilds: "guildCount",
            shards: "shardCount",
            members: Some("members"),
            api_latency: None,
            bandwidth: None,
            custom: "customCharts",
            commands: Some("commands"),
        },
        queue_mode: QueueMode::MergeById,
        command_mode: CommandMode::Aggregate,
        send_empty_collections: true,
    };

    /// Expand a path template for the given bot id
    pub fn path(template: &str, bot_id: u64) -> String {
        template.replace("{id}", &bot_id.to_string())
    }

    /// Build the stats payload from a snapshot and the drained collections
    pub fn build_payload(
        &self,
        snapshot: &MetricsSnapshot,
        custom: &[CustomMetricEntry],
        commands: &HashMap<String, u64>,
    ) -> Map<String, Value> {
        let fields = &self.fields;
        let mut payload = Map::new();

        if let Some(shards) = snapshot.shard_count {
            payload.insert(fields.shards.to_string(), Value::from(shards));
        }
        if let Some(key) = fields.bandwidth {
            payload.insert(key.to_string(), Value::from(snapshot.bandwidth_bytes));
        }
        payload.insert(fields.cpu.to_string(), Value::from(snapshot.cpu_percent));
        payload.insert(fields.ram_used.to_string(), Value::from(snapshot.ram_used_bytes));
        payload.insert(fields.ram_total.to_string(), Value::from(snapshot.ram_total_bytes));
        if let (Some(key), Some(latency)) = (fields.api_latency, snapshot.api_latency_ms) {
            payload.insert(key.to_string(), Value::from(latency));
        }
        payload.insert(fields.users.to_string(), Value::from(snapshot.user_count));
        payload.insert(fields.guilds.to_string(), Value::from(snapshot.guild_count));
        if let Some(key) = fields.members {
            payload.insert(key.to_string(), Value::from(snapshot.member_count));
        }

        if self.send_empty_collections || !custom.is_empty() {
            // Entries are plain data; serialization cannot fail
            let entries = serde_json::to_value(custom).unwrap_or_else(|_| Value::Array(Vec::new()));
            payload.insert(fields.custom.to_string(), entries);
        }
        if let Some(key) = fields.commands {
            if self.send_empty_collections || !commands.is_empty() {
                let counts: Map<String, Value> = commands
                    .iter()
                    .map(|(name, count)| (name.clone(), Value::from(*count)))
                    .collect();
                payload.insert(key.to_string(), Value::Object(counts));
            }
        }

        payload
    }
}
