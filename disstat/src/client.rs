//! Statistics service client
//!
//! [`StatsClient`] issues authenticated requests to one configured backend and
//! owns the custom metric queue, the command counter and the reporting loop.
//! Stats reports drain the queue and counter before sending; if the send fails
//! the drained data is restored so it goes out with the next report.

use crate::backend::{Backend, CommandMode, QueueMode};
use crate::config::ClientConfig;
use crate::error::{DisstatError, Result};
use crate::host::{BotHost, CommandInvocation};
use crate::metrics::{
    CommandCounter, CustomEvent, CustomGraph, CustomMetricEntry, CustomMetricQueue, MetricValue,
    MetricsSnapshot, SystemSampler,
};
use crate::reporter::{log_error_hook, ErrorHook, LoopState, ReportTarget, ReportingLoop};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Bot information as returned by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BotInfo(pub Value);

impl BotInfo {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

/// Authenticated client for a statistics service
pub struct StatsClient {
    config: ClientConfig,
    backend: &'static Backend,
    base_url: String,
    http: Client,
    host: Arc<dyn BotHost>,
    sampler: Mutex<SystemSampler>,
    queue: CustomMetricQueue,
    commands: CommandCounter,
    reporter: ReportingLoop,
    error_hook: ErrorHook,
}

impl StatsClient {
    /// Create a client for the configured backend
    pub fn new(config: ClientConfig, host: Arc<dyn BotHost>) -> Result<Self> {
        config.validate()?;

        let backend = config.backend.backend();
        let http = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        info!(
            backend = %config.backend,
            interval_secs = config.report_interval.as_secs(),
            "Created statistics client"
        );

        Ok(Self {
            base_url: config.resolved_base_url(),
            backend,
            http,
            host,
            sampler: Mutex::new(SystemSampler::new()),
            queue: CustomMetricQueue::new(backend.queue_mode),
            commands: CommandCounter::new(),
            reporter: ReportingLoop::new(config.report_interval),
            error_hook: log_error_hook(),
            config,
        })
    }

    /// Replace the hook that receives errors from background report ticks
    pub fn with_error_hook(mut self, hook: ErrorHook) -> Self {
        self.error_hook = hook;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn backend(&self) -> &'static Backend {
        self.backend
    }

    pub fn queue(&self) -> &CustomMetricQueue {
        &self.queue
    }

    pub fn commands(&self) -> &CommandCounter {
        &self.commands
    }

    /// Fetch bot information, defaulting to the host's own bot id
    pub async fn get_bot_info(&self, bot_id: Option<u64>) -> Result<BotInfo> {
        let endpoint = self
            .backend
            .bot_info
            .ok_or_else(|| self.unsupported("get_bot_info"))?;
        let bot_id = match bot_id {
            Some(id) => id,
            None => self.bot_id()?,
        };

        let response = self
            .request(Method::GET, &endpoint.path_for(bot_id))
            .send()
            .await?;
        let status = response.status().as_u16();
        if !endpoint.success.accepts(status) {
            return Err(DisstatError::api(
                format!("{} getting bot info failed", self.backend.display_name),
                status,
            ));
        }

        debug!(bot_id, "Fetched bot info");
        Ok(response.json::<BotInfo>().await?)
    }

    /// Report a command invocation observed by the host
    pub async fn post_command(&self, invocation: &CommandInvocation) -> Result<()> {
        self.post_command_raw(
            &invocation.name,
            invocation.user_id,
            invocation.guild_id.unwrap_or(0),
        )
        .await
    }

    /// Report a command by name and ids.
    ///
    /// Immediate backends send a `command` custom event (queued while the loop
    /// runs); aggregating backends count it for the next stats report.
    pub async fn post_command_raw(&self, name: &str, user_id: u64, guild_id: u64) -> Result<()> {
        if name.trim().is_empty() {
            return Err(DisstatError::validation("command_name cannot be empty"));
        }

        match self.backend.command_mode {
            CommandMode::Immediate => {
                self.post_custom(
                    "command",
                    vec![name.into(), user_id.into(), guild_id.into()],
                )
                .await
            }
            CommandMode::Aggregate => self.commands.increment(name).map(|_| ()),
        }
    }

    /// Count a command for the next aggregated report
    pub fn record_command(&self, name: &str) -> Result<u64> {
        if self.backend.command_mode != CommandMode::Aggregate {
            return Err(self.unsupported("record_command"));
        }
        self.commands.increment(name)
    }

    /// Post a custom event of up to three values.
    ///
    /// While the reporting loop runs the event is queued for the next report,
    /// otherwise it is sent right away.
    pub async fn post_custom(&self, graph_type: &str, values: Vec<MetricValue>) -> Result<()> {
        let endpoint = match (self.backend.queue_mode, self.backend.custom) {
            (QueueMode::Append, Some(endpoint)) => endpoint,
            _ => return Err(self.unsupported("post_custom")),
        };
        let event = CustomEvent::new(graph_type, values)?;

        if self.reporter.is_running() {
            return self.queue.push(CustomMetricEntry::Event(event));
        }

        let path = endpoint.path_for(self.bot_id()?);
        let response = self.request(Method::POST, &path).json(&event).send().await?;
        let status = response.status().as_u16();
        if !endpoint.success.accepts(status) {
            return Err(DisstatError::api(
                format!("{} posting custom failed", self.backend.display_name),
                status,
            ));
        }

        debug!(graph_type, "Posted custom event");
        Ok(())
    }

    /// Add a data point to a custom chart, merged by id until the next report
    pub fn post_custom_graph(&self, id: &str, data: Map<String, Value>) -> Result<()> {
        if self.backend.queue_mode != QueueMode::MergeById {
            return Err(self.unsupported("post_custom_graph"));
        }
        self.queue.push(CustomMetricEntry::Graph(CustomGraph {
            id: id.to_string(),
            data: vec![data],
        }))
    }

    /// Build and send a full stats report.
    ///
    /// Drains the custom queue (and command counts on aggregating backends);
    /// the drained data is restored if the request fails.
    pub async fn post_stat(&self) -> Result<()> {
        self.host.wait_until_ready().await;

        let sample = self.sampler.lock().sample();
        let snapshot = MetricsSnapshot::build(self.host.as_ref(), &sample);

        let custom = self.queue.drain();
        let commands = match self.backend.command_mode {
            CommandMode::Aggregate => self.commands.drain(),
            CommandMode::Immediate => Default::default(),
        };

        let payload = self.backend.build_payload(&snapshot, &custom, &commands);
        let result = if payload.is_empty() {
            Err(DisstatError::validation("stats payload must not be empty"))
        } else {
            self.send_stats(&payload).await
        };

        if result.is_err() {
            self.queue.restore(custom);
            self.commands.restore(commands);
        }
        result
    }

    /// Send an explicit stats payload instead of a collected snapshot
    pub async fn post_stat_with(&self, payload: Value) -> Result<()> {
        let payload = match payload {
            Value::Object(map) if map.is_empty() => {
                return Err(DisstatError::validation("stats payload must not be empty"))
            }
            Value::Object(map) => map,
            _ => return Err(DisstatError::validation("stats payload must be a JSON object")),
        };

        self.host.wait_until_ready().await;
        self.send_stats(&payload).await
    }

    /// Start periodic reporting. Does nothing if the loop is already running.
    pub fn start_loop(self: &Arc<Self>) -> bool {
        self.reporter.start(Arc::downgrade(self))
    }

    /// Stop periodic reporting. Queued metrics are kept.
    pub fn stop_loop(&self) -> bool {
        self.reporter.stop()
    }

    pub fn loop_state(&self) -> LoopState {
        self.reporter.state()
    }

    pub fn is_loop_running(&self) -> bool {
        self.reporter.is_running()
    }

    async fn send_stats(&self, payload: &Map<String, Value>) -> Result<()> {
        let stats = self.backend.stats;
        let path = stats.path_for(self.bot_id()?);
        let response = self.request(Method::POST, &path).json(payload).send().await?;
        let status = response.status().as_u16();
        if !stats.success.accepts(status) {
            return Err(DisstatError::api(
                format!("{} posting stat failed", self.backend.display_name),
                status,
            ));
        }

        debug!(fields = payload.len(), "Posted bot statistics");
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header(AUTHORIZATION, self.config.api_key.as_str())
            .header(USER_AGENT, self.config.user_agent.as_str())
    }

    fn bot_id(&self) -> Result<u64> {
        self.host
            .current_user_id()
            .ok_or_else(|| DisstatError::validation("bot user id is not available yet"))
    }

    fn unsupported(&self, operation: &'static str) -> DisstatError {
        DisstatError::Unsupported {
            operation,
            backend: self.backend.kind.as_str(),
        }
    }
}

#[async_trait]
impl ReportTarget for StatsClient {
    fn host(&self) -> Arc<dyn BotHost> {
        self.host.clone()
    }

    async fn report(&self) -> Result<()> {
        self.post_stat().await
    }

    fn on_error(&self, err: &DisstatError) {
        (self.error_hook)(err);
    }
}
