//! Bot statistics reporting for DisStat-compatible services
//!
//! A [`StatsClient`] periodically posts CPU, memory, user/guild counts and
//! application-defined metrics for a chat bot to a remote statistics service.
//! The service is selected with [`BackendKind`]; the host bot is reached through
//! the [`BotHost`] trait.

pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod host;
pub mod logging;
pub mod metrics;
pub mod reporter;

pub use crate::backend::{Backend, BackendKind, CommandMode, Endpoint, QueueMode, SuccessStatus};
pub use crate::client::{BotInfo, StatsClient};
pub use crate::config::{ClientConfig, ConfigValidationError};
pub use crate::error::{DisstatError, Result};
pub use crate::host::{BotHost, CommandInvocation};
pub use crate::metrics::{
    CommandCounter, CustomEvent, CustomGraph, CustomMetricEntry, CustomMetricQueue, MetricValue,
    MetricsSnapshot, SystemSample, SystemSampler,
};
pub use crate::reporter::{log_error_hook, ErrorHook, LoopState, ReportTarget, ReportingLoop};
