use crate::host::BotHost;
use serde::Serialize;
use sysinfo::{Networks, System};

/// Host resource readings taken for one report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemSample {
    /// Global CPU usage, 0-100
    pub cpu_percent: u8,
    pub ram_used_bytes: u64,
    pub ram_total_bytes: u64,
    /// Bytes sent and received on all interfaces since the previous sample
    pub bandwidth_bytes: u64,
}

/// Samples CPU, memory and network traffic with sysinfo
pub struct SystemSampler {
    system: System,
    networks: Networks,
    previous_traffic: u64,
}

impl SystemSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is computed between two refreshes; prime the first one
        system.refresh_cpu();
        system.refresh_memory();

        let networks = Networks::new_with_refreshed_list();
        let previous_traffic = total_traffic(&networks);

        Self {
            system,
            networks,
            previous_traffic,
        }
    }

    /// Refresh and read the current values
    pub fn sample(&mut self) -> SystemSample {
        self.system.refresh_cpu();
        self.system.refresh_memory();
        self.networks.refresh();

        let cpu = self.system.global_cpu_info().cpu_usage();
        let traffic = total_traffic(&self.networks);
        let bandwidth_bytes = traffic.saturating_sub(self.previous_traffic);
        self.previous_traffic = traffic;

        SystemSample {
            cpu_percent: cpu_percent(cpu),
            ram_used_bytes: self.system.used_memory(),
            ram_total_bytes: self.system.total_memory(),
            bandwidth_bytes,
        }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

fn total_traffic(networks: &Networks) -> u64 {
    networks
        .into_iter()
        .map(|(_, data)| data.total_received() + data.total_transmitted())
        .sum()
}

fn cpu_percent(usage: f32) -> u8 {
    if usage.is_nan() {
        return 0;
    }
    usage.round().clamp(0.0, 100.0) as u8
}

/// Point-in-time metrics gathered for a single report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub cpu_percent: u8,
    pub ram_used_bytes: u64,
    pub ram_total_bytes: u64,
    pub bandwidth_bytes: u64,
    pub user_count: u32,
    pub guild_count: u32,
    pub member_count: u32,
    pub shard_count: Option<u32>,
    pub api_latency_ms: Option<u32>,
}

impl MetricsSnapshot {
    /// Combine a resource sample with the host bot's counters
    pub fn build(host: &dyn BotHost, sample: &SystemSample) -> Self {
        let api_latency_ms = host
            .api_latency()
            .map(|latency| u32::try_from(latency.as_millis()).unwrap_or(u32::MAX));

        Self {
            cpu_percent: sample.cpu_percent,
            ram_used_bytes: sample.ram_used_bytes,
            ram_total_bytes: sample.ram_total_bytes,
            bandwidth_bytes: sample.bandwidth_bytes,
            user_count: host.user_count(),
            guild_count: host.guild_count(),
            member_count: host.all_members_count(),
            shard_count: host.shard_count(),
            api_latency_ms,
        }
    }
}
