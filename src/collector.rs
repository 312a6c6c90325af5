//! Host metric sampling.
//!
//! Gathers host identity, CPU, memory, disk and network statistics through
//! `sysinfo` into a single [`Metrics`] snapshot, serialized in the shape the
//! Uppi report endpoint expects. Statistics the platform cannot provide are
//! left out of the payload rather than reported as zero.

use serde::Serialize;
use std::net::IpAddr;
use sysinfo::{Disks, Networks, System};

/// Interface names never reported.
const LOOPBACK_INTERFACES: &[&str] = &["lo", "lo0"];

/// One metrics snapshot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Metrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_usage: Option<f64>,
    #[serde(rename = "cpu_load_1", skip_serializing_if = "Option::is_none")]
    pub cpu_load1: Option<f64>,
    #[serde(rename = "cpu_load_5", skip_serializing_if = "Option::is_none")]
    pub cpu_load5: Option<f64>,
    #[serde(rename = "cpu_load_15", skip_serializing_if = "Option::is_none")]
    pub cpu_load15: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_used: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_available: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_usage_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swap_total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swap_used: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swap_usage_percent: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub disk_metrics: Vec<DiskMetric>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub network_metrics: Vec<NetworkMetric>,
    /// RFC 3339 UTC timestamp of the snapshot.
    pub collected_at: String,
}

/// Usage of one mounted filesystem.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskMetric {
    pub mount_point: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
    pub usage_percent: f64,
}

/// Cumulative counters of one network interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkMetric {
    pub interface_name: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
}

/// Take a metrics snapshot.
///
/// Blocks for [`sysinfo::MINIMUM_CPU_UPDATE_INTERVAL`] to measure CPU usage.
pub fn collect() -> Metrics {
    let mut metrics = Metrics {
        collected_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        ..Default::default()
    };

    collect_host(&mut metrics);
    collect_cpu(&mut metrics);
    collect_memory(&mut metrics);
    metrics.disk_metrics = collect_disks();
    metrics.network_metrics = collect_networks();

    tracing::debug!(
        disks = metrics.disk_metrics.len(),
        interfaces = metrics.network_metrics.len(),
        "metrics collected"
    );
    metrics
}

fn collect_host(metrics: &mut Metrics) {
    metrics.hostname = System::host_name();
    metrics.os = match (System::name(), System::os_version()) {
        (Some(name), Some(version)) => Some(format!("{name} {version}")),
        (Some(name), None) => Some(name),
        _ => None,
    };

    let networks = Networks::new_with_refreshed_list();
    metrics.ip_address = main_ipv4(
        networks
            .iter()
            .filter(|(name, _)| !is_loopback(name))
            .flat_map(|(_, data)| data.ip_networks().iter().map(|net| net.addr)),
    )
    .map(|ip| ip.to_string());
}

fn collect_cpu(metrics: &mut Metrics) {
    let mut system = System::new();
    system.refresh_cpu_usage();
    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    system.refresh_cpu_usage();
    if !system.cpus().is_empty() {
        metrics.cpu_usage = Some(f64::from(system.global_cpu_usage()));
    }

    // Windows has no load average; sysinfo reports zeros there.
    if cfg!(unix) {
        let load = System::load_average();
        metrics.cpu_load1 = Some(load.one);
        metrics.cpu_load5 = Some(load.five);
        metrics.cpu_load15 = Some(load.fifteen);
    }
}

fn collect_memory(metrics: &mut Metrics) {
    let mut system = System::new();
    system.refresh_memory();

    let total = system.total_memory();
    if total > 0 {
        let used = system.used_memory();
        metrics.memory_total = Some(total);
        metrics.memory_used = Some(used);
        metrics.memory_available = Some(system.available_memory());
        metrics.memory_usage_percent = Some(usage_percent(used, total));
    }

    let swap_total = system.total_swap();
    let swap_used = system.used_swap();
    metrics.swap_total = Some(swap_total);
    metrics.swap_used = Some(swap_used);
    metrics.swap_usage_percent = Some(usage_percent(swap_used, swap_total));
}

fn collect_disks() -> Vec<DiskMetric> {
    Disks::new_with_refreshed_list()
        .iter()
        .map(|disk| {
            let total = disk.total_space();
            let available = disk.available_space();
            let used = total.saturating_sub(available);
            DiskMetric {
                mount_point: disk.mount_point().to_string_lossy().into_owned(),
                total_bytes: total,
                used_bytes: used,
                available_bytes: available,
                usage_percent: usage_percent(used, total),
            }
        })
        .collect()
}

fn collect_networks() -> Vec<NetworkMetric> {
    let networks = Networks::new_with_refreshed_list();
    let mut metrics: Vec<NetworkMetric> = networks
        .iter()
        .filter(|(name, _)| !is_loopback(name))
        .map(|(name, data)| NetworkMetric {
            interface_name: name.clone(),
            rx_bytes: data.total_received(),
            tx_bytes: data.total_transmitted(),
            rx_packets: data.total_packets_received(),
            tx_packets: data.total_packets_transmitted(),
            rx_errors: data.total_errors_on_received(),
            tx_errors: data.total_errors_on_transmitted(),
        })
        .collect();
    metrics.sort_by(|a, b| a.interface_name.cmp(&b.interface_name));
    metrics
}

/// Percentage of `used` in `total`, `0.0` when `total` is zero.
pub fn usage_percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        used as f64 / total as f64 * 100.0
    }
}

fn is_loopback(interface: &str) -> bool {
    LOOPBACK_INTERFACES.contains(&interface)
}

/// First non-loopback IPv4 address.
fn main_ipv4(addrs: impl IntoIterator<Item = IpAddr>) -> Option<IpAddr> {
    addrs
        .into_iter()
        .find(|ip| matches!(ip, IpAddr::V4(v4) if !v4.is_loopback() && !v4.is_unspecified()))
}
