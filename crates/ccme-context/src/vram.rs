//! VRAM Monitor: samples total/used/available GPU memory.
//!
//! Probing follows the same device-node-then-CLI-fallback approach as a
//! hardware-detection pass: check for a vendor's device node before paying
//! for a subprocess spawn, and fall back to a degenerate "memory abundant"
//! reading on platforms without a queryable GPU.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sysinfo::System;

/// A value-typed snapshot of VRAM telemetry.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VramInfo {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
    pub model_loaded_bytes: u64,
}

impl VramInfo {
    /// The degenerate reading returned on platforms without a GPU query:
    /// total = used = 0 and available = sentinel maximum, so the engine
    /// treats the system as memory-abundant rather than starved.
    #[must_use]
    pub fn abundant() -> Self {
        Self {
            total_bytes: 0,
            used_bytes: 0,
            available_bytes: u64::MAX,
            model_loaded_bytes: 0,
        }
    }

    /// `available_bytes / total_bytes`, or `1.0` for the abundant sentinel
    /// (a zero-total reading is never treated as zero availability).
    #[must_use]
    pub fn available_fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            1.0
        } else {
            self.available_bytes as f64 / self.total_bytes as f64
        }
    }
}

/// Background sampler contract for VRAM telemetry.
///
/// `get_info` must be cheap enough to call from a poll loop; implementations
/// that shell out should cache between calls no more often than
/// `poll_interval_ms`.
pub trait VramMonitor: Send + Sync {
    /// Current VRAM telemetry.
    fn get_info(&self) -> VramInfo;

    /// Suggested interval between samples, in milliseconds.
    fn poll_interval_ms(&self) -> u64 {
        1_000
    }
}

/// Probes real hardware via device nodes and vendor CLIs, falling back to
/// [`VramInfo::abundant`] when no GPU is discoverable.
pub struct HardwareVramMonitor {
    poll_interval_ms: u64,
}

impl HardwareVramMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            poll_interval_ms: 1_000,
        }
    }

    #[must_use]
    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }
}

impl Default for HardwareVramMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl VramMonitor for HardwareVramMonitor {
    fn get_info(&self) -> VramInfo {
        detect_nvidia()
            .or_else(detect_rocm)
            .unwrap_or_else(VramInfo::abundant)
    }

    fn poll_interval_ms(&self) -> u64 {
        self.poll_interval_ms
    }
}

fn run_csv_query(cmd: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(cmd).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout).ok()
}

fn parse_first_csv_line_mib(stdout: &str) -> Option<u64> {
    stdout
        .lines()
        .next()?
        .split(',')
        .next()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|mib| mib * 1024 * 1024)
}

fn detect_nvidia() -> Option<VramInfo> {
    if !Path::new("/dev/nvidia0").exists() {
        return None;
    }
    let total_out = run_csv_query(
        "nvidia-smi",
        &["--query-gpu=memory.total", "--format=csv,noheader,nounits"],
    )?;
    let used_out = run_csv_query(
        "nvidia-smi",
        &["--query-gpu=memory.used", "--format=csv,noheader,nounits"],
    )?;
    let total_bytes = parse_first_csv_line_mib(&total_out)?;
    let used_bytes = parse_first_csv_line_mib(&used_out).unwrap_or(0);
    Some(VramInfo {
        total_bytes,
        used_bytes,
        available_bytes: total_bytes.saturating_sub(used_bytes),
        model_loaded_bytes: used_bytes,
    })
}

fn detect_rocm() -> Option<VramInfo> {
    if !Path::new("/dev/kfd").exists() {
        return None;
    }
    let out = run_csv_query("rocm-smi", &["--showmeminfo", "vram", "--csv"])?;
    let mut total_bytes = 0u64;
    let mut used_bytes = 0u64;
    for line in out.lines().skip(1) {
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() >= 3 {
            total_bytes = fields[1].trim().parse().unwrap_or(total_bytes);
            used_bytes = fields[2].trim().parse().unwrap_or(used_bytes);
        }
    }
    if total_bytes == 0 {
        return None;
    }
    Some(VramInfo {
        total_bytes,
        used_bytes,
        available_bytes: total_bytes.saturating_sub(used_bytes),
        model_loaded_bytes: used_bytes,
    })
}

/// System-RAM-backed fallback used when neither CUDA nor ROCm tooling is
/// present but the caller still wants a non-degenerate sizing signal (e.g.
/// CPU-only inference with RAM as the real constraint).
#[must_use]
pub fn system_ram_as_vram() -> VramInfo {
    let mut sys = System::new();
    sys.refresh_memory();
    let total_bytes = sys.total_memory();
    let used_bytes = sys.used_memory();
    VramInfo {
        total_bytes,
        used_bytes,
        available_bytes: total_bytes.saturating_sub(used_bytes),
        model_loaded_bytes: 0,
    }
}

/// A fixed-reading test double, for exercising Memory Guard and Context
/// Pool logic deterministically.
pub struct FixedVramMonitor {
    info: VramInfo,
    poll_interval_ms: u64,
}

impl FixedVramMonitor {
    #[must_use]
    pub fn new(info: VramInfo) -> Self {
        Self {
            info,
            poll_interval_ms: 50,
        }
    }
}

impl VramMonitor for FixedVramMonitor {
    fn get_info(&self) -> VramInfo {
        self.info
    }

    fn poll_interval_ms(&self) -> u64 {
        self.poll_interval_ms
    }
}

/// How long to sleep between polls given the current pressure, mirroring
/// the adaptive fast/normal cadence Memory Guard uses.
#[must_use]
pub fn poll_delay(monitor: &dyn VramMonitor, fast: bool) -> Duration {
    let base = monitor.poll_interval_ms();
    Duration::from_millis(if fast { base / 4 } else { base })
}
