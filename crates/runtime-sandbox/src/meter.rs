//! Per-call metering (spec §4.2). Records wall/CPU/RSS at call start
//! and is re-checked at every facade boundary crossing, modeled on
//! `fluent-agent`'s profiling/monitoring sampling style.

use std::time::{Duration, Instant};

use nix::sys::time::TimeValLike;
use runtime_core::types::ResourceLimits;
use runtime_core::PluginError;

pub struct CallMeter {
    plugin_id: String,
    limits: ResourceLimits,
    wall_start: Instant,
    cpu_start_ms: u64,
    peak_rss_bytes: u64,
}

impl CallMeter {
    pub fn start(plugin_id: impl Into<String>, limits: ResourceLimits) -> Self {
        CallMeter {
            plugin_id: plugin_id.into(),
            limits,
            wall_start: Instant::now(),
            cpu_start_ms: current_cpu_ms(),
            peak_rss_bytes: current_rss_bytes(),
        }
    }

    pub fn elapsed_wall(&self) -> Duration {
        self.wall_start.elapsed()
    }

    /// Called at every facade boundary crossing and periodically
    /// inside a long-running call. Returns the corresponding resource
    /// error on the first ceiling crossed.
    pub fn check(&mut self) -> Result<(), PluginError> {
        let elapsed_wall_ms = self.wall_start.elapsed().as_millis() as u64;
        if elapsed_wall_ms > self.limits.wall_timeout_ms {
            return Err(PluginError::Timeout {
                plugin_id: self.plugin_id.clone(),
                limit_ms: self.limits.wall_timeout_ms,
            });
        }

        let cpu_ms = current_cpu_ms().saturating_sub(self.cpu_start_ms);
        if cpu_ms > self.limits.cpu_time_ms {
            return Err(PluginError::CpuExceeded {
                plugin_id: self.plugin_id.clone(),
                limit_ms: self.limits.cpu_time_ms,
            });
        }

        let rss = current_rss_bytes();
        self.peak_rss_bytes = self.peak_rss_bytes.max(rss);
        if self.peak_rss_bytes > self.limits.memory_bytes {
            return Err(PluginError::MemoryExceeded {
                plugin_id: self.plugin_id.clone(),
                limit_bytes: self.limits.memory_bytes,
            });
        }

        Ok(())
    }

    pub fn peak_rss_bytes(&self) -> u64 {
        self.peak_rss_bytes
    }

    pub fn cpu_ms(&self) -> u64 {
        current_cpu_ms().saturating_sub(self.cpu_start_ms)
    }
}

#[cfg(target_os = "linux")]
fn current_cpu_ms() -> u64 {
    use nix::sys::resource::{getrusage, UsageWho};
    match getrusage(UsageWho::RUSAGE_SELF) {
        Ok(usage) => {
            let user = usage.user_time();
            let sys = usage.system_time();
            (user.num_milliseconds() + sys.num_milliseconds()).max(0) as u64
        }
        Err(_) => 0,
    }
}

#[cfg(not(target_os = "linux"))]
fn current_cpu_ms() -> u64 {
    0
}

#[cfg(target_os = "linux")]
fn current_rss_bytes() -> u64 {
    use nix::sys::resource::{getrusage, UsageWho};
    match getrusage(UsageWho::RUSAGE_SELF) {
        Ok(usage) => (usage.max_rss() as u64) * 1024,
        Err(_) => 0,
    }
}

#[cfg(not(target_os = "linux"))]
fn current_rss_bytes() -> u64 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_trips_after_limit_elapses() {
        let limits = ResourceLimits {
            memory_bytes: u64::MAX,
            wall_timeout_ms: 1,
            cpu_time_ms: u64::MAX,
        };
        let mut meter = CallMeter::start("p1", limits);
        std::thread::sleep(Duration::from_millis(20));
        let err = meter.check().unwrap_err();
        assert_eq!(err.kind_tag(), "timeout");
    }

    #[test]
    fn within_limits_checks_cleanly() {
        let limits = ResourceLimits {
            memory_bytes: u64::MAX,
            wall_timeout_ms: 60_000,
            cpu_time_ms: u64::MAX,
        };
        let mut meter = CallMeter::start("p1", limits);
        assert!(meter.check().is_ok());
    }
}
