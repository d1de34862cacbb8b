//! Sliding-window intrusion detection and quarantine (spec §4.1, §7).
//!
//! Tracks security-relevant events (permission denials, scan
//! failures, timeouts) per plugin in a fixed time window. Crossing the
//! configured threshold flips the plugin into quarantine, which the
//! Manager enforces by refusing further `execute` calls until an
//! operator explicitly clears it.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use runtime_core::types::PluginId;

pub struct IntrusionTracker {
    window: Duration,
    max_events: u32,
    events: HashMap<PluginId, VecDeque<Instant>>,
    quarantined: HashMap<PluginId, String>,
}

impl IntrusionTracker {
    pub fn new(window_ms: u64, max_events: u32) -> Self {
        IntrusionTracker {
            window: Duration::from_millis(window_ms),
            max_events,
            events: HashMap::new(),
            quarantined: HashMap::new(),
        }
    }

    /// Record a security-relevant event for `plugin_id` at `now`.
    /// Returns `Some(event_count)` if this event pushed the plugin
    /// over the threshold and it was just quarantined (so the caller
    /// can emit exactly one audit entry / broadcast event per
    /// transition, not one per subsequent denied call).
    pub fn record(&mut self, plugin_id: &str, now: Instant, reason: &str) -> Option<u32> {
        let deque = self.events.entry(plugin_id.to_string()).or_default();
        deque.push_back(now);
        while let Some(&front) = deque.front() {
            if now.duration_since(front) > self.window {
                deque.pop_front();
            } else {
                break;
            }
        }

        let count = deque.len() as u32;
        if count >= self.max_events && !self.quarantined.contains_key(plugin_id) {
            self.quarantined.insert(plugin_id.to_string(), reason.to_string());
            return Some(count);
        }
        None
    }

    pub fn is_quarantined(&self, plugin_id: &str) -> bool {
        self.quarantined.contains_key(plugin_id)
    }

    pub fn quarantine_reason(&self, plugin_id: &str) -> Option<&str> {
        self.quarantined.get(plugin_id).map(|s| s.as_str())
    }

    /// Explicit operator action (spec §9 open question): quarantine
    /// and event counters are not cleared automatically on unload, so
    /// a reloaded plugin inherits its prior standing. Only this method
    /// resets state, mirroring the manual unlock a human reviewer
    /// performs after investigating the flagged plugin.
    pub fn clear(&mut self, plugin_id: &str) {
        self.events.remove(plugin_id);
        self.quarantined.remove(plugin_id);
    }

    pub fn event_count(&self, plugin_id: &str) -> u32 {
        self.events.get(plugin_id).map(|d| d.len() as u32).unwrap_or(0)
    }
}
