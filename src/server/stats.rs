//! Command execution stats and the bounded slowlog ring.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub struct SlowEntry {
    pub command: String,
    pub duration: Duration,
    pub timestamp_ms: i64,
}

pub struct Stats {
    pub commands_processed: AtomicU64,
    pub connections_received: AtomicU64,
    slowlog: Mutex<VecDeque<SlowEntry>>,
    slowlog_capacity: usize,
    slowlog_threshold: Duration,
}

impl Stats {
    pub fn new(slowlog_capacity: usize, slowlog_threshold_us: u64) -> Self {
        Self {
            commands_processed: AtomicU64::new(0),
            connections_received: AtomicU64::new(0),
            slowlog: Mutex::new(VecDeque::with_capacity(slowlog_capacity)),
            slowlog_capacity,
            slowlog_threshold: Duration::from_micros(slowlog_threshold_us),
        }
    }

    pub fn record_command(&self, command: &str, duration: Duration) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
        if duration >= self.slowlog_threshold {
            let mut log = self.slowlog.lock();
            if log.len() >= self.slowlog_capacity {
                log.pop_front();
            }
            log.push_back(SlowEntry {
                command: command.to_string(),
                duration,
                timestamp_ms: crate::keyspace::now_ms(),
            });
        }
    }

    pub fn record_connection(&self) {
        self.connections_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn recent_slow(&self) -> Vec<String> {
        self.slowlog
            .lock()
            .iter()
            .map(|e| format!("{} {}us @ {}", e.command, e.duration.as_micros(), e.timestamp_ms))
            .collect()
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new(128, 10_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slowlog_captures_over_threshold() {
        let stats = Stats::new(2, 1000);
        stats.record_command("GET", Duration::from_micros(500));
        stats.record_command("SLOWCMD", Duration::from_micros(5000));
        let log = stats.recent_slow();
        assert_eq!(log.len(), 1);
        assert!(log[0].contains("SLOWCMD"));
    }

    #[test]
    fn slowlog_bounded() {
        let stats = Stats::new(2, 0);
        for i in 0..5 {
            stats.record_command(&format!("CMD{i}"), Duration::from_micros(100));
        }
        assert_eq!(stats.recent_slow().len(), 2);
    }

    #[test]
    fn commands_processed_counter() {
        let stats = Stats::default();
        stats.record_command("GET", Duration::from_micros(1));
        stats.record_command("SET", Duration::from_micros(1));
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 2);
    }
}
