use tokio::time::Instant;

/// Node time source.
///
/// `uptime_ms()` is monotonic (tokio's clock, so paused-time tests can
/// drive it) and drives every timer. `epoch_ms()` is what
/// goes into log records: wall-clock once a time sync has landed, plain
/// uptime before that. Timestamps under 10^10 in the log history are those
/// pre-sync uptime values.
#[derive(Debug, Clone)]
pub struct NodeClock {
    start: Instant,
    /// epoch ms at `start`, learned from the last successful sync
    epoch_at_start: Option<i64>,
}

impl NodeClock {
    pub fn new() -> Self {
        Self { start: Instant::now(), epoch_at_start: None }
    }

    pub fn uptime_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn epoch_ms(&self) -> i64 {
        let up = self.uptime_ms() as i64;
        match self.epoch_at_start {
            Some(base) => base + up,
            None => up,
        }
    }

    pub fn is_synced(&self) -> bool {
        self.epoch_at_start.is_some()
    }

    /// Anchor the wall clock: `remote_epoch_ms` was true at the current uptime.
    pub fn sync(&mut self, remote_epoch_ms: i64) {
        let base = remote_epoch_ms - self.uptime_ms() as i64;
        if let Some(prev) = self.epoch_at_start {
            tracing::debug!("clock re-synced, drift {}ms", base - prev);
        }
        self.epoch_at_start = Some(base);
    }
}

impl Default for NodeClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsynced_epoch_is_uptime() {
        let clock = NodeClock::new();
        assert!(!clock.is_synced());
        assert!(clock.epoch_ms() < 10_000_000_000);
    }

    #[test]
    fn sync_anchors_wall_clock() {
        let mut clock = NodeClock::new();
        clock.sync(1_730_000_000_000);
        assert!(clock.is_synced());
        let now = clock.epoch_ms();
        assert!(now >= 1_730_000_000_000 && now < 1_730_000_000_000 + 1_000);
    }
}
