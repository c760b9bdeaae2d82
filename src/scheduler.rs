//! ==============================================================================
//! scheduler.rs - dissemination scheduler
//! ==============================================================================
//!
//! purpose:
//!     decides, once per cycle, whether this cycle's reading goes out on
//!     each channel. two independent timers over SchedulerState:
//!
//!       broadcast: now - last_broadcast >= broadcast_interval
//!                  -> push a frame, last_broadcast = now
//!       log:       now - last_log >= log_interval
//!                  -> link Connected? POST : skip
//!                  -> last_log = now (policy Advance, the default)
//!                     or only on success (policy RetryNextCycle)
//!
//!     timers only fire on a threshold crossing, and a log attempt that left
//!     the timer in place is not repeated at the same timestamp, so a repeated
//!     tick never logs twice.
//!
//! relationships:
//!     - used by: node.rs
//!     - uses: transport.rs (Broadcaster, LogSink), link.rs (LinkStatus)
//!
//! ==============================================================================

use serde::Serialize;

use crate::config::{DisseminationConfig, LogFailurePolicy};
use crate::domain::{Channel, DistributionEvent, Reading};
use crate::link::LinkStatus;
use crate::mood::MoodState;
use crate::transport::{is_success, Broadcaster, LogSink};

/// timer reference points, node uptime ms
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SchedulerState {
    pub last_broadcast_ms: u64,
    pub last_log_ms: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogOutcome {
    NotDue,
    Posted(i32),
    Failed(i32),
    SkippedLinkDown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickOutcome {
    pub broadcast: bool,
    pub log: LogOutcome,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerCounters {
    pub broadcasts: u64,
    pub logs_posted: u64,
    pub logs_failed: u64,
    pub logs_skipped: u64,
}

pub struct DisseminationScheduler {
    state: SchedulerState,
    broadcast_interval_ms: u64,
    log_interval_ms: u64,
    policy: LogFailurePolicy,
    last_log_attempt_ms: Option<u64>,
    counters: SchedulerCounters,
}

impl DisseminationScheduler {
    pub fn new(cfg: &DisseminationConfig, start_ms: u64) -> Self {
        Self {
            state: SchedulerState { last_broadcast_ms: start_ms, last_log_ms: start_ms },
            broadcast_interval_ms: cfg.broadcast_interval_ms,
            log_interval_ms: cfg.log_interval_ms,
            policy: cfg.log_failure_policy,
            last_log_attempt_ms: None,
            counters: SchedulerCounters::default(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn counters(&self) -> SchedulerCounters {
        self.counters
    }

    pub async fn tick<B: Broadcaster, S: LogSink>(
        &mut self,
        now_ms: u64,
        reading: Reading,
        mood: MoodState,
        link: LinkStatus,
        broadcaster: &B,
        sink: &S,
    ) -> TickOutcome {
        let broadcast = self.tick_broadcast(now_ms, reading, mood, broadcaster);
        let log = self.tick_log(now_ms, reading, mood, link, sink).await;
        TickOutcome { broadcast, log }
    }

    fn tick_broadcast<B: Broadcaster>(
        &mut self,
        now_ms: u64,
        reading: Reading,
        mood: MoodState,
        broadcaster: &B,
    ) -> bool {
        if now_ms.saturating_sub(self.state.last_broadcast_ms) < self.broadcast_interval_ms {
            return false;
        }
        let event = DistributionEvent::new(Channel::Broadcast, reading, mood);
        let listeners = broadcaster.broadcast(&event);
        tracing::trace!("broadcast to {} listeners", listeners);
        self.state.last_broadcast_ms = now_ms;
        self.counters.broadcasts += 1;
        true
    }

    async fn tick_log<S: LogSink>(
        &mut self,
        now_ms: u64,
        reading: Reading,
        mood: MoodState,
        link: LinkStatus,
        sink: &S,
    ) -> LogOutcome {
        if now_ms.saturating_sub(self.state.last_log_ms) < self.log_interval_ms
            || self.last_log_attempt_ms == Some(now_ms)
        {
            return LogOutcome::NotDue;
        }
        self.last_log_attempt_ms = Some(now_ms);

        let outcome = if link != LinkStatus::Connected {
            tracing::warn!("log due but link is {:?}, skipping this interval", link);
            self.counters.logs_skipped += 1;
            LogOutcome::SkippedLinkDown
        } else {
            let code = sink.post(&DistributionEvent::new(Channel::Log, reading, mood)).await;
            if is_success(code) {
                tracing::info!("✓ posted log record ({})", code);
                self.counters.logs_posted += 1;
                LogOutcome::Posted(code)
            } else {
                tracing::warn!("✗ log post failed ({})", code);
                self.counters.logs_failed += 1;
                LogOutcome::Failed(code)
            }
        };

        let advance =
            matches!(outcome, LogOutcome::Posted(_)) || self.policy == LogFailurePolicy::Advance;
        if advance {
            self.state.last_log_ms = now_ms;
        }
        outcome
    }
}
