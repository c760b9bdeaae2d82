//! ==============================================================================
//! node.rs - the sampling/decision/dissemination loop
//! ==============================================================================
//!
//! one cycle, strictly in order, never overlapping the next:
//!
//!     (a) yield      - let the websocket server accept/close listeners
//!     (b) link       - ConnectivitySupervisor::ensure_link (may wait its bound)
//!     (c) sample     - soil burst, light, climate -> Reading
//!     (d) classify   - Reading -> MoodState
//!     (e) display    - oled redraw on its own throttle
//!     (f) scheduler  - broadcast every cycle, log on the long interval
//!     (g) sleep      - fixed inter-cycle delay (in run())
//!
//! the runtime is current-thread, so "concurrency" is only the server task
//! getting a turn at await points. SchedulerState has one owner: this loop.
//!
//! relationships:
//!     - used by: main.rs
//!     - uses: every other module
//!
//! ==============================================================================

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::clock::NodeClock;
use crate::conditioner;
use crate::config::NodeConfig;
use crate::display::Display;
use crate::domain::Reading;
use crate::hal::HardwareProvider;
use crate::link::{ConnectivitySupervisor, Link, LinkStatus};
use crate::mood::{classify, MoodState};
use crate::presentation::{present, Presentation};
use crate::scheduler::{
    DisseminationScheduler, LogOutcome, SchedulerCounters, SchedulerState, TickOutcome,
};
use crate::transport::{Broadcaster, LogSink};

// ==============================================================================
// shared status
// ==============================================================================
// written by the loop once per cycle, read by GET /api/status.

#[derive(Clone, Debug, Serialize)]
pub struct NodeStatus {
    pub reading: Option<Reading>,
    pub mood: Option<MoodState>,
    pub presentation: Option<Presentation>,
    pub link: LinkStatus,
    pub timers: Option<SchedulerState>,
    pub counters: SchedulerCounters,
    pub display_available: bool,
    pub clock_synced: bool,
    /// node clock (epoch ms once synced) of the last completed cycle
    pub last_update: i64,
}

impl Default for NodeStatus {
    fn default() -> Self {
        Self {
            reading: None,
            mood: None,
            presentation: None,
            link: LinkStatus::Reconnecting,
            timers: None,
            counters: SchedulerCounters::default(),
            display_available: false,
            clock_synced: false,
            last_update: 0,
        }
    }
}

pub type SharedStatus = Arc<RwLock<NodeStatus>>;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CycleReport {
    pub reading: Reading,
    pub mood: MoodState,
    pub link: LinkStatus,
    pub tick: TickOutcome,
    pub display_drawn: bool,
}

pub struct Node<H: HardwareProvider, L: Link, B: Broadcaster, S: LogSink> {
    cfg: NodeConfig,
    hal: H,
    clock: NodeClock,
    supervisor: ConnectivitySupervisor<L>,
    scheduler: DisseminationScheduler,
    display: Display,
    broadcaster: B,
    sink: S,
    status: SharedStatus,
}

impl<H: HardwareProvider, L: Link, B: Broadcaster, S: LogSink> Node<H, L, B, S> {
    pub fn new(
        cfg: NodeConfig,
        hal: H,
        link: L,
        broadcaster: B,
        sink: S,
        status: SharedStatus,
    ) -> Self {
        let clock = NodeClock::new();
        let start = clock.uptime_ms();
        let display =
            Display::probe(&hal, cfg.display.enabled, cfg.display.refresh_interval_ms, start);
        let supervisor = ConnectivitySupervisor::new(link, &cfg.link);
        let scheduler = DisseminationScheduler::new(&cfg.dissemination, start);
        Self { cfg, hal, clock, supervisor, scheduler, display, broadcaster, sink, status }
    }

    /// Run cycles until the process ends.
    pub async fn run(&mut self) {
        tracing::info!("starting sensor loop ({}ms cycle)", self.cfg.sampling.cycle_delay_ms);
        loop {
            self.run_cycle().await;
            tokio::time::sleep(self.cfg.cycle_delay()).await;
        }
    }

    /// One cycle, steps (a) through (f). `None` when sampling failed and
    /// the rest of the cycle was skipped.
    pub async fn run_cycle(&mut self) -> Option<CycleReport> {
        // (a)
        tokio::task::yield_now().await;

        // (b)
        let link = self.supervisor.ensure_link(&mut self.clock).await;

        // (c)
        let reading = match conditioner::read_sensors(
            &self.hal,
            &self.cfg.sensors,
            self.cfg.sampling.soil_samples,
            self.cfg.sample_delay(),
            self.clock.epoch_ms(),
        )
        .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("skipping cycle: {}", e);
                return None;
            }
        };
        if !reading.has_valid_climate() {
            tracing::warn!("DHT11 read failed, climate fields carry sentinels");
        }

        // (d)
        let mood = classify(
            reading.soil_raw,
            reading.light_raw,
            reading.temperature_c,
            &self.cfg.thresholds,
        );

        if self.cfg.logging.show_sensor_data {
            tracing::info!(
                "Soil={} Light={} Temp={:.1}C Hum={:.0}% Mood={}",
                reading.soil_raw,
                reading.light_raw,
                reading.temperature_c,
                reading.humidity_pct,
                mood
            );
        }

        let now = self.clock.uptime_ms();

        // (e)
        let display_drawn = self.display.update(&self.hal, now, &reading, mood);

        // (f)
        let tick =
            self.scheduler.tick(now, reading, mood, link, &self.broadcaster, &self.sink).await;
        if let LogOutcome::Failed(code) = tick.log {
            if code <= 0 {
                self.supervisor.report_transport_failure();
            }
        }

        self.publish_status(reading, mood).await;

        Some(CycleReport { reading, mood, link, tick, display_drawn })
    }

    async fn publish_status(&self, reading: Reading, mood: MoodState) {
        let mut s = self.status.write().await;
        s.reading = Some(reading);
        s.mood = Some(mood);
        s.presentation = Some(present(mood));
        s.link = self.supervisor.status();
        s.timers = Some(self.scheduler.state());
        s.counters = self.scheduler.counters();
        s.display_available = self.display.is_available();
        s.clock_synced = self.clock.is_synced();
        s.last_update = self.clock.epoch_ms();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::tests::{RecordingBroadcaster, ScriptedSink};
    use crate::transport::TRANSPORT_FAILURE;
    use std::cell::Cell;
    use std::sync::atomic::{AtomicU16, Ordering};
    use std::time::Duration;

    struct BenchHal {
        soil: AtomicU16,
        light: AtomicU16,
    }

    impl BenchHal {
        fn new(soil: u16, light: u16) -> Self {
            Self { soil: AtomicU16::new(soil), light: AtomicU16::new(light) }
        }
    }

    impl HardwareProvider for BenchHal {
        fn read_adc(&self, channel: u8) -> anyhow::Result<u16> {
            Ok(match channel {
                0 => self.soil.load(Ordering::Relaxed),
                _ => self.light.load(Ordering::Relaxed),
            })
        }
        fn read_dht(&self, _pin: u8) -> anyhow::Result<(f32, f32)> {
            Ok((22.0, 45.0))
        }
        fn init_display(&self) -> anyhow::Result<()> {
            anyhow::bail!("no oled on the bench")
        }
        fn draw_display(&self, _lines: &[String]) -> anyhow::Result<()> {
            Ok(())
        }
    }

    impl<H: HardwareProvider, L: Link, B: Broadcaster, S: LogSink> Node<H, L, B, S> {
        fn hal(&self) -> &H {
            &self.hal
        }
        fn supervisor(&self) -> &ConnectivitySupervisor<L> {
            &self.supervisor
        }
        fn scheduler(&self) -> &DisseminationScheduler {
            &self.scheduler
        }
        fn clock(&self) -> &NodeClock {
            &self.clock
        }
    }

    /// `network` is the world; `connected` is what the node believes
    struct BenchLink {
        network: Cell<bool>,
        connected: bool,
    }

    impl Link for BenchLink {
        fn is_connected(&self) -> bool {
            self.connected && self.network.get()
        }
        async fn try_connect(&mut self) -> bool {
            self.connected = self.network.get();
            self.connected
        }
        async fn fetch_epoch_ms(&mut self) -> anyhow::Result<i64> {
            Ok(1_730_000_000_000)
        }
        fn mark_down(&mut self) {
            self.connected = false;
        }
    }

    fn bench_link(up: bool) -> BenchLink {
        BenchLink { network: Cell::new(up), connected: false }
    }

    fn status() -> SharedStatus {
        Arc::new(RwLock::new(NodeStatus::default()))
    }

    const FIFTEEN_MIN: Duration = Duration::from_secs(15 * 60);

    #[tokio::test(start_paused = true)]
    async fn thirsty_plant_then_link_outage_then_no_catch_up() {
        let (b, k) = (RecordingBroadcaster::default(), ScriptedSink::default());
        let shared = status();
        let hal = BenchHal::new(1200, 100);
        let mut node =
            Node::new(NodeConfig::default(), hal, bench_link(true), &b, &k, shared.clone());

        let first = node.run_cycle().await.unwrap();
        assert_eq!(first.reading.soil_raw, 1200);
        assert_eq!(first.mood, MoodState::Thirsty);
        assert_eq!(first.link, LinkStatus::Connected);
        assert!(first.tick.broadcast);
        assert_eq!(first.tick.log, LogOutcome::NotDue);
        assert!(node.clock().is_synced());

        // 15 minutes later the network is gone
        tokio::time::sleep(FIFTEEN_MIN).await;
        node.supervisor().link().network.set(false);
        let outage = node.run_cycle().await.unwrap();
        assert_eq!(outage.link, LinkStatus::Failed);
        assert_eq!(outage.tick.log, LogOutcome::SkippedLinkDown);
        assert!(outage.tick.broadcast);
        assert!(k.posted.borrow().is_empty());
        let reset_at = node.scheduler().state().last_log_ms;

        // network back: no immediate catch-up post
        node.supervisor().link().network.set(true);
        tokio::time::sleep(Duration::from_secs(1)).await;
        let restored = node.run_cycle().await.unwrap();
        assert_eq!(restored.link, LinkStatus::Connected);
        assert_eq!(restored.tick.log, LogOutcome::NotDue);

        // only once the full interval since the reset has passed
        let waited = node.clock().uptime_ms() - reset_at;
        tokio::time::sleep(FIFTEEN_MIN - Duration::from_millis(waited)).await;
        let due = node.run_cycle().await.unwrap();
        assert_eq!(due.tick.log, LogOutcome::Posted(200));
        assert_eq!(k.posted.borrow().len(), 1);
        assert_eq!(k.posted.borrow()[0].mood, MoodState::Thirsty);

        // every cycle broadcast, including the outage
        assert_eq!(b.events.borrow().len(), 4);

        let s = shared.read().await;
        assert_eq!(s.mood, Some(MoodState::Thirsty));
        assert_eq!(s.counters.logs_posted, 1);
        assert_eq!(s.counters.logs_skipped, 1);
        assert!(!s.display_available);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_marks_link_down() {
        let b = RecordingBroadcaster::default();
        let k = ScriptedSink::with_codes(&[TRANSPORT_FAILURE]);
        let mut cfg = NodeConfig::default();
        cfg.dissemination.log_interval_ms = 1_000;
        let mut node = Node::new(cfg, BenchHal::new(2200, 100), bench_link(true), &b, &k, status());

        node.run_cycle().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        let failed = node.run_cycle().await.unwrap();
        assert_eq!(failed.tick.log, LogOutcome::Failed(TRANSPORT_FAILURE));
        assert!(!node.supervisor().link().is_connected());

        // next cycle reconnects before doing anything else
        tokio::time::sleep(Duration::from_secs(2)).await;
        let next = node.run_cycle().await.unwrap();
        assert_eq!(next.link, LinkStatus::Connected);
        assert_eq!(next.tick.log, LogOutcome::Posted(200));
    }

    #[tokio::test(start_paused = true)]
    async fn each_cycle_classifies_its_own_reading() {
        let (b, k) = (RecordingBroadcaster::default(), ScriptedSink::default());
        let hal = BenchHal::new(2200, 100);
        let mut node = Node::new(NodeConfig::default(), hal, bench_link(true), &b, &k, status());

        assert_eq!(node.run_cycle().await.unwrap().mood, MoodState::Happy);
        node.hal().light.store(3000, Ordering::Relaxed);
        assert_eq!(node.run_cycle().await.unwrap().mood, MoodState::Hot);
        node.hal().soil.store(3900, Ordering::Relaxed);
        assert_eq!(node.run_cycle().await.unwrap().mood, MoodState::Drowning);

        let moods: Vec<_> = b.events.borrow().iter().map(|e| e.mood).collect();
        assert_eq!(moods, vec![MoodState::Happy, MoodState::Hot, MoodState::Drowning]);
    }
}
