//! ==============================================================================
//! link.rs - connectivity supervisor
//! ==============================================================================
//!
//! purpose:
//!     keeps the uplink usable for the remote log. called once per cycle
//!     before the scheduler tick:
//!
//!       link up       -> Connected, no work
//!       link down     -> Reconnecting; retry until up or the bound expires
//!         up in time  -> re-sync the clock (own bound), Connected
//!         bound hit   -> Failed; the cycle skips remote logging only
//!
//!     nothing is escalated. the next cycle simply tries again.
//!
//! relationships:
//!     - used by: node.rs
//!     - uses: reqwest (HttpLink probe, link watch, Date header), chrono (header parse)
//!
//! ==============================================================================

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::NodeClock;
use crate::config::LinkConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Connected,
    Reconnecting,
    Failed,
}

/// The uplink as the supervisor sees it. Radio/socket internals stay behind this.
#[allow(async_fn_in_trait)]
pub trait Link {
    /// cached state; must be cheap
    fn is_connected(&self) -> bool;
    /// one connection attempt; true when the link is usable afterwards
    async fn try_connect(&mut self) -> bool;
    /// current wall-clock time from a remote authority, epoch ms
    async fn fetch_epoch_ms(&mut self) -> anyhow::Result<i64>;
    /// forget the link is up (a request failed at transport level)
    fn mark_down(&mut self);
}

pub struct ConnectivitySupervisor<L: Link> {
    link: L,
    reconnect_timeout: Duration,
    poll_interval: Duration,
    time_sync_timeout: Duration,
    status: LinkStatus,
    consecutive_failures: u32,
}

impl<L: Link> ConnectivitySupervisor<L> {
    pub fn new(link: L, cfg: &LinkConfig) -> Self {
        Self {
            link,
            reconnect_timeout: Duration::from_secs(cfg.reconnect_timeout_secs),
            poll_interval: Duration::from_millis(cfg.poll_interval_ms),
            time_sync_timeout: Duration::from_secs(cfg.time_sync_timeout_secs),
            // nothing attempted yet; the first cycle settles it
            status: LinkStatus::Reconnecting,
            consecutive_failures: 0,
        }
    }

    pub fn status(&self) -> LinkStatus {
        self.status
    }

    pub async fn ensure_link(&mut self, clock: &mut NodeClock) -> LinkStatus {
        if self.link.is_connected() {
            self.status = LinkStatus::Connected;
            return self.status;
        }

        self.status = LinkStatus::Reconnecting;
        tracing::info!("link down, reconnecting (bound {:?})", self.reconnect_timeout);

        if !self.connect_within().await {
            self.consecutive_failures += 1;
            self.status = LinkStatus::Failed;
            tracing::warn!(
                "reconnect did not complete within {:?} ({} consecutive)",
                self.reconnect_timeout,
                self.consecutive_failures
            );
            return self.status;
        }

        if self.consecutive_failures > 0 {
            tracing::info!("link restored after {} failed attempts", self.consecutive_failures);
        } else {
            tracing::info!("link connected");
        }
        self.consecutive_failures = 0;

        match self.sync_time_within().await {
            Some(epoch_ms) => {
                clock.sync(epoch_ms);
                tracing::info!("time synced");
            }
            None => tracing::warn!(
                "time sync did not complete within {:?}, keeping previous time source",
                self.time_sync_timeout
            ),
        }

        self.status = LinkStatus::Connected;
        self.status
    }

    /// A request over the link failed below http; reconnect next cycle.
    pub fn report_transport_failure(&mut self) {
        self.link.mark_down();
    }

    async fn connect_within(&mut self) -> bool {
        let link = &mut self.link;
        let poll = self.poll_interval;
        tokio::time::timeout(self.reconnect_timeout, async move {
            loop {
                if link.try_connect().await {
                    return;
                }
                tokio::time::sleep(poll).await;
            }
        })
        .await
        .is_ok()
    }

    async fn sync_time_within(&mut self) -> Option<i64> {
        let link = &mut self.link;
        let poll = self.poll_interval;
        tokio::time::timeout(self.time_sync_timeout, async move {
            loop {
                match link.fetch_epoch_ms().await {
                    Ok(ms) => return ms,
                    Err(e) => tracing::debug!("time sync attempt failed: {}", e),
                }
                tokio::time::sleep(poll).await;
            }
        })
        .await
        .ok()
    }
}

// ==============================================================================
// http link
// ==============================================================================
// on a linux host the radio is managed by the os; "connected" means the
// probe url answered. the probe's Date header doubles as the time authority.
//
// is_connected() only reads a flag. spawn_watch() keeps that flag honest
// between log posts: a background task re-probes on its own cadence and
// clears the flag when the probe stops answering. it never sets the flag,
// so coming back up always goes through try_connect and a time resync.

pub struct HttpLink {
    client: reqwest::Client,
    probe_url: String,
    connected: Arc<AtomicBool>,
}

impl HttpLink {
    pub fn new(cfg: &LinkConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.poll_interval_ms.max(1000)))
            // every probe opens its own connection; a pooled socket proves nothing
            .pool_max_idle_per_host(0)
            .build()?;
        Ok(Self {
            client,
            probe_url: cfg.probe_url.clone(),
            connected: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Re-probe every `interval` until the returned task is aborted.
    pub fn spawn_watch(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let client = self.client.clone();
        let url = self.probe_url.clone();
        let connected = self.connected.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !connected.load(Ordering::Relaxed) {
                    continue;
                }
                if !probe(&client, &url).await {
                    connected.store(false, Ordering::Relaxed);
                    tracing::warn!("link watch: {} stopped answering", url);
                }
            }
        })
    }
}

async fn probe(client: &reqwest::Client, url: &str) -> bool {
    match client.head(url).send().await {
        Ok(_) => true,
        Err(e) => {
            tracing::debug!("probe {} failed: {}", url, e);
            false
        }
    }
}

impl Link for HttpLink {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn try_connect(&mut self) -> bool {
        let up = probe(&self.client, &self.probe_url).await;
        self.connected.store(up, Ordering::Relaxed);
        up
    }

    async fn fetch_epoch_ms(&mut self) -> anyhow::Result<i64> {
        let resp = self.client.head(&self.probe_url).send().await?;
        let date = resp
            .headers()
            .get(reqwest::header::DATE)
            .ok_or_else(|| anyhow::anyhow!("no Date header from {}", self.probe_url))?
            .to_str()?;
        parse_http_date(date)
    }

    fn mark_down(&mut self) {
        self.connected.store(false, Ordering::Relaxed);
    }
}

fn parse_http_date(value: &str) -> anyhow::Result<i64> {
    let parsed = chrono::DateTime::parse_from_rfc2822(value)
        .map_err(|e| anyhow::anyhow!("bad Date header {:?}: {}", value, e))?;
    Ok(parsed.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeLink {
        connected: bool,
        /// attempts that fail before one succeeds; None = never succeeds
        fail_attempts: Option<u32>,
        attempts: u32,
        time: Option<i64>,
    }

    impl Link for FakeLink {
        fn is_connected(&self) -> bool {
            self.connected
        }
        async fn try_connect(&mut self) -> bool {
            self.attempts += 1;
            self.connected = matches!(self.fail_attempts, Some(n) if self.attempts > n);
            self.connected
        }
        async fn fetch_epoch_ms(&mut self) -> anyhow::Result<i64> {
            self.time.ok_or_else(|| anyhow::anyhow!("no ntp"))
        }
        fn mark_down(&mut self) {
            self.connected = false;
        }
    }

    impl<L: Link> ConnectivitySupervisor<L> {
        pub(crate) fn link(&self) -> &L {
            &self.link
        }
    }

    fn supervisor(link: FakeLink) -> ConnectivitySupervisor<FakeLink> {
        ConnectivitySupervisor::new(link, &LinkConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn connected_link_is_a_no_op() {
        let mut sup = supervisor(FakeLink { connected: true, ..Default::default() });
        let mut clock = NodeClock::new();
        let started = tokio::time::Instant::now();
        assert_eq!(sup.ensure_link(&mut clock).await, LinkStatus::Connected);
        assert_eq!(sup.link().attempts, 0);
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert!(!clock.is_synced());
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_then_resync() {
        let mut sup = supervisor(FakeLink {
            fail_attempts: Some(3),
            time: Some(1_730_000_000_000),
            ..Default::default()
        });
        let mut clock = NodeClock::new();
        assert_eq!(sup.ensure_link(&mut clock).await, LinkStatus::Connected);
        assert_eq!(sup.link().attempts, 4);
        assert!(clock.is_synced());
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_at_the_bound() {
        let mut sup = supervisor(FakeLink { fail_attempts: None, ..Default::default() });
        let mut clock = NodeClock::new();
        let started = tokio::time::Instant::now();
        assert_eq!(sup.ensure_link(&mut clock).await, LinkStatus::Failed);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(15) && waited < Duration::from_secs(16));
        assert_eq!(sup.status(), LinkStatus::Failed);

        // next cycle tries again rather than remembering the failure
        sup.link.fail_attempts = Some(0);
        sup.link.attempts = 0;
        assert_eq!(sup.ensure_link(&mut clock).await, LinkStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_time_sync_still_connects() {
        let mut sup =
            supervisor(FakeLink { fail_attempts: Some(0), time: None, ..Default::default() });
        let mut clock = NodeClock::new();
        assert_eq!(sup.ensure_link(&mut clock).await, LinkStatus::Connected);
        assert!(!clock.is_synced());
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_forces_reconnect() {
        let mut sup = supervisor(FakeLink {
            connected: true,
            fail_attempts: Some(0),
            ..Default::default()
        });
        let mut clock = NodeClock::new();
        sup.report_transport_failure();
        assert_eq!(sup.ensure_link(&mut clock).await, LinkStatus::Connected);
        assert_eq!(sup.link().attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn link_lost_while_cached_up_is_reconnected_and_resynced() {
        let mut sup = supervisor(FakeLink {
            fail_attempts: Some(0),
            time: Some(1_000),
            ..Default::default()
        });
        let mut clock = NodeClock::new();
        assert_eq!(sup.ensure_link(&mut clock).await, LinkStatus::Connected);

        // something outside the cycle noticed the uplink is gone
        sup.link.connected = false;
        sup.link.time = Some(1_730_000_000_000);
        assert_eq!(sup.ensure_link(&mut clock).await, LinkStatus::Connected);
        assert_eq!(sup.link().attempts, 2);
        assert!(clock.epoch_ms() >= 1_730_000_000_000);
    }

    #[tokio::test]
    async fn watch_clears_a_cached_link_when_the_uplink_goes_away() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let app = axum::Router::new().route("/", axum::routing::get(|| async { "up" }));
            axum::serve(listener, app).await
        });

        let cfg = LinkConfig {
            probe_url: format!("http://{}/", addr),
            reconnect_timeout_secs: 1,
            ..Default::default()
        };
        let mut link = HttpLink::new(&cfg).unwrap();
        assert!(link.try_connect().await);
        let watch = link.spawn_watch(Duration::from_millis(20));

        server.abort();
        let _ = server.await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while link.is_connected() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("watch never cleared the link");
        watch.abort();

        let mut sup = ConnectivitySupervisor::new(link, &cfg);
        let mut clock = NodeClock::new();
        assert_eq!(sup.ensure_link(&mut clock).await, LinkStatus::Failed);
    }

    #[test]
    fn parses_http_dates() {
        assert_eq!(parse_http_date("Thu, 01 Jan 1970 00:00:01 GMT").unwrap(), 1000);
        assert!(parse_http_date("yesterday").is_err());
    }
}
