//! ==============================================================================
//! transport.rs - how distribution events leave the node
//! ==============================================================================
//!
//! two sinks, matching the two scheduler channels:
//!     - Broadcaster: live frames to websocket listeners, fire-and-forget
//!     - LogSink: one http POST per log tick, answers with a status code
//!
//! status codes follow the http client convention the node has always used:
//! [200, 400) is success, anything else fails, and a request that never got
//! an answer reports TRANSPORT_FAILURE.
//!
//! ==============================================================================

use std::time::Duration;
use tokio::sync::broadcast;

use crate::config::RemoteConfig;
use crate::domain::{BroadcastFrame, DistributionEvent, LogRecord};

/// status reported when no http response came back at all
pub const TRANSPORT_FAILURE: i32 = -1;

pub fn is_success(code: i32) -> bool {
    (200..400).contains(&code)
}

pub trait Broadcaster {
    /// returns how many listeners were handed the frame
    fn broadcast(&self, event: &DistributionEvent) -> usize;
}

#[allow(async_fn_in_trait)]
pub trait LogSink {
    async fn post(&self, event: &DistributionEvent) -> i32;
}

impl<T: Broadcaster + ?Sized> Broadcaster for &T {
    fn broadcast(&self, event: &DistributionEvent) -> usize {
        (**self).broadcast(event)
    }
}

impl<T: LogSink + ?Sized> LogSink for &T {
    async fn post(&self, event: &DistributionEvent) -> i32 {
        (**self).post(event).await
    }
}

// ==============================================================================
// websocket broadcaster
// ==============================================================================

/// Fan-out of serialized frames. server.rs subscribes one receiver per
/// websocket; a listener that falls `capacity` frames behind skips ahead.
#[derive(Clone)]
pub struct WsBroadcaster {
    tx: broadcast::Sender<String>,
}

impl WsBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        tracing::info!("broadcaster initialized with capacity {}", capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Broadcaster for WsBroadcaster {
    fn broadcast(&self, event: &DistributionEvent) -> usize {
        let frame = match serde_json::to_string(&BroadcastFrame::from(event)) {
            Ok(f) => f,
            Err(e) => {
                tracing::debug!("frame serialization failed: {}", e);
                return 0;
            }
        };
        // Err only means nobody is listening
        self.tx.send(frame).unwrap_or(0)
    }
}

// ==============================================================================
// http log sink
// ==============================================================================

pub struct HttpLogSink {
    client: reqwest::Client,
    url: String,
}

impl HttpLogSink {
    pub fn new(cfg: &RemoteConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;
        Ok(Self { client, url: cfg.log_url() })
    }
}

impl LogSink for HttpLogSink {
    async fn post(&self, event: &DistributionEvent) -> i32 {
        let record = LogRecord::from(event);
        match self.client.post(&self.url).json(&record).send().await {
            Ok(resp) => resp.status().as_u16() as i32,
            Err(e) => {
                tracing::warn!("log POST to {} failed: {}", self.url, e);
                TRANSPORT_FAILURE
            }
        }
    }
}
