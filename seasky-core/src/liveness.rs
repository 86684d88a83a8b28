//! Per-source liveness: online flag, last packet time, silence timeout.
//!
//! Each ingestion source owns one [`SourceLiveness`] and updates it from its
//! read loop. The monitor never touches the track table; a silent source
//! just stops contributing and its tracks age out.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tracing::warn;

use crate::types::Millis;

/// Direct ADS-B feed.
pub const ADSB_TIMEOUT_MS: Millis = 60_000;
/// MLAT results only arrive when several receivers see an aircraft.
pub const MLAT_TIMEOUT_MS: Millis = 600_000;
/// AVR text feed.
pub const AVR_TIMEOUT_MS: Millis = 60_000;
/// AIS traffic is sparse; two missed two-minute reports.
pub const AIS_TIMEOUT_MS: Millis = 240_000;

/// Liveness state for one ingestion source.
#[derive(Debug)]
pub struct SourceLiveness {
    name: String,
    timeout_ms: Millis,
    /// 0 until the first packet.
    last_packet: AtomicI64,
    online: AtomicBool,
}

/// Point-in-time view for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceStatus {
    pub name: String,
    pub online: bool,
    pub last_packet: Option<Millis>,
    pub timeout_ms: Millis,
}

impl SourceLiveness {
    pub fn new(name: impl Into<String>, timeout_ms: Millis) -> Self {
        SourceLiveness {
            name: name.into(),
            timeout_ms,
            last_packet: AtomicI64::new(0),
            online: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeout_ms(&self) -> Millis {
        self.timeout_ms
    }

    /// A packet arrived: the source is online.
    pub fn record_packet(&self, now: Millis) {
        self.last_packet.store(now, Ordering::Relaxed);
        self.online.store(true, Ordering::Relaxed);
    }

    /// Transport-level change, e.g. connected or socket closed.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Relaxed);
    }

    pub fn last_packet(&self) -> Option<Millis> {
        match self.last_packet.load(Ordering::Relaxed) {
            0 => None,
            t => Some(t),
        }
    }

    /// True if the source has been silent longer than its timeout.
    pub fn timed_out(&self, now: Millis) -> bool {
        match self.last_packet() {
            Some(t) => now - t > self.timeout_ms,
            None => false,
        }
    }

    /// Re-evaluate the online flag. Returns the new state.
    pub fn check(&self, now: Millis) -> bool {
        if self.timed_out(now) && self.online.swap(false, Ordering::Relaxed) {
            warn!(
                source = %self.name,
                silent_secs = (now - self.last_packet().unwrap_or(now)) / 1000,
                "no data received within timeout, marking offline"
            );
        }
        self.is_online()
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    pub fn status(&self, now: Millis) -> SourceStatus {
        SourceStatus {
            name: self.name.clone(),
            online: self.check(now),
            last_packet: self.last_packet(),
            timeout_ms: self.timeout_ms,
        }
    }
}

/// All sources known to the process, for the status endpoint.
#[derive(Debug, Default)]
pub struct LivenessRegistry {
    sources: RwLock<Vec<Arc<SourceLiveness>>>,
}

impl LivenessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, timeout_ms: Millis) -> Arc<SourceLiveness> {
        let source = Arc::new(SourceLiveness::new(name, timeout_ms));
        self.sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&source));
        source
    }

    /// Re-evaluate every source. Returns how many are online.
    pub fn check_all(&self, now: Millis) -> usize {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.check(now))
            .count()
    }

    pub fn statuses(&self, now: Millis) -> Vec<SourceStatus> {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|s| s.status(now))
            .collect()
    }
}
