//! Connectivity tracking
//!
//! The [`ConnectivityMonitor`] keeps the current online flag and a quality
//! score derived from the active network transports. Platform probes feed
//! it through [`ConnectivityMonitor::observe`]; everything else reads it.
//!
//! State lives in a `tokio::sync::watch` channel. Quality changes update the
//! value silently, and subscribers are only woken when the online flag
//! flips, so a Wi-Fi to Ethernet handover does not look like a reconnect.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use planwise_core::config::ConnectivityConfig;
use planwise_core::ports::Clock;

/// Kind of network link the device is using
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Ethernet,
    Wifi,
    Cellular,
    Vpn,
    Bluetooth,
    Other,
    None,
}

impl Transport {
    /// Quality score in `0..=100`
    pub fn quality(&self) -> u8 {
        match self {
            Transport::Ethernet => 100,
            Transport::Wifi => 90,
            Transport::Cellular => 70,
            Transport::Vpn => 60,
            Transport::Other => 50,
            Transport::Bluetooth => 30,
            Transport::None => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Ethernet => "ethernet",
            Transport::Wifi => "wifi",
            Transport::Cellular => "cellular",
            Transport::Vpn => "vpn",
            Transport::Bluetooth => "bluetooth",
            Transport::Other => "other",
            Transport::None => "none",
        }
    }
}

/// Snapshot of the connectivity state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectivityState {
    pub online: bool,
    /// Best quality among the active transports; 0 when offline
    pub quality: u8,
    pub transports: Vec<Transport>,
    pub last_connected: Option<DateTime<Utc>>,
    pub last_disconnected: Option<DateTime<Utc>>,
}

impl ConnectivityState {
    /// Human-readable one-liner, e.g. `online via wifi (quality 90)`
    pub fn describe(&self) -> String {
        if !self.online {
            return "offline".to_string();
        }
        let names: Vec<&str> = self.transports.iter().map(Transport::as_str).collect();
        format!("online via {} (quality {})", names.join("+"), self.quality)
    }
}

/// Tracks connectivity and answers suitability questions
pub struct ConnectivityMonitor {
    state: watch::Sender<ConnectivityState>,
    sync_threshold: u8,
    heavy_threshold: u8,
    clock: Arc<dyn Clock>,
}

impl ConnectivityMonitor {
    /// Creates a monitor that starts offline
    pub fn new(config: &ConnectivityConfig, clock: Arc<dyn Clock>) -> Self {
        let (state, _) = watch::channel(ConnectivityState::default());
        Self {
            state,
            sync_threshold: config.sync_quality_threshold,
            heavy_threshold: config.heavy_quality_threshold,
            clock,
        }
    }

    /// Records the currently active transports
    ///
    /// An empty slice (or only `Transport::None`) means offline. Returns
    /// true when the online flag flipped; only then are subscribers woken.
    pub fn observe(&self, transports: &[Transport]) -> bool {
        let active: Vec<Transport> = transports
            .iter()
            .copied()
            .filter(|t| *t != Transport::None)
            .collect();
        let online = !active.is_empty();
        let quality = active.iter().map(Transport::quality).max().unwrap_or(0);
        let now = self.clock.now();

        let mut flipped = false;
        self.state.send_if_modified(|state| {
            flipped = state.online != online;
            if flipped {
                if online {
                    state.last_connected = Some(now);
                } else {
                    state.last_disconnected = Some(now);
                }
            }
            state.online = online;
            state.quality = quality;
            state.transports = active.clone();
            flipped
        });

        if flipped {
            info!(online, quality, "Connectivity changed");
        } else {
            debug!(online, quality, "Connectivity observed");
        }
        flipped
    }

    pub fn is_online(&self) -> bool {
        self.state.borrow().online
    }

    pub fn quality(&self) -> u8 {
        self.state.borrow().quality
    }

    /// Online with quality at or above the sync threshold
    pub fn is_suitable_for_sync(&self) -> bool {
        let state = self.state.borrow();
        state.online && state.quality >= self.sync_threshold
    }

    /// Online with quality at or above the heavy-operation threshold
    pub fn is_suitable_for_heavy_operations(&self) -> bool {
        let state = self.state.borrow();
        state.online && state.quality >= self.heavy_threshold
    }

    pub fn last_connected_time(&self) -> Option<DateTime<Utc>> {
        self.state.borrow().last_connected
    }

    pub fn last_disconnected_time(&self) -> Option<DateTime<Utc>> {
        self.state.borrow().last_disconnected
    }

    pub fn state(&self) -> ConnectivityState {
        self.state.borrow().clone()
    }

    /// Receiver woken on every online/offline flip
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.state.subscribe()
    }

    /// Waits until online, `timeout` elapses or `cancel` fires
    ///
    /// Returns true only when connectivity was (re)gained.
    pub async fn wait_for_connection(&self, timeout: Duration, cancel: &CancellationToken) -> bool {
        let mut rx = self.state.subscribe();
        tokio::select! {
            res = rx.wait_for(|state| state.online) => res.is_ok(),
            _ = tokio::time::sleep(timeout) => false,
            _ = cancel.cancelled() => false,
        }
    }
}
