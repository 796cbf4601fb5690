//! Network transport observer
//!
//! Reads interface state from sysfs (`/sys/class/net/<iface>/operstate`)
//! and feeds the active transports into the [`ConnectivityMonitor`] on a
//! fixed interval. Interface kinds are guessed from the conventional
//! kernel/udev name prefixes.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use planwise_sync::{ConnectivityMonitor, Transport};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const SYSFS_NET: &str = "/sys/class/net";

/// Maps an interface name to a transport; `None` for loopback and
/// host-internal virtual interfaces
pub fn classify_interface(name: &str) -> Option<Transport> {
    const VIRTUAL: &[&str] = &["lo", "docker", "veth", "br-", "virbr", "vnet", "dummy"];
    const TABLE: &[(&str, Transport)] = &[
        ("eth", Transport::Ethernet),
        ("en", Transport::Ethernet),
        ("wl", Transport::Wifi),
        ("ww", Transport::Cellular),
        ("rmnet", Transport::Cellular),
        ("tun", Transport::Vpn),
        ("tap", Transport::Vpn),
        ("wg", Transport::Vpn),
        ("ppp", Transport::Vpn),
        ("bnep", Transport::Bluetooth),
    ];

    if VIRTUAL.iter().any(|p| name.starts_with(p)) {
        return None;
    }
    Some(
        TABLE
            .iter()
            .find(|(prefix, _)| name.starts_with(prefix))
            .map(|(_, t)| *t)
            .unwrap_or(Transport::Other),
    )
}

/// Whether an `operstate` value means the link carries traffic
///
/// Point-to-point devices (tun, wg, ppp) commonly report `unknown` while up.
fn is_up(operstate: &str, transport: Transport) -> bool {
    match operstate.trim() {
        "up" => true,
        "unknown" => transport == Transport::Vpn,
        _ => false,
    }
}

/// Lists the transports whose interfaces are currently up
pub async fn active_transports(root: &Path) -> std::io::Result<Vec<Transport>> {
    let mut transports = Vec::new();
    let mut entries = tokio::fs::read_dir(root).await?;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let Some(transport) = classify_interface(&name) else {
            continue;
        };

        let operstate = match tokio::fs::read_to_string(entry.path().join("operstate")).await {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        if is_up(&operstate, transport) {
            debug!(interface = %name, transport = transport.as_str(), "Interface up");
            if !transports.contains(&transport) {
                transports.push(transport);
            }
        }
    }

    Ok(transports)
}

/// Periodically probes `root` and reports to `monitor` until cancelled
pub struct NetworkObserver {
    root: PathBuf,
    interval: Duration,
    monitor: Arc<ConnectivityMonitor>,
}

impl NetworkObserver {
    pub fn new(monitor: Arc<ConnectivityMonitor>, interval: Duration) -> Self {
        Self::with_root(monitor, interval, SYSFS_NET)
    }

    pub fn with_root(
        monitor: Arc<ConnectivityMonitor>,
        interval: Duration,
        root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            root: root.into(),
            interval,
            monitor,
        }
    }

    /// One probe; errors leave the last known state in place
    pub async fn probe(&self) {
        match active_transports(&self.root).await {
            Ok(transports) => {
                self.monitor.observe(&transports);
            }
            Err(e) => warn!(root = %self.root.display(), error = %e, "Network probe failed"),
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!(
            root = %self.root.display(),
            interval_secs = self.interval.as_secs(),
            "Network observer started"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.probe().await,
            }
        }
        debug!("Network observer stopped");
    }
}
