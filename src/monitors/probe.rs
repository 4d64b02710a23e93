//! Reachability and TCP probes
//!
//! Probes never fail: every transport problem resolves to the "bad"
//! observation (`Offline` / `Closed`).

use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use rand::random;
use surge_ping::{Client, Config, ICMP, PingIdentifier, PingSequence};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::{PingStatus, PortStatus};

/// Something a probe can report, with a notion of "good"
pub trait ProbeOutcome: Copy + std::fmt::Debug {
    fn is_good(&self) -> bool;
}

impl ProbeOutcome for PingStatus {
    fn is_good(&self) -> bool {
        matches!(self, PingStatus::Online)
    }
}

impl ProbeOutcome for PortStatus {
    fn is_good(&self) -> bool {
        matches!(self, PortStatus::Open)
    }
}

/// Single-shot probes against one target
#[async_trait]
pub trait Prober: Send + Sync {
    /// One ICMP echo
    async fn reachability(&self, address: &str) -> PingStatus;

    /// One TCP connect
    async fn tcp(&self, address: &str, port: u16) -> PortStatus;
}

/// Probes real network targets
#[derive(Debug, Clone)]
pub struct NetworkProber {
    ping_timeout: Duration,
    tcp_timeout: Duration,
}

impl NetworkProber {
    pub fn new(ping_timeout: Duration, tcp_timeout: Duration) -> Self {
        Self {
            ping_timeout,
            tcp_timeout,
        }
    }

    async fn resolve(address: &str) -> Option<IpAddr> {
        if let Ok(ip) = address.parse::<IpAddr>() {
            return Some(ip);
        }

        match tokio::net::lookup_host(format!("{address}:0")).await {
            Ok(mut addrs) => addrs.next().map(|addr| addr.ip()),
            Err(e) => {
                debug!("failed to resolve {address}: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl Prober for NetworkProber {
    async fn reachability(&self, address: &str) -> PingStatus {
        let Some(ip) = Self::resolve(address).await else {
            return PingStatus::Offline;
        };

        let config = match ip {
            IpAddr::V4(_) => Config::default(),
            IpAddr::V6(_) => Config::builder().kind(ICMP::V6).build(),
        };

        let client = match Client::new(&config) {
            Ok(client) => client,
            Err(e) => {
                warn!("could not open ICMP socket: {e}");
                return PingStatus::Offline;
            }
        };

        let mut pinger = client.pinger(ip, PingIdentifier(random())).await;
        match timeout(self.ping_timeout, pinger.ping(PingSequence(0), &[])).await {
            Ok(Ok((_reply, rtt))) => {
                trace!("{address}: echo reply in {}ms", rtt.as_millis());
                PingStatus::Online
            }
            Ok(Err(e)) => {
                trace!("{address}: echo failed: {e}");
                PingStatus::Offline
            }
            Err(_) => {
                trace!("{address}: echo timed out");
                PingStatus::Offline
            }
        }
    }

    async fn tcp(&self, address: &str, port: u16) -> PortStatus {
        match timeout(self.tcp_timeout, TcpStream::connect((address, port))).await {
            Ok(Ok(_stream)) => PortStatus::Open,
            Ok(Err(e)) => {
                trace!("{address}:{port}: connect failed: {e}");
                PortStatus::Closed
            }
            Err(_) => {
                trace!("{address}:{port}: connect timed out");
                PortStatus::Closed
            }
        }
    }
}

/// Run `probe` once, then once more after each of `delays` until it reports
/// a good outcome.
pub async fn probe_with_retry<T, F, Fut>(delays: &[Duration], mut probe: F) -> T
where
    T: ProbeOutcome,
    F: FnMut() -> Fut,
    Fut: Future<Output = T>,
{
    let mut outcome = probe().await;
    if outcome.is_good() {
        return outcome;
    }

    for (attempt, delay) in delays.iter().enumerate() {
        tokio::time::sleep(*delay).await;
        outcome = probe().await;
        trace!("retry {} -> {outcome:?}", attempt + 1);
        if outcome.is_good() {
            return outcome;
        }
    }

    outcome
}
