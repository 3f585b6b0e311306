//! Reachability probing
//!
//! A probe checks one address and reports status plus latency, bounded by
//! a timeout. Probes never fail: timeouts and transport errors are the
//! expected common case and map to `Down` with no latency reading.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tracing::trace;

use crate::models::ProbeStatus;

/// Default per-probe timeout
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Port probed when an address carries none
const DEFAULT_PROBE_PORT: u16 = 80;

/// Outcome of a single probe
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeOutcome {
    pub status: ProbeStatus,
    pub latency_ms: Option<f64>,
}

impl ProbeOutcome {
    pub fn up(latency_ms: f64) -> Self {
        Self {
            status: ProbeStatus::Up,
            latency_ms: Some(latency_ms),
        }
    }

    pub fn down() -> Self {
        Self {
            status: ProbeStatus::Down,
            latency_ms: None,
        }
    }
}

/// Trait for reachability probe implementations
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probe one address. Must not error for unreachability.
    async fn probe(&self, address: &str) -> ProbeOutcome;
}

/// TCP connect probe
///
/// Measures the time to establish a TCP connection to the address.
/// The trait seam keeps the poll loop transport-agnostic; an ICMP
/// implementation can slot in where raw sockets are available.
pub struct TcpProber {
    timeout: Duration,
}

impl TcpProber {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn target(address: &str) -> String {
        if address.contains(':') {
            address.to_string()
        } else {
            format!("{address}:{DEFAULT_PROBE_PORT}")
        }
    }
}

impl Default for TcpProber {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, address: &str) -> ProbeOutcome {
        let target = Self::target(address);
        let start = Instant::now();

        match timeout(self.timeout, TcpStream::connect(&target)).await {
            Ok(Ok(_stream)) => {
                let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
                ProbeOutcome::up(round_ms(elapsed_ms))
            }
            Ok(Err(e)) => {
                trace!(address = %target, error = %e, "Probe failed");
                ProbeOutcome::down()
            }
            Err(_) => {
                trace!(address = %target, "Probe timed out");
                ProbeOutcome::down()
            }
        }
    }
}

/// Round to two decimals, the stored millisecond precision
fn round_ms(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
