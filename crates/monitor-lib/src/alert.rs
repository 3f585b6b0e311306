//! Alert dispatch
//!
//! Best-effort notification sink consumed by the poll loop and the
//! scorer. One capability trait covers every outbound channel; the
//! fan-out implementation multiplexes across channels so callers stay
//! decoupled from any specific transport.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, warn};

/// Kind of problem being reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    DeviceDown,
    LatencySpike,
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueKind::DeviceDown => write!(f, "Device Down"),
            IssueKind::LatencySpike => write!(f, "High Latency Spike"),
        }
    }
}

/// Trait for notification channel implementations
#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    /// Deliver one notification. Callers log failures and move on; a
    /// failed dispatch never blocks or rolls back the triggering cycle.
    async fn notify(&self, device_name: &str, address: &str, issue: IssueKind) -> Result<()>;
}

/// Dispatcher that writes alerts to the structured log
#[derive(Debug, Default)]
pub struct LogDispatcher;

#[async_trait]
impl AlertDispatcher for LogDispatcher {
    async fn notify(&self, device_name: &str, address: &str, issue: IssueKind) -> Result<()> {
        warn!(device = %device_name, address = %address, issue = %issue, "ALERT");
        Ok(())
    }
}

/// Fan-out over multiple channels
///
/// A notification counts as delivered when at least one channel accepts
/// it; per-channel failures are logged, not propagated.
pub struct FanoutDispatcher {
    channels: Vec<Arc<dyn AlertDispatcher>>,
}

impl FanoutDispatcher {
    pub fn new(channels: Vec<Arc<dyn AlertDispatcher>>) -> Self {
        Self { channels }
    }
}

#[async_trait]
impl AlertDispatcher for FanoutDispatcher {
    async fn notify(&self, device_name: &str, address: &str, issue: IssueKind) -> Result<()> {
        let mut failures = 0usize;
        for channel in &self.channels {
            if let Err(e) = channel.notify(device_name, address, issue).await {
                failures += 1;
                error!(device = %device_name, issue = %issue, error = %e, "Alert channel failed");
            }
        }
        if !self.channels.is_empty() && failures == self.channels.len() {
            anyhow::bail!("all {failures} alert channels failed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Channel that records notifications, optionally failing each call
    pub(crate) struct RecordingDispatcher {
        pub events: Mutex<Vec<(String, String, IssueKind)>>,
        fail: bool,
    }

    impl RecordingDispatcher {
        pub fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl AlertDispatcher for RecordingDispatcher {
        async fn notify(&self, device_name: &str, address: &str, issue: IssueKind) -> Result<()> {
            if self.fail {
                anyhow::bail!("channel unavailable");
            }
            self.events
                .lock()
                .unwrap()
                .push((device_name.to_string(), address.to_string(), issue));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_fanout_reaches_all_channels() {
        let a = Arc::new(RecordingDispatcher::new());
        let b = Arc::new(RecordingDispatcher::new());
        let fanout = FanoutDispatcher::new(vec![
            Arc::clone(&a) as Arc<dyn AlertDispatcher>,
            Arc::clone(&b) as Arc<dyn AlertDispatcher>,
        ]);

        fanout
            .notify("core-switch", "10.0.0.1", IssueKind::DeviceDown)
            .await
            .unwrap();

        assert_eq!(a.events.lock().unwrap().len(), 1);
        assert_eq!(b.events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fanout_partial_failure_still_delivers() {
        let ok = Arc::new(RecordingDispatcher::new());
        let fanout = FanoutDispatcher::new(vec![
            Arc::new(RecordingDispatcher::failing()) as Arc<dyn AlertDispatcher>,
            Arc::clone(&ok) as Arc<dyn AlertDispatcher>,
        ]);

        let result = fanout
            .notify("core-switch", "10.0.0.1", IssueKind::LatencySpike)
            .await;

        assert!(result.is_ok());
        assert_eq!(ok.events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fanout_all_channels_failing_errors() {
        let fanout = FanoutDispatcher::new(vec![
            Arc::new(RecordingDispatcher::failing()) as Arc<dyn AlertDispatcher>,
            Arc::new(RecordingDispatcher::failing()) as Arc<dyn AlertDispatcher>,
        ]);

        let result = fanout
            .notify("core-switch", "10.0.0.1", IssueKind::DeviceDown)
            .await;

        assert!(result.is_err());
    }
}
