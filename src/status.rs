//! Transient user-visible pipeline status.
//!
//! Purely observational: each report replaces the currently displayed
//! indicator, terminal states auto-dismiss after a fixed interval, and
//! nothing here blocks or fails outward.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Status {
    Generating,
    Success,
    Error,
}

impl Status {
    fn is_terminal(&self) -> bool {
        matches!(self, Status::Success | Status::Error)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusIndicator {
    pub status: Status,
    pub message: Option<String>,
    seq: u64,
}

/// Publishes the current status indicator to UI consumers.
pub struct StatusHub {
    sender: watch::Sender<Option<StatusIndicator>>,
    dismiss_after: Duration,
    seq: AtomicU64,
}

impl StatusHub {
    pub fn new(dismiss_after: Duration) -> Arc<Self> {
        let (sender, _) = watch::channel(None);
        Arc::new(Self {
            sender,
            dismiss_after,
            seq: AtomicU64::new(0),
        })
    }

    /// Replaces the displayed indicator. `Success` and `Error` are cleared
    /// after the dismiss interval unless another report lands first.
    pub fn report(&self, status: Status, message: Option<&str>) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(%status, ?message, "status report");
        self.sender.send_replace(Some(StatusIndicator {
            status,
            message: message.map(str::to_string),
            seq,
        }));

        if status.is_terminal() {
            let sender = self.sender.clone();
            let dismiss_after = self.dismiss_after;
            tokio::spawn(async move {
                tokio::time::sleep(dismiss_after).await;
                // Only dismiss if nothing newer replaced us.
                let stale = sender
                    .borrow()
                    .as_ref()
                    .map(|current| current.seq == seq)
                    .unwrap_or(false);
                if stale {
                    sender.send_replace(None);
                }
            });
        }
    }

    /// Dismisses the displayed indicator immediately.
    pub fn clear(&self) {
        self.sender.send_replace(None);
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<StatusIndicator>> {
        self.sender.subscribe()
    }

    pub fn current(&self) -> Option<StatusIndicator> {
        self.sender.borrow().clone()
    }
}
