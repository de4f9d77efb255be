//! Graceful shutdown coordination.
//!
//! [`ShutdownSignal`] tells the accept loop and every connection task to
//! stop; [`ConnectionTracker`] lets the server wait for open connections to
//! finish their in-flight requests.
//!
//! ```rust
//! use baribhara_gateway::shutdown::{ConnectionTracker, ShutdownSignal};
//!
//! let signal = ShutdownSignal::new();
//! let observer = signal.clone();
//! signal.trigger();
//! assert!(observer.is_triggered());
//!
//! let tracker = ConnectionTracker::new();
//! let token = tracker.track();
//! assert_eq!(tracker.active(), 1);
//! drop(token);
//! assert_eq!(tracker.active(), 0);
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Notify};

/// A cloneable, trigger-once stop signal.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    triggered: Arc<AtomicBool>,
    sender: broadcast::Sender<()>,
}

impl ShutdownSignal {
    /// Creates an untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            triggered: Arc::new(AtomicBool::new(false)),
            sender,
        }
    }

    /// Creates a signal triggered by SIGTERM or SIGINT.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn from_os_signals() -> Self {
        let signal = Self::new();
        let trigger = signal.clone();
        tokio::spawn(async move {
            let received = os_signal().await;
            tracing::info!(signal = received, "shutdown signal received");
            trigger.trigger();
        });
        signal
    }

    /// Triggers the signal. Later calls do nothing.
    pub fn trigger(&self) {
        if self
            .triggered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            // No subscribers is fine.
            let _ = self.sender.send(());
        }
    }

    /// Returns true once [`trigger`](Self::trigger) has been called.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Completes when the signal is triggered, immediately if it already was.
    pub async fn wait(&self) {
        let mut receiver = self.sender.subscribe();
        if self.is_triggered() {
            return;
        }
        let _ = receiver.recv().await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

async fn os_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut terminate), Ok(mut interrupt)) => {
                let received = tokio::select! {
                    _ = terminate.recv() => "SIGTERM",
                    _ = interrupt.recv() => "SIGINT",
                };
                return received;
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "unix signal handlers unavailable, using ctrl-c");
            }
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => "ctrl-c",
        Err(e) => {
            tracing::error!(error = %e, "cannot listen for ctrl-c, shutdown must be triggered manually");
            std::future::pending().await
        }
    }
}

/// Counts open connections.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    inner: Arc<TrackerInner>,
}

#[derive(Debug, Default)]
struct TrackerInner {
    active: AtomicUsize,
    idle: Notify,
}

impl ConnectionTracker {
    /// Creates a tracker with no connections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection until the returned token drops.
    #[must_use]
    pub fn track(&self) -> ConnectionToken {
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        ConnectionToken {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Number of open connections.
    #[must_use]
    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Completes once no connections remain.
    pub async fn drained(&self) {
        loop {
            let idle = self.inner.idle.notified();
            if self.active() == 0 {
                return;
            }
            idle.await;
        }
    }
}

/// Held by a connection task for the connection's lifetime.
#[derive(Debug)]
pub struct ConnectionToken {
    inner: Arc<TrackerInner>,
}

impl Drop for ConnectionToken {
    fn drop(&mut self) {
        if self.inner.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}
