//! Exactly-once shutdown of the client session.
//!
//! Lifecycle: `Running -> ShuttingDown -> Closed`. Either a termination
//! signal or the end of the inbound stream moves the session out of
//! `Running`; whichever caller gets through the gate first performs the
//! close, every other caller is a no-op.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::kafka::BrokerSession;

/// Lifecycle state of the client session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Loops are running
    Running,
    /// Shutdown started; handles are being closed
    ShuttingDown,
    /// Producer and consumer are closed
    Closed,
}

/// What caused the shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownTrigger {
    /// SIGINT or SIGTERM
    Signal,
    /// The inbound stream ended
    StreamEnded,
    /// A one-shot command finished its work
    Completed,
}

impl fmt::Display for ShutdownTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Signal => "signal",
            Self::StreamEnded => "stream_ended",
            Self::Completed => "completed",
        })
    }
}

struct Inner {
    session: Arc<dyn BrokerSession>,
    gate: AtomicBool,
    trigger: OnceLock<ShutdownTrigger>,
    token: CancellationToken,
    state: watch::Sender<LifecycleState>,
    flush_timeout: Duration,
}

/// Single owner of the session's close
///
/// Cheap to clone; all clones share the same gate and state.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    inner: Arc<Inner>,
}

impl fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("state", &self.state())
            .field("trigger", &self.trigger())
            .finish()
    }
}

impl ShutdownCoordinator {
    /// Take ownership of closing `session`
    pub fn new(session: Arc<dyn BrokerSession>, flush_timeout: Duration) -> Self {
        let (state, _) = watch::channel(LifecycleState::Running);
        Self {
            inner: Arc::new(Inner {
                session,
                gate: AtomicBool::new(false),
                trigger: OnceLock::new(),
                token: CancellationToken::new(),
                state,
                flush_timeout,
            }),
        }
    }

    /// Token cancelled as soon as shutdown starts
    pub fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        *self.inner.state.borrow()
    }

    /// The trigger of the shutdown that ran, if any
    pub fn trigger(&self) -> Option<ShutdownTrigger> {
        self.inner.trigger.get().copied()
    }

    /// Close the session
    ///
    /// Returns `true` if this call performed the close and `false` if a
    /// shutdown had already been started. Close failures are logged, never
    /// returned: the session always ends up `Closed`.
    pub async fn shutdown(&self, trigger: ShutdownTrigger) -> bool {
        if self.inner.gate.swap(true, Ordering::SeqCst) {
            debug!(%trigger, "Shutdown already performed");
            return false;
        }

        let _ = self.inner.trigger.set(trigger);
        self.inner.state.send_replace(LifecycleState::ShuttingDown);
        self.inner.token.cancel();
        info!(%trigger, "Closing consumer and producer...");

        let session = Arc::clone(&self.inner.session);
        let flush_timeout = self.inner.flush_timeout;
        let closed = tokio::task::spawn_blocking(move || {
            if let Err(e) = session.close_producer(flush_timeout) {
                warn!(error = %e, "Failed to close producer cleanly");
            }
            if let Err(e) = session.close_consumer() {
                warn!(error = %e, "Failed to close consumer cleanly");
            }
        })
        .await;
        if let Err(e) = closed {
            warn!(error = %e, "Close task failed");
        }

        self.inner.state.send_replace(LifecycleState::Closed);
        info!("Consumer and producer closed");
        true
    }

    /// Wait until the session is `Closed`
    pub async fn wait_closed(&self) {
        let mut rx = self.inner.state.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|state| *state == LifecycleState::Closed).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kafka::{ClientError, InboundRecord};
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct CountingSession {
        producer_closes: AtomicUsize,
        consumer_closes: AtomicUsize,
        order: std::sync::Mutex<Vec<&'static str>>,
    }

    impl BrokerSession for CountingSession {
        fn messages(
            self: Arc<Self>,
            _cancel: CancellationToken,
        ) -> mpsc::Receiver<InboundRecord> {
            mpsc::channel(1).1
        }

        fn publish(&self, _: &str, _: Option<&[u8]>, _: &[u8]) -> Result<(), ClientError> {
            Ok(())
        }

        fn close_producer(&self, _flush_timeout: Duration) -> Result<(), ClientError> {
            self.producer_closes.fetch_add(1, Ordering::SeqCst);
            self.order.lock().unwrap().push("producer");
            Ok(())
        }

        fn close_consumer(&self) -> Result<(), ClientError> {
            self.consumer_closes.fetch_add(1, Ordering::SeqCst);
            self.order.lock().unwrap().push("consumer");
            Err(ClientError::Closed("consumer"))
        }
    }

    fn coordinator() -> (Arc<CountingSession>, ShutdownCoordinator) {
        let session = Arc::new(CountingSession::default());
        let coordinator = ShutdownCoordinator::new(session.clone(), Duration::from_secs(1));
        (session, coordinator)
    }

    #[tokio::test]
    async fn test_shutdown_closes_once() {
        let (session, coordinator) = coordinator();
        assert_eq!(coordinator.state(), LifecycleState::Running);

        assert!(coordinator.shutdown(ShutdownTrigger::Signal).await);
        assert!(!coordinator.shutdown(ShutdownTrigger::StreamEnded).await);

        assert_eq!(session.producer_closes.load(Ordering::SeqCst), 1);
        assert_eq!(session.consumer_closes.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.state(), LifecycleState::Closed);
        assert_eq!(coordinator.trigger(), Some(ShutdownTrigger::Signal));
    }

    #[tokio::test]
    async fn test_producer_closes_before_consumer() {
        let (session, coordinator) = coordinator();
        coordinator.shutdown(ShutdownTrigger::StreamEnded).await;
        assert_eq!(*session.order.lock().unwrap(), vec!["producer", "consumer"]);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_token() {
        let (_session, coordinator) = coordinator();
        let token = coordinator.token();
        assert!(!token.is_cancelled());

        coordinator.shutdown(ShutdownTrigger::StreamEnded).await;
        assert!(token.is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_shutdowns_collapse_to_one() {
        let (session, coordinator) = coordinator();

        let attempts = (0..8).map(|i| {
            let coordinator = coordinator.clone();
            let trigger = if i % 2 == 0 {
                ShutdownTrigger::Signal
            } else {
                ShutdownTrigger::StreamEnded
            };
            tokio::spawn(async move { coordinator.shutdown(trigger).await })
        });
        let results = futures::future::join_all(attempts).await;

        let performed = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();
        assert_eq!(performed, 1);
        assert_eq!(session.producer_closes.load(Ordering::SeqCst), 1);
        assert_eq!(session.consumer_closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wait_closed_resolves_after_shutdown() {
        let (_session, coordinator) = coordinator();
        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.wait_closed().await })
        };

        coordinator.shutdown(ShutdownTrigger::Signal).await;
        waiter.await.unwrap();
        assert_eq!(coordinator.state(), LifecycleState::Closed);
    }
}
