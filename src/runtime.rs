//! Steady-state run loop: dispatch in the foreground, supervision in the
//! background, shutdown on signal or stream end.

use std::future::Future;
use std::sync::Arc;

use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::config::Config;
use crate::dispatcher::{DispatchStats, MessageDispatcher, MessageHandler};
use crate::kafka::{BrokerSession, Connected};
use crate::shutdown::{ShutdownCoordinator, ShutdownTrigger};
use crate::supervisor::EventSupervisor;

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// A termination signal started the shutdown
    Signalled,
    /// The inbound stream ended on its own
    StreamEnded,
}

impl RunOutcome {
    /// Process exit status for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Signalled => 1,
            Self::StreamEnded => 0,
        }
    }
}

/// Summary of a finished session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    /// What ended the session
    pub outcome: RunOutcome,
    /// Dispatcher counters
    pub dispatch: DispatchStats,
    /// Notifications and deliveries supervised
    pub notifications: u64,
    /// Errors supervised
    pub errors: u64,
}

/// Resolve on SIGINT or SIGTERM
///
/// # Errors
///
/// Returns an error if the signal handlers cannot be installed.
pub async fn termination_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

/// Resolve on a termination signal; never resolves if handlers cannot be
/// installed
pub async fn shutdown_signal() {
    if let Err(e) = termination_signal().await {
        warn!(error = %e, "Unable to listen for termination signals");
        std::future::pending::<()>().await;
    }
}

/// Run a connected session until `signal` fires or the inbound stream ends
///
/// The session is closed exactly once on either path, and the function
/// returns after both supervision loops have finished.
pub async fn run_session<S, H, F>(
    connected: Connected<S>,
    config: &Config,
    handler: Arc<H>,
    signal: F,
) -> SessionReport
where
    S: BrokerSession,
    H: MessageHandler + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let Connected { session, events } = connected;
    let coordinator = ShutdownCoordinator::new(session.clone(), config.shutdown.flush_timeout());
    let supervisors = EventSupervisor::new(config.logging.include_payload).spawn(events);

    let signal_watcher = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            signal.await;
            info!("Termination signal received");
            coordinator.shutdown(ShutdownTrigger::Signal).await;
        })
    };

    let inbound = session.messages(coordinator.token());
    let dispatcher = MessageDispatcher::new(
        handler,
        config.dispatch.max_in_flight,
        config.shutdown.drain_timeout(),
    );
    let dispatch = dispatcher
        .run(ReceiverStream::new(inbound), coordinator.token())
        .await;

    coordinator.shutdown(ShutdownTrigger::StreamEnded).await;
    coordinator.wait_closed().await;
    signal_watcher.abort();

    let (notifications, errors) = supervisors.join().await;
    let outcome = match coordinator.trigger() {
        Some(ShutdownTrigger::Signal) => RunOutcome::Signalled,
        _ => RunOutcome::StreamEnded,
    };
    info!(?outcome, notifications, errors, "Session finished");

    SessionReport {
        outcome,
        dispatch,
        notifications,
        errors,
    }
}
