//! Concurrent dispatch of inbound records.
//!
//! Every non-nil record becomes a [`Message`] stamped with its receipt time
//! and is handed to its own handling unit. Units run concurrently with each
//! other and with the dispatch loop, capped at `max_in_flight`; when the cap
//! is reached the loop waits for a free slot instead of spawning more.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::{Stream, StreamExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn, Instrument};

use crate::kafka::{InboundRecord, Message};
use crate::logging::payload_field;
use crate::metrics::{self, InFlightGuard};

/// Handler trait for dispatched messages.
///
/// This is where business logic attaches. An error is logged and does not
/// stop the dispatcher.
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one message.
    async fn handle(&self, message: Message) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Default handler: reports the message and does nothing else
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportingHandler {
    include_payload: bool,
}

impl ReportingHandler {
    /// Create a reporting handler
    pub fn new(include_payload: bool) -> Self {
        Self { include_payload }
    }
}

#[async_trait::async_trait]
impl MessageHandler for ReportingHandler {
    async fn handle(&self, message: Message) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            received_at = %message.metadata.received_at,
            value = payload_field(self.include_payload, &message.payload).as_deref(),
            "Message received"
        );
        Ok(())
    }
}

/// Counters returned when the dispatch loop ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Records handed to a handling unit
    pub dispatched: u64,
    /// Nil records skipped
    pub skipped: u64,
    /// Whether every handling unit finished within the drain timeout
    pub drained: bool,
    /// Whether the loop stopped on cancellation rather than end of stream
    pub cancelled: bool,
}

/// Foreground dispatch loop
pub struct MessageDispatcher<H> {
    handler: Arc<H>,
    permits: Arc<Semaphore>,
    max_in_flight: usize,
    tracker: TaskTracker,
    drain_timeout: Duration,
}

impl<H: MessageHandler + 'static> MessageDispatcher<H> {
    /// Create a dispatcher running at most `max_in_flight` handling units
    pub fn new(handler: Arc<H>, max_in_flight: usize, drain_timeout: Duration) -> Self {
        let max_in_flight = max_in_flight.max(1);
        debug!(max_in_flight, "Creating message dispatcher");

        Self {
            handler,
            permits: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
            tracker: TaskTracker::new(),
            drain_timeout,
        }
    }

    /// Handling units currently running
    pub fn in_flight(&self) -> usize {
        self.max_in_flight - self.permits.available_permits()
    }

    /// Dispatch records until the stream ends or `cancel` fires, then drain
    ///
    /// Cancellation is observed both while waiting for the next record and
    /// while waiting for a free slot, so a saturated dispatcher still stops.
    /// After the loop ends, waits up to the drain timeout for running
    /// handling units; units still running after that are left to finish
    /// on their own.
    pub async fn run<S>(&self, records: S, cancel: CancellationToken) -> DispatchStats
    where
        S: Stream<Item = InboundRecord> + Send,
    {
        let mut records = std::pin::pin!(records);
        let mut stats = DispatchStats::default();

        info!("Listening to messages...");
        loop {
            let record = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    stats.cancelled = true;
                    break;
                }
                record = records.next() => match record {
                    Some(record) => record,
                    None => break,
                },
            };

            let Some(message) = record.into_message(Utc::now()) else {
                stats.skipped += 1;
                metrics::record_skipped();
                debug!("Skipping nil record");
                continue;
            };

            let acquired = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(
                        topic = %message.topic,
                        partition = message.partition,
                        offset = message.offset,
                        "Dropping record held while waiting for a slot"
                    );
                    stats.cancelled = true;
                    break;
                }
                acquired = Arc::clone(&self.permits).acquire_owned() => acquired,
            };
            let permit = match acquired {
                Ok(permit) => permit,
                Err(e) => {
                    warn!(error = %e, "Dispatch permits closed, stopping dispatch");
                    break;
                }
            };

            stats.dispatched += 1;
            metrics::record_dispatched(&message.topic);

            let handler = Arc::clone(&self.handler);
            let span = crate::message_span!(message);
            self.tracker.spawn(
                async move {
                    let _permit = permit;
                    let _in_flight = InFlightGuard::start();
                    if let Err(e) = handler.handle(message).await {
                        warn!(error = %e, "Message handler failed");
                    }
                }
                .instrument(span),
            );
        }

        stats.drained = self.drain().await;
        info!(
            dispatched = stats.dispatched,
            skipped = stats.skipped,
            drained = stats.drained,
            cancelled = stats.cancelled,
            "Dispatch loop ended"
        );
        stats
    }

    async fn drain(&self) -> bool {
        self.tracker.close();
        match tokio::time::timeout(self.drain_timeout, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    remaining = self.tracker.len(),
                    timeout = ?self.drain_timeout,
                    "Handling units still running after drain timeout"
                );
                false
            }
        }
    }
}
