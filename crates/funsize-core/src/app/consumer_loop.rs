//! ConsumerLoop - メッセージ受信ループ
//!
//! # フロー
//! 1. EventSource::next_delivery() で 1 件取得（in-flight は常に 1 件）
//! 2. Orchestrator::process() で処理
//! 3. 成否に関わらず ack（at-most-once、再配送はしない）
//!
//! Shutdown is only observed between messages; a message being processed
//! always runs to completion and is acked.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{Instrument, error, info, warn};

use crate::app::orchestrator::Orchestrator;
use crate::observability::{EventCounts, event_span};
use crate::ports::{Delivery, EventSource};

/// Handle of a spawned consumer.
/// - `request_shutdown()` で次のメッセージを取りに行かなくなる
/// - `join()` で処理件数を受け取れる
pub struct ConsumerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<EventCounts>,
}

impl ConsumerHandle {
    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already have exited
        let _ = self.shutdown_tx.send(true);
    }

    /// Waits for the loop to exit on its own (source exhausted).
    pub async fn join(self) -> EventCounts {
        // keep the sender alive so the loop does not see a closed channel
        let _shutdown_tx = self.shutdown_tx;
        counts_or_default(self.join.await)
    }

    pub async fn shutdown_and_join(self) -> EventCounts {
        self.request_shutdown();
        counts_or_default(self.join.await)
    }
}

/// A consumer that panicked or was cancelled reports empty counts.
fn counts_or_default(joined: Result<EventCounts, JoinError>) -> EventCounts {
    joined.unwrap_or_else(|e| {
        error!(error = %e, panicked = e.is_panic(), "consumer task did not finish");
        EventCounts::default()
    })
}

pub struct ConsumerLoop;

impl ConsumerLoop {
    pub fn spawn(source: Arc<dyn EventSource>, orchestrator: Arc<Orchestrator>) -> ConsumerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            Self::run(source.as_ref(), &orchestrator, &mut shutdown_rx).await
        });
        ConsumerHandle { shutdown_tx, join }
    }

    /// Consumes until the source is exhausted, fails, or shutdown is requested.
    pub async fn run(
        source: &dyn EventSource,
        orchestrator: &Orchestrator,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> EventCounts {
        let mut counts = EventCounts::default();
        info!("listening");
        loop {
            if *shutdown_rx.borrow() {
                info!("shutdown requested");
                break;
            }

            // waiting for a message may block, so race it against shutdown
            let next = tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        // sender dropped: nobody can ask us to stop any more
                        source.next_delivery().await
                    } else {
                        continue;
                    }
                }
                next = source.next_delivery() => next,
            };

            let delivery = match next {
                Ok(Some(delivery)) => delivery,
                Ok(None) => {
                    info!("event source exhausted");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "event source failed");
                    break;
                }
            };

            counts.received += 1;
            Self::handle(orchestrator, delivery, &mut counts).await;
        }
        counts
    }

    async fn handle(orchestrator: &Orchestrator, delivery: Box<dyn Delivery>, counts: &mut EventCounts) {
        let span = event_span(delivery.routing_key());
        let result = orchestrator
            .process(delivery.body())
            .instrument(span.clone())
            .await;

        let _entered = span.enter();
        match result {
            Ok(report) if report.is_skipped() => counts.skipped += 1,
            Ok(report) => {
                counts.graphs_submitted += report.submitted.len();
                counts.chunks_failed += report.chunks_failed;
            }
            Err(e) => {
                counts.failed += 1;
                error!(error = %e, kind = ?e.kind(), "failed to process message");
            }
        }

        if let Err(e) = delivery.ack() {
            warn!(error = %e, "ack failed");
        }
    }
}
