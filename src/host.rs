//! Event host loop
//!
//! Runs one task per incoming event until the event stream ends or the
//! shutdown signal fires. On shutdown the stream is dropped, so no new
//! events are accepted, and every task already running is awaited. An
//! invocation that has resumed a wait token therefore still replies, and
//! a final hangup still reaches queue teardown.

use futures::{Stream, StreamExt};
use std::future::Future;
use tokio::task::JoinSet;

/// Counters from one serving run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeSummary {
    /// Events accepted from the stream
    pub accepted: usize,
    /// Tasks still running at shutdown and awaited before returning
    pub drained: usize,
}

/// Serve `events` with `handler` until the stream ends or `shutdown` resolves
///
/// Each event is handled in its own task, so different calls proceed in
/// parallel. Returns once every accepted event has been handled.
pub async fn serve_until<S, F, H, Fut>(events: S, shutdown: F, handler: H) -> ServeSummary
where
    S: Stream,
    S::Item: Send + 'static,
    F: Future<Output = ()>,
    H: Fn(S::Item) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut events = Box::pin(events);
    let mut shutdown = std::pin::pin!(shutdown);
    let mut tasks = JoinSet::new();
    let mut summary = ServeSummary::default();

    loop {
        tokio::select! {
            event = events.next() => {
                let Some(event) = event else {
                    tracing::warn!("Event stream closed");
                    break;
                };
                summary.accepted += 1;
                tasks.spawn(handler(event));
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Event task failed");
                }
            }
            _ = &mut shutdown => {
                tracing::info!(in_flight = tasks.len(), "Shutting down, draining in-flight events");
                break;
            }
        }
    }

    drop(events);

    summary.drained = tasks.len();
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "Event task failed");
        }
    }
    tracing::info!(
        accepted = summary.accepted,
        drained = summary.drained,
        "Event host stopped"
    );
    summary
}
