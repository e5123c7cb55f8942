// ── Reactive update streams ──
//
// Subscription types for consuming poll cycle outcomes from a
// coordinator.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::coordinator::UpdateOutcome;

/// A subscription to a coordinator's poll cycle outcomes.
///
/// Provides point-in-time access and reactive change notification via
/// [`changed`](Self::changed) or by converting to a `Stream`.
pub struct UpdateStream {
    current: UpdateOutcome,
    receiver: watch::Receiver<UpdateOutcome>,
}

impl UpdateStream {
    pub(crate) fn new(receiver: watch::Receiver<UpdateOutcome>) -> Self {
        let current = *receiver.borrow();
        Self { current, receiver }
    }

    /// The outcome captured at subscription time.
    pub fn current(&self) -> UpdateOutcome {
        self.current
    }

    /// The latest outcome (may have changed since subscription).
    pub fn latest(&self) -> UpdateOutcome {
        *self.receiver.borrow()
    }

    /// Wait for the next completed cycle, returning its outcome.
    /// Returns `None` once the coordinator is gone.
    pub async fn changed(&mut self) -> Option<UpdateOutcome> {
        self.receiver.changed().await.ok()?;
        let outcome = *self.receiver.borrow_and_update();
        self.current = outcome;
        Some(outcome)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> UpdateWatchStream {
        UpdateWatchStream { inner: WatchStream::new(self.receiver) }
    }
}

/// `Stream` adapter backed by the coordinator's outcome watch channel.
pub struct UpdateWatchStream {
    inner: WatchStream<UpdateOutcome>,
}

impl Stream for UpdateWatchStream {
    type Item = UpdateOutcome;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // WatchStream is Unpin for Unpin items; UpdateOutcome is Copy.
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
