//! Pairing event stream handed to the caller of Connect.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::remote::{RemotePairingEvent, RemotePairingStream};
use crate::store::Credentials;

/// Events observed while pairing a new device.
///
/// At most one of `Success`, `Timeout` or `Closed` is delivered, and it is
/// always the last event. A cancelled pairing (Disconnect or Reset) ends the
/// stream without a terminal event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "value", rename_all = "snake_case")]
pub enum PairingEvent {
    /// A pairing code to render; supersedes any earlier code.
    Code(String),
    /// Pairing completed for this identity; the session is now connected.
    Success(String),
    /// No pairing happened before the deadline.
    Timeout,
    /// The remote ended the pairing without an outcome.
    Closed,
}

impl PairingEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Code(_))
    }
}

/// Finite stream of [`PairingEvent`]s for one pairing attempt.
pub struct PairingStream {
    inner: UnboundedReceiverStream<PairingEvent>,
}

impl PairingStream {
    pub(crate) fn channel() -> (mpsc::UnboundedSender<PairingEvent>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Self {
                inner: UnboundedReceiverStream::new(rx),
            },
        )
    }

    /// Receive the next event, or `None` once the attempt is over.
    pub async fn next_event(&mut self) -> Option<PairingEvent> {
        self.inner.next().await
    }
}

impl Stream for PairingStream {
    type Item = PairingEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl std::fmt::Debug for PairingStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingStream").finish_non_exhaustive()
    }
}

/// How a pairing driver stopped.
#[derive(Debug)]
pub(crate) enum PairingExit {
    Paired(Credentials),
    TimedOut,
    Closed,
    Cancelled,
}

/// Consume the raw pairing stream until it reaches an outcome.
///
/// Codes are forwarded to `events` as they arrive and each one pushes the
/// deadline `timeout` into the future. Terminal events are not forwarded;
/// the caller decides whether the outcome still applies.
pub(crate) async fn drive(
    mut raw: RemotePairingStream,
    events: &mpsc::UnboundedSender<PairingEvent>,
    mut cancel: oneshot::Receiver<()>,
    timeout: Duration,
) -> PairingExit {
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            biased;

            _ = &mut cancel => return PairingExit::Cancelled,

            _ = &mut deadline => return PairingExit::TimedOut,

            event = raw.next() => match event {
                Some(RemotePairingEvent::Code(code)) => {
                    deadline.as_mut().reset(Instant::now() + timeout);
                    tracing::debug!("Pairing code issued");
                    // The consumer may have gone away; pairing still completes.
                    let _ = events.send(PairingEvent::Code(code));
                }
                Some(RemotePairingEvent::Success(credentials)) => {
                    return PairingExit::Paired(credentials);
                }
                Some(RemotePairingEvent::Timeout) => return PairingExit::TimedOut,
                None => return PairingExit::Closed,
            },
        }
    }
}
