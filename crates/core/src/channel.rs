//! The per-session Output Channel.
//!
//! Producers enqueue `OutboundEvent`s through an `EventSink`; a single drain loop reads them
//! back through `OutputReceiver` in enqueue order. Every job sink is stamped with the epoch
//! that was current when it was created. Starting a new job advances the epoch, and the
//! receiver silently drops job events stamped with an older one, which discards whatever a
//! superseded job left in the queue. Session-level events are never stale.

use crate::events::OutboundEvent;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

enum Envelope {
    Event {
        epoch: Option<u64>,
        event: OutboundEvent,
    },
    Close,
}

/// Producer side of the Output Channel, owned by the Session Controller.
pub struct OutputChannel {
    tx: mpsc::UnboundedSender<Envelope>,
    epoch: Arc<AtomicU64>,
    closed: bool,
}

/// Consumer side of the Output Channel, owned by the drain loop.
pub struct OutputReceiver {
    rx: mpsc::UnboundedReceiver<Envelope>,
    epoch: Arc<AtomicU64>,
}

/// A cloneable handle used by stages to emit events.
///
/// A sink bound to a job stops emitting as soon as the job is cancelled.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<Envelope>,
    epoch: Option<u64>,
    cancel: Option<CancellationToken>,
}

impl OutputChannel {
    pub fn new() -> (Self, OutputReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let epoch = Arc::new(AtomicU64::new(0));
        (
            Self {
                tx,
                epoch: epoch.clone(),
                closed: false,
            },
            OutputReceiver { rx, epoch },
        )
    }

    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Invalidates everything enqueued so far that has not been consumed yet.
    pub fn advance_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// A sink for session-level events (acknowledgements, rejections, the final `done`).
    pub fn session_sink(&self) -> EventSink {
        EventSink {
            tx: self.tx.clone(),
            epoch: None,
            cancel: None,
        }
    }

    /// A sink for one job; it goes quiet once `cancel` fires.
    pub fn job_sink(&self, cancel: CancellationToken) -> EventSink {
        EventSink {
            tx: self.tx.clone(),
            epoch: Some(self.current_epoch()),
            cancel: Some(cancel),
        }
    }

    pub fn emit(&self, event: OutboundEvent) {
        self.session_sink().emit(event);
    }

    /// Ends the stream for the drain loop once everything enqueued before it is consumed.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.tx.send(Envelope::Close);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl EventSink {
    /// Enqueues an event. Returns `false` if it was suppressed or the drain loop is gone.
    pub fn emit(&self, event: OutboundEvent) -> bool {
        if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            tracing::trace!("Suppressed {} event from cancelled job", event.kind());
            return false;
        }
        self.tx
            .send(Envelope::Event {
                epoch: self.epoch,
                event,
            })
            .is_ok()
    }
}

impl OutputReceiver {
    /// Waits for the next live event. Returns `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<OutboundEvent> {
        loop {
            match self.rx.recv().await? {
                Envelope::Close => return None,
                Envelope::Event { epoch, event } => {
                    if epoch.is_none_or(|e| e == self.epoch.load(Ordering::SeqCst)) {
                        return Some(event);
                    }
                    tracing::debug!("Discarding stale {} event", event.kind());
                }
            }
        }
    }
}
