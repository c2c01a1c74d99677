//! Outbound notifications.
//!
//! Components report what happened on the wire through a [`Notifier`].
//! Consumers either register a callback with [`Notifier::subscribe`] or take
//! a [`std::sync::mpsc::Receiver`] from [`Notifier::channel`]. Delivery is
//! synchronous and in emission order, so an error event is always observed
//! before the failing call returns.

use std::fmt;
use std::sync::{mpsc, Mutex, PoisonError, RwLock};

use tracing::{trace, warn};

/// Classification of reported errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Socket failures, timeouts and malformed datagrams.
    Network,
    /// Header mismatches, truncation, size limits and target info codes.
    Protocol,
    /// Misuse by the caller.
    Logic,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Network => "network error",
            Self::Protocol => "protocol error",
            Self::Logic => "logic error",
        })
    }
}

/// A notification emitted by the packet validator or the target session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// An operation failed.
    Error {
        message: String,
        category: ErrorCategory,
    },
    /// The target did not answer (or answered with something unusable).
    NoResponse(String),
    /// A status exchange succeeded; the target is online.
    StatusOk,
    /// Words read back by one transaction.
    SuccessfulRead(usize),
    /// Words written by one transaction.
    SuccessfulWrite(usize),
}

type Listener = Box<dyn Fn(&Event) + Send + Sync>;

/// Fan-out point for [`Event`]s.
#[derive(Default)]
pub struct Notifier {
    listeners: RwLock<Vec<Listener>>,
    channels: Mutex<Vec<mpsc::Sender<Event>>>,
}

impl Notifier {
    /// Create a notifier with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked for every event.
    ///
    /// Callbacks run on the emitting thread and must not subscribe from
    /// inside the callback.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(listener));
    }

    /// Open a channel receiving a copy of every subsequent event.
    pub fn channel(&self) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel();
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Deliver an event to every listener and open channel.
    pub fn emit(&self, event: Event) {
        match &event {
            Event::Error { message, category } => {
                warn!(category = %category, "{message}");
            }
            Event::NoResponse(message) => warn!("no response: {message}"),
            other => trace!(event = ?other, "notify"),
        }

        for listener in self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            listener(&event);
        }

        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Emit an [`Event::Error`].
    pub fn error(&self, message: impl Into<String>, category: ErrorCategory) {
        self.emit(Event::Error {
            message: message.into(),
            category,
        });
    }

    /// Number of registered callbacks and open channels.
    pub fn subscriber_count(&self) -> usize {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        let channels = self
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        listeners + channels
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
