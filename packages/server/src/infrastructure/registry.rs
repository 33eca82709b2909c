//! Connection registry.
//!
//! Maps each authenticated user to the mailbox of its single live session.
//! All access goes through the registry's operations; the map itself is never
//! exposed. No operation awaits network I/O while holding the lock: enqueueing
//! is `try_send` and closing a mailbox only cancels a token.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::domain::UserId;

/// Serialized outbound frame, shared between fanout targets
pub type Frame = Arc<str>;

/// Result of a non-blocking enqueue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Frame queued
    Accepted,
    /// Mailbox at capacity
    Full,
    /// Mailbox closed or its session gone
    Closed,
}

/// Result of delivering a frame to a locally registered user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Frame queued to the user's session
    Delivered,
    /// Mailbox was full; the session has been evicted and closed
    Evicted,
    /// No live local session for the user
    Offline,
}

/// Sending half of a session's bounded outbound queue
#[derive(Debug, Clone)]
pub struct Mailbox {
    sender: mpsc::Sender<Frame>,
    closed: CancellationToken,
}

/// Receiving half, owned by the session's outbound worker
#[derive(Debug)]
pub struct MailboxReceiver {
    receiver: mpsc::Receiver<Frame>,
    closed: CancellationToken,
}

impl Mailbox {
    /// Create a mailbox holding at most `capacity` frames.
    pub fn channel(capacity: usize) -> (Mailbox, MailboxReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let closed = CancellationToken::new();
        (
            Mailbox {
                sender,
                closed: closed.clone(),
            },
            MailboxReceiver { receiver, closed },
        )
    }

    /// Enqueue without waiting.
    pub fn offer(&self, frame: Frame) -> Offer {
        if self.closed.is_cancelled() {
            return Offer::Closed;
        }
        match self.sender.try_send(frame) {
            Ok(()) => Offer::Accepted,
            Err(mpsc::error::TrySendError::Full(_)) => Offer::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => Offer::Closed,
        }
    }

    /// Enqueue, waiting for capacity until the mailbox is closed.
    ///
    /// Never returns [`Offer::Full`]. Live fanout must use [`Self::offer`].
    pub async fn send(&self, frame: Frame) -> Offer {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Offer::Closed,
            sent = self.sender.send(frame) => match sent {
                Ok(()) => Offer::Accepted,
                Err(_) => Offer::Closed,
            },
        }
    }

    /// Signal the outbound worker to flush and close. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.sender.is_closed()
    }

    /// Whether both handles refer to the same underlying queue.
    pub fn same_mailbox(&self, other: &Mailbox) -> bool {
        self.sender.same_channel(&other.sender)
    }
}

impl MailboxReceiver {
    /// Next queued frame. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.receiver.recv().await
    }

    /// Next frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.receiver.try_recv().ok()
    }

    /// Resolves when the mailbox has been closed.
    ///
    /// The future does not borrow the receiver, so it can be raced against
    /// [`Self::recv`].
    pub fn closed(&self) -> WaitForCancellationFutureOwned {
        self.closed.clone().cancelled_owned()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

/// Process-local registry of live sessions
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: Mutex<HashMap<UserId, Mailbox>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `mailbox` as the live session of `user`.
    ///
    /// A previous session for the same user is closed before the new entry is
    /// installed (last connection wins).
    ///
    /// # Returns
    ///
    /// `true` if an older session was evicted
    pub async fn register(&self, user: UserId, mailbox: Mailbox) -> bool {
        let mut sessions = self.sessions.lock().await;
        let evicted = match sessions.remove(&user) {
            Some(previous) if !previous.same_mailbox(&mailbox) => {
                previous.close();
                true
            }
            _ => false,
        };
        sessions.insert(user, mailbox);
        if evicted {
            tracing::info!(user_id = %user, "Evicted previous session");
        }
        evicted
    }

    /// Remove the entry for `user` only if it still points at `mailbox`.
    ///
    /// # Returns
    ///
    /// `true` if the entry was removed
    pub async fn unregister(&self, user: UserId, mailbox: &Mailbox) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(&user) {
            Some(current) if current.same_mailbox(mailbox) => {
                sessions.remove(&user);
                true
            }
            _ => false,
        }
    }

    /// Mailbox of the live session for `user`, if any.
    pub async fn lookup(&self, user: UserId) -> Option<Mailbox> {
        let sessions = self.sessions.lock().await;
        sessions.get(&user).cloned()
    }

    /// Number of locally connected users.
    pub async fn count(&self) -> usize {
        let sessions = self.sessions.lock().await;
        sessions.len()
    }

    /// Enqueue `frame` for `user`, evicting the session if its mailbox is full.
    pub async fn deliver(&self, user: UserId, frame: Frame) -> Delivery {
        let mut sessions = self.sessions.lock().await;
        let Some(mailbox) = sessions.get(&user) else {
            return Delivery::Offline;
        };

        match mailbox.offer(frame) {
            Offer::Accepted => Delivery::Delivered,
            Offer::Full => {
                if let Some(mailbox) = sessions.remove(&user) {
                    mailbox.close();
                }
                tracing::warn!(user_id = %user, "Mailbox full, evicting slow session");
                Delivery::Evicted
            }
            Offer::Closed => {
                // session is shutting down; drop the stale entry
                sessions.remove(&user);
                Delivery::Offline
            }
        }
    }
}
