//! Minimal mailbox runtime for run-to-completion actors
//!
//! A mailbox is a FIFO over a tokio unbounded channel. Senders hold a
//! cloneable [`MailboxAddr`]; the owning actor drains a [`Mailbox`] one
//! message at a time. `ask` pairs a message with a oneshot [`ReplyTo`], which
//! is the acknowledgement the orchestrator waits on.

use crate::MailboxError;
use tokio::sync::{mpsc, oneshot};

/// Reply slot handed to an actor along with a request
pub struct ReplyTo<T> {
    tx: oneshot::Sender<T>,
}

impl<T> ReplyTo<T> {
    /// Create a reply slot and the receiver waiting on it
    pub fn channel() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Send the reply. Returns false if the asker went away.
    pub fn reply(self, value: T) -> bool {
        self.tx.send(value).is_ok()
    }
}

impl<T> std::fmt::Debug for ReplyTo<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyTo")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

enum Envelope<M> {
    Msg(M),
    Stop,
}

/// Sending side of a mailbox
pub struct MailboxAddr<M> {
    tx: mpsc::UnboundedSender<Envelope<M>>,
    name: &'static str,
}

impl<M> Clone for MailboxAddr<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            name: self.name,
        }
    }
}

impl<M> std::fmt::Debug for MailboxAddr<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxAddr")
            .field("name", &self.name)
            .finish()
    }
}

impl<M: Send + 'static> MailboxAddr<M> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Post a message, FIFO with every other message to this mailbox
    pub fn tell(&self, msg: M) -> Result<(), MailboxError> {
        self.tx
            .send(Envelope::Msg(msg))
            .map_err(|_| MailboxError::Closed(self.name))
    }

    /// Post a request and wait for the actor's reply
    pub async fn ask<R>(&self, make: impl FnOnce(ReplyTo<R>) -> M) -> Result<R, MailboxError> {
        let (reply_to, rx) = ReplyTo::channel();
        self.tell(make(reply_to))?;
        rx.await.map_err(|_| MailboxError::NoReply(self.name))
    }

    /// Ask the actor to stop once it has drained what is already queued
    pub fn stop(&self) -> Result<(), MailboxError> {
        self.tx
            .send(Envelope::Stop)
            .map_err(|_| MailboxError::Closed(self.name))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving side of a mailbox, owned by exactly one actor
pub struct Mailbox<M> {
    rx: mpsc::UnboundedReceiver<Envelope<M>>,
}

impl<M> Mailbox<M> {
    /// Block the current (non-async) thread until the next message.
    /// `None` once a stop was requested or every sender is gone.
    pub fn blocking_next(&mut self) -> Option<M> {
        match self.rx.blocking_recv() {
            Some(Envelope::Msg(msg)) => Some(msg),
            Some(Envelope::Stop) | None => None,
        }
    }

    /// Await the next message from async code
    pub async fn next(&mut self) -> Option<M> {
        match self.rx.recv().await {
            Some(Envelope::Msg(msg)) => Some(msg),
            Some(Envelope::Stop) | None => None,
        }
    }

    /// Take a queued message without waiting
    pub fn try_next(&mut self) -> TryNext<M> {
        match self.rx.try_recv() {
            Ok(Envelope::Msg(msg)) => TryNext::Msg(msg),
            Ok(Envelope::Stop) | Err(mpsc::error::TryRecvError::Disconnected) => TryNext::Stopped,
            Err(mpsc::error::TryRecvError::Empty) => TryNext::Empty,
        }
    }
}

/// Result of a non-blocking mailbox read
#[derive(Debug)]
pub enum TryNext<M> {
    Msg(M),
    Empty,
    /// A stop was requested or every sender is gone
    Stopped,
}

impl<M> TryNext<M> {
    pub fn into_msg(self) -> Option<M> {
        match self {
            TryNext::Msg(msg) => Some(msg),
            TryNext::Empty | TryNext::Stopped => None,
        }
    }
}

/// Create a mailbox named `name` (used in logs and errors)
pub fn mailbox<M>(name: &'static str) -> (MailboxAddr<M>, Mailbox<M>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MailboxAddr { tx, name }, Mailbox { rx })
}
