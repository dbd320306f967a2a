//! # Summary
//!
//! This module abstracts over the mailboxes that back each bound endpoint.
//!
//! Currently backed by `futures::channel::mpsc` unbounded channels. A send
//! can only fail if the receiving end has been dropped, which is exactly how
//! a process that returned or crashed looks to the rest of the group, so
//! sends report failure instead of panicking.

use futures::channel::mpsc;
use futures::StreamExt;

/// Mailbox receiving channel.
#[derive(Debug)]
pub struct Rx<T>(mpsc::UnboundedReceiver<T>);

/// Mailbox transmission channel. All clones send to the same receiving end.
#[derive(Derivative)]
#[derivative(Clone(bound = ""))]
#[derive(Debug)]
pub struct Tx<T>(mpsc::UnboundedSender<T>);

/// Create a new pair of linked receiving and transmitting channels.
pub fn new<T>() -> (Rx<T>, Tx<T>) {
    let (tx, rx) = mpsc::unbounded();
    (Rx(rx), Tx(tx))
}

impl<T> Tx<T> {
    /// Attempt to send a message through the channel.
    /// Returns false if the receiving end has been dropped.
    pub fn try_send(&self, message: T) -> bool {
        self.0.unbounded_send(message).is_ok()
    }
}

impl<T> Rx<T> {
    /// Waits for the next message. Resolves to `None` once every
    /// transmitting end is gone.
    pub async fn next(&mut self) -> Option<T> {
        self.0.next().await
    }
}
