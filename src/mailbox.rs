use core::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, Mutex};

use crate::envelope::{Envelope, GatewayId};

/// Bounded FIFO of envelopes for one connection epoch of one gateway.
///
/// The handle is cheap to clone; all clones share the same buffer. The
/// sending side is owned by the [`Registry`](crate::registry::Registry) and
/// is dropped when the mailbox is retired, after which `recv` yields the
/// remaining buffered envelopes and then `None`.
///
/// A mailbox has a single reader role. `recv` holds the receiver for as long
/// as it waits; the other accessors never wait behind it.
#[derive(Clone)]
pub struct Mailbox {
    shared: Arc<Shared>,
}

struct Shared {
    gateway: GatewayId,
    epoch: u64,
    capacity: usize,
    closed: AtomicBool,
    // Never used to send. Upgrading fails once the registry drops its sender.
    sender: mpsc::WeakSender<Envelope>,
    receiver: Mutex<mpsc::Receiver<Envelope>>,
}

impl Mailbox {
    pub(crate) fn channel(
        gateway: GatewayId,
        epoch: u64,
        capacity: usize,
    ) -> (mpsc::Sender<Envelope>, Self) {
        let (sender, receiver) = mpsc::channel(capacity);
        let mailbox = Self {
            shared: Arc::new(Shared {
                gateway,
                epoch,
                capacity,
                closed: AtomicBool::new(false),
                sender: sender.downgrade(),
                receiver: Mutex::new(receiver),
            }),
        };
        (sender, mailbox)
    }

    pub fn gateway(&self) -> &GatewayId {
        &self.shared.gateway
    }

    /// Registry-unique number of the connection epoch this mailbox serves.
    pub fn epoch(&self) -> u64 {
        self.shared.epoch
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    // Must only be called by the registry after the sender has been dropped.
    pub(crate) fn mark_closed(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }

    /// Waits for the next envelope. Returns `None` once the mailbox is closed
    /// and its buffer is empty.
    ///
    /// Cancel-safe: dropping the future before it completes loses nothing.
    pub async fn recv(&self) -> Option<Envelope> {
        self.shared.receiver.lock().await.recv().await
    }

    /// Takes the next buffered envelope without waiting. Returns `None` when
    /// the buffer is empty or another reader currently holds the mailbox.
    pub fn try_recv(&self) -> Option<Envelope> {
        let mut receiver = self.shared.receiver.try_lock().ok()?;
        match receiver.try_recv() {
            Ok(envelope) => Some(envelope),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Removes and returns everything currently buffered, oldest first.
    ///
    /// On a closed mailbox this waits for any in-progress `recv` to finish,
    /// which cannot park once the sender is gone, and returns the whole
    /// buffer. On an open mailbox whose reader is parked it returns nothing
    /// instead of waiting.
    pub async fn drain(&self) -> Vec<Envelope> {
        let mut receiver = if self.shared.sender.upgrade().is_none() {
            self.shared.receiver.lock().await
        } else {
            match self.shared.receiver.try_lock() {
                Ok(receiver) => receiver,
                Err(_) => return Vec::new(),
            }
        };
        let mut drained = Vec::with_capacity(receiver.len());
        while let Ok(envelope) = receiver.try_recv() {
            drained.push(envelope);
        }
        drained
    }

    /// Number of envelopes currently buffered.
    pub async fn len(&self) -> usize {
        match self.shared.sender.upgrade() {
            Some(sender) => sender.max_capacity() - sender.capacity(),
            None => self.shared.receiver.lock().await.len(),
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn same_mailbox(&self, other: &Mailbox) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("gateway", &self.shared.gateway)
            .field("epoch", &self.shared.epoch)
            .field("capacity", &self.shared.capacity)
            .field("closed", &self.is_closed())
            .finish()
    }
}
