use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tokio::time::timeout;

use crate::config::RegistryConfig;
use crate::envelope::{Envelope, GatewayId};
use crate::error::DispatchError;
use crate::mailbox::Mailbox;

/// Result of [`Registry::open`]: the mailbox to forward from, and the
/// mailbox it replaced, if any, already closed and waiting to be drained.
#[derive(Debug)]
pub struct OpenedMailbox {
    pub mailbox: Mailbox,
    pub retired: Option<Mailbox>,
}

struct Entry {
    sender: mpsc::Sender<Envelope>,
    mailbox: Mailbox,
}

impl Entry {
    fn retire(self) -> Mailbox {
        let Entry { sender, mailbox } = self;
        // The registry holds the only sender, so this closes the channel.
        drop(sender);
        mailbox.mark_closed();
        mailbox
    }
}

/// Owns the current mailbox of every gateway connected to this process.
///
/// A single reader/writer lock guards the mapping. `submit` holds the shared
/// side from lookup until its envelope is delivered or its wait times out;
/// `open` and `close` take the exclusive side. A mailbox is therefore never
/// retired while a submission that found it is still in flight, and a
/// submission can only ever reach a mailbox that is still current.
///
/// The lock is fair: once `open` or `close` is waiting, later submissions
/// queue behind it. A submission waiting out its timeout delays lifecycle
/// operations for every gateway until it resolves.
pub struct Registry {
    entries: RwLock<HashMap<GatewayId, Entry>>,
    capacity: usize,
    submit_timeout: Duration,
    next_epoch: AtomicU64,
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Self {
        let capacity = if config.capacity == 0 {
            log::warn!("registry: mailbox capacity 0 is not supported, using 1");
            1
        } else {
            config.capacity
        };

        Self {
            entries: RwLock::new(HashMap::new()),
            capacity,
            submit_timeout: config.submit_timeout,
            next_epoch: AtomicU64::new(1),
        }
    }

    pub fn with_capacity(capacity: usize, submit_timeout: Duration) -> Self {
        Self::new(RegistryConfig::new(capacity, submit_timeout))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn submit_timeout(&self) -> Duration {
        self.submit_timeout
    }

    /// Installs a fresh mailbox for `gateway`. A mailbox already installed
    /// for it is closed in the same step and handed back for draining.
    pub async fn open(&self, gateway: GatewayId) -> OpenedMailbox {
        let mut entries = self.entries.write().await;

        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
        let (sender, mailbox) = Mailbox::channel(gateway.clone(), epoch, self.capacity);
        let entry = Entry {
            sender,
            mailbox: mailbox.clone(),
        };

        let retired = entries.insert(gateway, entry).map(Entry::retire);
        match &retired {
            Some(old) => log::debug!(
                "registry: gateway {} reopened, epoch {} retired by {}",
                mailbox.gateway(),
                old.epoch(),
                epoch
            ),
            None => log::debug!("registry: gateway {} opened, epoch {}", mailbox.gateway(), epoch),
        }

        OpenedMailbox { mailbox, retired }
    }

    /// Closes and removes the mailbox for `gateway`. Absence is not an error.
    pub async fn close(&self, gateway: &str) -> Option<Mailbox> {
        let mut entries = self.entries.write().await;
        let retired = entries.remove(gateway).map(Entry::retire);
        if let Some(mailbox) = &retired {
            log::debug!("registry: gateway {} closed, epoch {}", gateway, mailbox.epoch());
        }
        retired
    }

    /// Like [`Registry::close`], but only if the current mailbox still belongs
    /// to `epoch`. Lets the owner of a stale connection tear down without
    /// touching the connection that replaced it.
    pub async fn close_if_current(&self, gateway: &str, epoch: u64) -> Option<Mailbox> {
        let mut entries = self.entries.write().await;
        match entries.get(gateway) {
            Some(entry) if entry.mailbox.epoch() == epoch => {}
            _ => return None,
        }
        let retired = entries.remove(gateway).map(Entry::retire);
        log::debug!("registry: gateway {} closed, epoch {}", gateway, epoch);
        retired
    }

    /// Queues `envelope` on its destination's current mailbox, waiting up to
    /// the submit timeout for space.
    pub async fn submit(&self, envelope: Envelope) -> Result<(), DispatchError> {
        envelope.validate()?;

        let entries = self.entries.read().await;
        let Some(entry) = entries.get(envelope.destination.as_str()) else {
            return Err(DispatchError::NotFound {
                gateway: envelope.destination,
            });
        };

        let request_id = envelope.request_id;
        let envelope = match entry.sender.try_send(envelope) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Full(envelope)) => envelope,
            Err(TrySendError::Closed(_)) => return Err(Self::orphaned(entry)),
        };

        match timeout(self.submit_timeout, entry.sender.send(envelope)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(Self::orphaned(entry)),
            Err(_) => {
                log::warn!(
                    "registry: mailbox for gateway {} full, dropping request {} after {:?}",
                    entry.mailbox.gateway(),
                    request_id,
                    self.submit_timeout
                );
                Err(DispatchError::Backpressure {
                    gateway: entry.mailbox.gateway().to_string(),
                    request_id,
                    waited: self.submit_timeout,
                })
            }
        }
    }

    // The registry keeps a receiver handle alive for every installed entry,
    // so an installed channel cannot report closed.
    fn orphaned(entry: &Entry) -> DispatchError {
        log::error!(
            "registry: installed mailbox for gateway {} epoch {} has no receiver",
            entry.mailbox.gateway(),
            entry.mailbox.epoch()
        );
        DispatchError::NotFound {
            gateway: entry.mailbox.gateway().to_string(),
        }
    }

    pub async fn contains(&self, gateway: &str) -> bool {
        self.entries.read().await.contains_key(gateway)
    }

    /// Current mailbox of `gateway`, if connected.
    pub async fn mailbox(&self, gateway: &str) -> Option<Mailbox> {
        self.entries
            .read()
            .await
            .get(gateway)
            .map(|entry| entry.mailbox.clone())
    }

    pub async fn gateways(&self) -> Vec<GatewayId> {
        let mut gateways: Vec<_> = self.entries.read().await.keys().cloned().collect();
        gateways.sort();
        gateways
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}
