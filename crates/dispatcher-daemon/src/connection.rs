use core::fmt;
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::sync::Arc;

use dispatcher::{Envelope, GatewayId, Mailbox, OpenedMailbox, Registry};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Outbound half of a live gateway tunnel.
pub trait Tunnel: Send + 'static {
    fn send(&mut self, envelope: &Envelope) -> impl Future<Output = io::Result<()>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailReason {
    /// The mailbox was retired by a reconnect of the same gateway.
    Superseded,
    /// The gateway disconnected.
    Unreachable,
    /// Writing to the tunnel failed.
    TunnelError,
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailReason::Superseded => write!(f, "superseded"),
            FailReason::Unreachable => write!(f, "unreachable"),
            FailReason::TunnelError => write!(f, "tunnel error"),
        }
    }
}

/// Receives every envelope that was accepted by the registry but could not
/// be delivered to its gateway.
pub trait Failback: Send + Sync {
    fn fail(&self, envelope: Envelope, reason: FailReason);
}

pub struct LogFailback;

impl Failback for LogFailback {
    fn fail(&self, envelope: Envelope, reason: FailReason) {
        log::warn!(
            "failback: request {} for gateway {} not delivered: {}",
            envelope.request_id,
            envelope.destination,
            reason
        );
    }
}

struct Forwarder {
    mailbox: Mailbox,
    stop: CancellationToken,
    task: JoinHandle<Option<Envelope>>,
}

type Forwarders = Arc<Mutex<HashMap<GatewayId, Forwarder>>>;

/// Drives registry lifecycle from tunnel events and pumps each gateway's
/// current mailbox into its tunnel.
pub struct ConnectionManager {
    registry: Arc<Registry>,
    failback: Arc<dyn Failback>,
    // Held across registry lifecycle calls so forwarders and registry entries
    // change together. Never taken by the submit path. Never held while
    // awaiting a forwarder task.
    forwarders: Forwarders,
}

impl ConnectionManager {
    pub fn new(registry: Arc<Registry>, failback: Arc<dyn Failback>) -> Self {
        Self {
            registry,
            failback,
            forwarders: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Opens a fresh mailbox for `gateway` and starts forwarding it into
    /// `tunnel`. A previous connection of the same gateway is stopped and its
    /// undelivered envelopes are failed back as superseded.
    ///
    /// Returns the epoch of the new mailbox.
    pub async fn connect<T: Tunnel>(&self, gateway: GatewayId, tunnel: T) -> u64 {
        let mut forwarders = self.forwarders.lock().await;

        let OpenedMailbox { mailbox, retired } = self.registry.open(gateway.clone()).await;
        let epoch = mailbox.epoch();
        let stop = CancellationToken::new();
        let task = tokio::spawn(run_forwarder(
            mailbox.clone(),
            tunnel,
            stop.clone(),
            Teardown {
                registry: self.registry.clone(),
                failback: self.failback.clone(),
                forwarders: self.forwarders.clone(),
            },
        ));
        let previous = forwarders.insert(
            gateway.clone(),
            Forwarder {
                mailbox,
                stop,
                task,
            },
        );
        drop(forwarders);

        log::info!("connection: gateway {} connected, epoch {}", gateway, epoch);

        if let Some(retired) = retired {
            let failed = match previous {
                Some(previous) => self.retire(previous, FailReason::Superseded).await,
                None => self.fail_all(&retired, FailReason::Superseded).await,
            };
            if failed > 0 {
                log::info!(
                    "connection: gateway {} epoch {} superseded, {} requests failed back",
                    gateway,
                    retired.epoch(),
                    failed
                );
            }
        }

        epoch
    }

    /// Closes the mailbox for `gateway` and fails back whatever it still
    /// holds. Returns the number of failed-back envelopes, or `None` if the
    /// gateway was not connected.
    pub async fn disconnect(&self, gateway: &str) -> Option<usize> {
        let mut forwarders = self.forwarders.lock().await;
        let retired = self.registry.close(gateway).await;
        let previous = forwarders.remove(gateway);
        drop(forwarders);

        self.finish_disconnect(gateway, retired, previous).await
    }

    /// Disconnect only if `epoch` is still the gateway's current connection.
    pub async fn disconnect_if_current(&self, gateway: &str, epoch: u64) -> Option<usize> {
        let mut forwarders = self.forwarders.lock().await;
        let retired = self.registry.close_if_current(gateway, epoch).await;
        let previous = match retired {
            Some(_) => forwarders.remove(gateway),
            None => None,
        };
        drop(forwarders);

        if retired.is_none() {
            log::debug!(
                "connection: ignoring stale disconnect of gateway {} epoch {}",
                gateway,
                epoch
            );
        }
        self.finish_disconnect(gateway, retired, previous).await
    }

    pub async fn connected(&self) -> Vec<GatewayId> {
        let mut gateways: Vec<_> = self.forwarders.lock().await.keys().cloned().collect();
        gateways.sort();
        gateways
    }

    async fn finish_disconnect(
        &self,
        gateway: &str,
        retired: Option<Mailbox>,
        previous: Option<Forwarder>,
    ) -> Option<usize> {
        let failed = match (&retired, previous) {
            (_, Some(previous)) => self.retire(previous, FailReason::Unreachable).await,
            (Some(retired), None) => self.fail_all(retired, FailReason::Unreachable).await,
            (None, None) => return None,
        };
        let retired = retired?;
        log::info!(
            "connection: gateway {} disconnected, epoch {}, {} requests failed back",
            gateway,
            retired.epoch(),
            failed
        );
        Some(failed)
    }

    // The forwarder must be gone before draining, otherwise an envelope could
    // be both forwarded and failed back.
    async fn retire(&self, forwarder: Forwarder, reason: FailReason) -> usize {
        forwarder.stop.cancel();
        let mut failed = 0;
        match forwarder.task.await {
            Ok(Some(in_flight)) => {
                self.failback.fail(in_flight, reason);
                failed += 1;
            }
            Ok(None) => {}
            Err(err) => log::error!(
                "connection: forwarder for gateway {} ended abnormally: {}",
                forwarder.mailbox.gateway(),
                err
            ),
        }
        failed + self.fail_all(&forwarder.mailbox, reason).await
    }

    async fn fail_all(&self, mailbox: &Mailbox, reason: FailReason) -> usize {
        fail_all(self.failback.as_ref(), mailbox, reason).await
    }
}

async fn fail_all(failback: &dyn Failback, mailbox: &Mailbox, reason: FailReason) -> usize {
    let drained = mailbox.drain().await;
    let count = drained.len();
    for envelope in drained {
        failback.fail(envelope, reason);
    }
    count
}

/// What a forwarder needs to take its own epoch down after a tunnel failure.
struct Teardown {
    registry: Arc<Registry>,
    failback: Arc<dyn Failback>,
    forwarders: Forwarders,
}

impl Teardown {
    /// Removes the epoch served by `mailbox` from the manager and the
    /// registry, then fails back what it still buffers. A no-op when a
    /// disconnect or reconnect already took the epoch over.
    async fn abandon(&self, mailbox: &Mailbox) {
        let gateway = mailbox.gateway();
        let mut forwarders = self.forwarders.lock().await;
        let current = forwarders
            .get(gateway)
            .is_some_and(|forwarder| forwarder.mailbox.same_mailbox(mailbox));
        if !current {
            return;
        }
        // Dropping the handle detaches this task; nothing awaits it.
        forwarders.remove(gateway);
        let retired = self
            .registry
            .close_if_current(gateway.as_str(), mailbox.epoch())
            .await;
        drop(forwarders);

        let failed = match retired {
            Some(retired) => fail_all(self.failback.as_ref(), &retired, FailReason::Unreachable).await,
            None => 0,
        };
        log::info!(
            "connection: gateway {} epoch {} dropped after tunnel failure, {} more requests failed back",
            gateway,
            mailbox.epoch(),
            failed
        );
    }
}

enum Exit {
    /// The mailbox was closed and fully consumed.
    Drained,
    /// `stop` fired, possibly while an envelope was being sent.
    Stopped(Option<Envelope>),
    /// The tunnel rejected a write.
    Broken,
}

async fn run_forwarder<T: Tunnel>(
    mailbox: Mailbox,
    tunnel: T,
    stop: CancellationToken,
    teardown: Teardown,
) -> Option<Envelope> {
    match forward(&mailbox, tunnel, &stop, teardown.failback.as_ref()).await {
        Exit::Drained => None,
        Exit::Stopped(in_flight) => in_flight,
        Exit::Broken => {
            teardown.abandon(&mailbox).await;
            None
        }
    }
}

/// Pumps `mailbox` into `tunnel` until the mailbox is closed and empty, the
/// tunnel fails, or `stop` fires.
async fn forward<T: Tunnel>(
    mailbox: &Mailbox,
    mut tunnel: T,
    stop: &CancellationToken,
    failback: &dyn Failback,
) -> Exit {
    loop {
        let envelope = tokio::select! {
            _ = stop.cancelled() => return Exit::Stopped(None),
            next = mailbox.recv() => match next {
                Some(envelope) => envelope,
                None => return Exit::Drained,
            },
        };

        let outcome = {
            let send = tunnel.send(&envelope);
            tokio::select! {
                result = send => Some(result),
                _ = stop.cancelled() => None,
            }
        };

        match outcome {
            Some(Ok(())) => log::trace!(
                "forwarder: request {} sent to gateway {}",
                envelope.request_id,
                mailbox.gateway()
            ),
            Some(Err(err)) => {
                log::warn!(
                    "forwarder: tunnel to gateway {} epoch {} failed: {}",
                    mailbox.gateway(),
                    mailbox.epoch(),
                    err
                );
                failback.fail(envelope, FailReason::TunnelError);
                return Exit::Broken;
            }
            None => return Exit::Stopped(Some(envelope)),
        }
    }
}
