//! Per-key concurrency gate.
//!
//! At most one instance per partition key (the owner) runs at a time.
//! Waiters are admitted in the order they called [`ConcurrencyGate::enqueue`];
//! different keys never wait on each other.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{WorkerError, WorkerResult};

#[derive(Debug, Default)]
struct Partition {
    /// Set while a ticket or permit holds the turn
    active: bool,
    waiters: VecDeque<oneshot::Sender<()>>,
}

type Partitions = HashMap<String, Partition>;

/// FIFO mutual exclusion per partition key.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyGate {
    partitions: Arc<Mutex<Partitions>>,
}

impl ConcurrencyGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(partitions: &Mutex<Partitions>) -> MutexGuard<'_, Partitions> {
        partitions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take a place in the queue for `key`. The position is fixed when
    /// this returns; await [`GateTicket::admitted`] to wait for the turn.
    pub fn enqueue(&self, key: &str) -> GateTicket {
        let mut partitions = Self::lock(&self.partitions);
        let partition = partitions.entry(key.to_string()).or_default();

        let state = if !partition.active {
            partition.active = true;
            TicketState::Admitted
        } else {
            let (tx, rx) = oneshot::channel();
            partition.waiters.push_back(tx);
            debug!(key, waiting = partition.waiters.len(), "Queued behind active instance");
            TicketState::Waiting(rx)
        };

        GateTicket {
            partitions: Arc::clone(&self.partitions),
            key: key.to_string(),
            state: Some(state),
        }
    }

    /// Number of keys with an admitted holder.
    pub fn active_partitions(&self) -> usize {
        Self::lock(&self.partitions).values().filter(|p| p.active).count()
    }

    /// Number of tickets waiting behind the holder of `key`.
    pub fn waiting(&self, key: &str) -> usize {
        Self::lock(&self.partitions)
            .get(key)
            .map(|p| p.waiters.len())
            .unwrap_or(0)
    }

    /// Whether `key` currently has an admitted holder.
    pub fn is_active(&self, key: &str) -> bool {
        Self::lock(&self.partitions)
            .get(key)
            .map(|p| p.active)
            .unwrap_or(false)
    }
}

/// Hand the turn for `key` to the next live waiter, or free the key.
fn release(partitions: &Mutex<Partitions>, key: &str) {
    let mut partitions = ConcurrencyGate::lock(partitions);
    let Some(partition) = partitions.get_mut(key) else {
        return;
    };

    while let Some(next) = partition.waiters.pop_front() {
        // A closed receiver belongs to a ticket dropped before its turn.
        if next.send(()).is_ok() {
            return;
        }
    }

    partitions.remove(key);
}

#[derive(Debug)]
enum TicketState {
    Admitted,
    Waiting(oneshot::Receiver<()>),
}

/// A place in a partition's queue.
///
/// Dropping a ticket gives up its place; if the turn had already reached
/// it, the turn passes on.
#[derive(Debug)]
pub struct GateTicket {
    partitions: Arc<Mutex<Partitions>>,
    key: String,
    state: Option<TicketState>,
}

impl GateTicket {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether the turn has already been granted.
    pub fn is_admitted(&self) -> bool {
        matches!(self.state, Some(TicketState::Admitted))
    }

    /// Wait for the turn. Cancel-safe: dropping the future releases the
    /// place like dropping the ticket.
    pub async fn admitted(mut self) -> WorkerResult<GatePermit> {
        if let Some(TicketState::Waiting(rx)) = self.state.as_mut() {
            if rx.await.is_err() {
                self.state = None;
                return Err(WorkerError::GateClosed(self.key.clone()));
            }
        }

        self.state = None;
        Ok(GatePermit {
            partitions: Arc::clone(&self.partitions),
            key: std::mem::take(&mut self.key),
        })
    }
}

impl Drop for GateTicket {
    fn drop(&mut self) {
        match self.state.take() {
            Some(TicketState::Admitted) => release(&self.partitions, &self.key),
            Some(TicketState::Waiting(mut rx)) => {
                rx.close();
                if rx.try_recv().is_ok() {
                    release(&self.partitions, &self.key);
                }
            }
            None => {}
        }
    }
}

/// Exclusive turn for one partition key, released on drop.
#[derive(Debug)]
pub struct GatePermit {
    partitions: Arc<Mutex<Partitions>>,
    key: String,
}

impl GatePermit {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        release(&self.partitions, &self.key);
    }
}
