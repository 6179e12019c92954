//! Command dispatch: resolve a logical identity to a live address and run
//! one command against it.
//!
//! Each invocation moves through [`Phase`]s. A per-record async lock is held
//! from resolution until the registry write, so two dispatches against the
//! same record never interleave their status updates.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::discovery::SweepTarget;
use crate::error::{ConfigError, CoreError, DeviceError};
use crate::reconcile::{Reconciler, SweepReport};
use crate::storage::RegistryStore;
use crate::transport::Transport;
use crate::types::{
    Ack, DeviceId, DeviceRecord, DeviceStatus, DiscoveryObservation, Identity, PowerCommand,
    RecordUpdate,
};

/// Dispatch state machine: `Resolving -> {Executing -> Done | Failed} | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Resolving,
    Executing,
    Done,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Resolving => "resolving",
            Phase::Executing => "executing",
            Phase::Done => "done",
            Phase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One async mutex per record id.
#[derive(Default)]
pub struct RecordLocks {
    locks: Mutex<HashMap<DeviceId, Arc<AsyncMutex<()>>>>,
}

impl RecordLocks {
    pub async fn acquire(&self, id: DeviceId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Result of a command that reached the device.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub record: DeviceRecord,
    pub ack: Ack,
}

pub struct Dispatcher {
    store: Arc<RegistryStore>,
    transport: Arc<dyn Transport>,
    reconciler: Reconciler,
    locks: RecordLocks,
}

impl Dispatcher {
    pub fn new(store: Arc<RegistryStore>, transport: Arc<dyn Transport>) -> Self {
        Self {
            reconciler: Reconciler::new(store.clone()),
            store,
            transport,
            locks: RecordLocks::default(),
        }
    }

    /// Register `name` at `address`. This is the only path that creates rows.
    pub fn register(&self, name: &str, address: &str) -> Result<DeviceRecord, CoreError> {
        let address: IpAddr = address
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(address.to_string()))?;
        Ok(self.store.create(name.trim(), address)?)
    }

    pub fn show(&self, identity: &Identity) -> Result<DeviceRecord, CoreError> {
        Ok(self.store.resolve(identity)?)
    }

    pub fn list(&self, skip: usize, limit: usize) -> Result<Vec<DeviceRecord>, CoreError> {
        Ok(self.store.list_all(skip, limit)?)
    }

    /// Explicitly delete a record. Discovery never does this.
    pub async fn remove(&self, identity: &Identity) -> Result<DeviceRecord, CoreError> {
        let id = self.store.resolve(identity)?.id;
        let _guard = self.locks.acquire(id).await;
        Ok(self.store.delete(id)?)
    }

    /// Sweep `target` and reconcile the registry with what answered.
    pub async fn sweep(
        &self,
        target: SweepTarget,
        window: Duration,
    ) -> Result<SweepReport, CoreError> {
        self.reconciler
            .sweep(self.transport.as_ref(), target, window)
            .await
    }

    /// Resolve `identity` to a record whose address is worth sending to.
    pub async fn resolve(&self, identity: &Identity) -> Result<DeviceRecord, CoreError> {
        let id = self.store.resolve(identity)?.id;
        let _guard = self.locks.acquire(id).await;
        self.resolve_locked(id).await
    }

    /// Caller holds the record lock.
    async fn resolve_locked(&self, id: DeviceId) -> Result<DeviceRecord, CoreError> {
        let record = self.store.get_by_id(id)?;
        if record.status != DeviceStatus::Offline {
            return Ok(record);
        }

        debug!(name = %record.name, address = %record.address, "Record offline; probing last-known address");
        let obs = self
            .transport
            .probe_one(record.address)
            .await
            .map_err(|e| e.with_identity(&record.name))?;

        if let Some(expected) = &record.reported_identity {
            if *expected != obs.reported_identity {
                warn!(
                    name = %record.name,
                    address = %record.address,
                    expected = %expected,
                    found = %obs.reported_identity,
                    "A different device answers at the last-known address"
                );
                return Err(DeviceError::unreachable(
                    record.address,
                    format!(
                        "address now answers as {} (expected {})",
                        obs.reported_identity, expected
                    ),
                )
                .with_identity(&record.name)
                .into());
            }
        }

        self.reconciler.confirm(&record, &obs).await
    }

    /// Resolve `identity` and send `command`, recording the outcome.
    ///
    /// Success marks the record online. A timeout or refused connection marks
    /// it offline. Any other failure leaves its status as it was.
    pub async fn execute(
        &self,
        identity: &Identity,
        command: PowerCommand,
    ) -> Result<Outcome, CoreError> {
        debug!(%identity, %command, phase = %Phase::Resolving, "Dispatch");
        let result = self.run(identity, command).await;

        match &result {
            Ok(outcome) => {
                debug!(%identity, %command, phase = %Phase::Done, "Dispatch");
                if command.is_mutating() {
                    info!(name = %outcome.record.name, %command, relay_on = ?outcome.ack.relay_on, "Relay switched");
                } else {
                    debug!(name = %outcome.record.name, relay_on = ?outcome.ack.relay_on, "State refreshed");
                }
            }
            Err(e) => debug!(%identity, %command, phase = %Phase::Failed, error = %e, "Dispatch"),
        }
        result
    }

    async fn run(&self, identity: &Identity, command: PowerCommand) -> Result<Outcome, CoreError> {
        let id = self.store.resolve(identity)?.id;
        let _guard = self.locks.acquire(id).await;
        let record = self.resolve_locked(id).await?;

        debug!(%identity, %command, address = %record.address, phase = %Phase::Executing, "Dispatch");
        match self.transport.send_command(record.address, command).await {
            Ok(ack) => {
                let record = self.record_success(&record, &ack).await?;
                Ok(Outcome { record, ack })
            }
            Err(e) => {
                if e.is_unreachable() && record.status != DeviceStatus::Offline {
                    self.store
                        .update(id, &RecordUpdate::status(DeviceStatus::Offline))?;
                    info!(name = %record.name, "Marked offline");
                }
                Err(e.with_identity(&record.name).into())
            }
        }
    }

    async fn record_success(
        &self,
        record: &DeviceRecord,
        ack: &Ack,
    ) -> Result<DeviceRecord, CoreError> {
        let Some(hw) = &ack.reported_identity else {
            return Ok(self.store.update(
                record.id,
                &RecordUpdate {
                    last_seen: Some(Utc::now()),
                    status: Some(DeviceStatus::Online),
                    ..Default::default()
                },
            )?);
        };

        if let Some(expected) = &record.reported_identity {
            if expected != hw {
                warn!(name = %record.name, expected = %expected, found = %hw, "Acknowledged by an unexpected device");
            }
        }

        // Folding the ack in as an observation lets the reconciler learn the
        // hardware id under its ownership rules.
        let obs = DiscoveryObservation {
            address: ack.address,
            reported_identity: hw.clone(),
            timestamp: Utc::now(),
            alias: None,
            model: None,
            relay_on: ack.relay_on,
        };
        self.reconciler.confirm(record, &obs).await
    }
}
