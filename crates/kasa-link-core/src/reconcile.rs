//! Reconciliation of live discovery results with the persisted registry.
//!
//! [`plan`] is a pure function from (registry snapshot, observations) to the
//! minimal set of registry mutations. [`Reconciler`] runs probes, applies
//! plans one pass at a time, and offers the single-record path used by the
//! dispatcher.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::discovery::SweepTarget;
use crate::error::CoreError;
use crate::storage::RegistryStore;
use crate::transport::Transport;
use crate::types::{DeviceId, DeviceRecord, DeviceStatus, DiscoveryObservation, RecordUpdate};

/// How an observation was tied to a registry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// Hardware id recorded on the record.
    Identity,
    /// Record had no hardware id yet; matched on its last-known address.
    Address,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObservedUpdate {
    pub id: DeviceId,
    pub matched_by: MatchKind,
    pub update: RecordUpdate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OfflineTransition {
    pub id: DeviceId,
    pub name: String,
}

/// Two replies claiming one hardware id from different addresses.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateResponder {
    pub reported_identity: String,
    pub kept: IpAddr,
    pub discarded: IpAddr,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    pub updates: Vec<ObservedUpdate>,
    pub offline: Vec<OfflineTransition>,
    pub unregistered: Vec<DiscoveryObservation>,
    pub anomalies: Vec<DuplicateResponder>,
}

/// Outcome of a sweep, as shown to the user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub target: String,
    pub observed: usize,
    pub updated: Vec<DeviceRecord>,
    pub unregistered: Vec<DiscoveryObservation>,
    pub offline: Vec<DeviceRecord>,
    pub anomalies: Vec<DuplicateResponder>,
}

/// Minimal update bringing `record` in line with `obs`.
///
/// Always refreshes `last_seen`; every other field is only written when it
/// differs, so repeated identical observations change nothing else.
pub fn observed_update(record: &DeviceRecord, obs: &DiscoveryObservation) -> RecordUpdate {
    RecordUpdate {
        address: (record.address != obs.address).then_some(obs.address),
        last_seen: Some(obs.timestamp),
        status: (record.status != DeviceStatus::Online).then_some(DeviceStatus::Online),
        reported_identity: record
            .reported_identity
            .is_none()
            .then(|| obs.reported_identity.clone()),
        model: match (&record.model, &obs.model) {
            (current, Some(seen)) if current.as_ref() != Some(seen) => Some(seen.clone()),
            _ => None,
        },
    }
}

/// Keep one observation per hardware id: the latest timestamp wins, equal
/// timestamps fall back to the higher address so the result does not depend
/// on arrival order.
fn dedupe(
    observations: Vec<DiscoveryObservation>,
) -> (BTreeMap<String, DiscoveryObservation>, Vec<DuplicateResponder>) {
    let mut latest: BTreeMap<String, DiscoveryObservation> = BTreeMap::new();
    let mut anomalies = Vec::new();

    for obs in observations {
        let Some(existing) = latest.get(&obs.reported_identity) else {
            latest.insert(obs.reported_identity.clone(), obs);
            continue;
        };

        if existing.address == obs.address {
            if obs.timestamp > existing.timestamp {
                latest.insert(obs.reported_identity.clone(), obs);
            }
            continue;
        }

        let newer = (obs.timestamp, obs.address) > (existing.timestamp, existing.address);
        let (kept, discarded) = if newer {
            (obs.address, existing.address)
        } else {
            (existing.address, obs.address)
        };
        anomalies.push(DuplicateResponder {
            reported_identity: obs.reported_identity.clone(),
            kept,
            discarded,
        });
        if newer {
            latest.insert(obs.reported_identity.clone(), obs);
        }
    }

    anomalies.sort_by(|a, b| {
        (&a.reported_identity, a.kept, a.discarded).cmp(&(&b.reported_identity, b.kept, b.discarded))
    });
    (latest, anomalies)
}

/// Compute the registry mutations for one batch of observations.
///
/// `swept` is the target of a completed sweep: unobserved records inside it
/// transition to offline. Records outside it, or every record when `swept`
/// is `None`, keep their status. Unmatched observations are reported, never
/// inserted.
pub fn plan(
    snapshot: &[DeviceRecord],
    observations: Vec<DiscoveryObservation>,
    swept: Option<SweepTarget>,
) -> ReconcilePlan {
    let (latest, anomalies) = dedupe(observations);

    let by_identity: HashMap<&str, &DeviceRecord> = snapshot
        .iter()
        .filter_map(|r| r.reported_identity.as_deref().map(|hw| (hw, r)))
        .collect();

    let mut by_address: HashMap<IpAddr, Vec<&DeviceRecord>> = HashMap::new();
    for record in snapshot.iter().filter(|r| r.reported_identity.is_none()) {
        by_address.entry(record.address).or_default().push(record);
    }

    let mut claimed: HashSet<DeviceId> = HashSet::new();
    let mut updates = Vec::new();
    let mut unregistered = Vec::new();

    for (hw, obs) in latest {
        let matched = match by_identity.get(hw.as_str()) {
            Some(record) => Some((*record, MatchKind::Identity)),
            None => match by_address.get(&obs.address).map(Vec::as_slice) {
                Some([record]) if !claimed.contains(&record.id) => {
                    Some((*record, MatchKind::Address))
                }
                Some([_, _, ..]) => {
                    warn!(address = %obs.address, "Several unbound records share this address; not guessing");
                    None
                }
                _ => None,
            },
        };

        match matched {
            Some((record, matched_by)) => {
                claimed.insert(record.id);
                updates.push(ObservedUpdate {
                    id: record.id,
                    matched_by,
                    update: observed_update(record, &obs),
                });
            }
            None => unregistered.push(obs),
        }
    }

    let offline = match swept {
        Some(target) => snapshot
            .iter()
            .filter(|r| !claimed.contains(&r.id) && r.status != DeviceStatus::Offline)
            .filter(|r| target.covers(r.address))
            .map(|r| OfflineTransition {
                id: r.id,
                name: r.name.clone(),
            })
            .collect(),
        None => Vec::new(),
    };

    updates.sort_by_key(|u| u.id);
    unregistered.sort_by(|a, b| a.address.cmp(&b.address));

    ReconcilePlan {
        updates,
        offline,
        unregistered,
        anomalies,
    }
}

/// Applies plans to the registry, one pass at a time.
pub struct Reconciler {
    store: Arc<RegistryStore>,
    pass_lock: Mutex<()>,
}

impl Reconciler {
    pub fn new(store: Arc<RegistryStore>) -> Self {
        Self {
            store,
            pass_lock: Mutex::new(()),
        }
    }

    /// Probe `target` for at most `window`, then reconcile what answered.
    ///
    /// Probes still running at the deadline are abandoned. A local failure,
    /// before or during the sweep, aborts it without touching the registry.
    pub async fn sweep(
        &self,
        transport: &dyn Transport,
        target: SweepTarget,
        window: Duration,
    ) -> Result<SweepReport, CoreError> {
        let deadline = Instant::now() + window;
        let mut stream = transport.probe_subnet(target, window).await?;

        let mut observations = Vec::new();
        while let Ok(Some(item)) = timeout_at(deadline, stream.next()).await {
            match item {
                Ok(obs) => {
                    debug!(address = %obs.address, identity = %obs.reported_identity, "Observed device");
                    observations.push(obs);
                }
                Err(e) => {
                    warn!(%target, error = %e, "Sweep aborted; registry left unchanged");
                    return Err(e.into());
                }
            }
        }
        drop(stream);

        let mut report = self.reconcile(observations, Some(target)).await?;
        report.target = target.to_string();
        Ok(report)
    }

    /// Apply one batch of observations as a single pass.
    pub async fn reconcile(
        &self,
        observations: Vec<DiscoveryObservation>,
        swept: Option<SweepTarget>,
    ) -> Result<SweepReport, CoreError> {
        let _pass = self.pass_lock.lock().await;

        let observed = observations.len();
        let snapshot = self.store.snapshot()?;
        let plan = plan(&snapshot, observations, swept);

        for anomaly in &plan.anomalies {
            warn!(
                identity = %anomaly.reported_identity,
                kept = %anomaly.kept,
                discarded = %anomaly.discarded,
                "Duplicate responder; keeping the latest reply"
            );
        }

        let mut updated = Vec::with_capacity(plan.updates.len());
        for item in &plan.updates {
            if item.matched_by == MatchKind::Address {
                info!(id = item.id.0, "Learned hardware id by address");
            }
            updated.push(self.store.update(item.id, &item.update)?);
        }

        let mut offline = Vec::with_capacity(plan.offline.len());
        for item in &plan.offline {
            offline.push(
                self.store
                    .update(item.id, &RecordUpdate::status(DeviceStatus::Offline))?,
            );
        }

        info!(
            observed,
            updated = updated.len(),
            unregistered = plan.unregistered.len(),
            offline = offline.len(),
            "Reconciliation pass complete"
        );

        Ok(SweepReport {
            target: String::new(),
            observed,
            updated,
            unregistered: plan.unregistered,
            offline,
            anomalies: plan.anomalies,
        })
    }

    /// Single-record path: fold one fresh observation into `record`.
    ///
    /// The hardware id is only learned when no other record owns it.
    pub async fn confirm(
        &self,
        record: &DeviceRecord,
        obs: &DiscoveryObservation,
    ) -> Result<DeviceRecord, CoreError> {
        let _pass = self.pass_lock.lock().await;

        let mut update = observed_update(record, obs);
        if let Some(hw) = &update.reported_identity {
            if let Some(owner) = self.store.find_by_reported_identity(hw)? {
                if owner.id != record.id {
                    warn!(
                        identity = %hw,
                        owner = %owner.name,
                        device = %record.name,
                        "Hardware id already bound to another record; not rebinding"
                    );
                    update.reported_identity = None;
                }
            }
        }

        Ok(self.store.update(record.id, &update)?)
    }
}
