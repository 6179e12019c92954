//! Core library for Kasa-Link: device registry, discovery reconciliation and
//! command dispatch for Kasa smart plugs on the local network.

pub mod config;
pub mod device;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod reconcile;
pub mod storage;
pub mod transport;
pub mod types;

pub use config::Settings;
pub use discovery::SweepTarget;
pub use dispatch::{Dispatcher, Outcome};
pub use error::{CoreError, DeviceError, ErrorKind, StorageError};
pub use reconcile::{Reconciler, SweepReport};
pub use storage::RegistryStore;
pub use transport::{KasaTransport, Transport};
pub use types::{
    Ack, DeviceId, DeviceRecord, DeviceStatus, DiscoveryObservation, Identity, PowerCommand,
};
