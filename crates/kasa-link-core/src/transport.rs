//! Transport adapter: the only seam through which core touches the network.
//!
//! Every operation makes at most one attempt and is bounded by a timeout;
//! expiry surfaces as `DeviceError::Unreachable`.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::Settings;
use crate::device::send_request;
use crate::discovery::{self, observation_from_reply, ObservationStream, SweepTarget};
use crate::error::DeviceError;
use crate::protocol::commands::Commands;
use crate::protocol::response::{check_relay_reply, parse_sysinfo};
use crate::types::{Ack, DiscoveryObservation, PowerCommand};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Query one device by address.
    async fn probe_one(&self, address: IpAddr) -> Result<DiscoveryObservation, DeviceError>;

    /// Probe a subnet. The stream ends when `window` elapses; silent devices
    /// are omitted rather than reported as errors. An `Err` item means this
    /// host could not cover the whole target.
    async fn probe_subnet(
        &self,
        target: SweepTarget,
        window: Duration,
    ) -> Result<ObservationStream, DeviceError>;

    /// Send a control command. `PowerOn`/`PowerOff` switch the relay.
    async fn send_command(&self, address: IpAddr, command: PowerCommand)
        -> Result<Ack, DeviceError>;
}

/// Open TCP connections allowed at once during a CIDR sweep.
pub const MAX_IN_FLIGHT: usize = 128;

/// Transport speaking the plugs' local TCP/UDP protocol.
#[derive(Debug, Clone)]
pub struct KasaTransport {
    port: u16,
    timeout: Duration,
}

impl KasaTransport {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.port, settings.timeout())
    }
}

async fn probe_address(
    address: IpAddr,
    port: u16,
    deadline: Duration,
) -> Result<DiscoveryObservation, DeviceError> {
    let reply = send_request(SocketAddr::new(address, port), &Commands::get_sysinfo(), deadline).await?;
    observation_from_reply(address, &reply)
}

/// Time each host gets so that `hosts` addresses, `MAX_IN_FLIGHT` at a time,
/// all get contacted within `window`.
fn per_probe_budget(timeout: Duration, window: Duration, hosts: usize) -> Duration {
    let rounds = hosts.div_ceil(MAX_IN_FLIGHT).max(1);
    let rounds = u32::try_from(rounds).unwrap_or(u32::MAX);
    timeout.min(window / rounds)
}

#[async_trait]
impl Transport for KasaTransport {
    async fn probe_one(&self, address: IpAddr) -> Result<DiscoveryObservation, DeviceError> {
        debug!(%address, "probing device");
        probe_address(address, self.port, self.timeout).await
    }

    async fn probe_subnet(
        &self,
        target: SweepTarget,
        window: Duration,
    ) -> Result<ObservationStream, DeviceError> {
        match target {
            SweepTarget::Broadcast(addr) => discovery::broadcast_probe(addr, self.port, window)
                .await
                .map_err(|e| {
                    DeviceError::local(target, format!("cannot send discovery datagram: {}", e))
                }),
            SweepTarget::Cidr { .. } => {
                let port = self.port;
                let hosts = target.hosts();
                let per_probe = per_probe_budget(self.timeout, window, hosts.len());
                debug!(%target, hosts = hosts.len(), ?per_probe, "fanning out");
                Ok(discovery::fan_out(hosts, window, MAX_IN_FLIGHT, move |address| {
                    probe_address(address, port, per_probe)
                }))
            }
        }
    }

    async fn send_command(
        &self,
        address: IpAddr,
        command: PowerCommand,
    ) -> Result<Ack, DeviceError> {
        let target = address.to_string();
        let reply = send_request(
            SocketAddr::new(address, self.port),
            &Commands::for_command(command),
            self.timeout,
        )
        .await?;

        let info = match command {
            PowerCommand::PowerOn | PowerCommand::PowerOff => {
                check_relay_reply(&reply, &target)?;
                // Older firmware drops the batched sysinfo; the switch itself succeeded.
                parse_sysinfo(&reply, &target).ok()
            }
            PowerCommand::Refresh => Some(parse_sysinfo(&reply, &target)?),
        };

        Ok(Ack {
            address,
            command,
            relay_on: info.as_ref().and_then(|i| i.relay_on()),
            reported_identity: info.map(|i| i.device_id),
        })
    }
}
