//! Sweep targets: a broadcast address or an IPv4 network in CIDR notation.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use crate::error::ConfigError;

/// Smallest prefix accepted for a fan-out sweep (510 hosts).
pub const MIN_PREFIX: u8 = 23;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepTarget {
    /// One discovery datagram to a broadcast address; every plug that hears it replies.
    Broadcast(Ipv4Addr),
    /// One direct probe per host address of the network.
    Cidr { network: Ipv4Addr, prefix: u8 },
}

impl SweepTarget {
    /// Host addresses probed by a CIDR sweep.
    ///
    /// Network and broadcast addresses are skipped except on /31 and /32,
    /// which have none.
    pub fn hosts(&self) -> Vec<IpAddr> {
        match *self {
            SweepTarget::Broadcast(addr) => vec![IpAddr::V4(addr)],
            SweepTarget::Cidr { network, prefix } => {
                let base = u32::from(network);
                let size = 1u64 << (32 - u32::from(prefix));
                let (first, last) = if prefix >= 31 {
                    (0, size - 1)
                } else {
                    (1, size - 2)
                };
                (first..=last)
                    .map(|offset| IpAddr::V4(Ipv4Addr::from(base.wrapping_add(offset as u32))))
                    .collect()
            }
        }
    }

    /// Whether a sweep of this target would have heard from `address`.
    ///
    /// A broadcast address covers the subnet spelled by its trailing one
    /// bits, so `255.255.255.255` covers every IPv4 host and `192.168.1.255`
    /// covers `192.168.1.0/24`. IPv6 addresses are never covered.
    pub fn covers(&self, address: IpAddr) -> bool {
        let IpAddr::V4(address) = address else {
            return false;
        };
        let (base, host_bits) = match *self {
            SweepTarget::Broadcast(addr) => (u32::from(addr), u32::from(addr).trailing_ones()),
            SweepTarget::Cidr { network, prefix } => (u32::from(network), 32 - u32::from(prefix)),
        };
        let mask = u32::MAX.checked_shl(host_bits).unwrap_or(0);
        u32::from(address) & mask == base & mask
    }
}

impl FromStr for SweepTarget {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::InvalidSweepTarget {
            target: s.to_string(),
            reason: reason.to_string(),
        };

        let Some((addr, prefix)) = s.trim().split_once('/') else {
            let addr: Ipv4Addr = s
                .trim()
                .parse()
                .map_err(|_| invalid("expected an IPv4 address or CIDR"))?;
            return Ok(SweepTarget::Broadcast(addr));
        };

        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| invalid("expected an IPv4 network address"))?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid("prefix must be a number"))?;
        if prefix > 32 {
            return Err(invalid("prefix must be at most 32"));
        }
        if prefix < MIN_PREFIX {
            return Err(invalid("prefix shorter than /23 is too large to sweep"));
        }

        let mask = u32::MAX << (32 - u32::from(prefix));
        Ok(SweepTarget::Cidr {
            network: Ipv4Addr::from(u32::from(addr) & mask),
            prefix,
        })
    }
}

impl fmt::Display for SweepTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepTarget::Broadcast(addr) => write!(f, "{}", addr),
            SweepTarget::Cidr { network, prefix } => write!(f, "{}/{}", network, prefix),
        }
    }
}
