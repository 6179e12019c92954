//! Time-boxed discovery: UDP broadcast probing and concurrent unicast fan-out.
//!
//! Both produce a lazy stream that ends when the window closes. Devices that
//! stay silent are simply absent from the stream. An `Err` item is a local
//! failure (the host could not send or listen); it is always the last item,
//! and a sweep that sees one has not heard from the whole target.

use std::collections::HashSet;
use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, BoxStream, FuturesUnordered, StreamExt};
use serde_json::Value;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use crate::error::DeviceError;
use crate::protocol::codec;
use crate::protocol::commands::Commands;
use crate::protocol::response::{parse_json_response, parse_sysinfo};
use crate::types::DiscoveryObservation;

/// Observations as they arrive, or the local failure that cut them short.
pub type ObservationStream = BoxStream<'static, Result<DiscoveryObservation, DeviceError>>;

/// Create a UDP socket allowed to send to broadcast addresses.
pub fn create_broadcast_socket() -> Result<std::net::UdpSocket, io::Error> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

    socket.set_broadcast(true)?;
    socket.set_reuse_address(true)?;

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
    socket.bind(&addr.into())?;

    socket.set_nonblocking(true)?;

    Ok(socket.into())
}

/// Build an observation from a sysinfo reply received from `address`.
pub fn observation_from_reply(
    address: IpAddr,
    reply: &Value,
) -> Result<DiscoveryObservation, DeviceError> {
    let info = parse_sysinfo(reply, &address.to_string())?;
    Ok(DiscoveryObservation {
        address,
        relay_on: info.relay_on(),
        reported_identity: info.device_id,
        timestamp: Utc::now(),
        alias: info.alias,
        model: info.model,
    })
}

/// ICMP noise surfaced on the socket; the next datagram may be fine.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

struct Listener {
    socket: UdpSocket,
    target: Ipv4Addr,
    seen: HashSet<IpAddr>,
    buf: Vec<u8>,
    failed: bool,
}

/// Send one discovery datagram to `target` and stream every reply that
/// arrives before `window` elapses.
///
/// Replies are de-duplicated by source address; undecodable datagrams are
/// skipped. A receive error other than ICMP noise ends the stream with a
/// local failure.
pub async fn broadcast_probe(
    target: Ipv4Addr,
    port: u16,
    window: Duration,
) -> Result<ObservationStream, io::Error> {
    let socket = UdpSocket::from_std(create_broadcast_socket()?)?;
    let request = codec::encrypt(Commands::get_sysinfo().as_bytes());
    socket.send_to(&request, (target, port)).await?;
    debug!(%target, port, "discovery datagram sent");

    let deadline = Instant::now() + window;
    let listener = Listener {
        socket,
        target,
        seen: HashSet::new(),
        buf: vec![0u8; 4096],
        failed: false,
    };

    let replies = stream::unfold(listener, move |mut l| async move {
        if l.failed {
            return None;
        }
        loop {
            let (len, from) = match timeout_at(deadline, l.socket.recv_from(&mut l.buf)).await {
                Ok(Ok(received)) => received,
                Ok(Err(e)) if is_transient(&e) => {
                    debug!(error = %e, "UDP receive error");
                    continue;
                }
                Ok(Err(e)) => {
                    l.failed = true;
                    let err = DeviceError::local(l.target, format!("discovery socket failed: {}", e));
                    return Some((Err(err), l));
                }
                Err(_) => return None,
            };

            let address = from.ip();
            if l.seen.contains(&address) {
                continue;
            }

            let text = codec::decode_datagram(&l.buf[..len]);
            let parsed = parse_json_response(&text, &address.to_string())
                .and_then(|reply| observation_from_reply(address, &reply));
            match parsed {
                Ok(observation) => {
                    l.seen.insert(address);
                    return Some((Ok(observation), l));
                }
                Err(e) => debug!(%address, error = %e, "ignoring discovery reply"),
            }
        }
    });

    Ok(replies.boxed())
}

struct FanOut<F, Fut> {
    queue: std::vec::IntoIter<IpAddr>,
    running: FuturesUnordered<Fut>,
    probe: F,
    max_in_flight: usize,
    total: usize,
    failed: bool,
}

/// Probe every address with at most `max_in_flight` probes open at once and
/// stream successes as they complete.
///
/// All probes share one deadline, so the whole fan-out is bounded by a
/// single `window`. Probes still outstanding at the deadline are dropped
/// along with their results. A local failure from any probe, or addresses
/// never tried when the window closes, end the stream with an `Err`.
pub fn fan_out<F, Fut>(
    addresses: Vec<IpAddr>,
    window: Duration,
    max_in_flight: usize,
    probe: F,
) -> ObservationStream
where
    F: Fn(IpAddr) -> Fut + Send + 'static,
    Fut: Future<Output = Result<DiscoveryObservation, DeviceError>> + Send + 'static,
{
    let deadline = Instant::now() + window;
    let state = FanOut {
        total: addresses.len(),
        queue: addresses.into_iter(),
        running: FuturesUnordered::new(),
        probe,
        max_in_flight: max_in_flight.max(1),
        failed: false,
    };

    stream::unfold(state, move |mut s| async move {
        if s.failed {
            return None;
        }
        loop {
            while s.running.len() < s.max_in_flight {
                let Some(address) = s.queue.next() else { break };
                s.running.push((s.probe)(address));
            }

            match timeout_at(deadline, s.running.next()).await {
                Ok(Some(Ok(observation))) => return Some((Ok(observation), s)),
                Ok(Some(Err(e))) if e.is_local() => {
                    s.failed = true;
                    return Some((Err(e), s));
                }
                Ok(Some(Err(e))) => debug!(error = %e, "no answer"),
                Ok(None) => return None,
                Err(_) => {
                    let untried = s.queue.len();
                    if untried == 0 {
                        return None;
                    }
                    s.failed = true;
                    let err = DeviceError::local(
                        "sweep",
                        format!(
                            "window closed with {} of {} hosts not yet contacted",
                            untried, s.total
                        ),
                    );
                    return Some((Err(err), s));
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn observation(address: IpAddr) -> DiscoveryObservation {
        DiscoveryObservation {
            address,
            reported_identity: format!("hw-{}", address),
            timestamp: Utc::now(),
            alias: None,
            model: None,
            relay_on: None,
        }
    }

    fn hosts(n: u8) -> Vec<IpAddr> {
        (1..=n)
            .map(|i| IpAddr::V4(Ipv4Addr::new(10, 0, 0, i)))
            .collect()
    }

    #[test]
    fn test_observation_from_reply() {
        let reply = json!({
            "system": { "get_sysinfo": { "deviceId": "ABC", "alias": "Desk", "relay_state": 0 } }
        });
        let address = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9));
        let obs = observation_from_reply(address, &reply).unwrap();
        assert_eq!(obs.reported_identity, "ABC");
        assert_eq!(obs.alias.as_deref(), Some("Desk"));
        assert_eq!(obs.relay_on, Some(false));
        assert_eq!(obs.address, address);
    }

    #[test]
    fn test_only_icmp_noise_is_transient() {
        assert!(is_transient(&io::Error::from(io::ErrorKind::ConnectionRefused)));
        assert!(is_transient(&io::Error::from(io::ErrorKind::Interrupted)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::PermissionDenied)));
        assert!(!is_transient(&io::Error::other("socket closed")));
    }

    #[tokio::test]
    async fn test_broadcast_dedupes_by_source_and_skips_garbage() {
        let responder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = responder.local_addr().unwrap().port();
        let reply = codec::encrypt(
            br#"{"system":{"get_sysinfo":{"deviceId":"HW1","model":"HS103","relay_state":1,"err_code":0}}}"#,
        );
        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            let (_, from) = responder.recv_from(&mut buf).await.unwrap();
            responder.send_to(&codec::encrypt(b"garbage"), from).await.unwrap();
            responder.send_to(&reply, from).await.unwrap();
            responder.send_to(&reply, from).await.unwrap();
        });

        let window = Duration::from_millis(300);
        let started = Instant::now();
        let results: Vec<_> = broadcast_probe(Ipv4Addr::LOCALHOST, port, window)
            .await
            .unwrap()
            .collect()
            .await;
        let elapsed = started.elapsed();

        assert_eq!(results.len(), 1);
        let obs = results[0].as_ref().unwrap();
        assert_eq!(obs.reported_identity, "HW1");
        assert_eq!(obs.address, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(obs.relay_on, Some(true));
        assert!(elapsed >= window, "ended early after {:?}", elapsed);
        assert!(elapsed < window + Duration::from_secs(2), "took {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fan_out_is_bounded_by_one_window() {
        let window = Duration::from_secs(5);
        let started = Instant::now();

        // Odd hosts answer after 3s, even hosts never answer.
        let results: Vec<_> = fan_out(hosts(60), window, 64, |address| async move {
            let IpAddr::V4(v4) = address else { unreachable!() };
            if v4.octets()[3] % 2 == 1 {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Ok(observation(address))
            } else {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(DeviceError::unreachable(address, "timed out"))
            }
        })
        .collect()
        .await;

        let elapsed = started.elapsed();
        assert_eq!(results.len(), 30);
        assert!(results.iter().all(Result::is_ok));
        assert!(elapsed <= window + Duration::from_millis(50), "took {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fan_out_skips_silent_hosts() {
        let results: Vec<_> = fan_out(hosts(3), Duration::from_secs(5), 8, |address| async move {
            if address == IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)) {
                Err(DeviceError::unreachable(address, "refused"))
            } else {
                Ok(observation(address))
            }
        })
        .collect()
        .await;

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(Result::is_ok));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fan_out_ends_early_when_all_answer() {
        let started = Instant::now();
        let results: Vec<_> = fan_out(hosts(4), Duration::from_secs(5), 8, |address| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(observation(address))
        })
        .collect()
        .await;

        assert_eq!(results.len(), 4);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fan_out_caps_open_probes() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let probe = {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            move |address: IpAddr| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(observation(address))
                }
            }
        };

        let results: Vec<_> = fan_out(hosts(10), Duration::from_secs(5), 3, probe)
            .collect()
            .await;

        assert_eq!(results.len(), 10);
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fan_out_reports_hosts_left_when_window_closes() {
        // Two at a time, 2s each: by 5s four hosts answered, two are still
        // running and four were never contacted.
        let results: Vec<_> = fan_out(hosts(10), Duration::from_secs(5), 2, |address| async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(observation(address))
        })
        .collect()
        .await;

        assert_eq!(results.len(), 5);
        assert!(results[..4].iter().all(Result::is_ok));
        let err = results[4].as_ref().unwrap_err();
        assert!(err.is_local());
        assert!(err.to_string().contains("4 of 10"), "{}", err);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fan_out_stops_on_local_failure() {
        let results: Vec<_> = fan_out(hosts(5), Duration::from_secs(5), 8, |address| async move {
            if address == IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3)) {
                return Err(DeviceError::local(address, "cannot open socket: Too many open files"));
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(observation(address))
        })
        .collect()
        .await;

        assert_eq!(results.len(), 1);
        assert!(results[0].as_ref().unwrap_err().is_local());
    }
}
