//! TCP request/response exchange with a single plug.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpSocket;
use tokio::time::timeout;
use tracing::debug;

use crate::error::DeviceError;
use crate::protocol::codec::{self, HEADER_LEN, MAX_FRAME_LEN};
use crate::protocol::response::parse_json_response;

/// Send one request and wait for the reply.
///
/// Opens a fresh connection, writes the framed request, reads one framed
/// reply and closes. Connect, write and read together are bounded by
/// `deadline`; expiry is reported as `Unreachable`. No retries.
pub async fn send_request(
    addr: SocketAddr,
    request: &str,
    deadline: Duration,
) -> Result<Value, DeviceError> {
    let target = addr.ip().to_string();

    let raw = timeout(deadline, exchange(addr, request, &target))
        .await
        .map_err(|_| {
            DeviceError::unreachable(&target, format!("timed out after {}ms", deadline.as_millis()))
        })??;

    debug!(%addr, bytes = raw.len(), "reply received");
    parse_json_response(&raw, &target)
}

async fn exchange(addr: SocketAddr, request: &str, target: &str) -> Result<String, DeviceError> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(|e| DeviceError::local(target, format!("cannot open socket: {}", e)))?;

    let mut stream = socket.connect(addr).await.map_err(|e| connect_error(target, e))?;

    stream
        .write_all(&codec::encode_frame(request))
        .await
        .map_err(|e| DeviceError::unreachable(target, format!("send failed: {}", e)))?;

    let mut header = [0u8; HEADER_LEN];
    stream
        .read_exact(&mut header)
        .await
        .map_err(|e| DeviceError::unreachable(target, format!("no reply: {}", e)))?;

    let len = codec::decode_header(header);
    if len > MAX_FRAME_LEN {
        return Err(DeviceError::InvalidResponse {
            target: target.to_string(),
            message: format!("reply frame of {} bytes exceeds limit", len),
        });
    }

    let mut body = vec![0u8; len];
    stream
        .read_exact(&mut body)
        .await
        .map_err(|e| DeviceError::InvalidResponse {
            target: target.to_string(),
            message: format!("truncated reply: {}", e),
        })?;

    Ok(codec::decode_datagram(&body))
}

/// Out of ephemeral ports or no usable source address: the plug was never asked.
fn connect_error(target: &str, e: io::Error) -> DeviceError {
    match e.kind() {
        io::ErrorKind::AddrNotAvailable | io::ErrorKind::AddrInUse => {
            DeviceError::local(target, format!("connect failed: {}", e))
        }
        _ => DeviceError::unreachable(target, format!("connect failed: {}", e)),
    }
}
