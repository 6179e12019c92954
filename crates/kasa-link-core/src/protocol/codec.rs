//! Frame codec for the plug's local JSON protocol.
//!
//! Payloads are obfuscated with a rolling XOR: each output byte becomes the
//! key for the next. TCP frames carry a 4-byte big-endian length prefix;
//! UDP discovery datagrams are sent bare.

/// Seed of the rolling XOR key.
pub const INITIAL_KEY: u8 = 171;

/// Length of the TCP frame header.
pub const HEADER_LEN: usize = 4;

/// Upper bound on a response frame. Sysinfo replies are a few hundred bytes.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Obfuscate a payload.
pub fn encrypt(plain: &[u8]) -> Vec<u8> {
    let mut key = INITIAL_KEY;
    plain
        .iter()
        .map(|&byte| {
            key ^= byte;
            key
        })
        .collect()
}

/// Reverse [`encrypt`].
pub fn decrypt(cipher: &[u8]) -> Vec<u8> {
    let mut key = INITIAL_KEY;
    cipher
        .iter()
        .map(|&byte| {
            let plain = key ^ byte;
            key = byte;
            plain
        })
        .collect()
}

/// Build a length-prefixed TCP frame for a JSON request.
pub fn encode_frame(request: &str) -> Vec<u8> {
    let body = encrypt(request.as_bytes());
    let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    frame
}

/// Read the body length from a frame header.
pub fn decode_header(header: [u8; HEADER_LEN]) -> usize {
    u32::from_be_bytes(header) as usize
}

/// Decode a bare (UDP) datagram into its JSON text.
pub fn decode_datagram(datagram: &[u8]) -> String {
    String::from_utf8_lossy(&decrypt(datagram)).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYSINFO: &str = r#"{"system":{"get_sysinfo":{}}}"#;

    #[test]
    fn test_encrypt_known_prefix() {
        let cipher = encrypt(SYSINFO.as_bytes());
        assert_eq!(&cipher[..6], &[0xd0, 0xf2, 0x81, 0xf8, 0x8b, 0xff]);
    }

    #[test]
    fn test_decrypt_reverses_encrypt() {
        let cipher = encrypt(SYSINFO.as_bytes());
        assert_eq!(decrypt(&cipher), SYSINFO.as_bytes());
        assert_eq!(decode_datagram(&cipher), SYSINFO);
    }

    #[test]
    fn test_frame_header() {
        let frame = encode_frame(SYSINFO);
        let header = [frame[0], frame[1], frame[2], frame[3]];
        assert_eq!(decode_header(header), SYSINFO.len());
        assert_eq!(frame.len(), HEADER_LEN + SYSINFO.len());
    }

    #[test]
    fn test_empty_payload() {
        assert!(encrypt(&[]).is_empty());
        assert_eq!(encode_frame(""), vec![0, 0, 0, 0]);
    }
}
