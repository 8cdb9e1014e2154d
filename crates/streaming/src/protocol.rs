//! Wire framing shared by requests and responses.
//!
//! Every unit on the wire is an array: a fixed header followed by
//! `compressed_len` payload bytes.
//!
//! ```text
//!  <------------------- HEADER ------------------> <--- PAYLOAD --->
//! | u64 LE: compressed | u64 LE: decoded | u8: mode | u8[compressed] |
//! ```
//!
//! A query frame is one array whose payload is N addresses back to back,
//! uncompressed (`compressed_len = 0`, `decoded_len = N * ADDRESS_BUFFER_SIZE`).

use foundation::{ADDRESS_BUFFER_SIZE, Address};

pub const ARRAY_HEADER_SIZE: usize = 2 * 8 + 1;

/// Client half of the handshake.
pub const AUTH_MAGIC: u64 = 0xFFFF_0000_FFFF_0000;
/// Word the server echoes when it accepts the client.
pub const AUTH_AGREEMENT: u64 = 0x0000_FFFF_0000_FFFF;
/// Server reply payload: agreement, space parameter, time parameter.
pub const AUTH_REPLY_SIZE: usize = 3 * 8;

pub const DEFAULT_PORT: u16 = 11027;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum ArrayMode {
    Auth = 0x01,
    Query = 0x02,
}

impl ArrayMode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ArrayHeader {
    pub compressed_len: u64,
    pub decoded_len: u64,
    pub mode: u8,
}

impl ArrayHeader {
    pub fn new(compressed_len: u64, decoded_len: u64, mode: u8) -> Self {
        Self {
            compressed_len,
            decoded_len,
            mode,
        }
    }

    pub fn encode(&self) -> [u8; ARRAY_HEADER_SIZE] {
        let mut out = [0u8; ARRAY_HEADER_SIZE];
        out[0..8].copy_from_slice(&self.compressed_len.to_le_bytes());
        out[8..16].copy_from_slice(&self.decoded_len.to_le_bytes());
        out[16] = self.mode;
        out
    }

    /// Reads a header from the start of `bytes`; `None` until enough bytes exist.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < ARRAY_HEADER_SIZE {
            return None;
        }
        Some(Self {
            compressed_len: read_u64_le(bytes, 0),
            decoded_len: read_u64_le(bytes, 8),
            mode: bytes[16],
        })
    }
}

pub(crate) fn read_u64_le(bytes: &[u8], offset: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(b)
}

/// First frame a client sends after connecting.
pub fn client_hello() -> Vec<u8> {
    let header = ArrayHeader::new(0, 8, ArrayMode::Auth.as_u8());
    let mut out = Vec::with_capacity(ARRAY_HEADER_SIZE + 8);
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(&AUTH_MAGIC.to_le_bytes());
    out
}

/// Serializes a query frame for `addresses`, in order.
pub fn encode_query(addresses: &[Address]) -> Vec<u8> {
    let payload_len = addresses.len() * ADDRESS_BUFFER_SIZE;
    let header = ArrayHeader::new(0, payload_len as u64, ArrayMode::Query.as_u8());

    let mut out = Vec::with_capacity(ARRAY_HEADER_SIZE + payload_len);
    out.extend_from_slice(&header.encode());
    for address in addresses {
        out.extend_from_slice(&address.to_bytes());
    }
    out
}

/// Parameters the server announces in its handshake reply.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ServerParams {
    /// Deepest address the server can answer for.
    pub space_param: u32,
    pub time_param: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeError {
    pub reason: String,
}

impl HandshakeError {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "handshake failed: {}", self.reason)
    }
}

impl std::error::Error for HandshakeError {}

/// Accumulates the server's handshake reply across messages.
#[derive(Debug, Default)]
pub struct Handshake {
    buf: Vec<u8>,
}

impl Handshake {
    const REPLY_SIZE: usize = ARRAY_HEADER_SIZE + AUTH_REPLY_SIZE;

    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds server bytes.
    ///
    /// Returns `Ok(None)` while the reply is incomplete. Once complete, returns
    /// the server parameters plus how many bytes of `bytes` were consumed; the
    /// rest belongs to the array stream.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Option<(ServerParams, usize)>, HandshakeError> {
        let take = (Self::REPLY_SIZE - self.buf.len()).min(bytes.len());
        self.buf.extend_from_slice(&bytes[..take]);

        if let Some(header) = ArrayHeader::decode(&self.buf) {
            validate_reply_header(&header)?;
        }
        if self.buf.len() < Self::REPLY_SIZE {
            return Ok(None);
        }

        let payload = &self.buf[ARRAY_HEADER_SIZE..];
        let agreement = read_u64_le(payload, 0);
        if agreement != AUTH_AGREEMENT {
            return Err(HandshakeError::new(format!(
                "server agreement {agreement:#018x} != {AUTH_AGREEMENT:#018x}"
            )));
        }

        let space = read_u64_le(payload, 8);
        let time = read_u64_le(payload, 16);
        let (Ok(space_param), Ok(time_param)) = (u32::try_from(space), u32::try_from(time)) else {
            return Err(HandshakeError::new(format!(
                "server parameters bigger than expected (space={space}, time={time})"
            )));
        };

        Ok(Some((
            ServerParams {
                space_param,
                time_param,
            },
            take,
        )))
    }
}

fn validate_reply_header(header: &ArrayHeader) -> Result<(), HandshakeError> {
    if header.mode != ArrayMode::Auth.as_u8() {
        return Err(HandshakeError::new(format!(
            "reply mode {} is not AUTH",
            header.mode
        )));
    }
    if header.compressed_len != 0 || header.decoded_len != AUTH_REPLY_SIZE as u64 {
        return Err(HandshakeError::new(format!(
            "reply sizes compressed={} decoded={} (expected 0 and {AUTH_REPLY_SIZE})",
            header.compressed_len, header.decoded_len
        )));
    }
    Ok(())
}

/// Builds a handshake reply as a server would send it.
pub fn encode_handshake_reply(agreement: u64, space: u64, time: u64) -> Vec<u8> {
    let header = ArrayHeader::new(0, AUTH_REPLY_SIZE as u64, ArrayMode::Auth.as_u8());
    let mut out = Vec::with_capacity(ARRAY_HEADER_SIZE + AUTH_REPLY_SIZE);
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(&agreement.to_le_bytes());
    out.extend_from_slice(&space.to_le_bytes());
    out.extend_from_slice(&time.to_le_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use foundation::TimeSelection;
    use pretty_assertions::assert_eq;

    #[test]
    fn hello_is_auth_header_plus_magic() {
        let hello = client_hello();
        assert_eq!(hello.len(), 25);
        assert_eq!(&hello[0..8], &[0; 8]);
        assert_eq!(&hello[8..16], &8u64.to_le_bytes());
        assert_eq!(hello[16], 0x01);
        assert_eq!(&hello[17..], &[0x00, 0x00, 0xFF, 0xFF, 0x00, 0x00, 0xFF, 0xFF]);
    }

    #[test]
    fn query_frame_packs_addresses_back_to_back() {
        let a = Address::parse("/1/5,5/1/0").expect("parse");
        let b = Address::parse("/1/5,5/13/2").expect("parse");
        let frame = encode_query(&[a, b]);

        let header = ArrayHeader::decode(&frame).expect("header");
        assert_eq!(header, ArrayHeader::new(0, 118, ArrayMode::Query.as_u8()));
        assert_eq!(frame.len(), ARRAY_HEADER_SIZE + 118);
        assert_eq!(&frame[17..76], &a.to_bytes());
        assert_eq!(&frame[76..], &b.to_bytes());

        let root = Address::root(TimeSelection::default(), 0);
        assert_eq!(encode_query(&[root]).len(), 17 + 59);
        assert_eq!(encode_query(&[]).len(), 17);
    }

    #[test]
    fn header_decode_waits_for_all_bytes() {
        let header = ArrayHeader::new(3, 27, 0);
        let bytes = header.encode();
        assert_eq!(ArrayHeader::decode(&bytes[..16]), None);
        assert_eq!(ArrayHeader::decode(&bytes), Some(header));
    }

    #[test]
    fn handshake_accepts_valid_reply_and_reports_leftover() {
        let mut reply = encode_handshake_reply(AUTH_AGREEMENT, 40, 12);
        reply.extend_from_slice(&[9, 9, 9]);

        let mut hs = Handshake::new();
        let (params, consumed) = hs.feed(&reply).expect("valid").expect("complete");
        assert_eq!(
            params,
            ServerParams {
                space_param: 40,
                time_param: 12
            }
        );
        assert_eq!(consumed, 41);
        assert_eq!(&reply[consumed..], &[9, 9, 9]);
    }

    #[test]
    fn handshake_buffers_split_reply() {
        let reply = encode_handshake_reply(AUTH_AGREEMENT, 30, 0);
        for split in 0..reply.len() {
            let mut hs = Handshake::new();
            assert_eq!(hs.feed(&reply[..split]), Ok(None), "split at {split}");
            let (params, consumed) = hs.feed(&reply[split..]).expect("valid").expect("complete");
            assert_eq!(params.space_param, 30);
            assert_eq!(consumed, reply.len() - split);
        }
    }

    #[test]
    fn handshake_rejects_bad_agreement() {
        let reply = encode_handshake_reply(AUTH_MAGIC, 40, 0);
        let err = Handshake::new().feed(&reply).unwrap_err();
        assert!(err.reason.contains("agreement"), "{err}");
    }

    #[test]
    fn handshake_rejects_oversized_parameters() {
        let reply = encode_handshake_reply(AUTH_AGREEMENT, 1 << 32, 0);
        assert!(Handshake::new().feed(&reply).is_err());
        let reply = encode_handshake_reply(AUTH_AGREEMENT, 40, u64::MAX);
        assert!(Handshake::new().feed(&reply).is_err());
    }

    #[test]
    fn handshake_rejects_bad_header_before_payload_arrives() {
        let mut reply = encode_handshake_reply(AUTH_AGREEMENT, 40, 0);
        reply[16] = ArrayMode::Query.as_u8();
        assert!(Handshake::new().feed(&reply[..17]).is_err());

        let mut reply = encode_handshake_reply(AUTH_AGREEMENT, 40, 0);
        reply[0] = 1;
        assert!(Handshake::new().feed(&reply).is_err());
    }
}
