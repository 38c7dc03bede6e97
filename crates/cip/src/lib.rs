//! CIP: message request/response encode/decode, EPATH construction and
//! status mapping (transport-agnostic).

pub mod encap;
pub mod logix;
pub mod types;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

pub use encap::{EncapCommand, EncapHeader, EncapPacket, ENCAP_HEADER_SIZE, ENIP_PORT};
pub use types::AtomicType;

/// Class of the connection manager object that handles Unconnected Send.
pub const CONNECTION_MANAGER_CLASS: u16 = 0x06;
/// Priority/time-tick byte used for Unconnected Send (1024 ms ticks).
pub const PRIORITY_TIME_TICK: u8 = 0x0A;
/// Number of ticks the target waits before giving up on a routed request.
pub const TIMEOUT_TICKS: u8 = 0x05;
/// Backplane port number used in route paths.
pub const BACKPLANE_PORT: u8 = 0x01;

/// CIP services used by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// Read every attribute of an instance.
    GetAttributesAll,
    /// Read a chosen list of attributes of an instance.
    GetAttributeList,
    /// Read a block of a template definition (Logix specific).
    ReadTemplate,
    /// Read attributes across consecutive instances (Logix specific).
    GetInstanceAttributeList,
    /// Route an embedded request through the connection manager.
    UnconnectedSend,
}

impl Service {
    /// Raw service code.
    pub const fn code(self) -> u8 {
        match self {
            Service::GetAttributesAll => 0x01,
            Service::GetAttributeList => 0x03,
            Service::ReadTemplate => 0x4C,
            Service::GetInstanceAttributeList => 0x55,
            Service::UnconnectedSend => 0x52,
        }
    }
}

/// General status codes returned in CIP replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneralStatus {
    /// Service completed successfully.
    Success,
    /// A connection related service failed along the path.
    ConnectionFailure,
    /// The path could not be parsed.
    PathSegmentError,
    /// The path references an object the target does not have.
    PathDestinationUnknown,
    /// Only part of the data fit in the reply; request the rest.
    PartialTransfer,
    /// The object does not implement the requested service.
    ServiceNotSupported,
    /// The target is busy processing another request.
    DeviceStateConflict,
    /// Requested attribute is not supported.
    AttributeNotSupported,
    /// The specified object instance does not exist.
    ObjectDoesNotExist,
    /// The request carried too little data.
    NotEnoughData,
    /// The request carried more data than expected.
    TooMuchData,
    /// A status code not known to this implementation.
    Unknown(u8),
}

impl GeneralStatus {
    /// Convert from the raw status byte in a reply.
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0x00 => GeneralStatus::Success,
            0x01 => GeneralStatus::ConnectionFailure,
            0x04 => GeneralStatus::PathSegmentError,
            0x05 => GeneralStatus::PathDestinationUnknown,
            0x06 => GeneralStatus::PartialTransfer,
            0x08 => GeneralStatus::ServiceNotSupported,
            0x10 => GeneralStatus::DeviceStateConflict,
            0x14 => GeneralStatus::AttributeNotSupported,
            0x16 => GeneralStatus::ObjectDoesNotExist,
            0x13 => GeneralStatus::NotEnoughData,
            0x15 => GeneralStatus::TooMuchData,
            other => GeneralStatus::Unknown(other),
        }
    }

    /// Convert to the raw value stored in the reply.
    pub const fn to_raw(self) -> u8 {
        match self {
            GeneralStatus::Success => 0x00,
            GeneralStatus::ConnectionFailure => 0x01,
            GeneralStatus::PathSegmentError => 0x04,
            GeneralStatus::PathDestinationUnknown => 0x05,
            GeneralStatus::PartialTransfer => 0x06,
            GeneralStatus::ServiceNotSupported => 0x08,
            GeneralStatus::DeviceStateConflict => 0x10,
            GeneralStatus::AttributeNotSupported => 0x14,
            GeneralStatus::ObjectDoesNotExist => 0x16,
            GeneralStatus::NotEnoughData => 0x13,
            GeneralStatus::TooMuchData => 0x15,
            GeneralStatus::Unknown(code) => code,
        }
    }
}

/// Errors that can occur when dealing with CIP or encapsulation packets.
#[derive(Debug, Error)]
pub enum CipError {
    #[error("invalid packet: {0}")]
    InvalidPacket(&'static str),
    #[error("unknown encapsulation command: {0:#06x}")]
    UnknownCommand(u16),
    #[error("encapsulation status {0:#010x}")]
    EncapStatus(u32),
    #[error("symbolic segment too long ({0} bytes)")]
    SymbolTooLong(usize),
}

/// Encoded EPATH (padded logical and symbolic segments).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EPath {
    bytes: Vec<u8>,
}

impl EPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an ANSI extended symbolic segment (`0x91`), padded to a word.
    pub fn symbol(mut self, name: &str) -> Result<Self, CipError> {
        let raw = name.as_bytes();
        let len = u8::try_from(raw.len()).map_err(|_| CipError::SymbolTooLong(raw.len()))?;
        self.bytes.push(0x91);
        self.bytes.push(len);
        self.bytes.extend_from_slice(raw);
        if raw.len() % 2 == 1 {
            self.bytes.push(0);
        }
        Ok(self)
    }

    /// Append a logical class segment using the shortest encoding.
    pub fn class(mut self, id: u16) -> Self {
        if let Ok(short) = u8::try_from(id) {
            self.bytes.extend_from_slice(&[0x20, short]);
        } else {
            self.bytes.extend_from_slice(&[0x21, 0x00]);
            self.bytes.extend_from_slice(&id.to_le_bytes());
        }
        self
    }

    /// Append a logical instance segment using the shortest encoding.
    pub fn instance(mut self, id: u32) -> Self {
        if let Ok(short) = u8::try_from(id) {
            self.bytes.extend_from_slice(&[0x24, short]);
        } else if let Ok(mid) = u16::try_from(id) {
            self.bytes.extend_from_slice(&[0x25, 0x00]);
            self.bytes.extend_from_slice(&mid.to_le_bytes());
        } else {
            self.bytes.extend_from_slice(&[0x26, 0x00]);
            self.bytes.extend_from_slice(&id.to_le_bytes());
        }
        self
    }

    /// Append a port segment with a one byte link address (e.g. backplane slot).
    pub fn port(mut self, port: u8, link: u8) -> Self {
        self.bytes.extend_from_slice(&[port & 0x0F, link]);
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Length in 16-bit words.
    pub fn words(&self) -> u8 {
        (self.bytes.len() / 2) as u8
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// CIP explicit message request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRequest {
    /// Service code.
    pub service: u8,
    /// Request path.
    pub path: EPath,
    /// Service specific request data.
    pub data: Bytes,
}

impl MessageRequest {
    pub fn new(service: Service, path: EPath, data: Bytes) -> Self {
        Self {
            service: service.code(),
            path,
            data,
        }
    }

    /// Encode the request into the on-the-wire representation.
    pub fn encode(&self) -> Bytes {
        let path = self.path.as_bytes();
        let mut buf = BytesMut::with_capacity(2 + path.len() + self.data.len());
        buf.put_u8(self.service);
        buf.put_u8(self.path.words());
        buf.put_slice(path);
        buf.put_slice(&self.data);
        buf.freeze()
    }
}

/// CIP explicit message reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageResponse {
    /// Service code of the request this reply answers.
    pub service: u8,
    /// General status.
    pub status: GeneralStatus,
    /// Additional status words.
    pub extended_status: Vec<u16>,
    /// Service specific reply data.
    pub data: Bytes,
}

impl MessageResponse {
    /// True for a successful or partial reply that carries usable data.
    pub fn is_ok(&self) -> bool {
        matches!(
            self.status,
            GeneralStatus::Success | GeneralStatus::PartialTransfer
        )
    }
}

/// Decode a CIP reply from raw bytes.
pub fn decode_response(buf: &[u8]) -> Result<MessageResponse, CipError> {
    if buf.len() < 4 {
        return Err(CipError::InvalidPacket("reply too short"));
    }
    let mut cursor = buf;
    let reply_service = cursor.get_u8();
    if reply_service & 0x80 == 0 {
        return Err(CipError::InvalidPacket("reply flag not set"));
    }
    let _reserved = cursor.get_u8();
    let status = GeneralStatus::from_raw(cursor.get_u8());
    let extended_words = cursor.get_u8() as usize;
    if cursor.remaining() < extended_words * 2 {
        return Err(CipError::InvalidPacket("extended status truncated"));
    }
    let extended_status = (0..extended_words).map(|_| cursor.get_u16_le()).collect();
    Ok(MessageResponse {
        service: reply_service & 0x7F,
        status,
        extended_status,
        data: Bytes::copy_from_slice(cursor),
    })
}

/// Build the route path to a controller sitting in a backplane slot.
pub fn backplane_route(slot: u8) -> EPath {
    EPath::new().port(BACKPLANE_PORT, slot)
}

/// Wrap `request` in an Unconnected Send addressed to the connection manager.
pub fn unconnected_send(request: &MessageRequest, route: &EPath) -> MessageRequest {
    let embedded = request.encode();
    let mut data = BytesMut::with_capacity(6 + embedded.len() + route.as_bytes().len());
    data.put_u8(PRIORITY_TIME_TICK);
    data.put_u8(TIMEOUT_TICKS);
    data.put_u16_le(embedded.len() as u16);
    data.put_slice(&embedded);
    if embedded.len() % 2 == 1 {
        data.put_u8(0);
    }
    data.put_u8(route.words());
    data.put_u8(0);
    data.put_slice(route.as_bytes());
    MessageRequest::new(
        Service::UnconnectedSend,
        EPath::new().class(CONNECTION_MANAGER_CLASS).instance(1),
        data.freeze(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epath_segment_widths() {
        let path = EPath::new().class(0x6B).instance(0x1234);
        assert_eq!(path.as_bytes(), &[0x20, 0x6B, 0x25, 0x00, 0x34, 0x12]);
        assert_eq!(path.words(), 3);

        let path = EPath::new().class(0x0300).instance(0x0001_0000);
        assert_eq!(
            path.as_bytes(),
            &[0x21, 0x00, 0x00, 0x03, 0x26, 0x00, 0x00, 0x00, 0x01, 0x00]
        );
    }

    #[test]
    fn symbol_segment_is_padded() {
        let path = EPath::new().symbol("Program:A").expect("symbol");
        assert_eq!(path.as_bytes()[0], 0x91);
        assert_eq!(path.as_bytes()[1], 9);
        assert_eq!(&path.as_bytes()[2..11], b"Program:A");
        assert_eq!(path.as_bytes()[11], 0);
        assert_eq!(path.as_bytes().len() % 2, 0);
    }

    #[test]
    fn symbol_segment_rejects_long_names() {
        let name = "x".repeat(300);
        let err = EPath::new().symbol(&name).unwrap_err();
        assert!(matches!(err, CipError::SymbolTooLong(300)));
    }

    #[test]
    fn encode_request() {
        let request = MessageRequest::new(
            Service::GetAttributesAll,
            EPath::new().class(0x64).instance(1),
            Bytes::new(),
        );
        assert_eq!(
            &request.encode()[..],
            &[0x01, 0x02, 0x20, 0x64, 0x24, 0x01]
        );
    }

    #[test]
    fn decode_reply_with_extended_status() {
        let buf = [0xD5, 0x00, 0x06, 0x01, 0x34, 0x12, 0xAA, 0xBB];
        let reply = decode_response(&buf).expect("decode");
        assert_eq!(reply.service, 0x55);
        assert_eq!(reply.status, GeneralStatus::PartialTransfer);
        assert_eq!(reply.extended_status, vec![0x1234]);
        assert_eq!(&reply.data[..], &[0xAA, 0xBB]);
        assert!(reply.is_ok());
    }

    #[test]
    fn decode_keeps_unlisted_service_codes() {
        let buf = [0xCB, 0x00, 0x08, 0x00];
        let reply = decode_response(&buf).expect("decode");
        assert_eq!(reply.service, 0x4B);
        assert_eq!(reply.status, GeneralStatus::ServiceNotSupported);
        assert!(!reply.is_ok());
        assert!(reply.data.is_empty());
    }

    #[test]
    fn decode_rejects_requests() {
        let buf = [0x55, 0x00, 0x00, 0x00];
        assert!(matches!(
            decode_response(&buf),
            Err(CipError::InvalidPacket(_))
        ));
    }

    #[test]
    fn unconnected_send_layout() {
        let inner = MessageRequest::new(
            Service::GetAttributesAll,
            EPath::new().class(0x64).instance(1),
            Bytes::new(),
        );
        let wrapped = unconnected_send(&inner, &backplane_route(2));
        assert_eq!(wrapped.service, 0x52);
        assert_eq!(wrapped.path.as_bytes(), &[0x20, 0x06, 0x24, 0x01]);
        let data = &wrapped.data[..];
        assert_eq!(data[0], PRIORITY_TIME_TICK);
        assert_eq!(data[1], TIMEOUT_TICKS);
        assert_eq!(u16::from_le_bytes([data[2], data[3]]), 6);
        assert_eq!(&data[4..10], &inner.encode()[..]);
        assert_eq!(&data[10..], &[0x01, 0x00, 0x01, 0x02]);
    }

    #[test]
    fn status_roundtrip() {
        for raw in 0u8..=0x20 {
            assert_eq!(GeneralStatus::from_raw(raw).to_raw(), raw);
        }
    }
}
