//! EtherNet/IP encapsulation layer (TCP framing and common packet format).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::CipError;

/// Size of the encapsulation header (in bytes).
pub const ENCAP_HEADER_SIZE: usize = 24;
/// Registered EtherNet/IP TCP port.
pub const ENIP_PORT: u16 = 44818;
/// Encapsulation protocol version sent in RegisterSession.
pub const PROTOCOL_VERSION: u16 = 1;
/// Common packet format item carrying a null address.
pub const ITEM_NULL_ADDRESS: u16 = 0x0000;
/// Common packet format item carrying unconnected message data.
pub const ITEM_UNCONNECTED_DATA: u16 = 0x00B2;

/// Encapsulation commands used by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncapCommand {
    RegisterSession,
    UnregisterSession,
    SendRrData,
}

impl EncapCommand {
    pub const fn code(self) -> u16 {
        match self {
            EncapCommand::RegisterSession => 0x0065,
            EncapCommand::UnregisterSession => 0x0066,
            EncapCommand::SendRrData => 0x006F,
        }
    }

    pub fn from_code(code: u16) -> Result<Self, CipError> {
        match code {
            0x0065 => Ok(EncapCommand::RegisterSession),
            0x0066 => Ok(EncapCommand::UnregisterSession),
            0x006F => Ok(EncapCommand::SendRrData),
            other => Err(CipError::UnknownCommand(other)),
        }
    }
}

/// Encapsulation header preceding every packet on the TCP stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncapHeader {
    pub command: EncapCommand,
    /// Length of the data following the header.
    pub length: u16,
    pub session: u32,
    pub status: u32,
    /// Opaque value echoed back by the target.
    pub context: [u8; 8],
    pub options: u32,
}

impl EncapHeader {
    pub fn new(command: EncapCommand, session: u32, context: [u8; 8]) -> Self {
        Self {
            command,
            length: 0,
            session,
            status: 0,
            context,
            options: 0,
        }
    }

    /// Encode the header followed by `payload`; the length field is taken from the payload.
    pub fn encode(&self, payload: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(ENCAP_HEADER_SIZE + payload.len());
        buf.put_u16_le(self.command.code());
        buf.put_u16_le(payload.len() as u16);
        buf.put_u32_le(self.session);
        buf.put_u32_le(self.status);
        buf.put_slice(&self.context);
        buf.put_u32_le(self.options);
        buf.put_slice(payload);
        buf.freeze()
    }

    /// Decode a header from the first [`ENCAP_HEADER_SIZE`] bytes of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self, CipError> {
        if buf.len() < ENCAP_HEADER_SIZE {
            return Err(CipError::InvalidPacket("encapsulation header too short"));
        }
        let mut cursor = buf;
        let command = EncapCommand::from_code(cursor.get_u16_le())?;
        let length = cursor.get_u16_le();
        let session = cursor.get_u32_le();
        let status = cursor.get_u32_le();
        let mut context = [0u8; 8];
        cursor.copy_to_slice(&mut context);
        let options = cursor.get_u32_le();
        Ok(Self {
            command,
            length,
            session,
            status,
            context,
            options,
        })
    }
}

/// A complete encapsulation packet.
#[derive(Debug, Clone)]
pub struct EncapPacket {
    pub header: EncapHeader,
    pub payload: Bytes,
}

/// Decode a full packet, checking the declared length and the status field.
pub fn decode_packet(buf: &[u8]) -> Result<EncapPacket, CipError> {
    let header = EncapHeader::decode(buf)?;
    if buf.len() != ENCAP_HEADER_SIZE + header.length as usize {
        return Err(CipError::InvalidPacket("encapsulation length mismatch"));
    }
    if header.status != 0 {
        return Err(CipError::EncapStatus(header.status));
    }
    Ok(EncapPacket {
        header,
        payload: Bytes::copy_from_slice(&buf[ENCAP_HEADER_SIZE..]),
    })
}

/// RegisterSession request.
pub fn encode_register_session(context: [u8; 8]) -> Bytes {
    let mut payload = BytesMut::with_capacity(4);
    payload.put_u16_le(PROTOCOL_VERSION);
    payload.put_u16_le(0);
    EncapHeader::new(EncapCommand::RegisterSession, 0, context).encode(&payload)
}

/// UnRegisterSession request.
pub fn encode_unregister_session(session: u32, context: [u8; 8]) -> Bytes {
    EncapHeader::new(EncapCommand::UnregisterSession, session, context).encode(&[])
}

/// SendRRData request carrying one unconnected CIP message.
pub fn encode_send_rr_data(session: u32, context: [u8; 8], timeout_s: u16, cip: &[u8]) -> Bytes {
    let mut payload = BytesMut::with_capacity(16 + cip.len());
    payload.put_u32_le(0);
    payload.put_u16_le(timeout_s);
    payload.put_u16_le(2);
    payload.put_u16_le(ITEM_NULL_ADDRESS);
    payload.put_u16_le(0);
    payload.put_u16_le(ITEM_UNCONNECTED_DATA);
    payload.put_u16_le(cip.len() as u16);
    payload.put_slice(cip);
    EncapHeader::new(EncapCommand::SendRrData, session, context).encode(&payload)
}

/// Extract the unconnected data item from a SendRRData reply payload.
pub fn decode_send_rr_data(payload: &[u8]) -> Result<Bytes, CipError> {
    if payload.len() < 8 {
        return Err(CipError::InvalidPacket("SendRRData payload too short"));
    }
    let mut cursor = &payload[6..];
    let count = cursor.get_u16_le();
    for _ in 0..count {
        if cursor.remaining() < 4 {
            return Err(CipError::InvalidPacket("CPF item header truncated"));
        }
        let item_type = cursor.get_u16_le();
        let len = cursor.get_u16_le() as usize;
        if cursor.remaining() < len {
            return Err(CipError::InvalidPacket("CPF item truncated"));
        }
        if item_type == ITEM_UNCONNECTED_DATA {
            return Ok(Bytes::copy_from_slice(&cursor[..len]));
        }
        cursor.advance(len);
    }
    Err(CipError::InvalidPacket("no unconnected data item"))
}
