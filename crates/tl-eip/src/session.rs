//! EtherNet/IP explicit messaging session over TCP.

use std::fmt;
use std::str::FromStr;

use cip::encap::{self, EncapCommand, EncapPacket, ENCAP_HEADER_SIZE};
use cip::{CipError, EPath, GeneralStatus, MessageRequest, MessageResponse, Service};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;
use tracing::{debug, info, trace, warn};

/// Session constants grouped by semantic area.
pub mod consts {
    use std::time::Duration;

    /// EtherNet/IP explicit messaging TCP port.
    pub const PORT: u16 = cip::ENIP_PORT;
    /// Time allowed for the TCP connect plus session registration.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
    /// Time allowed for one request/reply exchange.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
    /// Timeout field of SendRRData, in seconds.
    pub const SEND_RR_TIMEOUT_S: u16 = 10;
    /// Sender context echoed back by the controller.
    pub const SENDER_CONTEXT: [u8; 8] = *b"paxtags\0";
    /// Backplane slot used when the path does not name one.
    pub const DEFAULT_SLOT: u8 = 0;
}

/// Errors that can occur on the EtherNet/IP control path.
#[derive(Debug, Error)]
pub enum EipError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol: {0}")]
    Protocol(String),
    #[error("timeout waiting for reply")]
    Timeout,
    #[error("CIP: {0}")]
    Cip(#[from] CipError),
    #[error("service {service:#04x} failed with status {status:?} {extended:?}")]
    Status {
        service: u8,
        status: GeneralStatus,
        extended: Vec<u16>,
    },
    #[error("invalid communication path '{0}'")]
    Path(String),
}

/// Where the controller lives: `host[:port][/slot]` or `host[:port]/bp/slot`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommPath {
    pub host: String,
    pub port: u16,
    pub slot: u8,
}

impl FromStr for CommPath {
    type Err = EipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EipError::Path(s.to_string());
        let mut parts = s.trim().split('/');
        let endpoint = parts.next().filter(|p| !p.is_empty()).ok_or_else(invalid)?;
        let (host, port) = match endpoint.rsplit_once(':') {
            Some((host, port)) => (host, port.parse().map_err(|_| invalid())?),
            None => (endpoint, consts::PORT),
        };
        if host.is_empty() {
            return Err(invalid());
        }
        let rest: Vec<&str> = parts.collect();
        let slot = match rest.as_slice() {
            [] => consts::DEFAULT_SLOT,
            [slot] => slot.parse().map_err(|_| invalid())?,
            [bp, slot] if matches!(bp.to_ascii_lowercase().as_str(), "bp" | "backplane" | "1") => {
                slot.parse().map_err(|_| invalid())?
            }
            _ => return Err(invalid()),
        };
        Ok(CommPath {
            host: host.to_string(),
            port,
            slot,
        })
    }
}

impl fmt::Display for CommPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.port, self.slot)
    }
}

/// Registered EtherNet/IP session routed to one controller.
pub struct EipSession {
    stream: TcpStream,
    session: u32,
    route: EPath,
    path: CommPath,
}

impl EipSession {
    /// Open the TCP connection and register a session.
    pub async fn connect(path: &CommPath) -> Result<Self, EipError> {
        let attempt = async {
            let mut stream = TcpStream::connect((path.host.as_str(), path.port)).await?;
            stream.set_nodelay(true)?;
            let register = encap::encode_register_session(consts::SENDER_CONTEXT);
            stream.write_all(&register).await?;
            let reply = read_packet(&mut stream).await?;
            if reply.header.command != EncapCommand::RegisterSession {
                return Err(EipError::Protocol(format!(
                    "unexpected reply {:?} to RegisterSession",
                    reply.header.command
                )));
            }
            Ok::<_, EipError>((stream, reply.header.session))
        };
        let (stream, session) = time::timeout(consts::CONNECT_TIMEOUT, attempt)
            .await
            .map_err(|_| EipError::Timeout)??;
        info!(%path, session, "registered EtherNet/IP session");
        Ok(Self {
            stream,
            session,
            route: cip::backplane_route(path.slot),
            path: path.clone(),
        })
    }

    /// Session handle assigned by the controller.
    pub fn session_handle(&self) -> u32 {
        self.session
    }

    pub fn path(&self) -> &CommPath {
        &self.path
    }

    /// Send one explicit message and wait for its reply.
    ///
    /// Returns the reply for success and partial-transfer status; any other
    /// status becomes [`EipError::Status`].
    pub async fn request(&mut self, request: &MessageRequest) -> Result<MessageResponse, EipError> {
        let routed = cip::unconnected_send(request, &self.route);
        let packet = encap::encode_send_rr_data(
            self.session,
            consts::SENDER_CONTEXT,
            consts::SEND_RR_TIMEOUT_S,
            &routed.encode(),
        );
        trace!(service = request.service, bytes = packet.len(), "sending CIP request");
        let reply = time::timeout(consts::REQUEST_TIMEOUT, self.exchange(&packet))
            .await
            .map_err(|_| EipError::Timeout)??;
        if reply.header.command != EncapCommand::SendRrData {
            return Err(EipError::Protocol(format!(
                "unexpected reply {:?} to SendRRData",
                reply.header.command
            )));
        }
        let data = encap::decode_send_rr_data(&reply.payload)?;
        let response = cip::decode_response(&data)?;
        trace!(
            service = response.service,
            status = ?response.status,
            bytes = response.data.len(),
            "received CIP reply"
        );
        if response.service != request.service {
            if response.service == Service::UnconnectedSend.code() {
                warn!(status = ?response.status, "routing to controller failed");
                return Err(EipError::Status {
                    service: response.service,
                    status: response.status,
                    extended: response.extended_status,
                });
            }
            return Err(EipError::Protocol(format!(
                "reply for service {:#04x} does not match request {:#04x}",
                response.service, request.service
            )));
        }
        if !response.is_ok() {
            return Err(EipError::Status {
                service: request.service,
                status: response.status,
                extended: response.extended_status,
            });
        }
        Ok(response)
    }

    async fn exchange(&mut self, packet: &[u8]) -> Result<EncapPacket, EipError> {
        self.stream.write_all(packet).await?;
        read_packet(&mut self.stream).await
    }

    /// Unregister the session and close the socket.
    pub async fn close(mut self) -> Result<(), EipError> {
        let packet = encap::encode_unregister_session(self.session, consts::SENDER_CONTEXT);
        self.stream.write_all(&packet).await?;
        self.stream.shutdown().await?;
        debug!(path = %self.path, "closed EtherNet/IP session");
        Ok(())
    }
}

/// Read one complete encapsulation packet from the stream.
pub(crate) async fn read_packet(stream: &mut TcpStream) -> Result<EncapPacket, EipError> {
    let mut header = [0u8; ENCAP_HEADER_SIZE];
    stream.read_exact(&mut header).await?;
    let length = u16::from_le_bytes([header[2], header[3]]) as usize;
    let mut buf = vec![0u8; ENCAP_HEADER_SIZE + length];
    buf[..ENCAP_HEADER_SIZE].copy_from_slice(&header);
    stream.read_exact(&mut buf[ENCAP_HEADER_SIZE..]).await?;
    Ok(encap::decode_packet(&buf)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_host_only() {
        let path: CommPath = "192.168.1.10".parse().expect("path");
        assert_eq!(
            path,
            CommPath {
                host: "192.168.1.10".into(),
                port: 44818,
                slot: 0
            }
        );
    }

    #[test]
    fn parse_port_and_slot() {
        let path: CommPath = "10.0.0.5:2222/3".parse().expect("path");
        assert_eq!(path.port, 2222);
        assert_eq!(path.slot, 3);
        assert_eq!(path.to_string(), "10.0.0.5:2222/3");
    }

    #[test]
    fn parse_backplane_form() {
        let path: CommPath = "plc.local/bp/2".parse().expect("path");
        assert_eq!(path.host, "plc.local");
        assert_eq!(path.slot, 2);
        let path: CommPath = "plc.local/1/4".parse().expect("path");
        assert_eq!(path.slot, 4);
    }

    #[test]
    fn reject_malformed_paths() {
        for bad in ["", "/1", "host:abc", "host/x", "host/2/3/4", ":44818", "host/300"] {
            assert!(bad.parse::<CommPath>().is_err(), "{bad} should be rejected");
        }
    }

    #[tokio::test]
    async fn connect_refused_is_an_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);
        let path = CommPath {
            host: "127.0.0.1".into(),
            port,
            slot: 0,
        };
        assert!(EipSession::connect(&path).await.is_err());
    }
}
