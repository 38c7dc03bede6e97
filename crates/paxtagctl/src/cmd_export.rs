use std::path::PathBuf;

use anyhow::{Context, Result};
use paxtags::eip::{CommPath, LogixController};
use paxtags::tags::{SourceError, TagError, TagSource};
use paxtags::{export, write_export, ExportError, ExportOptions, ExportOutcome};
use tracing::{info, warn};

/// How an export run ended.
#[derive(Debug, PartialEq, Eq)]
pub enum Finished {
    Written(PathBuf),
    NoInstances,
    Unreachable,
}

/// Connect, export `type_name` and write the import file.
///
/// The session is unregistered on every path once it has been opened.
pub async fn run(commpath: &str, type_name: &str, options: &ExportOptions) -> Result<Finished> {
    println!("Connecting to PLC.");
    let (mut plc, controller) = match connect(commpath).await {
        Ok(connected) => connected,
        Err(err) => return Ok(unreachable(commpath, &err)),
    };
    println!("Connected to {controller} PLC at {commpath}");

    let finished = generate(&mut plc, commpath, type_name, options).await;
    close(plc).await;
    finished
}

async fn generate(
    plc: &mut LogixController,
    commpath: &str,
    type_name: &str,
    options: &ExportOptions,
) -> Result<Finished> {
    println!("Generating Ignition tag XML file");
    let outcome = match export(plc, type_name, options).await {
        Ok(outcome) => outcome,
        Err(ExportError::Source(err)) => return Ok(unreachable(commpath, &err)),
        Err(err) => return Err(err).context("building tag document"),
    };

    match outcome {
        ExportOutcome::Generated(generated) => {
            report_rejected(&generated.rejected);
            println!("Generation complete. Writing to file");
            let path = write_export(&generated, &options.output_dir)
                .context("writing tag import file")?;
            info!(path = %path.display(), instances = generated.instance_count, "export done");
            Ok(Finished::Written(path))
        }
        ExportOutcome::NoInstances { rejected, .. } => {
            report_rejected(&rejected);
            println!("No instances of type in PLC");
            Ok(Finished::NoInstances)
        }
    }
}

async fn connect(commpath: &str) -> Result<(LogixController, String), SourceError> {
    let path: CommPath = commpath.parse()?;
    let mut plc = LogixController::open(&path).await?;
    match plc.controller_name().await {
        Ok(controller) => Ok((plc, controller)),
        Err(err) => {
            close(plc).await;
            Err(err)
        }
    }
}

async fn close(plc: LogixController) {
    if let Err(err) = plc.close().await {
        warn!(%err, "closing session");
    }
}

fn unreachable(commpath: &str, err: &SourceError) -> Finished {
    warn!(%err, "controller unavailable");
    println!("Unable to connect to PLC at {commpath}");
    Finished::Unreachable
}

fn report_rejected(rejected: &[TagError]) {
    for err in rejected {
        println!("Skipped {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paxtags::cip::encap::{self, EncapCommand, EncapHeader, ENCAP_HEADER_SIZE};
    use paxtags::cip::logix::BASE_TAG_BIT;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    /// One `Count : DINT` tag at controller scope.
    fn symbol_page() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&5u16.to_le_bytes());
        out.extend_from_slice(b"Count");
        out.extend_from_slice(&0x00C4u16.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&BASE_TAG_BIT.to_le_bytes());
        out.extend_from_slice(&[0u8; 12]);
        out
    }

    /// Reply status and data for an embedded request service.
    fn answer(service: u8, refuse_name: bool) -> (u8, Vec<u8>) {
        match service {
            0x01 if refuse_name => (0x08, Vec::new()),
            0x01 => {
                let mut out = 5u16.to_le_bytes().to_vec();
                out.extend_from_slice(b"Line1");
                (0x00, out)
            }
            0x55 => (0x00, symbol_page()),
            _ => (0x08, Vec::new()),
        }
    }

    /// Serve one connection; resolves to whether the client unregistered.
    async fn serve(mut stream: TcpStream, refuse_name: bool) -> bool {
        loop {
            let mut header = [0u8; ENCAP_HEADER_SIZE];
            if stream.read_exact(&mut header).await.is_err() {
                return false;
            }
            let len = u16::from_le_bytes([header[2], header[3]]) as usize;
            let mut payload = vec![0u8; len];
            if stream.read_exact(&mut payload).await.is_err() {
                return false;
            }
            let mut context = [0u8; 8];
            context.copy_from_slice(&header[12..20]);
            match EncapCommand::from_code(u16::from_le_bytes([header[0], header[1]])) {
                Ok(EncapCommand::RegisterSession) => {
                    let reply = EncapHeader::new(EncapCommand::RegisterSession, 0x42, context)
                        .encode(&payload);
                    stream.write_all(&reply).await.expect("register reply");
                }
                Ok(EncapCommand::UnregisterSession) => return true,
                Ok(EncapCommand::SendRrData) => {
                    let routed = encap::decode_send_rr_data(&payload).expect("cpf");
                    // Unconnected Send: service, path words, 4 path bytes, ticks, length
                    let service = routed[10];
                    let (status, data) = answer(service, refuse_name);
                    let mut cip = vec![service | 0x80, 0, status, 0];
                    cip.extend_from_slice(&data);
                    let reply = encap::encode_send_rr_data(0x42, context, 0, &cip);
                    stream.write_all(&reply).await.expect("data reply");
                }
                Err(_) => return false,
            }
        }
    }

    async fn fake_controller(refuse_name: bool) -> (String, JoinHandle<bool>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            serve(stream, refuse_name).await
        });
        (format!("127.0.0.1:{port}"), server)
    }

    #[tokio::test]
    async fn malformed_path_is_unreachable() {
        let finished = run("plc/x/y/z", "P_AIn", &ExportOptions::default())
            .await
            .expect("run");
        assert_eq!(finished, Finished::Unreachable);
    }

    #[tokio::test]
    async fn refused_connection_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);
        let finished = run(&format!("127.0.0.1:{port}"), "P_AIn", &ExportOptions::default())
            .await
            .expect("run");
        assert_eq!(finished, Finished::Unreachable);
    }

    #[tokio::test]
    async fn failed_name_read_still_unregisters() {
        let (commpath, server) = fake_controller(true).await;
        let finished = run(&commpath, "DINT", &ExportOptions::default())
            .await
            .expect("run");
        assert_eq!(finished, Finished::Unreachable);
        assert!(server.await.expect("server"), "session was not unregistered");
    }

    #[tokio::test]
    async fn failed_write_still_unregisters() {
        let (commpath, server) = fake_controller(false).await;
        let options = ExportOptions {
            output_dir: std::env::temp_dir()
                .join("paxtagctl-no-such-dir")
                .join("nested"),
            ..ExportOptions::default()
        };
        let err = run(&commpath, "DINT", &options).await.expect_err("write must fail");
        assert!(err.to_string().contains("writing tag import file"));
        assert!(server.await.expect("server"), "session was not unregistered");
    }

    #[tokio::test]
    async fn no_instances_unregisters() {
        let (commpath, server) = fake_controller(false).await;
        let finished = run(&commpath, "P_AIn", &ExportOptions::default())
            .await
            .expect("run");
        assert_eq!(finished, Finished::NoInstances);
        assert!(server.await.expect("server"));
    }
}
