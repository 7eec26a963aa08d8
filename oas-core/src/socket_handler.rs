//! Single-client TCP framing (spec.md §4.5).
//!
//! Owns the listening socket and, at most, one connected client. Bytes are
//! split on NUL into packets and handed to [`crate::message::parse_packet`],
//! except immediately after a successful `PTFI` parse, where the next
//! `size` bytes are diverted straight to the [`FileHandler`] instead of
//! going through NUL framing (grounded on the accept/read-loop shape of
//! `event_server/mod.rs`, generalized from unix/tcp line framing to NUL
//! framing with the PTFI byte-count exception).

use log::{debug, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use std::collections::VecDeque;
use std::net::SocketAddr;

use crate::file_handler::FileHandler;
use crate::message::{parse_packet, Command, ParseError};
use crate::time::Time;

const MAX_PACKET_LEN: usize = 1024;
const READ_CHUNK_LEN: usize = 1024;

struct Client {
    stream: TcpStream,
    buf: Vec<u8>,
}

pub struct SocketHandler {
    listener: TcpListener,
    client: Option<Client>,
}

impl SocketHandler {
    pub async fn bind(addr: SocketAddr) -> std::io::Result<SocketHandler> {
        let listener = TcpListener::bind(addr).await?;
        Ok(SocketHandler { listener, client: None })
    }

    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    /// Blocks until `deadline` or until at least one message (or parse
    /// failure) is ready, draining anything else already buffered without
    /// further blocking. An empty `out` on return means the deadline was
    /// reached with nothing to report, which the main loop treats as the
    /// cue to run `AudioHandler::update_sources` (spec.md §4.6).
    pub async fn populate_queue_with_incoming_messages(
        &mut self,
        out: &mut VecDeque<std::result::Result<Command, ParseError>>,
        files: &FileHandler,
        deadline: Time,
    ) {
        loop {
            let now = Time::now();
            if now >= deadline {
                return;
            }
            let remaining = deadline.duration_since(now);

            if self.client.is_none() {
                match timeout(remaining, self.listener.accept()).await {
                    Ok(Ok((stream, addr))) => {
                        info!("accepted client {}", addr);
                        let _ = stream.set_nodelay(true);
                        self.client = Some(Client { stream, buf: Vec::new() });
                    }
                    Ok(Err(e)) => {
                        warn!("accept failed: {}", e);
                        return;
                    }
                    Err(_) => return, // timed out waiting for a connection
                }
                continue;
            }

            if self.process_buffer(out, files).await {
                return;
            }

            let client = self.client.as_mut().expect("checked above");
            let mut chunk = [0u8; READ_CHUNK_LEN];
            let read = timeout(remaining, client.stream.read(&mut chunk)).await;

            match read {
                Ok(Ok(0)) => {
                    info!("client disconnected");
                    self.client = None;
                    return;
                }
                Ok(Ok(n)) => {
                    client.buf.extend_from_slice(&chunk[..n]);
                    if self.process_buffer(out, files).await {
                        return;
                    }
                }
                Ok(Err(e)) => {
                    warn!("read error: {}", e);
                    self.client = None;
                    return;
                }
                Err(_) => return, // deadline reached
            }
        }
    }

    /// Parses whatever full packets are now in the client buffer. For a
    /// successful PTFI, performs the raw byte-count diversion before
    /// resuming normal framing. Returns true once there's something in
    /// `out` worth returning for.
    async fn process_buffer(
        &mut self,
        out: &mut VecDeque<std::result::Result<Command, ParseError>>,
        files: &FileHandler,
    ) -> bool {
        loop {
            let client = match self.client.as_mut() {
                Some(c) => c,
                None => return !out.is_empty(),
            };

            let pos = match client.buf.iter().position(|&b| b == 0) {
                Some(pos) => pos,
                None => return !out.is_empty(),
            };

            let packet: Vec<u8> = client.buf.drain(..=pos).collect();
            let packet = packet[..packet.len() - 1].to_vec();

            if packet.len() + 1 > MAX_PACKET_LEN {
                out.push_back(Err(ParseError::TooLarge));
                continue;
            }

            match parse_packet(&packet) {
                Ok(Command::Ptfi { filename, size }) => {
                    if let Err(e) = self.receive_ptfi_payload(&filename, size, files).await {
                        warn!("PTFI transfer for '{}' failed: {}", filename, e);
                    }
                    // No response is produced for PTFI itself (spec.md §4.1);
                    // the client discovers success via a following GHDL.
                }
                result => out.push_back(result),
            }
        }
    }

    /// Consumes exactly `size` bytes as raw file content: whatever's left
    /// in the framing buffer first, then directly off the socket. This
    /// happens before control returns to the main loop, per spec.md §5.
    async fn receive_ptfi_payload(&mut self, filename: &str, size: u64, files: &FileHandler) -> crate::error::Result<()> {
        let client = self.client.as_mut().expect("caller holds a client");

        let from_buf = (client.buf.len() as u64).min(size) as usize;
        let mut leading: Vec<u8> = client.buf.drain(..from_buf).collect();
        let remaining = size - leading.len() as u64;

        if remaining > 0 {
            let mut rest = vec![0u8; remaining as usize];
            client.stream.read_exact(&mut rest).await.map_err(crate::error::Error::Io)?;
            leading.extend_from_slice(&rest);
        }

        debug!("received {} bytes for '{}'", leading.len(), filename);
        let mut cursor = std::io::Cursor::new(leading);
        files.receive_file(filename, size, &mut cursor).await
    }

    /// Writes a NUL-terminated ASCII integer response, or the literal
    /// `"SYNC"`, to the current client. A response with no connected
    /// client (client disconnected between dispatch and response) is
    /// silently dropped.
    pub async fn send_response(&mut self, text: &str) {
        let client = match self.client.as_mut() {
            Some(c) => c,
            None => return,
        };

        let mut packet = text.as_bytes().to_vec();
        packet.push(0);

        if let Err(e) = client.stream.write_all(&packet).await {
            warn!("failed to write response: {}", e);
            self.client = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::io::AsyncWriteExt as _;
    use tokio::net::TcpStream;

    async fn bind_loopback() -> SocketHandler {
        SocketHandler::bind("127.0.0.1:0".parse().unwrap()).await.unwrap()
    }

    async fn local_addr(handler: &SocketHandler) -> SocketAddr {
        handler.listener.local_addr().unwrap()
    }

    #[tokio::test]
    async fn parses_one_packet_per_nul() {
        let mut handler = bind_loopback().await;
        let addr = local_addr(&handler).await;
        let dir = tempdir().unwrap();
        let files = FileHandler::new(dir.path()).unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"SYNC\0TEST\0").await.unwrap();

        let mut queue = VecDeque::new();
        let deadline = Time::now() + std::time::Duration::from_millis(200);
        handler.populate_queue_with_incoming_messages(&mut queue, &files, deadline).await;

        // Second drain picks up whatever the first read didn't flush out.
        let deadline2 = Time::now() + std::time::Duration::from_millis(200);
        handler.populate_queue_with_incoming_messages(&mut queue, &files, deadline2).await;

        assert!(queue.contains(&Ok(Command::Sync)));
    }

    #[tokio::test]
    async fn ptfi_payload_is_written_before_resuming_framing() {
        let mut handler = bind_loopback().await;
        let addr = local_addr(&handler).await;
        let dir = tempdir().unwrap();
        let files = FileHandler::new(dir.path()).unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        let payload = b"hello-ptfi-contents";
        let mut packet = format!("PTFI ding.raw {}\0", payload.len()).into_bytes();
        packet.extend_from_slice(payload);
        packet.extend_from_slice(b"GHDL ding.raw\0");
        client.write_all(&packet).await.unwrap();

        let mut queue = VecDeque::new();
        let deadline = Time::now() + std::time::Duration::from_millis(300);
        handler.populate_queue_with_incoming_messages(&mut queue, &files, deadline).await;

        assert_eq!(files.read("ding.raw").unwrap(), payload);
        assert!(queue.iter().any(|m| matches!(m, Ok(Command::Ghdl { filename }) if filename == "ding.raw")));
    }

    #[tokio::test]
    async fn oversized_packet_yields_too_large_error() {
        let mut handler = bind_loopback().await;
        let addr = local_addr(&handler).await;
        let dir = tempdir().unwrap();
        let files = FileHandler::new(dir.path()).unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut huge = vec![b'A'; 1100];
        huge.push(0);
        client.write_all(&huge).await.unwrap();

        let mut queue = VecDeque::new();
        let deadline = Time::now() + std::time::Duration::from_millis(200);
        handler.populate_queue_with_incoming_messages(&mut queue, &files, deadline).await;

        assert!(queue.iter().any(|m| matches!(m, Err(ParseError::TooLarge))));
    }
}
