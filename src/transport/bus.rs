use super::{DiagnosticTransport, check_frame};
use crate::errors::TransportError;
use crate::network::NetMessage;
use crate::types::CanFrame;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{Shutdown, TcpStream};
use std::time::{Duration, Instant};

/// Smallest read timeout handed to the socket (zero means "block forever")
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Blocking client for the virtual CAN bus server.
///
/// The server echoes every frame to every node, so frames stamped with our own
/// client name are dropped on receive.
pub struct BusTransport {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
    client_name: String,
    partial_line: Vec<u8>,
}

impl BusTransport {
    /// Connect to the bus server and register
    pub fn connect(addr: &str, client_name: String) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)
            .map_err(|e| TransportError::Disconnected(format!("{}: {}", addr, e)))?;
        stream.set_nodelay(true)?;
        let reader = BufReader::new(stream.try_clone()?);

        let mut transport = Self {
            writer: stream,
            reader,
            client_name: client_name.clone(),
            partial_line: Vec::new(),
        };
        transport.send_message(&NetMessage::Register { client_name })?;
        Ok(transport)
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    fn send_message(&mut self, msg: &NetMessage) -> Result<(), TransportError> {
        let json = serde_json::to_string(msg)?;
        self.writer.write_all(json.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Read one message, keeping any partial line across timeouts
    fn read_message(&mut self, timeout: Duration) -> Result<Option<NetMessage>, TransportError> {
        self.reader
            .get_ref()
            .set_read_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))?;

        match self.reader.read_until(b'\n', &mut self.partial_line) {
            Ok(0) => Err(TransportError::Disconnected(
                "bus server closed the connection".to_string(),
            )),
            Ok(_) if self.partial_line.last() != Some(&b'\n') => Err(
                TransportError::Disconnected("bus server closed mid-message".to_string()),
            ),
            Ok(_) => {
                let line = std::mem::take(&mut self.partial_line);
                let msg: NetMessage = serde_json::from_slice(&line)?;
                Ok(Some(msg))
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl DiagnosticTransport for BusTransport {
    fn send(&mut self, frame: &CanFrame) -> Result<(), TransportError> {
        check_frame(frame)?;
        self.send_message(&NetMessage::CanFrame(frame.clone()))
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<CanFrame>, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            match self.read_message(deadline - now)? {
                None => return Ok(None),
                Some(NetMessage::CanFrame(frame)) if frame.source != self.client_name => {
                    return Ok(Some(frame));
                }
                // own echo, acks, server notices
                Some(_) => continue,
            }
        }
    }

    fn shutdown(&mut self) {
        let _ = self.writer.shutdown(Shutdown::Both);
    }
}

impl std::fmt::Debug for BusTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusTransport")
            .field("client_name", &self.client_name)
            .field("peer", &self.writer.peer_addr().ok())
            .finish()
    }
}
