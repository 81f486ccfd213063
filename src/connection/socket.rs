//! Accepted Connection
//!
//! Wraps one accepted TCP endpoint in non-blocking mode. Availability and
//! liveness are discovered by peeking at the socket; nothing here ever
//! consumes bytes except the explicit `receive` calls.

use std::fmt;
use std::io::{self, Read};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Back-off used by [`Connection::receive`] while waiting for bytes that were
/// promised by a previous `available_bytes` call.
const RECEIVE_RETRY: Duration = Duration::from_millis(1);

/// Flags for [`Connection::receive_at`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecvFlags {
    peek: bool,
}

impl RecvFlags {
    /// Plain read; consumes the bytes.
    pub const NONE: RecvFlags = RecvFlags { peek: false };
    /// Copy the bytes without removing them from the receive queue.
    pub const PEEK: RecvFlags = RecvFlags { peek: true };

    pub fn is_peek(self) -> bool {
        self.peek
    }
}

/// Result of the zero-timeout readability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    /// Nothing queued and no close signal pending.
    NotReadable,
    /// Readable; `peeked` is 0 when the readability came from an orderly shutdown.
    Readable { peeked: usize },
}

/// A live inbound connection owned by the server supervisor.
///
/// Consumers get `Arc<Connection>` handles through events and registry
/// snapshots. A handle can outlive the connection's registration; once the
/// supervisor has emitted `Disconnected` for it, every probe reports it dead.
#[derive(Debug)]
pub struct Connection {
    id: u64,
    stream: TcpStream,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    connected_at: Instant,
    read_buffer_size: usize,
}

impl Connection {
    /// Take ownership of an accepted stream and switch it to non-blocking mode.
    pub(crate) fn new(id: u64, stream: TcpStream, read_buffer_size: usize) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        let peer_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;

        Ok(Self {
            id,
            stream,
            peer_addr,
            local_addr,
            connected_at: Instant::now(),
            read_buffer_size: read_buffer_size.max(1),
        })
    }

    /// Server-assigned id, unique for the lifetime of the server instance.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remote endpoint captured at accept time.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Time since the connection was accepted.
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Number of bytes queued for reading, without consuming them.
    ///
    /// The count is capped at the configured read buffer size. Errors and an
    /// orderly shutdown both read as `0`; [`Connection::is_live`] tells the two
    /// apart from an idle connection. Each call allocates a scratch buffer of
    /// that size.
    pub fn available_bytes(&self) -> usize {
        let mut scratch = vec![0u8; self.read_buffer_size];
        self.available_bytes_into(&mut scratch)
    }

    /// Same probe as [`Connection::available_bytes`], peeking into a
    /// caller-owned buffer. The count is capped at the smaller of
    /// `scratch.len()` and the read buffer size.
    pub(crate) fn available_bytes_into(&self, scratch: &mut [u8]) -> usize {
        let cap = scratch.len().min(self.read_buffer_size);
        let scratch = &mut scratch[..cap];
        if scratch.is_empty() {
            return 0;
        }

        loop {
            match self.stream.peek(scratch) {
                Ok(n) => return n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return 0,
                Err(e) => {
                    trace!(connection_id = self.id, error = %e, "Peek for available bytes failed");
                    return 0;
                }
            }
        }
    }

    /// Non-blocking liveness probe.
    ///
    /// 1. A transport that already reports "not connected" is dead.
    /// 2. Otherwise a zero-timeout readability check runs. Not readable means
    ///    live. Readable is resolved with a one byte peek: a byte waiting means
    ///    live, zero bytes means the peer shut down.
    /// 3. Any transport error along the way is reported as dead.
    pub fn is_live(&self) -> bool {
        if !self.transport_connected() {
            return false;
        }

        match self.poll_readable() {
            Ok(Readiness::NotReadable) => true,
            Ok(Readiness::Readable { peeked }) => peeked > 0,
            Err(e) => {
                debug!(connection_id = self.id, error = %e, "Liveness probe failed");
                false
            }
        }
    }

    /// Fill `buf` completely.
    ///
    /// Callers must have seen `available_bytes() >= buf.len()` first. If fewer
    /// bytes are queued this blocks the calling thread until they arrive.
    pub fn receive(&self, buf: &mut [u8]) -> io::Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match (&self.stream).read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "peer closed before the buffer was filled",
                    ));
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    std::thread::sleep(RECEIVE_RETRY);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Partial read into `buf[offset..offset + size]`.
    ///
    /// Never blocks: returns `WouldBlock` when nothing is queued and `Ok(0)`
    /// once the peer has shut down. With [`RecvFlags::PEEK`] the bytes stay
    /// queued.
    pub fn receive_at(
        &self,
        buf: &mut [u8],
        offset: usize,
        size: usize,
        flags: RecvFlags,
    ) -> io::Result<usize> {
        let end = offset
            .checked_add(size)
            .filter(|&end| end <= buf.len())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "range {}..{}+{} out of bounds for buffer of {} bytes",
                        offset,
                        offset,
                        size,
                        buf.len()
                    ),
                )
            })?;

        let target = &mut buf[offset..end];
        if flags.is_peek() {
            self.stream.peek(target)
        } else {
            (&self.stream).read(target)
        }
    }

    /// Shut down both directions of the endpoint.
    pub(crate) fn close(&self) -> io::Result<()> {
        match self.stream.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e),
            _ => Ok(()),
        }
    }

    fn transport_connected(&self) -> bool {
        if let Err(e) = self.stream.peer_addr() {
            trace!(connection_id = self.id, error = %e, "Transport reports not connected");
            return false;
        }

        match self.stream.take_error() {
            Ok(None) => true,
            Ok(Some(e)) | Err(e) => {
                trace!(connection_id = self.id, error = %e, "Pending socket error");
                false
            }
        }
    }

    /// Zero-timeout readability check. On a non-blocking socket a one byte
    /// peek is exactly that: `WouldBlock` is "not readable", anything else
    /// carries the peek result that resolves the readable case.
    fn poll_readable(&self) -> io::Result<Readiness> {
        let mut probe = [0u8; 1];
        loop {
            match self.stream.peek(&mut probe) {
                Ok(peeked) => return Ok(Readiness::Readable { peeked }),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(Readiness::NotReadable)
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{} ({})", self.id, self.peer_addr)
    }
}
