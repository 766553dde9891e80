use std::io::{self, Read, Write};
use std::{collections::VecDeque, net::SocketAddr};

use mio::{Interest, Registry, Token, event::Event};
use tracing::{debug, warn};

const RX_CHUNK_SIZE: usize = 32 * 1024;

/// Response type for all external calls.
///
/// `Alive` means the connection is still usable. `Disconnected` means the
/// peer is gone and the caller must rebuild the connection.
#[derive(Debug, PartialEq, Eq)]
pub enum ConnState {
    Alive,
    Disconnected,
}

/// Single mio-backed TCP connection. Carries no framing of its own: bytes
/// read are appended verbatim to the caller's per-session inbound buffer,
/// and bytes to send are accepted as already-framed wire bytes (a FIX frame,
/// an OUCH/SoupBinTCP packet, ...). Framing is entirely the codec's job
/// (C1); this type only moves bytes.
pub struct TcpStream {
    stream: mio::net::TcpStream,
    peer_addr: SocketAddr,
    token: Token,

    rx_chunk: Vec<u8>,
    inbound: Vec<u8>,
    send_backlog: VecDeque<Vec<u8>>,
    writable_armed: bool,
}

impl TcpStream {
    pub(crate) fn from_stream(
        stream: mio::net::TcpStream,
        peer_addr: SocketAddr,
        token: Token,
    ) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            peer_addr,
            token,
            rx_chunk: vec![0; RX_CHUNK_SIZE],
            inbound: Vec::with_capacity(RX_CHUNK_SIZE),
            send_backlog: VecDeque::with_capacity(16),
            writable_armed: false,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Bytes read from the wire but not yet consumed by the codec's framing.
    pub fn inbound(&self) -> &[u8] {
        &self.inbound
    }

    /// Drops the first `n` bytes of `inbound`, called by the caller after
    /// the codec has framed off complete messages.
    pub fn consume(&mut self, n: usize) {
        self.inbound.drain(..n);
    }

    /// On a readable event, appends every available byte to the internal
    /// inbound buffer (see [`Self::inbound`]). On a writable event, drains
    /// the send backlog. Framing is entirely the caller's responsibility.
    #[inline]
    pub fn poll_with(&mut self, registry: &Registry, ev: &Event) -> ConnState {
        if ev.is_readable() && self.read_into_inbound() == ConnState::Disconnected {
            return ConnState::Disconnected;
        }
        if ev.is_writable() && self.drain_backlog(registry) == ConnState::Disconnected {
            return ConnState::Disconnected;
        }
        ConnState::Alive
    }

    #[inline]
    fn read_into_inbound(&mut self) -> ConnState {
        loop {
            match self.stream.read(&mut self.rx_chunk) {
                Ok(0) => return ConnState::Disconnected,
                Ok(n) => {
                    self.inbound.extend_from_slice(&self.rx_chunk[..n]);
                    if n < self.rx_chunk.len() {
                        return ConnState::Alive;
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return ConnState::Alive,
                Err(err) => {
                    debug!(?err, "tcp: read");
                    return ConnState::Disconnected;
                }
            }
        }
    }

    /// Writes already-framed `bytes` now if possible, queueing the
    /// unwritten remainder (this path allocates) if the socket would block.
    #[inline]
    pub fn write_or_enqueue(&mut self, registry: &Registry, bytes: &[u8]) -> ConnState {
        if !self.send_backlog.is_empty() {
            return self.enqueue_back(registry, bytes.to_vec());
        }

        match self.stream.write(bytes) {
            Ok(0) => {
                warn!("tcp: stream failed to write, disconnecting");
                ConnState::Disconnected
            }
            Ok(n) if n == bytes.len() => ConnState::Alive,
            Ok(n) => self.enqueue_front(registry, bytes[n..].to_vec()),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.enqueue_back(registry, bytes.to_vec())
            }
            Err(err) => {
                warn!(?err, "tcp: stream write fail");
                ConnState::Disconnected
            }
        }
    }

    #[inline]
    fn drain_backlog(&mut self, registry: &Registry) -> ConnState {
        while let Some(front) = self.send_backlog.front_mut() {
            match self.stream.write(front) {
                Ok(0) => return ConnState::Disconnected,
                Ok(n) => {
                    if n == front.len() {
                        self.send_backlog.pop_front();
                    } else {
                        front.drain(..n);
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    debug!(?err, "tcp: write from backlog");
                    return ConnState::Disconnected;
                }
            }
        }

        if self.send_backlog.is_empty() && self.writable_armed {
            if let Err(err) = registry.reregister(&mut self.stream, self.token, Interest::READABLE) {
                debug!(?err, "tcp: reregister drop writable");
                return ConnState::Disconnected;
            }
            self.writable_armed = false;
        }
        ConnState::Alive
    }

    #[inline]
    fn enqueue_front(&mut self, registry: &Registry, data: Vec<u8>) -> ConnState {
        self.send_backlog.push_front(data);
        self.arm_writable(registry)
    }

    #[inline]
    fn enqueue_back(&mut self, registry: &Registry, data: Vec<u8>) -> ConnState {
        self.send_backlog.push_back(data);
        self.arm_writable(registry)
    }

    #[inline]
    fn arm_writable(&mut self, registry: &Registry) -> ConnState {
        if !self.writable_armed {
            if let Err(err) =
                registry.reregister(&mut self.stream, self.token, Interest::READABLE | Interest::WRITABLE)
            {
                debug!(?err, "tcp: poll reregister");
                return ConnState::Disconnected;
            }
            self.writable_armed = true;
        }
        ConnState::Alive
    }

    pub fn close(&mut self, registry: &Registry) -> SocketAddr {
        debug!("terminating connection");
        let _ = registry.deregister(&mut self.stream);
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
        self.peer_addr
    }
}

/// Sets kernel `SO_SNDBUF`/`SO_RCVBUF` on a mio `TcpStream`.
pub(crate) fn set_socket_buf_size(stream: &mio::net::TcpStream, size: usize) {
    use std::os::fd::AsRawFd;
    let fd = stream.as_raw_fd();
    let size = size as libc::c_int;
    unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_SNDBUF,
            &size as *const _ as *const libc::c_void,
            core::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            &size as *const _ as *const libc::c_void,
            core::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
    }
}
