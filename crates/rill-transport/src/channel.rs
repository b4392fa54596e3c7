//! # Channel Abstraction
//!
//! The transport runs over any bidirectional datagram channel bounded by
//! [`MAX_DATAGRAM`](crate::wire::MAX_DATAGRAM). The channel may lose,
//! duplicate, reorder, and corrupt datagrams; `send` is fire-and-forget and
//! `recv_timeout` is the only blocking operation either endpoint performs.

use std::io;
use std::net::UdpSocket;
use std::time::Duration;

use crate::error::ChannelError;
use crate::wire::MAX_DATAGRAM;

/// An unreliable, MTU-bounded datagram channel.
pub trait Channel {
    /// Send one datagram. Fire-and-forget; only a defunct channel is
    /// reported.
    fn send(&mut self, datagram: &[u8]) -> Result<(), ChannelError>;

    /// Block up to `timeout` for one datagram.
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Vec<u8>, ChannelError>;
}

// ─── UDP Channel ────────────────────────────────────────────────────────────

/// A [`Channel`] over a connected UDP socket.
///
/// Binds an ephemeral local port and connects to the rendezvous port on
/// loopback (the simulated-network relay both endpoints dial into). An empty
/// datagram from the peer signals channel close.
pub struct UdpChannel {
    socket: UdpSocket,
    /// Cached read timeout, to skip redundant setsockopt calls.
    current_timeout: Option<Duration>,
}

impl UdpChannel {
    /// Connect to `127.0.0.1:port`.
    pub fn connect(port: u16) -> io::Result<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0")?;
        socket.connect(("127.0.0.1", port))?;
        Ok(UdpChannel {
            socket,
            current_timeout: None,
        })
    }

    /// Wrap an already-configured socket (it must be connected).
    pub fn from_socket(socket: UdpSocket) -> Self {
        UdpChannel {
            socket,
            current_timeout: None,
        }
    }
}

impl Channel for UdpChannel {
    fn send(&mut self, datagram: &[u8]) -> Result<(), ChannelError> {
        self.socket
            .send(datagram)
            .map(|_| ())
            .map_err(|_| ChannelError::Closed)
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<Vec<u8>, ChannelError> {
        if self.current_timeout != Some(timeout) {
            self.socket
                .set_read_timeout(Some(timeout))
                .map_err(|_| ChannelError::Closed)?;
            self.current_timeout = Some(timeout);
        }

        let mut buf = vec![0u8; MAX_DATAGRAM];
        match self.socket.recv(&mut buf) {
            Ok(0) => Err(ChannelError::Closed),
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(ref e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut =>
            {
                Err(ChannelError::Timeout)
            }
            Err(_) => Err(ChannelError::Closed),
        }
    }
}
