//! The socket control block a session is attached to.
//!
//! A socket is the part of a connection that the user owns: the addressing, the stream buffers
//! and the shutdown flags. Protocol state lives in a separate [`Session`] which only exists
//! between an open (or listen) and the end of the connection. A socket may outlive its session,
//! for example to drain the receive buffer after the peer reset the connection.
//!
//! [`Session`]: struct.Session.html
use core::fmt;
use alloc::collections::VecDeque;

use crate::layer::ip::InterfaceId;
use crate::managed::Key;
use crate::wire::Ipv6Address;

/// The addressing of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourTuple {
    /// The local address, unspecified for a wildcard listener.
    pub local: Ipv6Address,
    /// The local port.
    pub local_port: u16,
    /// The remote address, unspecified while not connected.
    pub remote: Ipv6Address,
    /// The remote port, zero while not connected.
    pub remote_port: u16,
}

/// Identifies a socket of an endpoint.
///
/// The handle is invalidated when the socket is freed. It never refers to a socket created later
/// in the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketHandle(pub(crate) Key);

/// Buffer sizing of a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Options {
    /// Capacity of the receive buffer, also the largest window ever advertised.
    pub rx_capacity: usize,
    /// Capacity of the send buffer.
    pub tx_capacity: usize,
    /// The free space in the send buffer at which a `SendSpace` event is raised.
    pub low_water: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            rx_capacity: 1024,
            tx_capacity: 1024,
            low_water: 256,
        }
    }
}

/// A byte queue with a capacity fixed at creation.
#[derive(Debug)]
pub(crate) struct SockBuf {
    data: VecDeque<u8>,
    capacity: usize,
}

/// The user visible part of a connection.
#[derive(Debug)]
pub struct Socket {
    pub(crate) tuple: FourTuple,
    pub(crate) interface: Option<InterfaceId>,
    pub(crate) options: Options,
    pub(crate) rx: SockBuf,
    pub(crate) tx: SockBuf,
    /// The user closed the sending direction.
    pub(crate) cant_send_more: bool,
    /// The user shut down the receiving direction, or the connection ended.
    pub(crate) cant_recv_more: bool,
    /// No user holds a handle, the socket is freed together with its session.
    pub(crate) released: bool,
    pub(crate) session: Option<Key>,
    /// The listener that spawned this socket with a passive open.
    pub(crate) listener: Option<SocketHandle>,
}

/// A notification for the user of a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Event {
    /// The socket concerned.
    pub socket: SocketHandle,
    /// What happened.
    pub kind: EventKind,
}

/// The kind of a socket event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// An active open completed the handshake.
    Connected,
    /// A passive open completed the handshake.
    ///
    /// The event is raised for the new socket, the listener that spawned it is given here.
    Incoming {
        /// The listening socket.
        listener: SocketHandle,
    },
    /// An active open was refused by a reset or ran out of retries.
    ConnectFailed,
    /// New data is available for `recv`.
    Data,
    /// The peer sent its FIN, no more data will arrive.
    PeerClosed,
    /// The peer reset the connection.
    Reset,
    /// The peer stopped acknowledging retransmissions.
    TimedOut,
    /// Acknowledged data freed space in the send buffer.
    SendSpace,
    /// The connection ended gracefully.
    Closed,
}

impl SockBuf {
    pub(crate) fn new(capacity: usize) -> Self {
        SockBuf {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn free(&self) -> usize {
        self.capacity - self.data.len()
    }

    /// Append as much of `bytes` as fits, returning the number of bytes taken.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> usize {
        let len = bytes.len().min(self.free());
        self.data.extend(bytes[..len].iter().copied());
        len
    }

    /// Move bytes from the front into `buf`.
    pub(crate) fn read(&mut self, buf: &mut [u8]) -> usize {
        let len = buf.len().min(self.data.len());
        for (dst, src) in buf.iter_mut().zip(self.data.drain(..len)) {
            *dst = src;
        }
        len
    }

    /// Drop bytes from the front.
    pub(crate) fn consume(&mut self, len: usize) {
        let len = len.min(self.data.len());
        self.data.drain(..len);
    }

    /// Copy bytes starting at `offset` without removing them.
    ///
    /// The range must lie within the queued bytes.
    pub(crate) fn copy_out(&self, offset: usize, buf: &mut [u8]) {
        let end = offset + buf.len();
        for (dst, src) in buf.iter_mut().zip(self.data.range(offset..end)) {
            *dst = *src;
        }
    }

    pub(crate) fn clear(&mut self) {
        self.data.clear()
    }
}

impl Socket {
    pub(crate) fn new(options: Options) -> Self {
        Socket {
            tuple: FourTuple {
                local: Ipv6Address::UNSPECIFIED,
                local_port: 0,
                remote: Ipv6Address::UNSPECIFIED,
                remote_port: 0,
            },
            interface: None,
            options,
            rx: SockBuf::new(options.rx_capacity),
            tx: SockBuf::new(options.tx_capacity),
            cant_send_more: false,
            cant_recv_more: false,
            released: false,
            session: None,
            listener: None,
        }
    }

    /// The current addressing.
    pub fn tuple(&self) -> FourTuple {
        self.tuple
    }

    /// The interface the connection was routed through.
    pub fn interface(&self) -> Option<InterfaceId> {
        self.interface
    }

    /// The listener that accepted this connection, if it was opened passively.
    pub fn listener(&self) -> Option<SocketHandle> {
        self.listener
    }

    /// The number of bytes waiting to be read.
    pub fn recv_queue(&self) -> usize {
        self.rx.len()
    }

    /// The number of bytes not yet acknowledged by the peer.
    pub fn send_queue(&self) -> usize {
        self.tx.len()
    }

    /// The number of bytes `send` would accept right now.
    pub fn send_space(&self) -> usize {
        self.tx.free()
    }

    /// Query whether the socket is attached to a session.
    pub fn is_attached(&self) -> bool {
        self.session.is_some()
    }

    /// Query whether the sending direction was closed.
    pub fn cant_send_more(&self) -> bool {
        self.cant_send_more
    }

    /// Query whether the receiving direction was closed.
    pub fn cant_recv_more(&self) -> bool {
        self.cant_recv_more
    }
}

impl fmt::Display for FourTuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}]:{} <-> [{}]:{}", self.local, self.local_port, self.remote, self.remote_port)
    }
}
