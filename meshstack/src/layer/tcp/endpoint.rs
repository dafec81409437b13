use core::mem;
use alloc::collections::VecDeque;
use alloc::vec::Vec;

use super::config::Config;
use super::session::{effective_mss, Session, Signals, State};
use super::siphash::IsnGenerator;
use super::socket::{Event, EventKind, FourTuple, Options, Socket, SocketHandle};
use crate::layer::ip::{Datagram, Interface, InterfaceId, Link, Routes};
use crate::layer::{Error, Result};
use crate::managed::{Key, SlotMap};
use crate::time::Instant;
use crate::wire::{tcp_packet, parse_tcp_options, Ipv6Address, TcpFlags, TcpRepr, TcpSeqNumber};
use crate::wire::TCP_DEFAULT_MSS;

/// An incoming segment, as delivered by the IP layer.
#[derive(Debug, Clone, Copy)]
pub struct InPacket<'a> {
    /// The interface the datagram arrived on.
    pub interface: InterfaceId,
    /// The IPv6 source address.
    pub src_addr: Ipv6Address,
    /// The IPv6 destination address.
    pub dst_addr: Ipv6Address,
    /// The datagram was accepted without link-layer security.
    ///
    /// Such datagrams are meant for joining the mesh and never carry TCP.
    pub security_bypass: bool,
    /// The TCP segment, header and payload.
    pub payload: &'a [u8],
}

/// Statistics of an endpoint.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Counters {
    /// Segments dropped for a wrong checksum.
    pub checksum_errors: u32,
    /// Segments dropped without being processed, or not sent for lack of queue space.
    pub dropped: u32,
    /// Resets sent, both for existing connections and in answer to stray segments.
    pub resets_sent: u32,
    /// Segments sent again after the retransmission timer expired.
    pub retransmissions: u32,
}

/// The result of closing a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseOutcome {
    /// The connection was not synchronized yet and is gone.
    Removed,
    /// A FIN is sent once all queued data was sent.
    Closing,
    /// The connection was already closing or did not exist, nothing changed.
    Unchanged,
}

/// A validated segment on its way to a session or listener.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Segment<'a> {
    pub(crate) interface: InterfaceId,
    pub(crate) link: Link,
    pub(crate) src_addr: Ipv6Address,
    pub(crate) dst_addr: Ipv6Address,
    pub(crate) repr: TcpRepr,
    pub(crate) payload: &'a [u8],
}

/// The state every session may touch while processing.
pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) isn: IsnGenerator,
    pub(crate) outbox: VecDeque<Datagram>,
    pub(crate) events: VecDeque<Event>,
    pub(crate) counters: Counters,
    pub(crate) now: Instant,
}

/// The tcp endpoint, owning all sockets and sessions.
///
/// Segments enter through [`input`], the passage of time through [`tick`]. Both, as well as the
/// socket operations, may produce segments and events which are collected until the owner picks
/// them up with [`poll_transmit`] and [`poll_event`].
///
/// [`input`]: #method.input
/// [`tick`]: #method.tick
/// [`poll_transmit`]: #method.poll_transmit
/// [`poll_event`]: #method.poll_event
pub struct Endpoint {
    sockets: SlotMap<Socket>,
    sessions: SlotMap<Session>,
    interfaces: Vec<Interface>,
    routes: Routes,
    shared: Shared,
    next_ephemeral: u16,
    /// Keys visited by the tick pass, reserved upfront.
    scratch: Vec<Key>,
}

impl Shared {
    /// Build a segment and queue it for transmission.
    fn emit<F>(&mut self, interface: InterfaceId, src_addr: Ipv6Address, dst_addr: Ipv6Address, repr: &TcpRepr, fill: F)
        where F: FnOnce(&mut [u8])
    {
        if self.outbox.len() >= self.config.queue_capacity {
            net_debug!("tcp: outbox full, dropping {}", repr);
            self.counters.dropped += 1;
            return;
        }

        let mut payload = alloc::vec![0; repr.buffer_len()];
        let packet = tcp_packet::new_unchecked_mut(&mut payload);
        repr.emit(packet);
        fill(packet.payload_mut_slice());
        packet.fill_checksum(src_addr, dst_addr);

        if repr.flags.rst() {
            self.counters.resets_sent += 1;
        }
        net_trace!("tcp: [{}] -> [{}]: {}", src_addr, dst_addr, repr);
        self.outbox.push_back(Datagram { interface, src_addr, dst_addr, payload });
    }

    /// Send a segment of a connection, taking the payload from the send buffer at `offset`.
    pub(crate) fn send(&mut self, socket: &Socket, repr: &TcpRepr, offset: usize) {
        let interface = match socket.interface {
            Some(interface) => interface,
            None => return,
        };
        let tuple = socket.tuple;
        self.emit(interface, tuple.local, tuple.remote, repr, |buffer| socket.tx.copy_out(offset, buffer));
    }

    /// Answer a segment with a reset, RFC 793 "Reset Generation".
    ///
    /// If the segment has an acknowledgment the reset takes its sequence number from it,
    /// otherwise the reset acknowledges the segment. A reset is never answered.
    pub(crate) fn reply_reset(&mut self, seg: &Segment) {
        let repr = &seg.repr;
        if repr.flags.rst() {
            return;
        }

        let (seq_number, ack_number) = match repr.ack_number {
            Some(ack) => (ack, None),
            None => (TcpSeqNumber(0), Some(repr.seq_number + repr.sequence_len())),
        };
        let reply = TcpRepr {
            src_port: repr.dst_port,
            dst_port: repr.src_port,
            flags: TcpFlags::RST,
            seq_number,
            ack_number,
            window_len: 0,
            max_seg_size: None,
            payload_len: 0,
        };
        self.emit(seg.interface, seg.dst_addr, seg.src_addr, &reply, |_| ());
    }

    /// Queue an event for the user of a socket.
    ///
    /// Nobody listens on a released socket so its events are not queued.
    pub(crate) fn notify(&mut self, socket: &Socket, key: Key, kind: EventKind) {
        if socket.released {
            return;
        }
        if self.events.len() >= self.config.queue_capacity {
            net_debug!("tcp: event queue full, dropping {:?}", kind);
            return;
        }
        self.events.push_back(Event { socket: SocketHandle(key), kind });
    }
}

impl Endpoint {
    /// Create an endpoint with pools sized by the configuration.
    pub fn new(config: Config, isn: IsnGenerator) -> Self {
        Endpoint {
            sockets: SlotMap::with_capacity(config.max_sockets),
            sessions: SlotMap::with_capacity(config.max_sessions),
            interfaces: Vec::with_capacity(config.max_interfaces),
            routes: Routes::new(config.max_routes),
            next_ephemeral: config.ephemeral_start,
            scratch: Vec::with_capacity(config.max_sessions),
            shared: Shared {
                config,
                isn,
                outbox: VecDeque::with_capacity(config.queue_capacity),
                events: VecDeque::with_capacity(config.queue_capacity),
                counters: Counters::default(),
                now: Instant::default(),
            },
        }
    }

    /// The configuration the endpoint was created with.
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Register an interface, replacing one with the same identifier.
    pub fn add_interface(&mut self, interface: Interface) -> Result<()> {
        if let Some(existing) = self.interfaces.iter_mut().find(|i| i.id == interface.id) {
            *existing = interface;
            return Ok(());
        }

        if self.interfaces.len() == self.shared.config.max_interfaces {
            return Err(Error::Exhausted);
        }

        self.interfaces.push(interface);
        Ok(())
    }

    /// Unregister an interface and all routes through it.
    pub fn remove_interface(&mut self, id: InterfaceId) -> Result<()> {
        let before = self.interfaces.len();
        self.interfaces.retain(|i| i.id != id);
        if self.interfaces.len() == before {
            return Err(Error::NoSuchInterface);
        }
        self.routes.remove_interface(id);
        Ok(())
    }

    /// The routing table used for active opens.
    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    /// The routing table used for active opens.
    pub fn routes_mut(&mut self) -> &mut Routes {
        &mut self.routes
    }

    /// Create an unbound socket.
    pub fn create_socket(&mut self, options: Options) -> Result<SocketHandle> {
        self.sockets.insert(Socket::new(options))
            .map(SocketHandle)
            .ok_or(Error::Exhausted)
    }

    /// Inspect a socket.
    pub fn socket(&self, handle: SocketHandle) -> Option<&Socket> {
        self.sockets.get(handle.0)
    }

    /// Inspect the session of a socket.
    pub fn session(&self, handle: SocketHandle) -> Option<&Session> {
        let key = self.sockets.get(handle.0)?.session?;
        self.sessions.get(key)
    }

    #[cfg(test)]
    pub(crate) fn session_mut(&mut self, handle: SocketHandle) -> Option<&mut Session> {
        let key = self.sockets.get(handle.0)?.session?;
        self.sessions.get_mut(key)
    }

    /// The connection state of a socket, `Closed` if it has no session.
    pub fn state(&self, handle: SocketHandle) -> Option<State> {
        self.sockets.get(handle.0)?;
        Some(self.session(handle).map_or(State::Closed, Session::state))
    }

    /// The number of sessions in use.
    pub fn sessions_in_use(&self) -> usize {
        self.sessions.len()
    }

    /// The number of sockets in use.
    pub fn sockets_in_use(&self) -> usize {
        self.sockets.len()
    }

    /// Statistics since creation.
    pub fn counters(&self) -> Counters {
        self.shared.counters
    }

    /// Assign the local address and port.
    ///
    /// An unspecified address binds to every interface address. Port zero chooses an ephemeral
    /// port.
    pub fn bind(&mut self, handle: SocketHandle, local: Ipv6Address, port: u16) -> Result<u16> {
        let socket = self.sockets.get(handle.0).ok_or(Error::NotFound)?;
        if socket.session.is_some() || local.is_multicast() {
            return Err(Error::Illegal);
        }

        let port = if port == 0 {
            self.ephemeral_port()?
        } else {
            let conflict = self.sockets.iter().any(|(key, other)| {
                key != handle.0
                    && other.tuple.local_port == port
                    && other.tuple.remote_port == 0
                    && (other.tuple.local == local
                        || other.tuple.local.is_unspecified()
                        || local.is_unspecified())
            });
            if conflict {
                return Err(Error::Illegal);
            }
            port
        };

        let socket = self.sockets.get_mut(handle.0).ok_or(Error::NotFound)?;
        socket.tuple.local = local;
        socket.tuple.local_port = port;
        Ok(port)
    }

    /// Wait for connection requests on the bound port.
    pub fn listen(&mut self, handle: SocketHandle) -> Result<()> {
        let socket = self.sockets.get(handle.0).ok_or(Error::NotFound)?;
        if socket.session.is_some() || socket.tuple.local_port == 0 || socket.cant_recv_more {
            return Err(Error::Illegal);
        }

        let key = self.allocate_session(handle.0, Link::Ethernet, None)?;
        if let Some(session) = self.sessions.get_mut(key) {
            session.state = State::Listen;
        }
        Ok(())
    }

    /// Open a connection to a remote.
    ///
    /// The egress interface is chosen by the routing table. Unless bound before, the local
    /// address is that of the interface and the port is ephemeral. A listening socket gives up
    /// listening.
    pub fn open(&mut self, handle: SocketHandle, remote: Ipv6Address, port: u16) -> Result<()> {
        if remote.is_unspecified() || remote.is_multicast() || port == 0 {
            return Err(Error::Illegal);
        }

        let socket = self.sockets.get(handle.0).ok_or(Error::NotFound)?;
        if socket.cant_send_more || socket.cant_recv_more {
            return Err(Error::Illegal);
        }
        let listening = match socket.session {
            None => None,
            Some(key) => match self.sessions.get(key).map(Session::state) {
                Some(State::Listen) | None => Some(key),
                Some(_) => return Err(Error::Illegal),
            },
        };
        if listening.is_none() && self.sessions.is_full() {
            return Err(Error::Exhausted);
        }

        let interface = self.route(remote)?;
        let mut tuple = socket.tuple;
        tuple.remote = remote;
        tuple.remote_port = port;
        if tuple.local.is_unspecified() {
            tuple.local = interface.address;
        }
        if tuple.local_port == 0 {
            tuple.local_port = self.ephemeral_port()?;
        }
        if self.sockets.iter().any(|(key, other)| key != handle.0 && other.tuple == tuple) {
            return Err(Error::Illegal);
        }

        if let Some(key) = listening {
            self.sessions.remove(key);
        }
        let socket = self.sockets.get_mut(handle.0).ok_or(Error::NotFound)?;
        socket.session = None;
        socket.tuple = tuple;
        socket.interface = Some(interface.id);

        let key = self.allocate_session(handle.0, interface.link, None)?;
        let (socket, session, shared) = self.parts(handle.0, key).ok_or(Error::NotFound)?;
        session.state = State::SynSent;
        session.send_syn(socket, shared);
        session.arm_retransmit();
        net_debug!("tcp: {} SYN-SENT", socket.tuple);
        Ok(())
    }

    /// Send queued data and then a FIN.
    pub fn close(&mut self, handle: SocketHandle) -> Result<CloseOutcome> {
        let socket = self.sockets.get_mut(handle.0).ok_or(Error::NotFound)?;
        socket.cant_send_more = true;
        let key = match socket.session {
            Some(key) => key,
            None => return Ok(CloseOutcome::Unchanged),
        };
        let state = match self.sessions.get(key) {
            Some(session) => session.state,
            None => return Ok(CloseOutcome::Unchanged),
        };

        let next = match state {
            State::Listen | State::SynSent => {
                self.free_session(key, None);
                return Ok(CloseOutcome::Removed);
            },
            State::SynReceived | State::Established => State::FinWait1,
            State::CloseWait => State::LastAck,
            State::Closed | State::FinWait1 | State::FinWait2 | State::Closing
                | State::LastAck | State::TimeWait => return Ok(CloseOutcome::Unchanged),
        };

        let (socket, session, shared) = self.parts(handle.0, key).ok_or(Error::NotFound)?;
        net_debug!("tcp: {} closing, {} -> {}", socket.tuple, state, next);
        session.state = next;
        session.transmit(socket, shared);
        Ok(CloseOutcome::Closing)
    }

    /// Stop receiving.
    ///
    /// Data that arrives later is acknowledged and discarded. If unread data is still queued
    /// the connection is aborted instead, the peer must learn that it was not delivered.
    pub fn shutdown_read(&mut self, handle: SocketHandle) -> Result<()> {
        let socket = self.sockets.get_mut(handle.0).ok_or(Error::NotFound)?;
        socket.cant_recv_more = true;
        if socket.rx.is_empty() || socket.session.is_none() {
            return Ok(());
        }

        socket.rx.clear();
        self.abort(handle)
    }

    /// Reset the connection and free its session.
    pub fn abort(&mut self, handle: SocketHandle) -> Result<()> {
        let socket = self.sockets.get(handle.0).ok_or(Error::NotFound)?;
        let key = match socket.session {
            Some(key) => key,
            None => return Ok(()),
        };

        if let Some((socket, session, shared)) = self.parts(handle.0, key) {
            match session.state {
                State::SynReceived | State::Established | State::FinWait1 | State::FinWait2
                    | State::CloseWait | State::Closing | State::LastAck =>
                {
                    net_debug!("tcp: {} aborted in {}", socket.tuple, session.state);
                    session.send_reset(socket, shared);
                },
                State::Closed | State::Listen | State::SynSent | State::TimeWait => (),
            }
        }

        self.free_session(key, None);
        Ok(())
    }

    /// Queue data for sending, returning how much of it fit the send buffer.
    pub fn send(&mut self, handle: SocketHandle, data: &[u8]) -> Result<usize> {
        let socket = self.sockets.get(handle.0).ok_or(Error::NotFound)?;
        if socket.cant_send_more {
            return Err(Error::Illegal);
        }
        let key = socket.session.ok_or(Error::Illegal)?;
        let (socket, session, shared) = self.parts(handle.0, key).ok_or(Error::Illegal)?;
        match session.state {
            State::SynSent | State::SynReceived | State::Established | State::CloseWait => (),
            _ => return Err(Error::Illegal),
        }

        let len = socket.tx.push(data);
        if len > 0 {
            session.transmit(socket, shared);
        }
        Ok(len)
    }

    /// Read received data, returning the number of bytes read.
    ///
    /// Zero bytes are returned when nothing is queued. Consuming data may open the receive window
    /// far enough to announce it to the peer.
    pub fn recv(&mut self, handle: SocketHandle, buf: &mut [u8]) -> Result<usize> {
        let socket = self.sockets.get_mut(handle.0).ok_or(Error::NotFound)?;
        let len = socket.rx.read(buf);
        if len == 0 {
            return Ok(0);
        }

        if let Some(key) = socket.session {
            if let Some((socket, session, shared)) = self.parts(handle.0, key) {
                session.window_update(socket, shared);
            }
        }
        Ok(len)
    }

    /// Give up the handle.
    ///
    /// A connection that is still open is closed gracefully and the socket is freed together
    /// with its session. Without a session the socket is freed immediately.
    pub fn release(&mut self, handle: SocketHandle) -> Result<()> {
        let socket = self.sockets.get_mut(handle.0).ok_or(Error::NotFound)?;
        socket.released = true;
        socket.cant_recv_more = true;
        let key = match socket.session {
            Some(key) => key,
            None => {
                self.sockets.remove(handle.0);
                return Ok(());
            },
        };

        match self.sessions.get(key).map(Session::state) {
            None => {
                self.sockets.remove(handle.0);
            },
            Some(State::Closed) | Some(State::Listen) | Some(State::SynSent) =>
                self.free_session(key, None),
            Some(State::SynReceived) | Some(State::Established) | Some(State::CloseWait) => {
                self.close(handle)?;
            },
            Some(State::FinWait2) => {
                let orphan = self.shared.config.fin_wait2_orphan;
                if let Some(session) = self.sessions.get_mut(key) {
                    if session.timer == 0 {
                        session.timer = orphan;
                    }
                }
            },
            Some(State::FinWait1) | Some(State::Closing) | Some(State::LastAck)
                | Some(State::TimeWait) => (),
        }
        Ok(())
    }

    /// Process an incoming segment.
    pub fn input(&mut self, packet: InPacket) {
        let interface = match self.interfaces.iter().find(|i| i.id == packet.interface) {
            Some(interface) => *interface,
            None => {
                net_trace!("tcp: segment on unknown interface {}", packet.interface);
                self.shared.counters.dropped += 1;
                return;
            },
        };

        if packet.security_bypass
            || packet.dst_addr.is_multicast()
            || packet.src_addr.is_multicast()
            || packet.src_addr.is_unspecified()
        {
            net_trace!("tcp: dropping segment from [{}]", packet.src_addr);
            self.shared.counters.dropped += 1;
            return;
        }

        let packet_tcp = match tcp_packet::new_checked(packet.payload) {
            Ok(packet_tcp) => packet_tcp,
            Err(_err) => {
                net_trace!("tcp: dropping segment from [{}]: {}", packet.src_addr, _err);
                self.shared.counters.dropped += 1;
                return;
            },
        };

        if !packet_tcp.verify_checksum(packet.src_addr, packet.dst_addr) {
            net_debug!("tcp: checksum error from [{}]", packet.src_addr);
            self.shared.counters.checksum_errors += 1;
            return;
        }

        let mut repr = TcpRepr::parse_header(packet_tcp);
        let options = parse_tcp_options(packet_tcp.options());
        if repr.src_port == 0 || repr.dst_port == 0 {
            self.shared.counters.dropped += 1;
            return;
        }

        let seg = Segment {
            interface: interface.id,
            link: interface.link,
            src_addr: packet.src_addr,
            dst_addr: packet.dst_addr,
            repr,
            payload: packet_tcp.payload_slice(),
        };

        match options {
            Ok(max_seg_size) => repr.max_seg_size = max_seg_size,
            Err(_) => {
                // Whatever connection it was meant for, it can not be trusted.
                net_debug!("tcp: malformed options from [{}]", packet.src_addr);
                self.shared.counters.dropped += 1;
                self.shared.reply_reset(&seg);
                return;
            },
        }
        let seg = Segment { repr, ..seg };

        let tuple = FourTuple {
            local: seg.dst_addr,
            local_port: repr.dst_port,
            remote: seg.src_addr,
            remote_port: repr.src_port,
        };

        match self.find_connection(&tuple) {
            Some((socket, session)) => self.process(socket, session, &seg),
            None => self.accept_or_reset(&seg, None),
        }
    }

    /// Advance all timers by one tick.
    pub fn tick(&mut self, now: Instant) {
        self.shared.now = now;
        let mut keys = mem::take(&mut self.scratch);
        self.sessions.keys_into(&mut keys);

        for &key in keys.iter() {
            let socket = match self.sessions.get(key) {
                Some(session) => session.socket,
                None => continue,
            };
            let signals = match self.parts(socket, key) {
                Some((socket, session, shared)) => session.tick(socket, shared),
                None => continue,
            };
            self.apply(key, signals, None);
        }

        self.scratch = keys;
    }

    /// Take the next segment to transmit.
    pub fn poll_transmit(&mut self) -> Option<Datagram> {
        self.shared.outbox.pop_front()
    }

    /// Take the next socket event.
    pub fn poll_event(&mut self) -> Option<Event> {
        self.shared.events.pop_front()
    }

    fn parts(&mut self, socket: Key, session: Key) -> Option<(&mut Socket, &mut Session, &mut Shared)> {
        let socket = self.sockets.get_mut(socket)?;
        let session = self.sessions.get_mut(session)?;
        Some((socket, session, &mut self.shared))
    }

    fn route(&self, remote: Ipv6Address) -> Result<Interface> {
        let id = self.routes.lookup(remote).ok_or(Error::Unreachable)?;
        self.interfaces.iter()
            .find(|interface| interface.id == id)
            .copied()
            .ok_or(Error::Unreachable)
    }

    fn ephemeral_port(&mut self) -> Result<u16> {
        let (start, end) = (self.shared.config.ephemeral_start, self.shared.config.ephemeral_end);
        if end < start {
            return Err(Error::Exhausted);
        }

        for _ in 0..=u32::from(end - start) {
            let port = if self.next_ephemeral < start || self.next_ephemeral > end {
                start
            } else {
                self.next_ephemeral
            };
            self.next_ephemeral = if port == end { start } else { port + 1 };

            if !self.sockets.iter().any(|(_, socket)| socket.tuple.local_port == port) {
                return Ok(port);
            }
        }

        Err(Error::Exhausted)
    }

    /// Create a session for a socket.
    ///
    /// The initial sequence number is either fresh or, when replacing a connection in TIME-WAIT,
    /// derived from where the old incarnation stopped so that old duplicates fall out of the new
    /// window.
    fn allocate_session(&mut self, socket: Key, link: Link, reuse: Option<TcpSeqNumber>) -> Result<Key> {
        let tuple = self.sockets.get(socket).ok_or(Error::NotFound)?.tuple;
        let now = self.shared.now;
        let initial_send = match reuse {
            Some(next) => next + self.shared.isn.reuse_increment(tuple, now),
            None => self.shared.isn.get_isn(tuple, now),
        };

        let session = Session::new(socket, link, initial_send, &self.shared.config);
        let key = self.sessions.insert(session).ok_or(Error::Exhausted)?;
        if let Some(socket) = self.sockets.get_mut(socket) {
            socket.session = Some(key);
        }
        Ok(key)
    }

    /// Free a session and detach it from its socket.
    ///
    /// The socket can no longer send or receive. A released socket is freed as well, otherwise
    /// its user learns why the connection ended.
    fn free_session(&mut self, key: Key, reason: Option<EventKind>) {
        let session = match self.sessions.remove(key) {
            Some(session) => session,
            None => return,
        };

        let socket = match self.sockets.get_mut(session.socket) {
            Some(socket) => socket,
            None => return,
        };
        net_debug!("tcp: {} freed in {}", socket.tuple, session.state);

        socket.session = None;
        socket.cant_send_more = true;
        socket.cant_recv_more = true;
        socket.tx.clear();

        if socket.released {
            self.sockets.remove(session.socket);
        } else if let Some(kind) = reason {
            self.shared.notify(socket, session.socket, kind);
        }
    }

    fn apply(&mut self, key: Key, signals: Signals, seg: Option<&Segment>) {
        if let Some(next) = signals.reopen {
            self.free_session(key, Some(EventKind::Closed));
            if let Some(seg) = seg {
                self.accept_or_reset(seg, Some(next));
            }
            return;
        }

        if signals.delete {
            self.free_session(key, signals.reason);
        }
    }

    fn find_connection(&self, tuple: &FourTuple) -> Option<(Key, Key)> {
        self.sockets.iter().find_map(|(key, socket)| {
            if socket.tuple != *tuple {
                return None;
            }
            let session = socket.session?;
            match self.sessions.get(session)?.state {
                State::Closed | State::Listen => None,
                _ => Some((key, session)),
            }
        })
    }

    /// Find the listener for a local address, preferring an exact match over a wildcard.
    fn find_listener(&self, local: Ipv6Address, port: u16) -> Option<Key> {
        let mut wildcard = None;
        for (key, socket) in self.sockets.iter() {
            if socket.tuple.local_port != port {
                continue;
            }
            let listening = socket.session
                .and_then(|session| self.sessions.get(session))
                .map_or(false, |session| session.state == State::Listen);
            if !listening {
                continue;
            }
            if socket.tuple.local == local {
                return Some(key);
            }
            if socket.tuple.local.is_unspecified() && wildcard.is_none() {
                wildcard = Some(key);
            }
        }
        wildcard
    }

    fn process(&mut self, socket: Key, session: Key, seg: &Segment) {
        let signals = match self.parts(socket, session) {
            Some((socket_ref, session_ref, shared)) => session_ref.arrives(socket_ref, socket, seg, shared),
            None => return,
        };
        self.apply(session, signals, Some(seg));
    }

    /// Handle a segment that belongs to no connection.
    fn accept_or_reset(&mut self, seg: &Segment, reuse: Option<TcpSeqNumber>) {
        let listener = match self.find_listener(seg.dst_addr, seg.repr.dst_port) {
            Some(listener) => listener,
            None => {
                net_trace!("tcp: no connection for {}", seg.repr);
                self.shared.reply_reset(seg);
                return;
            },
        };

        let flags = seg.repr.flags;
        if flags.rst() {
            return;
        }
        if flags.ack() {
            self.shared.reply_reset(seg);
            return;
        }
        if !flags.syn() {
            self.shared.counters.dropped += 1;
            return;
        }

        self.passive_open(listener, seg, reuse);
    }

    /// Spawn a connection from a listener for an incoming SYN.
    ///
    /// The new socket is released until the handshake completes, only then the user learns about
    /// it with an `Incoming` event.
    fn passive_open(&mut self, listener: Key, seg: &Segment, reuse: Option<TcpSeqNumber>) {
        let options = match self.sockets.get(listener) {
            Some(socket) => socket.options,
            None => return,
        };
        if self.sessions.is_full() {
            net_debug!("tcp: session pool exhausted, dropping SYN from [{}]", seg.src_addr);
            self.shared.counters.dropped += 1;
            return;
        }

        let repr = &seg.repr;
        let mut socket = Socket::new(options);
        socket.tuple = FourTuple {
            local: seg.dst_addr,
            local_port: repr.dst_port,
            remote: seg.src_addr,
            remote_port: repr.src_port,
        };
        socket.interface = Some(seg.interface);
        socket.released = true;
        socket.listener = Some(SocketHandle(listener));

        let socket_key = match self.sockets.insert(socket) {
            Some(key) => key,
            None => {
                net_debug!("tcp: socket pool exhausted, dropping SYN from [{}]", seg.src_addr);
                self.shared.counters.dropped += 1;
                return;
            },
        };
        let key = match self.allocate_session(socket_key, seg.link, reuse) {
            Ok(key) => key,
            Err(_) => {
                self.sockets.remove(socket_key);
                self.shared.counters.dropped += 1;
                return;
            },
        };

        let (socket, session, shared) = match self.parts(socket_key, key) {
            Some(parts) => parts,
            None => return,
        };
        session.state = State::SynReceived;
        session.passive_open = true;
        session.receive_next = repr.seq_number + 1;
        session.receive_adv = session.receive_next;
        session.peer_mss = repr.max_seg_size.unwrap_or(TCP_DEFAULT_MSS);
        session.send_mss = effective_mss(session.peer_mss, seg.link, &shared.config);
        session.send_window = repr.window_len;
        session.send_wl1 = repr.seq_number;
        session.send_syn(socket, shared);
        session.arm_retransmit();
        net_debug!("tcp: {} SYN-RECEIVED", socket.tuple);
    }
}
