use super::*;
use crate::layer::Error;
use crate::layer::ip::{Datagram, Interface, InterfaceId, Link, Route};
use crate::time::Instant;
use crate::wire::{tcp_packet, Ipv6Address, Ipv6Subnet, TcpFlags, TcpRepr, TcpSeqNumber};

const LOCAL: Ipv6Address = Ipv6Address([0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
const REMOTE: Ipv6Address = Ipv6Address([0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2]);
const IF: InterfaceId = InterfaceId(1);
const LOCAL_PORT: u16 = 80;
const REMOTE_PORT: u16 = 49500;
const PEER_ISN: TcpSeqNumber = TcpSeqNumber(0x1000_0000);

fn endpoint_with(config: Config, link: Link) -> Endpoint {
    let mut endpoint = Endpoint::new(config, IsnGenerator::from_key(0x0123, 0x4567));
    endpoint.add_interface(Interface { id: IF, link, address: LOCAL }).unwrap();
    endpoint.routes_mut().add(Route { net: Ipv6Subnet::ANY, interface: IF }).unwrap();
    endpoint
}

fn peer(flags: TcpFlags, seq_number: TcpSeqNumber, ack_number: Option<TcpSeqNumber>) -> TcpRepr {
    TcpRepr {
        src_port: REMOTE_PORT,
        dst_port: LOCAL_PORT,
        flags,
        seq_number,
        ack_number,
        window_len: 4096,
        max_seg_size: None,
        payload_len: 0,
    }
}

fn build(repr: TcpRepr, payload: &[u8]) -> Vec<u8> {
    let repr = TcpRepr { payload_len: payload.len(), ..repr };
    let mut bytes = vec![0; repr.buffer_len()];
    let packet = tcp_packet::new_unchecked_mut(&mut bytes);
    repr.emit(packet);
    packet.payload_mut_slice().copy_from_slice(payload);
    packet.fill_checksum(REMOTE, LOCAL);
    bytes
}

fn input_raw(endpoint: &mut Endpoint, bytes: &[u8]) {
    endpoint.input(InPacket {
        interface: IF,
        src_addr: REMOTE,
        dst_addr: LOCAL,
        security_bypass: false,
        payload: bytes,
    });
}

fn deliver(endpoint: &mut Endpoint, repr: TcpRepr, payload: &[u8]) {
    input_raw(endpoint, &build(repr, payload));
}

fn parse(datagram: Datagram) -> (TcpRepr, Vec<u8>) {
    assert_eq!(datagram.interface, IF);
    assert_eq!(datagram.dst_addr, REMOTE);
    let packet = tcp_packet::new_checked(&datagram.payload).unwrap();
    assert!(packet.verify_checksum(datagram.src_addr, datagram.dst_addr));
    let repr = TcpRepr::parse(packet).unwrap();
    (repr, packet.payload_slice().to_vec())
}

fn take(endpoint: &mut Endpoint) -> (TcpRepr, Vec<u8>) {
    parse(endpoint.poll_transmit().expect("no segment was sent"))
}

fn quiet(endpoint: &mut Endpoint) {
    assert_eq!(endpoint.poll_transmit(), None);
}

fn events(endpoint: &mut Endpoint) -> Vec<EventKind> {
    core::iter::from_fn(|| endpoint.poll_event()).map(|event| event.kind).collect()
}

struct Connection {
    endpoint: Endpoint,
    handle: SocketHandle,
    /// Our next sequence number after the handshake.
    local: TcpSeqNumber,
    /// The peer's next sequence number after the handshake.
    remote: TcpSeqNumber,
    now: i64,
}

impl Connection {
    fn tick(&mut self, ticks: u32) {
        for _ in 0..ticks {
            self.now += 100;
            self.endpoint.tick(Instant::from_millis(self.now));
        }
    }

    fn session(&self) -> &Session {
        self.endpoint.session(self.handle).expect("no session")
    }
}

fn connect_with(config: Config, link: Link, options: Options, peer_window: u16) -> Connection {
    let mut endpoint = endpoint_with(config, link);
    let handle = endpoint.create_socket(options).unwrap();
    assert_eq!(endpoint.bind(handle, Ipv6Address::UNSPECIFIED, LOCAL_PORT), Ok(LOCAL_PORT));
    endpoint.open(handle, REMOTE, REMOTE_PORT).unwrap();
    assert_eq!(endpoint.state(handle), Some(State::SynSent));

    let (syn, _) = take(&mut endpoint);
    assert_eq!(syn.flags, TcpFlags::SYN);
    assert_eq!(syn.ack_number, None);

    let synack = TcpRepr {
        window_len: peer_window,
        max_seg_size: Some(1000),
        ..peer(TcpFlags::SYN, PEER_ISN, Some(syn.seq_number + 1))
    };
    deliver(&mut endpoint, synack, &[]);

    let (ack, payload) = take(&mut endpoint);
    assert!(payload.is_empty());
    assert_eq!(ack.seq_number, syn.seq_number + 1);
    assert_eq!(ack.ack_number, Some(PEER_ISN + 1));
    assert_eq!(events(&mut endpoint), vec![EventKind::Connected]);
    assert_eq!(endpoint.state(handle), Some(State::Established));

    Connection {
        endpoint,
        handle,
        local: syn.seq_number + 1,
        remote: PEER_ISN + 1,
        now: 0,
    }
}

fn connect() -> Connection {
    connect_with(Config::default(), Link::Ethernet, Options::default(), 4096)
}

fn listening(config: Config) -> (Endpoint, SocketHandle) {
    let mut endpoint = endpoint_with(config, Link::Ethernet);
    let listener = endpoint.create_socket(Options::default()).unwrap();
    endpoint.bind(listener, Ipv6Address::UNSPECIFIED, LOCAL_PORT).unwrap();
    endpoint.listen(listener).unwrap();
    (endpoint, listener)
}

#[test]
fn active_handshake() {
    let conn = connect();
    let session = conn.session();
    assert_eq!(session.peer_mss(), 1000);
    assert_eq!(session.send_mss(), 1000);
    assert_eq!(session.receive_mss(), MAX_MSS);
    assert_eq!(session.send_window(), 4096);
    assert!(session.rto() >= conn.endpoint.config().min_rto);

    let socket = conn.endpoint.socket(conn.handle).unwrap();
    assert_eq!(socket.tuple().local, LOCAL);
    assert_eq!(socket.tuple().remote_port, REMOTE_PORT);
}

#[test]
fn passive_handshake() {
    let (mut endpoint, listener) = listening(Config::default());

    let syn = TcpRepr { max_seg_size: Some(536), ..peer(TcpFlags::SYN, PEER_ISN, None) };
    deliver(&mut endpoint, syn, &[]);
    let (synack, _) = take(&mut endpoint);
    assert_eq!(synack.flags, TcpFlags::SYN | TcpFlags::ACK);
    assert_eq!(synack.ack_number, Some(PEER_ISN + 1));
    assert_eq!(synack.max_seg_size, Some(MAX_MSS));
    assert_eq!(synack.src_port, LOCAL_PORT);
    assert_eq!(synack.dst_port, REMOTE_PORT);
    // Nothing to tell the user before the handshake completes.
    assert_eq!(endpoint.poll_event(), None);

    deliver(&mut endpoint, peer(TcpFlags::default(), PEER_ISN + 1, Some(synack.seq_number + 1)), &[]);
    let event = endpoint.poll_event().unwrap();
    assert_eq!(event.kind, EventKind::Incoming { listener });
    let child = event.socket;
    quiet(&mut endpoint);

    assert_eq!(endpoint.state(child), Some(State::Established));
    assert_eq!(endpoint.state(listener), Some(State::Listen));
    assert_eq!(endpoint.socket(child).unwrap().listener(), Some(listener));
    let session = endpoint.session(child).unwrap();
    assert!(session.is_passive());
    assert_eq!(session.send_mss(), 536);
    assert_eq!(endpoint.sessions_in_use(), 2);
}

#[test]
fn retransmitted_syn_in_syn_received() {
    let (mut endpoint, _) = listening(Config::default());
    let syn = peer(TcpFlags::SYN, PEER_ISN, None);
    deliver(&mut endpoint, syn, &[]);
    let (first, _) = take(&mut endpoint);

    deliver(&mut endpoint, syn, &[]);
    let (second, _) = take(&mut endpoint);
    assert_eq!(second.flags, TcpFlags::SYN | TcpFlags::ACK);
    assert_eq!(second.seq_number, first.seq_number);
    assert_eq!(endpoint.sessions_in_use(), 2);
}

#[test]
fn reset_before_accept_is_silent() {
    let (mut endpoint, _) = listening(Config::default());
    deliver(&mut endpoint, peer(TcpFlags::SYN, PEER_ISN, None), &[]);
    take(&mut endpoint);

    deliver(&mut endpoint, peer(TcpFlags::RST, PEER_ISN + 1, None), &[]);
    quiet(&mut endpoint);
    assert_eq!(endpoint.poll_event(), None);
    assert_eq!(endpoint.sessions_in_use(), 1);
    assert_eq!(endpoint.sockets_in_use(), 1);
}

#[test]
fn listener_answers_ack_with_reset() {
    let (mut endpoint, _) = listening(Config::default());
    deliver(&mut endpoint, peer(TcpFlags::default(), TcpSeqNumber(5), Some(TcpSeqNumber(1234))), &[]);
    let (rst, _) = take(&mut endpoint);
    assert_eq!(rst.flags, TcpFlags::RST);
    assert_eq!(rst.seq_number, TcpSeqNumber(1234));
    assert_eq!(rst.ack_number, None);

    deliver(&mut endpoint, peer(TcpFlags::RST, TcpSeqNumber(5), None), &[]);
    quiet(&mut endpoint);
}

#[test]
fn no_connection_reset() {
    let mut endpoint = endpoint_with(Config::default(), Link::Ethernet);

    deliver(&mut endpoint, peer(TcpFlags::SYN, PEER_ISN, None), b"abc");
    let (rst, _) = take(&mut endpoint);
    assert_eq!(rst.flags, TcpFlags::RST | TcpFlags::ACK);
    assert_eq!(rst.seq_number, TcpSeqNumber(0));
    assert_eq!(rst.ack_number, Some(PEER_ISN + 4));
    assert_eq!(rst.window_len, 0);

    deliver(&mut endpoint, peer(TcpFlags::default(), PEER_ISN, Some(TcpSeqNumber(99))), &[]);
    let (rst, _) = take(&mut endpoint);
    assert_eq!(rst.flags, TcpFlags::RST);
    assert_eq!(rst.seq_number, TcpSeqNumber(99));

    // A reset is never answered.
    deliver(&mut endpoint, peer(TcpFlags::RST | TcpFlags::ACK, PEER_ISN, Some(TcpSeqNumber(99))), &[]);
    quiet(&mut endpoint);
    assert_eq!(endpoint.counters().resets_sent, 2);
}

#[test]
fn checksum_error() {
    let mut endpoint = endpoint_with(Config::default(), Link::Ethernet);
    let mut bytes = build(peer(TcpFlags::SYN, PEER_ISN, None), b"abc");
    bytes[21] ^= 0x40;
    input_raw(&mut endpoint, &bytes);
    quiet(&mut endpoint);
    assert_eq!(endpoint.counters().checksum_errors, 1);
}

#[test]
fn short_or_foreign_segments_dropped() {
    let mut endpoint = endpoint_with(Config::default(), Link::Ethernet);
    input_raw(&mut endpoint, &[0; 12]);

    let bytes = build(peer(TcpFlags::SYN, PEER_ISN, None), &[]);
    endpoint.input(InPacket {
        interface: IF,
        src_addr: REMOTE,
        dst_addr: LOCAL,
        security_bypass: true,
        payload: &bytes,
    });
    endpoint.input(InPacket {
        interface: InterfaceId(7),
        src_addr: REMOTE,
        dst_addr: LOCAL,
        security_bypass: false,
        payload: &bytes,
    });
    endpoint.input(InPacket {
        interface: IF,
        src_addr: REMOTE,
        dst_addr: Ipv6Address::LINK_LOCAL_ALL_NODES,
        security_bypass: false,
        payload: &bytes,
    });

    quiet(&mut endpoint);
    assert_eq!(endpoint.counters().dropped, 4);
}

#[test]
fn malformed_option_resets_even_with_session() {
    let mut conn = connect();
    let repr = TcpRepr {
        max_seg_size: Some(1000),
        ..peer(TcpFlags::default(), conn.remote, Some(conn.local))
    };
    let mut bytes = build(repr, b"xy");
    // An MSS option with an impossible length.
    bytes[20..24].copy_from_slice(&[0x02, 0x03, 0x00, 0x00]);
    tcp_packet::new_unchecked_mut(&mut bytes).fill_checksum(REMOTE, LOCAL);
    input_raw(&mut conn.endpoint, &bytes);

    let (rst, _) = take(&mut conn.endpoint);
    assert_eq!(rst.flags, TcpFlags::RST);
    assert_eq!(rst.seq_number, conn.local);
    quiet(&mut conn.endpoint);
    assert_eq!(conn.endpoint.state(conn.handle), Some(State::Established));
    assert_eq!(conn.endpoint.socket(conn.handle).unwrap().recv_queue(), 0);
}

#[test]
fn data_exchange() {
    let mut conn = connect();
    let handle = conn.handle;

    deliver(&mut conn.endpoint, peer(TcpFlags::default(), conn.remote, Some(conn.local)), b"hello");
    let (ack, payload) = take(&mut conn.endpoint);
    assert!(payload.is_empty());
    assert_eq!(ack.seq_number, conn.local);
    assert_eq!(ack.ack_number, Some(conn.remote + 5));
    assert_eq!(events(&mut conn.endpoint), vec![EventKind::Data]);

    let mut buf = [0; 16];
    assert_eq!(conn.endpoint.recv(handle, &mut buf), Ok(5));
    assert_eq!(&buf[..5], b"hello");
    quiet(&mut conn.endpoint);

    assert_eq!(conn.endpoint.send(handle, b"world"), Ok(5));
    let (data, payload) = take(&mut conn.endpoint);
    assert_eq!(payload, b"world");
    assert_eq!(data.seq_number, conn.local);
    assert_eq!(data.ack_number, Some(conn.remote + 5));
    assert!(data.flags.psh());
    assert_eq!(conn.endpoint.socket(handle).unwrap().send_queue(), 5);

    deliver(&mut conn.endpoint, peer(TcpFlags::default(), conn.remote + 5, Some(conn.local + 5)), &[]);
    quiet(&mut conn.endpoint);
    assert_eq!(events(&mut conn.endpoint), vec![EventKind::SendSpace]);
    assert_eq!(conn.endpoint.socket(handle).unwrap().send_queue(), 0);
    assert_eq!(conn.session().timer(), 0);
}

#[test]
fn segments_respect_mss_and_window() {
    let mut conn = connect_with(Config::default(), Link::Mesh, Options::default(), 700);
    assert_eq!(conn.session().send_mss(), conn.endpoint.config().mesh_mss);
    assert_eq!(conn.session().receive_mss(), conn.endpoint.config().mesh_mss);

    assert_eq!(conn.endpoint.send(conn.handle, &[0x5a; 800]), Ok(800));
    let lengths: Vec<_> = core::iter::from_fn(|| conn.endpoint.poll_transmit())
        .map(|datagram| parse(datagram).1.len())
        .collect();
    // The window of 700 stops the third segment short.
    assert_eq!(lengths, vec![300, 300, 100]);
    assert_eq!(conn.session().send_next(), conn.local + 700);
}

#[test]
fn out_of_order_is_dropped_with_duplicate_ack() {
    let mut conn = connect();
    deliver(&mut conn.endpoint, peer(TcpFlags::default(), conn.remote + 10, Some(conn.local)), b"late");
    let (ack, _) = take(&mut conn.endpoint);
    assert_eq!(ack.ack_number, Some(conn.remote));
    assert!(events(&mut conn.endpoint).is_empty());
    assert_eq!(conn.endpoint.socket(conn.handle).unwrap().recv_queue(), 0);
}

#[test]
fn retransmit_then_time_out() {
    let mut conn = connect();
    let config = *conn.endpoint.config();
    assert_eq!(conn.endpoint.send(conn.handle, b"data"), Ok(4));
    take(&mut conn.endpoint);

    let mut retransmissions = 0;
    let mut last_rto = conn.session().rto();
    let mut event = None;
    for _ in 0..5000 {
        conn.tick(1);
        while let Some(datagram) = conn.endpoint.poll_transmit() {
            let (repr, payload) = parse(datagram);
            assert_eq!(repr.seq_number, conn.local);
            assert_eq!(payload, b"data");
            retransmissions += 1;
        }
        if let Some(session) = conn.endpoint.session(conn.handle) {
            assert!(session.rto() >= last_rto);
            assert!(session.rto() <= config.max_rto);
            last_rto = session.rto();
        }
        event = conn.endpoint.poll_event();
        if event.is_some() {
            break;
        }
    }

    assert_eq!(event.map(|event| event.kind), Some(EventKind::TimedOut));
    assert_eq!(retransmissions, usize::from(config.max_retries));
    assert_eq!(conn.endpoint.counters().retransmissions, u32::from(config.max_retries));
    assert_eq!(last_rto, config.max_rto);
    assert_eq!(conn.endpoint.state(conn.handle), Some(State::Closed));
    assert_eq!(conn.endpoint.sessions_in_use(), 0);
}

#[test]
fn retransmission_skips_rtt_sample() {
    let mut conn = connect();
    let before = conn.session().rtt().srtt();
    conn.endpoint.send(conn.handle, b"data").unwrap();
    take(&mut conn.endpoint);

    let rto = u32::from(conn.session().rto());
    conn.tick(rto);
    take(&mut conn.endpoint);
    assert_eq!(conn.session().retries(), 1);

    deliver(&mut conn.endpoint, peer(TcpFlags::default(), conn.remote, Some(conn.local + 4)), &[]);
    assert_eq!(conn.session().retries(), 0);
    assert_eq!(conn.session().rtt().srtt(), before);
    // The backed off timeout is kept until a fresh sample arrives.
    assert_eq!(u32::from(conn.session().rto()), rto * 2);
}

#[test]
fn zero_window_persist() {
    let mut conn = connect_with(Config::default(), Link::Ethernet, Options::default(), 0);
    assert_eq!(conn.endpoint.send(conn.handle, b"0123456789"), Ok(10));
    quiet(&mut conn.endpoint);
    assert!(conn.session().is_persisting());

    let rto = u32::from(conn.session().rto());
    conn.tick(rto - 1);
    quiet(&mut conn.endpoint);
    conn.tick(1);

    let (probe, payload) = take(&mut conn.endpoint);
    assert_eq!(payload, b"0");
    assert_eq!(probe.seq_number, conn.local);
    quiet(&mut conn.endpoint);
    assert_eq!(u32::from(conn.session().rto()), rto * 2);

    let open = TcpRepr { window_len: 100, ..peer(TcpFlags::default(), conn.remote, Some(conn.local + 1)) };
    deliver(&mut conn.endpoint, open, &[]);
    let (rest, payload) = take(&mut conn.endpoint);
    assert_eq!(payload, b"123456789");
    assert_eq!(rest.seq_number, conn.local + 1);
    assert!(!conn.session().is_persisting());
    quiet(&mut conn.endpoint);
}

#[test]
fn window_update_after_read() {
    let options = Options { rx_capacity: 64, tx_capacity: 64, low_water: 16 };
    let mut conn = connect_with(Config::default(), Link::Ethernet, options, 4096);

    deliver(&mut conn.endpoint, peer(TcpFlags::default(), conn.remote, Some(conn.local)), &[0xaa; 64]);
    let (ack, _) = take(&mut conn.endpoint);
    assert_eq!(ack.ack_number, Some(conn.remote + 64));
    assert_eq!(ack.window_len, 0);

    let mut buf = [0; 64];
    assert_eq!(conn.endpoint.recv(conn.handle, &mut buf), Ok(64));
    let (update, _) = take(&mut conn.endpoint);
    assert_eq!(update.ack_number, Some(conn.remote + 64));
    assert_eq!(update.window_len, 64);
}

#[test]
fn peer_reset() {
    let mut conn = connect();
    deliver(&mut conn.endpoint, peer(TcpFlags::RST, conn.remote, None), &[]);
    quiet(&mut conn.endpoint);
    assert_eq!(events(&mut conn.endpoint), vec![EventKind::Reset]);
    assert_eq!(conn.endpoint.state(conn.handle), Some(State::Closed));

    let socket = conn.endpoint.socket(conn.handle).unwrap();
    assert!(socket.cant_send_more() && socket.cant_recv_more());
    assert_eq!(conn.endpoint.send(conn.handle, b"x"), Err(Error::Illegal));
}

#[test]
fn reset_outside_window_ignored() {
    let mut conn = connect();
    deliver(&mut conn.endpoint, peer(TcpFlags::RST, conn.remote + 100_000, None), &[]);
    quiet(&mut conn.endpoint);
    assert_eq!(conn.endpoint.state(conn.handle), Some(State::Established));
}

#[test]
fn syn_in_window_resets() {
    let mut conn = connect();
    deliver(&mut conn.endpoint, peer(TcpFlags::SYN, conn.remote, None), &[]);
    let (rst, _) = take(&mut conn.endpoint);
    assert_eq!(rst.flags, TcpFlags::RST);
    assert_eq!(rst.seq_number, conn.local);
    assert_eq!(events(&mut conn.endpoint), vec![EventKind::Reset]);
    assert_eq!(conn.endpoint.state(conn.handle), Some(State::Closed));
}

#[test]
fn active_close() {
    let mut conn = connect();
    let time_wait = u32::from(conn.endpoint.config().time_wait);

    assert_eq!(conn.endpoint.close(conn.handle), Ok(CloseOutcome::Closing));
    let (fin, _) = take(&mut conn.endpoint);
    assert!(fin.flags.fin());
    assert_eq!(fin.seq_number, conn.local);
    assert_eq!(conn.endpoint.state(conn.handle), Some(State::FinWait1));
    assert_eq!(conn.endpoint.close(conn.handle), Ok(CloseOutcome::Unchanged));

    deliver(&mut conn.endpoint, peer(TcpFlags::default(), conn.remote, Some(conn.local + 1)), &[]);
    quiet(&mut conn.endpoint);
    assert_eq!(conn.endpoint.state(conn.handle), Some(State::FinWait2));

    deliver(&mut conn.endpoint, peer(TcpFlags::FIN, conn.remote, Some(conn.local + 1)), &[]);
    let (ack, _) = take(&mut conn.endpoint);
    assert_eq!(ack.ack_number, Some(conn.remote + 1));
    assert_eq!(conn.endpoint.state(conn.handle), Some(State::TimeWait));
    assert_eq!(events(&mut conn.endpoint), vec![EventKind::PeerClosed]);

    conn.tick(time_wait - 1);
    assert_eq!(conn.endpoint.state(conn.handle), Some(State::TimeWait));
    conn.tick(1);
    assert_eq!(events(&mut conn.endpoint), vec![EventKind::Closed]);
    assert_eq!(conn.endpoint.state(conn.handle), Some(State::Closed));
}

#[test]
fn passive_close() {
    let mut conn = connect();

    deliver(&mut conn.endpoint, peer(TcpFlags::FIN, conn.remote, Some(conn.local)), &[]);
    let (ack, _) = take(&mut conn.endpoint);
    assert_eq!(ack.ack_number, Some(conn.remote + 1));
    assert_eq!(events(&mut conn.endpoint), vec![EventKind::PeerClosed]);
    assert_eq!(conn.endpoint.state(conn.handle), Some(State::CloseWait));

    // Sending is still allowed, the FIN follows the data.
    assert_eq!(conn.endpoint.send(conn.handle, b"bye"), Ok(3));
    take(&mut conn.endpoint);
    assert_eq!(conn.endpoint.close(conn.handle), Ok(CloseOutcome::Closing));
    let (fin, payload) = take(&mut conn.endpoint);
    assert!(fin.flags.fin());
    assert!(payload.is_empty());
    assert_eq!(fin.seq_number, conn.local + 3);
    assert_eq!(conn.endpoint.state(conn.handle), Some(State::LastAck));

    deliver(&mut conn.endpoint, peer(TcpFlags::default(), conn.remote + 1, Some(conn.local + 4)), &[]);
    quiet(&mut conn.endpoint);
    // The user closed, so freed send space is not worth an event.
    assert_eq!(events(&mut conn.endpoint), vec![EventKind::Closed]);
    assert_eq!(conn.endpoint.state(conn.handle), Some(State::Closed));
}

#[test]
fn abort_sends_reset() {
    let mut conn = connect();
    assert_eq!(conn.endpoint.abort(conn.handle), Ok(()));
    let (rst, _) = take(&mut conn.endpoint);
    assert_eq!(rst.flags, TcpFlags::RST);
    assert_eq!(rst.seq_number, conn.local);
    assert_eq!(conn.endpoint.counters().resets_sent, 1);
    assert_eq!(conn.endpoint.state(conn.handle), Some(State::Closed));
    assert_eq!(conn.endpoint.poll_event(), None);
}

#[test]
fn shutdown_read_with_unread_data_aborts() {
    let mut conn = connect();
    deliver(&mut conn.endpoint, peer(TcpFlags::default(), conn.remote, Some(conn.local)), b"abc");
    take(&mut conn.endpoint);
    events(&mut conn.endpoint);

    assert_eq!(conn.endpoint.shutdown_read(conn.handle), Ok(()));
    let (rst, _) = take(&mut conn.endpoint);
    assert_eq!(rst.flags, TcpFlags::RST);
    assert_eq!(conn.endpoint.state(conn.handle), Some(State::Closed));
}

#[test]
fn shutdown_read_discards_later_data() {
    let mut conn = connect();
    assert_eq!(conn.endpoint.shutdown_read(conn.handle), Ok(()));
    quiet(&mut conn.endpoint);

    deliver(&mut conn.endpoint, peer(TcpFlags::default(), conn.remote, Some(conn.local)), b"abc");
    let (ack, _) = take(&mut conn.endpoint);
    assert_eq!(ack.ack_number, Some(conn.remote + 3));
    assert!(events(&mut conn.endpoint).is_empty());

    let mut buf = [0; 8];
    assert_eq!(conn.endpoint.recv(conn.handle, &mut buf), Ok(0));
    assert_eq!(conn.endpoint.state(conn.handle), Some(State::Established));
}

#[test]
fn connection_refused() {
    let mut endpoint = endpoint_with(Config::default(), Link::Ethernet);
    let handle = endpoint.create_socket(Options::default()).unwrap();
    endpoint.open(handle, REMOTE, REMOTE_PORT).unwrap();
    let (syn, _) = take(&mut endpoint);
    assert!(syn.src_port >= endpoint.config().ephemeral_start);

    // A bad acknowledgment is answered, not accepted.
    let bogus = TcpRepr { dst_port: syn.src_port, ..peer(TcpFlags::SYN, PEER_ISN, Some(syn.seq_number + 7)) };
    deliver(&mut endpoint, bogus, &[]);
    let (rst, _) = take(&mut endpoint);
    assert_eq!(rst.seq_number, syn.seq_number + 7);
    assert_eq!(endpoint.state(handle), Some(State::SynSent));

    let refused = TcpRepr {
        dst_port: syn.src_port,
        ..peer(TcpFlags::RST, TcpSeqNumber(0), Some(syn.seq_number + 1))
    };
    deliver(&mut endpoint, refused, &[]);
    quiet(&mut endpoint);
    assert_eq!(events(&mut endpoint), vec![EventKind::ConnectFailed]);
    assert_eq!(endpoint.state(handle), Some(State::Closed));
}

#[test]
fn syn_retries_exhausted() {
    let mut endpoint = endpoint_with(Config::default(), Link::Ethernet);
    let config = *endpoint.config();
    let handle = endpoint.create_socket(Options::default()).unwrap();
    endpoint.open(handle, REMOTE, REMOTE_PORT).unwrap();
    let (syn, _) = take(&mut endpoint);

    let mut retries = 0;
    let mut now = 0;
    while endpoint.state(handle) == Some(State::SynSent) && now < 1_000_000 {
        now += 100;
        endpoint.tick(Instant::from_millis(now));
        while let Some(datagram) = endpoint.poll_transmit() {
            let (repr, _) = parse(datagram);
            assert_eq!(repr.flags, TcpFlags::SYN);
            assert_eq!(repr.seq_number, syn.seq_number);
            retries += 1;
        }
    }

    assert_eq!(retries, usize::from(config.syn_retries));
    assert_eq!(events(&mut endpoint), vec![EventKind::ConnectFailed]);
}

#[test]
fn open_needs_route() {
    let mut endpoint = Endpoint::new(Config::default(), IsnGenerator::from_key(1, 2));
    endpoint.add_interface(Interface { id: IF, link: Link::Ethernet, address: LOCAL }).unwrap();
    let handle = endpoint.create_socket(Options::default()).unwrap();
    assert_eq!(endpoint.open(handle, REMOTE, REMOTE_PORT), Err(Error::Unreachable));
    assert_eq!(endpoint.open(handle, Ipv6Address::UNSPECIFIED, REMOTE_PORT), Err(Error::Illegal));
    assert_eq!(endpoint.sessions_in_use(), 0);
}

#[test]
fn bind_conflicts() {
    let mut endpoint = endpoint_with(Config::default(), Link::Ethernet);
    let first = endpoint.create_socket(Options::default()).unwrap();
    let second = endpoint.create_socket(Options::default()).unwrap();
    assert_eq!(endpoint.bind(first, LOCAL, LOCAL_PORT), Ok(LOCAL_PORT));
    assert_eq!(endpoint.bind(second, Ipv6Address::UNSPECIFIED, LOCAL_PORT), Err(Error::Illegal));
    let port = endpoint.bind(second, LOCAL, 0).unwrap();
    assert_eq!(port, endpoint.config().ephemeral_start);
    assert_eq!(endpoint.listen(first), Ok(()));
    assert_eq!(endpoint.listen(first), Err(Error::Illegal));
}

#[test]
fn session_pool_exhausted() {
    let config = Config { max_sessions: 1, ..Config::default() };
    let (mut endpoint, _) = listening(config);
    deliver(&mut endpoint, peer(TcpFlags::SYN, PEER_ISN, None), &[]);
    quiet(&mut endpoint);
    assert_eq!(endpoint.counters().dropped, 1);
    assert_eq!(endpoint.sockets_in_use(), 1);

    let other = endpoint.create_socket(Options::default()).unwrap();
    assert_eq!(endpoint.open(other, REMOTE, REMOTE_PORT), Err(Error::Exhausted));
}

#[test]
fn released_socket_is_freed_with_session() {
    let mut conn = connect();
    assert_eq!(conn.endpoint.release(conn.handle), Ok(()));
    let (fin, _) = take(&mut conn.endpoint);
    assert!(fin.flags.fin());

    deliver(&mut conn.endpoint, peer(TcpFlags::default(), conn.remote, Some(conn.local + 1)), &[]);
    // The released socket lives on with its session.
    assert_eq!(conn.endpoint.state(conn.handle), Some(State::FinWait2));
    assert_eq!(conn.endpoint.sessions_in_use(), 1);

    let orphan = u32::from(conn.endpoint.config().fin_wait2_orphan);
    conn.tick(orphan);
    assert_eq!(conn.endpoint.sessions_in_use(), 0);
    assert_eq!(conn.endpoint.sockets_in_use(), 0);
    assert_eq!(conn.endpoint.poll_event(), None);
}

#[test]
fn time_wait_reopen() {
    let (mut endpoint, listener) = listening(Config::default());
    deliver(&mut endpoint, peer(TcpFlags::SYN, PEER_ISN, None), &[]);
    let (synack, _) = take(&mut endpoint);
    let local = synack.seq_number + 1;
    deliver(&mut endpoint, peer(TcpFlags::default(), PEER_ISN + 1, Some(local)), &[]);
    let child = endpoint.poll_event().unwrap().socket;

    assert_eq!(endpoint.close(child), Ok(CloseOutcome::Closing));
    take(&mut endpoint);
    deliver(&mut endpoint, peer(TcpFlags::FIN, PEER_ISN + 1, Some(local + 1)), &[]);
    take(&mut endpoint);
    assert_eq!(endpoint.state(child), Some(State::TimeWait));
    events(&mut endpoint);

    // A new incarnation of the same four tuple.
    deliver(&mut endpoint, peer(TcpFlags::SYN, PEER_ISN + 100_000, None), &[]);
    let (reopened, _) = take(&mut endpoint);
    assert_eq!(reopened.flags, TcpFlags::SYN | TcpFlags::ACK);
    assert_eq!(reopened.ack_number, Some(PEER_ISN + 100_001));
    let distance = reopened.seq_number - (local + 1);
    assert!(distance >= 0x1_0000 && distance < 0x2_0000);

    assert_eq!(events(&mut endpoint), vec![EventKind::Closed]);
    assert_eq!(endpoint.state(child), Some(State::Closed));
    assert_eq!(endpoint.state(listener), Some(State::Listen));
}

#[test]
fn simultaneous_open() {
    let mut endpoint = endpoint_with(Config::default(), Link::Ethernet);
    let handle = endpoint.create_socket(Options::default()).unwrap();
    endpoint.bind(handle, Ipv6Address::UNSPECIFIED, LOCAL_PORT).unwrap();
    endpoint.open(handle, REMOTE, REMOTE_PORT).unwrap();
    let (syn, _) = take(&mut endpoint);

    let crossing = TcpRepr { max_seg_size: Some(1000), ..peer(TcpFlags::SYN, PEER_ISN, None) };
    deliver(&mut endpoint, crossing, &[]);
    let (synack, _) = take(&mut endpoint);
    assert_eq!(synack.flags, TcpFlags::SYN | TcpFlags::ACK);
    assert_eq!(synack.seq_number, syn.seq_number);
    assert_eq!(synack.ack_number, Some(PEER_ISN + 1));
    assert_eq!(synack.max_seg_size, Some(MAX_MSS));
    assert_eq!(endpoint.state(handle), Some(State::SynReceived));
    assert!(events(&mut endpoint).is_empty());

    deliver(&mut endpoint, peer(TcpFlags::default(), PEER_ISN + 1, Some(syn.seq_number + 1)), &[]);
    quiet(&mut endpoint);
    assert_eq!(endpoint.state(handle), Some(State::Established));
    assert_eq!(events(&mut endpoint), vec![EventKind::Connected]);
    let session = endpoint.session(handle).unwrap();
    assert!(!session.is_passive());
    assert_eq!(session.send_mss(), 1000);
}

#[test]
fn simultaneous_close() {
    let mut conn = connect();

    assert_eq!(conn.endpoint.close(conn.handle), Ok(CloseOutcome::Closing));
    let (fin, _) = take(&mut conn.endpoint);
    assert!(fin.flags.fin());

    // The peer's FIN crosses ours.
    deliver(&mut conn.endpoint, peer(TcpFlags::FIN, conn.remote, Some(conn.local)), &[]);
    let (ack, _) = take(&mut conn.endpoint);
    assert!(!ack.flags.fin());
    assert_eq!(ack.seq_number, conn.local + 1);
    assert_eq!(ack.ack_number, Some(conn.remote + 1));
    assert_eq!(conn.endpoint.state(conn.handle), Some(State::Closing));
    assert_eq!(events(&mut conn.endpoint), vec![EventKind::PeerClosed]);

    deliver(&mut conn.endpoint, peer(TcpFlags::default(), conn.remote + 1, Some(conn.local + 1)), &[]);
    quiet(&mut conn.endpoint);
    assert_eq!(conn.endpoint.state(conn.handle), Some(State::TimeWait));
    assert_eq!(conn.session().timer(), conn.endpoint.config().time_wait);
}

#[test]
fn close_before_synchronized() {
    let (mut endpoint, listener) = listening(Config::default());
    assert_eq!(endpoint.close(listener), Ok(CloseOutcome::Removed));
    assert_eq!(endpoint.state(listener), Some(State::Closed));
    assert_eq!(endpoint.sessions_in_use(), 0);

    let handle = endpoint.create_socket(Options::default()).unwrap();
    endpoint.open(handle, REMOTE, REMOTE_PORT).unwrap();
    take(&mut endpoint);
    assert_eq!(endpoint.close(handle), Ok(CloseOutcome::Removed));
    assert_eq!(endpoint.state(handle), Some(State::Closed));
    assert_eq!(endpoint.sessions_in_use(), 0);

    // Neither a reset nor a retransmitted SYN follows.
    for now in 1..100 {
        endpoint.tick(Instant::from_millis(now * 100));
    }
    quiet(&mut endpoint);
    assert_eq!(endpoint.poll_event(), None);
}

#[test]
fn send_after_sequence_space_wrapped_to_isn() {
    let mut conn = connect();
    // After exactly 2^32 octets the oldest unacknowledged number is the initial one again.
    let isn = conn.session().initial_send();
    {
        let session = conn.endpoint.session_mut(conn.handle).unwrap();
        session.send_unacknowledged = isn;
        session.send_next = isn;
        session.send_wl2 = isn;
    }

    assert_eq!(conn.endpoint.send(conn.handle, b"hello"), Ok(5));
    let (data, payload) = take(&mut conn.endpoint);
    assert!(!data.flags.syn());
    assert_eq!(data.seq_number, isn);
    assert_eq!(payload, b"hello");

    let rto = u32::from(conn.session().rto());
    conn.tick(rto);
    let (again, payload) = take(&mut conn.endpoint);
    assert!(!again.flags.syn());
    assert_eq!(again.seq_number, isn);
    assert_eq!(payload, b"hello");

    deliver(&mut conn.endpoint, peer(TcpFlags::default(), conn.remote, Some(isn + 5)), &[]);
    quiet(&mut conn.endpoint);
    assert_eq!(events(&mut conn.endpoint), vec![EventKind::SendSpace]);
    assert_eq!(conn.endpoint.socket(conn.handle).unwrap().send_queue(), 0);
    assert_eq!(conn.endpoint.state(conn.handle), Some(State::Established));
}

#[test]
fn data_across_sequence_wrap() {
    let mut conn = connect();
    let send_base = TcpSeqNumber(0xffff_fffe);
    let receive_base = TcpSeqNumber(0xffff_fffc);
    {
        let session = conn.endpoint.session_mut(conn.handle).unwrap();
        session.send_unacknowledged = send_base;
        session.send_next = send_base;
        session.send_wl1 = receive_base;
        session.send_wl2 = send_base;
        session.receive_next = receive_base;
        session.receive_adv = receive_base + 1024;
    }

    assert_eq!(conn.endpoint.send(conn.handle, b"abcdef"), Ok(6));
    let (data, payload) = take(&mut conn.endpoint);
    assert_eq!(data.seq_number, send_base);
    assert_eq!(data.ack_number, Some(receive_base));
    assert_eq!(payload, b"abcdef");
    assert_eq!(conn.session().send_next(), TcpSeqNumber(4));

    // Acknowledges all six octets and carries eight more, both ranges wrap.
    deliver(&mut conn.endpoint, peer(TcpFlags::default(), receive_base, Some(TcpSeqNumber(4))), b"12345678");
    let (ack, payload) = take(&mut conn.endpoint);
    assert!(payload.is_empty());
    assert_eq!(ack.seq_number, TcpSeqNumber(4));
    assert_eq!(ack.ack_number, Some(TcpSeqNumber(4)));
    assert_eq!(events(&mut conn.endpoint), vec![EventKind::SendSpace, EventKind::Data]);

    let session = conn.session();
    assert_eq!(session.send_unacknowledged(), TcpSeqNumber(4));
    assert_eq!(session.receive_next(), TcpSeqNumber(4));
    assert_eq!(session.timer(), 0);

    let mut buf = [0; 8];
    assert_eq!(conn.endpoint.recv(conn.handle, &mut buf), Ok(8));
    assert_eq!(&buf, b"12345678");

    // A duplicate from before the wrap is answered with the current acknowledgment.
    deliver(&mut conn.endpoint, peer(TcpFlags::default(), receive_base, Some(TcpSeqNumber(4))), b"1234");
    let (dup, _) = take(&mut conn.endpoint);
    assert_eq!(dup.ack_number, Some(TcpSeqNumber(4)));
    assert!(events(&mut conn.endpoint).is_empty());
}
