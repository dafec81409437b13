//! Protocol state of one connection.
use core::fmt;

use super::config::{Config, MAX_MSS, MIN_MSS};
use super::socket::EventKind;
use crate::layer::ip::Link;
use crate::managed::Key;
use crate::wire::TcpSeqNumber;

/// The state of a connection, RFC 793.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// No connection.
    Closed,
    /// Waiting for a connection request from any remote.
    Listen,
    /// Sent a connection request, waiting for the answer.
    SynSent,
    /// Received and sent a connection request, waiting for the acknowledgment.
    SynReceived,
    /// Data flows in both directions.
    Established,
    /// Closed locally, our FIN is not yet acknowledged.
    FinWait1,
    /// Closed locally and acknowledged, waiting for the remote FIN.
    FinWait2,
    /// Closed by the remote, the user may still send.
    CloseWait,
    /// Both sides closed simultaneously, waiting for the acknowledgment of our FIN.
    Closing,
    /// Closed by the remote then locally, waiting for the acknowledgment of our FIN.
    LastAck,
    /// Waiting out old duplicates before the four tuple may be reused.
    TimeWait,
}

/// Smoothed round-trip time and its variance, RFC 6298.
///
/// Both are kept as fixed point integers in ticks: the average scaled by 8 and the mean deviation
/// scaled by 4, the classic Van Jacobson representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RttEstimator {
    srtt8: i32,
    rttvar4: i32,
}

/// The outcome of processing that the endpoint has to act on.
///
/// A session can not free itself, nor run lookups on the endpoint, since it is borrowed from
/// the endpoint's pool while it processes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Signals {
    /// Free the session.
    pub(crate) delete: bool,

    /// Reported to the socket when the session is freed.
    pub(crate) reason: Option<EventKind>,

    /// A new connection request arrived for a connection in TIME-WAIT.
    ///
    /// The session should be freed and the segment handed to a matching listener as if the old
    /// incarnation never existed. Carries the next send sequence number of the old incarnation.
    pub(crate) reopen: Option<TcpSeqNumber>,
}

/// The protocol state of a connection.
///
/// Timers count ticks of the owner's clock, see [`Endpoint::tick`]. Only a single timer is
/// running at any point. Its meaning depends on the state and the flags of the session: the
/// retransmission timer while `busy`, the persist timer while `persist`, otherwise the TIME-WAIT
/// or orphan timeouts.
///
/// [`Endpoint::tick`]: struct.Endpoint.html#method.tick
#[derive(Debug, Clone)]
pub struct Session {
    pub(crate) socket: Key,
    pub(crate) state: State,
    pub(crate) link: Link,

    pub(crate) initial_send: TcpSeqNumber,
    pub(crate) send_unacknowledged: TcpSeqNumber,
    pub(crate) send_next: TcpSeqNumber,
    pub(crate) send_window: u16,
    /// Segment sequence number of the last window update.
    pub(crate) send_wl1: TcpSeqNumber,
    /// Segment acknowledgment number of the last window update.
    pub(crate) send_wl2: TcpSeqNumber,

    pub(crate) receive_next: TcpSeqNumber,
    /// The right edge of the advertised receive window. Never moves left.
    pub(crate) receive_adv: TcpSeqNumber,

    pub(crate) timer: u16,
    pub(crate) retry: u8,
    pub(crate) rto: u16,
    pub(crate) rtt: RttEstimator,

    /// The segment size announced by the peer.
    pub(crate) peer_mss: u16,
    /// The effective size of segments we send.
    pub(crate) send_mss: u16,
    /// The segment size we announce.
    pub(crate) receive_mss: u16,

    /// The connection was spawned by a listener.
    pub(crate) passive_open: bool,
    /// Unacknowledged sequence space is outstanding and the retransmission timer runs.
    pub(crate) busy: bool,
    /// Probing a zero window.
    pub(crate) persist: bool,
    /// An acknowledgment covered our SYN.
    pub(crate) syn_acked: bool,
    pub(crate) sent_fin: bool,
}

impl RttEstimator {
    /// The sentinel of an estimator that has not received any sample.
    const UNKNOWN: i32 = -1;

    fn new() -> Self {
        RttEstimator {
            srtt8: Self::UNKNOWN,
            rttvar4: 0,
        }
    }

    /// Feed a round-trip measurement in ticks.
    pub(crate) fn sample(&mut self, measured: u16) {
        let m = i32::from(measured);
        if self.srtt8 == Self::UNKNOWN {
            self.srtt8 = m << 3;
            self.rttvar4 = m << 1;
            return;
        }

        let mut delta = m - (self.srtt8 >> 3);
        self.srtt8 += delta;
        if delta < 0 {
            delta = -delta;
        }
        delta -= self.rttvar4 >> 2;
        self.rttvar4 += delta;
    }

    /// The retransmission timeout for the current estimate, clamped to the configured bounds.
    pub(crate) fn rto(&self, config: &Config) -> u16 {
        let rto = (self.srtt8 >> 3) + self.rttvar4;
        rto.max(i32::from(config.min_rto)).min(i32::from(config.max_rto)) as u16
    }

    /// The smoothed round-trip time in ticks, if any sample was taken.
    pub fn srtt(&self) -> Option<u16> {
        if self.srtt8 == Self::UNKNOWN {
            None
        } else {
            Some((self.srtt8 >> 3) as u16)
        }
    }

    /// The mean deviation of the round-trip time in ticks.
    pub fn rttvar(&self) -> u16 {
        (self.rttvar4 >> 2) as u16
    }
}

/// Clamp a segment size to what the link and the IPv6 minimum MTU allow.
///
/// The result is between [`MIN_MSS`] and [`MAX_MSS`]. Applying the clamp to its own output does
/// not change it.
///
/// [`MIN_MSS`]: constant.MIN_MSS.html
/// [`MAX_MSS`]: constant.MAX_MSS.html
pub fn effective_mss(mss: u16, link: Link, config: &Config) -> u16 {
    let mut mss = mss.min(MAX_MSS);
    if link == Link::Mesh {
        mss = mss.min(config.mesh_mss);
    }
    mss.max(MIN_MSS)
}

impl Session {
    /// A session in `Closed` state, not yet opened in any direction.
    pub(crate) fn new(socket: Key, link: Link, initial_send: TcpSeqNumber, config: &Config) -> Self {
        Session {
            socket,
            state: State::Closed,
            link,
            initial_send,
            send_unacknowledged: initial_send,
            send_next: initial_send,
            send_window: 0,
            send_wl1: TcpSeqNumber::default(),
            send_wl2: TcpSeqNumber::default(),
            receive_next: TcpSeqNumber::default(),
            receive_adv: TcpSeqNumber::default(),
            timer: 0,
            retry: 0,
            rto: config.initial_rto,
            rtt: RttEstimator::new(),
            peer_mss: crate::wire::TCP_DEFAULT_MSS,
            send_mss: effective_mss(crate::wire::TCP_DEFAULT_MSS, link, config),
            receive_mss: effective_mss(MAX_MSS, link, config),
            passive_open: false,
            busy: false,
            persist: false,
            syn_acked: false,
            sent_fin: false,
        }
    }

    /// The current state.
    pub fn state(&self) -> State {
        self.state
    }

    /// The initial send sequence number.
    pub fn initial_send(&self) -> TcpSeqNumber {
        self.initial_send
    }

    /// The oldest unacknowledged sequence number.
    pub fn send_unacknowledged(&self) -> TcpSeqNumber {
        self.send_unacknowledged
    }

    /// The next sequence number to be sent.
    pub fn send_next(&self) -> TcpSeqNumber {
        self.send_next
    }

    /// The send window last announced by the peer.
    pub fn send_window(&self) -> u16 {
        self.send_window
    }

    /// The next sequence number expected from the peer.
    pub fn receive_next(&self) -> TcpSeqNumber {
        self.receive_next
    }

    /// The current retransmission timeout in ticks.
    pub fn rto(&self) -> u16 {
        self.rto
    }

    /// The round-trip estimator.
    pub fn rtt(&self) -> &RttEstimator {
        &self.rtt
    }

    /// The number of consecutive retransmissions.
    pub fn retries(&self) -> u8 {
        self.retry
    }

    /// The remaining ticks of the running timer, zero if none runs.
    pub fn timer(&self) -> u16 {
        self.timer
    }

    /// The segment size announced by the peer, 536 if it announced none.
    pub fn peer_mss(&self) -> u16 {
        self.peer_mss
    }

    /// The effective size of sent segments.
    pub fn send_mss(&self) -> u16 {
        self.send_mss
    }

    /// The segment size announced to the peer.
    pub fn receive_mss(&self) -> u16 {
        self.receive_mss
    }

    /// Query whether the zero window is being probed.
    pub fn is_persisting(&self) -> bool {
        self.persist
    }

    /// Query whether the connection was spawned by a listener.
    pub fn is_passive(&self) -> bool {
        self.passive_open
    }

    /// Our SYN is sent but not yet acknowledged.
    pub(crate) fn syn_outstanding(&self) -> bool {
        match self.state {
            State::Closed | State::Listen => false,
            _ => !self.syn_acked,
        }
    }

    /// Our FIN occupies the last sent sequence number and is not yet acknowledged.
    pub(crate) fn fin_in_flight(&self) -> bool {
        self.sent_fin && self.send_next != self.send_unacknowledged
    }

    /// The user closed the connection but the FIN has not been sent yet.
    pub(crate) fn fin_pending(&self) -> bool {
        match self.state {
            State::FinWait1 | State::Closing | State::LastAck => !self.sent_fin,
            _ => false,
        }
    }

    /// The number of payload bytes sent but not yet acknowledged.
    pub(crate) fn data_in_flight(&self) -> usize {
        let mut in_flight = self.send_next.since(self.send_unacknowledged);
        if self.syn_outstanding() {
            in_flight = in_flight.saturating_sub(1);
        }
        if self.fin_in_flight() {
            in_flight = in_flight.saturating_sub(1);
        }
        in_flight
    }

    /// The window we currently advertise.
    pub(crate) fn receive_window(&self) -> usize {
        self.receive_adv.since(self.receive_next)
    }

    pub(crate) fn arm_retransmit(&mut self) {
        if !self.busy {
            self.busy = true;
            self.timer = self.rto;
        }
    }

    pub(crate) fn back_off(&mut self, config: &Config) {
        self.rto = self.rto.saturating_mul(2).min(config.max_rto);
    }
}

impl Signals {
    pub(crate) fn delete(reason: Option<EventKind>) -> Self {
        Signals {
            delete: true,
            reason,
            reopen: None,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            State::Closed => "CLOSED",
            State::Listen => "LISTEN",
            State::SynSent => "SYN-SENT",
            State::SynReceived => "SYN-RECEIVED",
            State::Established => "ESTABLISHED",
            State::FinWait1 => "FIN-WAIT-1",
            State::FinWait2 => "FIN-WAIT-2",
            State::CloseWait => "CLOSE-WAIT",
            State::Closing => "CLOSING",
            State::LastAck => "LAST-ACK",
            State::TimeWait => "TIME-WAIT",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rtt_first_sample() {
        let config = Config::default();
        let mut rtt = RttEstimator::new();
        assert_eq!(rtt.srtt(), None);

        rtt.sample(4);
        assert_eq!(rtt.srtt(), Some(4));
        assert_eq!(rtt.rttvar(), 2);
        // 4 + 4 * 2 but never below the configured minimum.
        assert_eq!(rtt.rto(&config), config.min_rto.max(12));
    }

    #[test]
    fn rto_bounds() {
        let config = Config::default();
        let mut rtt = RttEstimator::new();
        rtt.sample(0);
        assert_eq!(rtt.rto(&config), config.min_rto);

        for _ in 0..20 {
            rtt.sample(u16::MAX);
        }
        assert_eq!(rtt.rto(&config), config.max_rto);
    }

    #[test]
    fn rtt_converges() {
        let config = Config { min_rto: 1, ..Config::default() };
        let mut rtt = RttEstimator::new();
        for _ in 0..64 {
            rtt.sample(20);
        }
        assert_eq!(rtt.srtt(), Some(20));
        assert!(rtt.rto(&config) >= 20);
        assert!(rtt.rto(&config) < 24);
    }

    #[test]
    fn mss_clamp() {
        let config = Config::default();
        for &link in &[Link::Ethernet, Link::Mesh] {
            for &mss in &[0, 1, 63, 64, 300, 536, 1220, 1460, u16::MAX] {
                let clamped = effective_mss(mss, link, &config);
                assert!(clamped >= MIN_MSS && clamped <= MAX_MSS);
                assert_eq!(effective_mss(clamped, link, &config), clamped);
            }
        }
        assert_eq!(effective_mss(1460, Link::Ethernet, &config), 1220);
        assert_eq!(effective_mss(1460, Link::Mesh, &config), config.mesh_mss);
        assert_eq!(effective_mss(10, Link::Mesh, &config), MIN_MSS);
    }

    #[test]
    fn backoff_is_capped() {
        let config = Config::default();
        let key = crate::managed::SlotMap::with_capacity(1).insert(()).unwrap();
        let mut session = Session::new(key, Link::Ethernet, TcpSeqNumber(7), &config);
        for _ in 0..16 {
            session.back_off(&config);
            assert!(session.rto() <= config.max_rto);
        }
        assert_eq!(session.rto(), config.max_rto);
    }
}
