//! Segment generation and timer expiry.
//!
//! Everything a session sends is built here: the handshake segments, data and FIN, pure
//! acknowledgments and resets. The same code runs from three sources, processing of an incoming
//! segment, a user call that queued data or closed the connection, and the expiry of the timer.
use super::endpoint::Shared;
use super::session::{Session, Signals, State};
use super::socket::{EventKind, Socket};
use crate::wire::{TcpFlags, TcpRepr, TcpSeqNumber};

impl Session {
    /// A header for the connection, acknowledging everything received so far.
    fn header(&mut self, socket: &Socket, flags: TcpFlags, seq_number: TcpSeqNumber, payload_len: usize)
        -> TcpRepr
    {
        let window_len = self.advertise(socket);
        TcpRepr {
            src_port: socket.tuple.local_port,
            dst_port: socket.tuple.remote_port,
            flags,
            seq_number,
            ack_number: Some(self.receive_next),
            window_len,
            max_seg_size: None,
            payload_len,
        }
    }

    /// Extend the advertised window to the free receive buffer.
    ///
    /// The right edge never moves left, even when the buffer filled up with data from the
    /// previous window.
    fn advertise(&mut self, socket: &Socket) -> u16 {
        let free = socket.rx.free().min(usize::from(u16::MAX));
        self.receive_adv = self.receive_adv.max(self.receive_next + free);
        self.receive_window().min(usize::from(u16::MAX)) as u16
    }

    /// Send our SYN, or SYN+ACK when the peer's SYN was already received.
    pub(crate) fn send_syn(&mut self, socket: &Socket, shared: &mut Shared) {
        let mut repr = self.header(socket, TcpFlags::SYN, self.initial_send, 0);
        if self.state == State::SynSent {
            repr.ack_number = None;
            repr.window_len = socket.rx.free().min(usize::from(u16::MAX)) as u16;
        }
        repr.max_seg_size = Some(self.receive_mss);
        self.send_next = self.send_next.max(self.initial_send + 1);
        shared.send(socket, &repr, 0);
    }

    /// Send an acknowledgment without data.
    pub(crate) fn send_ack(&mut self, socket: &Socket, shared: &mut Shared) {
        let repr = self.header(socket, TcpFlags::default(), self.send_next, 0);
        shared.send(socket, &repr, 0);
    }

    /// Reset the connection from our side.
    pub(crate) fn send_reset(&mut self, socket: &Socket, shared: &mut Shared) {
        let mut repr = self.header(socket, TcpFlags::RST, self.send_next, 0);
        repr.ack_number = None;
        repr.window_len = 0;
        shared.send(socket, &repr, 0);
    }

    fn can_transmit(&self) -> bool {
        match self.state {
            State::Established | State::CloseWait | State::FinWait1 | State::Closing | State::LastAck =>
                !self.syn_outstanding(),
            _ => false,
        }
    }

    /// Send as much queued data as window and segment size allow, followed by a pending FIN.
    ///
    /// Returns whether any segment was sent. Every segment sent carries an acknowledgment so the
    /// caller need not send a separate one.
    pub(crate) fn transmit(&mut self, socket: &Socket, shared: &mut Shared) -> bool {
        let mut sent = false;
        loop {
            if !self.can_transmit() || self.persist {
                return sent;
            }

            let in_flight = self.data_in_flight();
            let unsent = socket.tx.len().saturating_sub(in_flight);

            if unsent == 0 {
                if !self.fin_pending() {
                    return sent;
                }
                let repr = self.header(socket, TcpFlags::FIN, self.send_next, 0);
                shared.send(socket, &repr, 0);
                self.send_next += 1;
                self.sent_fin = true;
                self.arm_retransmit();
                return true;
            }

            if self.send_window == 0 {
                if in_flight == 0 && !self.busy {
                    net_trace!("tcp: {} zero window, persisting", socket.tuple);
                    self.persist = true;
                    self.timer = self.rto;
                }
                return sent;
            }

            let outstanding = self.send_next.since(self.send_unacknowledged);
            let window_left = usize::from(self.send_window).saturating_sub(outstanding);
            if window_left == 0 {
                return sent;
            }

            let len = unsent.min(window_left).min(usize::from(self.send_mss));
            let fin = self.fin_pending() && len == unsent;
            let mut flags = TcpFlags::default();
            flags.set_psh(len == unsent);
            flags.set_fin(fin);

            let repr = self.header(socket, flags, self.send_next, len);
            shared.send(socket, &repr, in_flight);
            self.send_next += len + usize::from(fin);
            self.sent_fin |= fin;
            self.arm_retransmit();
            sent = true;
        }
    }

    /// Resend the oldest unacknowledged segment.
    ///
    /// Does not rewind `send_next`, data after the resent segment is only resent by later
    /// expiries.
    fn retransmit(&mut self, socket: &Socket, shared: &mut Shared) {
        shared.counters.retransmissions += 1;
        if self.syn_outstanding() {
            self.send_syn(socket, shared);
            return;
        }

        let in_flight = self.data_in_flight();
        let len = in_flight.min(usize::from(self.send_mss));
        let fin = self.fin_in_flight() && len == in_flight;
        if len == 0 && !fin {
            return;
        }

        let mut flags = TcpFlags::default();
        flags.set_psh(len > 0);
        flags.set_fin(fin);
        let repr = self.header(socket, flags, self.send_unacknowledged, len);
        shared.send(socket, &repr, 0);
    }

    /// Probe a zero window with a single byte.
    fn probe(&mut self, socket: &Socket, shared: &mut Shared) {
        let in_flight = self.data_in_flight();
        let seq_number = if in_flight > 0 {
            self.send_unacknowledged
        } else if !socket.tx.is_empty() {
            self.send_next
        } else {
            self.persist = false;
            return;
        };

        let repr = self.header(socket, TcpFlags::default(), seq_number, 1);
        shared.send(socket, &repr, 0);
        if in_flight == 0 {
            self.send_next += 1;
        }

        self.back_off(&shared.config);
        self.timer = self.rto;
    }

    /// Send an acknowledgment if the window can be opened substantially.
    ///
    /// Called after the user consumed received data. The threshold is the smaller of one segment
    /// and half the receive buffer.
    pub(crate) fn window_update(&mut self, socket: &Socket, shared: &mut Shared) {
        match self.state {
            State::Established | State::FinWait1 | State::FinWait2 => (),
            _ => return,
        }

        let free = socket.rx.free().min(usize::from(u16::MAX));
        let growth = (self.receive_next + free).since(self.receive_adv);
        let threshold = usize::from(self.receive_mss).min(socket.rx.capacity() / 2).max(1);
        if growth >= threshold {
            self.send_ack(socket, shared);
        }
    }

    /// Count down the timer by one tick.
    pub(crate) fn tick(&mut self, socket: &Socket, shared: &mut Shared) -> Signals {
        if self.timer == 0 {
            return Signals::default();
        }

        self.timer -= 1;
        if self.timer > 0 {
            return Signals::default();
        }

        self.expire(socket, shared)
    }

    fn expire(&mut self, socket: &Socket, shared: &mut Shared) -> Signals {
        match self.state {
            State::TimeWait => {
                net_debug!("tcp: {} TIME-WAIT expired", socket.tuple);
                return Signals::delete(Some(EventKind::Closed));
            },
            State::FinWait2 if !self.busy && !self.persist => {
                net_debug!("tcp: {} orphan in FIN-WAIT-2 expired", socket.tuple);
                return Signals::delete(Some(EventKind::Closed));
            },
            _ => (),
        }

        if self.persist {
            self.probe(socket, shared);
            return Signals::default();
        }

        if !self.busy {
            return Signals::default();
        }

        self.retry = self.retry.saturating_add(1);
        let (limit, reason) = match self.state {
            State::SynSent => (shared.config.syn_retries, Some(EventKind::ConnectFailed)),
            State::SynReceived if self.passive_open => (shared.config.syn_retries, None),
            State::SynReceived => (shared.config.syn_retries, Some(EventKind::ConnectFailed)),
            _ => (shared.config.max_retries, Some(EventKind::TimedOut)),
        };

        if self.retry > limit {
            net_debug!("tcp: {} gave up after {} retransmissions in {}",
                socket.tuple, limit, self.state);
            return Signals::delete(reason);
        }

        self.back_off(&shared.config);
        self.timer = self.rto;
        self.retransmit(socket, shared);
        Signals::default()
    }
}
