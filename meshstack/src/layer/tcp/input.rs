//! Processing of segments arriving for an existing session.
//!
//! Follows the event processing of RFC 793, section 3.9, "SEGMENT ARRIVES", after the endpoint
//! has validated the segment and found the session it belongs to.
use super::endpoint::{Segment, Shared};
use super::session::{effective_mss, Session, Signals, State};
use super::socket::{EventKind, Socket};
use crate::managed::Key;
use crate::wire::{TcpSeqNumber, TCP_DEFAULT_MSS};

impl Session {
    /// Process a segment for this session.
    pub(crate) fn arrives(&mut self, socket: &mut Socket, key: Key, seg: &Segment, shared: &mut Shared)
        -> Signals
    {
        let repr = &seg.repr;
        match self.state {
            State::Closed | State::Listen => return Signals::default(),
            State::SynSent => return self.arrives_syn_sent(socket, key, seg, shared),
            State::TimeWait if repr.flags.syn() && !repr.flags.ack() && !repr.flags.rst() => {
                // A new incarnation may start once the old one is certainly not confused with it.
                if !(repr.seq_number < self.receive_next) {
                    net_debug!("tcp: {} reopened from TIME-WAIT", socket.tuple);
                    return Signals { reopen: Some(self.send_next), ..Signals::default() };
                }
                return Signals::default();
            },
            _ => (),
        }

        let mut flags = repr.flags;
        let mut seq = repr.seq_number;
        let mut payload = seg.payload;
        let window = self.receive_window();

        if !self.acceptable(seq, repr.sequence_len(), window) {
            // This may cause an ack storm with a peer that disagrees about the window. RFC 793
            // requires the answer regardless and so do we.
            net_trace!("tcp: {} unacceptable segment seq={}", socket.tuple, seq);
            if !flags.rst() {
                if self.syn_outstanding() && self.passive_open {
                    self.send_syn(socket, shared);
                } else {
                    self.send_ack(socket, shared);
                }
            }
            return Signals::default();
        }

        // Trim everything before the window.
        let mut trimmed = false;
        if seq < self.receive_next {
            let mut excess = self.receive_next.since(seq);
            if flags.syn() {
                flags.set_syn(false);
                seq += 1;
                excess -= 1;
            }
            let cut = excess.min(payload.len());
            payload = &payload[cut..];
            seq += cut;
            if excess > cut {
                flags.set_fin(false);
            }
        }

        // Trim everything after the window.
        let room = window.saturating_sub(seq.since(self.receive_next));
        if payload.len() > room {
            payload = &payload[..room];
            flags.set_fin(false);
            trimmed = true;
        }

        if flags.rst() {
            return match self.state {
                State::SynReceived if self.passive_open => {
                    net_debug!("tcp: {} reset before accepted", socket.tuple);
                    Signals::delete(None)
                },
                State::SynReceived => Signals::delete(Some(EventKind::ConnectFailed)),
                State::Established | State::FinWait1 | State::FinWait2 | State::CloseWait => {
                    net_debug!("tcp: {} reset by peer", socket.tuple);
                    Signals::delete(Some(EventKind::Reset))
                },
                State::Closing | State::LastAck => Signals::delete(Some(EventKind::Closed)),
                State::TimeWait | State::Closed | State::Listen | State::SynSent => Signals::default(),
            };
        }

        if flags.syn() {
            if self.state == State::SynReceived && self.passive_open {
                return Signals::delete(None);
            }
            net_debug!("tcp: {} SYN in window, resetting", socket.tuple);
            self.send_reset(socket, shared);
            return Signals::delete(Some(EventKind::Reset));
        }

        let ack = match repr.ack_number {
            Some(ack) => ack,
            None => return Signals::default(),
        };

        if self.syn_outstanding() {
            if !(self.send_unacknowledged < ack && ack <= self.send_next) {
                shared.reply_reset(seg);
                return Signals::default();
            }
            self.established(socket, key, repr.seq_number, ack, repr.window_len, shared);
        } else {
            if ack > self.send_next {
                self.send_ack(socket, shared);
                return Signals::default();
            }

            if !(ack < self.send_unacknowledged) {
                let newer = self.send_wl1 < repr.seq_number
                    || (self.send_wl1 == repr.seq_number && !(ack < self.send_wl2));
                if newer {
                    self.send_window = repr.window_len;
                    self.send_wl1 = repr.seq_number;
                    self.send_wl2 = ack;
                }
            }

            if ack > self.send_unacknowledged {
                self.acknowledged(socket, key, ack, shared);
            }

            if self.persist && self.send_window > 0 {
                net_trace!("tcp: {} window opened", socket.tuple);
                self.persist = false;
                self.timer = 0;
                if self.send_next != self.send_unacknowledged {
                    self.busy = false;
                    self.arm_retransmit();
                }
            }
        }

        let fin_acked = self.sent_fin && self.send_unacknowledged == self.send_next;
        match self.state {
            State::FinWait1 if fin_acked => {
                self.state = State::FinWait2;
                if socket.released {
                    self.timer = shared.config.fin_wait2_orphan;
                }
            },
            State::Closing if fin_acked => self.enter_time_wait(shared),
            State::LastAck if fin_acked => return Signals::delete(Some(EventKind::Closed)),
            _ => (),
        }

        let mut need_ack = trimmed;
        if !payload.is_empty() {
            match self.state {
                State::Established | State::FinWait1 | State::FinWait2 => {
                    if seq != self.receive_next {
                        // Out of order, not queued. The duplicate ack tells the peer what we miss.
                        self.send_ack(socket, shared);
                        return Signals::default();
                    }
                    if socket.cant_recv_more {
                        net_trace!("tcp: {} discarding {} bytes after shutdown", socket.tuple, payload.len());
                    } else {
                        let queued = socket.rx.push(payload);
                        debug_assert_eq!(queued, payload.len());
                        shared.notify(socket, key, EventKind::Data);
                    }
                    self.receive_next += payload.len();
                    need_ack = true;
                },
                _ => (),
            }
        }

        if flags.fin() {
            let in_order = seq + payload.len() == self.receive_next;
            match self.state {
                State::SynReceived | State::Established if in_order => {
                    self.receive_next += 1;
                    self.state = State::CloseWait;
                    shared.notify(socket, key, EventKind::PeerClosed);
                    need_ack = true;
                },
                State::FinWait1 if in_order => {
                    self.receive_next += 1;
                    self.state = State::Closing;
                    shared.notify(socket, key, EventKind::PeerClosed);
                    need_ack = true;
                },
                State::FinWait2 if in_order => {
                    self.receive_next += 1;
                    self.enter_time_wait(shared);
                    shared.notify(socket, key, EventKind::PeerClosed);
                    need_ack = true;
                },
                State::TimeWait => {
                    self.timer = shared.config.time_wait;
                    need_ack = true;
                },
                _ => need_ack = true,
            }
        }

        let sent = self.transmit(socket, shared);
        if need_ack && !sent {
            self.send_ack(socket, shared);
        }

        Signals::default()
    }

    fn arrives_syn_sent(&mut self, socket: &mut Socket, key: Key, seg: &Segment, shared: &mut Shared)
        -> Signals
    {
        let repr = &seg.repr;
        if let Some(ack) = repr.ack_number {
            if ack != self.send_next {
                shared.reply_reset(seg);
                return Signals::default();
            }
        }

        if repr.flags.rst() {
            if repr.ack_number.is_some() {
                net_debug!("tcp: {} connection refused", socket.tuple);
                return Signals::delete(Some(EventKind::ConnectFailed));
            }
            return Signals::default();
        }

        if !repr.flags.syn() {
            return Signals::default();
        }

        self.receive_next = repr.seq_number + 1;
        self.receive_adv = self.receive_next;
        self.peer_mss = repr.max_seg_size.unwrap_or(TCP_DEFAULT_MSS);
        self.send_mss = effective_mss(self.peer_mss, self.link, &shared.config);

        match repr.ack_number {
            Some(ack) => {
                self.established(socket, key, repr.seq_number, ack, repr.window_len, shared);
                if !self.transmit(socket, shared) {
                    self.send_ack(socket, shared);
                }
            },
            None => {
                // Simultaneous open.
                self.state = State::SynReceived;
                self.send_window = repr.window_len;
                self.send_wl1 = repr.seq_number;
                self.send_syn(socket, shared);
            },
        }

        Signals::default()
    }

    /// The acceptability test of RFC 793.
    ///
    /// A zero window still admits a segment starting exactly at the next expected number so that
    /// acknowledgments, resets and window probes are processed.
    fn acceptable(&self, seq: TcpSeqNumber, len: usize, window: usize) -> bool {
        let rcv = self.receive_next;
        let in_window = |n: TcpSeqNumber| !(n < rcv) && n < rcv + window;
        match (len, window) {
            (0, 0) => seq == rcv,
            (0, _) => in_window(seq),
            (_, 0) => seq == rcv,
            (_, _) => in_window(seq) || in_window(seq + (len - 1)),
        }
    }

    /// Our SYN was acknowledged.
    fn established(
        &mut self,
        socket: &mut Socket,
        key: Key,
        seq: TcpSeqNumber,
        ack: TcpSeqNumber,
        window: u16,
        shared: &mut Shared,
    ) {
        self.send_unacknowledged = ack;
        self.syn_acked = true;
        if self.retry == 0 {
            self.rtt.sample(self.rto.saturating_sub(self.timer));
            self.rto = self.rtt.rto(&shared.config);
        }
        self.retry = 0;
        self.busy = false;
        self.timer = 0;

        self.send_window = window;
        self.send_wl1 = seq;
        self.send_wl2 = ack;

        if let State::SynSent | State::SynReceived = self.state {
            self.state = State::Established;
        }
        net_debug!("tcp: {} established, mss {}", socket.tuple, self.send_mss);

        if self.passive_open {
            // Until now nobody could hold a handle to the socket.
            if let Some(listener) = socket.listener {
                socket.released = false;
                shared.notify(socket, key, EventKind::Incoming { listener });
            }
        } else {
            shared.notify(socket, key, EventKind::Connected);
        }
    }

    /// New sequence space was acknowledged.
    fn acknowledged(&mut self, socket: &mut Socket, key: Key, ack: TcpSeqNumber, shared: &mut Shared) {
        let mut acked = ack.since(self.send_unacknowledged);
        if self.sent_fin && ack == self.send_next {
            acked -= 1;
        }
        let data = acked.min(socket.tx.len());
        socket.tx.consume(data);
        self.send_unacknowledged = ack;

        if self.busy && self.retry == 0 && !self.persist {
            self.rtt.sample(self.rto.saturating_sub(self.timer));
            self.rto = self.rtt.rto(&shared.config);
        }
        self.retry = 0;

        if ack == self.send_next {
            self.busy = false;
            if !self.persist {
                self.timer = 0;
            }
        } else if self.busy {
            self.timer = self.rto;
        }

        if data > 0 && !socket.cant_send_more && socket.tx.free() >= socket.options.low_water {
            shared.notify(socket, key, EventKind::SendSpace);
        }
    }

    fn enter_time_wait(&mut self, shared: &Shared) {
        self.state = State::TimeWait;
        self.busy = false;
        self.persist = false;
        self.timer = shared.config.time_wait;
    }
}
