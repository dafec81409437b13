use crate::wire::ip::{HEADER_LEN as IPV6_HEADER_LEN, MIN_MTU};
use crate::wire::TCP_HEADER_LEN;

/// The smallest effective segment size ever used.
pub const MIN_MSS: u16 = 64;

/// The largest segment that fits the IPv6 minimum MTU without fragmentation.
pub const MAX_MSS: u16 = (MIN_MTU - IPV6_HEADER_LEN - TCP_HEADER_LEN) as u16;

/// Tunables of a tcp endpoint.
///
/// All durations are in timer ticks, see [`time::TICK_MILLIS`].
///
/// [`time::TICK_MILLIS`]: ../../time/constant.TICK_MILLIS.html
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// The number of sessions in the pool, listeners included.
    pub max_sessions: usize,

    /// The number of socket control blocks.
    ///
    /// Should be at least `max_sessions`, passive opens create a control block for each
    /// accepted connection.
    pub max_sockets: usize,

    /// The number of interfaces that may be registered.
    pub max_interfaces: usize,

    /// The number of routes in the routing table.
    pub max_routes: usize,

    /// The retransmission timeout before the first round-trip sample.
    pub initial_rto: u16,

    /// Lower clamp of the retransmission timeout.
    pub min_rto: u16,

    /// Upper clamp of the retransmission timeout, also bounds exponential backoff.
    pub max_rto: u16,

    /// Retransmissions of data or FIN before the connection is given up.
    pub max_retries: u8,

    /// Retransmissions of SYN or SYN+ACK before the connection attempt is given up.
    pub syn_retries: u8,

    /// Time spent in TIME-WAIT, twice the maximum segment lifetime.
    pub time_wait: u16,

    /// Time an orphaned session may remain in FIN-WAIT-2.
    pub fin_wait2_orphan: u16,

    /// Upper bound of the send and receive segment size on mesh links.
    pub mesh_mss: u16,

    /// First port of the ephemeral range, inclusive.
    pub ephemeral_start: u16,

    /// Last port of the ephemeral range, inclusive.
    pub ephemeral_end: u16,

    /// The number of datagrams or events that may be queued before new ones are dropped.
    pub queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_sessions: 8,
            max_sockets: 16,
            max_interfaces: 4,
            max_routes: 8,
            initial_rto: 30,
            min_rto: 10,
            max_rto: 600,
            max_retries: 8,
            syn_retries: 5,
            time_wait: 600,
            fin_wait2_orphan: 600,
            mesh_mss: 300,
            ephemeral_start: 49152,
            ephemeral_end: 65535,
            queue_capacity: 64,
        }
    }
}
