//! The TCP layer abstraction.
//!
//! A session engine for TCP over IPv6 as found on constrained mesh nodes. It offers the RFC 793
//! connection state machine, retransmission with an adaptive timeout, zero window probing and
//! segment size negotiation, on top of a minimal socket control block.
//!
//! ## Structure
//!
//! The [`Endpoint`] owns two pools that are sized once: socket control blocks and sessions. A
//! socket is what the user holds a [`SocketHandle`] to, it keeps the addressing and the stream
//! buffers. A [`Session`] carries the protocol state and exists only while a connection is being
//! set up, established or torn down. Both refer to each other by generational keys, so a stale
//! reference is detected instead of silently resolving to a newer connection in the same slot.
//!
//! [`Endpoint`]: struct.Endpoint.html
//! [`SocketHandle`]: struct.SocketHandle.html
//! [`Session`]: struct.Session.html
//!
//! Unlike standard stacks where state and user must be assumed to be in different protection
//! domains and which manage their state opaquely, it poses no problem for this library to allow
//! inspection of internal state. Sessions can be inspected at any time through the endpoint.
//!
//! ## Driving the endpoint
//!
//! The endpoint never blocks and owns no timer. The owner feeds it:
//!
//! * incoming segments through [`Endpoint::input`], after the IP layer removed its header,
//! * the passage of time through [`Endpoint::tick`], one call per tick of 100 milliseconds,
//! * user operations such as [`Endpoint::send`] or [`Endpoint::close`].
//!
//! All of these may produce segments, which are queued as datagrams until the owner takes them
//! with [`Endpoint::poll_transmit`]. What happened to a connection is reported through
//! [`Endpoint::poll_event`].
//!
//! [`Endpoint::input`]: struct.Endpoint.html#method.input
//! [`Endpoint::tick`]: struct.Endpoint.html#method.tick
//! [`Endpoint::send`]: struct.Endpoint.html#method.send
//! [`Endpoint::close`]: struct.Endpoint.html#method.close
//! [`Endpoint::poll_transmit`]: struct.Endpoint.html#method.poll_transmit
//! [`Endpoint::poll_event`]: struct.Endpoint.html#method.poll_event
//!
//! ## Accepting connections
//!
//! A listening socket accepts every connection request for its port. Each request spawns a new
//! socket that is invisible to the user until the handshake completes. Only then an `Incoming`
//! event names the new socket. A request that fails the handshake disappears without a trace.
//!
//! ## Deviations
//!
//! Segments arriving out of order are not queued. They are answered with a duplicate
//! acknowledgment and dropped, the peer will retransmit. There is no congestion control beyond
//! exponential backoff of the retransmission timer, and a retransmission only resends the oldest
//! unacknowledged segment.
//!
//! An incoming packet in Closed state is simply dropped if it had RST set.  Packets with RST
//! should *never* be answered with a packet with RST but the only specified answers would set that
//! flag. In fact, RFC793 is clear about this [in section Reset
//! Generation](https://tools.ietf.org/html/rfc793#page-36):
//!
//! > 1.  If the connection does not exist (CLOSED) then a reset is sent in response to any
//! incoming segment except another reset.
//!
//! The same holds for segments whose options can not be parsed, even when they carry the four
//! tuple of an existing connection.
//!
//! Data sent in SYN packet is ignored for now. The peer retransmits it after the handshake.
mod config;
mod endpoint;
mod input;
mod output;
mod session;
mod socket;

mod siphash;

#[cfg(test)]
mod tests;

pub use config::{
    Config,
    MAX_MSS,
    MIN_MSS};

pub use endpoint::{
    CloseOutcome,
    Counters,
    Endpoint,
    InPacket};

pub use session::{
    effective_mss,
    RttEstimator,
    Session,
    State};

pub use socket::{
    Event,
    EventKind,
    FourTuple,
    Options,
    Socket,
    SocketHandle};

// publically exposed for initialization.
pub use siphash::IsnGenerator;
