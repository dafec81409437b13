//! The process logic of protocol layers.
//!
//! ## Layering
//!
//! Each protocol layer is split into two parts; the packet logic contained in `wire` and the
//! processing part in this module. An endpoint represents the local state of a protocol. This
//! state can be used to process packets of that layer. The state is open to modifications as part
//! of a user program while processing does not take place, similar to reconfiguration on the OS
//! level with utilities such as `ip`, `ss`, etc.
//!
//! ## Errors
//!
//! Protocol violations by a peer are never reported through `Error`. They are answered on the
//! wire (with a reset or a duplicate acknowledgment) and counted. The error type here is for the
//! caller of the layer who asked for something that is impossible right now, or ever.
use core::fmt;

pub mod ip;
pub mod mle;
pub mod tcp;

/// The result type of layer operations.
pub type Result<T> = core::result::Result<T, Error>;

/// The error type of layer operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Error {
    /// The operation was not permitted.
    ///
    /// Returned when the operation is not valid in the current state of the endpoint, the socket
    /// or the connection.
    Illegal,

    /// Unable to find a route towards the destination address.
    Unreachable,

    /// The action could not be completed because there were not enough resources.
    ///
    /// The main difference towards `Illegal` is that implies that it would have been legal with
    /// more resources. A pool or free list was empty or the initial allocation of a table failed.
    Exhausted,

    /// The handle does not refer to a current member.
    ///
    /// E.g. removing a neighbor entry that was already removed. Distinct from `NoSuchInterface`
    /// so the caller can tell a stale handle from a table that never existed.
    NotFound,

    /// No table or interface is registered under that identifier.
    NoSuchInterface,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Illegal => write!(f, "operation not permitted in current state"),
            Error::Unreachable => write!(f, "no route to destination"),
            Error::Exhausted => write!(f, "resources exhausted"),
            Error::NotFound => write!(f, "entry not found"),
            Error::NoSuchInterface => write!(f, "interface not registered"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Can convert from a wire error.
///
/// This indicates some layer tried to operate on a packet but failed.
impl From<crate::wire::Error> for Error {
    fn from(_: crate::wire::Error) -> Self {
        Error::Illegal
    }
}
