//! Longest prefix match over a fixed route table.
use alloc::vec::Vec;

use super::InterfaceId;
use crate::layer::{Error, Result};
use crate::wire::{Ipv6Address, Ipv6Subnet};

/// A prefix of addresses reachable through an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// The network reached through this route.
    pub net: Ipv6Subnet,

    /// The egress interface for this network.
    pub interface: InterfaceId,
}

/// A routing table with a capacity fixed at construction.
#[derive(Debug)]
pub struct Routes {
    routes: Vec<Route>,
    capacity: usize,
}

impl Routes {
    /// Create an empty table for at most `capacity` routes.
    pub fn new(capacity: usize) -> Self {
        Routes {
            routes: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a route or replace the route for the same prefix.
    pub fn add(&mut self, route: Route) -> Result<()> {
        if let Some(existing) = self.routes.iter_mut().find(|r| r.net == route.net) {
            *existing = route;
            return Ok(());
        }

        if self.routes.len() == self.capacity {
            return Err(Error::Exhausted);
        }

        self.routes.push(route);
        Ok(())
    }

    /// Remove all routes through an interface.
    pub fn remove_interface(&mut self, interface: InterfaceId) {
        self.routes.retain(|route| route.interface != interface)
    }

    /// Find the egress interface of the most specific route to an address.
    pub fn lookup(&self, dst_addr: Ipv6Address) -> Option<InterfaceId> {
        self.routes.iter()
            .filter(|route| route.net.contains(dst_addr))
            .max_by_key(|route| route.net.prefix_len())
            .map(|route| route.interface)
    }

    /// Iterate over the current routes.
    pub fn iter(&self) -> impl Iterator<Item=&Route> + '_ {
        self.routes.iter()
    }
}
