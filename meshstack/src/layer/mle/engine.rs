use core::mem;
use alloc::boxed::Box;
use alloc::vec::Vec;

use super::class::{Hooks, KeepAlive, Services, TableClass, TableMode, TopologyEvent};
use super::neighbor::Neighbor;
use crate::layer::{Error, Result};
use crate::layer::ip::InterfaceId;
use crate::time::Instant;
use crate::wire::{Ipv6Address, LinkAddress};

/// The neighbor tables of all mesh interfaces.
///
/// One table class exists per registered interface. A single timer, owned by the `Services` of
/// the engine, ages all of them. It is started with the first table and cancelled when the last
/// one is gone.
pub struct Engine<S: Services> {
    classes: Vec<TableClass>,
    services: S,
    timer_running: bool,
    now: Instant,
}

impl<S: Services> Engine<S> {
    /// Ticks between two aging passes.
    pub const TIMER_TICKS: u32 = 1;

    /// Create an engine without any tables.
    pub fn new(services: S) -> Self {
        Engine {
            classes: Vec::new(),
            services,
            timer_running: false,
            now: Instant::from_millis(0),
        }
    }

    /// The collaborators.
    pub fn services(&self) -> &S {
        &self.services
    }

    /// The collaborators, mutably.
    pub fn services_mut(&mut self) -> &mut S {
        &mut self.services
    }

    /// Update the time recorded as last contact of neighbors.
    pub fn set_time(&mut self, now: Instant) {
        self.now = now;
    }

    /// Register a table for an interface.
    ///
    /// Registering again replaces the hooks. Only when the capacity changes the table is
    /// reallocated, which removes all of its neighbors.
    pub fn class_init(&mut self, interface: InterfaceId, capacity: usize, hooks: Box<dyn Hooks>) -> Result<()> {
        if !self.services.interface_exists(interface) {
            return Err(Error::NoSuchInterface);
        }

        let Engine { classes, services, .. } = self;
        if let Some(class) = classes.iter_mut().find(|class| class.interface == interface) {
            // The new hooks already learn about the neighbors evicted by a resize.
            class.hooks = hooks;
            if class.capacity() == capacity {
                return Ok(());
            }

            let mut fresh = TableClass::new(interface, capacity, Box::new(Detached))?;
            class.clear(services);
            mem::swap(&mut fresh.hooks, &mut class.hooks);
            fresh.mode = class.mode;
            *class = fresh;
            net_debug!("mle: {} table resized to {}", interface, capacity);
            return Ok(());
        }

        let class = TableClass::new(interface, capacity, hooks)?;
        classes.try_reserve(1).map_err(|_| Error::Exhausted)?;
        classes.push(class);
        net_debug!("mle: {} table of {} neighbors", interface, capacity);

        if !self.timer_running {
            self.services.schedule_tick(Self::TIMER_TICKS);
            self.timer_running = true;
        }
        Ok(())
    }

    /// Drop the table of an interface, removing all neighbors.
    pub fn class_deallocate(&mut self, interface: InterfaceId) -> Result<()> {
        let position = self.classes.iter().position(|class| class.interface == interface)
            .ok_or(Error::NoSuchInterface)?;
        let mut class = self.classes.remove(position);
        class.clear(&mut self.services);
        net_debug!("mle: {} table deallocated", interface);

        if self.classes.is_empty() && self.timer_running {
            self.services.cancel_tick();
            self.timer_running = false;
        }
        Ok(())
    }

    /// Query whether an interface has a table.
    pub fn class_exists(&self, interface: InterfaceId) -> bool {
        self.class(interface).is_ok()
    }

    /// Set how neighbors of an interface age.
    pub fn mode_set(&mut self, interface: InterfaceId, mode: TableMode) -> Result<()> {
        self.class_mut(interface)?.mode = mode;
        Ok(())
    }

    /// The current mode of an interface.
    pub fn mode(&self, interface: InterfaceId) -> Result<TableMode> {
        Ok(self.class(interface)?.mode)
    }

    /// Mark every neighbor of an interface as yet to switch to the next key.
    pub fn set_new_key_pending(&mut self, interface: InterfaceId) -> Result<()> {
        let class = self.class_mut(interface)?;
        for index in 0..class.active.len() {
            let slot = class.active[index];
            if let Some(entry) = class.entry_mut(slot) {
                entry.set_new_key_pending(true);
            }
        }
        Ok(())
    }

    /// The number of free slots.
    pub fn free_entry_count(&self, interface: InterfaceId) -> Result<usize> {
        Ok(self.class(interface)?.free_count())
    }

    /// The number of neighbors that sleep while idle.
    pub fn sleepy_entry_count(&self, interface: InterfaceId) -> Result<usize> {
        Ok(self.class(interface)?.active_entries()
            .filter(|entry| !entry.mode().is_rx_on_idle())
            .count())
    }

    /// The number of neighbors that are reduced function devices.
    pub fn rfd_entry_count(&self, interface: InterfaceId) -> Result<usize> {
        Ok(self.class(interface)?.active_entries()
            .filter(|entry| !entry.mode().is_full_device())
            .count())
    }

    /// Iterate the neighbors of an interface, most recently added first.
    pub fn entries(&self, interface: InterfaceId) -> Result<impl Iterator<Item=&Neighbor> + '_> {
        Ok(self.class(interface)?.active_entries())
    }

    /// Look up a neighbor by its link-local address.
    ///
    /// The address must be link-local with an interface identifier derived from an extended
    /// address. A hit updates the link margin average, a miss allocates a new neighbor if
    /// requested.
    pub fn get_entry_by_ll64(
        &mut self,
        interface: InterfaceId,
        link_margin: u8,
        address: Ipv6Address,
        allocate: bool,
    ) -> Option<&mut Neighbor> {
        let mac = mac_from_ll64(address)?;
        let (entry, new) = self.get_entry_by_mac64(interface, link_margin, mac, allocate)?;
        if !new {
            entry.update_link_margin(link_margin);
        }
        Some(entry)
    }

    /// Look up a neighbor by its link-local address, without side effects.
    pub fn discover_entry_by_ll64(&mut self, interface: InterfaceId, address: Ipv6Address)
        -> Option<&mut Neighbor>
    {
        let mac = mac_from_ll64(address)?;
        self.get_by_link_address(interface, LinkAddress::Extended(mac))
    }

    /// Look up a neighbor by its extended address, allocating one on a miss if requested.
    ///
    /// Also returns whether the neighbor is new. Fails if the table is full.
    pub fn get_entry_by_mac64(
        &mut self,
        interface: InterfaceId,
        link_margin: u8,
        mac: [u8; 8],
        allocate: bool,
    ) -> Option<(&mut Neighbor, bool)> {
        let now = self.now;
        let Engine { classes, services, .. } = self;
        let class = classes.iter_mut().find(|class| class.interface == interface)?;

        if let Some(slot) = class.find(LinkAddress::Extended(mac)) {
            return class.entry_mut(slot).map(|entry| (entry, false));
        }
        if !allocate {
            return None;
        }

        let slot = match class.allocate(mac, link_margin, now) {
            Some(slot) => slot,
            None => {
                net_debug!("mle: {} table full, {} not added", interface, LinkAddress::Extended(mac));
                return None;
            },
        };
        services.trace(interface, TopologyEvent::Add(mac));
        net_debug!("mle: {} added neighbor {}", interface, LinkAddress::Extended(mac));
        class.entry_mut(slot).map(|entry| (entry, true))
    }

    /// Look up a neighbor by a short or extended link address.
    pub fn get_by_link_address(&mut self, interface: InterfaceId, address: LinkAddress)
        -> Option<&mut Neighbor>
    {
        let class = self.class_mut(interface).ok()?;
        let slot = class.find(address)?;
        class.entry_mut(slot)
    }

    /// Look up a neighbor by its attribute index.
    pub fn get_by_attribute_index(&mut self, interface: InterfaceId, attribute_index: u8)
        -> Option<&mut Neighbor>
    {
        let class = self.class_mut(interface).ok()?;
        if !class.is_active(attribute_index) {
            return None;
        }
        class.entry_mut(attribute_index)
    }

    /// Remove the neighbor with an attribute index.
    ///
    /// Fails with `NotFound` if the slot is not in use, e.g. when it was already removed.
    pub fn remove_entry(&mut self, interface: InterfaceId, attribute_index: u8) -> Result<()> {
        let Engine { classes, services, .. } = self;
        let class = classes.iter_mut().find(|class| class.interface == interface)
            .ok_or(Error::NoSuchInterface)?;
        class.remove(attribute_index, services)
    }

    /// Remove the neighbor with an extended address.
    pub fn remove_neighbour(&mut self, interface: InterfaceId, mac: [u8; 8]) -> Result<()> {
        let Engine { classes, services, .. } = self;
        let class = classes.iter_mut().find(|class| class.interface == interface)
            .ok_or(Error::NoSuchInterface)?;
        let slot = class.find(LinkAddress::Extended(mac)).ok_or(Error::NotFound)?;
        class.remove(slot, services)
    }

    /// Restart the timeout of a neighbor we heard from.
    ///
    /// A data poll confirmation is weaker evidence than a received frame. It does not refresh a
    /// neighbor that is already close to expiry, so a pending keep-alive is not masked.
    pub fn refresh_entry_timeout(&mut self, interface: InterfaceId, address: LinkAddress, data_poll: bool)
        -> Result<()>
    {
        let now = self.now;
        let class = self.class_mut(interface)?;
        let slot = class.find(address).ok_or(Error::NotFound)?;
        let entry = class.entry_mut(slot).ok_or(Error::NotFound)?;
        if data_poll && entry.ttl() <= Neighbor::CHALLENGE_TIMER {
            return Ok(());
        }
        entry.timeout_refresh(now);
        Ok(())
    }

    /// Age all tables by some ticks.
    ///
    /// Called by the owner when the timer requested through `Services::schedule_tick` fired. The
    /// timer is requested again once all tables were processed.
    pub fn timer_expired(&mut self, ticks: u32) {
        let Engine { classes, services, .. } = self;
        for class in classes.iter_mut() {
            if !class.hooks.is_active(class.interface) {
                continue;
            }
            class.age(ticks, services);
        }

        if self.classes.is_empty() {
            self.timer_running = false;
        } else {
            self.services.schedule_tick(Self::TIMER_TICKS);
            self.timer_running = true;
        }
    }

    fn class(&self, interface: InterfaceId) -> Result<&TableClass> {
        self.classes.iter()
            .find(|class| class.interface == interface)
            .ok_or(Error::NoSuchInterface)
    }

    fn class_mut(&mut self, interface: InterfaceId) -> Result<&mut TableClass> {
        self.classes.iter_mut()
            .find(|class| class.interface == interface)
            .ok_or(Error::NoSuchInterface)
    }
}

/// Stands in for the hooks of a table while they move to its replacement.
struct Detached;

impl Hooks for Detached {
    fn on_remove(&mut self, _: InterfaceId, _: &Neighbor) { }

    fn keep_alive(&mut self, _: InterfaceId, _: &Neighbor) -> KeepAlive {
        KeepAlive::Age
    }
}

/// Recover the extended address from a link-local address.
///
/// Identifiers of the form `0000:00ff:fe00:xxxx` are derived from short addresses and do not
/// contain one.
pub fn mac_from_ll64(address: Ipv6Address) -> Option<[u8; 8]> {
    if !address.is_link_local() {
        return None;
    }

    let mut iid = address.interface_id();
    if iid[..6] == [0x00, 0x00, 0x00, 0xff, 0xfe, 0x00] {
        return None;
    }
    // Invert the universal/local bit of the modified EUI-64.
    iid[0] ^= 0x02;
    Some(iid)
}
