//! Neighbor tables of Mesh Link Establishment.
//!
//! Every mesh interface keeps a table of the neighbors it established links with. The table has a
//! fixed number of slots, reserved when the interface registers it with the [`Engine`]. A slot
//! number doubles as the *attribute index* of the neighbor in it, a handle that stays valid for
//! as long as the neighbor is in the table.
//!
//! [`Engine`]: struct.Engine.html
//!
//! ## Aging
//!
//! Each neighbor counts down its time to live on every tick of the shared timer. A neighbor that
//! reaches zero is removed. How a neighbor is kept alive depends on the [`TableMode`]:
//!
//! * An end device sends a keep-alive to its priority neighbor, its parent, when the parent is
//!   exactly `Neighbor::CHALLENGE_TIMER` ticks from expiry.
//! * A router challenges up to two routers per tick once half of their timeout passed.
//! * A sleepy end device does neither.
//!
//! [`TableMode`]: enum.TableMode.html
//!
//! Hearing from a neighbor restarts its countdown, see `Engine::refresh_entry_timeout`.
//!
//! ## Collaborators
//!
//! The protocol that owns a table supplies [`Hooks`] to learn about removals and to send
//! keep-alives and challenges. The rest of the stack is reached through [`Services`]: the
//! indirect transmission queues are flushed for removed neighbors, the link quality estimator
//! forgets them and the timer is started and stopped there.
//!
//! [`Hooks`]: trait.Hooks.html
//! [`Services`]: trait.Services.html
mod class;
mod engine;
mod neighbor;


pub use class::{
    Hooks,
    KeepAlive,
    Services,
    TableMode,
    TopologyEvent};

pub use engine::{
    mac_from_ll64,
    Engine};

pub use neighbor::{
    DeviceMode,
    Neighbor};
