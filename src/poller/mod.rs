//! Readiness-notification demultiplexers.
//!
//! A [`Poller`] answers one question per loop iteration: which
//! registered descriptors are ready, and for what, right now. The
//! contract is backend-independent; [`EpollPoller`] is the concrete
//! Linux implementation.
//!
//! Registration changes never originate here. The owning loop forwards
//! [`Channel`] updates into the poller, and the poller reconciles its
//! descriptor table and the kernel state with the channel's interest.

mod epoll;

pub use epoll::EpollPoller;

use crate::channel::Channel;
use crate::event_loop::EventLoop;

use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

/// The multiplexer contract: wait for readiness and report it.
///
/// One poller belongs to exactly one loop and is only driven from that
/// loop's thread. All registration mutations happen strictly between
/// wait calls.
pub trait Poller {
    /// Blocks for up to `timeout` (`None` waits indefinitely) until at
    /// least one registered descriptor becomes ready.
    ///
    /// `active` is cleared, then filled with every ready channel in
    /// kernel-reported order, each stamped with its specific readiness.
    /// Returns the timestamp at which the wait returned. Waking with
    /// nothing ready is a normal timeout, not an error.
    fn poll(&mut self, timeout: Option<Duration>, active: &mut Vec<Rc<Channel>>) -> Instant;

    /// Reconciles the descriptor table and kernel state with the
    /// channel's current interest set and registration state.
    fn update_channel(&mut self, channel: &Rc<Channel>);

    /// Drops the channel from the descriptor table, unregistering it
    /// from the kernel if still registered.
    fn remove_channel(&mut self, channel: &Rc<Channel>);

    /// Returns `true` iff the descriptor table currently maps this
    /// channel's descriptor to this exact channel.
    fn has_channel(&self, channel: &Channel) -> bool;
}

/// Creates the default poller for a loop.
///
/// Setting `VIGIL_USE_POLL` in the environment selects the poll(2)
/// backend, which is not implemented; otherwise the epoll backend is
/// returned.
pub fn new_default_poller(owner: Weak<dyn EventLoop>) -> Box<dyn Poller> {
    if std::env::var_os("VIGIL_USE_POLL").is_some() {
        unimplemented!("the poll(2) backend is not implemented, unset VIGIL_USE_POLL");
    }

    Box::new(EpollPoller::new(owner))
}
