use crate::channel::Channel;

use std::rc::Rc;

/// The owning event loop's side of the channel/poller contract.
///
/// A channel never talks to a poller directly. Every registration change
/// is routed through the loop that owns both, and a conforming loop
/// forwards both calls verbatim to its poller:
///
/// ```rust,ignore
/// impl EventLoop for MyLoop {
///     fn update_channel(&self, channel: &Rc<Channel>) {
///         self.poller.borrow_mut().update_channel(channel);
///     }
///
///     fn remove_channel(&self, channel: &Rc<Channel>) {
///         self.poller.borrow_mut().remove_channel(channel);
///     }
/// }
/// ```
///
/// The loop must outlive every channel it owns; channels hold a weak
/// reference and treat a vanished loop as a fatal caller error.
pub trait EventLoop {
    /// Reconciles the poller's table and kernel state with the channel's
    /// current interest set.
    fn update_channel(&self, channel: &Rc<Channel>);

    /// Detaches the channel from the poller. The channel must have
    /// disabled all interest first.
    fn remove_channel(&self, channel: &Rc<Channel>);
}
