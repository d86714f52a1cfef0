//! # Vigil
//!
//! **Vigil** is the I/O readiness core of a Reactor-pattern event loop,
//! built as the demultiplexing layer for the **Nebula** ecosystem.
//!
//! It answers one question per loop iteration — which registered file
//! descriptors are ready, and for what, right now — and dispatches the
//! answer to per-descriptor callbacks. Three pieces cooperate:
//!
//! - [`Channel`] — binds one file descriptor to the events its owner
//!   cares about and the callbacks to run when they fire
//! - [`Poller`] — the backend-independent "wait for readiness and
//!   report it" contract
//! - [`EpollPoller`] — the concrete Linux implementation, driving one
//!   epoll instance per loop
//!
//! The event loop itself lives a layer above: it implements
//! [`EventLoop`] to route channel registration changes into its poller,
//! and per iteration calls [`Poller::poll`] followed by
//! [`Channel::handle_event`] on every ready channel.
//!
//! ## Sketch
//!
//! ```rust,ignore
//! let lp: Rc<MyLoop> = MyLoop::new(); // owns an EpollPoller
//!
//! let owner: Weak<dyn EventLoop> = Rc::downgrade(&lp);
//! let channel = Channel::new(owner, socket_fd);
//! channel.set_read_callback(|at| println!("readable at {at:?}"));
//! channel.enable_reading();
//!
//! let mut active = Vec::new();
//! loop {
//!     let at = lp.poller_mut().poll(Some(Duration::from_millis(100)), &mut active);
//!     for channel in &active {
//!         channel.handle_event(at);
//!     }
//! }
//! ```
//!
//! ## Threading model
//!
//! One loop, one poller, one epoll instance per OS thread. Channels are
//! `Rc`-shared and internally `Cell`-mutable, which makes the whole core
//! `!Send` — the one-loop-per-thread contract is a property of the
//! types, not a runtime check. Cross-thread registration requests must
//! be marshalled onto the owning thread by the loop layer before they
//! reach this crate.

mod channel;
mod event;
mod event_loop;
mod poller;

pub mod current_thread;

pub use channel::{Channel, Registration};
pub use event::{Interest, Ready};
pub use event_loop::EventLoop;
pub use poller::{EpollPoller, Poller, new_default_poller};
