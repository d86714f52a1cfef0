use crate::event::{Interest, Ready};
use crate::event_loop::EventLoop;

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::os::fd::RawFd;
use std::rc::{Rc, Weak};
use std::time::Instant;

/// A channel's relationship with its poller.
///
/// A parked (`Deleted`) channel has been unregistered from the kernel
/// but stays in the poller's table, so re-enabling it later is a modify
/// rather than a fresh add.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Never registered with a poller.
    New,
    /// Registered with the kernel and present in the poller's table.
    Added,
    /// Unregistered from the kernel, retained in the poller's table.
    Deleted,
}

/// An event source bound to one file descriptor.
///
/// A `Channel` associates a descriptor with the events its owner wants
/// notified about, plus the callbacks to run when the descriptor becomes
/// ready. It does not own the descriptor and never touches the kernel
/// itself: every registration change goes through the owning
/// [`EventLoop`], which forwards it to the poller.
///
/// Channels are single-threaded by contract. One channel belongs to one
/// loop's thread for its whole registered lifetime, which is why the
/// handle type is `Rc` and the mutable state sits behind `Cell`s.
///
/// Before dropping a channel, disable all interest and call
/// [`remove`](Channel::remove); the core does not unregister on drop.
pub struct Channel {
    /// The loop this channel belongs to.
    owner: Weak<dyn EventLoop>,

    /// The wrapped descriptor. Immutable for the channel's lifetime.
    fd: RawFd,

    /// Events the owner wants to be notified about.
    interest: Cell<Interest>,

    /// Events the poller most recently reported. Only meaningful during
    /// dispatch of the current readiness round.
    ready: Cell<Ready>,

    /// Where this channel stands in its poller's table.
    registration: Cell<Registration>,

    /// Optional weak link to the object the callbacks close over.
    tie: RefCell<Option<Weak<dyn Any>>>,

    /// Set while callbacks for the current round are running.
    dispatching: Cell<bool>,

    read_callback: RefCell<Option<Box<dyn FnMut(Instant)>>>,
    write_callback: RefCell<Option<Box<dyn FnMut()>>>,
    close_callback: RefCell<Option<Box<dyn FnMut()>>>,
    error_callback: RefCell<Option<Box<dyn FnMut()>>>,
}

impl Channel {
    /// Creates a channel for `fd` owned by `owner`.
    ///
    /// The descriptor must be open and stay valid for as long as the
    /// channel is registered. The loop must outlive the channel.
    ///
    /// # Panics
    ///
    /// Panics if `fd` is negative.
    pub fn new(owner: Weak<dyn EventLoop>, fd: RawFd) -> Rc<Channel> {
        assert!(fd >= 0, "channel requires a valid descriptor, got {fd}");

        Rc::new(Channel {
            owner,
            fd,
            interest: Cell::new(Interest::default()),
            ready: Cell::new(Ready::default()),
            registration: Cell::new(Registration::New),
            tie: RefCell::new(None),
            dispatching: Cell::new(false),
            read_callback: RefCell::new(None),
            write_callback: RefCell::new(None),
            close_callback: RefCell::new(None),
            error_callback: RefCell::new(None),
        })
    }

    /// Returns the wrapped descriptor.
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Returns the current interest set.
    pub fn interest(&self) -> Interest {
        self.interest.get()
    }

    /// Returns the readiness stamped by the poller for the current round.
    pub fn ready(&self) -> Ready {
        self.ready.get()
    }

    /// Returns the channel's registration state.
    pub fn registration(&self) -> Registration {
        self.registration.get()
    }

    /// Returns `true` if read readiness is of interest.
    pub fn is_reading(&self) -> bool {
        self.interest.get().read
    }

    /// Returns `true` if write readiness is of interest.
    pub fn is_writing(&self) -> bool {
        self.interest.get().write
    }

    /// Returns the loop this channel belongs to.
    pub fn owner_loop(&self) -> Weak<dyn EventLoop> {
        self.owner.clone()
    }

    pub(crate) fn set_registration(&self, registration: Registration) {
        self.registration.set(registration);
    }

    pub(crate) fn set_ready(&self, ready: Ready) {
        self.ready.set(ready);
    }

    /// Installs or replaces the read callback.
    ///
    /// The callback receives the timestamp at which the poller's wait
    /// returned for the round that reported the readiness.
    pub fn set_read_callback(&self, callback: impl FnMut(Instant) + 'static) {
        *self.read_callback.borrow_mut() = Some(Box::new(callback));
    }

    /// Installs or replaces the write callback.
    pub fn set_write_callback(&self, callback: impl FnMut() + 'static) {
        *self.write_callback.borrow_mut() = Some(Box::new(callback));
    }

    /// Installs or replaces the close callback.
    pub fn set_close_callback(&self, callback: impl FnMut() + 'static) {
        *self.close_callback.borrow_mut() = Some(Box::new(callback));
    }

    /// Installs or replaces the error callback.
    pub fn set_error_callback(&self, callback: impl FnMut() + 'static) {
        *self.error_callback.borrow_mut() = Some(Box::new(callback));
    }

    /// Links the channel to the object its callbacks close over.
    ///
    /// Once tied, dispatch first promotes the weak link; if the referent
    /// has been destroyed, the round's callbacks are skipped silently.
    /// This protects against a readiness record produced before an
    /// earlier callback in the same round destroyed the owner.
    ///
    /// # Panics
    ///
    /// Panics if called while this channel's callbacks are running.
    pub fn tie<T: Any>(&self, owner: &Rc<T>) {
        assert!(
            !self.dispatching.get(),
            "tie may not be called during dispatch"
        );

        let owner: Rc<dyn Any> = owner.clone();
        let guard: Weak<dyn Any> = Rc::downgrade(&owner);
        *self.tie.borrow_mut() = Some(guard);
    }

    /// Adds read readiness to the interest set and propagates it.
    pub fn enable_reading(self: &Rc<Self>) {
        let mut interest = self.interest.get();
        interest.read = true;
        self.interest.set(interest);
        self.update();
    }

    /// Drops read readiness from the interest set and propagates it.
    pub fn disable_reading(self: &Rc<Self>) {
        let mut interest = self.interest.get();
        interest.read = false;
        self.interest.set(interest);
        self.update();
    }

    /// Adds write readiness to the interest set and propagates it.
    pub fn enable_writing(self: &Rc<Self>) {
        let mut interest = self.interest.get();
        interest.write = true;
        self.interest.set(interest);
        self.update();
    }

    /// Drops write readiness from the interest set and propagates it.
    pub fn disable_writing(self: &Rc<Self>) {
        let mut interest = self.interest.get();
        interest.write = false;
        self.interest.set(interest);
        self.update();
    }

    /// Clears the interest set and propagates it, parking the
    /// registration.
    pub fn disable_all(self: &Rc<Self>) {
        self.interest.set(Interest::default());
        self.update();
    }

    /// Detaches this channel from its poller.
    ///
    /// # Panics
    ///
    /// Panics if interest has not been fully disabled, or if the owning
    /// loop is gone.
    pub fn remove(self: &Rc<Self>) {
        assert!(
            self.interest.get().is_none(),
            "disable all interest before removing a channel"
        );

        let owner = self.owner.upgrade().expect("no owning event loop");
        owner.remove_channel(self);
    }

    fn update(self: &Rc<Self>) {
        let owner = self.owner.upgrade().expect("no owning event loop");
        owner.update_channel(self);
    }

    /// Dispatches the callbacks for the readiness the poller reported.
    ///
    /// Invoked once per round for each channel found ready.
    /// `received_at` is the timestamp at which the poller's wait
    /// returned; it is forwarded to the read callback.
    pub fn handle_event(&self, received_at: Instant) {
        let tied = self.tie.borrow().clone();

        match tied {
            Some(tie) => {
                if let Some(_guard) = tie.upgrade() {
                    self.dispatch(received_at);
                } else {
                    tracing::debug!(fd = self.fd, "tied owner is gone, skipping dispatch");
                }
            }
            None => self.dispatch(received_at),
        }
    }

    /// Runs the callbacks matching the reported readiness.
    ///
    /// Fixed priority order: close on hang-up without readable data,
    /// then error, then read, then write. The checks are independent, so
    /// one round can run several callbacks.
    fn dispatch(&self, received_at: Instant) {
        let ready = self.ready.get();
        tracing::trace!(fd = self.fd, ?ready, "dispatching readiness");

        self.dispatching.set(true);

        if ready.is_hangup() && !ready.is_readable() {
            if let Some(callback) = self.close_callback.borrow_mut().as_mut() {
                callback();
            }
        }
        if ready.is_error() {
            if let Some(callback) = self.error_callback.borrow_mut().as_mut() {
                callback();
            }
        }
        if ready.is_readable() {
            if let Some(callback) = self.read_callback.borrow_mut().as_mut() {
                callback(received_at);
            }
        }
        if ready.is_writable() {
            if let Some(callback) = self.write_callback.borrow_mut().as_mut() {
                callback();
            }
        }

        self.dispatching.set(false);
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        if self.registration.get() == Registration::Added {
            tracing::error!(
                fd = self.fd,
                "channel dropped while still registered with its poller"
            );
        }
    }
}
