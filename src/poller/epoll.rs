//! Linux `epoll`-based poller implementation.
//!
//! Responsibilities:
//! - Track registered channels in a descriptor table
//! - Drive the kernel registration calls (add, modify, delete)
//! - Block waiting for I/O readiness and stamp it onto ready channels
//!
//! The kernel record carries the raw descriptor as its back-reference.
//! On the way out every record is validated against the descriptor
//! table; a record for an unregistered descriptor is stale and dropped.

use crate::channel::{Channel, Registration};
use crate::event::Ready;
use crate::event_loop::EventLoop;
use crate::poller::Poller;

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD, c_int, epoll_create1, epoll_ctl,
    epoll_event, epoll_wait,
};
use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

/// Starting size of the readiness-event buffer.
const INITIAL_EVENT_CAPACITY: usize = 16;

/// Linux `epoll` poller.
///
/// Owns:
/// - the epoll instance, closed on drop,
/// - the descriptor table mapping each registered fd to its channel,
/// - a reusable readiness-event buffer that grows and never shrinks.
pub struct EpollPoller {
    /// The loop this poller belongs to. Kept for loop-side assertions;
    /// the registration and wait algorithms never exercise it.
    owner: Weak<dyn EventLoop>,

    /// Epoll file descriptor.
    epoll: RawFd,

    /// Registered channels, keyed by descriptor.
    channels: HashMap<RawFd, Rc<Channel>>,

    /// Reusable buffer for raw kernel readiness records.
    events: Vec<epoll_event>,
}

impl EpollPoller {
    /// Creates a new `EpollPoller` bound to its owning loop.
    ///
    /// # Panics
    ///
    /// Panics if the kernel refuses to create the epoll instance. A
    /// poller is useless without one, so this is unrecoverable.
    pub fn new(owner: Weak<dyn EventLoop>) -> Self {
        let epoll = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epoll < 0 {
            let err = io::Error::last_os_error();
            tracing::error!(%err, "epoll_create1 failed");
            panic!("epoll_create1 failed: {err}");
        }

        Self {
            owner,
            epoll,
            channels: HashMap::new(),
            events: Vec::with_capacity(INITIAL_EVENT_CAPACITY),
        }
    }

    /// Returns the loop this poller belongs to.
    pub fn owner_loop(&self) -> Weak<dyn EventLoop> {
        self.owner.clone()
    }

    /// Resolves raw kernel records into ready channels.
    ///
    /// Each record's descriptor is looked up in the table; the matching
    /// channel is stamped with the record's readiness and appended to
    /// `active` in kernel-reported order.
    fn fill_active_channels(&self, ready: usize, active: &mut Vec<Rc<Channel>>) {
        for record in &self.events[..ready] {
            let fd = record.u64 as RawFd;

            match self.channels.get(&fd) {
                Some(channel) => {
                    channel.set_ready(Ready::from_epoll(record.events));
                    active.push(channel.clone());
                }
                None => {
                    tracing::trace!(fd, "stale readiness record, ignoring");
                }
            }
        }
    }

    /// Issues one kernel registration call for the channel.
    ///
    /// # Panics
    ///
    /// Panics if an add or modify call fails: the table and the kernel
    /// state have diverged in a way this design cannot reconcile. A
    /// failed delete is logged and tolerated; the registration dies with
    /// the descriptor anyway.
    fn apply(&self, op: c_int, channel: &Channel) {
        let fd = channel.fd();
        let mut record = epoll_event {
            events: channel.interest().epoll_bits(),
            u64: fd as u64,
        };

        let rc = unsafe { epoll_ctl(self.epoll, op, fd, &mut record) };
        if rc < 0 {
            let err = io::Error::last_os_error();

            if op == EPOLL_CTL_DEL {
                tracing::error!(fd, %err, "epoll_ctl del failed");
            } else {
                tracing::error!(fd, %err, "epoll_ctl add/mod failed");
                panic!("epoll_ctl add/mod failed for fd {fd}: {err}");
            }
        }
    }
}

impl Poller for EpollPoller {
    fn poll(&mut self, timeout: Option<Duration>, active: &mut Vec<Rc<Channel>>) -> Instant {
        tracing::trace!(total = self.channels.len(), "entering wait");

        active.clear();

        let timeout_ms = timeout.map(|t| t.as_millis() as i32).unwrap_or(-1);

        unsafe {
            self.events.set_len(self.events.capacity());
        }

        let ready = unsafe {
            epoll_wait(
                self.epoll,
                self.events.as_mut_ptr(),
                self.events.capacity() as i32,
                timeout_ms,
            )
        };
        let wait_error = io::Error::last_os_error();
        let received_at = Instant::now();

        if ready > 0 {
            let ready = ready as usize;
            tracing::debug!(ready, "readiness events");

            unsafe {
                self.events.set_len(ready);
            }
            self.fill_active_channels(ready, active);

            // A full buffer suggests a busier next round.
            if ready == self.events.capacity() {
                self.events.reserve(self.events.capacity());
            }
        } else if ready == 0 {
            unsafe {
                self.events.set_len(0);
            }
            tracing::trace!("wait timed out with nothing ready");
        } else {
            unsafe {
                self.events.set_len(0);
            }
            if wait_error.kind() != io::ErrorKind::Interrupted {
                tracing::error!(err = %wait_error, "epoll_wait failed");
            }
        }

        received_at
    }

    fn update_channel(&mut self, channel: &Rc<Channel>) {
        let registration = channel.registration();
        tracing::debug!(
            fd = channel.fd(),
            interest = ?channel.interest(),
            ?registration,
            "update channel"
        );

        match registration {
            Registration::New | Registration::Deleted => {
                if registration == Registration::New {
                    self.channels.insert(channel.fd(), channel.clone());
                } else {
                    debug_assert!(self.channels.contains_key(&channel.fd()));
                }

                channel.set_registration(Registration::Added);
                self.apply(EPOLL_CTL_ADD, channel);
            }
            Registration::Added => {
                debug_assert!(self.has_channel(channel));

                if channel.interest().is_none() {
                    self.apply(EPOLL_CTL_DEL, channel);
                    channel.set_registration(Registration::Deleted);
                } else {
                    self.apply(EPOLL_CTL_MOD, channel);
                }
            }
        }
    }

    fn remove_channel(&mut self, channel: &Rc<Channel>) {
        let fd = channel.fd();
        assert!(
            channel.interest().is_none(),
            "disable all interest before removing a channel"
        );
        debug_assert!(channel.registration() != Registration::New);
        tracing::debug!(fd, "remove channel");

        self.channels.remove(&fd);

        if channel.registration() == Registration::Added {
            self.apply(EPOLL_CTL_DEL, channel);
        }
        channel.set_registration(Registration::New);
    }

    fn has_channel(&self, channel: &Channel) -> bool {
        self.channels
            .get(&channel.fd())
            .is_some_and(|entry| std::ptr::eq(Rc::as_ptr(entry), channel))
    }
}

impl Drop for EpollPoller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epoll);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopLoop;

    impl EventLoop for NoopLoop {
        fn update_channel(&self, _channel: &Rc<Channel>) {}
        fn remove_channel(&self, _channel: &Rc<Channel>) {}
    }

    fn poller() -> (Rc<NoopLoop>, EpollPoller) {
        let lp = Rc::new(NoopLoop);
        let lp_dyn: Rc<dyn EventLoop> = lp.clone();
        let owner: Weak<dyn EventLoop> = Rc::downgrade(&lp_dyn);
        (lp, EpollPoller::new(owner))
    }

    struct Pipe {
        read: RawFd,
        write: RawFd,
    }

    impl Pipe {
        fn new() -> Pipe {
            let mut fds = [0; 2];
            let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
            assert_eq!(rc, 0, "pipe failed");
            Pipe {
                read: fds[0],
                write: fds[1],
            }
        }

        fn fill(&self) {
            let n = unsafe { libc::write(self.write, b"x".as_ptr() as *const _, 1) };
            assert_eq!(n, 1, "write failed");
        }
    }

    impl Drop for Pipe {
        fn drop(&mut self) {
            unsafe {
                libc::close(self.read);
                libc::close(self.write);
            }
        }
    }

    #[test]
    fn event_buffer_doubles_when_a_round_comes_back_full() {
        let (lp, mut poller) = poller();
        let capacity = poller.events.capacity();

        let mut pipes = Vec::new();
        let mut channels = Vec::new();
        for _ in 0..capacity {
            let pipe = Pipe::new();
            pipe.fill();

            let lp_dyn: Rc<dyn EventLoop> = lp.clone();
            let owner: Weak<dyn EventLoop> = Rc::downgrade(&lp_dyn);
            let channel = Channel::new(owner, pipe.read);
            channel.enable_reading();
            poller.update_channel(&channel);

            pipes.push(pipe);
            channels.push(channel);
        }

        let mut active = Vec::new();
        poller.poll(Some(Duration::from_millis(500)), &mut active);

        assert_eq!(active.len(), capacity);
        assert!(poller.events.capacity() >= 2 * capacity);

        for channel in &channels {
            channel.disable_all();
            poller.update_channel(channel);
            poller.remove_channel(channel);
        }
    }

    #[test]
    fn stale_records_resolve_to_no_channel() {
        let (_lp, mut poller) = poller();

        poller.events.clear();
        poller.events.push(epoll_event {
            events: libc::EPOLLIN as u32,
            u64: 9999,
        });

        let mut active = Vec::new();
        poller.fill_active_channels(1, &mut active);

        assert!(active.is_empty());
    }

    #[test]
    fn buffer_growth_preserves_pending_capacity_across_rounds() {
        let (_lp, mut poller) = poller();
        let capacity = poller.events.capacity();

        let mut active = Vec::new();
        poller.poll(Some(Duration::ZERO), &mut active);

        assert!(active.is_empty());
        assert_eq!(poller.events.capacity(), capacity);
    }
}
