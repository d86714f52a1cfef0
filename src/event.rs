use libc::{EPOLLERR, EPOLLHUP, EPOLLIN, EPOLLOUT, EPOLLPRI};

/// The set of readiness events a channel wants to be notified about.
///
/// An empty interest set means the descriptor is parked: it stays known
/// to the poller but the kernel no longer watches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interest {
    pub(crate) read: bool,
    pub(crate) write: bool,
}

impl Interest {
    /// Returns `true` if no event is of interest.
    pub fn is_none(&self) -> bool {
        !self.read && !self.write
    }

    /// Encodes the interest set as epoll event flags.
    ///
    /// Read interest covers both normal and priority data.
    pub(crate) fn epoll_bits(&self) -> u32 {
        let mut flags = 0;

        if self.read {
            flags |= EPOLLIN | EPOLLPRI;
        }
        if self.write {
            flags |= EPOLLOUT;
        }

        flags as u32
    }
}

/// Readiness reported by the poller for one descriptor.
///
/// A `Ready` value is produced from the raw kernel record and stamped
/// onto the channel for the duration of one dispatch round. Hang-up and
/// error conditions are kept separate from plain readability because
/// dispatch gives them a different priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ready {
    pub(crate) readable: bool,
    pub(crate) writable: bool,
    pub(crate) error: bool,
    pub(crate) hangup: bool,
}

impl Ready {
    /// Decodes a raw epoll event mask.
    pub(crate) fn from_epoll(bits: u32) -> Self {
        Ready {
            readable: bits & ((EPOLLIN | EPOLLPRI) as u32) != 0,
            writable: bits & (EPOLLOUT as u32) != 0,
            error: bits & (EPOLLERR as u32) != 0,
            hangup: bits & (EPOLLHUP as u32) != 0,
        }
    }

    /// Normal or priority data can be read.
    pub fn is_readable(&self) -> bool {
        self.readable
    }

    /// The descriptor can be written without blocking.
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// An error condition is pending on the descriptor.
    pub fn is_error(&self) -> bool {
        self.error
    }

    /// The peer hung up.
    pub fn is_hangup(&self) -> bool {
        self.hangup
    }
}
