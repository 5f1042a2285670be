use std::ops::{BitOr, BitOrAssign};

/// Readiness interest/result for one descriptor in a [`super::PollItem`],
/// narrowed to the two operations `poll(2)` actually needs here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interest(u16);

const READABLE: u16 = 0b001;
const WRITABLE: u16 = 0b010;
const ERROR: u16 = 0b100;

impl Interest {
    pub const fn empty() -> Interest {
        Interest(0)
    }

    pub const fn readable() -> Interest {
        Interest(READABLE)
    }

    pub const fn writable() -> Interest {
        Interest(WRITABLE)
    }

    pub fn is_readable(self) -> bool {
        self.0 & READABLE != 0
    }

    pub fn is_writable(self) -> bool {
        self.0 & WRITABLE != 0
    }

    pub fn is_error(self) -> bool {
        self.0 & ERROR != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub(crate) fn to_poll_events(self) -> libc::c_short {
        let mut events = 0;
        if self.is_readable() {
            events |= libc::POLLIN;
        }
        if self.is_writable() {
            events |= libc::POLLOUT;
        }
        events as libc::c_short
    }

    pub(crate) fn from_poll_revents(revents: libc::c_short) -> Interest {
        let revents = revents as i32;
        let mut ready = Interest::empty();
        if revents & libc::POLLIN != 0 {
            ready |= Interest::readable();
        }
        if revents & libc::POLLOUT != 0 {
            ready |= Interest::writable();
        }
        if revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
            ready.0 |= ERROR;
        }
        ready
    }
}

impl BitOr for Interest {
    type Output = Interest;

    fn bitor(self, rhs: Interest) -> Interest {
        Interest(self.0 | rhs.0)
    }
}

impl BitOrAssign for Interest {
    fn bitor_assign(&mut self, rhs: Interest) {
        self.0 |= rhs.0;
    }
}
