use std::os::unix::io::RawFd;

use super::interest::Interest;

pub type PollItemId = u32;

/// A single descriptor registered against a [`super::PollSet`] item: the raw
/// fd plus the events the Worker should wait for on it.
#[derive(Debug, Clone, Copy)]
pub struct FdInterest {
    pub fd: RawFd,
    pub interest: Interest,
}

impl FdInterest {
    pub fn readable(fd: RawFd) -> FdInterest {
        FdInterest {
            fd,
            interest: Interest::readable(),
        }
    }
}

/// Readiness reported back to an item's `after` hook for one of its fds.
#[derive(Debug, Clone, Copy)]
pub struct ReadyFd {
    pub fd: RawFd,
    pub revents: Interest,
}

/// One entry in the [`super::PollSet`]: zero or more descriptors plus the
/// hooks the Worker runs around them. `idle`/`before`/`after` close over
/// whatever state they need, rather than taking a separate `user_data`
/// pointer.
pub struct PollItem {
    pub(super) id: PollItemId,
    pub(super) enabled: bool,
    pub(super) fds: Vec<FdInterest>,
    pub(super) idle: Option<Box<dyn FnMut() + Send>>,
    pub(super) before: Option<Box<dyn FnMut() + Send>>,
    pub(super) after: Option<Box<dyn FnMut(&[ReadyFd]) + Send>>,
}

impl PollItem {
    pub fn new(id: PollItemId) -> PollItem {
        PollItem {
            id,
            enabled: true,
            fds: Vec::new(),
            idle: None,
            before: None,
            after: None,
        }
    }

    pub fn id(&self) -> PollItemId {
        self.id
    }

    pub fn enabled(mut self, enabled: bool) -> PollItem {
        self.enabled = enabled;
        self
    }

    pub fn with_fd(mut self, fd: FdInterest) -> PollItem {
        self.fds.push(fd);
        self
    }

    pub fn with_fds(mut self, fds: impl IntoIterator<Item = FdInterest>) -> PollItem {
        self.fds.extend(fds);
        self
    }

    pub fn with_idle(mut self, idle: impl FnMut() + Send + 'static) -> PollItem {
        self.idle = Some(Box::new(idle));
        self
    }

    pub fn with_before(mut self, before: impl FnMut() + Send + 'static) -> PollItem {
        self.before = Some(Box::new(before));
        self
    }

    pub fn with_after(mut self, after: impl FnMut(&[ReadyFd]) + Send + 'static) -> PollItem {
        self.after = Some(Box::new(after));
        self
    }
}

impl std::fmt::Debug for PollItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollItem")
            .field("id", &self.id)
            .field("enabled", &self.enabled)
            .field("fds", &self.fds)
            .finish()
    }
}
