//! The node's poll set: a dynamic collection of [`PollItem`]s plus an
//! always-present wake eventfd, waited on with a single raw `poll(2)` call
//! over a flat `pollfd` array rather than epoll.

mod interest;
mod item;

pub use interest::Interest;
pub use item::{FdInterest, PollItem, PollItemId, ReadyFd};

use std::io;
use std::os::unix::io::AsRawFd;

use crate::error::NodeError;
use crate::sys::EventFd;

/// Owns the wake eventfd and the contiguous `fds[]` array the Worker thread
/// waits on. Not `Send`-shared: lives behind the node's
/// [`parking_lot::Mutex`](parking_lot::Mutex), touched by the Worker only
/// around the rebuild step, never across `wait`.
pub struct PollSet {
    capacity: usize,
    wake: EventFd,
    items: Vec<PollItem>,
    rebuild_fds: bool,
    published: Vec<libc::pollfd>,
    offsets: Vec<Option<(usize, usize)>>,
}

impl PollSet {
    pub fn new(capacity: usize) -> Result<PollSet, NodeError> {
        let wake = EventFd::new().map_err(NodeError::EventFdCreate)?;
        let mut set = PollSet {
            capacity,
            wake,
            items: Vec::new(),
            rebuild_fds: false,
            published: Vec::new(),
            offsets: Vec::new(),
        };
        set.rebuild();
        Ok(set)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Append a new item. Sets `rebuild_fds` iff the item carries descriptors.
    pub fn add(&mut self, item: PollItem) -> Result<(), NodeError> {
        if self.items.len() >= self.capacity {
            return Err(NodeError::PollSetFull(self.capacity));
        }
        let has_fds = !item.fds.is_empty();
        self.items.push(item);
        self.offsets.push(None);
        if has_fds {
            self.rebuild_fds = true;
        }
        Ok(())
    }

    /// Replace the item sharing `item.id()`, or append it if no such item
    /// exists yet. Always sets `rebuild_fds` on a successful in-place update,
    /// since the replacement's fds may differ from what it replaced.
    pub fn update(&mut self, item: PollItem) -> Result<(), NodeError> {
        if let Some(pos) = self.items.iter().position(|existing| existing.id == item.id) {
            self.items[pos] = item;
            self.offsets[pos] = None;
            self.rebuild_fds = true;
            Ok(())
        } else {
            self.add(item)
        }
    }

    /// Remove the item with the given id. Returns whether an item was found.
    pub fn remove(&mut self, id: PollItemId) -> bool {
        match self.items.iter().position(|i| i.id == id) {
            Some(pos) => {
                let removed = self.items.remove(pos);
                self.offsets.remove(pos);
                if !removed.fds.is_empty() {
                    self.rebuild_fds = true;
                }
                true
            }
            None => false,
        }
    }

    /// Post one wakeup on the wake eventfd.
    pub fn wake(&self) -> io::Result<()> {
        self.wake.wakeup()
    }

    /// Step 2 of the Worker loop: rebuild the published descriptor array if
    /// flagged, clearing the flag.
    pub fn rebuild_if_needed(&mut self) {
        if self.rebuild_fds {
            self.rebuild();
        }
    }

    fn rebuild(&mut self) {
        self.published.clear();
        self.offsets.clear();
        self.published.push(libc::pollfd {
            fd: self.wake.as_raw_fd(),
            events: libc::POLLIN as libc::c_short,
            revents: 0,
        });
        for item in &self.items {
            if !item.enabled || item.fds.is_empty() {
                self.offsets.push(None);
                continue;
            }
            let start = self.published.len();
            for fdi in &item.fds {
                self.published.push(libc::pollfd {
                    fd: fdi.fd,
                    events: fdi.interest.to_poll_events(),
                    revents: 0,
                });
            }
            self.offsets.push(Some((start, item.fds.len())));
        }
        self.rebuild_fds = false;
    }

    /// Step 1: run every enabled item's idle hook. Returns whether any ran,
    /// telling the Worker loop to restart from the top without blocking.
    pub fn run_idle(&mut self) -> bool {
        let mut ran = false;
        for item in self.items.iter_mut().filter(|i| i.enabled) {
            if let Some(idle) = item.idle.as_mut() {
                idle();
                ran = true;
            }
        }
        ran
    }

    /// Step 3: run every enabled item's before hook.
    pub fn run_before(&mut self) {
        for item in self.items.iter_mut().filter(|i| i.enabled) {
            if let Some(before) = item.before.as_mut() {
                before();
            }
        }
    }

    /// Step 4: wait on the published array with an infinite timeout,
    /// restarting transparently on `EINTR`.
    pub fn wait(&mut self) -> io::Result<()> {
        wait_on(&mut self.published)
    }

    /// A clone of the currently published descriptor array, for callers
    /// (the Worker) that need to block in `poll(2)` without holding the
    /// node-wide lock this `PollSet` normally lives behind.
    pub fn snapshot_fds(&self) -> Vec<libc::pollfd> {
        self.published.clone()
    }

    /// Was the wake eventfd (always index 0) reported ready, given either
    /// `self.published` or an unlocked snapshot of it?
    pub fn wake_ready(&self) -> bool {
        wake_ready_in(&self.published)
    }

    pub fn drain_wake(&self) -> io::Result<()> {
        self.wake.drain()
    }

    /// Step 6: run every enabled item's after hook with its slice of the
    /// published readiness array.
    pub fn run_after(&mut self) {
        let published = self.published.clone();
        self.run_after_with(&published);
    }

    /// Same as [`PollSet::run_after`], but reading revents from an
    /// externally supplied array (the Worker's unlocked `wait` snapshot)
    /// rather than `self.published`. Valid only when no mutation has
    /// happened to `self` since that snapshot was taken — guaranteed by
    /// every mutator waking the Worker, which the caller checks via
    /// [`wake_ready_in`] before calling this.
    pub fn run_after_with(&mut self, fds: &[libc::pollfd]) {
        let items = &mut self.items;
        let offsets = &self.offsets;
        for (idx, item) in items.iter_mut().enumerate() {
            if !item.enabled {
                continue;
            }
            if let Some(after) = item.after.as_mut() {
                match offsets.get(idx).copied().flatten() {
                    Some((start, len)) => {
                        let ready: Vec<ReadyFd> = fds[start..start + len]
                            .iter()
                            .map(|pfd| ReadyFd {
                                fd: pfd.fd,
                                revents: Interest::from_poll_revents(pfd.revents),
                            })
                            .collect();
                        after(&ready);
                    }
                    None => after(&[]),
                }
            }
        }
    }
}

/// Wait on a raw `pollfd` array with an infinite timeout, restarting
/// transparently on `EINTR`. Free-standing so it can be called on an
/// unlocked snapshot (see [`PollSet::snapshot_fds`]).
pub fn wait_on(fds: &mut [libc::pollfd]) -> io::Result<()> {
    loop {
        let n = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        return Ok(());
    }
}

/// Was the wake eventfd (always index 0) reported ready in `fds`?
pub fn wake_ready_in(fds: &[libc::pollfd]) -> bool {
    fds.first().map(|pfd| pfd.revents != 0).unwrap_or(false)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn add_past_capacity_fails() {
        let mut set = PollSet::new(1).unwrap();
        set.add(PollItem::new(1)).unwrap();
        match set.add(PollItem::new(2)) {
            Err(NodeError::PollSetFull(1)) => {}
            other => panic!("expected PollSetFull, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn wake_then_wait_reports_wake_ready() {
        let mut set = PollSet::new(4).unwrap();
        set.wake().unwrap();
        set.wait().unwrap();
        assert!(set.wake_ready());
        set.drain_wake().unwrap();
    }

    #[test]
    fn idle_hook_runs_until_quiescent() {
        let mut set = PollSet::new(4).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        set.add(PollItem::new(1).with_idle(move || {
            calls2.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
        assert!(set.run_idle());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_unknown_id_returns_false() {
        let mut set = PollSet::new(4).unwrap();
        assert!(!set.remove(42));
    }

    #[test]
    fn rebuild_places_wake_fd_first_then_item_fds_in_insertion_order() {
        let mut set = PollSet::new(4).unwrap();
        let (r1, _w1) = pipe();
        let (r2, _w2) = pipe();
        set.add(PollItem::new(1).with_fd(FdInterest::readable(r1)))
            .unwrap();
        set.add(PollItem::new(2).with_fd(FdInterest::readable(r2)))
            .unwrap();
        set.rebuild_if_needed();
        assert_eq!(set.published.len(), 3);
        assert_eq!(set.published[1].fd, r1);
        assert_eq!(set.published[2].fd, r2);
    }

    fn pipe() -> (std::os::unix::io::RawFd, std::os::unix::io::RawFd) {
        let mut fds = [0i32; 2];
        unsafe {
            assert_eq!(libc::pipe(fds.as_mut_ptr()), 0);
        }
        (fds[0], fds[1])
    }
}
