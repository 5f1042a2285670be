use std::os::unix::io::{RawFd, AsRawFd, FromRawFd, IntoRawFd};
use std::time::Duration;
use std::mem;
use std::io::{self, Read};
use std::convert::TryInto;

use super::fd::FileDesc;

pub const TFD_CLOEXEC: i32 = libc::TFD_CLOEXEC;
pub const TFD_NONBLOCK: i32 = libc::TFD_NONBLOCK;

/// A one-shot, monotonic-clock timer descriptor. Used by the node runtime for
/// the idle-decay timer: `settime` with `interval = 0` fires exactly once.
#[derive(Debug)]
pub struct TimerFd {
    inner: FileDesc,
}

impl TimerFd {
    /// Create a timerfd on `CLOCK_MONOTONIC` with `TFD_CLOEXEC | TFD_NONBLOCK`.
    pub fn new() -> io::Result<TimerFd> {
        let flags = TFD_CLOEXEC | TFD_NONBLOCK;
        let timerfd = crate::syscall!(timerfd_create(libc::CLOCK_MONOTONIC, flags))?;
        Ok(TimerFd {
            inner: unsafe { FileDesc::new(timerfd) },
        })
    }

    /// Arm the timer to fire once after `delay`. A zero `delay` disarms it.
    pub fn arm_oneshot(&self, delay: Duration) -> io::Result<()> {
        let new_value = libc::itimerspec {
            it_interval: libc::timespec { tv_sec: 0, tv_nsec: 0 },
            it_value: duration_to_timespec(delay),
        };
        let mut old_value: libc::itimerspec = unsafe { mem::zeroed() };

        crate::syscall!(timerfd_settime(
            self.inner.as_raw_fd(),
            0,
            &new_value,
            &mut old_value
        ))?;

        Ok(())
    }

    /// Disarm the timer, cancelling any pending expiry.
    pub fn disarm(&self) -> io::Result<()> {
        self.arm_oneshot(Duration::ZERO)
    }

    /// Number of expirations since the descriptor was last read. 0 means "not
    /// yet due"; on Linux a nonblocking read on an unarmed/undue timer returns
    /// `WouldBlock`, which this maps to `Ok(0)`.
    pub fn read(&self) -> io::Result<u64> {
        let mut buf = [0u8; 8];
        match (&self.inner).read_exact(&mut buf) {
            Ok(()) => Ok(u64::from_ne_bytes(buf)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }
}

fn duration_to_timespec(duration: Duration) -> libc::timespec {
    libc::timespec {
        tv_sec: duration.as_secs().try_into().unwrap_or(i64::MAX),
        tv_nsec: duration.subsec_nanos().try_into().unwrap_or(0),
    }
}

impl FromRawFd for TimerFd {
    unsafe fn from_raw_fd(fd: RawFd) -> Self {
        TimerFd {
            inner: FileDesc::new(fd),
        }
    }
}

impl IntoRawFd for TimerFd {
    fn into_raw_fd(self) -> RawFd {
        self.inner.into_raw_fd()
    }
}

impl AsRawFd for TimerFd {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

#[cfg(test)]
mod test {
    use super::TimerFd;
    use std::time::Duration;

    #[test]
    fn unarmed_read_is_would_block_mapped_to_zero() {
        let timer = TimerFd::new().unwrap();
        assert_eq!(timer.read().unwrap(), 0);
    }

    #[test]
    fn disarm_after_arm_prevents_expiry_read() {
        let timer = TimerFd::new().unwrap();
        timer.arm_oneshot(Duration::from_secs(5)).unwrap();
        timer.disarm().unwrap();
        assert_eq!(timer.read().unwrap(), 0);
    }
}
