//! Thin, direct libc bindings for the handful of Linux primitives the node
//! runtime's poll set is built on: `eventfd(2)` for the wake fd, `timerfd(2)`
//! for the idle decay timer, and `poll(2)` for the wait primitive itself.

/// Run a libc call, turning a `-1` return into the last OS error.
#[macro_export]
macro_rules! syscall {
    ($fn: ident ( $($arg: expr),* $(,)* ) ) => {{
        let res = unsafe { libc::$fn($($arg, )*) };
        if res == -1 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(res)
        }
    }};
}

pub mod eventfd;
pub mod fd;
pub mod timerfd;

pub use eventfd::EventFd;
pub use timerfd::TimerFd;
