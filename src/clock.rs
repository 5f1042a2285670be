use std::sync::Arc;

use crate::element::{Clock, ClockFlags, Command};
use crate::state::NodeState;

/// All four fields (`rate`, `ticks`, `monotonic_time`, `scale`) are always
/// considered changed — the bridge never sends a partial update.
pub const CLOCK_UPDATE_ALL_FIELDS: u32 = 0b1111;

/// Compose a `CLOCK_UPDATE` command for `state`. With an attached clock
/// capability this samples it live and marks the update `Live`; without one
/// it sends a baseline of `rate=1`, `ticks=0`, `monotonic_time=0` with the
/// same change mask and no `Live` flag.
pub fn clock_update_command(clock: Option<&Arc<dyn Clock>>, state: NodeState) -> Command {
    match clock {
        Some(clock) => {
            let (rate, ticks, monotonic_time) = clock.get_time();
            Command::ClockUpdate {
                rate,
                ticks,
                monotonic_time,
                scale: 1.0,
                state,
                flags: ClockFlags::Live,
                change_mask: CLOCK_UPDATE_ALL_FIELDS,
            }
        }
        None => Command::ClockUpdate {
            rate: 1,
            ticks: 0,
            monotonic_time: 0,
            scale: 1.0,
            state,
            flags: ClockFlags::None,
            change_mask: CLOCK_UPDATE_ALL_FIELDS,
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::element::fake::FakeClock;

    #[test]
    fn without_clock_sends_zeroed_baseline_no_live_flag() {
        let command = clock_update_command(None, NodeState::Running);
        match command {
            Command::ClockUpdate { rate, ticks, monotonic_time, flags, .. } => {
                assert_eq!(rate, 1);
                assert_eq!(ticks, 0);
                assert_eq!(monotonic_time, 0);
                assert_eq!(flags, crate::element::ClockFlags::None);
            }
            _ => panic!("expected ClockUpdate"),
        }
    }

    #[test]
    fn with_clock_samples_live_values() {
        let clock: Arc<dyn Clock> = Arc::new(FakeClock {
            rate: 48000,
            ticks: 512,
            monotonic_time: 1_000_000,
        });
        let command = clock_update_command(Some(&clock), NodeState::Running);
        match command {
            Command::ClockUpdate { rate, ticks, monotonic_time, flags, .. } => {
                assert_eq!(rate, 48000);
                assert_eq!(ticks, 512);
                assert_eq!(monotonic_time, 1_000_000);
                assert_eq!(flags, crate::element::ClockFlags::Live);
            }
            _ => panic!("expected ClockUpdate"),
        }
    }
}
