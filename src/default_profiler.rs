//! The default profiler used by the pass timing infrastructure.

use core::fmt;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::mem;
use std::time::{Duration, Instant};

use crate::timing::{NUM_PASSES, Pass, Profiler};

/// Times the currently running pass from creation until drop.
struct DefaultTimingToken {
    start: Instant,
    pass: Pass,
    // Restored as the current pass when this token is dropped.
    prev: Pass,
}

#[derive(Default, Copy, Clone)]
struct PassTime {
    /// Total time including children.
    total: Duration,
    /// Time spent in child passes.
    child: Duration,
    /// Number of times the pass was started.
    runs: u32,
}

/// Accumulated timing for all passes.
pub struct PassTimes {
    pass: [PassTime; NUM_PASSES],
}

impl PassTimes {
    /// Add `other` to the timings of this `PassTimes`.
    pub fn add(&mut self, other: &Self) {
        for (a, b) in self.pass.iter_mut().zip(&other.pass[..]) {
            a.total += b.total;
            a.child += b.child;
            a.runs += b.runs;
        }
    }

    /// Returns the total amount of time taken by all the passes measured.
    pub fn total(&self) -> Duration {
        self.pass.iter().map(|p| p.total - p.child).sum()
    }

    /// How many times `pass` was started.
    pub fn runs(&self, pass: Pass) -> u32 {
        self.pass.get(pass.idx()).map_or(0, |p| p.runs)
    }
}

impl Default for PassTimes {
    fn default() -> Self {
        Self {
            pass: [Default::default(); NUM_PASSES],
        }
    }
}

impl fmt::Display for PassTimes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fn fmtdur(dur: Duration, f: &mut fmt::Formatter) -> fmt::Result {
            let dur = dur + Duration::new(0, 500_000);
            write!(f, "{:4}.{:03} ", dur.as_secs(), dur.subsec_millis())
        }

        writeln!(f, "======== ======== =====  ==================================")?;
        writeln!(f, "   Total     Self  Runs  Pass")?;
        writeln!(f, "-------- -------- -----  ----------------------------------")?;
        for (idx, time) in self.pass.iter().enumerate() {
            if time.runs == 0 {
                continue;
            }
            fmtdur(time.total, f)?;
            fmtdur(time.total.saturating_sub(time.child), f)?;
            writeln!(f, "{:5}  {}", time.runs, Pass::from_idx(idx))?;
        }
        writeln!(f, "======== ======== =====  ==================================")
    }
}

thread_local! {
    static CURRENT_PASS: Cell<Pass> = const { Cell::new(Pass::None) };
    static PASS_TIME: RefCell<PassTimes> = RefCell::new(Default::default());
}

/// The default profiler. You can get the results using [`take_current`].
pub struct DefaultProfiler;

impl Profiler for DefaultProfiler {
    fn start_pass(&self, pass: Pass) -> Box<dyn Any> {
        let prev = CURRENT_PASS.with(|p| p.replace(pass));
        log::debug!("timing: Starting {pass}, (during {prev})");
        Box::new(DefaultTimingToken {
            start: Instant::now(),
            pass,
            prev,
        })
    }
}

impl Drop for DefaultTimingToken {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        log::debug!("timing: Ending {}", self.pass);
        let old_cur = CURRENT_PASS.with(|p| p.replace(self.prev));
        debug_assert_eq!(self.pass, old_cur, "Timing tokens dropped out of order");
        PASS_TIME.with(|rc| {
            let mut table = rc.borrow_mut();
            let entry = &mut table.pass[self.pass.idx()];
            entry.total += duration;
            entry.runs += 1;
            if let Some(parent) = table.pass.get_mut(self.prev.idx()) {
                parent.child += duration;
            }
        })
    }
}

/// Take the accumulated pass timings of the current thread and reset them.
///
/// Only applies when [`DefaultProfiler`] is used.
pub fn take_current() -> PassTimes {
    PASS_TIME.with(|rc| mem::take(&mut *rc.borrow_mut()))
}
