// The shared counter an OrderedMutex uses to give the primary the power to
// assign timestamps and the validator the duty to wait for them (spec
// §4.3). There is exactly one Sequencer per OrderedMutex, and exactly one
// OrderedMutex per replica in the common case (it is the single structural-
// mutation total-order gate for that replica's whole tree); all of a
// replica's worker threads share it.
//
// The source expresses "wait until value changes" with C++20's
// `atomic_uint64_t::wait`/`notify_all`, a real futex underneath. Rust's
// stable std doesn't have that, so we get the same "block until the value
// I'm waiting for shows up, then wake everyone" contract from a
// `parking_lot::Mutex<u64>` paired with a `Condvar` — the idiom used
// throughout the wider pack wherever Rust code needs a blocking wait on a
// shared counter instead of C++'s atomic wait.

use parking_lot::{Condvar, Mutex};

pub struct Sequencer {
    order: Mutex<u64>,
    changed: Condvar,
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sequencer {
    pub fn new() -> Self {
        Sequencer {
            order: Mutex::new(0),
            changed: Condvar::new(),
        }
    }

    pub fn load(&self) -> u64 {
        *self.order.lock()
    }

    /// Primary's `order++`: returns the pre-increment value (the timestamp
    /// assigned to whatever checkpoint is using it) and wakes every waiter,
    /// since the counter just changed.
    pub fn fetch_increment(&self) -> u64 {
        let mut guard = self.order.lock();
        let prev = *guard;
        *guard = prev + 1;
        drop(guard);
        self.changed.notify_all();
        prev
    }

    /// Blocks until the counter reaches exactly `target`. Returns the
    /// observed value if it is ever seen strictly greater than `target`
    /// without having passed through it — spec §7 class 4, a missed
    /// checkpoint in instrumentation — so the caller can report it as
    /// fatal instead of spinning forever on an unreachable condition.
    pub fn wait_for(&self, target: u64) -> Result<(), u64> {
        let mut guard = self.order.lock();
        loop {
            if *guard == target {
                return Ok(());
            }
            if *guard > target {
                return Err(*guard);
            }
            tracing::debug!(target, observed = *guard, "validator waiting on sequencer");
            self.changed.wait(&mut guard);
        }
    }
}
