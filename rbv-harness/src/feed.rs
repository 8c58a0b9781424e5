// The live transport between one lane's primary thread and its validator
// thread: a FIFO of `HashEntry`s plus a condvar, implementing
// `rbv_chain::LiveDigestFeed`. The primary pushes an entry every time its
// `HashChain::checkorder` produces one; the validator's `checkorder` blocks
// on `next` until one shows up. This is what makes the two threads run
// genuinely concurrently instead of the validator needing the whole run's
// digest upfront the way the text wire format does.

use parking_lot::{Condvar, Mutex};
use rbv_chain::{HashEntry, LiveDigestFeed};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct LaneFeed {
    queue: Mutex<VecDeque<HashEntry>>,
    changed: Condvar,
    closed: AtomicBool,
}

impl Default for LaneFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl LaneFeed {
    pub fn new() -> Self {
        LaneFeed {
            queue: Mutex::new(VecDeque::new()),
            changed: Condvar::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn push(&self, entry: HashEntry) {
        let mut q = self.queue.lock();
        q.push_back(entry);
        drop(q);
        self.changed.notify_all();
    }

    /// Signal that the primary side is finished producing. After this,
    /// `next` drains whatever is left in the queue and then returns `None`
    /// instead of blocking forever.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.changed.notify_all();
    }
}

impl LiveDigestFeed for LaneFeed {
    fn next(&self, _cursor: usize) -> Option<HashEntry> {
        let mut q = self.queue.lock();
        loop {
            if let Some(e) = q.pop_front() {
                return Some(e);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.changed.wait(&mut q);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use test_log::test;

    #[test]
    fn next_blocks_until_pushed() {
        let feed = Arc::new(LaneFeed::new());
        let reader = {
            let feed = Arc::clone(&feed);
            thread::spawn(move || feed.next(0))
        };
        thread::sleep(Duration::from_millis(10));
        feed.push(HashEntry {
            digest: 7,
            timestamp: 0,
        });
        assert_eq!(
            reader.join().unwrap(),
            Some(HashEntry {
                digest: 7,
                timestamp: 0
            })
        );
    }

    #[test]
    fn next_returns_none_after_close_once_drained() {
        let feed = LaneFeed::new();
        feed.push(HashEntry {
            digest: 1,
            timestamp: 0,
        });
        feed.close();
        assert!(feed.next(0).is_some());
        assert!(feed.next(0).is_none());
    }
}
