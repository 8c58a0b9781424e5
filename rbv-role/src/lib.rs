// Every thread taking part in a workload run is either a primary (it does
// real work against a real tree) or a validator (it replays the same
// logical operations purely to check a digest). The role is fixed once a
// thread starts and never changes for the life of the thread, so rather
// than threading an enum through every call (or reaching for a trait object
// the way the source's `hasher_primary_t`/`hasher_replica_t` split does) we
// keep one thread-local cell and a pair of free functions to read it. Every
// other crate in this workspace is built against this narrow interface
// (`is_validator`, `role`) instead of the cell directly.

use std::cell::Cell;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ReplicaRole {
    Primary,
    Validator,
}

impl ReplicaRole {
    pub fn is_validator(self) -> bool {
        matches!(self, ReplicaRole::Validator)
    }
    pub fn is_primary(self) -> bool {
        matches!(self, ReplicaRole::Primary)
    }
}

thread_local! {
    static ROLE: Cell<Option<ReplicaRole>> = const { Cell::new(None) };
}

/// Called once, at thread entry, before any other function in this
/// workspace runs on the thread. Panics if called twice on the same thread:
/// role is fixed for a thread's lifetime, never reassigned mid-flight.
pub fn set_role(role: ReplicaRole) {
    ROLE.with(|cell| {
        let prev = cell.replace(Some(role));
        assert!(
            prev.is_none(),
            "replica role already set to {prev:?} on this thread, cannot set to {role:?}"
        );
    });
}

/// The current thread's role. Panics if `set_role` was never called: every
/// entry point into this workspace's core requires a role to be known, and
/// a missing one is a harness bug, not a recoverable condition.
pub fn role() -> ReplicaRole {
    ROLE.with(|cell| cell.get())
        .expect("replica role not set on this thread; call rbv_role::set_role at thread entry")
}

pub fn is_validator() -> bool {
    role().is_validator()
}

pub fn is_primary() -> bool {
    role().is_primary()
}

/// Test-only helper: run `f` with the role set, then clear it so repeated
/// `#[test]` functions executed on a reused thread (as some test harnesses
/// do) don't trip the "already set" assertion in `set_role`.
#[cfg(any(test, feature = "test-util"))]
pub fn with_role<R>(role: ReplicaRole, f: impl FnOnce() -> R) -> R {
    ROLE.with(|cell| cell.set(None));
    set_role(role);
    let result = f();
    ROLE.with(|cell| cell.set(None));
    result
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn role_round_trips() {
        with_role(ReplicaRole::Primary, || {
            assert!(is_primary());
            assert!(!is_validator());
        });
        with_role(ReplicaRole::Validator, || {
            assert!(is_validator());
            assert!(!is_primary());
        });
    }

    #[test]
    #[should_panic(expected = "already set")]
    fn double_set_panics() {
        ROLE.with(|cell| cell.set(None));
        set_role(ReplicaRole::Primary);
        set_role(ReplicaRole::Validator);
    }

    #[test]
    #[should_panic(expected = "not set")]
    fn unset_role_panics() {
        ROLE.with(|cell| cell.set(None));
        let _ = role();
    }
}
