// Every observable quantity a replay must agree on is folded into a
// thread-local running digest via `combine`. Two stages, both fixed by
// spec §4.2 and by the original control.hpp/benchmark.cpp: bytes go through
// FNV-1a to a u64, and that u64 is mixed into the running digest with the
// classic (non-commutative) hash-combine step.

use rbv_base::{err, DivergenceKind, DivergenceReport, Error, Result};
use rbv_role::ReplicaRole;
use std::borrow::Cow;
use std::sync::Arc;

use crate::Sequencer;

/// A live, in-process alternative to the text wire format (spec §6's
/// serialize/deserialize): a validator chain built with
/// [`HashChain::new_live_validator`] pulls its expected entries from one of
/// these instead of from a pre-parsed `Vec`. This is what lets a harness
/// run a lane's primary and validator threads genuinely concurrently,
/// feeding the digest as it's produced rather than buffering a whole run's
/// worth of it — the text format stays exactly as specified for the
/// offline/persisted case (and is still what every spec §8 single-threaded
/// scenario exercises).
pub trait LiveDigestFeed: Send + Sync {
    /// Block until the entry logically at `cursor` is available, or return
    /// `None` if the producer is done and nothing more will ever arrive.
    fn next(&self, cursor: usize) -> Option<HashEntry>;
}

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Anything that can be folded into a hash chain. Implemented for the three
/// shapes spec §4.2 names: a bare `u64`, and byte/string slices. The
/// integer case hashes its native memory representation, matching the
/// source's `fnv1a_hash_bytes(&x, sizeof(x))`.
pub trait Combine {
    fn combine_bytes(&self) -> Cow<'_, [u8]>;
}

impl Combine for u64 {
    fn combine_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Owned(self.to_ne_bytes().to_vec())
    }
}
impl Combine for [u8] {
    fn combine_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(self)
    }
}
impl Combine for str {
    fn combine_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(self.as_bytes())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HashEntry {
    pub digest: u64,
    pub timestamp: u64,
}

/// A per-thread, per-workload-run accumulator. One is created per thread at
/// workload start (spec's data model: "one per thread per workload run")
/// and `finalize`d at the end. Never shared between threads — the only
/// cross-thread synchronization surface in this whole protocol is the
/// `Sequencer` a `checkorder` is handed.
pub struct HashChain {
    role: ReplicaRole,
    entries: Vec<HashEntry>,
    latest: u64,
    reference: u64,
    cursor: usize,
    feed: Option<Arc<dyn LiveDigestFeed>>,
}

impl HashChain {
    pub fn new(role: ReplicaRole) -> Self {
        HashChain {
            role,
            entries: Vec::new(),
            latest: 0,
            reference: 0,
            cursor: 0,
            feed: None,
        }
    }

    /// A validator chain fed live by `feed` rather than by one upfront
    /// `deserialize`. `reference` (the digest `finalize` checks `latest`
    /// against) is normally not known until the producer finishes its own
    /// run; set it with [`HashChain::set_reference`] once it is, or leave
    /// it at the default `0` to skip that final check and rely solely on
    /// the per-checkpoint agreement `checkorder` already enforces.
    pub fn new_live_validator(feed: Arc<dyn LiveDigestFeed>) -> Self {
        HashChain {
            role: ReplicaRole::Validator,
            entries: Vec::new(),
            latest: 0,
            reference: 0,
            cursor: 0,
            feed: Some(feed),
        }
    }

    /// Set the expected final digest checked by `finalize`. See
    /// `new_live_validator`.
    pub fn set_reference(&mut self, reference: u64) {
        self.reference = reference;
    }

    pub fn role(&self) -> ReplicaRole {
        self.role
    }

    /// Current running digest, not yet checkpointed. Exposed mainly for
    /// tests; production callers should go through `checkorder`.
    pub fn latest(&self) -> u64 {
        self.latest
    }

    pub fn entries(&self) -> &[HashEntry] {
        &self.entries
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn combine_raw(&mut self, hashv: u64) {
        self.latest ^= hashv
            .wrapping_add(0x9e3779b9)
            .wrapping_add(self.latest << 6)
            .wrapping_add(self.latest >> 2);
    }

    /// Fold `x` into the running digest. Order-sensitive by construction:
    /// `combine(a); combine(b)` differs from `combine(b); combine(a)`
    /// whenever `a != b`, which is what lets the digest pin down the exact
    /// sequence of evidence, not just the set of it.
    pub fn combine<T: Combine + ?Sized>(&mut self, x: &T) {
        self.combine_raw(fnv1a(&x.combine_bytes()));
    }

    /// The checkpoint: on the primary this records `(latest, order++)` and
    /// resets `latest`; on the validator this blocks until `sequencer`
    /// reaches the next expected timestamp, asserts the recorded digest
    /// matches, then resets `latest` and advances both its own cursor and
    /// the shared sequencer.
    pub fn checkorder(&mut self, sequencer: &Sequencer) -> Result<()> {
        match self.role {
            ReplicaRole::Primary => {
                let timestamp = sequencer.fetch_increment();
                self.entries.push(HashEntry {
                    digest: self.latest,
                    timestamp,
                });
                self.latest = 0;
                Ok(())
            }
            ReplicaRole::Validator => {
                let expected = match &self.feed {
                    Some(feed) => feed.next(self.cursor).ok_or_else(|| {
                        err(format!(
                            "live digest feed ended with no entry left at cursor {}",
                            self.cursor
                        ))
                    })?,
                    None => self.entries.get(self.cursor).copied().ok_or_else(|| {
                        err(format!(
                            "validator checkorder with no entry left at cursor {}",
                            self.cursor
                        ))
                    })?,
                };
                if let Err(observed) = sequencer.wait_for(expected.timestamp) {
                    return Err(Error::new(DivergenceReport {
                        kind: DivergenceKind::TimestampRegression,
                        lane: 0,
                        cursor: self.cursor,
                        expected: expected.timestamp,
                        observed,
                    }));
                }
                if expected.digest != self.latest {
                    return Err(Error::new(DivergenceReport {
                        kind: DivergenceKind::DigestMismatch,
                        lane: 0,
                        cursor: self.cursor,
                        expected: expected.digest,
                        observed: self.latest,
                    }));
                }
                self.latest = 0;
                sequencer.fetch_increment();
                self.cursor += 1;
                Ok(())
            }
        }
    }

    /// Primary-only: the digest wire format (spec §6). `"{len} {latest} "`
    /// followed by `"{digest} {timestamp} "` per entry, trailing space
    /// included — `deserialize` only ever reads with `split_whitespace`,
    /// which does not care.
    pub fn serialize(&self) -> String {
        use std::fmt::Write;
        let mut s = String::new();
        write!(s, "{} {} ", self.entries.len(), self.latest).unwrap();
        for e in &self.entries {
            write!(s, "{} {} ", e.digest, e.timestamp).unwrap();
        }
        s
    }

    /// Validator-only: parse the primary's `serialize()` output, populate
    /// `entries`, set `reference` to the primary's final `latest`, and
    /// reset `cursor`/`latest` to start a fresh replay.
    pub fn deserialize(role: ReplicaRole, s: &str) -> Result<Self> {
        let mut tokens = s.split_whitespace();
        let mut next_u64 = |what: &str| -> Result<u64> {
            tokens
                .next()
                .ok_or_else(|| err(format!("digest stream truncated reading {what}")))?
                .parse::<u64>()
                .map_err(Error::from)
        };
        let count = next_u64("entry count")?;
        let reference = next_u64("reference digest")?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let digest = next_u64("entry digest")?;
            let timestamp = next_u64("entry timestamp")?;
            entries.push(HashEntry { digest, timestamp });
        }
        Ok(HashChain {
            role,
            entries,
            latest: 0,
            reference,
            cursor: 0,
            feed: None,
        })
    }

    /// Two successive resets are equivalent to one: this always goes back
    /// to the same "just started" state regardless of how many times it's
    /// called.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.reference = 0;
        self.latest = 0;
        self.cursor = 0;
    }

    /// Primary: serialize then reset, handing the caller the wire bytes to
    /// publish. Validator: assert the final digest matches the reference
    /// loaded at `deserialize` time, then reset. Returns `None` on the
    /// validator side (nothing to publish).
    pub fn finalize(&mut self) -> Result<Option<String>> {
        match self.role {
            ReplicaRole::Primary => {
                let s = self.serialize();
                self.reset();
                Ok(Some(s))
            }
            ReplicaRole::Validator => {
                if self.latest != self.reference {
                    let report = DivergenceReport {
                        kind: DivergenceKind::DigestMismatch,
                        lane: 0,
                        cursor: self.cursor,
                        expected: self.reference,
                        observed: self.latest,
                    };
                    self.reset();
                    return Err(Error::new(report));
                }
                self.reset();
                Ok(None)
            }
        }
    }
}
