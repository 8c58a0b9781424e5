// `SlottedNode` is not Masstree. Spec §1 is explicit that the real node
// layout, key encoding, and trie/fanout structure are external collaborators
// out of scope for this core; this is just enough of a stand-in — one flat,
// sorted, in-memory slot array guarded by an `OccVersion` — to give the
// adapter in `operations.rs` something real to drive `do_insert`/`do_split`/
// `delete` against, and something real for its tests to exercise.
//
// The slot array itself is a `parking_lot::Mutex`, not a lock-free layout:
// Masstree's actual lock-free slot array is squarely the "node layout" spec
// §1 carves out. What *is* in scope and exercised faithfully here is the
// OCC protocol wrapped around it — readers still go through
// `stable_version()`/`load()` and validate against it, they just happen to
// also take a short-lived internal lock to read the stand-in `Vec`; a real
// Masstree node wouldn't need that inner lock at all.
//
// Both replicas hold real key/value data: spec §4.1's "no real memory is
// touched" carve-out on the validator side is about the `OccVersion` word's
// own allocation, not about the node's slots. The two replicas are
// independent trees (spec §1), and each one's slots are mutated for real so
// that subsequent reads on that replica see correct data — only the
// version-word bookkeeping is inert on the validator.

use parking_lot::Mutex;
use rbv_occ::OccVersion;

pub struct SlottedNode {
    version: OccVersion,
    slots: Mutex<Vec<(Vec<u8>, Vec<u8>)>>,
}

impl SlottedNode {
    pub fn new(seed: u64) -> Self {
        SlottedNode {
            version: OccVersion::create(seed),
            slots: Mutex::new(Vec::new()),
        }
    }

    pub fn version(&self) -> &OccVersion {
        &self.version
    }

    /// Index of `key` if present, else the index it would be inserted at
    /// (the branch choice the adapter combines into the digest).
    pub(crate) fn locate(&self, key: &[u8]) -> Result<usize, usize> {
        self.slots.lock().binary_search_by(|(k, _)| k.as_slice().cmp(key))
    }

    pub(crate) fn get_at(&self, idx: usize) -> Option<Vec<u8>> {
        self.slots.lock().get(idx).map(|(_, v)| v.clone())
    }

    pub(crate) fn insert_at(&self, idx: usize, key: Vec<u8>, value: Vec<u8>) -> Option<Vec<u8>> {
        let mut slots = self.slots.lock();
        match slots.binary_search_by(|(k, _)| k.as_slice().cmp(&key)) {
            Ok(existing) => Some(std::mem::replace(&mut slots[existing], (key, value)).1),
            Err(_) => {
                slots.insert(idx, (key, value));
                None
            }
        }
    }

    pub(crate) fn remove_at(&self, idx: usize) -> Option<Vec<u8>> {
        let mut slots = self.slots.lock();
        if idx < slots.len() {
            Some(slots.remove(idx).1)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Split the node in half by slot position, moving the upper half into
    /// a freshly created sibling. Returns the sibling and its lowest key
    /// (the separator a real Masstree would push into the parent).
    pub(crate) fn split_slots(&self, sibling_seed: u64) -> (SlottedNode, Vec<u8>) {
        let mut slots = self.slots.lock();
        let mid = slots.len() / 2;
        let upper: Vec<_> = slots.split_off(mid);
        let separator = upper
            .first()
            .map(|(k, _)| k.clone())
            .unwrap_or_default();
        (
            SlottedNode {
                version: OccVersion::create(sibling_seed),
                slots: Mutex::new(upper),
            },
            separator,
        )
    }
}
