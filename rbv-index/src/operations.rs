// The index operations adapter spec §4.4 describes in prose: the four
// things the index (Masstree) must do at its observable decision points.
// `SlottedNode` stands in for the real tree (see its module docs); these
// four functions are the faithful part — the exact sequence of
// `combine`/`stable_version`/`OrderedMutex` calls a real adapter would make,
// just driving a flat node instead of a trie.
//
//   - before reading a slot: combine the observed `stable_version()`
//   - at every branch choice: combine the chosen index
//   - before mutating structure: an `OrderedMutex` guard around the OCC
//     transition (`do_insert`/`done_insert`, `do_split`/`done_create`/
//     `done_split_and_delete`, or `delete`), itself bracketed by
//     `OccVersion::lock`/`unlock` — the `OrderedMutex` is what actually
//     serializes writers against each other and the validator against the
//     recorded order; LOCK is the advisory bit a concurrent reader or nested
//     operation can see set on the node itself, independent of whichever
//     mutex granularity the caller chose (spec §4.1's third contract, kept
//     distinct from the `WRITING` bits `do_insert`/`do_split` carry)
//   - at commit: combine the operation's logical result
//
// Point removal within a node's slot array (as opposed to removing the
// whole, now-empty, node) has no dedicated bit in spec §6's layout — WRITING
// is just "contents may be mid-update", which is exactly as true of a
// shift-down on removal as it is of a shift-up on insert. `delete_key`
// therefore brackets its slot mutation with the same `do_insert`/
// `done_insert` pair `insert` uses. `delete_node` is the third writer kind
// system overview §2 names (point insert / node split / node delete) and
// uses `OccVersion::delete` for the terminal, single-step transition.

use rbv_base::Result;
use rbv_chain::HashChain;
use rbv_occ::validate;
use rbv_sync::OrderedMutex;

use crate::SlottedNode;

fn combine_value(chain: &mut HashChain, value: Option<&[u8]>) {
    match value {
        Some(v) => chain.combine(v),
        None => chain.combine("none"),
    }
}

/// Optimistic point read: spins on `stable_version`/retry until a
/// consistent snapshot is taken, per spec §4.1's reader discipline.
pub fn get(node: &SlottedNode, chain: &mut HashChain, key: &[u8]) -> Result<Option<Vec<u8>>> {
    loop {
        let v1 = node.version().stable_version();
        chain.combine(&v1);

        let located = node.locate(key);
        let idx = match located {
            Ok(i) | Err(i) => i,
        };
        chain.combine(&(idx as u64));

        let value = match located {
            Ok(i) => node.get_at(i),
            Err(_) => None,
        };

        let v2 = node.version().load();
        if validate(v1, v2) {
            combine_value(chain, value.as_deref());
            return Ok(value);
        }
        // WRITING bit flipped, DELETED appeared, or INSERTCNT advanced
        // mid-read: the snapshot is stale. Retry from the top.
    }
}

/// Point insert (or point update, if `key` is already present): returns
/// the prior value, if any, matching spec §4.4's "combine the operation's
/// logical result (the value read, the prior value replaced ...)".
pub fn insert(
    node: &SlottedNode,
    chain: &mut HashChain,
    mutex: &OrderedMutex,
    key: Vec<u8>,
    value: Vec<u8>,
) -> Result<Option<Vec<u8>>> {
    let idx = match node.locate(&key) {
        Ok(i) | Err(i) => i,
    };

    let mut guard = mutex.lock(chain)?;
    guard.chain().combine(&(idx as u64));

    node.version().lock();
    node.version().do_insert();
    let prior = node.insert_at(idx, key, value);
    node.version().done_insert();
    node.version().unlock();

    combine_value(guard.chain(), prior.as_deref());
    Ok(prior)
}

/// Remove one key from the node's own slot array (not a whole-node
/// deletion — see module docs).
pub fn delete_key(
    node: &SlottedNode,
    chain: &mut HashChain,
    mutex: &OrderedMutex,
    key: &[u8],
) -> Result<Option<Vec<u8>>> {
    let located = node.locate(key);

    let mut guard = mutex.lock(chain)?;
    let idx = match located {
        Ok(i) | Err(i) => i,
    };
    guard.chain().combine(&(idx as u64));

    let prior = match located {
        Ok(i) => {
            node.version().lock();
            node.version().do_insert();
            let removed = node.remove_at(i);
            node.version().done_insert();
            node.version().unlock();
            removed
        }
        Err(_) => None,
    };

    combine_value(guard.chain(), prior.as_deref());
    Ok(prior)
}

/// Mark a now-empty node deleted outright (system overview §2's third
/// writer kind). Not gated on emptiness here — that policy decision (when
/// a parent unlinks a child) belongs to the caller, same as spec §4.4
/// leaves "which child pointer to follow" to the caller.
pub fn delete_node(node: &SlottedNode, chain: &mut HashChain, mutex: &OrderedMutex) -> Result<()> {
    let mut guard = mutex.lock(chain)?;
    node.version().lock();
    node.version().delete();
    node.version().unlock();
    guard.chain().combine("node-deleted");
    Ok(())
}

/// Split `node` in half, returning the new sibling and the separator key a
/// real Masstree would push up into the parent.
pub fn split(
    node: &SlottedNode,
    chain: &mut HashChain,
    mutex: &OrderedMutex,
    sibling_seed: u64,
) -> Result<(SlottedNode, Vec<u8>)> {
    let mut guard = mutex.lock(chain)?;

    node.version().lock();
    node.version().do_split();
    let (sibling, separator) = node.split_slots(sibling_seed);
    sibling.version().done_create();
    node.version().done_split_and_delete();
    node.version().unlock();

    guard.chain().combine(separator.as_slice());
    Ok((sibling, separator))
}

#[cfg(test)]
mod test {
    use super::*;
    use rbv_role::{with_role, ReplicaRole};
    use test_log::test;

    #[test]
    fn insert_then_get_round_trips() {
        with_role(ReplicaRole::Primary, || {
            let node = SlottedNode::new(0);
            let mutex = OrderedMutex::new();
            let mut chain = HashChain::new(ReplicaRole::Primary);

            let prior = insert(&node, &mut chain, &mutex, b"k1".to_vec(), b"v1".to_vec()).unwrap();
            assert_eq!(prior, None);

            let found = get(&node, &mut chain, b"k1").unwrap();
            assert_eq!(found, Some(b"v1".to_vec()));
        });
    }

    #[test]
    fn insert_replacing_existing_key_returns_prior_value() {
        with_role(ReplicaRole::Primary, || {
            let node = SlottedNode::new(0);
            let mutex = OrderedMutex::new();
            let mut chain = HashChain::new(ReplicaRole::Primary);

            insert(&node, &mut chain, &mutex, b"k1".to_vec(), b"v1".to_vec()).unwrap();
            let prior = insert(&node, &mut chain, &mutex, b"k1".to_vec(), b"v2".to_vec()).unwrap();
            assert_eq!(prior, Some(b"v1".to_vec()));

            let found = get(&node, &mut chain, b"k1").unwrap();
            assert_eq!(found, Some(b"v2".to_vec()));
        });
    }

    #[test]
    fn delete_key_removes_and_reports_prior_value() {
        with_role(ReplicaRole::Primary, || {
            let node = SlottedNode::new(0);
            let mutex = OrderedMutex::new();
            let mut chain = HashChain::new(ReplicaRole::Primary);

            insert(&node, &mut chain, &mutex, b"k1".to_vec(), b"v1".to_vec()).unwrap();
            let removed = delete_key(&node, &mut chain, &mutex, b"k1").unwrap();
            assert_eq!(removed, Some(b"v1".to_vec()));
            assert_eq!(get(&node, &mut chain, b"k1").unwrap(), None);
        });
    }

    #[test]
    fn split_divides_slots_and_marks_original_deleted() {
        with_role(ReplicaRole::Primary, || {
            let node = SlottedNode::new(0);
            let mutex = OrderedMutex::new();
            let mut chain = HashChain::new(ReplicaRole::Primary);

            for i in 0u8..8 {
                insert(
                    &node,
                    &mut chain,
                    &mutex,
                    vec![i],
                    vec![i],
                )
                .unwrap();
            }

            let (sibling, _separator) = split(&node, &mut chain, &mutex, 1).unwrap();
            assert!(rbv_occ::is_deleted(node.version().load()));
            assert!(!rbv_occ::is_deleted(sibling.version().load()));
            assert_eq!(node.len() + sibling.len(), 8);
        });
    }

    #[test]
    fn delete_node_sets_deleted_bit() {
        with_role(ReplicaRole::Primary, || {
            let node = SlottedNode::new(0);
            let mutex = OrderedMutex::new();
            let mut chain = HashChain::new(ReplicaRole::Primary);

            delete_node(&node, &mut chain, &mutex).unwrap();
            assert!(rbv_occ::is_deleted(node.version().load()));
        });
    }

    #[test]
    fn primary_and_validator_agree_on_insert_and_get() {
        with_role(ReplicaRole::Primary, || {
            let node = SlottedNode::new(0);
            let mutex = OrderedMutex::new();
            let mut chain = HashChain::new(ReplicaRole::Primary);

            insert(&node, &mut chain, &mutex, b"a".to_vec(), b"1".to_vec()).unwrap();
            insert(&node, &mut chain, &mutex, b"b".to_vec(), b"2".to_vec()).unwrap();
            get(&node, &mut chain, b"a").unwrap();
            let wire = chain.finalize().unwrap().unwrap();

            with_role(ReplicaRole::Validator, || {
                let v_node = SlottedNode::new(0);
                let v_mutex = OrderedMutex::new();
                let mut v_chain = HashChain::deserialize(ReplicaRole::Validator, &wire).unwrap();

                insert(&v_node, &mut v_chain, &v_mutex, b"a".to_vec(), b"1".to_vec()).unwrap();
                insert(&v_node, &mut v_chain, &v_mutex, b"b".to_vec(), b"2".to_vec()).unwrap();
                get(&v_node, &mut v_chain, b"a").unwrap();
                assert!(v_chain.finalize().unwrap().is_none());
            });
        });
    }
}
