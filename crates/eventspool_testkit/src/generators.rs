//! Property-based test generators using proptest.
//!
//! Provides strategies for record payloads, segment caps and whole
//! writer/reader workloads.

use proptest::prelude::*;

/// Strategy for a single record payload (arbitrary bytes, possibly empty).
pub fn record_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..96)
}

/// Strategy for a batch of records.
pub fn record_batch_strategy(max_records: usize) -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(record_strategy(), 0..=max_records)
}

/// Strategy for small segment caps that force frequent rollover,
/// including caps smaller than a single frame.
pub fn block_size_strategy() -> impl Strategy<Value = u64> {
    prop_oneof![
        1 => 1u64..16,
        4 => 16u64..256,
        1 => 256u64..4096,
    ]
}

/// One step of a store workload.
#[derive(Debug, Clone)]
pub enum StoreOp {
    /// Append a record.
    Store(Vec<u8>),
    /// Make everything stored so far durable.
    Flush,
    /// Drop the store without flushing and recover it.
    Crash,
    /// Close the store cleanly and reopen it.
    Reopen,
    /// Reclaim up to the n-th flushed record (modulo the count).
    Clean(usize),
}

/// Strategy for a single workload step, weighted towards appends.
pub fn store_op_strategy() -> impl Strategy<Value = StoreOp> {
    prop_oneof![
        10 => record_strategy().prop_map(StoreOp::Store),
        3 => Just(StoreOp::Flush),
        1 => Just(StoreOp::Crash),
        1 => Just(StoreOp::Reopen),
        1 => any::<usize>().prop_map(StoreOp::Clean),
    ]
}

/// Strategy for a workload of up to `max_ops` steps.
pub fn workload_strategy(max_ops: usize) -> impl Strategy<Value = Vec<StoreOp>> {
    prop::collection::vec(store_op_strategy(), 1..=max_ops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{replay_all, replay_from, store_all, TestStore};
    use eventspool_core::Address;

    proptest! {
        #[test]
        fn flushed_batches_replay_in_order(
            records in record_batch_strategy(40),
            block_size in block_size_strategy(),
        ) {
            let test_store = TestStore::memory(block_size);
            store_all(test_store.log(), &records).unwrap();
            test_store.flush().unwrap();

            prop_assert_eq!(replay_all(&test_store).unwrap(), records);
        }

        #[test]
        fn issued_cursors_increase_and_resume(
            records in record_batch_strategy(30),
            block_size in block_size_strategy(),
        ) {
            let test_store = TestStore::memory(block_size);
            let cursors: Vec<Address> = store_all(test_store.log(), &records)
                .unwrap()
                .into_iter()
                .map(|c| c.expect("no skip pointer registered"))
                .collect();
            prop_assert!(cursors.windows(2).all(|w| w[0] < w[1]));
            test_store.flush().unwrap();

            // resuming from the cursor of record i yields everything after it
            for (i, cursor) in cursors.iter().enumerate() {
                prop_assert_eq!(
                    replay_from(&test_store, *cursor).unwrap(),
                    records[i + 1..].to_vec()
                );
            }
        }

        #[test]
        fn workloads_keep_flushed_prefix(ops in workload_strategy(60), block_size in block_size_strategy()) {
            let mut test_store = TestStore::memory(block_size);
            // model: every record stored, and how many of them are durable
            let mut stored: Vec<Vec<u8>> = Vec::new();
            let mut durable = 0usize;
            let mut reclaimed = 0usize;

            for op in ops {
                match op {
                    StoreOp::Store(record) => {
                        test_store.store(&record).unwrap();
                        stored.push(record);
                    }
                    StoreOp::Flush => {
                        test_store.flush().unwrap();
                        durable = stored.len();
                    }
                    StoreOp::Crash => {
                        test_store.crash().unwrap();
                        stored.truncate(durable);
                    }
                    StoreOp::Reopen => {
                        test_store.reopen().unwrap();
                        durable = stored.len();
                    }
                    StoreOp::Clean(n) => {
                        let live = durable - reclaimed;
                        if live == 0 {
                            continue;
                        }
                        let skip = n % live;
                        let mut cursor = Address::ZERO;
                        let mut next = test_store.retrieve(Address::ZERO).unwrap();
                        for _ in 0..skip {
                            cursor = next.as_ref().expect("record is durable").next;
                            next = test_store.retrieve_next().unwrap();
                        }
                        if skip > 0 {
                            test_store.clean(cursor).unwrap();
                            reclaimed += skip;
                        }
                    }
                }
                test_store.check_invariants().unwrap();
            }

            prop_assert_eq!(
                replay_all(&test_store).unwrap(),
                stored[reclaimed..durable].to_vec()
            );
        }
    }
}
