//! Property-based tests for cluster table correctness
//!
//! Uses proptest to verify table invariants hold across many random
//! operation sequences

use fat_sim::{ClusterId, ClusterTable, FatError};
use proptest::prelude::*;
use proptest::sample::Index;

#[derive(Debug, Clone)]
enum Op {
    Allocate(u64),
    Append(Index, u64),
    Delete(Index),
    Seek(Index, u64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u64..6000).prop_map(Op::Allocate),
        2 => (any::<Index>(), 0u64..4000).prop_map(|(i, b)| Op::Append(i, b)),
        2 => any::<Index>().prop_map(Op::Delete),
        1 => (any::<Index>(), 0u64..8000).prop_map(|(i, o)| Op::Seek(i, o)),
    ]
}

const POINTER_BITS: u32 = 5;
const CLUSTER_BYTES: u64 = 512;

fn assert_consistent(table: &ClusterTable, files: &[ClusterId]) -> Result<(), TestCaseError> {
    prop_assert!(table.occupied_clusters() <= table.capacity());
    prop_assert!(table.verify().is_ok(), "{:?}", table.verify());

    // Every occupied cluster belongs to exactly one live file
    let mut heads = table.chain_heads();
    let mut live = files.to_vec();
    heads.sort_unstable();
    live.sort_unstable();
    prop_assert_eq!(heads, live);

    let total: usize = files
        .iter()
        .map(|&start| table.get_cluster_list(start).unwrap().len())
        .sum();
    prop_assert_eq!(total, table.occupied_clusters());
    Ok(())
}

proptest! {
    #[test]
    fn prop_invariants_hold_across_operations(
        ops in prop::collection::vec(op_strategy(), 1..80)
    ) {
        let mut table = ClusterTable::new(POINTER_BITS, CLUSTER_BYTES).unwrap();
        let mut files: Vec<ClusterId> = Vec::new();

        for op in ops {
            match op {
                Op::Allocate(bytes) => {
                    let free = table.free_clusters() as u64;
                    let needed = table.clusters_for(bytes);
                    let before = table.status_snapshot();

                    match table.allocate(bytes) {
                        Ok(allocation) => {
                            prop_assert!(needed <= free);
                            match allocation.start() {
                                Some(start) => {
                                    let list = table.get_cluster_list(start).unwrap();
                                    prop_assert_eq!(list.len() as u64, needed);
                                    prop_assert!(list.windows(2).all(|w| w[0] < w[1]));
                                    files.push(start);
                                }
                                None => {
                                    prop_assert_eq!(bytes, 0);
                                    prop_assert_eq!(table.status_snapshot(), before);
                                }
                            }
                        }
                        Err(FatError::InsufficientSpace { .. }) => {
                            prop_assert!(needed > free);
                            prop_assert_eq!(table.status_snapshot(), before);
                        }
                        Err(e) => prop_assert!(false, "unexpected error: {}", e),
                    }
                }
                Op::Append(index, bytes) => {
                    if files.is_empty() {
                        continue;
                    }
                    let start = files[index.index(files.len())];
                    let prefix = table.get_cluster_list(start).unwrap();
                    let free = table.free_clusters() as u64;
                    let needed = table.clusters_for(bytes);
                    let before = table.status_snapshot();

                    match table.append(start, bytes) {
                        Ok(returned) => {
                            prop_assert_eq!(returned, start);
                            let after = table.get_cluster_list(start).unwrap();
                            prop_assert_eq!(after.len() as u64, prefix.len() as u64 + needed);
                            prop_assert_eq!(&after[..prefix.len()], &prefix[..]);
                        }
                        Err(FatError::InsufficientSpace { .. }) => {
                            prop_assert!(needed > free);
                            prop_assert_eq!(table.status_snapshot(), before);
                        }
                        Err(e) => prop_assert!(false, "unexpected error: {}", e),
                    }
                }
                Op::Delete(index) => {
                    if files.is_empty() {
                        continue;
                    }
                    let start = files.remove(index.index(files.len()));
                    let chain = table.get_cluster_list(start).unwrap();
                    let before = table.status_snapshot();

                    prop_assert_eq!(table.delete_file(start).unwrap(), chain.len());

                    let after = table.status_snapshot();
                    let mut changed = before.diff(&after);
                    let mut expected = chain.clone();
                    changed.sort_unstable();
                    expected.sort_unstable();
                    prop_assert_eq!(changed, expected);
                    for id in chain {
                        prop_assert!(!table.get_status(id).unwrap());
                        prop_assert_eq!(table.get_next(id).unwrap(), None);
                    }
                }
                Op::Seek(index, offset) => {
                    if files.is_empty() {
                        continue;
                    }
                    let start = files[index.index(files.len())];
                    let list = table.get_cluster_list(start).unwrap();
                    let k = (offset / CLUSTER_BYTES) as usize;
                    prop_assert_eq!(
                        table.seek_cluster(start, offset).unwrap(),
                        list.get(k).copied()
                    );
                }
            }

            assert_consistent(&table, &files)?;
        }
    }

    #[test]
    fn prop_round_trip_length(bytes in 1u64..64 * 1024, cluster_bytes in 1u64..4096) {
        let mut table = ClusterTable::new(12, cluster_bytes).unwrap();
        let needed = bytes.div_ceil(cluster_bytes);

        match table.allocate(bytes) {
            Ok(allocation) => {
                let start = allocation.start().unwrap();
                prop_assert_eq!(table.get_cluster_list(start).unwrap().len() as u64, needed);
            }
            Err(FatError::InsufficientSpace { .. }) => prop_assert!(needed > 4096),
            Err(e) => prop_assert!(false, "unexpected error: {}", e),
        }
    }

    #[test]
    fn prop_seek_agrees_with_list(
        sizes in prop::collection::vec(1u64..1500, 1..6),
        probe in 0usize..40
    ) {
        let mut table = ClusterTable::new(6, 256).unwrap();
        let start = table.allocate(sizes[0]).unwrap().start().unwrap();
        for &extra in &sizes[1..] {
            table.allocate(300).unwrap();
            table.append(start, extra).unwrap();
        }

        let list = table.get_cluster_list(start).unwrap();
        prop_assert_eq!(
            table.seek_cluster(start, probe as u64 * 256).unwrap(),
            list.get(probe).copied()
        );
    }
}
