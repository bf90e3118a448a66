// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Partitions a batch into groups of transactions that may run concurrently.
//!
//! Two transactions conflict when one writes a path the other reads or writes, or when
//! one of them may touch the whole state and the other touches anything. Groups are the
//! connected components of the conflict graph, so transactions of different groups never
//! conflict. Components are found with a union-find over the transaction indices, linking
//! each transaction to the last writer of every path it touches instead of comparing
//! every pair.

use parex_execution_exports::ResourceOracle;
use parex_models::{
    resource::{ResourcePath, ResourceUsage},
    transaction::Transaction,
};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

/// Conflict-free subset of a batch, executed sequentially by one worker
#[derive(Debug, Clone)]
pub(crate) struct Group {
    /// positions of the transactions in the batch, increasing
    pub indices: Vec<usize>,
    /// transactions of the group, in batch order
    pub transactions: Vec<Transaction>,
}

/// Splits batches into conflict-free groups using the resource oracle
pub(crate) struct Grouper {
    oracle: ResourceOracle,
}

impl Grouper {
    pub fn new(oracle: ResourceOracle) -> Self {
        Grouper { oracle }
    }

    /// Partition `transactions` into groups.
    /// Groups are ordered by their first transaction and keep the batch order inside.
    pub fn group(&self, transactions: &[Transaction]) -> Vec<Group> {
        let usages: Vec<ResourceUsage> = transactions
            .iter()
            .map(|transaction| self.oracle.resources_of(transaction))
            .collect();
        let groups: Vec<Group> = partition(&usages)
            .into_iter()
            .map(|indices| Group {
                transactions: indices.iter().map(|&i| transactions[i].clone()).collect(),
                indices,
            })
            .collect();
        debug!(
            "split {} transactions into {} groups",
            transactions.len(),
            groups.len()
        );
        groups
    }
}

struct DisjointSets {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSets {
    fn new(size: usize) -> Self {
        DisjointSets {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    fn find(&mut self, mut element: usize) -> usize {
        let mut root = element;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // path compression
        while self.parent[element] != root {
            let next = self.parent[element];
            self.parent[element] = root;
            element = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (root_a, root_b) = (self.find(a), self.find(b));
        if root_a == root_b {
            return;
        }
        match self.rank[root_a].cmp(&self.rank[root_b]) {
            Ordering::Less => self.parent[root_a] = root_b,
            Ordering::Greater => self.parent[root_b] = root_a,
            Ordering::Equal => {
                self.parent[root_b] = root_a;
                self.rank[root_a] += 1;
            }
        }
    }
}

/// Connected components of the conflict graph of `usages`, as lists of indices.
pub(crate) fn partition(usages: &[ResourceUsage]) -> Vec<Vec<usize>> {
    let mut sets = DisjointSets::new(usages.len());
    let mut last_writer: HashMap<&ResourcePath, usize> = HashMap::new();
    let mut readers_since_write: HashMap<&ResourcePath, Vec<usize>> = HashMap::new();
    // first transaction touching anything, every toucher is linked to it
    // once a whole-state transaction shows up
    let mut first_toucher: Option<usize> = None;
    let mut whole_state: Option<usize> = None;

    for (index, usage) in usages.iter().enumerate() {
        if !usage.touches_any() {
            continue;
        }
        let toucher = *first_toucher.get_or_insert(index);
        match usage {
            ResourceUsage::WholeState => {
                // every earlier toucher is already linked to `toucher` if a whole-state
                // transaction came before, otherwise link them all now
                if whole_state.is_none() {
                    for earlier in 0..index {
                        if usages[earlier].touches_any() {
                            sets.union(earlier, toucher);
                        }
                    }
                }
                sets.union(index, toucher);
                whole_state = Some(index);
            }
            ResourceUsage::Paths(access) => {
                if whole_state.is_some() {
                    sets.union(index, toucher);
                }
                for path in access.reads() {
                    if let Some(&writer) = last_writer.get(path) {
                        sets.union(index, writer);
                    }
                    readers_since_write.entry(path).or_default().push(index);
                }
                for path in access.writes() {
                    if let Some(&writer) = last_writer.get(path) {
                        sets.union(index, writer);
                    }
                    if let Some(readers) = readers_since_write.remove(path) {
                        for reader in readers {
                            sets.union(index, reader);
                        }
                    }
                    last_writer.insert(path, index);
                }
            }
        }
    }

    // components in order of their first index
    let mut component_of_root: HashMap<usize, usize> = HashMap::new();
    let mut components: Vec<Vec<usize>> = Vec::new();
    for index in 0..usages.len() {
        let root = sets.find(index);
        let component = *component_of_root.entry(root).or_insert_with(|| {
            components.push(Vec::new());
            components.len() - 1
        });
        components[component].push(index);
    }
    components
}

#[cfg(test)]
mod tests {
    use super::*;
    use parex_execution_exports::test_exports::TestServices;
    use parex_models::{address::Address, resource::AccessSet};

    fn path(key: &str) -> ResourcePath {
        ResourcePath::new(Address::derive(b"store"), key)
    }

    fn usage(reads: &[&str], writes: &[&str]) -> ResourceUsage {
        let mut access = AccessSet::new();
        for key in reads {
            access.add_read(path(key));
        }
        for key in writes {
            access.add_write(path(key));
        }
        ResourceUsage::Paths(access)
    }

    fn assert_valid_partition(usages: &[ResourceUsage], groups: &[Vec<usize>]) {
        let mut seen: Vec<usize> = groups.iter().flatten().copied().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..usages.len()).collect::<Vec<_>>());
        for group in groups {
            assert!(group.windows(2).all(|pair| pair[0] < pair[1]));
        }
        for (i, a) in groups.iter().enumerate() {
            for b in groups.iter().skip(i + 1) {
                for &x in a {
                    for &y in b {
                        assert!(
                            !usages[x].conflicts_with(&usages[y]),
                            "transactions {} and {} conflict across groups",
                            x,
                            y
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_shared_write_joins_group() {
        let usages = vec![usage(&[], &["r1"]), usage(&[], &["r2"]), usage(&[], &["r1"])];
        assert_eq!(partition(&usages), vec![vec![0, 2], vec![1]]);
    }

    #[test]
    fn test_readers_share_but_writer_joins() {
        let readers = vec![usage(&["a"], &[]), usage(&["a"], &[])];
        assert_eq!(partition(&readers), vec![vec![0], vec![1]]);

        let mixed = vec![usage(&["a"], &[]), usage(&["a"], &[]), usage(&[], &["a"])];
        assert_eq!(partition(&mixed), vec![vec![0, 1, 2]]);

        let write_then_read = vec![usage(&[], &["a"]), usage(&["a"], &[]), usage(&["b"], &[])];
        assert_eq!(partition(&write_then_read), vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn test_transitive_conflicts_merge() {
        let usages = vec![
            usage(&[], &["a"]),
            usage(&[], &["b"]),
            usage(&["a"], &["c"]),
            usage(&["c"], &["b"]),
            usage(&[], &["d"]),
        ];
        assert_eq!(partition(&usages), vec![vec![0, 1, 2, 3], vec![4]]);
    }

    #[test]
    fn test_whole_state_serializes_touchers() {
        let usages = vec![
            usage(&[], &["a"]),
            usage(&[], &[]),
            ResourceUsage::WholeState,
            usage(&["z"], &[]),
        ];
        assert_eq!(partition(&usages), vec![vec![0, 2, 3], vec![1]]);

        let only_unknown = vec![ResourceUsage::WholeState, ResourceUsage::WholeState];
        assert_eq!(partition(&only_unknown), vec![vec![0, 1]]);
    }

    #[test]
    fn test_empty_and_singleton() {
        assert!(partition(&[]).is_empty());
        assert_eq!(partition(&[usage(&[], &["a"])]), vec![vec![0]]);
    }

    #[test]
    fn test_partition_is_valid_and_deterministic() {
        let keys = ["a", "b", "c", "d", "e", "f", "g"];
        let usages: Vec<ResourceUsage> = (0..60)
            .map(|i| {
                if i % 23 == 22 {
                    return ResourceUsage::WholeState;
                }
                let read = keys[(i * 5) % keys.len()];
                let write = keys[(i * 3 + 1) % keys.len()];
                if i % 4 == 0 {
                    usage(&[read], &[])
                } else {
                    usage(&[read], &[write])
                }
            })
            .collect();
        let groups = partition(&usages);
        assert_valid_partition(&usages, &groups);
        assert_eq!(groups, partition(&usages));
    }

    #[test]
    fn test_grouper_uses_declared_resources() {
        let services = TestServices::new();
        let grouper = Grouper::new(services.service_pack.resource_oracle.clone());
        // distinct senders, otherwise the account writes would link everything
        let batch = vec![
            services.write_call("alice", "store", "r1"),
            services.write_call("bob", "store", "r2"),
            services.write_call("carol", "store", "r1"),
        ];
        let groups = grouper.group(&batch);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].indices, vec![0, 2]);
        assert_eq!(groups[0].transactions, vec![batch[0].clone(), batch[2].clone()]);
        assert_eq!(groups[1].indices, vec![1]);

        let again = grouper.group(&batch);
        let indices: Vec<_> = again.iter().map(|group| group.indices.clone()).collect();
        assert_eq!(indices, vec![vec![0, 2], vec![1]]);
    }

    #[test]
    fn test_same_sender_is_serialized() {
        let services = TestServices::new();
        let grouper = Grouper::new(services.service_pack.resource_oracle.clone());
        let batch = vec![
            services.write_call("alice", "store", "r1"),
            services.write_call("alice", "store", "r2"),
        ];
        let groups = grouper.group(&batch);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].indices, vec![0, 1]);
    }

    #[test]
    fn test_undeclared_method_serializes_batch() {
        let services = TestServices::new();
        let grouper = Grouper::new(services.service_pack.resource_oracle.clone());
        let batch = vec![
            services.write_call("alice", "store", "r1"),
            parex_execution_exports::test_exports::call("bob", "store", "mystery", Vec::new()),
            services.write_call("carol", "store", "r2"),
        ];
        let groups = grouper.group(&batch);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].indices, vec![0, 1, 2]);
    }
}
