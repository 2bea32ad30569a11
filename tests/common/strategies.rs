use proptest::prelude::*;

/// Item counts for one source's groupings, empty groupings included
pub fn grouping_sizes_strategy() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0usize..8, 0..16)
}

/// Grouping sizes for one to four concurrent sources
pub fn multi_source_strategy() -> impl Strategy<Value = Vec<Vec<usize>>> {
    prop::collection::vec(grouping_sizes_strategy(), 1..5)
}

pub fn capacity_strategy() -> impl Strategy<Value = usize> {
    1usize..12
}

pub fn worker_count_strategy() -> impl Strategy<Value = usize> {
    1usize..5
}
