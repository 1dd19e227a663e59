//! Property-based test generators using proptest.
//!
//! Provides strategies for keys, values and operation sequences.

use proptest::prelude::*;

/// One key-value operation against a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// Upsert `value` at `key`.
    Put(String, String),
    /// Look up `key`.
    Get(String),
    /// Remove every entry.
    Clear,
}

/// Strategy for generating keys: any non-empty string.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex(".{1,32}").expect("Invalid regex")
}

/// Strategy for generating values: any string, including empty.
pub fn value_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex(".{0,256}").expect("Invalid regex")
}

/// Strategy for generating timestamps as written by `mark_update`.
pub fn timestamp_strategy() -> impl Strategy<Value = String> {
    (0u64..4_102_444_800_000).prop_map(|millis| millis.to_string())
}

/// Strategy for keys drawn from a small pool, so that operations collide.
pub fn pooled_key_strategy() -> impl Strategy<Value = String> {
    (0u8..8).prop_map(|i| format!("key-{i}"))
}

/// Strategy for generating a single operation over pooled keys.
pub fn store_op_strategy() -> impl Strategy<Value = StoreOp> {
    prop_oneof![
        4 => (pooled_key_strategy(), value_strategy()).prop_map(|(k, v)| StoreOp::Put(k, v)),
        4 => pooled_key_strategy().prop_map(StoreOp::Get),
        1 => Just(StoreOp::Clear),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn store_ops_strategy(max_len: usize) -> impl Strategy<Value = Vec<StoreOp>> {
    prop::collection::vec(store_op_strategy(), 0..max_len)
}

/// Strategy for generating distinct key-value pairs.
pub fn entries_strategy(max_len: usize) -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::btree_map(key_strategy(), value_strategy(), 0..max_len)
        .prop_map(|map| map.into_iter().collect())
}
