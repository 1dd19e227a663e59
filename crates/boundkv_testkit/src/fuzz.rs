//! Fuzz testing harnesses.
//!
//! Arbitrary bytes are decoded into a sequence of [`StoreOp`]s which is run
//! against a fresh store and against a plain map. Any disagreement between
//! the two is a bug.

use crate::fixtures::TestStore;
use crate::generators::StoreOp;
use boundkv_core::Store;
use std::collections::BTreeMap;

/// Decodes bytes into operations over a pool of eight keys.
///
/// Each operation starts with a tag byte: `0` put, `1` get, `2` clear.
/// A put is followed by a key byte, a length byte and that many value
/// bytes; a get by a key byte. Truncated input ends the sequence.
pub fn parse_sequence(data: &[u8]) -> Vec<StoreOp> {
    let mut ops = Vec::new();
    let mut rest = data;

    while let Some((&tag, tail)) = rest.split_first() {
        rest = tail;
        match tag % 3 {
            0 => {
                let [key, len, tail @ ..] = rest else { break };
                let len = usize::from(*len % 16).min(tail.len());
                let value: String = tail[..len].iter().map(|b| format!("{b:02x}")).collect();
                ops.push(StoreOp::Put(format!("key-{}", key % 8), value));
                rest = &tail[len..];
            }
            1 => {
                let [key, tail @ ..] = rest else { break };
                ops.push(StoreOp::Get(format!("key-{}", key % 8)));
                rest = tail;
            }
            _ => ops.push(StoreOp::Clear),
        }
    }

    ops
}

/// Runs `ops` in order against `store` and a model map.
///
/// The store is expected to start empty.
///
/// # Errors
///
/// Returns a description of the first operation whose result differs from
/// the model, or that failed.
pub async fn check_against_model(store: &Store, ops: &[StoreOp]) -> Result<(), String> {
    let mut model = BTreeMap::new();

    for (i, op) in ops.iter().enumerate() {
        match op {
            StoreOp::Put(key, value) => {
                store
                    .put(key, value)
                    .await
                    .map_err(|e| format!("op {i}: put {key:?} failed: {e}"))?;
                model.insert(key.clone(), value.clone());
            }
            StoreOp::Get(key) => {
                let actual = store
                    .get(key)
                    .await
                    .map_err(|e| format!("op {i}: get {key:?} failed: {e}"))?;
                let expected = model.get(key).cloned();
                if actual != expected {
                    return Err(format!(
                        "op {i}: get {key:?} returned {actual:?}, expected {expected:?}"
                    ));
                }
            }
            StoreOp::Clear => {
                store
                    .clear_all()
                    .await
                    .map_err(|e| format!("op {i}: clear failed: {e}"))?;
                model.clear();
            }
        }
    }

    Ok(())
}

/// Fuzz target: decodes `data` and checks it against a fresh in-memory
/// store.
///
/// Panics if the store disagrees with the model.
pub fn fuzz_store_operations(data: &[u8]) {
    let ops = parse_sequence(data);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime");

    runtime.block_on(async {
        let store = TestStore::memory();
        if let Err(mismatch) = check_against_model(&store, &ops).await {
            panic!("{mismatch}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate_random_data(seed: u64, len: usize) -> Vec<u8> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                (state >> 33) as u8
            })
            .collect()
    }

    #[test]
    fn parse_empty_input() {
        assert!(parse_sequence(&[]).is_empty());
    }

    #[test]
    fn parse_each_operation() {
        let ops = parse_sequence(&[0, 3, 2, 0xab, 0xcd, 1, 11, 2]);
        assert_eq!(
            ops,
            vec![
                StoreOp::Put("key-3".into(), "abcd".into()),
                StoreOp::Get("key-3".into()),
                StoreOp::Clear,
            ]
        );
    }

    #[test]
    fn parse_stops_at_truncated_operation() {
        assert_eq!(parse_sequence(&[2, 0, 5]), vec![StoreOp::Clear]);
        assert_eq!(parse_sequence(&[1]), Vec::<StoreOp>::new());
    }

    #[test]
    fn parse_clamps_value_to_input() {
        let ops = parse_sequence(&[0, 1, 15, 0x01]);
        assert_eq!(ops, vec![StoreOp::Put("key-1".into(), "01".into())]);
    }

    #[test]
    fn fuzz_store_operations_empty() {
        fuzz_store_operations(&[]);
    }

    #[test]
    fn fuzz_store_operations_random_iterations() {
        for seed in 0..20 {
            fuzz_store_operations(&generate_random_data(seed, 64));
        }
    }
}
