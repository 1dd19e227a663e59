//! Batched transactions shared by the built-in engines.
//!
//! A [`BatchTransaction`] only records operations. Committing hands the
//! recorded [`Batch`] to the connection's [`BatchSink`], which applies it
//! and signals the completion.

use crate::engine::{EngineTransaction, TransactionMode};
use crate::error::{StorageError, StorageResult};
use crate::image::Entries;
use crate::request::{Completion, CompletionSignal, Request};
use std::sync::Arc;

/// A single enqueued operation.
#[derive(Debug)]
pub(crate) enum Operation {
    Get {
        key: String,
        request: Request<Option<String>>,
    },
    Put {
        key: String,
        value: String,
        request: Request<()>,
    },
    Clear {
        request: Request<()>,
    },
}

/// The operations of one transaction, in enqueue order.
#[derive(Debug)]
pub(crate) struct Batch {
    pub(crate) container: String,
    pub(crate) mode: TransactionMode,
    pub(crate) ops: Vec<Operation>,
}

impl Batch {
    /// Returns true if any operation modifies the container.
    pub(crate) fn is_mutating(&self) -> bool {
        self.ops
            .iter()
            .any(|op| !matches!(op, Operation::Get { .. }))
    }

    /// Runs every operation against `entries`, filling each request slot.
    pub(crate) fn apply(&self, entries: &mut Entries) {
        for op in &self.ops {
            match op {
                Operation::Get { key, request } => request.fulfill(entries.get(key).cloned()),
                Operation::Put {
                    key,
                    value,
                    request,
                } => {
                    entries.insert(key.clone(), value.clone());
                    request.fulfill(());
                }
                Operation::Clear { request } => {
                    entries.clear();
                    request.fulfill(());
                }
            }
        }
    }

    /// Runs a batch that only reads.
    pub(crate) fn apply_read_only(&self, entries: &Entries) {
        for op in &self.ops {
            if let Operation::Get { key, request } = op {
                request.fulfill(entries.get(key).cloned());
            }
        }
    }
}

/// Receives committed batches.
pub(crate) trait BatchSink: Send + Sync {
    /// Applies `batch` and reports the outcome on `signal`.
    fn submit(self: Arc<Self>, batch: Batch, signal: CompletionSignal);
}

/// Transaction that records operations until commit.
pub(crate) struct BatchTransaction {
    batch: Batch,
    sink: Arc<dyn BatchSink>,
}

impl BatchTransaction {
    pub(crate) fn new(container: &str, mode: TransactionMode, sink: Arc<dyn BatchSink>) -> Self {
        Self {
            batch: Batch {
                container: container.to_string(),
                mode,
                ops: Vec::new(),
            },
            sink,
        }
    }

    fn ensure_writable(&self) -> StorageResult<()> {
        if self.batch.mode.is_writable() {
            Ok(())
        } else {
            Err(StorageError::ReadOnly)
        }
    }
}

impl EngineTransaction for BatchTransaction {
    fn mode(&self) -> TransactionMode {
        self.batch.mode
    }

    fn get(&mut self, key: &str) -> StorageResult<Request<Option<String>>> {
        let request = Request::pending();
        self.batch.ops.push(Operation::Get {
            key: key.to_string(),
            request: request.clone(),
        });
        Ok(request)
    }

    fn put(&mut self, key: &str, value: &str) -> StorageResult<Request<()>> {
        self.ensure_writable()?;
        let request = Request::pending();
        self.batch.ops.push(Operation::Put {
            key: key.to_string(),
            value: value.to_string(),
            request: request.clone(),
        });
        Ok(request)
    }

    fn clear(&mut self) -> StorageResult<Request<()>> {
        self.ensure_writable()?;
        let request = Request::pending();
        self.batch.ops.push(Operation::Clear {
            request: request.clone(),
        });
        Ok(request)
    }

    fn len(&self) -> usize {
        self.batch.ops.len()
    }

    fn commit(self: Box<Self>) -> Completion {
        let (signal, completion) = Completion::channel();
        let Self { batch, sink } = *self;
        sink.submit(batch, signal);
        completion
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    struct ApplyNow(parking_lot::Mutex<Entries>);

    impl BatchSink for ApplyNow {
        fn submit(self: Arc<Self>, batch: Batch, signal: CompletionSignal) {
            batch.apply(&mut self.0.lock());
            signal.complete();
        }
    }

    fn sink() -> Arc<ApplyNow> {
        Arc::new(ApplyNow(parking_lot::Mutex::new(Entries::new())))
    }

    #[tokio::test]
    async fn operations_run_in_enqueue_order() {
        let sink = sink();
        let mut txn = Box::new(BatchTransaction::new(
            "state",
            TransactionMode::ReadWrite,
            sink.clone(),
        ));

        txn.put("k", "first").unwrap();
        let before_clear = txn.get("k").unwrap();
        txn.clear().unwrap();
        let after_clear = txn.get("k").unwrap();
        txn.put("k", "second").unwrap();
        assert_eq!(txn.len(), 5);

        txn.commit().await.unwrap();

        assert_eq!(before_clear.take(), Some(Some("first".to_string())));
        assert_eq!(after_clear.take(), Some(None));
        assert_eq!(sink.0.lock().get("k").map(String::as_str), Some("second"));
    }

    #[test]
    fn read_only_rejects_writes() {
        let mut txn = BatchTransaction::new("state", TransactionMode::ReadOnly, sink());
        assert!(matches!(txn.put("k", "v"), Err(StorageError::ReadOnly)));
        assert!(matches!(txn.clear(), Err(StorageError::ReadOnly)));
        assert!(txn.get("k").is_ok());
        assert_eq!(txn.len(), 1);
    }

    #[test]
    fn gets_are_not_mutating() {
        let mut txn = BatchTransaction::new("state", TransactionMode::ReadWrite, sink());
        txn.get("a").unwrap();
        assert!(!txn.batch.is_mutating());
        txn.put("a", "1").unwrap();
        assert!(txn.batch.is_mutating());
    }

    #[derive(Debug, Clone)]
    enum Step {
        Get(u8),
        Put(u8, String),
        Clear,
    }

    fn step_strategy() -> impl Strategy<Value = Step> {
        prop_oneof![
            (0u8..4).prop_map(Step::Get),
            (0u8..4, "[a-z]{0,8}").prop_map(|(k, v)| Step::Put(k, v)),
            Just(Step::Clear),
        ]
    }

    proptest! {
        #[test]
        fn apply_matches_sequential_map(steps in prop::collection::vec(step_strategy(), 0..32)) {
            let mut txn = BatchTransaction::new("state", TransactionMode::ReadWrite, sink());
            let mut model = Entries::new();
            let mut expected_reads = Vec::new();
            let mut reads = Vec::new();

            for step in &steps {
                match step {
                    Step::Get(k) => {
                        let key = format!("k{k}");
                        expected_reads.push(model.get(&key).cloned());
                        reads.push(txn.get(&key).unwrap());
                    }
                    Step::Put(k, v) => {
                        model.insert(format!("k{k}"), v.clone());
                        txn.put(&format!("k{k}"), v).unwrap();
                    }
                    Step::Clear => {
                        model.clear();
                        txn.clear().unwrap();
                    }
                }
            }

            let mut entries = Entries::new();
            txn.batch.apply(&mut entries);

            prop_assert_eq!(entries, model);
            let actual: Vec<_> = reads.iter().map(|r| r.take().flatten()).collect();
            prop_assert_eq!(actual, expected_reads);
        }
    }
}
