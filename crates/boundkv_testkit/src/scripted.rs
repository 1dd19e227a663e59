//! Fault-injecting storage engine.
//!
//! [`ScriptedEngine`] wraps an [`InMemoryEngine`] and decides, per request,
//! how the engine answers: normally, blocked, failed, never, or late.
//! Behaviors are either set as the default or queued for the next request
//! only, so a test can stall one transaction and let the next one through.
//!
//! Requests are forwarded on tokio tasks; the engine must be used inside a
//! tokio runtime.

use boundkv_storage::{
    Completion, CompletionSignal, ConnectionRef, EngineConnection, EngineTransaction,
    InMemoryEngine, OpenEvent, OpenRequest, OpenResponder, Request, StorageEngine, StorageError,
    StorageResult, TransactionMode, UpgradeFn,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How the engine answers an open request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenBehavior {
    /// Forward to the in-memory engine.
    Normal,
    /// Signal `Blocked`.
    Block,
    /// Signal an error carrying the message.
    Fail(String),
    /// Never signal.
    Stall,
    /// Forward after the delay.
    Delay(Duration),
}

/// How a committed transaction signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitBehavior {
    /// Forward to the in-memory engine.
    Normal,
    /// Abort the batch and signal an error carrying the message.
    Fail(String),
    /// Abort the batch and never signal.
    Stall,
    /// Apply the batch, then signal after the delay.
    Delay(Duration),
}

/// Queue of one-shot behaviors in front of a default.
#[derive(Debug)]
struct Plan<B> {
    default: B,
    queued: VecDeque<B>,
}

impl<B: Clone> Plan<B> {
    fn new(default: B) -> Self {
        Self {
            default,
            queued: VecDeque::new(),
        }
    }

    fn next(&mut self) -> B {
        self.queued
            .pop_front()
            .unwrap_or_else(|| self.default.clone())
    }
}

#[derive(Debug)]
struct Script {
    open: Mutex<Plan<OpenBehavior>>,
    commit: Mutex<Plan<CommitBehavior>>,
    open_requests: AtomicUsize,
    commits: AtomicUsize,
    stalled_opens: Mutex<Vec<OpenResponder>>,
    stalled_commits: Mutex<Vec<CompletionSignal>>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            open: Mutex::new(Plan::new(OpenBehavior::Normal)),
            commit: Mutex::new(Plan::new(CommitBehavior::Normal)),
            open_requests: AtomicUsize::new(0),
            commits: AtomicUsize::new(0),
            stalled_opens: Mutex::new(Vec::new()),
            stalled_commits: Mutex::new(Vec::new()),
        }
    }
}

/// An in-memory engine with scripted faults.
///
/// Clones share the script and the data.
#[derive(Debug, Clone, Default)]
pub struct ScriptedEngine {
    inner: InMemoryEngine,
    script: Arc<Script>,
}

impl ScriptedEngine {
    /// Creates an engine that behaves normally until told otherwise.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the wrapped in-memory engine.
    pub fn inner(&self) -> &InMemoryEngine {
        &self.inner
    }

    /// Sets the behavior of every open request without a queued behavior.
    pub fn set_open(&self, behavior: OpenBehavior) {
        self.script.open.lock().default = behavior;
    }

    /// Queues a behavior for the next open request only.
    pub fn push_open(&self, behavior: OpenBehavior) {
        self.script.open.lock().queued.push_back(behavior);
    }

    /// Sets the behavior of every commit without a queued behavior.
    pub fn set_commit(&self, behavior: CommitBehavior) {
        self.script.commit.lock().default = behavior;
    }

    /// Queues a behavior for the next commit only.
    pub fn push_commit(&self, behavior: CommitBehavior) {
        self.script.commit.lock().queued.push_back(behavior);
    }

    /// Returns the number of open requests received.
    pub fn open_requests(&self) -> usize {
        self.script.open_requests.load(Ordering::SeqCst)
    }

    /// Returns the number of transactions committed.
    pub fn commits(&self) -> usize {
        self.script.commits.load(Ordering::SeqCst)
    }

    /// Returns the number of requests held without an answer.
    pub fn stalled(&self) -> usize {
        self.script.stalled_opens.lock().len() + self.script.stalled_commits.lock().len()
    }

    /// Drops every stalled request, which then resolves as aborted.
    pub fn release_stalled(&self) {
        self.script.stalled_opens.lock().clear();
        self.script.stalled_commits.lock().clear();
    }
}

impl StorageEngine for ScriptedEngine {
    fn open(&self, name: &str, version: u32, upgrade: UpgradeFn) -> OpenRequest {
        let attempt = self.script.open_requests.fetch_add(1, Ordering::SeqCst) + 1;
        let behavior = self.script.open.lock().next();
        tracing::debug!(name, attempt, ?behavior, "scripted open");

        let delay = match behavior {
            OpenBehavior::Block => return OpenRequest::resolved(OpenEvent::Blocked),
            OpenBehavior::Fail(message) => {
                return OpenRequest::resolved(OpenEvent::Error(StorageError::Upgrade(message)))
            }
            OpenBehavior::Stall => {
                let (responder, request) = OpenRequest::channel();
                self.script.stalled_opens.lock().push(responder);
                return request;
            }
            OpenBehavior::Normal => None,
            OpenBehavior::Delay(delay) => Some(delay),
        };

        let inner = self.inner.open(name, version, upgrade);
        let (responder, request) = OpenRequest::channel();
        let script = Arc::clone(&self.script);
        tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            match inner.await {
                OpenEvent::Success(conn) => {
                    let scripted: ConnectionRef = Arc::new(ScriptedConnection { inner: conn, script });
                    if let Err(late) = responder.succeed(scripted) {
                        late.close();
                    }
                }
                OpenEvent::Blocked => responder.block(),
                OpenEvent::Error(err) => responder.fail(err),
            }
        });
        request
    }
}

struct ScriptedConnection {
    inner: ConnectionRef,
    script: Arc<Script>,
}

impl fmt::Debug for ScriptedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ScriptedConnection").field(&self.inner).finish()
    }
}

impl EngineConnection for ScriptedConnection {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn version(&self) -> u32 {
        self.inner.version()
    }

    fn container_names(&self) -> Vec<String> {
        self.inner.container_names()
    }

    fn transaction(
        &self,
        container: &str,
        mode: TransactionMode,
    ) -> StorageResult<Box<dyn EngineTransaction>> {
        let inner = self.inner.transaction(container, mode)?;
        Ok(Box::new(ScriptedTransaction {
            inner,
            script: Arc::clone(&self.script),
        }))
    }

    fn close(&self) {
        self.inner.close();
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

struct ScriptedTransaction {
    inner: Box<dyn EngineTransaction>,
    script: Arc<Script>,
}

impl EngineTransaction for ScriptedTransaction {
    fn mode(&self) -> TransactionMode {
        self.inner.mode()
    }

    fn get(&mut self, key: &str) -> StorageResult<Request<Option<String>>> {
        self.inner.get(key)
    }

    fn put(&mut self, key: &str, value: &str) -> StorageResult<Request<()>> {
        self.inner.put(key, value)
    }

    fn clear(&mut self) -> StorageResult<Request<()>> {
        self.inner.clear()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn commit(self: Box<Self>) -> Completion {
        let Self { inner, script } = *self;
        script.commits.fetch_add(1, Ordering::SeqCst);
        let behavior = script.commit.lock().next();
        tracing::debug!(?behavior, ops = inner.len(), "scripted commit");

        match behavior {
            CommitBehavior::Normal => inner.commit(),
            CommitBehavior::Fail(message) => {
                drop(inner);
                Completion::resolved(Err(StorageError::Transaction(message)))
            }
            CommitBehavior::Stall => {
                drop(inner);
                let (signal, completion) = Completion::channel();
                script.stalled_commits.lock().push(signal);
                completion
            }
            CommitBehavior::Delay(delay) => {
                let applied = inner.commit();
                let (signal, completion) = Completion::channel();
                tokio::spawn(async move {
                    let outcome = applied.await;
                    tokio::time::sleep(delay).await;
                    match outcome {
                        Ok(()) => signal.complete(),
                        Err(err) => signal.fail(err),
                    }
                });
                completion
            }
        }
    }
}
