//! Asynchronous signals exchanged between an engine and its caller.
//!
//! Engines never return outcomes directly. An open request, a committed
//! transaction and every enqueued operation are each represented by a
//! caller-side handle that becomes ready once the engine signals it:
//!
//! - [`OpenRequest`] / [`OpenResponder`] carry the terminal [`OpenEvent`]
//! - [`Completion`] / [`CompletionSignal`] carry a transaction's outcome
//! - [`Request`] holds one operation's result, filled before completion

use crate::engine::EngineConnection;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Terminal outcome of an open request.
pub enum OpenEvent {
    /// The database is open and ready for transactions.
    Success(Arc<dyn EngineConnection>),
    /// The open was blocked by another connection to the same database.
    Blocked,
    /// The engine failed to open or upgrade the database.
    Error(StorageError),
}

impl fmt::Debug for OpenEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(conn) => f.debug_tuple("Success").field(&conn.name()).finish(),
            Self::Blocked => f.write_str("Blocked"),
            Self::Error(err) => f.debug_tuple("Error").field(err).finish(),
        }
    }
}

/// Caller side of an open request.
///
/// Resolves to [`OpenEvent::Error`] with [`StorageError::Aborted`] if the
/// engine drops its responder without signalling.
#[derive(Debug)]
pub struct OpenRequest {
    rx: oneshot::Receiver<OpenEvent>,
}

impl OpenRequest {
    /// Creates a linked responder/request pair.
    #[must_use]
    pub fn channel() -> (OpenResponder, OpenRequest) {
        let (tx, rx) = oneshot::channel();
        (OpenResponder { tx }, OpenRequest { rx })
    }

    /// Creates a request that is already resolved.
    #[must_use]
    pub fn resolved(event: OpenEvent) -> Self {
        let (responder, request) = Self::channel();
        responder.send(event);
        request
    }
}

impl Future for OpenRequest {
    type Output = OpenEvent;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|event| event.unwrap_or(OpenEvent::Error(StorageError::Aborted)))
    }
}

/// Engine side of an open request.
#[derive(Debug)]
pub struct OpenResponder {
    tx: oneshot::Sender<OpenEvent>,
}

impl OpenResponder {
    /// Returns true once the caller has stopped waiting for the outcome.
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }

    /// Delivers a successful open.
    ///
    /// If the caller has already gone away the connection is handed back so
    /// the engine can close it instead of leaking it.
    pub fn succeed(
        self,
        conn: Arc<dyn EngineConnection>,
    ) -> Result<(), Arc<dyn EngineConnection>> {
        match self.tx.send(OpenEvent::Success(conn)) {
            Ok(()) => Ok(()),
            Err(OpenEvent::Success(conn)) => Err(conn),
            Err(_) => Ok(()),
        }
    }

    /// Signals that the open is blocked.
    pub fn block(self) {
        self.send(OpenEvent::Blocked);
    }

    /// Signals that the open failed.
    pub fn fail(self, err: StorageError) {
        self.send(OpenEvent::Error(err));
    }

    fn send(self, event: OpenEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("open outcome discarded, requester is gone");
        }
    }
}

/// Caller side of a committed transaction.
///
/// Resolves once the engine reports that every enqueued operation has been
/// applied, or that the transaction failed. A dropped [`CompletionSignal`]
/// resolves to [`StorageError::Aborted`].
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<StorageResult<()>>,
}

impl Completion {
    /// Creates a linked signal/completion pair.
    #[must_use]
    pub fn channel() -> (CompletionSignal, Completion) {
        let (tx, rx) = oneshot::channel();
        (CompletionSignal { tx }, Completion { rx })
    }

    /// Creates a completion that is already resolved.
    #[must_use]
    pub fn resolved(result: StorageResult<()>) -> Self {
        let (signal, completion) = Self::channel();
        match result {
            Ok(()) => signal.complete(),
            Err(err) => signal.fail(err),
        }
        completion
    }
}

impl Future for Completion {
    type Output = StorageResult<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(StorageError::Aborted)))
    }
}

/// Engine side of a committed transaction.
#[derive(Debug)]
pub struct CompletionSignal {
    tx: oneshot::Sender<StorageResult<()>>,
}

impl CompletionSignal {
    /// Signals that all operations were applied.
    pub fn complete(self) {
        let _ = self.tx.send(Ok(()));
    }

    /// Signals that the transaction failed.
    pub fn fail(self, err: StorageError) {
        let _ = self.tx.send(Err(err));
    }
}

/// Result slot of a single enqueued operation.
///
/// The engine fills the slot while applying the batch, before it signals
/// completion; the caller reads it afterwards with [`Request::take`].
pub struct Request<T> {
    slot: Arc<Mutex<Option<T>>>,
}

impl<T> Request<T> {
    /// Creates an empty slot.
    #[must_use]
    pub fn pending() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Stores the operation's result.
    pub fn fulfill(&self, value: T) {
        *self.slot.lock() = Some(value);
    }

    /// Returns true if the engine has filled the slot.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Takes the result out of the slot.
    pub fn take(&self) -> Option<T> {
        self.slot.lock().take()
    }
}

impl<T> Clone for Request<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completion_resolves_with_signal() {
        let (signal, completion) = Completion::channel();
        signal.complete();
        assert!(completion.await.is_ok());
    }

    #[tokio::test]
    async fn completion_reports_failure() {
        let (signal, completion) = Completion::channel();
        signal.fail(StorageError::ReadOnly);
        assert!(matches!(completion.await, Err(StorageError::ReadOnly)));
    }

    #[tokio::test]
    async fn dropped_signal_aborts_completion() {
        let (signal, completion) = Completion::channel();
        drop(signal);
        assert!(matches!(completion.await, Err(StorageError::Aborted)));
    }

    #[tokio::test]
    async fn dropped_responder_aborts_open() {
        let (responder, request) = OpenRequest::channel();
        drop(responder);
        assert!(matches!(
            request.await,
            OpenEvent::Error(StorageError::Aborted)
        ));
    }

    #[tokio::test]
    async fn blocked_open_is_delivered() {
        let (responder, request) = OpenRequest::channel();
        responder.block();
        assert!(matches!(request.await, OpenEvent::Blocked));
    }

    #[test]
    fn responder_sees_abandoned_request() {
        let (responder, request) = OpenRequest::channel();
        assert!(!responder.is_abandoned());
        drop(request);
        assert!(responder.is_abandoned());
    }

    #[test]
    fn request_slot_is_shared_between_clones() {
        let request: Request<String> = Request::pending();
        let engine_side = request.clone();
        assert!(!request.is_ready());

        engine_side.fulfill("value".to_string());
        assert!(request.is_ready());
        assert_eq!(request.take().as_deref(), Some("value"));
        assert!(request.take().is_none());
    }
}
