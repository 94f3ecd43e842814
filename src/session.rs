//! Sandbox session
//!
//! A session owns one engine on a dedicated worker thread. Every handle
//! funnels its requests through [`Session::execute`], which queues them on a
//! bounded channel; the worker runs them one at a time, to completion, in
//! arrival order. Dropping a caller's future after the request was queued
//! does not cancel it.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::document::Document;
use crate::engine::{Engine, EngineError, Payload, PdfEngine, Request};
use crate::error::{Result, SandboxError};

/// Request plus its reply slot
struct Envelope {
    request: Request,
    reply: oneshot::Sender<std::result::Result<Payload, EngineError>>,
}

struct SessionInner {
    id: Uuid,
    config: SessionConfig,
    /// Taken on shutdown
    sender: Mutex<Option<mpsc::Sender<Envelope>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// Last allocated document number
    counter: AtomicU64,
}

/// Handle to one sandbox instance
///
/// Cheap to clone; all clones share the same engine and document counter.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("documents_opened", &self.inner.counter.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Start a session backed by the PDF engine
    pub fn start(config: SessionConfig) -> Result<Self> {
        Self::with_engine(PdfEngine::new(), config)
    }

    /// Start a session backed by any engine
    pub fn with_engine<E: Engine>(engine: E, config: SessionConfig) -> Result<Self> {
        let id = Uuid::new_v4();
        let (sender, receiver) = mpsc::channel(config.queue_depth.max(1));

        let worker = std::thread::Builder::new()
            .name(format!("sandbox-{}", &id.to_string()[..8]))
            .spawn(move || run_worker(id, engine, receiver))?;

        info!(session = %id, queue_depth = config.queue_depth, "Sandbox session started");

        Ok(Self {
            inner: Arc::new(SessionInner {
                id,
                config,
                sender: Mutex::new(Some(sender)),
                worker: Mutex::new(Some(worker)),
                counter: AtomicU64::new(0),
            }),
        })
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Allocate the next document number (1, 2, ...)
    pub fn next_document_id(&self) -> u64 {
        self.inner.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Run one request inside the sandbox
    pub async fn execute(&self, request: Request) -> Result<Payload> {
        let operation = request.name();
        let sender = self
            .inner
            .sender
            .lock()
            .clone()
            .ok_or(SandboxError::SessionTerminated)?;

        let (reply, response) = oneshot::channel();
        sender
            .send(Envelope { request, reply })
            .await
            .map_err(|_| SandboxError::SessionTerminated)?;
        drop(sender);

        response
            .await
            .map_err(|_| SandboxError::SessionTerminated)?
            .map_err(|e| SandboxError::Execution {
                operation,
                message: e.message,
            })
    }

    /// Run a request and decode its structured result
    pub async fn execute_json<T: DeserializeOwned>(&self, request: Request) -> Result<T> {
        let operation = request.name();
        match self.execute(request).await? {
            Payload::Json(value) => serde_json::from_value(value)
                .map_err(|source| SandboxError::Decode { operation, source }),
            other => Err(unexpected(operation, "json", &other)),
        }
    }

    /// Run a request that produces no value
    pub async fn execute_unit(&self, request: Request) -> Result<()> {
        let operation = request.name();
        match self.execute(request).await? {
            Payload::Unit => Ok(()),
            other => Err(unexpected(operation, "unit", &other)),
        }
    }

    /// Run a request that produces bytes
    pub async fn execute_bytes(&self, request: Request) -> Result<Vec<u8>> {
        let operation = request.name();
        match self.execute(request).await? {
            Payload::Bytes(bytes) => Ok(bytes),
            other => Err(unexpected(operation, "bytes", &other)),
        }
    }

    fn allocate(&self) -> (String, String) {
        let n = self.next_document_id();
        (
            format!("{}{}", self.inner.config.doc_prefix, n),
            format!("{}{}", self.inner.config.vfs_prefix, n),
        )
    }

    /// Stage `bytes` in the virtual filesystem and open them
    pub async fn open_document_from_bytes(&self, bytes: Vec<u8>) -> Result<Document> {
        let (name, path) = self.allocate();
        let size = bytes.len();

        self.execute_unit(Request::WriteFile {
            path: path.clone(),
            data: bytes,
        })
        .await?;

        if let Err(e) = self
            .execute_unit(Request::OpenDocument {
                name: name.clone(),
                path: path.clone(),
            })
            .await
        {
            if let Err(cleanup) = self.execute_unit(Request::RemoveFile { path }).await {
                warn!(document = %name, error = %cleanup, "Failed to remove staged file");
            }
            return Err(e);
        }

        info!(session = %self.inner.id, document = %name, size, "Opened document");
        Ok(Document::new(self.clone(), name, Some(path)))
    }

    /// Create a new empty document with no backing file
    pub async fn create_empty_document(&self) -> Result<Document> {
        let (name, _) = self.allocate();
        self.execute_unit(Request::CreateDocument { name: name.clone() })
            .await?;

        info!(session = %self.inner.id, document = %name, "Created document");
        Ok(Document::new(self.clone(), name, None))
    }

    /// Stop accepting requests and wait for the worker to drain the queue
    pub async fn shutdown(&self) {
        drop(self.inner.sender.lock().take());
        let worker = self.inner.worker.lock().take();
        if let Some(worker) = worker {
            match tokio::task::spawn_blocking(move || worker.join()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => warn!(session = %self.inner.id, "Sandbox worker panicked"),
                Err(e) => warn!(session = %self.inner.id, error = %e, "Failed to join sandbox worker"),
            }
        }
        info!(session = %self.inner.id, "Sandbox session shut down");
    }
}

fn unexpected(operation: &'static str, expected: &str, payload: &Payload) -> SandboxError {
    SandboxError::Execution {
        operation,
        message: format!("expected {expected} result, got {}", payload.kind()),
    }
}

fn run_worker<E: Engine>(session: Uuid, mut engine: E, mut receiver: mpsc::Receiver<Envelope>) {
    let span = tracing::info_span!("sandbox", %session);
    let _guard = span.enter();
    debug!("Sandbox worker running");

    while let Some(Envelope { request, reply }) = receiver.blocking_recv() {
        let operation = request.name();
        debug!(operation, "Executing request");

        let result = panic::catch_unwind(AssertUnwindSafe(|| engine.handle(request)))
            .unwrap_or_else(|cause| {
                warn!(operation, "Engine panicked");
                Err(EngineError::new(format!("engine panicked: {}", panic_message(&*cause))))
            });
        match &result {
            Ok(payload) => debug!(operation, payload = payload.kind(), "Request completed"),
            Err(e) => debug!(operation, error = %e, "Request failed"),
        }

        // The caller may have stopped waiting
        let _ = reply.send(result);
    }

    debug!("Sandbox worker stopped");
}

fn panic_message(cause: &(dyn Any + Send)) -> &str {
    cause
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| cause.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Records requests and fails on `RemoveFile`
    struct RecordingEngine {
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Engine for RecordingEngine {
        fn handle(&mut self, request: Request) -> std::result::Result<Payload, EngineError> {
            let name = request.name();
            self.log.lock().push(name);
            match request {
                Request::RemoveFile { .. } => Err(EngineError::new("boom")),
                Request::IsEncrypted { .. } => panic!("corrupt xref table"),
                Request::PageCount { .. } => {
                    std::thread::sleep(Duration::from_millis(5));
                    Ok(Payload::Json(serde_json::json!(3)))
                }
                Request::Save { .. } => Ok(Payload::Bytes(vec![1, 2])),
                _ => Ok(Payload::Unit),
            }
        }
    }

    fn recording_session() -> (Session, Arc<Mutex<Vec<&'static str>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let session = Session::with_engine(
            RecordingEngine { log: log.clone() },
            SessionConfig::default(),
        )
        .unwrap();
        (session, log)
    }

    #[tokio::test]
    async fn test_document_names_are_unique() {
        let (session, _) = recording_session();
        let a = session.create_empty_document().await.unwrap();
        let b = session.create_empty_document().await.unwrap();
        assert_eq!(a.name(), "_doc1");
        assert_eq!(b.name(), "_doc2");

        let c = session.open_document_from_bytes(vec![0]).await.unwrap();
        assert_eq!(c.name(), "_doc3");
        assert_eq!(c.path(), Some("/input_3"));
    }

    #[tokio::test]
    async fn test_concurrent_allocation_never_collides() {
        let (session, _) = recording_session();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let session = session.clone();
            handles.push(tokio::spawn(async move { session.next_document_id() }));
        }
        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 16);
    }

    #[tokio::test]
    async fn test_execution_error_names_operation() {
        let (session, _) = recording_session();
        let err = session
            .execute(Request::RemoveFile { path: "/x".into() })
            .await
            .unwrap_err();
        match err {
            SandboxError::Execution { operation, message } => {
                assert_eq!(operation, "remove_file");
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_typed_results() {
        let (session, _) = recording_session();
        let count: usize = session
            .execute_json(Request::PageCount { name: "d".into() })
            .await
            .unwrap();
        assert_eq!(count, 3);

        let decode = session
            .execute_json::<String>(Request::PageCount { name: "d".into() })
            .await;
        assert!(matches!(decode, Err(SandboxError::Decode { operation: "page_count", .. })));

        let wrong = session
            .execute_bytes(Request::CreateDocument { name: "d".into() })
            .await;
        assert!(matches!(wrong, Err(SandboxError::Execution { .. })));
    }

    #[tokio::test]
    async fn test_requests_run_in_arrival_order() {
        let (session, log) = recording_session();
        for _ in 0..4 {
            session
                .execute(Request::PageCount { name: "d".into() })
                .await
                .unwrap();
            session
                .execute(Request::IsPdf { name: "d".into() })
                .await
                .unwrap();
        }
        let log = log.lock().clone();
        assert_eq!(log.len(), 8);
        for pair in log.chunks(2) {
            assert_eq!(pair, ["page_count", "is_pdf"]);
        }
    }

    #[tokio::test]
    async fn test_failed_open_cleans_up_staged_file() {
        let session = Session::start(SessionConfig::default()).unwrap();
        let err = session
            .open_document_from_bytes(b"not a pdf".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Execution { operation: "open_document", .. }));

        // The staged file was removed, so removing it again fails
        let again = session
            .execute(Request::RemoveFile {
                path: "/input_1".into(),
            })
            .await;
        assert!(again.is_err());
    }

    #[tokio::test]
    async fn test_engine_panic_fails_only_that_request() {
        let (session, log) = recording_session();
        let err = session
            .execute(Request::IsEncrypted { name: "d".into() })
            .await
            .unwrap_err();
        match err {
            SandboxError::Execution { operation, message } => {
                assert_eq!(operation, "is_encrypted");
                assert!(message.contains("corrupt xref table"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }

        // The worker survives and keeps serving
        let count: usize = session
            .execute_json(Request::PageCount { name: "d".into() })
            .await
            .unwrap();
        assert_eq!(count, 3);
        assert_eq!(log.lock().as_slice(), ["is_encrypted", "page_count"]);
    }

    #[tokio::test]
    async fn test_shutdown_terminates_session() {
        let (session, _) = recording_session();
        session.shutdown().await;
        let err = session
            .execute(Request::IsPdf { name: "d".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::SessionTerminated));
    }
}
