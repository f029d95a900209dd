use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header::CONTENT_LENGTH, HeaderMap, Method, StatusCode};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::error::{AppError, Result};

/// How long in-flight responses get to finish once the session ends.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenOutcome {
    /// The body of the first POST that carried a `Content-Length`.
    Received(String),
    /// Nothing arrived before the deadline. The remote run may still be going.
    TimedOut,
}

/// One-shot HTTP listener for the DiveCloud run callback.
///
/// The socket is bound by [`CallbackListener::bind`] so callers can register
/// the webhook and trigger the run knowing that an early callback will be
/// queued by the OS rather than refused.
pub struct CallbackListener {
    listener: TcpListener,
    addr: SocketAddr,
}

struct CallbackState {
    payload_tx: Mutex<Option<oneshot::Sender<String>>>,
}

impl CallbackListener {
    pub async fn bind(host: &str, port: u16) -> Result<Self> {
        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|e| AppError::Socket(format!("failed to bind {host}:{port}: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| AppError::Socket(format!("failed to read bound address: {e}")))?;

        Ok(Self { listener, addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve until the first valid POST arrives, `timeout` elapses or `cancel`
    /// fires. The socket is closed before this returns.
    pub async fn listen(self, timeout: Duration, cancel: &CancellationToken) -> Result<ListenOutcome> {
        let (payload_tx, payload_rx) = oneshot::channel();
        let state = Arc::new(CallbackState {
            payload_tx: Mutex::new(Some(payload_tx)),
        });

        let app = Router::new()
            .fallback(receive_callback)
            .layer(DefaultBodyLimit::disable())
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = axum::serve(self.listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        let task = ServerTask(Some(tokio::spawn(async move { server.await })));

        tracing::info!(addr = %self.addr, timeout_secs = timeout.as_secs(), "Listening for callback...");

        let outcome = tokio::select! {
            received = payload_rx => received
                .map(ListenOutcome::Received)
                .map_err(|_| AppError::Socket("callback server stopped unexpectedly".to_string())),
            _ = tokio::time::sleep(timeout) => Ok(ListenOutcome::TimedOut),
            _ = cancel.cancelled() => Err(AppError::Cancelled(
                "Listening for callback interrupted".to_string(),
            )),
        };

        let _ = shutdown_tx.send(());
        task.shutdown().await;

        tracing::debug!(addr = %self.addr, "Callback listener closed");
        outcome
    }
}

/// Owns the spawned server; aborting it drops the listening socket.
struct ServerTask(Option<JoinHandle<std::io::Result<()>>>);

impl ServerTask {
    async fn shutdown(mut self) {
        let Some(mut handle) = self.0.take() else {
            return;
        };

        match tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => tracing::warn!(error = %e, "Callback server exited with error"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Callback server task failed"),
            Err(_) => {
                tracing::warn!("Callback server did not drain in time, aborting");
                handle.abort();
                let _ = handle.await;
            }
        }
    }
}

impl Drop for ServerTask {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

async fn receive_callback(
    State(state): State<Arc<CallbackState>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    if method != Method::POST {
        tracing::debug!(method = %method, "Rejecting non-POST callback request");
        return (StatusCode::OK, "Accepts POST requests only");
    }

    if !headers.contains_key(CONTENT_LENGTH) {
        tracing::debug!("Rejecting callback without Content-Length");
        return (StatusCode::OK, "Content-Length required");
    }

    let payload = match String::from_utf8(body.to_vec()) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(bytes = body.len(), error = %e, "Rejecting callback with non-UTF-8 body");
            return (StatusCode::OK, "Payload must be UTF-8");
        }
    };

    let sender = state
        .payload_tx
        .lock()
        .ok()
        .and_then(|mut slot| slot.take());

    match sender {
        Some(tx) => {
            tracing::info!(bytes = payload.len(), "Received callback");
            let _ = tx.send(payload);
            (StatusCode::OK, "Accepted")
        }
        None => (StatusCode::OK, "Callback already received"),
    }
}
