//! One-shot HTTP listener for the OAuth redirect.
//!
//! The listener answers requests until one for the redirect path carries a
//! `code` with the expected `state`, hands the code over once and stops.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{Query, State},
    http::{StatusCode, Uri},
    response::Html,
    routing::get,
};
use serde::Deserialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Time the listener gets to flush the final response before it is dropped.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("failed to bind callback listener: {0}")]
    Bind(#[source] std::io::Error),

    #[error("authorization denied: {0}")]
    Denied(String),

    #[error("callback listener stopped before a code arrived")]
    Closed,
}

/// Query Twitch appends to the redirect: `?code=..&state=..` or
/// `?error=..&error_description=..&state=..`.
#[derive(Debug, Default, Deserialize)]
struct AuthQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Callback {
    Code(String),
    Denied(String),
    /// Request the listener answers but keeps waiting after.
    Ignored { status: StatusCode, reason: String },
}

type Outcome = Result<String, CallbackError>;

#[derive(Clone)]
struct CallbackState {
    expected_state: Arc<str>,
    done_tx: Arc<Mutex<Option<oneshot::Sender<Outcome>>>>,
}

pub struct CallbackServer {
    listener: TcpListener,
    path: String,
}

impl CallbackServer {
    /// Binds the host and port of `redirect_uri` and serves its path.
    pub async fn bind(redirect_uri: &str) -> Result<Self, CallbackError> {
        let url = Url::parse(redirect_uri).map_err(|e| {
            CallbackError::Bind(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;
        let host = url.host_str().unwrap_or("localhost");
        let port = url.port_or_known_default().unwrap_or(80);

        let listener = TcpListener::bind((host, port))
            .await
            .map_err(CallbackError::Bind)?;

        Ok(Self {
            listener,
            path: url.path().to_string(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves in the background until a code with `state` arrives.
    pub fn spawn(self, state: String) -> PendingCode {
        let (done_tx, done_rx) = oneshot::channel();
        let shutdown = CancellationToken::new();

        let app = Router::new()
            .route(&self.path, get(handle_callback))
            .fallback(not_found)
            .with_state(CallbackState {
                expected_state: state.into(),
                done_tx: Arc::new(Mutex::new(Some(done_tx))),
            });

        info!("waiting for OAuth redirect on {}", self.path);
        let signal = shutdown.clone().cancelled_owned();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(self.listener, app)
                .with_graceful_shutdown(signal)
                .await
            {
                warn!("callback listener failed: {}", e);
            }
            debug!("callback listener stopped");
        });

        PendingCode {
            rx: done_rx,
            handle,
            shutdown,
        }
    }
}

/// The code the callback listener will deliver exactly once.
pub struct PendingCode {
    rx: oneshot::Receiver<Outcome>,
    handle: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl PendingCode {
    pub async fn wait(mut self) -> Result<String, CallbackError> {
        let result = (&mut self.rx).await.unwrap_or(Err(CallbackError::Closed));

        self.shutdown.cancel();
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut self.handle).await.is_err() {
            self.handle.abort();
        }
        result
    }
}

async fn handle_callback(
    State(state): State<CallbackState>,
    Query(query): Query<AuthQuery>,
) -> (StatusCode, Html<String>) {
    let callback = classify(&query, &state.expected_state);

    let (status, body, outcome) = match callback {
        Callback::Code(code) => (
            StatusCode::OK,
            "Authorization complete. You can close this tab.".to_string(),
            Ok(code),
        ),
        Callback::Denied(reason) => (
            StatusCode::BAD_REQUEST,
            format!("Authorization failed: {reason}"),
            Err(CallbackError::Denied(reason)),
        ),
        Callback::Ignored { status, reason } => {
            debug!("ignored callback request ({}): {}", status, reason);
            return (status, page(&reason));
        }
    };

    if let Some(tx) = state.done_tx.lock().await.take() {
        let _ = tx.send(outcome);
    }

    (status, page(&body))
}

async fn not_found(uri: Uri) -> (StatusCode, Html<String>) {
    debug!("ignored callback request for {}", uri.path());
    (StatusCode::NOT_FOUND, page(&format!("no route for {}", uri.path())))
}

fn page(message: &str) -> Html<String> {
    Html(format!("<html><body><h1>{message}</h1></body></html>"))
}

fn classify(query: &AuthQuery, expected_state: &str) -> Callback {
    if let Some(error) = &query.error {
        let description = query.error_description.as_deref().unwrap_or_default();
        return Callback::Denied(format!("{error} {description}").trim().to_string());
    }

    let Some(code) = &query.code else {
        return Callback::Ignored {
            status: StatusCode::BAD_REQUEST,
            reason: "no code in request".to_string(),
        };
    };

    if query.state.as_deref() != Some(expected_state) {
        return Callback::Ignored {
            status: StatusCode::BAD_REQUEST,
            reason: "state mismatch".to_string(),
        };
    }

    Callback::Code(code.clone())
}
