//! Indexing progress push channel.
//!
//! One WebSocket per authenticated session.  The socket task owns the
//! connection and reports everything it sees as `ChannelEvent`s; the handle
//! only exposes lifecycle (`state`, `ready`, `close`).

use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use verse_proto::protocol::{ProgressStatus, CLOSE_INVALID_SESSION, SESSION_COOKIE};
use verse_proto::state::ChannelState;

use crate::error::{ClientError, Result};

// ── events ────────────────────────────────────────────────────────────────────

/// What a close code means for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDisposition {
    /// The server rejected the session token.
    RevokeSession,
    Disconnect,
}

impl CloseDisposition {
    pub fn from_code(code: Option<u16>) -> Self {
        match code {
            Some(CLOSE_INVALID_SESSION) => CloseDisposition::RevokeSession,
            _ => CloseDisposition::Disconnect,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Opened,
    Status(ProgressStatus),
    /// Indexing just finished.  Raised once per incomplete -> complete edge.
    Completed,
    /// The connection is gone (closed by the server, failed, or never opened).
    Closed {
        code: Option<u16>,
        disposition: CloseDisposition,
    },
}

// ── edge detection ────────────────────────────────────────────────────────────

/// Latest-wins progress status plus completion edge detection.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    latest: Option<ProgressStatus>,
}

impl ProgressTracker {
    /// Record a status.  Returns `true` if this status completes indexing
    /// after an incomplete (or not yet seen) one.
    pub fn observe(&mut self, status: ProgressStatus) -> bool {
        let was_complete = self.latest.as_ref().is_some_and(|s| s.complete);
        let edge = status.complete && !was_complete;
        self.latest = Some(status);
        edge
    }

    pub fn latest(&self) -> Option<&ProgressStatus> {
        self.latest.as_ref()
    }
}

pub fn parse_status(text: &str) -> Option<ProgressStatus> {
    match serde_json::from_str::<ProgressStatus>(text) {
        Ok(status) => Some(status),
        Err(e) => {
            warn!("progress: dropping malformed message '{}': {}", text, e);
            None
        }
    }
}

// ── handle ────────────────────────────────────────────────────────────────────

pub struct ProgressChannel {
    state_rx: watch::Receiver<ChannelState>,
    cancel: CancellationToken,
}

impl ProgressChannel {
    /// Start connecting to `endpoint`, presenting `token` as the session
    /// cookie.  Returns immediately; progress arrives on `events`.
    pub fn open(
        endpoint: &Url,
        token: Option<&str>,
        events: mpsc::Sender<ChannelEvent>,
    ) -> Result<Self> {
        let request = build_request(endpoint, token)?;
        let (state_tx, state_rx) = watch::channel(ChannelState::Connecting);
        let cancel = CancellationToken::new();

        info!("progress: connecting to {}", endpoint);
        tokio::spawn(run_channel(request, state_tx, events, cancel.clone()));

        Ok(Self { state_rx, cancel })
    }

    pub fn state(&self) -> ChannelState {
        *self.state_rx.borrow()
    }

    /// Resolves once the connection has left `Connecting`: `true` if it is
    /// open, `false` if it closed (or failed) first.
    pub async fn ready(&self) -> bool {
        let mut rx = self.state_rx.clone();
        let open = match rx.wait_for(|state| *state != ChannelState::Connecting).await {
            Ok(state) => *state == ChannelState::Open,
            Err(_) => false,
        };
        open
    }

    /// Tear the connection down.  No `Closed` event is emitted for a close
    /// the owner asked for.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for ProgressChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn build_request(endpoint: &Url, token: Option<&str>) -> Result<Request> {
    let mut request = endpoint.as_str().into_client_request()?;
    if let Some(token) = token {
        let cookie = HeaderValue::from_str(&format!("{}={}", SESSION_COOKIE, token))
            .map_err(|_| ClientError::InvalidToken)?;
        request.headers_mut().insert(COOKIE, cookie);
    }
    Ok(request)
}

// ── socket task ───────────────────────────────────────────────────────────────

async fn run_channel(
    request: Request,
    state_tx: watch::Sender<ChannelState>,
    events: mpsc::Sender<ChannelEvent>,
    cancel: CancellationToken,
) {
    let connect = tokio::select! {
        _ = cancel.cancelled() => {
            state_tx.send_replace(ChannelState::Disconnected);
            return;
        }
        result = tokio_tungstenite::connect_async(request) => result,
    };

    let mut ws = match connect {
        Ok((ws, _)) => ws,
        Err(e) => {
            warn!("progress: connect failed: {}", e);
            state_tx.send_replace(ChannelState::Disconnected);
            let _ = events
                .send(ChannelEvent::Closed {
                    code: None,
                    disposition: CloseDisposition::Disconnect,
                })
                .await;
            return;
        }
    };

    info!("progress: channel open");
    state_tx.send_replace(ChannelState::Open);
    let _ = events.send(ChannelEvent::Opened).await;

    let mut tracker = ProgressTracker::default();
    let code = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("progress: closing on request");
                let _ = ws.close(None).await;
                state_tx.send_replace(ChannelState::Disconnected);
                return;
            }
            msg = ws.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let Some(status) = parse_status(&text) else {
                        continue;
                    };
                    debug!(
                        "progress: {} {}/{} complete={}",
                        status.text, status.n, status.total, status.complete
                    );
                    let completed = tracker.observe(status.clone());
                    let _ = events.send(ChannelEvent::Status(status)).await;
                    if completed {
                        info!("progress: indexing complete");
                        let _ = events.send(ChannelEvent::Completed).await;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    break frame.map(|f| u16::from(f.code));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    debug!("progress: ignoring {} byte binary message", bytes.len());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("progress: socket error: {}", e);
                    break None;
                }
                None => break None,
            }
        }
    };

    let disposition = CloseDisposition::from_code(code);
    info!("progress: channel closed code={:?} ({:?})", code, disposition);
    state_tx.send_replace(ChannelState::Disconnected);
    let _ = events.send(ChannelEvent::Closed { code, disposition }).await;
}
