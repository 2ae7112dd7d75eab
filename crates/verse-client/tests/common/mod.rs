//! Local stand-in for the versefind API server.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{header::COOKIE, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use verse_client::preview::AudioSink;

pub const GOOD_TOKEN: &str = "good-session";
pub const TOTAL: usize = 45;

#[derive(Default)]
pub struct Recorder {
    pub searches: Mutex<Vec<HashMap<String, String>>>,
    pub cookies: Mutex<Vec<Option<String>>>,
    pub sockets: AtomicUsize,
}

impl Recorder {
    pub fn searches(&self) -> Vec<HashMap<String, String>> {
        self.searches.lock().unwrap().clone()
    }

    pub fn sockets(&self) -> usize {
        self.sockets.load(Ordering::SeqCst)
    }
}

pub async fn spawn_server() -> (SocketAddr, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let app = Router::new()
        .route("/search", get(search))
        .route("/ws", get(progress))
        .route("/bye", get(bye))
        .with_state(recorder.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, recorder)
}

fn cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get(COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn authorized(headers: &HeaderMap) -> bool {
    cookie(headers).as_deref() == Some(format!("session={}", GOOD_TOKEN).as_str())
}

pub fn track_json(name: &str, preview: Option<&str>) -> Value {
    json!({
        "spotify": {
            "id": name,
            "name": name,
            "artists": [{ "name": "Test Artist" }],
            "album": { "name": "Album", "images": [] },
            "external_urls": { "spotify": format!("https://open.spotify.com/track/{}", name) },
            "preview_url": preview,
            "popularity": 12
        },
        "lyrics": "la la la"
    })
}

async fn search(
    State(recorder): State<Arc<Recorder>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    recorder.searches.lock().unwrap().push(params.clone());
    recorder.cookies.lock().unwrap().push(cookie(&headers));

    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let query = params.get("q").cloned().unwrap_or_default();
    let offset: usize = params.get("offset").and_then(|v| v.parse().ok()).unwrap_or(0);
    let limit: usize = params.get("limit").and_then(|v| v.parse().ok()).unwrap_or(20);

    match query.as_str() {
        "explode" => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        "none" => Json(json!({ "total": 0, "results": null })).into_response(),
        _ => {
            let end = TOTAL.min(offset + limit);
            let results: Vec<Value> = (offset..end)
                .map(|i| {
                    let preview = format!("https://p.scdn.co/mp3-preview/{}", i);
                    track_json(&format!("{} #{}", query, i), Some(&preview))
                })
                .collect();
            Json(json!({ "total": TOTAL, "results": results })).into_response()
        }
    }
}

async fn progress(
    State(recorder): State<Arc<Recorder>>,
    ws: WebSocketUpgrade,
    headers: HeaderMap,
) -> Response {
    recorder.sockets.fetch_add(1, Ordering::SeqCst);
    let authorized = authorized(&headers);
    ws.on_upgrade(move |socket| indexing_socket(socket, authorized))
}

/// Reports two steps of indexing (and one bit of garbage), then stays open
/// until the client leaves.  Unauthorised clients are closed with 4000.
async fn indexing_socket(mut socket: WebSocket, authorized: bool) {
    if !authorized {
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: 4000,
                reason: "invalid session".into(),
            })))
            .await;
        return;
    }

    let messages = [
        json!({ "text": "Indexing Spotify", "n": 1, "total": 2, "complete": false }).to_string(),
        "{not json".to_string(),
        json!({ "text": "Indexing Spotify", "n": 2, "total": 2, "complete": true }).to_string(),
    ];
    for text in messages {
        if socket.send(Message::Text(text)).await.is_err() {
            return;
        }
    }
    while let Some(Ok(_)) = socket.recv().await {}
}

async fn bye(State(recorder): State<Arc<Recorder>>, ws: WebSocketUpgrade) -> Response {
    recorder.sockets.fetch_add(1, Ordering::SeqCst);
    ws.on_upgrade(|mut socket| async move {
        let status = json!({ "text": "Indexing Spotify", "n": 0, "total": 3, "complete": false });
        let _ = socket.send(Message::Text(status.to_string())).await;
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: 1001,
                reason: "going away".into(),
            })))
            .await;
    })
}

/// Sink that only remembers what it was told.
#[derive(Default)]
pub struct SilentSink {
    source: Option<String>,
    pub playing: bool,
}

impl AudioSink for SilentSink {
    fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    async fn set_source(&mut self, url: &str) -> anyhow::Result<()> {
        self.source = Some(url.to_string());
        self.playing = false;
        Ok(())
    }

    async fn play(&mut self) -> anyhow::Result<()> {
        self.playing = true;
        Ok(())
    }

    async fn pause(&mut self) -> anyhow::Result<()> {
        self.playing = false;
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.playing = false;
    }
}
