/// mpv IPC driver backing the preview player.
///
/// ```text
///   MpvDriver::spawn_and_connect()
///         │
///         ├── writer_task   ← receives PendingRequest via mpsc, writes JSON lines
///         └── reader_task   ← reads JSON lines from the socket
///                                ├── reply (has request_id) → matched oneshot::Sender
///                                └── unsolicited event      → event_tx channel
/// ```
///
/// `MpvSink` wraps the driver as an `AudioSink`.  The process is spawned
/// lazily on the first `set_source`, and respawned if it has died since.
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use verse_proto::platform;

use crate::preview::AudioSink;

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

// ── global request-id counter ─────────────────────────────────────────────────

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>;

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line, already '\n'-terminated
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

/// An mpv event that arrived unsolicited (no request_id).
#[derive(Debug, Clone)]
pub struct MpvEvent {
    pub raw: Value,
}

impl MpvEvent {
    /// e.g. "end-file", "start-file", "file-loaded".
    pub fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }

    /// `Some(detail)` for an `end-file` event whose reason is `error`.
    pub fn load_error(&self) -> Option<String> {
        if self.event_name()? != "end-file" || self.raw.get("reason")?.as_str()? != "error" {
            return None;
        }
        Some(
            self.raw
                .get("file_error")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error")
                .to_string(),
        )
    }
}

// ── handle ────────────────────────────────────────────────────────────────────

/// Cloneable handle to the writer task.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
    /// Cancelled once either IO task has stopped.
    closed: CancellationToken,
}

impl MpvHandle {
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.tx.is_closed()
    }

    pub async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("mpv writer task gone"))?;

        tokio::time::timeout(REPLY_TIMEOUT, reply_rx)
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))?
            .map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", req_id))?
    }

    /// Load `url` without starting playback.
    pub async fn load_paused(&self, url: &str) -> anyhow::Result<()> {
        self.set_pause(true).await?;
        debug!("mpv: loadfile {}", url);
        self.send(json!(["loadfile", url, "replace"])).await?;
        Ok(())
    }

    pub async fn set_pause(&self, paused: bool) -> anyhow::Result<()> {
        self.send(json!(["set_property", "pause", paused])).await?;
        Ok(())
    }

    pub async fn quit(&self) {
        let _ = self.send(json!(["quit"])).await;
    }
}

fn volume_percent(vol: f32) -> f32 {
    (vol * 100.0).clamp(0.0, 100.0).round()
}

// ── driver ────────────────────────────────────────────────────────────────────

/// Owns the mpv child process.
pub struct MpvDriver {
    pub socket_name: String,
    process: Option<tokio::process::Child>,
    pub volume: f32,
}

impl MpvDriver {
    pub fn new(volume: f32) -> Self {
        Self {
            socket_name: platform::mpv_socket_name(),
            process: None,
            volume,
        }
    }

    pub fn process_alive(&mut self) -> bool {
        let Some(child) = self.process.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                match status.code() {
                    Some(code) => warn!("mpv process exited with code: {}", code),
                    None => warn!("mpv process terminated by signal"),
                }
                false
            }
            Err(e) => {
                warn!("mpv process_alive check failed: {}", e);
                false
            }
        }
    }

    pub async fn kill(&mut self) {
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }
        #[cfg(unix)]
        let _ = tokio::fs::remove_file(&self.socket_name).await;
    }

    fn spawn_process(&mut self) -> anyhow::Result<()> {
        let mpv_binary =
            platform::find_mpv_binary().ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;

        let stderr_path = platform::data_dir().join("mpv-stderr.log");
        if let Some(parent) = stderr_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let stderr_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&stderr_path)?;

        let child = tokio::process::Command::new(&mpv_binary)
            .arg("--no-video")
            .arg("--idle=yes")
            .arg("--quiet")
            .arg(platform::mpv_socket_arg(&self.socket_name))
            .arg(format!("--volume={}", volume_percent(self.volume)))
            .stdout(std::process::Stdio::null())
            .stderr(stderr_file)
            .kill_on_drop(true)
            .spawn()?;
        info!(
            "mpv: spawned {} pid={:?}, stderr -> {:?}",
            mpv_binary.display(),
            child.id(),
            stderr_path
        );
        self.process = Some(child);
        Ok(())
    }

    #[cfg(unix)]
    pub async fn spawn_and_connect(
        &mut self,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        self.kill().await;
        self.spawn_process()?;

        let socket_path = std::path::PathBuf::from(&self.socket_name);
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if socket_path.exists() {
                break;
            }
        }
        if !socket_path.exists() {
            anyhow::bail!("mpv IPC socket did not appear");
        }

        let stream = UnixStream::connect(&socket_path).await?;
        info!("mpv: connected to IPC socket");
        Ok(start_io_tasks(stream, event_tx))
    }

    #[cfg(windows)]
    pub async fn spawn_and_connect(
        &mut self,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        self.kill().await;
        self.spawn_process()?;

        let pipe_path = format!(r"\\.\pipe\{}", self.socket_name);
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if let Ok(client) = ClientOptions::new().open(&pipe_path) {
                info!("mpv: connected to named pipe");
                return Ok(start_io_tasks(client, event_tx));
            }
        }
        anyhow::bail!("mpv named pipe did not appear")
    }
}

fn start_io_tasks<S>(stream: S, event_tx: mpsc::Sender<MpvEvent>) -> MpvHandle
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

    let closed = CancellationToken::new();

    tokio::spawn(writer_task(write_half, cmd_rx, pending.clone(), closed.clone()));
    tokio::spawn(reader_task(BufReader::new(read_half), pending, event_tx, closed.clone()));

    MpvHandle { tx: cmd_tx, closed }
}

// ── reader task ───────────────────────────────────────────────────────────────

async fn fail_all(pending: &PendingMap, reason: &str) {
    let mut map = pending.lock().await;
    for (_, tx) in map.drain() {
        let _ = tx.send(Err(anyhow::anyhow!("{}", reason)));
    }
}

async fn reader_task<R>(
    mut reader: BufReader<R>,
    pending: PendingMap,
    event_tx: mpsc::Sender<MpvEvent>,
    closed: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let _closed = closed.drop_guard();
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                fail_all(&pending, "mpv IPC connection closed").await;
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                if let Some(req_id) = val.get("request_id").and_then(|v| v.as_u64()) {
                    let mut map = pending.lock().await;
                    let Some(tx) = map.remove(&req_id) else {
                        debug!("mpv reader: reply for unknown req={}", req_id);
                        continue;
                    };
                    let result = if val["error"].as_str() == Some("success") {
                        Ok(val)
                    } else {
                        let err = val["error"].as_str().unwrap_or("unknown error").to_string();
                        debug!("mpv reader: req={} err={}", req_id, err);
                        Err(anyhow::anyhow!("mpv error: {}", err))
                    };
                    let _ = tx.send(result);
                } else {
                    debug!("mpv reader: event {}", trimmed);
                    let _ = event_tx.send(MpvEvent { raw: val }).await;
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                fail_all(&pending, "mpv IPC read error").await;
                break;
            }
        }
    }
}

// ── writer task ───────────────────────────────────────────────────────────────

async fn writer_task<W>(
    mut writer: W,
    mut rx: mpsc::Receiver<PendingRequest>,
    pending: PendingMap,
    closed: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    let _closed = closed.drop_guard();
    while let Some(req) = rx.recv().await {
        // Register before writing so the reader can always match the reply.
        pending.lock().await.insert(req.req_id, req.reply);
        debug!("mpv writer: req={} payload={}", req.req_id, req.payload.trim());
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            if let Some(tx) = pending.lock().await.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}

// ── sink ──────────────────────────────────────────────────────────────────────

pub struct MpvSink {
    driver: MpvDriver,
    handle: Option<MpvHandle>,
    source: Option<String>,
    event_task: Option<JoinHandle<()>>,
}

impl MpvSink {
    pub fn new(volume: f32) -> Self {
        Self {
            driver: MpvDriver::new(volume),
            handle: None,
            source: None,
            event_task: None,
        }
    }

    /// The handle of a player that is still reachable, if any.
    fn live_handle(&self) -> Option<&MpvHandle> {
        self.handle.as_ref().filter(|handle| !handle.is_closed())
    }

    async fn connected(&mut self) -> anyhow::Result<MpvHandle> {
        if let Some(handle) = self.live_handle().cloned() {
            if self.driver.process_alive() {
                return Ok(handle);
            }
        }
        if self.handle.is_some() {
            warn!("mpv: player went away, respawning");
        }

        // A fresh process has nothing loaded.
        self.source = None;
        self.handle = None;
        if let Some(task) = self.event_task.take() {
            task.abort();
        }

        let (event_tx, event_rx) = mpsc::channel(64);
        let handle = self.driver.spawn_and_connect(event_tx).await?;
        self.event_task = Some(tokio::spawn(log_player_events(event_rx)));
        self.handle = Some(handle.clone());
        Ok(handle)
    }
}

async fn log_player_events(mut rx: mpsc::Receiver<MpvEvent>) {
    while let Some(event) = rx.recv().await {
        if let Some(err) = event.load_error() {
            warn!("preview: player could not play source: {}", err);
        }
    }
}

impl AudioSink for MpvSink {
    /// Nothing counts as bound once the player connection is gone.
    fn source(&self) -> Option<&str> {
        self.live_handle()?;
        self.source.as_deref()
    }

    async fn set_source(&mut self, url: &str) -> anyhow::Result<()> {
        let handle = self.connected().await?;
        self.source = None;
        handle.load_paused(url).await?;
        self.source = Some(url.to_string());
        Ok(())
    }

    async fn play(&mut self) -> anyhow::Result<()> {
        let Some(url) = self.source.clone() else {
            anyhow::bail!("no source loaded");
        };
        let handle = self.connected().await?;
        if self.source.is_none() {
            info!("mpv: reloading {} into respawned player", url);
            handle.load_paused(&url).await?;
            self.source = Some(url);
        }
        handle.set_pause(false).await
    }

    async fn pause(&mut self) -> anyhow::Result<()> {
        match self.live_handle() {
            Some(handle) => handle.set_pause(true).await,
            None => Ok(()),
        }
    }

    async fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take().filter(|handle| !handle.is_closed()) {
            handle.quit().await;
        }
        if let Some(task) = self.event_task.take() {
            task.abort();
        }
        self.driver.kill().await;
        self.source = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stand-in for the mpv side of the socket: answers every command with
    /// `error: success` and echoes an `end-file` error for "bad" urls.
    async fn fake_mpv<S>(stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut lines = BufReader::new(read_half).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let req: Value = serde_json::from_str(&line).unwrap();
            let id = req["request_id"].as_u64().unwrap();
            let command = &req["command"];
            let error = if command[0] == "get_property" {
                "property unavailable"
            } else {
                "success"
            };
            let reply = json!({ "request_id": id, "error": error, "data": null });
            write_half
                .write_all(format!("{}\n", reply).as_bytes())
                .await
                .unwrap();
            if command[0] == "loadfile" && command[1] == "bad" {
                let event = json!({ "event": "end-file", "reason": "error", "file_error": "unrecognized file format" });
                write_half
                    .write_all(format!("{}\n", event).as_bytes())
                    .await
                    .unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_replies_are_matched_and_events_forwarded() {
        let (client, server) = tokio::io::duplex(4096);
        tokio::spawn(fake_mpv(server));
        let (event_tx, mut event_rx) = mpsc::channel(8);
        let handle = start_io_tasks(client, event_tx);

        handle.load_paused("https://p.scdn.co/a").await.unwrap();
        handle.set_pause(false).await.unwrap();
        let err = handle
            .send(json!(["get_property", "path"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("property unavailable"));

        handle.load_paused("bad").await.unwrap();
        let event = event_rx.recv().await.unwrap();
        assert_eq!(event.event_name(), Some("end-file"));
        assert_eq!(event.load_error().as_deref(), Some("unrecognized file format"));
    }

    #[tokio::test]
    async fn test_pending_requests_fail_when_socket_closes() {
        let (client, server) = tokio::io::duplex(4096);
        let (event_tx, _event_rx) = mpsc::channel(8);
        let handle = start_io_tasks(client, event_tx);
        drop(server);
        assert!(handle.set_pause(true).await.is_err());
    }

    #[test]
    fn test_load_error_ignores_normal_end() {
        let eof = MpvEvent {
            raw: json!({ "event": "end-file", "reason": "eof" }),
        };
        assert_eq!(eof.load_error(), None);
        let other = MpvEvent {
            raw: json!({ "event": "file-loaded" }),
        };
        assert_eq!(other.load_error(), None);
    }

    #[test]
    fn test_volume_percent_clamps() {
        assert_eq!(volume_percent(0.5), 50.0);
        assert_eq!(volume_percent(1.7), 100.0);
        assert_eq!(volume_percent(-1.0), 0.0);
    }

    #[tokio::test]
    async fn test_sink_forgets_source_when_player_goes_away() {
        let (client, server) = tokio::io::duplex(4096);
        let server_task = tokio::spawn(fake_mpv(server));
        let (event_tx, _event_rx) = mpsc::channel(8);
        let handle = start_io_tasks(client, event_tx);

        let mut sink = MpvSink::new(0.5);
        sink.handle = Some(handle.clone());
        sink.source = Some("https://p.scdn.co/a".to_string());
        assert_eq!(sink.source(), Some("https://p.scdn.co/a"));
        assert!(sink.pause().await.is_ok());

        server_task.abort();
        tokio::time::timeout(Duration::from_secs(5), handle.closed.cancelled())
            .await
            .unwrap();
        assert!(handle.is_closed());

        // A re-hover of the same track must rebind instead of resuming.
        assert_eq!(sink.source(), None);
        assert!(sink.pause().await.is_ok());
    }

    #[tokio::test]
    async fn test_sink_without_player_pauses_quietly() {
        let mut sink = MpvSink::new(0.5);
        assert!(sink.pause().await.is_ok());
        assert!(sink.play().await.is_err());
        assert_eq!(sink.source(), None);
    }
}
