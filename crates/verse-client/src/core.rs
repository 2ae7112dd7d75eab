/// ClientCore: single-owner event loop for all coordination state.
///
/// The presentation layer sends `ClientEvent`s; search timers and request
/// completions come back on the coordinator's channel; the progress socket
/// reports on a per-connection channel.  ClientCore owns the gate, the
/// search coordinator, the preview controller and the live `ProgressChannel`
/// exclusively; no other task touches them.
///
/// After each change ClientCore writes the new snapshot into the
/// `StateManager` and sends `ClientUpdate::StateUpdated` on the broadcast
/// channel.
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use verse_proto::config::Config;
use verse_proto::state::{ChannelState, ClientState, SearchSnapshot, StateManager, View};

use crate::action::Action;
use crate::endpoints::Endpoints;
use crate::gate::SessionGate;
use crate::preview::{AudioPreviewController, AudioSink};
use crate::progress::{ChannelEvent, CloseDisposition, ProgressChannel};
use crate::search::{SearchBackend, SearchCoordinator, SearchEvent};

// ── events ────────────────────────────────────────────────────────────────────

/// All inputs from outside the core.
#[derive(Debug)]
pub enum ClientEvent {
    Action(Action),
    Shutdown,
}

/// Sent to every presentation listener.
#[derive(Debug, Clone)]
pub enum ClientUpdate {
    StateUpdated,
    Log(String),
}

// ── ClientCore ────────────────────────────────────────────────────────────────

pub struct ClientCore<B: SearchBackend, S: AudioSink> {
    endpoints: Endpoints,
    gate: SessionGate,
    state_manager: Arc<StateManager>,
    search: SearchCoordinator<B>,
    search_rx: mpsc::Receiver<SearchEvent>,
    preview: AudioPreviewController<S>,
    /// Live push channel.  `Some` only while the search view is active.
    channel: Option<ProgressChannel>,
    /// Events of the live channel; replaced together with it, so a previous
    /// connection can never report into the current one.
    channel_rx: Option<mpsc::Receiver<ChannelEvent>>,
    broadcast_tx: broadcast::Sender<ClientUpdate>,
    view: View,
}

impl<B: SearchBackend, S: AudioSink> ClientCore<B, S> {
    pub fn new(
        config: &Config,
        endpoints: Endpoints,
        gate: SessionGate,
        backend: Arc<B>,
        sink: S,
        broadcast_tx: broadcast::Sender<ClientUpdate>,
    ) -> Self {
        let (search_tx, search_rx) = mpsc::channel(64);
        let search = SearchCoordinator::new(backend, search_tx, &config.search);
        let state_manager = Arc::new(StateManager::new(ClientState::new(
            search.snapshot().clone(),
        )));

        Self {
            endpoints,
            gate,
            state_manager,
            search,
            search_rx,
            preview: AudioPreviewController::new(sink, config.preview.enabled),
            channel: None,
            channel_rx: None,
            broadcast_tx,
            view: View::Login,
        }
    }

    pub fn state_manager(&self) -> Arc<StateManager> {
        Arc::clone(&self.state_manager)
    }

    /// Run until `Shutdown`/`Quit`, or until every event sender is gone.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<ClientEvent>) -> anyhow::Result<()> {
        info!("ClientCore: starting event loop");
        self.sync_session().await;

        loop {
            tokio::select! {
                evt = event_rx.recv() => match evt {
                    None => {
                        info!("ClientCore: event channel closed, shutting down");
                        break;
                    }
                    Some(ClientEvent::Shutdown) | Some(ClientEvent::Action(Action::Quit)) => {
                        info!("ClientCore: shutdown requested");
                        break;
                    }
                    Some(ClientEvent::Action(action)) => {
                        debug!("ClientCore: action {:?}", action);
                        self.handle_action(action).await;
                    }
                },
                Some(evt) = self.search_rx.recv() => {
                    self.handle_search_event(evt).await;
                }
                evt = next_channel_event(&mut self.channel_rx) => match evt {
                    Some(evt) => self.handle_channel_event(evt).await,
                    None => {
                        debug!("ClientCore: progress channel task ended");
                        self.channel_rx = None;
                    }
                },
            }
        }

        self.cleanup().await;
        Ok(())
    }

    // ── actions ───────────────────────────────────────────────────────────────

    async fn handle_action(&mut self, action: Action) {
        match action {
            Action::SignIn(token) => {
                match self.gate.sign_in(&token) {
                    Ok(()) => info!("ClientCore: signed in"),
                    Err(e) => warn!("ClientCore: sign in failed: {}", e),
                }
                self.sync_session().await;
            }
            Action::SignOut => {
                if self.gate.revoke() {
                    info!("ClientCore: signed out");
                }
                self.sync_session().await;
            }
            Action::Quit => {}
            _ if self.view != View::Search => {
                debug!("ClientCore: ignoring {:?} while signed out", action);
            }
            Action::Query(text) => {
                self.search.submit_query(text);
                self.publish_search().await;
            }
            Action::SearchNow(text) => {
                self.search.submit_now(text);
                self.publish_search().await;
            }
            Action::Page(page) => {
                if self.search.change_display_page(page) {
                    self.publish_search().await;
                }
            }
            Action::Hover(row) => {
                let Some(track) = self.search.snapshot().items.get(row).cloned() else {
                    debug!("ClientCore: hover on empty row {}", row);
                    return;
                };
                self.preview.begin_preview(&track).await;
                self.publish_preview().await;
            }
            Action::Leave => {
                self.preview.end_preview().await;
                self.publish_preview().await;
            }
            Action::Reconnect => {
                info!("ClientCore: reconnecting progress channel");
                self.open_channel().await;
            }
        }
    }

    // ── search ────────────────────────────────────────────────────────────────

    async fn handle_search_event(&mut self, evt: SearchEvent) {
        let changed = match evt {
            SearchEvent::DebounceElapsed { ticket } => self.search.on_debounce_elapsed(ticket),
            SearchEvent::Finished {
                generation,
                outcome,
            } => self.search.apply(generation, outcome),
        };
        if changed {
            self.publish_search().await;
        }
    }

    // ── progress channel ──────────────────────────────────────────────────────

    async fn handle_channel_event(&mut self, evt: ChannelEvent) {
        match evt {
            ChannelEvent::Opened => {
                self.set_channel_state(ChannelState::Open).await;
            }
            ChannelEvent::Status(status) => {
                self.state_manager.set_progress(Some(status)).await;
                self.notify();
            }
            ChannelEvent::Completed => {
                if self.search.on_indexing_complete() {
                    self.publish_search().await;
                }
            }
            ChannelEvent::Closed { code, disposition } => {
                self.channel = None;
                self.channel_rx = None;
                self.set_channel_state(ChannelState::Disconnected).await;
                if disposition == CloseDisposition::RevokeSession {
                    info!("ClientCore: session rejected by server (code {:?})", code);
                    self.gate.revoke();
                    self.sync_session().await;
                }
            }
        }
    }

    async fn open_channel(&mut self) {
        self.close_channel();
        let (tx, rx) = mpsc::channel(64);
        let token = self.gate.token();
        match ProgressChannel::open(&self.endpoints.progress, token.as_deref(), tx) {
            Ok(channel) => {
                self.channel = Some(channel);
                self.channel_rx = Some(rx);
                self.set_channel_state(ChannelState::Connecting).await;
            }
            Err(e) => {
                warn!("ClientCore: could not open progress channel: {}", e);
                self.set_channel_state(ChannelState::Disconnected).await;
            }
        }
    }

    fn close_channel(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.close();
        }
        self.channel_rx = None;
    }

    // ── session ───────────────────────────────────────────────────────────────

    /// Re-evaluate the gate and enter or leave the search view accordingly.
    async fn sync_session(&mut self) {
        let view = self.gate.view();
        if view == self.view {
            return;
        }
        info!("ClientCore: view {:?} -> {:?}", self.view, view);
        self.view = view;

        match view {
            View::Search => {
                self.state_manager.set_view(view).await;
                self.open_channel().await;
            }
            View::Login => {
                self.close_channel();
                self.search.reset();
                self.preview.end_preview().await;
                self.state_manager.set_view(view).await;
                self.state_manager.set_progress(None).await;
                self.state_manager.set_channel(ChannelState::Disconnected).await;
                self.publish_preview().await;
                self.publish_search().await;
            }
        }
        self.notify();
    }

    // ── publishing ────────────────────────────────────────────────────────────

    async fn set_channel_state(&self, channel: ChannelState) {
        self.state_manager.set_channel(channel).await;
        self.notify();
    }

    async fn publish_search(&self) {
        let snapshot: SearchSnapshot = self.search.snapshot().clone();
        self.state_manager.set_search(snapshot).await;
        self.notify();
    }

    async fn publish_preview(&self) {
        self.state_manager
            .set_preview(self.preview.state().clone())
            .await;
        self.notify();
    }

    fn notify(&self) {
        // No listeners is fine.
        let _ = self.broadcast_tx.send(ClientUpdate::StateUpdated);
    }

    async fn cleanup(&mut self) {
        info!("ClientCore: cleaning up");
        self.close_channel();
        self.preview.shutdown().await;
    }
}

async fn next_channel_event(rx: &mut Option<mpsc::Receiver<ChannelEvent>>) -> Option<ChannelEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
