use crate::protocol::{ProgressStatus, Track};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Which top-level view the session gate selects.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Login,
    Search,
}

/// Lifecycle of the progress channel.
///
/// Transitions:
///   Disconnected -> Connecting -> Open -> Disconnected
///   Connecting -> Disconnected (connect failed)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Disconnected,
    Connecting,
    Open,
}

/// What the shared preview player is doing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PreviewState {
    #[default]
    Idle,
    Playing { url: String },
    Paused { url: String },
}

impl PreviewState {
    /// URL currently audible, if any.
    pub fn audible_url(&self) -> Option<&str> {
        match self {
            PreviewState::Playing { url } => Some(url),
            _ => None,
        }
    }

    pub fn bound_url(&self) -> Option<&str> {
        match self {
            PreviewState::Idle => None,
            PreviewState::Playing { url } | PreviewState::Paused { url } => Some(url),
        }
    }
}

/// How the result list should be presented.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ResultStatus {
    /// No response has been applied yet.
    NotSearched,
    Loaded,
    NoResults,
    /// The last live request failed; items are empty and total is zero.
    Failed,
}

/// Render-ready view of the search coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchSnapshot {
    pub query: String,
    /// 0-based.
    pub page_index: usize,
    pub page_size: usize,
    pub total: u64,
    pub items: Vec<Track>,
    pub failed: bool,
    pub searched: bool,
    pub loading: bool,
}

impl SearchSnapshot {
    pub fn new(query: impl Into<String>, page_size: usize) -> Self {
        Self {
            query: query.into(),
            page_index: 0,
            page_size: page_size.max(1),
            total: 0,
            items: Vec::new(),
            failed: false,
            searched: false,
            loading: false,
        }
    }

    /// `ceil(total / page_size)`.
    pub fn page_count(&self) -> usize {
        page_count(self.total, self.page_size)
    }

    /// 1-based page number for display.
    pub fn display_page(&self) -> usize {
        self.page_index + 1
    }

    pub fn show_pagination(&self) -> bool {
        self.page_count() > 1
    }

    pub fn status(&self) -> ResultStatus {
        if self.failed {
            ResultStatus::Failed
        } else if !self.searched {
            ResultStatus::NotSearched
        } else if self.items.is_empty() {
            ResultStatus::NoResults
        } else {
            ResultStatus::Loaded
        }
    }
}

pub fn page_count(total: u64, page_size: usize) -> usize {
    let page_size = page_size.max(1) as u64;
    total.div_ceil(page_size) as usize
}

/// Everything the presentation layer needs to draw a frame.  `rev` is a
/// monotonically increasing counter bumped on every change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientState {
    pub rev: u64,
    pub view: View,
    pub channel: ChannelState,
    pub progress: Option<ProgressStatus>,
    pub search: SearchSnapshot,
    pub preview: PreviewState,
}

impl ClientState {
    pub fn new(search: SearchSnapshot) -> Self {
        Self {
            rev: 0,
            view: View::Login,
            channel: ChannelState::Disconnected,
            progress: None,
            search,
            preview: PreviewState::Idle,
        }
    }

    /// The indexing progress bar is shown only while indexing is under way.
    pub fn progress_visible(&self) -> bool {
        self.progress.as_ref().is_some_and(|p| !p.complete)
    }
}

pub struct StateManager {
    state: Arc<RwLock<ClientState>>,
}

impl StateManager {
    pub fn new(initial: ClientState) -> Self {
        Self {
            state: Arc::new(RwLock::new(initial)),
        }
    }

    pub async fn get_state(&self) -> ClientState {
        self.state.read().await.clone()
    }

    pub async fn rev(&self) -> u64 {
        self.state.read().await.rev
    }

    pub async fn set_view(&self, view: View) {
        let mut state = self.state.write().await;
        state.view = view;
        state.rev += 1;
    }

    pub async fn set_channel(&self, channel: ChannelState) {
        let mut state = self.state.write().await;
        state.channel = channel;
        state.rev += 1;
    }

    pub async fn set_progress(&self, progress: Option<ProgressStatus>) {
        let mut state = self.state.write().await;
        state.progress = progress;
        state.rev += 1;
    }

    pub async fn set_search(&self, search: SearchSnapshot) {
        let mut state = self.state.write().await;
        state.search = search;
        state.rev += 1;
    }

    pub async fn set_preview(&self, preview: PreviewState) {
        let mut state = self.state.write().await;
        state.preview = preview;
        state.rev += 1;
    }
}
