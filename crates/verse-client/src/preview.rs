//! Hover-driven audio preview over one shared player.

use std::future::Future;

use tracing::{debug, warn};
use verse_proto::protocol::Track;
use verse_proto::state::PreviewState;

/// The single playable resource shared by every result row.
pub trait AudioSink: Send + 'static {
    /// URL currently bound to the sink, if any.
    fn source(&self) -> Option<&str>;
    /// Bind a new URL without starting playback.
    fn set_source(&mut self, url: &str) -> impl Future<Output = anyhow::Result<()>> + Send;
    fn play(&mut self) -> impl Future<Output = anyhow::Result<()>> + Send;
    fn pause(&mut self) -> impl Future<Output = anyhow::Result<()>> + Send;
    fn shutdown(&mut self) -> impl Future<Output = ()> + Send;
}

pub struct AudioPreviewController<S: AudioSink> {
    sink: S,
    enabled: bool,
    state: PreviewState,
}

impl<S: AudioSink> AudioPreviewController<S> {
    pub fn new(sink: S, enabled: bool) -> Self {
        Self {
            sink,
            enabled,
            state: PreviewState::Idle,
        }
    }

    pub fn state(&self) -> &PreviewState {
        &self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Start playing `track`'s preview, rebinding the shared sink if it holds
    /// another track.  Tracks without a preview are ignored.  Failures are
    /// logged and never returned.
    pub async fn begin_preview(&mut self, track: &Track) {
        if !self.enabled {
            return;
        }
        let Some(url) = track.preview_url() else {
            debug!("preview: '{}' has no preview", track.spotify.name);
            return;
        };

        if self.sink.source() != Some(url) {
            debug!("preview: binding {}", url);
            if let Err(e) = self.sink.set_source(url).await {
                warn!("preview: could not load {}: {}", url, e);
                // Whatever was bound before must not keep playing.
                if let Err(e) = self.sink.pause().await {
                    debug!("preview: pause after failed load: {}", e);
                }
                self.state = self.paused_or_idle();
                return;
            }
        }

        match self.sink.play().await {
            Ok(()) => {
                self.state = PreviewState::Playing {
                    url: url.to_string(),
                };
            }
            Err(e) => {
                warn!("preview: play failed for {}: {}", url, e);
                self.state = PreviewState::Paused {
                    url: url.to_string(),
                };
            }
        }
    }

    /// Pause playback; the source stays bound for a quick resume.
    pub async fn end_preview(&mut self) {
        if self.sink.source().is_none() {
            self.state = PreviewState::Idle;
            return;
        }
        // A play that reported failure may still have started the sink.
        if let Err(e) = self.sink.pause().await {
            warn!("preview: pause failed: {}", e);
        }
        self.state = self.paused_or_idle();
    }

    pub async fn shutdown(&mut self) {
        self.sink.shutdown().await;
        self.state = PreviewState::Idle;
    }

    fn paused_or_idle(&self) -> PreviewState {
        match self.sink.source() {
            Some(url) => PreviewState::Paused {
                url: url.to_string(),
            },
            None => PreviewState::Idle,
        }
    }
}
