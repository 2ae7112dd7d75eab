//! Debounced, paginated search with stale-response protection.
//!
//! Every request the coordinator issues is tagged with a generation number.
//! Responses come back through the `SearchEvent` channel in whatever order the
//! transport delivers them; only the response whose generation matches the
//! most recently issued request is applied to the visible result set.
//!
//! Typing goes through a debounce timer: each keystroke aborts the pending
//! timer task and starts a new one.  Timers also carry a ticket so that a
//! timer which fired just before being replaced cannot issue a request.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::COOKIE;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;
use verse_proto::config::{SearchConfig, ServerConfig};
use verse_proto::protocol::{SearchRequest, SearchResponse, SESSION_COOKIE};
use verse_proto::session::SessionStore;
use verse_proto::state::SearchSnapshot;

use crate::error::{ClientError, Result};

/// Something that can answer a `SearchRequest`.
pub trait SearchBackend: Send + Sync + 'static {
    fn search(&self, request: SearchRequest) -> impl Future<Output = Result<SearchResponse>> + Send;
}

/// `GET /search?q=&offset=&limit=` against the versefind API, authenticated
/// with the stored session cookie.
pub struct HttpSearchBackend {
    client: reqwest::Client,
    url: Url,
    session: SessionStore,
}

impl HttpSearchBackend {
    pub fn new(url: Url, server: &ServerConfig, session: SessionStore) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(server.request_timeout())
            .build()?;
        Ok(Self {
            client,
            url,
            session,
        })
    }
}

impl SearchBackend for HttpSearchBackend {
    async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        let mut builder = self
            .client
            .get(self.url.clone())
            .query(&request.query_pairs());
        if let Some(token) = self.session.token() {
            builder = builder.header(COOKIE, format!("{}={}", SESSION_COOKIE, token));
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(ClientError::Status(response.status()));
        }
        Ok(response.json::<SearchResponse>().await?)
    }
}

/// Completions flowing back into the owner's event loop.
#[derive(Debug)]
pub enum SearchEvent {
    /// A debounce timer ran out.
    DebounceElapsed { ticket: u64 },
    /// A request finished, successfully or not.
    Finished {
        generation: u64,
        outcome: Result<SearchResponse>,
    },
}

struct PendingDebounce {
    ticket: u64,
    handle: JoinHandle<()>,
}

pub struct SearchCoordinator<B: SearchBackend> {
    backend: Arc<B>,
    events: mpsc::Sender<SearchEvent>,
    debounce: Duration,
    default_query: String,
    snapshot: SearchSnapshot,
    /// Generation of the most recently issued request.
    generation: u64,
    next_ticket: u64,
    pending: Option<PendingDebounce>,
}

impl<B: SearchBackend> SearchCoordinator<B> {
    pub fn new(backend: Arc<B>, events: mpsc::Sender<SearchEvent>, config: &SearchConfig) -> Self {
        Self {
            backend,
            events,
            debounce: config.debounce(),
            default_query: config.default_query.clone(),
            snapshot: SearchSnapshot::new(
                config.default_query.clone(),
                config.effective_page_size(),
            ),
            generation: 0,
            next_ticket: 0,
            pending: None,
        }
    }

    pub fn snapshot(&self) -> &SearchSnapshot {
        &self.snapshot
    }

    pub fn query(&self) -> &str {
        &self.snapshot.query
    }

    pub fn page_index(&self) -> usize {
        self.snapshot.page_index
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn has_results(&self) -> bool {
        !self.snapshot.items.is_empty()
    }

    pub fn is_loading(&self) -> bool {
        self.snapshot.loading
    }

    pub fn has_pending_debounce(&self) -> bool {
        self.pending.is_some()
    }

    /// Record new query text and (re)start the debounce timer.  Only the last
    /// call inside the window results in a request.
    pub fn submit_query(&mut self, text: impl Into<String>) {
        self.snapshot.query = text.into();
        self.cancel_debounce();

        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let delay = self.debounce;
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(SearchEvent::DebounceElapsed { ticket }).await;
        });
        self.pending = Some(PendingDebounce { ticket, handle });
    }

    /// Search immediately (enter key), skipping the debounce window.
    pub fn submit_now(&mut self, text: impl Into<String>) -> u64 {
        self.snapshot.query = text.into();
        self.cancel_debounce();
        self.snapshot.page_index = 0;
        self.issue()
    }

    /// Returns `true` if the timer was still current and a request went out.
    pub fn on_debounce_elapsed(&mut self, ticket: u64) -> bool {
        match &self.pending {
            Some(pending) if pending.ticket == ticket => {
                self.pending = None;
                // A new query starts over at the first page.
                self.snapshot.page_index = 0;
                self.issue();
                true
            }
            _ => {
                debug!("search: ignoring stale debounce ticket {}", ticket);
                false
            }
        }
    }

    /// Jump to a 0-based page of the current query, no debounce.
    pub fn change_page(&mut self, index: usize) -> bool {
        let page_count = self.snapshot.page_count().max(1);
        if index >= page_count {
            debug!(
                "search: page {} out of range (page_count={})",
                index, page_count
            );
            return false;
        }
        self.cancel_debounce();
        self.snapshot.page_index = index;
        self.issue();
        true
    }

    /// Jump to a 1-based page as shown by the pagination control.
    pub fn change_display_page(&mut self, page: usize) -> bool {
        match page.checked_sub(1) {
            Some(index) => self.change_page(index),
            None => false,
        }
    }

    /// Indexing finished on the server.  Refresh from page 0, unless the user
    /// is already looking at results.
    pub fn on_indexing_complete(&mut self) -> bool {
        if self.has_results() {
            debug!("search: indexing complete, keeping current results");
            return false;
        }
        info!("search: indexing complete, refreshing '{}'", self.snapshot.query);
        self.snapshot.page_index = 0;
        self.issue();
        true
    }

    /// Apply a finished request.  Returns `false` if it was superseded and
    /// therefore discarded.
    pub fn apply(&mut self, generation: u64, outcome: Result<SearchResponse>) -> bool {
        if generation != self.generation {
            debug!(
                "search: discarding stale response gen={} (current={})",
                generation, self.generation
            );
            return false;
        }

        self.snapshot.loading = false;
        self.snapshot.searched = true;
        match outcome {
            Ok(response) => {
                info!("Search returned {} results", response.total);
                self.snapshot.total = response.total;
                self.snapshot.items = response.results;
                self.snapshot.failed = false;
            }
            Err(e) => {
                warn!("Search failed - defaulting: {}", e);
                self.snapshot.total = 0;
                self.snapshot.items.clear();
                self.snapshot.failed = true;
            }
        }
        true
    }

    /// Drop everything: pending timer, in-flight requests, results.
    pub fn reset(&mut self) {
        self.cancel_debounce();
        // Anything still in flight now carries an old generation.
        self.generation += 1;
        self.snapshot = SearchSnapshot::new(self.default_query.clone(), self.snapshot.page_size);
    }

    fn cancel_debounce(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.handle.abort();
        }
    }

    fn issue(&mut self) -> u64 {
        self.generation += 1;
        let generation = self.generation;
        let request = SearchRequest::new(
            self.snapshot.query.clone(),
            self.snapshot.page_index,
            self.snapshot.page_size,
        );
        debug!(
            "Performing search with q={}, offset={}, limit={} (gen={})",
            request.query,
            request.offset(),
            request.limit(),
            generation
        );
        self.snapshot.loading = true;

        let backend = Arc::clone(&self.backend);
        let events = self.events.clone();
        tokio::spawn(async move {
            let outcome = backend.search(request).await;
            let _ = events
                .send(SearchEvent::Finished {
                    generation,
                    outcome,
                })
                .await;
        });
        generation
    }
}

impl<B: SearchBackend> Drop for SearchCoordinator<B> {
    fn drop(&mut self) {
        self.cancel_debounce();
    }
}
