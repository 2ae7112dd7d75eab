//! Headless line-oriented frontend.
//!
//! Reads commands from stdin (see `action::parse_line`) and prints a text
//! rendering of the client state whenever it changes.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;
use verse_proto::state::{ClientState, ResultStatus, StateManager, View};

use crate::action::{parse_line, Action};
use crate::core::{ClientEvent, ClientUpdate};

pub async fn run(
    event_tx: mpsc::Sender<ClientEvent>,
    mut updates: broadcast::Receiver<ClientUpdate>,
    state_manager: Arc<StateManager>,
    auth_url: String,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut last_rev = None;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    let _ = event_tx.send(ClientEvent::Shutdown).await;
                    break;
                };
                match parse_line(&line) {
                    Ok(Action::Quit) => {
                        let _ = event_tx.send(ClientEvent::Action(Action::Quit)).await;
                        break;
                    }
                    Ok(action) => {
                        if event_tx.send(ClientEvent::Action(action)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        stdout.write_all(format!("? {}\n", e).as_bytes()).await?;
                    }
                }
            }
            update = updates.recv() => match update {
                Ok(ClientUpdate::StateUpdated) => {
                    let state = state_manager.get_state().await;
                    if last_rev == Some(state.rev) {
                        continue;
                    }
                    last_rev = Some(state.rev);
                    stdout.write_all(render(&state, &auth_url).as_bytes()).await?;
                }
                Ok(ClientUpdate::Log(line)) => {
                    stdout.write_all(format!("! {}\n", line).as_bytes()).await?;
                }
                Err(RecvError::Lagged(n)) => debug!("frontend: skipped {} updates", n),
                Err(RecvError::Closed) => break,
            },
        }
        stdout.flush().await?;
    }
    Ok(())
}

/// Text rendering of one state snapshot.
pub fn render(state: &ClientState, auth_url: &str) -> String {
    let mut out = String::new();
    if state.view == View::Login {
        out.push_str(&format!(
            "-- signed out: get a session at {} then /login <token>\n",
            auth_url
        ));
        return out;
    }

    if let Some(progress) = state.progress.as_ref().filter(|_| state.progress_visible()) {
        out.push_str(&format!(
            "-- {} {}/{} ({:.0}%)\n",
            progress.text,
            progress.n,
            progress.total,
            progress.percent()
        ));
    }

    let search = &state.search;
    let mut header = format!("-- '{}': {} results", search.query, search.total);
    if search.show_pagination() {
        header.push_str(&format!(
            ", page {}/{}",
            search.display_page(),
            search.page_count()
        ));
    }
    if search.loading {
        header.push_str(" (loading)");
    }
    out.push_str(&header);
    out.push('\n');

    match search.status() {
        ResultStatus::Failed => out.push_str("   search failed\n"),
        ResultStatus::NoResults => out.push_str("   no results\n"),
        ResultStatus::NotSearched | ResultStatus::Loaded => {}
    }

    let audible = state.preview.audible_url();
    for (row, track) in search.items.iter().enumerate() {
        let marker = match track.preview_url() {
            Some(url) if Some(url) == audible => " [playing]",
            Some(_) => " [preview]",
            None => "",
        };
        out.push_str(&format!("{:>3}. {}{}\n", row + 1, track.display_title(), marker));
    }
    out
}
