//! Login vs. search view selection.

use tracing::warn;
use url::Url;
use verse_proto::session::SessionStore;
use verse_proto::state::View;

use crate::error::{ClientError, Result};

pub struct SessionGate {
    store: SessionStore,
    auth_url: Url,
}

impl SessionGate {
    pub fn new(store: SessionStore, auth_url: Url) -> Self {
        Self { store, auth_url }
    }

    /// The only input the gate looks at.
    pub fn authenticated(&self) -> bool {
        self.store.is_present()
    }

    pub fn view(&self) -> View {
        view_for(self.authenticated())
    }

    pub fn token(&self) -> Option<String> {
        self.store.token()
    }

    /// Clear the session after the server rejected it.  Returns `true` if a
    /// session was actually removed; revoking twice is a no-op.
    pub fn revoke(&self) -> bool {
        match self.store.clear() {
            Ok(cleared) => cleared,
            Err(e) => {
                warn!("session: failed to clear: {}", e);
                false
            }
        }
    }

    pub fn sign_in(&self, token: &str) -> Result<()> {
        if token.trim().is_empty() {
            return Err(ClientError::InvalidToken);
        }
        self.store
            .save(token)
            .map_err(|e| ClientError::Session(e.to_string()))
    }

    /// Where to send the user to obtain a session.
    pub fn auth_url(&self) -> &Url {
        &self.auth_url
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }
}

pub fn view_for(authenticated: bool) -> View {
    if authenticated {
        View::Search
    } else {
        View::Login
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(dir: &tempfile::TempDir) -> SessionGate {
        SessionGate::new(
            SessionStore::new(dir.path().join("session")),
            Url::parse("http://127.0.0.1:3001/auth").unwrap(),
        )
    }

    #[test]
    fn test_view_follows_session() {
        assert_eq!(view_for(false), View::Login);
        assert_eq!(view_for(true), View::Search);

        let dir = tempfile::tempdir().unwrap();
        let gate = gate(&dir);
        assert_eq!(gate.view(), View::Login);
        gate.sign_in("4f2a9c").unwrap();
        assert_eq!(gate.view(), View::Search);
        assert_eq!(gate.token().as_deref(), Some("4f2a9c"));
    }

    #[test]
    fn test_revoke_clears_once() {
        let dir = tempfile::tempdir().unwrap();
        let gate = gate(&dir);
        gate.sign_in("4f2a9c").unwrap();
        assert!(gate.revoke());
        assert_eq!(gate.view(), View::Login);
        assert!(!gate.revoke());
    }

    #[test]
    fn test_sign_in_rejects_blank_token() {
        let dir = tempfile::tempdir().unwrap();
        let gate = gate(&dir);
        assert!(matches!(gate.sign_in("  "), Err(ClientError::InvalidToken)));
        assert_eq!(gate.auth_url().as_str(), "http://127.0.0.1:3001/auth");
    }
}
