//! Cookie-equivalent session token storage.
//!
//! The client never issues a session itself; the token is obtained through the
//! server's auth flow and handed to us (CLI `login`).  We only read it, send it
//! along with requests, and clear it when the server says it is no longer
//! valid.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current token, if one is stored and non-empty.
    pub fn token(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let token = content.trim();
                if token.is_empty() {
                    None
                } else {
                    Some(token.to_string())
                }
            }
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    debug!("session: could not read {}: {}", self.path.display(), e);
                }
                None
            }
        }
    }

    pub fn is_present(&self) -> bool {
        self.token().is_some()
    }

    pub fn save(&self, token: &str) -> anyhow::Result<()> {
        let token = token.trim();
        if token.is_empty() {
            anyhow::bail!("refusing to store an empty session token");
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, token)?;
        info!("session: stored token at {}", self.path.display());
        Ok(())
    }

    /// Remove the stored token.  Returns `true` if there was one to remove.
    pub fn clear(&self) -> anyhow::Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!("session: cleared {}", self.path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("sub").join("session"));
        assert_eq!(store.token(), None);
        assert!(!store.is_present());

        store.save("  4f2a9c  \n").unwrap();
        assert_eq!(store.token().as_deref(), Some("4f2a9c"));

        assert!(store.clear().unwrap());
        assert!(!store.is_present());
        assert!(!store.clear().unwrap());
    }

    #[test]
    fn test_blank_file_is_no_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session");
        std::fs::write(&path, "\n").unwrap();
        let store = SessionStore::new(&path);
        assert_eq!(store.token(), None);
        assert!(store.save("   ").is_err());
    }
}
