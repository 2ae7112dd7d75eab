//! Server URLs derived from `[server]` config.

use url::Url;
use verse_proto::config::ServerConfig;

use crate::error::{ClientError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub search: Url,
    pub progress: Url,
    pub auth: Url,
}

impl Endpoints {
    pub fn from_config(server: &ServerConfig) -> Result<Self> {
        let origin = Url::parse(&server.origin)?;
        let search = origin.join(&server.search_path)?;
        let auth = origin.join(&server.auth_path)?;

        // Same host, socket scheme: http -> ws, https -> wss.
        let mut progress = origin.join(&server.ws_path)?;
        let ws_scheme = match origin.scheme() {
            "http" => "ws",
            "https" => "wss",
            other => return Err(ClientError::Scheme(other.to_string())),
        };
        progress
            .set_scheme(ws_scheme)
            .map_err(|_| ClientError::Scheme(ws_scheme.to_string()))?;

        Ok(Self {
            search,
            progress,
            auth,
        })
    }
}
