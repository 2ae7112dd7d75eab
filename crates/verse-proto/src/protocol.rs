use serde::{Deserialize, Deserializer, Serialize};

/// Close code the API server sends on the progress channel when the session
/// token is missing or no longer authorised.  Any other code is a plain
/// disconnect.
pub const CLOSE_INVALID_SESSION: u16 = 4000;

/// Name of the session token (cookie) shared by the search endpoint and the
/// progress channel.
pub const SESSION_COOKIE: &str = "session";

/// Query matching every indexed track.
pub const WILDCARD_QUERY: &str = "*";

pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Indexing progress report pushed by the server over the progress channel.
///
/// The server keeps sending these every ~250ms while indexing and one final
/// report with `complete = true` once it is done.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ProgressStatus {
    pub text: String,
    pub n: i64,
    pub total: i64,
    pub complete: bool,
}

impl ProgressStatus {
    /// Fraction done in `0.0..=1.0`.  Zero when the total is unknown.
    pub fn fraction(&self) -> f64 {
        if self.total <= 0 {
            return 0.0;
        }
        (self.n as f64 / self.total as f64).clamp(0.0, 1.0)
    }

    pub fn percent(&self) -> f64 {
        self.fraction() * 100.0
    }
}

/// One page worth of search parameters.  Immutable once issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub page_index: usize,
    pub page_size: usize,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, page_index: usize, page_size: usize) -> Self {
        Self {
            query: query.into(),
            page_index,
            page_size,
        }
    }

    pub fn offset(&self) -> usize {
        self.page_index * self.page_size
    }

    pub fn limit(&self) -> usize {
        self.page_size
    }

    /// Query-string pairs for `GET /search`.
    pub fn query_pairs(&self) -> [(&'static str, String); 3] {
        [
            ("q", self.query.clone()),
            ("offset", self.offset().to_string()),
            ("limit", self.limit().to_string()),
        ]
    }
}

/// Body of a `GET /search` response.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SearchResponse {
    #[serde(default)]
    pub total: u64,
    /// The server encodes an empty hit list as `null`.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub results: Vec<Track>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// An indexed track: third-party catalogue metadata plus scraped lyrics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Track {
    pub spotify: SpotifyTrack,
    #[serde(default)]
    pub lyrics: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SpotifyTrack {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<Artist>,
    #[serde(default)]
    pub album: Album,
    #[serde(default)]
    pub external_urls: ExternalUrls,
    #[serde(default)]
    pub preview_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Artist {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Album {
    #[serde(default)]
    pub name: String,
    /// Artwork in descending size order (640, 300, 64 for most tracks).
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Image {
    pub url: String,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ExternalUrls {
    #[serde(default)]
    pub spotify: Option<String>,
}

impl Track {
    /// "Title - Artist A, Artist B"
    pub fn display_title(&self) -> String {
        let artists = self
            .spotify
            .artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        format!("{} - {}", self.spotify.name, artists)
    }

    /// Medium artwork tier, falling back to whatever the album has.
    pub fn artwork_url(&self) -> Option<&str> {
        let images = &self.spotify.album.images;
        images
            .get(1)
            .or_else(|| images.first())
            .map(|i| i.url.as_str())
    }

    pub fn external_link(&self) -> Option<&str> {
        self.spotify.external_urls.spotify.as_deref()
    }

    /// Preview clip URL.  Not every track has one.
    pub fn preview_url(&self) -> Option<&str> {
        self.spotify
            .preview_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }

    pub fn lyrics(&self) -> Option<&str> {
        let trimmed = self.lyrics.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(self.lyrics.as_str())
        }
    }
}
