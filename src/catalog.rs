//! The media catalog the pipeline reports back to, and the library scanner
//! that feeds it items.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::{CatalogConfig, LibraryConfig};
use crate::error::{Result, SubgenError};

const MEDIA_EXTENSIONS: &[&str] = &[
    "mp4", "avi", "mov", "mkv", "wmv", "flv", "webm", "m4v", "mpeg", "mpg", "ts", "m2ts", "mp3",
    "flac", "m4a", "aac", "ogg", "opus", "wav",
];

/// A catalog entry the pipeline generates subtitles for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
}

impl MediaItem {
    pub fn new<I: Into<String>, P: Into<PathBuf>>(id: I, path: P) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            id: id.into(),
            name,
            path,
        }
    }

    /// Item for a bare file; the id is derived from the path.
    pub fn from_path<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let id = item_id_for(None, &path);
        Self::new(id, path)
    }
}

/// Receives the "metadata changed" signal for an item
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn refresh_metadata(&self, item_id: &str, cancel: &CancellationToken) -> Result<()>;
}

/// Media server reachable over HTTP (Jellyfin/Emby item refresh API)
pub struct HttpCatalog {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpCatalog {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("subgen/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn refresh_url(&self, item_id: &str) -> String {
        format!("{}/Items/{}/Refresh", self.endpoint, item_id)
    }
}

#[async_trait]
impl Catalog for HttpCatalog {
    async fn refresh_metadata(&self, item_id: &str, cancel: &CancellationToken) -> Result<()> {
        let mut request = self.client.post(self.refresh_url(item_id)).query(&[
            ("metadataRefreshMode", "Default"),
            ("imageRefreshMode", "Default"),
            ("replaceAllMetadata", "false"),
            ("replaceAllImages", "false"),
        ]);
        if let Some(key) = &self.api_key {
            request = request.header("X-Emby-Token", key);
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SubgenError::Cancelled),
            response = request.send() => response?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SubgenError::Catalog(format!(
                "refresh of item {} returned {}: {}",
                item_id,
                status,
                body.trim()
            )));
        }

        debug!("Catalog accepted refresh for item {}", item_id);
        Ok(())
    }
}

/// Used when no catalog endpoint is configured
#[derive(Debug, Default)]
pub struct NoopCatalog;

#[async_trait]
impl Catalog for NoopCatalog {
    async fn refresh_metadata(&self, item_id: &str, _cancel: &CancellationToken) -> Result<()> {
        info!("No catalog configured, skipping metadata refresh for {}", item_id);
        Ok(())
    }
}

/// Factory for the configured catalog
pub struct CatalogFactory;

impl CatalogFactory {
    pub fn create(config: &CatalogConfig) -> Result<Arc<dyn Catalog>> {
        match config.endpoint.as_deref().map(str::trim) {
            Some(endpoint) if !endpoint.is_empty() => {
                Ok(Arc::new(HttpCatalog::new(endpoint, config.api_key.clone())?))
            }
            _ => Ok(Arc::new(NoopCatalog)),
        }
    }
}

/// Walks a library root and yields its media files as items
pub struct LibraryScanner {
    library: LibraryConfig,
}

impl LibraryScanner {
    pub fn new(library: LibraryConfig) -> Self {
        Self { library }
    }

    pub fn items(&self) -> impl Iterator<Item = MediaItem> + '_ {
        WalkDir::new(&self.library.path)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable entry in library {}: {}", self.library.id, e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && is_media_file(entry.path()))
            .map(|entry| {
                let id = item_id_for(Some(&self.library), entry.path());
                MediaItem::new(id, entry.into_path())
            })
    }
}

/// Check if the file is a media file based on extension
pub fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| MEDIA_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// `<library id>:<path relative to the library root>`, or the path itself
fn item_id_for(library: Option<&LibraryConfig>, path: &Path) -> String {
    match library {
        Some(lib) => {
            let relative = path.strip_prefix(&lib.path).unwrap_or(path);
            format!("{}:{}", lib.id, relative.to_string_lossy().replace('\\', "/"))
        }
        None => path.to_string_lossy().into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_scanner_yields_media_only() {
        let root = assert_fs::TempDir::new().unwrap();
        root.child("Movie (2001)/movie.mkv").write_str("x").unwrap();
        root.child("Movie (2001)/movie.en.generated.srt").write_str("x").unwrap();
        root.child("Movie (2001)/poster.jpg").write_str("x").unwrap();
        root.child("Show/S01/e01.MP4").write_str("x").unwrap();

        let scanner = LibraryScanner::new(LibraryConfig {
            id: "movies".to_string(),
            path: root.path().to_path_buf(),
        });
        let items: Vec<MediaItem> = scanner.items().collect();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "movies:Movie (2001)/movie.mkv");
        assert_eq!(items[0].name, "movie");
        assert_eq!(items[1].id, "movies:Show/S01/e01.MP4");
        assert!(items[1].path.ends_with("Show/S01/e01.MP4"));
    }

    #[test]
    fn test_item_from_path() {
        let item = MediaItem::from_path("/media/movie.mkv");
        assert_eq!(item.id, "/media/movie.mkv");
        assert_eq!(item.name, "movie");
    }

    #[test]
    fn test_refresh_url_trims_trailing_slash() {
        let catalog = HttpCatalog::new("http://localhost:8096/", None).unwrap();
        assert_eq!(
            catalog.refresh_url("abc123"),
            "http://localhost:8096/Items/abc123/Refresh"
        );
    }

    #[tokio::test]
    async fn test_factory_without_endpoint_is_noop() {
        let catalog = CatalogFactory::create(&CatalogConfig::default()).unwrap();
        assert!(
            catalog
                .refresh_metadata("abc", &CancellationToken::new())
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_cancelled_refresh() {
        // Port 9 (discard) is never contacted: cancellation wins the select.
        let catalog = HttpCatalog::new("http://127.0.0.1:9", None).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = catalog.refresh_metadata("abc", &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
