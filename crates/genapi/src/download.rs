//! Chunked download of finished assets.

use std::path::Path;

use async_trait::async_trait;
use reqwest::Url;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Largest single write issued while streaming an asset to disk.
pub const DOWNLOAD_CHUNK_BYTES: usize = 8 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("download failed with HTTP {status}")]
    Http { status: u16 },

    #[error("download request failed: {0}")]
    Request(String),

    #[error("I/O error while writing asset: {0}")]
    Io(#[from] std::io::Error),
}

/// Fetches a finished asset into a local file.
#[async_trait]
pub trait AssetDownloader: Send + Sync {
    /// Stream `url` into `dest`, returning the number of bytes written.
    ///
    /// On error the partially written file may remain; callers own cleanup
    /// (the call itself may also be dropped by a timeout).
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, DownloadError>;
}

/// Write `data` in pieces of at most [`DOWNLOAD_CHUNK_BYTES`]. Returns the
/// number of writes issued.
pub async fn write_chunked<W: AsyncWrite + Unpin>(
    writer: &mut W,
    data: &[u8],
) -> std::io::Result<usize> {
    let mut writes = 0;
    for piece in data.chunks(DOWNLOAD_CHUNK_BYTES) {
        writer.write_all(piece).await?;
        writes += 1;
    }
    Ok(writes)
}

/// reqwest-backed downloader.
///
/// The API key is sent only to URLs on the same origin as the generation
/// API; assets served from anywhere else are fetched anonymously.
#[derive(Clone)]
pub struct HttpDownloader {
    client: reqwest::Client,
    api_key: Option<String>,
    api_base: Option<Url>,
}

impl HttpDownloader {
    pub fn new(client: reqwest::Client, api_key: Option<String>, api_base: &str) -> Self {
        let api_base = match Url::parse(api_base) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(
                    api_base,
                    error = %e,
                    "Invalid API base, downloads will not carry credentials"
                );
                None
            }
        };
        Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            api_base,
        }
    }

    /// Key to attach when fetching `url`, if any.
    fn credentials_for(&self, url: &str) -> Option<&str> {
        let key = self.api_key.as_deref()?;
        let base = self.api_base.as_ref()?;
        let target = Url::parse(url).ok()?;
        same_origin(base, &target).then_some(key)
    }
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}

#[async_trait]
impl AssetDownloader for HttpDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
        let mut request = self.client.get(url);
        if let Some(key) = self.credentials_for(url) {
            request = request.bearer_auth(key);
        }
        let mut response = request
            .send()
            .await
            .map_err(|e| DownloadError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Http {
                status: status.as_u16(),
            });
        }

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(dest).await?;
        let mut total = 0u64;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| DownloadError::Request(e.to_string()))?
        {
            write_chunked(&mut file, &chunk).await?;
            total += chunk.len() as u64;
        }
        file.flush().await?;

        tracing::debug!(url, dest = %dest.display(), bytes = total, "Asset downloaded");
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_never_exceed_chunk_size() {
        let data = vec![7u8; DOWNLOAD_CHUNK_BYTES * 2 + 100];
        let mut sink: Vec<u8> = Vec::new();
        let writes = write_chunked(&mut sink, &data).await.unwrap();
        assert_eq!(writes, 3);
        assert_eq!(sink, data);
    }

    #[tokio::test]
    async fn empty_input_issues_no_writes() {
        let mut sink: Vec<u8> = Vec::new();
        assert_eq!(write_chunked(&mut sink, &[]).await.unwrap(), 0);
    }

    fn downloader(key: Option<&str>) -> HttpDownloader {
        HttpDownloader::new(
            reqwest::Client::new(),
            key.map(String::from),
            "https://gen.example.com/v1",
        )
    }

    #[test]
    fn key_sent_to_api_origin_only() {
        let d = downloader(Some("secret"));
        assert_eq!(
            d.credentials_for("https://gen.example.com/files/clip.mp4?alt=media"),
            Some("secret")
        );
        assert_eq!(d.credentials_for("https://cdn.example.net/clip.mp4"), None);
        assert_eq!(d.credentials_for("http://gen.example.com/files/clip.mp4"), None);
        assert_eq!(d.credentials_for("https://gen.example.com:8443/clip.mp4"), None);
        assert_eq!(d.credentials_for("not a url"), None);
    }

    #[test]
    fn explicit_default_port_is_same_origin() {
        let d = downloader(Some("secret"));
        assert_eq!(
            d.credentials_for("https://gen.example.com:443/clip.mp4"),
            Some("secret")
        );
    }

    #[test]
    fn no_key_or_bad_base_sends_nothing() {
        assert_eq!(
            downloader(None).credentials_for("https://gen.example.com/clip.mp4"),
            None
        );
        assert_eq!(
            downloader(Some("  ")).credentials_for("https://gen.example.com/clip.mp4"),
            None
        );
        let d = HttpDownloader::new(reqwest::Client::new(), Some("secret".into()), "::nope");
        assert_eq!(d.credentials_for("https://gen.example.com/clip.mp4"), None);
    }

    #[tokio::test]
    async fn chunked_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        let mut file = tokio::fs::File::create(&path).await.unwrap();
        write_chunked(&mut file, &[1u8; 10_000]).await.unwrap();
        file.flush().await.unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 10_000);
    }
}
