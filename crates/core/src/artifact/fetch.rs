//! Artifact download.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::debug;

use super::config::ArtifactConfig;
use super::error::ArtifactError;
use super::validate::SNIFF_LEN;

/// Summary of a completed download.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedContent {
    pub size_bytes: u64,
    pub sha256: String,
    pub md5: String,
    /// Leading bytes, for content sniffing.
    pub head: Vec<u8>,
}

/// Pulls a provider's result into a local file.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Stream `locator` into `dest`, refusing more than `max_bytes`.
    async fn fetch(
        &self,
        locator: &str,
        dest: &Path,
        max_bytes: u64,
    ) -> Result<FetchedContent, ArtifactError>;
}

/// Writes chunks to disk while hashing and enforcing the size limit.
struct DigestWriter {
    writer: BufWriter<File>,
    sha256: Sha256,
    md5: md5::Context,
    head: Vec<u8>,
    size_bytes: u64,
    max_bytes: u64,
}

impl DigestWriter {
    async fn create(dest: &Path, buffer_size: usize, max_bytes: u64) -> Result<Self, ArtifactError> {
        let file = File::create(dest).await?;
        Ok(Self {
            writer: BufWriter::with_capacity(buffer_size, file),
            sha256: Sha256::new(),
            md5: md5::Context::new(),
            head: Vec::with_capacity(SNIFF_LEN),
            size_bytes: 0,
            max_bytes,
        })
    }

    async fn write(&mut self, chunk: &[u8]) -> Result<(), ArtifactError> {
        self.size_bytes += chunk.len() as u64;
        if self.size_bytes > self.max_bytes {
            return Err(ArtifactError::TooLarge {
                max_bytes: self.max_bytes,
            });
        }

        if self.head.len() < SNIFF_LEN {
            let take = (SNIFF_LEN - self.head.len()).min(chunk.len());
            self.head.extend_from_slice(&chunk[..take]);
        }
        self.sha256.update(chunk);
        self.md5.consume(chunk);
        self.writer.write_all(chunk).await?;
        Ok(())
    }

    async fn finish(mut self) -> Result<FetchedContent, ArtifactError> {
        self.writer.flush().await?;
        Ok(FetchedContent {
            size_bytes: self.size_bytes,
            sha256: format!("{:x}", self.sha256.finalize()),
            md5: format!("{:x}", self.md5.compute()),
            head: self.head,
        })
    }
}

/// Fetcher for `http(s)://` and `file://` locators.
pub struct HttpFetcher {
    client: reqwest::Client,
    buffer_size: usize,
}

impl HttpFetcher {
    /// Create a fetcher using the download timeouts from the config.
    pub fn new(config: &ArtifactConfig) -> Result<Self, ArtifactError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| ArtifactError::Download(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            buffer_size: config.buffer_size.max(1),
        })
    }

    async fn fetch_http(
        &self,
        url: &str,
        dest: &Path,
        max_bytes: u64,
    ) -> Result<FetchedContent, ArtifactError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ArtifactError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        if let Some(len) = response.content_length() {
            if len > max_bytes {
                return Err(ArtifactError::TooLarge { max_bytes });
            }
        }

        let mut out = DigestWriter::create(dest, self.buffer_size, max_bytes).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            out.write(&chunk).await?;
        }
        out.finish().await
    }

    async fn fetch_file(
        &self,
        path: &str,
        dest: &Path,
        max_bytes: u64,
    ) -> Result<FetchedContent, ArtifactError> {
        let file = File::open(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ArtifactError::UnsupportedLocator(format!("file not found: {}", path))
            } else {
                ArtifactError::Io(e)
            }
        })?;

        let mut reader = BufReader::with_capacity(self.buffer_size, file);
        let mut out = DigestWriter::create(dest, self.buffer_size, max_bytes).await?;
        let mut buffer = vec![0u8; self.buffer_size];

        loop {
            let bytes_read = reader.read(&mut buffer).await?;
            if bytes_read == 0 {
                break;
            }
            out.write(&buffer[..bytes_read]).await?;
        }
        out.finish().await
    }
}

fn map_reqwest_error(e: reqwest::Error) -> ArtifactError {
    if e.is_timeout() {
        ArtifactError::Timeout(e.to_string())
    } else if e.is_connect() {
        ArtifactError::Download(format!("connection failed: {}", e))
    } else {
        ArtifactError::Download(e.to_string())
    }
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    async fn fetch(
        &self,
        locator: &str,
        dest: &Path,
        max_bytes: u64,
    ) -> Result<FetchedContent, ArtifactError> {
        debug!(locator = %locator, dest = %dest.display(), "Fetching artifact");

        if let Some(path) = locator.strip_prefix("file://") {
            self.fetch_file(path, dest, max_bytes).await
        } else if locator.starts_with("http://") || locator.starts_with("https://") {
            self.fetch_http(locator, dest, max_bytes).await
        } else {
            Err(ArtifactError::UnsupportedLocator(locator.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(&ArtifactConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_file_locator() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("result.png");
        std::fs::write(&source, b"\x89PNG\r\n\x1a\nrest-of-image").unwrap();
        let dest = temp.path().join("staged");

        let fetched = fetcher()
            .fetch(&format!("file://{}", source.display()), &dest, 1024)
            .await
            .unwrap();

        assert_eq!(fetched.size_bytes, 21);
        assert_eq!(std::fs::read(&dest).unwrap().len(), 21);
        assert!(fetched.head.starts_with(b"\x89PNG"));
        assert_eq!(
            fetched.md5,
            format!("{:x}", md5::compute(b"\x89PNG\r\n\x1a\nrest-of-image"))
        );
        assert_eq!(fetched.sha256.len(), 64);
    }

    #[tokio::test]
    async fn test_fetch_enforces_size_limit() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("big.bin");
        std::fs::write(&source, vec![0u8; 100]).unwrap();

        let result = fetcher()
            .fetch(
                &format!("file://{}", source.display()),
                &temp.path().join("staged"),
                50,
            )
            .await;
        assert!(matches!(result, Err(ArtifactError::TooLarge { max_bytes: 50 })));
    }

    #[tokio::test]
    async fn test_fetch_empty_file() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("empty.mp4");
        std::fs::write(&source, b"").unwrap();

        let fetched = fetcher()
            .fetch(
                &format!("file://{}", source.display()),
                &temp.path().join("staged"),
                50,
            )
            .await
            .unwrap();
        assert_eq!(fetched.size_bytes, 0);
        assert!(fetched.head.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_rejects_unknown_scheme() {
        let temp = TempDir::new().unwrap();
        let result = fetcher()
            .fetch("s3://bucket/key", &temp.path().join("staged"), 50)
            .await;
        assert!(matches!(result, Err(ArtifactError::UnsupportedLocator(_))));
    }

    #[tokio::test]
    async fn test_fetch_missing_file_is_permanent() {
        let temp = TempDir::new().unwrap();
        let result = fetcher()
            .fetch(
                "file:///definitely/not/here.mp4",
                &temp.path().join("staged"),
                50,
            )
            .await;
        let err = result.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_connection_refused_is_retryable() {
        let temp = TempDir::new().unwrap();
        let result = fetcher()
            .fetch("http://127.0.0.1:1/x.mp4", &temp.path().join("staged"), 50)
            .await;
        let err = result.unwrap_err();
        assert!(err.is_retryable(), "unexpected error: {:?}", err);
    }
}
