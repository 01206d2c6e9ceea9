//! Artifact download with progress reporting and checksum verification

use futures::StreamExt;
use kiln_errors::{Error, NetworkError};
use kiln_events::{AppEvent, EventEmitter, EventSender, FetchEvent};
use kiln_hash::{Digest, StreamingHasher};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::NetClient;

/// Download operation handle
pub struct Download {
    url: Url,
}

/// Result of a verified download
#[derive(Debug)]
pub struct DownloadResult {
    pub url: String,
    pub size: u64,
    pub digest: Digest,
}

impl Download {
    /// Create a new download
    ///
    /// # Errors
    ///
    /// Returns an error if the provided URL is invalid.
    pub fn new(url: &str) -> Result<Self, Error> {
        let url = Url::parse(url).map_err(|e| NetworkError::InvalidUrl(e.to_string()))?;
        Ok(Self { url })
    }

    /// Execute the download and verify the digest
    ///
    /// The artifact streams to a `.download` temp file while being hashed,
    /// and is only renamed to `dest` when the digest matches. On mismatch
    /// the temp file is removed and nothing is left at `dest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP request fails, the server returns an
    /// error status, the file cannot be written, or the digest does not
    /// match the expectation.
    pub async fn execute(
        self,
        client: &NetClient,
        dest: &Path,
        expected: &Digest,
        tx: &EventSender,
    ) -> Result<DownloadResult, Error> {
        let url_str = self.url.to_string();

        let result = self.run(client, dest, expected, tx, &url_str).await;
        if let Err(error) = &result {
            tx.emit(AppEvent::Fetch(FetchEvent::Failed {
                url: url_str,
                error: error.to_string(),
            }));
        }
        result
    }

    async fn run(
        &self,
        client: &NetClient,
        dest: &Path,
        expected: &Digest,
        tx: &EventSender,
        url_str: &str,
    ) -> Result<DownloadResult, Error> {
        let response = client.get(url_str).await?;

        if !response.status().is_success() {
            return Err(NetworkError::HttpError {
                status: response.status().as_u16(),
                message: response.status().to_string(),
            }
            .into());
        }

        let content_length = response.content_length();

        tx.emit(AppEvent::Fetch(FetchEvent::Started {
            url: url_str.to_string(),
            total_size: content_length,
        }));

        // Create parent directory if needed
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io_with_path(&e, parent))?;
        }

        // Stream to a temporary file, hashing as we go
        let temp_path = dest.with_extension("download");
        let mut file = File::create(&temp_path)
            .await
            .map_err(|e| Error::io_with_path(&e, &temp_path))?;

        let mut stream = response.bytes_stream();
        let mut downloaded = 0u64;
        let mut hasher = StreamingHasher::new(expected.algorithm());

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| NetworkError::DownloadFailed(e.to_string()))?;

            hasher.update(&chunk);
            file.write_all(&chunk).await?;

            downloaded += chunk.len() as u64;

            if let Some(total) = content_length {
                tx.emit(AppEvent::Fetch(FetchEvent::Progress {
                    url: url_str.to_string(),
                    bytes_downloaded: downloaded,
                    total_bytes: total,
                }));
            }
        }

        file.flush().await?;
        drop(file);

        tx.emit(AppEvent::Fetch(FetchEvent::Verifying {
            url: url_str.to_string(),
            algorithm: expected.algorithm().name().to_string(),
        }));

        let digest = hasher.finalize();
        if digest != *expected {
            let _ = tokio::fs::remove_file(&temp_path).await;

            return Err(NetworkError::ChecksumMismatch {
                expected: expected.tagged(),
                actual: digest.tagged(),
            }
            .into());
        }

        // Move to final destination only after verification
        tokio::fs::rename(&temp_path, dest)
            .await
            .map_err(|e| Error::io_with_path(&e, dest))?;

        tx.emit(AppEvent::Fetch(FetchEvent::Completed {
            url: url_str.to_string(),
            size: downloaded,
            digest: digest.tagged(),
        }));

        Ok(DownloadResult {
            url: url_str.to_string(),
            size: downloaded,
            digest,
        })
    }
}
