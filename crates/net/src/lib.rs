#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Network operations for kiln
//!
//! This crate handles fetching source artifacts over HTTP with retry
//! logic, and verifies their checksums while they stream to disk. An
//! artifact is never left at its final path unless its digest matched.

mod client;
mod download;

pub use client::{NetClient, NetConfig};
pub use download::{Download, DownloadResult};

use kiln_errors::{Error, NetworkError};
use kiln_events::EventSender;
use kiln_hash::Digest;
use std::path::Path;
use url::Url;

/// Download a source artifact and verify it against the expected digest
///
/// # Errors
///
/// Returns an error if the URL is invalid, the transfer fails after
/// retries, the checksum does not match, or the file cannot be written.
pub async fn fetch_artifact(
    client: &NetClient,
    url: &str,
    dest: &Path,
    expected: &Digest,
    tx: &EventSender,
) -> Result<DownloadResult, Error> {
    let download = Download::new(url)?;
    download.execute(client, dest, expected, tx).await
}

/// Parse and validate a URL
///
/// # Errors
///
/// Returns an error if the URL string is malformed.
pub fn parse_url(url: &str) -> Result<Url, Error> {
    Url::parse(url).map_err(|e| NetworkError::InvalidUrl(e.to_string()).into())
}
