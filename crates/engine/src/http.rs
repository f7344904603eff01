//! Metadata probe: a single HEAD request to confirm ranged-fetch support and
//! read the source's total size.

use crate::error::DownloadError;
use reqwest::Client;

/// Result of probing a URL before planning a download.
pub struct SourceMetadata {
    /// `None` when `Content-Length` was absent or unparsable; `Some(0)` is a
    /// legitimate, present-and-zero response and distinct from that.
    pub total_size: Option<u64>,
    pub supports_ranges: bool,
}

/// Issues `HEAD <url>` and extracts `Accept-Ranges`/`Content-Length`.
///
/// Does not itself reject missing range support or size — callers decide
/// (§4.3 `plan`) whether that's fatal, since both pieces of information are
/// useful to report back even when one is missing.
pub async fn probe(client: &Client, url: &str) -> Result<SourceMetadata, DownloadError> {
    let response = client
        .head(url)
        .send()
        .await
        .map_err(|e| DownloadError::NetworkError(e.to_string()))?;

    let supports_ranges = response
        .headers()
        .get(reqwest::header::ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "bytes")
        .unwrap_or(false);

    let total_size = response.content_length();

    Ok(SourceMetadata { total_size, supports_ranges })
}
