//! Artifact downloads to local storage.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::ProviderResult;
use crate::http::check_response;
use crate::traits::{ArtifactSink, FetchedImage};

const PROVIDER: &str = "download";

/// Guess an image MIME type from a URL path.
pub fn guess_mime_type(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    match path.rsplit('.').next() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("mp4") => "video/mp4",
        _ => "image/jpeg",
    }
}

/// Sibling path the body streams into before it is moved into place.
fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

async fn write_body(response: &mut reqwest::Response, path: &Path) -> ProviderResult<usize> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0usize;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len();
    }
    file.flush().await?;
    Ok(written)
}

/// [`ArtifactSink`] over plain HTTP GETs.
#[derive(Clone)]
pub struct HttpArtifactSink {
    http: Client,
}

impl HttpArtifactSink {
    pub fn new(timeout: Duration) -> ProviderResult<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ArtifactSink for HttpArtifactSink {
    async fn download(&self, url: &str, destination: &Path) -> ProviderResult<()> {
        let started = Instant::now();
        let response = self.http.get(url).send().await?;
        let mut response = check_response(PROVIDER, "download", started, response).await?;

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let partial = partial_path(destination);
        let written = match write_body(&mut response, &partial).await {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };
        tokio::fs::rename(&partial, destination).await?;

        debug!(
            url = url,
            path = %destination.display(),
            bytes = written,
            "Downloaded artifact"
        );
        Ok(())
    }

    async fn fetch(&self, url: &str) -> ProviderResult<FetchedImage> {
        let started = Instant::now();
        let response = self.http.get(url).send().await?;
        let response = check_response(PROVIDER, "fetch", started, response).await?;

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| v.starts_with("image/"))
            .unwrap_or_else(|| guess_mime_type(url).to_string());

        let bytes = response.bytes().await?.to_vec();
        Ok(FetchedImage { bytes, mime_type })
    }
}
