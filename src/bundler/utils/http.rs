//! Downloading the base runtime image.
//!
//! [`Downloader`] is the pipeline's only network seam. [`HttpDownloader`]
//! streams `http(s)://` URLs with reqwest and copies `file://` URLs from disk.

use crate::bundler::error::{Error, ErrorExt, Result};
use std::{future::Future, path::Path};
use tokio::io::AsyncWriteExt;

/// Fetches a URL into a local file.
pub trait Downloader {
    /// Downloads `url` to `dest`. `dest` must not exist on failure.
    fn download(&self, url: &str, dest: &Path) -> impl Future<Output = Result<()>>;
}

/// Default downloader.
#[derive(Debug, Default, Clone)]
pub struct HttpDownloader;

impl Downloader for HttpDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let parsed = url::Url::parse(url)?;
        let result = match parsed.scheme() {
            "file" => copy_local(&parsed, dest).await,
            "http" | "https" => fetch(url, dest).await,
            other => Err(Error::Config(format!(
                "unsupported URL scheme `{other}` in {url}"
            ))),
        };
        if result.is_err() {
            let _ = tokio::fs::remove_file(dest).await;
        }
        result
    }
}

async fn copy_local(url: &url::Url, dest: &Path) -> Result<()> {
    let source = url
        .to_file_path()
        .map_err(|_| Error::Config(format!("invalid file URL {url}")))?;
    if !source.is_file() {
        return Err(Error::NetworkFailure {
            url: url.to_string(),
            reason: "file does not exist".to_string(),
        });
    }
    tokio::fs::copy(&source, dest)
        .await
        .fs_context("copying runtime image", dest)?;
    Ok(())
}

async fn fetch(url: &str, dest: &Path) -> Result<()> {
    log::info!("Downloading {}", url);

    let network = |reason: String| Error::NetworkFailure {
        url: url.to_string(),
        reason,
    };

    let mut response = reqwest::get(url)
        .await
        .map_err(|e| network(e.to_string()))?;
    if !response.status().is_success() {
        return Err(network(format!("HTTP {}", response.status())));
    }

    let mut file = tokio::fs::File::create(dest)
        .await
        .fs_context("creating download file", dest)?;
    let mut total = 0u64;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| network(format!("failed to read response: {e}")))?
    {
        total += chunk.len() as u64;
        file.write_all(&chunk)
            .await
            .fs_context("writing download file", dest)?;
    }
    file.flush().await.fs_context("flushing download file", dest)?;

    log::debug!("Downloaded {} bytes to {}", total, dest.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::ErrorKind;

    #[tokio::test]
    async fn file_urls_are_copied() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("runtime.AppImage");
        std::fs::write(&src, b"image").unwrap();
        let url = url::Url::from_file_path(&src).unwrap();
        let dest = dir.path().join("copy.AppImage");

        HttpDownloader.download(url.as_str(), &dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"image");
    }

    #[tokio::test]
    async fn missing_file_url_is_a_network_failure() {
        let dir = tempfile::tempdir().unwrap();
        let url = url::Url::from_file_path(dir.path().join("absent.AppImage")).unwrap();
        let dest = dir.path().join("copy.AppImage");
        let err = HttpDownloader.download(url.as_str(), &dest).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(!dest.exists());
    }
}
