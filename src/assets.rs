//! Asset download and HTML asset-path rewriting.
//!
//! Downloads run through a fixed-size worker pool; each unit reports its
//! own success or failure and a failed download never aborts its
//! siblings. The resulting asset map (original URL -> local path) feeds
//! both prompt construction and final path rewriting.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use reqwest::Client;
use tracing::{debug, warn};

use crate::error::{CloneError, Result};
use crate::types::AssetReference;

const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(20);

/// Outcome of one asset download attempt.
#[derive(Debug, Clone)]
pub struct AssetDownload {
    pub original_url: String,
    pub local_path: Option<PathBuf>,
    pub error: Option<String>,
}

impl AssetDownload {
    pub fn succeeded(&self) -> bool {
        self.local_path.is_some()
    }
}

/// Downloads asset references into a local directory with bounded
/// concurrency.
pub struct AssetDownloader {
    http: Client,
    output_dir: PathBuf,
    pool_size: usize,
}

impl AssetDownloader {
    pub fn new(output_dir: impl Into<PathBuf>, pool_size: usize) -> Result<Self> {
        let http = Client::builder()
            .timeout(DEFAULT_DOWNLOAD_TIMEOUT)
            .build()
            .map_err(CloneError::Network)?;
        Ok(Self {
            http,
            output_dir: output_dir.into(),
            pool_size: pool_size.max(1),
        })
    }

    /// Download every asset, at most `pool_size` in flight at a time.
    pub async fn download_all(&self, assets: &[AssetReference]) -> Vec<AssetDownload> {
        if assets.is_empty() {
            return Vec::new();
        }
        if let Err(e) = tokio::fs::create_dir_all(&self.output_dir).await {
            warn!(error = %e, "failed to create asset directory");
            return assets
                .iter()
                .map(|asset| AssetDownload {
                    original_url: asset.url.clone(),
                    local_path: None,
                    error: Some(format!("asset directory unavailable: {e}")),
                })
                .collect();
        }

        stream::iter(assets.iter().cloned().enumerate())
            .map(|(index, asset)| async move { self.download_one(index, &asset).await })
            .buffer_unordered(self.pool_size)
            .collect()
            .await
    }

    async fn download_one(&self, index: usize, asset: &AssetReference) -> AssetDownload {
        // Inline content (data: URLs, inline SVG markers) has nothing to
        // fetch; it stays referenced as-is.
        if asset.url.starts_with("data:") || asset.url.starts_with("inline-") {
            return AssetDownload {
                original_url: asset.url.clone(),
                local_path: None,
                error: Some("inline asset, not downloaded".to_string()),
            };
        }

        match self.fetch(index, asset).await {
            Ok(path) => {
                debug!(url = %asset.url, path = %path.display(), "asset downloaded");
                AssetDownload {
                    original_url: asset.url.clone(),
                    local_path: Some(path),
                    error: None,
                }
            }
            Err(e) => {
                warn!(url = %asset.url, error = %e, "asset download failed");
                AssetDownload {
                    original_url: asset.url.clone(),
                    local_path: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn fetch(&self, index: usize, asset: &AssetReference) -> Result<PathBuf> {
        let response = self.http.get(&asset.url).send().await?;
        let response = response.error_for_status()?;
        let bytes = response.bytes().await?;

        let filename = format!("asset-{index}.{}", extension_for(&asset.url));
        let path = self.output_dir.join(filename);
        tokio::fs::write(&path, &bytes).await?;
        Ok(path)
    }
}

fn extension_for(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let lower = path.to_ascii_lowercase();
    for ext in ["png", "jpg", "jpeg", "gif", "webp", "svg", "ico", "woff2", "woff"] {
        if lower.ends_with(&format!(".{ext}")) {
            return match ext {
                "png" => "png",
                "jpg" | "jpeg" => "jpg",
                "gif" => "gif",
                "webp" => "webp",
                "svg" => "svg",
                "ico" => "ico",
                "woff2" => "woff2",
                "woff" => "woff",
                _ => unreachable!(),
            };
        }
    }
    "bin"
}

/// Collapse download results into the asset map used for prompt
/// embedding and path rewriting.
pub fn build_asset_map(downloads: &[AssetDownload]) -> HashMap<String, PathBuf> {
    downloads
        .iter()
        .filter_map(|d| {
            d.local_path
                .as_ref()
                .map(|path| (d.original_url.clone(), path.clone()))
        })
        .collect()
}

/// Rewrite asset references in generated HTML to their local paths.
///
/// Covers `src="..."`/`href="..."` attributes and inline `url(...)`
/// occurrences; URLs absent from the map are left untouched.
pub fn rewrite_asset_paths(html: &str, asset_map: &HashMap<String, PathBuf>) -> String {
    let mut rewritten = html.to_string();
    for (original, local) in asset_map {
        let local = local.display().to_string();
        for quoted in [
            format!("src=\"{original}\""),
            format!("href=\"{original}\""),
            format!("src='{original}'"),
            format!("href='{original}'"),
        ] {
            let attr = quoted.split('=').next().unwrap_or("src");
            rewritten = rewritten.replace(&quoted, &format!("{attr}=\"{local}\""));
        }
        rewritten = rewritten.replace(
            &format!("url({original})"),
            &format!("url({local})"),
        );
        rewritten = rewritten.replace(
            &format!("url(\"{original}\")"),
            &format!("url(\"{local}\")"),
        );
        rewritten = rewritten.replace(
            &format!("url('{original}')"),
            &format!("url('{local}')"),
        );
    }
    rewritten
}
