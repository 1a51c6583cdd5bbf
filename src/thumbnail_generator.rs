use async_trait::async_trait;
use log::debug;
use reqwest::Url;
use std::path::{Path, PathBuf};

use crate::cache_coordinator::ArtifactBuilder;
use crate::config::Config;
use crate::content_fetcher::ContentFetcher;
use crate::image_converter::ImageConverter;
use crate::thumbnail_types::{CacheKey, CacheLayout, ThumbnailError, ThumbnailResult};

/// Fetch-then-convert build for one cache key.
#[derive(Clone)]
pub struct ThumbnailGenerator {
    layout: CacheLayout,
    fetcher: ContentFetcher,
    converter: ImageConverter,
}

impl ThumbnailGenerator {
    pub fn new(layout: CacheLayout, fetcher: ContentFetcher, converter: ImageConverter) -> Self {
        Self {
            layout,
            fetcher,
            converter,
        }
    }

    pub fn from_config(config: &Config, layout: CacheLayout) -> ThumbnailResult<Self> {
        Ok(Self::new(
            layout,
            ContentFetcher::from_config(config)?,
            ImageConverter::from_config(config),
        ))
    }
}

#[async_trait]
impl ArtifactBuilder for ThumbnailGenerator {
    async fn build(&self, key: &CacheKey, artifact_path: &Path) -> ThumbnailResult<PathBuf> {
        let url = Url::parse(&key.source_url)
            .map_err(|e| ThumbnailError::invalid("source", e.to_string()))?;

        let temp_path = self
            .fetcher
            .fetch(&url, &self.layout.temp_prefix(key))
            .await?;
        debug!("Converting {:?} for {}", temp_path, key);

        self.converter
            .convert(&temp_path, artifact_path, key.width, key.height, &key.format)
            .await
    }
}
