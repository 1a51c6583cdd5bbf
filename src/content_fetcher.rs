//! Streaming download of untrusted source images.
//!
//! The body is classified from a small peek buffer before anything touches the
//! disk, so a fake or oversized payload costs at most one read.

use futures_util::StreamExt;
use log::{debug, warn};
use reqwest::{Client, Url};
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::config::Config;
use crate::mimetype_detector::{sniff, SNIFF_LEN};
use crate::thumbnail_types::{ThumbnailError, ThumbnailResult};

#[derive(Clone)]
pub struct ContentFetcher {
    client: Client,
    allowed_formats: HashSet<String>,
    max_source_bytes: u64,
}

impl ContentFetcher {
    pub fn new(
        timeout: Duration,
        allowed_formats: HashSet<String>,
        max_source_bytes: u64,
    ) -> ThumbnailResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            allowed_formats,
            max_source_bytes,
        })
    }

    pub fn from_config(config: &Config) -> ThumbnailResult<Self> {
        Self::new(
            config.fetch_timeout,
            config.upload_formats.keys().cloned().collect(),
            config.max_source_bytes,
        )
    }

    /// Downloads `url` to `destination_prefix.{sniffed_ext}` and returns that path.
    pub async fn fetch(&self, url: &Url, destination_prefix: &Path) -> ThumbnailResult<PathBuf> {
        debug!("Fetching source {}", url);
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            warn!("Source {} answered with status {}", url, status);
            return Err(ThumbnailError::WrongImage(format!(
                "upstream returned {}",
                status
            )));
        }

        let mut body = Box::pin(response.bytes_stream());

        let mut peek: Vec<u8> = Vec::with_capacity(SNIFF_LEN);
        while peek.len() < SNIFF_LEN {
            match body.next().await {
                Some(chunk) => peek.extend_from_slice(&chunk?),
                None => break,
            }
        }

        let sniffed = match sniff(&peek) {
            Some(sniffed) if self.allowed_formats.contains(sniffed.ext()) => sniffed,
            other => {
                // Dropping the body closes the connection without reading the rest.
                drop(body);
                warn!("Wrong content of the link: {}", url);
                return Err(ThumbnailError::WrongImage(match other {
                    Some(sniffed) => format!("{} sources are not accepted", sniffed.ext()),
                    None => "not a recognizable image".to_string(),
                }));
            }
        };

        let path = append_extension(destination_prefix, sniffed.ext());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::File::create(&path).await?;

        let written: ThumbnailResult<u64> = async {
            let mut total = peek.len() as u64;
            self.check_size(total)?;
            file.write_all(&peek).await?;

            while let Some(chunk) = body.next().await {
                let chunk = chunk?;
                total += chunk.len() as u64;
                self.check_size(total)?;
                file.write_all(&chunk).await?;
            }

            file.flush().await?;
            Ok(total)
        }
        .await;
        drop(file);

        match written {
            Ok(total) => {
                debug!("Downloaded {} bytes of {} to {:?}", total, url, path);
                Ok(path)
            }
            Err(e) => {
                if let Err(remove_err) = fs::remove_file(&path).await {
                    warn!("Failed to remove partial download {:?}: {}", path, remove_err);
                }
                Err(e)
            }
        }
    }

    fn check_size(&self, total: u64) -> ThumbnailResult<()> {
        if total > self.max_source_bytes {
            return Err(ThumbnailError::WrongImage(format!(
                "source exceeds {} bytes",
                self.max_source_bytes
            )));
        }
        Ok(())
    }
}

fn append_extension(prefix: &Path, ext: &str) -> PathBuf {
    let mut name = OsString::from(prefix.as_os_str());
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}
