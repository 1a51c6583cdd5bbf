use std::collections::{HashMap, HashSet};
use std::env;
use std::time::Duration;

use crate::image_converter::Engine;
use crate::scheduler::{EvictionSchedule, ScheduleTimeZone};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimensionBounds {
    pub min: u32,
    pub max: u32,
}

impl DimensionBounds {
    pub fn contains(&self, value: u32) -> bool {
        value >= self.min && value <= self.max
    }
}

#[derive(Debug, Clone)]
pub struct EvictionConfig {
    pub max_age: Duration,
    pub schedule: EvictionSchedule,
    pub timezone: ScheduleTimeZone,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    pub media_path: String,
    pub secret: String,
    pub width: DimensionBounds,
    pub height: DimensionBounds,
    /// Sniffed source extension -> engine override. Formats mapped to `None` use the default engine.
    pub upload_formats: HashMap<String, Option<Engine>>,
    pub download_formats: HashSet<String>,
    pub fetch_timeout: Duration,
    pub max_source_bytes: u64,
    pub cache_control_max_age: u64,
    pub eviction: EvictionConfig,
    pub expose_signature_endpoint: bool,
    pub magick_path: String,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let secret = env::var("THUMBNAILER_SECRET")
            .map_err(|_| "THUMBNAILER_SECRET must be set to sign thumbnail URLs")?;
        if secret.is_empty() {
            return Err("THUMBNAILER_SECRET must not be empty".into());
        }

        Ok(Config {
            port: env::var("THUMBNAILER_PORT")
                .unwrap_or_else(|_| "18480".to_string())
                .parse()?,
            host: env::var("THUMBNAILER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            media_path: env::var("THUMBNAILER_MEDIA_PATH")
                .unwrap_or_else(|_| "./data/media".to_string()),
            secret,
            width: DimensionBounds {
                min: env::var("THUMBNAILER_WIDTH_MIN")
                    .unwrap_or_else(|_| "1".to_string())
                    .parse()?,
                max: env::var("THUMBNAILER_WIDTH_MAX")
                    .unwrap_or_else(|_| "2000".to_string())
                    .parse()?,
            },
            height: DimensionBounds {
                min: env::var("THUMBNAILER_HEIGHT_MIN")
                    .unwrap_or_else(|_| "1".to_string())
                    .parse()?,
                max: env::var("THUMBNAILER_HEIGHT_MAX")
                    .unwrap_or_else(|_| "2000".to_string())
                    .parse()?,
            },
            upload_formats: parse_upload_formats(
                &env::var("THUMBNAILER_UPLOAD_FORMATS")
                    .unwrap_or_else(|_| "jpg,png,gif,webp,bmp,tiff".to_string()),
            )?,
            download_formats: parse_list(
                &env::var("THUMBNAILER_DOWNLOAD_FORMATS")
                    .unwrap_or_else(|_| "jpg,jpeg,png,webp".to_string()),
            ),
            fetch_timeout: Duration::from_secs(
                env::var("THUMBNAILER_FETCH_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
            ),
            max_source_bytes: env::var("THUMBNAILER_MAX_SOURCE_BYTES")
                .unwrap_or_else(|_| (50 * 1024 * 1024).to_string())
                .parse()?,
            cache_control_max_age: env::var("THUMBNAILER_CACHE_CONTROL_MAX_AGE")
                .unwrap_or_else(|_| "86400".to_string())
                .parse()?,
            eviction: EvictionConfig {
                max_age: Duration::from_secs(
                    env::var("THUMBNAILER_EVICTION_MAX_AGE_SECS")
                        .unwrap_or_else(|_| "86400".to_string())
                        .parse()?,
                ),
                schedule: env::var("THUMBNAILER_EVICTION_SCHEDULE")
                    .unwrap_or_else(|_| "1h".to_string())
                    .parse()?,
                timezone: env::var("THUMBNAILER_EVICTION_TIMEZONE")
                    .unwrap_or_else(|_| "local".to_string())
                    .parse()?,
            },
            expose_signature_endpoint: env::var("THUMBNAILER_EXPOSE_SIGNATURE_ENDPOINT")
                .unwrap_or_else(|_| "false".to_string())
                .parse()?,
            magick_path: env::var("THUMBNAILER_MAGICK_PATH").unwrap_or_else(|_| "magick".to_string()),
        })
    }
}

fn parse_list(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parses `jpg,png,gif:magick` into the allowed-upload map with optional engine overrides.
pub fn parse_upload_formats(
    raw: &str,
) -> Result<HashMap<String, Option<Engine>>, Box<dyn std::error::Error>> {
    let mut formats = HashMap::new();
    for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match item.split_once(':') {
            Some((ext, engine)) => {
                formats.insert(ext.trim().to_lowercase(), Some(engine.trim().parse()?));
            }
            None => {
                formats.insert(item.to_lowercase(), None);
            }
        }
    }
    Ok(formats)
}
