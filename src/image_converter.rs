use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader, Rgb, RgbImage};
use log::{debug, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::fs;
use tokio::process::Command;

use crate::config::Config;
use crate::thumbnail_types::{OutputFormat, ThumbnailError, ThumbnailResult};

/// Raster engine used for one conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Engine {
    /// In-process decoding and encoding with the `image` crate.
    Builtin,
    /// External ImageMagick binary.
    Magick,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown processing engine: {0}")]
pub struct UnknownEngine(String);

impl FromStr for Engine {
    type Err = UnknownEngine;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "builtin" => Ok(Engine::Builtin),
            "magick" | "im" => Ok(Engine::Magick),
            other => Err(UnknownEngine(other.to_string())),
        }
    }
}

/// Per-axis clamp: never larger than the source on either axis, aspect ratio not preserved.
pub fn clamp_dimensions(native: (u32, u32), max: (u32, u32)) -> (u32, u32) {
    (native.0.min(max.0), native.1.min(max.1))
}

#[derive(Debug, Clone)]
pub struct ImageConverter {
    overrides: HashMap<String, Engine>,
    default_engine: Engine,
    magick_path: String,
}

impl ImageConverter {
    pub fn new(
        overrides: HashMap<String, Engine>,
        default_engine: Engine,
        magick_path: String,
    ) -> Self {
        Self {
            overrides,
            default_engine,
            magick_path,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let overrides = config
            .upload_formats
            .iter()
            .filter_map(|(ext, engine)| engine.map(|engine| (ext.clone(), engine)))
            .collect();
        Self::new(overrides, Engine::Builtin, config.magick_path.clone())
    }

    pub fn engine_for(&self, source: &Path) -> Engine {
        source
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.overrides.get(ext).copied())
            .unwrap_or(self.default_engine)
    }

    /// Renders `temp_path` into `final_path`. The temp file is removed whatever the outcome.
    pub async fn convert(
        &self,
        temp_path: &Path,
        final_path: &Path,
        max_width: u32,
        max_height: u32,
        format: &OutputFormat,
    ) -> ThumbnailResult<PathBuf> {
        let partial_path = temp_path.with_extension(format!("{}.part", format.as_str()));

        let rendered = self
            .render(temp_path, &partial_path, (max_width, max_height), format)
            .await;

        let result = match rendered {
            Ok(()) => fs::rename(&partial_path, final_path)
                .await
                .map_err(ThumbnailError::from),
            Err(e) => Err(e),
        };

        if result.is_err() {
            if let Err(e) = fs::remove_file(&partial_path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove partial output {:?}: {}", partial_path, e);
                }
            }
        }
        if let Err(e) = fs::remove_file(temp_path).await {
            warn!("Failed to remove temp file {:?}: {}", temp_path, e);
        }

        result.map(|()| final_path.to_path_buf())
    }

    async fn render(
        &self,
        source: &Path,
        output: &Path,
        max: (u32, u32),
        format: &OutputFormat,
    ) -> ThumbnailResult<()> {
        match self.engine_for(source) {
            Engine::Builtin => {
                let source = source.to_path_buf();
                let output = output.to_path_buf();
                let image_format = format.image_format();
                tokio::task::spawn_blocking(move || {
                    render_builtin(&source, &output, max, image_format)
                })
                .await
                .map_err(|e| ThumbnailError::Engine(format!("render task failed: {}", e)))?
            }
            Engine::Magick => self.render_magick(source, output, max, format).await,
        }
    }

    async fn probe_magick(&self, source: &Path) -> ThumbnailResult<(u32, u32)> {
        let output = Command::new(&self.magick_path)
            .arg("identify")
            .args(["-format", "%w %h"])
            .arg(first_frame(source))
            .output()
            .await
            .map_err(|e| ThumbnailError::Engine(format!("identify failed: {}", e)))?;

        if !output.status.success() {
            return Err(ThumbnailError::Engine(format!(
                "identify exited with status: {}",
                output.status
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        parse_identify(&text)
            .ok_or_else(|| ThumbnailError::Engine(format!("unexpected identify output: {}", text)))
    }

    async fn render_magick(
        &self,
        source: &Path,
        output: &Path,
        max: (u32, u32),
        format: &OutputFormat,
    ) -> ThumbnailResult<()> {
        let native = self.probe_magick(source).await?;
        let (width, height) = clamp_dimensions(native, max);
        debug!(
            "magick: {:?} {}x{} -> {}x{}",
            source, native.0, native.1, width, height
        );

        let target = format!(
            "{}:{}",
            format.as_str().to_uppercase(),
            output.to_string_lossy()
        );
        let status = Command::new(&self.magick_path)
            .arg(first_frame(source))
            .args(["-resize", &format!("{}x{}!", width, height)])
            .args(["-background", "white", "-alpha", "remove", "-flatten"])
            .arg(target)
            .output()
            .await
            .map_err(|e| ThumbnailError::Engine(format!("magick failed: {}", e)))?
            .status;

        if !status.success() {
            return Err(ThumbnailError::Engine(format!(
                "magick exited with status: {}",
                status
            )));
        }
        Ok(())
    }
}

fn first_frame(source: &Path) -> String {
    format!("{}[0]", source.to_string_lossy())
}

fn parse_identify(text: &str) -> Option<(u32, u32)> {
    let mut parts = text.split_whitespace();
    let width = parts.next()?.parse().ok()?;
    let height = parts.next()?.parse().ok()?;
    Some((width, height))
}

fn render_builtin(
    source: &Path,
    output: &Path,
    max: (u32, u32),
    format: ImageFormat,
) -> ThumbnailResult<()> {
    let img = ImageReader::open(source)?.with_guessed_format()?.decode()?;

    let native = img.dimensions();
    let (width, height) = clamp_dimensions(native, max);
    debug!(
        "builtin: {:?} {}x{} -> {}x{}",
        source, native.0, native.1, width, height
    );

    let img = if (width, height) == native {
        img
    } else {
        img.resize_exact(width, height, FilterType::Lanczos3)
    };

    flatten(img).save_with_format(output, format)?;
    Ok(())
}

/// Composites any alpha onto white so every encoder gets opaque RGB.
fn flatten(img: DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }

    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}
