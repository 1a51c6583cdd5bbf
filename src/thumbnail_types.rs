use image::ImageFormat;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

/// Encoder target requested by the client, keyed by the extension it asked for.
///
/// `jpg` and `jpeg` encode identically but stay distinct so the artifact name
/// always matches the requested URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputFormat {
    ext: String,
    format: ImageFormat,
}

impl OutputFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        let format = ImageFormat::from_extension(ext)?;
        if !format.writing_enabled() {
            return None;
        }
        Some(Self {
            ext: ext.to_string(),
            format,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.ext
    }

    pub fn image_format(&self) -> ImageFormat {
        self.format
    }

    pub fn content_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ext)
    }
}

/// Identity of one generated artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub source_url: String,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
}

impl CacheKey {
    pub fn new(source_url: String, width: u32, height: u32, format: OutputFormat) -> Self {
        Self {
            source_url,
            width,
            height,
            format,
        }
    }

    /// Hex SHA-256 over all four fields; newline-separated so fields can't bleed into each other.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source_url.as_bytes());
        hasher.update(b"\n");
        hasher.update(self.width.to_string().as_bytes());
        hasher.update(b"\n");
        hasher.update(self.height.to_string().as_bytes());
        hasher.update(b"\n");
        hasher.update(self.format.as_str().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}x{}_{}",
            self.source_url, self.width, self.height, self.format
        )
    }
}

/// On-disk layout of the media root.
///
/// ```text
/// {root}/{digest}.{format}      finished artifacts
/// {root}/temp/{digest}.{ext}    in-flight downloads
/// ```
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.root.join("temp")
    }

    pub fn artifact_path(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(format!("{}.{}", key.digest(), key.format.as_str()))
    }

    /// Download destination without extension; the fetcher appends the sniffed one.
    pub fn temp_prefix(&self, key: &CacheKey) -> PathBuf {
        self.temp_dir().join(key.digest())
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.temp_dir())
    }
}

/// Coarse error categories the HTTP layer maps to status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidParams,
    InvalidSignature,
    WrongImageContent,
    Timeout,
    Io,
    Unknown,
}

#[derive(Debug, thiserror::Error)]
pub enum ThumbnailError {
    #[error("Invalid parameter `{field}`: {reason}")]
    InvalidParams { field: &'static str, reason: String },
    #[error("Signature mismatch")]
    InvalidSignature,
    #[error("Unacceptable source content: {0}")]
    WrongImage(String),
    #[error("Timed out fetching source")]
    Timeout,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),
    #[error("Processing engine error: {0}")]
    Engine(String),
    #[error("Build aborted before publishing a result")]
    BuildAborted,
}

impl ThumbnailError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ThumbnailError::InvalidParams {
            field,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ThumbnailError::InvalidParams { .. } => ErrorKind::InvalidParams,
            ThumbnailError::InvalidSignature => ErrorKind::InvalidSignature,
            ThumbnailError::WrongImage(_) => ErrorKind::WrongImageContent,
            ThumbnailError::Timeout => ErrorKind::Timeout,
            ThumbnailError::Io(_) => ErrorKind::Io,
            ThumbnailError::Image(_)
            | ThumbnailError::Http(_)
            | ThumbnailError::Engine(_)
            | ThumbnailError::BuildAborted => ErrorKind::Unknown,
        }
    }
}

impl From<reqwest::Error> for ThumbnailError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ThumbnailError::Timeout
        } else {
            ThumbnailError::Http(err)
        }
    }
}

pub type ThumbnailResult<T> = Result<T, ThumbnailError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn key(url: &str, w: u32, h: u32, ext: &str) -> CacheKey {
        CacheKey::new(
            url.to_string(),
            w,
            h,
            OutputFormat::from_extension(ext).unwrap(),
        )
    }

    #[test]
    fn test_output_format_lookup() {
        let jpg = OutputFormat::from_extension("jpg").unwrap();
        assert_eq!(jpg.image_format(), ImageFormat::Jpeg);
        assert_eq!(jpg.content_type(), "image/jpeg");
        assert_eq!(jpg.as_str(), "jpg");

        let png = OutputFormat::from_extension("png").unwrap();
        assert_eq!(png.content_type(), "image/png");

        assert!(OutputFormat::from_extension("exe").is_none());
    }

    #[test]
    fn test_digest_is_stable() {
        let a = key("https://example.com/a.png", 100, 100, "jpg");
        let b = key("https://example.com/a.png", 100, 100, "jpg");
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);
    }

    #[test]
    fn test_format_is_part_of_the_key() {
        let jpg = key("https://example.com/a.png", 100, 100, "jpg");
        let png = key("https://example.com/a.png", 100, 100, "png");
        assert_ne!(jpg, png);
        assert_ne!(jpg.digest(), png.digest());
    }

    #[test]
    fn test_field_boundaries_do_not_collide() {
        let a = key("https://example.com/a1", 11, 100, "jpg");
        let b = key("https://example.com/a", 111, 100, "jpg");
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn test_layout_paths() {
        let layout = CacheLayout::new("/media");
        let k = key("https://example.com/a.png", 100, 100, "webp");
        let digest = k.digest();

        assert_eq!(
            layout.artifact_path(&k),
            PathBuf::from(format!("/media/{}.webp", digest))
        );
        assert_eq!(
            layout.temp_prefix(&k),
            PathBuf::from(format!("/media/temp/{}", digest))
        );
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ThumbnailError::invalid("width", "too large").kind(),
            ErrorKind::InvalidParams
        );
        assert_eq!(ThumbnailError::Timeout.kind(), ErrorKind::Timeout);
        assert_eq!(
            ThumbnailError::WrongImage("html".into()).kind(),
            ErrorKind::WrongImageContent
        );
        assert_eq!(
            ThumbnailError::Engine("exit 1".into()).kind(),
            ErrorKind::Unknown
        );
        let io = ThumbnailError::from(std::io::Error::other("disk full"));
        assert_eq!(io.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_error_display() {
        let err = ThumbnailError::invalid("height", "5000 outside [1, 2000]");
        assert_eq!(
            err.to_string(),
            "Invalid parameter `height`: 5000 outside [1, 2000]"
        );
    }
}
