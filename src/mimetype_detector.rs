use image::ImageFormat;
use std::path::Path;

/// Number of leading bytes collected before classifying a download.
pub const SNIFF_LEN: usize = 64;

/// Detects the real image type from leading bytes, ignoring any claimed extension.
pub fn sniff(bytes: &[u8]) -> Option<SniffedType> {
    image::guess_format(bytes).ok().map(SniffedType)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SniffedType(ImageFormat);

impl SniffedType {
    pub fn format(&self) -> ImageFormat {
        self.0
    }

    /// Canonical extension used for the temp file and the engine lookup.
    pub fn ext(&self) -> &'static str {
        match self.0 {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
            ImageFormat::WebP => "webp",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Tiff => "tiff",
            other => other.extensions_str().first().copied().unwrap_or("bin"),
        }
    }
}

/// Detects MIME type based on file extension
pub fn from_path(path: &Path) -> Option<MimeType> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(from_extension)
}

/// Detects MIME type from file extension string
fn from_extension(ext: &str) -> Option<MimeType> {
    let ext_lower = ext.to_lowercase();
    match ext_lower.as_str() {
        "jpg" | "jpeg" => Some(MimeType::new("image", "jpeg")),
        "png" => Some(MimeType::new("image", "png")),
        "gif" => Some(MimeType::new("image", "gif")),
        "webp" => Some(MimeType::new("image", "webp")),
        "bmp" => Some(MimeType::new("image", "bmp")),
        "tiff" | "tif" => Some(MimeType::new("image", "tiff")),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeType {
    type_: String,
    subtype: String,
}

impl MimeType {
    fn new(type_: &str, subtype: &str) -> Self {
        Self {
            type_: type_.to_string(),
            subtype: subtype.to_string(),
        }
    }

    pub fn type_(&self) -> &str {
        &self.type_
    }

    pub fn subtype(&self) -> &str {
        &self.subtype
    }
}

impl std::fmt::Display for MimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.type_, self.subtype)
    }
}
