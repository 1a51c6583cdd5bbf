use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use log::warn;
use reqwest::Url;
use std::collections::HashSet;

use crate::config::{Config, DimensionBounds};
use crate::thumbnail_types::{CacheKey, OutputFormat, ThumbnailError, ThumbnailResult};

/// Raw path parameters of one thumbnail request, exactly as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestParams {
    pub source_ref: String,
    pub width: String,
    pub height: String,
    pub output_format: String,
    pub signature: String,
}

impl RequestParams {
    /// Splits the trailing `{signature}.{ext}` path segment.
    pub fn from_path(
        source_ref: String,
        width: String,
        height: String,
        signed_file: &str,
    ) -> ThumbnailResult<Self> {
        let (signature, ext) = signed_file
            .rsplit_once('.')
            .ok_or_else(|| ThumbnailError::invalid("format", "missing file extension"))?;

        Ok(Self {
            source_ref,
            width,
            height,
            output_format: ext.to_string(),
            signature: signature.to_string(),
        })
    }
}

/// Parameters that passed validation, ready to become a cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedParams {
    pub source_url: Url,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
}

impl ValidatedParams {
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(
            self.source_url.to_string(),
            self.width,
            self.height,
            self.format.clone(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct ParamValidator {
    width: DimensionBounds,
    height: DimensionBounds,
    download_formats: HashSet<String>,
}

impl ParamValidator {
    pub fn new(
        width: DimensionBounds,
        height: DimensionBounds,
        download_formats: HashSet<String>,
    ) -> Self {
        Self {
            width,
            height,
            download_formats,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.width, config.height, config.download_formats.clone())
    }

    pub fn validate(&self, params: &RequestParams) -> ThumbnailResult<ValidatedParams> {
        let width = parse_dimension("width", &params.width, self.width)?;
        let height = parse_dimension("height", &params.height, self.height)?;

        if !self.download_formats.contains(&params.output_format) {
            warn!("Wrong extension: {}", params.output_format);
            return Err(ThumbnailError::invalid(
                "format",
                format!("{} is not an allowed output format", params.output_format),
            ));
        }
        let format = OutputFormat::from_extension(&params.output_format).ok_or_else(|| {
            warn!("No encoder for extension: {}", params.output_format);
            ThumbnailError::invalid(
                "format",
                format!("{} cannot be encoded", params.output_format),
            )
        })?;

        let source_url = decode_source_ref(&params.source_ref)?;

        Ok(ValidatedParams {
            source_url,
            width,
            height,
            format,
        })
    }
}

fn parse_dimension(
    field: &'static str,
    raw: &str,
    bounds: DimensionBounds,
) -> ThumbnailResult<u32> {
    let value: u32 = raw.parse().map_err(|_| {
        warn!("Wrong {}: {:?}", field, raw);
        ThumbnailError::invalid(field, format!("{:?} is not a number", raw))
    })?;

    if !bounds.contains(value) {
        warn!("Wrong {}: {}px", field, value);
        return Err(ThumbnailError::invalid(
            field,
            format!("{} outside [{}, {}]", value, bounds.min, bounds.max),
        ));
    }

    Ok(value)
}

/// Encodes a source URL the way it travels in the request path.
pub fn encode_source_ref(url: &str) -> String {
    URL_SAFE_NO_PAD.encode(url.as_bytes())
}

/// Decodes a base64url source reference (padding optional) into an http(s) URL.
pub fn decode_source_ref(source_ref: &str) -> ThumbnailResult<Url> {
    let bytes = URL_SAFE_NO_PAD
        .decode(source_ref.trim_end_matches('='))
        .map_err(|e| ThumbnailError::invalid("source", format!("not base64url: {}", e)))?;
    let text = String::from_utf8(bytes)
        .map_err(|_| ThumbnailError::invalid("source", "not valid UTF-8"))?;
    let url = Url::parse(&text)
        .map_err(|e| ThumbnailError::invalid("source", format!("not a URL: {}", e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => {
            warn!("Rejected source scheme: {}", other);
            Err(ThumbnailError::invalid(
                "source",
                format!("unsupported scheme {}", other),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> ParamValidator {
        ParamValidator::new(
            DimensionBounds { min: 10, max: 1000 },
            DimensionBounds { min: 10, max: 800 },
            ["jpg", "png"].iter().map(|s| s.to_string()).collect(),
        )
    }

    fn request(width: &str, height: &str, ext: &str) -> RequestParams {
        RequestParams {
            source_ref: encode_source_ref("https://example.com/a.png"),
            width: width.to_string(),
            height: height.to_string(),
            output_format: ext.to_string(),
            signature: "sig".to_string(),
        }
    }

    fn invalid_field(result: ThumbnailResult<ValidatedParams>) -> &'static str {
        match result {
            Err(ThumbnailError::InvalidParams { field, .. }) => field,
            other => panic!("expected InvalidParams, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_request() {
        let validated = validator().validate(&request("100", "100", "jpg")).unwrap();
        assert_eq!(validated.width, 100);
        assert_eq!(validated.height, 100);
        assert_eq!(validated.format.as_str(), "jpg");
        assert_eq!(validated.source_url.as_str(), "https://example.com/a.png");
    }

    #[test]
    fn test_bounds_are_inclusive() {
        assert!(validator().validate(&request("10", "10", "png")).is_ok());
        assert!(validator().validate(&request("1000", "800", "png")).is_ok());
    }

    #[test]
    fn test_out_of_bounds_dimensions() {
        assert_eq!(invalid_field(validator().validate(&request("9", "100", "jpg"))), "width");
        assert_eq!(invalid_field(validator().validate(&request("1001", "100", "jpg"))), "width");
        assert_eq!(invalid_field(validator().validate(&request("100", "801", "jpg"))), "height");
        assert_eq!(invalid_field(validator().validate(&request("100", "0", "jpg"))), "height");
    }

    #[test]
    fn test_non_numeric_dimensions() {
        assert_eq!(invalid_field(validator().validate(&request("abc", "100", "jpg"))), "width");
        assert_eq!(invalid_field(validator().validate(&request("100", "-5", "jpg"))), "height");
    }

    #[test]
    fn test_format_outside_allowed_set() {
        assert_eq!(invalid_field(validator().validate(&request("100", "100", "webp"))), "format");
        assert_eq!(invalid_field(validator().validate(&request("100", "100", "JPG"))), "format");
    }

    #[test]
    fn test_source_must_be_http_url() {
        let mut req = request("100", "100", "jpg");
        req.source_ref = encode_source_ref("file:///etc/passwd");
        assert_eq!(invalid_field(validator().validate(&req)), "source");

        req.source_ref = "***".to_string();
        assert_eq!(invalid_field(validator().validate(&req)), "source");
    }

    #[test]
    fn test_padded_source_ref_accepted() {
        let padded = base64::engine::general_purpose::URL_SAFE.encode("https://example.com/ab.png");
        assert!(padded.ends_with('='));
        let url = decode_source_ref(&padded).unwrap();
        assert_eq!(url.as_str(), "https://example.com/ab.png");
    }

    #[test]
    fn test_from_path_splits_signature_and_extension() {
        let params = RequestParams::from_path(
            "src".to_string(),
            "1".to_string(),
            "2".to_string(),
            "abc-_def.jpg",
        )
        .unwrap();
        assert_eq!(params.signature, "abc-_def");
        assert_eq!(params.output_format, "jpg");

        assert!(RequestParams::from_path(
            "src".to_string(),
            "1".to_string(),
            "2".to_string(),
            "noext",
        )
        .is_err());
    }

    #[test]
    fn test_cache_key_uses_decoded_url() {
        let validated = validator().validate(&request("100", "50", "png")).unwrap();
        let key = validated.cache_key();
        assert_eq!(key.source_url, "https://example.com/a.png");
        assert_eq!(key.width, 100);
        assert_eq!(key.height, 50);
    }
}
