//! Keyed request signatures.
//!
//! A signature is `base64url(HMAC-SHA256(secret, source_ref ‖ width ‖ height ‖ format))`
//! with the numbers in decimal and the source reference in its encoded URL form.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::params::RequestParams;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct Signer {
    keyed: HmacSha256,
}

impl Signer {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, InvalidLength> {
        Ok(Self {
            keyed: HmacSha256::new_from_slice(secret.as_ref())?,
        })
    }

    fn mac(&self, source_ref: &str, width: &str, height: &str, format: &str) -> HmacSha256 {
        let mut mac = self.keyed.clone();
        mac.update(source_ref.as_bytes());
        mac.update(width.as_bytes());
        mac.update(height.as_bytes());
        mac.update(format.as_bytes());
        mac
    }

    pub fn sign(&self, source_ref: &str, width: u32, height: u32, format: &str) -> String {
        self.sign_raw(source_ref, &width.to_string(), &height.to_string(), format)
    }

    /// Signs the fields exactly as they appear in the request path.
    pub fn sign_raw(&self, source_ref: &str, width: &str, height: &str, format: &str) -> String {
        let tag = self
            .mac(source_ref, width, height, format)
            .finalize()
            .into_bytes();
        URL_SAFE_NO_PAD.encode(tag)
    }

    /// Constant-time check of `params.signature`; malformed signatures are simply invalid.
    pub fn verify(&self, params: &RequestParams) -> bool {
        let Ok(tag) = URL_SAFE_NO_PAD.decode(params.signature.trim_end_matches('=')) else {
            return false;
        };
        self.mac(
            &params.source_ref,
            &params.width,
            &params.height,
            &params.output_format,
        )
        .verify_slice(&tag)
        .is_ok()
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer").finish_non_exhaustive()
    }
}
