use log::warn;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cache_coordinator::{ArtifactBuilder, CacheCoordinator};
use crate::params::{ParamValidator, RequestParams};
use crate::signature::Signer;
use crate::thumbnail_generator::ThumbnailGenerator;
use crate::thumbnail_types::ThumbnailError;

/// Request pipeline: validate, authorize, then hand off to the coordinator.
pub struct ThumbnailService<B = ThumbnailGenerator> {
    signer: Signer,
    validator: ParamValidator,
    coordinator: Arc<CacheCoordinator<B>>,
    pub cache_control_max_age: u64,
    pub expose_signature_endpoint: bool,
}

impl<B: ArtifactBuilder> ThumbnailService<B> {
    pub fn new(
        signer: Signer,
        validator: ParamValidator,
        coordinator: Arc<CacheCoordinator<B>>,
        cache_control_max_age: u64,
        expose_signature_endpoint: bool,
    ) -> Self {
        Self {
            signer,
            validator,
            coordinator,
            cache_control_max_age,
            expose_signature_endpoint,
        }
    }

    /// Validation and signature failures are returned before any I/O happens.
    pub async fn generate(&self, params: &RequestParams) -> Result<PathBuf, Arc<ThumbnailError>> {
        let validated = self.validator.validate(params).map_err(Arc::new)?;

        if !self.signer.verify(params) {
            warn!("Signature mismatch for source {}", validated.source_url);
            return Err(Arc::new(ThumbnailError::InvalidSignature));
        }

        self.coordinator.acquire(validated.cache_key()).await
    }

    pub fn signature(&self, source_ref: &str, width: &str, height: &str, ext: &str) -> String {
        self.signer.sign_raw(source_ref, width, height, ext)
    }
}
