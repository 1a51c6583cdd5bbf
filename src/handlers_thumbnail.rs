use std::sync::Arc;
use tokio::fs;
use warp::{reject, Filter, Rejection, Reply};

use crate::mimetype_detector;
use crate::params::RequestParams;
use crate::service::ThumbnailService;
use crate::thumbnail_types::ThumbnailError;
use crate::warp_helpers::{with_service, ThumbnailRejection};

/// `GET /{source_ref}/{width}/{height}/{signature}.{ext}`
pub async fn get_thumbnail(
    source_ref: String,
    width: String,
    height: String,
    signed_file: String,
    service: Arc<ThumbnailService>,
) -> Result<Box<dyn Reply>, Rejection> {
    log::debug!(
        "Thumbnail requested for {} at {}x{} ({})",
        source_ref,
        width,
        height,
        signed_file
    );

    let params = RequestParams::from_path(source_ref, width, height, &signed_file)
        .map_err(|e| reject::custom(ThumbnailRejection(Arc::new(e))))?;

    let path = service
        .generate(&params)
        .await
        .map_err(|e| reject::custom(ThumbnailRejection(e)))?;

    let data = fs::read(&path).await.map_err(|e| {
        reject::custom(ThumbnailRejection(Arc::new(ThumbnailError::Io(e))))
    })?;

    let content_type = mimetype_detector::from_path(&path)
        .map(|mime| mime.to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let reply = warp::reply::with_header(data, "content-type", content_type);
    let reply = warp::reply::with_header(
        reply,
        "cache-control",
        format!("public, max-age={}", service.cache_control_max_age),
    );

    Ok(Box::new(reply))
}

/// `GET /generate_signature/{source_ref}/{width}/{height}/{ext}`
pub async fn get_signature(
    source_ref: String,
    width: String,
    height: String,
    ext: String,
    service: Arc<ThumbnailService>,
) -> Result<String, Rejection> {
    if !service.expose_signature_endpoint {
        return Err(reject::not_found());
    }
    Ok(service.signature(&source_ref, &width, &height, &ext))
}

pub fn build_thumbnail_routes(
    service: Arc<ThumbnailService>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let generate_signature = warp::path("generate_signature")
        .and(warp::path::param::<String>())
        .and(warp::path::param::<String>())
        .and(warp::path::param::<String>())
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(warp::get())
        .and(with_service(service.clone()))
        .and_then(get_signature);

    let thumbnail = warp::path::param::<String>()
        .and(warp::path::param::<String>())
        .and(warp::path::param::<String>())
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(warp::get())
        .and(with_service(service))
        .and_then(get_thumbnail);

    generate_signature.or(thumbnail)
}
