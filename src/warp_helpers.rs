use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;

use warp::http::StatusCode;
use warp::{reject, Filter, Rejection, Reply};

use crate::service::ThumbnailService;
use crate::thumbnail_types::{ErrorKind, ThumbnailError};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    pub timestamp: String,
}

/// A thumbnail pipeline failure carried through warp's rejection chain.
#[derive(Debug)]
pub struct ThumbnailRejection(pub Arc<ThumbnailError>);

impl reject::Reject for ThumbnailRejection {}

pub fn with_service(
    service: Arc<ThumbnailService>,
) -> impl Filter<Extract = (Arc<ThumbnailService>,), Error = Infallible> + Clone {
    warp::any().map(move || service.clone())
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidParams | ErrorKind::WrongImageContent => StatusCode::BAD_REQUEST,
        ErrorKind::InvalidSignature => StatusCode::FORBIDDEN,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Io | ErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Status and client-facing message; internal details never leave the log.
pub fn describe(err: &ThumbnailError) -> (StatusCode, String) {
    let code = status_for(err.kind());
    let message = match err.kind() {
        ErrorKind::InvalidParams => err.to_string(),
        ErrorKind::WrongImageContent => "Bad Request".to_string(),
        ErrorKind::InvalidSignature => "Forbidden".to_string(),
        ErrorKind::Timeout => "Gateway timeout".to_string(),
        ErrorKind::Io | ErrorKind::Unknown => {
            log::error!("Thumbnail generation failed: {:?}", err);
            "Internal server error".to_string()
        }
    };
    (code, message)
}

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let code;
    let message;
    let timestamp = chrono::Utc::now().to_rfc3339();

    if err.is_not_found() {
        code = StatusCode::NOT_FOUND;
        message = "Not Found".to_string();
    } else if let Some(ThumbnailRejection(thumbnail_error)) = err.find::<ThumbnailRejection>() {
        (code, message) = describe(thumbnail_error);
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        code = StatusCode::METHOD_NOT_ALLOWED;
        message = "Method not allowed".to_string();
    } else {
        log::error!("Unhandled rejection: {:?}", err);
        code = StatusCode::INTERNAL_SERVER_ERROR;
        message = "Internal server error".to_string();
    }

    let error_response = ErrorResponse {
        error: message,
        code: code.as_u16(),
        timestamp,
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&error_response),
        code,
    ))
}

pub fn cors() -> warp::cors::Builder {
    warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "OPTIONS"])
}
