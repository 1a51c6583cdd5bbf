pub mod cache_coordinator;
pub mod config;
pub mod content_fetcher;
pub mod evictor;
pub mod handlers_health;
pub mod handlers_thumbnail;
pub mod image_converter;
pub mod mimetype_detector;
pub mod params;
pub mod scheduler;
pub mod service;
pub mod signature;
pub mod thumbnail_generator;
pub mod thumbnail_types;
pub mod warp_helpers;
