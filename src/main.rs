use log::{error, info};
use std::net::{IpAddr, TcpListener};
use std::sync::Arc;
use warp::Filter;

use thumbnailer::cache_coordinator::CacheCoordinator;
use thumbnailer::config::Config;
use thumbnailer::evictor::Evictor;
use thumbnailer::handlers_health::build_health_routes;
use thumbnailer::handlers_thumbnail::build_thumbnail_routes;
use thumbnailer::params::ParamValidator;
use thumbnailer::scheduler::EvictionScheduler;
use thumbnailer::service::ThumbnailService;
use thumbnailer::signature::Signer;
use thumbnailer::thumbnail_generator::ThumbnailGenerator;
use thumbnailer::thumbnail_types::CacheLayout;
use thumbnailer::warp_helpers::{cors, handle_rejection};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = Config::from_env()?;
    let host: IpAddr = config.host.parse()?;
    let port = config.port;

    info!("Starting thumbnailer on {}:{}", host, port);
    info!("Media path: {}", config.media_path);
    info!(
        "Dimensions: width [{}, {}], height [{}, {}]",
        config.width.min, config.width.max, config.height.min, config.height.max
    );
    info!("Upload formats: {:?}", config.upload_formats);
    info!("Download formats: {:?}", config.download_formats);

    // Check if port is available BEFORE initializing services
    if !is_port_available(host, port) {
        error!("Port {} is already in use.", port);
        error!(
            "You can check what's using the port with: lsof -i :{}",
            port
        );
        return Err(format!("Port {} is already in use", port).into());
    }

    let service = initialize_service(&config)?;
    if config.expose_signature_endpoint {
        info!("Signature endpoint enabled at /generate_signature");
    }

    let routes = build_health_routes()
        .or(build_thumbnail_routes(service))
        .with(cors())
        .with(warp::log("thumbnailer"))
        .recover(handle_rejection);

    info!(
        "Server started successfully, listening on http://{}:{}",
        host, port
    );

    warp::serve(routes).run((host, port)).await;

    Ok(())
}

fn is_port_available(host: IpAddr, port: u16) -> bool {
    TcpListener::bind((host, port)).is_ok()
}

fn initialize_service(config: &Config) -> Result<Arc<ThumbnailService>, Box<dyn std::error::Error>> {
    let layout = CacheLayout::new(&config.media_path);
    layout.ensure_dirs()?;
    info!("Cache directories ready under {}", layout.root().display());

    let signer = Signer::new(config.secret.as_bytes())
        .map_err(|e| format!("Failed to initialize signer: {}", e))?;
    let generator = ThumbnailGenerator::from_config(config, layout.clone())?;
    let coordinator = CacheCoordinator::new(layout.clone(), generator);

    let _eviction_handle = EvictionScheduler::new(
        Evictor::new(layout.root().to_path_buf()),
        config.eviction.clone(),
    )
    .start();

    Ok(Arc::new(ThumbnailService::new(
        signer,
        ParamValidator::from_config(config),
        coordinator,
        config.cache_control_max_age,
        config.expose_signature_endpoint,
    )))
}
