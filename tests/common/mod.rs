#![allow(dead_code)]

use image::{ImageBuffer, ImageFormat, Rgb};
use std::collections::HashSet;
use std::io::Cursor;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use thumbnailer::cache_coordinator::CacheCoordinator;
use thumbnailer::config::DimensionBounds;
use thumbnailer::content_fetcher::ContentFetcher;
use thumbnailer::image_converter::{Engine, ImageConverter};
use thumbnailer::params::{encode_source_ref, ParamValidator, RequestParams};
use thumbnailer::service::ThumbnailService;
use thumbnailer::signature::Signer;
use thumbnailer::thumbnail_generator::ThumbnailGenerator;
use thumbnailer::thumbnail_types::CacheLayout;

pub const SECRET: &str = "integration-secret";

/// What the fake origin does with each request.
#[derive(Clone)]
pub enum Behavior {
    /// Complete HTTP response written in one go after an optional delay.
    Respond { raw: Vec<u8>, delay: Duration },
    /// Accepts the request and never answers.
    Hang,
    /// Announces `declared_len` bytes, sends `first_chunk`, then streams filler until the peer goes away.
    Endless {
        first_chunk: Vec<u8>,
        declared_len: u64,
    },
}

pub struct Origin {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicUsize>,
    pub bytes_sent: Arc<AtomicU64>,
    pub finished: Arc<AtomicBool>,
}

impl Origin {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

pub async fn spawn_origin(behavior: Behavior) -> Origin {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let bytes_sent = Arc::new(AtomicU64::new(0));
    let finished = Arc::new(AtomicBool::new(false));

    let origin = Origin {
        addr,
        hits: hits.clone(),
        bytes_sent: bytes_sent.clone(),
        finished: finished.clone(),
    };

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            hits.fetch_add(1, Ordering::SeqCst);
            let behavior = behavior.clone();
            let bytes_sent = bytes_sent.clone();
            let finished = finished.clone();
            tokio::spawn(async move {
                serve(socket, behavior, bytes_sent).await;
                finished.store(true, Ordering::SeqCst);
            });
        }
    });

    origin
}

async fn serve(mut socket: TcpStream, behavior: Behavior, bytes_sent: Arc<AtomicU64>) {
    read_request_head(&mut socket).await;

    match behavior {
        Behavior::Respond { raw, delay } => {
            tokio::time::sleep(delay).await;
            if socket.write_all(&raw).await.is_ok() {
                bytes_sent.fetch_add(raw.len() as u64, Ordering::SeqCst);
            }
            let _ = socket.shutdown().await;
        }
        Behavior::Hang => {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        Behavior::Endless {
            first_chunk,
            declared_len,
        } => {
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                declared_len
            );
            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            if socket.write_all(&first_chunk).await.is_err() {
                return;
            }
            bytes_sent.fetch_add(first_chunk.len() as u64, Ordering::SeqCst);

            let filler = vec![b'x'; 64 * 1024];
            while bytes_sent.load(Ordering::SeqCst) < declared_len {
                if socket.write_all(&filler).await.is_err() {
                    break;
                }
                bytes_sent.fetch_add(filler.len() as u64, Ordering::SeqCst);
            }
        }
    }
}

async fn read_request_head(socket: &mut TcpStream) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
}

pub fn http_response(status: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
    let mut raw = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        content_type,
        body.len()
    )
    .into_bytes();
    raw.extend_from_slice(body);
    raw
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x * 5 % 256) as u8, (y * 5 % 256) as u8, 128u8])
    });
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

pub fn formats(list: &[&str]) -> HashSet<String> {
    list.iter().map(|s| s.to_string()).collect()
}

pub fn fetcher(timeout: Duration, max_source_bytes: u64) -> ContentFetcher {
    ContentFetcher::new(timeout, formats(&["jpg", "png", "gif", "webp"]), max_source_bytes).unwrap()
}

pub fn build_service(root: &Path, expose_signature_endpoint: bool) -> Arc<ThumbnailService> {
    let layout = CacheLayout::new(root);
    layout.ensure_dirs().unwrap();

    let generator = ThumbnailGenerator::new(
        layout.clone(),
        fetcher(Duration::from_secs(5), 10 * 1024 * 1024),
        ImageConverter::new(Default::default(), Engine::Builtin, "magick".to_string()),
    );
    let validator = ParamValidator::new(
        DimensionBounds { min: 1, max: 2000 },
        DimensionBounds { min: 1, max: 2000 },
        formats(&["jpg", "jpeg", "png", "webp"]),
    );

    Arc::new(ThumbnailService::new(
        Signer::new(SECRET).unwrap(),
        validator,
        CacheCoordinator::new(layout, generator),
        3600,
        expose_signature_endpoint,
    ))
}

pub fn signed_request(url: &str, width: u32, height: u32, ext: &str) -> RequestParams {
    let source_ref = encode_source_ref(url);
    let signature = Signer::new(SECRET)
        .unwrap()
        .sign(&source_ref, width, height, ext);
    RequestParams {
        source_ref,
        width: width.to_string(),
        height: height.to_string(),
        output_format: ext.to_string(),
        signature,
    }
}
