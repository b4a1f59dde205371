//! Generation pipeline integration tests
//!
//! Real decode and render path (`HttpImageLoader` → compositor) over a
//! fake network.

use async_trait::async_trait;
use cosmowall_common::config::RectanglePolicy;
use cosmowall_common::{FormatSpec, OutputFormat};
use image::{ImageFormat, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use cosmowall_gen::services::{
    FetchClient, FetchError, FetchResponse, Generator, GeneratorSettings, HttpImageLoader, ImageLoader, LoadError,
    RetryPolicy,
};

const FALLBACK: &str = "https://fallback.example/comet.png";

fn png_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb(color));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Serves fixed bodies and counts requests per URL
struct FakeNetwork {
    bodies: HashMap<String, FetchResponse>,
    hits: std::sync::Mutex<HashMap<String, usize>>,
}

impl FakeNetwork {
    fn new(entries: Vec<(&str, FetchResponse)>) -> Self {
        Self {
            bodies: entries.into_iter().map(|(u, r)| (u.to_string(), r)).collect(),
            hits: std::sync::Mutex::new(HashMap::new()),
        }
    }

    fn hits(&self, url: &str) -> usize {
        self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl FetchClient for FakeNetwork {
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        *self.hits.lock().unwrap().entry(url.to_string()).or_insert(0) += 1;
        self.bodies
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Network(format!("connection refused: {}", url)))
    }
}

fn ok(body: Vec<u8>, content_type: &str) -> FetchResponse {
    FetchResponse {
        status: 200,
        content_type: Some(content_type.to_string()),
        body,
    }
}

fn instant_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        rate_limited_backoff: Duration::ZERO,
        failure_backoff: Duration::ZERO,
    }
}

fn canvas() -> FormatSpec {
    FormatSpec {
        width: 96,
        height: 54,
        preview_width: 48,
        preview_height: 27,
    }
}

fn generator(network: Arc<FakeNetwork>) -> Generator {
    let loader = HttpImageLoader::new(network).with_retry(instant_retry());
    Generator::new(
        Arc::new(loader),
        GeneratorSettings {
            slots: 3,
            rectangle_policy: RectanglePolicy::Shared,
            fallback_image_url: FALLBACK.to_string(),
        },
    )
}

#[tokio::test]
async fn test_http_loader_decodes_png() {
    let network = Arc::new(FakeNetwork::new(vec![(
        "https://img.example/a.png",
        ok(png_bytes(20, 10, [1, 2, 3]), "image/png"),
    )]));
    let loader = HttpImageLoader::new(network).with_retry(instant_retry());

    let img = loader.load("https://img.example/a.png").await.unwrap();

    assert_eq!((img.width(), img.height()), (20, 10));
}

#[tokio::test]
async fn test_http_loader_reports_undecodable_bytes() {
    let network = Arc::new(FakeNetwork::new(vec![(
        "https://img.example/text.jpg",
        ok(b"<html>not an image</html>".to_vec(), "text/html"),
    )]));
    let loader = HttpImageLoader::new(Arc::clone(&network) as Arc<dyn FetchClient>).with_retry(instant_retry());

    let err = loader.load("https://img.example/text.jpg").await.unwrap_err();

    assert!(matches!(err, LoadError::Decode(_)));
    // Decode failures are not retried; the fetch itself succeeded
    assert_eq!(network.hits("https://img.example/text.jpg"), 1);
}

#[tokio::test]
async fn test_http_loader_retries_network_failures_three_times() {
    let network = Arc::new(FakeNetwork::new(vec![]));
    let loader = HttpImageLoader::new(Arc::clone(&network) as Arc<dyn FetchClient>).with_retry(instant_retry());

    let err = loader.load("https://down.example/x.jpg").await.unwrap_err();

    assert!(matches!(err, LoadError::Fetch(FetchError::Network(_))));
    assert_eq!(network.hits("https://down.example/x.jpg"), 3);
}

#[tokio::test]
async fn test_pass_renders_real_artifacts() {
    let network = Arc::new(FakeNetwork::new(vec![
        ("https://img.example/a.png", ok(png_bytes(120, 90, [200, 40, 40]), "image/png")),
        ("https://img.example/b.png", ok(png_bytes(60, 120, [40, 200, 40]), "image/png")),
    ]));
    let gen = generator(network);
    let pool = vec!["https://img.example/a.png".to_string(), "https://img.example/b.png".to_string()];
    let mut rng = StdRng::seed_from_u64(9);

    let plans = gen.plan(&pool, &mut rng);
    let pass = gen.execute(OutputFormat::Desktop, canvas(), plans).await;

    assert_eq!(pass.slots.len(), 3);
    for slot in &pass.slots {
        assert!(!slot.has_error, "slot {} failed: {:?}", slot.index, slot.error);
        let full = image::load_from_memory(slot.full_res_artifact.as_ref().unwrap()).unwrap();
        let preview = image::load_from_memory(slot.preview_artifact.as_ref().unwrap()).unwrap();
        assert_eq!((full.width(), full.height()), (96, 54));
        assert_eq!((preview.width(), preview.height()), (48, 27));
    }
}

#[tokio::test]
async fn test_corrupt_sample_falls_back_without_touching_other_slots() {
    let network = Arc::new(FakeNetwork::new(vec![
        ("https://img.example/good.png", ok(png_bytes(80, 45, [10, 10, 200]), "image/png")),
        ("https://img.example/corrupt.jpg", ok(vec![0xFF, 0xD8, 0x00, 0x01], "image/jpeg")),
        (FALLBACK, ok(png_bytes(40, 40, [250, 250, 0]), "image/png")),
    ]));
    let gen = generator(Arc::clone(&network));
    let pool = vec!["https://img.example/corrupt.jpg".to_string()];
    let mut rng = StdRng::seed_from_u64(1);

    let plans = gen.plan(&pool, &mut rng);
    let pass = gen.execute(OutputFormat::Phone, canvas(), plans).await;

    // Every slot sampled the corrupt image and fell back
    assert_eq!(pass.format, OutputFormat::Phone);
    assert!(pass.slots.iter().all(|s| !s.has_error && s.used_fallback()));
    assert_eq!(network.hits(FALLBACK), 3);
}
