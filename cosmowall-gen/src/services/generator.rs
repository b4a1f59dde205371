//! Generation orchestrator
//!
//! Produces N independent slots per pass. Each slot samples one URL from the
//! pool (with replacement), loads it, falls back to the fixed fallback image
//! if that fails, and renders a preview + full-resolution pair.
//!
//! All randomness is drawn up front into [`SlotPlan`]s, so the async part of
//! a pass is deterministic for a given plan and holds no RNG across awaits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cosmowall_common::config::{GenerationConfig, RectanglePolicy};
use cosmowall_common::{FormatSpec, OutputFormat};
use futures::future::join_all;
use image::DynamicImage;
use rand::Rng;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use super::compositor::{self, AccentFractions, AccentRect, Encoding, RenderError};
use super::http_fetch::{fetch_with_retry, FetchClient, FetchError, RetryPolicy};

/// Image loading errors
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Decode failed: {0}")]
    Decode(String),
}

/// Turns a URL into a decoded raster
#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load(&self, url: &str) -> Result<DynamicImage, LoadError>;
}

/// Fetches with retry, decodes off the async runtime
pub struct HttpImageLoader {
    fetcher: Arc<dyn FetchClient>,
    retry: RetryPolicy,
}

impl HttpImageLoader {
    pub fn new(fetcher: Arc<dyn FetchClient>) -> Self {
        Self {
            fetcher,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl ImageLoader for HttpImageLoader {
    async fn load(&self, url: &str) -> Result<DynamicImage, LoadError> {
        let response = fetch_with_retry(self.fetcher.as_ref(), url, &self.retry).await?;

        tokio::task::spawn_blocking(move || image::load_from_memory(&response.body))
            .await
            .map_err(|e| LoadError::Decode(format!("decode task failed: {}", e)))?
            .map_err(|e| LoadError::Decode(e.to_string()))
    }
}

/// Where a slot's image came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotSource {
    Sampled(String),
    Fallback(String),
}

impl SlotSource {
    pub fn url(&self) -> &str {
        match self {
            SlotSource::Sampled(url) | SlotSource::Fallback(url) => url,
        }
    }
}

/// Everything random about one slot, decided before any I/O
#[derive(Debug, Clone, PartialEq)]
pub struct SlotPlan {
    pub index: usize,
    /// `None` when the pool was empty
    pub sampled_url: Option<String>,
    pub preview_fractions: AccentFractions,
    pub full_fractions: AccentFractions,
}

/// One generated output pair
#[derive(Debug, Clone)]
pub struct GenerationSlot {
    pub index: usize,
    pub source: Option<SlotSource>,
    pub preview_rect: Option<AccentRect>,
    pub full_rect: Option<AccentRect>,
    pub preview_artifact: Option<Vec<u8>>,
    pub full_res_artifact: Option<Vec<u8>>,
    pub has_error: bool,
    pub error: Option<String>,
}

impl GenerationSlot {
    fn failed(index: usize, source: Option<SlotSource>, error: String) -> Self {
        Self {
            index,
            source,
            preview_rect: None,
            full_rect: None,
            preview_artifact: None,
            full_res_artifact: None,
            has_error: true,
            error: Some(error),
        }
    }

    pub fn used_fallback(&self) -> bool {
        matches!(self.source, Some(SlotSource::Fallback(_)))
    }
}

/// All slots of one pass, in slot order
#[derive(Debug, Clone)]
pub struct GenerationPass {
    pub format: OutputFormat,
    pub slots: Vec<GenerationSlot>,
    pub created_at: DateTime<Utc>,
}

impl GenerationPass {
    pub fn successful_slots(&self) -> usize {
        self.slots.iter().filter(|s| !s.has_error).count()
    }
}

/// `<product>-<format>-<n>.png` (n is 1-based)
pub fn artifact_file_name(product: &str, format: OutputFormat, index: usize) -> String {
    format!(
        "{}-{}-{}.{}",
        product,
        format,
        index + 1,
        Encoding::full_resolution().extension()
    )
}

/// `<product>-<format>-<n>-preview.jpg`
pub fn preview_file_name(product: &str, format: OutputFormat, index: usize) -> String {
    format!(
        "{}-{}-{}-preview.{}",
        product,
        format,
        index + 1,
        Encoding::preview().extension()
    )
}

/// Orchestrator settings
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorSettings {
    pub slots: usize,
    pub rectangle_policy: RectanglePolicy,
    pub fallback_image_url: String,
}

impl From<&GenerationConfig> for GeneratorSettings {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            slots: config.slots,
            rectangle_policy: config.rectangle_policy,
            fallback_image_url: config.fallback_image_url.clone(),
        }
    }
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self::from(&GenerationConfig::default())
    }
}

/// Generation orchestrator
pub struct Generator {
    loader: Arc<dyn ImageLoader>,
    settings: GeneratorSettings,
}

impl Generator {
    pub fn new(loader: Arc<dyn ImageLoader>, settings: GeneratorSettings) -> Self {
        Self { loader, settings }
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    /// Draw the URL and rectangle fractions of every slot
    pub fn plan<R: Rng + ?Sized>(&self, pool: &[String], rng: &mut R) -> Vec<SlotPlan> {
        (0..self.settings.slots)
            .map(|index| {
                let sampled_url = if pool.is_empty() {
                    None
                } else {
                    Some(pool[rng.gen_range(0..pool.len())].clone())
                };
                let preview_fractions = AccentFractions::sample(rng);
                let full_fractions = match self.settings.rectangle_policy {
                    RectanglePolicy::Shared => preview_fractions,
                    RectanglePolicy::Independent => AccentFractions::sample(rng),
                };
                SlotPlan {
                    index,
                    sampled_url,
                    preview_fractions,
                    full_fractions,
                }
            })
            .collect()
    }

    /// Plan and run a full pass at the format's own dimensions
    pub async fn generate_all<R>(&self, format: OutputFormat, pool: &[String], rng: &mut R) -> GenerationPass
    where
        R: Rng + Send + ?Sized,
    {
        let plans = self.plan(pool, rng);
        self.execute(format, format.spec(), plans).await
    }

    /// Run planned slots concurrently; output order follows slot index
    pub async fn execute(&self, format: OutputFormat, spec: FormatSpec, plans: Vec<SlotPlan>) -> GenerationPass {
        let mut slots = join_all(plans.into_iter().map(|plan| self.run_slot(spec, plan))).await;
        slots.sort_by_key(|slot| slot.index);

        let pass = GenerationPass {
            format,
            slots,
            created_at: Utc::now(),
        };
        tracing::info!(
            format = %format,
            slots = pass.slots.len(),
            succeeded = pass.successful_slots(),
            "Generation pass complete"
        );
        pass
    }

    /// Sampled image → fallback image → slot error
    async fn acquire(&self, plan: &SlotPlan) -> Result<(SlotSource, DynamicImage), String> {
        let chain = plan
            .sampled_url
            .iter()
            .map(|url| SlotSource::Sampled(url.clone()))
            .chain(std::iter::once(SlotSource::Fallback(
                self.settings.fallback_image_url.clone(),
            )));

        let mut failures = Vec::new();
        for source in chain {
            match self.loader.load(source.url()).await {
                Ok(image) => return Ok((source, image)),
                Err(e) => {
                    tracing::warn!(slot = plan.index, url = %source.url(), error = %e, "Slot image load failed");
                    failures.push(e.to_string());
                }
            }
        }

        Err(format!("all image sources failed: {}", failures.join("; ")))
    }

    async fn run_slot(&self, spec: FormatSpec, plan: SlotPlan) -> GenerationSlot {
        let (source, image) = match self.acquire(&plan).await {
            Ok(loaded) => loaded,
            Err(message) => {
                tracing::error!(slot = plan.index, "Slot failed: {}", message);
                return GenerationSlot::failed(plan.index, None, message);
            }
        };

        let preview_rect = AccentRect::from_fractions(spec.preview_width, spec.preview_height, plan.preview_fractions);
        let full_rect = AccentRect::from_fractions(spec.width, spec.height, plan.full_fractions);

        let rendered = tokio::task::spawn_blocking(move || -> Result<(Vec<u8>, Vec<u8>), RenderError> {
            let preview = compositor::render(
                &image,
                spec.preview_width,
                spec.preview_height,
                &preview_rect,
                Encoding::preview(),
            )?;
            let full = compositor::render(&image, spec.width, spec.height, &full_rect, Encoding::full_resolution())?;
            Ok((preview, full))
        })
        .await;

        match rendered {
            Ok(Ok((preview, full))) => {
                tracing::debug!(
                    slot = plan.index,
                    url = %source.url(),
                    preview_bytes = preview.len(),
                    full_bytes = full.len(),
                    "Slot rendered"
                );
                GenerationSlot {
                    index: plan.index,
                    source: Some(source),
                    preview_rect: Some(preview_rect),
                    full_rect: Some(full_rect),
                    preview_artifact: Some(preview),
                    full_res_artifact: Some(full),
                    has_error: false,
                    error: None,
                }
            }
            Ok(Err(e)) => {
                tracing::error!(slot = plan.index, error = %e, "Slot render failed");
                GenerationSlot::failed(plan.index, Some(source), e.to_string())
            }
            Err(e) => {
                tracing::error!(slot = plan.index, error = %e, "Slot render task failed");
                GenerationSlot::failed(plan.index, Some(source), format!("render task failed: {}", e))
            }
        }
    }
}

/// Latest published pass, replaced whole
#[derive(Default)]
pub struct GenerationStore {
    latest: RwLock<Option<Arc<GenerationPass>>>,
}

impl GenerationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a finished pass
    pub async fn publish(&self, pass: GenerationPass) -> Arc<GenerationPass> {
        let pass = Arc::new(pass);
        *self.latest.write().await = Some(Arc::clone(&pass));
        pass
    }

    pub async fn latest(&self) -> Option<Arc<GenerationPass>> {
        self.latest.read().await.clone()
    }
}
