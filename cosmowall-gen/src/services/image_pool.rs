//! Candidate pool: fallback list, finalization, caching
//!
//! The pool handed to generation is built from aggregated candidates, topped
//! up from [`FALLBACK_IMAGES`] when too few came back, deduplicated,
//! validated, shuffled and truncated. The finished response is cached so
//! concurrent requests within the TTL share one aggregation.

use cosmowall_common::api::{ImagePoolResponse, PoolMetadata, PoolSource, SourceKind};
use cosmowall_common::config::PoolConfig;
use cosmowall_common::time::now_millis;
use cosmowall_common::ResponseCache;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use super::nasa_client::{CandidateImage, CandidateSource};

/// Cache key of the merged image pool
pub const POOL_CACHE_KEY: &str = "image-pool";

/// Known-good images used when the upstream feeds come up short
pub const FALLBACK_IMAGES: &[&str] = &[
    "https://apod.nasa.gov/apod/image/2301/Comet_Hattenbach_1080.jpg",
    "https://apod.nasa.gov/apod/image/2207/SouthernRing_Webb_3846.jpg",
    "https://apod.nasa.gov/apod/image/2207/StephansQuintet_Webb_2000.jpg",
    "https://apod.nasa.gov/apod/image/2207/CarinaCliffs_Webb_3898.jpg",
    "https://apod.nasa.gov/apod/image/2210/PillarsOfCreation_Webb_3000.jpg",
    "https://apod.nasa.gov/apod/image/2112/M31_Horizontal.jpg",
    "https://apod.nasa.gov/apod/image/2204/Rosette_Nebula_HaRGB.jpg",
    "https://apod.nasa.gov/apod/image/2108/Perseid2021_1500.jpg",
    "https://apod.nasa.gov/apod/image/2202/OrionDeep_Rowe_3000.jpg",
    "https://apod.nasa.gov/apod/image/2109/Veil_Tarantola_4000.jpg",
    "https://apod.nasa.gov/apod/image/2306/M51_Hubble_5000.jpg",
    "https://apod.nasa.gov/apod/image/2011/Earthrise_Apollo8_2000.jpg",
    "https://apod.nasa.gov/apod/image/2102/PIA24420_Perseverance_2048.jpg",
    "https://apod.nasa.gov/apod/image/2401/Jupiter_Juno_2000.jpg",
    "https://apod.nasa.gov/apod/image/2303/Saturn_Cassini_4000.jpg",
    "https://apod.nasa.gov/apod/image/2312/ISS_Milky_Way_3000.jpg",
];

/// Finalization knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Below this many aggregated URLs the fallback pool is merged in
    pub floor: usize,
    pub max_size: usize,
    pub cache_ttl_minutes: u64,
}

impl From<&PoolConfig> for PoolSettings {
    fn from(config: &PoolConfig) -> Self {
        Self {
            floor: config.floor,
            max_size: config.max_size,
            cache_ttl_minutes: config.cache_ttl_minutes,
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self::from(&PoolConfig::default())
    }
}

/// Result of [`finalize_pool`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedPool {
    pub images: Vec<String>,
    /// Fallback URLs appended before dedup (0 when the floor was met)
    pub fallback_added: usize,
    /// Final images that came from the aggregator
    pub aggregated_kept: usize,
}

/// Absolute http(s) URL with a host
pub fn is_valid_image_url(candidate: &str) -> bool {
    match url::Url::parse(candidate.trim()) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some(),
        Err(_) => false,
    }
}

/// Turn aggregated candidates into the sampling pool
pub fn finalize_pool<R>(
    candidates: &[CandidateImage],
    fallback: &[String],
    settings: &PoolSettings,
    rng: &mut R,
) -> FinalizedPool
where
    R: Rng + ?Sized,
{
    let mut urls: Vec<&str> = candidates.iter().map(|c| c.url.as_str()).collect();

    let fallback_added = if urls.len() < settings.floor {
        urls.extend(fallback.iter().map(String::as_str));
        fallback.len()
    } else {
        0
    };

    let mut seen = HashSet::new();
    let mut images: Vec<String> = urls
        .into_iter()
        .filter(|u| seen.insert(*u))
        .filter(|u| is_valid_image_url(u))
        .map(str::to_string)
        .collect();

    images.shuffle(rng);
    images.truncate(settings.max_size);

    let aggregated: HashSet<&str> = candidates.iter().map(|c| c.url.as_str()).collect();
    let aggregated_kept = images
        .iter()
        .filter(|u| aggregated.contains(u.as_str()))
        .count();

    FinalizedPool {
        images,
        fallback_added,
        aggregated_kept,
    }
}

fn count_kind(candidates: &[CandidateImage], kind: SourceKind) -> usize {
    candidates.iter().filter(|c| c.source_kind == kind).count()
}

/// Image-pool endpoint logic: cache → aggregate → finalize
pub struct ImagePoolService {
    source: Arc<dyn CandidateSource>,
    cache: Arc<ResponseCache<ImagePoolResponse>>,
    settings: PoolSettings,
    fallback: Vec<String>,
    rng: Mutex<StdRng>,
}

impl ImagePoolService {
    pub fn new(
        source: Arc<dyn CandidateSource>,
        cache: Arc<ResponseCache<ImagePoolResponse>>,
        settings: PoolSettings,
    ) -> Self {
        Self {
            source,
            cache,
            settings,
            fallback: FALLBACK_IMAGES.iter().map(|s| s.to_string()).collect(),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Replace the static fallback list
    pub fn with_fallback(mut self, fallback: Vec<String>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Deterministic shuffling
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn cache(&self) -> &Arc<ResponseCache<ImagePoolResponse>> {
        &self.cache
    }

    pub fn fallback(&self) -> &[String] {
        &self.fallback
    }

    /// Current pool; never fails, degrades to the fallback list
    pub async fn image_pool(&self) -> ImagePoolResponse {
        if let Some(cached) = self.cache.get(POOL_CACHE_KEY).await {
            tracing::debug!(images = cached.images.len(), "Image pool served from cache");
            return ImagePoolResponse {
                cached: true,
                timestamp: now_millis(),
                ..cached
            };
        }

        // A panic inside the aggregator surfaces as a JoinError, not a crash
        let source = Arc::clone(&self.source);
        let candidates = match tokio::spawn(async move { source.fetch_candidate_pool().await }).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::error!(error = %e, "Image aggregation task failed");
                return self.failure_response(format!("Image aggregation failed: {}", e));
            }
        };

        let finalized = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            finalize_pool(&candidates, &self.fallback, &self.settings, &mut *rng)
        };

        if finalized.images.is_empty() {
            tracing::error!(candidates = candidates.len(), "Image pool is empty after finalization");
            return self.failure_response("No valid images available".to_string());
        }

        let source = if finalized.aggregated_kept > 0 {
            PoolSource::Aggregated
        } else {
            PoolSource::Fallback
        };

        let response = ImagePoolResponse {
            success: true,
            metadata: PoolMetadata {
                daily_picture: count_kind(&candidates, SourceKind::DailyPicture),
                rover_photo: count_kind(&candidates, SourceKind::RoverPhoto),
                satellite_imagery: count_kind(&candidates, SourceKind::SatelliteImagery),
                fallback_added: finalized.fallback_added,
                total_returned: finalized.images.len(),
            },
            images: finalized.images,
            source,
            timestamp: now_millis(),
            cached: false,
            error: None,
        };

        tracing::info!(
            images = response.images.len(),
            source = ?response.source,
            fallback_added = response.metadata.fallback_added,
            "Image pool refreshed"
        );

        self.cache
            .set(POOL_CACHE_KEY, response.clone(), self.settings.cache_ttl_minutes)
            .await;

        response
    }

    /// `success: false` body carrying the static list; never cached
    fn failure_response(&self, message: String) -> ImagePoolResponse {
        ImagePoolResponse {
            success: false,
            images: self.fallback.clone(),
            source: PoolSource::Fallback,
            metadata: PoolMetadata {
                fallback_added: self.fallback.len(),
                total_returned: self.fallback.len(),
                ..PoolMetadata::default()
            },
            timestamp: now_millis(),
            cached: false,
            error: Some(message),
        }
    }
}
