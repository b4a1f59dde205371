//! cosmowall-gen library interface
//!
//! Exposes the services and router for the binary and integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use cosmowall_common::config::TomlConfig;
use cosmowall_common::{FormatSpec, FormatTable, OutputFormat, ResponseCache};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::services::{
    AggregatorSettings, FetchClient, FetchError, GenerationPass, GenerationStore, Generator, GeneratorSettings, HttpImageLoader,
    ImagePoolService, NasaClient, PoolSettings, ReqwestFetcher,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Cached image-pool builder
    pub pool_service: Arc<ImagePoolService>,
    /// Slot renderer
    pub generator: Arc<Generator>,
    /// Latest published generation pass
    pub generations: Arc<GenerationStore>,
    /// Client used by the image relay
    pub relay_fetcher: Arc<dyn FetchClient>,
    /// Source of slot sampling randomness
    pub rng: Arc<Mutex<StdRng>>,
    /// Prefix of downloaded artifact names
    pub product_name: String,
    /// Canvas sizes per output format
    pub format_specs: FormatTable,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        pool_service: Arc<ImagePoolService>,
        generator: Arc<Generator>,
        relay_fetcher: Arc<dyn FetchClient>,
        product_name: impl Into<String>,
    ) -> Self {
        Self {
            pool_service,
            generator,
            generations: Arc::new(GenerationStore::new()),
            relay_fetcher,
            rng: Arc::new(Mutex::new(StdRng::from_entropy())),
            product_name: product_name.into(),
            format_specs: FormatTable::default(),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Wire the production services from configuration
    pub fn from_config(config: &TomlConfig, api_key: String) -> Result<Self, FetchError> {
        let fetcher: Arc<dyn FetchClient> =
            Arc::new(ReqwestFetcher::new(Duration::from_secs(config.pool.request_timeout_secs))?);

        let nasa = NasaClient::new(
            Arc::clone(&fetcher),
            api_key,
            AggregatorSettings::from(&config.pool),
        );
        let pool_service = ImagePoolService::new(
            Arc::new(nasa),
            Arc::new(ResponseCache::new()),
            PoolSettings::from(&config.pool),
        );
        let generator = Generator::new(
            Arc::new(HttpImageLoader::new(Arc::clone(&fetcher))),
            GeneratorSettings::from(&config.generation),
        );

        Ok(Self::new(
            Arc::new(pool_service),
            Arc::new(generator),
            fetcher,
            config.product_name.clone(),
        ))
    }

    /// Deterministic slot sampling
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Arc::new(Mutex::new(StdRng::seed_from_u64(seed)));
        self
    }

    pub fn with_format_specs(mut self, format_specs: FormatTable) -> Self {
        self.format_specs = format_specs;
        self
    }

    /// Canvas dimensions for a format
    pub fn format_spec(&self, format: OutputFormat) -> FormatSpec {
        self.format_specs.get(format)
    }

    /// Fetch the pool, run one pass and publish it
    pub async fn generate_pass(&self, format: OutputFormat) -> Arc<GenerationPass> {
        let pool = self.pool_service.image_pool().await;
        if !pool.success {
            tracing::warn!("Generating from a degraded image pool");
        }

        let plans = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            self.generator.plan(&pool.images, &mut *rng)
        };

        let pass = self.generator.execute(format, self.format_spec(format), plans).await;
        self.generations.publish(pass).await
    }

    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::image_routes())
        .merge(api::relay_routes())
        .merge(api::generate_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
