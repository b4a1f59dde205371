//! Service layer: upstream fetching, pool building, rendering, generation

pub mod compositor;
pub mod generator;
pub mod http_fetch;
pub mod image_pool;
pub mod nasa_client;

pub use compositor::{AccentFractions, AccentRect, CoverFit, Encoding, RenderError, SourceRegion};
pub use generator::{
    artifact_file_name, preview_file_name, GenerationPass, GenerationSlot, GenerationStore, Generator,
    GeneratorSettings, HttpImageLoader, ImageLoader, LoadError, SlotPlan, SlotSource,
};
pub use http_fetch::{fetch_with_retry, FetchClient, FetchError, FetchResponse, ReqwestFetcher, RetryPolicy};
pub use image_pool::{finalize_pool, ImagePoolService, PoolSettings, FALLBACK_IMAGES};
pub use nasa_client::{AggregatorSettings, CandidateImage, CandidateSource, NasaClient};
