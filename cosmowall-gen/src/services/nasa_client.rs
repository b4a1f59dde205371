//! NASA open API client: the image source aggregator
//!
//! Queries three feeds concurrently and normalizes them into
//! [`CandidateImage`]s:
//! - APOD (daily picture), walking back one day at a time
//! - Mars rover photos, one request per rover at a fixed sol
//! - Earth satellite imagery for a fixed point, 30 days in the past
//!
//! A failed upstream call contributes zero candidates; it never aborts the
//! sibling calls or the other feeds.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate};
use cosmowall_common::api::SourceKind;
use cosmowall_common::config::PoolConfig;
use cosmowall_common::time::{Clock, SystemClock};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::http_fetch::{fetch_json, redact_api_key, FetchClient, RetryPolicy};

const NASA_BASE_URL: &str = "https://api.nasa.gov";

/// Rover feeds queried on every aggregation
pub const ROVERS: [&str; 3] = ["curiosity", "opportunity", "spirit"];
/// Most recent photos kept per rover
const PHOTOS_PER_ROVER: usize = 3;

const SATELLITE_LAT: f64 = 29.78;
const SATELLITE_LON: f64 = -95.33;
const SATELLITE_DIM: f64 = 0.15;
const SATELLITE_DAYS_BACK: i64 = 30;

/// One normalized candidate from any feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateImage {
    pub url: String,
    pub title: Option<String>,
    pub captured_date: Option<String>,
    pub source_kind: SourceKind,
}

/// Anything that can produce a merged candidate list
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Merged candidates of all feeds; empty only if every upstream call failed
    async fn fetch_candidate_pool(&self) -> Vec<CandidateImage>;
}

/// APOD entry (only the fields we use)
#[derive(Debug, Clone, Deserialize)]
pub struct ApodEntry {
    pub media_type: String,
    pub hdurl: Option<String>,
    pub title: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoverPhotosResponse {
    pub photos: Vec<RoverPhoto>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoverPhoto {
    pub img_src: String,
    pub earth_date: String,
    pub camera: RoverCamera,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoverCamera {
    pub name: String,
}

/// Earth imagery asset lookup response
#[derive(Debug, Clone, Deserialize)]
pub struct EarthAsset {
    pub url: Option<String>,
    pub date: Option<String>,
}

/// Keep only image entries that expose an HD variant
pub fn apod_candidate(entry: ApodEntry) -> Option<CandidateImage> {
    if entry.media_type != "image" {
        return None;
    }
    let hdurl = entry.hdurl.filter(|u| !u.trim().is_empty())?;
    Some(CandidateImage {
        url: hdurl,
        title: entry.title,
        captured_date: entry.date,
        source_kind: SourceKind::DailyPicture,
    })
}

/// Navigation cameras (NAVCAM, NAV_LEFT_A, ...) produce grayscale terrain shots
pub fn is_navigation_camera(name: &str) -> bool {
    name.to_ascii_uppercase().contains("NAV")
}

pub fn is_jpeg_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.ends_with(".jpg") || lower.ends_with(".jpeg")
}

/// Filter, newest first, truncated to [`PHOTOS_PER_ROVER`]
pub fn select_rover_photos(photos: Vec<RoverPhoto>, rover: &str) -> Vec<CandidateImage> {
    let mut kept: Vec<RoverPhoto> = photos
        .into_iter()
        .filter(|p| !is_navigation_camera(&p.camera.name) && is_jpeg_url(&p.img_src))
        .collect();

    // ISO dates sort lexicographically
    kept.sort_by(|a, b| b.earth_date.cmp(&a.earth_date));
    kept.truncate(PHOTOS_PER_ROVER);

    kept.into_iter()
        .map(|p| CandidateImage {
            url: p.img_src,
            title: Some(format!("{} rover, {}", rover, p.camera.name)),
            captured_date: Some(p.earth_date),
            source_kind: SourceKind::RoverPhoto,
        })
        .collect()
}

type FeedLimiter = governor::RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// One call per `interval` for the sequential calls of one feed; `None` disables spacing
fn feed_limiter(interval: Duration) -> Option<FeedLimiter> {
    governor::Quota::with_period(interval).map(governor::RateLimiter::direct)
}

/// Wait for the feed's next call slot
async fn pace(limiter: &Option<FeedLimiter>) {
    if let Some(limiter) = limiter {
        limiter.until_ready().await;
    }
}

/// Aggregation knobs
#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    pub daily_picture_count: u32,
    pub rover_depth: u32,
    pub inter_call_delay: Duration,
    pub retry: RetryPolicy,
}

impl From<&PoolConfig> for AggregatorSettings {
    fn from(config: &PoolConfig) -> Self {
        Self {
            daily_picture_count: config.daily_picture_count,
            rover_depth: config.rover_depth,
            inter_call_delay: Duration::from_millis(config.inter_call_delay_ms),
            retry: RetryPolicy::default(),
        }
    }
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self::from(&PoolConfig::default())
    }
}

/// NASA open API aggregator
pub struct NasaClient {
    fetcher: Arc<dyn FetchClient>,
    api_key: String,
    base_url: String,
    settings: AggregatorSettings,
    clock: Arc<dyn Clock>,
}

impl NasaClient {
    pub fn new(fetcher: Arc<dyn FetchClient>, api_key: String, settings: AggregatorSettings) -> Self {
        Self {
            fetcher,
            api_key,
            base_url: NASA_BASE_URL.to_string(),
            settings,
            clock: Arc::new(SystemClock),
        }
    }

    /// Point at a different API host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Decide "today" with an injected clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn today(&self) -> NaiveDate {
        self.clock.now().date_naive()
    }

    pub fn apod_url(&self, date: NaiveDate) -> String {
        format!(
            "{}/planetary/apod?api_key={}&date={}",
            self.base_url,
            self.api_key,
            date.format("%Y-%m-%d")
        )
    }

    pub fn rover_url(&self, rover: &str) -> String {
        format!(
            "{}/mars-photos/api/v1/rovers/{}/photos?sol={}&api_key={}",
            self.base_url, rover, self.settings.rover_depth, self.api_key
        )
    }

    pub fn earth_assets_url(&self, date: NaiveDate) -> String {
        format!(
            "{}/planetary/earth/assets?lon={}&lat={}&date={}&dim={}&api_key={}",
            self.base_url,
            SATELLITE_LON,
            SATELLITE_LAT,
            date.format("%Y-%m-%d"),
            SATELLITE_DIM,
            self.api_key
        )
    }

    /// Most recent daily pictures, newest day first
    pub async fn fetch_daily_pictures(&self) -> Vec<CandidateImage> {
        let limiter = feed_limiter(self.settings.inter_call_delay);
        let today = self.today();
        let mut candidates = Vec::new();

        for days_back in 0..self.settings.daily_picture_count {
            pace(&limiter).await;

            let date = today - ChronoDuration::days(i64::from(days_back));
            let url = self.apod_url(date);

            match fetch_json::<ApodEntry, _>(self.fetcher.as_ref(), &url, &self.settings.retry).await {
                Ok(entry) => {
                    let media_type = entry.media_type.clone();
                    match apod_candidate(entry) {
                        Some(candidate) => candidates.push(candidate),
                        None => tracing::debug!(
                            date = %date,
                            media_type = %media_type,
                            "Skipping daily picture without HD image"
                        ),
                    }
                }
                Err(e) => {
                    tracing::warn!(date = %date, error = %e, "Daily picture fetch failed");
                }
            }
        }

        candidates
    }

    /// Newest qualifying photos of every rover
    pub async fn fetch_rover_photos(&self) -> Vec<CandidateImage> {
        let limiter = feed_limiter(self.settings.inter_call_delay);
        let mut candidates = Vec::new();

        for rover in ROVERS {
            pace(&limiter).await;

            let url = self.rover_url(rover);
            match fetch_json::<RoverPhotosResponse, _>(self.fetcher.as_ref(), &url, &self.settings.retry)
                .await
            {
                Ok(response) => {
                    let total = response.photos.len();
                    let selected = select_rover_photos(response.photos, rover);
                    tracing::debug!(rover, total, kept = selected.len(), "Rover photos filtered");
                    candidates.extend(selected);
                }
                Err(e) => {
                    tracing::warn!(rover, error = %e, "Rover photo fetch failed");
                }
            }
        }

        candidates
    }

    /// At most one satellite image of the fixed point
    pub async fn fetch_satellite_imagery(&self) -> Vec<CandidateImage> {
        let date = self.today() - ChronoDuration::days(SATELLITE_DAYS_BACK);
        let url = self.earth_assets_url(date);

        match fetch_json::<EarthAsset, _>(self.fetcher.as_ref(), &url, &self.settings.retry).await {
            Ok(asset) => match asset.url.filter(|u| !u.trim().is_empty()) {
                Some(image_url) => vec![CandidateImage {
                    url: image_url,
                    title: Some("Earth imagery".to_string()),
                    captured_date: asset.date,
                    source_kind: SourceKind::SatelliteImagery,
                }],
                None => {
                    tracing::debug!(url = %redact_api_key(&url), "Satellite asset has no image URL");
                    Vec::new()
                }
            },
            Err(e) => {
                tracing::warn!(date = %date, error = %e, "Satellite imagery fetch failed");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl CandidateSource for NasaClient {
    async fn fetch_candidate_pool(&self) -> Vec<CandidateImage> {
        let (daily, rovers, satellite) = tokio::join!(
            self.fetch_daily_pictures(),
            self.fetch_rover_photos(),
            self.fetch_satellite_imagery(),
        );

        tracing::info!(
            daily_picture = daily.len(),
            rover_photo = rovers.len(),
            satellite_imagery = satellite.len(),
            "Aggregated candidate images"
        );

        let mut merged = daily;
        merged.extend(rovers);
        merged.extend(satellite);
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::http_fetch::{FetchError, FetchResponse};
    use chrono::{TimeZone, Utc};
    use cosmowall_common::time::ManualClock;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    /// Routes requests by URL substring; unmatched URLs fail with a network error
    #[derive(Default)]
    struct RoutedFetcher {
        routes: Vec<(String, Result<FetchResponse, FetchError>)>,
        requested: StdMutex<Vec<String>>,
    }

    impl RoutedFetcher {
        fn route_json(mut self, needle: &str, body: serde_json::Value) -> Self {
            self.routes.push((
                needle.to_string(),
                Ok(FetchResponse {
                    status: 200,
                    content_type: Some("application/json".to_string()),
                    body: body.to_string().into_bytes(),
                }),
            ));
            self
        }

        fn requested(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FetchClient for RoutedFetcher {
        async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
            self.requested.lock().unwrap().push(url.to_string());
            self.routes
                .iter()
                .find(|(needle, _)| url.contains(needle.as_str()))
                .map(|(_, r)| r.clone())
                .unwrap_or_else(|| Err(FetchError::Network(format!("no route for {}", url))))
        }
    }

    fn fixed_clock() -> Arc<dyn Clock> {
        Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()))
    }

    fn settings(daily: u32) -> AggregatorSettings {
        AggregatorSettings {
            daily_picture_count: daily,
            ..AggregatorSettings::default()
        }
    }

    #[tokio::test]
    async fn test_zero_delay_disables_spacing() {
        let limiter = feed_limiter(Duration::ZERO);
        assert!(limiter.is_none());

        let start = std::time::Instant::now();
        for _ in 0..5 {
            pace(&limiter).await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_feed_limiter_allows_first_call_immediately() {
        let limiter = feed_limiter(Duration::from_millis(100));
        assert!(limiter.is_some());

        let start = std::time::Instant::now();
        pace(&limiter).await;
        assert!(start.elapsed() < Duration::from_millis(50));
        pace(&limiter).await;
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    fn photo(src: &str, date: &str, camera: &str) -> RoverPhoto {
        RoverPhoto {
            img_src: src.to_string(),
            earth_date: date.to_string(),
            camera: RoverCamera {
                name: camera.to_string(),
            },
        }
    }

    #[test]
    fn test_apod_candidate_requires_image_with_hd() {
        let image = ApodEntry {
            media_type: "image".into(),
            hdurl: Some("https://apod.nasa.gov/a_hd.jpg".into()),
            title: Some("A".into()),
            date: Some("2024-03-10".into()),
        };
        let video = ApodEntry {
            media_type: "video".into(),
            ..image.clone()
        };
        let no_hd = ApodEntry {
            hdurl: None,
            ..image.clone()
        };

        let candidate = apod_candidate(image).unwrap();
        assert_eq!(candidate.url, "https://apod.nasa.gov/a_hd.jpg");
        assert_eq!(candidate.source_kind, SourceKind::DailyPicture);
        assert!(apod_candidate(video).is_none());
        assert!(apod_candidate(no_hd).is_none());
    }

    #[test]
    fn test_select_rover_photos_filters_sorts_and_truncates() {
        let photos = vec![
            photo("https://mars/1.jpg", "2015-05-01", "FHAZ"),
            photo("https://mars/2.JPG", "2015-05-04", "MAST"),
            photo("https://mars/3.png", "2015-05-05", "MAST"),
            photo("https://mars/4.jpg", "2015-05-06", "NAVCAM"),
            photo("https://mars/5.jpeg", "2015-05-03", "CHEMCAM"),
            photo("https://mars/6.jpg", "2015-05-02", "RHAZ"),
        ];

        let selected = select_rover_photos(photos, "curiosity");
        let urls: Vec<&str> = selected.iter().map(|c| c.url.as_str()).collect();

        assert_eq!(urls, vec!["https://mars/2.JPG", "https://mars/5.jpeg", "https://mars/6.jpg"]);
        assert!(selected.iter().all(|c| c.source_kind == SourceKind::RoverPhoto));
    }

    #[test]
    fn test_navigation_camera_detection() {
        assert!(is_navigation_camera("NAVCAM"));
        assert!(is_navigation_camera("NAV_LEFT_B"));
        assert!(!is_navigation_camera("MAST"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_daily_pictures_walk_back_one_day_at_a_time() {
        let fetcher = Arc::new(
            RoutedFetcher::default()
                .route_json(
                    "date=2024-03-10",
                    json!({"media_type": "image", "hdurl": "https://apod/10.jpg", "title": "Ten", "date": "2024-03-10"}),
                )
                .route_json("date=2024-03-09", json!({"media_type": "video", "url": "https://youtube"}))
                .route_json(
                    "date=2024-03-08",
                    json!({"media_type": "image", "hdurl": "https://apod/08.jpg", "date": "2024-03-08"}),
                ),
        );
        let client = NasaClient::new(fetcher.clone(), "KEY".into(), settings(3)).with_clock(fixed_clock());

        let candidates = client.fetch_daily_pictures().await;

        let urls: Vec<&str> = candidates.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["https://apod/10.jpg", "https://apod/08.jpg"]);
        // Video entry was dropped without a retry
        let requested = fetcher.requested();
        assert_eq!(requested.len(), 3);
        assert!(requested[0].contains("date=2024-03-10"));
        assert!(requested[2].contains("date=2024-03-08"));
    }

    #[tokio::test]
    async fn test_inter_call_delay_spaces_sequential_calls() {
        let fetcher = Arc::new(RoutedFetcher::default().route_json("apod", json!({"media_type": "video"})));
        let client = NasaClient::new(fetcher, "KEY".into(), settings(4)).with_clock(fixed_clock());
        let start = std::time::Instant::now();

        client.fetch_daily_pictures().await;

        // Three gaps of 100ms between four calls, measured on the wall clock
        assert!(start.elapsed() >= Duration::from_millis(290));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_feed_does_not_abort_others() {
        // Only the rover feed answers; APOD and satellite calls exhaust their retries
        let fetcher = Arc::new(RoutedFetcher::default().route_json(
            "mars-photos",
            json!({"photos": [
                {"img_src": "https://mars/a.jpg", "earth_date": "2015-01-01", "camera": {"name": "MAST"}}
            ]}),
        ));
        let client = NasaClient::new(fetcher.clone(), "KEY".into(), settings(2)).with_clock(fixed_clock());

        let pool = client.fetch_candidate_pool().await;

        assert_eq!(pool.len(), ROVERS.len());
        assert!(pool.iter().all(|c| c.source_kind == SourceKind::RoverPhoto));
        // 2 APOD days × 3 attempts + 3 rovers + 1 satellite × 3 attempts
        assert_eq!(fetcher.requested().len(), 2 * 3 + 3 + 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_satellite_request_is_thirty_days_back() {
        let fetcher = Arc::new(RoutedFetcher::default().route_json(
            "earth/assets",
            json!({"url": "https://earth/img.png", "date": "2024-02-09T16:00:00"}),
        ));
        let client = NasaClient::new(fetcher.clone(), "KEY".into(), settings(0)).with_clock(fixed_clock());

        let candidates = client.fetch_satellite_imagery().await;

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].source_kind, SourceKind::SatelliteImagery);
        assert!(fetcher.requested()[0].contains("date=2024-02-09"));
    }

    #[test]
    fn test_urls_carry_api_key_and_depth() {
        let client = NasaClient::new(Arc::new(RoutedFetcher::default()), "KEY".into(), settings(1))
            .with_base_url("http://localhost:9999/");

        let rover = client.rover_url("spirit");
        assert_eq!(
            rover,
            "http://localhost:9999/mars-photos/api/v1/rovers/spirit/photos?sol=1000&api_key=KEY"
        );
    }
}
