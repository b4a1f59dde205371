//! Request/response types of the cosmowall HTTP endpoints

use serde::{Deserialize, Serialize};

use crate::OutputFormat;

/// Upstream feed a candidate image came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    DailyPicture,
    RoverPhoto,
    SatelliteImagery,
}

/// Whether the pool was built from live data or the static list only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolSource {
    Aggregated,
    Fallback,
}

/// Counts describing how a pool was assembled
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolMetadata {
    pub daily_picture: usize,
    pub rover_photo: usize,
    pub satellite_imagery: usize,
    /// Static fallback URLs merged in before dedup
    pub fallback_added: usize,
    pub total_returned: usize,
}

/// GET /api/images response body
///
/// Returned with HTTP 200 even when `success` is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePoolResponse {
    pub success: bool,
    pub images: Vec<String>,
    pub source: PoolSource,
    pub metadata: PoolMetadata,
    /// Epoch milliseconds
    pub timestamp: i64,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

/// Outcome of one generated slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotSummary {
    pub index: usize,
    /// Image actually rendered (sampled or fallback); absent on failure
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub source_url: Option<String>,
    pub used_fallback: bool,
    pub has_error: bool,
    pub file_name: String,
}

/// POST /api/generate response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub success: bool,
    pub format: OutputFormat,
    pub slots: Vec<SlotSummary>,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pool_response_wire_shape() {
        let response = ImagePoolResponse {
            success: true,
            images: vec!["https://example.org/a.jpg".to_string()],
            source: PoolSource::Aggregated,
            metadata: PoolMetadata {
                daily_picture: 1,
                total_returned: 1,
                ..Default::default()
            },
            timestamp: 1_700_000_000_000,
            cached: false,
            error: None,
        };

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["source"], json!("aggregated"));
        assert_eq!(value["metadata"]["totalReturned"], json!(1));
        assert_eq!(value["metadata"]["dailyPicture"], json!(1));
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_failed_pool_response_carries_error() {
        let response = ImagePoolResponse {
            success: false,
            images: vec![],
            source: PoolSource::Fallback,
            metadata: PoolMetadata::default(),
            timestamp: 0,
            cached: false,
            error: Some("upstream down".to_string()),
        };

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["success"], json!(false));
        assert_eq!(value["error"], json!("upstream down"));
    }

    #[test]
    fn test_source_kind_snake_case() {
        assert_eq!(
            serde_json::to_string(&SourceKind::SatelliteImagery).unwrap(),
            "\"satellite_imagery\""
        );
    }
}
