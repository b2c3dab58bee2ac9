//! POTA (Parks on the Air) activator spots tool.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use log::info;
use reqwest::Client;
use serde::Deserialize;

use pgate_agent::{ToolDefinition, ToolRegistry};

use crate::tools::bands::freq_khz_to_band;

const POTA_API_URL: &str = "https://api.pota.app/spot/activator";

/// One raw spot from the POTA API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSpot {
    #[serde(default)]
    spotter: String,
    #[serde(default)]
    activator: String,
    #[serde(default)]
    frequency: String,
    #[serde(default)]
    mode: String,
    #[serde(default)]
    reference: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    location_desc: String,
    #[serde(default)]
    spot_time: String,
    #[serde(default)]
    comments: Option<String>,
}

/// POTA spots fetcher with band/time filtering.
pub struct PotaSpots {
    http: Client,
    api_url: String,
    max_spots: usize,
}

impl PotaSpots {
    pub fn new(max_spots: usize) -> Self {
        Self { http: Client::new(), api_url: POTA_API_URL.to_string(), max_spots }
    }

    async fn fetch(&self) -> Result<Vec<RawSpot>, String> {
        let response = self
            .http
            .get(&self.api_url)
            .send()
            .await
            .map_err(|e| format!("Failed to fetch POTA spots: {}", e))?;
        if !response.status().is_success() {
            return Err(format!("POTA API returned status {}", response.status()));
        }
        response
            .json::<Vec<RawSpot>>()
            .await
            .map_err(|e| format!("Failed to parse POTA spots: {}", e))
    }

    /// Spots filtered by band and recency, newest first.
    pub async fn spots(&self, band: Option<&str>, minutes: i64) -> Result<serde_json::Value, String> {
        info!("[pota] fetching spots (band={:?}, minutes={})", band, minutes);
        let raw = self.fetch().await?;
        let threshold = Utc::now().naive_utc() - ChronoDuration::minutes(minutes);

        let mut spots: Vec<serde_json::Value> = Vec::new();
        for spot in raw {
            // Spot time format: "2024-10-24T14:30:00".
            let Ok(spot_time) = NaiveDateTime::parse_from_str(&spot.spot_time, "%Y-%m-%dT%H:%M:%S")
            else {
                continue;
            };
            if spot_time < threshold {
                continue;
            }

            let Ok(freq_khz) = spot.frequency.trim().parse::<f64>() else {
                continue;
            };
            let spot_band = freq_khz_to_band(freq_khz);
            if let Some(wanted) = band {
                if spot_band != Some(wanted) {
                    continue;
                }
            }

            spots.push(serde_json::json!({
                "spotter": spot.spotter,
                "activator": spot.activator,
                "frequency": freq_khz,
                "band": spot_band,
                "mode": spot.mode,
                "park": spot.reference,
                "park_name": spot.name,
                "location": spot.location_desc,
                "time": spot.spot_time,
                "comments": spot.comments.unwrap_or_default(),
            }));
        }

        // Newest first, then cap.
        spots.sort_by(|a, b| b["time"].as_str().cmp(&a["time"].as_str()));
        let total = spots.len();
        spots.truncate(self.max_spots);
        info!("[pota] {} spots after filtering, returning {}", total, spots.len());

        Ok(serde_json::json!({
            "band": band.unwrap_or("all"),
            "time_window_minutes": minutes,
            "count": total,
            "spots": spots,
        }))
    }
}

/// Register the `pota_spots` tool.
pub fn register_pota_tool(registry: &mut ToolRegistry, pota: Arc<PotaSpots>) {
    let definition = ToolDefinition {
        name: "pota_spots".to_string(),
        description: "Fetch current POTA (Parks on the Air) activator spots. Returns a list of \
                      amateur radio operators currently activating parks. You can filter by band \
                      (e.g., '20m', '40m') and time window. Use this when users ask about POTA \
                      activations, park activators, or who's on the air in parks."
            .to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "band": {
                    "type": "string",
                    "description": "Amateur radio band to filter (e.g., '20m', '40m', '80m'). Leave empty for all bands.",
                    "enum": ["160m", "80m", "60m", "40m", "30m", "20m", "17m", "15m", "12m", "10m", "6m", "2m", ""]
                },
                "minutes": {
                    "type": "integer",
                    "description": "How many minutes back to look for spots (default: 30)",
                    "default": 30
                }
            },
            "required": []
        }),
    };

    registry.register(
        definition,
        Box::new(move |input| {
            let pota = pota.clone();
            Box::pin(async move {
                let band = input["band"].as_str().filter(|b| !b.is_empty()).map(str::to_string);
                let minutes = input["minutes"].as_i64().unwrap_or(30);
                pota.spots(band.as_deref(), minutes).await.map(|v| v.to_string())
            })
        }),
    );
}
