//! DX cluster spots tool (HamQTH CSV feed).

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use log::{debug, info};
use reqwest::Client;
use tokio::sync::Mutex;

use pgate_agent::{ToolDefinition, ToolRegistry};

use crate::tools::bands::{mode_aliases, mode_matches};

const HAMQTH_API_URL: &str = "https://www.hamqth.com/dxc_csv.php";
/// The feed refreshes every 15 seconds; cache for that long.
const CACHE_DURATION: Duration = Duration::from_secs(15);

/// One parsed spot line.
#[derive(Debug, Clone)]
struct DxSpot {
    dx_call: String,
    freq_khz: f64,
    spotter: String,
    comment: String,
    time: NaiveDateTime,
    raw_time: String,
    band: String,
    mode: String,
}

/// Parse one `^`-separated feed line.
/// Layout: DXCall^Freq^Spotter^Comment^DateTime^LoTW^eQSL^?^Continent^Band^Country^DXCC
fn parse_line(line: &str) -> Option<DxSpot> {
    let fields: Vec<&str> = line.split('^').collect();
    if fields.len() < 10 {
        return None;
    }

    let freq_khz = fields[1].trim().parse::<f64>().ok()?;
    let raw_time = fields[4].trim().to_string();
    // Time format: "2153 2025-11-05" (HHMM YYYY-MM-DD).
    let time = NaiveDateTime::parse_from_str(&raw_time, "%H%M %Y-%m-%d").ok()?;

    let comment = fields[3].trim().to_string();
    let comment_upper = comment.to_uppercase();
    let mode = ["ssb", "cw", "digital", "ft8", "ft4", "rtty", "psk", "phone"]
        .iter()
        .flat_map(|group| mode_aliases(group).iter())
        .find(|m| comment_upper.contains(**m))
        .map(|m| m.to_string())
        .unwrap_or_default();

    Some(DxSpot {
        dx_call: fields[0].trim().to_string(),
        freq_khz,
        spotter: fields[2].trim().to_string(),
        comment,
        time,
        raw_time,
        band: fields[9].trim().to_lowercase(),
        mode,
    })
}

/// DX cluster fetcher with a short cache and band/mode filtering.
pub struct DxCluster {
    http: Client,
    api_url: String,
    max_spots: usize,
    cache: Mutex<Option<(Instant, String, Vec<String>)>>,
}

impl DxCluster {
    pub fn new(max_spots: usize) -> Self {
        Self {
            http: Client::new(),
            api_url: HAMQTH_API_URL.to_string(),
            max_spots,
            cache: Mutex::new(None),
        }
    }

    async fn fetch_lines(&self, band: Option<&str>) -> Result<Vec<String>, String> {
        let cache_key = band.unwrap_or("").to_string();

        let mut cache = self.cache.lock().await;
        if let Some((at, key, lines)) = cache.as_ref() {
            if *key == cache_key && at.elapsed() < CACHE_DURATION {
                debug!("[dx] using cached spots");
                return Ok(lines.clone());
            }
        }

        let mut params = vec![("limit", "200".to_string())];
        if let Some(band) = band {
            params.push(("band", band.to_uppercase()));
        }

        let response = self
            .http
            .get(&self.api_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| format!("Failed to fetch DX spots: {}", e))?;
        if !response.status().is_success() {
            return Err(format!("HamQTH API returned status {}", response.status()));
        }
        let text = response.text().await.map_err(|e| format!("Failed to read DX feed: {}", e))?;

        let lines: Vec<String> = text.lines().map(str::to_string).collect();
        debug!("[dx] feed returned {} lines", lines.len());
        *cache = Some((Instant::now(), cache_key, lines.clone()));
        Ok(lines)
    }

    /// Spots filtered by band, mode, and recency; most recent first.
    pub async fn spots(
        &self,
        band: Option<&str>,
        mode: Option<&str>,
        minutes: i64,
    ) -> Result<serde_json::Value, String> {
        info!("[dx] fetching spots (band={:?}, mode={:?}, minutes={})", band, mode, minutes);

        let lines = self.fetch_lines(band).await?;
        let now = Utc::now().naive_utc();
        let threshold = now - ChronoDuration::minutes(minutes);

        let mut spots: Vec<(i64, serde_json::Value)> = Vec::new();
        for line in &lines {
            if line.trim().is_empty() {
                continue;
            }
            let Some(spot) = parse_line(line) else {
                continue;
            };
            if spot.time < threshold {
                continue;
            }
            if let Some(filter) = mode {
                if !spot.mode.is_empty() && !mode_matches(&spot.mode, filter) {
                    continue;
                }
            }

            let age_minutes = (now - spot.time).num_minutes();
            let time_display = spot
                .raw_time
                .split_whitespace()
                .next()
                .unwrap_or(&spot.raw_time)
                .to_string();

            spots.push((
                age_minutes,
                serde_json::json!({
                    "dx_call": spot.dx_call,
                    "frequency": spot.freq_khz,
                    "band": if spot.band.is_empty() { "unknown".to_string() } else { spot.band },
                    "mode": if spot.mode.is_empty() { "Unknown".to_string() } else { spot.mode },
                    "spotter": spot.spotter,
                    "comment": spot.comment.chars().take(50).collect::<String>(),
                    "time": time_display,
                    "age_minutes": age_minutes,
                }),
            ));
        }

        spots.sort_by_key(|(age, _)| *age);
        let total = spots.len();
        let returned: Vec<serde_json::Value> =
            spots.into_iter().take(self.max_spots).map(|(_, v)| v).collect();

        info!("[dx] {} spots after filtering, returning {}", total, returned.len());
        Ok(serde_json::json!({
            "band": band.unwrap_or("all"),
            "mode": mode.unwrap_or("all"),
            "time_window_minutes": minutes,
            "total_spots": total,
            "returned_spots": returned.len(),
            "spots": returned,
        }))
    }
}

/// Register the `dx_cluster` tool.
pub fn register_dx_tool(registry: &mut ToolRegistry, dx: Arc<DxCluster>) {
    let definition = ToolDefinition {
        name: "dx_cluster".to_string(),
        description: "Fetch current DX cluster spots showing active amateur radio stations. \
                      Returns a list of stations (callsigns) currently on the air with their \
                      frequencies, bands, modes, and comments from spotters. You can filter by \
                      band (e.g., '20m', '40m') and mode (e.g., 'CW', 'SSB', 'FT8'). Use this \
                      when users ask about DX spots, what's on the air, cluster spots, or \
                      activity on specific bands/modes like '20m CW' or '17m SSB'."
            .to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "band": {
                    "type": "string",
                    "description": "Amateur radio band to filter (e.g., '20m', '40m', '80m'). Leave empty for all bands.",
                    "enum": ["", "160m", "80m", "60m", "40m", "30m", "20m", "17m", "15m", "12m", "10m", "6m", "2m"]
                },
                "mode": {
                    "type": "string",
                    "description": "Operating mode to filter (e.g., 'CW', 'SSB', 'FT8', 'RTTY'). Leave empty for all modes. Supports aliases: 'ssb'=phone modes, 'digital'=all digital modes.",
                    "enum": ["", "CW", "SSB", "FT8", "FT4", "RTTY", "PSK", "digital", "phone"]
                },
                "minutes": {
                    "type": "integer",
                    "description": "How many minutes back to look for spots (default: 30, max: 120)",
                    "default": 30
                }
            },
            "required": []
        }),
    };

    registry.register(
        definition,
        Box::new(move |input| {
            let dx = dx.clone();
            Box::pin(async move {
                let band = input["band"].as_str().filter(|b| !b.is_empty()).map(str::to_string);
                let mode = input["mode"].as_str().filter(|m| !m.is_empty()).map(str::to_string);
                let minutes = input["minutes"].as_i64().unwrap_or(30).min(120);
                dx.spots(band.as_deref(), mode.as_deref(), minutes)
                    .await
                    .map(|v| v.to_string())
            })
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_line() {
        let line = "JA1ABC^14025.0^K0ASM^CW up 2^2153 2025-11-05^L^E^^AS^20m^Japan^339";
        let spot = parse_line(line).unwrap();
        assert_eq!(spot.dx_call, "JA1ABC");
        assert_eq!(spot.freq_khz, 14025.0);
        assert_eq!(spot.spotter, "K0ASM");
        assert_eq!(spot.band, "20m");
        assert_eq!(spot.mode, "CW");
        assert_eq!(spot.time.format("%H%M").to_string(), "2153");
    }

    #[test]
    fn parse_extracts_mode_from_comment() {
        let line = "VK2XYZ^7074.0^W1AW^FT8 loud^0010 2025-11-06^^^^OC^40m^Australia^150";
        let spot = parse_line(line).unwrap();
        assert_eq!(spot.mode, "FT8");
    }

    #[test]
    fn parse_rejects_short_lines() {
        assert!(parse_line("JA1ABC^14025.0^K0ASM").is_none());
        assert!(parse_line("").is_none());
    }

    #[test]
    fn parse_rejects_bad_frequency_or_time() {
        assert!(parse_line("A^xx^B^c^2153 2025-11-05^^^^AS^20m").is_none());
        assert!(parse_line("A^14000^B^c^not-a-time^^^^AS^20m").is_none());
    }
}
