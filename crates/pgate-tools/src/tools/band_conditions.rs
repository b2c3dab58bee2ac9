//! HF propagation conditions tool (HamQSL / N0NBH solar XML feed).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;
use tokio::sync::Mutex;

use pgate_agent::{ToolDefinition, ToolRegistry};

const HAMQSL_API_URL: &str = "https://www.hamqsl.com/solarxml.php";
/// The solar feed updates roughly hourly.
const CACHE_DURATION: Duration = Duration::from_secs(3600);

/// Parsed solar/propagation snapshot.
#[derive(Debug, Clone, Default)]
pub struct SolarData {
    pub updated: String,
    pub solar_flux: String,
    pub sunspots: String,
    pub a_index: String,
    pub k_index: String,
    pub x_ray: String,
    pub helium_line: String,
    pub proton_flux: String,
    pub electron_flux: String,
    pub solar_wind: String,
    pub magnetic_field: String,
    pub aurora: String,
    pub signal_noise: String,
    /// `"<band-range>_<day|night>"` → condition (Good/Fair/Poor).
    pub band_conditions: HashMap<String, String>,
    /// VHF phenomenon name → location/condition.
    pub vhf_conditions: HashMap<String, String>,
}

/// Parse the HamQSL solarxml document.
fn parse_solar_xml(xml: &str) -> Result<SolarData, String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut data = SolarData::default();
    let mut current_tag = String::new();
    let mut band_key: Option<String> = None;
    let mut phenomenon_key: Option<String> = None;
    let mut saw_solardata = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                current_tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if current_tag == "solardata" {
                    saw_solardata = true;
                }

                if current_tag == "band" {
                    let mut name = String::new();
                    let mut time = String::new();
                    for attr in e.attributes().flatten() {
                        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                        let value = String::from_utf8_lossy(&attr.value).to_string();
                        match key.as_str() {
                            "name" => name = value,
                            "time" => time = value,
                            _ => {}
                        }
                    }
                    if !name.is_empty() {
                        band_key = Some(format!("{}_{}", name, time).to_lowercase());
                    }
                } else if current_tag == "phenomenon" {
                    let mut name = String::new();
                    let mut location = String::new();
                    for attr in e.attributes().flatten() {
                        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                        let value = String::from_utf8_lossy(&attr.value).to_string();
                        match key.as_str() {
                            "name" => name = value,
                            "location" => location = value,
                            _ => {}
                        }
                    }
                    if !name.is_empty() {
                        data.vhf_conditions.insert(name.to_lowercase(), location);
                        phenomenon_key = Some(name.to_lowercase());
                    }
                }
            }
            Ok(Event::Text(t)) => {
                let text = t.unescape().map(|s| s.to_string()).unwrap_or_default();
                if let Some(key) = band_key.take() {
                    data.band_conditions.insert(key, text);
                    continue;
                }
                if let Some(key) = phenomenon_key.take() {
                    // Some feeds put the condition in the element body rather
                    // than the location attribute.
                    let entry = data.vhf_conditions.entry(key).or_default();
                    if entry.is_empty() {
                        *entry = text;
                    }
                    continue;
                }
                match current_tag.as_str() {
                    "updated" => data.updated = text,
                    "solarflux" => data.solar_flux = text,
                    "sunspots" => data.sunspots = text,
                    "aindex" => data.a_index = text,
                    "kindex" => data.k_index = text,
                    "xray" => data.x_ray = text,
                    "heliumline" => data.helium_line = text,
                    "protonflux" => data.proton_flux = text,
                    "electonflux" => data.electron_flux = text, // feed's own spelling
                    "solarwind" => data.solar_wind = text,
                    "magneticfield" => data.magnetic_field = text,
                    "aurora" => data.aurora = text,
                    "signalnoise" => data.signal_noise = text,
                    _ => {}
                }
            }
            Ok(Event::End(_)) => {
                current_tag.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("Failed to parse solar XML: {}", e)),
            _ => {}
        }
    }

    if !saw_solardata {
        return Err("Invalid XML structure: missing solardata element".to_string());
    }
    Ok(data)
}

/// Band-conditions fetcher with an hour-long cache.
pub struct BandConditions {
    http: Client,
    api_url: String,
    cache: Mutex<Option<(Instant, SolarData)>>,
}

impl BandConditions {
    pub fn new() -> Self {
        Self { http: Client::new(), api_url: HAMQSL_API_URL.to_string(), cache: Mutex::new(None) }
    }

    async fn data(&self) -> Result<SolarData, String> {
        let mut cache = self.cache.lock().await;
        if let Some((at, data)) = cache.as_ref() {
            if at.elapsed() < CACHE_DURATION {
                debug!("[solar] using cached conditions");
                return Ok(data.clone());
            }
        }

        info!("[solar] fetching conditions from {}", self.api_url);
        let response = self
            .http
            .get(&self.api_url)
            .send()
            .await
            .map_err(|e| format!("Failed to fetch band conditions: {}", e))?;
        if !response.status().is_success() {
            return Err(format!("HamQSL API returned status {}", response.status()));
        }
        let xml = response.text().await.map_err(|e| format!("Failed to read feed: {}", e))?;

        let data = parse_solar_xml(&xml)?;
        *cache = Some((Instant::now(), data.clone()));
        Ok(data)
    }

    fn split_day_night(data: &SolarData) -> (HashMap<String, String>, HashMap<String, String>) {
        let mut day = HashMap::new();
        let mut night = HashMap::new();
        for (key, value) in &data.band_conditions {
            if let Some(band) = key.strip_suffix("_day") {
                day.insert(band.to_string(), value.clone());
            } else if let Some(band) = key.strip_suffix("_night") {
                night.insert(band.to_string(), value.clone());
            }
        }
        (day, night)
    }

    fn summary_text(
        data: &SolarData,
        day: &HashMap<String, String>,
        night: &HashMap<String, String>,
    ) -> String {
        let mut lines = Vec::new();
        lines.push(format!("Current Band Conditions (Updated: {})", data.updated));
        lines.push(format!(
            "Solar Flux: {} | Sunspots: {} | K-Index: {}",
            data.solar_flux, data.sunspots, data.k_index
        ));
        lines.push(String::new());
        lines.push("HF Bands (Daytime):".to_string());
        for band in ["80m-40m", "30m-20m", "17m-15m", "12m-10m"] {
            let condition = day.get(band).map(String::as_str).unwrap_or("Unknown");
            let marker = if matches!(condition.to_lowercase().as_str(), "good" | "excellent") {
                " *"
            } else {
                ""
            };
            lines.push(format!("  {}: {}{}", band, condition, marker));
        }
        lines.push(String::new());
        lines.push("HF Bands (Nighttime):".to_string());
        for band in ["80m-40m", "30m-20m", "17m-15m", "12m-10m"] {
            let condition = night.get(band).map(String::as_str).unwrap_or("Unknown");
            let marker = if matches!(condition.to_lowercase().as_str(), "good" | "excellent") {
                " *"
            } else {
                ""
            };
            lines.push(format!("  {}: {}{}", band, condition, marker));
        }
        lines.push(String::new());
        lines.push("Data source: HamQSL.com (N0NBH)".to_string());
        lines.join("\n")
    }

    /// Overall summary: solar indices + day/night band tables.
    pub async fn summary(&self) -> Result<serde_json::Value, String> {
        let data = self.data().await?;
        let (day, night) = Self::split_day_night(&data);
        Ok(serde_json::json!({
            "success": true,
            "updated": data.updated,
            "solar_summary": {
                "solar_flux": data.solar_flux,
                "sunspots": data.sunspots,
                "k_index": data.k_index,
                "a_index": data.a_index,
                "x_ray": data.x_ray,
            },
            "band_conditions_day": day,
            "band_conditions_night": night,
            "summary_text": Self::summary_text(&data, &day, &night),
        }))
    }

    /// Detailed solar indices with interpretation hints.
    pub async fn solar_detail(&self) -> Result<serde_json::Value, String> {
        let data = self.data().await?;
        Ok(serde_json::json!({
            "success": true,
            "updated": data.updated,
            "solar_indices": {
                "solar_flux": data.solar_flux,
                "sunspots": data.sunspots,
                "a_index": data.a_index,
                "k_index": data.k_index,
                "x_ray": data.x_ray,
                "helium_line": data.helium_line,
                "proton_flux": data.proton_flux,
                "electron_flux": data.electron_flux,
                "solar_wind": data.solar_wind,
                "magnetic_field": data.magnetic_field,
                "aurora": data.aurora,
            },
            "explanation": {
                "solar_flux": "Higher values (>150) indicate better HF propagation",
                "k_index": "0-3 = quiet, 4-5 = unsettled, 6-9 = storm conditions",
                "a_index": "Lower is better for propagation",
                "sunspots": "More sunspots generally mean better HF conditions",
            },
        }))
    }

    /// Conditions for one band (the feed groups bands in ranges).
    pub async fn band_detail(&self, band: &str) -> Result<serde_json::Value, String> {
        if band.is_empty() {
            return Ok(serde_json::json!({
                "success": false,
                "error": "No band specified. Please specify a band like '20m' or '40m'",
            }));
        }

        let data = self.data().await?;
        let band_lower = band.to_lowercase();
        let mut matched: Option<String> = None;
        let mut day_condition = None;
        let mut night_condition = None;

        for (key, value) in &data.band_conditions {
            if key.contains(&band_lower) {
                if let Some(range) = key.strip_suffix("_day") {
                    matched = Some(range.to_string());
                    day_condition = Some(value.clone());
                } else if let Some(range) = key.strip_suffix("_night") {
                    matched = Some(range.to_string());
                    night_condition = Some(value.clone());
                }
            }
        }

        match matched {
            None => Ok(serde_json::json!({
                "success": false,
                "error": format!("No condition data for band '{}'", band),
            })),
            Some(range) => Ok(serde_json::json!({
                "success": true,
                "updated": data.updated,
                "band": band,
                "band_group": range,
                "day": day_condition.unwrap_or_else(|| "Unknown".into()),
                "night": night_condition.unwrap_or_else(|| "Unknown".into()),
            })),
        }
    }
}

impl Default for BandConditions {
    fn default() -> Self {
        Self::new()
    }
}

/// Register the `band_conditions` tool.
pub fn register_band_conditions_tool(registry: &mut ToolRegistry, conditions: Arc<BandConditions>) {
    let definition = ToolDefinition {
        name: "band_conditions".to_string(),
        description: "Get current HF amateur radio band propagation conditions and solar \
                      indices. Provides information about which bands are open (80m, 40m, 30m, \
                      20m, 17m, 15m, 12m, 10m), current solar flux, sunspot numbers, K-index, \
                      and geomagnetic conditions. Use this when users ask about band conditions, \
                      propagation, solar activity, which bands are open, or if a specific band \
                      like 20m or 40m is good for operating."
            .to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["summary", "solar", "band_detail"],
                    "description": "Action to perform: 'summary' for overall conditions, 'solar' for detailed solar indices, 'band_detail' for specific band information"
                },
                "band": {
                    "type": "string",
                    "description": "Specific band to query (e.g., '20m', '40m'). Only used with band_detail action"
                }
            },
            "required": ["action"]
        }),
    };

    registry.register(
        definition,
        Box::new(move |input| {
            let conditions = conditions.clone();
            Box::pin(async move {
                let action = input["action"].as_str().unwrap_or("summary");
                let result = match action {
                    "summary" => conditions.summary().await,
                    "solar" => conditions.solar_detail().await,
                    "band_detail" => {
                        let band = input["band"].as_str().unwrap_or("");
                        conditions.band_detail(band).await
                    }
                    other => Err(format!("Unknown action: {}", other)),
                };
                result.map(|v| v.to_string())
            })
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<solar>
  <solardata>
    <updated>01 Aug 2026 1200 GMT</updated>
    <solarflux>142</solarflux>
    <sunspots>88</sunspots>
    <aindex>7</aindex>
    <kindex>2</kindex>
    <xray>B4.2</xray>
    <calculatedconditions>
      <band name="80m-40m" time="day">Fair</band>
      <band name="30m-20m" time="day">Good</band>
      <band name="80m-40m" time="night">Good</band>
      <band name="30m-20m" time="night">Fair</band>
    </calculatedconditions>
    <calculatedvhfconditions>
      <phenomenon name="vhf-aurora" location="northern_hemi">Band Closed</phenomenon>
    </calculatedvhfconditions>
  </solardata>
</solar>"#;

    #[test]
    fn parses_indices_and_bands() {
        let data = parse_solar_xml(SAMPLE).unwrap();
        assert_eq!(data.solar_flux, "142");
        assert_eq!(data.k_index, "2");
        assert_eq!(data.band_conditions.get("80m-40m_day").map(String::as_str), Some("Fair"));
        assert_eq!(data.band_conditions.get("30m-20m_night").map(String::as_str), Some("Fair"));
        assert!(data.vhf_conditions.contains_key("vhf-aurora"));
    }

    #[test]
    fn rejects_xml_without_solardata() {
        assert!(parse_solar_xml("<solar><other/></solar>").is_err());
    }

    #[test]
    fn day_night_split() {
        let data = parse_solar_xml(SAMPLE).unwrap();
        let (day, night) = BandConditions::split_day_night(&data);
        assert_eq!(day.get("30m-20m").map(String::as_str), Some("Good"));
        assert_eq!(night.get("80m-40m").map(String::as_str), Some("Good"));
    }

    #[test]
    fn summary_text_mentions_bands() {
        let data = parse_solar_xml(SAMPLE).unwrap();
        let (day, night) = BandConditions::split_day_night(&data);
        let text = BandConditions::summary_text(&data, &day, &night);
        assert!(text.contains("30m-20m: Good *"));
        assert!(text.contains("Solar Flux: 142"));
        assert!(text.contains("HamQSL.com"));
    }
}
