//! QRZ.com XML API client and the `qrz_lookup` tool.
//!
//! The XML API hands out a session key valid for 24 hours; the client caches
//! it and re-authenticates transparently when it expires. A failed or
//! disabled lookup is not an error at the authentication layer; callers
//! fall back to a synthesized identity.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::{debug, info, warn};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;
use tokio::sync::Mutex;

use pgate_agent::{ToolDefinition, ToolRegistry};
use pgate_core::OperatorInfo;

const QRZ_API_BASE: &str = "https://xmldata.qrz.com/xml/current/";

/// Pull the text content of the first `<tag>` in the document.
fn xml_text(xml: &str, tag: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut inside = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                inside = e.name().as_ref() == tag.as_bytes();
            }
            Ok(Event::Text(t)) if inside => {
                return t.unescape().ok().map(|s| s.to_string());
            }
            Ok(Event::End(_)) => {
                inside = false;
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

struct QrzSession {
    key: String,
    expires: DateTime<Utc>,
}

/// QRZ.com directory client.
pub struct QrzClient {
    http: Client,
    username: String,
    password: String,
    api_key: String,
    enabled: bool,
    base_url: String,
    session: Mutex<Option<QrzSession>>,
}

impl QrzClient {
    pub fn new(username: &str, password: &str, api_key: &str) -> Self {
        let enabled = !api_key.is_empty() || (!username.is_empty() && !password.is_empty());
        if enabled {
            if api_key.is_empty() {
                info!("[qrz] callsign lookup enabled (using username/password)");
            } else {
                info!("[qrz] callsign lookup enabled (using API key)");
            }
        } else {
            warn!("[qrz] lookup disabled - no credentials provided");
        }

        Self {
            http: Client::new(),
            username: username.to_string(),
            password: password.to_string(),
            api_key: api_key.to_string(),
            enabled,
            base_url: QRZ_API_BASE.to_string(),
            session: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn session_key(&self) -> Result<String, String> {
        let mut session = self.session.lock().await;
        if let Some(s) = session.as_ref() {
            if Utc::now() < s.expires {
                return Ok(s.key.clone());
            }
            info!("[qrz] session expired, requesting new key");
        }

        let mut params = vec![
            ("username", self.username.clone()),
            ("password", self.password.clone()),
        ];
        if !self.api_key.is_empty() {
            params.push(("api", self.api_key.clone()));
        }

        let response = self
            .http
            .get(&self.base_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| format!("QRZ request failed: {}", e))?;
        if !response.status().is_success() {
            return Err(format!("QRZ API returned status {}", response.status()));
        }
        let body = response.text().await.map_err(|e| format!("QRZ read failed: {}", e))?;

        if let Some(key) = xml_text(&body, "Key") {
            info!("[qrz] session key obtained");
            *session = Some(QrzSession {
                key: key.clone(),
                expires: Utc::now() + ChronoDuration::hours(24),
            });
            return Ok(key);
        }

        let error = xml_text(&body, "Error").unwrap_or_else(|| "no session key in reply".into());
        Err(format!("QRZ authentication error: {}", error))
    }

    /// Directory lookup. `Ok(None)` means the callsign is not listed.
    pub async fn lookup(&self, callsign: &str) -> Result<Option<OperatorInfo>, String> {
        if !self.enabled {
            return Err("QRZ lookup is disabled".to_string());
        }

        let key = self.session_key().await?;
        let callsign = callsign.to_uppercase();
        debug!("[qrz] looking up {}", callsign);

        let response = self
            .http
            .get(&self.base_url)
            .query(&[("s", key.as_str()), ("callsign", callsign.as_str())])
            .send()
            .await
            .map_err(|e| format!("QRZ request failed: {}", e))?;
        if !response.status().is_success() {
            return Err(format!("QRZ API returned status {}", response.status()));
        }
        let body = response.text().await.map_err(|e| format!("QRZ read failed: {}", e))?;

        // No <call> element means not found (or a session error).
        let Some(call) = xml_text(&body, "call") else {
            if let Some(error) = xml_text(&body, "Error") {
                warn!("[qrz] lookup error for {}: {}", callsign, error);
            } else {
                info!("[qrz] callsign not found: {}", callsign);
            }
            return Ok(None);
        };

        let fname = xml_text(&body, "fname").unwrap_or_default();
        let name = xml_text(&body, "name").unwrap_or_default();
        let fullname = match (fname.is_empty(), name.is_empty()) {
            (false, false) => format!("{} {}", fname, name),
            (false, true) => fname,
            (true, false) => name,
            (true, true) => call.clone(),
        };

        let address = {
            let mut parts: Vec<String> = Vec::new();
            if let Some(a) = xml_text(&body, "addr1") {
                parts.push(a);
            }
            if let Some(a) = xml_text(&body, "addr2") {
                parts.push(a);
            }
            let mut tail: Vec<String> = Vec::new();
            if let Some(s) = xml_text(&body, "state") {
                tail.push(s);
            }
            if let Some(z) = xml_text(&body, "zip") {
                tail.push(z);
            }
            if !tail.is_empty() {
                parts.push(tail.join(" "));
            }
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        };

        info!("[qrz] looked up {}: {}", callsign, fullname);
        Ok(Some(OperatorInfo {
            call,
            fullname,
            grid: xml_text(&body, "grid"),
            country: xml_text(&body, "country"),
            address,
            license_class: xml_text(&body, "class"),
            license_expires: xml_text(&body, "expires"),
            email: xml_text(&body, "email"),
            latitude: xml_text(&body, "lat"),
            longitude: xml_text(&body, "lon"),
            aliases: xml_text(&body, "aliases"),
        }))
    }
}

// ── Tool registration ───────────────────────────────────────────────────

/// JSON shape of a lookup result for the model.
fn lookup_response(callsign: &str, info: Option<&OperatorInfo>) -> serde_json::Value {
    match info {
        None => serde_json::json!({
            "callsign": callsign,
            "found": false,
            "message": format!("Callsign {} not found in QRZ database", callsign),
        }),
        Some(info) => {
            let mut operator = serde_json::Map::new();
            operator.insert("name".into(), info.fullname.clone().into());
            if let Some(ref v) = info.country {
                operator.insert("country".into(), v.clone().into());
            }
            if let Some(ref v) = info.address {
                operator.insert("address".into(), v.clone().into());
            }
            if let Some(ref v) = info.license_class {
                operator.insert("license_class".into(), v.clone().into());
            }
            if let Some(ref v) = info.license_expires {
                operator.insert("license_expires".into(), v.clone().into());
            }
            if let Some(ref v) = info.grid {
                operator.insert("grid_square".into(), v.clone().into());
            }
            if let (Some(lat), Some(lon)) = (&info.latitude, &info.longitude) {
                operator.insert(
                    "coordinates".into(),
                    serde_json::json!({ "latitude": lat, "longitude": lon }),
                );
            }
            if let Some(ref v) = info.email {
                operator.insert("email".into(), v.clone().into());
            }
            if let Some(ref v) = info.aliases {
                operator.insert("aliases".into(), v.clone().into());
            }
            serde_json::json!({
                "callsign": info.call,
                "found": true,
                "operator": operator,
            })
        }
    }
}

/// Register the `qrz_lookup` tool.
pub fn register_qrz_tool(registry: &mut ToolRegistry, client: Arc<QrzClient>) {
    let definition = ToolDefinition {
        name: "qrz_lookup".to_string(),
        description: "Look up amateur radio callsign information from QRZ.com. Returns operator \
                      name, location, license class, and other details. Use this when users ask \
                      about a specific callsign or want to know information about a ham radio \
                      operator."
            .to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "callsign": {
                    "type": "string",
                    "description": "The amateur radio callsign to look up (e.g., W1AW, K1TTT)"
                }
            },
            "required": ["callsign"]
        }),
    };

    registry.register(
        definition,
        Box::new(move |input| {
            let client = client.clone();
            Box::pin(async move {
                let callsign = input["callsign"]
                    .as_str()
                    .map(|c| c.trim().to_uppercase())
                    .unwrap_or_default();
                if callsign.is_empty() {
                    return Err("Callsign parameter is required".to_string());
                }

                match client.lookup(&callsign).await {
                    Ok(info) => Ok(lookup_response(&callsign, info.as_ref()).to_string()),
                    Err(e) => Err(format!("Error looking up callsign: {}", e)),
                }
            })
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<QRZDatabase version="1.34">
  <Callsign>
    <call>W1AW</call>
    <fname>Hiram</fname>
    <name>Maxim</name>
    <addr2>Newington</addr2>
    <state>CT</state>
    <grid>FN31pr</grid>
    <country>United States</country>
    <class>C</class>
  </Callsign>
  <Session>
    <Key>abcdef0123456789</Key>
  </Session>
</QRZDatabase>"#;

    #[test]
    fn xml_text_extracts_fields() {
        assert_eq!(xml_text(SAMPLE, "call").as_deref(), Some("W1AW"));
        assert_eq!(xml_text(SAMPLE, "grid").as_deref(), Some("FN31pr"));
        assert_eq!(xml_text(SAMPLE, "Key").as_deref(), Some("abcdef0123456789"));
        assert_eq!(xml_text(SAMPLE, "missing"), None);
    }

    #[test]
    fn lookup_response_found_shape() {
        let info = OperatorInfo {
            call: "W1AW".into(),
            fullname: "Hiram Maxim".into(),
            grid: Some("FN31pr".into()),
            ..Default::default()
        };
        let v = lookup_response("W1AW", Some(&info));
        assert_eq!(v["found"], true);
        assert_eq!(v["operator"]["name"], "Hiram Maxim");
        assert_eq!(v["operator"]["grid_square"], "FN31pr");
    }

    #[test]
    fn lookup_response_not_found_shape() {
        let v = lookup_response("X9XXX", None);
        assert_eq!(v["found"], false);
        assert!(v["message"].as_str().unwrap().contains("X9XXX"));
    }

    #[test]
    fn disabled_without_credentials() {
        let client = QrzClient::new("", "", "");
        assert!(!client.is_enabled());
    }

    #[tokio::test]
    async fn disabled_lookup_errors() {
        let client = QrzClient::new("", "", "");
        assert!(client.lookup("W1AW").await.is_err());
    }
}
