//! Web search tool (DuckDuckGo Instant Answer API).

use std::sync::Arc;

use log::info;
use reqwest::Client;
use serde::Deserialize;

use pgate_agent::{ToolDefinition, ToolRegistry};

const DDG_API_URL: &str = "https://api.duckduckgo.com/";

#[derive(Debug, Deserialize, Default)]
struct DdgTopic {
    #[serde(rename = "Text", default)]
    text: String,
    #[serde(rename = "FirstURL", default)]
    first_url: String,
    #[serde(rename = "Topics", default)]
    topics: Vec<DdgTopic>,
}

#[derive(Debug, Deserialize, Default)]
struct DdgResponse {
    #[serde(rename = "Heading", default)]
    heading: String,
    #[serde(rename = "AbstractText", default)]
    abstract_text: String,
    #[serde(rename = "AbstractURL", default)]
    abstract_url: String,
    #[serde(rename = "RelatedTopics", default)]
    related_topics: Vec<DdgTopic>,
}

fn flatten_topics<'a>(topics: &'a [DdgTopic], out: &mut Vec<&'a DdgTopic>) {
    for topic in topics {
        if !topic.text.is_empty() {
            out.push(topic);
        }
        flatten_topics(&topic.topics, out);
    }
}

/// DuckDuckGo search client.
pub struct WebSearch {
    http: Client,
    api_url: String,
    max_results: usize,
}

impl WebSearch {
    pub fn new(max_results: usize) -> Self {
        Self { http: Client::new(), api_url: DDG_API_URL.to_string(), max_results }
    }

    pub async fn search(&self, query: &str) -> Result<serde_json::Value, String> {
        info!("[search] querying: {}", query);

        let response = self
            .http
            .get(&self.api_url)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(|e| format!("Search failed: {}", e))?;
        if !response.status().is_success() {
            return Err(format!("Search API returned status {}", response.status()));
        }
        let body: DdgResponse = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse search response: {}", e))?;

        let mut results = Vec::new();

        // The abstract, when present, is the best answer.
        if !body.abstract_text.is_empty() {
            results.push(serde_json::json!({
                "title": body.heading,
                "url": body.abstract_url,
                "snippet": body.abstract_text,
            }));
        }

        let mut flat = Vec::new();
        flatten_topics(&body.related_topics, &mut flat);
        for topic in flat {
            if results.len() >= self.max_results {
                break;
            }
            results.push(serde_json::json!({
                "title": topic.text.split(" - ").next().unwrap_or(&topic.text),
                "url": topic.first_url,
                "snippet": topic.text,
            }));
        }

        info!("[search] {} results", results.len());
        Ok(serde_json::json!({ "query": query, "results": results }))
    }
}

/// Register the `web_search` tool.
pub fn register_search_tool(registry: &mut ToolRegistry, search: Arc<WebSearch>) {
    let definition = ToolDefinition {
        name: "web_search".to_string(),
        description: "Search the internet for current information. Use this when you need \
                      up-to-date information, facts, news, or information beyond your knowledge \
                      cutoff. Returns a list of search results with titles, URLs, and snippets."
            .to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query to look up on the internet"
                }
            },
            "required": ["query"]
        }),
    };

    registry.register(
        definition,
        Box::new(move |input| {
            let search = search.clone();
            Box::pin(async move {
                let query = input["query"].as_str().unwrap_or("").trim().to_string();
                if query.is_empty() {
                    return Err("No query provided".to_string());
                }
                search.search(&query).await.map(|v| v.to_string())
            })
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ddg_response_deserializes() {
        let raw = serde_json::json!({
            "Heading": "Amateur radio",
            "AbstractText": "Amateur radio is a hobby.",
            "AbstractURL": "https://en.wikipedia.org/wiki/Amateur_radio",
            "RelatedTopics": [
                { "Text": "Ham radio - overview", "FirstURL": "https://example.org/a" },
                { "Topics": [
                    { "Text": "Nested topic", "FirstURL": "https://example.org/b" }
                ]}
            ]
        });
        let resp: DdgResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(resp.heading, "Amateur radio");

        let mut flat = Vec::new();
        flatten_topics(&resp.related_topics, &mut flat);
        assert_eq!(flat.len(), 2);
        assert_eq!(flat[1].text, "Nested topic");
    }

    #[test]
    fn empty_response_tolerated() {
        let resp: DdgResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(resp.abstract_text.is_empty());
        assert!(resp.related_topics.is_empty());
    }
}
