//! Web search tool backed by the Brave Search API.

use crate::http::shared_client;
use crate::tools::registry::Tool;
use crate::tools::types::{
    PropertySchema, ToolContext, ToolDefinition, ToolInputSchema, ToolResult,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};

const BRAVE_SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";
const CACHE_TTL: Duration = Duration::from_secs(900);
const DEFAULT_COUNT: usize = 5;

struct CachedSearch {
    content: String,
    fetched_at: Instant,
}

pub struct WebSearchTool {
    definition: ToolDefinition,
    api_key: Option<String>,
    cache: Mutex<HashMap<String, CachedSearch>>,
}

impl WebSearchTool {
    pub fn new() -> Self {
        let mut properties = HashMap::new();
        properties.insert(
            "query".to_string(),
            PropertySchema {
                schema_type: "string".to_string(),
                description: "The search query.".to_string(),
                default: None,
                items: None,
                enum_values: None,
            },
        );
        properties.insert(
            "count".to_string(),
            PropertySchema {
                schema_type: "integer".to_string(),
                description: format!("Number of results to return (default {}, max 10).", DEFAULT_COUNT),
                default: Some(serde_json::json!(DEFAULT_COUNT)),
                items: None,
                enum_values: None,
            },
        );

        WebSearchTool {
            definition: ToolDefinition {
                name: "web_search".to_string(),
                description: "Search the web for current information. Returns titles, URLs and snippets for the top results.".to_string(),
                input_schema: ToolInputSchema {
                    schema_type: "object".to_string(),
                    properties,
                    required: vec!["query".to_string()],
                },
            },
            api_key: std::env::var("BRAVE_SEARCH_API_KEY").ok(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cache_get(&self, key: &str) -> Option<String> {
        let cache = self.cache.lock();
        cache
            .get(key)
            .filter(|entry| entry.fetched_at.elapsed() < CACHE_TTL)
            .map(|entry| entry.content.clone())
    }

    fn cache_put(&self, key: String, content: String) {
        let mut cache = self.cache.lock();
        cache.retain(|_, entry| entry.fetched_at.elapsed() < CACHE_TTL);
        cache.insert(
            key,
            CachedSearch {
                content,
                fetched_at: Instant::now(),
            },
        );
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct WebSearchParams {
    query: String,
    count: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct BraveSearchResponse {
    web: Option<BraveWebResults>,
}

#[derive(Debug, Deserialize)]
struct BraveWebResults {
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    title: String,
    url: String,
    description: Option<String>,
}

#[async_trait]
impl Tool for WebSearchTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, params: Value, _context: &ToolContext) -> ToolResult {
        let params: WebSearchParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Invalid parameters: {}", e)),
        };

        let query = params.query.trim();
        if query.is_empty() {
            return ToolResult::error("Search query must not be empty");
        }

        let api_key = match &self.api_key {
            Some(key) => key.clone(),
            None => {
                return ToolResult::error(
                    "Web search is not configured (BRAVE_SEARCH_API_KEY is not set)",
                )
            }
        };

        let count = params.count.unwrap_or(DEFAULT_COUNT).clamp(1, 10);
        let cache_key = format!("{}:{}", count, query.to_lowercase());

        if let Some(cached) = self.cache_get(&cache_key) {
            log::debug!("[WEB_SEARCH] Cache hit for '{}'", query);
            return ToolResult::success(cached)
                .with_metadata(serde_json::json!({ "cached": true }));
        }

        log::info!("[WEB_SEARCH] Searching for '{}'", query);

        let response = match shared_client()
            .get(BRAVE_SEARCH_URL)
            .query(&[("q", query), ("count", &count.to_string())])
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &api_key)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("Search request failed: {}", e)),
        };

        if !response.status().is_success() {
            return ToolResult::error(format!(
                "Search API returned HTTP {}",
                response.status().as_u16()
            ));
        }

        let parsed: BraveSearchResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Failed to parse search response: {}", e)),
        };

        let results = parsed.web.map(|w| w.results).unwrap_or_default();
        if results.is_empty() {
            return ToolResult::success(format!("No results found for '{}'.", query));
        }

        let formatted: Vec<String> = results
            .iter()
            .take(count)
            .enumerate()
            .map(|(i, r)| {
                format!(
                    "{}. {}\n   URL: {}\n   {}",
                    i + 1,
                    r.title,
                    r.url,
                    r.description.as_deref().unwrap_or("")
                )
            })
            .collect();
        let content = formatted.join("\n\n");

        self.cache_put(cache_key, content.clone());
        ToolResult::success(content)
            .with_metadata(serde_json::json!({ "result_count": results.len().min(count) }))
    }
}
