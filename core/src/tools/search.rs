use crate::config::SearchConfig;
use crate::tools::schema::{ArgField, ArgKind, ArgSchema, Rule};
use crate::tools::{SEARCH, extract_string_arg};
use crate::traits::{Tool, ToolResult};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

pub const SEARCH_FAILED: &str = "Search failed.";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    link: String,
}

/// Web search through the Google Custom Search JSON API.
pub struct SearchTool {
    client: reqwest::Client,
    config: SearchConfig,
}

impl SearchTool {
    pub fn new(config: SearchConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self { client, config }
    }

    async fn search(&self, query: &str) -> anyhow::Result<String> {
        let api_key = self.config.resolved_api_key();
        let engine_id = self.config.resolved_engine_id();
        if api_key.is_empty() || engine_id.is_empty() {
            anyhow::bail!("search API key or engine id not configured");
        }

        let response = self
            .client
            .get(&self.config.endpoint)
            .query(&[
                ("key", api_key.as_str()),
                ("cx", engine_id.as_str()),
                ("q", query),
                ("start", "1"),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body: SearchResponse = response.json().await?;
        Ok(format_results(&body.items, self.config.max_results))
    }
}

/// Empty when the engine found nothing.
fn format_results(items: &[SearchItem], max_results: usize) -> String {
    items
        .iter()
        .take(max_results)
        .map(|item| {
            format!(
                "Title: {}\nDescription: {}\nURL: {}",
                item.title, item.snippet, item.link
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        SEARCH
    }

    fn description(&self) -> &str {
        "Perform a web search given a query string. The search result will be a list of (Title, Description, URL) tuples."
    }

    fn schema(&self) -> ArgSchema {
        ArgSchema::new().field(
            ArgField::required("query", ArgKind::String, "The search query to be used.")
                .rule(Rule::NonEmpty)
                .rule(Rule::MaxLen(2048)),
        )
    }

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let query = extract_string_arg(&args, "query")?;

        match self.search(query.trim()).await {
            Ok(results) => Ok(ToolResult::success(results)),
            Err(e) => {
                warn!(query = %query, error = %e, "web search failed");
                Ok(ToolResult::error(SEARCH_FAILED))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve_once;
    use serde_json::json;

    fn config(endpoint: String) -> SearchConfig {
        SearchConfig {
            api_key: "key".into(),
            engine_id: "cx".into(),
            endpoint,
            ..SearchConfig::default()
        }
    }

    #[test]
    fn formats_at_most_three_entries() {
        let items: Vec<SearchItem> = (1..=5)
            .map(|i| SearchItem {
                title: format!("T{i}"),
                snippet: format!("D{i}"),
                link: format!("https://e.com/{i}"),
            })
            .collect();
        let text = format_results(&items, 3);
        assert_eq!(text.matches("Title:").count(), 3);
        assert!(text.starts_with("Title: T1\nDescription: D1\nURL: https://e.com/1\n\nTitle: T2"));
    }

    #[tokio::test]
    async fn returns_ranked_results_from_endpoint() {
        let body = json!({
            "items": [
                { "title": "Rust", "snippet": "A language", "link": "https://rust-lang.org" },
                { "title": "Cargo", "snippet": "Build tool", "link": "https://doc.rust-lang.org/cargo" }
            ]
        })
        .to_string();
        let base = serve_once("200 OK", "application/json", &body).await;

        let tool = SearchTool::new(config(format!("{base}/customsearch/v1")));
        let result = tool.execute(json!({ "query": "rust" })).await.unwrap();
        assert!(result.success);
        assert!(result.output.contains("Title: Rust\nDescription: A language"));
        assert!(result.output.contains("URL: https://doc.rust-lang.org/cargo"));
    }

    #[tokio::test]
    async fn server_error_yields_failure_marker() {
        let base = serve_once("500 Internal Server Error", "text/plain", "boom").await;
        let tool = SearchTool::new(config(format!("{base}/customsearch/v1")));

        let result = tool.execute(json!({ "query": "rust" })).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.as_text(), SEARCH_FAILED);
    }

    #[tokio::test]
    async fn missing_credentials_yield_failure_marker() {
        let tool = SearchTool::new(SearchConfig {
            api_key: String::new(),
            engine_id: String::new(),
            api_key_env: "STEPWISE_TEST_UNSET_SEARCH_KEY".into(),
            engine_id_env: "STEPWISE_TEST_UNSET_SEARCH_CX".into(),
            ..SearchConfig::default()
        });
        let result = tool.execute(json!({ "query": "rust" })).await.unwrap();
        assert_eq!(result.as_text(), SEARCH_FAILED);
    }

    #[tokio::test]
    async fn no_hits_is_an_empty_success() {
        let base = serve_once("200 OK", "application/json", r#"{"kind":"customsearch#search"}"#).await;
        let tool = SearchTool::new(config(format!("{base}/customsearch/v1")));

        let result = tool.execute(json!({ "query": "zzqxj" })).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, "");
    }
}
