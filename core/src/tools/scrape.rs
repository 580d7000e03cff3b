use crate::config::ScrapeConfig;
use crate::tools::schema::{ArgField, ArgKind, ArgSchema, Rule};
use crate::tools::{SCRAPE, extract_string_arg, truncate_chars};
use crate::traits::{Tool, ToolResult};
use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::warn;

/// Fetches a page and returns the text of its paragraphs.
pub struct ScrapeTool {
    client: reqwest::Client,
    max_chars: usize,
}

impl ScrapeTool {
    pub fn new(config: &ScrapeConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .connect_timeout(std::time::Duration::from_secs(10))
            .user_agent(concat!("stepwise/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .unwrap_or_default();

        Self {
            client,
            max_chars: config.max_chars,
        }
    }

    async fn fetch(&self, url: &str) -> anyhow::Result<String> {
        let response = self.client.get(url).send().await?;
        if response.status() != reqwest::StatusCode::OK {
            anyhow::bail!("unexpected status {}", response.status());
        }
        let body = response.text().await?;
        Ok(extract_paragraphs(&body, self.max_chars))
    }
}

/// Trimmed text of every `<p>`, one per line, cut to `max_chars`.
pub fn extract_paragraphs(html: &str, max_chars: usize) -> String {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("p") else {
        return String::new();
    };

    let text = document
        .select(&selector)
        .map(|p| p.text().collect::<String>().trim().to_string())
        .collect::<Vec<_>>()
        .join("\n");

    truncate_chars(&text, max_chars)
}

#[async_trait]
impl Tool for ScrapeTool {
    fn name(&self) -> &str {
        SCRAPE
    }

    fn description(&self) -> &str {
        "Extract and return the text content from the webpage at the given URL."
    }

    fn schema(&self) -> ArgSchema {
        ArgSchema::new().field(
            ArgField::required(
                "url",
                ArgKind::String,
                "The URL of the webpage to scrape for text content.",
            )
            .rule(Rule::HttpUrl),
        )
    }

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let url = extract_string_arg(&args, "url")?;

        match self.fetch(url.trim()).await {
            Ok(text) => Ok(ToolResult::success(text)),
            Err(e) => {
                warn!(url = %url, error = %e, "page fetch failed");
                Ok(ToolResult::success(String::new()))
            }
        }
    }
}
