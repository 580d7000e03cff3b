use serde_json::Value;

pub mod plan;
pub mod query;
pub mod response;
pub mod schema;
pub mod scrape;
pub mod search;

pub use plan::PlanTool;
pub use query::{QUERY_MISS, QueryTool};
pub use response::ResponseTool;
pub use schema::{ArgField, ArgKind, ArgSchema, Rule};
pub use scrape::ScrapeTool;
pub use search::{SEARCH_FAILED, SearchTool};

pub const PLAN: &str = "plan";
pub const SEARCH: &str = "search";
pub const SCRAPE: &str = "scrape";
pub const QUERY: &str = "query";
pub const RESPONSE: &str = "response";

pub fn extract_string_arg(args: &Value, key: &str) -> anyhow::Result<String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("Missing '{}' parameter", key))
        .map(|s| s.to_string())
}

pub fn extract_string_list_arg(args: &Value, key: &str) -> anyhow::Result<Vec<String>> {
    let items = args
        .get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow::anyhow!("Missing '{}' parameter", key))?;

    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(|s| s.trim().to_string())
                .ok_or_else(|| anyhow::anyhow!("'{}' must only contain strings", key))
        })
        .collect()
}

/// Cuts `text` to at most `max_chars` characters without splitting one.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_list_arg_trims_items() {
        let args = json!({ "steps": [" a ", "b"] });
        assert_eq!(extract_string_list_arg(&args, "steps").unwrap(), vec!["a", "b"]);
        assert!(extract_string_list_arg(&args, "missing").is_err());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}
