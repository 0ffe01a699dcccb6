use std::time::Duration;

use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use wayfarer_core::tool::{Error as ToolError, Tool, ToolResult};

const SEARCH_ENDPOINT: &str = "https://api.tavily.com/search";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_RESULTS_CAP: u8 = 10;

fn default_max_results() -> u8 {
    5
}

#[derive(Deserialize, JsonSchema)]
pub struct WebSearchParameters {
    #[schemars(description = "What to search the web for.")]
    query: String,
    #[schemars(
        description = "How many results to return, defaults to 5, at most 10."
    )]
    #[serde(default = "default_max_results")]
    max_results: u8,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: u8,
}

#[derive(Deserialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    title: String,
    url: String,
    content: String,
}

/// A generic web search tool backed by the Tavily API.
pub struct WebSearchTool {
    client: reqwest::Client,
    api_key: String,
    parameter_schema: Value,
}

impl WebSearchTool {
    /// Creates a web search tool using the given API key.
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("HTTP client construction only fails without a TLS backend");
        WebSearchTool {
            client,
            api_key: api_key.into(),
            parameter_schema: schema_for!(WebSearchParameters).to_value(),
        }
    }
}

impl Tool for WebSearchTool {
    type Input = WebSearchParameters;

    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        r#"
Searches the web for up-to-date information that the travel lookups don't cover, like visa rules, weather or events. Returns result titles, links and snippets as JSON."#
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: WebSearchParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let client = self.client.clone();
        let api_key = self.api_key.clone();
        async move {
            let max_results = input.max_results.min(MAX_RESULTS_CAP);
            let request = SearchRequest {
                api_key: &api_key,
                query: &input.query,
                max_results,
            };
            let response = client
                .post(SEARCH_ENDPOINT)
                .json(&request)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|err| {
                    warn!("web search failed: {err}");
                    ToolError::execution_error().with_reason(format!(
                        "The web search service is unavailable: {err}"
                    ))
                })?;
            let response: SearchResponse =
                response.json().await.map_err(|err| {
                    ToolError::execution_error().with_reason(format!(
                        "The web search service returned an unreadable \
                         response: {err}"
                    ))
                })?;

            if response.results.is_empty() {
                return Err(ToolError::execution_error()
                    .with_reason("No results for that query."));
            }
            let results: Vec<_> = response
                .results
                .into_iter()
                .map(|hit| {
                    json!({
                        "title": hit.title,
                        "url": hit.url,
                        "snippet": hit.content,
                    })
                })
                .collect();
            Ok(json!({ "results": results }).to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_results_is_capped() {
        let input: WebSearchParameters =
            serde_json::from_value(json!({ "query": "Paris in July" }))
                .unwrap();
        assert_eq!(input.max_results, 5);

        let input: WebSearchParameters = serde_json::from_value(
            json!({ "query": "Paris in July", "max_results": 50 }),
        )
        .unwrap();
        assert_eq!(input.max_results.min(MAX_RESULTS_CAP), 10);
    }
}
