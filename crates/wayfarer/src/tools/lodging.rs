use std::sync::Arc;

use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::{Value, json};
use wayfarer_core::tool::{Error as ToolError, Tool, ToolResult};

use crate::tools::catalog::Catalog;
use crate::tools::validate_iso_date;

fn default_guests() -> u32 {
    1
}

#[derive(Deserialize, JsonSchema)]
pub struct LodgingSearchParameters {
    #[schemars(description = "City to stay in.")]
    location: String,
    #[schemars(description = "Check-in date in YYYY-MM-DD format.")]
    check_in: String,
    #[schemars(description = "Check-out date in YYYY-MM-DD format.")]
    check_out: String,
    #[schemars(description = "Number of guests, defaults to 1.")]
    #[serde(default = "default_guests")]
    guests: u32,
}

/// A tool for finding places to stay.
pub struct LodgingSearchTool {
    catalog: Arc<Catalog>,
    parameter_schema: Value,
}

impl LodgingSearchTool {
    /// Creates a lodging search tool answering from the given catalog.
    #[inline]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        LodgingSearchTool {
            catalog,
            parameter_schema: schema_for!(LodgingSearchParameters).to_value(),
        }
    }
}

impl Tool for LodgingSearchTool {
    type Input = LodgingSearchParameters;

    fn name(&self) -> &str {
        "find_lodging"
    }

    fn description(&self) -> &str {
        r#"
Searches for accommodation in a city.
Requires a location, a check-in date and a check-out date; optionally takes the number of guests. Returns lodging details as JSON."#
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: LodgingSearchParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let catalog = Arc::clone(&self.catalog);
        async move {
            validate_iso_date("check_in", &input.check_in)?;
            validate_iso_date("check_out", &input.check_out)?;
            if input.check_in >= input.check_out {
                return Err(ToolError::invalid_input().with_reason(
                    "`check_out` must be after `check_in`",
                ));
            }

            let options = catalog.find_lodging(
                &input.location,
                &input.check_in,
                &input.check_out,
                input.guests,
            );
            if options.is_empty() {
                return Err(ToolError::execution_error().with_reason(
                    format!(
                        "No places to stay in {} for those dates and {} \
                         guest(s).",
                        input.location, input.guests
                    ),
                ));
            }
            Ok(json!({ "lodging": options }).to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_tool() -> LodgingSearchTool {
        LodgingSearchTool::new(Arc::new(Catalog::demo()))
    }

    #[tokio::test]
    async fn test_search_with_default_party_size() {
        let tool = demo_tool();
        let output = tool
            .execute(LodgingSearchParameters {
                location: "paris".to_owned(),
                check_in: "2025-07-10".to_owned(),
                check_out: "2025-07-17".to_owned(),
                guests: default_guests(),
            })
            .await
            .unwrap();
        let payload: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(payload["lodging"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_inverted_dates_are_rejected() {
        let tool = demo_tool();
        let err = tool
            .execute(LodgingSearchParameters {
                location: "Paris".to_owned(),
                check_in: "2025-07-17".to_owned(),
                check_out: "2025-07-10".to_owned(),
                guests: 1,
            })
            .await
            .unwrap_err();
        assert!(err.reason().contains("check_out"));
    }

    #[tokio::test]
    async fn test_no_availability_is_a_tool_error() {
        let tool = demo_tool();
        let err = tool
            .execute(LodgingSearchParameters {
                location: "Reykjavik".to_owned(),
                check_in: "2025-07-10".to_owned(),
                check_out: "2025-07-17".to_owned(),
                guests: 1,
            })
            .await
            .unwrap_err();
        assert!(err.reason().contains("No places to stay"));
    }
}
