use std::sync::Arc;

use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::{Value, json};
use wayfarer_core::tool::{Error as ToolError, Tool, ToolResult};

use crate::tools::catalog::Catalog;
use crate::tools::validate_iso_date;

#[derive(Deserialize, JsonSchema)]
pub struct FlightSearchParameters {
    #[schemars(description = "City the trip starts from.")]
    origin: String,
    #[schemars(description = "City to fly to.")]
    destination: String,
    #[schemars(description = "Departure date in YYYY-MM-DD format.")]
    date: String,
    #[schemars(
        description = "Return date in YYYY-MM-DD format for round trips."
    )]
    return_date: Option<String>,
}

/// A tool for finding flights between two cities.
pub struct FlightSearchTool {
    catalog: Arc<Catalog>,
    parameter_schema: Value,
}

impl FlightSearchTool {
    /// Creates a flight search tool answering from the given catalog.
    #[inline]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        FlightSearchTool {
            catalog,
            parameter_schema: schema_for!(FlightSearchParameters).to_value(),
        }
    }
}

impl Tool for FlightSearchTool {
    type Input = FlightSearchParameters;

    fn name(&self) -> &str {
        "search_flights"
    }

    fn description(&self) -> &str {
        r#"
Searches for flight options between two cities.
Requires an origin, a destination and a departure date; pass a return date to also get flights back. Returns flight details as JSON."#
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: FlightSearchParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let catalog = Arc::clone(&self.catalog);
        async move {
            validate_iso_date("date", &input.date)?;
            if let Some(return_date) = &input.return_date {
                validate_iso_date("return_date", return_date)?;
            }

            let outbound = catalog.find_flights(
                &input.origin,
                &input.destination,
                &input.date,
            );
            if outbound.is_empty() {
                return Err(ToolError::execution_error().with_reason(
                    format!(
                        "No flights from {} to {} on {}. Try another date \
                         or a nearby city.",
                        input.origin, input.destination, input.date
                    ),
                ));
            }

            let mut payload = json!({ "flights": outbound });
            if let Some(return_date) = &input.return_date {
                let inbound = catalog.find_flights(
                    &input.destination,
                    &input.origin,
                    return_date,
                );
                payload["return_flights"] = json!(inbound);
            }
            Ok(payload.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_tool() -> FlightSearchTool {
        FlightSearchTool::new(Arc::new(Catalog::demo()))
    }

    #[tokio::test]
    async fn test_round_trip_search() {
        let tool = demo_tool();
        let output = tool
            .execute(FlightSearchParameters {
                origin: "Warsaw".to_owned(),
                destination: "Paris".to_owned(),
                date: "2025-07-10".to_owned(),
                return_date: Some("2025-07-17".to_owned()),
            })
            .await
            .unwrap();

        let payload: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(payload["flights"].as_array().unwrap().len(), 2);
        assert_eq!(payload["return_flights"].as_array().unwrap().len(), 1);
        assert_eq!(
            payload["return_flights"][0]["flight_number"],
            "AF1146"
        );
    }

    #[tokio::test]
    async fn test_no_match_is_a_tool_error() {
        let tool = demo_tool();
        let err = tool
            .execute(FlightSearchParameters {
                origin: "Warsaw".to_owned(),
                destination: "Lisbon".to_owned(),
                date: "2025-07-10".to_owned(),
                return_date: None,
            })
            .await
            .unwrap_err();
        assert!(err.reason().contains("No flights"));
    }

    #[tokio::test]
    async fn test_malformed_date_is_reported() {
        let tool = demo_tool();
        let err = tool
            .execute(FlightSearchParameters {
                origin: "Warsaw".to_owned(),
                destination: "Paris".to_owned(),
                date: "10 July".to_owned(),
                return_date: None,
            })
            .await
            .unwrap_err();
        assert!(err.reason().contains("YYYY-MM-DD"));
    }
}
