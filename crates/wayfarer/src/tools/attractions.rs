use std::sync::Arc;

use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::{Value, json};
use wayfarer_core::tool::{Error as ToolError, Tool, ToolResult};

use crate::tools::catalog::Catalog;

#[derive(Deserialize, JsonSchema)]
pub struct AttractionsParameters {
    #[schemars(description = "City to look up attractions in.")]
    location: String,
    #[schemars(
        description = "Category to narrow the lookup to, e.g. \"museums\", \
                       \"parks\", \"restaurants\" or \"landmarks\"."
    )]
    category: Option<String>,
}

/// A tool for looking up points of interest in a city.
pub struct AttractionsTool {
    catalog: Arc<Catalog>,
    parameter_schema: Value,
}

impl AttractionsTool {
    /// Creates an attractions tool answering from the given catalog.
    #[inline]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        AttractionsTool {
            catalog,
            parameter_schema: schema_for!(AttractionsParameters).to_value(),
        }
    }
}

impl Tool for AttractionsTool {
    type Input = AttractionsParameters;

    fn name(&self) -> &str {
        "local_attractions"
    }

    fn description(&self) -> &str {
        r#"
Looks up points of interest in a city, optionally narrowed to a category such as museums, parks, restaurants or landmarks. Returns attraction details as JSON."#
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: AttractionsParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let catalog = Arc::clone(&self.catalog);
        async move {
            let attractions = catalog
                .find_attractions(&input.location, input.category.as_deref());
            if attractions.is_empty() {
                let categories =
                    catalog.attraction_categories(&input.location);
                let reason = if categories.is_empty() {
                    format!("No attraction data for {}.", input.location)
                } else {
                    format!(
                        "No attractions in {} for that category; known \
                         categories are: {}.",
                        input.location,
                        categories.join(", ")
                    )
                };
                return Err(
                    ToolError::execution_error().with_reason(reason)
                );
            }
            Ok(json!({ "attractions": attractions }).to_string())
        }
    }
}
