//! The built-in travel lookup tools offered to the model.

mod attractions;
mod catalog;
mod flights;
mod lodging;
mod web_search;

use wayfarer_core::tool::Error as ToolError;

pub use attractions::AttractionsTool;
pub use catalog::{
    Attraction, Catalog, CatalogError, FlightOption, LodgingOption,
};
pub use flights::FlightSearchTool;
pub use lodging::LodgingSearchTool;
pub use web_search::WebSearchTool;

/// Checks that a value looks like a `YYYY-MM-DD` date.
///
/// Dates travel as strings so that lookups stay lexical; a malformed
/// date is reported back to the model as tool data rather than failing
/// the turn.
pub(crate) fn validate_iso_date(
    field: &str,
    value: &str,
) -> Result<(), ToolError> {
    let bytes = value.as_bytes();
    let well_formed = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
    if well_formed {
        Ok(())
    } else {
        Err(ToolError::invalid_input().with_reason(format!(
            "`{field}` must be a date in YYYY-MM-DD format, got {value:?}"
        )))
    }
}
