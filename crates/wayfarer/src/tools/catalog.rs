use std::fmt::{self, Display};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// One bookable flight.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightOption {
    /// Operating airline.
    pub airline: String,
    /// Flight designator, e.g. `LO331`.
    pub flight_number: String,
    /// Departure city.
    pub origin: String,
    /// Arrival city.
    pub destination: String,
    /// Departure date, `YYYY-MM-DD`.
    pub date: String,
    /// Local departure time.
    pub departure_time: String,
    /// Local arrival time.
    pub arrival_time: String,
    /// Display price.
    pub price: String,
}

/// One bookable place to stay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LodgingOption {
    /// Property name.
    pub name: String,
    /// City the property is in.
    pub location: String,
    /// Star rating.
    pub stars: u8,
    /// Display price per night.
    pub price_per_night: String,
    /// First date the property accepts guests, `YYYY-MM-DD`.
    pub available_from: String,
    /// Last date the property accepts guests, `YYYY-MM-DD`.
    pub available_to: String,
    /// Largest party the property accepts.
    pub max_guests: u32,
}

/// One point of interest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attraction {
    /// Attraction name.
    pub name: String,
    /// City the attraction is in.
    pub location: String,
    /// Category slug, e.g. `museums` or `parks`.
    pub category: String,
}

/// The catalog could not be loaded.
#[derive(Debug)]
pub enum CatalogError {
    /// The file could not be read.
    Io(std::io::Error),
    /// The file is not a valid catalog.
    Parse(serde_json::Error),
}

impl Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::Io(err) => write!(f, "cannot read catalog: {err}"),
            CatalogError::Parse(err) => {
                write!(f, "cannot parse catalog: {err}")
            }
        }
    }
}

impl std::error::Error for CatalogError {}

/// The travel data the lookup tools answer from.
///
/// Lookups match field-wise: locations compare case-insensitively after
/// trimming, and date ranges compare as ISO dates. The built-in demo
/// catalog covers a handful of routes; real deployments load their own
/// data with [`Catalog::from_path`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Catalog {
    flights: Vec<FlightOption>,
    lodging: Vec<LodgingOption>,
    attractions: Vec<Attraction>,
}

impl Catalog {
    /// Returns the built-in demo catalog.
    pub fn demo() -> Self {
        serde_json::from_str(include_str!("./demo_catalog.json"))
            .expect("embedded demo catalog is valid")
    }

    /// Loads a catalog from a JSON file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path).map_err(CatalogError::Io)?;
        serde_json::from_str(&raw).map_err(CatalogError::Parse)
    }

    /// Returns the flights between two cities on a date.
    pub fn find_flights(
        &self,
        origin: &str,
        destination: &str,
        date: &str,
    ) -> Vec<FlightOption> {
        self.flights
            .iter()
            .filter(|flight| {
                eq_location(&flight.origin, origin)
                    && eq_location(&flight.destination, destination)
                    && flight.date == date
            })
            .cloned()
            .collect()
    }

    /// Returns the lodging options in a city whose availability window
    /// covers the whole stay and that accept the party size.
    pub fn find_lodging(
        &self,
        location: &str,
        check_in: &str,
        check_out: &str,
        guests: u32,
    ) -> Vec<LodgingOption> {
        self.lodging
            .iter()
            .filter(|option| {
                eq_location(&option.location, location)
                    // ISO dates order lexically, so string comparison is
                    // a date comparison here.
                    && option.available_from.as_str() <= check_in
                    && option.available_to.as_str() >= check_out
                    && option.max_guests >= guests
            })
            .cloned()
            .collect()
    }

    /// Returns the attractions in a city, optionally narrowed to one
    /// category.
    pub fn find_attractions(
        &self,
        location: &str,
        category: Option<&str>,
    ) -> Vec<Attraction> {
        self.attractions
            .iter()
            .filter(|attraction| {
                eq_location(&attraction.location, location)
                    && category
                        .is_none_or(|c| eq_location(&attraction.category, c))
            })
            .cloned()
            .collect()
    }

    /// Returns the category slugs present for a city.
    pub fn attraction_categories(&self, location: &str) -> Vec<String> {
        let mut categories: Vec<String> = self
            .attractions
            .iter()
            .filter(|attraction| eq_location(&attraction.location, location))
            .map(|attraction| attraction.category.clone())
            .collect();
        categories.sort();
        categories.dedup();
        categories
    }
}

fn eq_location(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_catalog_loads() {
        let catalog = Catalog::demo();
        assert!(!catalog.flights.is_empty());
        assert!(!catalog.lodging.is_empty());
        assert!(!catalog.attractions.is_empty());
    }

    #[test]
    fn test_flight_lookup_ignores_case_and_whitespace() {
        let catalog = Catalog::demo();
        let flights = catalog.find_flights("  warsaw ", "PARIS", "2025-07-10");
        assert_eq!(flights.len(), 2);
        assert!(flights.iter().all(|f| f.destination == "Paris"));

        assert!(
            catalog
                .find_flights("Warsaw", "Paris", "2025-07-11")
                .is_empty()
        );
    }

    #[test]
    fn test_lodging_availability_window() {
        let catalog = Catalog::demo();
        // Both Paris options cover the short stay.
        let options =
            catalog.find_lodging("Paris", "2025-07-10", "2025-07-17", 2);
        assert_eq!(options.len(), 2);

        // A stay past July 20 filters out the smaller property.
        let options =
            catalog.find_lodging("Paris", "2025-07-10", "2025-07-25", 2);
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].name, "Hôtel du Louvre");

        // Party size is honored.
        assert!(
            catalog
                .find_lodging("Paris", "2025-07-10", "2025-07-17", 5)
                .is_empty()
        );
    }

    #[test]
    fn test_attraction_categories() {
        let catalog = Catalog::demo();
        let museums = catalog.find_attractions("Paris", Some("museums"));
        assert_eq!(museums.len(), 2);

        let all = catalog.find_attractions("Paris", None);
        assert!(all.len() > museums.len());

        assert_eq!(
            catalog.attraction_categories("Paris"),
            vec!["landmarks", "museums", "parks", "restaurants"]
        );
    }
}
