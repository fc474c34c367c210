// 📥 Reference Ingestion - CSV loading + built-in seed set
// Write path for the reference store; the cleaning pipeline never writes
//
// Expected files in an ingest directory:
//   countries.csv  iso_code,country_name,aliases   (aliases ';'-separated)
//   states.csv     country_code,admin1_code,admin1_name
//   cities.csv     country_code,admin1_code,city_name,latitude,longitude

use crate::store::{City, Country, GeoStore, State, StoreError};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

// ============================================================================
// CSV RECORDS
// ============================================================================

#[derive(Debug, Deserialize)]
struct CountryRecord {
    iso_code: String,
    country_name: String,
    #[serde(default)]
    aliases: String,
}

#[derive(Debug, Deserialize)]
struct StateRecord {
    country_code: String,
    admin1_code: String,
    admin1_name: String,
}

#[derive(Debug, Deserialize)]
struct CityRecord {
    country_code: String,
    admin1_code: String,
    city_name: String,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
}

// ============================================================================
// LOADERS
// ============================================================================

pub fn load_countries_csv(path: &Path) -> Result<Vec<Country>> {
    let mut rdr = csv::Reader::from_path(path).context("Failed to open countries CSV")?;

    let mut countries = Vec::new();
    for result in rdr.deserialize() {
        let record: CountryRecord = result.context("Failed to deserialize country record")?;

        countries.push(Country {
            iso_code: record.iso_code,
            country_name: record.country_name,
            aliases: record
                .aliases
                .split(';')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect(),
        });
    }

    Ok(countries)
}

pub fn load_states_csv(path: &Path) -> Result<Vec<State>> {
    let mut rdr = csv::Reader::from_path(path).context("Failed to open states CSV")?;

    let mut states = Vec::new();
    for result in rdr.deserialize() {
        let record: StateRecord = result.context("Failed to deserialize state record")?;

        states.push(State {
            admin1_code: record.admin1_code,
            admin1_name: record.admin1_name,
            country_code: record.country_code,
        });
    }

    Ok(states)
}

pub fn load_cities_csv(path: &Path) -> Result<Vec<City>> {
    let mut rdr = csv::Reader::from_path(path).context("Failed to open cities CSV")?;

    let mut cities = Vec::new();
    for result in rdr.deserialize() {
        let record: CityRecord = result.context("Failed to deserialize city record")?;

        cities.push(City {
            city_name: record.city_name,
            admin1_code: record.admin1_code,
            country_code: record.country_code,
            latitude: record.latitude,
            longitude: record.longitude,
        });
    }

    Ok(cities)
}

// ============================================================================
// INGESTION
// ============================================================================

/// Inserted vs skipped-as-duplicate counts for one entity type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub inserted: usize,
    pub skipped: usize,
}

/// Per-entity summaries for a full directory ingest
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestReport {
    pub countries: IngestSummary,
    pub states: IngestSummary,
    pub cities: IngestSummary,
}

pub fn insert_countries(store: &GeoStore, countries: &[Country]) -> Result<IngestSummary, StoreError> {
    let mut summary = IngestSummary::default();
    for country in countries {
        if store.insert_country(country)? {
            summary.inserted += 1;
        } else {
            summary.skipped += 1;
        }
    }
    Ok(summary)
}

pub fn insert_states(store: &GeoStore, states: &[State]) -> Result<IngestSummary, StoreError> {
    let mut summary = IngestSummary::default();
    for state in states {
        if store.insert_state(state)? {
            summary.inserted += 1;
        } else {
            summary.skipped += 1;
        }
    }
    Ok(summary)
}

pub fn insert_cities(store: &GeoStore, cities: &[City]) -> Result<IngestSummary, StoreError> {
    let mut summary = IngestSummary::default();
    for city in cities {
        if store.insert_city(city)? {
            summary.inserted += 1;
        } else {
            summary.skipped += 1;
        }
    }
    Ok(summary)
}

/// Load `countries.csv`, `states.csv`, and `cities.csv` from a directory
///
/// Files are optional; present ones are ingested in hierarchy order so that
/// parent records exist before their children.
pub fn ingest_directory(store: &GeoStore, dir: &Path) -> Result<IngestReport> {
    let mut report = IngestReport::default();

    let countries_path = dir.join("countries.csv");
    if countries_path.exists() {
        let countries = load_countries_csv(&countries_path)?;
        report.countries = insert_countries(store, &countries)?;
        info!(
            inserted = report.countries.inserted,
            skipped = report.countries.skipped,
            "ingested countries"
        );
    }

    let states_path = dir.join("states.csv");
    if states_path.exists() {
        let states = load_states_csv(&states_path)?;
        report.states = insert_states(store, &states)?;
        info!(
            inserted = report.states.inserted,
            skipped = report.states.skipped,
            "ingested states"
        );
    }

    let cities_path = dir.join("cities.csv");
    if cities_path.exists() {
        let cities = load_cities_csv(&cities_path)?;
        report.cities = insert_cities(store, &cities)?;
        info!(
            inserted = report.cities.inserted,
            skipped = report.cities.skipped,
            "ingested cities"
        );
    }

    Ok(report)
}

// ============================================================================
// SEED DATA
// ============================================================================

/// Populate the store with a small built-in reference set
///
/// Enough hierarchy to run the cleaner without external data. Idempotent:
/// rows already present are skipped.
pub fn seed_reference_data(store: &GeoStore) -> Result<(), StoreError> {
    let countries = [
        ("US", "United States", vec!["USA", "United States of America", "America"]),
        ("CH", "Switzerland", vec!["Swiss Confederation", "Schweiz", "Suisse"]),
        ("DE", "Germany", vec!["Deutschland", "Federal Republic of Germany"]),
        ("FR", "France", vec!["French Republic"]),
        ("GB", "United Kingdom", vec!["UK", "Great Britain"]),
    ];

    for (iso_code, country_name, aliases) in countries {
        store.insert_country(&Country {
            iso_code: iso_code.to_string(),
            country_name: country_name.to_string(),
            aliases: aliases.into_iter().map(str::to_string).collect(),
        })?;
    }

    let states = [
        ("US", "NY", "New York"),
        ("US", "CA", "California"),
        ("US", "IL", "Illinois"),
        ("US", "TX", "Texas"),
        ("CH", "ZH", "Zürich"),
        ("CH", "GE", "Geneva"),
        ("CH", "BE", "Bern"),
        ("DE", "BY", "Bavaria"),
        ("DE", "BE", "Berlin"),
        ("FR", "IDF", "Île-de-France"),
        ("GB", "ENG", "England"),
    ];

    for (country_code, admin1_code, admin1_name) in states {
        store.insert_state(&State {
            admin1_code: admin1_code.to_string(),
            admin1_name: admin1_name.to_string(),
            country_code: country_code.to_string(),
        })?;
    }

    let cities = [
        ("US", "NY", "New York City", Some((40.7128, -74.0060))),
        ("US", "NY", "Buffalo", None),
        ("US", "CA", "Los Angeles", Some((34.0522, -118.2437))),
        ("US", "CA", "San Francisco", None),
        ("US", "IL", "Chicago", Some((41.8781, -87.6298))),
        ("US", "IL", "Springfield", None),
        ("US", "TX", "Houston", None),
        ("CH", "ZH", "Zurich", Some((47.3769, 8.5417))),
        ("CH", "GE", "Geneva", None),
        ("CH", "BE", "Bern", None),
        ("DE", "BY", "Munich", Some((48.1351, 11.5820))),
        ("DE", "BE", "Berlin", None),
        ("FR", "IDF", "Paris", Some((48.8566, 2.3522))),
        ("GB", "ENG", "London", Some((51.5074, -0.1278))),
    ];

    for (country_code, admin1_code, city_name, coords) in cities {
        store.insert_city(&City {
            city_name: city_name.to_string(),
            admin1_code: admin1_code.to_string(),
            country_code: country_code.to_string(),
            latitude: coords.map(|(lat, _)| lat),
            longitude: coords.map(|(_, lng)| lng),
        })?;
    }

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_seed_reference_data() {
        let store = GeoStore::open_in_memory().unwrap();
        seed_reference_data(&store).unwrap();

        assert_eq!(store.count_countries().unwrap(), 5);
        assert_eq!(store.count_states().unwrap(), 11);
        assert_eq!(store.count_cities().unwrap(), 14);

        // Alias round-trips through storage
        let m = store.lookup_country("USA", 0.7).unwrap().unwrap();
        assert_eq!(m.country_name, "United States");
    }

    #[test]
    fn test_seed_is_idempotent() {
        let store = GeoStore::open_in_memory().unwrap();
        seed_reference_data(&store).unwrap();
        seed_reference_data(&store).unwrap();

        assert_eq!(store.count_countries().unwrap(), 5);
        assert_eq!(store.count_cities().unwrap(), 14);
    }

    #[test]
    fn test_ingest_directory_from_csv() {
        let dir = tempfile::tempdir().unwrap();

        fs::write(
            dir.path().join("countries.csv"),
            "iso_code,country_name,aliases\n\
             JP,Japan,Nippon;Nihon\n\
             IT,Italy,\n",
        )
        .unwrap();

        fs::write(
            dir.path().join("states.csv"),
            "country_code,admin1_code,admin1_name\n\
             JP,13,Tokyo\n\
             IT,62,Lazio\n",
        )
        .unwrap();

        fs::write(
            dir.path().join("cities.csv"),
            "country_code,admin1_code,city_name,latitude,longitude\n\
             JP,13,Tokyo,35.6762,139.6503\n\
             IT,62,Rome,,\n",
        )
        .unwrap();

        let store = GeoStore::open_in_memory().unwrap();
        let report = ingest_directory(&store, dir.path()).unwrap();

        assert_eq!(report.countries.inserted, 2);
        assert_eq!(report.states.inserted, 2);
        assert_eq!(report.cities.inserted, 2);

        // ';'-separated aliases are split
        let m = store.lookup_country("Nippon", 0.7).unwrap().unwrap();
        assert_eq!(m.iso_code, "JP");
        assert!(m.exact);

        // Missing coordinates come through as None
        let m = store.lookup_city("Rome", "IT", Some("62"), 0.7).unwrap().unwrap();
        assert!(m.exact);
    }

    #[test]
    fn test_ingest_skips_duplicates() {
        let dir = tempfile::tempdir().unwrap();

        fs::write(
            dir.path().join("countries.csv"),
            "iso_code,country_name,aliases\nJP,Japan,\n",
        )
        .unwrap();

        let store = GeoStore::open_in_memory().unwrap();
        let first = ingest_directory(&store, dir.path()).unwrap();
        let second = ingest_directory(&store, dir.path()).unwrap();

        assert_eq!(first.countries, IngestSummary { inserted: 1, skipped: 0 });
        assert_eq!(second.countries, IngestSummary { inserted: 0, skipped: 1 });
    }

    #[test]
    fn test_ingest_directory_with_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = GeoStore::open_in_memory().unwrap();

        let report = ingest_directory(&store, dir.path()).unwrap();
        assert_eq!(report.countries.inserted, 0);
        assert_eq!(report.cities.inserted, 0);
    }
}
