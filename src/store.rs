// 🗺️ Reference Store - Hierarchical geographic reference over SQLite
// Country → State → City, with exact and fuzzy lookup scoped by parent
//
// Schema: entities Country/State/City; a City row points at its State
// (IN_STATE) and a State row points at its Country (IN_COUNTRY). Lookups are
// read-only; only reference ingestion writes.

use crate::matching::{best_match, normalize_key};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

// ============================================================================
// ERRORS
// ============================================================================

/// Failure talking to the reference store
///
/// "No match" is not an error; lookups return `Ok(None)` for that. Anything
/// surfaced here is a connectivity or data-integrity failure and is fatal to
/// the current request.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("reference store query failed: {0}")]
    Connection(#[from] rusqlite::Error),

    #[error("reference data corrupt: {0}")]
    Data(#[from] serde_json::Error),
}

// ============================================================================
// ENTITIES
// ============================================================================

/// Country reference record
///
/// Identity is the ISO alpha-2 code. Aliases are alternative names that map
/// to the same country ("USA", "United States of America", ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Country {
    pub iso_code: String,
    pub country_name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Administrative region (level 1) reference record
///
/// Identity is (admin1_code, country_code). Many states per country.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    pub admin1_code: String,
    pub admin1_name: String,
    pub country_code: String,
}

/// City reference record
///
/// Identity is (city_name, owning state); city names are only unique within
/// a state. The geocoordinate is optional and unused by lookups today.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct City {
    pub city_name: String,
    pub admin1_code: String,
    pub country_code: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

// ============================================================================
// LOOKUP RESULTS
// ============================================================================

/// Resolved country with canonical name and code
#[derive(Debug, Clone, PartialEq)]
pub struct CountryMatch {
    pub iso_code: String,
    pub country_name: String,
    pub exact: bool,
}

/// Resolved state with canonical name and admin code
#[derive(Debug, Clone, PartialEq)]
pub struct StateMatch {
    pub admin1_name: String,
    pub admin1_code: String,
    pub exact: bool,
}

/// Resolved city with canonical name
#[derive(Debug, Clone, PartialEq)]
pub struct CityMatch {
    pub city_name: String,
    pub exact: bool,
}

// ============================================================================
// GEO STORE
// ============================================================================

/// Connection-scoped handle on the geographic reference store
///
/// Each request opens its own handle and drops it when done; concurrent
/// readers over separate handles are safe (SQLite WAL).
pub struct GeoStore {
    conn: Connection,
}

impl GeoStore {
    /// Open (or create) the reference store at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for concurrent readers
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let store = GeoStore { conn };
        store.setup_schema()?;
        Ok(store)
    }

    /// Open an in-memory store (tests, demos)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = GeoStore {
            conn: Connection::open_in_memory()?,
        };
        store.setup_schema()?;
        Ok(store)
    }

    /// Create tables and indexes if they do not exist yet
    pub fn setup_schema(&self) -> Result<(), StoreError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS countries (
                iso_code TEXT PRIMARY KEY,
                country_name TEXT NOT NULL,
                aliases TEXT NOT NULL DEFAULT '[]'
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS states (
                admin1_code TEXT NOT NULL,
                admin1_name TEXT NOT NULL,
                country_code TEXT NOT NULL REFERENCES countries(iso_code),
                PRIMARY KEY (country_code, admin1_code)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS cities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                city_name TEXT NOT NULL,
                admin1_code TEXT NOT NULL,
                country_code TEXT NOT NULL,
                latitude REAL,
                longitude REAL,
                UNIQUE (country_code, admin1_code, city_name),
                FOREIGN KEY (country_code, admin1_code)
                    REFERENCES states(country_code, admin1_code)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_states_country ON states(country_code)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_cities_scope ON cities(country_code, admin1_code)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_cities_name ON cities(city_name)",
            [],
        )?;

        Ok(())
    }

    // ========================================================================
    // INGESTION (write path)
    // ========================================================================

    /// Insert a country; returns false if the ISO code already exists
    pub fn insert_country(&self, country: &Country) -> Result<bool, StoreError> {
        let aliases_json = serde_json::to_string(&country.aliases)?;

        let result = self.conn.execute(
            "INSERT INTO countries (iso_code, country_name, aliases) VALUES (?1, ?2, ?3)",
            params![country.iso_code, country.country_name, aliases_json],
        );

        match result {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Insert a state; returns false if (country, admin code) already exists
    pub fn insert_state(&self, state: &State) -> Result<bool, StoreError> {
        let result = self.conn.execute(
            "INSERT INTO states (admin1_code, admin1_name, country_code) VALUES (?1, ?2, ?3)",
            params![state.admin1_code, state.admin1_name, state.country_code],
        );

        match result {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Insert a city; returns false if it already exists within its state
    pub fn insert_city(&self, city: &City) -> Result<bool, StoreError> {
        let result = self.conn.execute(
            "INSERT INTO cities (city_name, admin1_code, country_code, latitude, longitude)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                city.city_name,
                city.admin1_code,
                city.country_code,
                city.latitude,
                city.longitude,
            ],
        );

        match result {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn count_countries(&self) -> Result<i64, StoreError> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM countries", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn count_states(&self) -> Result<i64, StoreError> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM states", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn count_cities(&self) -> Result<i64, StoreError> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM cities", [], |row| row.get(0))?;
        Ok(count)
    }

    // ========================================================================
    // LOOKUPS (read path)
    // ========================================================================

    /// Resolve a country name to its canonical name and ISO code
    ///
    /// Exact case-insensitive match on the canonical name or any alias first;
    /// on miss, the highest-scoring approximate match over all known names
    /// and aliases at or above `threshold`.
    pub fn lookup_country(
        &self,
        name: &str,
        threshold: f64,
    ) -> Result<Option<CountryMatch>, StoreError> {
        let key = normalize_key(name);
        if key.is_empty() {
            return Ok(None);
        }

        // The country table is small; scan it once for both phases
        let countries = self.all_countries()?;

        for country in &countries {
            let exact = normalize_key(&country.country_name) == key
                || country.aliases.iter().any(|a| normalize_key(a) == key);
            if exact {
                return Ok(Some(CountryMatch {
                    iso_code: country.iso_code.clone(),
                    country_name: country.country_name.clone(),
                    exact: true,
                }));
            }
        }

        // Approximate match over canonical names and aliases
        let candidates = countries.iter().enumerate().flat_map(|(i, c)| {
            std::iter::once((i, c.country_name.as_str()))
                .chain(c.aliases.iter().map(move |a| (i, a.as_str())))
        });

        if let Some(m) = best_match(name, candidates, threshold) {
            let country = &countries[m.index];
            debug!(
                query = name,
                matched = %country.country_name,
                score = m.score,
                "fuzzy country match"
            );
            return Ok(Some(CountryMatch {
                iso_code: country.iso_code.clone(),
                country_name: country.country_name.clone(),
                exact: false,
            }));
        }

        Ok(None)
    }

    /// Resolve a state name (or admin code) within a country
    pub fn lookup_state(
        &self,
        name: &str,
        country_code: &str,
        threshold: f64,
    ) -> Result<Option<StateMatch>, StoreError> {
        let key = normalize_key(name);
        if key.is_empty() {
            return Ok(None);
        }

        // Exact match on name or admin code, scoped to the country
        let exact: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT admin1_name, admin1_code FROM states
                 WHERE country_code = ?1
                   AND (lower(admin1_name) = ?2 OR lower(admin1_code) = ?2)
                 LIMIT 1",
                params![country_code, key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((admin1_name, admin1_code)) = exact {
            return Ok(Some(StateMatch {
                admin1_name,
                admin1_code,
                exact: true,
            }));
        }

        // Approximate match over state names in the same country
        let states = self.states_in_country(country_code)?;
        let candidates = states
            .iter()
            .enumerate()
            .map(|(i, s)| (i, s.admin1_name.as_str()));

        if let Some(m) = best_match(name, candidates, threshold) {
            let state = &states[m.index];
            debug!(
                query = name,
                matched = %state.admin1_name,
                score = m.score,
                "fuzzy state match"
            );
            return Ok(Some(StateMatch {
                admin1_name: state.admin1_name.clone(),
                admin1_code: state.admin1_code.clone(),
                exact: false,
            }));
        }

        Ok(None)
    }

    /// Resolve a city name within a state (if `admin_code` given) or country
    pub fn lookup_city(
        &self,
        name: &str,
        country_code: &str,
        admin_code: Option<&str>,
        threshold: f64,
    ) -> Result<Option<CityMatch>, StoreError> {
        let key = normalize_key(name);
        if key.is_empty() {
            return Ok(None);
        }

        // Exact match in the narrowest available scope
        let exact: Option<String> = match admin_code {
            Some(admin) => self
                .conn
                .query_row(
                    "SELECT city_name FROM cities
                     WHERE country_code = ?1 AND admin1_code = ?2 AND lower(city_name) = ?3
                     LIMIT 1",
                    params![country_code, admin, key],
                    |row| row.get(0),
                )
                .optional()?,
            None => self
                .conn
                .query_row(
                    "SELECT city_name FROM cities
                     WHERE country_code = ?1 AND lower(city_name) = ?2
                     LIMIT 1",
                    params![country_code, key],
                    |row| row.get(0),
                )
                .optional()?,
        };

        if let Some(city_name) = exact {
            return Ok(Some(CityMatch {
                city_name,
                exact: true,
            }));
        }

        // Approximate match over city names in the same scope
        let names = self.city_names_in_scope(country_code, admin_code)?;
        let candidates = names.iter().enumerate().map(|(i, n)| (i, n.as_str()));

        if let Some(m) = best_match(name, candidates, threshold) {
            debug!(
                query = name,
                matched = %names[m.index],
                score = m.score,
                "fuzzy city match"
            );
            return Ok(Some(CityMatch {
                city_name: names[m.index].clone(),
                exact: false,
            }));
        }

        Ok(None)
    }

    // ========================================================================
    // INTERNAL QUERIES
    // ========================================================================

    fn all_countries(&self) -> Result<Vec<Country>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT iso_code, country_name, aliases FROM countries ORDER BY iso_code")?;

        let rows = stmt
            .query_map([], |row| {
                let aliases_json: String = row.get(2)?;
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, aliases_json))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut countries = Vec::with_capacity(rows.len());
        for (iso_code, country_name, aliases_json) in rows {
            countries.push(Country {
                iso_code,
                country_name,
                aliases: serde_json::from_str(&aliases_json)?,
            });
        }

        Ok(countries)
    }

    fn states_in_country(&self, country_code: &str) -> Result<Vec<State>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT admin1_code, admin1_name, country_code FROM states
             WHERE country_code = ?1
             ORDER BY admin1_code",
        )?;

        let states = stmt
            .query_map(params![country_code], |row| {
                Ok(State {
                    admin1_code: row.get(0)?,
                    admin1_name: row.get(1)?,
                    country_code: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(states)
    }

    fn city_names_in_scope(
        &self,
        country_code: &str,
        admin_code: Option<&str>,
    ) -> Result<Vec<String>, StoreError> {
        let names = match admin_code {
            Some(admin) => {
                let mut stmt = self.conn.prepare(
                    "SELECT city_name FROM cities
                     WHERE country_code = ?1 AND admin1_code = ?2
                     ORDER BY id",
                )?;
                let rows = stmt
                    .query_map(params![country_code, admin], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                rows
            }
            None => {
                let mut stmt = self.conn.prepare(
                    "SELECT city_name FROM cities
                     WHERE country_code = ?1
                     ORDER BY id",
                )?;
                let rows = stmt
                    .query_map(params![country_code], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                rows
            }
        };

        Ok(names)
    }
}

// ============================================================================
// TESTS
// ============================================================================
