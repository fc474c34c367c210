use anyhow::{bail, Result};
use std::env;

use geo_janitor::{
    ingest_directory, seed_reference_data, AddressInput, Config, GeoStore, Janitor,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    let config = Config::from_env();

    match args.get(1).map(String::as_str) {
        Some("seed") => run_seed(&config),
        Some("ingest") => run_ingest(&config, args.get(2).map(String::as_str)),
        Some("clean") => run_clean(&config, &args[2..]),
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("🧹 Geo Janitor — address cleaning against a geographic reference store");
    println!();
    println!("Usage:");
    println!("  geo-janitor seed                          Populate the store with the built-in reference set");
    println!("  geo-janitor ingest <dir>                  Ingest countries/states/cities CSV files");
    println!("  geo-janitor clean <city> <state> <country>");
    println!();
    println!("Configuration via JANITOR_* and REASONING_* environment variables.");
}

fn run_seed(config: &Config) -> Result<()> {
    let store = GeoStore::open(&config.db_path)?;
    seed_reference_data(&store)?;

    println!("✓ Seeded reference store at {}", config.db_path.display());
    println!(
        "✓ {} countries, {} states, {} cities",
        store.count_countries()?,
        store.count_states()?,
        store.count_cities()?
    );

    Ok(())
}

fn run_ingest(config: &Config, dir: Option<&str>) -> Result<()> {
    let Some(dir) = dir else {
        bail!("Usage: geo-janitor ingest <dir>");
    };

    let store = GeoStore::open(&config.db_path)?;
    let report = ingest_directory(&store, dir.as_ref())?;

    println!("✓ Countries: {} inserted, {} skipped", report.countries.inserted, report.countries.skipped);
    println!("✓ States:    {} inserted, {} skipped", report.states.inserted, report.states.skipped);
    println!("✓ Cities:    {} inserted, {} skipped", report.cities.inserted, report.cities.skipped);

    Ok(())
}

fn run_clean(config: &Config, fields: &[String]) -> Result<()> {
    if fields.len() != 3 {
        bail!("Usage: geo-janitor clean <city> <state> <country>");
    }

    let input = AddressInput::new(&fields[0], &fields[1], &fields[2]);
    let janitor = Janitor::new(config)?;
    let outcome = janitor.clean(&input)?;
    let response = &outcome.response;

    println!("City:    {} → {}", response.original_city, response.corrected_city);
    println!("State:   {} → {}", response.original_state, response.corrected_state);
    println!("Country: {} → {}", response.original_country, response.corrected_country);
    println!("Code:    {}", response.country_code);

    if let Some(anomaly) = &outcome.anomaly {
        if let Some(inferred) = &anomaly.inferred {
            println!();
            println!("⚠ Some fields could not be validated. Inferred intent:");
            println!("  {} / {} / {}", inferred.city, inferred.state, inferred.country);
            println!("✓ Proposed updates staged in {}", config.artifact_dir.display());
        }
    }

    Ok(())
}
