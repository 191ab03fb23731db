#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the roadwatch proximity alert engine.

mod replay;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use roadwatch_hazard_models::{Coordinate, HazardCategory, ReportStatus};
use roadwatch_settings::{AlertSettings, AlertTone, FileStore, SettingsPatch, SettingsStore};
use roadwatch_source::config::ApiConfig;
use roadwatch_source::fixtures::FixtureSource;
use roadwatch_source::http::{FetchConfig, HttpHazardSource};
use roadwatch_source::{CatalogQuery, HazardSource, fetch_catalog};
use roadwatch_spatial::cluster::cluster_hazards;

#[derive(Parser)]
#[command(name = "roadwatch", about = "Road hazard proximity alerts")]
struct Cli {
    /// Directory holding the persisted alert settings
    #[arg(long, global = true, default_value = ".roadwatch")]
    dir: PathBuf,
    /// Serve the embedded fixture catalog instead of calling the API
    #[arg(long, global = true)]
    offline: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List hazards around a coordinate, closest first
    #[command(allow_negative_numbers = true)]
    Fetch {
        /// Latitude of the search center
        #[arg(long)]
        lat: f64,
        /// Longitude of the search center
        #[arg(long)]
        lon: f64,
        /// Search radius in kilometers (defaults to the stored setting)
        #[arg(long)]
        radius_km: Option<f64>,
        /// Include unverified hazards
        #[arg(long)]
        all: bool,
    },
    /// Group hazards around a coordinate into map markers
    #[command(allow_negative_numbers = true)]
    Clusters {
        /// Latitude of the search center
        #[arg(long)]
        lat: f64,
        /// Longitude of the search center
        #[arg(long)]
        lon: f64,
        /// Visible latitude span of the map, in degrees
        #[arg(long, default_value = "0.05")]
        latitude_delta: f64,
        /// Only cluster these categories (repeatable)
        #[arg(long = "category")]
        categories: Vec<HazardCategory>,
    },
    /// Show or change the persisted alert settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Feed a JSON track of coordinates through an alert session
    Replay {
        /// Path to a JSON array of `{"latitude": .., "longitude": ..}`
        track: PathBuf,
    },
    /// Great-circle distance between two coordinates, in meters
    #[command(allow_negative_numbers = true)]
    Distance {
        lat1: f64,
        lon1: f64,
        lat2: f64,
        lon2: f64,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print the current settings as JSON
    Show,
    /// Change one or more settings (out-of-range values are clamped)
    Set {
        /// Master switch
        #[arg(long)]
        active: Option<bool>,
        /// Catalog search radius in kilometers (1-10)
        #[arg(long)]
        radius_km: Option<f64>,
        /// Alert threshold in meters (5-50)
        #[arg(long)]
        alert_distance: Option<f64>,
        /// Alert tone: chime, beep, siren or bell
        #[arg(long)]
        tone: Option<AlertTone>,
        /// Only fetch verified hazards
        #[arg(long)]
        verified_only: Option<bool>,
        /// Alert volume (0-1)
        #[arg(long)]
        volume: Option<f64>,
    },
}

fn hazard_source(offline: bool) -> Result<Arc<dyn HazardSource>, Box<dyn std::error::Error>> {
    if offline {
        return Ok(Arc::new(FixtureSource));
    }
    let api = ApiConfig::from_env();
    log::debug!("Using {} API at {}", api.environment, api.base_url);
    Ok(Arc::new(HttpHazardSource::new(&api, FetchConfig::default())?))
}

fn parse_center(lat: f64, lon: f64) -> Result<Coordinate, Box<dyn std::error::Error>> {
    let center = Coordinate::new(lat, lon);
    if !center.is_valid() {
        return Err(format!("invalid coordinate {center}").into());
    }
    Ok(center)
}

#[allow(clippy::too_many_lines)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let store = SettingsStore::new(FileStore::new(&cli.dir));

    match cli.command {
        Commands::Fetch {
            lat,
            lon,
            radius_km,
            all,
        } => {
            let settings = store.load();
            let center = parse_center(lat, lon)?;
            let settings = settings.with_patch(&SettingsPatch {
                search_radius_km: radius_km,
                ..SettingsPatch::default()
            });
            let radius_km = settings.search_radius_km;

            let source = hazard_source(cli.offline)?;
            let query = CatalogQuery {
                center,
                radius_km,
                verified_only: !all && settings.verified_only,
            };
            let fetch = fetch_catalog(source.as_ref(), &query).await;

            println!(
                "{} hazards ({}) within {radius_km} km of {center}",
                fetch.hazards.len(),
                fetch.origin
            );
            println!(
                "{:<28} {:<9} {:>10} {:<8} {:<11} REPORTER",
                "ID", "TYPE", "DIST (m)", "VERIFIED", "STATUS"
            );
            println!("{}", "-".repeat(84));
            for (hazard, d) in roadwatch_spatial::within(center, &fetch.hazards, f64::INFINITY) {
                println!(
                    "{:<28} {:<9} {:>10.1} {:<8} {:<11} {}",
                    hazard.id,
                    hazard.category,
                    d,
                    hazard.verified,
                    hazard.status.map_or("-", ReportStatus::label),
                    hazard.reporter_name
                );
            }
        }
        Commands::Clusters {
            lat,
            lon,
            latitude_delta,
            categories,
        } => {
            let settings = store.load();
            let source = hazard_source(cli.offline)?;
            let query = CatalogQuery {
                center: parse_center(lat, lon)?,
                radius_km: settings.search_radius_km,
                verified_only: settings.verified_only,
            };
            let fetch = fetch_catalog(source.as_ref(), &query).await;

            let filter: BTreeSet<HazardCategory> = categories.into_iter().collect();
            let filter = (!filter.is_empty()).then_some(&filter);
            let clusters = cluster_hazards(&fetch.hazards, latitude_delta, filter);

            println!("{:<16} {:>5}  CENTER", "CELL", "COUNT");
            for cluster in &clusters {
                let label = cluster
                    .single()
                    .map_or_else(String::new, |h| format!("  {} ({})", h.id, h.category));
                println!(
                    "{:<16} {:>5}  {}{label}",
                    cluster.key.to_string(),
                    cluster.count(),
                    cluster.center
                );
            }
        }
        Commands::Settings { action } => match action {
            SettingsAction::Show => {
                println!("{}", serde_json::to_string_pretty(&store.load())?);
            }
            SettingsAction::Set {
                active,
                radius_km,
                alert_distance,
                tone,
                verified_only,
                volume,
            } => {
                let patch = SettingsPatch {
                    is_active: active,
                    search_radius_km: radius_km,
                    alert_distance_meters: alert_distance,
                    tone_id: tone,
                    verified_only,
                    volume,
                };
                if patch.is_empty() {
                    log::warn!("Nothing to change");
                }
                let updated = store.update(&patch)?;
                log::info!("Saved alert settings to {}", store.backend().dir().display());
                println!("{}", serde_json::to_string_pretty(&updated)?);
            }
        },
        Commands::Replay { track } => {
            let points = replay::load_track(&track)?;
            let settings: AlertSettings = store.load();
            log::info!(
                "Replaying {} points (alert distance {} m, radius {} km)",
                points.len(),
                settings.alert_distance_meters,
                settings.search_radius_km
            );

            let report = replay::replay(&points, settings, hazard_source(cli.offline)?).await?;

            for alert in &report.alerts {
                println!(
                    "ALERT {:<28} {:<9} {:>6.1} m  {}",
                    alert.hazard.id,
                    alert.hazard.category,
                    alert.distance_meters,
                    alert.hazard.description
                );
            }
            println!("{}", serde_json::to_string_pretty(&report.snapshot)?);
        }
        Commands::Distance {
            lat1,
            lon1,
            lat2,
            lon2,
        } => {
            let a = parse_center(lat1, lon1)?;
            let b = parse_center(lat2, lon2)?;
            println!("{:.2}", roadwatch_spatial::distance_meters(a, b));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_set_parses_tone() {
        let cli = Cli::try_parse_from(["roadwatch", "settings", "set", "--tone", "bell"]).unwrap();
        let Commands::Settings {
            action: SettingsAction::Set { tone, active, .. },
        } = cli.command
        else {
            panic!("expected settings set");
        };
        assert_eq!(tone, Some(AlertTone::Bell));
        assert_eq!(active, None);
    }

    #[test]
    fn unknown_tone_is_rejected() {
        assert!(Cli::try_parse_from(["roadwatch", "settings", "set", "--tone", "kazoo"]).is_err());
    }

    #[test]
    fn clusters_accepts_repeated_categories() {
        let cli = Cli::try_parse_from([
            "roadwatch",
            "--offline",
            "clusters",
            "--lat",
            "38.45",
            "--lon",
            "-27.2",
            "--category",
            "pothole",
            "--category",
            "Sign",
        ])
        .unwrap();
        assert!(cli.offline);
        let Commands::Clusters {
            categories, lon, ..
        } = cli.command
        else {
            panic!("expected clusters");
        };
        assert_eq!(categories, [HazardCategory::Pothole, HazardCategory::Sign]);
        assert!((lon + 27.2).abs() < f64::EPSILON);
    }
}
