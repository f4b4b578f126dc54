//! Bulk import of a camera inventory file.
//!
//! Usage: `import_cameras [path]` (default `cctvinfo.json`). Cameras are
//! matched by `ip_address`; new ones are inserted as `down` and existing ones
//! are updated only where a mapped field differs.

use anyhow::{Context, Result};
use cctv_manager::config::{self, ImportConfig};
use cctv_manager::db;
use cctv_manager::db::models::{Camera, CameraChanges, CameraStatus, NewCamera};
use cctv_manager::db::repositories::{CameraStore, CamerasRepository};
use cctv_manager::utils::{Coordinates, LocalClock};
use log::{info, warn};
use serde_json::Value;
use std::path::PathBuf;

/// One inventory entry mapped onto camera columns
#[derive(Debug, Clone, PartialEq)]
struct ImportedCamera {
    ip_address: String,
    name: String,
    location: String,
    coordinates: Option<String>,
    rtsp_url: Option<String>,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ImportCounts {
    added: usize,
    updated: usize,
    skipped: usize,
}

/// Parse inventory content that may be a bare `{..}, {..}` sequence or end in `,]`
fn parse_inventory(content: &str) -> Result<Vec<Value>> {
    let content = content.trim();
    let content = if content.starts_with('{') && content.ends_with('}') {
        format!("[{}]", content)
    } else {
        content.to_string()
    };

    match serde_json::from_str::<Vec<Value>>(&content) {
        Ok(entries) => Ok(entries),
        Err(first_error) => {
            let Some(fixed) = strip_trailing_comma(&content) else {
                return Err(first_error).context("Inventory is not a JSON array");
            };
            serde_json::from_str(&fixed).context("Inventory is not a JSON array")
        }
    }
}

fn strip_trailing_comma(content: &str) -> Option<String> {
    let body = content.strip_suffix(']')?.trim_end();
    let body = body.strip_suffix(',')?;
    Some(format!("{}]", body))
}

/// Text of a string or number field
fn text_field(entry: &Value, key: &str) -> Option<String> {
    match entry.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Channel number from `NO`; integral floats lose their fraction and zero means unset
fn channel_number(entry: &Value) -> Option<String> {
    match entry.get("NO")? {
        Value::Number(n) => {
            if let Some(no) = n.as_u64() {
                return (no != 0).then(|| no.to_string());
            }
            if let Some(no) = n.as_i64() {
                return (no != 0).then(|| no.to_string());
            }
            let no = n.as_f64()?;
            if no == 0.0 || !no.is_finite() {
                None
            } else if no.fract() == 0.0 {
                Some(format!("{}", no as i64))
            } else {
                Some(n.to_string())
            }
        }
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty() && s != "0").then(|| s.to_string())
        }
        _ => None,
    }
}

fn float_field(entry: &Value, key: &str) -> Option<f64> {
    match entry.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn map_entry(entry: &Value, import: &ImportConfig) -> Option<ImportedCamera> {
    let ip_address = text_field(entry, "ip_address")?;

    let (Some(name), Some(location)) = (text_field(entry, "name"), text_field(entry, "location"))
    else {
        warn!("Skipping {}: name and location are required", ip_address);
        return None;
    };

    let coordinates = match (float_field(entry, "latitude"), float_field(entry, "longitude")) {
        (Some(latitude), Some(longitude)) => {
            Some(Coordinates::new(latitude, longitude).to_string())
        }
        _ => None,
    };

    let rtsp_url =
        channel_number(entry).map(|no| import.rtsp_url_template.replace("{no}", &no));

    Some(ImportedCamera {
        ip_address,
        name,
        location,
        coordinates,
        rtsp_url,
    })
}

/// Fields of `existing` that differ from the imported values, if any
fn diff(existing: &Camera, imported: &ImportedCamera) -> Option<CameraChanges> {
    let mut changes = CameraChanges::default();
    if existing.name != imported.name {
        changes.name = Some(imported.name.clone());
    }
    if existing.location != imported.location {
        changes.location = Some(imported.location.clone());
    }
    if imported.coordinates.is_some() && existing.coordinates != imported.coordinates {
        changes.coordinates = imported.coordinates.clone();
    }
    if existing.rtsp_url != imported.rtsp_url {
        changes.rtsp_url = Some(imported.rtsp_url.clone());
    }

    (changes != CameraChanges::default()).then_some(changes)
}

async fn import(
    store: &dyn CameraStore,
    entries: &[Value],
    import: &ImportConfig,
    clock: &LocalClock,
) -> Result<ImportCounts> {
    let mut counts = ImportCounts::default();

    for entry in entries {
        let Some(imported) = map_entry(entry, import) else {
            counts.skipped += 1;
            continue;
        };

        match store.get_by_ip(&imported.ip_address).await? {
            Some(existing) => {
                if let Some(changes) = diff(&existing, &imported) {
                    store.update_fields(existing.id, &changes).await?;
                    counts.updated += 1;
                }
            }
            None => {
                store
                    .insert(&NewCamera {
                        name: imported.name,
                        location: imported.location,
                        ip_address: imported.ip_address,
                        coordinates: imported.coordinates,
                        brand: None,
                        version: None,
                        status: CameraStatus::Down,
                        last_update: Some(clock.timestamp()),
                        rtsp_url: imported.rtsp_url,
                    })
                    .await?;
                counts.added += 1;
            }
        }
    }

    Ok(counts)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::var_os("CCTV_CONFIG").map(PathBuf::from);
    let config = config::load_config(config_path.as_deref())?;

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("cctvinfo.json"));
    info!("Reading camera inventory from {}", path.display());

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let entries = parse_inventory(&content)?;

    let store = CamerasRepository::new(db::connect(&config.database).await?);
    let clock = LocalClock::from_utc_offset_hours(config.api.utc_offset_hours);

    let counts = import(&store, &entries, &config.import, &clock).await?;
    info!("Import completed successfully");
    info!("New cameras added: {}", counts.added);
    info!("Cameras updated: {}", counts.updated);
    if counts.skipped > 0 {
        info!("Entries skipped: {}", counts.skipped);
    }

    Ok(())
}
