use crate::error::{Error, Result};
use crate::utils::Coordinates;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::{Display, Formatter};
use std::net::IpAddr;
use std::str::FromStr;

/// Camera reachability status.
///
/// Only the status reconciler writes `Up`/`Down` after creation; the other two
/// values can be set on create or by import scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraStatus {
    Up,
    Down,
    Maintenance,
    Unknown,
}

impl CameraStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraStatus::Up => "up",
            CameraStatus::Down => "down",
            CameraStatus::Maintenance => "maintenance",
            CameraStatus::Unknown => "unknown",
        }
    }

    /// Status implied by a reachability check
    pub fn from_reachable(reachable: bool) -> Self {
        if reachable {
            CameraStatus::Up
        } else {
            CameraStatus::Down
        }
    }
}

impl Display for CameraStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CameraStatus {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "up" => Ok(CameraStatus::Up),
            "down" => Ok(CameraStatus::Down),
            "maintenance" => Ok(CameraStatus::Maintenance),
            "unknown" => Ok(CameraStatus::Unknown),
            _ => Err(Error::Validation(format!(
                "Status must be one of: up, down, maintenance, unknown (got '{}')",
                s
            ))),
        }
    }
}

// Stored as plain text; accept whatever text-like column type the table uses
impl sqlx::Type<sqlx::Postgres> for CameraStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for CameraStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> std::result::Result<Self, sqlx::error::BoxDynError> {
        let text = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(text.parse::<CameraStatus>()?)
    }
}

impl sqlx::Encode<'_, sqlx::Postgres> for CameraStatus {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> std::result::Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
    }
}

/// Camera row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Camera {
    pub id: i32,
    pub name: String,
    pub location: String,
    pub ip_address: String,
    pub coordinates: Option<String>,
    pub brand: Option<String>,
    pub version: Option<String>,
    pub status: CameraStatus,
    pub last_update: Option<String>,
    pub rtsp_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Camera {
    /// Parsed coordinates, `(0.0, 0.0)` for missing or malformed values
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::parse_lenient(self.coordinates.as_deref())
    }
}

/// Values for a camera that is about to be inserted
#[derive(Debug, Clone, PartialEq)]
pub struct NewCamera {
    pub name: String,
    pub location: String,
    pub ip_address: String,
    pub coordinates: Option<String>,
    pub brand: Option<String>,
    pub version: Option<String>,
    pub status: CameraStatus,
    pub last_update: Option<String>,
    pub rtsp_url: Option<String>,
}

/// Field-set update applied by the request path.
///
/// Has no status field: status only changes through the reconciler.
/// `None` leaves a column untouched; for nullable columns `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CameraChanges {
    pub name: Option<String>,
    pub location: Option<String>,
    pub ip_address: Option<String>,
    pub coordinates: Option<String>,
    pub brand: Option<Option<String>>,
    pub version: Option<Option<String>>,
    pub rtsp_url: Option<Option<String>>,
    pub last_update: Option<String>,
}

/// Body of `POST /api/cameras`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCameraRequest {
    pub name: String,
    pub location: String,
    pub ip_address: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub rtsp_url: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl CreateCameraRequest {
    /// Validate the request and turn it into insertable values.
    ///
    /// Cameras created through the API start out `up` unless told otherwise.
    pub fn into_new_camera(self, last_update: String) -> Result<NewCamera> {
        validate_text("name", &self.name, 1, 255)?;
        validate_text("location", &self.location, 1, 255)?;
        validate_ip_address(&self.ip_address)?;
        validate_latitude(self.latitude)?;
        validate_longitude(self.longitude)?;
        validate_optional_text("brand", self.brand.as_deref(), 100)?;
        validate_optional_text("version", self.version.as_deref(), 50)?;
        validate_rtsp_url(self.rtsp_url.as_deref())?;

        let status = match self.status.as_deref() {
            Some(s) if !s.is_empty() => s.parse()?,
            _ => CameraStatus::Up,
        };

        Ok(NewCamera {
            name: self.name,
            location: self.location,
            ip_address: self.ip_address.trim().to_string(),
            coordinates: Some(Coordinates::new(self.latitude, self.longitude).to_string()),
            brand: self.brand,
            version: self.version,
            status,
            last_update: Some(last_update),
            rtsp_url: self.rtsp_url,
        })
    }
}

/// Body of `PUT /api/cameras/:id`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCameraRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub brand: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub version: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub rtsp_url: Option<Option<String>>,
    /// Accepted for compatibility with older clients, validated, then ignored
    #[serde(default)]
    pub status: Option<String>,
}

impl UpdateCameraRequest {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            validate_text("name", name, 1, 255)?;
        }
        if let Some(location) = &self.location {
            validate_text("location", location, 1, 255)?;
        }
        if let Some(ip_address) = &self.ip_address {
            validate_ip_address(ip_address)?;
        }
        if let Some(latitude) = self.latitude {
            validate_latitude(latitude)?;
        }
        if let Some(longitude) = self.longitude {
            validate_longitude(longitude)?;
        }
        if let Some(brand) = &self.brand {
            validate_optional_text("brand", brand.as_deref(), 100)?;
        }
        if let Some(version) = &self.version {
            validate_optional_text("version", version.as_deref(), 50)?;
        }
        if let Some(rtsp_url) = &self.rtsp_url {
            validate_rtsp_url(rtsp_url.as_deref())?;
        }
        if let Some(status) = &self.status {
            status.parse::<CameraStatus>()?;
        }
        Ok(())
    }

    /// Build the field-set update, merging coordinates into `existing`
    pub fn into_changes(self, existing: &Camera, last_update: String) -> CameraChanges {
        let coordinates =
            Coordinates::merge(existing.coordinates.as_deref(), self.latitude, self.longitude)
                .map(|c| c.to_string());

        CameraChanges {
            name: self.name,
            location: self.location,
            ip_address: self.ip_address.map(|ip| ip.trim().to_string()),
            coordinates,
            brand: self.brand,
            version: self.version,
            rtsp_url: self.rtsp_url,
            last_update: Some(last_update),
        }
    }
}

/// Distinguish an explicit `null` (`Some(None)`) from an absent field (`None`)
fn deserialize_some<'de, T, D>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

fn validate_text(field: &str, value: &str, min: usize, max: usize) -> Result<()> {
    let len = value.trim().chars().count();
    if len < min || value.chars().count() > max {
        return Err(Error::Validation(format!(
            "{} must be between {} and {} characters",
            field, min, max
        )));
    }
    Ok(())
}

fn validate_optional_text(field: &str, value: Option<&str>, max: usize) -> Result<()> {
    match value {
        Some(v) if v.chars().count() > max => Err(Error::Validation(format!(
            "{} must be at most {} characters",
            field, max
        ))),
        _ => Ok(()),
    }
}

fn validate_ip_address(ip_address: &str) -> Result<()> {
    validate_text("ip_address", ip_address, 1, 45)?;
    ip_address
        .trim()
        .parse::<IpAddr>()
        .map(|_| ())
        .map_err(|_| Error::Validation(format!("Invalid IP address: {}", ip_address)))
}

fn validate_latitude(latitude: f64) -> Result<()> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(Error::Validation(format!("Invalid latitude: {}", latitude)));
    }
    Ok(())
}

fn validate_longitude(longitude: f64) -> Result<()> {
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(Error::Validation(format!("Invalid longitude: {}", longitude)));
    }
    Ok(())
}

fn validate_rtsp_url(rtsp_url: Option<&str>) -> Result<()> {
    let Some(raw) = rtsp_url else {
        return Ok(());
    };
    validate_optional_text("rtsp_url", Some(raw), 500)?;
    url::Url::parse(raw)
        .map(|_| ())
        .map_err(|e| Error::Validation(format!("Invalid stream URL {}: {}", raw, e)))
}
