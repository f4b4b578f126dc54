use crate::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// A latitude/longitude pair.
///
/// The store keeps coordinates as a single `"<lat>, <long>"` string; this type
/// is what the rest of the crate works with. Halves are written with the
/// shortest representation that round-trips (`f64` `Display`), so `10.0` is
/// stored as `"10"` and `18.123` as `"18.123"`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Parse a stored coordinate string without ever failing.
    ///
    /// Missing or malformed values become `(0.0, 0.0)`.
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        raw.and_then(|s| s.parse().ok()).unwrap_or_default()
    }

    /// Merge an optional new latitude and/or longitude into stored coordinates.
    ///
    /// Returns `None` when neither half is provided, meaning the stored value
    /// must be left untouched.
    pub fn merge(existing: Option<&str>, latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        if latitude.is_none() && longitude.is_none() {
            return None;
        }

        let current = Self::parse_lenient(existing);
        Some(Self {
            latitude: latitude.unwrap_or(current.latitude),
            longitude: longitude.unwrap_or(current.longitude),
        })
    }
}

impl Default for Coordinates {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

impl Display for Coordinates {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", self.latitude, self.longitude)
    }
}

impl FromStr for Coordinates {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, long) = s
            .split_once(',')
            .ok_or_else(|| Error::Validation(format!("Invalid coordinates: {}", s)))?;

        let parse = |half: &str| {
            half.trim()
                .parse::<f64>()
                .map_err(|_| Error::Validation(format!("Invalid coordinates: {}", s)))
        };

        Ok(Self::new(parse(lat)?, parse(long)?))
    }
}
