//! Coordinates and great-circle helpers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::SkyError;

/// Mean Earth radius in kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0;

const COMPASS_POINTS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE",
    "S", "SSW", "SW", "WSW", "W", "WNW", "NW", "NNW",
];

/// A point on Earth in decimal degrees, north and east positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, SkyError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(SkyError::invalid(format!("latitude {} is outside -90..90", latitude)));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(SkyError::invalid(format!("longitude {} is outside -180..180", longitude)));
        }
        Ok(Coordinate { latitude, longitude })
    }

    pub fn distance_km(&self, other: &Coordinate) -> f64 {
        haversine_km(self, other)
    }

    pub fn bearing_to(&self, other: &Coordinate) -> f64 {
        initial_bearing(self, other)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5}, {:.5}", self.latitude, self.longitude)
    }
}

/// Great-circle distance between two points.
pub fn haversine_km(a: &Coordinate, b: &Coordinate) -> f64 {
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();
    let h = (dlat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Initial bearing from `a` towards `b`, degrees clockwise from north in `[0, 360)`.
pub fn initial_bearing(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let x = d_lon.sin() * lat2.cos();
    let y = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();

    (x.atan2(y).to_degrees() + 360.0) % 360.0
}

/// 16-point compass name for a bearing.
pub fn compass_point(bearing: f64) -> &'static str {
    let sector = 360.0 / COMPASS_POINTS.len() as f64;
    let normalized = bearing.rem_euclid(360.0);
    let index = ((normalized + sector / 2.0) / sector) as usize % COMPASS_POINTS.len();
    COMPASS_POINTS[index]
}

/// Parses `DD-MM[-SS]H` as used by the NOAA station list, e.g. `46-59N` or `015-26-30E`.
pub fn dms_to_decimal(dms: &str) -> Result<f64, SkyError> {
    let dms = dms.trim();
    let (numbers, hemisphere) = match dms.char_indices().last() {
        Some((idx, h)) if matches!(h, 'N' | 'S' | 'E' | 'W') => (&dms[..idx], h),
        _ => return Err(SkyError::parse(format!("'{}' has no hemisphere suffix", dms))),
    };

    let parts = numbers
        .split('-')
        .map(|p| p.parse::<u32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| SkyError::parse(format!("'{}' is not degrees-minutes-seconds", dms)))?;
    if parts.is_empty() || parts.len() > 3 {
        return Err(SkyError::parse(format!("'{}' is not degrees-minutes-seconds", dms)));
    }

    let degrees = parts[0] as f64;
    let minutes = parts.get(1).copied().unwrap_or(0) as f64;
    let seconds = parts.get(2).copied().unwrap_or(0) as f64;
    let decimal = degrees + minutes / 60.0 + seconds / 3600.0;

    Ok(if matches!(hemisphere, 'S' | 'W') { -decimal } else { decimal })
}
