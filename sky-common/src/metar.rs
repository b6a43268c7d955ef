//! METAR reports and the NOAA station catalogue.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::geo::{dms_to_decimal, Coordinate};
use crate::SkyError;

/// A decoded NOAA station file (`stations/<CODE>.TXT`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetarReport {
    pub station: String,
    pub observed: DateTime<Utc>,
    /// Report body without the station code and the day/time group
    pub report: String,
}

impl MetarReport {
    /// Parses the two-line station file: a `YYYY/MM/DD HH:MM` UTC timestamp and the raw report.
    pub fn parse(station: &str, text: &str) -> Result<Self, SkyError> {
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
        let (Some(time_line), Some(raw)) = (lines.next(), lines.next()) else {
            return Err(SkyError::parse(format!("METAR for {} is incomplete", station)));
        };

        let observed = NaiveDateTime::parse_from_str(time_line, "%Y/%m/%d %H:%M")
            .map_err(|e| SkyError::parse(format!("bad METAR timestamp '{}': {}", time_line, e)))?
            .and_utc();

        let report = raw.split_whitespace().skip(2).collect::<Vec<_>>().join(" ");

        Ok(MetarReport { station: station.to_uppercase(), observed, report })
    }

    pub fn age_minutes(&self, now: DateTime<Utc>) -> i64 {
        ((now - self.observed).num_seconds() as f64 / 60.0).round() as i64
    }

    /// One-line form handed to the model, e.g. `LOWG 12m ago: 17005KT CAVOK 20/08 Q1015`.
    pub fn fragment(&self, now: DateTime<Utc>) -> String {
        format!("{} {}m ago: {}", self.station, self.age_minutes(now), self.report)
    }
}

/// A reporting station from `nsd_cccc.txt`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Station {
    pub code: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    pub coordinate: Coordinate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<i32>,
}

fn round5(x: f64) -> f64 {
    (x * 100_000.0).round() / 100_000.0
}

fn non_empty(field: Option<&str>) -> Option<String> {
    field.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Parses one `;`-separated catalogue line. Returns `None` for rows without usable coordinates.
pub fn parse_station_line(line: &str) -> Option<Station> {
    let fields: Vec<&str> = line.split(';').collect();
    let code = non_empty(fields.first().copied())?;
    let latitude = dms_to_decimal(fields.get(7)?.trim()).ok()?;
    let longitude = dms_to_decimal(fields.get(8)?.trim()).ok()?;
    let coordinate = Coordinate::new(round5(latitude), round5(longitude)).ok()?;

    Some(Station {
        name: non_empty(fields.get(3).copied()).unwrap_or_else(|| code.clone()),
        code,
        country: non_empty(fields.get(5).copied()),
        coordinate,
        altitude: fields.get(11).and_then(|a| a.trim().parse().ok()),
    })
}

pub fn parse_station_catalog(text: &str) -> Vec<Station> {
    let mut skipped = 0usize;
    let stations: Vec<Station> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| {
            let station = parse_station_line(l);
            if station.is_none() {
                skipped += 1;
            }
            station
        })
        .collect();
    if skipped > 0 {
        debug!("Skipped {} catalogue rows without usable coordinates", skipped);
    }
    stations
}
