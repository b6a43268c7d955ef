//! Sun and moon positions, good to about a minute for sunrise/sunset and
//! a few hours for lunar phases.
//!
//! Sunrise and sunset follow the NOAA sunrise equation with the usual
//! -0.833 degree apparent altitude (refraction plus the solar semi-diameter).
//! The moon uses truncated lunar and solar longitude series; the phase is
//! derived from their elongation.

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use std::fmt;

use crate::Coordinate;

/// Mean length of a lunation in days
pub const SYNODIC_MONTH: f64 = 29.53058867;

const J2000: f64 = 2451545.0;
const UNIX_EPOCH_JD: f64 = 2440587.5;
const SUN_ALTITUDE: f64 = -0.833;
const OBLIQUITY: f64 = 23.4397;
/// Mean daily motion of the Moon's elongation in degrees
const ELONGATION_RATE: f64 = 12.190749;

pub fn julian_day(t: DateTime<Utc>) -> f64 {
    t.timestamp_millis() as f64 / 86_400_000.0 + UNIX_EPOCH_JD
}

pub fn from_julian_day(jd: f64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(((jd - UNIX_EPOCH_JD) * 86_400_000.0).round() as i64)
}

fn sin_deg(x: f64) -> f64 {
    x.to_radians().sin()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SolarDay {
    Events { rise: f64, set: f64 },
    PolarDay,
    PolarNight,
}

/// Rise and set around the solar transit nearest to noon UTC of day `n` after J2000.
fn solar_day(coord: &Coordinate, n: f64) -> SolarDay {
    let j_star = n + 0.0009 - coord.longitude / 360.0;
    let mean_anomaly = (357.5291 + 0.98560028 * j_star).rem_euclid(360.0);
    let center = 1.9148 * sin_deg(mean_anomaly)
        + 0.0200 * sin_deg(2.0 * mean_anomaly)
        + 0.0003 * sin_deg(3.0 * mean_anomaly);
    let ecliptic_longitude = (mean_anomaly + center + 180.0 + 102.9372).rem_euclid(360.0);
    let transit = J2000 + j_star + 0.0053 * sin_deg(mean_anomaly) - 0.0069 * sin_deg(2.0 * ecliptic_longitude);

    let sin_decl = sin_deg(ecliptic_longitude) * sin_deg(OBLIQUITY);
    let cos_decl = (1.0 - sin_decl * sin_decl).sqrt();
    let lat = coord.latitude.to_radians();
    let cos_hour_angle = (sin_deg(SUN_ALTITUDE) - lat.sin() * sin_decl) / (lat.cos() * cos_decl);

    if cos_hour_angle > 1.0 {
        SolarDay::PolarNight
    } else if cos_hour_angle < -1.0 {
        SolarDay::PolarDay
    } else {
        let half_day = cos_hour_angle.acos().to_degrees() / 360.0;
        SolarDay::Events { rise: transit - half_day, set: transit + half_day }
    }
}

/// Today's sunrise and sunset, rendered in a fixed offset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SunTimes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sunrise: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sunset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_length: Option<String>,
    /// `"day"` or `"night"` when the sun stays above or below the horizon
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polar: Option<&'static str>,
}

pub fn sun_times(coord: &Coordinate, now: DateTime<Utc>, offset: FixedOffset) -> SunTimes {
    let now_jd = julian_day(now);
    let today = (now_jd - J2000).round();

    match solar_day(coord, today) {
        SolarDay::PolarDay => return SunTimes { sunrise: None, sunset: None, day_length: None, polar: Some("day") },
        SolarDay::PolarNight => return SunTimes { sunrise: None, sunset: None, day_length: None, polar: Some("night") },
        SolarDay::Events { .. } => {}
    }

    let (rises, sets): (Vec<f64>, Vec<f64>) = (-2..=2)
        .filter_map(|delta| match solar_day(coord, today + delta as f64) {
            SolarDay::Events { rise, set } => Some((rise, set)),
            _ => None,
        })
        .unzip();

    let next = |events: &[f64]| events.iter().copied().filter(|&jd| jd > now_jd).reduce(f64::min);
    let mut sunrise = next(&rises);
    let sunset = next(&sets);

    // Sun is up: report the rising that started this day instead of tomorrow's.
    if let (Some(rise), Some(set)) = (sunrise, sunset) {
        if rise > set {
            sunrise = rises.iter().copied().filter(|&jd| jd <= now_jd).reduce(f64::max);
        }
    }

    let render = |jd: f64| from_julian_day(jd).map(|t| t.with_timezone(&offset).format("%H:%M").to_string());
    let day_length = match (sunrise, sunset) {
        (Some(rise), Some(set)) if set > rise => {
            let minutes = ((set - rise) * 1440.0) as i64;
            Some(format!("{}:{:02}", minutes / 60, minutes % 60))
        }
        _ => None,
    };

    SunTimes {
        sunrise: sunrise.and_then(render),
        sunset: sunset.and_then(render),
        day_length,
        polar: None,
    }
}

/// Geocentric state of the moon.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoonStatus {
    pub phase: &'static str,
    pub waxing: bool,
    /// Illuminated fraction in percent
    pub illumination: f64,
    /// Days since the previous new moon
    pub age_days: f64,
    pub days_to_full: f64,
}

impl fmt::Display for MoonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} moon, illumination {}%, {} days to next full moon",
            if self.waxing { "waxing" } else { "waning" },
            self.illumination.round(),
            self.days_to_full.round()
        )
    }
}

/// Sun-Moon elongation in degrees, 0 at new moon and 180 at full moon.
fn elongation(now: DateTime<Utc>) -> f64 {
    let d = julian_day(now) - J2000;

    let moon_mean_longitude = 218.316 + 13.176396 * d;
    let moon_anomaly = 134.963 + 13.064993 * d;
    let moon_latitude_arg = 93.272 + 13.229350 * d;
    let mean_elongation = 297.850 + ELONGATION_RATE * d;
    let sun_anomaly = 357.529 + 0.98560028 * d;

    let moon_longitude = moon_mean_longitude
        + 6.289 * sin_deg(moon_anomaly)
        + 1.274 * sin_deg(2.0 * mean_elongation - moon_anomaly)
        + 0.658 * sin_deg(2.0 * mean_elongation)
        + 0.214 * sin_deg(2.0 * moon_anomaly)
        - 0.186 * sin_deg(sun_anomaly)
        - 0.114 * sin_deg(2.0 * moon_latitude_arg);
    let sun_longitude = 280.459 + 0.98564736 * d + 1.915 * sin_deg(sun_anomaly) + 0.020 * sin_deg(2.0 * sun_anomaly);

    (moon_longitude - sun_longitude).rem_euclid(360.0)
}

fn phase_name(elongation: f64) -> &'static str {
    const NAMES: [&str; 8] = [
        "new",
        "waxing crescent",
        "first quarter",
        "waxing gibbous",
        "full",
        "waning gibbous",
        "last quarter",
        "waning crescent",
    ];
    NAMES[((elongation + 22.5) / 45.0) as usize % NAMES.len()]
}

pub fn moon_status(now: DateTime<Utc>) -> MoonStatus {
    let e = elongation(now);
    let age_days = e / 360.0 * SYNODIC_MONTH;
    MoonStatus {
        phase: phase_name(e),
        waxing: age_days < SYNODIC_MONTH / 2.0,
        illumination: (1.0 - e.to_radians().cos()) / 2.0 * 100.0,
        age_days,
        days_to_full: (180.0 - e).rem_euclid(360.0) / ELONGATION_RATE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn hours(h: i32) -> FixedOffset {
        FixedOffset::east_opt(h * 3600).unwrap()
    }

    #[test]
    fn julian_day_round_trip() {
        let t = utc(2000, 1, 1, 12, 0);
        assert_eq!(julian_day(t), J2000);
        assert_eq!(from_julian_day(J2000), Some(t));
    }

    #[test]
    fn graz_midsummer_in_daytime() {
        let graz = Coordinate::new(47.0707, 15.4395).unwrap();
        let times = sun_times(&graz, utc(2024, 6, 21, 12, 0), hours(2));
        assert_eq!(times.sunrise.as_deref(), Some("05:04"));
        assert_eq!(times.sunset.as_deref(), Some("20:58"));
        assert_eq!(times.day_length.as_deref(), Some("15:54"));
        assert_eq!(times.polar, None);
    }

    #[test]
    fn before_sunrise_reports_the_coming_day() {
        let graz = Coordinate::new(47.0707, 15.4395).unwrap();
        let times = sun_times(&graz, utc(2024, 12, 21, 4, 0), hours(1));
        assert_eq!(times.sunrise.as_deref(), Some("07:42"));
        assert_eq!(times.sunset.as_deref(), Some("16:12"));
    }

    #[test]
    fn after_sunset_rolls_over_to_tomorrow() {
        let new_york = Coordinate::new(40.71, -74.0).unwrap();
        // 23:30 UTC is 19:30 EDT, after the 19:09 sunset on the equinox
        let times = sun_times(&new_york, utc(2024, 3, 20, 23, 30), hours(-4));
        let sunrise = times.sunrise.unwrap();
        let sunset = times.sunset.unwrap();
        assert!(sunrise.starts_with("06:5"), "sunrise {}", sunrise);
        assert!(sunset.starts_with("19:1"), "sunset {}", sunset);
    }

    #[test]
    fn southern_hemisphere_winter() {
        let sydney = Coordinate::new(-33.87, 151.21).unwrap();
        let times = sun_times(&sydney, utc(2024, 6, 21, 2, 0), hours(10));
        assert_eq!(times.sunrise.as_deref(), Some("07:01"));
        assert_eq!(times.sunset.as_deref(), Some("16:55"));
    }

    #[test]
    fn polar_night_and_day() {
        let tromso = Coordinate::new(69.65, 18.96).unwrap();
        let winter = sun_times(&tromso, utc(2024, 12, 21, 12, 0), hours(1));
        assert_eq!(winter.polar, Some("night"));
        assert!(winter.sunrise.is_none() && winter.sunset.is_none());

        let summer = sun_times(&tromso, utc(2024, 6, 21, 12, 0), hours(2));
        assert_eq!(summer.polar, Some("day"));
    }

    #[test]
    fn full_and_new_moon() {
        let full = moon_status(utc(2024, 4, 23, 23, 49));
        assert!(full.illumination > 99.9);
        assert_eq!(full.phase, "full");

        let new = moon_status(utc(2024, 4, 8, 18, 21));
        assert!(new.illumination < 0.1);
        assert!(new.age_days < 0.1);
        assert_eq!(new.phase, "new");
        assert!(new.waxing);
    }

    #[test]
    fn waxing_gibbous_description() {
        let status = moon_status(utc(2024, 4, 18, 0, 0));
        assert!(status.waxing);
        assert_eq!(status.phase, "waxing gibbous");
        assert_eq!(status.to_string(), "waxing moon, illumination 71%, 5 days to next full moon");
    }

    #[test]
    fn waning_after_full() {
        let status = moon_status(utc(2024, 4, 27, 0, 0));
        assert!(!status.waxing);
        assert!(status.to_string().starts_with("waning moon"));
        assert!(status.days_to_full > 25.0);
    }
}
