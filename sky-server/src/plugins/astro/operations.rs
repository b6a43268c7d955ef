// sky-server/src/plugins/astro/operations.rs
use chrono::{DateTime, FixedOffset, Local, Utc};
use serde_json::{json, Value};
use sky_common::astro::{moon_status, sun_times};
use sky_common::{Coordinate, PluginResult};
use tracing::debug;

/// Offset of the machine the server runs on; sun times are reported in it.
pub fn local_offset() -> FixedOffset {
    *Local::now().offset()
}

pub fn sun(coord: &Coordinate, now: DateTime<Utc>, offset: FixedOffset) -> PluginResult {
    let times = sun_times(coord, now, offset);
    debug!("Sun at {}: {:?}", coord, times);
    Ok(serde_json::to_value(times)?)
}

/// The phase is geocentric; the observer position does not change it.
pub fn moon(now: DateTime<Utc>) -> PluginResult {
    Ok(Value::String(moon_status(now).to_string()))
}

/// Moon state with its numbers, for callers that want more than the sentence.
pub fn moon_details(now: DateTime<Utc>) -> Value {
    let status = moon_status(now);
    json!({
        "summary": status.to_string(),
        "phase": status.phase,
        "illumination": (status.illumination * 10.0).round() / 10.0,
        "age_days": (status.age_days * 10.0).round() / 10.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn sun_reports_times_in_the_given_offset() {
        let graz = Coordinate::new(47.0707, 15.4395).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 21, 12, 0, 0).unwrap();
        let cest = FixedOffset::east_opt(2 * 3600).unwrap();
        let value = sun(&graz, now, cest).unwrap();
        assert_eq!(value, json!({"sunrise": "05:04", "sunset": "20:58", "day_length": "15:54"}));
    }

    #[test]
    fn moon_is_a_sentence() {
        let now = Utc.with_ymd_and_hms(2024, 4, 18, 0, 0, 0).unwrap();
        assert_eq!(moon(now).unwrap(), json!("waxing moon, illumination 71%, 5 days to next full moon"));
        assert_eq!(moon_details(now)["phase"], json!("waxing gibbous"));
    }
}
