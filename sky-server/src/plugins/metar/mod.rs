// sky-server/src/plugins/metar/mod.rs
mod operations;
mod plugin;
mod stations;

pub use operations::{MetarService, DEFAULT_MAX_AGE_SECS, DEFAULT_RADIUS_KM};
pub use plugin::{MetarNearbyPlugin, MetarPlugin};
pub use stations::StationCatalog;
