// sky-server/src/plugins/geocode/mod.rs
mod operations;
mod plugin;

pub use operations::Geocoder;
pub use plugin::GeocodePlugin;
