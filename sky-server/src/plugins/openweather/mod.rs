// sky-server/src/plugins/openweather/mod.rs
mod operations;
mod plugin;

pub use operations::{OpenWeather, Units};
pub use plugin::{UvIndexPlugin, WeatherPlugin};
pub(crate) use plugin::{units_arg, units_property};
