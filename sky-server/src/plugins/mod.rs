// sky-server/src/plugins/mod.rs

pub mod astro;
pub mod geocode;
pub mod local;
pub mod metar;
pub mod openweather;

use sky_common::SkyError;
use std::sync::Arc;
use tracing::info;

use crate::config::ServerConfig;
use crate::http::build_client;
use crate::plugin_registry::PluginRegistry;

use astro::{MoonPlugin, SunPlugin};
use geocode::{GeocodePlugin, Geocoder};
use local::LocalPlugin;
use metar::{MetarNearbyPlugin, MetarPlugin, MetarService, StationCatalog};
use openweather::{OpenWeather, UvIndexPlugin, WeatherPlugin};

/// Builds the shared services and registers every tool. OpenWeatherMap
/// tools are extensions and only appear when an API key is configured.
/// Returns the station catalogue so the caller can warm it up.
pub fn register_all_plugins(registry: &mut PluginRegistry, config: &ServerConfig) -> Result<Arc<StationCatalog>, SkyError> {
    let services = &config.services;
    let http = build_client(services)?;

    let geocoder = Arc::new(Geocoder::new(http.clone(), &services.nominatim_url));
    let catalog = Arc::new(StationCatalog::new(
        http.clone(),
        &services.stations_url,
        config.stations.cache_path.clone(),
    ));
    let metar = Arc::new(MetarService::new(http.clone(), &services.metar_url, catalog.clone()));

    let weather = config
        .openweathermap
        .api_key
        .as_deref()
        .map(|key| Arc::new(OpenWeather::new(http.clone(), &services.openweathermap_url, key)));

    registry.register_plugin(Arc::new(GeocodePlugin::new(geocoder.clone())))?;
    registry.register_plugin(Arc::new(MetarPlugin::new(metar.clone())))?;
    registry.register_plugin(Arc::new(MetarNearbyPlugin::new(metar.clone())))?;
    registry.register_plugin(Arc::new(SunPlugin))?;
    registry.register_plugin(Arc::new(MoonPlugin))?;

    match &weather {
        Some(owm) => {
            registry.register_plugin(Arc::new(WeatherPlugin::new(owm.clone())))?;
            registry.register_plugin(Arc::new(UvIndexPlugin::new(owm.clone())))?;
        }
        None => info!("No OpenWeatherMap API key configured; weather and uv_index are disabled"),
    }

    registry.register_plugin(Arc::new(LocalPlugin::new(geocoder, metar, weather)))?;
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(registry: &PluginRegistry) -> Vec<String> {
        registry.get_all_plugins().iter().map(|p| p.name().to_string()).collect()
    }

    #[test]
    fn core_tools_without_a_key() {
        let mut registry = PluginRegistry::new();
        register_all_plugins(&mut registry, &ServerConfig::default()).unwrap();
        assert_eq!(names(&registry), vec!["Local", "geocode", "metar", "metar_nearby", "moon", "sun"]);
    }

    #[test]
    fn weather_tools_with_a_key() {
        let mut config = ServerConfig::default();
        config.openweathermap.api_key = Some("secret".to_string());
        let mut registry = PluginRegistry::new();
        register_all_plugins(&mut registry, &config).unwrap();

        let names = names(&registry);
        assert!(names.contains(&"weather".to_string()));
        assert!(names.contains(&"uv_index".to_string()));
        let local = registry.get_plugin("Local").unwrap();
        assert!(local.supported_operations().contains(&"WEATHER".to_string()));
    }
}
