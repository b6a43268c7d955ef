// sky-server/src/config.rs
use serde::Deserialize;
use sky_common::{Provider, SkyError};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "data/server/data.json";
pub const DEFAULT_PORT: u16 = 3001;

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub provider: Provider,
    pub server: ListenConfig,
    pub services: ServicesConfig,
    pub stations: StationsConfig,
    pub openweathermap: OpenWeatherConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ListenConfig {
    pub port: u16,
}

/// Upstream endpoints. Overridable so tests and mirrors can point elsewhere.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServicesConfig {
    pub nominatim_url: String,
    /// Directory holding `<CODE>.TXT` station files
    pub metar_url: String,
    pub stations_url: String,
    pub openweathermap_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct StationsConfig {
    pub cache_path: PathBuf,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct OpenWeatherConfig {
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            provider: Provider {
                name: "Sky".to_string(),
                domain: "sky.local".to_string(),
                description: "Weather reports, geocoding and sun/moon data".to_string(),
            },
            server: ListenConfig::default(),
            services: ServicesConfig::default(),
            stations: StationsConfig::default(),
            openweathermap: OpenWeatherConfig::default(),
        }
    }
}

impl Default for ListenConfig {
    fn default() -> Self {
        ListenConfig { port: DEFAULT_PORT }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        ServicesConfig {
            nominatim_url: "https://nominatim.openstreetmap.org".to_string(),
            metar_url: "https://tgftp.nws.noaa.gov/data/observations/metar/stations".to_string(),
            stations_url: "https://tgftp.nws.noaa.gov/data/nsd_cccc.txt".to_string(),
            openweathermap_url: "https://api.openweathermap.org/data/2.5".to_string(),
            user_agent: format!("sky/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 15,
        }
    }
}

impl Default for StationsConfig {
    fn default() -> Self {
        StationsConfig { cache_path: PathBuf::from("data/stations/nsd_cccc.txt") }
    }
}

impl ServerConfig {
    /// Reads the JSON config, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self, SkyError> {
        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(ServerConfig::default());
        }
        info!("Loading config from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Loads from `SKY_CONFIG` (or the default path) and applies environment overrides.
    pub fn from_env() -> Result<Self, SkyError> {
        let path = std::env::var("SKY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load(Path::new(&path))?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), SkyError> {
        if let Some(port) = lookup("SKY_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| SkyError::invalid(format!("SKY_PORT '{}' is not a port number", port)))?;
        }
        if let Some(key) = lookup("OPENWEATHERMAP_API_KEY") {
            self.openweathermap.api_key = Some(key);
        }
        // An empty key in either place means "not configured".
        if self.openweathermap.api_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
            self.openweathermap.api_key = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn missing_file_gives_defaults() {
        let config = ServerConfig::load(Path::new("/nonexistent/sky.json")).unwrap();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.provider.domain, "sky.local");
        assert!(config.openweathermap.api_key.is_none());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"provider": {{"name": "Graz Sky", "domain": "sky.example.at", "description": "d"}},
                "services": {{"timeout_secs": 3}}}}"#
        )
        .unwrap();

        let config = ServerConfig::load(file.path()).unwrap();
        assert_eq!(config.provider.name, "Graz Sky");
        assert_eq!(config.services.timeout_secs, 3);
        assert_eq!(config.services.nominatim_url, "https://nominatim.openstreetmap.org");
        assert_eq!(config.server.port, DEFAULT_PORT);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        assert!(matches!(ServerConfig::load(file.path()), Err(SkyError::Json(_))));
    }

    #[test]
    fn environment_overrides() {
        let env: HashMap<&str, &str> = [("SKY_PORT", "8080"), ("OPENWEATHERMAP_API_KEY", "abc123")].into();
        let mut config = ServerConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.openweathermap.api_key.as_deref(), Some("abc123"));

        let mut config = ServerConfig::default();
        assert!(config.apply_overrides(|k| (k == "SKY_PORT").then(|| "eighty".to_string())).is_err());
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let mut config = ServerConfig::default();
        config.openweathermap.api_key = Some("  ".to_string());
        config.apply_overrides(|_| None).unwrap();
        assert!(config.openweathermap.api_key.is_none());
    }
}
