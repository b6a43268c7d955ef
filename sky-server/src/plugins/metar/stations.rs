// sky-server/src/plugins/metar/stations.rs
use reqwest::Client;
use sky_common::metar::{parse_station_catalog, Station};
use sky_common::SkyError;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::http::{check_status, UpstreamExt};

/// NOAA station list, read from the local cache or downloaded once on first use.
pub struct StationCatalog {
    http: Client,
    source_url: String,
    cache_path: PathBuf,
    stations: OnceCell<Arc<Vec<Station>>>,
}

impl StationCatalog {
    pub fn new(http: Client, source_url: &str, cache_path: PathBuf) -> Self {
        StationCatalog {
            http,
            source_url: source_url.to_string(),
            cache_path,
            stations: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> Result<Arc<Vec<Station>>, SkyError> {
        self.stations.get_or_try_init(|| self.load()).await.cloned()
    }

    /// The catalogue if something already loaded it; never blocks on the network.
    pub fn loaded(&self) -> Option<Arc<Vec<Station>>> {
        self.stations.get().cloned()
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    async fn load(&self) -> Result<Arc<Vec<Station>>, SkyError> {
        let text = if self.cache_path.exists() {
            info!("Reading station catalogue from {}", self.cache_path.display());
            decode_latin1(&tokio::fs::read(&self.cache_path).await?)
        } else {
            self.download().await?
        };

        let stations = parse_station_catalog(&text);
        if stations.is_empty() {
            return Err(SkyError::parse("station catalogue contains no usable stations"));
        }
        info!("Loaded {} METAR stations", stations.len());
        Ok(Arc::new(stations))
    }

    async fn download(&self) -> Result<String, SkyError> {
        info!("Downloading station catalogue from {}", self.source_url);
        let response = self.http.get(&self.source_url).send().await.upstream("station catalogue request")?;
        let bytes = check_status(response, "station catalogue")
            .await?
            .bytes()
            .await
            .upstream("station catalogue body")?;

        // Cached as downloaded, so both paths decode the same bytes.
        if let Some(dir) = self.cache_path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        if let Err(e) = tokio::fs::write(&self.cache_path, &bytes).await {
            warn!("Could not cache station catalogue at {}: {}", self.cache_path.display(), e);
        }
        Ok(decode_latin1(&bytes))
    }
}

/// `nsd_cccc.txt` is ISO-8859-1; every byte maps to the code point of the same value.
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CATALOG: &str = "\
LOWG;11;240;Graz-Thalerhof-Flughafen;;Austria;6;46-59N;015-26E;46-59N;015-26E;340;347;P
LOWW;11;036;Wien/Schwechat-Flughafen;;Austria;6;48-07N;016-34E;48-07N;016-34E;183;190;P
";

    #[tokio::test]
    async fn downloads_once_and_writes_the_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/nsd_cccc.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(CATALOG))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("stations").join("nsd_cccc.txt");
        let catalog = StationCatalog::new(Client::new(), &format!("{}/nsd_cccc.txt", server.uri()), cache.clone());

        assert!(catalog.loaded().is_none());
        assert_eq!(catalog.get().await.unwrap().len(), 2);
        assert_eq!(catalog.get().await.unwrap().len(), 2);
        assert!(catalog.loaded().is_some());
        assert!(cache.exists());

        let stations = catalog.loaded().unwrap();
        assert_eq!(stations[0].code, "LOWG");
        assert_eq!(stations[0].name, "Graz-Thalerhof-Flughafen");
    }

    #[tokio::test]
    async fn station_names_are_latin1() {
        let server = MockServer::start().await;
        let mut body = b"LSZH;06;670;Z".to_vec();
        body.push(0xFC);
        body.extend_from_slice(b"rich-Kloten;;Switzerland;6;47-29N;008-32E;47-29N;008-32E;422;432;P\n");
        Mock::given(method("GET"))
            .and(path("/nsd_cccc.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("nsd_cccc.txt");
        let url = format!("{}/nsd_cccc.txt", server.uri());

        let downloaded = StationCatalog::new(Client::new(), &url, cache.clone());
        assert_eq!(downloaded.get().await.unwrap()[0].name, "Z\u{fc}rich-Kloten");

        // A fresh catalogue reads the cache written above.
        let cached = StationCatalog::new(Client::new(), &url, cache);
        assert_eq!(cached.get().await.unwrap()[0].name, "Z\u{fc}rich-Kloten");
    }

    #[tokio::test]
    async fn prefers_the_cached_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("nsd_cccc.txt");
        std::fs::write(&cache, CATALOG).unwrap();

        // Unroutable source: any download attempt would fail the test.
        let catalog = StationCatalog::new(Client::new(), "http://127.0.0.1:9/nsd_cccc.txt", cache);
        assert_eq!(catalog.get().await.unwrap()[1].code, "LOWW");
    }

    #[tokio::test]
    async fn empty_catalogue_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("nsd_cccc.txt");
        std::fs::write(&cache, "garbage\n").unwrap();

        let catalog = StationCatalog::new(Client::new(), "http://127.0.0.1:9/nsd_cccc.txt", cache);
        assert!(matches!(catalog.get().await, Err(SkyError::Parse(_))));
        assert!(catalog.loaded().is_none());
    }
}
