//! Media library listing.
//!
//! After processing, rendered clips live in the hosted media library
//! under the job's namespace. When the processing service does not
//! describe its clips, the workflow lists that namespace instead.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error};

use crate::error::{MediaError, MediaResult};
use crate::metrics::record_request;

/// Listing of derived media by key prefix.
#[async_trait]
pub trait MediaLibrary: Send + Sync {
    /// Keys of all media stored under `namespace`, inside the library's
    /// folder. Listing failures are logged and yield an empty list.
    async fn list(&self, namespace: &str) -> Vec<String>;
}

/// Media library configuration.
#[derive(Debug, Clone)]
pub struct LibraryConfig {
    /// API base URL
    pub base_url: String,
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    /// Folder all clips are uploaded into
    pub folder: String,
    /// Maximum entries returned by one listing
    pub max_results: u32,
    pub timeout: Duration,
}

impl LibraryConfig {
    pub fn new(
        cloud_name: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            base_url: "https://api.cloudinary.com".to_string(),
            cloud_name: cloud_name.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            folder: "mylo-videos".to_string(),
            max_results: 500,
            timeout: Duration::from_secs(30),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> MediaResult<Self> {
        let required = |name: &str| {
            std::env::var(name).map_err(|_| MediaError::config(format!("{} not set", name)))
        };

        let mut config = Self::new(
            required("CLOUDINARY_CLOUD_NAME")?,
            required("CLOUDINARY_API_KEY")?,
            required("CLOUDINARY_API_SECRET")?,
        );
        if let Ok(base_url) = std::env::var("CLOUDINARY_API_BASE") {
            config.base_url = base_url;
        }
        if let Ok(folder) = std::env::var("CLOUDINARY_FOLDER") {
            config.folder = folder;
        }
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Full listing prefix for a namespace.
    pub fn prefix_for(&self, namespace: &str) -> String {
        if self.folder.is_empty() {
            namespace.to_string()
        } else {
            format!("{}/{}", self.folder, namespace)
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResourceList {
    #[serde(default)]
    resources: Vec<Resource>,
}

#[derive(Debug, Deserialize)]
struct Resource {
    #[serde(default)]
    public_id: String,
}

/// Media library backed by the Cloudinary admin API.
#[derive(Clone)]
pub struct CloudinaryLibrary {
    http: Client,
    config: LibraryConfig,
}

impl CloudinaryLibrary {
    pub fn new(config: LibraryConfig) -> MediaResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("mylo-media/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> MediaResult<Self> {
        Self::new(LibraryConfig::from_env()?)
    }

    /// List uploaded videos under a namespace, surfacing errors.
    pub async fn fetch(&self, namespace: &str) -> MediaResult<Vec<String>> {
        let prefix = self.config.prefix_for(namespace);
        let url = format!(
            "{}/v1_1/{}/resources/video/upload?prefix={}&max_results={}",
            self.config.base_url.trim_end_matches('/'),
            self.config.cloud_name,
            urlencoding::encode(&prefix),
            self.config.max_results
        );

        let start = Instant::now();
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.config.api_key, Some(&self.config.api_secret))
            .send()
            .await;
        let elapsed = start.elapsed().as_secs_f64();

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                record_request("list_media", 0, elapsed);
                return Err(e.into());
            }
        };

        let status = response.status();
        record_request("list_media", status.as_u16(), elapsed);
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MediaError::upstream(status.as_u16(), body));
        }

        let list: ResourceList = response.json().await?;
        let keys: Vec<String> = list
            .resources
            .into_iter()
            .map(|r| r.public_id)
            .filter(|id| !id.is_empty())
            .collect();

        debug!(prefix = %prefix, count = keys.len(), "Listed media library");
        Ok(keys)
    }
}

#[async_trait]
impl MediaLibrary for CloudinaryLibrary {
    async fn list(&self, namespace: &str) -> Vec<String> {
        match self.fetch(namespace).await {
            Ok(keys) => keys,
            Err(e) => {
                error!(namespace, "Failed to list media library: {}", e);
                Vec::new()
            }
        }
    }
}

/// Media library held in memory.
#[derive(Debug)]
pub struct InMemoryLibrary {
    folder: String,
    keys: Mutex<Vec<String>>,
}

impl Default for InMemoryLibrary {
    fn default() -> Self {
        Self::new("mylo-videos")
    }
}

impl InMemoryLibrary {
    pub fn new(folder: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            keys: Mutex::new(Vec::new()),
        }
    }

    /// Add a key, already qualified with the folder.
    pub fn insert(&self, key: impl Into<String>) {
        if let Ok(mut keys) = self.keys.lock() {
            keys.push(key.into());
        }
    }
}

#[async_trait]
impl MediaLibrary for InMemoryLibrary {
    async fn list(&self, namespace: &str) -> Vec<String> {
        let prefix = if self.folder.is_empty() {
            namespace.to_string()
        } else {
            format!("{}/{}", self.folder, namespace)
        };
        match self.keys.lock() {
            Ok(keys) => keys.iter().filter(|k| k.starts_with(&prefix)).cloned().collect(),
            Err(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn library(server: &MockServer) -> CloudinaryLibrary {
        let config = LibraryConfig::new("demo", "key", "secret").with_base_url(server.uri());
        CloudinaryLibrary::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_list_by_prefix() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1_1/demo/resources/video/upload"))
            .and(query_param("prefix", "mylo-videos/abc"))
            .and(query_param("max_results", "500"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resources": [
                    {"public_id": "mylo-videos/abc/original"},
                    {"public_id": "mylo-videos/abc_clip_0"},
                    {"public_id": ""}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let keys = library(&server).list("abc").await;
        assert_eq!(keys, vec!["mylo-videos/abc/original", "mylo-videos/abc_clip_0"]);
    }

    #[tokio::test]
    async fn test_list_error_yields_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let library = library(&server);
        assert!(library.list("abc").await.is_empty());
        assert!(matches!(
            library.fetch("abc").await,
            Err(MediaError::Upstream { status: 401, .. })
        ));
    }

    #[tokio::test]
    async fn test_in_memory_prefix_filter() {
        let library = InMemoryLibrary::default();
        library.insert("mylo-videos/abc/original");
        library.insert("mylo-videos/abc_clip_0");
        library.insert("mylo-videos/xyz_clip_0");

        assert_eq!(library.list("abc").await.len(), 2);
        assert!(library.list("nope").await.is_empty());
    }
}
