//! Loading, parsing and caching of API descriptions.

use std::path::PathBuf;
use std::sync::Arc;

use http::header::ACCEPT;
use http::{HeaderValue, Method};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::Authentication;
use crate::description::ApiDescription;
use crate::error::{SpecLoadCause, SpecLoadError};
use crate::transport::{ReqwestTransport, Transport};

const SPEC_ACCEPT: &str = "application/json, application/yaml;q=0.9, */*;q=0.8";

#[derive(Debug)]
struct CachedDescription {
    url: String,
    description: Arc<ApiDescription>,
}

/// Loads API descriptions and keeps the last one, keyed by its exact URL string.
///
/// At most one description is alive per registry: loading a different URL
/// discards the cached one before fetching. Concurrent loads are serialized,
/// so a URL is fetched once even when requested by many callers at the same time.
#[derive(Debug)]
pub struct SpecRegistry<T = ReqwestTransport> {
    transport: Arc<T>,
    authentication: Option<Authentication>,
    cache: Mutex<Option<CachedDescription>>,
}

impl Default for SpecRegistry {
    fn default() -> Self {
        Self::new(Arc::new(ReqwestTransport::default()))
    }
}

impl<T> SpecRegistry<T>
where
    T: Transport,
{
    /// Creates an empty registry fetching documents through `transport`.
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            authentication: None,
            cache: Mutex::new(None),
        }
    }

    /// Attaches credentials to spec fetches over HTTP.
    #[must_use]
    pub fn with_authentication(mut self, authentication: Option<Authentication>) -> Self {
        self.authentication = authentication;
        self
    }

    /// Returns the description for `url`, fetching and parsing it on a cache miss.
    ///
    /// # Errors
    ///
    /// Returns a [`SpecLoadError`] carrying `url` when the document cannot be
    /// fetched, read or parsed. Nothing is cached and nothing is retried.
    pub async fn load(&self, url: &str) -> Result<Arc<ApiDescription>, SpecLoadError> {
        self.load_cached_if(url, || true).await
    }

    /// Like [`load`](Self::load), but the cache is only written while `keep` holds.
    ///
    /// `keep` is checked once the registry lock is taken and again before
    /// storing, so a load that became stale never evicts a newer entry.
    pub(crate) async fn load_cached_if(
        &self,
        url: &str,
        keep: impl Fn() -> bool,
    ) -> Result<Arc<ApiDescription>, SpecLoadError> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref().filter(|cached| cached.url == url) {
            debug!(%url, "API description cache hit");
            return Ok(Arc::clone(&cached.description));
        }
        if keep()
            && let Some(previous) = cache.take()
        {
            debug!(previous = %previous.url, %url, "discarding cached API description");
        }

        match self.fetch(url).await {
            Ok(description) => {
                let description = Arc::new(description);
                info!(
                    %url,
                    title = %description.title(),
                    operations = description.operation_count(),
                    "API description loaded"
                );
                if keep() {
                    *cache = Some(CachedDescription {
                        url: url.to_string(),
                        description: Arc::clone(&description),
                    });
                } else {
                    debug!(%url, "stale load, cache left untouched");
                }
                Ok(description)
            }
            Err(cause) => {
                let error = SpecLoadError {
                    url: url.to_string(),
                    cause,
                };
                warn!(%error, "failed to load API description");
                Err(error)
            }
        }
    }

    /// Drops the cached description.
    pub async fn invalidate(&self) {
        if let Some(previous) = self.cache.lock().await.take() {
            debug!(url = %previous.url, "API description cache invalidated");
        }
    }

    /// URL of the cached description, if any.
    pub async fn cached_url(&self) -> Option<String> {
        self.cache
            .lock()
            .await
            .as_ref()
            .map(|cached| cached.url.clone())
    }

    async fn fetch(&self, raw: &str) -> Result<ApiDescription, SpecLoadCause> {
        let (url, content) = match SpecSource::parse(raw)? {
            SpecSource::Http(url) => {
                let content = self.fetch_http(&url).await?;
                (url, content)
            }
            SpecSource::File { url, path } => {
                debug!(path = %path.display(), "reading API description");
                let content = tokio::fs::read(&path).await?;
                (url, content)
            }
        };

        let document = parse_document(&content)?;
        ApiDescription::from_document(&document, &url)
    }

    async fn fetch_http(&self, url: &Url) -> Result<Vec<u8>, SpecLoadCause> {
        let mut request = reqwest::Request::new(Method::GET, url.clone());
        request
            .headers_mut()
            .insert(ACCEPT, HeaderValue::from_static(SPEC_ACCEPT));
        if let Some(authentication) = &self.authentication {
            let (name, value) =
                authentication
                    .to_header()
                    .map_err(|error| SpecLoadCause::InvalidSource {
                        message: format!("invalid credentials: {error}"),
                    })?;
            request.headers_mut().insert(name, value);
        }

        let response = self
            .transport
            .send(request)
            .await?
            .ok_or(SpecLoadCause::NoResponse)?;
        if !(200..300).contains(&response.status) {
            return Err(SpecLoadCause::HttpStatus {
                status: response.status,
            });
        }
        Ok(response.body.to_vec())
    }
}

/// Where a document comes from.
#[derive(Debug, PartialEq, Eq)]
enum SpecSource {
    Http(Url),
    File { url: Url, path: PathBuf },
}

impl SpecSource {
    fn parse(raw: &str) -> Result<Self, SpecLoadCause> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(SpecLoadCause::InvalidSource {
                message: "empty spec URL".to_string(),
            });
        }

        match Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(Self::Http(url)),
            Ok(url) if url.scheme() == "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|()| SpecLoadCause::InvalidSource {
                        message: format!("'{raw}' is not a valid file URL"),
                    })?;
                Ok(Self::File { url, path })
            }
            // Windows drive letters parse as one-letter schemes.
            Ok(url) if url.scheme().len() > 1 => Err(SpecLoadCause::InvalidSource {
                message: format!("unsupported scheme '{}'", url.scheme()),
            }),
            Ok(_) | Err(url::ParseError::RelativeUrlWithoutBase) => Self::from_path(raw),
            Err(error) => Err(SpecLoadCause::InvalidSource {
                message: format!("'{raw}' is not a valid URL: {error}"),
            }),
        }
    }

    fn from_path(raw: &str) -> Result<Self, SpecLoadCause> {
        let path = std::path::absolute(raw)?;
        let url = Url::from_file_path(&path).map_err(|()| SpecLoadCause::InvalidSource {
            message: format!("'{raw}' is not a valid path"),
        })?;
        Ok(Self::File { url, path })
    }
}

/// JSON when the first non-blank character is `{`, YAML otherwise.
fn parse_document(content: &[u8]) -> Result<Value, SpecLoadCause> {
    let first = content
        .iter()
        .find(|byte| !byte.is_ascii_whitespace())
        .copied();
    if first == Some(b'{') {
        return Ok(serde_json::from_slice(content)?);
    }
    parse_yaml(content)
}

#[cfg(feature = "yaml")]
fn parse_yaml(content: &[u8]) -> Result<Value, SpecLoadCause> {
    let text = std::str::from_utf8(content).map_err(|error| SpecLoadCause::Yaml {
        message: error.to_string(),
    })?;
    serde_saphyr::from_str(text).map_err(|error| SpecLoadCause::Yaml {
        message: error.to_string(),
    })
}

#[cfg(not(feature = "yaml"))]
fn parse_yaml(_content: &[u8]) -> Result<Value, SpecLoadCause> {
    Err(SpecLoadCause::UnsupportedDocument {
        message: "the document is not JSON and YAML support is disabled".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::transport::mock::{MockReply, MockTransport};

    const SPEC_URL: &str = "http://api.test/swagger.json";
    const OTHER_URL: &str = "http://api.test/v2/swagger.json";

    const SWAGGER: &str = r#"{
        "swagger": "2.0",
        "info": { "title": "Pets", "version": "1.0" },
        "paths": {
            "/pets": { "get": { "tags": ["pet"], "operationId": "listPets" } }
        }
    }"#;

    fn registry(transport: &MockTransport) -> SpecRegistry<MockTransport> {
        SpecRegistry::new(Arc::new(transport.clone()))
    }

    #[tokio::test]
    async fn test_load_caches_by_url() {
        let transport = MockTransport::default().respond(Method::GET, SPEC_URL, 200, SWAGGER);
        let registry = registry(&transport);

        let first = registry.load(SPEC_URL).await.expect("loaded");
        let second = registry.load(SPEC_URL).await.expect("cached");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(transport.calls(), 1);
        assert_eq!(registry.cached_url().await.as_deref(), Some(SPEC_URL));
        assert!(first.operation("pet", "listPets").is_some());
        assert_eq!(
            first.base_url().map(Url::as_str),
            Some("http://api.test/")
        );
    }

    #[tokio::test]
    async fn test_different_url_replaces_cache() {
        let transport = MockTransport::default()
            .respond(Method::GET, SPEC_URL, 200, SWAGGER)
            .respond(Method::GET, OTHER_URL, 200, SWAGGER);
        let registry = registry(&transport);

        let first = registry.load(SPEC_URL).await.expect("loaded");
        let other = registry.load(OTHER_URL).await.expect("loaded");
        let again = registry.load(SPEC_URL).await.expect("loaded");

        assert!(!Arc::ptr_eq(&first, &other));
        assert!(!Arc::ptr_eq(&first, &again));
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_stale_load_keeps_current_entry() {
        let transport = MockTransport::default()
            .respond(Method::GET, SPEC_URL, 200, SWAGGER)
            .respond(Method::GET, OTHER_URL, 200, SWAGGER);
        let registry = registry(&transport);
        registry.load(OTHER_URL).await.expect("current load");

        let stale = registry
            .load_cached_if(SPEC_URL, || false)
            .await
            .expect("stale load still resolves");

        assert_eq!(stale.title(), "Pets");
        assert_eq!(registry.cached_url().await.as_deref(), Some(OTHER_URL));
        registry.load(OTHER_URL).await.expect("cache hit");
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let transport = MockTransport::default().respond(Method::GET, SPEC_URL, 200, SWAGGER);
        let registry = registry(&transport);

        registry.load(SPEC_URL).await.expect("loaded");
        registry.invalidate().await;
        assert_eq!(registry.cached_url().await, None);
        registry.load(SPEC_URL).await.expect("loaded");

        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_loads_fetch_once() {
        let transport = MockTransport::default().respond(Method::GET, SPEC_URL, 200, SWAGGER);
        let registry = registry(&transport);

        let (first, second) = tokio::join!(registry.load(SPEC_URL), registry.load(SPEC_URL));

        assert!(Arc::ptr_eq(
            &first.expect("loaded"),
            &second.expect("loaded")
        ));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_fetch_sends_credentials() {
        let transport = MockTransport::default().respond(Method::GET, SPEC_URL, 200, SWAGGER);
        let registry = registry(&transport)
            .with_authentication(Some(Authentication::Bearer("spec-token".into())));

        registry.load(SPEC_URL).await.expect("loaded");

        let request = transport.last();
        assert_eq!(request.header("authorization"), Some("Bearer spec-token"));
        assert_eq!(request.header("accept"), Some(SPEC_ACCEPT));
    }

    #[rstest]
    #[case::not_found(MockReply::Respond { status: 404, body: "not found".to_string() })]
    #[case::invalid_json(MockReply::Respond { status: 200, body: "{ not json".to_string() })]
    #[case::unsupported(MockReply::Respond { status: 200, body: r#"{"openapi": "2.0"}"#.to_string() })]
    #[case::no_response(MockReply::NoResponse)]
    #[case::transport(MockReply::Fail("connection refused".to_string()))]
    #[tokio::test]
    async fn test_load_failures_are_not_cached(#[case] reply: MockReply) {
        let transport = MockTransport::default().route(Method::GET, SPEC_URL, reply);
        let registry = registry(&transport);

        let error = registry.load(SPEC_URL).await.expect_err("should fail");
        let _ = registry.load(SPEC_URL).await.expect_err("should fail again");

        assert_eq!(error.url, SPEC_URL);
        assert_eq!(registry.cached_url().await, None);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_http_status_error_message() {
        let transport = MockTransport::default();
        let registry = registry(&transport);

        let error = registry.load(SPEC_URL).await.expect_err("404");

        assert!(matches!(error.cause, SpecLoadCause::HttpStatus { status: 404 }));
        assert_eq!(
            error.to_string(),
            "Failed to load API description from 'http://api.test/swagger.json': \
             Unexpected HTTP status 404 while fetching the document"
        );
    }

    #[tokio::test]
    async fn test_load_local_file() {
        let dir = std::env::temp_dir().join(format!("oas-invoke-registry-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.expect("temp dir");
        let path = dir.join("swagger.json");
        tokio::fs::write(&path, SWAGGER).await.expect("written");
        let transport = MockTransport::default();
        let registry = registry(&transport);

        let from_path = registry
            .load(&path.display().to_string())
            .await
            .expect("loaded from path");
        let file_url = Url::from_file_path(&path).expect("absolute path");
        let from_url = registry.load(file_url.as_str()).await.expect("loaded from URL");

        assert_eq!(from_path.title(), "Pets");
        assert_eq!(from_url.title(), "Pets");
        assert_eq!(from_path.base_url(), None);
        assert_eq!(transport.calls(), 0);
        tokio::fs::remove_dir_all(&dir).await.expect("cleaned up");
    }

    #[tokio::test]
    async fn test_missing_local_file() {
        let registry = registry(&MockTransport::default());

        let error = registry
            .load("/definitely/not/here/swagger.json")
            .await
            .expect_err("missing file");

        assert!(matches!(error.cause, SpecLoadCause::Io(_)));
    }

    #[rstest]
    #[case::empty("  ")]
    #[case::ftp("ftp://example.com/swagger.json")]
    fn test_invalid_sources(#[case] raw: &str) {
        assert!(matches!(
            SpecSource::parse(raw),
            Err(SpecLoadCause::InvalidSource { .. })
        ));
    }

    #[test]
    fn test_relative_path_becomes_absolute() {
        let source = SpecSource::parse("specs/petstore.yaml").expect("a path");

        let SpecSource::File { url, path } = source else {
            panic!("expected a file source");
        };
        assert!(path.is_absolute());
        assert!(path.ends_with("specs/petstore.yaml"));
        assert_eq!(url.scheme(), "file");
    }

    #[cfg(feature = "yaml")]
    #[tokio::test]
    async fn test_yaml_document() {
        let yaml = "
openapi: 3.0.3
info:
  title: Pets YAML
  version: '1.0'
servers:
  - url: https://pets.example.com/api
paths:
  /pets:
    get:
      operationId: listPets
      tags: [pet]
";
        let transport = MockTransport::default().respond(Method::GET, SPEC_URL, 200, yaml);
        let registry = registry(&transport);

        let description = registry.load(SPEC_URL).await.expect("loaded");

        assert_eq!(description.title(), "Pets YAML");
        assert!(description.operation("pet", "listPets").is_some());
        assert_eq!(
            description.base_url().map(Url::as_str),
            Some("https://pets.example.com/api/")
        );
    }
}
