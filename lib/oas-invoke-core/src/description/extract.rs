use std::sync::{Arc, LazyLock};

use http::Method;
use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::{
    ApiDescription, DEFAULT_RESOURCE, Operation, ParamLocation, Parameter, Resource, SpecVersion,
};
use crate::error::SpecLoadCause;

const METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Maximum number of local `$ref` hops followed before giving up.
const MAX_REF_DEPTH: usize = 16;

static NON_ALPHANUMERIC_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]+").expect("a valid regex"));

static SERVER_VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(?<name>[^}]+)}").expect("a valid regex"));

impl ApiDescription {
    /// Builds a description from a Swagger 2.0 or OpenAPI 3.x document.
    ///
    /// `source` is the location the document was loaded from; it provides the
    /// default scheme and host, and resolves relative server URLs.
    pub(crate) fn from_document(document: &Value, source: &Url) -> Result<Self, SpecLoadCause> {
        let version = detect_version(document)?;
        let extractor = Extractor { document, version };

        let info = document.get("info");
        let title = info
            .and_then(|info| info.get("title"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let api_version = info
            .and_then(|info| info.get("version"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let base_url = match version {
            SpecVersion::Swagger2 => swagger2_base_url(document, source),
            SpecVersion::OpenApi3 => openapi3_base_url(document, source),
        };

        let mut resources = IndexMap::<String, Resource>::new();
        let paths = document.get("paths").and_then(Value::as_object);
        for (path, path_item) in paths.into_iter().flatten() {
            let path_item = extractor.resolve(path_item);
            for method in METHODS {
                let Some(operation) = path_item.get(method) else {
                    continue;
                };
                let (tags, operation) = extractor.operation(path, method, path_item, operation)?;
                let operation = Arc::new(operation);
                for tag in tags {
                    let resource = resources.entry(tag.clone()).or_insert_with(|| Resource {
                        name: tag,
                        operations: IndexMap::new(),
                    });
                    if resource.operations.contains_key(&operation.name) {
                        warn!(
                            resource = %resource.name,
                            operation = %operation.name,
                            "duplicate operation name, keeping the first declaration"
                        );
                        continue;
                    }
                    resource
                        .operations
                        .insert(operation.name.clone(), Arc::clone(&operation));
                }
            }
        }

        let result = Self {
            version,
            title,
            api_version,
            base_url,
            resources,
        };
        debug!(
            title = %result.title,
            resources = result.resources.len(),
            operations = result.operation_count(),
            base_url = ?result.base_url.as_ref().map(Url::as_str),
            "API description extracted"
        );
        Ok(result)
    }
}

fn detect_version(document: &Value) -> Result<SpecVersion, SpecLoadCause> {
    if !document.is_object() {
        return Err(SpecLoadCause::UnsupportedDocument {
            message: "the document root is not an object".to_string(),
        });
    }
    if let Some(version) = document.get("swagger").and_then(version_string) {
        return if version.starts_with("2.") {
            Ok(SpecVersion::Swagger2)
        } else {
            Err(SpecLoadCause::UnsupportedDocument {
                message: format!("unsupported swagger version '{version}'"),
            })
        };
    }
    if let Some(version) = document.get("openapi").and_then(version_string) {
        return if version.starts_with("3.") {
            Ok(SpecVersion::OpenApi3)
        } else {
            Err(SpecLoadCause::UnsupportedDocument {
                message: format!("unsupported openapi version '{version}'"),
            })
        };
    }
    Err(SpecLoadCause::UnsupportedDocument {
        message: "missing 'swagger' or 'openapi' version field".to_string(),
    })
}

// YAML documents may carry the version as a number (`swagger: 2.0`).
fn version_string(value: &Value) -> Option<String> {
    match value {
        Value::String(version) => Some(version.clone()),
        Value::Number(version) => Some(version.to_string()),
        _ => None,
    }
}

fn swagger2_base_url(document: &Value, source: &Url) -> Option<Url> {
    let from_http = matches!(source.scheme(), "http" | "https");
    let scheme = document
        .get("schemes")
        .and_then(Value::as_array)
        .and_then(|schemes| schemes.first())
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| from_http.then(|| source.scheme().to_string()))
        .unwrap_or_else(|| "http".to_string());
    let host = document
        .get("host")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            from_http.then(|| {
                let host = source.host_str().unwrap_or_default();
                match source.port() {
                    Some(port) => format!("{host}:{port}"),
                    None => host.to_string(),
                }
            })
        })?;
    let base_path = document
        .get("basePath")
        .and_then(Value::as_str)
        .unwrap_or("/");

    let base_path = base_path.trim_end_matches('/');
    let base = format!("{scheme}://{host}{base_path}/");
    Url::parse(&base)
        .inspect_err(|error| warn!(%base, %error, "ignoring invalid base URL"))
        .ok()
}

fn openapi3_base_url(document: &Value, source: &Url) -> Option<Url> {
    let server = document
        .get("servers")
        .and_then(Value::as_array)
        .and_then(|servers| servers.first());
    let raw = server
        .and_then(|server| server.get("url"))
        .and_then(Value::as_str)
        .unwrap_or("/");

    let variables = server.and_then(|server| server.get("variables"));
    let expanded = SERVER_VARIABLE.replace_all(raw, |captures: &regex::Captures<'_>| {
        let name = captures.name("name").map_or("", |name| name.as_str());
        variables
            .and_then(|variables| variables.get(name))
            .and_then(|variable| variable.get("default"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    });

    let mut base = match Url::parse(&expanded) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => source
            .join(&expanded)
            .inspect_err(|error| warn!(server = %expanded, %error, "ignoring invalid server URL"))
            .ok()?,
        Err(error) => {
            warn!(server = %expanded, %error, "ignoring invalid server URL");
            return None;
        }
    };
    if !matches!(base.scheme(), "http" | "https") {
        return None;
    }
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Some(base)
}

/// Derives an operation name when `operationId` is missing: `get /pets/{petId}` gives `get_pets_petId`.
pub(crate) fn derive_operation_name(method: &str, path: &str) -> String {
    let raw = format!("{}_{path}", method.to_lowercase());
    NON_ALPHANUMERIC_RUN
        .replace_all(&raw, "_")
        .trim_matches('_')
        .to_string()
}

struct Extractor<'a> {
    document: &'a Value,
    version: SpecVersion,
}

impl<'a> Extractor<'a> {
    /// Follows local `#/...` references; external ones are returned as is.
    fn resolve(&self, mut value: &'a Value) -> &'a Value {
        for _ in 0..MAX_REF_DEPTH {
            let Some(reference) = value.get("$ref").and_then(Value::as_str) else {
                return value;
            };
            let Some(pointer) = reference.strip_prefix('#') else {
                return value;
            };
            match self.document.pointer(pointer) {
                Some(target) => value = target,
                None => {
                    warn!(%reference, "unresolved reference");
                    return value;
                }
            }
        }
        warn!("reference chain too deep");
        value
    }

    fn operation(
        &self,
        path: &str,
        method: &str,
        path_item: &'a Value,
        operation: &'a Value,
    ) -> Result<(Vec<String>, Operation), SpecLoadCause> {
        let http_method = Method::from_bytes(method.to_uppercase().as_bytes()).map_err(|_| {
            SpecLoadCause::UnsupportedDocument {
                message: format!("invalid method '{method}'"),
            }
        })?;

        let name = operation
            .get("operationId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map_or_else(|| derive_operation_name(method, path), str::to_string);

        let summary = operation
            .get("summary")
            .or_else(|| operation.get("description"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let mut tags = operation
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        if tags.is_empty() {
            tags.push(DEFAULT_RESOURCE.to_string());
        }

        let mut parameters = self.parameters(path_item.get("parameters"), operation.get("parameters"));
        let (consumes, produces) = match self.version {
            SpecVersion::Swagger2 => (
                self.media_types(operation, "consumes"),
                self.media_types(operation, "produces"),
            ),
            SpecVersion::OpenApi3 => {
                let consumes = match operation.get("requestBody").map(|body| self.resolve(body)) {
                    Some(body) => {
                        let consumes = content_keys(body);
                        parameters.push(Parameter {
                            name: "body".to_string(),
                            location: ParamLocation::Body,
                            required: body
                                .get("required")
                                .and_then(Value::as_bool)
                                .unwrap_or(false),
                            content_type: consumes.first().cloned(),
                        });
                        consumes
                    }
                    None => vec![],
                };
                (consumes, self.response_media_types(operation))
            }
        };

        let operation = Operation {
            name,
            method: http_method,
            path: path.to_string(),
            summary,
            parameters,
            consumes,
            produces,
        };
        Ok((tags, operation))
    }

    /// Merges path-level and operation-level parameters; the operation wins on `(name, in)`.
    fn parameters(&self, path_level: Option<&'a Value>, operation_level: Option<&'a Value>) -> Vec<Parameter> {
        let mut merged = IndexMap::<(String, ParamLocation), Parameter>::new();
        for source in [path_level, operation_level].into_iter().flatten() {
            for param in source.as_array().into_iter().flatten() {
                let param = self.resolve(param);
                if let Some(param) = self.parameter(param) {
                    merged.insert((param.name.clone(), param.location), param);
                }
            }
        }
        merged.into_values().collect()
    }

    fn parameter(&self, param: &Value) -> Option<Parameter> {
        let name = param.get("name")?.as_str()?.to_string();
        let location = param
            .get("in")?
            .as_str()?
            .parse::<ParamLocation>()
            .inspect_err(|error| warn!(%name, %error, "skipping parameter"))
            .ok()?;
        let required = location == ParamLocation::Path
            || param
                .get("required")
                .and_then(Value::as_bool)
                .unwrap_or(false);
        let content_type = match location {
            ParamLocation::FormData => Some(mime::APPLICATION_WWW_FORM_URLENCODED.to_string()),
            _ => None,
        };
        Some(Parameter {
            name,
            location,
            required,
            content_type,
        })
    }

    /// Swagger 2.0 `consumes`/`produces`: operation level, else document level.
    fn media_types(&self, operation: &Value, key: &str) -> Vec<String> {
        operation
            .get(key)
            .or_else(|| self.document.get(key))
            .and_then(Value::as_array)
            .map(|types| {
                types
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn response_media_types(&self, operation: &'a Value) -> Vec<String> {
        let mut types = Vec::<String>::new();
        let responses = operation.get("responses").and_then(Value::as_object);
        for response in responses.into_iter().flat_map(|responses| responses.values()) {
            for media_type in content_keys(self.resolve(response)) {
                if !types.contains(&media_type) {
                    types.push(media_type);
                }
            }
        }
        types
    }
}

fn content_keys(value: &Value) -> Vec<String> {
    value
        .get("content")
        .and_then(Value::as_object)
        .map(|content| content.keys().cloned().collect())
        .unwrap_or_default()
}
