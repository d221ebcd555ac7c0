//! Parsed, queryable model of an API description.
//!
//! An [`ApiDescription`] groups [`Operation`]s by resource (the operation tags,
//! `default` for untagged operations) and is immutable once built. It is
//! shared as `Arc<ApiDescription>` between the registry, handles and in-flight
//! invocations.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use http::Method;
use indexmap::IndexMap;
use url::Url;

mod extract;

/// Resource name used for operations without tags.
pub const DEFAULT_RESOURCE: &str = "default";

/// Where a parameter goes in the HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamLocation {
    /// Substituted into the path template.
    Path,
    /// Appended to the query string.
    Query,
    /// Sent as a request header.
    Header,
    /// Sent in the `Cookie` header.
    Cookie,
    /// The request body.
    Body,
    /// A field of a form-encoded body (Swagger 2.0).
    FormData,
}

impl FromStr for ParamLocation {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "path" => Ok(Self::Path),
            "query" => Ok(Self::Query),
            "header" => Ok(Self::Header),
            "cookie" => Ok(Self::Cookie),
            "body" => Ok(Self::Body),
            "formData" => Ok(Self::FormData),
            other => Err(format!("unknown parameter location '{other}'")),
        }
    }
}

impl fmt::Display for ParamLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Cookie => "cookie",
            Self::Body => "body",
            Self::FormData => "formData",
        };
        f.write_str(name)
    }
}

/// A declared operation parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub(crate) name: String,
    pub(crate) location: ParamLocation,
    pub(crate) required: bool,
    pub(crate) content_type: Option<String>,
}

impl Parameter {
    /// Parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameter location.
    pub fn location(&self) -> ParamLocation {
        self.location
    }

    /// Whether the parameter is required.
    pub fn required(&self) -> bool {
        self.required
    }

    /// Declared content type, only set for body and form parameters.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }
}

/// One callable endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub(crate) name: String,
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) summary: Option<String>,
    pub(crate) parameters: Vec<Parameter>,
    pub(crate) consumes: Vec<String>,
    pub(crate) produces: Vec<String>,
}

impl Operation {
    /// Operation name (`operationId`, or derived from method and path).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path template, e.g. `/pets/{petId}`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Summary or description, if any.
    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    /// Parameters in declaration order.
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Parameters declared at a given location.
    pub fn parameters_in(&self, location: ParamLocation) -> impl Iterator<Item = &Parameter> {
        self.parameters
            .iter()
            .filter(move |param| param.location == location)
    }

    /// The body parameter, if the operation declares one.
    pub fn body_parameter(&self) -> Option<&Parameter> {
        self.parameters_in(ParamLocation::Body).next()
    }

    /// Whether the operation accepts a request body (body or form parameters).
    pub fn accepts_body(&self) -> bool {
        self.parameters.iter().any(|param| {
            matches!(param.location, ParamLocation::Body | ParamLocation::FormData)
        })
    }

    /// Declared request content types, in declaration order.
    pub fn consumes(&self) -> &[String] {
        &self.consumes
    }

    /// Declared response content types, in declaration order.
    pub fn produces(&self) -> &[String] {
        &self.produces
    }
}

/// A named group of operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub(crate) name: String,
    pub(crate) operations: IndexMap<String, Arc<Operation>>,
}

impl Resource {
    /// Resource name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks an operation up by name.
    pub fn operation(&self, name: &str) -> Option<&Arc<Operation>> {
        self.operations.get(name)
    }

    /// Operations of this resource.
    pub fn operations(&self) -> impl Iterator<Item = &Arc<Operation>> {
        self.operations.values()
    }
}

/// Which family of document the description was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecVersion {
    /// `swagger: "2.0"`.
    Swagger2,
    /// `openapi: "3.x.y"`.
    OpenApi3,
}

/// Immutable, parsed representation of an API description document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiDescription {
    pub(crate) version: SpecVersion,
    pub(crate) title: String,
    pub(crate) api_version: String,
    pub(crate) base_url: Option<Url>,
    pub(crate) resources: IndexMap<String, Resource>,
}

impl ApiDescription {
    /// Document family.
    pub fn spec_version(&self) -> SpecVersion {
        self.version
    }

    /// `info.title`.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// `info.version`.
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Base URL the operation paths are appended to.
    ///
    /// `None` when the document does not name a host and was not loaded over HTTP.
    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Looks a resource up by name.
    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.get(name)
    }

    /// All resources, in document order.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    /// Resolves `(resource, method)` to an operation.
    pub fn operation(&self, resource: &str, method: &str) -> Option<&Arc<Operation>> {
        self.resource(resource)
            .and_then(|resource| resource.operation(method))
    }

    /// Total number of `(resource, operation)` pairs.
    pub fn operation_count(&self) -> usize {
        self.resources
            .values()
            .map(|resource| resource.operations.len())
            .sum()
    }
}
