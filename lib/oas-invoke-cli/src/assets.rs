//! Static-file server for bundled client assets.

use std::io;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{Path as UrlPath, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Error of an asset request.
#[derive(Debug, derive_more::Error, derive_more::Display)]
pub enum AssetError {
    /// The file name is empty, absolute or escapes the root.
    #[display("invalid asset name '{name}'")]
    InvalidName {
        /// The rejected name.
        #[error(not(source))]
        name: String,
    },

    /// No such file under the root.
    #[display("asset '{name}' not found")]
    NotFound {
        /// The requested name.
        #[error(not(source))]
        name: String,
    },

    /// The file exists but cannot be read.
    #[display("cannot read asset '{name}': {source}")]
    Io {
        /// The requested name.
        name: String,
        /// Underlying error.
        source: io::Error,
    },
}

impl IntoResponse for AssetError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidName { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Turns a requested name into a path relative to the assets root.
///
/// Both `/` and `\` separate segments, so `..\secret` is rejected too.
///
/// # Errors
///
/// Returns [`AssetError::InvalidName`] for an empty name, an absolute path or
/// any parent-directory segment.
pub fn sanitize(name: &str) -> Result<PathBuf, AssetError> {
    let invalid = || AssetError::InvalidName {
        name: name.to_string(),
    };

    if name.trim().is_empty() || name.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(invalid());
    }

    let mut relative = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(segment) => relative.push(segment),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(invalid());
            }
        }
    }

    if relative.as_os_str().is_empty() {
        return Err(invalid());
    }
    Ok(relative)
}

/// Content type served for `path`, from its extension.
pub fn content_type(path: &Path) -> mime::Mime {
    let extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "html" | "htm" => mime::TEXT_HTML_UTF_8,
        "css" => mime::TEXT_CSS_UTF_8,
        "js" | "mjs" => mime::APPLICATION_JAVASCRIPT_UTF_8,
        "json" | "map" => mime::APPLICATION_JSON,
        "txt" => mime::TEXT_PLAIN_UTF_8,
        "svg" => mime::IMAGE_SVG,
        "png" => mime::IMAGE_PNG,
        "jpg" | "jpeg" => mime::IMAGE_JPEG,
        "gif" => mime::IMAGE_GIF,
        "woff" => mime::FONT_WOFF,
        "woff2" => mime::FONT_WOFF2,
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}

async fn serve_asset(
    State(root): State<Arc<PathBuf>>,
    UrlPath(name): UrlPath<String>,
) -> Result<impl IntoResponse, AssetError> {
    let relative = sanitize(&name).inspect_err(|error| warn!(%error, "rejected asset request"))?;
    let path = root.join(&relative);

    let content = tokio::fs::read(&path).await.map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            AssetError::NotFound { name: name.clone() }
        } else {
            AssetError::Io {
                name: name.clone(),
                source,
            }
        }
    })?;
    debug!(path = %path.display(), size = content.len(), "serving asset");

    Ok((
        [(header::CONTENT_TYPE, content_type(&relative).to_string())],
        content,
    ))
}

/// The assets router, serving `GET /assets/{*file}` from `root`.
pub fn assets_router(root: impl Into<PathBuf>) -> Router {
    Router::new()
        .route("/assets/{*file}", get(serve_asset))
        .with_state(Arc::new(root.into()))
}

/// Binds `addr` and serves the assets under `root`.
///
/// # Errors
///
/// Fails when the address cannot be bound or the server stops with an error.
pub async fn run(addr: SocketAddr, root: PathBuf) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    launch(listener, root).await
}

/// Serves the assets under `root` on an already bound listener.
///
/// # Errors
///
/// Fails when the server stops with an error.
pub async fn launch(listener: TcpListener, root: PathBuf) -> Result<()> {
    let local_addr = listener.local_addr().context("reading local address")?;
    info!(%local_addr, root = %root.display(), "serving assets");

    let app = assets_router(root).layer(TraceLayer::new_for_http());
    axum::serve(listener, app.into_make_service())
        .await
        .context("starting server")?;
    Ok(())
}
