//! Photo HTTP endpoint and cast URL construction.
//!
//! The cast device pulls raw image bytes from this server; nothing else talks
//! to it, so there is no authentication beyond staying on the local network.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path as UrlPath, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SAFE_PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

/// Builds the URLs the cast device uses to fetch photos from this host.
#[derive(Debug, Clone)]
pub struct MediaUrl {
    root: PathBuf,
    base: String,
}

impl MediaUrl {
    pub fn new(root: PathBuf, local_ip: IpAddr, port: u16) -> Self {
        Self {
            root,
            base: format!("http://{local_ip}:{port}"),
        }
    }

    /// Externally fetchable URL for a photo under the library root.
    ///
    /// Returns `None` for paths outside the root; those never belong in a
    /// snapshot in the first place.
    pub fn url_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let mut encoded = String::new();
        for component in relative.components() {
            let std::path::Component::Normal(part) = component else {
                return None;
            };
            let part = part.to_str()?;
            if !encoded.is_empty() {
                encoded.push('/');
            }
            encoded.extend(utf8_percent_encode(part, SAFE_PATH_SEGMENT));
        }
        if encoded.is_empty() {
            return None;
        }
        Some(format!("{}/photos/{}", self.base, encoded))
    }
}

/// Content type for the image formats the default media receiver renders.
pub fn content_type_for(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())?
        .to_ascii_lowercase();
    match ext.as_str() {
        "apng" => Some("image/apng"),
        "bmp" => Some("image/bmp"),
        "gif" => Some("image/gif"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

#[derive(Clone)]
struct ServeState {
    root: Arc<PathBuf>,
}

/// Spawn the photo server; it shuts down gracefully when `cancel` fires.
pub fn spawn(root: PathBuf, bind_addr: SocketAddr, cancel: CancellationToken) -> JoinHandle<()> {
    let state = ServeState {
        root: Arc::new(root),
    };
    let app = Router::new()
        .route("/photos/{*path}", get(serve_photo))
        .with_state(state);

    tokio::spawn(async move {
        tracing::info!(%bind_addr, "starting photo server");
        match TcpListener::bind(bind_addr).await {
            Ok(listener) => {
                let shutdown = cancel.clone();
                if let Err(err) = axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        shutdown.cancelled().await;
                    })
                    .await
                {
                    tracing::error!(error = %err, "photo server failed");
                }
            }
            Err(err) => {
                tracing::error!(error = %err, %bind_addr, "failed to bind photo server");
            }
        }
    })
}

async fn serve_photo(State(state): State<ServeState>, UrlPath(rest): UrlPath<String>) -> Response {
    let Some(path) = resolve_photo_path(&state.root, &rest) else {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    };
    let Some(content_type) = content_type_for(&path) else {
        return (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported media type").into_response();
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, content_type)], bytes).into_response(),
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "photo read failed");
            (StatusCode::NOT_FOUND, "not found").into_response()
        }
    }
}

/// Map a request path onto the library root, refusing anything that could
/// escape it.
fn resolve_photo_path(root: &Path, rest: &str) -> Option<PathBuf> {
    let mut path = root.to_path_buf();
    let mut depth = 0usize;
    for part in rest.split('/') {
        if part.is_empty() || part == "." || part == ".." || part.contains('\\') {
            return None;
        }
        path.push(part);
        depth += 1;
    }
    (depth > 0).then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn urls() -> MediaUrl {
        MediaUrl::new(
            PathBuf::from("/lib"),
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)),
            8080,
        )
    }

    #[test]
    fn url_for_encodes_relative_path() {
        let url = urls().url_for(Path::new("/lib/nested/a b.jpg")).unwrap();
        assert_eq!(url, "http://192.168.1.10:8080/photos/nested/a%20b.jpg");
    }

    #[test]
    fn url_for_rejects_paths_outside_root() {
        assert_eq!(urls().url_for(Path::new("/elsewhere/a.jpg")), None);
        assert_eq!(urls().url_for(Path::new("/lib")), None);
    }

    #[test]
    fn content_types_cover_castable_formats() {
        assert_eq!(content_type_for(Path::new("a.JPG")), Some("image/jpeg"));
        assert_eq!(content_type_for(Path::new("a.webp")), Some("image/webp"));
        assert_eq!(content_type_for(Path::new("a.txt")), None);
        assert_eq!(content_type_for(Path::new("noext")), None);
    }

    #[test]
    fn resolve_rejects_traversal() {
        let root = Path::new("/lib");
        assert_eq!(resolve_photo_path(root, "../etc/passwd"), None);
        assert_eq!(resolve_photo_path(root, "a/../../b.jpg"), None);
        assert_eq!(resolve_photo_path(root, ""), None);
        assert_eq!(
            resolve_photo_path(root, "nested/a.jpg"),
            Some(PathBuf::from("/lib/nested/a.jpg"))
        );
    }
}
