use std::path::{Component, Path, PathBuf};

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;
use tracing::warn;

pub(crate) fn sanitize_rel_path(path: &str) -> Option<PathBuf> {
    let trimmed = path.trim_start_matches('/');
    let rel = PathBuf::from(trimmed);
    for comp in rel.components() {
        if matches!(
            comp,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        ) {
            return None;
        }
    }
    Some(rel)
}

pub(crate) fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
        .as_str()
    {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" => "application/javascript; charset=utf-8",
        "json" => "application/json; charset=utf-8",
        "txt" => "text/plain; charset=utf-8",
        "xml" => "application/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "mp4" => "video/mp4",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "eot" => "application/vnd.ms-fontobject",
        _ => "application/octet-stream",
    }
}

/// Serve `raw_path` from beneath `root`.
pub(crate) async fn serve_under(root: &Path, raw_path: &str) -> Response {
    let Some(rel) = sanitize_rel_path(raw_path) else {
        return (StatusCode::BAD_REQUEST, "invalid path").into_response();
    };
    if rel.as_os_str().is_empty() {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    }
    serve_file(&root.join(rel)).await
}

pub(crate) async fn serve_file(path: &Path) -> Response {
    if !path.is_file() {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    }
    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(err) => {
            warn!(%err, path = %path.display(), "failed to open static file");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to read {}: {err}", path.display()),
            )
                .into_response();
        }
    };

    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type_for(path)),
    );
    response
}
