use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use axum::{
    extract::{Path as AxumPath, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use pbox_catalog::BuildDescriptor;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::{
    examples_index::scan_examples,
    static_files::{serve_file, serve_under},
    CoreError, Playground, ResolveError,
};

#[derive(Serialize)]
struct VersionsBody {
    versions: Vec<BuildDescriptor>,
}

/// All playground routes.
pub fn router(playground: Arc<Playground>) -> Router {
    let config = playground.config();
    let site = config.playground_root.clone();
    let examples = config.example_root();

    let router = Router::new()
        .route("/", get(|| async { Redirect::to("/examples") }))
        .route("/examples", get(index_page))
        .route("/examples/view", get(view_page))
        .route("/examples/examples.json", get(examples_json))
        .route("/phaser/versions", get(versions))
        .route("/phaser/{version}/{file}", get(build_script))
        // `{version}` holds a `<lib>-<version>.js` file name here.
        .route("/phaser/{version}", get(legacy_build_script));

    let router = [
        ("/js", site.join("js")),
        ("/css", site.join("css")),
        ("/images", site.join("images")),
        ("/fonts", site.join("fonts")),
        ("/examples/src", examples.clone()),
        ("/_plugins", examples.join("_plugins")),
        ("/assets", examples.join("assets")),
    ]
    .into_iter()
    .fold(router, |router, (prefix, root)| mount(router, prefix, root));

    router.with_state(playground)
}

fn mount(router: Router<Arc<Playground>>, prefix: &str, root: PathBuf) -> Router<Arc<Playground>> {
    let root = Arc::new(root);
    router.route(
        &format!("{prefix}/{{*path}}"),
        get(move |AxumPath(path): AxumPath<String>| {
            let root = Arc::clone(&root);
            async move { serve_under(&root, &path).await }
        }),
    )
}

async fn index_page(State(playground): State<Arc<Playground>>) -> Response {
    serve_file(&playground.config().playground_root.join("index.html")).await
}

async fn view_page(State(playground): State<Arc<Playground>>) -> Response {
    serve_file(&playground.config().playground_root.join("view_full.html")).await
}

async fn examples_json(State(playground): State<Arc<Playground>>) -> Response {
    let root = playground.config().example_root();
    match tokio::task::spawn_blocking(move || scan_examples(&root)).await {
        Ok(Ok(groups)) => json_response(&groups),
        Ok(Err(err)) => {
            warn!(%err, "failed to index examples");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to index examples: {err}"),
            )
                .into_response()
        }
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

async fn versions(State(playground): State<Arc<Playground>>) -> Result<Response, ResolveError> {
    let versions = playground.resolver().versions().await?;
    Ok(json_response(&VersionsBody { versions }))
}

async fn build_script(
    State(playground): State<Arc<Playground>>,
    AxumPath((version, file)): AxumPath<(String, String)>,
) -> Result<Response, ResolveError> {
    if file != format!("{}.js", playground.config().lib()) {
        return Ok((StatusCode::NOT_FOUND, "not found").into_response());
    }
    playground.resolver().serve(&version).await
}

/// `/phaser/<lib>-<version>.js`
async fn legacy_build_script(
    State(playground): State<Arc<Playground>>,
    AxumPath(file): AxumPath<String>,
) -> Result<Response, ResolveError> {
    let prefix = format!("{}-", playground.config().lib());
    let Some(version) = file
        .strip_prefix(&prefix)
        .and_then(|rest| rest.strip_suffix(".js"))
        .filter(|version| !version.is_empty())
    else {
        return Ok((StatusCode::NOT_FOUND, "not found").into_response());
    };
    playground.resolver().serve(version).await
}

fn json_response<T: Serialize>(value: &T) -> Response {
    match serde_json::to_string_pretty(value) {
        Ok(body) => {
            let mut response = body.into_response();
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json; charset=utf-8"),
            );
            response
        }
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

/// Bind the configured address and serve until the server fails.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server stops
/// with an I/O error.
pub async fn run(playground: Arc<Playground>) -> Result<(), CoreError> {
    let addr = playground.config().bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| CoreError::BindFailed { addr, source })?;
    let local = listener.local_addr().map_err(CoreError::Serve)?;
    log_startup(&playground, local);
    axum::serve(listener, router(playground))
        .await
        .map_err(CoreError::Serve)
}

fn log_startup(playground: &Playground, addr: SocketAddr) {
    let config = playground.config();
    info!(%addr, "playground server listening at http://{addr}");
    info!(
        example_root = %config.example_root().display(),
        site = %config.playground_root.display(),
        cache = %config.cache_dir.display(),
        local_builds = %config.local_builds.display(),
        "serving playground"
    );
}
