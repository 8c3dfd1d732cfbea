use std::{fs, net::SocketAddr, path::Path, time::Duration};

use httptest::{matchers::*, responders::*, Expectation, Server};
use pbox_catalog::RemoteSource;
use pbox_core::{router, Playground, PlaygroundConfig, ORIGIN_HEADER};
use pbox_session::{example_url, legacy_example_url, ExampleIdentity, DEFAULT_VERSION_TAG};
use reqwest::Url;
use serde_json::{json, Value};
use tokio::net::TcpListener;

struct Harness {
    _temp: tempfile::TempDir,
    cache: std::path::PathBuf,
    addr: SocketAddr,
    client: reqwest::Client,
}

impl Harness {
    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    async fn get(&self, path: &str) -> anyhow::Result<reqwest::Response> {
        Ok(self.client.get(self.url(path)).send().await?)
    }
}

fn write(path: &Path, contents: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(())
}

fn expect_catalog(server: &Server) {
    server.expect(
        Expectation::matching(request::method_path(
            "GET",
            "/repos/photonstorm/phaser/branches",
        ))
        .respond_with(json_encoded(json!([
            { "name": "master", "commit": { "sha": "abc123" } },
            { "name": "dev", "commit": { "sha": "def456" } }
        ]))),
    );
    server.expect(
        Expectation::matching(request::method_path(
            "GET",
            "/repos/photonstorm/phaser/git/refs/tags",
        ))
        .respond_with(json_encoded(json!([
            { "ref": "refs/tags/v2.4.0", "object": { "sha": "t240" } },
            { "ref": "refs/tags/v2.10.1", "object": { "sha": "t2101" } },
            { "ref": "refs/tags/v2.0.0", "object": { "sha": "t200" } }
        ]))),
    );
}

async fn start(server: &Server) -> anyhow::Result<Harness> {
    let temp = tempfile::tempdir()?;
    let root = temp.path();
    write(&root.join("local_builds/phaser.js"), "// local build")?;
    write(&root.join("site/index.html"), "<h1>index</h1>")?;
    write(&root.join("site/view_full.html"), "<h1>viewer</h1>")?;
    write(&root.join("site/js/viewer.js"), "// viewer")?;
    write(&root.join("corpus/examples/games/breakout.js"), "var breakout;")?;
    write(&root.join("corpus/examples/games/tanks.js"), "var tanks;")?;
    write(&root.join("corpus/examples/assets/sky.png"), "png")?;
    write(&root.join("corpus/examples/_site/skip.js"), "")?;
    write(
        &root.join("conf/phaser_builds.json"),
        &json!({
            "builds": [
                { "name": "v2.0.0", "obsolete": true },
                { "name": "v2.4.0", "license": "commercial" }
            ]
        })
        .to_string(),
    )?;
    let cache = root.join("cache");

    let config = PlaygroundConfig {
        host: "127.0.0.1".into(),
        port: 0,
        example_path: root.join("corpus"),
        playground_root: root.join("site"),
        cache_dir: cache.clone(),
        local_builds: root.join("local_builds"),
        builds_config: root.join("conf/phaser_builds.json"),
        remote: RemoteSource {
            api_base: server.url_str(""),
            repo: "photonstorm/phaser".into(),
            cdn_base: server.url_str("/cdn"),
            lib: "phaser".into(),
        },
        catalog_timeout: Duration::from_secs(5),
        download_timeout: Duration::from_secs(5),
    };

    let playground = Playground::from_config(config)?;
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move { axum::serve(listener, router(playground)).await });

    Ok(Harness {
        _temp: temp,
        cache,
        addr,
        client: reqwest::Client::new(),
    })
}

#[tokio::test]
async fn versions_are_reconciled_and_ordered() -> anyhow::Result<()> {
    let server = Server::run();
    expect_catalog(&server);
    let harness = start(&server).await?;

    let response = harness.get("/phaser/versions").await?;
    assert_eq!(response.status(), 200);
    let text = response.text().await?;
    assert!(text.contains("\n  \"versions\""), "pretty printed: {text}");

    let body: Value = serde_json::from_str(&text)?;
    let versions = body["versions"].as_array().expect("versions array");
    let names: Vec<&str> = versions.iter().filter_map(|v| v["name"].as_str()).collect();
    assert_eq!(names, vec!["local", "master", "dev", "v2.10.1", "v2.4.0"]);
    assert_eq!(versions[0]["type"], "local");
    assert_eq!(versions[4]["license"], "commercial");
    Ok(())
}

#[tokio::test]
async fn unknown_version_is_reported_without_caching() -> anyhow::Result<()> {
    let server = Server::run();
    expect_catalog(&server);
    let harness = start(&server).await?;

    let response = harness.get("/phaser/doesnotexist/phaser.js").await?;
    assert_eq!(response.status(), 404);
    assert!(response.text().await?.contains("doesnotexist"));

    assert!(!harness.cache.join("builds").exists());
    assert!(harness.cache.join("catalog/git_api_cache").is_file());
    Ok(())
}

#[tokio::test]
async fn remote_build_is_downloaded_once_and_tagged_with_origin() -> anyhow::Result<()> {
    let server = Server::run();
    expect_catalog(&server);
    server.expect(
        Expectation::matching(request::method_path(
            "GET",
            "/cdn/photonstorm/phaser/abc123/build/phaser.js",
        ))
        .times(1)
        .respond_with(status_code(200).body("window.Phaser = 'master';")),
    );
    let harness = start(&server).await?;
    let origin = server.url_str("/cdn/photonstorm/phaser/abc123/build/phaser.js");

    let first = harness.get("/phaser/master/phaser.js").await?;
    assert_eq!(first.status(), 200);
    assert_eq!(
        first.headers().get(ORIGIN_HEADER).and_then(|v| v.to_str().ok()),
        Some(origin.as_str())
    );
    assert_eq!(first.text().await?, "window.Phaser = 'master';");
    assert!(harness.cache.join("builds/master/phaser-abc123.js").is_file());

    let legacy = harness.get("/phaser/phaser-master.js").await?;
    assert_eq!(legacy.status(), 200);
    assert_eq!(legacy.text().await?, "window.Phaser = 'master';");
    Ok(())
}

#[tokio::test]
async fn failed_download_is_a_gateway_error() -> anyhow::Result<()> {
    let server = Server::run();
    expect_catalog(&server);
    server.expect(
        Expectation::matching(request::method_path(
            "GET",
            "/cdn/photonstorm/phaser/def456/build/phaser.js",
        ))
        .respond_with(status_code(503)),
    );
    let harness = start(&server).await?;

    let response = harness.get("/phaser/dev/phaser.js").await?;
    assert_eq!(response.status(), 502);
    assert!(!harness.cache.join("builds/dev/phaser-def456.js").exists());
    Ok(())
}

#[tokio::test]
async fn local_build_is_served_from_disk() -> anyhow::Result<()> {
    let server = Server::run();
    let harness = start(&server).await?;

    let response = harness.get("/phaser/local/phaser.js").await?;
    assert_eq!(response.status(), 200);
    assert!(response.headers().get(ORIGIN_HEADER).is_none());
    assert_eq!(response.text().await?, "// local build");

    let missing = harness.get("/phaser/local.nightly/phaser.js").await?;
    assert_eq!(missing.status(), 404);
    Ok(())
}

#[tokio::test]
async fn example_index_lists_groups() -> anyhow::Result<()> {
    let server = Server::run();
    let harness = start(&server).await?;

    let response = harness.get("/examples/examples.json").await?;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(
        body,
        json!({
            "games": [
                { "file": "breakout.js", "title": "breakout" },
                { "file": "tanks.js", "title": "tanks" }
            ]
        })
    );
    Ok(())
}

#[tokio::test]
async fn pages_and_static_mounts() -> anyhow::Result<()> {
    let server = Server::run();
    let harness = start(&server).await?;

    let index = harness.get("/").await?;
    assert_eq!(index.url().path(), "/examples");
    assert_eq!(index.text().await?, "<h1>index</h1>");

    assert_eq!(harness.get("/examples/view").await?.text().await?, "<h1>viewer</h1>");

    let source = harness.get("/examples/src/games/breakout.js").await?;
    assert_eq!(
        source.headers().get("content-type").and_then(|v| v.to_str().ok()),
        Some("application/javascript; charset=utf-8")
    );
    assert_eq!(source.text().await?, "var breakout;");

    let asset = harness.get("/assets/sky.png").await?;
    assert_eq!(
        asset.headers().get("content-type").and_then(|v| v.to_str().ok()),
        Some("image/png")
    );
    assert_eq!(harness.get("/js/viewer.js").await?.status(), 200);
    assert_eq!(harness.get("/js/missing.js").await?.status(), 404);
    assert_eq!(harness.get("/js/a%2F..%2F..%2Fsecret").await?.status(), 400);
    Ok(())
}

#[tokio::test]
async fn viewer_links_and_sources_reach_the_router() -> anyhow::Result<()> {
    let server = Server::run();
    let harness = start(&server).await?;
    let index = Url::parse(&harness.url("/examples"))?;

    for link in [
        example_url("games", "breakout", None),
        legacy_example_url("games", "breakout.js", None, None),
    ] {
        let page = index.join(&link)?;
        let response = harness.client.get(page.clone()).send().await?;
        assert_eq!(response.status(), 200, "{page}");
        assert_eq!(response.text().await?, "<h1>viewer</h1>");

        let identity = ExampleIdentity::from_url(page.as_str(), DEFAULT_VERSION_TAG)?;
        let source = page.join(&identity.source_path())?;
        let response = harness.client.get(source.clone()).send().await?;
        assert_eq!(response.status(), 200, "{source}");
        assert_eq!(response.text().await?, "var breakout;");
    }
    Ok(())
}
