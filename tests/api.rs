use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use axum::response::Response;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use magpie::application::auth::AdminAuth;
use magpie::application::bookmarks::BookmarkService;
use magpie::application::store::BookmarkStore;
use magpie::infra::http::{ApiRateLimiter, ApiState, build_api_router};
use magpie::infra::store::file::JsonFileBookmarkStore;
use magpie::infra::store::redb::RedbBookmarkStore;

const ADMIN_TOKEN: &str = "magpie-integration-token";

fn api_state(store: Arc<dyn BookmarkStore>) -> ApiState {
    ApiState {
        bookmarks: Arc::new(BookmarkService::new(store)),
        auth: Arc::new(AdminAuth::new(Some(ADMIN_TOKEN))),
        rate_limiter: Arc::new(ApiRateLimiter::new(Duration::from_secs(60), 100_000)),
    }
}

fn redb_app(dir: &TempDir) -> Router {
    let store =
        RedbBookmarkStore::open(&dir.path().join("bookmarks.redb")).expect("open redb store");
    build_api_router(api_state(Arc::new(store)))
}

fn json_app(dir: &TempDir) -> Router {
    let store =
        JsonFileBookmarkStore::open(&dir.path().join("tweets.json")).expect("open json store");
    build_api_router(api_state(Arc::new(store)))
}

fn both_apps(dir: &TempDir) -> Vec<(&'static str, Router)> {
    vec![("redb", redb_app(dir)), ("json-file", json_app(dir))]
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .expect("request should build"),
        None => builder.body(Body::empty()).expect("request should build"),
    }
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone()
        .oneshot(request)
        .await
        .expect("router should respond")
}

async fn read_json(response: Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

async fn read_text(response: Response) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

fn save_body(url: &str, tags: &[&str], notes: &str, is_public: bool) -> Value {
    json!({
        "url": url,
        "tags": tags,
        "notes": notes,
        "isPublic": is_public,
    })
}

async fn save(app: &Router, url: &str, tags: &[&str], notes: &str, is_public: bool) -> Value {
    let response = send(
        app,
        request(
            Method::POST,
            "/api/bookmarks",
            Some(ADMIN_TOKEN),
            Some(save_body(url, tags, notes, is_public)),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    read_json(response).await
}

async fn list(app: &Router, uri: &str, token: Option<&str>) -> Value {
    let response = send(app, request(Method::GET, uri, token, None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    read_json(response).await
}

#[tokio::test]
async fn save_derives_id_and_round_trips() {
    let dir = TempDir::new().expect("tempdir");
    for (backend, app) in both_apps(&dir) {
        let saved = save(
            &app,
            "https://twitter.com/alice/status/42",
            &["rust"],
            "great thread",
            true,
        )
        .await;
        assert_eq!(saved["id"], "alice-42", "backend {backend}");
        assert_eq!(saved["tweetId"], "42");
        assert_eq!(saved["authorUsername"], "alice");
        assert_eq!(saved["isPublic"], true);
        assert_eq!(saved["tags"], json!(["rust"]));

        let listed = list(&app, "/api/bookmarks", Some(ADMIN_TOKEN)).await;
        assert_eq!(listed["total"], 1, "backend {backend}");
        assert_eq!(listed["page"], 1);
        assert_eq!(listed["limit"], 20);
        assert_eq!(listed["tweets"][0]["id"], "alice-42");
        assert_eq!(listed["tweets"][0]["notes"], "great thread");
    }
}

#[tokio::test]
async fn resaving_the_same_tweet_replaces_the_record() {
    let dir = TempDir::new().expect("tempdir");
    for (backend, app) in both_apps(&dir) {
        save(
            &app,
            "https://x.com/alice/status/42",
            &["rust"],
            "first",
            false,
        )
        .await;
        let second = save(
            &app,
            "https://twitter.com/alice/status/42",
            &["zig"],
            "second",
            true,
        )
        .await;
        assert_eq!(second["id"], "alice-42");

        let listed = list(&app, "/api/bookmarks", Some(ADMIN_TOKEN)).await;
        assert_eq!(listed["total"], 1, "backend {backend}");
        assert_eq!(listed["tweets"][0]["notes"], "second");
        assert_eq!(listed["tweets"][0]["tags"], json!(["zig"]));
        assert_eq!(listed["tweets"][0]["isPublic"], true);
    }
}

#[tokio::test]
async fn writes_require_the_admin_token() {
    let dir = TempDir::new().expect("tempdir");
    let app = redb_app(&dir);
    let body = save_body("https://x.com/alice/status/1", &[], "", true);

    let response = send(
        &app,
        request(Method::POST, "/api/bookmarks", None, Some(body.clone())),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let error = read_json(response).await;
    assert_eq!(error["error"]["code"], "unauthorized");

    let response = send(
        &app,
        request(
            Method::POST,
            "/api/bookmarks",
            Some("wrong-token-wrong-token"),
            Some(body),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(
        &app,
        request(
            Method::PATCH,
            "/api/bookmarks/alice-1",
            None,
            Some(json!({"notes": "edited"})),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(&app, request(Method::DELETE, "/api/bookmarks/alice-1", None, None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invalid_input_is_rejected_before_anything_is_stored() {
    let dir = TempDir::new().expect("tempdir");
    let app = redb_app(&dir);

    let oversized_tag = "x".repeat(51);
    let oversized_notes = "n".repeat(5001);
    let cases = [
        save_body("https://example.com/alice/status/42", &[], "", true),
        save_body("not a url", &[], "", true),
        save_body(
            "https://x.com/alice/status/42",
            &[
                "t1", "t2", "t3", "t4", "t5", "t6", "t7", "t8", "t9", "t10", "t11",
            ],
            "",
            true,
        ),
        save_body(
            "https://x.com/alice/status/42",
            &[oversized_tag.as_str()],
            "",
            true,
        ),
        save_body("https://x.com/alice/status/42", &[], &oversized_notes, true),
    ];

    for body in cases {
        let response = send(
            &app,
            request(Method::POST, "/api/bookmarks", Some(ADMIN_TOKEN), Some(body)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error = read_json(response).await;
        assert_eq!(error["error"]["code"], "invalid_input");
    }

    let listed = list(&app, "/api/bookmarks", Some(ADMIN_TOKEN)).await;
    assert_eq!(listed["total"], 0);
}

#[tokio::test]
async fn unknown_body_fields_are_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let app = redb_app(&dir);

    let response = send(
        &app,
        request(
            Method::POST,
            "/api/bookmarks",
            Some(ADMIN_TOKEN),
            Some(json!({"url": "https://x.com/alice/status/42", "tagz": ["oops"]})),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    save(&app, "https://x.com/alice/status/42", &[], "", true).await;
    let response = send(
        &app,
        request(
            Method::PATCH,
            "/api/bookmarks/alice-42",
            Some(ADMIN_TOKEN),
            Some(json!({"color": "red"})),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn anonymous_listing_is_pinned_to_the_public_subset() {
    let dir = TempDir::new().expect("tempdir");
    for (backend, app) in both_apps(&dir) {
        save(&app, "https://x.com/alice/status/1", &[], "", true).await;
        save(&app, "https://x.com/alice/status/2", &[], "", true).await;
        save(&app, "https://x.com/alice/status/3", &[], "secret", false).await;

        let anonymous = list(&app, "/api/bookmarks", None).await;
        assert_eq!(anonymous["total"], 2, "backend {backend}");
        for tweet in anonymous["tweets"].as_array().expect("tweets array") {
            assert_eq!(tweet["isPublic"], true);
        }

        let explicit = list(&app, "/api/bookmarks?public=true", None).await;
        assert_eq!(explicit["total"], 2);

        let response = send(
            &app,
            request(Method::GET, "/api/bookmarks?public=false", None, None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "backend {backend}");
        let error = read_json(response).await;
        assert_eq!(error["error"]["code"], "forbidden");

        let admin = list(&app, "/api/bookmarks?public=false", Some(ADMIN_TOKEN)).await;
        assert_eq!(admin["total"], 1);
        assert_eq!(admin["tweets"][0]["notes"], "secret");
    }
}

#[tokio::test]
async fn listing_filters_compose() {
    let dir = TempDir::new().expect("tempdir");
    let app = redb_app(&dir);

    save(
        &app,
        "https://x.com/alice/status/1",
        &["rust"],
        "tokio tips",
        true,
    )
    .await;
    save(
        &app,
        "https://x.com/alice/status/2",
        &["rust"],
        "borrow checker",
        true,
    )
    .await;
    save(
        &app,
        "https://x.com/bob/status/3",
        &["zig"],
        "tokio envy",
        true,
    )
    .await;

    let filtered = list(&app, "/api/bookmarks?tag=rust&q=tokio", Some(ADMIN_TOKEN)).await;
    assert_eq!(filtered["total"], 1);
    assert_eq!(filtered["tweets"][0]["id"], "alice-1");

    let tagged = list(&app, "/api/bookmarks?tag=rust", Some(ADMIN_TOKEN)).await;
    assert_eq!(tagged["total"], 2);

    let searched = list(&app, "/api/bookmarks?q=TOKIO", Some(ADMIN_TOKEN)).await;
    assert_eq!(searched["total"], 2);
}

#[tokio::test]
async fn pagination_splits_and_hard_fails() {
    let dir = TempDir::new().expect("tempdir");
    let app = redb_app(&dir);

    for i in 1..=25 {
        save(
            &app,
            &format!("https://x.com/alice/status/{i}"),
            &[],
            "",
            true,
        )
        .await;
    }

    let first = list(&app, "/api/bookmarks", Some(ADMIN_TOKEN)).await;
    assert_eq!(first["total"], 25);
    assert_eq!(first["tweets"].as_array().expect("tweets").len(), 20);

    let second = list(&app, "/api/bookmarks?page=2&limit=20", Some(ADMIN_TOKEN)).await;
    assert_eq!(second["total"], 25);
    assert_eq!(second["tweets"].as_array().expect("tweets").len(), 5);

    let third = list(&app, "/api/bookmarks?page=3&limit=20", Some(ADMIN_TOKEN)).await;
    assert_eq!(third["tweets"].as_array().expect("tweets").len(), 0);

    for uri in [
        "/api/bookmarks?page=0",
        "/api/bookmarks?limit=0",
        "/api/bookmarks?limit=101",
    ] {
        let response = send(&app, request(Method::GET, uri, Some(ADMIN_TOKEN), None)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "uri {uri}");
        let error = read_json(response).await;
        assert_eq!(error["error"]["code"], "bad_request");
    }
}

#[tokio::test]
async fn patch_updates_only_the_named_fields() {
    let dir = TempDir::new().expect("tempdir");
    for (backend, app) in both_apps(&dir) {
        save(
            &app,
            "https://x.com/alice/status/42",
            &["rust"],
            "keep me",
            false,
        )
        .await;

        let response = send(
            &app,
            request(
                Method::PATCH,
                "/api/bookmarks/alice-42",
                Some(ADMIN_TOKEN),
                Some(json!({"isPublic": true})),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK, "backend {backend}");
        let patched = read_json(response).await;
        assert_eq!(patched["isPublic"], true);
        assert_eq!(patched["notes"], "keep me");
        assert_eq!(patched["tags"], json!(["rust"]));

        let response = send(
            &app,
            request(
                Method::PATCH,
                "/api/bookmarks/alice-42",
                Some(ADMIN_TOKEN),
                Some(json!({})),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let unchanged = read_json(response).await;
        assert_eq!(unchanged["notes"], "keep me");
        assert_eq!(unchanged["isPublic"], true);

        let response = send(
            &app,
            request(
                Method::PATCH,
                "/api/bookmarks/nobody-7",
                Some(ADMIN_TOKEN),
                Some(json!({"notes": "ghost"})),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let error = read_json(response).await;
        assert_eq!(error["error"]["code"], "not_found");
    }
}

#[tokio::test]
async fn delete_removes_the_record_from_every_listing() {
    let dir = TempDir::new().expect("tempdir");
    for (backend, app) in both_apps(&dir) {
        save(
            &app,
            "https://x.com/alice/status/1",
            &["keepsake"],
            "",
            true,
        )
        .await;
        save(&app, "https://x.com/bob/status/2", &["keepsake"], "", true).await;

        let response = send(
            &app,
            request(Method::DELETE, "/api/bookmarks/alice-1", Some(ADMIN_TOKEN), None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT, "backend {backend}");

        let listed = list(&app, "/api/bookmarks?tag=keepsake", Some(ADMIN_TOKEN)).await;
        assert_eq!(listed["total"], 1);
        assert_eq!(listed["tweets"][0]["id"], "bob-2");

        let response = send(
            &app,
            request(Method::DELETE, "/api/bookmarks/alice-1", Some(ADMIN_TOKEN), None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn tag_vocabulary_is_admin_only_and_sorted() {
    let dir = TempDir::new().expect("tempdir");
    let app = redb_app(&dir);

    save(
        &app,
        "https://x.com/alice/status/1",
        &["Zig", "async"],
        "",
        true,
    )
    .await;
    save(&app, "https://x.com/bob/status/2", &["rust"], "", false).await;

    let response = send(&app, request(Method::GET, "/api/bookmarks/tags", None, None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(
        &app,
        request(Method::GET, "/api/bookmarks/tags", Some(ADMIN_TOKEN), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let tags = read_json(response).await;
    assert_eq!(tags["tags"], json!(["async", "rust", "Zig"]));
}

#[tokio::test]
async fn export_renders_json_and_markdown() {
    let dir = TempDir::new().expect("tempdir");
    let app = redb_app(&dir);

    save(
        &app,
        "https://x.com/alice/status/1",
        &["rust"],
        "note one",
        true,
    )
    .await;
    save(&app, "https://x.com/bob/status/2", &[], "", false).await;

    let response = send(&app, request(Method::GET, "/api/bookmarks/export", None, None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(
        &app,
        request(Method::GET, "/api/bookmarks/export", Some(ADMIN_TOKEN), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let document = read_json(response).await;
    assert_eq!(document["total"], 2);
    assert_eq!(document["tweets"].as_array().expect("tweets").len(), 2);
    assert!(document["exportedAt"].is_string());

    let response = send(
        &app,
        request(
            Method::GET,
            "/api/bookmarks/export?format=markdown",
            Some(ADMIN_TOKEN),
            None,
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        Some("text/markdown; charset=utf-8")
    );
    let markdown = read_text(response).await;
    assert!(markdown.starts_with("# Tweet bookmarks"));
    assert!(markdown.contains("@alice"));

    let response = send(
        &app,
        request(
            Method::GET,
            "/api/bookmarks/export?format=csv",
            Some(ADMIN_TOKEN),
            None,
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn requests_beyond_the_rate_limit_get_429() {
    let dir = TempDir::new().expect("tempdir");
    let store =
        RedbBookmarkStore::open(&dir.path().join("bookmarks.redb")).expect("open redb store");
    let state = ApiState {
        bookmarks: Arc::new(BookmarkService::new(Arc::new(store))),
        auth: Arc::new(AdminAuth::new(Some(ADMIN_TOKEN))),
        rate_limiter: Arc::new(ApiRateLimiter::new(Duration::from_secs(60), 2)),
    };
    let app = build_api_router(state);

    for _ in 0..2 {
        let response = send(&app, request(Method::GET, "/health", None, None)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = send(&app, request(Method::GET, "/health", None, None)).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok()),
        Some("60")
    );
    let error = read_json(response).await;
    assert_eq!(error["error"]["code"], "rate_limited");

    // Other routes keep their own budget.
    let response = send(&app, request(Method::GET, "/api/bookmarks", None, None)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_answers_without_a_token() {
    let dir = TempDir::new().expect("tempdir");
    let app = json_app(&dir);

    let response = send(&app, request(Method::GET, "/health", None, None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["status"], "ok");
}
