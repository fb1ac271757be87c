//! HTTP API integration tests — exercise the server endpoints against a
//! runtime built around a mock engine, stepping sessions by hand so every
//! assertion is deterministic.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use hive_channels::RequestChannel;
use hive_config::schema::ServerConfig;
use hive_core::{ActionMessage, BotConfig};
use hive_engine::{MockEngine, MockEngineFactory};
use hive_runtime::{ResetFlags, RuntimeHandle, SessionRegistry, build_session};
use hive_server::build_router;
use hive_store::HiveStore;
use hive_tools::ToolRegistry;

struct TestCtx {
    app: Router,
    registry: SessionRegistry,
    store: Arc<HiveStore>,
    reset_flags: ResetFlags,
}

impl TestCtx {
    /// Run one scheduler-tick's worth of work for the test bot.
    async fn step(&self) {
        self.registry.get("eve").await.unwrap().step().await.ok();
    }
}

/// Build a test router around a runtime with one bot driving `engine`.
async fn setup(engine: MockEngine, api_key: Option<&str>) -> TestCtx {
    let store = Arc::new(HiveStore::open_in_memory().unwrap());
    let channel = Arc::new(RequestChannel::new(Arc::new(ToolRegistry::new())));
    let factory = MockEngineFactory::new();
    factory.insert("eve", Arc::new(engine));

    let bot = BotConfig::minimal("eve", "Eve");
    store.upsert_bot(&bot).unwrap();
    let registry = SessionRegistry::new();
    registry
        .insert(Arc::new(build_session(&bot, &factory, &channel, None)))
        .await;

    let reset_flags = ResetFlags::new();
    let handle = RuntimeHandle::new(
        registry.clone(),
        channel,
        Arc::clone(&store),
        reset_flags.clone(),
        Arc::new(AtomicU64::new(0)),
        "mock",
    );

    let config = ServerConfig {
        listen: "127.0.0.1:0".into(),
        api_key: api_key.map(String::from),
        cors: false,
    };
    TestCtx {
        app: build_router(config, handle),
        registry,
        store,
        reset_flags,
    }
}

/// Helper to read the full body bytes from a response.
async fn body_string(resp: axum::response::Response) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn post_json(app: &Router, path: &str, body: Value) -> axum::response::Response {
    let req = Request::post(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.clone().oneshot(req).await.unwrap()
}

async fn get_path(app: &Router, path: &str) -> axum::response::Response {
    let req = Request::get(path).body(Body::empty()).unwrap();
    app.clone().oneshot(req).await.unwrap()
}

async fn json_body(resp: axum::response::Response) -> Value {
    serde_json::from_str(&body_string(resp).await).unwrap()
}

// ── Healthcheck ────────────────────────────────────────────────

#[tokio::test]
async fn test_healthcheck_plain_text() {
    let ctx = setup(MockEngine::new("eve"), None).await;
    let resp = get_path(&ctx.app, "/healthcheck").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "I'm ready!");
}

// ── Submit & lookup ────────────────────────────────────────────

#[tokio::test]
async fn test_submit_returns_request_handle() {
    let ctx = setup(MockEngine::new("eve"), None).await;
    let resp = post_json(
        &ctx.app,
        "/submit",
        json!({"bot_id": "eve", "text": "hello", "thread_id": "t1"}),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    assert_eq!(body["bot_id"], "eve");
    assert_eq!(body["thread_id"], "t1");
    assert!(body["request_id"].is_string());
}

#[tokio::test]
async fn test_submit_unknown_bot_is_404() {
    let ctx = setup(MockEngine::new("eve"), None).await;
    let resp = post_json(
        &ctx.app,
        "/submit",
        json!({"bot_id": "nobody", "text": "hello"}),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_submit_missing_text_is_unprocessable() {
    let ctx = setup(MockEngine::new("eve"), None).await;
    let resp = post_json(&ctx.app, "/submit", json!({"bot_id": "eve"})).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_lookup_round_trip() {
    let ctx = setup(MockEngine::new("eve").with_response("Hi there!"), None).await;
    let submitted = json_body(
        post_json(
            &ctx.app,
            "/submit",
            json!({"bot_id": "eve", "text": "hello", "thread_id": "t1"}),
        )
        .await,
    )
    .await;
    let request_id = submitted["request_id"].as_str().unwrap().to_string();

    // Nothing delivered yet.
    let early = json_body(
        post_json(
            &ctx.app,
            "/lookup",
            json!({"bot_id": "eve", "request_id": request_id}),
        )
        .await,
    )
    .await;
    assert_eq!(early["text"], "not found");

    ctx.step().await;

    let done = json_body(
        post_json(
            &ctx.app,
            "/lookup",
            json!({"bot_id": "eve", "request_id": request_id}),
        )
        .await,
    )
    .await;
    assert_eq!(done["text"], "Hi there!");
}

#[tokio::test]
async fn test_lookup_unknown_request_is_not_found_body() {
    let ctx = setup(MockEngine::new("eve"), None).await;
    let resp = post_json(
        &ctx.app,
        "/lookup",
        json!({"bot_id": "eve", "request_id": uuid::Uuid::new_v4()}),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["text"], "not found");
}

// ── Client tools ───────────────────────────────────────────────

#[tokio::test]
async fn test_register_and_unregister_client_tool() {
    let ctx = setup(MockEngine::new("eve"), None).await;

    let resp = post_json(
        &ctx.app,
        "/register_client_tool",
        json!({
            "bot_id": "eve",
            "tool_descriptor": {"name": "get_time", "description": "Current time"},
            "timeout_seconds": 5
        }),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["success"], true);
    assert_eq!(ctx.store.list_client_tools().unwrap().len(), 1);

    let resp = post_json(
        &ctx.app,
        "/unregister_client_tool",
        json!({"bot_id": "eve", "tool_name": "get_time"}),
    )
    .await;
    assert_eq!(json_body(resp).await["success"], true);
    assert!(ctx.store.list_client_tools().unwrap().is_empty());

    // Unregistering again reports nothing removed.
    let resp = post_json(
        &ctx.app,
        "/unregister_client_tool",
        json!({"bot_id": "eve", "tool_name": "get_time"}),
    )
    .await;
    assert_eq!(json_body(resp).await["success"], false);
}

#[tokio::test]
async fn test_remote_tool_action_round_trip_over_http() {
    let engine = MockEngine::new("eve")
        .with_action("inv-1", "get_time", json!({}))
        .with_response("The time is 12:00.");
    let ctx = setup(engine, None).await;

    post_json(
        &ctx.app,
        "/register_client_tool",
        json!({
            "bot_id": "eve",
            "tool_descriptor": {"name": "get_time", "description": "Current time"},
            "timeout_seconds": 5
        }),
    )
    .await;

    let submitted = json_body(
        post_json(
            &ctx.app,
            "/submit",
            json!({"bot_id": "eve", "text": "what time is it?", "thread_id": "t1"}),
        )
        .await,
    )
    .await;
    let request_id = submitted["request_id"].as_str().unwrap().to_string();
    ctx.step().await;

    // The first lookup hands the action payload to the caller.
    let action = json_body(
        post_json(
            &ctx.app,
            "/lookup",
            json!({"bot_id": "eve", "request_id": request_id}),
        )
        .await,
    )
    .await;
    let wire = action["text"].as_str().unwrap();
    let parsed = ActionMessage::parse(wire).unwrap().unwrap();
    assert!(matches!(parsed, ActionMessage::ActionRequired { .. }));

    // Claimed exactly once.
    let again = json_body(
        post_json(
            &ctx.app,
            "/lookup",
            json!({"bot_id": "eve", "request_id": request_id}),
        )
        .await,
    )
    .await;
    assert_eq!(again["text"], "not found");

    // The caller runs the tool and answers on the same thread.
    let result_wire = ActionMessage::result("inv-1", json!("12:00"))
        .to_wire()
        .unwrap();
    post_json(
        &ctx.app,
        "/submit",
        json!({"bot_id": "eve", "text": result_wire, "thread_id": "t1"}),
    )
    .await;
    ctx.step().await;

    let done = json_body(
        post_json(
            &ctx.app,
            "/lookup",
            json!({"bot_id": "eve", "request_id": request_id}),
        )
        .await,
    )
    .await;
    assert_eq!(done["text"], "The time is 12:00.");
}

// ── Deploy & introspection ─────────────────────────────────────

#[tokio::test]
async fn test_deploy_bot_persists_and_flags_reset() {
    let ctx = setup(MockEngine::new("eve"), None).await;
    let resp = post_json(
        &ctx.app,
        "/deploy_bot",
        json!({"bot_id": "zoe", "bot_name": "Zoe", "instructions": "be helpful"}),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["success"], true);

    assert!(ctx.store.get_bot("zoe").unwrap().is_some());
    assert!(ctx.reset_flags.is_requested("zoe"));
}

#[tokio::test]
async fn test_deploy_bot_empty_id_is_bad_request() {
    let ctx = setup(MockEngine::new("eve"), None).await;
    let resp = post_json(
        &ctx.app,
        "/deploy_bot",
        json!({"bot_id": "", "bot_name": "Nameless", "instructions": ""}),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_status_and_bots_endpoints() {
    let ctx = setup(MockEngine::new("eve"), None).await;

    let status = json_body(get_path(&ctx.app, "/status").await).await;
    assert_eq!(status["engine"], "mock");
    assert_eq!(status["sessions"], 1);

    let bots = json_body(get_path(&ctx.app, "/bots").await).await;
    assert_eq!(bots.as_array().unwrap().len(), 1);
    assert_eq!(bots[0]["bot_id"], "eve");
    assert_eq!(bots[0]["udf_active"], true);
}

// ── Auth ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_api_key_required_when_configured() {
    let ctx = setup(MockEngine::new("eve"), Some("sekrit")).await;

    let resp = post_json(
        &ctx.app,
        "/submit",
        json!({"bot_id": "eve", "text": "hello"}),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = Request::post("/submit")
        .header("content-type", "application/json")
        .header("authorization", "Bearer sekrit")
        .body(Body::from(
            json!({"bot_id": "eve", "text": "hello"}).to_string(),
        ))
        .unwrap();
    let resp = ctx.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // Healthcheck stays open.
    let resp = get_path(&ctx.app, "/healthcheck").await;
    assert_eq!(resp.status(), StatusCode::OK);
}
