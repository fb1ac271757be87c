//! # hive-server
//!
//! HTTP API surface for the Hive runtime. Provides:
//!
//! - submit/lookup polling endpoints over the request channel
//! - client tool registration for detached tool-hosting processes
//! - bot deployment and runtime status introspection

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, Request as HttpRequest, StatusCode},
    middleware::{self, Next},
    response::{Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use uuid::Uuid;

use hive_config::schema::ServerConfig;
use hive_core::{BotConfig, HiveError, NOT_FOUND, READY, Request, ToolDescriptor};
use hive_runtime::RuntimeHandle;

/// Shared server state.
pub struct AppState {
    pub config: ServerConfig,
    pub handle: RuntimeHandle,
}

#[derive(Deserialize)]
struct SubmitRequest {
    bot_id: String,
    text: String,
    #[serde(default)]
    thread_id: Option<String>,
}

#[derive(Deserialize)]
struct LookupRequest {
    bot_id: String,
    request_id: Uuid,
}

/// Raw response body: the cumulative wire text (trailing marker while
/// streaming) or the literal `not found`.
#[derive(Serialize)]
struct LookupResponse {
    text: String,
}

#[derive(Deserialize)]
struct RegisterToolRequest {
    /// Scope of the registration; empty applies to every bot.
    #[serde(default)]
    bot_id: String,
    tool_descriptor: ToolDescriptor,
    #[serde(default = "default_tool_timeout")]
    timeout_seconds: u64,
}

fn default_tool_timeout() -> u64 {
    30
}

#[derive(Deserialize)]
struct UnregisterToolRequest {
    #[serde(default)]
    bot_id: String,
    tool_name: String,
}

#[derive(Serialize)]
struct SuccessResponse {
    success: bool,
}

/// Build the Axum router.
pub fn build_router(config: ServerConfig, handle: RuntimeHandle) -> Router {
    let cors = config.cors;
    let state = Arc::new(AppState { config, handle });

    let api_routes = Router::new()
        .route("/submit", post(submit_handler))
        .route("/lookup", post(lookup_handler))
        .route("/register_client_tool", post(register_tool_handler))
        .route("/unregister_client_tool", post(unregister_tool_handler))
        .route("/deploy_bot", post(deploy_bot_handler))
        .route("/status", get(status_handler))
        .route("/bots", get(bots_handler));

    // Apply API key auth if configured
    let api_routes = if state.config.api_key.is_some() {
        api_routes.layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
    } else {
        api_routes
    };

    let mut router = Router::new()
        .route("/healthcheck", get(healthcheck_handler))
        .merge(api_routes)
        .with_state(state);

    if cors {
        router = router.layer(CorsLayer::permissive());
    }

    router
}

/// Middleware that checks the Authorization header against the configured API key.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: HttpRequest<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    if let Some(ref expected_key) = state.config.api_key {
        let provided = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        match provided {
            Some(key) if key == expected_key => {}
            _ => {
                warn!("unauthorized API request — invalid or missing API key");
                return Err(StatusCode::UNAUTHORIZED);
            }
        }
    }
    Ok(next.run(request).await)
}

fn error_status(e: &HiveError) -> StatusCode {
    match e {
        HiveError::UnknownBot(_) => StatusCode::NOT_FOUND,
        HiveError::Protocol(_) | HiveError::Serialization(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn healthcheck_handler() -> &'static str {
    READY
}

async fn submit_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<Request>, StatusCode> {
    match state
        .handle
        .submit(&req.bot_id, req.thread_id.as_deref(), &req.text)
    {
        Ok(request) => Ok(Json(request)),
        Err(e) => {
            warn!(bot_id = %req.bot_id, error = %e, "submit failed");
            Err(error_status(&e))
        }
    }
}

async fn lookup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LookupRequest>,
) -> Result<Json<LookupResponse>, StatusCode> {
    match state.handle.lookup(&req.bot_id, req.request_id).await {
        Ok(body) => Ok(Json(LookupResponse {
            text: body.unwrap_or_else(|| NOT_FOUND.to_string()),
        })),
        Err(e) => {
            warn!(bot_id = %req.bot_id, request_id = %req.request_id, error = %e, "lookup failed");
            Err(error_status(&e))
        }
    }
}

async fn register_tool_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterToolRequest>,
) -> Result<Json<SuccessResponse>, StatusCode> {
    let name = req.tool_descriptor.name.clone();
    match state.handle.register_client_tool(
        &req.bot_id,
        req.tool_descriptor,
        std::time::Duration::from_secs(req.timeout_seconds),
    ) {
        Ok(()) => {
            info!(bot_id = %req.bot_id, tool = %name, "client tool registered");
            Ok(Json(SuccessResponse { success: true }))
        }
        Err(e) => {
            warn!(bot_id = %req.bot_id, tool = %name, error = %e, "tool registration failed");
            Err(error_status(&e))
        }
    }
}

async fn unregister_tool_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UnregisterToolRequest>,
) -> Result<Json<SuccessResponse>, StatusCode> {
    match state
        .handle
        .unregister_client_tool(&req.bot_id, &req.tool_name)
    {
        Ok(removed) => Ok(Json(SuccessResponse { success: removed })),
        Err(e) => {
            warn!(bot_id = %req.bot_id, tool = %req.tool_name, error = %e, "tool unregistration failed");
            Err(error_status(&e))
        }
    }
}

async fn deploy_bot_handler(
    State(state): State<Arc<AppState>>,
    Json(config): Json<BotConfig>,
) -> Result<Json<SuccessResponse>, StatusCode> {
    if config.bot_id.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    match state.handle.deploy_bot(&config) {
        Ok(()) => Ok(Json(SuccessResponse { success: true })),
        Err(e) => {
            warn!(bot_id = %config.bot_id, error = %e, "deploy failed");
            Err(error_status(&e))
        }
    }
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let status = state.handle.status().await;
    Json(serde_json::to_value(status).unwrap_or_default())
}

async fn bots_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let bots = state.handle.bots().await;
    Json(serde_json::to_value(bots).unwrap_or_default())
}

/// Start the HTTP server.
pub async fn start_server(config: ServerConfig, handle: RuntimeHandle) -> hive_core::Result<()> {
    let listen = config.listen.clone();
    let router = build_router(config, handle);

    info!(listen = %listen, "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .map_err(|e| HiveError::Server(format!("failed to bind {listen}: {e}")))?;

    axum::serve(listener, router)
        .await
        .map_err(|e| HiveError::Server(format!("server error: {e}")))?;

    Ok(())
}
