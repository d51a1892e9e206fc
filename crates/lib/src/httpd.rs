//! HTTP command endpoint.
//!
//! `GET /cmd/{name}?param=value...` maps the command's declared parameter
//! names to query values, renders through the same templating engine as the
//! poller, executes, and returns the output as text/plain. Status codes
//! reflect the failing stage: 404 unknown command, 400 missing parameter or
//! validation/execution failure, 401 missing/mismatched token. `/health` is
//! unauthenticated.

use crate::command::{self, CommandDefinition};
use crate::exec::CommandExecutor;
use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared state for the HTTP endpoint (command table, executor, auth token).
#[derive(Clone)]
pub struct HttpdState {
    pub commands: Arc<HashMap<String, CommandDefinition>>,
    pub executor: Arc<dyn CommandExecutor>,
    /// When Some, /cmd requests must carry `Authorization: Token <value>`.
    pub auth_token: Option<String>,
}

/// Build the router: unauthenticated /health plus the token-gated /cmd routes.
pub fn router(state: HttpdState) -> Router {
    let guarded = Router::new()
        .route("/cmd/:name", get(run_command))
        .route("/cmd", get(no_command))
        .route("/cmd/", get(no_command))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));
    Router::new()
        .route("/health", get(health))
        .merge(guarded)
        .with_state(state)
}

/// Run the HTTP server on `addr` until `cancel` fires.
pub async fn run_httpd(addr: &str, state: HttpdState, cancel: CancellationToken) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    log::info!("httpd listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("httpd server exited")?;
    log::info!("httpd stopped");
    Ok(())
}

/// Reject requests without the exact `Token <value>` Authorization header.
/// An empty configured token disables the check entirely.
async fn require_token(
    State(state): State<HttpdState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    if let Some(ref token) = state.auth_token {
        let authorization = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if authorization != format!("Token {}", token) {
            return (StatusCode::UNAUTHORIZED, "unauthorized\n").into_response();
        }
    }
    next.run(request).await
}

async fn health() -> &'static str {
    "ok"
}

async fn no_command() -> Response {
    (StatusCode::BAD_REQUEST, "no command specified\n").into_response()
}

/// GET /cmd/{name}: collect the command's declared parameters from the query
/// string in declared order, render, execute, reply with the output.
async fn run_command(
    Path(name): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    State(state): State<HttpdState>,
) -> Response {
    let Some(def) = state.commands.get(&name) else {
        return (
            StatusCode::NOT_FOUND,
            format!("unknown command {:?}\n", name),
        )
            .into_response();
    };

    let mut values = Vec::with_capacity(def.param_names.len());
    for param in &def.param_names {
        match query.get(param).filter(|v| !v.is_empty()) {
            Some(value) => values.push(value.clone()),
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    format!("missing required query parameter {:?}\n", param),
                )
                    .into_response();
            }
        }
    }

    let rendered = match command::render(def, &values) {
        Ok(rendered) => rendered,
        Err(e) => return (StatusCode::BAD_REQUEST, format!("{}\n", e)).into_response(),
    };

    match state.executor.execute(&rendered).await {
        Ok(output) => ([(header::CONTENT_TYPE, "text/plain")], output).into_response(),
        // Execution failure ends the response at the error body.
        Err(e) => (StatusCode::BAD_REQUEST, format!("{}\n", e)).into_response(),
    }
}
