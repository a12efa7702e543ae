//! HTTP trigger surface for the grading service.
//!
//! Routes:
//!  - `/`       redirects to the program landing page
//!  - `/ping`   replies immediately, then triggers grading of any entries
//!    without grades
//!  - `/status` verifies the connections to the spreadsheet and Discourse

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::Redirect,
    routing::get,
};

use crate::{discourse::Forum, grader::Grader, sheets::SheetStore};

/// Landing page respondents are redirected to.
const HOME_REDIRECT: &str = "https://om.rs/devstages";

/// Builds the trigger-surface router around `grader`.
pub fn router<S, F>(grader: Arc<Grader<S, F>>) -> Router
where
    S: SheetStore + 'static,
    F: Forum + 'static,
{
    Router::new()
        .route("/", get(|| async { Redirect::temporary(HOME_REDIRECT) }))
        .route("/ping", get(ping::<S, F>))
        .route("/status", get(status::<S, F>))
        .with_state(grader)
}

/// Binds `port` and serves the trigger surface until the process exits.
pub async fn serve<S, F>(grader: Arc<Grader<S, F>>, port: u16) -> Result<()>
where
    S: SheetStore + 'static,
    F: Forum + 'static,
{
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Could not bind port {port}"))?;
    tracing::info!("Server running at http://127.0.0.1:{port}/");

    axum::serve(listener, router(grader))
        .await
        .context("Server stopped unexpectedly")
}

/// Wakes the grader. The reply does not wait for the grading run.
async fn ping<S, F>(State(grader): State<Arc<Grader<S, F>>>) -> StatusCode
where
    S: SheetStore + 'static,
    F: Forum + 'static,
{
    tracing::info!("pong");
    grader.wakeup();
    StatusCode::NO_CONTENT
}

/// Verifies both external connections, reporting the first failure.
async fn status<S, F>(
    State(grader): State<Arc<Grader<S, F>>>,
) -> Result<&'static str, (StatusCode, String)>
where
    S: SheetStore + 'static,
    F: Forum + 'static,
{
    tracing::info!("status check");
    match grader.verify().await {
        Ok(()) => Ok("ok"),
        Err(err) => Err((StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))),
    }
}
