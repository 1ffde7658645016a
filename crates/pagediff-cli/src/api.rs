//! HTTP API over the comparison engine.
//!
//! Nested routes check ownership: a page must belong to the website in the
//! path and a comparison to the page, otherwise the response is 404.

use crate::context::AppContext;
use crate::error::{CliError, CliResult};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use pagediff::{
    Comparison, ContentStore, ImageRef, Page, PageDiffError, Recipient, Repository, Website,
    REF_PREFIX,
};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Library error rendered as a JSON response
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<PageDiffError> for ApiError {
    fn from(e: PageDiffError) -> Self {
        let status = match &e {
            PageDiffError::NotFound { .. } => StatusCode::NOT_FOUND,
            PageDiffError::Config { .. } | PageDiffError::Store { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "request failed");
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
struct CreateWebsite {
    name: String,
    url: String,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    editors: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CreatePage {
    name: String,
    path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetBaseline {
    #[serde(default)]
    new_baseline_screenshot: Option<String>,
}

/// Build the API router
pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/websites", get(list_websites).post(create_website))
        .route("/api/websites/{id}", get(get_website))
        .route("/api/websites/{id}/pages", get(list_pages).post(create_page))
        .route("/api/websites/{id}/pages/{page_id}", delete(delete_page))
        .route("/api/websites/{id}/pages/{page_id}/compare", post(compare_page))
        .route(
            "/api/websites/{id}/pages/{page_id}/comparisons",
            get(page_history),
        )
        .route(
            "/api/websites/{id}/pages/{page_id}/comparisons/{comparison_id}/available-baselines",
            get(available_baselines),
        )
        .route(
            "/api/websites/{id}/pages/{page_id}/comparisons/{comparison_id}/set-baseline",
            put(set_baseline),
        )
        .route("/api/websites/{id}/compare-all", post(compare_all))
        .route("/api/jobs/{job_id}", get(job_status))
        .route("/screenshots/{file}", get(screenshot))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Serve the API until Ctrl-C
pub async fn serve(ctx: AppContext, addr: SocketAddr, cors: bool) -> CliResult<()> {
    let mut app = router(ctx);
    if cors {
        app = app.layer(CorsLayer::permissive());
    }
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| CliError::server(format!("failed to bind {addr}: {e}")))?;
    tracing::info!(%addr, "API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .map_err(|e| CliError::server(e.to_string()))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn list_websites(State(ctx): State<AppContext>) -> Json<Vec<Website>> {
    Json(ctx.repo.websites().await)
}

async fn create_website(
    State(ctx): State<AppContext>,
    Json(body): Json<CreateWebsite>,
) -> ApiResult<(StatusCode, Json<Website>)> {
    if body.name.trim().is_empty() {
        return Err(ApiError::bad_request("name must not be empty"));
    }
    let mut website = ctx.repo.insert_website(body.name, body.url).await?;
    if body.owner.is_some() || !body.editors.is_empty() {
        website.owner = body.owner.map(Recipient::new);
        website.editors = body.editors.into_iter().map(Recipient::new).collect();
        ctx.repo.update_website(&website).await?;
    }
    Ok((StatusCode::CREATED, Json(website)))
}

async fn get_website(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Website>> {
    Ok(Json(ctx.repo.website(&id).await?))
}

async fn list_pages(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Page>>> {
    Ok(Json(ctx.repo.pages_for_website(&id).await?))
}

async fn create_page(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Json(body): Json<CreatePage>,
) -> ApiResult<(StatusCode, Json<Page>)> {
    let page = ctx.repo.insert_page(&id, body.name, body.path).await?;
    Ok((StatusCode::CREATED, Json(page)))
}

async fn owned_page(ctx: &AppContext, website_id: &str, page_id: &str) -> ApiResult<Page> {
    let page = ctx.repo.page(page_id).await?;
    if page.website_id != website_id {
        return Err(PageDiffError::not_found("page", page_id).into());
    }
    Ok(page)
}

async fn owned_comparison(
    ctx: &AppContext,
    website_id: &str,
    page_id: &str,
    comparison_id: &str,
) -> ApiResult<Comparison> {
    let page = owned_page(ctx, website_id, page_id).await?;
    let comparison = ctx.repo.comparison(comparison_id).await?;
    if comparison.page_id != page.id {
        return Err(PageDiffError::not_found("comparison", comparison_id).into());
    }
    Ok(comparison)
}

async fn delete_page(
    State(ctx): State<AppContext>,
    Path((id, page_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    owned_page(&ctx, &id, &page_id).await?;
    ctx.repo.delete_page(&page_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn compare_page(
    State(ctx): State<AppContext>,
    Path((id, page_id)): Path<(String, String)>,
) -> ApiResult<Response> {
    owned_page(&ctx, &id, &page_id).await?;
    match ctx.engine.run_comparison(&page_id).await {
        Ok(outcome) => Ok((StatusCode::CREATED, Json(outcome)).into_response()),
        Err(e) => Err(ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

async fn page_history(
    State(ctx): State<AppContext>,
    Path((id, page_id)): Path<(String, String)>,
) -> ApiResult<Json<Vec<Comparison>>> {
    owned_page(&ctx, &id, &page_id).await?;
    Ok(Json(ctx.engine.history(&page_id).await?))
}

async fn available_baselines(
    State(ctx): State<AppContext>,
    Path((id, page_id, comparison_id)): Path<(String, String, String)>,
) -> ApiResult<Response> {
    owned_comparison(&ctx, &id, &page_id, &comparison_id).await?;
    let candidates = ctx.engine.list_candidates(&comparison_id).await?;
    Ok(Json(candidates).into_response())
}

async fn set_baseline(
    State(ctx): State<AppContext>,
    Path((id, page_id, comparison_id)): Path<(String, String, String)>,
    Json(body): Json<SetBaseline>,
) -> ApiResult<Json<Comparison>> {
    let Some(image) = body.new_baseline_screenshot.filter(|s| !s.is_empty()) else {
        return Err(ApiError::bad_request("newBaselineScreenshot is required"));
    };
    owned_comparison(&ctx, &id, &page_id, &comparison_id).await?;
    let updated = ctx
        .engine
        .override_baseline(&comparison_id, &ImageRef::new(image))
        .await?;
    Ok(Json(updated))
}

async fn compare_all(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let submission = ctx.bulk.submit(&id).await?;
    let message = if submission.already_running {
        "Comparison already running"
    } else {
        "Comparison started"
    };
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": message,
            "jobId": submission.job_id,
            "pages": submission.pages,
        })),
    ))
}

async fn job_status(
    State(ctx): State<AppContext>,
    Path(job_id): Path<String>,
) -> ApiResult<Response> {
    let progress = ctx.bulk.status(&job_id).await?;
    Ok(Json(progress).into_response())
}

async fn screenshot(
    State(ctx): State<AppContext>,
    Path(file): Path<String>,
) -> ApiResult<Response> {
    let reference = ImageRef::new(format!("{REF_PREFIX}{file}"));
    let bytes = ctx.store.read(&reference).await?;
    Ok(([(header::CONTENT_TYPE, "image/png")], bytes).into_response())
}
