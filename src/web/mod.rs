// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Web UI: workspace selection and image upload form, plus a small JSON API

pub mod page;

use axum::{
    extract::{DefaultBodyLimit, FromRequestParts, Multipart, Query, State},
    http::{
        header::{COOKIE, SET_COOKIE},
        request::Parts,
        HeaderValue, StatusCode,
    },
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Form, Router,
};
use base64::{engine::general_purpose, Engine as _};
use image::ImageFormat;
use minijinja::Environment;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::pipeline::{Pipeline, Stage, StageError};
use crate::session::SessionStore;
use crate::TrashLensError;
use page::{Flash, PageView, ResultView};

const SESSION_COOKIE: &str = "trashlens_session";

/// Shared application state
pub struct AppState {
    pub config: AppConfig,
    pub pipeline: Pipeline,
    sessions: Mutex<SessionStore<Uuid>>,
    templates: Environment<'static>,
}

impl AppState {
    pub fn new(config: AppConfig, pipeline: Pipeline) -> crate::Result<Self> {
        Ok(Self {
            sessions: Mutex::new(SessionStore::from_config(&config.session)),
            templates: page::environment()?,
            config,
            pipeline,
        })
    }
}

/// Browser identity carried in a cookie
#[derive(Debug, Clone, Copy)]
pub struct BrowserSession {
    id: Uuid,
    is_new: bool,
}

impl BrowserSession {
    fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        let existing = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == SESSION_COOKIE)
            .and_then(|(_, value)| Uuid::parse_str(value).ok());

        match existing {
            Some(id) => Self { id, is_new: false },
            None => Self { id: Uuid::new_v4(), is_new: true },
        }
    }

    /// Set the cookie on responses to browsers that did not send one
    fn attach(&self, mut response: Response) -> Response {
        if self.is_new {
            let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, self.id);
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                response.headers_mut().append(SET_COOKIE, value);
            }
        }
        response
    }
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for BrowserSession {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

/// Create the web application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.web.max_upload_bytes;

    Router::new()
        // Pages
        .route("/", get(index_page))
        .route("/workspaces/load", post(load_workspaces))
        .route("/workspace", post(switch_workspace))
        .route("/analyze", post(analyze_upload))
        // API endpoints
        .route("/api/health", get(api_health))
        .route("/api/workspaces", get(api_workspaces))
        .route("/api/analyze", post(api_analyze))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// === Page Handlers ===

async fn index_page(State(state): State<Arc<AppState>>, session: BrowserSession) -> Response {
    let view = base_view(&state, &session).await;
    session.attach(render_page(&state, &view))
}

async fn load_workspaces(State(state): State<Arc<AppState>>, session: BrowserSession) -> Response {
    let mut flashes = Vec::new();
    match state.pipeline.list_workspaces().await {
        Ok(list) if list.is_empty() => {
            flashes.push(Flash::warning("No workspaces available"));
            state.sessions.lock().await.set_available(session.id, list);
        }
        Ok(list) => {
            state.sessions.lock().await.set_available(session.id, list);
        }
        Err(e) => {
            warn!("Failed to list workspaces: {}", e);
            flashes.push(Flash::error(format!("Failed to load workspaces: {}", e)));
        }
    }

    let mut view = base_view(&state, &session).await;
    view.flashes = flashes;
    session.attach(render_page(&state, &view))
}

#[derive(Deserialize)]
struct SwitchForm {
    workspace: String,
}

async fn switch_workspace(
    State(state): State<Arc<AppState>>,
    session: BrowserSession,
    Form(form): Form<SwitchForm>,
) -> Response {
    let workspace = form.workspace.trim().to_string();
    let flash = if workspace.is_empty() {
        Flash::warning("Please choose a workspace")
    } else {
        state.sessions.lock().await.select(session.id, workspace.clone());
        info!("Browser session {} switched to workspace {}", session.id, workspace);
        Flash::success(format!("Switched to workspace: {}", workspace))
    };

    let mut view = base_view(&state, &session).await;
    view.flashes.push(flash);
    session.attach(render_page(&state, &view))
}

async fn analyze_upload(
    State(state): State<Arc<AppState>>,
    session: BrowserSession,
    multipart: Multipart,
) -> Response {
    let mut view = base_view(&state, &session).await;

    if view.workspace.is_none() {
        view.flashes.push(Flash::warning("Please select a workspace first"));
        return session.attach(render_page(&state, &view));
    }

    let upload = match read_image(multipart).await {
        Ok(upload) => upload,
        Err(e) => {
            view.flashes.push(Flash::error(e.to_string()));
            return session.attach(render_page(&state, &view));
        }
    };

    let mut result = ResultView {
        image_src: Some(format!(
            "data:{};base64,{}",
            upload.format.to_mime_type(),
            general_purpose::STANDARD.encode(&upload.bytes)
        )),
        ..Default::default()
    };

    match state.pipeline.analyze(view.workspace.as_deref(), &upload.bytes).await {
        Ok(analysis) => {
            result.description = Some(analysis.description);
            result.label = Some(analysis.label);
            result.category = analysis.category.map(|c| c.to_string());
        }
        Err(e) => {
            view.flashes.push(Flash::error(e.to_string()));
        }
    }

    view.result = Some(result);
    session.attach(render_page(&state, &view))
}

async fn base_view(state: &AppState, session: &BrowserSession) -> PageView {
    let stored = state.sessions.lock().await.get(&session.id).unwrap_or_default();
    PageView {
        workspace: stored.workspace,
        available: stored.available,
        ..Default::default()
    }
}

fn render_page(state: &AppState, view: &PageView) -> Response {
    match page::render(&state.templates, view) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!("Failed to render page: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to render page").into_response()
        }
    }
}

// === Uploads ===

struct Upload {
    bytes: Vec<u8>,
    format: ImageFormat,
}

/// Pull the `image` field out of the form and check it is a JPEG or PNG
async fn read_image(mut multipart: Multipart) -> crate::Result<Upload> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| TrashLensError::PreconditionUnmet(format!("Failed to parse upload: {}", e)))?
    {
        if field.name() != Some("image") {
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| TrashLensError::PreconditionUnmet(format!("Failed to read upload: {}", e)))?;
        if bytes.is_empty() {
            break;
        }
        return match image::guess_format(&bytes) {
            Ok(format @ (ImageFormat::Jpeg | ImageFormat::Png)) => Ok(Upload {
                bytes: bytes.to_vec(),
                format,
            }),
            _ => Err(TrashLensError::PreconditionUnmet(
                "Unsupported file type, upload a JPG or PNG image".to_string(),
            )),
        };
    }

    Err(TrashLensError::PreconditionUnmet("No image uploaded".to_string()))
}

// === API Handlers ===

/// JSON error body: `{error, stage}`
struct ApiError {
    stage: Option<Stage>,
    error: TrashLensError,
}

impl From<StageError> for ApiError {
    fn from(e: StageError) -> Self {
        Self { stage: Some(e.stage), error: e.error }
    }
}

impl From<TrashLensError> for ApiError {
    fn from(error: TrashLensError) -> Self {
        Self { stage: None, error }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.error.is_precondition() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::BAD_GATEWAY
        };
        let message = match self.stage {
            Some(stage) => format!("{} failed: {}", stage, self.error),
            None => self.error.to_string(),
        };
        (status, Json(json!({ "error": message, "stage": self.stage }))).into_response()
    }
}

async fn api_health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn api_workspaces(State(state): State<Arc<AppState>>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.pipeline.list_workspaces().await?))
}

#[derive(Deserialize)]
struct AnalyzeQuery {
    workspace: Option<String>,
}

async fn api_analyze(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AnalyzeQuery>,
    multipart: Multipart,
) -> Result<Json<crate::pipeline::Analysis>, ApiError> {
    if query.workspace.as_deref().map_or(true, |w| w.trim().is_empty()) {
        return Err(ApiError {
            stage: Some(Stage::AwaitingWorkspace),
            error: TrashLensError::PreconditionUnmet("select a workspace first".to_string()),
        });
    }
    let upload = read_image(multipart).await.map_err(|error| ApiError {
        stage: Some(Stage::AwaitingImage),
        error,
    })?;
    let analysis = state
        .pipeline
        .analyze(query.workspace.as_deref(), &upload.bytes)
        .await?;
    Ok(Json(analysis))
}

/// Start the web server with config and pipeline
pub async fn start_server(config: AppConfig, pipeline: Pipeline) -> crate::Result<()> {
    let addr = format!("{}:{}", config.web.host, config.web.port);
    let state = Arc::new(AppState::new(config, pipeline)?);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Web UI available at http://{}", addr);

    let router = create_router(state);
    axum::serve(listener, router)
        .await
        .map_err(|e| TrashLensError::Config(format!("Server error: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{stubs, Reply, Stubs};
    use axum::body::{to_bytes, Body};
    use axum::http::{header::CONTENT_TYPE, Request};
    use tower::ServiceExt;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01";
    const BOUNDARY: &str = "trashlensboundary";

    fn app(s: &Stubs) -> Router {
        let state = AppState::new(AppConfig::default(), s.pipeline.clone()).unwrap();
        create_router(Arc::new(state))
    }

    fn multipart_body(bytes: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"item.png\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload(uri: &str, cookie: Option<&str>, bytes: &[u8]) -> Request<Body> {
        let mut req = Request::post(uri)
            .header(CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"));
        if let Some(cookie) = cookie {
            req = req.header(COOKIE, cookie);
        }
        req.body(Body::from(multipart_body(bytes))).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    /// Select a workspace and return the session cookie
    async fn select(router: &Router, workspace: &str) -> String {
        let req = Request::post("/workspace")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("workspace={}", workspace)))
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let cookie = resp.headers()[SET_COOKIE].to_str().unwrap().to_string();
        let html = body_text(resp).await;
        assert!(html.contains(&format!("Switched to workspace: {}", workspace)));
        cookie.split(';').next().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_index_sets_cookie() {
        let s = stubs(Reply::Text("d"), Reply::Text("l"), None);
        let resp = app(&s)
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let cookie = resp.headers()[SET_COOKIE].to_str().unwrap().to_string();
        assert!(cookie.starts_with("trashlens_session="));
        assert!(body_text(resp).await.contains("Please select a workspace first"));
    }

    #[tokio::test]
    async fn test_upload_without_workspace_never_describes() {
        let s = stubs(Reply::Text("d"), Reply::Text("l"), None);
        let resp = app(&s).oneshot(upload("/analyze", None, PNG)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_text(resp).await.contains("Please select a workspace first"));
        assert_eq!(s.describe_calls(), 0);
    }

    #[tokio::test]
    async fn test_upload_end_to_end() {
        let s = stubs(Reply::Text("A greasy pizza box."), Reply::Text("一般垃圾"), None);
        let router = app(&s);
        let cookie = select(&router, "taipei").await;

        let resp = router.clone().oneshot(upload("/analyze", Some(&cookie), PNG)).await.unwrap();
        let html = body_text(resp).await;
        assert!(html.contains("A greasy pizza box."));
        assert!(html.contains("一般垃圾"));
        assert!(html.contains("Current workspace: taipei"));
        assert!(html.contains("data:image"));
        assert!(html.contains("base64,"));
        assert_eq!(s.classify_calls(), 1);
    }

    #[tokio::test]
    async fn test_upload_rejects_non_images() {
        let s = stubs(Reply::Text("d"), Reply::Text("l"), None);
        let router = app(&s);
        let cookie = select(&router, "taipei").await;

        let resp = router.clone().oneshot(upload("/analyze", Some(&cookie), b"%PDF-1.7")).await.unwrap();
        assert!(body_text(resp).await.contains("Unsupported file type"));
        assert_eq!(s.describe_calls(), 0);
    }

    #[tokio::test]
    async fn test_upload_description_failure() {
        let s = stubs(Reply::Status(500), Reply::Text("l"), None);
        let router = app(&s);
        let cookie = select(&router, "taipei").await;

        let resp = router.clone().oneshot(upload("/analyze", Some(&cookie), PNG)).await.unwrap();
        let html = body_text(resp).await;
        assert!(html.contains("image description failed"));
        assert!(html.contains("500"));
        assert_eq!(s.classify_calls(), 0);
    }

    #[tokio::test]
    async fn test_load_workspaces_populates_select() {
        let s = stubs(Reply::Text("d"), Reply::Text("l"), Some(vec!["taipei", "tainan"]));
        let router = app(&s);
        let cookie = select(&router, "tainan").await;

        let req = Request::post("/workspaces/load")
            .header(COOKIE, &cookie)
            .body(Body::empty())
            .unwrap();
        let html = body_text(router.clone().oneshot(req).await.unwrap()).await;
        assert!(html.contains(r#"<option value="taipei">"#));
        assert!(html.contains(r#"<option value="tainan" selected>"#));
    }

    #[tokio::test]
    async fn test_load_workspaces_error() {
        let s = stubs(Reply::Text("d"), Reply::Text("l"), None);
        let req = Request::post("/workspaces/load").body(Body::empty()).unwrap();
        let html = body_text(app(&s).oneshot(req).await.unwrap()).await;
        assert!(html.contains("Failed to load workspaces"));
        assert!(html.contains("401"));
    }

    #[tokio::test]
    async fn test_api_analyze() {
        let s = stubs(Reply::Text("A glass jar."), Reply::Text("可回收物"), None);
        let resp = app(&s)
            .oneshot(upload("/api/analyze?workspace=taipei", None, PNG))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(json["description"], "A glass jar.");
        assert_eq!(json["label"], "可回收物");
        assert_eq!(json["category"], "recyclable");
    }

    #[tokio::test]
    async fn test_api_analyze_error_statuses() {
        let s = stubs(Reply::Text("d"), Reply::Status(503), None);
        let router = app(&s);

        let resp = router.clone().oneshot(upload("/api/analyze", None, PNG)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(json["stage"], "awaiting_workspace");

        let resp = router.oneshot(upload("/api/analyze?workspace=ws", None, PNG)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let json: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(json["stage"], "classifying");
        assert!(json["error"].as_str().unwrap().contains("503"));
    }
}
