use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use base64::Engine;
use chrono::{DateTime, Utc};
use include_dir::{include_dir, Dir};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
};
use uuid::Uuid;

use crate::{
    chat::{ChatAssistant, ChatView, ReplyTicket},
    config::Config,
    error::ApiError,
    generator::LayoutGenerator,
    lifecycle::GenerationStatus,
    models::{Theme, ThemeOption, UploadedFile},
    presenter::download_file_name,
    studio::{self, Studio, StudioView},
    upload::{PreviewRegistry, Slot},
};

static ASSETS: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/static");

/// One visitor's page: the studio and the chat widget, which never touch
/// each other.
pub struct Workspace {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub studio: Arc<Mutex<Studio>>,
    pub chat: Arc<Mutex<ChatAssistant>>,
}

#[derive(Clone)]
pub struct AppState {
    pub workspaces: Arc<RwLock<HashMap<Uuid, Arc<Workspace>>>>,
    pub previews: PreviewRegistry,
    pub generator: Arc<dyn LayoutGenerator>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, generator: Arc<dyn LayoutGenerator>) -> Self {
        Self {
            workspaces: Arc::default(),
            previews: PreviewRegistry::default(),
            generator,
            config: Arc::new(config),
        }
    }

    fn workspace(&self, id: Uuid) -> Result<Arc<Workspace>, ApiError> {
        self.workspaces.read().get(&id).cloned().ok_or(ApiError::WorkspaceNotFound(id))
    }
}

#[derive(Debug, Serialize)]
pub struct WorkspaceView {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub studio: StudioView,
    pub chat: ChatView,
}

impl Workspace {
    fn view(&self) -> WorkspaceView {
        WorkspaceView { id: self.id, created_at: self.created_at, studio: self.studio.lock().view(), chat: self.chat.lock().view() }
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/", get(index))
        .route("/static/*path", get(asset))
        .route("/api/themes", get(list_themes))
        .route("/api/workspaces", post(create_workspace))
        .route("/api/workspaces/:id", get(get_workspace).delete(delete_workspace))
        .route("/api/workspaces/:id/files/:slot", put(upload_file))
        .route("/api/workspaces/:id/theme", put(set_theme))
        .route("/api/workspaces/:id/generate", post(generate))
        .route("/api/workspaces/:id/start-over", post(start_over))
        .route("/api/workspaces/:id/dismiss-error", post(dismiss_error))
        .route("/api/workspaces/:id/layouts/:position/download", get(download_layout))
        .route("/api/workspaces/:id/chat", get(get_chat).post(send_chat))
        .route("/api/workspaces/:id/chat/clear", post(clear_chat))
        .route("/api/previews/:id", get(get_preview))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

fn content_type_for(path: &str) -> &'static str {
    match path.rsplit('.').next() {
        Some("html") => "text/html; charset=utf-8",
        Some("js") => "text/javascript; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

fn serve_asset(path: &str) -> Response {
    match ASSETS.get_file(path) {
        Some(file) => ([(CONTENT_TYPE, content_type_for(path))], file.contents()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn index() -> Response { serve_asset("index.html") }

async fn asset(Path(path): Path<String>) -> Response { serve_asset(&path) }

async fn list_themes() -> Json<Vec<ThemeOption>> {
    Json(Theme::ALL.into_iter().map(|t| ThemeOption { name: t.name(), icon: t.icon() }).collect())
}

pub async fn create_workspace(State(state): State<AppState>) -> Json<WorkspaceView> {
    let workspace = Arc::new(Workspace {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        studio: Arc::new(Mutex::new(Studio::new(state.previews.clone()))),
        chat: Arc::new(Mutex::new(ChatAssistant::new())),
    });
    state.workspaces.write().insert(workspace.id, workspace.clone());
    tracing::info!(id = %workspace.id, "🎯 Workspace opened");
    Json(workspace.view())
}

pub async fn get_workspace(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<WorkspaceView>, ApiError> {
    Ok(Json(state.workspace(id)?.view()))
}

pub async fn delete_workspace(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    let removed = state.workspaces.write().remove(&id).ok_or(ApiError::WorkspaceNotFound(id))?;
    drop(removed);
    tracing::info!(%id, live_previews = state.previews.len(), "Workspace closed");
    Ok(StatusCode::NO_CONTENT)
}

// Mirrors the picker's `accept="image/*"`: a declared image type, or bytes
// that sniff as a known image format.
fn image_content_type(declared: Option<&str>, bytes: &[u8]) -> Option<String> {
    match declared {
        Some(ct) if ct.starts_with("image/") => Some(ct.to_string()),
        _ => image::guess_format(bytes).ok().map(|f| f.to_mime_type().to_string()),
    }
}

async fn read_image_field(multipart: &mut Multipart) -> Result<UploadedFile, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(|e| ApiError::BadRequest(e.to_string()))? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let declared = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;
        let content_type =
            image_content_type(declared.as_deref(), &bytes).ok_or_else(|| ApiError::NotAnImage(file_name.clone()))?;
        return Ok(UploadedFile { file_name, content_type, bytes });
    }
    Err(ApiError::BadRequest("multipart field 'file' is required".into()))
}

pub async fn upload_file(
    Path((id, slot)): Path<(Uuid, String)>,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<StudioView>, ApiError> {
    let slot: Slot = slot.parse().map_err(ApiError::BadRequest)?;
    let workspace = state.workspace(id)?;
    let file = read_image_field(&mut multipart).await?;
    let mut studio = workspace.studio.lock();
    studio.select_file(slot, file);
    Ok(Json(studio.view()))
}

#[derive(Debug, Deserialize)]
pub struct ThemeBody {
    pub theme: String,
}

pub async fn set_theme(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<ThemeBody>,
) -> Result<Json<StudioView>, ApiError> {
    let theme: Theme = body.theme.parse().map_err(ApiError::BadRequest)?;
    let workspace = state.workspace(id)?;
    let mut studio = workspace.studio.lock();
    studio.select_theme(theme);
    Ok(Json(studio.view()))
}

/// 202 when a cycle started, 409 when submission is currently blocked.
pub async fn generate(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<(StatusCode, Json<StudioView>), ApiError> {
    let workspace = state.workspace(id)?;
    let accepted = studio::submit(&workspace.studio, state.generator.clone(), state.config.absorb_delay);
    let status = if accepted { StatusCode::ACCEPTED } else { StatusCode::CONFLICT };
    let view = workspace.studio.lock().view();
    Ok((status, Json(view)))
}

pub async fn start_over(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<StudioView>, ApiError> {
    let workspace = state.workspace(id)?;
    let mut studio = workspace.studio.lock();
    studio.start_over();
    Ok(Json(studio.view()))
}

pub async fn dismiss_error(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<StudioView>, ApiError> {
    let workspace = state.workspace(id)?;
    let mut studio = workspace.studio.lock();
    studio.dismiss_error();
    Ok(Json(studio.view()))
}

pub async fn download_layout(
    Path((id, position)): Path<(Uuid, usize)>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let workspace = state.workspace(id)?;
    let (file_name, encoded) = {
        let studio = workspace.studio.lock();
        if studio.status() != GenerationStatus::Presenting {
            return Err(ApiError::LayoutNotFound(position));
        }
        let layout = position
            .checked_sub(1)
            .and_then(|index| studio.layouts().get(index))
            .ok_or(ApiError::LayoutNotFound(position))?;
        (download_file_name(position, &layout.cta_text), layout.image.clone())
    };
    let png = base64::engine::general_purpose::STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| ApiError::CorruptImage(e.to_string()))?;
    tracing::info!(%id, position, %file_name, bytes = png.len(), "Layout downloaded");
    let headers = [
        (CONTENT_TYPE, "image/png".to_string()),
        (CONTENT_DISPOSITION, format!("attachment; filename=\"{file_name}\"")),
    ];
    Ok((headers, png).into_response())
}

pub async fn get_preview(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Response, ApiError> {
    let (content_type, bytes) = state.previews.fetch(id).ok_or(ApiError::PreviewNotFound(id))?;
    Ok(([(CONTENT_TYPE, content_type)], bytes).into_response())
}

pub async fn get_chat(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<ChatView>, ApiError> {
    Ok(Json(state.workspace(id)?.chat.lock().view()))
}

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub text: String,
}

/// Answers once the canned reply has been posted (or immediately when the
/// message was ignored).
pub async fn send_chat(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Json<ChatView>, ApiError> {
    let (ticket, chat) = {
        let workspace = state.workspace(id)?;
        let ticket = workspace.chat.lock().send(&body.text);
        (ticket, Arc::downgrade(&workspace.chat))
    };

    if let Some(ticket) = ticket {
        let reply = tokio::spawn(deliver_reply(chat, ticket, state.config.chat_reply_delay));
        if let Err(e) = reply.await {
            tracing::warn!("Chat reply task failed: {}", e);
        }
    }

    Ok(Json(state.workspace(id)?.chat.lock().view()))
}

async fn deliver_reply(chat: std::sync::Weak<Mutex<ChatAssistant>>, ticket: ReplyTicket, delay: std::time::Duration) {
    tokio::time::sleep(delay).await;
    match chat.upgrade() {
        Some(chat) => {
            if !chat.lock().deliver(ticket) {
                tracing::debug!("Chat reply no longer owed");
            }
        }
        None => tracing::debug!("Chat closed before the reply was posted"),
    }
}

pub async fn clear_chat(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<ChatView>, ApiError> {
    let workspace = state.workspace(id)?;
    let mut chat = workspace.chat.lock();
    chat.clear();
    Ok(Json(chat.view()))
}
