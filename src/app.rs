#![cfg(not(tarpaulin_include))]

use axum::{
    Json, Router,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use chrono::{Local, NaiveDate};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::cards::directory_cards;
use crate::config::RosterConfig;
use crate::directory::{DirectoryRequest, LayoutOptions};
use crate::downloader::{to_csv, to_xlsx};
use crate::errors::{PhotoError, RosterError, StoreError, ValidationError};
use crate::member::{MemberPatch, MemberRecord, NewMember, Status};
use crate::pdf::render_pdf;
use crate::photo::encode_photo;
use crate::roster::{EditSession, Origin, Table};
use crate::store::{RecordStore, SaveReport};

/// Header naming the client's edit session.
pub const SESSION_HEADER: &str = "x-roster-session";

const MAX_SESSIONS: usize = 256;

pub struct AppState {
    store: RecordStore,
    table: Mutex<Table>,
    sessions: Mutex<HashMap<String, EditSession>>,
    layout: LayoutOptions,
}

impl AppState {
    pub fn new(store: RecordStore, table: Table, layout: LayoutOptions) -> Self {
        AppState {
            store,
            table: Mutex::new(table),
            sessions: Mutex::new(HashMap::new()),
            layout,
        }
    }

    fn table(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` on the edit session named by the request's
    /// [`SESSION_HEADER`]. Requests without one get a fresh session that is
    /// not kept.
    fn with_session<T>(&self, headers: &HeaderMap, f: impl FnOnce(&mut EditSession) -> T) -> T {
        let key = headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|k| !k.is_empty());
        let Some(key) = key else {
            return f(&mut EditSession::default());
        };

        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if !sessions.contains_key(key) && sessions.len() >= MAX_SESSIONS {
            warn!("{} edit sessions open; forgetting them", sessions.len());
            sessions.clear();
        }
        f(sessions.entry(key.to_string()).or_default())
    }
}

type SharedState = Arc<AppState>;

/// A failure shown inline to the user.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError {
            status,
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
struct StatusResponse<T: Serialize> {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(flatten)]
    body: T,
}

fn ok<T: Serialize>(body: T) -> Json<StatusResponse<T>> {
    Json(StatusResponse {
        status: "ok",
        message: None,
        body,
    })
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = StatusResponse {
            status: "error",
            message: Some(self.message),
            body: serde_json::Map::new(),
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Could not reach the roster sheet, try again. ({})", e),
        )
    }
}

impl From<RosterError> for ApiError {
    fn from(e: RosterError) -> Self {
        match e {
            RosterError::UnknownMember(_) => ApiError::new(StatusCode::NOT_FOUND, e.to_string()),
            RosterError::Invalid(e) => e.into(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, e.to_string())
    }
}

impl From<PhotoError> for ApiError {
    fn from(e: PhotoError) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, e.to_string())
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Runs `f` on a blocking thread; sheet backends do network and file I/O.
async fn blocking<T, F>(state: &SharedState, f: F) -> ApiResult<T>
where
    F: FnOnce(&AppState) -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| {
            error!("blocking task failed: {}", e);
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        })?
}

/// Applies `edit` to a copy of the table and writes the copy back.
///
/// The shared table only changes once the write succeeds; a failed edit or
/// save leaves it as it was, so retrying the request does not apply the
/// edit twice.
async fn edit_and_save<T, F>(state: &SharedState, edit: F) -> ApiResult<(T, SaveReport)>
where
    F: FnOnce(&mut Table) -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    blocking(state, move |state| {
        let mut table = state.table();
        let mut draft = table.clone();
        let value = edit(&mut draft)?;
        let report = state.store.save(&mut draft)?;
        if report.conflict {
            warn!("save overwrote changes made by another session");
        }
        *table = draft;
        Ok((value, report))
    })
    .await
}

pub async fn run(config: RosterConfig) -> Result<(), Box<dyn std::error::Error>> {
    let bind = config.bind.clone();
    let layout = config.layout.clone();

    // Backends may block while connecting, so the initial load runs off the
    // async executor.
    let app_state = tokio::task::spawn_blocking(move || -> Result<AppState, String> {
        let store = config.store().map_err(|e| e.to_string())?;
        let table = store.load_or_empty();
        Ok(AppState::new(store, table, layout))
    })
    .await??;

    let app = router(Arc::new(app_state));

    let listener = TcpListener::bind(&bind).await?;
    info!("Listening on http://{}", bind);
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(|| async { Redirect::to("/directory") }))
        .route("/api/members", get(list_members).post(register_member))
        .route(
            "/api/members/:id",
            get(get_member).put(update_member).delete(delete_member),
        )
        .route("/api/members/:id/visits", post(add_visit))
        .route("/api/members/:id/photo", post(upload_photo))
        .route("/api/session/rotate", post(rotate_photo))
        .route("/api/reload", post(reload))
        .route("/directory", get(directory_page))
        .route("/api/directory.pdf", get(directory_pdf))
        .route("/api/export.csv", get(export_csv))
        .route("/api/export.xlsx", get(export_xlsx))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Deserialize)]
struct ListQuery {
    q: Option<String>,
    /// Comma separated status labels.
    status: Option<String>,
}

#[derive(Serialize)]
struct MemberRow {
    /// 1-based position shown in the member list.
    index: usize,
    #[serde(flatten)]
    record: MemberRecord,
}

#[derive(Serialize)]
struct MemberList {
    members: Vec<MemberRow>,
    /// The sheet could not be read; the list is empty and cannot be saved.
    degraded: bool,
}

async fn list_members(
    Query(params): Query<ListQuery>,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    let table = state.table();
    let statuses: Vec<Status> = params
        .status
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Status::from_label)
        .collect();

    let matches = match params.q.as_deref() {
        Some(q) if !q.trim().is_empty() => table.search(q),
        _ => table.iter().collect(),
    };
    let members = matches
        .into_iter()
        .filter(|r| statuses.is_empty() || statuses.contains(&r.status))
        .map(|r| MemberRow {
            index: table.display_index(&r.id).unwrap_or_default(),
            record: r.clone(),
        })
        .collect();

    ok(MemberList {
        members,
        degraded: *table.origin() == Origin::Degraded,
    })
}

#[derive(Serialize)]
struct Saved<T: Serialize> {
    #[serde(flatten)]
    value: T,
    save: SaveReport,
}

#[derive(Serialize)]
struct Registered {
    id: String,
}

async fn register_member(
    State(state): State<SharedState>,
    Json(form): Json<NewMember>,
) -> ApiResult<impl IntoResponse> {
    let (id, save) = edit_and_save(&state, move |table| Ok(table.register(form)?)).await?;
    info!("registered member {}", id);
    Ok((
        StatusCode::CREATED,
        ok(Saved {
            value: Registered { id },
            save,
        }),
    ))
}

async fn get_member(
    Path(id): Path<String>,
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let record = state
        .table()
        .get(&id)
        .cloned()
        .ok_or_else(|| ApiError::from(RosterError::UnknownMember(id.clone())))?;
    let session = state.with_session(&headers, |session| {
        session.select(&id);
        session.clone()
    });
    Ok(ok(serde_json::json!({ "member": record, "session": session })))
}

async fn update_member(
    Path(id): Path<String>,
    State(state): State<SharedState>,
    Json(patch): Json<MemberPatch>,
) -> ApiResult<impl IntoResponse> {
    let ((), save) = edit_and_save(&state, move |table| Ok(table.update(&id, patch)?)).await?;
    Ok(ok(Saved {
        value: serde_json::Map::new(),
        save,
    }))
}

async fn delete_member(
    Path(id): Path<String>,
    State(state): State<SharedState>,
) -> ApiResult<impl IntoResponse> {
    let (removed, save) = edit_and_save(&state, move |table| {
        table
            .remove(&id)
            .ok_or_else(|| RosterError::UnknownMember(id).into())
    })
    .await?;
    info!("removed member {}", removed.id);
    Ok(ok(Saved {
        value: serde_json::Map::new(),
        save,
    }))
}

#[derive(Deserialize)]
struct VisitForm {
    /// Defaults to today.
    date: Option<NaiveDate>,
    note: String,
}

async fn add_visit(
    Path(id): Path<String>,
    State(state): State<SharedState>,
    Json(form): Json<VisitForm>,
) -> ApiResult<impl IntoResponse> {
    let date = form.date.unwrap_or_else(|| Local::now().date_naive());
    if form.note.trim().is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "visitation note is empty"));
    }
    let (_, save) = edit_and_save(&state, move |table| {
        Ok(table.append_visitation(&id, date, &form.note)?)
    })
    .await?;
    Ok(ok(Saved {
        value: serde_json::Map::new(),
        save,
    }))
}

async fn upload_photo(
    Path(id): Path<String>,
    State(state): State<SharedState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let mut file_data = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?
    {
        if field.name() == Some("photo") {
            file_data = field
                .bytes()
                .await
                .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?
                .to_vec();
        }
    }

    let rotation = state.with_session(&headers, |session| {
        session.select(&id);
        session.rotation
    });
    let (photo, save) = edit_and_save(&state, move |table| {
        if table.get(&id).is_none() {
            return Err(RosterError::UnknownMember(id).into());
        }
        let photo = encode_photo(&file_data, rotation)?;
        table.update(
            &id,
            MemberPatch {
                photo: Some(photo.clone()),
                ..Default::default()
            },
        )?;
        Ok(photo)
    })
    .await?;
    Ok(ok(Saved {
        value: serde_json::json!({ "photo": photo, "rotation": rotation.degrees() }),
        save,
    }))
}

async fn rotate_photo(State(state): State<SharedState>, headers: HeaderMap) -> impl IntoResponse {
    let rotation = state.with_session(&headers, EditSession::rotate);
    ok(serde_json::json!({ "rotation": rotation.degrees() }))
}

async fn reload(State(state): State<SharedState>) -> ApiResult<impl IntoResponse> {
    let members = blocking(&state, |state| {
        let table = state.store.load()?;
        let members = table.len();
        *state.table() = table;
        Ok(members)
    })
    .await?;
    Ok(ok(serde_json::json!({ "members": members })))
}

#[derive(Deserialize)]
struct DirectoryQuery {
    status: Option<String>,
    fields: Option<String>,
}

impl DirectoryQuery {
    fn request(&self) -> DirectoryRequest {
        DirectoryRequest::from_lists(
            self.status.as_deref().unwrap_or_default(),
            self.fields.as_deref().unwrap_or_default(),
        )
    }
}

async fn directory_page(
    Query(params): Query<DirectoryQuery>,
    State(state): State<SharedState>,
) -> ApiResult<Html<String>> {
    let table = state.table();
    directory_cards(&table, &params.request(), &state.layout)
        .map(Html)
        .map_err(|e| {
            error!("card template failed: {}", e);
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "could not render directory")
        })
}

async fn directory_pdf(
    Query(params): Query<DirectoryQuery>,
    State(state): State<SharedState>,
) -> ApiResult<Response> {
    let request = params.request();
    let (bytes, stats) = blocking(&state, move |state| {
        let table = state.table();
        Ok(render_pdf(&table, &request, &state.layout))
    })
    .await?;
    info!(
        "directory: {} households on {} pages ({} placeholders)",
        stats.households, stats.pages, stats.placeholders
    );
    download(bytes, "application/pdf", "directory.pdf")
}

async fn export_csv(State(state): State<SharedState>) -> ApiResult<Response> {
    let csv = to_csv(&state.table());
    download(csv.into_bytes(), "text/csv; charset=utf-8", "roster.csv")
}

async fn export_xlsx(State(state): State<SharedState>) -> ApiResult<Response> {
    let bytes = to_xlsx(&state.table()).map_err(|e| {
        error!("xlsx export failed: {}", e);
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "could not build spreadsheet")
    })?;
    download(
        bytes,
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "roster.xlsx",
    )
}

fn download(bytes: Vec<u8>, content_type: &str, filename: &str) -> ApiResult<Response> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(Body::from(bytes))
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}
