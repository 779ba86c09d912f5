//! MediPass server binary.
//!
//! Wires the core services together and exposes them over REST plus one
//! WebSocket endpoint for notification delivery:
//! - REST endpoints for scanning, request resolution, and record access
//! - `/ws` for per-user notification channels
//! - Swagger UI for the REST surface
//!
//! All configuration is read once at startup; see the environment variables
//! documented on [`main`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::{BoxError, Router};
use serde::{Deserialize, Serialize};
use tower::timeout::TimeoutLayer;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use medipass_api_shared::{
    resolve_session, HealthRes, HealthService, Session, SessionError, USER_HEADER,
};
use medipass_core::store::fs::FsStore;
use medipass_core::store::{AccessRequestStore, RecordEntryStore, StoreError};
use medipass_core::{
    codec, AccessDecision, AccessError, AccessLedger, AccessRequest, CoreConfig,
    DoctorProfilePatch, EntryDraft, InMemoryDirectory, MedicalRecordEntry, NotificationRelay,
    PatientProfilePatch, RecordGate, RequestDisposition, RequestOutcome, UserDirectory,
    UserRecord, DEFAULT_RELAY_SESSION_BUFFER,
};
use medipass_ids::{PatientRef, RefId, RequestId};

/// How long any one request may spend before being cut off.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Application state shared across REST and WebSocket handlers.
#[derive(Clone)]
struct AppState {
    directory: Arc<dyn UserDirectory>,
    ledger: Arc<AccessLedger>,
    gate: Arc<RecordGate>,
    relay: Arc<NotificationRelay>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        me_code,
        scan,
        list_requests,
        respond,
        revoke,
        my_patients,
        read_patient_records,
        append_patient_record,
        my_records,
        get_profile,
        patch_profile
    ),
    components(schemas(HealthRes, CodeRes, ScanReq))
)]
struct ApiDoc;

/// Main entry point for the MediPass server.
///
/// # Environment Variables
/// - `MEDIPASS_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `MEDIPASS_DATA_DIR`: Directory for the file-backed store (default: "/medipass_data")
/// - `MEDIPASS_USERS_FILE`: JSON file of directory users loaded at startup
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("medipass=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr =
        std::env::var("MEDIPASS_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let data_dir =
        std::env::var("MEDIPASS_DATA_DIR").unwrap_or_else(|_| "/medipass_data".into());
    let users_file = std::env::var("MEDIPASS_USERS_FILE").ok().map(PathBuf::from);

    let cfg = CoreConfig::new(PathBuf::from(data_dir), DEFAULT_RELAY_SESSION_BUFFER)?;
    let store = Arc::new(FsStore::open(cfg.data_dir())?);
    let directory: Arc<dyn UserDirectory> = Arc::new(load_directory(users_file)?);
    let relay = Arc::new(NotificationRelay::new(cfg.relay_session_buffer()));

    let request_store: Arc<dyn AccessRequestStore> = store.clone();
    let entry_store: Arc<dyn RecordEntryStore> = store;
    let ledger = Arc::new(AccessLedger::new(
        request_store,
        directory.clone(),
        relay.clone(),
    ));
    let gate = Arc::new(RecordGate::new(ledger.clone(), entry_store));

    let app = router(AppState {
        directory,
        ledger,
        gate,
        relay,
    });

    tracing::info!("++ Starting MediPass REST on {}", rest_addr);
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Loads the user directory from the configured users file, or starts empty.
fn load_directory(users_file: Option<PathBuf>) -> anyhow::Result<InMemoryDirectory> {
    match users_file {
        Some(path) => {
            let contents = std::fs::read_to_string(&path)?;
            let records: Vec<UserRecord> = serde_json::from_str(&contents)?;
            tracing::info!("loaded {} users from {}", records.len(), path.display());
            Ok(InMemoryDirectory::seeded(records))
        }
        None => {
            tracing::warn!("MEDIPASS_USERS_FILE not set; starting with an empty directory");
            Ok(InMemoryDirectory::new())
        }
    }
}

/// Builds the REST + WebSocket router over the given state.
fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/me/code", get(me_code))
        .route("/me/records", get(my_records))
        .route("/me/profile", get(get_profile).patch(patch_profile))
        .route("/scan", post(scan))
        .route("/requests", get(list_requests))
        .route("/requests/:id/respond", post(respond))
        .route("/requests/:id/revoke", post(revoke))
        .route("/patients", get(my_patients))
        .route(
            "/patients/:patient_ref/records",
            get(read_patient_records).post(append_patient_record),
        )
        .route("/ws", get(ws_upgrade))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(|_err: BoxError| async {
                    (StatusCode::SERVICE_UNAVAILABLE, "request timed out")
                }))
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

/// One user-visible API failure.
struct ApiError {
    status: StatusCode,
    message: String,
}

#[derive(Serialize)]
struct ErrorRes {
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorRes {
                message: self.message,
            }),
        )
            .into_response()
    }
}

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        let status = match &err {
            AccessError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AccessError::Validation(_) => StatusCode::BAD_REQUEST,
            AccessError::Unauthorized(_) => StatusCode::FORBIDDEN,
            AccessError::NotFound { .. } => StatusCode::NOT_FOUND,
            AccessError::Conflict => StatusCode::CONFLICT,
            AccessError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        if status == StatusCode::SERVICE_UNAVAILABLE {
            tracing::error!("transient failure: {err}");
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let status = match &err {
            SessionError::MissingIdentity
            | SessionError::MalformedIdentity
            | SessionError::UnknownUser => StatusCode::UNAUTHORIZED,
            SessionError::RoleMismatch(_) => StatusCode::FORBIDDEN,
            SessionError::Directory(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = match &err {
            StoreError::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

fn session_from(state: &AppState, headers: &HeaderMap) -> Result<Session, ApiError> {
    let value = headers.get(USER_HEADER).and_then(|v| v.to_str().ok());
    resolve_session(&state.directory, value).map_err(ApiError::from)
}

// ============================================================================
// HANDLERS
// ============================================================================

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Health check response", body = HealthRes))
)]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthService::check_health())
}

/// A patient's scannable code.
#[derive(Serialize, ToSchema)]
struct CodeRes {
    code: String,
}

#[utoipa::path(
    get,
    path = "/me/code",
    responses(
        (status = 200, description = "The caller's scannable code", body = CodeRes),
        (status = 403, description = "Caller is not a patient")
    )
)]
/// Returns the calling patient's scannable code.
///
/// The encoding is deterministic, so this endpoint also serves as
/// "regenerate": the same code comes back every time.
async fn me_code(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CodeRes>, ApiError> {
    let patient = session_from(&state, &headers)?.require_patient()?;
    Ok(Json(CodeRes {
        code: codec::encode(patient.patient_ref()),
    }))
}

/// Scan request body.
#[derive(Deserialize, ToSchema)]
struct ScanReq {
    /// The scanned code text
    code: String,
    /// Free-text reason shown to the patient
    reason: Option<String>,
}

#[utoipa::path(
    post,
    path = "/scan",
    request_body = ScanReq,
    responses(
        (status = 201, description = "Pending access request created"),
        (status = 200, description = "Existing request returned (resent or already granted)"),
        (status = 422, description = "Code failed to decode"),
        (status = 404, description = "Patient not found")
    )
)]
/// Decodes a scanned code and files an access request for the caller.
async fn scan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ScanReq>,
) -> Result<(StatusCode, Json<RequestOutcome>), ApiError> {
    let doctor = session_from(&state, &headers)?.require_doctor()?;

    let patient_ref = codec::decode(&req.code).map_err(AccessError::from)?;
    let outcome = state
        .ledger
        .request_access(doctor.doctor_ref(), &patient_ref, req.reason)?;

    let status = match outcome.disposition {
        RequestDisposition::Created => StatusCode::CREATED,
        _ => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}

#[utoipa::path(
    get,
    path = "/requests",
    responses((status = 200, description = "The caller's access requests, newest first"))
)]
/// Lists access requests for the caller, whichever side of them they are on.
async fn list_requests(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<AccessRequest>>, ApiError> {
    let requests = match session_from(&state, &headers)? {
        Session::Doctor(doctor) => state.ledger.list_for_doctor(doctor.doctor_ref())?,
        Session::Patient(patient) => state.ledger.list_for_patient(patient.patient_ref())?,
    };
    Ok(Json(requests))
}

/// Respond request body.
#[derive(Deserialize)]
struct RespondReq {
    decision: AccessDecision,
    /// Optional end of the grant; only valid when approving.
    #[serde(default)]
    expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[utoipa::path(
    post,
    path = "/requests/{id}/respond",
    params(("id" = String, Path, description = "Access request id")),
    responses(
        (status = 200, description = "Request resolved"),
        (status = 403, description = "Foreign or non-pending request"),
        (status = 404, description = "Unknown request")
    )
)]
/// Approves or rejects a pending request as the owning patient.
async fn respond(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<RespondReq>,
) -> Result<Json<AccessRequest>, ApiError> {
    let patient = session_from(&state, &headers)?.require_patient()?;
    let request_id = parse_request_id(&id)?;

    let resolved = state.ledger.respond(
        patient.patient_ref(),
        &request_id,
        req.decision,
        req.expires_at,
    )?;
    Ok(Json(resolved))
}

#[utoipa::path(
    post,
    path = "/requests/{id}/revoke",
    params(("id" = String, Path, description = "Access request id")),
    responses(
        (status = 200, description = "Grant revoked"),
        (status = 403, description = "Foreign request, or no grant to revoke"),
        (status = 404, description = "Unknown request")
    )
)]
/// Withdraws an approved grant as the owning patient.
async fn revoke(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<AccessRequest>, ApiError> {
    let patient = session_from(&state, &headers)?.require_patient()?;
    let request_id = parse_request_id(&id)?;

    let revoked = state.ledger.revoke(patient.patient_ref(), &request_id)?;
    Ok(Json(revoked))
}

/// One patient a doctor currently holds a grant for.
#[derive(Serialize)]
struct PatientSummary {
    patient_ref: PatientRef,
    name: String,
    email: String,
}

#[utoipa::path(
    get,
    path = "/patients",
    responses((status = 200, description = "Patients the calling doctor holds a grant for"))
)]
/// Lists the patients the calling doctor can currently read.
async fn my_patients(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<PatientSummary>>, ApiError> {
    let doctor = session_from(&state, &headers)?.require_doctor()?;

    let mut summaries = Vec::new();
    for patient_ref in state.ledger.granted_patients(doctor.doctor_ref())? {
        if let Some(patient) = state.directory.find_patient(&patient_ref)? {
            summaries.push(PatientSummary {
                patient_ref,
                name: format!("{} {}", patient.first_name, patient.last_name),
                email: patient.email,
            });
        }
    }
    Ok(Json(summaries))
}

#[utoipa::path(
    get,
    path = "/patients/{patient_ref}/records",
    params(("patient_ref" = String, Path, description = "Canonical patient reference")),
    responses(
        (status = 200, description = "The patient's record entries, newest visit first"),
        (status = 403, description = "No active grant")
    )
)]
/// Reads a patient's record as a granted doctor.
async fn read_patient_records(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(patient_ref): Path<String>,
) -> Result<Json<Vec<MedicalRecordEntry>>, ApiError> {
    let doctor = session_from(&state, &headers)?.require_doctor()?;
    let patient_ref = parse_patient_ref(&patient_ref)?;

    let records = state.gate.read_records(doctor.doctor_ref(), &patient_ref)?;
    Ok(Json(records))
}

#[utoipa::path(
    post,
    path = "/patients/{patient_ref}/records",
    params(("patient_ref" = String, Path, description = "Canonical patient reference")),
    responses(
        (status = 201, description = "Entry appended"),
        (status = 400, description = "Malformed entry data"),
        (status = 403, description = "No active grant")
    )
)]
/// Appends one record entry as a granted doctor.
async fn append_patient_record(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(patient_ref): Path<String>,
    Json(draft): Json<EntryDraft>,
) -> Result<(StatusCode, Json<MedicalRecordEntry>), ApiError> {
    let doctor = session_from(&state, &headers)?.require_doctor()?;
    let patient_ref = parse_patient_ref(&patient_ref)?;

    let entry = state
        .gate
        .append_record(doctor.doctor_ref(), &patient_ref, draft)?;
    Ok((StatusCode::CREATED, Json(entry)))
}

#[utoipa::path(
    get,
    path = "/me/records",
    responses((status = 200, description = "The calling patient's own record entries"))
)]
/// Reads the calling patient's own record. Always allowed.
async fn my_records(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<MedicalRecordEntry>>, ApiError> {
    let patient = session_from(&state, &headers)?.require_patient()?;
    let records = state.gate.read_own(patient.patient_ref())?;
    Ok(Json(records))
}

#[utoipa::path(
    get,
    path = "/me/profile",
    responses((status = 200, description = "The caller's directory record"))
)]
async fn get_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserRecord>, ApiError> {
    let record = match session_from(&state, &headers)? {
        Session::Patient(session) => UserRecord::Patient(session.patient),
        Session::Doctor(session) => UserRecord::Doctor(session.doctor),
    };
    Ok(Json(record))
}

#[utoipa::path(
    patch,
    path = "/me/profile",
    responses(
        (status = 200, description = "Profile updated"),
        (status = 400, description = "Malformed patch")
    )
)]
/// Partially updates the caller's profile.
///
/// Absent fields are kept, explicit nulls are cleared, values are set.
async fn patch_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<UserRecord>, ApiError> {
    match session_from(&state, &headers)? {
        Session::Patient(session) => {
            let patch: PatientProfilePatch = serde_json::from_value(body)
                .map_err(|e| ApiError::bad_request(format!("malformed patch: {e}")))?;
            let updated = state
                .directory
                .patch_patient_profile(session.patient_ref(), patch)?;
            Ok(Json(UserRecord::Patient(updated)))
        }
        Session::Doctor(session) => {
            let patch: DoctorProfilePatch = serde_json::from_value(body)
                .map_err(|e| ApiError::bad_request(format!("malformed patch: {e}")))?;
            let updated = state
                .directory
                .patch_doctor_profile(session.doctor_ref(), patch)?;
            Ok(Json(UserRecord::Doctor(updated)))
        }
    }
}

// ============================================================================
// WEBSOCKET NOTIFICATIONS
// ============================================================================

/// Upgrades to a notification channel for the verified caller.
///
/// The session joins the relay only after identity resolution succeeds; the
/// relay itself never trusts anything the socket sends.
async fn ws_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let session = match session_from(&state, &headers) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    let user = session.ref_id().clone();
    ws.on_upgrade(move |socket| relay_socket(state, user, socket))
}

/// Forwards relay notifications onto one socket until either side closes.
async fn relay_socket(state: AppState, user: RefId, mut socket: WebSocket) {
    let (session_id, mut rx) = state.relay.join(&user);
    tracing::debug!("{session_id} joined for {user}");

    loop {
        tokio::select! {
            notification = rx.recv() => {
                let Some(notification) = notification else { break };
                let Ok(text) = serde_json::to_string(&notification) else {
                    continue;
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                // Clients only listen on this channel; anything readable is
                // ignored, and close/error ends the session.
                match incoming {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }

    state.relay.leave(&user, session_id);
    tracing::debug!("{session_id} left for {user}");
}

fn parse_request_id(raw: &str) -> Result<RequestId, ApiError> {
    RequestId::parse(raw).map_err(|_| ApiError::bad_request("malformed request id"))
}

fn parse_patient_ref(raw: &str) -> Result<PatientRef, ApiError> {
    PatientRef::parse(raw).map_err(|_| ApiError::bad_request("malformed patient reference"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use medipass_core::profile::{DoctorProfile, PatientProfile};
    use medipass_core::store::memory::MemoryStore;
    use medipass_core::{DoctorUser, PatientUser};
    use medipass_ids::DoctorRef;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        patient: PatientRef,
        doctor: DoctorRef,
    }

    fn test_app() -> TestApp {
        let patient = PatientRef::generate();
        let doctor = DoctorRef::generate();

        let directory: Arc<dyn UserDirectory> = Arc::new(InMemoryDirectory::seeded([
            UserRecord::Patient(PatientUser {
                patient_ref: patient.clone(),
                email: "pat@example.org".into(),
                first_name: "Paule".into(),
                last_name: "Rivet".into(),
                phone: None,
                profile: PatientProfile::default(),
            }),
            UserRecord::Doctor(DoctorUser {
                doctor_ref: doctor.clone(),
                email: "doc@example.org".into(),
                first_name: "Nadia".into(),
                last_name: "Benali".into(),
                phone: None,
                profile: DoctorProfile::default(),
            }),
        ]));

        let store = Arc::new(MemoryStore::new());
        let relay = Arc::new(NotificationRelay::new(8));
        let request_store: Arc<dyn AccessRequestStore> = store.clone();
        let entry_store: Arc<dyn RecordEntryStore> = store;
        let ledger = Arc::new(AccessLedger::new(
            request_store,
            directory.clone(),
            relay.clone(),
        ));
        let gate = Arc::new(RecordGate::new(ledger.clone(), entry_store));

        TestApp {
            router: router(AppState {
                directory,
                ledger,
                gate,
                relay,
            }),
            patient,
            doctor,
        }
    }

    async fn send(
        app: &TestApp,
        method: &str,
        uri: &str,
        caller: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(caller) = caller {
            builder = builder.header(USER_HEADER, caller);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_health_is_open() {
        let app = test_app();
        let (status, body) = send(&app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn test_missing_identity_is_unauthorized() {
        let app = test_app();
        let (status, _) = send(&app, "GET", "/requests", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_patient_cannot_scan() {
        let app = test_app();
        let patient = app.patient.to_string();
        let (status, _) = send(
            &app,
            "POST",
            "/scan",
            Some(&patient),
            Some(serde_json::json!({"code": "MP1-whatever"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_garbage_code_is_unprocessable() {
        let app = test_app();
        let doctor = app.doctor.to_string();
        let (status, _) = send(
            &app,
            "POST",
            "/scan",
            Some(&doctor),
            Some(serde_json::json!({"code": "not a code"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_scan_approve_read_revoke_flow() {
        let app = test_app();
        let doctor = app.doctor.to_string();
        let patient = app.patient.to_string();

        // Patient fetches their code.
        let (status, body) = send(&app, "GET", "/me/code", Some(&patient), None).await;
        assert_eq!(status, StatusCode::OK);
        let code = body["code"].as_str().unwrap().to_owned();

        // Doctor scans it.
        let (status, body) = send(
            &app,
            "POST",
            "/scan",
            Some(&doctor),
            Some(serde_json::json!({"code": code, "reason": "ER admission"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["disposition"], "created");
        let request_id = body["request"]["id"].as_str().unwrap().to_owned();

        // Reading before approval fails closed.
        let records_uri = format!("/patients/{patient}/records");
        let (status, _) = send(&app, "GET", &records_uri, Some(&doctor), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // Patient sees and approves the request.
        let (status, body) = send(&app, "GET", "/requests", Some(&patient), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, _) = send(
            &app,
            "POST",
            &format!("/requests/{request_id}/respond"),
            Some(&patient),
            Some(serde_json::json!({"decision": "approved"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        // Doctor appends and reads.
        let (status, _) = send(
            &app,
            "POST",
            &records_uri,
            Some(&doctor),
            Some(serde_json::json!({
                "category": "consultation",
                "title": "Admission note",
                "notes": "Stable"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(&app, "GET", &records_uri, Some(&doctor), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        // Doctor shows up in the patient listing.
        let (status, body) = send(&app, "GET", "/patients", Some(&doctor), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["name"], "Paule Rivet");

        // Patient revokes; further reads fail closed.
        let (status, _) = send(
            &app,
            "POST",
            &format!("/requests/{request_id}/revoke"),
            Some(&patient),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, "GET", &records_uri, Some(&doctor), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // The patient still reads their own record.
        let (status, body) = send(&app, "GET", "/me/records", Some(&patient), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_profile_patch_clears_with_null() {
        let app = test_app();
        let patient = app.patient.to_string();

        let (status, body) = send(
            &app,
            "PATCH",
            "/me/profile",
            Some(&patient),
            Some(serde_json::json!({"blood_type": "O+", "city": "Lyon"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["profile"]["blood_type"], "O+");

        let (status, body) = send(
            &app,
            "PATCH",
            "/me/profile",
            Some(&patient),
            Some(serde_json::json!({"blood_type": null})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["profile"]["blood_type"].is_null());
        assert_eq!(body["profile"]["city"], "Lyon");
    }

    #[tokio::test]
    async fn test_respond_on_foreign_request_is_forbidden() {
        let app = test_app();
        let doctor = app.doctor.to_string();
        let patient = app.patient.to_string();

        let (_, body) = send(&app, "GET", "/me/code", Some(&patient), None).await;
        let code = body["code"].as_str().unwrap().to_owned();
        let (_, body) = send(
            &app,
            "POST",
            "/scan",
            Some(&doctor),
            Some(serde_json::json!({"code": code})),
        )
        .await;
        let request_id = body["request"]["id"].as_str().unwrap().to_owned();

        // The doctor cannot respond to the patient's request.
        let (status, _) = send(
            &app,
            "POST",
            &format!("/requests/{request_id}/respond"),
            Some(&doctor),
            Some(serde_json::json!({"decision": "approved"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
