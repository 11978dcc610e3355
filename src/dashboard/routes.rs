//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::engine::{FlightRunner, RunRequest, RunSummary, SniperReport};
use crate::logging::LogBuffer;
use crate::notify::{offer_message, Notifier};
use crate::providers::PriceLookup;
use crate::storage::alerts::NewAlert;
use crate::storage::{AlertStore, JsonlOfferStore, TargetsFile};
use crate::types::{DatePair, FixedAlert, FlightError, Offer, ScanMode};

const DEFAULT_OFFER_LIMIT: usize = 100;
const MAX_OFFER_LIMIT: usize = 1000;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub agent_name: String,
    pub started_at: DateTime<Utc>,
    pub runner: Arc<FlightRunner>,
    pub lookup: Arc<dyn PriceLookup>,
    pub offers: Arc<JsonlOfferStore>,
    pub alerts: Arc<AlertStore>,
    pub logs: LogBuffer,
}

impl DashboardState {
    pub fn new(
        agent_name: &str,
        runner: Arc<FlightRunner>,
        lookup: Arc<dyn PriceLookup>,
        offers: Arc<JsonlOfferStore>,
        alerts: Arc<AlertStore>,
        logs: LogBuffer,
    ) -> Self {
        Self {
            agent_name: agent_name.to_string(),
            started_at: Utc::now(),
            runner,
            lookup,
            offers,
            alerts,
            logs,
        }
    }

    fn notifier(&self) -> Result<&Arc<dyn Notifier>, ApiError> {
        self.runner
            .notifier()
            .ok_or_else(|| ApiError::Unavailable("no notification channel configured".into()))
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ApiError {
    Busy,
    NotFound(String),
    BadRequest(String),
    /// A required integration is not configured.
    Unavailable(String),
    /// An upstream API (provider, messaging) failed.
    Upstream(String),
    Internal(anyhow::Error),
}

impl From<FlightError> for ApiError {
    fn from(err: FlightError) -> Self {
        match err {
            FlightError::RunInProgress => ApiError::Busy,
            FlightError::AlertNotFound(id) => ApiError::NotFound(format!("alert {id} not found")),
            FlightError::InvalidTarget(msg) => ApiError::BadRequest(msg),
            FlightError::Lookup { provider, message } => ApiError::Upstream(format!("{provider}: {message}")),
            FlightError::Notify { channel, message } => ApiError::Upstream(format!("{channel}: {message}")),
            other => ApiError::Internal(other.into()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<FlightError>() {
            Ok(flight) => flight.into(),
            Err(other) => ApiError::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Busy => (StatusCode::CONFLICT, FlightError::RunInProgress.to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            ApiError::Upstream(msg) => {
                warn!(error = %msg, "Upstream call failed");
                (StatusCode::BAD_GATEWAY, msg.clone())
            }
            ApiError::Internal(err) => {
                error!(error = %err, "Dashboard request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub agent: String,
    /// RUNNING, PAUSED or IDLE
    pub status: String,
    pub running: bool,
    pub paused: bool,
    pub runs_started: u64,
    pub uptime_secs: i64,
    pub offers_recorded: usize,
    pub last_run: Option<RunSummary>,
    pub last_sniper: Option<SniperReport>,
    pub next_auto_run: Option<DateTime<Utc>>,
    pub next_sniper_run: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct OffersQuery {
    pub limit: Option<usize>,
}

/// Body of `POST /api/run`. An empty body means an auto run.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum RunBody {
    Auto,
    Manual {
        destinations: Vec<String>,
        depart: NaiveDate,
        #[serde(rename = "return", default)]
        return_date: Option<NaiveDate>,
    },
}

impl RunBody {
    fn into_request(self) -> Result<RunRequest, ApiError> {
        match self {
            RunBody::Auto => Ok(RunRequest::Auto),
            RunBody::Manual {
                destinations,
                depart,
                return_date,
            } => {
                if destinations.iter().all(|d| d.trim().is_empty()) {
                    return Err(ApiError::BadRequest("no destinations given".into()));
                }
                if return_date.is_some_and(|r| r < depart) {
                    return Err(ApiError::BadRequest("return date is before departure".into()));
                }
                Ok(RunRequest::Manual {
                    destinations,
                    dates: DatePair { depart, return_date },
                })
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunAccepted {
    pub run_number: u64,
    pub mode: ScanMode,
}

#[derive(Debug, Clone, Serialize)]
pub struct PauseResponse {
    pub paused: bool,
}

/// Result of a connectivity check or a manual send.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResponse {
    pub ok: bool,
    pub channel: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogsResponse {
    pub lines: Vec<String>,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let control = state.runner.control();
    let running = control.is_running();
    let paused = control.is_paused();
    let status = if running {
        "RUNNING"
    } else if paused {
        "PAUSED"
    } else {
        "IDLE"
    };

    Ok(Json(StatusResponse {
        agent: state.agent_name.clone(),
        status: status.to_string(),
        running,
        paused,
        runs_started: control.runs_started(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        offers_recorded: state.offers.count()?,
        last_run: control.last_run().await,
        last_sniper: control.last_sniper().await,
        next_auto_run: control.next_auto().await,
        next_sniper_run: control.next_sniper().await,
    }))
}

/// GET /api/offers?limit=N (newest first)
pub async fn get_offers(
    State(state): State<AppState>,
    Query(query): Query<OffersQuery>,
) -> Result<Json<Vec<Offer>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_OFFER_LIMIT).min(MAX_OFFER_LIMIT);
    let mut offers = state.offers.load_recent(limit)?;
    offers.reverse();
    Ok(Json(offers))
}

/// GET /api/alerts
pub async fn get_alerts(State(state): State<AppState>) -> Result<Json<Vec<FixedAlert>>, ApiError> {
    Ok(Json(state.alerts.list().await?))
}

/// POST /api/alerts
pub async fn create_alert(
    State(state): State<AppState>,
    Json(new): Json<NewAlert>,
) -> Result<(StatusCode, Json<FixedAlert>), ApiError> {
    let alert = state.alerts.add(new).await?;
    Ok((StatusCode::CREATED, Json(alert)))
}

/// DELETE /api/alerts/:id
pub async fn delete_alert(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.alerts.remove(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/run: starts a run in the background.
pub async fn post_run(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<RunAccepted>), ApiError> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        RunRequest::Auto
    } else {
        serde_json::from_slice::<RunBody>(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid run request: {e}")))?
            .into_request()?
    };

    let ticket = state.runner.control().try_begin()?;
    let accepted = RunAccepted {
        run_number: ticket.number(),
        mode: request.mode(),
    };
    info!(run = accepted.run_number, mode = %accepted.mode, "Run requested from dashboard");

    let runner = state.runner.clone();
    let today = chrono::Local::now().date_naive();
    tokio::spawn(async move {
        if let Err(e) = runner.run(ticket, request, today).await {
            warn!(error = %e, "Dashboard-triggered run failed");
        }
    });

    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// GET /api/destinations: configured targets plus airport names.
pub async fn get_destinations(State(state): State<AppState>) -> Result<Json<TargetsFile>, ApiError> {
    Ok(Json(state.runner.targets()?))
}

/// POST /api/check/provider: forces a fresh credential exchange.
pub async fn check_provider(State(state): State<AppState>) -> Result<Json<CheckResponse>, ApiError> {
    let provider = state.lookup.name().to_string();
    state
        .lookup
        .check_credentials()
        .await
        .map_err(|e| ApiError::Upstream(format!("{provider}: {e:#}")))?;
    info!(provider = %provider, "Provider credentials OK");
    Ok(Json(CheckResponse {
        ok: true,
        channel: provider,
    }))
}

/// POST /api/check/notifier: sends a test message.
pub async fn check_notifier(State(state): State<AppState>) -> Result<Json<CheckResponse>, ApiError> {
    let notifier = state.notifier()?;
    notifier
        .send(&format!("✅ {} test message", state.agent_name))
        .await?;
    Ok(Json(CheckResponse {
        ok: true,
        channel: notifier.name().to_string(),
    }))
}

/// POST /api/notify/offer: pushes one offer to the notification channel.
pub async fn notify_offer(
    State(state): State<AppState>,
    Json(offer): Json<Offer>,
) -> Result<Json<CheckResponse>, ApiError> {
    let notifier = state.notifier()?;
    // Airport names are cosmetic; an unreadable targets file only loses them
    let airports = state.runner.targets().unwrap_or_default();
    notifier.send(&offer_message(&offer, Some(&airports))).await?;
    info!(offer = %offer, "Offer sent from dashboard");
    Ok(Json(CheckResponse {
        ok: true,
        channel: notifier.name().to_string(),
    }))
}

/// GET /api/logs: recent log lines, oldest first.
pub async fn get_logs(State(state): State<AppState>) -> Json<LogsResponse> {
    Json(LogsResponse {
        lines: state.logs.lines(),
    })
}

/// POST /api/scheduler/pause: toggles the pause flag.
pub async fn toggle_pause(State(state): State<AppState>) -> Json<PauseResponse> {
    let paused = state.runner.control().toggle_pause();
    info!(paused, "Scheduler pause toggled");
    Json(PauseResponse { paused })
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
