use crate::coordinator::{Coordinator, TicketStatusView};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use queue_proto::display::{DailyStats, TvView};
use queue_proto::error::QueueError;
use queue_proto::receipt::PrintRecord;
use queue_proto::ticket::{ServiceType, Ticket, TicketFilter, TicketId, TicketStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

#[derive(Clone)]
struct HttpState {
    coordinator: Arc<Coordinator>,
}

/// JSON error body.  `error` is the typed error, `message` the text a
/// front desk screen shows.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub error: Option<QueueError>,
    pub message: String,
}

enum ApiError {
    Queue(QueueError),
    BadRequest(String),
}

impl From<QueueError> for ApiError {
    fn from(e: QueueError) -> Self {
        ApiError::Queue(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Queue(e) => {
                let status = match &e {
                    QueueError::NotFound { .. } | QueueError::NoTicketsWaiting => {
                        StatusCode::NOT_FOUND
                    }
                    QueueError::InvalidTransition { .. } | QueueError::CounterBusy { .. } => {
                        StatusCode::CONFLICT
                    }
                    QueueError::SequencerUnavailable { .. } | QueueError::PersistenceError { .. } => {
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                };
                let body = ApiErrorBody {
                    message: e.user_message(),
                    error: Some(e),
                };
                (status, Json(body)).into_response()
            }
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(ApiErrorBody {
                    error: None,
                    message,
                }),
            )
                .into_response(),
        }
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn parse_service(raw: &str) -> Result<ServiceType, ApiError> {
    raw.parse().map_err(ApiError::BadRequest)
}

fn parse_ticket_id(raw: &str) -> Result<TicketId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid ticket id: {raw}")))
}

pub fn router(coordinator: Arc<Coordinator>) -> Router {
    let app_state = HttpState { coordinator };

    Router::new()
        .route("/api/tickets", get(list_tickets).post(issue_ticket))
        .route("/api/tickets/:id", get(ticket_status))
        .route("/api/tickets/:id/receipt", get(ticket_receipt))
        .route("/api/display/tv", get(tv_display))
        .route("/api/display/counter/:service", get(counter_display))
        .route("/api/stats/:service", get(stats))
        .route("/api/counters/:counter/call-next", post(call_next))
        .route("/api/counters/:counter/recall", post(recall))
        .route("/api/counters/:counter/hold", post(hold))
        .route("/api/counters/:counter/complete", post(complete))
        .route("/api/counters/:counter/cancel", post(cancel))
        .route(
            "/api/counters/:counter/recall-from-hold/:id",
            post(recall_from_hold),
        )
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(app_state)
}

pub fn start_server(
    bind_address: String,
    port: u16,
    coordinator: Arc<Coordinator>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(coordinator);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

// ── Tickets ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    /// Comma separated statuses.
    status: Option<String>,
    service: Option<String>,
}

async fn list_tickets(
    State(state): State<HttpState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<Ticket>> {
    let mut filter = TicketFilter::all();
    if let Some(raw) = query.status.as_deref().filter(|s| !s.is_empty()) {
        filter.statuses = raw
            .split(',')
            .map(|s| s.parse::<TicketStatus>())
            .collect::<Result<_, _>>()
            .map_err(ApiError::BadRequest)?;
    }
    if let Some(raw) = query.service.as_deref().filter(|s| !s.is_empty()) {
        filter.service = Some(parse_service(raw)?);
    }
    Ok(Json(state.coordinator.list(&filter).await?))
}

#[derive(Debug, Deserialize)]
struct IssueBody {
    service: String,
}

async fn issue_ticket(
    State(state): State<HttpState>,
    Json(body): Json<IssueBody>,
) -> Result<(StatusCode, Json<Ticket>), ApiError> {
    let service = parse_service(&body.service)?;
    info!("HTTP API: issue {}", service);
    let ticket = state.coordinator.issue_ticket(service).await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

async fn ticket_status(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> ApiResult<TicketStatusView> {
    let id = parse_ticket_id(&id)?;
    Ok(Json(state.coordinator.ticket_status(id).await?))
}

async fn ticket_receipt(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> ApiResult<PrintRecord> {
    let id = parse_ticket_id(&id)?;
    let ticket = state.coordinator.get_ticket(id).await?;
    Ok(Json(PrintRecord::for_ticket(
        &ticket,
        &state.coordinator.settings().public_base_url,
    )))
}

// ── Displays ─────────────────────────────────────────────────────────────────

async fn tv_display(State(state): State<HttpState>) -> ApiResult<TvView> {
    Ok(Json(state.coordinator.tv_view().await?))
}

async fn counter_display(
    State(state): State<HttpState>,
    Path(service): Path<String>,
) -> ApiResult<Vec<Ticket>> {
    let service = parse_service(&service)?;
    Ok(Json(state.coordinator.counter_list(service).await?))
}

async fn stats(
    State(state): State<HttpState>,
    Path(service): Path<String>,
) -> ApiResult<DailyStats> {
    let service = parse_service(&service)?;
    Ok(Json(state.coordinator.stats(service).await?))
}

// ── Counter operations ───────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct CallNextBody {
    service: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CurrentTicketBody {
    ticket_id: TicketId,
}

async fn call_next(
    State(state): State<HttpState>,
    Path(counter): Path<u32>,
    body: Option<Json<CallNextBody>>,
) -> ApiResult<Ticket> {
    let requested = body.and_then(|Json(b)| b.service);
    let service = match requested.as_deref() {
        Some(raw) => parse_service(raw)?,
        None => state
            .coordinator
            .settings()
            .counters
            .iter()
            .find(|c| c.number == counter)
            .map(|c| c.service)
            .ok_or_else(|| {
                ApiError::BadRequest(format!("counter {counter} has no default service"))
            })?,
    };
    info!("HTTP API: counter {} call next {}", counter, service);
    Ok(Json(state.coordinator.call_next(counter, service).await?))
}

async fn recall(
    State(state): State<HttpState>,
    Path(counter): Path<u32>,
    Json(body): Json<CurrentTicketBody>,
) -> ApiResult<Ticket> {
    Ok(Json(state.coordinator.recall(counter, body.ticket_id).await?))
}

async fn hold(
    State(state): State<HttpState>,
    Path(counter): Path<u32>,
    Json(body): Json<CurrentTicketBody>,
) -> ApiResult<Ticket> {
    Ok(Json(state.coordinator.hold(counter, body.ticket_id).await?))
}

async fn complete(
    State(state): State<HttpState>,
    Path(counter): Path<u32>,
    Json(body): Json<CurrentTicketBody>,
) -> ApiResult<Ticket> {
    Ok(Json(state.coordinator.complete(counter, body.ticket_id).await?))
}

async fn cancel(
    State(state): State<HttpState>,
    Path(counter): Path<u32>,
    Json(body): Json<CurrentTicketBody>,
) -> ApiResult<Ticket> {
    Ok(Json(state.coordinator.cancel(counter, body.ticket_id).await?))
}

async fn recall_from_hold(
    State(state): State<HttpState>,
    Path((counter, id)): Path<(u32, String)>,
) -> ApiResult<Ticket> {
    let id = parse_ticket_id(&id)?;
    Ok(Json(state.coordinator.recall_from_hold(counter, id).await?))
}
