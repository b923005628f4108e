use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use cut_allocator::config::Config;
use cut_allocator::logging;
use cut_allocator::planner::SheetRun;
use cut_allocator::store::SqliteStore;
use cut_allocator::types::{CuttingPlan, OrderId, ProductDemand, Rect, ShortageRecord, SupplyRequest};
use cut_allocator::{
    CancelToken, ErrorKind, InventoryReconciler, LogSink, ReconcileError, Reconciliation,
    Settings, SheetCuttingPlanner, StoreError, SupplyRequestFactory,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

#[derive(Clone)]
struct AppState {
    store: Arc<Mutex<SqliteStore>>,
    settings: Settings,
}

type ApiError = (StatusCode, String);

#[derive(Deserialize, Serialize)]
struct PlanRequest {
    sheet: Rect,
    #[serde(default = "default_supply")]
    supply: u32,
    cuts: Vec<ProductDemand>,
}

fn default_supply() -> u32 {
    1
}

#[derive(Serialize)]
struct PlanResponse {
    sheet: Rect,
    sheets_used: u32,
    plans: Vec<CuttingPlan>,
    outstanding: Vec<ProductDemand>,
}

impl PlanResponse {
    fn new(sheet: Rect, run: SheetRun) -> Self {
        Self {
            sheet,
            sheets_used: run.sheets_used,
            outstanding: run.outstanding().cloned().collect(),
            plans: run.plans,
        }
    }
}

#[derive(Default, Deserialize, Serialize)]
struct SupplyBody {
    #[serde(default)]
    shortages: Vec<ShortageRecord>,
    /// Request every current shortage instead of a confirmed list.
    #[serde(default)]
    all: bool,
}

#[derive(Serialize)]
struct SupplyResponse {
    order: OrderId,
    requests: Vec<SupplyRequest>,
}

/// Cancels the pass if the client goes away before it starts writing.
struct CancelOnDrop(CancelToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

fn api_error(err: ReconcileError) -> ApiError {
    let status = match (&err, err.kind()) {
        (ReconcileError::Store(StoreError::NotFound { .. }), _) => StatusCode::NOT_FOUND,
        (_, ErrorKind::InvalidTransition) | (_, ErrorKind::Cancelled) => StatusCode::CONFLICT,
        (_, ErrorKind::DataAccess) => {
            sentry::capture_error(&err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

/// A pass that panicked rolled its transaction back, so the store behind a
/// poisoned lock is still consistent.
fn lock_store<T>(store: &Mutex<T>) -> MutexGuard<'_, T> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs `f` against the store on the blocking pool, one pass at a time.
async fn with_store<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&mut SqliteStore, Settings) -> Result<T, ReconcileError> + Send + 'static,
{
    let store = Arc::clone(&state.store);
    let settings = state.settings;
    tokio::task::spawn_blocking(move || {
        let mut guard = lock_store(&store);
        f(&mut guard, settings)
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
    .map_err(api_error)
}

async fn plan(Json(req): Json<PlanRequest>) -> Result<Json<PlanResponse>, ApiError> {
    tracing::info!(
        body = serde_json::to_string(&req).unwrap_or_default(),
        "POST /plan"
    );

    if req.sheet.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "sheet dimensions must be non-zero".to_string(),
        ));
    }
    if let Some(d) = req.cuts.iter().find(|d| d.size.is_empty() || d.qty == 0) {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("cut '{}' needs non-zero dimensions and quantity", d.product),
        ));
    }

    let run = SheetCuttingPlanner::new("request", 0, req.sheet).plan(req.supply, &req.cuts);
    Ok(Json(PlanResponse::new(req.sheet, run)))
}

async fn reconcile(
    State(state): State<AppState>,
    Path(order): Path<OrderId>,
) -> Result<Json<Reconciliation>, ApiError> {
    tracing::info!(order, "POST /orders/{{id}}/reconcile");

    let guard = CancelOnDrop(CancelToken::new());
    let token = guard.0.clone();
    let rec = with_store(&state, move |store, settings| {
        InventoryReconciler::new(settings).reconcile_with(store, order, &token, &mut LogSink)
    })
    .await?;
    Ok(Json(rec))
}

async fn request_supply(
    State(state): State<AppState>,
    Path(order): Path<OrderId>,
    body: Bytes,
) -> Result<Json<SupplyResponse>, ApiError> {
    let body: SupplyBody = if body.is_empty() {
        SupplyBody::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    };
    tracing::info!(
        order,
        body = serde_json::to_string(&body).unwrap_or_default(),
        "POST /orders/{{id}}/supply-requests"
    );

    if body.all && !body.shortages.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "give either shortages or all, not both".to_string(),
        ));
    }
    if !body.all && body.shortages.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "confirm at least one shortage or set all".to_string(),
        ));
    }

    let requests = with_store(&state, move |store, settings| {
        let factory = SupplyRequestFactory::new(settings);
        if body.all {
            factory.create_all_requests(store, order, &mut LogSink)
        } else {
            factory.create_requests(store, order, &body.shortages, &mut LogSink)
        }
    })
    .await?;
    Ok(Json(SupplyResponse { order, requests }))
}

fn open_store(config: &Config) -> Result<SqliteStore, StoreError> {
    let store = SqliteStore::open(&config.database)?;
    store.init_schema()?;
    Ok(store)
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    match &config.log_file {
        Some(path) => {
            if let Err(e) = logging::init_to_file(path, &config.log_level) {
                eprintln!("Error: cannot open {}: {}", path.display(), e);
                std::process::exit(1);
            }
        }
        None => logging::init(&config.log_level),
    }

    let _sentry = config.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    let store = open_store(&config).unwrap_or_else(|e| {
        eprintln!("Error: {}: {}", config.database.display(), e);
        std::process::exit(1);
    });
    let state = AppState {
        store: Arc::new(Mutex::new(store)),
        settings: config.settings(),
    };

    let app = Router::new()
        .route("/up", get(|| async { "ok" }))
        .route("/plan", post(plan))
        .route("/orders/{id}/reconcile", post(reconcile))
        .route("/orders/{id}/supply-requests", post(request_supply))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap_or_else(|e| {
        eprintln!("Error: cannot bind {addr}: {e}");
        std::process::exit(1);
    });
    eprintln!("Listening on {addr}");
    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
