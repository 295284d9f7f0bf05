// Watchlist Mirror - HTTP server
// Routes: /update (trigger refresh), /state (refresh status), /get_names (search)

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use watchlist_mirror::{
    NameHit, NameMatcher, RefreshOutcome, RefreshState, SdnXmlFeed, SearchMode, Settings,
    SyncCoordinator, WatchlistStore,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    coordinator: Arc<SyncCoordinator>,
    store: Arc<Mutex<WatchlistStore>>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Refresh result
#[derive(Serialize)]
struct RefreshResponse {
    inserted: usize,
    updated: usize,
    skipped: usize,
}

/// Status response
#[derive(Serialize)]
struct StateResponse {
    state: RefreshState,
    #[serde(skip_serializing_if = "Option::is_none")]
    populated: Option<bool>,
}

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    name: String,

    #[serde(default, rename = "type")]
    mode: String,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /update - trigger a refresh run
async fn update(State(state): State<AppState>) -> impl IntoResponse {
    let coordinator = state.coordinator.clone();
    let outcome = tokio::task::spawn_blocking(move || coordinator.trigger_refresh()).await;

    match outcome {
        Ok(RefreshOutcome::Completed(summary)) => (
            StatusCode::OK,
            Json(ApiResponse::ok(RefreshResponse {
                inserted: summary.inserted,
                updated: summary.updated,
                skipped: summary.skipped,
            })),
        )
            .into_response(),
        Ok(RefreshOutcome::AlreadyInProgress) => (
            StatusCode::OK,
            Json(ApiResponse::<RefreshResponse>::err(
                "refresh already in progress",
            )),
        )
            .into_response(),
        Ok(RefreshOutcome::Failed(cause)) => (
            StatusCode::OK,
            Json(ApiResponse::<RefreshResponse>::err(cause.to_string())),
        )
            .into_response(),
        Err(e) => {
            // the guard is released by scope even when the task dies
            error!("refresh task failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::<RefreshResponse>::err("service unavailable")),
            )
                .into_response()
        }
    }
}

/// GET /state - refresh status, plus whether the mirror holds anything yet
async fn refresh_state(State(state): State<AppState>) -> impl IntoResponse {
    if state.coordinator.state() == RefreshState::Busy {
        return (
            StatusCode::OK,
            Json(ApiResponse::ok(StateResponse {
                state: RefreshState::Busy,
                populated: None,
            })),
        )
            .into_response();
    }

    let store = state.store.clone();
    let count = tokio::task::spawn_blocking(move || -> anyhow::Result<i64> {
        let store = store
            .lock()
            .map_err(|_| anyhow::anyhow!("store lock poisoned"))?;
        store.count()
    })
    .await;

    match count {
        Ok(Ok(count)) => (
            StatusCode::OK,
            Json(ApiResponse::ok(StateResponse {
                state: RefreshState::Idle,
                populated: Some(count > 0),
            })),
        )
            .into_response(),
        Ok(Err(e)) => {
            error!("state query failed: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<StateResponse>::err(e.to_string())),
            )
                .into_response()
        }
        Err(e) => {
            error!("state task failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::<StateResponse>::err("service unavailable")),
            )
                .into_response()
        }
    }
}

/// GET /get_names?name=<q>&type=<mode> - search the mirror
async fn get_names(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> impl IntoResponse {
    let mode = SearchMode::from_param(&params.mode);
    let store = state.store.clone();
    let name = params.name;

    let hits = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<NameHit>> {
        let store = store
            .lock()
            .map_err(|_| anyhow::anyhow!("store lock poisoned"))?;
        NameMatcher::new().search(&store, &name, mode)
    })
    .await;

    match hits {
        Ok(Ok(hits)) => (StatusCode::OK, Json(hits)).into_response(),
        Ok(Err(e)) => {
            error!("search failed: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<Vec<NameHit>>::err(e.to_string())),
            )
                .into_response()
        }
        Err(e) => {
            error!("search task failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::<Vec<NameHit>>::err("service unavailable")),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter("watchlist_mirror=info,tower_http=debug")
        .init();

    let settings = Settings::from_env();

    let store = match WatchlistStore::open(&settings.database_path) {
        Ok(store) => store,
        Err(e) => {
            eprintln!(
                "❌ Failed to open database {:?}: {:#}",
                settings.database_path, e
            );
            std::process::exit(1);
        }
    };
    info!("database opened: {:?}", settings.database_path);

    let store = Arc::new(Mutex::new(store));
    let feed = SdnXmlFeed::new(settings.feed_url.clone());
    let coordinator = Arc::new(SyncCoordinator::new(Box::new(feed), store.clone()));

    let state = AppState { coordinator, store };

    let app = Router::new()
        .route("/update", get(update))
        .route("/state", get(refresh_state))
        .route("/get_names", get(get_names))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", settings.port);
    info!("watchlist mirror listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
