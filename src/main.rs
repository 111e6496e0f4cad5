//! Book Extractor - HTTP front for the page-photo extraction pipeline.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use book_extractor::config::PipelineConfig;
use book_extractor::extractor::Orchestrator;
use book_extractor::ocr::tesseract::TesseractRecognizer;
use book_extractor::ocr::OcrLanguages;
use book_extractor::pattern::lexicon::Lexicon;
use book_extractor::pattern::PatternExtractor;
use book_extractor::pipeline::{enqueue_new_book, BookJob, BookPipeline};
use book_extractor::queue::ProcessingQueue;
use book_extractor::rectify::ContourRectifier;
use book_extractor::schema::{BookRecord, RawCapture, Role};
use book_extractor::semantic::HttpSemanticExtractor;
use book_extractor::store::{BookStore, MemoryBookStore};
use book_extractor::PipelineError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    store: Arc<MemoryBookStore>,
    queue: Arc<ProcessingQueue<BookJob>>,
    semantic: Arc<HttpSemanticExtractor>,
    default_languages: String,
}

impl AppState {
    fn languages(&self, hint: Option<&str>) -> OcrLanguages {
        OcrLanguages::parse(hint, &self.default_languages)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "book_extractor=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = PipelineConfig::from_env()?;

    let lexicon = match &config.lexicon_path {
        Some(path) => Lexicon::load_from_file(path)?,
        None => Lexicon::default(),
    };

    let store = Arc::new(MemoryBookStore::new());
    let semantic = Arc::new(HttpSemanticExtractor::new(config.semantic.clone())?);
    let pipeline = BookPipeline::new(
        store.clone(),
        Arc::new(ContourRectifier::new(config.rectifier.clone())),
        Arc::new(TesseractRecognizer::new(config.ocr.clone())),
        Orchestrator::new(semantic.clone(), PatternExtractor::new(lexicon)),
    );
    let queue = Arc::new(ProcessingQueue::start(Arc::new(pipeline), config.queue_capacity));
    info!("Pipeline initialized");

    let state = AppState {
        store,
        queue: queue.clone(),
        semantic,
        default_languages: config.ocr.default_languages.clone(),
    };

    // Build router
    let app = Router::new()
        .route("/health", get(health))
        .route("/books", post(create_book))
        .route("/books/reprocess", post(reprocess_many))
        .route("/books/:id", get(get_book))
        .route("/books/:id/reprocess", post(reprocess_book))
        .route("/queue", get(queue_status))
        .layer(DefaultBodyLimit::max(50 * 1024 * 1024)) // 50MB of photos
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Run server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Server listening on http://{}", config.bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Draining {} queued jobs", queue.pending());
    queue.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}

// ============================================================================
// Handlers
// ============================================================================

type ApiError = (StatusCode, String);

fn api_error(e: PipelineError) -> ApiError {
    let status = match &e {
        PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
        PipelineError::QueueFull { .. } | PipelineError::QueueClosed => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        PipelineError::Decode(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    semantic_service: bool,
    queue_pending: usize,
}

/// Health check endpoint.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        semantic_service: state.semantic.is_healthy().await,
        queue_pending: state.queue.pending(),
    })
}

#[derive(Serialize)]
struct Accepted {
    id: Uuid,
    status: &'static str,
}

/// Upload page photos (`cover`, `back`, repeated `info`) and queue extraction.
async fn create_book(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Accepted>), ApiError> {
    let mut captures = Vec::new();
    let mut language: Option<String> = None;
    let mut info_pages = 0u32;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e))
    })? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "language" {
            language = Some(field.text().await.map_err(|e| {
                (StatusCode::BAD_REQUEST, format!("Failed to read language: {}", e))
            })?);
            continue;
        }

        let Some(role) = Role::from_field(&name) else {
            warn!("Ignoring unknown multipart field '{}'", name);
            continue;
        };
        let data = field.bytes().await.map_err(|e| {
            (StatusCode::BAD_REQUEST, format!("Failed to read {}: {}", name, e))
        })?.to_vec();
        if data.is_empty() {
            continue;
        }

        let capture = RawCapture::new(role, data);
        captures.push(if role == Role::InfoPage {
            info_pages += 1;
            capture.with_page_index(info_pages)
        } else {
            capture
        });
    }

    if captures.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No page photos uploaded".to_string()));
    }

    let record = BookRecord::new(captures);
    info!("Received book {} with {} captures", record.id, record.captures.len());
    let id = enqueue_new_book(
        state.store.as_ref(),
        &state.queue,
        record,
        state.languages(language.as_deref()),
    )
    .await
    .map_err(api_error)?;

    Ok((StatusCode::ACCEPTED, Json(Accepted { id, status: "queued" })))
}

/// Get a book by ID.
async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookRecord>, ApiError> {
    state
        .store
        .load(id)
        .await
        .map_err(api_error)?
        .map(Json)
        .ok_or_else(|| api_error(PipelineError::NotFound(id)))
}

#[derive(Deserialize)]
struct LanguageQuery {
    language: Option<String>,
}

/// Re-run extraction for a stored book.
async fn reprocess_book(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<LanguageQuery>,
) -> Result<(StatusCode, Json<Accepted>), ApiError> {
    if state.store.load(id).await.map_err(api_error)?.is_none() {
        return Err(api_error(PipelineError::NotFound(id)));
    }
    let job = BookJob {
        book_id: id,
        languages: state.languages(query.language.as_deref()),
    };
    state.queue.submit(job).map_err(api_error)?;
    info!("Book {} queued for reprocessing", id);
    Ok((StatusCode::ACCEPTED, Json(Accepted { id, status: "queued" })))
}

#[derive(Deserialize)]
struct ReprocessRequest {
    ids: Vec<Uuid>,
    language: Option<String>,
}

#[derive(Serialize)]
struct ReprocessResult {
    id: Uuid,
    accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Queue several stored books; reports acceptance per ID.
async fn reprocess_many(
    State(state): State<AppState>,
    Json(request): Json<ReprocessRequest>,
) -> Json<Vec<ReprocessResult>> {
    let mut results = Vec::with_capacity(request.ids.len());
    for id in request.ids {
        let outcome = match state.store.load(id).await {
            Ok(Some(_)) => state.queue.submit(BookJob {
                book_id: id,
                languages: state.languages(request.language.as_deref()),
            }),
            Ok(None) => Err(PipelineError::NotFound(id)),
            Err(e) => Err(e),
        };
        results.push(match outcome {
            Ok(()) => ReprocessResult { id, accepted: true, error: None },
            Err(e) => ReprocessResult { id, accepted: false, error: Some(e.to_string()) },
        });
    }
    let accepted = results.iter().filter(|r| r.accepted).count();
    info!("Bulk reprocess: {}/{} books queued", accepted, results.len());
    Json(results)
}

#[derive(Serialize)]
struct QueueStatus {
    pending: usize,
    capacity: usize,
}

async fn queue_status(State(state): State<AppState>) -> Json<QueueStatus> {
    Json(QueueStatus {
        pending: state.queue.pending(),
        capacity: state.queue.capacity(),
    })
}
