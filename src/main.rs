use std::sync::{Arc, Mutex};

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use frontdesk::config::AppConfig;
use frontdesk::db;
use frontdesk::handlers;
use frontdesk::models::WorkingHours;
use frontdesk::services::ai::gemini::GeminiProvider;
use frontdesk::services::ai::ollama::OllamaProvider;
use frontdesk::services::ai::LlmProvider;
use frontdesk::services::availability::AvailabilityResolver;
use frontdesk::services::booking::BookingManager;
use frontdesk::services::calendar::CalendarStore;
use frontdesk::services::faq::clinic_docs::ClinicDocs;
use frontdesk::services::registry::SessionRegistry;
use frontdesk::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;
    let hours = WorkingHours::load(&config.schedule_path)?;
    tracing::info!(hours = %hours.to_human_readable(), "loaded working hours");

    let llm: Box<dyn LlmProvider> = match config.llm_provider.as_str() {
        "gemini" => {
            anyhow::ensure!(
                !config.gemini_api_key.is_empty(),
                "GEMINI_API_KEY must be set when LLM_PROVIDER=gemini"
            );
            tracing::info!("using Gemini LLM provider (model: {})", config.gemini_model);
            Box::new(GeminiProvider::new(
                config.gemini_api_key.clone(),
                config.gemini_model.clone(),
            ))
        }
        _ => {
            tracing::info!("using Ollama LLM provider (url: {})", config.ollama_url);
            Box::new(OllamaProvider::new(
                config.ollama_url.clone(),
                config.ollama_model.clone(),
            ))
        }
    };

    let faq = ClinicDocs::load(&config.faq_path)?;

    let calendar = Arc::new(CalendarStore::new(Arc::new(Mutex::new(conn)), hours));
    let state = Arc::new(AppState {
        resolver: AvailabilityResolver::new(Arc::clone(&calendar)),
        bookings: BookingManager::with_horizon(Arc::clone(&calendar), config.booking_horizon_days),
        sessions: SessionRegistry::new(config.session_ttl_minutes),
        calendar,
        llm,
        faq: Box::new(faq),
        config: config.clone(),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/chat", post(handlers::chat::chat))
        .route(
            "/api/schedule/availability",
            get(handlers::schedule::get_availability),
        )
        .route("/api/schedule/book", post(handlers::schedule::book))
        .route(
            "/api/schedule/bookings/:id/cancel",
            post(handlers::schedule::cancel),
        )
        .route("/calendar/:booking_id", get(handlers::calendar::download_ics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
