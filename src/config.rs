use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub clinic_name: String,
    pub schedule_path: String,
    pub faq_path: String,
    pub llm_provider: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub booking_horizon_days: i64,
    pub session_ttl_minutes: i64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "frontdesk.db".to_string()),
            clinic_name: env::var("CLINIC_NAME")
                .unwrap_or_else(|_| "HealthCare Plus Clinic".to_string()),
            schedule_path: env::var("SCHEDULE_PATH")
                .unwrap_or_else(|_| "data/clinic_hours.json".to_string()),
            faq_path: env::var("FAQ_PATH").unwrap_or_else(|_| "data/clinic_faq.json".to_string()),
            llm_provider: env::var("LLM_PROVIDER").unwrap_or_else(|_| "ollama".to_string()),
            gemini_api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-flash".to_string()),
            ollama_url: env::var("OLLAMA_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            ollama_model: env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string()),
            booking_horizon_days: env::var("BOOKING_HORIZON_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(crate::services::booking::DEFAULT_HORIZON_DAYS),
            session_ttl_minutes: env::var("SESSION_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(crate::services::registry::DEFAULT_SESSION_TTL_MINUTES),
        }
    }
}
