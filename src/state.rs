use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::ai::LlmProvider;
use crate::services::availability::AvailabilityResolver;
use crate::services::booking::BookingManager;
use crate::services::calendar::CalendarStore;
use crate::services::faq::FaqProvider;
use crate::services::registry::SessionRegistry;

pub struct AppState {
    pub config: AppConfig,
    pub calendar: Arc<CalendarStore>,
    pub resolver: AvailabilityResolver,
    pub bookings: BookingManager,
    pub sessions: SessionRegistry,
    pub llm: Box<dyn LlmProvider>,
    pub faq: Box<dyn FaqProvider>,
}
