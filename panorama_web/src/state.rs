use std::{sync::Arc, time::Duration};

use panorama::{
    domain::{
        availability::{Availability, Clock},
        booking::BookingRepository,
        message::MessageRepository,
    },
    infrastructure::Stores,
    PanoramaConfig,
};

use crate::{
    auth::{AdminAuthenticator, AdminSessions, ConfiguredAdmin},
    rate_limit::RateLimiter,
};

// 1年
const MAX_SESSION_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// リクエストハンドラが共有する状態
#[derive(Clone)]
pub struct AppState {
    pub bookings: Arc<dyn BookingRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub availability: Availability,
    pub authenticator: Arc<dyn AdminAuthenticator>,
    pub sessions: Arc<AdminSessions>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn from_config(stores: Stores, clock: Arc<dyn Clock>, config: &PanoramaConfig) -> Self {
        Self {
            availability: Availability::new(
                stores.bookings.clone(),
                clock,
                config.availability.horizon_days,
            ),
            bookings: stores.bookings,
            messages: stores.messages,
            authenticator: Arc::new(ConfiguredAdmin::new(
                config.admin.username.clone(),
                config.admin.password.clone(),
            )),
            sessions: Arc::new(AdminSessions::new(session_ttl(
                config.admin.session_ttl_minutes,
            ))),
            rate_limiter: Arc::new(RateLimiter::new(
                config.rate_limit.max_requests,
                Duration::from_secs(config.rate_limit.window_secs),
            )),
        }
    }
}

fn session_ttl(minutes: u64) -> Duration {
    Duration::from_secs(minutes.saturating_mul(60)).min(MAX_SESSION_TTL)
}
