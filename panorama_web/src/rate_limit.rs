use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::{error::ApiError, state::AppState};

// これを超えたら期限切れのエントリを削除する
const PRUNE_THRESHOLD: usize = 10_000;

struct Window {
    count: u32,
    reset_at: Instant,
}

/// クライアントアドレスごとの固定ウィンドウのリクエスト数
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    clients: Mutex<HashMap<IpAddr, Window>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// リクエストを数え、上限内かどうかを返す
    pub fn check(&self, ip: IpAddr) -> bool {
        self.check_at(ip, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, now: Instant) -> bool {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if clients.len() > PRUNE_THRESHOLD {
            clients.retain(|_, w| w.reset_at > now);
        }
        let window = clients.entry(ip).or_insert(Window {
            count: 0,
            reset_at: now + self.window,
        });
        if now > window.reset_at {
            window.count = 0;
            window.reset_at = now + self.window;
        }
        window.count = window.count.saturating_add(1);
        window.count <= self.max_requests
    }
}

pub async fn limit<B>(
    State(state): State<AppState>,
    request: Request<B>,
    next: Next<B>,
) -> Result<Response, ApiError> {
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    if !state.rate_limiter.check(ip) {
        warn!("レート制限を超えました: {}", ip);
        return Err(ApiError::TooManyRequests);
    }
    Ok(next.run(request).await)
}
