use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use axum::{
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// 管理者セッションを開けるかユーザー名とパスワードで判定する
#[async_trait]
pub trait AdminAuthenticator: Send + Sync {
    async fn authenticate(&self, username: &str, password: &str) -> bool;
}

/// 設定から読み込んだ単一の管理者アカウント
pub struct ConfiguredAdmin {
    username: String,
    password: Option<String>,
}

impl ConfiguredAdmin {
    pub fn new(username: String, password: Option<String>) -> Self {
        Self { username, password }
    }
}

#[async_trait]
impl AdminAuthenticator for ConfiguredAdmin {
    async fn authenticate(&self, username: &str, password: &str) -> bool {
        match &self.password {
            Some(expected) => {
                constant_time_eq(username.as_bytes(), self.username.as_bytes())
                    & constant_time_eq(password.as_bytes(), expected.as_bytes())
            }
            None => false,
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// 管理者ログインで発行したBearerトークン
pub struct AdminSessions {
    ttl: Duration,
    tokens: Mutex<HashMap<String, Instant>>,
}

impl AdminSessions {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    pub fn issue(&self) -> String {
        let now = Instant::now();
        let token = Uuid::new_v4().simple().to_string();
        let mut tokens = self.tokens.lock().unwrap_or_else(PoisonError::into_inner);
        tokens.retain(|_, expires| *expires > now);
        tokens.insert(token.clone(), now + self.ttl);
        token
    }

    pub fn is_valid(&self, token: &str) -> bool {
        let now = Instant::now();
        let mut tokens = self.tokens.lock().unwrap_or_else(PoisonError::into_inner);
        match tokens.get(token).copied() {
            Some(expires) if expires > now => true,
            Some(_) => {
                tokens.remove(token);
                false
            }
            None => false,
        }
    }
}

pub async fn require_admin<B>(
    State(state): State<AppState>,
    request: Request<B>,
    next: Next<B>,
) -> Result<Response, ApiError> {
    let authorized = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| state.sessions.is_valid(token.trim()))
        .unwrap_or(false);
    if !authorized {
        return Err(ApiError::Unauthorized("Unauthorized"));
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_configured_admin() {
        let admin = ConfiguredAdmin::new("admin".to_owned(), Some("s3cret".to_owned()));
        assert!(admin.authenticate("admin", "s3cret").await);
        assert!(!admin.authenticate("admin", "wrong").await);
        assert!(!admin.authenticate("root", "s3cret").await);
        assert!(!admin.authenticate("admin", "").await);

        let disabled = ConfiguredAdmin::new("admin".to_owned(), None);
        assert!(!disabled.authenticate("admin", "").await);
    }

    #[test]
    fn test_sessions() {
        let sessions = AdminSessions::new(Duration::from_secs(60));
        let token = sessions.issue();
        assert_eq!(token.len(), 32);
        assert!(sessions.is_valid(&token));
        assert!(!sessions.is_valid("nope"));
        assert_ne!(sessions.issue(), token);
    }

    #[test]
    fn test_sessions_expire() {
        let sessions = AdminSessions::new(Duration::ZERO);
        let token = sessions.issue();
        assert!(!sessions.is_valid(&token));
    }
}
