use std::path::Path;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path as UrlPath, State},
    http::{header, HeaderValue, StatusCode},
    middleware,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::NaiveDate;
use panorama::domain::{
    booking::{Booking, BookingId, NewBooking},
    message::{Message, MessageId, NewMessage},
    validation::ValidationError,
    Entity, Id,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, services::ServeDir, set_header::SetResponseHeaderLayer};
use tracing::info;

use crate::{auth, error::ApiError, rate_limit, state::AppState};

const BODY_LIMIT: usize = 10 * 1024;

const CONTENT_SECURITY_POLICY: &str = "default-src 'self' https://maps.googleapis.com https://maps.gstatic.com; script-src 'self' 'unsafe-inline' https://maps.googleapis.com; style-src 'self' 'unsafe-inline'; img-src 'self' https: data:; font-src 'self' data:";

pub fn router(state: AppState, static_dir: Option<&Path>) -> Router {
    let admin = Router::new()
        .route("/clients", get(list_clients))
        .route("/clients/:id", delete(delete_client))
        .route("/messages", get(list_messages))
        .route("/messages/:id", delete(delete_message))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin,
        ));

    let api = Router::new()
        .route("/book", post(create_booking))
        .route("/available-dates", get(available_dates))
        .route("/admin-login", post(admin_login))
        .route("/contact", post(create_message))
        .nest("/admin", admin)
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit::limit));

    let mut app = Router::new()
        .nest("/api", api)
        .route("/_health", get(|| async { StatusCode::OK }));
    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(CorsLayer::permissive())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_XSS_PROTECTION,
            HeaderValue::from_static("1; mode=block"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(CONTENT_SECURITY_POLICY),
        ))
        .with_state(state)
}

/// 型の合わないフィールドも入力エラーとして 400 で返す
fn reject(rejection: JsonRejection) -> ApiError {
    let status = match rejection.status() {
        StatusCode::UNPROCESSABLE_ENTITY => StatusCode::BAD_REQUEST,
        status => status,
    };
    ApiError::Rejected(status, rejection.body_text())
}

/// 座標は数値でもフォームの文字列でも受け付ける
#[derive(Deserialize)]
#[serde(untagged)]
enum Coordinate {
    Number(f64),
    Text(String),
}

impl Coordinate {
    fn value(&self) -> Option<f64> {
        match self {
            Coordinate::Number(n) => Some(*n),
            Coordinate::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookingRequest {
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    service: Option<String>,
    date: Option<String>,
    location_lat: Option<Coordinate>,
    location_lng: Option<Coordinate>,
}

impl BookingRequest {
    fn validate(self) -> Result<NewBooking, ValidationError> {
        let (Some(name), Some(email), Some(phone), Some(service), Some(date), Some(lat), Some(lng)) = (
            self.name,
            self.email,
            self.phone,
            self.service,
            self.date,
            self.location_lat,
            self.location_lng,
        ) else {
            return Err(ValidationError::MissingFields);
        };
        if date.trim().is_empty() {
            return Err(ValidationError::MissingFields);
        }
        let date = parse_date(date.trim()).ok_or(ValidationError::InvalidDate)?;
        let lat = lat.value().ok_or(ValidationError::InvalidLocation)?;
        let lng = lng.value().ok_or(ValidationError::InvalidLocation)?;
        NewBooking::create(&name, &email, &phone, &service, date, lat, lng)
    }
}

/// `YYYY-MM-DD` のみ。`2025-6-1` のようなゼロ埋めなしは拒否する
fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .filter(|date| date.format("%Y-%m-%d").to_string() == s)
}

#[derive(Deserialize)]
struct MessageRequest {
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    message: Option<String>,
}

impl MessageRequest {
    fn validate(self) -> Result<NewMessage, ValidationError> {
        let (Some(name), Some(email), Some(phone), Some(message)) =
            (self.name, self.email, self.phone, self.message)
        else {
            return Err(ValidationError::MissingFields);
        };
        NewMessage::create(&name, &email, &phone, &message)
    }
}

#[derive(Deserialize)]
struct LoginRequest {
    username: Option<String>,
    password: Option<String>,
}

#[derive(Serialize)]
struct LoginResponse {
    success: bool,
    token: String,
}

#[derive(Serialize)]
struct BookingCreated {
    success: bool,
    booking: Booking,
}

#[derive(Serialize)]
struct MessageCreated {
    success: bool,
    message: Message,
}

#[derive(Serialize)]
struct Deleted<T> {
    success: bool,
    deleted: T,
}

#[derive(Serialize)]
struct AvailableDates {
    available: Vec<NaiveDate>,
}

#[derive(Serialize)]
struct Clients {
    clients: Vec<Booking>,
}

#[derive(Serialize)]
struct Messages {
    messages: Vec<Message>,
}

async fn create_booking(
    State(state): State<AppState>,
    payload: Result<Json<BookingRequest>, JsonRejection>,
) -> Result<Json<BookingCreated>, ApiError> {
    let Json(request) = payload.map_err(reject)?;
    let booking = request.validate()?;
    let booking = state.bookings.add(booking).await.map_err(|e| {
        if e.is_conflict() {
            ApiError::from(ValidationError::DateUnavailable)
        } else {
            ApiError::internal("Error creating booking")(e)
        }
    })?;
    info!("予約を登録しました: {} ({})", booking.id(), booking.date());
    Ok(Json(BookingCreated {
        success: true,
        booking,
    }))
}

async fn available_dates(State(state): State<AppState>) -> Result<Json<AvailableDates>, ApiError> {
    let available = state
        .availability
        .available_dates()
        .await
        .map_err(ApiError::internal("Error fetching available dates"))?;
    Ok(Json(AvailableDates { available }))
}

async fn create_message(
    State(state): State<AppState>,
    payload: Result<Json<MessageRequest>, JsonRejection>,
) -> Result<Json<MessageCreated>, ApiError> {
    let Json(request) = payload.map_err(reject)?;
    let message = request.validate()?;
    let message = state
        .messages
        .add(message)
        .await
        .map_err(ApiError::internal("Error creating message"))?;
    info!("お問い合わせを受け付けました: {}", message.id());
    Ok(Json(MessageCreated {
        success: true,
        message,
    }))
}

async fn admin_login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(request) = payload.map_err(reject)?;
    let username = request.username.unwrap_or_default();
    let password = request.password.unwrap_or_default();
    if !state.authenticator.authenticate(&username, &password).await {
        info!("管理者ログインに失敗しました");
        return Err(ApiError::Unauthorized("Invalid credentials"));
    }
    Ok(Json(LoginResponse {
        success: true,
        token: state.sessions.issue(),
    }))
}

async fn list_clients(State(state): State<AppState>) -> Result<Json<Clients>, ApiError> {
    let clients = state
        .bookings
        .list()
        .await
        .map_err(ApiError::internal("Error fetching clients"))?;
    Ok(Json(Clients { clients }))
}

async fn delete_client(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> Result<Json<Deleted<Booking>>, ApiError> {
    let id = BookingId::parse(&id).ok_or(ApiError::NotFound("Client not found"))?;
    let deleted = state
        .bookings
        .delete(id)
        .await
        .map_err(|e| ApiError::storage("Error deleting client", "Client not found", e))?;
    info!("予約を削除しました: {}", id);
    Ok(Json(Deleted {
        success: true,
        deleted,
    }))
}

async fn list_messages(State(state): State<AppState>) -> Result<Json<Messages>, ApiError> {
    let messages = state
        .messages
        .list()
        .await
        .map_err(ApiError::internal("Error fetching messages"))?;
    Ok(Json(Messages { messages }))
}

async fn delete_message(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> Result<Json<Deleted<Message>>, ApiError> {
    let id = MessageId::parse(&id).ok_or(ApiError::NotFound("Message not found"))?;
    let deleted = state
        .messages
        .delete(id)
        .await
        .map_err(|e| ApiError::storage("Error deleting message", "Message not found", e))?;
    info!("お問い合わせを削除しました: {}", id);
    Ok(Json(Deleted {
        success: true,
        deleted,
    }))
}
