use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use derive_more::{Deref, Display, From};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use crate::domain::validation::{
    require, sanitize_str, validate_email, validate_phone, ValidationError,
};
use crate::domain::{DataAccessError, Entity, Id};

/// 予約リポジトリ
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// 予約を登録し、IDと作成日時を付与する。同じ日付の予約があれば `DataAccessError::Conflict`
    async fn add(&self, booking: NewBooking) -> Result<Booking, DataAccessError>;
    /// 全予約を日付の昇順で取得する
    async fn list(&self) -> Result<Vec<Booking>, DataAccessError>;
    /// IDで予約を検索する
    async fn find_by_id(&self, id: BookingId) -> Result<Option<Booking>, DataAccessError>;
    /// 予約を削除し、削除した予約を返す。存在しなければ `DataAccessError::NotFound`
    async fn delete(&self, id: BookingId) -> Result<Booking, DataAccessError>;
    /// 予約済みの日付
    async fn booked_dates(&self) -> Result<HashSet<NaiveDate>, DataAccessError>;
}

/// 予約ID
#[serde_as]
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    From,
    Deref,
    Default,
)]
pub struct BookingId(#[serde_as(as = "DisplayFromStr")] u64);

impl Id for BookingId {
    type Inner = u64;
}

/// 予約の入力内容
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewBooking {
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) phone: String,
    pub(crate) service: String,
    pub(crate) date: NaiveDate,
    #[serde(rename = "locationLat")]
    pub(crate) location_lat: f64,
    #[serde(rename = "locationLng")]
    pub(crate) location_lng: f64,
}

impl NewBooking {
    /// 入力を検証し、自由入力欄からタグ記号を取り除く
    pub fn create(
        name: &str,
        email: &str,
        phone: &str,
        service: &str,
        date: NaiveDate,
        location_lat: f64,
        location_lng: f64,
    ) -> Result<Self, ValidationError> {
        Self::validate_created(name, email, phone, service)?;
        Self::validate_location(location_lat, location_lng)?;
        Ok(Self {
            name: sanitize_str(name),
            email: sanitize_str(email),
            phone: sanitize_str(phone),
            service: sanitize_str(service),
            date,
            location_lat,
            location_lng,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn location(&self) -> (f64, f64) {
        (self.location_lat, self.location_lng)
    }

    fn validate_created(
        name: &str,
        email: &str,
        phone: &str,
        service: &str,
    ) -> Result<(), ValidationError> {
        for field in [name, email, phone, service] {
            require(field)?;
        }
        if !validate_email(email) {
            return Err(ValidationError::InvalidEmail);
        }
        if !validate_phone(phone) {
            return Err(ValidationError::InvalidPhone);
        }
        Ok(())
    }

    fn validate_location(lat: f64, lng: f64) -> Result<(), ValidationError> {
        if !(lat.is_finite() && lng.is_finite()) {
            return Err(ValidationError::InvalidLocation);
        }
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(ValidationError::InvalidLocation);
        }
        Ok(())
    }
}

/// 予約エンティティ
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    id: BookingId,
    #[serde(flatten)]
    details: NewBooking,
    created_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(id: BookingId, details: NewBooking, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            details,
            created_at,
        }
    }

    pub fn details(&self) -> &NewBooking {
        &self.details
    }

    pub fn date(&self) -> NaiveDate {
        self.details.date
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Entity for Booking {
    type Id = BookingId;

    const ENTITY_NAME: &'static str = "booking";

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// 同じ日付の予約が既にあれば競合エラー
pub fn ensure_date_free(existing: &[Booking], booking: &Booking) -> Result<(), DataAccessError> {
    if existing.iter().any(|b| b.date() == booking.date()) {
        return Err(date_taken(booking.date()));
    }
    Ok(())
}

pub(crate) fn date_taken(date: NaiveDate) -> DataAccessError {
    DataAccessError::conflict::<Booking>(format!("{date} is already booked"))
}

/// 日付の昇順、同日なら作成順
pub fn sort_bookings(bookings: &mut [Booking]) {
    bookings.sort_by(|a, b| {
        a.date()
            .cmp(&b.date())
            .then(a.created_at.cmp(&b.created_at))
    });
}
