use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_more::{Deref, Display, From};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use crate::domain::validation::{
    require, sanitize_str, validate_email, validate_phone, ValidationError,
};
use crate::domain::{DataAccessError, Entity, Id};

/// お問い合わせリポジトリ
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn add(&self, message: NewMessage) -> Result<Message, DataAccessError>;
    /// 新しい順
    async fn list(&self) -> Result<Vec<Message>, DataAccessError>;
    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, DataAccessError>;
    async fn delete(&self, id: MessageId) -> Result<Message, DataAccessError>;
}

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
pub struct MessageId(#[serde_as(as = "DisplayFromStr")] u64);

impl Id for MessageId {
    type Inner = u64;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) phone: String,
    pub(crate) message: String,
}

impl NewMessage {
    pub fn create(
        name: &str,
        email: &str,
        phone: &str,
        message: &str,
    ) -> Result<Self, ValidationError> {
        for field in [name, email, phone, message] {
            require(field)?;
        }
        if !validate_email(email) {
            return Err(ValidationError::InvalidEmail);
        }
        if !validate_phone(phone) {
            return Err(ValidationError::InvalidPhone);
        }
        Ok(Self {
            name: sanitize_str(name),
            email: sanitize_str(email),
            phone: sanitize_str(phone),
            message: sanitize_str(message),
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

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    #[serde(flatten)]
    details: NewMessage,
    created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(id: MessageId, details: NewMessage, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            details,
            created_at,
        }
    }

    pub fn details(&self) -> &NewMessage {
        &self.details
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Entity for Message {
    type Id = MessageId;

    const ENTITY_NAME: &'static str = "message";

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// 作成日時の降順、同時刻ならIDの降順
pub fn sort_messages(messages: &mut [Message]) {
    messages.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then(b.id.cmp(&a.id))
    });
}
