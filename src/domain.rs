pub mod availability;
pub mod booking;
pub mod message;
pub mod validation;

use serde::{Deserialize, Serialize};
use snowflake::SnowflakeIdGenerator;
use std::{
    error::Error,
    fmt::{Debug, Display},
    ops::Deref,
    str::FromStr,
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

pub trait Id:
    Copy
    + Eq
    + Deref<Target = Self::Inner>
    + From<Self::Inner>
    + Display
    + Debug
    + Serialize
    + for<'de> Deserialize<'de>
{
    type Inner: FromStr;

    /// JSONやURLで使う文字列表現から変換する
    fn parse(s: &str) -> Option<Self> {
        s.parse::<Self::Inner>().ok().map(Self::from)
    }
}

pub trait Entity {
    type Id: Id;

    const ENTITY_NAME: &'static str;

    fn id(&self) -> Self::Id;
}

#[derive(Error, Debug)]
pub enum DataAccessError {
    #[error("Database connection error: {0}")]
    ConnectionError(Box<dyn Error + Send + Sync>),
    #[error("Database query error: {0}")]
    QueryError(Box<dyn Error + Send + Sync>),
    #[error("Data read error: {0}")]
    ReadError(Box<dyn Error + Send + Sync>),
    #[error("Data write error: {0}")]
    WriteError(Box<dyn Error + Send + Sync>),
    #[error("Client side error: {0}")]
    ClientSideError(Box<dyn Error + Send + Sync>),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{entity} conflicts with an existing record: {reason}")]
    Conflict { entity: &'static str, reason: String },
}

impl DataAccessError {
    pub fn not_found<E: Entity>(id: E::Id) -> Self {
        Self::NotFound {
            entity: E::ENTITY_NAME,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn conflict<E: Entity>(reason: impl Into<String>) -> Self {
        Self::Conflict {
            entity: E::ENTITY_NAME,
            reason: reason.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

pub struct IdGenerator(SnowflakeIdGenerator);

impl IdGenerator {
    pub fn new(gen: SnowflakeIdGenerator) -> Self {
        Self(gen)
    }

    pub fn generate(&mut self) -> u64 {
        self.0.generate() as u64
    }
}

impl From<SnowflakeIdGenerator> for IdGenerator {
    fn from(value: SnowflakeIdGenerator) -> Self {
        Self::new(value)
    }
}

/// 単一の生成タスクからIDを払い出す。同時に呼ばれても重複しない
#[derive(Clone)]
pub struct IdGeneratorTask {
    _handle: Arc<JoinHandle<()>>,
    sender: mpsc::Sender<oneshot::Sender<u64>>,
}

impl IdGeneratorTask {
    /// tokioランタイム内で呼ぶこと
    pub fn spawn(mut gen: IdGenerator) -> Self {
        let (tx_async, mut rx_async) = mpsc::channel::<oneshot::Sender<u64>>(100);
        let handle = tokio::spawn(async move {
            while let Some(tx) = rx_async.recv().await {
                // 要求元が既にいなければ何もしない
                let _ = tx.send(gen.generate());
            }
        });
        Self {
            _handle: Arc::new(handle),
            sender: tx_async,
        }
    }

    pub fn with_node(machine_id: i32, node_id: i32) -> Self {
        Self::spawn(SnowflakeIdGenerator::new(machine_id, node_id).into())
    }

    pub async fn generate<T>(&self) -> Result<T, DataAccessError>
    where
        T: From<u64>,
    {
        let (tx, rx) = oneshot::channel::<u64>();
        self.sender
            .send(tx)
            .await
            .map_err(|_| DataAccessError::ClientSideError("id generator stopped".into()))?;
        rx.await
            .map(T::from)
            .map_err(|e| DataAccessError::ClientSideError(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[tokio::test]
    async fn test_generated_ids_are_unique() {
        let ids = IdGeneratorTask::with_node(1, 1);
        let handles = (0..8)
            .map(|_| {
                let ids = ids.clone();
                tokio::spawn(async move {
                    let mut out = Vec::new();
                    for _ in 0..200 {
                        out.push(ids.generate::<u64>().await.unwrap());
                    }
                    out
                })
            })
            .collect::<Vec<_>>();
        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.await.unwrap() {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 1600);
    }

    #[test]
    fn test_not_found_error() {
        let error = DataAccessError::NotFound {
            entity: "booking",
            id: "42".to_owned(),
        };
        assert!(error.is_not_found());
        assert_eq!(error.to_string(), "booking 42 not found");
        assert!(!DataAccessError::ReadError("boom".into()).is_not_found());

        let error = DataAccessError::Conflict {
            entity: "booking",
            reason: "2025-06-01 is already booked".to_owned(),
        };
        assert!(error.is_conflict());
        assert!(!error.is_not_found());
        assert_eq!(
            error.to_string(),
            "booking conflicts with an existing record: 2025-06-01 is already booked"
        );
    }
}
