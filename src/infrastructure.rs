mod json_file;
mod sqlite;

use std::{io, sync::Arc};

use tracing::info;

use crate::domain::booking::BookingRepository;
use crate::domain::message::MessageRepository;
use crate::domain::{DataAccessError, IdGeneratorTask};
use crate::{Backend, StoreConfig};

pub use self::json_file::*;
pub use self::sqlite::*;

/// 設定で選択したストアによる予約とお問い合わせのリポジトリ
#[derive(Clone)]
pub struct Stores {
    pub bookings: Arc<dyn BookingRepository>,
    pub messages: Arc<dyn MessageRepository>,
}

pub async fn open(config: &StoreConfig, ids: IdGeneratorTask) -> Result<Stores, DataAccessError> {
    match config.backend {
        Backend::Json => {
            let store = Arc::new(JsonFileStore::open(&config.data_dir, ids).await?);
            info!("JSONストアを開きました: {}", config.data_dir.display());
            Ok(Stores {
                bookings: store.clone(),
                messages: store,
            })
        }
        Backend::Sqlite => {
            let store = Arc::new(SqliteStore::open(&config.sqlite_path, ids)?);
            info!("SQLiteストアを開きました: {}", config.sqlite_path.display());
            Ok(Stores {
                bookings: store.clone(),
                messages: store,
            })
        }
    }
}

impl From<io::Error> for DataAccessError {
    fn from(value: io::Error) -> Self {
        match value.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                Self::ConnectionError(Box::new(value))
            }
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
                Self::ReadError(Box::new(value))
            }
            _ => Self::WriteError(Box::new(value)),
        }
    }
}

impl From<serde_json::Error> for DataAccessError {
    fn from(value: serde_json::Error) -> Self {
        match value.classify() {
            serde_json::error::Category::Io => Self::WriteError(Box::new(value)),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => Self::ReadError(Box::new(value)),
        }
    }
}

impl From<rusqlite::Error> for DataAccessError {
    fn from(value: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(e, _) = &value {
            if matches!(
                e.code,
                rusqlite::ErrorCode::CannotOpen
                    | rusqlite::ErrorCode::NotADatabase
                    | rusqlite::ErrorCode::DatabaseBusy
                    | rusqlite::ErrorCode::DatabaseLocked
            ) {
                return Self::ConnectionError(Box::new(value));
            }
        }
        match value {
            rusqlite::Error::QueryReturnedNoRows
            | rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::IntegralValueOutOfRange(..) => Self::ReadError(Box::new(value)),
            rusqlite::Error::ToSqlConversionFailure(_) => Self::WriteError(Box::new(value)),
            _ => Self::QueryError(Box::new(value)),
        }
    }
}

impl From<tokio::task::JoinError> for DataAccessError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::ClientSideError(Box::new(value))
    }
}
