use std::{
    collections::HashSet,
    path::Path,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::domain::booking::{date_taken, Booking, BookingId, BookingRepository, NewBooking};
use crate::domain::message::{Message, MessageId, MessageRepository, NewMessage};
use crate::domain::{DataAccessError, IdGeneratorTask};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS bookings (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL,
        phone TEXT NOT NULL,
        service TEXT NOT NULL,
        date TEXT NOT NULL,
        location_lat REAL NOT NULL,
        location_lng REAL NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_bookings_date ON bookings(date);
    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL,
        phone TEXT NOT NULL,
        message TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_messages_created_at ON messages(created_at);
";

const BOOKING_COLUMNS: &str =
    "id, name, email, phone, service, date, location_lat, location_lng, created_at";

const MESSAGE_COLUMNS: &str = "id, name, email, phone, message, created_at";

/// 各操作は単一のSQL文で実行する。同日の予約は `INSERT ... WHERE NOT EXISTS` で弾く
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    ids: IdGeneratorTask,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P, ids: IdGeneratorTask) -> Result<Self, DataAccessError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::with_connection(Connection::open(path)?, ids)
    }

    pub fn in_memory(ids: IdGeneratorTask) -> Result<Self, DataAccessError> {
        Self::with_connection(Connection::open_in_memory()?, ids)
    }

    fn with_connection(conn: Connection, ids: IdGeneratorTask) -> Result<Self, DataAccessError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            ids,
        })
    }

    async fn call<F, T>(&self, f: F) -> Result<T, DataAccessError>
    where
        F: FnOnce(&Connection) -> Result<T, DataAccessError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| DataAccessError::ConnectionError("sqlite connection poisoned".into()))?;
            f(&conn)
        })
        .await?
    }
}

fn sql_id(id: u64) -> i64 {
    // snowflake のIDは i64 の範囲に収まる
    id as i64
}

fn booking_from_row(row: &Row) -> rusqlite::Result<Booking> {
    let id: i64 = row.get(0)?;
    Ok(Booking::new(
        BookingId::from(id as u64),
        NewBooking {
            name: row.get(1)?,
            email: row.get(2)?,
            phone: row.get(3)?,
            service: row.get(4)?,
            date: row.get(5)?,
            location_lat: row.get(6)?,
            location_lng: row.get(7)?,
        },
        row.get(8)?,
    ))
}

fn message_from_row(row: &Row) -> rusqlite::Result<Message> {
    let id: i64 = row.get(0)?;
    Ok(Message::new(
        MessageId::from(id as u64),
        NewMessage {
            name: row.get(1)?,
            email: row.get(2)?,
            phone: row.get(3)?,
            message: row.get(4)?,
        },
        row.get(5)?,
    ))
}

#[async_trait]
impl BookingRepository for SqliteStore {
    async fn add(&self, booking: NewBooking) -> Result<Booking, DataAccessError> {
        let id = self.ids.generate::<BookingId>().await?;
        let booking = Booking::new(id, booking, Utc::now());
        let record = booking.clone();
        self.call(move |conn| {
            let d = record.details();
            let (lat, lng) = d.location();
            let inserted = conn.execute(
                "INSERT INTO bookings (id, name, email, phone, service, date, location_lat, location_lng, created_at)
                 SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9
                 WHERE NOT EXISTS (SELECT 1 FROM bookings WHERE date = ?6)",
                params![
                    sql_id(*id),
                    d.name(),
                    d.email(),
                    d.phone(),
                    d.service(),
                    d.date(),
                    lat,
                    lng,
                    record.created_at(),
                ],
            )?;
            if inserted == 0 {
                return Err(date_taken(d.date()));
            }
            Ok(())
        })
        .await?;
        Ok(booking)
    }

    async fn list(&self) -> Result<Vec<Booking>, DataAccessError> {
        self.call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings ORDER BY date ASC, created_at ASC"
            ))?;
            let bookings = stmt
                .query_map([], booking_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(bookings)
        })
        .await
    }

    async fn find_by_id(&self, id: BookingId) -> Result<Option<Booking>, DataAccessError> {
        self.call(move |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
                    params![sql_id(*id)],
                    booking_from_row,
                )
                .optional()?)
        })
        .await
    }

    async fn delete(&self, id: BookingId) -> Result<Booking, DataAccessError> {
        self.call(move |conn| {
            conn.query_row(
                &format!("DELETE FROM bookings WHERE id = ?1 RETURNING {BOOKING_COLUMNS}"),
                params![sql_id(*id)],
                booking_from_row,
            )
            .optional()?
            .ok_or_else(|| DataAccessError::not_found::<Booking>(id))
        })
        .await
    }

    async fn booked_dates(&self) -> Result<HashSet<NaiveDate>, DataAccessError> {
        self.call(|conn| {
            let mut stmt = conn.prepare("SELECT DISTINCT date FROM bookings")?;
            let dates = stmt
                .query_map([], |row| row.get::<_, NaiveDate>(0))?
                .collect::<rusqlite::Result<HashSet<_>>>()?;
            Ok(dates)
        })
        .await
    }
}

#[async_trait]
impl MessageRepository for SqliteStore {
    async fn add(&self, message: NewMessage) -> Result<Message, DataAccessError> {
        let id = self.ids.generate::<MessageId>().await?;
        let message = Message::new(id, message, Utc::now());
        let record = message.clone();
        self.call(move |conn| {
            let d = record.details();
            conn.execute(
                "INSERT INTO messages (id, name, email, phone, message, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    sql_id(*id),
                    d.name(),
                    d.email(),
                    d.phone(),
                    d.message(),
                    record.created_at(),
                ],
            )?;
            Ok(())
        })
        .await?;
        Ok(message)
    }

    async fn list(&self) -> Result<Vec<Message>, DataAccessError> {
        self.call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages ORDER BY created_at DESC, id DESC"
            ))?;
            let messages = stmt
                .query_map([], message_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(messages)
        })
        .await
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, DataAccessError> {
        self.call(move |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                    params![sql_id(*id)],
                    message_from_row,
                )
                .optional()?)
        })
        .await
    }

    async fn delete(&self, id: MessageId) -> Result<Message, DataAccessError> {
        self.call(move |conn| {
            conn.query_row(
                &format!("DELETE FROM messages WHERE id = ?1 RETURNING {MESSAGE_COLUMNS}"),
                params![sql_id(*id)],
                message_from_row,
            )
            .optional()?
            .ok_or_else(|| DataAccessError::not_found::<Message>(id))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::domain::Entity;
    use crate::infrastructure::testing;

    fn store() -> SqliteStore {
        SqliteStore::in_memory(IdGeneratorTask::with_node(1, 1)).unwrap()
    }

    #[tokio::test]
    async fn test_booking_repository() {
        testing::booking_repository_contract(&store()).await;
    }

    #[tokio::test]
    async fn test_message_repository() {
        testing::message_repository_contract(&store()).await;
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("panorama.db");
        let message = {
            let store = SqliteStore::open(&path, IdGeneratorTask::with_node(1, 1)).unwrap();
            MessageRepository::add(&store, testing::new_message("hello"))
                .await
                .unwrap()
        };
        let reopened = SqliteStore::open(&path, IdGeneratorTask::with_node(1, 1)).unwrap();
        assert_eq!(
            MessageRepository::find_by_id(&reopened, message.id())
                .await
                .unwrap(),
            Some(message)
        );
    }

    #[tokio::test]
    async fn test_booked_dates_are_distinct() {
        let store = store();
        for date in ["2025-06-01", "2025-06-02"] {
            BookingRepository::add(&store, testing::new_booking(date))
                .await
                .unwrap();
        }
        // 制約導入前に書かれた同日の重複行
        store
            .call(|conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO bookings ({BOOKING_COLUMNS})
                         SELECT -id, name, email, phone, service, date, location_lat, location_lng, created_at
                         FROM bookings WHERE date = '2025-06-01'"
                    ),
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(BookingRepository::list(&store).await.unwrap().len(), 3);
        let dates = BookingRepository::booked_dates(&store).await.unwrap();
        assert_eq!(dates.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_one_booking_per_date_under_contention() {
        testing::one_booking_per_date_contract(Arc::new(store())).await;
    }
}
