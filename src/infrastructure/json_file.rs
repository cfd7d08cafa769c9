use std::{
    collections::HashSet,
    io,
    marker::PhantomData,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tokio::{fs, io::AsyncWriteExt, sync::Mutex};

use crate::domain::booking::{
    ensure_date_free, sort_bookings, Booking, BookingId, BookingRepository, NewBooking,
};
use crate::domain::message::{sort_messages, Message, MessageId, MessageRepository, NewMessage};
use crate::domain::{DataAccessError, Entity, IdGeneratorTask};

/// コレクションごとに1つのJSON配列。変更のたびに全体を書き直す
pub struct JsonFileStore {
    bookings: Collection<Booking>,
    messages: Collection<Message>,
    ids: IdGeneratorTask,
}

impl JsonFileStore {
    pub async fn open<P: AsRef<Path>>(dir: P, ids: IdGeneratorTask) -> Result<Self, DataAccessError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).await?;
        Ok(Self {
            bookings: Collection::open(dir.join("bookings.json")).await?,
            messages: Collection::open(dir.join("messages.json")).await?,
            ids,
        })
    }
}

struct Collection<T> {
    path: PathBuf,
    // 読み込みから書き込みまで保持する
    lock: Mutex<()>,
    _records: PhantomData<T>,
}

impl<T> Collection<T>
where
    T: Entity + Clone + Serialize + DeserializeOwned + Send,
{
    async fn open(path: PathBuf) -> Result<Self, DataAccessError> {
        let collection = Self {
            path,
            lock: Mutex::new(()),
            _records: PhantomData,
        };
        match fs::metadata(&collection.path).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => collection.write(&[]).await?,
            Err(e) => return Err(e.into()),
        }
        Ok(collection)
    }

    async fn read(&self) -> Result<Vec<T>, DataAccessError> {
        let bytes = fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// 一時ファイルに書き込み、同期してから本体へリネームする
    async fn write(&self, records: &[T]) -> Result<(), DataAccessError> {
        let tmp = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&serde_json::to_vec_pretty(records)?).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// `check` は既存レコードを見て登録を拒否できる。ロック内で呼ばれる
    async fn insert<F>(&self, record: T, check: F) -> Result<T, DataAccessError>
    where
        F: FnOnce(&[T], &T) -> Result<(), DataAccessError> + Send,
    {
        let _guard = self.lock.lock().await;
        let mut all = self.read().await?;
        check(&all, &record)?;
        all.push(record.clone());
        self.write(&all).await?;
        Ok(record)
    }

    async fn find(&self, id: T::Id) -> Result<Option<T>, DataAccessError> {
        Ok(self.read().await?.into_iter().find(|r| r.id() == id))
    }

    async fn remove(&self, id: T::Id) -> Result<T, DataAccessError> {
        let _guard = self.lock.lock().await;
        let mut all = self.read().await?;
        let index = all
            .iter()
            .position(|r| r.id() == id)
            .ok_or_else(|| DataAccessError::not_found::<T>(id))?;
        let removed = all.remove(index);
        self.write(&all).await?;
        Ok(removed)
    }
}

#[async_trait]
impl BookingRepository for JsonFileStore {
    async fn add(&self, booking: NewBooking) -> Result<Booking, DataAccessError> {
        let id = self.ids.generate::<BookingId>().await?;
        self.bookings
            .insert(Booking::new(id, booking, Utc::now()), ensure_date_free)
            .await
    }

    async fn list(&self) -> Result<Vec<Booking>, DataAccessError> {
        let mut all = self.bookings.read().await?;
        sort_bookings(&mut all);
        Ok(all)
    }

    async fn find_by_id(&self, id: BookingId) -> Result<Option<Booking>, DataAccessError> {
        self.bookings.find(id).await
    }

    async fn delete(&self, id: BookingId) -> Result<Booking, DataAccessError> {
        self.bookings.remove(id).await
    }

    async fn booked_dates(&self) -> Result<HashSet<NaiveDate>, DataAccessError> {
        Ok(self
            .bookings
            .read()
            .await?
            .iter()
            .map(Booking::date)
            .collect())
    }
}

#[async_trait]
impl MessageRepository for JsonFileStore {
    async fn add(&self, message: NewMessage) -> Result<Message, DataAccessError> {
        let id = self.ids.generate::<MessageId>().await?;
        self.messages
            .insert(Message::new(id, message, Utc::now()), |_, _| Ok(()))
            .await
    }

    async fn list(&self) -> Result<Vec<Message>, DataAccessError> {
        let mut all = self.messages.read().await?;
        sort_messages(&mut all);
        Ok(all)
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, DataAccessError> {
        self.messages.find(id).await
    }

    async fn delete(&self, id: MessageId) -> Result<Message, DataAccessError> {
        self.messages.remove(id).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::Value;
    use tempfile::TempDir;

    use super::*;
    use crate::infrastructure::testing;

    async fn store(dir: &TempDir) -> JsonFileStore {
        JsonFileStore::open(dir.path(), IdGeneratorTask::with_node(1, 1))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_open_initializes_empty_collections() {
        let dir = TempDir::new().unwrap();
        store(&dir).await;
        for name in ["bookings.json", "messages.json"] {
            let text = std::fs::read_to_string(dir.path().join(name)).unwrap();
            assert_eq!(serde_json::from_str::<Value>(&text).unwrap(), Value::Array(vec![]));
        }
    }

    #[tokio::test]
    async fn test_booking_repository() {
        let dir = TempDir::new().unwrap();
        testing::booking_repository_contract(&store(&dir).await).await;
    }

    #[tokio::test]
    async fn test_message_repository() {
        let dir = TempDir::new().unwrap();
        testing::message_repository_contract(&store(&dir).await).await;
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let booking = BookingRepository::add(&store(&dir).await, testing::new_booking("2025-06-01"))
            .await
            .unwrap();
        let reopened = store(&dir).await;
        assert_eq!(
            BookingRepository::find_by_id(&reopened, booking.id()).await.unwrap(),
            Some(booking)
        );
        assert!(!dir.path().join("bookings.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_persisted_layout() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let booking = BookingRepository::add(&store, testing::new_booking("2025-06-01"))
            .await
            .unwrap();
        let text = std::fs::read_to_string(dir.path().join("bookings.json")).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        let records = value.as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["id"], Value::String(booking.id().to_string()));
        assert_eq!(records[0]["date"], "2025-06-01");
        assert!(records[0].get("locationLat").is_some());
        assert!(records[0].get("created_at").is_some());
    }

    #[tokio::test]
    async fn test_concurrent_adds_are_not_lost() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(store(&dir).await);
        let handles = (0..20)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let message =
                        NewMessage::create("a", "a@b.com", "12345678", &format!("hi {i}")).unwrap();
                    MessageRepository::add(store.as_ref(), message).await.unwrap()
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(MessageRepository::list(store.as_ref()).await.unwrap().len(), 20);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_one_booking_per_date_under_contention() {
        let dir = TempDir::new().unwrap();
        testing::one_booking_per_date_contract(Arc::new(store(&dir).await)).await;
    }

    #[tokio::test]
    async fn test_corrupt_collection_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        std::fs::write(dir.path().join("messages.json"), "{not json").unwrap();
        let error = MessageRepository::list(&store).await.unwrap_err();
        assert!(matches!(error, DataAccessError::ReadError(_)));
    }
}
