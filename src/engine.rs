//! Progression engine - applies updates to stored player progress
//!
//! Each call reads the user's document, computes the next record in memory,
//! writes the changed fields back and re-reads what was committed. Calls for
//! the same user are serialized in-process, so accumulation is never lost to
//! a concurrent read-modify-write.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::config::{Config, DEFAULT_COLLECTION};
use crate::db::{Document, DocumentStore, MemoryStore, SqliteStore, StoreError};
use crate::error::Result;
use crate::progress::{PlayerProgress, ProgressUpdate};
use crate::user::UserId;

pub struct ProgressionEngine {
    store: Arc<dyn DocumentStore>,
    collection: String,
    /// One async lock per user id, present only while someone holds or waits on it
    locks: Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>,
}

/// Exclusive hold on one user's record; prunes the lock entry on drop
/// once no other caller is waiting for it
struct UserGuard<'a> {
    locks: &'a Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>,
    user: UserId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserGuard<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Release first so the count below only sees the map and any waiters
        self.guard.take();
        if locks
            .get(&self.user)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.user);
        }
    }
}

impl ProgressionEngine {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            collection: DEFAULT_COLLECTION.to_string(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Build an engine over the store named by `config`
    pub fn open(config: &Config) -> std::result::Result<Self, StoreError> {
        let store: Arc<dyn DocumentStore> = match &config.db_path {
            Some(path) => Arc::new(SqliteStore::open(path)?),
            None => Arc::new(MemoryStore::new()),
        };
        Ok(Self::new(store).with_collection(config.collection.clone()))
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Wait for exclusive access to `user`'s record
    async fn lock_user(&self, user: &UserId) -> UserGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(user.clone()).or_default())
        };
        UserGuard {
            locks: &self.locks,
            user: user.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Return the user's progress, creating the default record on first use
    pub async fn get_or_init_progress(&self, user_id: &str) -> Result<PlayerProgress> {
        let user = UserId::parse(user_id)?;
        let _guard = self.lock_user(&user).await;
        self.load_or_init(&user).await
    }

    /// Parse an untyped payload and apply it
    pub async fn apply_json(&self, user_id: &str, payload: Value) -> Result<PlayerProgress> {
        let user = UserId::parse(user_id)?;
        let update = ProgressUpdate::from_json(payload).inspect_err(|e| {
            warn!(user = %user, error = %e, "rejected progress update");
        })?;
        self.apply_update(user.as_str(), &update).await
    }

    /// Apply one update and return the record as committed by the store.
    ///
    /// Not retried: on `StoreUnavailable` the write may or may not have landed.
    pub async fn apply_update(&self, user_id: &str, update: &ProgressUpdate) -> Result<PlayerProgress> {
        let user = UserId::parse(user_id)?;
        let _guard = self.lock_user(&user).await;

        let current = self.load_or_init(&user).await?;
        let transition = current.apply(update, Utc::now());
        let fields = current.changed_fields(&transition.next);

        let changed: Vec<&String> = fields.keys().collect();
        debug!(user = %user, workout = update.is_workout(), fields = ?changed, "writing progress");
        self.store
            .update(&self.collection, user.as_str(), &fields)
            .await?;

        if transition.levels_gained > 0 {
            info!(
                user = %user,
                level = transition.next.level,
                gained = transition.levels_gained,
                "level up"
            );
        }

        let committed = self
            .store
            .get(&self.collection, user.as_str())
            .await?
            .ok_or_else(|| StoreError::not_found(&self.collection, user.as_str()))?;
        Ok(self.decode(&user, committed)?)
    }

    /// Caller must hold the user's lock
    async fn load_or_init(&self, user: &UserId) -> Result<PlayerProgress> {
        if let Some(doc) = self.store.get(&self.collection, user.as_str()).await? {
            return Ok(self.decode(user, doc)?);
        }

        let initial = PlayerProgress::default();
        self.store
            .set(&self.collection, user.as_str(), &initial.to_document())
            .await?;
        info!(user = %user, "initialized progress record");
        Ok(initial)
    }

    fn decode(
        &self,
        user: &UserId,
        doc: Document,
    ) -> std::result::Result<PlayerProgress, StoreError> {
        PlayerProgress::from_document(doc)
            .map_err(|e| StoreError::corrupt(&self.collection, user.as_str(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProgressError;
    use crate::exercises::MuscleGains;
    use crate::progress::WorkoutUpdate;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn engine() -> (ProgressionEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (ProgressionEngine::new(store.clone()), store)
    }

    fn workout(exercises: u64) -> ProgressUpdate {
        ProgressUpdate::workout(WorkoutUpdate {
            exercises,
            ..Default::default()
        })
    }

    /// Store whose reads start failing once `fail_reads` is set
    struct FlakyStore {
        inner: MemoryStore,
        fail_reads: AtomicBool,
        fail_writes: bool,
    }

    impl FlakyStore {
        fn new(fail_writes: bool) -> Self {
            Self {
                inner: MemoryStore::new(),
                fail_reads: AtomicBool::new(false),
                fail_writes,
            }
        }
    }

    #[async_trait]
    impl DocumentStore for FlakyStore {
        async fn get(&self, collection: &str, key: &str) -> std::result::Result<Option<Document>, StoreError> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(StoreError::Poisoned);
            }
            self.inner.get(collection, key).await
        }

        async fn set(&self, collection: &str, key: &str, document: &Document) -> std::result::Result<(), StoreError> {
            self.inner.set(collection, key, document).await
        }

        async fn update(&self, collection: &str, key: &str, fields: &Document) -> std::result::Result<(), StoreError> {
            if self.fail_writes {
                return Err(StoreError::Poisoned);
            }
            self.inner.update(collection, key, fields).await?;
            // Simulate losing the connection right after the write
            self.fail_reads.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_new_user_first_workout() {
        let (engine, _) = engine();
        let update = ProgressUpdate::from_json(json!({
            "type": "WORKOUT",
            "exercises": 5,
            "calories": 6.3,
            "chest": 1,
        }))
        .unwrap();

        let p = engine.apply_update("uid-1", &update).await.unwrap();
        assert_eq!(p.level, 1);
        assert_eq!(p.xp, 50);
        assert_eq!(p.total_exercises, 5);
        assert_eq!(p.total_calories, 6.3);
        assert_eq!(p.chest, 1.0);
        assert_eq!(p.coins, 150);
        assert_eq!(p.streak, 1);
        assert!(p.last_workout.is_some());
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let (engine, store) = engine();
        let first = engine.get_or_init_progress("uid-1").await.unwrap();
        let second = engine.get_or_init_progress("uid-1").await.unwrap();

        assert_eq!(first, PlayerProgress::default());
        assert_eq!(first, second);
        assert_eq!(store.set_count(), 1);
        assert_eq!(store.update_count(), 0);
    }

    #[tokio::test]
    async fn test_level_up_from_stored_xp() {
        let (engine, store) = engine();
        let seeded = PlayerProgress { xp: 950, ..Default::default() };
        store
            .set(DEFAULT_COLLECTION, "uid-1", &seeded.to_document())
            .await
            .unwrap();

        let p = engine.apply_update("uid-1", &workout(6)).await.unwrap();
        assert_eq!(p.level, 2);
        assert_eq!(p.xp, 10);
        assert_eq!(p.xp_max, 1500);
    }

    #[tokio::test]
    async fn test_coins_accrue_and_override() {
        let (engine, _) = engine();
        let p = engine.apply_update("uid-1", &workout(3)).await.unwrap();
        assert_eq!(p.coins, 130);

        let p = engine.apply_update("uid-1", &workout(3).with_coins(5)).await.unwrap();
        assert_eq!(p.coins, 5);

        let p = engine.apply_json("uid-1", json!({"coins": 0})).await.unwrap();
        assert_eq!(p.coins, 0);
        assert_eq!(p.streak, 2);
    }

    #[tokio::test]
    async fn test_muscles_never_decrease() {
        let (engine, _) = engine();
        let mut last = engine.get_or_init_progress("uid-1").await.unwrap();

        let sessions = [
            MuscleGains { chest: 1.0, arms: 0.5, ..Default::default() },
            MuscleGains { legs: 2.0, ..Default::default() },
            MuscleGains::default(),
        ];
        for muscles in sessions {
            let update = ProgressUpdate::workout(WorkoutUpdate {
                exercises: 1,
                muscles,
                ..Default::default()
            });
            let p = engine.apply_update("uid-1", &update).await.unwrap();
            for group in crate::exercises::MuscleGroup::all() {
                assert!(p.muscle(*group) >= last.muscle(*group));
            }
            last = p;
        }
        assert_eq!(last.chest, 1.0);
        assert_eq!(last.arms, 0.5);
        assert_eq!(last.legs, 2.0);
    }

    #[tokio::test]
    async fn test_inventory_merge_persists() {
        let (engine, _) = engine();
        let p = engine
            .apply_json("uid-1", json!({"inventory": {"apple": 1, "proteinBar": 2}}))
            .await
            .unwrap();
        assert_eq!(p.inventory.get("apple"), Some(&1));
        assert_eq!(p.inventory.get("proteinBar"), Some(&2));
        assert_eq!(p.inventory.get("energyDrink"), Some(&5));
    }

    #[tokio::test]
    async fn test_passthrough_field_stored() {
        let (engine, _) = engine();
        let p = engine
            .apply_json("uid-1", json!({"type": "WORKOUT", "exercises": 1, "timestamp": "2024-05-01T10:00:00Z"}))
            .await
            .unwrap();
        assert_eq!(p.extra.get("timestamp"), Some(&json!("2024-05-01T10:00:00Z")));
        assert!(!p.extra.contains_key("type"));
    }

    #[tokio::test]
    async fn test_invalid_user() {
        let (engine, store) = engine();
        let err = engine.apply_update("", &workout(1)).await.unwrap_err();
        assert!(matches!(err, ProgressError::InvalidUser));
        let err = engine.get_or_init_progress("  ").await.unwrap_err();
        assert!(matches!(err, ProgressError::InvalidUser));
        assert_eq!(store.set_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_update_writes_nothing() {
        let (engine, store) = engine();
        let err = engine
            .apply_json("uid-1", json!({"type": "WORKOUT", "exercises": "lots"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::InvalidUpdate { .. }));
        assert_eq!(store.set_count(), 0);
        assert_eq!(store.update_count(), 0);
    }

    #[tokio::test]
    async fn test_write_failure_is_store_unavailable() {
        let engine = ProgressionEngine::new(Arc::new(FlakyStore::new(true)));
        let err = engine.apply_update("uid-1", &workout(1)).await.unwrap_err();
        assert!(matches!(err, ProgressError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_failure_after_write_leaves_write_applied() {
        let store = Arc::new(FlakyStore::new(false));
        let engine = ProgressionEngine::new(store.clone());

        let err = engine.apply_update("uid-1", &workout(2)).await.unwrap_err();
        assert!(matches!(err, ProgressError::StoreUnavailable(_)));

        // The merge was committed before the confirmation read failed
        let doc = store.inner.get(DEFAULT_COLLECTION, "uid-1").await.unwrap().unwrap();
        assert_eq!(doc["totalExercises"], json!(2));
    }

    #[tokio::test]
    async fn test_corrupt_document_is_store_unavailable() {
        let (engine, store) = engine();
        let mut doc = Document::new();
        doc.insert("level".into(), json!("high"));
        store.set(DEFAULT_COLLECTION, "uid-1", &doc).await.unwrap();

        let err = engine.get_or_init_progress("uid-1").await.unwrap_err();
        assert!(matches!(err, ProgressError::StoreUnavailable(StoreError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn test_concurrent_workouts_do_not_lose_updates() {
        let (engine, store) = engine();
        let engine = Arc::new(engine);

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move { engine.apply_update("uid-1", &workout(1)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let p = engine.get_or_init_progress("uid-1").await.unwrap();
        assert_eq!(p.total_exercises, 20);
        assert_eq!(p.streak, 20);
        assert_eq!(p.coins, 300);
        assert_eq!(p.xp, 200);
        assert_eq!(store.set_count(), 1);
    }

    #[tokio::test]
    async fn test_lock_map_pruned() {
        let (engine, _) = engine();
        for i in 0..1000 {
            engine.get_or_init_progress(&format!("user-{i}")).await.unwrap();
        }
        engine.apply_update("user-0", &workout(1)).await.unwrap();
        assert_eq!(engine.locks.lock().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_lock_map_pruned_after_contention() {
        let (engine, _) = engine();
        let engine = Arc::new(engine);

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move { engine.apply_update("uid-1", &workout(1)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(engine.locks.lock().unwrap().is_empty());
        let p = engine.get_or_init_progress("uid-1").await.unwrap();
        assert_eq!(p.total_exercises, 10);
    }

    #[tokio::test]
    async fn test_stamina_max_override_clamps_stamina() {
        let (engine, store) = engine();
        let p = engine.apply_json("uid-1", json!({"staminaMax": 40})).await.unwrap();
        assert_eq!(p.stamina_max, 40.0);
        assert_eq!(p.stamina, 40.0);

        let doc = store.get(DEFAULT_COLLECTION, "uid-1").await.unwrap().unwrap();
        assert_eq!(doc["staminaMax"], json!(40.0));
        assert_eq!(doc["stamina"], json!(40.0));
    }

    #[tokio::test]
    async fn test_users_are_independent() {
        let (engine, _) = engine();
        engine.apply_update("alice", &workout(4)).await.unwrap();
        let bob = engine.get_or_init_progress("bob").await.unwrap();
        assert_eq!(bob, PlayerProgress::default());
    }

    #[tokio::test]
    async fn test_sqlite_backed_engine() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            db_path: Some(dir.path().join("progress.db")),
            collection: "stats".into(),
        };

        {
            let engine = ProgressionEngine::open(&config).unwrap();
            engine.apply_update("uid-1", &workout(10)).await.unwrap();
        }

        let engine = ProgressionEngine::open(&config).unwrap();
        assert_eq!(engine.collection(), "stats");
        let p = engine.get_or_init_progress("uid-1").await.unwrap();
        assert_eq!(p.total_exercises, 10);
        assert_eq!(p.xp, 100);
        assert_eq!(p.coins, 200);
    }
}
