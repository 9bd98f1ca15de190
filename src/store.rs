//! The shared request store and the client contract over it.

use crate::error::{Result, SyncError};
use crate::persist::{Collection, CollectionFile, StoredRequest};
use crate::subscriptions::{Subscription, SubscriptionManager};
use crate::types::{
    DispatchUpdate, RequestId, RequestInput, RequestRecord, RequestStatus, Timestamp, UserId,
};
use fs2::FileExt;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name of the collection file inside a store directory.
const COLLECTION_FILE: &str = "requests.db";

/// Bytes of the SHA-256 digest kept for a request id.
const ID_BYTES: usize = 10;

/// Client-side access to the request collection.
///
/// Everything the lifecycle needs from the realtime backend. Implementations
/// must deliver snapshots per subscription in the order they commit writes.
pub trait RecordStore: Send + Sync {
    /// Write a new `pending` record and return its id.
    ///
    /// On error the record must be assumed not to exist.
    fn create(&self, input: RequestInput) -> Result<RequestId>;

    /// Open a feed for one request id. The initial state (record or absent)
    /// is delivered first.
    fn subscribe(&self, id: &RequestId) -> Subscription;

    /// Best-effort status write. Callers treat errors as non-fatal.
    fn update_status(&self, id: &RequestId, status: RequestStatus) -> Result<()>;

    /// Most recently created non-terminal request owned by `user_id`.
    fn find_active_request(&self, user_id: &UserId) -> Result<Option<RequestId>>;
}

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Directory holding the collection file.
    pub path: PathBuf,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./requests"),
            create_if_missing: true,
        }
    }
}

/// File backing for a persistent store.
struct Backing {
    file: CollectionFile,
    /// Lock file for exclusive access.
    _lock_file: File,
}

/// Request store with live per-record subscriptions.
///
/// Either purely in memory or backed by a collection file. Writers from any
/// thread are serialized by one lock; snapshots are broadcast while it is
/// held, so every subscriber sees writes in commit order.
pub struct RequestStore {
    backing: Option<Backing>,
    collection: RwLock<Collection>,
    subscriptions: Arc<SubscriptionManager>,
}

impl RequestStore {
    /// A store that lives only as long as this value.
    pub fn in_memory() -> Self {
        Self {
            backing: None,
            collection: RwLock::new(Collection::default()),
            subscriptions: Arc::new(SubscriptionManager::new()),
        }
    }

    /// Open an existing store or create a new one.
    pub fn open_or_create(config: StoreConfig) -> Result<Self> {
        if config.path.join(COLLECTION_FILE).exists() {
            Self::open(config)
        } else if config.create_if_missing {
            Self::create(config)
        } else {
            Err(SyncError::NotInitialized)
        }
    }

    /// Create a new, empty store directory.
    ///
    /// Fails with `InvalidOperation` if the directory already holds a
    /// collection; use [`RequestStore::open`] for that.
    pub fn create(config: StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.path)?;
        let lock_file = Self::acquire_lock(&config.path)?;

        let collection_path = config.path.join(COLLECTION_FILE);
        if collection_path.exists() {
            return Err(SyncError::InvalidOperation(format!(
                "store already exists at {}",
                config.path.display()
            )));
        }

        let file = CollectionFile::new(collection_path);
        let collection = Collection::default();
        file.save(&collection)?;

        Ok(Self::with_backing(file, lock_file, collection))
    }

    /// Open an existing store directory.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let collection_path = config.path.join(COLLECTION_FILE);
        if !collection_path.exists() {
            return Err(SyncError::NotInitialized);
        }

        let lock_file = Self::acquire_lock(&config.path)?;
        let file = CollectionFile::new(collection_path);
        let collection = file.load()?;
        info!(
            path = %config.path.display(),
            requests = collection.requests.len(),
            "opened request store"
        );

        Ok(Self::with_backing(file, lock_file, collection))
    }

    fn with_backing(file: CollectionFile, lock_file: File, collection: Collection) -> Self {
        Self {
            backing: Some(Backing {
                file,
                _lock_file: lock_file,
            }),
            collection: RwLock::new(collection),
            subscriptions: Arc::new(SubscriptionManager::new()),
        }
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.join("LOCK"))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| SyncError::Locked)?;
        Ok(lock_file)
    }

    // --- Reads ---

    /// Current state of one record.
    pub fn get(&self, id: &RequestId) -> Option<RequestRecord> {
        self.collection
            .read()
            .requests
            .get(id)
            .map(|stored| stored.record.clone())
    }

    /// Number of records in the collection.
    pub fn len(&self) -> usize {
        self.collection.read().requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live subscriptions across all requests.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.subscription_count()
    }

    /// Live subscriptions bound to one request.
    pub fn subscribers_for(&self, id: &RequestId) -> usize {
        self.subscriptions.subscribers_for(id)
    }

    // --- Remote-side writes ---

    /// Apply a dispatch-side write. Status and driver land in one commit, so
    /// no subscriber can observe one without the other.
    pub fn dispatch_update(&self, id: &RequestId, update: DispatchUpdate) -> Result<()> {
        self.write_record(id, |record| {
            let mut changed = false;
            if let Some(status) = update.status {
                changed |= Self::apply_status(record, status)?;
            }
            if let Some(driver_id) = update.driver_id {
                if record.driver_id.as_deref() != Some(driver_id.as_str()) {
                    record.driver_id = Some(driver_id);
                    changed = true;
                }
            }
            Ok(changed)
        })
    }

    /// Delete a record. Subscribers observe it as absent.
    pub fn remove(&self, id: &RequestId) -> Result<Option<RequestRecord>> {
        let mut collection = self.collection.write();
        let Some(stored) = collection.requests.remove(id) else {
            return Ok(None);
        };

        if let Err(e) = self.persist(&collection) {
            collection.requests.insert(id.clone(), stored);
            return Err(e);
        }

        self.subscriptions.broadcast(id, None);
        debug!(request = %id, "removed request");
        Ok(Some(stored.record))
    }

    // --- Internals ---

    fn persist(&self, collection: &Collection) -> Result<()> {
        match &self.backing {
            Some(backing) => backing
                .file
                .save(collection)
                .map_err(|e| SyncError::StoreWrite(e.to_string())),
            None => Ok(()),
        }
    }

    fn apply_status(record: &mut RequestRecord, status: RequestStatus) -> Result<bool> {
        if !record.status.can_transition_to(status) {
            return Err(SyncError::InvalidTransition {
                from: record.status,
                to: status,
            });
        }
        let changed = record.status != status;
        record.status = status;
        Ok(changed)
    }

    /// Mutate one record, persist, then broadcast. The mutation reports
    /// whether anything changed; unchanged records are neither written nor
    /// broadcast. A failed persist restores the previous record.
    fn write_record<F>(&self, id: &RequestId, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut RequestRecord) -> Result<bool>,
    {
        let mut collection = self.collection.write();
        let stored = collection
            .requests
            .get_mut(id)
            .ok_or_else(|| SyncError::RecordNotFound(id.clone()))?;

        let previous = stored.record.clone();
        if !mutate(&mut stored.record)? {
            return Ok(());
        }
        let current = stored.record.clone();

        if let Err(e) = self.persist(&collection) {
            if let Some(stored) = collection.requests.get_mut(id) {
                stored.record = previous;
            }
            return Err(e);
        }

        debug!(
            request = %id,
            status = %current.status,
            driver = ?current.driver_id,
            "request updated"
        );
        self.subscriptions.broadcast(id, Some(&current));
        Ok(())
    }

    fn generate_id(collection: &Collection, user_id: &UserId, created_at: Timestamp) -> RequestId {
        let mut salt = 0u64;
        loop {
            let mut hasher = Sha256::new();
            hasher.update(user_id.as_str().as_bytes());
            hasher.update(created_at.0.to_le_bytes());
            hasher.update(collection.next_ordinal.to_le_bytes());
            hasher.update(salt.to_le_bytes());
            let digest = hasher.finalize();

            let id = RequestId::new(hex::encode(&digest[..ID_BYTES]));
            if !collection.requests.contains_key(&id) {
                return id;
            }
            salt += 1;
        }
    }
}

impl Default for RequestStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl RecordStore for RequestStore {
    fn create(&self, input: RequestInput) -> Result<RequestId> {
        let mut collection = self.collection.write();

        let created_at = Timestamp::now();
        let id = Self::generate_id(&collection, &input.user_id, created_at);
        let ordinal = collection.next_ordinal;
        let record = input.into_record(id.clone(), created_at);

        collection.requests.insert(
            id.clone(),
            StoredRequest {
                ordinal,
                record: record.clone(),
            },
        );
        collection.next_ordinal += 1;

        if let Err(e) = self.persist(&collection) {
            collection.requests.remove(&id);
            collection.next_ordinal = ordinal;
            warn!(error = %e, "request create failed");
            return Err(e);
        }

        info!(request = %id, kind = record.kind.tag(), user = %record.user_id, "request created");
        self.subscriptions.broadcast(&id, Some(&record));
        Ok(id)
    }

    fn subscribe(&self, id: &RequestId) -> Subscription {
        // Hold the read lock so no write lands between the initial snapshot
        // and registration.
        let collection = self.collection.read();
        let initial = collection
            .requests
            .get(id)
            .map(|stored| stored.record.clone());
        self.subscriptions.subscribe(id.clone(), initial)
    }

    fn update_status(&self, id: &RequestId, status: RequestStatus) -> Result<()> {
        self.write_record(id, |record| Self::apply_status(record, status))
    }

    fn find_active_request(&self, user_id: &UserId) -> Result<Option<RequestId>> {
        let collection = self.collection.read();
        Ok(collection
            .requests
            .values()
            .filter(|stored| &stored.record.user_id == user_id && !stored.record.status.is_terminal())
            .max_by_key(|stored| stored.ordinal)
            .map(|stored| stored.record.id.clone()))
    }
}

impl<S: RecordStore + ?Sized> RecordStore for Arc<S> {
    fn create(&self, input: RequestInput) -> Result<RequestId> {
        (**self).create(input)
    }

    fn subscribe(&self, id: &RequestId) -> Subscription {
        (**self).subscribe(id)
    }

    fn update_status(&self, id: &RequestId, status: RequestStatus) -> Result<()> {
        (**self).update_status(id, status)
    }

    fn find_active_request(&self, user_id: &UserId) -> Result<Option<RequestId>> {
        (**self).find_active_request(user_id)
    }
}
