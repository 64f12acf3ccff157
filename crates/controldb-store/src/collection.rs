//! Per-service record collections
//!
//! Service members and volumes are kept as one file per record inside a
//! per-service directory, without version history. One actor owns an LRU
//! cache of loaded collections keyed by service uuid; a collection scans
//! its directory once on load, removing leftover temp files.

use crate::actor::Handler;
use crate::lru::LruCache;
use crate::{SERVICE_DIR_NAME, check_name, fileio};
use controldb_common::{ControlDbConfig, DbError, DbResult, RequestContext};
use prost::Message;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A record stored one file per record under its service's directory
pub trait CollectionRecord: Message + Default + Clone + Send + 'static {
    /// Entity name used in logs and errors
    const KIND: &'static str;
    /// Directory name under `servicedir/<service_uuid>`
    const DIR_NAME: &'static str;

    fn service_uuid(&self) -> &str;
    /// File name of the record within the collection
    fn record_name(&self) -> &str;

    /// Equality ignoring fields a write advances on its own
    fn same_content(&self, other: &Self) -> bool;
    /// First immutable field that differs in `other`
    fn immutable_change(&self, other: &Self) -> Option<&'static str>;

    /// Stamp fields advanced by a successful update of `current`
    fn advance_from(&mut self, _current: &Self) {}
}

pub enum CollectionRequest<T> {
    Create(T),
    Get { service_uuid: String, name: String },
    Update { old: T, new: T },
    Delete { service_uuid: String, name: String },
    List { service_uuid: String },
}

impl<T: CollectionRecord> CollectionRequest<T> {
    fn service_uuid(&self) -> &str {
        match self {
            Self::Create(record) | Self::Update { new: record, .. } => record.service_uuid(),
            Self::Get { service_uuid, .. }
            | Self::Delete { service_uuid, .. }
            | Self::List { service_uuid } => service_uuid,
        }
    }
}

pub enum CollectionResponse<T> {
    Done,
    Record(T),
    Records(Vec<T>),
}

/// Loaded records of one service
struct Collection<T> {
    dir: PathBuf,
    records: HashMap<String, T>,
}

impl<T: CollectionRecord> Collection<T> {
    fn load(dir: PathBuf) -> DbResult<Self> {
        fileio::ensure_dir(&dir)?;

        let entries = fs::read_dir(&dir)
            .map_err(|e| DbError::internal(format!("read dir {}: {e}", dir.display())))?;
        let mut records = HashMap::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| DbError::internal(format!("read dir {}: {e}", dir.display())))?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();

            if fileio::is_tmp_file(&name) {
                info!("Removing leftover temp file {}", path.display());
                fileio::remove_quietly(&path);
                continue;
            }

            let record = T::decode(read_existing(&path)?.as_slice())?;
            records.insert(record.record_name().to_string(), record);
        }

        debug!("Loaded {} {} records from {}", records.len(), T::KIND, dir.display());
        Ok(Self { dir, records })
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn not_found(service_uuid: &str, name: &str) -> DbError {
        DbError::not_found(format!("{} {service_uuid}/{name}", T::KIND))
    }

    fn create(&mut self, record: T) -> DbResult<()> {
        let name = record.record_name().to_string();
        check_name(T::KIND, &name)?;

        if let Some(current) = self.records.get(&name) {
            if current.same_content(&record) {
                return Ok(());
            }
            return Err(DbError::conditional_check_failed(format!(
                "{} {}/{name} exists with different content",
                T::KIND,
                record.service_uuid()
            )));
        }

        fileio::write_record_atomic(&self.record_path(&name), &record.encode_to_vec())?;
        self.records.insert(name, record);
        Ok(())
    }

    fn get(&self, service_uuid: &str, name: &str) -> DbResult<T> {
        self.records
            .get(name)
            .cloned()
            .ok_or_else(|| Self::not_found(service_uuid, name))
    }

    fn update(&mut self, old: &T, mut new: T) -> DbResult<T> {
        let name = new.record_name().to_string();
        let Some(current) = self.records.get(&name) else {
            return Err(Self::not_found(new.service_uuid(), &name));
        };
        if old.service_uuid() != current.service_uuid() || old.record_name() != name {
            return Err(DbError::invalid_request(format!(
                "old {} {}/{} does not match new {}/{name}",
                T::KIND,
                old.service_uuid(),
                old.record_name(),
                new.service_uuid()
            )));
        }
        if !current.same_content(old) {
            return Err(DbError::conditional_check_failed(format!(
                "{} {}/{name} does not match the expected old value",
                T::KIND,
                new.service_uuid()
            )));
        }
        if let Some(field) = current.immutable_change(&new) {
            return Err(DbError::invalid_request(format!(
                "{} {}/{name}: {field} is immutable",
                T::KIND,
                new.service_uuid()
            )));
        }

        new.advance_from(current);
        fileio::write_record_atomic(&self.record_path(&name), &new.encode_to_vec())?;
        self.records.insert(name, new.clone());
        Ok(new)
    }

    fn delete(&mut self, service_uuid: &str, name: &str) -> DbResult<()> {
        if !self.records.contains_key(name) {
            return Err(Self::not_found(service_uuid, name));
        }
        fileio::remove_record(&self.record_path(name)).map_err(|e| match e {
            DbError::RecordNotFound(msg) => {
                DbError::internal(format!("cached record file missing: {msg}"))
            }
            other => other,
        })?;
        self.records.remove(name);
        Ok(())
    }

    fn list(&self) -> Vec<T> {
        let mut records: Vec<T> = self.records.values().cloned().collect();
        records.sort_by(|a, b| a.record_name().cmp(b.record_name()));
        records
    }
}

/// A record file found while scanning must be readable; absence here means
/// the directory changed under us.
fn read_existing(path: &Path) -> DbResult<Vec<u8>> {
    fileio::read_record(path).map_err(|e| match e {
        DbError::RecordNotFound(msg) => DbError::internal(format!("record vanished: {msg}")),
        other => other,
    })
}

/// Actor state for one collection kind
pub struct CollectionHandler<T> {
    service_dir: PathBuf,
    cache: LruCache<String, Collection<T>>,
}

impl<T: CollectionRecord> CollectionHandler<T> {
    pub fn new(config: &ControlDbConfig, cache_size: usize) -> Self {
        Self {
            service_dir: config.cluster_dir().join(SERVICE_DIR_NAME),
            cache: LruCache::new(cache_size),
        }
    }

    fn collection_dir(&self, service_uuid: &str) -> PathBuf {
        self.service_dir.join(service_uuid).join(T::DIR_NAME)
    }

    /// Cached collection of `service_uuid`, loaded on a miss. Returns
    /// `None` when the service has no collection on disk and `create` is
    /// false, so reads never create directories.
    fn collection(
        &mut self,
        ctx: &RequestContext,
        service_uuid: &str,
        create: bool,
    ) -> DbResult<Option<&mut Collection<T>>> {
        let key = service_uuid.to_string();
        if !self.cache.contains(&key) {
            let dir = self.collection_dir(service_uuid);
            if !create && !dir.exists() {
                return Ok(None);
            }
            let collection = Collection::load(dir)?;
            debug!(request_id = %ctx.request_id, "Loaded {} collection for {}", T::KIND, service_uuid);
            if let Some((evicted, _)) = self.cache.insert(key.clone(), collection) {
                debug!("Evicted {} collection for {}", T::KIND, evicted);
            }
        }
        Ok(self.cache.get_mut(&key))
    }
}

impl<T: CollectionRecord> Handler for CollectionHandler<T> {
    type Request = CollectionRequest<T>;
    type Response = CollectionResponse<T>;

    fn describe(req: &CollectionRequest<T>) -> String {
        match req {
            CollectionRequest::Create(r) => format!("create {}/{}", r.service_uuid(), r.record_name()),
            CollectionRequest::Get { service_uuid, name } => format!("get {service_uuid}/{name}"),
            CollectionRequest::Update { new, .. } => {
                format!("update {}/{}", new.service_uuid(), new.record_name())
            }
            CollectionRequest::Delete { service_uuid, name } => {
                format!("delete {service_uuid}/{name}")
            }
            CollectionRequest::List { service_uuid } => format!("list {service_uuid}"),
        }
    }

    fn handle(&mut self, ctx: &RequestContext, req: CollectionRequest<T>) -> DbResult<CollectionResponse<T>> {
        let service_uuid = req.service_uuid().to_string();
        check_name("service_uuid", &service_uuid)?;

        let create = matches!(req, CollectionRequest::Create(_));
        let Some(collection) = self.collection(ctx, &service_uuid, create)? else {
            return match req {
                CollectionRequest::List { .. } => Ok(CollectionResponse::Records(Vec::new())),
                CollectionRequest::Get { name, .. } | CollectionRequest::Delete { name, .. } => {
                    Err(Collection::<T>::not_found(&service_uuid, &name))
                }
                CollectionRequest::Update { new, .. } => {
                    Err(Collection::<T>::not_found(&service_uuid, new.record_name()))
                }
                CollectionRequest::Create(_) => Err(DbError::internal(format!(
                    "{} collection for {service_uuid} not created",
                    T::KIND
                ))),
            };
        };

        match req {
            CollectionRequest::Create(record) => {
                collection.create(record).map(|()| CollectionResponse::Done)
            }
            CollectionRequest::Get { name, .. } => {
                collection.get(&service_uuid, &name).map(CollectionResponse::Record)
            }
            CollectionRequest::Update { old, new } => {
                collection.update(&old, new).map(CollectionResponse::Record)
            }
            CollectionRequest::Delete { name, .. } => {
                collection.delete(&service_uuid, &name)?;
                if collection.records.is_empty() {
                    self.cache.remove(&service_uuid);
                    debug!(request_id = %ctx.request_id, "Dropped empty {} collection for {}", T::KIND, service_uuid);
                }
                Ok(CollectionResponse::Done)
            }
            CollectionRequest::List { .. } => Ok(CollectionResponse::Records(collection.list())),
        }
    }
}

pub(crate) fn unexpected_response(kind: &str, op: &str) -> DbError {
    DbError::internal(format!("unexpected response to {kind} {op}"))
}
