//! Cluster-wide record lists
//!
//! Devices and services are few per cluster, so each kind is kept as one
//! in-memory list persisted whole into a version store on every change.
//! A plain mutex covers the check, persist and publish steps of a write.

use crate::version_store::{VersionFileStore, VersionFileType};
use controldb_common::{DbError, DbResult, RequestContext};
use parking_lot::Mutex;
use prost::Message;
use std::path::Path;
use tracing::{debug, info};

/// A record kept in a cluster-wide list
pub trait ListEntry: Clone + PartialEq + Send + 'static {
    /// Entity name used in logs and errors
    const KIND: &'static str;
    const FILE_TYPE: VersionFileType;

    fn cluster_name(&self) -> &str;
    /// Unique name within the cluster
    fn entry_name(&self) -> &str;

    fn encode_list(entries: &[Self]) -> Vec<u8>;
    fn decode_list(data: &[u8]) -> DbResult<Vec<Self>>;
}

struct ListState<T> {
    entries: Vec<T>,
    store: VersionFileStore,
}

/// Mutex-guarded list of `T` for one cluster
pub struct GlobalList<T> {
    cluster_name: String,
    state: Mutex<ListState<T>>,
}

impl<T: ListEntry> GlobalList<T> {
    /// Load the list from the current version under `cluster_dir`.
    pub fn open(cluster_dir: &Path, cluster_name: &str, max_versions: i64) -> DbResult<Self> {
        let store = VersionFileStore::open(T::FILE_TYPE, cluster_dir, max_versions)?;
        let entries = if store.has_current_version() {
            T::decode_list(&store.read_current_version()?)?
        } else {
            Vec::new()
        };

        info!(
            "Loaded {} {} entries for cluster {}",
            entries.len(),
            T::KIND,
            cluster_name
        );
        Ok(Self {
            cluster_name: cluster_name.to_string(),
            state: Mutex::new(ListState { entries, store }),
        })
    }

    fn check_cluster(&self, cluster_name: &str) -> DbResult<()> {
        if cluster_name == self.cluster_name {
            Ok(())
        } else {
            Err(DbError::invalid_request(format!(
                "{} for cluster {}, served cluster is {}",
                T::KIND,
                cluster_name,
                self.cluster_name
            )))
        }
    }

    /// Add `entry`; an identical existing entry is a successful retry.
    pub fn create(&self, ctx: &RequestContext, entry: T) -> DbResult<()> {
        self.check_cluster(entry.cluster_name())?;

        let mut state = self.state.lock();
        if let Some(existing) = state
            .entries
            .iter()
            .find(|e| e.entry_name() == entry.entry_name())
        {
            if *existing == entry {
                debug!(request_id = %ctx.request_id, "{} {} already exists", T::KIND, entry.entry_name());
                return Ok(());
            }
            info!(request_id = %ctx.request_id, "{} {} exists with different content", T::KIND, entry.entry_name());
            return Err(DbError::conditional_check_failed(format!(
                "{} {} exists with different content",
                T::KIND,
                entry.entry_name()
            )));
        }

        let mut entries = state.entries.clone();
        entries.push(entry);
        Self::persist(&mut state.store, ctx, &entries)?;
        state.entries = entries;
        Ok(())
    }

    pub fn get(&self, ctx: &RequestContext, cluster_name: &str, name: &str) -> DbResult<T> {
        self.check_cluster(cluster_name)?;

        let state = self.state.lock();
        state
            .entries
            .iter()
            .find(|e| e.entry_name() == name)
            .cloned()
            .ok_or_else(|| {
                debug!(request_id = %ctx.request_id, "{} {} not found", T::KIND, name);
                DbError::not_found(format!("{} {name}", T::KIND))
            })
    }

    pub fn delete(&self, ctx: &RequestContext, cluster_name: &str, name: &str) -> DbResult<()> {
        self.check_cluster(cluster_name)?;

        let mut state = self.state.lock();
        let Some(index) = state.entries.iter().position(|e| e.entry_name() == name) else {
            info!(request_id = %ctx.request_id, "delete {} {}: not found", T::KIND, name);
            return Err(DbError::not_found(format!("{} {name}", T::KIND)));
        };

        let mut entries = state.entries.clone();
        entries.remove(index);
        Self::persist(&mut state.store, ctx, &entries)?;
        state.entries = entries;
        Ok(())
    }

    /// Copy of all entries, in creation order
    pub fn list(&self, cluster_name: &str) -> DbResult<Vec<T>> {
        self.check_cluster(cluster_name)?;
        Ok(self.state.lock().entries.clone())
    }

    fn persist(store: &mut VersionFileStore, ctx: &RequestContext, entries: &[T]) -> DbResult<()> {
        let version = store.create_new_version(&T::encode_list(entries))?;
        debug!(
            request_id = %ctx.request_id,
            "Persisted {} {} entries as version {}",
            entries.len(),
            T::KIND,
            version
        );
        Ok(())
    }

    /// Let any running compaction finish
    pub fn stop(&self) {
        self.state.lock().store.wait_for_compaction();
        info!("{} list stopped for cluster {}", T::KIND, self.cluster_name);
    }
}

/// Decode helper for list messages
pub(crate) fn decode<M: Message + Default>(data: &[u8]) -> DbResult<M> {
    Ok(M::decode(data)?)
}
