//! Service attributes
//!
//! One actor owns an LRU cache of per-service attribute stores. Each
//! attribute store is a version store under
//! `servicedir/<service_uuid>/attr` plus the decoded current value.

use crate::actor::{self, ActorHandle, Handler};
use crate::lru::LruCache;
use crate::version_store::{VersionFileStore, VersionFileType};
use crate::{ATTR_DIR_NAME, SERVICE_DIR_NAME, check_name};
use controldb_common::{
    ControlDbConfig, DbError, DbResult, RequestContext, ServiceAttr, ServiceAttrKey,
};
use prost::Message;
use std::path::PathBuf;
use tracing::{debug, info};

pub enum AttrRequest {
    Create(ServiceAttr),
    Get(ServiceAttrKey),
    Update { old: ServiceAttr, new: ServiceAttr },
    Delete(ServiceAttrKey),
}

impl AttrRequest {
    fn service_uuid(&self) -> &str {
        match self {
            Self::Create(attr) | Self::Update { new: attr, .. } => &attr.service_uuid,
            Self::Get(key) | Self::Delete(key) => &key.service_uuid,
        }
    }
}

pub enum AttrResponse {
    Done,
    Attr(ServiceAttr),
}

/// Attribute of one service
struct AttrStore {
    service_uuid: String,
    attr: Option<ServiceAttr>,
    store: VersionFileStore,
}

impl AttrStore {
    fn open(dir: PathBuf, service_uuid: &str, max_versions: i64) -> DbResult<Self> {
        let store = VersionFileStore::open(VersionFileType::ServiceAttr, dir, max_versions)?;
        let attr = if store.has_current_version() {
            Some(ServiceAttr::decode(store.read_current_version()?.as_slice())?)
        } else {
            None
        };
        Ok(Self {
            service_uuid: service_uuid.to_string(),
            attr,
            store,
        })
    }

    fn create(&mut self, attr: ServiceAttr) -> DbResult<()> {
        if let Some(current) = &self.attr {
            if current.content_eq(&attr) {
                return Ok(());
            }
            return Err(DbError::conditional_check_failed(format!(
                "service attr {} exists with different content",
                self.service_uuid
            )));
        }
        self.store.create_new_version(&attr.encode_to_vec())?;
        self.attr = Some(attr);
        Ok(())
    }

    fn get(&self) -> DbResult<ServiceAttr> {
        self.attr
            .clone()
            .ok_or_else(|| DbError::not_found(format!("service attr {}", self.service_uuid)))
    }

    fn update(&mut self, old: &ServiceAttr, mut new: ServiceAttr) -> DbResult<ServiceAttr> {
        let Some(current) = &self.attr else {
            return Err(DbError::not_found(format!(
                "service attr {}",
                self.service_uuid
            )));
        };
        if old.service_uuid != current.service_uuid || new.service_uuid != current.service_uuid {
            return Err(DbError::invalid_request(format!(
                "update for service {} carries service uuid {} -> {}",
                self.service_uuid, old.service_uuid, new.service_uuid
            )));
        }
        if !current.content_eq(old) {
            return Err(DbError::conditional_check_failed(format!(
                "service attr {} does not match the expected old value",
                self.service_uuid
            )));
        }
        if let Some(field) = current.changed_immutable_field(&new) {
            return Err(DbError::invalid_request(format!(
                "service attr {}: {field} is immutable",
                self.service_uuid
            )));
        }

        new.revision = current.revision + 1;
        self.store.create_new_version(&new.encode_to_vec())?;
        self.attr = Some(new.clone());
        Ok(new)
    }

    fn delete(&mut self) -> DbResult<()> {
        if self.attr.is_none() {
            return Err(DbError::not_found(format!(
                "service attr {}",
                self.service_uuid
            )));
        }
        self.store.delete_all()?;
        self.attr = None;
        Ok(())
    }
}

struct AttrHandler {
    service_dir: PathBuf,
    max_versions: i64,
    cache: LruCache<String, AttrStore>,
}

impl AttrHandler {
    /// Cached store for `service_uuid`, loading it from disk on a miss.
    /// Only creates may bring a new service directory into existence.
    fn attr_store(&mut self, ctx: &RequestContext, service_uuid: &str, create: bool) -> DbResult<&mut AttrStore> {
        let key = service_uuid.to_string();
        if !self.cache.contains(&key) {
            let dir = self.service_dir.join(service_uuid).join(ATTR_DIR_NAME);
            if !create && !dir.exists() {
                return Err(DbError::not_found(format!("service attr {service_uuid}")));
            }

            let store = AttrStore::open(dir, service_uuid, self.max_versions)?;
            debug!(request_id = %ctx.request_id, "Loaded service attr store for {}", service_uuid);
            if let Some((evicted, _)) = self.cache.insert(key.clone(), store) {
                debug!("Evicted service attr store for {}", evicted);
            }
        }
        self.cache
            .get_mut(&key)
            .ok_or_else(|| DbError::internal(format!("service attr store {service_uuid} vanished")))
    }
}

impl Handler for AttrHandler {
    type Request = AttrRequest;
    type Response = AttrResponse;

    fn describe(req: &AttrRequest) -> String {
        let op = match req {
            AttrRequest::Create(_) => "create",
            AttrRequest::Get(_) => "get",
            AttrRequest::Update { .. } => "update",
            AttrRequest::Delete(_) => "delete",
        };
        format!("{op} {}", req.service_uuid())
    }

    fn handle(&mut self, ctx: &RequestContext, req: AttrRequest) -> DbResult<AttrResponse> {
        let service_uuid = req.service_uuid().to_string();
        check_name("service_uuid", &service_uuid)?;

        let create = matches!(req, AttrRequest::Create(_));
        let store = self.attr_store(ctx, &service_uuid, create)?;

        match req {
            AttrRequest::Create(attr) => store.create(attr).map(|()| AttrResponse::Done),
            AttrRequest::Get(_) => store.get().map(AttrResponse::Attr),
            AttrRequest::Update { old, new } => store.update(&old, new).map(AttrResponse::Attr),
            AttrRequest::Delete(_) => {
                store.delete()?;
                self.cache.remove(&service_uuid);
                info!(request_id = %ctx.request_id, "Deleted service attr {}", service_uuid);
                Ok(AttrResponse::Done)
            }
        }
    }

    fn shutdown(&mut self) {
        for store in self.cache.values_mut() {
            store.store.wait_for_compaction();
        }
    }
}

fn unexpected_response(op: &str) -> DbError {
    DbError::internal(format!("unexpected response to service attr {op}"))
}

/// Service attribute service of one cluster
pub struct ServiceAttrService {
    actor: ActorHandle<AttrRequest, AttrResponse>,
}

impl ServiceAttrService {
    pub fn open(config: &ControlDbConfig) -> DbResult<Self> {
        let handler = AttrHandler {
            service_dir: config.cluster_dir().join(SERVICE_DIR_NAME),
            max_versions: config.max_versions,
            cache: LruCache::new(config.attr_cache_size),
        };
        let actor = actor::spawn("service-attr", handler, config.request_timeout())?;
        Ok(Self { actor })
    }

    pub async fn create_service_attr(&self, ctx: &RequestContext, attr: ServiceAttr) -> DbResult<()> {
        match self.actor.call(ctx, AttrRequest::Create(attr)).await? {
            AttrResponse::Done => Ok(()),
            AttrResponse::Attr(_) => Err(unexpected_response("create")),
        }
    }

    pub async fn get_service_attr(&self, ctx: &RequestContext, key: ServiceAttrKey) -> DbResult<ServiceAttr> {
        match self.actor.call(ctx, AttrRequest::Get(key)).await? {
            AttrResponse::Attr(attr) => Ok(attr),
            AttrResponse::Done => Err(unexpected_response("get")),
        }
    }

    /// Replace the attribute if it still equals `old`; returns the stored
    /// attribute with its advanced revision.
    pub async fn update_service_attr(
        &self,
        ctx: &RequestContext,
        old: ServiceAttr,
        new: ServiceAttr,
    ) -> DbResult<ServiceAttr> {
        match self.actor.call(ctx, AttrRequest::Update { old, new }).await? {
            AttrResponse::Attr(attr) => Ok(attr),
            AttrResponse::Done => Err(unexpected_response("update")),
        }
    }

    pub async fn delete_service_attr(&self, ctx: &RequestContext, key: ServiceAttrKey) -> DbResult<()> {
        match self.actor.call(ctx, AttrRequest::Delete(key)).await? {
            AttrResponse::Done => Ok(()),
            AttrResponse::Attr(_) => Err(unexpected_response("delete")),
        }
    }

    pub async fn stop(&self) {
        self.actor.stop().await;
    }
}
