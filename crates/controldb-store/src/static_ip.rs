//! Static IPs, sharded across workers by IP.
//!
//! Each reservation is one record at `serviceIPdir/<static_ip>`.

use crate::actor::Handler;
use crate::sharded::{ShardKey, ShardedHandle, spawn_sharded};
use crate::{STATIC_IP_DIR_NAME, check_name, fileio};
use controldb_common::{
    ControlDbConfig, DbError, DbResult, RequestContext, ServiceStaticIp, ServiceStaticIpKey,
};
use prost::Message;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub enum StaticIpRequest {
    Create(ServiceStaticIp),
    Get(ServiceStaticIpKey),
    Update {
        old: ServiceStaticIp,
        new: ServiceStaticIp,
    },
    Delete(ServiceStaticIpKey),
}

impl StaticIpRequest {
    fn static_ip(&self) -> &str {
        match self {
            Self::Create(ip) | Self::Update { new: ip, .. } => &ip.static_ip,
            Self::Get(key) | Self::Delete(key) => &key.static_ip,
        }
    }
}

impl ShardKey for StaticIpRequest {
    fn shard_key(&self) -> Vec<u8> {
        self.static_ip().as_bytes().to_vec()
    }
}

pub enum StaticIpResponse {
    Done,
    StaticIp(ServiceStaticIp),
}

struct StaticIpWorker {
    ip_dir: PathBuf,
}

impl StaticIpWorker {
    fn read(path: &Path, static_ip: &str) -> DbResult<ServiceStaticIp> {
        match fileio::read_record(path) {
            Ok(data) => Ok(ServiceStaticIp::decode(data.as_slice())?),
            Err(DbError::RecordNotFound(_)) => {
                Err(DbError::not_found(format!("static ip {static_ip}")))
            }
            Err(e) => Err(e),
        }
    }

    fn create(&self, ip: ServiceStaticIp) -> DbResult<()> {
        let path = self.ip_dir.join(&ip.static_ip);
        match Self::read(&path, &ip.static_ip) {
            Ok(current) if current.content_eq(&ip) => return Ok(()),
            Ok(current) => {
                return Err(DbError::conditional_check_failed(format!(
                    "static ip {} is owned by service {}",
                    ip.static_ip, current.service_uuid
                )));
            }
            Err(DbError::RecordNotFound(_)) => {}
            Err(e) => return Err(e),
        }
        fileio::write_record_atomic(&path, &ip.encode_to_vec())
    }

    fn get(&self, key: &ServiceStaticIpKey) -> DbResult<ServiceStaticIp> {
        Self::read(&self.ip_dir.join(&key.static_ip), &key.static_ip)
    }

    fn update(&self, old: &ServiceStaticIp, mut new: ServiceStaticIp) -> DbResult<ServiceStaticIp> {
        let path = self.ip_dir.join(&new.static_ip);
        let current = Self::read(&path, &new.static_ip)?;
        if old.static_ip != current.static_ip {
            return Err(DbError::invalid_request(format!(
                "old static ip {} does not match {}",
                old.static_ip, current.static_ip
            )));
        }
        if !current.content_eq(old) {
            return Err(DbError::conditional_check_failed(format!(
                "static ip {} does not match the expected old value",
                current.static_ip
            )));
        }
        if let Some(field) = current.changed_immutable_field(&new) {
            return Err(DbError::invalid_request(format!(
                "static ip {}: {field} is immutable",
                current.static_ip
            )));
        }

        new.revision = current.revision + 1;
        fileio::write_record_atomic(&path, &new.encode_to_vec())?;
        Ok(new)
    }

    fn delete(&self, key: &ServiceStaticIpKey) -> DbResult<()> {
        match fileio::remove_record(&self.ip_dir.join(&key.static_ip)) {
            Err(DbError::RecordNotFound(_)) => {
                Err(DbError::not_found(format!("static ip {}", key.static_ip)))
            }
            other => other,
        }
    }
}

impl Handler for StaticIpWorker {
    type Request = StaticIpRequest;
    type Response = StaticIpResponse;

    fn describe(req: &StaticIpRequest) -> String {
        let op = match req {
            StaticIpRequest::Create(_) => "create",
            StaticIpRequest::Get(_) => "get",
            StaticIpRequest::Update { .. } => "update",
            StaticIpRequest::Delete(_) => "delete",
        };
        format!("{op} {}", req.static_ip())
    }

    fn handle(&mut self, ctx: &RequestContext, req: StaticIpRequest) -> DbResult<StaticIpResponse> {
        check_name("static_ip", req.static_ip())?;
        debug!(request_id = %ctx.request_id, "static ip {}", req.static_ip());

        match req {
            StaticIpRequest::Create(ip) => self.create(ip).map(|()| StaticIpResponse::Done),
            StaticIpRequest::Get(key) => self.get(&key).map(StaticIpResponse::StaticIp),
            StaticIpRequest::Update { old, new } => {
                self.update(&old, new).map(StaticIpResponse::StaticIp)
            }
            StaticIpRequest::Delete(key) => self.delete(&key).map(|()| StaticIpResponse::Done),
        }
    }
}

/// Remove temp files a crash left in the static IP directory.
fn purge_tmp_files(ip_dir: &Path) -> DbResult<()> {
    let entries = fs::read_dir(ip_dir)
        .map_err(|e| DbError::internal(format!("read dir {}: {e}", ip_dir.display())))?;
    for entry in entries.flatten() {
        if fileio::is_tmp_file(&entry.file_name().to_string_lossy()) {
            info!("Removing leftover temp file {}", entry.path().display());
            fileio::remove_quietly(&entry.path());
        }
    }
    Ok(())
}

fn unexpected_response(op: &str) -> DbError {
    DbError::internal(format!("unexpected response to static ip {op}"))
}

pub struct StaticIpService {
    actor: ShardedHandle<StaticIpRequest, StaticIpResponse>,
}

impl StaticIpService {
    pub fn open(config: &ControlDbConfig) -> DbResult<Self> {
        let ip_dir = config.cluster_dir().join(STATIC_IP_DIR_NAME);
        fileio::ensure_dir(&ip_dir)?;
        purge_tmp_files(&ip_dir)?;

        let actor = spawn_sharded(
            "static-ip",
            config.parallel_reqs,
            config.request_timeout(),
            |_| {
                Ok(StaticIpWorker {
                    ip_dir: ip_dir.clone(),
                })
            },
        )?;
        Ok(Self { actor })
    }

    pub async fn create_service_static_ip(&self, ctx: &RequestContext, ip: ServiceStaticIp) -> DbResult<()> {
        match self.actor.call(ctx, StaticIpRequest::Create(ip)).await? {
            StaticIpResponse::Done => Ok(()),
            StaticIpResponse::StaticIp(_) => Err(unexpected_response("create")),
        }
    }

    pub async fn get_service_static_ip(
        &self,
        ctx: &RequestContext,
        key: ServiceStaticIpKey,
    ) -> DbResult<ServiceStaticIp> {
        match self.actor.call(ctx, StaticIpRequest::Get(key)).await? {
            StaticIpResponse::StaticIp(ip) => Ok(ip),
            StaticIpResponse::Done => Err(unexpected_response("get")),
        }
    }

    /// Move the reservation to a new owner if it still equals `old`.
    pub async fn update_service_static_ip(
        &self,
        ctx: &RequestContext,
        old: ServiceStaticIp,
        new: ServiceStaticIp,
    ) -> DbResult<ServiceStaticIp> {
        match self.actor.call(ctx, StaticIpRequest::Update { old, new }).await? {
            StaticIpResponse::StaticIp(ip) => Ok(ip),
            StaticIpResponse::Done => Err(unexpected_response("update")),
        }
    }

    pub async fn delete_service_static_ip(&self, ctx: &RequestContext, key: ServiceStaticIpKey) -> DbResult<()> {
        match self.actor.call(ctx, StaticIpRequest::Delete(key)).await? {
            StaticIpResponse::Done => Ok(()),
            StaticIpResponse::StaticIp(_) => Err(unexpected_response("delete")),
        }
    }

    pub async fn stop(&self) {
        self.actor.stop().await;
    }
}
