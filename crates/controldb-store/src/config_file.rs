//! Config files, sharded across workers by `service_uuid/file_id`.
//!
//! Each file is one record at `servicedir/<service_uuid>/configdir/<file_id>`
//! and is read from disk on every request. The only state a worker keeps is
//! the set of services whose config dir it has already swept for temp files
//! left by a crash; it removes only the temp files of keys it owns.

use crate::actor::Handler;
use crate::sharded::{ShardKey, ShardedHandle, shard_for, spawn_sharded};
use crate::{CONFIG_DIR_NAME, SERVICE_DIR_NAME, check_name, fileio};
use controldb_common::{
    ConfigFile, ConfigFileKey, ControlDbConfig, DbError, DbResult, RequestContext,
    content_md5_hex,
};
use prost::Message;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub enum ConfigFileRequest {
    Create(ConfigFile),
    Get(ConfigFileKey),
    Delete(ConfigFileKey),
}

impl ConfigFileRequest {
    fn key(&self) -> (&str, &str) {
        match self {
            Self::Create(file) => (&file.service_uuid, &file.file_id),
            Self::Get(key) | Self::Delete(key) => (&key.service_uuid, &key.file_id),
        }
    }
}

fn config_shard_key(service_uuid: &str, file_id: &str) -> Vec<u8> {
    format!("{service_uuid}/{file_id}").into_bytes()
}

impl ShardKey for ConfigFileRequest {
    fn shard_key(&self) -> Vec<u8> {
        let (service_uuid, file_id) = self.key();
        config_shard_key(service_uuid, file_id)
    }
}

pub enum ConfigFileResponse {
    Done,
    File(ConfigFile),
}

struct ConfigFileWorker {
    service_dir: PathBuf,
    shard: usize,
    shards: usize,
    swept: HashSet<String>,
}

impl ConfigFileWorker {
    fn new(service_dir: PathBuf, shard: usize, shards: usize) -> Self {
        Self {
            service_dir,
            shard,
            shards,
            swept: HashSet::new(),
        }
    }

    /// Remove leftover temp files of keys routed to this worker, once per
    /// service.
    fn purge_tmp_files(&mut self, service_uuid: &str) {
        if self.swept.contains(service_uuid) {
            return;
        }
        let dir = self.service_dir.join(service_uuid).join(CONFIG_DIR_NAME);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.swept.insert(service_uuid.to_string());
                return;
            }
            Err(e) => {
                warn!("Failed to scan {} for temp files: {}", dir.display(), e);
                return;
            }
        };

        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(file_id) = name.strip_suffix(fileio::TMP_FILE_SUFFIX) else {
                continue;
            };
            if shard_for(&config_shard_key(service_uuid, file_id), self.shards) == self.shard {
                info!("Removing leftover temp file {}", entry.path().display());
                fileio::remove_quietly(&entry.path());
            }
        }
        self.swept.insert(service_uuid.to_string());
    }

    fn file_path(&self, service_uuid: &str, file_id: &str) -> PathBuf {
        self.service_dir
            .join(service_uuid)
            .join(CONFIG_DIR_NAME)
            .join(file_id)
    }

    fn read(path: &Path) -> DbResult<ConfigFile> {
        Ok(ConfigFile::decode(fileio::read_record(path)?.as_slice())?)
    }

    fn create(&self, file: ConfigFile) -> DbResult<()> {
        let md5 = content_md5_hex(file.content.as_bytes());
        if md5 != file.file_md5 {
            return Err(DbError::invalid_request(format!(
                "config file {}/{} md5 {} does not match content md5 {md5}",
                file.service_uuid, file.file_id, file.file_md5
            )));
        }

        let path = self.file_path(&file.service_uuid, &file.file_id);
        match Self::read(&path) {
            Ok(current) if current.content_eq(&file) => return Ok(()),
            Ok(_) => {
                return Err(DbError::conditional_check_failed(format!(
                    "config file {}/{} exists with different content",
                    file.service_uuid, file.file_id
                )));
            }
            Err(DbError::RecordNotFound(_)) => {}
            Err(e) => return Err(e),
        }

        if let Some(parent) = path.parent() {
            fileio::ensure_dir(parent)?;
        }
        fileio::write_record_atomic(&path, &file.encode_to_vec())
    }

    fn get(&self, key: &ConfigFileKey) -> DbResult<ConfigFile> {
        Self::read(&self.file_path(&key.service_uuid, &key.file_id)).map_err(|e| match e {
            DbError::RecordNotFound(_) => {
                DbError::not_found(format!("config file {}/{}", key.service_uuid, key.file_id))
            }
            other => other,
        })
    }

    fn delete(&self, key: &ConfigFileKey) -> DbResult<()> {
        fileio::remove_record(&self.file_path(&key.service_uuid, &key.file_id)).map_err(|e| {
            match e {
                DbError::RecordNotFound(_) => {
                    DbError::not_found(format!("config file {}/{}", key.service_uuid, key.file_id))
                }
                other => other,
            }
        })
    }
}

impl Handler for ConfigFileWorker {
    type Request = ConfigFileRequest;
    type Response = ConfigFileResponse;

    fn describe(req: &ConfigFileRequest) -> String {
        let op = match req {
            ConfigFileRequest::Create(_) => "create",
            ConfigFileRequest::Get(_) => "get",
            ConfigFileRequest::Delete(_) => "delete",
        };
        let (service_uuid, file_id) = req.key();
        format!("{op} {service_uuid}/{file_id}")
    }

    fn handle(&mut self, ctx: &RequestContext, req: ConfigFileRequest) -> DbResult<ConfigFileResponse> {
        let (service_uuid, file_id) = req.key();
        check_name("service_uuid", service_uuid)?;
        check_name("file_id", file_id)?;
        debug!(request_id = %ctx.request_id, "config file {}/{}", service_uuid, file_id);
        let service_uuid = service_uuid.to_string();
        self.purge_tmp_files(&service_uuid);

        match req {
            ConfigFileRequest::Create(file) => self.create(file).map(|()| ConfigFileResponse::Done),
            ConfigFileRequest::Get(key) => self.get(&key).map(ConfigFileResponse::File),
            ConfigFileRequest::Delete(key) => self.delete(&key).map(|()| ConfigFileResponse::Done),
        }
    }
}

fn unexpected_response(op: &str) -> DbError {
    DbError::internal(format!("unexpected response to config file {op}"))
}

pub struct ConfigFileService {
    actor: ShardedHandle<ConfigFileRequest, ConfigFileResponse>,
}

impl ConfigFileService {
    pub fn open(config: &ControlDbConfig) -> DbResult<Self> {
        let service_dir = config.cluster_dir().join(SERVICE_DIR_NAME);
        let shards = config.parallel_reqs;
        let actor = spawn_sharded(
            "config-file",
            shards,
            config.request_timeout(),
            |shard| Ok(ConfigFileWorker::new(service_dir.clone(), shard, shards)),
        )?;
        Ok(Self { actor })
    }

    /// Store `file`; its `file_md5` must be the hex MD5 of its content.
    pub async fn create_config_file(&self, ctx: &RequestContext, file: ConfigFile) -> DbResult<()> {
        match self.actor.call(ctx, ConfigFileRequest::Create(file)).await? {
            ConfigFileResponse::Done => Ok(()),
            ConfigFileResponse::File(_) => Err(unexpected_response("create")),
        }
    }

    pub async fn get_config_file(&self, ctx: &RequestContext, key: ConfigFileKey) -> DbResult<ConfigFile> {
        match self.actor.call(ctx, ConfigFileRequest::Get(key)).await? {
            ConfigFileResponse::File(file) => Ok(file),
            ConfigFileResponse::Done => Err(unexpected_response("get")),
        }
    }

    pub async fn delete_config_file(&self, ctx: &RequestContext, key: ConfigFileKey) -> DbResult<()> {
        match self.actor.call(ctx, ConfigFileRequest::Delete(key)).await? {
            ConfigFileResponse::Done => Ok(()),
            ConfigFileResponse::File(_) => Err(unexpected_response("delete")),
        }
    }

    pub async fn stop(&self) {
        self.actor.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config_file(uuid: &str, id: &str, content: &str) -> ConfigFile {
        ConfigFile {
            service_uuid: uuid.to_string(),
            file_id: id.to_string(),
            file_md5: content_md5_hex(content.as_bytes()),
            file_name: "mongod.conf".to_string(),
            file_mode: 0o600,
            last_modified: 1,
            content: content.to_string(),
        }
    }

    fn key(uuid: &str, id: &str) -> ConfigFileKey {
        ConfigFileKey {
            service_uuid: uuid.to_string(),
            file_id: id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_config_file_crud() {
        let dir = tempdir().unwrap();
        let config = ControlDbConfig::new(dir.path(), "c1");
        let svc = ConfigFileService::open(&config).unwrap();
        let ctx = RequestContext::new();

        let file = config_file("u1", "m0-mongod.conf", "net:\n  port: 27017\n");
        svc.create_config_file(&ctx, file.clone()).await.unwrap();
        assert_eq!(svc.get_config_file(&ctx, key("u1", "m0-mongod.conf")).await.unwrap(), file);
        assert!(config
            .cluster_dir()
            .join(SERVICE_DIR_NAME)
            .join("u1")
            .join(CONFIG_DIR_NAME)
            .join("m0-mongod.conf")
            .exists());

        svc.delete_config_file(&ctx, key("u1", "m0-mongod.conf")).await.unwrap();
        assert!(svc
            .get_config_file(&ctx, key("u1", "m0-mongod.conf"))
            .await
            .unwrap_err()
            .is_not_found());
        assert!(svc
            .delete_config_file(&ctx, key("u1", "m0-mongod.conf"))
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_config_file_idempotent_create() {
        let dir = tempdir().unwrap();
        let svc = ConfigFileService::open(&ControlDbConfig::new(dir.path(), "c1")).unwrap();
        let ctx = RequestContext::new();

        svc.create_config_file(&ctx, config_file("u1", "f1", "a=1")).await.unwrap();

        let mut retry = config_file("u1", "f1", "a=1");
        retry.last_modified = 42;
        svc.create_config_file(&ctx, retry).await.unwrap();

        let err = svc
            .create_config_file(&ctx, config_file("u1", "f1", "a=2"))
            .await
            .unwrap_err();
        assert!(err.is_conditional_check_failed());
    }

    #[tokio::test]
    async fn test_config_file_md5_mismatch() {
        let dir = tempdir().unwrap();
        let svc = ConfigFileService::open(&ControlDbConfig::new(dir.path(), "c1")).unwrap();
        let ctx = RequestContext::new();

        let mut file = config_file("u1", "f1", "a=1");
        file.file_md5 = content_md5_hex(b"something else");
        let err = svc.create_config_file(&ctx, file).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_config_file_many_services() {
        let dir = tempdir().unwrap();
        let svc = ConfigFileService::open(&ControlDbConfig::new(dir.path(), "c1")).unwrap();
        let ctx = RequestContext::new();

        let creates = (0..32).map(|i| {
            svc.create_config_file(&ctx, config_file(&format!("u{i}"), "f", &format!("v={i}")))
        });
        for result in futures::future::join_all(creates).await {
            result.unwrap();
        }
        for i in 0..32 {
            let file = svc
                .get_config_file(&ctx, key(&format!("u{i}"), "f"))
                .await
                .unwrap();
            assert_eq!(file.content, format!("v={i}"));
        }
    }

    #[tokio::test]
    async fn test_config_file_purges_tmp_on_first_access() {
        let dir = tempdir().unwrap();
        let config = ControlDbConfig::new(dir.path(), "c1");
        let ctx = RequestContext::new();
        {
            let svc = ConfigFileService::open(&config).unwrap();
            svc.create_config_file(&ctx, config_file("u1", "f1", "a=1")).await.unwrap();
            svc.stop().await;
        }

        let config_dir = config
            .cluster_dir()
            .join(SERVICE_DIR_NAME)
            .join("u1")
            .join(CONFIG_DIR_NAME);
        let leftovers: Vec<PathBuf> = (0..8)
            .map(|i| fileio::tmp_path(&config_dir.join(format!("f{i}"))))
            .collect();
        for path in &leftovers {
            fileio::write_record(path, b"half written").unwrap();
        }

        let svc = ConfigFileService::open(&config).unwrap();
        assert!(leftovers.iter().all(|p| p.exists()));

        // Each worker sweeps the temp files it owns the first time it
        // serves the service.
        for i in 0..8 {
            let _ = svc.get_config_file(&ctx, key("u1", &format!("f{i}"))).await;
        }
        assert!(leftovers.iter().all(|p| !p.exists()));
        assert_eq!(svc.get_config_file(&ctx, key("u1", "f1")).await.unwrap().content, "a=1");
    }
}
