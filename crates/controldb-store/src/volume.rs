//! Volumes, one file per volume under `servicedir/<service_uuid>/volumes`.

use crate::VOLUME_DIR_NAME;
use crate::actor::{self, ActorHandle};
use crate::collection::{
    CollectionHandler, CollectionRecord, CollectionRequest, CollectionResponse,
    unexpected_response,
};
use controldb_common::{ControlDbConfig, DbResult, RequestContext, Volume, VolumeKey};

impl CollectionRecord for Volume {
    const KIND: &'static str = "volume";
    const DIR_NAME: &'static str = VOLUME_DIR_NAME;

    fn service_uuid(&self) -> &str {
        &self.service_uuid
    }

    fn record_name(&self) -> &str {
        &self.volume_id
    }

    fn same_content(&self, other: &Self) -> bool {
        self.content_eq(other)
    }

    fn immutable_change(&self, other: &Self) -> Option<&'static str> {
        self.changed_immutable_field(other)
    }
}

pub struct VolumeService {
    actor: ActorHandle<CollectionRequest<Volume>, CollectionResponse<Volume>>,
}

impl VolumeService {
    pub fn open(config: &ControlDbConfig) -> DbResult<Self> {
        let handler = CollectionHandler::<Volume>::new(config, config.volume_cache_size);
        let actor = actor::spawn("volume", handler, config.request_timeout())?;
        Ok(Self { actor })
    }

    pub async fn create_volume(&self, ctx: &RequestContext, volume: Volume) -> DbResult<()> {
        match self.actor.call(ctx, CollectionRequest::Create(volume)).await? {
            CollectionResponse::Done => Ok(()),
            _ => Err(unexpected_response("volume", "create")),
        }
    }

    pub async fn get_volume(&self, ctx: &RequestContext, key: VolumeKey) -> DbResult<Volume> {
        let req = CollectionRequest::Get {
            service_uuid: key.service_uuid,
            name: key.volume_id,
        };
        match self.actor.call(ctx, req).await? {
            CollectionResponse::Record(volume) => Ok(volume),
            _ => Err(unexpected_response("volume", "get")),
        }
    }

    pub async fn update_volume(&self, ctx: &RequestContext, old: Volume, new: Volume) -> DbResult<Volume> {
        match self.actor.call(ctx, CollectionRequest::Update { old, new }).await? {
            CollectionResponse::Record(volume) => Ok(volume),
            _ => Err(unexpected_response("volume", "update")),
        }
    }

    pub async fn delete_volume(&self, ctx: &RequestContext, key: VolumeKey) -> DbResult<()> {
        let req = CollectionRequest::Delete {
            service_uuid: key.service_uuid,
            name: key.volume_id,
        };
        match self.actor.call(ctx, req).await? {
            CollectionResponse::Done => Ok(()),
            _ => Err(unexpected_response("volume", "delete")),
        }
    }

    pub async fn list_volumes(&self, ctx: &RequestContext, service_uuid: String) -> DbResult<Vec<Volume>> {
        match self.actor.call(ctx, CollectionRequest::List { service_uuid }).await? {
            CollectionResponse::Records(volumes) => Ok(volumes),
            _ => Err(unexpected_response("volume", "list")),
        }
    }

    pub async fn stop(&self) {
        self.actor.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use controldb_common::DbError;
    use tempfile::tempdir;

    fn volume(uuid: &str, id: &str, task: &str) -> Volume {
        Volume {
            service_uuid: uuid.to_string(),
            volume_id: id.to_string(),
            last_modified: 5,
            device_name: "/dev/xvdf".to_string(),
            available_zone: "us-west-2a".to_string(),
            task_id: task.to_string(),
            member_name: "m0".to_string(),
            ..Default::default()
        }
    }

    fn key(uuid: &str, id: &str) -> VolumeKey {
        VolumeKey {
            service_uuid: uuid.to_string(),
            volume_id: id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_volume_crud() {
        let dir = tempdir().unwrap();
        let svc = VolumeService::open(&ControlDbConfig::new(dir.path(), "c1")).unwrap();
        let ctx = RequestContext::new();

        svc.create_volume(&ctx, volume("u1", "vol-2", "")).await.unwrap();
        svc.create_volume(&ctx, volume("u1", "vol-1", "")).await.unwrap();
        svc.create_volume(&ctx, volume("u1", "vol-1", "")).await.unwrap();
        assert!(svc
            .create_volume(&ctx, volume("u1", "vol-1", "t"))
            .await
            .unwrap_err()
            .is_conditional_check_failed());

        let ids: Vec<String> = svc
            .list_volumes(&ctx, "u1".to_string())
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.volume_id)
            .collect();
        assert_eq!(ids, vec!["vol-1", "vol-2"]);

        let updated = svc
            .update_volume(&ctx, volume("u1", "vol-1", ""), volume("u1", "vol-1", "task-9"))
            .await
            .unwrap();
        assert_eq!(svc.get_volume(&ctx, key("u1", "vol-1")).await.unwrap(), updated);

        let mut moved = updated.clone();
        moved.device_name = "/dev/xvdg".to_string();
        assert!(matches!(
            svc.update_volume(&ctx, updated, moved).await,
            Err(DbError::InvalidRequest(_))
        ));

        svc.delete_volume(&ctx, key("u1", "vol-1")).await.unwrap();
        svc.delete_volume(&ctx, key("u1", "vol-2")).await.unwrap();
        assert!(svc.list_volumes(&ctx, "u1".to_string()).await.unwrap().is_empty());
        assert!(svc.get_volume(&ctx, key("u1", "vol-1")).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_volume_update_fencing() {
        let dir = tempdir().unwrap();
        let svc = VolumeService::open(&ControlDbConfig::new(dir.path(), "c1")).unwrap();
        let ctx = RequestContext::new();

        let original = volume("u1", "vol-1", "");
        svc.create_volume(&ctx, original.clone()).await.unwrap();
        let owned = svc
            .update_volume(&ctx, original.clone(), volume("u1", "vol-1", "task-1"))
            .await
            .unwrap();

        // Stale old value
        let err = svc
            .update_volume(&ctx, original, volume("u1", "vol-1", "task-2"))
            .await
            .unwrap_err();
        assert!(err.is_conditional_check_failed());
        assert_eq!(svc.get_volume(&ctx, key("u1", "vol-1")).await.unwrap(), owned);

        let missing = volume("u1", "vol-9", "");
        assert!(svc
            .update_volume(&ctx, missing.clone(), missing)
            .await
            .unwrap_err()
            .is_not_found());
        assert!(svc
            .update_volume(&ctx, volume("u2", "vol-1", ""), volume("u2", "vol-1", "t"))
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_volume_eviction_keeps_data() {
        let dir = tempdir().unwrap();
        let cache_size = 2;
        let config = ControlDbConfig {
            volume_cache_size: cache_size,
            ..ControlDbConfig::new(dir.path(), "c1")
        };
        let svc = VolumeService::open(&config).unwrap();
        let ctx = RequestContext::new();

        for i in 0..cache_size + 2 {
            let uuid = format!("u{i}");
            svc.create_volume(&ctx, volume(&uuid, "vol-1", "")).await.unwrap();
            svc.update_volume(&ctx, volume(&uuid, "vol-1", ""), volume(&uuid, "vol-1", "t2"))
                .await
                .unwrap();
        }

        // u0 was evicted and is reloaded from disk
        assert_eq!(svc.get_volume(&ctx, key("u0", "vol-1")).await.unwrap().task_id, "t2");
        let listed = svc.list_volumes(&ctx, "u1".to_string()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].task_id, "t2");
    }
}
