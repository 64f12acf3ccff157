//! Service members, one file per member under
//! `servicedir/<service_uuid>/members`.

use crate::MEMBER_DIR_NAME;
use crate::actor::{self, ActorHandle};
use crate::collection::{
    CollectionHandler, CollectionRecord, CollectionRequest, CollectionResponse,
    unexpected_response,
};
use controldb_common::{ControlDbConfig, DbResult, RequestContext, ServiceMember, ServiceMemberKey};

impl CollectionRecord for ServiceMember {
    const KIND: &'static str = "service member";
    const DIR_NAME: &'static str = MEMBER_DIR_NAME;

    fn service_uuid(&self) -> &str {
        &self.service_uuid
    }

    fn record_name(&self) -> &str {
        &self.member_name
    }

    fn same_content(&self, other: &Self) -> bool {
        self.content_eq(other)
    }

    fn immutable_change(&self, other: &Self) -> Option<&'static str> {
        self.changed_immutable_field(other)
    }

    fn advance_from(&mut self, current: &Self) {
        self.revision = current.revision + 1;
    }
}

type MemberActor = ActorHandle<CollectionRequest<ServiceMember>, CollectionResponse<ServiceMember>>;

pub struct ServiceMemberService {
    actor: MemberActor,
}

impl ServiceMemberService {
    pub fn open(config: &ControlDbConfig) -> DbResult<Self> {
        let handler = CollectionHandler::<ServiceMember>::new(config, config.member_cache_size);
        let actor = actor::spawn("service-member", handler, config.request_timeout())?;
        Ok(Self { actor })
    }

    pub async fn create_service_member(&self, ctx: &RequestContext, member: ServiceMember) -> DbResult<()> {
        match self.actor.call(ctx, CollectionRequest::Create(member)).await? {
            CollectionResponse::Done => Ok(()),
            _ => Err(unexpected_response("service member", "create")),
        }
    }

    pub async fn get_service_member(&self, ctx: &RequestContext, key: ServiceMemberKey) -> DbResult<ServiceMember> {
        let req = CollectionRequest::Get {
            service_uuid: key.service_uuid,
            name: key.member_name,
        };
        match self.actor.call(ctx, req).await? {
            CollectionResponse::Record(member) => Ok(member),
            _ => Err(unexpected_response("service member", "get")),
        }
    }

    /// Replace the member if it still equals `old`; returns the stored
    /// member with its advanced revision.
    pub async fn update_service_member(
        &self,
        ctx: &RequestContext,
        old: ServiceMember,
        new: ServiceMember,
    ) -> DbResult<ServiceMember> {
        match self.actor.call(ctx, CollectionRequest::Update { old, new }).await? {
            CollectionResponse::Record(member) => Ok(member),
            _ => Err(unexpected_response("service member", "update")),
        }
    }

    pub async fn delete_service_member(&self, ctx: &RequestContext, key: ServiceMemberKey) -> DbResult<()> {
        let req = CollectionRequest::Delete {
            service_uuid: key.service_uuid,
            name: key.member_name,
        };
        match self.actor.call(ctx, req).await? {
            CollectionResponse::Done => Ok(()),
            _ => Err(unexpected_response("service member", "delete")),
        }
    }

    /// Members of a service, ordered by member name
    pub async fn list_service_members(&self, ctx: &RequestContext, service_uuid: String) -> DbResult<Vec<ServiceMember>> {
        match self.actor.call(ctx, CollectionRequest::List { service_uuid }).await? {
            CollectionResponse::Records(members) => Ok(members),
            _ => Err(unexpected_response("service member", "list")),
        }
    }

    pub async fn stop(&self) {
        self.actor.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SERVICE_DIR_NAME, fileio};
    use controldb_common::{DbError, MemberConfig, MemberVolumes};
    use std::path::Path;
    use tempfile::tempdir;

    fn test_config(dir: &Path, cache_size: usize) -> ControlDbConfig {
        ControlDbConfig {
            member_cache_size: cache_size,
            ..ControlDbConfig::new(dir, "c1")
        }
    }

    fn member(uuid: &str, name: &str, task: &str) -> ServiceMember {
        ServiceMember {
            service_uuid: uuid.to_string(),
            member_name: name.to_string(),
            available_zone: "us-east-1a".to_string(),
            task_id: task.to_string(),
            last_modified: 10,
            volumes: Some(MemberVolumes {
                primary_volume_id: format!("vol-{name}"),
                primary_device_name: "/dev/xvdf".to_string(),
                ..Default::default()
            }),
            configs: vec![MemberConfig {
                file_name: "mongod.conf".to_string(),
                file_id: format!("{name}-mongod.conf"),
                file_md5: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
            }],
            ..Default::default()
        }
    }

    fn key(uuid: &str, name: &str) -> ServiceMemberKey {
        ServiceMemberKey {
            service_uuid: uuid.to_string(),
            member_name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_member_crud() {
        let dir = tempdir().unwrap();
        let svc = ServiceMemberService::open(&test_config(dir.path(), 5)).unwrap();
        let ctx = RequestContext::new();

        svc.create_service_member(&ctx, member("u1", "m0", "")).await.unwrap();
        svc.create_service_member(&ctx, member("u1", "m1", "")).await.unwrap();

        assert_eq!(
            svc.get_service_member(&ctx, key("u1", "m1")).await.unwrap(),
            member("u1", "m1", "")
        );
        let names: Vec<String> = svc
            .list_service_members(&ctx, "u1".to_string())
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.member_name)
            .collect();
        assert_eq!(names, vec!["m0", "m1"]);

        svc.delete_service_member(&ctx, key("u1", "m0")).await.unwrap();
        assert!(svc.get_service_member(&ctx, key("u1", "m0")).await.unwrap_err().is_not_found());
        assert!(svc.delete_service_member(&ctx, key("u1", "m0")).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_member_idempotent_create_ignores_mtime() {
        let dir = tempdir().unwrap();
        let svc = ServiceMemberService::open(&test_config(dir.path(), 5)).unwrap();
        let ctx = RequestContext::new();

        svc.create_service_member(&ctx, member("u1", "m0", "")).await.unwrap();
        let mut retry = member("u1", "m0", "");
        retry.last_modified = 99;
        svc.create_service_member(&ctx, retry).await.unwrap();

        let err = svc
            .create_service_member(&ctx, member("u1", "m0", "task-1"))
            .await
            .unwrap_err();
        assert!(err.is_conditional_check_failed());
    }

    #[tokio::test]
    async fn test_member_update() {
        let dir = tempdir().unwrap();
        let svc = ServiceMemberService::open(&test_config(dir.path(), 5)).unwrap();
        let ctx = RequestContext::new();

        let original = member("u1", "m0", "");
        svc.create_service_member(&ctx, original.clone()).await.unwrap();

        let owned = svc
            .update_service_member(&ctx, original.clone(), member("u1", "m0", "task-1"))
            .await
            .unwrap();
        assert_eq!(owned.task_id, "task-1");
        assert_eq!(owned.revision, 1);

        // Stale old value
        let err = svc
            .update_service_member(&ctx, original, member("u1", "m0", "task-2"))
            .await
            .unwrap_err();
        assert!(err.is_conditional_check_failed());

        // Immutable field
        let mut moved = member("u1", "m0", "task-1");
        moved.available_zone = "us-east-1b".to_string();
        let err = svc
            .update_service_member(&ctx, owned.clone(), moved)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidRequest(_)));

        let missing = member("u1", "m9", "");
        let err = svc
            .update_service_member(&ctx, missing.clone(), missing)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        assert_eq!(
            svc.get_service_member(&ctx, key("u1", "m0")).await.unwrap(),
            owned
        );
    }

    #[tokio::test]
    async fn test_member_unknown_service() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path(), 5);
        let svc = ServiceMemberService::open(&config).unwrap();
        let ctx = RequestContext::new();

        assert!(svc
            .list_service_members(&ctx, "nope".to_string())
            .await
            .unwrap()
            .is_empty());
        assert!(svc.get_service_member(&ctx, key("nope", "m0")).await.unwrap_err().is_not_found());
        assert!(!config.cluster_dir().join(SERVICE_DIR_NAME).join("nope").exists());
    }

    #[tokio::test]
    async fn test_member_eviction_keeps_data() {
        let dir = tempdir().unwrap();
        let cache_size = 2;
        let svc = ServiceMemberService::open(&test_config(dir.path(), cache_size)).unwrap();
        let ctx = RequestContext::new();

        for i in 0..cache_size + 2 {
            let uuid = format!("u{i}");
            svc.create_service_member(&ctx, member(&uuid, "m0", "")).await.unwrap();
            svc.update_service_member(&ctx, member(&uuid, "m0", ""), member(&uuid, "m0", "t2"))
                .await
                .unwrap();
        }

        let first = svc.get_service_member(&ctx, key("u0", "m0")).await.unwrap();
        assert_eq!(first.task_id, "t2");
        assert_eq!(first.revision, 1);
    }

    #[tokio::test]
    async fn test_member_reload_purges_tmp() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path(), 5);
        let ctx = RequestContext::new();
        {
            let svc = ServiceMemberService::open(&config).unwrap();
            svc.create_service_member(&ctx, member("u1", "m0", "")).await.unwrap();
            svc.stop().await;
        }

        let member_dir = config
            .cluster_dir()
            .join(SERVICE_DIR_NAME)
            .join("u1")
            .join(MEMBER_DIR_NAME);
        let leftover = fileio::tmp_path(&member_dir.join("m1"));
        fileio::write_record(&leftover, b"half written").unwrap();

        let svc = ServiceMemberService::open(&config).unwrap();
        let members = svc.list_service_members(&ctx, "u1".to_string()).await.unwrap();
        assert_eq!(members, vec![member("u1", "m0", "")]);
        assert!(!leftover.exists());
    }

    #[tokio::test]
    async fn test_member_invalid_names() {
        let dir = tempdir().unwrap();
        let svc = ServiceMemberService::open(&test_config(dir.path(), 5)).unwrap();
        let ctx = RequestContext::new();

        let err = svc
            .create_service_member(&ctx, member("../u1", "m0", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidRequest(_)));

        let err = svc
            .create_service_member(&ctx, member("u1", "m0.tmp", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidRequest(_)));
    }
}
