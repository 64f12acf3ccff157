//! Request facade
//!
//! `ControlDbServer` owns one instance of every entity service for a
//! cluster and exposes them through the `ControlDb` trait, one method per
//! operation. Methods unwrap the transport request, delegate, and map
//! `DbError` onto `Status`.

use controldb_common::{
    ConfigFile, ConfigFileKey, ControlDbConfig, DbError, DbResult, Device, DeviceKey,
    RequestContext, Service, ServiceAttr, ServiceAttrKey, ServiceKey, ServiceMember,
    ServiceMemberKey, ServiceStaticIp, ServiceStaticIpKey, Volume, VolumeKey,
};
use controldb_store::{
    ConfigFileService, DeviceService, SERVICE_DIR_NAME, ServiceAttrService, ServiceMemberService,
    ServiceService, StaticIpService, VolumeService, fileio,
};
use std::sync::atomic::{AtomicBool, Ordering};
use tonic::{Request, Response, Status};
use tracing::{debug, info};

/// Metadata key carrying a caller-chosen request id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone, PartialEq, prost::Message)]
pub struct UpdateServiceAttrRequest {
    #[prost(message, optional, tag = "1")]
    pub old_attr: Option<ServiceAttr>,
    #[prost(message, optional, tag = "2")]
    pub new_attr: Option<ServiceAttr>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UpdateServiceMemberRequest {
    #[prost(message, optional, tag = "1")]
    pub old_member: Option<ServiceMember>,
    #[prost(message, optional, tag = "2")]
    pub new_member: Option<ServiceMember>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UpdateVolumeRequest {
    #[prost(message, optional, tag = "1")]
    pub old_vol: Option<Volume>,
    #[prost(message, optional, tag = "2")]
    pub new_vol: Option<Volume>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UpdateServiceStaticIpRequest {
    #[prost(message, optional, tag = "1")]
    pub old_ip: Option<ServiceStaticIp>,
    #[prost(message, optional, tag = "2")]
    pub new_ip: Option<ServiceStaticIp>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ListDevicesRequest {
    #[prost(string, tag = "1")]
    pub cluster_name: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ListServicesRequest {
    #[prost(string, tag = "1")]
    pub cluster_name: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ListServiceMembersRequest {
    #[prost(string, tag = "1")]
    pub service_uuid: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ListVolumesRequest {
    #[prost(string, tag = "1")]
    pub service_uuid: String,
}

/// One method per entity operation
#[tonic::async_trait]
pub trait ControlDb: Send + Sync + 'static {
    async fn create_device(&self, request: Request<Device>) -> Result<Response<()>, Status>;
    async fn get_device(&self, request: Request<DeviceKey>) -> Result<Response<Device>, Status>;
    async fn delete_device(&self, request: Request<DeviceKey>) -> Result<Response<()>, Status>;
    async fn list_devices(
        &self,
        request: Request<ListDevicesRequest>,
    ) -> Result<Response<Vec<Device>>, Status>;

    async fn create_service(&self, request: Request<Service>) -> Result<Response<()>, Status>;
    async fn get_service(&self, request: Request<ServiceKey>) -> Result<Response<Service>, Status>;
    async fn delete_service(&self, request: Request<ServiceKey>) -> Result<Response<()>, Status>;
    async fn list_services(
        &self,
        request: Request<ListServicesRequest>,
    ) -> Result<Response<Vec<Service>>, Status>;

    async fn create_service_attr(&self, request: Request<ServiceAttr>) -> Result<Response<()>, Status>;
    async fn get_service_attr(
        &self,
        request: Request<ServiceAttrKey>,
    ) -> Result<Response<ServiceAttr>, Status>;
    async fn update_service_attr(
        &self,
        request: Request<UpdateServiceAttrRequest>,
    ) -> Result<Response<ServiceAttr>, Status>;
    async fn delete_service_attr(&self, request: Request<ServiceAttrKey>) -> Result<Response<()>, Status>;

    async fn create_service_member(&self, request: Request<ServiceMember>) -> Result<Response<()>, Status>;
    async fn get_service_member(
        &self,
        request: Request<ServiceMemberKey>,
    ) -> Result<Response<ServiceMember>, Status>;
    async fn update_service_member(
        &self,
        request: Request<UpdateServiceMemberRequest>,
    ) -> Result<Response<ServiceMember>, Status>;
    async fn delete_service_member(
        &self,
        request: Request<ServiceMemberKey>,
    ) -> Result<Response<()>, Status>;
    async fn list_service_members(
        &self,
        request: Request<ListServiceMembersRequest>,
    ) -> Result<Response<Vec<ServiceMember>>, Status>;

    async fn create_volume(&self, request: Request<Volume>) -> Result<Response<()>, Status>;
    async fn get_volume(&self, request: Request<VolumeKey>) -> Result<Response<Volume>, Status>;
    async fn update_volume(
        &self,
        request: Request<UpdateVolumeRequest>,
    ) -> Result<Response<Volume>, Status>;
    async fn delete_volume(&self, request: Request<VolumeKey>) -> Result<Response<()>, Status>;
    async fn list_volumes(
        &self,
        request: Request<ListVolumesRequest>,
    ) -> Result<Response<Vec<Volume>>, Status>;

    async fn create_config_file(&self, request: Request<ConfigFile>) -> Result<Response<()>, Status>;
    async fn get_config_file(
        &self,
        request: Request<ConfigFileKey>,
    ) -> Result<Response<ConfigFile>, Status>;
    async fn delete_config_file(&self, request: Request<ConfigFileKey>) -> Result<Response<()>, Status>;

    async fn create_service_static_ip(
        &self,
        request: Request<ServiceStaticIp>,
    ) -> Result<Response<()>, Status>;
    async fn get_service_static_ip(
        &self,
        request: Request<ServiceStaticIpKey>,
    ) -> Result<Response<ServiceStaticIp>, Status>;
    async fn update_service_static_ip(
        &self,
        request: Request<UpdateServiceStaticIpRequest>,
    ) -> Result<Response<ServiceStaticIp>, Status>;
    async fn delete_service_static_ip(
        &self,
        request: Request<ServiceStaticIpKey>,
    ) -> Result<Response<()>, Status>;
}

/// All entity services of one cluster
pub struct ControlDbServer {
    config: ControlDbConfig,
    serving: AtomicBool,
    devices: DeviceService,
    services: ServiceService,
    attrs: ServiceAttrService,
    members: ServiceMemberService,
    volumes: VolumeService,
    config_files: ConfigFileService,
    static_ips: StaticIpService,
}

impl ControlDbServer {
    /// Open every entity service under `<data_dir>/<cluster_name>`.
    pub fn open(config: ControlDbConfig) -> DbResult<Self> {
        config.validate()?;
        let cluster_dir = config.cluster_dir();
        fileio::ensure_dir(&cluster_dir.join(SERVICE_DIR_NAME))?;

        info!(
            "Opening controldb for cluster {} at {}",
            config.cluster_name,
            cluster_dir.display()
        );

        let server = Self {
            devices: DeviceService::open(&config)?,
            services: ServiceService::open(&config)?,
            attrs: ServiceAttrService::open(&config)?,
            members: ServiceMemberService::open(&config)?,
            volumes: VolumeService::open(&config)?,
            config_files: ConfigFileService::open(&config)?,
            static_ips: StaticIpService::open(&config)?,
            serving: AtomicBool::new(true),
            config,
        };
        Ok(server)
    }

    #[must_use]
    pub const fn config(&self) -> &ControlDbConfig {
        &self.config
    }

    /// Refuse new requests, then stop each service in turn.
    pub async fn shutdown(&self) {
        if !self.serving.swap(false, Ordering::SeqCst) {
            debug!("controldb already shut down");
            return;
        }
        info!("Stopping controldb for cluster {}", self.config.cluster_name);

        self.config_files.stop().await;
        self.static_ips.stop().await;
        self.volumes.stop().await;
        self.members.stop().await;
        self.attrs.stop().await;
        self.services.stop();
        self.devices.stop();

        info!("controldb stopped");
    }

    /// Request context for an incoming request, or `unavailable` once
    /// shutdown has begun.
    fn begin<T>(&self, op: &str, request: &Request<T>) -> Result<RequestContext, Status> {
        if !self.serving.load(Ordering::SeqCst) {
            return Err(Status::unavailable("controldb is shutting down"));
        }
        let ctx = request
            .metadata()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map_or_else(RequestContext::new, RequestContext::with_request_id);
        debug!(request_id = %ctx.request_id, "{}", op);
        Ok(ctx)
    }
}

fn required<T>(field: Option<T>, name: &str) -> Result<T, Status> {
    field.ok_or_else(|| Status::from(DbError::invalid_request(format!("{name} is required"))))
}

#[tonic::async_trait]
impl ControlDb for ControlDbServer {
    async fn create_device(&self, request: Request<Device>) -> Result<Response<()>, Status> {
        let ctx = self.begin("CreateDevice", &request)?;
        self.devices.create_device(&ctx, request.into_inner())?;
        Ok(Response::new(()))
    }

    async fn get_device(&self, request: Request<DeviceKey>) -> Result<Response<Device>, Status> {
        let ctx = self.begin("GetDevice", &request)?;
        let device = self.devices.get_device(&ctx, request.get_ref())?;
        Ok(Response::new(device))
    }

    async fn delete_device(&self, request: Request<DeviceKey>) -> Result<Response<()>, Status> {
        let ctx = self.begin("DeleteDevice", &request)?;
        self.devices.delete_device(&ctx, request.get_ref())?;
        Ok(Response::new(()))
    }

    async fn list_devices(
        &self,
        request: Request<ListDevicesRequest>,
    ) -> Result<Response<Vec<Device>>, Status> {
        self.begin("ListDevices", &request)?;
        let devices = self.devices.list_devices(&request.get_ref().cluster_name)?;
        Ok(Response::new(devices))
    }

    async fn create_service(&self, request: Request<Service>) -> Result<Response<()>, Status> {
        let ctx = self.begin("CreateService", &request)?;
        self.services.create_service(&ctx, request.into_inner())?;
        Ok(Response::new(()))
    }

    async fn get_service(&self, request: Request<ServiceKey>) -> Result<Response<Service>, Status> {
        let ctx = self.begin("GetService", &request)?;
        let service = self.services.get_service(&ctx, request.get_ref())?;
        Ok(Response::new(service))
    }

    async fn delete_service(&self, request: Request<ServiceKey>) -> Result<Response<()>, Status> {
        let ctx = self.begin("DeleteService", &request)?;
        self.services.delete_service(&ctx, request.get_ref())?;
        Ok(Response::new(()))
    }

    async fn list_services(
        &self,
        request: Request<ListServicesRequest>,
    ) -> Result<Response<Vec<Service>>, Status> {
        self.begin("ListServices", &request)?;
        let services = self.services.list_services(&request.get_ref().cluster_name)?;
        Ok(Response::new(services))
    }

    async fn create_service_attr(&self, request: Request<ServiceAttr>) -> Result<Response<()>, Status> {
        let ctx = self.begin("CreateServiceAttr", &request)?;
        self.attrs
            .create_service_attr(&ctx, request.into_inner())
            .await?;
        Ok(Response::new(()))
    }

    async fn get_service_attr(
        &self,
        request: Request<ServiceAttrKey>,
    ) -> Result<Response<ServiceAttr>, Status> {
        let ctx = self.begin("GetServiceAttr", &request)?;
        let attr = self.attrs.get_service_attr(&ctx, request.into_inner()).await?;
        Ok(Response::new(attr))
    }

    async fn update_service_attr(
        &self,
        request: Request<UpdateServiceAttrRequest>,
    ) -> Result<Response<ServiceAttr>, Status> {
        let ctx = self.begin("UpdateServiceAttr", &request)?;
        let req = request.into_inner();
        let old = required(req.old_attr, "old_attr")?;
        let new = required(req.new_attr, "new_attr")?;
        let attr = self.attrs.update_service_attr(&ctx, old, new).await?;
        Ok(Response::new(attr))
    }

    async fn delete_service_attr(&self, request: Request<ServiceAttrKey>) -> Result<Response<()>, Status> {
        let ctx = self.begin("DeleteServiceAttr", &request)?;
        self.attrs
            .delete_service_attr(&ctx, request.into_inner())
            .await?;
        Ok(Response::new(()))
    }

    async fn create_service_member(&self, request: Request<ServiceMember>) -> Result<Response<()>, Status> {
        let ctx = self.begin("CreateServiceMember", &request)?;
        self.members
            .create_service_member(&ctx, request.into_inner())
            .await?;
        Ok(Response::new(()))
    }

    async fn get_service_member(
        &self,
        request: Request<ServiceMemberKey>,
    ) -> Result<Response<ServiceMember>, Status> {
        let ctx = self.begin("GetServiceMember", &request)?;
        let member = self
            .members
            .get_service_member(&ctx, request.into_inner())
            .await?;
        Ok(Response::new(member))
    }

    async fn update_service_member(
        &self,
        request: Request<UpdateServiceMemberRequest>,
    ) -> Result<Response<ServiceMember>, Status> {
        let ctx = self.begin("UpdateServiceMember", &request)?;
        let req = request.into_inner();
        let old = required(req.old_member, "old_member")?;
        let new = required(req.new_member, "new_member")?;
        let member = self.members.update_service_member(&ctx, old, new).await?;
        Ok(Response::new(member))
    }

    async fn delete_service_member(
        &self,
        request: Request<ServiceMemberKey>,
    ) -> Result<Response<()>, Status> {
        let ctx = self.begin("DeleteServiceMember", &request)?;
        self.members
            .delete_service_member(&ctx, request.into_inner())
            .await?;
        Ok(Response::new(()))
    }

    async fn list_service_members(
        &self,
        request: Request<ListServiceMembersRequest>,
    ) -> Result<Response<Vec<ServiceMember>>, Status> {
        let ctx = self.begin("ListServiceMembers", &request)?;
        let members = self
            .members
            .list_service_members(&ctx, request.into_inner().service_uuid)
            .await?;
        Ok(Response::new(members))
    }

    async fn create_volume(&self, request: Request<Volume>) -> Result<Response<()>, Status> {
        let ctx = self.begin("CreateVolume", &request)?;
        self.volumes.create_volume(&ctx, request.into_inner()).await?;
        Ok(Response::new(()))
    }

    async fn get_volume(&self, request: Request<VolumeKey>) -> Result<Response<Volume>, Status> {
        let ctx = self.begin("GetVolume", &request)?;
        let volume = self.volumes.get_volume(&ctx, request.into_inner()).await?;
        Ok(Response::new(volume))
    }

    async fn update_volume(
        &self,
        request: Request<UpdateVolumeRequest>,
    ) -> Result<Response<Volume>, Status> {
        let ctx = self.begin("UpdateVolume", &request)?;
        let req = request.into_inner();
        let old = required(req.old_vol, "old_vol")?;
        let new = required(req.new_vol, "new_vol")?;
        let volume = self.volumes.update_volume(&ctx, old, new).await?;
        Ok(Response::new(volume))
    }

    async fn delete_volume(&self, request: Request<VolumeKey>) -> Result<Response<()>, Status> {
        let ctx = self.begin("DeleteVolume", &request)?;
        self.volumes.delete_volume(&ctx, request.into_inner()).await?;
        Ok(Response::new(()))
    }

    async fn list_volumes(
        &self,
        request: Request<ListVolumesRequest>,
    ) -> Result<Response<Vec<Volume>>, Status> {
        let ctx = self.begin("ListVolumes", &request)?;
        let volumes = self
            .volumes
            .list_volumes(&ctx, request.into_inner().service_uuid)
            .await?;
        Ok(Response::new(volumes))
    }

    async fn create_config_file(&self, request: Request<ConfigFile>) -> Result<Response<()>, Status> {
        let ctx = self.begin("CreateConfigFile", &request)?;
        self.config_files
            .create_config_file(&ctx, request.into_inner())
            .await?;
        Ok(Response::new(()))
    }

    async fn get_config_file(
        &self,
        request: Request<ConfigFileKey>,
    ) -> Result<Response<ConfigFile>, Status> {
        let ctx = self.begin("GetConfigFile", &request)?;
        let file = self
            .config_files
            .get_config_file(&ctx, request.into_inner())
            .await?;
        Ok(Response::new(file))
    }

    async fn delete_config_file(&self, request: Request<ConfigFileKey>) -> Result<Response<()>, Status> {
        let ctx = self.begin("DeleteConfigFile", &request)?;
        self.config_files
            .delete_config_file(&ctx, request.into_inner())
            .await?;
        Ok(Response::new(()))
    }

    async fn create_service_static_ip(
        &self,
        request: Request<ServiceStaticIp>,
    ) -> Result<Response<()>, Status> {
        let ctx = self.begin("CreateServiceStaticIP", &request)?;
        self.static_ips
            .create_service_static_ip(&ctx, request.into_inner())
            .await?;
        Ok(Response::new(()))
    }

    async fn get_service_static_ip(
        &self,
        request: Request<ServiceStaticIpKey>,
    ) -> Result<Response<ServiceStaticIp>, Status> {
        let ctx = self.begin("GetServiceStaticIP", &request)?;
        let ip = self
            .static_ips
            .get_service_static_ip(&ctx, request.into_inner())
            .await?;
        Ok(Response::new(ip))
    }

    async fn update_service_static_ip(
        &self,
        request: Request<UpdateServiceStaticIpRequest>,
    ) -> Result<Response<ServiceStaticIp>, Status> {
        let ctx = self.begin("UpdateServiceStaticIP", &request)?;
        let req = request.into_inner();
        let old = required(req.old_ip, "old_ip")?;
        let new = required(req.new_ip, "new_ip")?;
        let ip = self.static_ips.update_service_static_ip(&ctx, old, new).await?;
        Ok(Response::new(ip))
    }

    async fn delete_service_static_ip(
        &self,
        request: Request<ServiceStaticIpKey>,
    ) -> Result<Response<()>, Status> {
        let ctx = self.begin("DeleteServiceStaticIP", &request)?;
        self.static_ips
            .delete_service_static_ip(&ctx, request.into_inner())
            .await?;
        Ok(Response::new(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use controldb_common::content_md5_hex;
    use tempfile::tempdir;
    use tonic::Code;

    fn open(dir: &std::path::Path) -> ControlDbServer {
        ControlDbServer::open(ControlDbConfig::new(dir, "c1")).unwrap()
    }

    fn attr(uuid: &str, status: &str) -> ServiceAttr {
        ServiceAttr {
            service_uuid: uuid.to_string(),
            service_status: status.to_string(),
            last_modified: 1,
            replicas: 3,
            cluster_name: "c1".to_string(),
            service_name: "mongo".to_string(),
            service_type: "mongodb".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_facade_service_lifecycle() {
        let dir = tempdir().unwrap();
        let server = open(dir.path());

        let device = Device {
            cluster_name: "c1".to_string(),
            device_name: "/dev/xvdf".to_string(),
            service_name: "mongo".to_string(),
        };
        server.create_device(Request::new(device.clone())).await.unwrap();
        let devices = server
            .list_devices(Request::new(ListDevicesRequest {
                cluster_name: "c1".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(devices, vec![device]);

        let service = Service {
            cluster_name: "c1".to_string(),
            service_name: "mongo".to_string(),
            service_uuid: "u1".to_string(),
        };
        server.create_service(Request::new(service.clone())).await.unwrap();
        let got = server
            .get_service(Request::new(service.key()))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(got, service);

        server
            .create_service_attr(Request::new(attr("u1", "CREATING")))
            .await
            .unwrap();
        let updated = server
            .update_service_attr(Request::new(UpdateServiceAttrRequest {
                old_attr: Some(attr("u1", "CREATING")),
                new_attr: Some(attr("u1", "ACTIVE")),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(updated.revision, 1);

        let member = ServiceMember {
            service_uuid: "u1".to_string(),
            member_name: "m0".to_string(),
            available_zone: "us-east-1a".to_string(),
            ..Default::default()
        };
        server
            .create_service_member(Request::new(member.clone()))
            .await
            .unwrap();
        let members = server
            .list_service_members(Request::new(ListServiceMembersRequest {
                service_uuid: "u1".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(members, vec![member]);

        let volume = Volume {
            service_uuid: "u1".to_string(),
            volume_id: "vol-1".to_string(),
            device_name: "/dev/xvdf".to_string(),
            ..Default::default()
        };
        server.create_volume(Request::new(volume.clone())).await.unwrap();
        let got = server
            .get_volume(Request::new(volume.key()))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(got, volume);

        let file = ConfigFile {
            service_uuid: "u1".to_string(),
            file_id: "m0-mongod.conf".to_string(),
            file_md5: content_md5_hex(b"port=27017"),
            file_name: "mongod.conf".to_string(),
            file_mode: 0o600,
            last_modified: 1,
            content: "port=27017".to_string(),
        };
        server.create_config_file(Request::new(file.clone())).await.unwrap();
        let got = server
            .get_config_file(Request::new(file.key()))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(got, file);

        let ip = ServiceStaticIp {
            static_ip: "10.0.0.5".to_string(),
            service_uuid: "u1".to_string(),
            available_zone: "us-east-1a".to_string(),
            ..Default::default()
        };
        server
            .create_service_static_ip(Request::new(ip.clone()))
            .await
            .unwrap();
        server
            .delete_service_static_ip(Request::new(ip.key()))
            .await
            .unwrap();
        let status = server
            .get_service_static_ip(Request::new(ip.key()))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::NotFound);

        server
            .delete_service_attr(Request::new(attr("u1", "").key()))
            .await
            .unwrap();
        let status = server
            .get_service_attr(Request::new(attr("u1", "").key()))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::NotFound);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_facade_error_codes() {
        let dir = tempdir().unwrap();
        let server = open(dir.path());

        server
            .create_service_attr(Request::new(attr("u1", "CREATING")))
            .await
            .unwrap();

        let status = server
            .update_service_attr(Request::new(UpdateServiceAttrRequest {
                old_attr: Some(attr("u1", "ACTIVE")),
                new_attr: Some(attr("u1", "DELETING")),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::FailedPrecondition);

        let status = server
            .update_service_attr(Request::new(UpdateServiceAttrRequest {
                old_attr: None,
                new_attr: Some(attr("u1", "ACTIVE")),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);

        let status = server
            .list_services(Request::new(ListServicesRequest {
                cluster_name: "other".to_string(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_facade_request_id_from_metadata() {
        let dir = tempdir().unwrap();
        let server = open(dir.path());

        let mut request = Request::new(());
        request
            .metadata_mut()
            .insert(REQUEST_ID_HEADER, "req-42".parse().unwrap());
        assert_eq!(server.begin("Test", &request).unwrap().request_id, "req-42");

        let generated = server.begin("Test", &Request::new(())).unwrap();
        assert!(!generated.request_id.is_empty());

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_facade_rejects_requests_after_shutdown() {
        let dir = tempdir().unwrap();
        let server = open(dir.path());
        server.shutdown().await;
        server.shutdown().await;

        let status = server
            .get_service_attr(Request::new(ServiceAttrKey {
                service_uuid: "u1".to_string(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::Unavailable);
    }

    #[tokio::test]
    async fn test_facade_data_survives_restart() {
        let dir = tempdir().unwrap();
        {
            let server = open(dir.path());
            server
                .create_service_attr(Request::new(attr("u1", "CREATING")))
                .await
                .unwrap();
            server
                .update_service_attr(Request::new(UpdateServiceAttrRequest {
                    old_attr: Some(attr("u1", "CREATING")),
                    new_attr: Some(attr("u1", "ACTIVE")),
                }))
                .await
                .unwrap();
            server.shutdown().await;
        }

        let server = open(dir.path());
        let got = server
            .get_service_attr(Request::new(ServiceAttrKey {
                service_uuid: "u1".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(got.service_status, "ACTIVE");
        assert_eq!(got.revision, 1);
        server.shutdown().await;
    }
}
