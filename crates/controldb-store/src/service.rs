//! Service name to uuid mapping of a cluster
//!
//! Stored as `<cluster>/service.v%016x`.

use crate::global_list::{GlobalList, ListEntry, decode};
use crate::version_store::VersionFileType;
use controldb_common::{
    ControlDbConfig, DbResult, RequestContext, Service, ServiceKey, ServiceList,
};
use prost::Message;
use tracing::error;

impl ListEntry for Service {
    const KIND: &'static str = "service";
    const FILE_TYPE: VersionFileType = VersionFileType::Service;

    fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    fn entry_name(&self) -> &str {
        &self.service_name
    }

    fn encode_list(entries: &[Self]) -> Vec<u8> {
        ServiceList {
            services: entries.to_vec(),
        }
        .encode_to_vec()
    }

    fn decode_list(data: &[u8]) -> DbResult<Vec<Self>> {
        Ok(decode::<ServiceList>(data)?.services)
    }
}

pub struct ServiceService {
    list: GlobalList<Service>,
}

impl ServiceService {
    pub fn open(config: &ControlDbConfig) -> DbResult<Self> {
        let list = GlobalList::open(&config.cluster_dir(), &config.cluster_name, config.max_versions)
            .inspect_err(|e| error!("Failed to load services: {}", e))?;
        Ok(Self { list })
    }

    pub fn create_service(&self, ctx: &RequestContext, service: Service) -> DbResult<()> {
        self.list.create(ctx, service)
    }

    pub fn get_service(&self, ctx: &RequestContext, key: &ServiceKey) -> DbResult<Service> {
        self.list.get(ctx, &key.cluster_name, &key.service_name)
    }

    pub fn delete_service(&self, ctx: &RequestContext, key: &ServiceKey) -> DbResult<()> {
        self.list.delete(ctx, &key.cluster_name, &key.service_name)
    }

    pub fn list_services(&self, cluster_name: &str) -> DbResult<Vec<Service>> {
        self.list.list(cluster_name)
    }

    pub fn stop(&self) {
        self.list.stop();
    }
}
