//! Device assignments of a cluster
//!
//! Stored as `<cluster>/device.v%016x`.

use crate::global_list::{GlobalList, ListEntry, decode};
use crate::version_store::VersionFileType;
use controldb_common::{
    ControlDbConfig, DbResult, Device, DeviceKey, DeviceList, RequestContext,
};
use prost::Message;
use tracing::error;

impl ListEntry for Device {
    const KIND: &'static str = "device";
    const FILE_TYPE: VersionFileType = VersionFileType::Device;

    fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    fn entry_name(&self) -> &str {
        &self.device_name
    }

    fn encode_list(entries: &[Self]) -> Vec<u8> {
        DeviceList {
            devices: entries.to_vec(),
        }
        .encode_to_vec()
    }

    fn decode_list(data: &[u8]) -> DbResult<Vec<Self>> {
        Ok(decode::<DeviceList>(data)?.devices)
    }
}

/// Device service of one cluster
pub struct DeviceService {
    list: GlobalList<Device>,
}

impl DeviceService {
    pub fn open(config: &ControlDbConfig) -> DbResult<Self> {
        let list = GlobalList::open(&config.cluster_dir(), &config.cluster_name, config.max_versions)
            .inspect_err(|e| error!("Failed to load devices: {}", e))?;
        Ok(Self { list })
    }

    pub fn create_device(&self, ctx: &RequestContext, device: Device) -> DbResult<()> {
        self.list.create(ctx, device)
    }

    pub fn get_device(&self, ctx: &RequestContext, key: &DeviceKey) -> DbResult<Device> {
        self.list.get(ctx, &key.cluster_name, &key.device_name)
    }

    pub fn delete_device(&self, ctx: &RequestContext, key: &DeviceKey) -> DbResult<()> {
        self.list.delete(ctx, &key.cluster_name, &key.device_name)
    }

    pub fn list_devices(&self, cluster_name: &str) -> DbResult<Vec<Device>> {
        self.list.list(cluster_name)
    }

    pub fn stop(&self) {
        self.list.stop();
    }
}
