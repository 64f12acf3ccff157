//! Record and key types
//!
//! Records are prost messages; their encoding is the payload of every
//! record file on disk. Field tags are part of the on-disk format and must
//! not be renumbered.

use uuid::Uuid;

/// Per-request context carried through the actors for log correlation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: String,
}

impl RequestContext {
    /// Context with a freshly generated request id
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_request_id(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Device and service (cluster-wide lists)
// ---------------------------------------------------------------------------

/// Assignment of a host block device name to a service
#[derive(Clone, PartialEq, Eq, Hash, prost::Message)]
pub struct Device {
    #[prost(string, tag = "1")]
    pub cluster_name: String,
    #[prost(string, tag = "2")]
    pub device_name: String,
    #[prost(string, tag = "3")]
    pub service_name: String,
}

/// Persisted form of all devices of a cluster
#[derive(Clone, PartialEq, prost::Message)]
pub struct DeviceList {
    #[prost(message, repeated, tag = "1")]
    pub devices: Vec<Device>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeviceKey {
    pub cluster_name: String,
    pub device_name: String,
}

/// Maps a service name to its generated uuid
#[derive(Clone, PartialEq, Eq, Hash, prost::Message)]
pub struct Service {
    #[prost(string, tag = "1")]
    pub cluster_name: String,
    #[prost(string, tag = "2")]
    pub service_name: String,
    #[prost(string, tag = "3")]
    pub service_uuid: String,
}

/// Persisted form of all services of a cluster
#[derive(Clone, PartialEq, prost::Message)]
pub struct ServiceList {
    #[prost(message, repeated, tag = "1")]
    pub services: Vec<Service>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    pub cluster_name: String,
    pub service_name: String,
}

impl Device {
    #[must_use]
    pub fn key(&self) -> DeviceKey {
        DeviceKey {
            cluster_name: self.cluster_name.clone(),
            device_name: self.device_name.clone(),
        }
    }
}

impl Service {
    #[must_use]
    pub fn key(&self) -> ServiceKey {
        ServiceKey {
            cluster_name: self.cluster_name.clone(),
            service_name: self.service_name.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Service attribute
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Eq, Hash, prost::Message)]
pub struct ServiceVolume {
    #[prost(string, tag = "1")]
    pub volume_type: String,
    #[prost(int64, tag = "2")]
    pub volume_size_gb: i64,
    #[prost(int64, tag = "3")]
    pub iops: i64,
    #[prost(bool, tag = "4")]
    pub encrypted: bool,
}

#[derive(Clone, PartialEq, Eq, Hash, prost::Message)]
pub struct ServiceVolumes {
    #[prost(string, tag = "1")]
    pub primary_device_name: String,
    #[prost(message, optional, tag = "2")]
    pub primary_volume: Option<ServiceVolume>,
    #[prost(string, tag = "3")]
    pub journal_device_name: String,
    #[prost(message, optional, tag = "4")]
    pub journal_volume: Option<ServiceVolume>,
}

#[derive(Clone, PartialEq, Eq, Hash, prost::Message)]
pub struct Resources {
    #[prost(int64, tag = "1")]
    pub max_cpu_units: i64,
    #[prost(int64, tag = "2")]
    pub reserve_cpu_units: i64,
    #[prost(int64, tag = "3")]
    pub max_mem_mb: i64,
    #[prost(int64, tag = "4")]
    pub reserve_mem_mb: i64,
}

/// Opaque per-service-type attributes
#[derive(Clone, PartialEq, Eq, Hash, prost::Message)]
pub struct ServiceUserAttr {
    #[prost(string, tag = "1")]
    pub service_type: String,
    #[prost(bytes = "vec", tag = "2")]
    pub attr_bytes: Vec<u8>,
}

/// Mutable descriptor of one service
#[derive(Clone, PartialEq, Eq, Hash, prost::Message)]
pub struct ServiceAttr {
    #[prost(string, tag = "1")]
    pub service_uuid: String,
    #[prost(string, tag = "2")]
    pub service_status: String,
    #[prost(int64, tag = "3")]
    pub last_modified: i64,
    #[prost(int64, tag = "4")]
    pub replicas: i64,
    #[prost(string, tag = "5")]
    pub cluster_name: String,
    #[prost(string, tag = "6")]
    pub service_name: String,
    #[prost(message, optional, tag = "7")]
    pub volumes: Option<ServiceVolumes>,
    #[prost(bool, tag = "8")]
    pub register_dns: bool,
    #[prost(string, tag = "9")]
    pub domain_name: String,
    #[prost(string, tag = "10")]
    pub hosted_zone_id: String,
    #[prost(bool, tag = "11")]
    pub require_static_ip: bool,
    #[prost(message, optional, tag = "12")]
    pub user_attr: Option<ServiceUserAttr>,
    #[prost(message, optional, tag = "13")]
    pub resource: Option<Resources>,
    #[prost(string, tag = "14")]
    pub service_type: String,
    #[prost(int64, tag = "15")]
    pub revision: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServiceAttrKey {
    pub service_uuid: String,
}

impl ServiceAttr {
    #[must_use]
    pub fn key(&self) -> ServiceAttrKey {
        ServiceAttrKey {
            service_uuid: self.service_uuid.clone(),
        }
    }

    /// Equality ignoring `last_modified` and `revision`
    #[must_use]
    pub fn content_eq(&self, other: &Self) -> bool {
        let strip = |a: &Self| Self {
            last_modified: 0,
            revision: 0,
            ..a.clone()
        };
        strip(self) == strip(other)
    }

    /// Name of the first immutable field that differs, if any
    #[must_use]
    pub fn changed_immutable_field(&self, other: &Self) -> Option<&'static str> {
        if self.cluster_name != other.cluster_name {
            Some("cluster_name")
        } else if self.domain_name != other.domain_name {
            Some("domain_name")
        } else if self.hosted_zone_id != other.hosted_zone_id {
            Some("hosted_zone_id")
        } else if self.register_dns != other.register_dns {
            Some("register_dns")
        } else if self.require_static_ip != other.require_static_ip {
            Some("require_static_ip")
        } else if self.service_name != other.service_name {
            Some("service_name")
        } else if self.service_type != other.service_type {
            Some("service_type")
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Service member
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Eq, Hash, prost::Message)]
pub struct MemberVolumes {
    #[prost(string, tag = "1")]
    pub primary_volume_id: String,
    #[prost(string, tag = "2")]
    pub primary_device_name: String,
    #[prost(string, tag = "3")]
    pub journal_volume_id: String,
    #[prost(string, tag = "4")]
    pub journal_device_name: String,
}

/// Reference from a member to one of its config files
#[derive(Clone, PartialEq, Eq, Hash, prost::Message)]
pub struct MemberConfig {
    #[prost(string, tag = "1")]
    pub file_name: String,
    #[prost(string, tag = "2")]
    pub file_id: String,
    #[prost(string, tag = "3")]
    pub file_md5: String,
}

/// One replica of a service
#[derive(Clone, PartialEq, Eq, Hash, prost::Message)]
pub struct ServiceMember {
    #[prost(string, tag = "1")]
    pub service_uuid: String,
    #[prost(string, tag = "2")]
    pub member_name: String,
    #[prost(string, tag = "3")]
    pub available_zone: String,
    #[prost(string, tag = "4")]
    pub task_id: String,
    #[prost(string, tag = "5")]
    pub container_instance_id: String,
    #[prost(string, tag = "6")]
    pub server_instance_id: String,
    #[prost(int64, tag = "7")]
    pub last_modified: i64,
    #[prost(message, optional, tag = "8")]
    pub volumes: Option<MemberVolumes>,
    #[prost(string, tag = "9")]
    pub static_ip: String,
    #[prost(message, repeated, tag = "10")]
    pub configs: Vec<MemberConfig>,
    #[prost(int64, tag = "11")]
    pub revision: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServiceMemberKey {
    pub service_uuid: String,
    pub member_name: String,
}

impl ServiceMember {
    #[must_use]
    pub fn key(&self) -> ServiceMemberKey {
        ServiceMemberKey {
            service_uuid: self.service_uuid.clone(),
            member_name: self.member_name.clone(),
        }
    }

    /// Equality ignoring `last_modified` and `revision`
    #[must_use]
    pub fn content_eq(&self, other: &Self) -> bool {
        let strip = |m: &Self| Self {
            last_modified: 0,
            revision: 0,
            ..m.clone()
        };
        strip(self) == strip(other)
    }

    #[must_use]
    pub fn changed_immutable_field(&self, other: &Self) -> Option<&'static str> {
        if self.service_uuid != other.service_uuid {
            Some("service_uuid")
        } else if self.member_name != other.member_name {
            Some("member_name")
        } else if self.available_zone != other.available_zone {
            Some("available_zone")
        } else if self.volumes != other.volumes {
            Some("volumes")
        } else if self.static_ip != other.static_ip {
            Some("static_ip")
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Volume
// ---------------------------------------------------------------------------

/// A block volume owned by a service member
#[derive(Clone, PartialEq, Eq, Hash, prost::Message)]
pub struct Volume {
    #[prost(string, tag = "1")]
    pub service_uuid: String,
    #[prost(string, tag = "2")]
    pub volume_id: String,
    #[prost(int64, tag = "3")]
    pub last_modified: i64,
    #[prost(string, tag = "4")]
    pub device_name: String,
    #[prost(string, tag = "5")]
    pub available_zone: String,
    #[prost(string, tag = "6")]
    pub task_id: String,
    #[prost(string, tag = "7")]
    pub container_instance_id: String,
    #[prost(string, tag = "8")]
    pub server_instance_id: String,
    #[prost(string, tag = "9")]
    pub member_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VolumeKey {
    pub service_uuid: String,
    pub volume_id: String,
}

impl Volume {
    #[must_use]
    pub fn key(&self) -> VolumeKey {
        VolumeKey {
            service_uuid: self.service_uuid.clone(),
            volume_id: self.volume_id.clone(),
        }
    }

    /// Equality ignoring `last_modified`
    #[must_use]
    pub fn content_eq(&self, other: &Self) -> bool {
        let strip = |v: &Self| Self {
            last_modified: 0,
            ..v.clone()
        };
        strip(self) == strip(other)
    }

    #[must_use]
    pub fn changed_immutable_field(&self, other: &Self) -> Option<&'static str> {
        if self.service_uuid != other.service_uuid {
            Some("service_uuid")
        } else if self.volume_id != other.volume_id {
            Some("volume_id")
        } else if self.device_name != other.device_name {
            Some("device_name")
        } else if self.available_zone != other.available_zone {
            Some("available_zone")
        } else if self.member_name != other.member_name {
            Some("member_name")
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Config file
// ---------------------------------------------------------------------------

/// Content-addressed configuration blob of a service member
#[derive(Clone, PartialEq, Eq, Hash, prost::Message)]
pub struct ConfigFile {
    #[prost(string, tag = "1")]
    pub service_uuid: String,
    #[prost(string, tag = "2")]
    pub file_id: String,
    #[prost(string, tag = "3")]
    pub file_md5: String,
    #[prost(string, tag = "4")]
    pub file_name: String,
    #[prost(uint32, tag = "5")]
    pub file_mode: u32,
    #[prost(int64, tag = "6")]
    pub last_modified: i64,
    #[prost(string, tag = "7")]
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConfigFileKey {
    pub service_uuid: String,
    pub file_id: String,
}

impl ConfigFile {
    #[must_use]
    pub fn key(&self) -> ConfigFileKey {
        ConfigFileKey {
            service_uuid: self.service_uuid.clone(),
            file_id: self.file_id.clone(),
        }
    }

    /// Equality ignoring `last_modified`
    #[must_use]
    pub fn content_eq(&self, other: &Self) -> bool {
        let strip = |f: &Self| Self {
            last_modified: 0,
            ..f.clone()
        };
        strip(self) == strip(other)
    }
}

// ---------------------------------------------------------------------------
// Static IP
// ---------------------------------------------------------------------------

/// A static IP reserved for a service member
#[derive(Clone, PartialEq, Eq, Hash, prost::Message)]
pub struct ServiceStaticIp {
    #[prost(string, tag = "1")]
    pub static_ip: String,
    #[prost(string, tag = "2")]
    pub service_uuid: String,
    #[prost(string, tag = "3")]
    pub available_zone: String,
    #[prost(string, tag = "4")]
    pub server_instance_id: String,
    #[prost(string, tag = "5")]
    pub network_interface_id: String,
    #[prost(int64, tag = "6")]
    pub revision: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServiceStaticIpKey {
    pub static_ip: String,
}

impl ServiceStaticIp {
    #[must_use]
    pub fn key(&self) -> ServiceStaticIpKey {
        ServiceStaticIpKey {
            static_ip: self.static_ip.clone(),
        }
    }

    /// Equality ignoring `revision`
    #[must_use]
    pub fn content_eq(&self, other: &Self) -> bool {
        let strip = |ip: &Self| Self {
            revision: 0,
            ..ip.clone()
        };
        strip(self) == strip(other)
    }

    #[must_use]
    pub fn changed_immutable_field(&self, other: &Self) -> Option<&'static str> {
        if self.static_ip != other.static_ip {
            Some("static_ip")
        } else if self.service_uuid != other.service_uuid {
            Some("service_uuid")
        } else if self.available_zone != other.available_zone {
            Some("available_zone")
        } else {
            None
        }
    }
}
