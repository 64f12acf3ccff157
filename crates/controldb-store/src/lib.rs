//! ControlDB Store
//!
//! Embedded, crash-safe record store for cluster metadata. Every entity
//! type is owned by exactly one writer, and every write produces a new
//! file that is renamed into place.
//!
//! # On-disk layout
//!
//! ```text
//! <data_dir>/<cluster>/
//!   device.v%016x               device list versions
//!   service.v%016x              service list versions
//!   servicedir/<service_uuid>/
//!     attr/attr.v%016x          service attribute versions
//!     members/<member_name>     one record per member
//!     volumes/<volume_id>       one record per volume
//!     configdir/<file_id>       one record per config file
//!   serviceIPdir/<static_ip>    one record per static IP
//! ```
//!
//! # Access patterns
//!
//! - Device and service: a mutex-guarded list persisted whole per write
//! - Service attribute, member, volume: one actor owning an LRU cache of
//!   per-service sub-stores
//! - Config file, static IP: N workers, each request sent to the worker
//!   its key hashes to

pub mod actor;
pub mod collection;
pub mod config_file;
pub mod device;
pub mod fileio;
pub mod global_list;
pub mod lru;
pub mod service;
pub mod service_attr;
pub mod service_member;
pub mod sharded;
pub mod static_ip;
pub mod version_store;
pub mod volume;

pub use config_file::ConfigFileService;
pub use device::DeviceService;
pub use service::ServiceService;
pub use service_attr::ServiceAttrService;
pub use service_member::ServiceMemberService;
pub use static_ip::StaticIpService;
pub use version_store::{VersionFileStore, VersionFileType};
pub use volume::VolumeService;

use controldb_common::{DbError, DbResult};

/// Per-cluster directory holding one directory per service uuid
pub const SERVICE_DIR_NAME: &str = "servicedir";
/// Per-cluster directory holding one record per static IP
pub const STATIC_IP_DIR_NAME: &str = "serviceIPdir";
/// Per-service directories
pub const ATTR_DIR_NAME: &str = "attr";
pub const MEMBER_DIR_NAME: &str = "members";
pub const VOLUME_DIR_NAME: &str = "volumes";
pub const CONFIG_DIR_NAME: &str = "configdir";

/// Reject key values that cannot be used as a single file name.
pub fn check_name(field: &str, value: &str) -> DbResult<()> {
    if value.is_empty() {
        return Err(DbError::invalid_request(format!("{field} is empty")));
    }
    if value == "." || value == ".." || value.contains('/') || value.contains('\0') {
        return Err(DbError::invalid_request(format!(
            "{field} {value:?} is not a valid file name"
        )));
    }
    if fileio::is_tmp_file(value) {
        return Err(DbError::invalid_request(format!(
            "{field} {value:?} uses the reserved {} suffix",
            fileio::TMP_FILE_SUFFIX
        )));
    }
    Ok(())
}
