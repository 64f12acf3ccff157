//! ControlDB server
//!
//! Request facade over the entity stores of one cluster.

pub mod service;

pub use service::{
    ControlDb, ControlDbServer, ListDevicesRequest, ListServiceMembersRequest,
    ListServicesRequest, ListVolumesRequest, REQUEST_ID_HEADER, UpdateServiceAttrRequest,
    UpdateServiceMemberRequest, UpdateServiceStaticIpRequest, UpdateVolumeRequest,
};
