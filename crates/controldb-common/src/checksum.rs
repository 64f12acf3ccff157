//! Checksum utilities
//!
//! Record files carry a 16-byte MD5 digest of the payload as their header.
//! Config file content is addressed by the lowercase hex MD5 of its bytes.

/// Width of the checksum header at the start of every record file
pub const CHECKSUM_BYTES: usize = 16;

/// Digest stored in front of a record payload
#[must_use]
pub fn record_checksum(payload: &[u8]) -> [u8; CHECKSUM_BYTES] {
    md5::compute(payload).0
}

/// Hex MD5 of config file content, as carried in `ConfigFile::file_md5`
#[must_use]
pub fn content_md5_hex(content: &[u8]) -> String {
    hex::encode(md5::compute(content).0)
}
