//! Shared, version-pinned protocol identifiers.
//!
//! These constants are the single source of truth for schema/version strings that
//! appear in machine-readable I/O: the JSON registry form, the overrides file, the
//! JSON manifest and the banner of every generated C file.

pub const REGISTRY_JSON_SCHEMA_VERSION: &str = "glmarshal.registry@0.1.0";
pub const OVERRIDES_SCHEMA_VERSION: &str = "glmarshal.overrides@0.1.0";
pub const MANIFEST_SCHEMA_VERSION: &str = "glmarshal.manifest@0.1.0";
pub const CLASSIFY_REPORT_SCHEMA_VERSION: &str = "glmarshal.classify.report@0.1.0";

/// Wire protocol revision spoken by generated wrappers. Bump whenever the
/// request header layout or the response rules change.
pub const WIRE_PROTOCOL_VERSION: u32 = 1;

/// Width in bytes of the command tag that leads every request.
pub const COMMAND_TAG_BYTES: usize = 4;

/// Width in bytes of a buffer byte-length field inside the request header.
pub const BUFFER_LENGTH_BYTES: usize = 8;
