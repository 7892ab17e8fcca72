//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Configuration error - schema, conflicting settings or unresolvable topology
pub const VALIDATION_ERROR: i32 = 2;

/// Capacity error - a provider limit would be exceeded
pub const CAPACITY_ERROR: i32 = 3;

/// Payload error - an instance payload template failed to render
pub const PAYLOAD_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;
