//! Error types for SMBIOS table generation.
//!
//! All errors are detected synchronously during assembly or entry point
//! validation. There is no partial-success mode: a generation pass either yields
//! a complete, internally consistent table plus entry point, or fails outright
//! without returning any buffer.
//!
//! ## License
//!
//! SPDX-License-Identifier: Apache-2.0
//!

use crate::record::{SmbiosHandle, SmbiosType};
use core::fmt;

/// SMBIOS generation errors
///
/// Each variant carries enough context (offending type, offending handle) to
/// diagnose the configuration problem. Nothing is retried internally; falling
/// back from one entry point format to the other is caller policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmbiosError {
    /// The requested entry point format cannot represent the assembled table.
    ///
    /// Only the 32-bit format has representable bounds: table length and
    /// structure count must fit in 16 bits and the table address in 32 bits.
    FormatInfeasible { table_len: usize, structure_count: usize, table_address: u64 },

    /// A raw blob's embedded handle collides with another structure's handle
    /// (allocator-issued or embedded in another blob).
    HandleCollision { record_type: SmbiosType, handle: SmbiosHandle },

    /// A raw blob is shorter than the 4-byte structure header, or its declared
    /// formatted length is inconsistent with the blob's own size.
    MalformedBlob { record_type: SmbiosType, len: usize },

    /// A configured contained-element payload would push a structure's
    /// formatted area past the 255 bytes its 8-bit header length field can
    /// describe.
    OversizedStructure { record_type: SmbiosType, formatted_len: usize },
}

impl fmt::Display for SmbiosError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmbiosError::FormatInfeasible { table_len, structure_count, table_address } => write!(
                f,
                "table (length {table_len}, {structure_count} structures, address {table_address:#x}) \
                 does not fit the requested entry point format"
            ),
            SmbiosError::HandleCollision { record_type, handle } => {
                write!(f, "handle {handle:#06x} of raw type {record_type} structure collides with another structure")
            }
            SmbiosError::MalformedBlob { record_type, len } => {
                write!(f, "raw type {record_type} structure ({len} bytes) is inconsistent with its own header")
            }
            SmbiosError::OversizedStructure { record_type, formatted_len } => write!(
                f,
                "type {record_type} structure's formatted area ({formatted_len} bytes) exceeds the 8-bit header length field"
            ),
        }
    }
}
