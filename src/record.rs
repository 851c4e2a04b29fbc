//! Common structure encoding primitives.
//!
//! Every SMBIOS structure starts with the same 4-byte header (type, formatted
//! length, handle) followed by a type-specific fixed body and a trailing string
//! table. [`RecordBuilder`] encodes all three parts with explicit offsets and
//! widths so the binary layout never depends on Rust struct layout rules.
//!
//! ## License
//!
//! SPDX-License-Identifier: Apache-2.0
//!

use alloc::string::String;
use alloc::vec::Vec;

/// SMBIOS structure type identifier
pub type SmbiosType = u8;

/// SMBIOS structure handle (16-bit identifier, unique within one table)
pub type SmbiosHandle = u16;

/// Size of the common structure header: type, length, handle
pub const STRUCTURE_HEADER_SIZE: usize = 4;

/// Handle sentinel: referenced structure is not provided (memory error info)
pub(crate) const HANDLE_NOT_PROVIDED: SmbiosHandle = 0xFFFE;

/// Handle sentinel: referenced structure is unknown or absent
pub(crate) const HANDLE_UNKNOWN: SmbiosHandle = 0xFFFF;

/// Computes the byte that makes the unsigned sum of `bytes` plus the result
/// equal zero modulo 256. Shared by both entry point formats.
pub(crate) fn checksum8(bytes: &[u8]) -> u8 {
    let sum: u8 = bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    0u8.wrapping_sub(sum)
}

/// Incremental encoder for one SMBIOS structure.
///
/// Fields are appended to the fixed body in declaration order; strings are
/// collected into the trailing string table and referenced from the body by
/// 1-based index (0 meaning "no string"). [`RecordBuilder::encode`] emits
/// header + body + string table, with the header length byte covering header
/// and body only; string bytes are never counted.
pub(crate) struct RecordBuilder {
    record_type: SmbiosType,
    handle: SmbiosHandle,
    body: Vec<u8>,
    strings: Vec<String>,
}

impl RecordBuilder {
    pub(crate) fn new(record_type: SmbiosType, handle: SmbiosHandle) -> Self {
        Self { record_type, handle, body: Vec::new(), strings: Vec::new() }
    }

    pub(crate) fn put_u8(&mut self, value: u8) {
        self.body.push(value);
    }

    pub(crate) fn put_u16(&mut self, value: u16) {
        self.body.extend_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn put_u32(&mut self, value: u32) {
        self.body.extend_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn put_u64(&mut self, value: u64) {
        self.body.extend_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn put_bytes(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }

    /// Appends a 1-byte string index field. An empty string encodes the
    /// "no string" index 0 and adds nothing to the string table.
    pub(crate) fn put_str(&mut self, value: &str) {
        if value.is_empty() {
            self.body.push(0);
        } else {
            let index = self.push_string(value);
            self.body.push(index);
        }
    }

    /// Adds a string to the string table without emitting an index byte,
    /// returning its 1-based index. Used by Type 11, whose strings are
    /// addressed implicitly by position.
    pub(crate) fn push_string(&mut self, value: &str) -> u8 {
        self.strings.push(String::from(value));
        self.strings.len() as u8
    }

    /// Serializes header, fixed body, and string table. The assembler caps
    /// variable-length body payloads, so the formatted area always fits the
    /// 8-bit header length field by the time a builder encodes.
    pub(crate) fn encode(self) -> Vec<u8> {
        let formatted_len = STRUCTURE_HEADER_SIZE + self.body.len();
        debug_assert!(formatted_len <= u8::MAX as usize, "formatted area of type {} too long", self.record_type);

        let mut out = Vec::with_capacity(formatted_len + 2);
        out.push(self.record_type);
        out.push(formatted_len as u8);
        out.extend_from_slice(&self.handle.to_le_bytes());
        out.extend_from_slice(&self.body);

        if self.strings.is_empty() {
            // Specification-mandated minimum terminator: two null bytes.
            out.push(0);
            out.push(0);
        } else {
            for s in &self.strings {
                out.extend_from_slice(s.as_bytes());
                out.push(0);
            }
            out.push(0);
        }

        out
    }
}
