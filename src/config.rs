//! Generation-time configuration: field registry and raw blob store.
//!
//! The configuration layer (command-line or machine description parsing, out of
//! scope here) populates a [`SmbiosConfig`] once, before any generation call.
//! During a pass the config is a read-only snapshot: builders merge explicitly
//! set field values with per-field specification defaults, and raw blobs bypass
//! the builder for their structure type entirely.
//!
//! ## License
//!
//! SPDX-License-Identifier: Apache-2.0
//!

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::String;
use alloc::vec::Vec;
use uuid::Uuid;

use crate::record::SmbiosType;

/// One explicitly-set field value for a (structure type, field) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// A string-table entry (empty text encodes the "no string" index 0)
    Text(String),
    /// An ordered string list (Type 11 OEM strings)
    Texts(Vec<String>),
    /// A scalar, truncated by the builder to the field's encoded width
    Number(u64),
    /// Pre-encoded trailing sub-records (contained elements of Types 2/3)
    Bytes(Vec<u8>),
}

/// Per-type field overrides with explicit-set tracking.
///
/// Fields are keyed by the option names the configuration layer uses (for
/// example `("vendor", type 0)` or `("speed", type 17)`). A value that was
/// never set resolves to the specification default supplied by the builder at
/// the point of use.
#[derive(Debug, Clone, Default)]
pub(crate) struct FieldRegistry {
    values: BTreeMap<(SmbiosType, &'static str), FieldValue>,
    populated: BTreeSet<SmbiosType>,
}

impl FieldRegistry {
    pub(crate) fn set(&mut self, record_type: SmbiosType, field: &'static str, value: FieldValue) {
        self.values.insert((record_type, field), value);
        self.populated.insert(record_type);
    }

    /// Whether this exact field was explicitly set by the configuration layer.
    pub(crate) fn is_set(&self, record_type: SmbiosType, field: &'static str) -> bool {
        self.values.contains_key(&(record_type, field))
    }

    /// Whether any field of the type was explicitly set. Optional structure
    /// types are emitted only when this holds (or a blob overrides them).
    pub(crate) fn has_fields(&self, record_type: SmbiosType) -> bool {
        self.populated.contains(&record_type)
    }

    pub(crate) fn text(&self, record_type: SmbiosType, field: &'static str) -> Option<&str> {
        match self.values.get(&(record_type, field)) {
            Some(FieldValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub(crate) fn text_or<'a>(&'a self, record_type: SmbiosType, field: &'static str, default: &'a str) -> &'a str {
        self.text(record_type, field).unwrap_or(default)
    }

    pub(crate) fn texts(&self, record_type: SmbiosType, field: &'static str) -> &[String] {
        match self.values.get(&(record_type, field)) {
            Some(FieldValue::Texts(list)) => list,
            _ => &[],
        }
    }

    pub(crate) fn number(&self, record_type: SmbiosType, field: &'static str) -> Option<u64> {
        match self.values.get(&(record_type, field)) {
            Some(FieldValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub(crate) fn number_or(&self, record_type: SmbiosType, field: &'static str, default: u64) -> u64 {
        self.number(record_type, field).unwrap_or(default)
    }

    pub(crate) fn bytes(&self, record_type: SmbiosType, field: &'static str) -> &[u8] {
        match self.values.get(&(record_type, field)) {
            Some(FieldValue::Bytes(b)) => b,
            _ => &[],
        }
    }
}

/// CPU identification words detected by the host (CPUID leaf 1: EAX and EDX).
///
/// The Type 4 processor identification field is only meaningful when CPU
/// detection actually ran; when absent the field is zero-filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuId {
    pub version: u32,
    pub features: u32,
}

/// Immutable snapshot of everything the configuration layer feeds into one
/// generation pass.
#[derive(Debug, Clone, Default)]
pub struct SmbiosConfig {
    fields: FieldRegistry,
    blobs: BTreeMap<SmbiosType, Vec<u8>>,
    uuid: Option<Uuid>,
    cpu_id: Option<CpuId>,
    default_manufacturer: Option<String>,
    default_product: Option<String>,
    default_version: Option<String>,
    default_processor_family: Option<u16>,
}

impl SmbiosConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a string field override for one structure type.
    pub fn set_text(&mut self, record_type: SmbiosType, field: &'static str, value: impl Into<String>) {
        self.fields.set(record_type, field, FieldValue::Text(value.into()));
    }

    /// Sets a scalar field override for one structure type.
    pub fn set_number(&mut self, record_type: SmbiosType, field: &'static str, value: u64) {
        self.fields.set(record_type, field, FieldValue::Number(value));
    }

    /// Sets a pre-encoded sub-record payload (contained elements) for one
    /// structure type.
    pub fn set_bytes(&mut self, record_type: SmbiosType, field: &'static str, value: Vec<u8>) {
        self.fields.set(record_type, field, FieldValue::Bytes(value));
    }

    /// Sets the Type 11 OEM string list. Strings are referenced implicitly by
    /// their 1-based position in the table.
    pub fn set_oem_strings(&mut self, values: Vec<String>) {
        self.fields.set(11, "value", FieldValue::Texts(values));
    }

    /// Installs a caller-supplied, fully pre-encoded structure for one type.
    /// During generation the stored bytes are emitted verbatim in place of the
    /// builder's output for that type. Setting a second blob for the same type
    /// replaces the first.
    pub fn set_blob(&mut self, record_type: SmbiosType, data: Vec<u8>) {
        self.blobs.insert(record_type, data);
    }

    /// Sets the system UUID embedded in the Type 1 structure.
    pub fn set_uuid(&mut self, uuid: Uuid) {
        self.uuid = Some(uuid);
    }

    /// Records the host-detected CPU identification words.
    pub fn set_cpu_id(&mut self, version: u32, features: u32) {
        self.cpu_id = Some(CpuId { version, features });
    }

    /// Sets fallback manufacturer/product/version strings for the Type 1
    /// system information structure. Explicit field overrides win.
    pub fn set_defaults(
        &mut self,
        manufacturer: impl Into<String>,
        product: impl Into<String>,
        version: impl Into<String>,
    ) {
        self.default_manufacturer = Some(manufacturer.into());
        self.default_product = Some(product.into());
        self.default_version = Some(version.into());
    }

    /// Sets the processor family code reported when the Type 4 family field
    /// was not explicitly configured.
    pub fn set_default_processor_family(&mut self, family: u16) {
        self.default_processor_family = Some(family);
    }

    pub(crate) fn fields(&self) -> &FieldRegistry {
        &self.fields
    }

    pub(crate) fn blob(&self, record_type: SmbiosType) -> Option<&[u8]> {
        self.blobs.get(&record_type).map(|b| b.as_slice())
    }

    pub(crate) fn blob_types(&self) -> impl Iterator<Item = SmbiosType> + '_ {
        self.blobs.keys().copied()
    }

    pub(crate) fn uuid(&self) -> Option<&Uuid> {
        self.uuid.as_ref()
    }

    pub(crate) fn cpu_id(&self) -> Option<CpuId> {
        self.cpu_id
    }

    pub(crate) fn default_manufacturer(&self) -> &str {
        self.default_manufacturer.as_deref().unwrap_or("")
    }

    pub(crate) fn default_product(&self) -> &str {
        self.default_product.as_deref().unwrap_or("")
    }

    pub(crate) fn default_version(&self) -> &str {
        self.default_version.as_deref().unwrap_or("")
    }

    pub(crate) fn default_processor_family(&self) -> u16 {
        // 0x01: "Other"
        self.default_processor_family.unwrap_or(0x01)
    }
}
