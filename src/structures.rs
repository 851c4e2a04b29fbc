//! One encoder per supported structure type.
//!
//! Builders never fail: absent optional data encodes the specification-defined
//! "unset" sentinel for the field (string index 0, handle 0xFFFE/0xFFFF,
//! numeric 0 or the probe 0x8000 "unknown" value). Each builder reads the
//! merged field values for its type (explicit override falling back to the
//! specification default) and resolves cross references through the handle
//! map built during planning.
//!
//! Types 7, 20, 22, 26, 27, 28, 29, 37 and 39 carry deliberately narrow bodies
//! (far fewer fields than DSP0134 defines for them); the narrow layouts are
//! reproduced as-is rather than completed against the full specification.
//!
//! ## License
//!
//! SPDX-License-Identifier: Apache-2.0
//!

use alloc::format;
use alloc::vec::Vec;

use crate::config::SmbiosConfig;
use crate::handles::HandleMap;
use crate::record::{RecordBuilder, SmbiosHandle, SmbiosType, HANDLE_NOT_PROVIDED, HANDLE_UNKNOWN};
use crate::table::{MemoryLayout, PhysMemRange};

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;

/// Probe value fields (voltage, temperature, current) use 0x8000 for "unknown".
const PROBE_UNKNOWN: u64 = 0x8000;

/// Type 4 fixed-body variant, selected by the active table version.
///
/// The v2.8 body ends at the 16-bit processor family field; the v3.0 body adds
/// the three extended 16-bit core/enabled/thread count fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Type4Body {
    V28,
    V30,
}

/// Encodes instance `instance` of the given structure type.
pub(crate) fn build_structure(
    record_type: SmbiosType,
    instance: u16,
    handle: SmbiosHandle,
    cfg: &SmbiosConfig,
    handles: &HandleMap,
    type4_body: Type4Body,
    memory: &MemoryLayout<'_>,
) -> Vec<u8> {
    let mut b = RecordBuilder::new(record_type, handle);
    match record_type {
        0 => build_type_0(&mut b, cfg),
        1 => build_type_1(&mut b, cfg),
        2 => build_type_2(&mut b, cfg, handles),
        3 => build_type_3(&mut b, cfg),
        4 => build_type_4(&mut b, cfg, instance, type4_body),
        7 => build_type_7(&mut b, cfg),
        8 => build_type_8(&mut b, cfg),
        9 => build_type_9(&mut b, cfg),
        11 => build_type_11(&mut b, cfg),
        16 => build_type_16(&mut b, memory),
        17 => build_type_17(&mut b, cfg, handles, instance, memory),
        19 => build_type_19(&mut b, handles, &memory.ranges[instance as usize]),
        20 => build_type_20(&mut b, cfg, handles, memory),
        22 => build_type_22(&mut b, cfg),
        26 => build_probe(&mut b, cfg, 26),
        27 => build_type_27(&mut b, cfg, handles),
        28 => build_probe(&mut b, cfg, 28),
        29 => build_type_29(&mut b, cfg),
        32 => build_type_32(&mut b),
        37 | 127 => {} // header-only bodies
        39 => build_type_39(&mut b, cfg),
        41 => build_type_41(&mut b, cfg),
        _ => debug_assert!(false, "unsupported structure type {record_type}"),
    }
    b.encode()
}

/// Type 0: BIOS information.
fn build_type_0(b: &mut RecordBuilder, cfg: &SmbiosConfig) {
    let f = cfg.fields();
    b.put_str(f.text_or(0, "vendor", ""));
    b.put_str(f.text_or(0, "version", ""));
    b.put_u16(0xE800); // BIOS starting address segment
    b.put_str(f.text_or(0, "date", ""));
    b.put_u8(0); // ROM size
    b.put_u64(0x08); // BIOS characteristics: not supported

    // Extension byte 2: enable targeted content distribution, plus the UEFI
    // bit when the firmware boots via UEFI.
    let mut ext2: u8 = 0x14;
    if f.number_or(0, "uefi", 0) != 0 {
        ext2 |= 0x08;
    }
    b.put_u8(0);
    b.put_u8(ext2);

    // System BIOS release is reported only when both halves were configured.
    if f.is_set(0, "release-major") && f.is_set(0, "release-minor") {
        b.put_u8(f.number_or(0, "release-major", 0) as u8);
        b.put_u8(f.number_or(0, "release-minor", 0) as u8);
    } else {
        b.put_u8(0);
        b.put_u8(0);
    }

    // Embedded controller release: not supported.
    b.put_u8(0xFF);
    b.put_u8(0xFF);
}

/// Type 1: system information, including the mixed-endian UUID.
fn build_type_1(b: &mut RecordBuilder, cfg: &SmbiosConfig) {
    let f = cfg.fields();
    b.put_str(f.text_or(1, "manufacturer", cfg.default_manufacturer()));
    b.put_str(f.text_or(1, "product", cfg.default_product()));
    b.put_str(f.text_or(1, "version", cfg.default_version()));
    b.put_str(f.text_or(1, "serial", ""));

    // The first three UUID fields are little-endian, the remaining eight bytes
    // verbatim. This is the one exception to the otherwise uniform
    // little-endian field rule and `to_bytes_le` implements it exactly.
    match cfg.uuid() {
        Some(uuid) => b.put_bytes(&uuid.to_bytes_le()),
        None => b.put_bytes(&[0; 16]),
    }

    b.put_u8(0x06); // wake-up type: power switch
    b.put_str(f.text_or(1, "sku", ""));
    b.put_str(f.text_or(1, "family", ""));
}

/// Type 2: base board, with optional trailing contained object handles.
fn build_type_2(b: &mut RecordBuilder, cfg: &SmbiosConfig, handles: &HandleMap) {
    let f = cfg.fields();
    b.put_str(f.text_or(2, "manufacturer", ""));
    b.put_str(f.text_or(2, "product", ""));
    b.put_str(f.text_or(2, "version", ""));
    b.put_str(f.text_or(2, "serial", ""));
    b.put_str(f.text_or(2, "asset", ""));
    b.put_u8(0x01); // feature flags: hosting board
    b.put_str(f.text_or(2, "location", ""));
    b.put_u16(handles.lookup_or_unknown(3, 0));
    b.put_u8(0x0A); // board type: motherboard

    // Contained object handles: 2 bytes each, count stored in the fixed body.
    let contained = f.bytes(2, "contained-handles");
    b.put_u8((contained.len() / 2) as u8);
    b.put_bytes(contained);
}

/// Type 3: system enclosure. Contained elements sit between the element
/// record length byte and the SKU string index.
fn build_type_3(b: &mut RecordBuilder, cfg: &SmbiosConfig) {
    let f = cfg.fields();
    b.put_str(f.text_or(3, "manufacturer", ""));
    b.put_u8(0x01); // enclosure type: other
    b.put_str(f.text_or(3, "version", ""));
    b.put_str(f.text_or(3, "serial", ""));
    b.put_str(f.text_or(3, "asset", ""));
    b.put_u8(0x03); // boot-up state: safe
    b.put_u8(0x03); // power supply state: safe
    b.put_u8(0x03); // thermal state: safe
    b.put_u8(0x02); // security status: unknown
    b.put_u32(0); // OEM-defined
    b.put_u8(0); // height
    b.put_u8(0); // number of power cords

    let elements = f.bytes(3, "contained-elements");
    if elements.is_empty() {
        b.put_u8(0);
        b.put_u8(0);
    } else {
        let record_len = f.number_or(3, "contained-element-length", 3).max(1);
        b.put_u8((elements.len() as u64 / record_len) as u8);
        b.put_u8(record_len as u8);
        b.put_bytes(elements);
    }

    b.put_str(f.text_or(3, "sku", ""));
}

/// Type 4: processor information, with a version-dependent body length.
fn build_type_4(b: &mut RecordBuilder, cfg: &SmbiosConfig, instance: u16, body: Type4Body) {
    let f = cfg.fields();
    let socket = format!("{}{:2}", f.text_or(4, "sock_pfx", "CPU"), instance);
    b.put_str(&socket);
    b.put_u8(0x03); // processor type: central processor

    let family = f.number_or(4, "processor-family", u64::from(cfg.default_processor_family())) as u16;
    // Family codes above the 8-bit field's range use the 0xFE escape and are
    // carried in the 16-bit family field instead.
    b.put_u8(if family <= 0xFD { family as u8 } else { 0xFE });

    b.put_str(f.text_or(4, "manufacturer", ""));
    match cfg.cpu_id() {
        Some(id) => {
            b.put_u32(id.version);
            b.put_u32(id.features);
        }
        None => b.put_u64(0),
    }
    b.put_str(f.text_or(4, "version", ""));
    b.put_u8(0); // voltage
    b.put_u16(0); // external clock
    b.put_u16(f.number_or(4, "max-speed", 2000) as u16);
    b.put_u16(f.number_or(4, "current-speed", 2000) as u16);
    b.put_u8(0x41); // status: socket populated, enabled
    b.put_u8(0x01); // upgrade: other
    b.put_u16(HANDLE_UNKNOWN); // L1 cache handle: not provided
    b.put_u16(HANDLE_UNKNOWN); // L2 cache handle: not provided
    b.put_u16(HANDLE_UNKNOWN); // L3 cache handle: not provided
    b.put_str(f.text_or(4, "serial", ""));
    b.put_str(f.text_or(4, "asset", ""));
    b.put_str(f.text_or(4, "part", ""));

    let (cores, enabled, threads) = core_counts(cfg);
    b.put_u8(saturate_count(cores));
    b.put_u8(saturate_count(enabled));
    b.put_u8(saturate_count(threads));
    b.put_u16(0x02); // processor characteristics: unknown
    b.put_u16(family);

    if body == Type4Body::V30 {
        b.put_u16(cores as u16);
        b.put_u16(enabled as u16);
        b.put_u16(threads as u16);
    }
}

pub(crate) fn core_counts(cfg: &SmbiosConfig) -> (u64, u64, u64) {
    let f = cfg.fields();
    let cores = f.number_or(4, "core-count", 1);
    let enabled = f.number_or(4, "core-enabled", cores);
    let threads = f.number_or(4, "thread-count", 1);
    (cores, enabled, threads)
}

/// 8-bit count fields saturate at the 0xFF overflow sentinel.
fn saturate_count(count: u64) -> u8 {
    if count > 0xFF { 0xFF } else { count as u8 }
}

/// Type 7: cache information (narrow body).
fn build_type_7(b: &mut RecordBuilder, cfg: &SmbiosConfig) {
    let f = cfg.fields();
    b.put_str(f.text_or(7, "socket-designation", ""));
    b.put_u16(f.number_or(7, "cache-configuration", 0) as u16);
    b.put_u16(f.number_or(7, "max-cache-size", 0) as u16);
    b.put_u16(f.number_or(7, "installed-size", 0) as u16);
    b.put_u16(f.number_or(7, "supported-sram-type", 0) as u16);
    b.put_u16(f.number_or(7, "current-sram-type", 0) as u16);
    b.put_u8(f.number_or(7, "cache-speed", 0) as u8);
    b.put_u8(f.number_or(7, "error-correction", 0) as u8);
    b.put_u8(f.number_or(7, "system-cache-type", 0) as u8);
    b.put_u8(f.number_or(7, "associativity", 0) as u8);
}

/// Type 8: port connector information.
fn build_type_8(b: &mut RecordBuilder, cfg: &SmbiosConfig) {
    let f = cfg.fields();
    b.put_str(f.text_or(8, "internal_reference", ""));
    b.put_u8(f.number_or(8, "internal_connector_type", 0) as u8);
    b.put_str(f.text_or(8, "external_reference", ""));
    b.put_u8(f.number_or(8, "external_connector_type", 0) as u8);
    b.put_u8(f.number_or(8, "port_type", 0) as u8);
}

/// Type 9: system slot.
fn build_type_9(b: &mut RecordBuilder, cfg: &SmbiosConfig) {
    let f = cfg.fields();
    b.put_str(f.text_or(9, "slot_designation", ""));
    b.put_u8(f.number_or(9, "slot_type", 0) as u8);
    b.put_u8(f.number_or(9, "slot_data_bus_width", 0) as u8);
    b.put_u8(f.number_or(9, "current_usage", 0) as u8);
    b.put_u8(f.number_or(9, "slot_length", 0) as u8);
    b.put_u16(f.number_or(9, "slot_id", 0) as u16);
    b.put_u8(f.number_or(9, "slot_characteristics1", 0) as u8);
    b.put_u8(f.number_or(9, "slot_characteristics2", 0) as u8);
    b.put_u16(f.number_or(9, "segment_group_number", 0) as u16);
    b.put_u8(f.number_or(9, "bus_number", 0) as u8);
    b.put_u8(f.number_or(9, "device_number", 0) as u8);
}

/// Type 11: OEM strings, addressed by position only.
fn build_type_11(b: &mut RecordBuilder, cfg: &SmbiosConfig) {
    let values = cfg.fields().texts(11, "value");
    b.put_u8(values.len() as u8);
    for value in values {
        b.push_string(value);
    }
}

/// Type 16: physical memory array.
fn build_type_16(b: &mut RecordBuilder, memory: &MemoryLayout<'_>) {
    b.put_u8(0x01); // location: other
    b.put_u8(0x03); // use: system memory
    b.put_u8(0x06); // error correction: multi-bit ECC

    // Capacities up to the 31-bit KiB ceiling go in the standard field;
    // anything larger escapes to the 64-bit extended capacity in bytes.
    let size_kb = memory.ram_size / KIB;
    if size_kb < 0x8000_0000 {
        b.put_u32(size_kb as u32);
    } else {
        b.put_u32(0x8000_0000);
    }
    b.put_u16(HANDLE_NOT_PROVIDED); // memory error information handle
    b.put_u16(memory.dimm_count);
    b.put_u64(if size_kb < 0x8000_0000 { 0 } else { memory.ram_size });
}

/// Type 17: memory device, one per DIMM.
fn build_type_17(
    b: &mut RecordBuilder,
    cfg: &SmbiosConfig,
    handles: &HandleMap,
    instance: u16,
    memory: &MemoryLayout<'_>,
) {
    let f = cfg.fields();
    b.put_u16(handles.lookup_or_unknown(16, 0));
    b.put_u16(HANDLE_NOT_PROVIDED); // memory error information handle
    b.put_u16(0xFFFF); // total width: unknown
    b.put_u16(0xFFFF); // data width: unknown

    // Device sizes below the 15-bit MiB ceiling use the standard field;
    // larger devices store 0x7FFF and the MiB count in the extended field.
    let size_mb = memory.dimm_size(instance) / MIB;
    let (size16, extended) = if size_mb < 0x7FFF { (size_mb as u16, 0u32) } else { (0x7FFF, size_mb as u32) };
    b.put_u16(size16);

    b.put_u8(0x09); // form factor: DIMM
    b.put_u8(0); // device set
    let locator = format!("{} {}", f.text_or(17, "loc_pfx", "DIMM"), instance);
    b.put_str(&locator);
    b.put_str(f.text_or(17, "bank", ""));
    b.put_u8(0x07); // memory type: RAM
    b.put_u16(0x02); // type detail: other

    let speed = f.number_or(17, "speed", 0) as u16;
    b.put_u16(speed);
    b.put_str(f.text_or(17, "manufacturer", ""));
    b.put_str(f.text_or(17, "serial", ""));
    b.put_str(f.text_or(17, "asset", ""));
    b.put_str(f.text_or(17, "part", ""));
    b.put_u8(0); // attributes
    b.put_u32(extended);
    b.put_u16(speed); // configured clock speed
    b.put_u16(0); // minimum voltage
    b.put_u16(0); // maximum voltage
    b.put_u16(0); // configured voltage
}

/// Splits a byte range into the 32-bit KiB start/end fields, or `None` when
/// the range only fits the extended 64-bit byte-address fields.
fn mapped_range_kb(range: &PhysMemRange) -> Option<(u32, u32)> {
    let start_kb = range.address / KIB;
    let end_kb = (range.address + range.length.saturating_sub(1)) / KIB;
    // 0xFFFFFFFF in the standard fields is the "see extended fields" sentinel,
    // so an end address landing exactly there must roll over too.
    if end_kb < u64::from(u32::MAX) {
        Some((start_kb as u32, end_kb as u32))
    } else {
        None
    }
}

/// Type 19: memory array mapped address, one per physical range.
fn build_type_19(b: &mut RecordBuilder, handles: &HandleMap, range: &PhysMemRange) {
    match mapped_range_kb(range) {
        Some((start_kb, end_kb)) => {
            b.put_u32(start_kb);
            b.put_u32(end_kb);
            b.put_u16(handles.lookup_or_unknown(16, 0));
            b.put_u8(1); // partition width
            b.put_u64(0);
            b.put_u64(0);
        }
        None => {
            b.put_u32(0xFFFF_FFFF);
            b.put_u32(0xFFFF_FFFF);
            b.put_u16(handles.lookup_or_unknown(16, 0));
            b.put_u8(1);
            b.put_u64(range.address);
            b.put_u64(range.address + range.length.saturating_sub(1));
        }
    }
}

/// Type 20: memory device mapped address. Narrow body with no extended
/// fields, so addresses past the 32-bit KiB range clamp to the 0xFFFFFFFF
/// sentinel.
fn build_type_20(b: &mut RecordBuilder, cfg: &SmbiosConfig, handles: &HandleMap, memory: &MemoryLayout<'_>) {
    let f = cfg.fields();
    let (start_kb, end_kb) = match memory.ranges.first() {
        Some(range) => mapped_range_kb(range).unwrap_or((0xFFFF_FFFF, 0xFFFF_FFFF)),
        None => (0, 0),
    };
    b.put_u32(start_kb);
    b.put_u32(end_kb);
    b.put_u16(handles.lookup_or_unknown(17, 0));
    b.put_u16(handles.lookup_or_unknown(19, 0));
    b.put_u8(f.number_or(20, "partition-row-position", 1) as u8);
    b.put_u8(f.number_or(20, "interleave-position", 0) as u8);
    b.put_u8(f.number_or(20, "interleave-data-depth", 0) as u8);
}

/// Type 22: portable battery (narrow body).
fn build_type_22(b: &mut RecordBuilder, cfg: &SmbiosConfig) {
    b.put_str(cfg.fields().text_or(22, "name", ""));
}

/// Types 26 and 28 share one body shape: voltage and temperature probe.
fn build_probe(b: &mut RecordBuilder, cfg: &SmbiosConfig, record_type: SmbiosType) {
    let f = cfg.fields();
    b.put_str(f.text_or(record_type, "description", ""));
    b.put_u8(f.number_or(record_type, "location-and-status", 0x02) as u8);
    b.put_u16(f.number_or(record_type, "max-value", PROBE_UNKNOWN) as u16);
    b.put_u16(f.number_or(record_type, "min-value", PROBE_UNKNOWN) as u16);
    b.put_u16(f.number_or(record_type, "resolution", PROBE_UNKNOWN) as u16);
    b.put_u16(f.number_or(record_type, "tolerance", PROBE_UNKNOWN) as u16);
    b.put_u16(f.number_or(record_type, "accuracy", PROBE_UNKNOWN) as u16);
    b.put_u32(0); // OEM-defined
    b.put_u16(f.number_or(record_type, "nominal-value", PROBE_UNKNOWN) as u16);
}

/// Type 27: cooling device (narrow body).
fn build_type_27(b: &mut RecordBuilder, cfg: &SmbiosConfig, handles: &HandleMap) {
    let f = cfg.fields();
    b.put_u16(handles.lookup_or_unknown(28, 0));
    b.put_u8(f.number_or(27, "device-type-and-status", 0x02) as u8);
    b.put_u8(f.number_or(27, "cooling-unit-group", 0) as u8);
    b.put_u32(0); // OEM-defined
    b.put_u16(f.number_or(27, "nominal-speed", PROBE_UNKNOWN) as u16);
    b.put_str(f.text_or(27, "description", ""));
}

/// Type 29: electrical current probe (narrow body).
fn build_type_29(b: &mut RecordBuilder, cfg: &SmbiosConfig) {
    b.put_str(cfg.fields().text_or(29, "description", ""));
}

/// Type 32: system boot information.
fn build_type_32(b: &mut RecordBuilder) {
    b.put_bytes(&[0; 6]); // reserved
    b.put_u8(0); // boot status: no errors detected
}

/// Type 39: system power supply (narrow body).
fn build_type_39(b: &mut RecordBuilder, cfg: &SmbiosConfig) {
    b.put_str(cfg.fields().text_or(39, "name", ""));
}

/// Type 41: onboard device extended information.
fn build_type_41(b: &mut RecordBuilder, cfg: &SmbiosConfig) {
    let f = cfg.fields();
    b.put_str(f.text_or(41, "designation", ""));
    // Bit 7 marks the device enabled; the low bits carry the device kind.
    b.put_u8(0x80 | (f.number_or(41, "device-type", 0x01) as u8 & 0x7F));
    b.put_u8(f.number_or(41, "instance", 1) as u8);
    b.put_u16(f.number_or(41, "segment", 0) as u16);
    b.put_u8(f.number_or(41, "bus", 0) as u8);
    b.put_u8(f.number_or(41, "device", 0) as u8);
}
