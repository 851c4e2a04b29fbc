//! Structure table assembly.
//!
//! One generation pass walks the supported structure types in ascending
//! numeric order twice. The planning walk decides, per type, whether a raw
//! blob replaces the builder and how many instances the builders emit, and
//! assigns every handle up front so forward references (the base board's
//! chassis handle, the cooling device's temperature probe handle) resolve
//! regardless of emission order. The build walk then encodes each structure
//! and concatenates the results, ending with the Type 127 end-of-table marker.
//!
//! The assembled byte string depends only on the configuration snapshot and
//! the physical memory ranges; repeated calls yield identical output.
//!
//! ## License
//!
//! SPDX-License-Identifier: Apache-2.0
//!

use alloc::vec::Vec;

use crate::config::SmbiosConfig;
use crate::entry_point::{build_entry_point, EntryPointType, TableStats};
use crate::error::SmbiosError;
use crate::handles::HandleMap;
use crate::record::{SmbiosHandle, SmbiosType, STRUCTURE_HEADER_SIZE};
use crate::structures::{build_structure, core_counts, Type4Body};

/// Structure types with builders, in emission order.
const SUPPORTED_TYPES: [SmbiosType; 23] =
    [0, 1, 2, 3, 4, 7, 8, 9, 11, 16, 17, 19, 20, 22, 26, 27, 28, 29, 32, 37, 39, 41, 127];

/// Memory devices report at most 16 GiB each; larger guests get several.
const MAX_DIMM_SIZE: u64 = 16 << 30;

/// One guest-physical RAM range, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysMemRange {
    pub address: u64,
    pub length: u64,
}

/// Output of one generation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmbiosTables {
    /// Concatenated structures, Type 127 end-of-table marker included
    pub table: Vec<u8>,
    /// Encoded entry point in the requested format
    pub entry_point: Vec<u8>,
}

/// Memory facts the builders derive their structures from.
pub(crate) struct MemoryLayout<'a> {
    pub(crate) ranges: &'a [PhysMemRange],
    pub(crate) ram_size: u64,
    pub(crate) dimm_count: u16,
}

impl<'a> MemoryLayout<'a> {
    pub(crate) fn new(ranges: &'a [PhysMemRange]) -> Self {
        let ram_size: u64 = ranges.iter().map(|r| r.length).sum();
        let dimm_count = ram_size.div_ceil(MAX_DIMM_SIZE) as u16;
        Self { ranges, ram_size, dimm_count }
    }

    /// Size of memory device `instance`: all devices are full-sized except a
    /// final remainder device.
    pub(crate) fn dimm_size(&self, instance: u16) -> u64 {
        let offset = u64::from(instance) * MAX_DIMM_SIZE;
        self.ram_size.saturating_sub(offset).min(MAX_DIMM_SIZE)
    }
}

/// One planned structure emission.
enum Emission {
    /// A raw blob emitted verbatim, with its embedded handle
    Blob(SmbiosType),
    /// A built structure with its planned handle
    Built { record_type: SmbiosType, instance: u16, handle: SmbiosHandle },
}

/// Builds the structure table and its entry point for a configuration
/// snapshot, physical memory map, and intended table placement address.
///
/// Fails when a raw blob is malformed, a blob handle collides with another
/// handle, or the assembled table exceeds what the requested entry point
/// format can describe.
pub fn build_tables(
    config: &SmbiosConfig,
    ep_type: EntryPointType,
    mem_ranges: &[PhysMemRange],
    table_address: u64,
) -> Result<SmbiosTables, SmbiosError> {
    let memory = MemoryLayout::new(mem_ranges);
    let type4_body = select_type4_body(config, ep_type);

    let mut handles = HandleMap::new();
    let plan = plan_emissions(config, &memory, &mut handles)?;

    let mut table = Vec::new();
    let mut stats = TableStats { len: 0, count: 0, max_structure: 0 };
    for emission in &plan {
        let encoded;
        let bytes = match emission {
            Emission::Blob(record_type) => match config.blob(*record_type) {
                Some(blob) => blob,
                None => continue,
            },
            Emission::Built { record_type, instance, handle } => {
                encoded = build_structure(*record_type, *instance, *handle, config, &handles, type4_body, &memory);
                &encoded
            }
        };
        stats.len += bytes.len();
        stats.count += 1;
        stats.max_structure = stats.max_structure.max(bytes.len());
        table.extend_from_slice(bytes);
    }

    let entry_point = build_entry_point(ep_type, &stats, table_address)?;
    log::debug!(
        "assembled SMBIOS table: {} structures, {} bytes, largest structure {} bytes",
        stats.count,
        stats.len,
        stats.max_structure
    );

    Ok(SmbiosTables { table, entry_point })
}

/// Builds only the structure table, in the shape the 32-bit entry point
/// describes. Kept for callers that place the entry point themselves.
pub fn build_table_legacy(config: &SmbiosConfig, mem_ranges: &[PhysMemRange]) -> Result<Vec<u8>, SmbiosError> {
    Ok(build_tables(config, EntryPointType::Ep32, mem_ranges, 0)?.table)
}

/// The v3.0 Type 4 body is used whenever the table itself is v3.0, and also
/// when a core or thread count reaches 255, the v2.8 8-bit overflow sentinel.
fn select_type4_body(config: &SmbiosConfig, ep_type: EntryPointType) -> Type4Body {
    let (cores, enabled, threads) = core_counts(config);
    if ep_type == EntryPointType::Ep64 || cores >= 0xFF || enabled >= 0xFF || threads >= 0xFF {
        Type4Body::V30
    } else {
        Type4Body::V28
    }
}

/// Plans the emission sequence and allocates every handle.
///
/// Types are visited in ascending numeric order, the end-of-table marker
/// last. A raw blob replaces the builder output for its type entirely; blobs
/// for types without a builder are emitted at their numeric position too.
fn plan_emissions(
    config: &SmbiosConfig,
    memory: &MemoryLayout<'_>,
    handles: &mut HandleMap,
) -> Result<Vec<Emission>, SmbiosError> {
    let mut types: Vec<SmbiosType> = SUPPORTED_TYPES.iter().copied().filter(|&t| t != 127).collect();
    for record_type in config.blob_types() {
        if record_type != 127 && !types.contains(&record_type) {
            types.push(record_type);
        }
    }
    types.sort_unstable();
    types.push(127);

    let mut plan = Vec::new();
    for record_type in types {
        if let Some(blob) = config.blob(record_type) {
            let handle = validate_blob(record_type, blob)?;
            handles.adopt(record_type, handle)?;
            plan.push(Emission::Blob(record_type));
            continue;
        }
        validate_formatted_capacity(record_type, config)?;
        for instance in 0..planned_instances(record_type, config, memory) {
            let handle = handles.allocate(record_type, instance)?;
            plan.push(Emission::Built { record_type, instance, handle });
        }
    }
    Ok(plan)
}

/// Number of instances the builders emit for a type in this pass.
fn planned_instances(record_type: SmbiosType, config: &SmbiosConfig, memory: &MemoryLayout<'_>) -> u16 {
    match record_type {
        // Mandatory singletons.
        0 | 1 | 3 | 4 | 16 | 32 | 127 => 1,
        // One memory device per DIMM, one mapped address per physical range.
        17 => memory.dimm_count,
        19 => memory.ranges.len() as u16,
        // Optional types appear only once something was configured for them.
        _ => u16::from(config.fields().has_fields(record_type)),
    }
}

/// Trailing sub-records share the 8-bit header length field with the fixed
/// body; a contained-element payload that would push the formatted area past
/// 255 bytes is a configuration error caught before any encoding happens.
fn validate_formatted_capacity(record_type: SmbiosType, config: &SmbiosConfig) -> Result<(), SmbiosError> {
    let (field, fixed_len) = match record_type {
        2 => ("contained-handles", 15),
        3 => ("contained-elements", 22),
        _ => return Ok(()),
    };
    let formatted_len = fixed_len + config.fields().bytes(record_type, field).len();
    if formatted_len > u8::MAX as usize {
        log::error!(
            "type {} structure's formatted area would be {} bytes, above the 8-bit header length ceiling",
            record_type,
            formatted_len
        );
        return Err(SmbiosError::OversizedStructure { record_type, formatted_len });
    }
    Ok(())
}

/// Checks a raw blob carries at least a complete header and a formatted
/// length that fits the blob, and extracts its embedded handle.
fn validate_blob(record_type: SmbiosType, blob: &[u8]) -> Result<SmbiosHandle, SmbiosError> {
    if blob.len() < STRUCTURE_HEADER_SIZE + 2 || blob[1] as usize > blob.len() {
        log::error!("raw type {} blob is malformed: {} bytes, cannot hold a structure", record_type, blob.len());
        return Err(SmbiosError::MalformedBlob { record_type, len: blob.len() });
    }
    Ok(u16::from_le_bytes([blob[2], blob[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RANGES: [PhysMemRange; 1] = [PhysMemRange { address: 0, length: 0x1000_0000 }];
    const ADDRESS: u64 = 0x000E_0000;

    /// Splits a table into (type, handle, total length) triples by walking
    /// headers and string tables.
    fn parse_structures(table: &[u8]) -> Vec<(u8, u16, usize)> {
        let mut out = Vec::new();
        let mut pos = 0;
        while pos < table.len() {
            let record_type = table[pos];
            let formatted = table[pos + 1] as usize;
            let handle = u16::from_le_bytes([table[pos + 2], table[pos + 3]]);
            let mut end = pos + formatted;
            while !(table[end] == 0 && table[end + 1] == 0) {
                end += 1;
            }
            end += 2;
            out.push((record_type, handle, end - pos));
            pos = end;
        }
        out
    }

    /// A minimal valid blob: header plus an empty string table.
    fn blob(record_type: u8, handle: u16) -> Vec<u8> {
        let mut b = vec![record_type, 4];
        b.extend_from_slice(&handle.to_le_bytes());
        b.extend_from_slice(&[0, 0]);
        b
    }

    #[test]
    fn test_default_table_shape() {
        let tables = build_tables(&SmbiosConfig::new(), EntryPointType::Ep32, &RANGES, ADDRESS).unwrap();
        let parsed = parse_structures(&tables.table);

        let types: Vec<u8> = parsed.iter().map(|&(t, ..)| t).collect();
        assert_eq!(types, [0, 1, 3, 4, 16, 17, 19, 32, 127]);

        // Handles are sequential from the base, so also unique.
        let handles: Vec<u16> = parsed.iter().map(|&(_, h, _)| h).collect();
        assert_eq!(handles, [1, 2, 3, 4, 5, 6, 7, 8, 9]);

        // The end-of-table marker is header-only.
        let (record_type, handle, len) = parsed[parsed.len() - 1];
        assert_eq!((record_type, handle, len), (127, 9, 6));
    }

    #[test]
    fn test_memory_structures_reference_each_other() {
        let tables = build_tables(&SmbiosConfig::new(), EntryPointType::Ep32, &RANGES, ADDRESS).unwrap();
        let parsed = parse_structures(&tables.table);

        let offset_of = |wanted: u8| -> usize {
            let mut pos = 0;
            for &(t, _, len) in &parsed {
                if t == wanted {
                    return pos;
                }
                pos += len;
            }
            panic!("type {wanted} not in table");
        };
        let handle_of = |wanted: u8| parsed.iter().find(|&&(t, ..)| t == wanted).unwrap().1;

        let t17 = offset_of(17);
        let t19 = offset_of(19);
        let array_handle = handle_of(16);
        assert_eq!(u16::from_le_bytes([tables.table[t17 + 4], tables.table[t17 + 5]]), array_handle);
        assert_eq!(u16::from_le_bytes([tables.table[t19 + 12], tables.table[t19 + 13]]), array_handle);
    }

    #[test]
    fn test_entry_point_matches_table() {
        let tables = build_tables(&SmbiosConfig::new(), EntryPointType::Ep32, &RANGES, ADDRESS).unwrap();
        let ep = &tables.entry_point;
        let parsed = parse_structures(&tables.table);

        assert_eq!(u16::from_le_bytes([ep[22], ep[23]]) as usize, tables.table.len());
        assert_eq!(u32::from_le_bytes(ep[24..28].try_into().unwrap()) as u64, ADDRESS);
        assert_eq!(u16::from_le_bytes([ep[28], ep[29]]) as usize, parsed.len());
        let max = parsed.iter().map(|&(.., len)| len).max().unwrap();
        assert_eq!(u16::from_le_bytes([ep[8], ep[9]]) as usize, max);

        // Both checksum regions balance.
        assert_eq!(ep.iter().fold(0u8, |a, &b| a.wrapping_add(b)), 0);
        assert_eq!(ep[16..].iter().fold(0u8, |a, &b| a.wrapping_add(b)), 0);
    }

    #[test]
    fn test_generation_is_deterministic() {
        let mut config = SmbiosConfig::new();
        config.set_text(0, "vendor", "ACME");
        config.set_oem_strings(vec!["a".into(), "b".into()]);

        let first = build_tables(&config, EntryPointType::Ep64, &RANGES, ADDRESS).unwrap();
        let second = build_tables(&config, EntryPointType::Ep64, &RANGES, ADDRESS).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_optional_types_appear_when_configured() {
        let mut config = SmbiosConfig::new();
        config.set_text(2, "manufacturer", "ACME");
        config.set_oem_strings(vec!["tag".into()]);
        config.set_number(41, "device-type", 0x05);

        let tables = build_tables(&config, EntryPointType::Ep32, &RANGES, ADDRESS).unwrap();
        let types: Vec<u8> = parse_structures(&tables.table).iter().map(|&(t, ..)| t).collect();
        assert_eq!(types, [0, 1, 2, 3, 4, 11, 16, 17, 19, 32, 41, 127]);
    }

    #[test]
    fn test_one_memory_device_per_16g() {
        let ranges = [PhysMemRange { address: 0, length: 40 << 30 }];
        let tables = build_tables(&SmbiosConfig::new(), EntryPointType::Ep64, &ranges, ADDRESS).unwrap();
        let parsed = parse_structures(&tables.table);

        assert_eq!(parsed.iter().filter(|&&(t, ..)| t == 17).count(), 3);

        // 16 GiB + 16 GiB + 8 GiB remainder, read back from the size fields.
        let mut sizes = Vec::new();
        let mut pos = 0;
        for &(t, _, len) in &parsed {
            if t == 17 {
                sizes.push(u16::from_le_bytes([tables.table[pos + 12], tables.table[pos + 13]]));
            }
            pos += len;
        }
        assert_eq!(sizes, [16 * 1024, 16 * 1024, 8 * 1024]);
    }

    #[test]
    fn test_one_mapped_address_per_range() {
        let ranges = [
            PhysMemRange { address: 0, length: 0x8000_0000 },
            PhysMemRange { address: 0x1_0000_0000, length: 0x8000_0000 },
        ];
        let tables = build_tables(&SmbiosConfig::new(), EntryPointType::Ep64, &ranges, ADDRESS).unwrap();
        let count = parse_structures(&tables.table).iter().filter(|&&(t, ..)| t == 19).count();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_blob_emitted_verbatim_in_place() {
        let mut config = SmbiosConfig::new();
        config.set_blob(2, blob(2, 0x0100));

        let tables = build_tables(&config, EntryPointType::Ep32, &RANGES, ADDRESS).unwrap();
        let parsed = parse_structures(&tables.table);
        let types: Vec<u8> = parsed.iter().map(|&(t, ..)| t).collect();
        assert_eq!(types, [0, 1, 2, 3, 4, 16, 17, 19, 32, 127]);

        // Blob handle kept at face value; built structures skip past it.
        assert_eq!(parsed[2].1, 0x0100);
        assert_eq!(parsed[3].1, 3);
    }

    #[test]
    fn test_blob_replaces_builder_for_its_type() {
        let mut config = SmbiosConfig::new();
        config.set_text(2, "manufacturer", "ignored");
        config.set_blob(2, blob(2, 0x0100));

        let tables = build_tables(&config, EntryPointType::Ep32, &RANGES, ADDRESS).unwrap();
        let parsed = parse_structures(&tables.table);
        assert_eq!(parsed.iter().filter(|&&(t, ..)| t == 2).count(), 1);
        // Verbatim emission: the minimal blob has no string table content.
        let t2 = &parsed[2];
        assert_eq!(t2.2, 6);
    }

    #[test]
    fn test_blob_for_type_without_builder() {
        let mut config = SmbiosConfig::new();
        config.set_blob(5, blob(5, 0x0100));

        let tables = build_tables(&config, EntryPointType::Ep32, &RANGES, ADDRESS).unwrap();
        let types: Vec<u8> = parse_structures(&tables.table).iter().map(|&(t, ..)| t).collect();
        assert_eq!(types, [0, 1, 3, 4, 5, 16, 17, 19, 32, 127]);
    }

    #[test]
    fn test_blob_handle_collision_detected() {
        // With one DIMM the builders claim handles 1 through 6 before type 17;
        // a blob pinning handle 5 collides when the allocator reaches it.
        let mut config = SmbiosConfig::new();
        config.set_blob(1, blob(1, 5));

        let err = build_tables(&config, EntryPointType::Ep32, &RANGES, ADDRESS).unwrap_err();
        assert_eq!(err, SmbiosError::HandleCollision { record_type: 17, handle: 5 });
    }

    #[test]
    fn test_blob_outside_allocated_range_is_fine() {
        let mut config = SmbiosConfig::new();
        config.set_blob(1, blob(1, 0x0200));

        let tables = build_tables(&config, EntryPointType::Ep32, &RANGES, ADDRESS).unwrap();
        let parsed = parse_structures(&tables.table);
        assert_eq!(parsed[1], (1, 0x0200, 6));
    }

    #[test]
    fn test_malformed_blob_rejected() {
        let mut config = SmbiosConfig::new();
        config.set_blob(2, vec![2, 4, 1]);
        let err = build_tables(&config, EntryPointType::Ep32, &RANGES, ADDRESS).unwrap_err();
        assert_eq!(err, SmbiosError::MalformedBlob { record_type: 2, len: 3 });

        // Declared formatted length larger than the blob itself.
        let mut config = SmbiosConfig::new();
        config.set_blob(2, vec![2, 10, 1, 0, 0, 0]);
        let err = build_tables(&config, EntryPointType::Ep32, &RANGES, ADDRESS).unwrap_err();
        assert_eq!(err, SmbiosError::MalformedBlob { record_type: 2, len: 6 });
    }

    #[test]
    fn test_oversized_contained_elements_rejected() {
        // 22 fixed bytes plus 300 element bytes cannot fit the 8-bit header
        // length field; the pass fails instead of emitting a wrapped length.
        let mut config = SmbiosConfig::new();
        config.set_bytes(3, "contained-elements", vec![0xAB; 300]);
        let err = build_tables(&config, EntryPointType::Ep32, &RANGES, ADDRESS).unwrap_err();
        assert_eq!(err, SmbiosError::OversizedStructure { record_type: 3, formatted_len: 322 });

        let mut config = SmbiosConfig::new();
        config.set_bytes(2, "contained-handles", vec![0; 250]);
        let err = build_tables(&config, EntryPointType::Ep32, &RANGES, ADDRESS).unwrap_err();
        assert_eq!(err, SmbiosError::OversizedStructure { record_type: 2, formatted_len: 265 });
    }

    #[test]
    fn test_contained_elements_at_capacity_encode_cleanly() {
        // 233 element bytes land the type 3 formatted area at exactly 255.
        let mut config = SmbiosConfig::new();
        config.set_number(3, "contained-element-length", 1);
        config.set_bytes(3, "contained-elements", vec![0xCD; 233]);

        let tables = build_tables(&config, EntryPointType::Ep32, &RANGES, ADDRESS).unwrap();
        let parsed = parse_structures(&tables.table);
        let pos = structure_offsets(&tables.table)[parsed.iter().position(|&(t, ..)| t == 3).unwrap()];
        assert_eq!(tables.table[pos + 1], 255);
    }

    #[test]
    fn test_oversized_table_needs_64bit_entry_point() {
        let mut config = SmbiosConfig::new();
        let mut big = blob(11, 0x0200);
        big.truncate(4);
        big.resize(70_000, 0);
        big.extend_from_slice(&[0, 0]);
        config.set_blob(11, big);

        let err = build_tables(&config, EntryPointType::Ep32, &RANGES, ADDRESS).unwrap_err();
        assert!(matches!(err, SmbiosError::FormatInfeasible { .. }));

        let tables = build_tables(&config, EntryPointType::Ep64, &RANGES, ADDRESS).unwrap();
        assert!(tables.table.len() > 70_000);
    }

    #[test]
    fn test_type4_body_follows_entry_point_format() {
        let config = SmbiosConfig::new();
        let body_len = |ep_type| {
            let tables = build_tables(&config, ep_type, &RANGES, ADDRESS).unwrap();
            parse_structures(&tables.table)
                .iter()
                .zip(structure_offsets(&tables.table))
                .find(|(&(t, ..), _)| t == 4)
                .map(|(_, pos)| tables.table[pos + 1])
                .unwrap()
        };
        assert_eq!(body_len(EntryPointType::Ep32), 42);
        assert_eq!(body_len(EntryPointType::Ep64), 48);
    }

    #[test]
    fn test_type4_body_widens_for_large_counts() {
        let mut config = SmbiosConfig::new();
        config.set_number(4, "thread-count", 512);
        let tables = build_tables(&config, EntryPointType::Ep32, &RANGES, ADDRESS).unwrap();
        let pos = parse_structures(&tables.table)
            .iter()
            .zip(structure_offsets(&tables.table))
            .find(|(&(t, ..), _)| t == 4)
            .map(|(_, pos)| pos)
            .unwrap();
        assert_eq!(tables.table[pos + 1], 48);
    }

    #[test]
    fn test_legacy_adapter_matches_32bit_table() {
        let mut config = SmbiosConfig::new();
        config.set_text(1, "serial", "0xDEADBEEF");
        let table = build_table_legacy(&config, &RANGES).unwrap();
        let full = build_tables(&config, EntryPointType::Ep32, &RANGES, 0).unwrap();
        assert_eq!(table, full.table);
    }

    fn structure_offsets(table: &[u8]) -> Vec<usize> {
        let mut offsets = Vec::new();
        let mut pos = 0;
        for (.., len) in parse_structures(table) {
            offsets.push(pos);
            pos += len;
        }
        offsets
    }
}
