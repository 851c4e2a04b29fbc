//! Entry point descriptors and feasibility validation.
//!
//! The entry point tells a firmware loader or guest OS where the structure
//! table lives and how large it is. Two incompatible wire formats exist, chosen
//! at generation time:
//!
//! - the 31-byte 32-bit format (SMBIOS 2.1): `_SM_` anchor, a checksum over the
//!   whole descriptor, and a second `_DMI_`-anchored sub-region with its own
//!   independent checksum (the sub-region was historically relocatable on its
//!   own), carrying 16-bit table length, 32-bit table address, and 16-bit
//!   structure count;
//! - the 24-byte 64-bit format (SMBIOS 3.0): `_SM3_` anchor, single checksum,
//!   32-bit maximum table size, 64-bit table address, and no structure count.
//!
//! Both checksums follow the same rule: the checksum byte is chosen so the
//! unsigned sum of all bytes in the covered region is zero modulo 256.
//!
//! ## License
//!
//! SPDX-License-Identifier: Apache-2.0
//!

use alloc::vec::Vec;

use crate::error::SmbiosError;
use crate::record::checksum8;

/// Requested entry point wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPointType {
    /// SMBIOS 2.1 32-bit entry point (table below 4 GiB, length/count in 16 bits)
    Ep32,
    /// SMBIOS 3.0 64-bit entry point (no practical table size ceiling)
    Ep64,
}

/// Total size of the 32-bit entry point structure.
pub const EP32_LENGTH: usize = 31;

/// Total size of the 64-bit entry point structure.
pub const EP64_LENGTH: usize = 24;

/// Offset of the relocatable `_DMI_` sub-region inside the 32-bit format.
const EP32_INTERMEDIATE_OFFSET: usize = 0x10;

/// Table version reported by the 32-bit format: SMBIOS 2.8, BCD revision 0x28.
const EP32_VERSION: (u8, u8) = (2, 8);
const EP32_BCD_REVISION: u8 = 0x28;

/// Table version reported by the 64-bit format: SMBIOS 3.0, docrev 0.
const EP64_VERSION: (u8, u8, u8) = (3, 0, 0);

/// Totals the assembler tracks while concatenating structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TableStats {
    /// Total table byte length, end-of-table marker included
    pub len: usize,
    /// Number of structures, blobs and end-of-table marker included
    pub count: usize,
    /// Size of the largest single encoded structure, string table included
    pub max_structure: usize,
}

/// Encodes the requested entry point, or rejects the format as infeasible for
/// the assembled table.
pub(crate) fn build_entry_point(
    ep_type: EntryPointType,
    stats: &TableStats,
    table_address: u64,
) -> Result<Vec<u8>, SmbiosError> {
    match ep_type {
        EntryPointType::Ep32 => build_ep32(stats, table_address),
        EntryPointType::Ep64 => Ok(build_ep64(stats, table_address)),
    }
}

fn build_ep32(stats: &TableStats, table_address: u64) -> Result<Vec<u8>, SmbiosError> {
    if stats.len > u16::MAX as usize || stats.count > u16::MAX as usize || table_address > u32::MAX as u64 {
        log::error!(
            "32-bit entry point cannot represent table: length {}, {} structures, address {:#x}",
            stats.len,
            stats.count,
            table_address
        );
        return Err(SmbiosError::FormatInfeasible {
            table_len: stats.len,
            structure_count: stats.count,
            table_address,
        });
    }

    let mut ep = Vec::with_capacity(EP32_LENGTH);
    ep.extend_from_slice(b"_SM_");
    ep.push(0); // checksum, fixed up below
    ep.push(EP32_LENGTH as u8);
    ep.push(EP32_VERSION.0);
    ep.push(EP32_VERSION.1);
    ep.extend_from_slice(&(stats.max_structure as u16).to_le_bytes());
    ep.push(0); // entry point revision
    ep.extend_from_slice(&[0; 5]); // formatted area, reserved
    ep.extend_from_slice(b"_DMI_");
    ep.push(0); // intermediate checksum, fixed up below
    ep.extend_from_slice(&(stats.len as u16).to_le_bytes());
    ep.extend_from_slice(&(table_address as u32).to_le_bytes());
    ep.extend_from_slice(&(stats.count as u16).to_le_bytes());
    ep.push(EP32_BCD_REVISION);
    debug_assert_eq!(ep.len(), EP32_LENGTH);

    // The intermediate region is checksummed first; the primary checksum then
    // covers the whole descriptor, intermediate checksum byte included.
    ep[EP32_INTERMEDIATE_OFFSET + 5] = checksum8(&ep[EP32_INTERMEDIATE_OFFSET..]);
    ep[4] = checksum8(&ep);

    Ok(ep)
}

fn build_ep64(stats: &TableStats, table_address: u64) -> Vec<u8> {
    let mut ep = Vec::with_capacity(EP64_LENGTH);
    ep.extend_from_slice(b"_SM3_");
    ep.push(0); // checksum, fixed up below
    ep.push(EP64_LENGTH as u8);
    ep.push(EP64_VERSION.0);
    ep.push(EP64_VERSION.1);
    ep.push(EP64_VERSION.2);
    ep.push(1); // entry point revision
    ep.push(0); // reserved
    ep.extend_from_slice(&(stats.len as u32).to_le_bytes());
    ep.extend_from_slice(&table_address.to_le_bytes());
    debug_assert_eq!(ep.len(), EP64_LENGTH);

    ep[5] = checksum8(&ep);
    ep
}

#[cfg(test)]
mod tests {
    use super::*;

    fn byte_sum(bytes: &[u8]) -> u8 {
        bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
    }

    #[test]
    fn test_ep32_layout_and_checksums() {
        let stats = TableStats { len: 0x1234, count: 9, max_structure: 0x50 };
        let ep = build_entry_point(EntryPointType::Ep32, &stats, 0x000E_8000).unwrap();

        assert_eq!(ep.len(), EP32_LENGTH);
        assert_eq!(&ep[0..4], b"_SM_");
        assert_eq!(ep[5], 31); // length
        assert_eq!((ep[6], ep[7]), (2, 8)); // version
        assert_eq!(u16::from_le_bytes([ep[8], ep[9]]), 0x50); // max structure size
        assert_eq!(&ep[16..21], b"_DMI_");
        assert_eq!(u16::from_le_bytes([ep[22], ep[23]]), 0x1234); // table length
        assert_eq!(u32::from_le_bytes([ep[24], ep[25], ep[26], ep[27]]), 0x000E_8000);
        assert_eq!(u16::from_le_bytes([ep[28], ep[29]]), 9); // structure count
        assert_eq!(ep[30], 0x28); // BCD revision

        // Both checksum regions sum to zero independently.
        assert_eq!(byte_sum(&ep), 0);
        assert_eq!(byte_sum(&ep[16..]), 0);
    }

    #[test]
    fn test_ep64_layout_and_checksum() {
        let stats = TableStats { len: 0x0010_0000, count: 12, max_structure: 0x80 };
        let ep = build_entry_point(EntryPointType::Ep64, &stats, 0x1_2345_6789).unwrap();

        assert_eq!(ep.len(), EP64_LENGTH);
        assert_eq!(&ep[0..5], b"_SM3_");
        assert_eq!(ep[6], 24); // length
        assert_eq!((ep[7], ep[8], ep[9]), (3, 0, 0)); // major, minor, docrev
        assert_eq!(ep[10], 1); // entry point revision
        assert_eq!(u32::from_le_bytes([ep[12], ep[13], ep[14], ep[15]]), 0x0010_0000);
        let addr = u64::from_le_bytes(ep[16..24].try_into().unwrap());
        assert_eq!(addr, 0x1_2345_6789);
        assert_eq!(byte_sum(&ep), 0);
    }

    #[test]
    fn test_ep32_boundary_exact_fit() {
        // 65535 bytes with 65535 structures is representable.
        let stats = TableStats { len: 0xFFFF, count: 0xFFFF, max_structure: 0xFFFF };
        let ep = build_entry_point(EntryPointType::Ep32, &stats, u32::MAX as u64).unwrap();
        assert_eq!(byte_sum(&ep), 0);
    }

    #[test]
    fn test_ep32_boundary_overflow_fails() {
        let too_long = TableStats { len: 0x1_0000, count: 1, max_structure: 0x10 };
        assert!(matches!(
            build_entry_point(EntryPointType::Ep32, &too_long, 0),
            Err(SmbiosError::FormatInfeasible { table_len: 0x1_0000, .. })
        ));

        let too_many = TableStats { len: 0x100, count: 0x1_0000, max_structure: 0x10 };
        assert!(matches!(
            build_entry_point(EntryPointType::Ep32, &too_many, 0),
            Err(SmbiosError::FormatInfeasible { structure_count: 0x1_0000, .. })
        ));

        let too_high = TableStats { len: 0x100, count: 1, max_structure: 0x10 };
        assert!(matches!(
            build_entry_point(EntryPointType::Ep32, &too_high, u32::MAX as u64 + 1),
            Err(SmbiosError::FormatInfeasible { .. })
        ));
    }

    #[test]
    fn test_ep64_has_no_size_ceiling() {
        let stats = TableStats { len: 0x1_0000, count: 0x1_0000, max_structure: 0x10 };
        let ep = build_entry_point(EntryPointType::Ep64, &stats, u32::MAX as u64 + 1).unwrap();
        assert_eq!(byte_sum(&ep), 0);
    }
}
