//! SMBIOS Table Synthesis
//!
//! This crate builds the System Management BIOS (SMBIOS) structure table and entry
//! point that a virtual machine's firmware exposes to its guest operating system.
//! The guest reads the table to learn about the BIOS, system, board, chassis,
//! processor, memory layout, slots, and auxiliary sensor hardware of the (virtual)
//! platform.
//!
//! # Table layout
//!
//! Every SMBIOS structure consists of three parts in the binary format:
//!
//! ```text
//! ┌─────────────┬──────────────────────┬────────────────────────────┐
//! │   Header    │     Fixed Body       │       String Table         │
//! │   (4 bytes) │   (varies by type)   │  (null-terminated strings) │
//! └─────────────┴──────────────────────┴────────────────────────────┘
//! ```
//!
//! Structures are concatenated in ascending type order, terminated by a Type 127
//! End-of-Table marker, and described by one of two checksummed entry point
//! descriptors: the 31-byte 32-bit format (SMBIOS 2.1, `_SM_`/`_DMI_` anchors) or
//! the 24-byte 64-bit format (SMBIOS 3.0, `_SM3_` anchor).
//!
//! # Quick start
//!
//! ```
//! use smbios_tables::{build_tables, EntryPointType, PhysMemRange, SmbiosConfig};
//!
//! let mut config = SmbiosConfig::new();
//! config.set_defaults("ACME", "SuperServer 3000", "1.0");
//! config.set_text(0, "vendor", "ACME BIOS");
//!
//! let ram = [PhysMemRange { address: 0, length: 0x1000_0000 }];
//! let tables = build_tables(&config, EntryPointType::Ep64, &ram, 0x8000_0000).unwrap();
//! assert_eq!(&tables.entry_point[0..5], b"_SM3_");
//! ```
//!
//! # Inputs
//!
//! The configuration layer populates a [`SmbiosConfig`] once, before generation:
//! per-type field overrides (falling back to specification defaults), raw
//! pre-encoded structure overrides per type, the system UUID, CPU identification
//! words, and default manufacturer/product/version strings. The machine model
//! supplies the physical memory ranges. A generation call is pure: identical
//! inputs produce byte-identical output, and nothing is cached between calls.
//!
//! ## License
//!
//! SPDX-License-Identifier: Apache-2.0
//!

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod entry_point;
pub mod error;
mod handles;
mod record;
mod structures;
pub mod table;

pub use config::{CpuId, FieldValue, SmbiosConfig};
pub use entry_point::EntryPointType;
pub use error::SmbiosError;
pub use record::{SmbiosHandle, SmbiosType};
pub use table::{build_table_legacy, build_tables, PhysMemRange, SmbiosTables};
