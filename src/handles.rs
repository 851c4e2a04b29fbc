//! Handle allocation and cross-structure reference resolution.
//!
//! Handles are assigned sequentially in emission order starting from a fixed
//! base, one per structure. Raw blob overrides keep their embedded handle at
//! face value; a collision between a blob handle and any other handle is a
//! configuration error, never silently resolved.
//!
//! ## License
//!
//! SPDX-License-Identifier: Apache-2.0
//!

use alloc::collections::{BTreeMap, BTreeSet};

use crate::error::SmbiosError;
use crate::record::{SmbiosHandle, SmbiosType, HANDLE_UNKNOWN};

/// First handle issued in every generation pass.
pub(crate) const HANDLE_BASE: SmbiosHandle = 0x0001;

/// Allocator plus (type, instance) → handle resolution map for one pass.
pub(crate) struct HandleMap {
    next: SmbiosHandle,
    used: BTreeSet<SmbiosHandle>,
    by_instance: BTreeMap<(SmbiosType, u16), SmbiosHandle>,
}

impl HandleMap {
    pub(crate) fn new() -> Self {
        Self { next: HANDLE_BASE, used: BTreeSet::new(), by_instance: BTreeMap::new() }
    }

    /// Issues the next sequential handle for instance `instance` of a built
    /// structure. Fails if the handle is already taken by a raw blob.
    pub(crate) fn allocate(&mut self, record_type: SmbiosType, instance: u16) -> Result<SmbiosHandle, SmbiosError> {
        let handle = self.next;
        self.next = self.next.wrapping_add(1);

        if !self.used.insert(handle) {
            log::error!("handle {:#06x} for built type {} structure already taken by a raw blob", handle, record_type);
            return Err(SmbiosError::HandleCollision { record_type, handle });
        }

        self.by_instance.insert((record_type, instance), handle);
        Ok(handle)
    }

    /// Registers a raw blob's embedded handle, taken at face value.
    pub(crate) fn adopt(&mut self, record_type: SmbiosType, handle: SmbiosHandle) -> Result<(), SmbiosError> {
        if !self.used.insert(handle) {
            log::error!("raw type {} blob embeds handle {:#06x} which is already taken", record_type, handle);
            return Err(SmbiosError::HandleCollision { record_type, handle });
        }

        self.by_instance.insert((record_type, 0), handle);
        Ok(())
    }

    pub(crate) fn lookup(&self, record_type: SmbiosType, instance: u16) -> Option<SmbiosHandle> {
        self.by_instance.get(&(record_type, instance)).copied()
    }

    /// Resolves a cross reference, encoding the 0xFFFF "unknown" sentinel when
    /// the referent is absent from this pass.
    pub(crate) fn lookup_or_unknown(&self, record_type: SmbiosType, instance: u16) -> SmbiosHandle {
        self.lookup(record_type, instance).unwrap_or(HANDLE_UNKNOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_sequential_from_base() {
        let mut handles = HandleMap::new();
        assert_eq!(handles.allocate(0, 0), Ok(HANDLE_BASE));
        assert_eq!(handles.allocate(1, 0), Ok(HANDLE_BASE + 1));
        assert_eq!(handles.allocate(17, 0), Ok(HANDLE_BASE + 2));
        assert_eq!(handles.allocate(17, 1), Ok(HANDLE_BASE + 3));
    }

    #[test]
    fn test_lookup_resolves_instances() {
        let mut handles = HandleMap::new();
        handles.allocate(16, 0).unwrap();
        handles.allocate(17, 0).unwrap();
        handles.allocate(17, 1).unwrap();

        assert_eq!(handles.lookup(16, 0), Some(0x0001));
        assert_eq!(handles.lookup(17, 1), Some(0x0003));
        assert_eq!(handles.lookup(19, 0), None);
        assert_eq!(handles.lookup_or_unknown(19, 0), 0xFFFF);
    }

    #[test]
    fn test_adopt_keeps_blob_handle() {
        let mut handles = HandleMap::new();
        handles.adopt(1, 0x0200).unwrap();
        assert_eq!(handles.lookup(1, 0), Some(0x0200));
    }

    #[test]
    fn test_allocate_collides_with_adopted_handle() {
        let mut handles = HandleMap::new();
        handles.adopt(1, 0x0002).unwrap();
        handles.allocate(0, 0).unwrap(); // 0x0001
        assert_eq!(handles.allocate(3, 0), Err(SmbiosError::HandleCollision { record_type: 3, handle: 0x0002 }));
    }

    #[test]
    fn test_adopt_collides_with_allocated_handle() {
        let mut handles = HandleMap::new();
        handles.allocate(0, 0).unwrap();
        assert_eq!(handles.adopt(1, 0x0001), Err(SmbiosError::HandleCollision { record_type: 1, handle: 0x0001 }));
    }
}
