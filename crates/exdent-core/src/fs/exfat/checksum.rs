//! exFAT entry set checksum
//!
//! The checksum is a 16-bit rotate-right-and-add over every byte of the set,
//! skipping the two bytes of the file slot that store the checksum itself.

use super::directory::EntryKind;

/// Running checksum over the slots of one entry set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntrySetChecksum(u16);

impl EntrySetChecksum {
    pub fn new() -> Self {
        Self(0)
    }

    /// Fold one byte into the checksum
    #[inline]
    pub fn add_byte(&mut self, byte: u8) {
        self.0 = self.0.rotate_right(1).wrapping_add(byte as u16);
    }

    /// Fold one slot of kind `kind` into the checksum.
    ///
    /// Deleted set members are summed with their in-use tag, since the
    /// filesystem clears the in-use bit without rewriting the checksum.
    pub fn add_slot(&mut self, kind: EntryKind, slot: &[u8]) {
        let is_primary = matches!(kind, EntryKind::File | EntryKind::DeletedFile);

        for (index, &byte) in slot.iter().enumerate() {
            if is_primary && (index == 2 || index == 3) {
                continue;
            }

            let byte = if index == 0 {
                kind.live_tag().unwrap_or(byte)
            } else {
                byte
            };
            self.add_byte(byte);
        }
    }

    pub fn value(&self) -> u16 {
        self.0
    }
}
