//! Slot classification
//!
//! Decides whether a 32-byte slot is a directory entry and of which kind.
//! Slots in allocated sectors of a healthy directory only get the basic
//! checks. Slots in unallocated sectors, or anywhere in a directory that
//! already looks corrupt, also get in-depth structural checks, since free
//! space is full of bytes that happen to start with a valid type tag.

use chrono::{NaiveDate, NaiveTime};

use super::directory::{
    AllocationBitmapSlot, EntryKind, FileSlot, NameSlot, StreamSlot, UpcaseTableSlot,
    VolumeGuidSlot, VolumeLabelSlot, ATTR_DEFINED_MASK, MAX_FILE_SECONDARY_COUNT,
    MAX_VOLUME_LABEL_UNITS, MIN_FILE_SECONDARY_COUNT, SLOT_SIZE,
};
use super::geometry::ExFatGeometry;

/// Maps a raw slot to an [`EntryKind`]
pub trait SlotClassifier {
    /// Classify `slot`; `in_depth` requests the strict structural checks
    fn classify(&self, slot: &[u8], in_depth: bool) -> EntryKind;
}

impl<F> SlotClassifier for F
where
    F: Fn(&[u8], bool) -> EntryKind,
{
    fn classify(&self, slot: &[u8], in_depth: bool) -> EntryKind {
        self(slot, in_depth)
    }
}

/// Classifier implementing the exFAT structural rules
#[derive(Debug, Clone)]
pub struct ExFatSlotClassifier {
    geometry: ExFatGeometry,
}

impl ExFatSlotClassifier {
    pub fn new(geometry: ExFatGeometry) -> Self {
        Self { geometry }
    }

    fn is_file(&self, slot: &[u8], in_depth: bool) -> bool {
        let Ok(file) = FileSlot::decode(slot) else {
            return false;
        };

        if !(MIN_FILE_SECONDARY_COUNT..=MAX_FILE_SECONDARY_COUNT).contains(&file.secondary_count) {
            return false;
        }
        if !in_depth {
            return true;
        }

        file.file_attributes & !ATTR_DEFINED_MASK == 0
            && is_valid_timestamp(file.create_timestamp)
            && is_valid_timestamp(file.modify_timestamp)
            && is_valid_timestamp(file.access_timestamp)
    }

    fn is_stream(&self, slot: &[u8], in_depth: bool) -> bool {
        let Ok(stream) = StreamSlot::decode(slot) else {
            return false;
        };
        if !in_depth {
            return true;
        }

        if stream.name_length == 0 || stream.valid_data_length > stream.data_length {
            return false;
        }
        stream.data_length == 0 || self.geometry.is_cluster_in_range(stream.first_cluster)
    }

    fn is_name(&self, slot: &[u8], in_depth: bool) -> bool {
        let Ok(name) = NameSlot::decode(slot) else {
            return false;
        };
        !in_depth || name.general_flags == 0
    }

    fn is_label(&self, slot: &[u8], in_depth: bool, empty: bool) -> bool {
        let Ok(label) = VolumeLabelSlot::decode(slot) else {
            return false;
        };

        if empty {
            label.character_count == 0 && (!in_depth || label.units.iter().all(|&u| u == 0))
        } else {
            label.character_count > 0 && label.character_count as usize <= MAX_VOLUME_LABEL_UNITS
        }
    }

    fn is_volume_guid(&self, slot: &[u8], in_depth: bool) -> bool {
        let Ok(guid) = VolumeGuidSlot::decode(slot) else {
            return false;
        };
        !in_depth || guid.secondary_count == 0
    }

    fn is_alloc_bitmap(&self, slot: &[u8], in_depth: bool) -> bool {
        let Ok(bitmap) = AllocationBitmapSlot::decode(slot) else {
            return false;
        };
        if !in_depth {
            return true;
        }

        let needed = (self.geometry.cluster_count as u64).div_ceil(8);
        self.geometry.is_cluster_in_range(bitmap.first_cluster) && bitmap.data_length >= needed
    }

    fn is_upcase_table(&self, slot: &[u8], in_depth: bool) -> bool {
        let Ok(upcase) = UpcaseTableSlot::decode(slot) else {
            return false;
        };
        !in_depth
            || (self.geometry.is_cluster_in_range(upcase.first_cluster) && upcase.data_length > 0)
    }
}

impl SlotClassifier for ExFatSlotClassifier {
    fn classify(&self, slot: &[u8], in_depth: bool) -> EntryKind {
        if slot.len() < SLOT_SIZE {
            return EntryKind::None;
        }

        let kind = EntryKind::from_tag(slot[0]);
        let valid = match kind {
            EntryKind::File | EntryKind::DeletedFile => self.is_file(slot, in_depth),
            EntryKind::FileStream | EntryKind::DeletedFileStream => self.is_stream(slot, in_depth),
            EntryKind::FileName | EntryKind::DeletedFileName => self.is_name(slot, in_depth),
            EntryKind::VolumeLabel => self.is_label(slot, in_depth, false),
            EntryKind::VolumeLabelEmpty => self.is_label(slot, in_depth, true),
            EntryKind::VolumeGuid => self.is_volume_guid(slot, in_depth),
            EntryKind::AllocationBitmap => self.is_alloc_bitmap(slot, in_depth),
            EntryKind::UpcaseTable => self.is_upcase_table(slot, in_depth),
            // Nothing in these slots can be checked
            EntryKind::TexFat | EntryKind::AccessControlTable => true,
            EntryKind::None => false,
        };

        if valid {
            kind
        } else {
            EntryKind::None
        }
    }
}

/// Whether a packed exFAT timestamp is zero or a real calendar date-time
pub fn is_valid_timestamp(timestamp: u32) -> bool {
    if timestamp == 0 {
        return true;
    }

    let double_seconds = timestamp & 0x1F;
    let minute = (timestamp >> 5) & 0x3F;
    let hour = (timestamp >> 11) & 0x1F;
    let day = (timestamp >> 16) & 0x1F;
    let month = (timestamp >> 21) & 0x0F;
    let year = 1980 + ((timestamp >> 25) & 0x7F) as i32;

    NaiveDate::from_ymd_opt(year, month, day).is_some()
        && NaiveTime::from_hms_opt(hour, minute, double_seconds * 2).is_some()
}
