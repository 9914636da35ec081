//! exFAT directory slot kinds and field decoders
//!
//! exFAT directories are arrays of 32-byte slots. The first byte is the
//! entry type; bit 7 is the in-use bit, so deleted members of a file entry
//! set keep their type code with the high bit cleared:
//! - 0x85 / 0x05: File
//! - 0xC0 / 0x40: Stream extension
//! - 0xC1 / 0x41: File name (15 UTF-16 units per slot)
//! - 0x83 / 0x03: Volume label / empty volume label
//! - 0x81: Allocation bitmap, 0x82: Up-case table
//! - 0xA0: Volume GUID, 0xA1: TexFAT padding, 0xE2: Access control table
//!
//! Decoders read fixed little-endian offsets from a slice and fail on short
//! input instead of reinterpreting bytes in place.

use byteorder::{LittleEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use uuid::Uuid;

use crate::error::{DentError, DentResult};

/// Directory slot size in bytes
pub const SLOT_SIZE: usize = 32;

/// Entry type codes (high bit set = in-use)
pub const ENTRY_TYPE_FILE: u8 = 0x85;
pub const ENTRY_TYPE_STREAM: u8 = 0xC0;
pub const ENTRY_TYPE_FILENAME: u8 = 0xC1;
pub const ENTRY_TYPE_BITMAP: u8 = 0x81;
pub const ENTRY_TYPE_UPCASE: u8 = 0x82;
pub const ENTRY_TYPE_LABEL: u8 = 0x83;
pub const ENTRY_TYPE_VOLUME_GUID: u8 = 0xA0;
pub const ENTRY_TYPE_TEXFAT: u8 = 0xA1;
pub const ENTRY_TYPE_ACT: u8 = 0xE2;

/// Deleted or empty entry type codes (high bit cleared)
pub const ENTRY_TYPE_FILE_DELETED: u8 = 0x05;
pub const ENTRY_TYPE_STREAM_DELETED: u8 = 0x40;
pub const ENTRY_TYPE_FILENAME_DELETED: u8 = 0x41;
pub const ENTRY_TYPE_LABEL_EMPTY: u8 = 0x03;

/// File attributes
pub const ATTR_READ_ONLY: u16 = 0x01;
pub const ATTR_HIDDEN: u16 = 0x02;
pub const ATTR_SYSTEM: u16 = 0x04;
pub const ATTR_DIRECTORY: u16 = 0x10;
pub const ATTR_ARCHIVE: u16 = 0x20;

/// Every attribute bit exFAT defines
pub const ATTR_DEFINED_MASK: u16 =
    ATTR_READ_ONLY | ATTR_HIDDEN | ATTR_SYSTEM | ATTR_DIRECTORY | ATTR_ARCHIVE;

/// UTF-16 units carried by one file name slot
pub const NAME_UNITS_PER_SLOT: usize = 15;

/// UTF-16 units carried by a volume label slot
pub const MAX_VOLUME_LABEL_UNITS: usize = 11;

/// Secondary entry bounds for a file entry set (stream + 1..=17 names)
pub const MIN_FILE_SECONDARY_COUNT: u8 = 2;
pub const MAX_FILE_SECONDARY_COUNT: u8 = 18;

/// Virtual file names for system slots that carry no name of their own
pub const VOLUME_GUID_VIRT_FILENAME: &str = "$VOLUME_GUID";
pub const ALLOC_BITMAP_VIRT_FILENAME: &str = "$ALLOC_BITMAP";
pub const UPCASE_TABLE_VIRT_FILENAME: &str = "$UPCASE_TABLE";
pub const TEX_FAT_VIRT_FILENAME: &str = "$TEX_FAT";
pub const ACT_VIRT_FILENAME: &str = "$ACT";

/// Classified kind of a directory slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    DeletedFile,
    FileStream,
    DeletedFileStream,
    FileName,
    DeletedFileName,
    VolumeLabel,
    VolumeLabelEmpty,
    VolumeGuid,
    AllocationBitmap,
    UpcaseTable,
    TexFat,
    AccessControlTable,
    /// Not a directory entry (unused slot, unknown type, or failed checks)
    None,
}

impl EntryKind {
    /// Map a type tag to its kind without any structural checks
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            ENTRY_TYPE_FILE => EntryKind::File,
            ENTRY_TYPE_FILE_DELETED => EntryKind::DeletedFile,
            ENTRY_TYPE_STREAM => EntryKind::FileStream,
            ENTRY_TYPE_STREAM_DELETED => EntryKind::DeletedFileStream,
            ENTRY_TYPE_FILENAME => EntryKind::FileName,
            ENTRY_TYPE_FILENAME_DELETED => EntryKind::DeletedFileName,
            ENTRY_TYPE_LABEL => EntryKind::VolumeLabel,
            ENTRY_TYPE_LABEL_EMPTY => EntryKind::VolumeLabelEmpty,
            ENTRY_TYPE_VOLUME_GUID => EntryKind::VolumeGuid,
            ENTRY_TYPE_BITMAP => EntryKind::AllocationBitmap,
            ENTRY_TYPE_UPCASE => EntryKind::UpcaseTable,
            ENTRY_TYPE_TEXFAT => EntryKind::TexFat,
            ENTRY_TYPE_ACT => EntryKind::AccessControlTable,
            _ => EntryKind::None,
        }
    }

    /// The on-disk type tag, `None` for unclassifiable slots
    pub fn tag(self) -> Option<u8> {
        let tag = match self {
            EntryKind::File => ENTRY_TYPE_FILE,
            EntryKind::DeletedFile => ENTRY_TYPE_FILE_DELETED,
            EntryKind::FileStream => ENTRY_TYPE_STREAM,
            EntryKind::DeletedFileStream => ENTRY_TYPE_STREAM_DELETED,
            EntryKind::FileName => ENTRY_TYPE_FILENAME,
            EntryKind::DeletedFileName => ENTRY_TYPE_FILENAME_DELETED,
            EntryKind::VolumeLabel => ENTRY_TYPE_LABEL,
            EntryKind::VolumeLabelEmpty => ENTRY_TYPE_LABEL_EMPTY,
            EntryKind::VolumeGuid => ENTRY_TYPE_VOLUME_GUID,
            EntryKind::AllocationBitmap => ENTRY_TYPE_BITMAP,
            EntryKind::UpcaseTable => ENTRY_TYPE_UPCASE,
            EntryKind::TexFat => ENTRY_TYPE_TEXFAT,
            EntryKind::AccessControlTable => ENTRY_TYPE_ACT,
            EntryKind::None => return None,
        };
        Some(tag)
    }

    /// Tag of the in-use counterpart; deletion does not update the set checksum
    pub fn live_tag(self) -> Option<u8> {
        match self {
            EntryKind::DeletedFile => Some(ENTRY_TYPE_FILE),
            EntryKind::DeletedFileStream => Some(ENTRY_TYPE_STREAM),
            EntryKind::DeletedFileName => Some(ENTRY_TYPE_FILENAME),
            other => other.tag(),
        }
    }

    /// Deleted variant of a file entry set member
    pub fn is_deleted(self) -> bool {
        matches!(
            self,
            EntryKind::DeletedFile | EntryKind::DeletedFileStream | EntryKind::DeletedFileName
        )
    }

    /// Fixed name for system slots that are listed as virtual files
    pub fn virtual_name(self) -> Option<&'static str> {
        match self {
            EntryKind::VolumeGuid => Some(VOLUME_GUID_VIRT_FILENAME),
            EntryKind::AllocationBitmap => Some(ALLOC_BITMAP_VIRT_FILENAME),
            EntryKind::UpcaseTable => Some(UPCASE_TABLE_VIRT_FILENAME),
            EntryKind::TexFat => Some(TEX_FAT_VIRT_FILENAME),
            EntryKind::AccessControlTable => Some(ACT_VIRT_FILENAME),
            _ => None,
        }
    }
}

fn check_slot_len(data: &[u8]) -> DentResult<()> {
    if data.len() < SLOT_SIZE {
        return Err(DentError::TruncatedSlot {
            needed: SLOT_SIZE,
            actual: data.len(),
        });
    }
    Ok(())
}

fn read_units<const N: usize>(cursor: &mut Cursor<&[u8]>) -> DentResult<[u16; N]> {
    let mut units = [0u16; N];
    for unit in units.iter_mut() {
        *unit = cursor.read_u16::<LittleEndian>()?;
    }
    Ok(units)
}

/// File slot (primary entry for a file or directory)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSlot {
    /// Entry type (0x85 or 0x05 if deleted)
    pub entry_type: u8,
    /// Number of secondary entries (stream + names)
    pub secondary_count: u8,
    /// Stored checksum of all slots in the set
    pub set_checksum: u16,
    /// File attributes (directory, hidden, etc.)
    pub file_attributes: u16,
    pub create_timestamp: u32,
    pub modify_timestamp: u32,
    pub access_timestamp: u32,
}

impl FileSlot {
    pub fn decode(data: &[u8]) -> DentResult<Self> {
        check_slot_len(data)?;
        let mut cursor = Cursor::new(data);

        let entry_type = cursor.read_u8()?;
        let secondary_count = cursor.read_u8()?;
        let set_checksum = cursor.read_u16::<LittleEndian>()?;
        let file_attributes = cursor.read_u16::<LittleEndian>()?;
        let _reserved1 = cursor.read_u16::<LittleEndian>()?;
        let create_timestamp = cursor.read_u32::<LittleEndian>()?;
        let modify_timestamp = cursor.read_u32::<LittleEndian>()?;
        let access_timestamp = cursor.read_u32::<LittleEndian>()?;

        Ok(FileSlot {
            entry_type,
            secondary_count,
            set_checksum,
            file_attributes,
            create_timestamp,
            modify_timestamp,
            access_timestamp,
        })
    }

    /// Check if this is a directory
    pub fn is_directory(&self) -> bool {
        self.file_attributes & ATTR_DIRECTORY != 0
    }
}

/// Stream extension slot (name length, size, and first cluster)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSlot {
    pub entry_type: u8,
    /// General flags (bit 1 = NoFatChain)
    pub general_flags: u8,
    /// File name length in UTF-16 units
    pub name_length: u8,
    pub name_hash: u16,
    pub valid_data_length: u64,
    pub first_cluster: u32,
    pub data_length: u64,
}

impl StreamSlot {
    pub fn decode(data: &[u8]) -> DentResult<Self> {
        check_slot_len(data)?;
        let mut cursor = Cursor::new(data);

        let entry_type = cursor.read_u8()?;
        let general_flags = cursor.read_u8()?;
        let _reserved = cursor.read_u8()?;
        let name_length = cursor.read_u8()?;
        let name_hash = cursor.read_u16::<LittleEndian>()?;
        let _reserved2 = cursor.read_u16::<LittleEndian>()?;
        let valid_data_length = cursor.read_u64::<LittleEndian>()?;
        let _reserved3 = cursor.read_u32::<LittleEndian>()?;
        let first_cluster = cursor.read_u32::<LittleEndian>()?;
        let data_length = cursor.read_u64::<LittleEndian>()?;

        Ok(StreamSlot {
            entry_type,
            general_flags,
            name_length,
            name_hash,
            valid_data_length,
            first_cluster,
            data_length,
        })
    }
}

/// File name slot (up to 15 UTF-16 units)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameSlot {
    pub entry_type: u8,
    pub general_flags: u8,
    pub units: [u16; NAME_UNITS_PER_SLOT],
}

impl NameSlot {
    pub fn decode(data: &[u8]) -> DentResult<Self> {
        check_slot_len(data)?;
        let mut cursor = Cursor::new(data);

        let entry_type = cursor.read_u8()?;
        let general_flags = cursor.read_u8()?;
        let units = read_units::<NAME_UNITS_PER_SLOT>(&mut cursor)?;

        Ok(NameSlot {
            entry_type,
            general_flags,
            units,
        })
    }
}

/// Volume label slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeLabelSlot {
    pub entry_type: u8,
    /// Label length in UTF-16 units as stored (may exceed 11 on damaged media)
    pub character_count: u8,
    pub units: [u16; MAX_VOLUME_LABEL_UNITS],
    pub reserved: u64,
}

impl VolumeLabelSlot {
    pub fn decode(data: &[u8]) -> DentResult<Self> {
        check_slot_len(data)?;
        let mut cursor = Cursor::new(data);

        let entry_type = cursor.read_u8()?;
        let character_count = cursor.read_u8()?;
        let units = read_units::<MAX_VOLUME_LABEL_UNITS>(&mut cursor)?;
        let reserved = cursor.read_u64::<LittleEndian>()?;

        Ok(VolumeLabelSlot {
            entry_type,
            character_count,
            units,
            reserved,
        })
    }

    /// Units that belong to the label, capped at the slot capacity
    pub fn label_units(&self) -> &[u16] {
        let count = (self.character_count as usize).min(MAX_VOLUME_LABEL_UNITS);
        &self.units[..count]
    }
}

/// Volume GUID slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeGuidSlot {
    pub secondary_count: u8,
    pub set_checksum: u16,
    pub general_flags: u16,
    pub guid: Uuid,
}

impl VolumeGuidSlot {
    pub fn decode(data: &[u8]) -> DentResult<Self> {
        check_slot_len(data)?;
        let mut cursor = Cursor::new(data);

        let _entry_type = cursor.read_u8()?;
        let secondary_count = cursor.read_u8()?;
        let set_checksum = cursor.read_u16::<LittleEndian>()?;
        let general_flags = cursor.read_u16::<LittleEndian>()?;
        let mut guid_bytes = [0u8; 16];
        std::io::Read::read_exact(&mut cursor, &mut guid_bytes)?;

        Ok(VolumeGuidSlot {
            secondary_count,
            set_checksum,
            general_flags,
            guid: Uuid::from_bytes_le(guid_bytes),
        })
    }
}

/// Allocation bitmap slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationBitmapSlot {
    /// Bit 0 selects the bitmap of the second FAT
    pub flags: u8,
    pub first_cluster: u32,
    /// Bitmap size in bytes
    pub data_length: u64,
}

impl AllocationBitmapSlot {
    pub fn decode(data: &[u8]) -> DentResult<Self> {
        check_slot_len(data)?;
        let mut cursor = Cursor::new(data);

        let _entry_type = cursor.read_u8()?;
        let flags = cursor.read_u8()?;
        cursor.set_position(20);
        let first_cluster = cursor.read_u32::<LittleEndian>()?;
        let data_length = cursor.read_u64::<LittleEndian>()?;

        Ok(AllocationBitmapSlot {
            flags,
            first_cluster,
            data_length,
        })
    }
}

/// Up-case table slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpcaseTableSlot {
    pub table_checksum: u32,
    pub first_cluster: u32,
    pub data_length: u64,
}

impl UpcaseTableSlot {
    pub fn decode(data: &[u8]) -> DentResult<Self> {
        check_slot_len(data)?;
        let mut cursor = Cursor::new(data);

        cursor.set_position(4);
        let table_checksum = cursor.read_u32::<LittleEndian>()?;
        cursor.set_position(20);
        let first_cluster = cursor.read_u32::<LittleEndian>()?;
        let data_length = cursor.read_u64::<LittleEndian>()?;

        Ok(UpcaseTableSlot {
            table_checksum,
            first_cluster,
            data_length,
        })
    }
}
