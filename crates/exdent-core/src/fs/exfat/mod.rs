/// exFAT directory name reconstruction support
use anyhow::Result;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

// Sub-modules
pub mod bitmap;
pub mod checksum;
pub mod classify;
pub mod directory;
pub mod geometry;
pub mod image;
pub mod names;
pub mod utf16;

pub use bitmap::{AllAllocated, AllocationStatus, ClusterBitmap};
pub use checksum::EntrySetChecksum;
pub use classify::{ExFatSlotClassifier, SlotClassifier};
pub use directory::EntryKind;
pub use geometry::ExFatGeometry;
pub use image::ExFatImage;
pub use names::{ExFatNameParser, ParseStats};
pub use utf16::{EncodingRsDecoder, Utf16Decoder};

/// exFAT file system signature
const EXFAT_SIGNATURE: &[u8; 8] = b"EXFAT   ";

/// Offset of the volume length field; everything before it is the jump
/// instruction, the signature and the zeroed legacy BPB
const VOLUME_LENGTH_OFFSET: u64 = 72;

/// Boot sector fields that describe the volume layout
#[derive(Debug, Clone)]
pub struct ExFatBootSector {
    /// Volume length in sectors
    pub volume_length: u64,
    pub fat_offset: u32,
    pub fat_length: u32,
    /// First sector of the cluster heap
    pub cluster_heap_offset: u32,
    pub cluster_count: u32,
    pub first_cluster_of_root_directory: u32,
    pub volume_serial_number: u32,
    pub file_system_revision: u16,
    pub volume_flags: u16,
    pub bytes_per_sector_shift: u8,
    pub sectors_per_cluster_shift: u8,
    pub number_of_fats: u8,
    pub drive_select: u8,
    pub percent_in_use: u8,
}

impl ExFatBootSector {
    /// Decode sector 0 of a volume.
    ///
    /// Fails when the cluster heap does not fit inside the volume or the
    /// volume size in bytes overflows a `u64`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 512 {
            anyhow::bail!("Boot sector needs 512 bytes, got {}", data.len());
        }
        if !is_exfat_boot_sector(data) {
            anyhow::bail!("Invalid exFAT signature");
        }

        let mut fields = Cursor::new(data);
        fields.set_position(VOLUME_LENGTH_OFFSET);

        let boot = ExFatBootSector {
            volume_length: fields.read_u64::<LittleEndian>()?,
            fat_offset: fields.read_u32::<LittleEndian>()?,
            fat_length: fields.read_u32::<LittleEndian>()?,
            cluster_heap_offset: fields.read_u32::<LittleEndian>()?,
            cluster_count: fields.read_u32::<LittleEndian>()?,
            first_cluster_of_root_directory: fields.read_u32::<LittleEndian>()?,
            volume_serial_number: fields.read_u32::<LittleEndian>()?,
            file_system_revision: fields.read_u16::<LittleEndian>()?,
            volume_flags: fields.read_u16::<LittleEndian>()?,
            bytes_per_sector_shift: fields.read_u8()?,
            sectors_per_cluster_shift: fields.read_u8()?,
            number_of_fats: fields.read_u8()?,
            drive_select: fields.read_u8()?,
            percent_in_use: fields.read_u8()?,
        };

        boot.check_layout()?;
        Ok(boot)
    }

    fn check_layout(&self) -> Result<()> {
        // 512..4096 byte sectors, clusters up to 32 MiB
        if !(9..=12).contains(&self.bytes_per_sector_shift) {
            anyhow::bail!(
                "Unsupported bytes per sector shift: {}",
                self.bytes_per_sector_shift
            );
        }
        if self.bytes_per_sector_shift as u32 + self.sectors_per_cluster_shift as u32 > 25 {
            anyhow::bail!(
                "Unsupported sectors per cluster shift: {}",
                self.sectors_per_cluster_shift
            );
        }
        if !(1..=2).contains(&self.number_of_fats) {
            anyhow::bail!("Unsupported number of FATs: {}", self.number_of_fats);
        }

        if self.volume_size_bytes().is_none() {
            anyhow::bail!(
                "Volume length of {} sectors overflows a 64-bit byte offset",
                self.volume_length
            );
        }

        let fat_end = self.fat_offset as u64 + self.fat_length as u64 * self.number_of_fats as u64;
        if (self.cluster_heap_offset as u64) < fat_end {
            anyhow::bail!(
                "Cluster heap at sector {} overlaps the FAT region ending at sector {}",
                self.cluster_heap_offset,
                fat_end
            );
        }

        let heap_end = self.cluster_heap_offset as u64
            + ((self.cluster_count as u64) << self.sectors_per_cluster_shift);
        if self.volume_length < heap_end {
            anyhow::bail!(
                "Volume of {} sectors cannot hold a cluster heap ending at sector {}",
                self.volume_length,
                heap_end
            );
        }
        Ok(())
    }

    pub fn bytes_per_sector(&self) -> u32 {
        1 << self.bytes_per_sector_shift
    }

    pub fn sectors_per_cluster(&self) -> u32 {
        1 << self.sectors_per_cluster_shift
    }

    pub fn bytes_per_cluster(&self) -> u32 {
        self.bytes_per_sector() * self.sectors_per_cluster()
    }

    /// Volume size in bytes; `None` when it does not fit in a `u64`
    pub fn volume_size_bytes(&self) -> Option<u64> {
        self.volume_length
            .checked_mul(1u64 << self.bytes_per_sector_shift.min(63))
    }

    /// Human-readable summary of the volume layout
    pub fn describe(&self) -> String {
        let volume_size_mb = self
            .volume_length
            .saturating_mul(self.bytes_per_sector() as u64)
            / (1024 * 1024);

        format!(
            "exFAT File System\n\
             - Bytes per Sector: {}\n\
             - Sectors per Cluster: {}\n\
             - Bytes per Cluster: {}\n\
             - Volume Size: {} MB\n\
             - Cluster Count: {}\n\
             - Cluster Heap Offset: {} sectors\n\
             - Root Directory Cluster: {}\n\
             - Number of FATs: {}\n\
             - Volume Serial: 0x{:08X}\n\
             - File System Revision: {}.{}",
            self.bytes_per_sector(),
            self.sectors_per_cluster(),
            self.bytes_per_cluster(),
            volume_size_mb,
            self.cluster_count,
            self.cluster_heap_offset,
            self.first_cluster_of_root_directory,
            self.number_of_fats,
            self.volume_serial_number,
            self.file_system_revision >> 8,
            self.file_system_revision & 0xFF,
        )
    }
}

/// Check if data contains exFAT boot sector signature
pub fn is_exfat_boot_sector(data: &[u8]) -> bool {
    if data.len() < 11 {
        return false;
    }

    // exFAT signature is at offset 3
    &data[3..11] == EXFAT_SIGNATURE
}
