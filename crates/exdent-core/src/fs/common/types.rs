/// Common types and utilities for image access
use anyhow::Result;
use memmap2::MmapOptions;
use std::fs::File;
use std::path::Path;

/// A memory-mapped image file
pub struct BlockDevice {
    _file: File,
    mmap: memmap2::Mmap,
    size: u64,
    sector_size: u32,
}

impl BlockDevice {
    /// Open a block device or image file with 512-byte sectors
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let size = file.metadata()?.len();

        if size == 0 {
            anyhow::bail!("Image {} is empty", path.as_ref().display());
        }

        let mmap = unsafe { MmapOptions::new().map(&file)? };

        Ok(BlockDevice {
            _file: file,
            mmap,
            size,
            sector_size: 512,
        })
    }

    /// Use `sector_size` for subsequent sector reads
    pub fn set_sector_size(&mut self, sector_size: u32) -> Result<()> {
        if sector_size == 0 || !sector_size.is_power_of_two() {
            anyhow::bail!("Invalid sector size: {}", sector_size);
        }
        self.sector_size = sector_size;
        Ok(())
    }

    pub fn sector_size(&self) -> u32 {
        self.sector_size
    }

    /// Get the size of the device in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Read a slice of bytes from the device
    pub fn read_bytes(&self, offset: u64, length: usize) -> Result<&[u8]> {
        let start = usize::try_from(offset)?;
        let end = start
            .checked_add(length)
            .ok_or_else(|| anyhow::anyhow!("Read length overflows: {} + {}", start, length))?;

        if end > self.mmap.len() {
            anyhow::bail!("Read beyond end of device: {} > {}", end, self.mmap.len());
        }

        Ok(&self.mmap[start..end])
    }

    /// Read a single sector
    pub fn read_sector(&self, sector: u64) -> Result<&[u8]> {
        self.read_sectors(sector, 1)
    }

    /// Read multiple sectors
    pub fn read_sectors(&self, start_sector: u64, count: u32) -> Result<&[u8]> {
        let sector_size = self.sector_size as u64;
        let offset = start_sector
            .checked_mul(sector_size)
            .ok_or_else(|| anyhow::anyhow!("Sector {} is out of range", start_sector))?;
        let length = (count as u64 * sector_size) as usize;
        self.read_bytes(offset, length)
    }
}
