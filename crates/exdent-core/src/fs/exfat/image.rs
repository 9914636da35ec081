/// Access to directories on an exFAT image file
use anyhow::{Context, Result};
use std::path::Path;

use super::bitmap::{AllAllocated, AllocationStatus, ClusterBitmap};
use super::directory::{AllocationBitmapSlot, ENTRY_TYPE_BITMAP, SLOT_SIZE};
use super::geometry::{ExFatGeometry, ROOT_INUM};
use super::names::{ExFatNameParser, ParseStats};
use super::ExFatBootSector;
use crate::config::NameParseConfig;
use crate::fs::common::BlockDevice;
use crate::DirectoryListing;

/// An opened exFAT image
pub struct ExFatImage {
    device: BlockDevice,
    boot: ExFatBootSector,
    geometry: ExFatGeometry,
}

impl ExFatImage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut device = BlockDevice::open(path.as_ref())
            .with_context(|| format!("Failed to open {}", path.as_ref().display()))?;

        let boot = ExFatBootSector::parse(device.read_sector(0)?)?;
        device.set_sector_size(boot.bytes_per_sector())?;
        let geometry = ExFatGeometry::from_boot_sector(&boot);

        let image_sectors = device.size() / device.sector_size() as u64;
        if image_sectors < geometry.volume_length {
            tracing::warn!(
                "Image holds {} sectors but the volume claims {}",
                image_sectors,
                geometry.volume_length
            );
        }

        tracing::info!(
            "Opened exFAT volume: {} clusters of {} bytes, root at cluster {}",
            geometry.cluster_count,
            geometry.bytes_per_cluster(),
            boot.first_cluster_of_root_directory
        );

        Ok(Self {
            device,
            boot,
            geometry,
        })
    }

    pub fn boot_sector(&self) -> &ExFatBootSector {
        &self.boot
    }

    pub fn geometry(&self) -> &ExFatGeometry {
        &self.geometry
    }

    pub fn root_cluster(&self) -> u32 {
        self.boot.first_cluster_of_root_directory
    }

    /// Read `count` consecutive clusters starting at `first`.
    ///
    /// Returns the data together with the address of every sector in it.
    pub fn read_clusters(&self, first: u32, count: u32) -> Result<(Vec<u8>, Vec<u64>)> {
        if count == 0 {
            anyhow::bail!("Cluster count must be at least 1");
        }
        let last = first
            .checked_add(count - 1)
            .ok_or_else(|| anyhow::anyhow!("Cluster run {}+{} overflows", first, count))?;
        if !self.geometry.is_cluster_in_range(first) || !self.geometry.is_cluster_in_range(last) {
            anyhow::bail!(
                "Clusters {}..={} are outside the heap (2..{})",
                first,
                last,
                self.geometry.cluster_count as u64 + 2
            );
        }

        let start = self
            .geometry
            .cluster_to_sector(first)
            .ok_or_else(|| anyhow::anyhow!("Cluster {} has no sector", first))?;
        let sector_count = count
            .checked_mul(self.geometry.sectors_per_cluster)
            .ok_or_else(|| anyhow::anyhow!("Cluster run of {} is too long", count))?;

        let data = self.device.read_sectors(start, sector_count)?.to_vec();
        let sectors = (start..start + sector_count as u64).collect();
        Ok((data, sectors))
    }

    /// Find the allocation bitmap through the root directory and load it
    pub fn load_allocation_bitmap(&self) -> Result<Option<ClusterBitmap>> {
        let (root, _) = self.read_clusters(self.root_cluster(), 1)?;

        let entry = root
            .chunks_exact(SLOT_SIZE)
            .filter(|slot| slot[0] == ENTRY_TYPE_BITMAP)
            .filter_map(|slot| AllocationBitmapSlot::decode(slot).ok())
            // Bit 0 selects the bitmap of the second FAT on TexFAT volumes
            .find(|bitmap| bitmap.flags & 0x01 == 0);

        let Some(entry) = entry else {
            tracing::warn!("No allocation bitmap entry in the root directory");
            return Ok(None);
        };

        let start = self
            .geometry
            .cluster_to_sector(entry.first_cluster)
            .ok_or_else(|| {
                anyhow::anyhow!("Allocation bitmap starts at invalid cluster {}", entry.first_cluster)
            })?;
        let offset = start * self.geometry.bytes_per_sector as u64;
        let data = self.device.read_bytes(offset, entry.data_length as usize)?;

        tracing::debug!(
            "Allocation bitmap: cluster {}, {} bytes",
            entry.first_cluster,
            entry.data_length
        );
        Ok(Some(ClusterBitmap::from_bytes(self.geometry.clone(), data)))
    }

    /// List the names in the directory occupying `clusters` clusters from `first_cluster`
    pub fn list_directory(
        &self,
        first_cluster: u32,
        clusters: u32,
        config: &NameParseConfig,
    ) -> Result<(DirectoryListing, ParseStats)> {
        let bitmap = self.load_allocation_bitmap()?;
        let allocation: &dyn AllocationStatus = match &bitmap {
            Some(bitmap) => bitmap,
            None => &AllAllocated,
        };

        let (data, sectors) = self.read_clusters(first_cluster, clusters)?;
        let addr = if first_cluster == self.root_cluster() {
            ROOT_INUM
        } else {
            self.geometry.sector_to_inum(sectors[0]).unwrap_or_default()
        };

        let parser =
            ExFatNameParser::new(self.geometry.clone(), allocation).with_config(config.clone());
        let mut listing = DirectoryListing::new(addr);
        let stats = parser
            .parse_buffer(&mut listing, &data, &sectors)
            .with_context(|| format!("Failed to parse directory at cluster {}", first_cluster))?;

        Ok((listing, stats))
    }

    /// List the root directory, one cluster
    pub fn list_root(&self, config: &NameParseConfig) -> Result<(DirectoryListing, ParseStats)> {
        self.list_directory(self.root_cluster(), 1, config)
    }
}
