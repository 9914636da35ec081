//! Volume geometry and directory slot addressing
//!
//! Every 32-byte slot in the cluster heap gets a metadata address:
//!
//! ```text
//! inum = (sector - cluster_heap_offset) * slots_per_sector + FIRST_NORMAL_INUM
//! ```
//!
//! Address 2 is the root directory. The addresses past the last slot are
//! reserved for virtual files (`$MBR`, one per FAT, `$OrphanFiles`).

use super::directory::SLOT_SIZE;
use super::ExFatBootSector;

/// Metadata address of the root directory
pub const ROOT_INUM: u64 = 2;

/// First metadata address assigned to a directory slot
pub const FIRST_NORMAL_INUM: u64 = 3;

/// Layout parameters needed to walk a directory buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExFatGeometry {
    /// Bytes per sector
    pub bytes_per_sector: u32,
    /// Sectors per cluster
    pub sectors_per_cluster: u32,
    /// Slot size in bytes (32 on exFAT)
    pub slot_size: u32,
    /// First sector of the cluster heap
    pub cluster_heap_offset: u64,
    /// Number of clusters in the heap
    pub cluster_count: u32,
    /// Volume length in sectors
    pub volume_length: u64,
    /// Number of FATs (1, or 2 for TexFAT)
    pub number_of_fats: u8,
}

impl ExFatGeometry {
    pub fn new(
        bytes_per_sector: u32,
        sectors_per_cluster: u32,
        cluster_heap_offset: u64,
        cluster_count: u32,
        volume_length: u64,
        number_of_fats: u8,
    ) -> Self {
        Self {
            bytes_per_sector,
            sectors_per_cluster,
            slot_size: SLOT_SIZE as u32,
            cluster_heap_offset,
            cluster_count,
            volume_length,
            number_of_fats,
        }
    }

    pub fn from_boot_sector(boot: &ExFatBootSector) -> Self {
        Self::new(
            boot.bytes_per_sector(),
            boot.sectors_per_cluster(),
            boot.cluster_heap_offset as u64,
            boot.cluster_count,
            boot.volume_length,
            boot.number_of_fats,
        )
    }

    /// Number of slots in one sector
    pub fn slots_per_sector(&self) -> u64 {
        (self.bytes_per_sector / self.slot_size.max(1)) as u64
    }

    /// Bytes per cluster
    pub fn bytes_per_cluster(&self) -> u64 {
        self.bytes_per_sector as u64 * self.sectors_per_cluster as u64
    }

    /// Number of virtual files that follow the last slot address
    pub fn virtual_file_count(&self) -> u64 {
        self.number_of_fats as u64 + 2
    }

    /// Last address that belongs to a real directory slot.
    ///
    /// Saturates at `u64::MAX - 1` for volumes too large to address.
    pub fn last_normal_inum(&self) -> u64 {
        let heap_sectors = self.volume_length.saturating_sub(self.cluster_heap_offset);
        heap_sectors
            .saturating_mul(self.slots_per_sector())
            .saturating_add(FIRST_NORMAL_INUM)
            - 1
    }

    /// Last address of the whole address space, virtual files included
    pub fn last_inum(&self) -> u64 {
        self.last_normal_inum().saturating_add(self.virtual_file_count())
    }

    /// Address of the first slot in `sector`; `None` below the cluster heap
    pub fn sector_to_inum(&self, sector: u64) -> Option<u64> {
        let relative = sector.checked_sub(self.cluster_heap_offset)?;
        relative
            .checked_mul(self.slots_per_sector())?
            .checked_add(FIRST_NORMAL_INUM)
    }

    /// Whether `inum` can address a directory slot
    pub fn is_inum_in_range(&self, inum: u64) -> bool {
        inum >= ROOT_INUM && inum <= self.last_normal_inum()
    }

    /// Whether `cluster` lies inside the cluster heap
    pub fn is_cluster_in_range(&self, cluster: u32) -> bool {
        cluster >= 2 && (cluster as u64) < self.cluster_count as u64 + 2
    }

    /// First sector of `cluster`
    pub fn cluster_to_sector(&self, cluster: u32) -> Option<u64> {
        if !self.is_cluster_in_range(cluster) {
            return None;
        }
        (cluster as u64 - 2)
            .checked_mul(self.sectors_per_cluster as u64)?
            .checked_add(self.cluster_heap_offset)
    }

    /// Cluster containing `sector`; `None` outside the heap
    pub fn sector_to_cluster(&self, sector: u64) -> Option<u32> {
        let relative = sector.checked_sub(self.cluster_heap_offset)?;
        let cluster = relative / self.sectors_per_cluster.max(1) as u64 + 2;
        let cluster = u32::try_from(cluster).ok()?;
        self.is_cluster_in_range(cluster).then_some(cluster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> ExFatGeometry {
        // 512-byte sectors, 8 sectors per cluster, heap at 128, 100 clusters
        ExFatGeometry::new(512, 8, 128, 100, 128 + 800, 1)
    }

    #[test]
    fn test_slots_per_sector() {
        assert_eq!(geometry().slots_per_sector(), 16);
        assert_eq!(geometry().bytes_per_cluster(), 4096);
    }

    #[test]
    fn test_sector_to_inum() {
        let geo = geometry();
        assert_eq!(geo.sector_to_inum(128), Some(3));
        assert_eq!(geo.sector_to_inum(129), Some(19));
        assert_eq!(geo.sector_to_inum(127), None);
    }

    #[test]
    fn test_inum_range() {
        let geo = geometry();
        assert_eq!(geo.last_normal_inum(), 3 + 800 * 16 - 1);
        assert_eq!(geo.last_inum(), geo.last_normal_inum() + 3);
        assert!(geo.is_inum_in_range(ROOT_INUM));
        assert!(geo.is_inum_in_range(geo.last_normal_inum()));
        assert!(!geo.is_inum_in_range(geo.last_normal_inum() + 1));
        assert!(!geo.is_inum_in_range(1));
    }

    #[test]
    fn test_cluster_mapping() {
        let geo = geometry();
        assert_eq!(geo.cluster_to_sector(2), Some(128));
        assert_eq!(geo.cluster_to_sector(3), Some(136));
        assert_eq!(geo.cluster_to_sector(1), None);
        assert_eq!(geo.cluster_to_sector(102), None);

        assert_eq!(geo.sector_to_cluster(128), Some(2));
        assert_eq!(geo.sector_to_cluster(143), Some(3));
        assert_eq!(geo.sector_to_cluster(100), None);
        assert_eq!(geo.sector_to_cluster(128 + 800), None);
    }

    #[test]
    fn test_oversized_volume_saturates() {
        let geo = ExFatGeometry::new(512, 1, 32, 24, u64::MAX, 1);
        assert_eq!(geo.last_normal_inum(), u64::MAX - 1);
        assert_eq!(geo.last_inum(), u64::MAX);
        assert!(geo.is_inum_in_range(3 + 8 * 16));

        let geo = ExFatGeometry::new(512, 1, u64::MAX - 4, u32::MAX, u64::MAX, 2);
        assert_eq!(geo.cluster_to_sector(2), Some(u64::MAX - 4));
        assert_eq!(geo.cluster_to_sector(100), None);
        assert_eq!(geo.sector_to_inum(u64::MAX), Some(3 + 4 * 16));
    }
}
