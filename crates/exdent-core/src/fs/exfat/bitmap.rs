//! Sector allocation status from the exFAT allocation bitmap
//!
//! exFAT records cluster allocation in a bitmap file, one bit per cluster of
//! the heap starting at cluster 2. Sectors in front of the heap (boot region,
//! FATs) are treated as allocated.

use super::geometry::ExFatGeometry;
use crate::error::{DentError, DentResult};

/// Answers whether a sector is marked in use
pub trait AllocationStatus {
    fn is_sector_allocated(&self, sector: u64) -> DentResult<bool>;
}

impl<F> AllocationStatus for F
where
    F: Fn(u64) -> DentResult<bool>,
{
    fn is_sector_allocated(&self, sector: u64) -> DentResult<bool> {
        self(sector)
    }
}

/// Treats every sector as allocated; for callers without a bitmap
#[derive(Debug, Clone, Copy, Default)]
pub struct AllAllocated;

impl AllocationStatus for AllAllocated {
    fn is_sector_allocated(&self, _sector: u64) -> DentResult<bool> {
        Ok(true)
    }
}

/// exFAT cluster allocation bitmap
#[derive(Debug, Clone)]
pub struct ClusterBitmap {
    /// Raw bitmap bytes, bit n of byte n/8 is cluster n + 2
    bits: Vec<u8>,
    geometry: ExFatGeometry,
}

impl ClusterBitmap {
    pub fn from_bytes(geometry: ExFatGeometry, data: &[u8]) -> Self {
        let needed = (geometry.cluster_count as usize).div_ceil(8);
        if data.len() < needed {
            tracing::warn!(
                "Allocation bitmap is short: {} bytes for {} clusters",
                data.len(),
                geometry.cluster_count
            );
        }

        let len = data.len().min(needed);
        ClusterBitmap {
            bits: data[..len].to_vec(),
            geometry,
        }
    }

    /// Allocation bit of `cluster`, `None` if the bitmap does not cover it
    pub fn is_cluster_allocated(&self, cluster: u32) -> Option<bool> {
        if !self.geometry.is_cluster_in_range(cluster) {
            return None;
        }
        let index = (cluster - 2) as usize;
        let byte = self.bits.get(index / 8)?;
        Some(byte & (1 << (index % 8)) != 0)
    }

    /// Number of clusters covered by the bitmap
    pub fn cluster_count(&self) -> usize {
        (self.bits.len() * 8).min(self.geometry.cluster_count as usize)
    }

    /// Count allocated clusters
    pub fn allocated_cluster_count(&self) -> usize {
        (0..self.cluster_count())
            .filter(|&index| self.bits[index / 8] & (1 << (index % 8)) != 0)
            .count()
    }

    /// Count free clusters
    pub fn free_cluster_count(&self) -> usize {
        self.cluster_count() - self.allocated_cluster_count()
    }
}

impl AllocationStatus for ClusterBitmap {
    fn is_sector_allocated(&self, sector: u64) -> DentResult<bool> {
        if sector >= self.geometry.volume_length {
            return Err(DentError::AllocationLookup {
                sector,
                reason: format!("past end of volume ({} sectors)", self.geometry.volume_length),
            });
        }
        if sector < self.geometry.cluster_heap_offset {
            return Ok(true);
        }

        let cluster = self
            .geometry
            .sector_to_cluster(sector)
            .ok_or_else(|| DentError::AllocationLookup {
                sector,
                reason: "sector is outside the cluster heap".to_string(),
            })?;

        self.is_cluster_allocated(cluster)
            .ok_or_else(|| DentError::AllocationLookup {
                sector,
                reason: format!("cluster {} is not covered by the bitmap", cluster),
            })
    }
}
