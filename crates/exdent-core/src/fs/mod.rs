/// File system detection and module organization
use anyhow::Result;
use std::path::Path;

pub mod common;
pub mod exfat;

use common::BlockDevice;

/// Whether the image at `device_path` starts with an exFAT boot sector
pub fn detect_exfat(device_path: &Path) -> Result<bool> {
    let device = BlockDevice::open(device_path)?;

    match device.read_sector(0) {
        Ok(sector0) => Ok(exfat::is_exfat_boot_sector(sector0)),
        Err(_) => Ok(false),
    }
}

/// Get human-readable file system information
pub fn get_filesystem_info(device_path: &Path) -> Result<String> {
    let image = exfat::ExFatImage::open(device_path)?;
    let mut info = image.boot_sector().describe();

    match image.load_allocation_bitmap()? {
        Some(bitmap) => info.push_str(&format!(
            "\n- Allocated Clusters: {} of {}",
            bitmap.allocated_cluster_count(),
            bitmap.cluster_count()
        )),
        None => info.push_str("\n- Allocation Bitmap: not found"),
    }

    Ok(info)
}
