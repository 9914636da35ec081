//! Integration test for listing directories of a synthetic exFAT image

use exdent_core::fs::{detect_exfat, get_filesystem_info};
use exdent_core::{ExFatImage, NameParseConfig, NameType};
use std::io::Write;
use tempfile::NamedTempFile;

const SECTOR: usize = 512;

/// 64 sectors, heap at sector 32 with 32 one-sector clusters.
/// Bitmap in cluster 2, upcase table in cluster 3, root directory in
/// cluster 4, a subdirectory in clusters 5-6.
fn build_image(bitmap: u8) -> Vec<u8> {
    let mut image = vec![0u8; 64 * SECTOR];

    let boot = &mut image[..SECTOR];
    boot[0..3].copy_from_slice(&[0xEB, 0x76, 0x90]);
    boot[3..11].copy_from_slice(b"EXFAT   ");
    boot[72..80].copy_from_slice(&64u64.to_le_bytes());
    boot[80..84].copy_from_slice(&24u32.to_le_bytes());
    boot[84..88].copy_from_slice(&8u32.to_le_bytes());
    boot[88..92].copy_from_slice(&32u32.to_le_bytes());
    boot[92..96].copy_from_slice(&32u32.to_le_bytes());
    boot[96..100].copy_from_slice(&4u32.to_le_bytes());
    boot[104..106].copy_from_slice(&0x0100u16.to_le_bytes());
    boot[108] = 9;
    boot[110] = 1;
    boot[510] = 0x55;
    boot[511] = 0xAA;

    image[32 * SECTOR] = bitmap;

    let mut root = Vec::new();

    let mut bitmap_slot = [0u8; 32];
    bitmap_slot[0] = 0x81;
    bitmap_slot[20..24].copy_from_slice(&2u32.to_le_bytes());
    bitmap_slot[24..32].copy_from_slice(&4u64.to_le_bytes());
    root.push(bitmap_slot);

    let mut upcase_slot = [0u8; 32];
    upcase_slot[0] = 0x82;
    upcase_slot[20..24].copy_from_slice(&3u32.to_le_bytes());
    upcase_slot[24..32].copy_from_slice(&128u64.to_le_bytes());
    root.push(upcase_slot);

    let mut label = [0u8; 32];
    label[0] = 0x83;
    label[1] = 5;
    for (i, unit) in "GHOST".encode_utf16().enumerate() {
        label[2 + i * 2..4 + i * 2].copy_from_slice(&unit.to_le_bytes());
    }
    root.push(label);

    root.extend(file_set("a.txt", 0x85, 0x20));
    root.extend(file_set("photos", 0x85, 0x10));
    root.extend(file_set("old.txt", 0x05, 0x20));

    let start = 34 * SECTOR;
    for (i, slot) in root.iter().enumerate() {
        image[start + i * 32..start + (i + 1) * 32].copy_from_slice(slot);
    }

    // Subdirectory: one file whose set crosses from cluster 5 into cluster 6
    let sub = 35 * SECTOR + 14 * 32;
    for (i, slot) in file_set("spans two clusters.jpg", 0x85, 0x20).iter().enumerate() {
        image[sub + i * 32..sub + (i + 1) * 32].copy_from_slice(slot);
    }

    image
}

fn file_set(name: &str, tag: u8, attributes: u8) -> Vec<[u8; 32]> {
    let in_use = tag & 0x80;
    let units: Vec<u16> = name.encode_utf16().collect();

    let mut file = [0u8; 32];
    file[0] = tag;
    file[1] = (1 + units.len().div_ceil(15)) as u8;
    file[4] = attributes;

    let mut stream = [0u8; 32];
    stream[0] = 0x40 | in_use;
    stream[3] = units.len() as u8;

    let mut set = vec![file, stream];
    for chunk in units.chunks(15) {
        let mut slot = [0u8; 32];
        slot[0] = 0x41 | in_use;
        for (i, unit) in chunk.iter().enumerate() {
            slot[2 + i * 2..4 + i * 2].copy_from_slice(&unit.to_le_bytes());
        }
        set.push(slot);
    }
    set
}

fn write_image(bitmap: u8) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&build_image(bitmap)).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_root_listing() {
    // Clusters 2-6 in use
    let file = write_image(0x1F);
    let image = ExFatImage::open(file.path()).unwrap();
    let (listing, stats) = image.list_root(&NameParseConfig::default()).unwrap();

    let names: Vec<_> = listing.names().iter().map(|r| r.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "$ALLOC_BITMAP",
            "$UPCASE_TABLE",
            "GHOST (Volume Label Entry)",
            "a.txt",
            "photos",
            "old.txt",
        ]
    );
    assert_eq!(stats.records_emitted, 6);

    let photos = &listing.names()[4];
    assert_eq!(photos.name_type, NameType::Directory);
    assert!(photos.allocated);

    let old = &listing.names()[5];
    assert!(!old.allocated);
    assert_eq!(listing.unallocated().count(), 1);
}

#[test]
fn test_subdirectory_across_clusters() {
    let file = write_image(0x1F);
    let image = ExFatImage::open(file.path()).unwrap();
    let (listing, _) = image
        .list_directory(5, 2, &NameParseConfig::default())
        .unwrap();

    assert_eq!(listing.len(), 1);
    assert_eq!(listing.names()[0].name, "spans two clusters.jpg");
    // Cluster 5 is sector 35, the first sector after the root cluster
    assert_eq!(listing.names()[0].meta_addr, 3 * 16 + 3 + 14);
}

#[test]
fn test_free_root_cluster_marks_entries_unallocated() {
    // Cluster 4 free
    let file = write_image(0x1B);
    let image = ExFatImage::open(file.path()).unwrap();
    let (listing, _) = image.list_root(&NameParseConfig::default()).unwrap();

    let a = listing.names().iter().find(|r| r.name == "a.txt").unwrap();
    assert!(!a.allocated);
}

#[test]
fn test_listing_json() {
    let file = write_image(0x1F);
    let image = ExFatImage::open(file.path()).unwrap();
    let (listing, _) = image.list_root(&NameParseConfig::default()).unwrap();

    let json = serde_json::to_value(&listing).unwrap();
    assert_eq!(json["addr"], 2);
    assert_eq!(json["names"][3]["name"], "a.txt");
    assert_eq!(json["names"][3]["name_type"], "Regular");
}

#[test]
fn test_detection_and_info() {
    let file = write_image(0x1F);
    assert!(detect_exfat(file.path()).unwrap());

    let info = get_filesystem_info(file.path()).unwrap();
    assert!(info.contains("Cluster Count: 32"));
    assert!(info.contains("Allocated Clusters: 5 of 32"));

    let mut other = NamedTempFile::new().unwrap();
    other.write_all(&[0u8; 4096]).unwrap();
    other.flush().unwrap();
    assert!(!detect_exfat(other.path()).unwrap());
}
