use serde::{Deserialize, Serialize};

pub mod config;
pub mod error;
pub mod fs;

pub use config::NameParseConfig;
pub use error::{DentError, DentResult, ErrorKind};
pub use fs::exfat::{
    AllAllocated, AllocationStatus, ClusterBitmap, EncodingRsDecoder, EntryKind, ExFatGeometry,
    ExFatImage, ExFatNameParser, ExFatSlotClassifier, ParseStats, SlotClassifier, Utf16Decoder,
};

/// What a name record points at
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameType {
    /// Volume labels and system objects
    Undefined,
    Regular,
    Directory,
}

impl std::fmt::Display for NameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NameType::Undefined => write!(f, "-"),
            NameType::Regular => write!(f, "r"),
            NameType::Directory => write!(f, "d"),
        }
    }
}

/// One name recovered from a directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRecord {
    /// Slot address of the entry the name was read from
    pub meta_addr: u64,
    pub name_type: NameType,
    /// False for deleted entries and entries found in free space
    pub allocated: bool,
    pub name: String,
    /// Tag appended to `name`, if any
    pub suffix: Option<String>,
}

impl NameRecord {
    /// The name without its tag
    pub fn base_name(&self) -> &str {
        match &self.suffix {
            Some(suffix) => self.name.strip_suffix(suffix.as_str()).unwrap_or(&self.name),
            None => &self.name,
        }
    }
}

/// Names found in one directory, in discovery order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryListing {
    addr: u64,
    names: Vec<NameRecord>,
}

impl DirectoryListing {
    /// Empty listing for the directory at slot address `addr`
    pub fn new(addr: u64) -> Self {
        Self {
            addr,
            names: Vec::new(),
        }
    }

    pub fn addr(&self) -> u64 {
        self.addr
    }

    pub fn add_name(&mut self, record: NameRecord) {
        self.names.push(record);
    }

    pub fn names(&self) -> &[NameRecord] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Only the names of entries that are still in use
    pub fn allocated(&self) -> impl Iterator<Item = &NameRecord> {
        self.names.iter().filter(|record| record.allocated)
    }

    /// Only the names of deleted entries and entries found in free space
    pub fn unallocated(&self) -> impl Iterator<Item = &NameRecord> {
        self.names.iter().filter(|record| !record.allocated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, allocated: bool, suffix: Option<&str>) -> NameRecord {
        NameRecord {
            meta_addr: 3,
            name_type: NameType::Regular,
            allocated,
            name: name.to_string(),
            suffix: suffix.map(str::to_string),
        }
    }

    #[test]
    fn test_listing_filters() {
        let mut listing = DirectoryListing::new(2);
        listing.add_name(record("live.txt", true, None));
        listing.add_name(record("gone.txt", false, None));

        assert_eq!(listing.len(), 2);
        assert_eq!(listing.allocated().count(), 1);
        assert_eq!(listing.unallocated().next().unwrap().name, "gone.txt");
    }

    #[test]
    fn test_base_name_strips_suffix() {
        let label = record("DATA (Volume Label Entry)", true, Some(" (Volume Label Entry)"));
        assert_eq!(label.base_name(), "DATA");
        assert_eq!(record("plain", true, None).base_name(), "plain");
    }

    #[test]
    fn test_listing_serializes() {
        let mut listing = DirectoryListing::new(2);
        listing.add_name(record("a.txt", true, None));
        let json = serde_json::to_string(&listing).unwrap();
        let back: DirectoryListing = serde_json::from_str(&json).unwrap();
        assert_eq!(back, listing);
    }
}
