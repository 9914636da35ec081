//! exFAT directory name reconstruction
//!
//! [`ExFatNameParser`] walks a buffer of directory sectors slot by slot,
//! classifies each slot, and feeds it to the entry set assembler. Every file
//! entry set, volume label and system object found becomes a [`NameRecord`]
//! in the caller's [`DirectoryListing`].
//!
//! Sectors are not assumed to be contiguous: the caller passes the address
//! of every sector in the buffer, so a directory whose clusters are scattered
//! across the heap can be handed over in one call.
//!
//! [`NameRecord`]: crate::NameRecord

mod assembler;
mod emitter;

use serde::{Deserialize, Serialize};

use self::assembler::{Assembler, AssemblyEnv, SlotInput};
use self::emitter::NameEmitter;
use super::bitmap::AllocationStatus;
use super::classify::{ExFatSlotClassifier, SlotClassifier};
use super::directory::{EntryKind, SLOT_SIZE};
use super::geometry::ExFatGeometry;
use super::utf16::{EncodingRsDecoder, Utf16Decoder};
use crate::config::NameParseConfig;
use crate::error::{DentError, DentResult};
use crate::DirectoryListing;

/// Counters collected during one [`ExFatNameParser::parse_buffer`] call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseStats {
    /// Sectors whose slots were examined
    pub sectors_scanned: usize,
    /// Sectors skipped because their allocation status was unknown
    pub sectors_skipped: usize,
    pub slots_examined: usize,
    /// Slots classified as not being a directory entry
    pub invalid_slots: usize,
    /// Records appended to the listing
    pub records_emitted: usize,
    /// Records dropped because their name was empty
    pub records_discarded: usize,
    /// Entry sets closed before their secondary count was reached
    pub incomplete_sets: usize,
    /// Complete entry sets whose stored checksum disagrees with their bytes
    pub checksum_mismatches: usize,
    /// Whether the directory looked corrupt and strict classification was used
    pub strict_mode: bool,
}

/// Reconstructs names from raw exFAT directory sectors
pub struct ExFatNameParser<'a> {
    geometry: ExFatGeometry,
    allocation: &'a dyn AllocationStatus,
    classifier: Box<dyn SlotClassifier + 'a>,
    decoder: Option<Box<dyn Utf16Decoder + 'a>>,
    config: NameParseConfig,
}

impl<'a> ExFatNameParser<'a> {
    pub fn new(geometry: ExFatGeometry, allocation: &'a dyn AllocationStatus) -> Self {
        Self {
            classifier: Box::new(ExFatSlotClassifier::new(geometry.clone())),
            geometry,
            allocation,
            decoder: None,
            config: NameParseConfig::default(),
        }
    }

    /// Replace the default exFAT slot classifier
    pub fn with_classifier(mut self, classifier: impl SlotClassifier + 'a) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    /// Replace the default `encoding_rs` decoder
    pub fn with_decoder(mut self, decoder: impl Utf16Decoder + 'a) -> Self {
        self.decoder = Some(Box::new(decoder));
        self
    }

    pub fn with_config(mut self, config: NameParseConfig) -> Self {
        self.config = config;
        self
    }

    /// Parse `buffer`, a run of directory sectors, appending names to `listing`.
    ///
    /// `sector_addrs[i]` is the address of the i-th sector of `buffer`.
    /// Records are appended in the order their sets close. On error nothing
    /// is appended.
    pub fn parse_buffer(
        &self,
        listing: &mut DirectoryListing,
        buffer: &[u8],
        sector_addrs: &[u64],
    ) -> DentResult<ParseStats> {
        let sector_size = self.geometry.bytes_per_sector as usize;
        let slot_size = self.geometry.slot_size as usize;
        self.check_arguments(buffer, sector_addrs, sector_size, slot_size)?;

        let default_decoder;
        let decoder: &dyn Utf16Decoder = match &self.decoder {
            Some(decoder) => decoder.as_ref(),
            None => {
                default_decoder = EncodingRsDecoder::new(self.config.replace_control_chars);
                &default_decoder
            }
        };

        let mut assembler = Assembler::new(AssemblyEnv {
            decoder,
            max_name_bytes: self.config.max_name_bytes,
            volume_label_tag: &self.config.volume_label_tag,
        });
        let mut emitter = NameEmitter::new();
        let mut corrupt_dir = false;

        tracing::debug!(
            "Parsing {} directory sectors starting at sector {}",
            sector_addrs.len(),
            sector_addrs[0]
        );

        for (sector_buf, &sector) in buffer.chunks_exact(sector_size).zip(sector_addrs) {
            let base_inum = self
                .geometry
                .sector_to_inum(sector)
                .filter(|&inum| inum <= self.geometry.last_inum())
                .ok_or_else(|| {
                    DentError::Corruption(format!(
                        "sector {} does not map to a directory slot address",
                        sector
                    ))
                })?;

            let sector_allocated = match self.allocation.is_sector_allocated(sector) {
                Ok(allocated) => allocated,
                Err(e) => {
                    tracing::warn!("Skipping sector {}: {}", sector, e);
                    emitter.stats.sectors_skipped += 1;
                    continue;
                }
            };
            emitter.stats.sectors_scanned += 1;

            tracing::trace!(
                "Sector {} ({}allocated), first slot address {}",
                sector,
                if sector_allocated { "" } else { "un" },
                base_inum
            );

            for (index, raw) in sector_buf.chunks_exact(slot_size).enumerate() {
                emitter.stats.slots_examined += 1;

                let inum = base_inum.saturating_add(index as u64);
                if !self.geometry.is_inum_in_range(inum) {
                    return Err(DentError::SlotOutOfRange { inum, sector });
                }

                let kind = self
                    .classifier
                    .classify(raw, corrupt_dir || !sector_allocated);

                if kind == EntryKind::None {
                    emitter.stats.invalid_slots += 1;

                    let probe = self.config.corrupt_probe_slots;
                    if !corrupt_dir
                        && emitter.stats.slots_examined == probe
                        && emitter.stats.invalid_slots == probe
                    {
                        tracing::debug!(
                            "First {} slots are invalid, directory at sector {} looks corrupt",
                            probe,
                            sector_addrs[0]
                        );
                        corrupt_dir = true;
                        emitter.stats.strict_mode = true;
                    }
                }

                let input = SlotInput {
                    kind,
                    raw,
                    inum,
                    sector_allocated,
                };
                assembler.consume(&input, |finished| emitter.emit(finished));
            }
        }

        if let Some(finished) = assembler.finish() {
            emitter.emit(finished);
        }

        let stats = emitter.commit(listing);
        tracing::debug!(
            "Directory parse done: {} names, {} incomplete sets, {} invalid slots",
            stats.records_emitted,
            stats.incomplete_sets,
            stats.invalid_slots
        );
        Ok(stats)
    }

    fn check_arguments(
        &self,
        buffer: &[u8],
        sector_addrs: &[u64],
        sector_size: usize,
        slot_size: usize,
    ) -> DentResult<()> {
        if slot_size < SLOT_SIZE || sector_size < slot_size || sector_size % slot_size != 0 {
            return Err(DentError::InvalidArgument(format!(
                "sector size {} is not a multiple of slot size {}",
                sector_size, slot_size
            )));
        }
        if buffer.is_empty() {
            return Err(DentError::InvalidArgument("empty directory buffer".to_string()));
        }
        if buffer.len() % sector_size != 0 {
            return Err(DentError::InvalidArgument(format!(
                "buffer length {} is not a multiple of the sector size {}",
                buffer.len(),
                sector_size
            )));
        }

        let sectors = buffer.len() / sector_size;
        if sector_addrs.len() != sectors {
            return Err(DentError::InvalidArgument(format!(
                "{} sector addresses for {} sectors",
                sector_addrs.len(),
                sectors
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::fs::exfat::bitmap::AllAllocated;
    use crate::NameRecord;

    fn geometry() -> ExFatGeometry {
        // 16 slots per sector, heap at sector 32, slot addresses 3..=386
        ExFatGeometry::new(512, 1, 32, 24, 56, 1)
    }

    fn name_set(sector: &mut [u8], slot: usize, tag: u8, text: &str) {
        let units: Vec<u16> = text.encode_utf16().collect();
        let names = units.len().div_ceil(15);
        let base = slot * SLOT_SIZE;

        sector[base] = tag;
        sector[base + 1] = (1 + names) as u8;
        sector[base + SLOT_SIZE] = if tag & 0x80 != 0 { 0xC0 } else { 0x40 };
        sector[base + SLOT_SIZE + 3] = units.len() as u8;
        for (i, chunk) in units.chunks(15).enumerate() {
            let off = base + SLOT_SIZE * (2 + i);
            sector[off] = if tag & 0x80 != 0 { 0xC1 } else { 0x41 };
            for (j, unit) in chunk.iter().enumerate() {
                sector[off + 2 + j * 2..off + 4 + j * 2].copy_from_slice(&unit.to_le_bytes());
            }
        }
    }

    fn names(listing: &DirectoryListing) -> Vec<&str> {
        listing.names().iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_single_sector() {
        let mut sector = vec![0u8; 512];
        name_set(&mut sector, 0, 0x85, "hello.txt");

        let parser = ExFatNameParser::new(geometry(), &AllAllocated);
        let mut listing = DirectoryListing::new(2);
        let stats = parser.parse_buffer(&mut listing, &sector, &[40]).unwrap();

        assert_eq!(names(&listing), vec!["hello.txt"]);
        // Sector 40 is the ninth heap sector
        assert_eq!(listing.names()[0].meta_addr, 3 + 8 * 16);
        assert_eq!(stats.records_emitted, 1);
        assert_eq!(stats.slots_examined, 16);
        assert!(!stats.strict_mode);
    }

    #[test]
    fn test_argument_checks() {
        let parser = ExFatNameParser::new(geometry(), &AllAllocated);
        let mut listing = DirectoryListing::new(2);

        let err = parser.parse_buffer(&mut listing, &[], &[40]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Input);

        let err = parser
            .parse_buffer(&mut listing, &[0u8; 1024], &[40])
            .unwrap_err();
        assert!(matches!(err, DentError::InvalidArgument(_)));

        let err = parser
            .parse_buffer(&mut listing, &[0u8; 500], &[40])
            .unwrap_err();
        assert!(matches!(err, DentError::InvalidArgument(_)));
    }

    #[test]
    fn test_sector_outside_heap_is_corruption() {
        let parser = ExFatNameParser::new(geometry(), &AllAllocated);
        let mut listing = DirectoryListing::new(2);

        let err = parser
            .parse_buffer(&mut listing, &[0u8; 512], &[10])
            .unwrap_err();
        assert!(err.is_corruption());

        let err = parser
            .parse_buffer(&mut listing, &[0u8; 512], &[57])
            .unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_slot_past_last_normal_address() {
        let parser = ExFatNameParser::new(geometry(), &AllAllocated);
        let mut listing = DirectoryListing::new(2);

        // Sector 56 starts at address 387, inside the virtual file range
        let err = parser
            .parse_buffer(&mut listing, &[0u8; 512], &[56])
            .unwrap_err();
        assert!(matches!(err, DentError::SlotOutOfRange { inum: 387, sector: 56 }));
    }

    #[test]
    fn test_error_leaves_listing_untouched() {
        let mut buffer = vec![0u8; 1024];
        name_set(&mut buffer[..512], 0, 0x85, "first.txt");

        let parser = ExFatNameParser::new(geometry(), &AllAllocated);
        let mut listing = DirectoryListing::new(2);
        listing.add_name(NameRecord {
            meta_addr: 99,
            name_type: crate::NameType::Regular,
            allocated: true,
            name: "existing".to_string(),
            suffix: None,
        });

        assert!(parser
            .parse_buffer(&mut listing, &buffer, &[40, 10])
            .is_err());
        assert_eq!(names(&listing), vec!["existing"]);
    }

    #[test]
    fn test_unknown_allocation_skips_sector() {
        let mut buffer = vec![0u8; 1024];
        name_set(&mut buffer[..512], 0, 0x85, "skipped.txt");
        name_set(&mut buffer[512..], 0, 0x85, "seen.txt");

        let allocation = |sector: u64| -> DentResult<bool> {
            if sector == 40 {
                Err(DentError::AllocationLookup {
                    sector,
                    reason: "test".to_string(),
                })
            } else {
                Ok(true)
            }
        };
        let parser = ExFatNameParser::new(geometry(), &allocation);
        let mut listing = DirectoryListing::new(2);
        let stats = parser
            .parse_buffer(&mut listing, &buffer, &[40, 41])
            .unwrap();

        assert_eq!(names(&listing), vec!["seen.txt"]);
        assert_eq!(stats.sectors_skipped, 1);
        assert_eq!(stats.sectors_scanned, 1);
    }

    #[test]
    fn test_strict_mode_after_invalid_leading_slots() {
        let mut sector = vec![0u8; 512];
        name_set(&mut sector, 4, 0x85, "late.txt");

        let calls = std::cell::RefCell::new(Vec::new());
        let classifier = |slot: &[u8], in_depth: bool| {
            calls.borrow_mut().push(in_depth);
            ExFatSlotClassifier::new(geometry()).classify(slot, in_depth)
        };

        let parser = ExFatNameParser::new(geometry(), &AllAllocated).with_classifier(classifier);
        let mut listing = DirectoryListing::new(2);
        let stats = parser.parse_buffer(&mut listing, &sector, &[40]).unwrap();

        let seen = calls.borrow();
        assert!(seen[..4].iter().all(|&strict| !strict));
        assert!(seen[4..].iter().all(|&strict| strict));
        assert!(stats.strict_mode);
        assert_eq!(names(&listing), vec!["late.txt"]);
    }

    #[test]
    fn test_no_strict_mode_when_an_early_slot_is_valid() {
        let mut sector = vec![0u8; 512];
        name_set(&mut sector, 2, 0x85, "early.txt");

        let parser = ExFatNameParser::new(geometry(), &AllAllocated);
        let mut listing = DirectoryListing::new(2);
        let stats = parser.parse_buffer(&mut listing, &sector, &[40]).unwrap();
        assert!(!stats.strict_mode);
        assert_eq!(names(&listing), vec!["early.txt"]);
    }

    #[test]
    fn test_volume_length_past_address_space() {
        let mut sector = vec![0u8; 512];
        name_set(&mut sector, 0, 0x85, "forged.txt");

        let geometry = ExFatGeometry::new(512, 1, 32, 24, u64::MAX, 1);
        let parser = ExFatNameParser::new(geometry, &AllAllocated);
        let mut listing = DirectoryListing::new(2);
        let stats = parser.parse_buffer(&mut listing, &sector, &[40]).unwrap();

        assert_eq!(names(&listing), vec!["forged.txt"]);
        assert_eq!(listing.names()[0].meta_addr, 3 + 8 * 16);
        assert_eq!(stats.records_emitted, 1);

        // Slot addresses of this sector overflow a u64
        let err = parser
            .parse_buffer(&mut listing, &sector, &[u64::MAX])
            .unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_custom_config_label_tag() {
        let mut sector = vec![0u8; 512];
        sector[0] = 0x83;
        sector[1] = 2;
        sector[2] = b'V';
        sector[4] = b'L';

        let config = NameParseConfig {
            volume_label_tag: " [label]".to_string(),
            ..NameParseConfig::default()
        };
        let parser = ExFatNameParser::new(geometry(), &AllAllocated).with_config(config);
        let mut listing = DirectoryListing::new(2);
        parser.parse_buffer(&mut listing, &sector, &[40]).unwrap();
        assert_eq!(names(&listing), vec!["VL [label]"]);
    }
}
