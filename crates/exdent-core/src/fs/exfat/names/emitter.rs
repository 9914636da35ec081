//! Name emitter
//!
//! Records leave the assembler here. Empty names are dropped, and the
//! remaining records are staged until the parse call succeeds so that a
//! fatal error leaves the caller's listing untouched.

use super::assembler::Finished;
use super::ParseStats;
use crate::{DirectoryListing, NameRecord};

#[derive(Debug, Default)]
pub(crate) struct NameEmitter {
    staged: Vec<NameRecord>,
    pub stats: ParseStats,
}

impl NameEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, finished: Finished) {
        let Finished {
            mut record,
            checksum,
            incomplete,
        } = finished;

        if incomplete {
            self.stats.incomplete_sets += 1;
        }
        if let Some(check) = checksum {
            if !check.matches() {
                self.stats.checksum_mismatches += 1;
                tracing::debug!(
                    "Entry set checksum mismatch at {}: stored {:#06x}, computed {:#06x}",
                    record.meta_addr,
                    check.expected,
                    check.actual
                );
            }
        }

        let trimmed = record.name.trim_end_matches('\0').len();
        record.name.truncate(trimmed);

        if record.name.is_empty() {
            self.stats.records_discarded += 1;
            return;
        }

        tracing::trace!("Name {:?} -> {}", record.name, record.meta_addr);
        self.stats.records_emitted += 1;
        self.staged.push(record);
    }

    /// Append every staged record to `listing`
    pub fn commit(self, listing: &mut DirectoryListing) -> ParseStats {
        for record in self.staged {
            listing.add_name(record);
        }
        self.stats
    }
}
