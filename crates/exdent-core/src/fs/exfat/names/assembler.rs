//! Entry set assembler
//!
//! Consumes classified slots one at a time and groups file entry sets
//! (file, stream, names) into single name records. Single-slot kinds
//! (volume label, system objects) close whatever set is open and produce
//! their own record immediately.
//!
//! ```text
//! Empty --file--> Opened --stream--> StreamSeen --name--> NameAccumulating
//!   ^                                     |                   |    ^
//!   |                                     |                   +name+
//!   +------ count satisfied, abandoned, or a new set starts --+
//! ```

use super::super::checksum::EntrySetChecksum;
use super::super::directory::{
    EntryKind, FileSlot, NameSlot, StreamSlot, VolumeGuidSlot, VolumeLabelSlot,
    NAME_UNITS_PER_SLOT,
};
use super::super::utf16::Utf16Decoder;
use crate::{NameRecord, NameType};

/// One classified slot handed to the assembler
#[derive(Debug, Clone, Copy)]
pub(crate) struct SlotInput<'s> {
    pub kind: EntryKind,
    pub raw: &'s [u8],
    pub inum: u64,
    pub sector_allocated: bool,
}

/// Per-call settings the transitions need
pub(crate) struct AssemblyEnv<'e> {
    pub decoder: &'e dyn Utf16Decoder,
    /// Record capacity in bytes, terminator included
    pub max_name_bytes: usize,
    pub volume_label_tag: &'e str,
}

impl AssemblyEnv<'_> {
    /// Bytes a name may actually occupy
    fn usable_name_bytes(&self) -> usize {
        self.max_name_bytes.saturating_sub(1)
    }
}

/// Stored vs. accumulated checksum of a set that reached its secondary count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChecksumCheck {
    pub expected: u16,
    pub actual: u16,
}

impl ChecksumCheck {
    pub fn matches(&self) -> bool {
        self.expected == self.actual
    }
}

/// A record leaving the assembler, before the empty-name filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Finished {
    pub record: NameRecord,
    /// Set when a file entry set reached its expected secondary count
    pub checksum: Option<ChecksumCheck>,
    /// True when a partially assembled set was cut short
    pub incomplete: bool,
}

impl Finished {
    fn complete(record: NameRecord) -> Self {
        Finished {
            record,
            checksum: None,
            incomplete: false,
        }
    }
}

/// Data fixed by the file slot that opens a set
#[derive(Debug, Clone)]
pub(crate) struct OpenSet {
    meta_addr: u64,
    name_type: NameType,
    allocated: bool,
    /// In-use variant shared by every member of the set
    deleted: bool,
    expected_secondary: u8,
    actual_secondary: usize,
    expected_checksum: u16,
    checksum: EntrySetChecksum,
}

impl OpenSet {
    fn is_satisfied(&self) -> bool {
        self.actual_secondary == self.expected_secondary as usize
    }

    fn into_record(self, name: String) -> (NameRecord, ChecksumCheck) {
        let check = ChecksumCheck {
            expected: self.expected_checksum,
            actual: self.checksum.value(),
        };
        let record = NameRecord {
            meta_addr: self.meta_addr,
            name_type: self.name_type,
            allocated: self.allocated,
            name,
            suffix: None,
        };
        (record, check)
    }
}

/// Name assembled from the stream and name slots
#[derive(Debug, Clone, Default)]
pub(crate) struct NameProgress {
    expected_units: u8,
    actual_units: usize,
    name: String,
}

/// Assembler state; each variant holds only what is meaningful in it
#[derive(Debug, Clone, Default)]
pub(crate) enum SetState {
    #[default]
    Empty,
    Opened(OpenSet),
    StreamSeen(OpenSet, NameProgress),
    NameAccumulating(OpenSet, NameProgress),
}

/// Result of feeding one slot to a state
#[derive(Debug)]
pub(crate) struct Step {
    pub next: SetState,
    /// Set that was in progress and got closed by this slot
    pub flushed: Option<Finished>,
    /// Record completed by this slot itself
    pub completed: Option<Finished>,
}

impl Step {
    fn to(next: SetState) -> Self {
        Step {
            next,
            flushed: None,
            completed: None,
        }
    }

    /// Close the current set and return to `Empty`
    fn abandon(state: SetState) -> Self {
        Step {
            next: SetState::Empty,
            flushed: state.flush(),
            completed: None,
        }
    }
}

impl SetState {
    /// Close the set in progress, if any, keeping whatever name it has
    pub fn flush(self) -> Option<Finished> {
        let (set, name) = match self {
            SetState::Empty => return None,
            SetState::Opened(set) => (set, String::new()),
            SetState::StreamSeen(set, progress) | SetState::NameAccumulating(set, progress) => {
                (set, progress.name)
            }
        };

        let (record, _) = set.into_record(name);
        Some(Finished {
            record,
            checksum: None,
            incomplete: true,
        })
    }

    /// The transition function
    pub fn step(self, slot: &SlotInput<'_>, env: &AssemblyEnv<'_>) -> Step {
        match slot.kind {
            EntryKind::File | EntryKind::DeletedFile => self.on_file(slot),
            EntryKind::FileStream | EntryKind::DeletedFileStream => self.on_stream(slot),
            EntryKind::FileName | EntryKind::DeletedFileName => self.on_name(slot, env),
            EntryKind::VolumeLabel | EntryKind::VolumeLabelEmpty => self.on_volume_label(slot, env),
            EntryKind::VolumeGuid
            | EntryKind::AllocationBitmap
            | EntryKind::UpcaseTable
            | EntryKind::TexFat
            | EntryKind::AccessControlTable => self.on_virtual_file(slot),
            EntryKind::None => Step::abandon(self),
        }
    }

    fn on_file(self, slot: &SlotInput<'_>) -> Step {
        let flushed = self.flush();

        let file = match FileSlot::decode(slot.raw) {
            Ok(file) => file,
            Err(e) => {
                tracing::debug!("Unreadable file slot at {}: {}", slot.inum, e);
                return Step {
                    next: SetState::Empty,
                    flushed,
                    completed: None,
                };
            }
        };

        let mut checksum = EntrySetChecksum::new();
        checksum.add_slot(slot.kind, slot.raw);

        // Trust but verify: a live entry in free space is still unallocated
        let deleted = slot.kind.is_deleted();
        let set = OpenSet {
            meta_addr: slot.inum,
            name_type: if file.is_directory() {
                NameType::Directory
            } else {
                NameType::Regular
            },
            allocated: slot.sector_allocated && !deleted,
            deleted,
            expected_secondary: file.secondary_count,
            actual_secondary: 0,
            expected_checksum: file.set_checksum,
            checksum,
        };

        Step {
            next: SetState::Opened(set),
            flushed,
            completed: None,
        }
    }

    fn on_stream(self, slot: &SlotInput<'_>) -> Step {
        let mut set = match self {
            SetState::Opened(set) => set,
            other => {
                tracing::debug!("Stream slot at {} does not follow a file slot", slot.inum);
                return Step::abandon(other);
            }
        };

        if set.deleted != slot.kind.is_deleted() {
            tracing::debug!("In-use bit of stream slot at {} disagrees with its set", slot.inum);
            return Step::abandon(SetState::Opened(set));
        }

        let stream = match StreamSlot::decode(slot.raw) {
            Ok(stream) => stream,
            Err(_) => return Step::abandon(SetState::Opened(set)),
        };

        set.checksum.add_slot(slot.kind, slot.raw);
        set.actual_secondary += 1;

        let progress = NameProgress {
            expected_units: stream.name_length,
            ..NameProgress::default()
        };

        // A set with no name slots is degenerate; close it now anyway
        if set.is_satisfied() {
            return Step {
                next: SetState::Empty,
                flushed: None,
                completed: Some(finish_set(set, progress)),
            };
        }
        Step::to(SetState::StreamSeen(set, progress))
    }

    fn on_name(self, slot: &SlotInput<'_>, env: &AssemblyEnv<'_>) -> Step {
        let (mut set, mut progress) = match self {
            SetState::StreamSeen(set, progress) | SetState::NameAccumulating(set, progress) => {
                (set, progress)
            }
            other => {
                tracing::debug!("Name slot at {} does not follow a stream or name slot", slot.inum);
                return Step::abandon(other);
            }
        };

        if set.deleted != slot.kind.is_deleted() {
            tracing::debug!("In-use bit of name slot at {} disagrees with its set", slot.inum);
            return Step::abandon(SetState::NameAccumulating(set, progress));
        }

        let name_slot = match NameSlot::decode(slot.raw) {
            Ok(name_slot) => name_slot,
            Err(_) => return Step::abandon(SetState::NameAccumulating(set, progress)),
        };

        let remaining = (progress.expected_units as usize).saturating_sub(progress.actual_units);
        let units_to_copy = remaining.min(NAME_UNITS_PER_SLOT);

        // Names that would overflow the record are dropped, not truncated
        if progress.actual_units + units_to_copy < env.usable_name_bytes() {
            let room = env.usable_name_bytes().saturating_sub(progress.name.len());
            match env.decoder.decode(
                &name_slot.units,
                units_to_copy,
                room,
                slot.inum,
                "file name segment",
            ) {
                Ok(segment) => {
                    progress.name.push_str(&segment);
                    progress.actual_units += units_to_copy;
                }
                Err(e) => {
                    // Keep the name assembled so far and drop the rest of the set
                    tracing::debug!("{}", e);
                    return Step::abandon(SetState::NameAccumulating(set, progress));
                }
            }
        }

        set.checksum.add_slot(slot.kind, slot.raw);
        set.actual_secondary += 1;

        if set.is_satisfied() {
            return Step {
                next: SetState::Empty,
                flushed: None,
                completed: Some(finish_set(set, progress)),
            };
        }
        Step::to(SetState::NameAccumulating(set, progress))
    }

    fn on_volume_label(self, slot: &SlotInput<'_>, env: &AssemblyEnv<'_>) -> Step {
        let flushed = self.flush();
        let mut step = Step {
            next: SetState::Empty,
            flushed,
            completed: None,
        };

        if slot.kind == EntryKind::VolumeLabelEmpty {
            return step;
        }

        let label = match VolumeLabelSlot::decode(slot.raw) {
            Ok(label) => label,
            Err(_) => return step,
        };
        let units = label.label_units();

        let mut name = match env.decoder.decode(
            units,
            units.len(),
            env.usable_name_bytes(),
            slot.inum,
            "volume label",
        ) {
            Ok(name) => name,
            Err(e) => {
                tracing::debug!("{}", e);
                return step;
            }
        };

        let mut suffix = None;
        if name.len() + env.volume_label_tag.len() < env.max_name_bytes {
            name.push_str(env.volume_label_tag);
            suffix = Some(env.volume_label_tag.to_string());
        }

        step.completed = Some(Finished::complete(NameRecord {
            meta_addr: slot.inum,
            name_type: NameType::Undefined,
            allocated: true,
            name,
            suffix,
        }));
        step
    }

    fn on_virtual_file(self, slot: &SlotInput<'_>) -> Step {
        let flushed = self.flush();

        if slot.kind == EntryKind::VolumeGuid {
            if let Ok(guid) = VolumeGuidSlot::decode(slot.raw) {
                tracing::debug!("Volume GUID {} at {}", guid.guid, slot.inum);
            }
        }

        let completed = slot.kind.virtual_name().map(|name| {
            Finished::complete(NameRecord {
                meta_addr: slot.inum,
                name_type: NameType::Undefined,
                allocated: true,
                name: name.to_string(),
                suffix: None,
            })
        });

        Step {
            next: SetState::Empty,
            flushed,
            completed,
        }
    }
}

fn finish_set(set: OpenSet, progress: NameProgress) -> Finished {
    let (record, check) = set.into_record(progress.name);
    Finished {
        record,
        checksum: Some(check),
        incomplete: false,
    }
}

/// Owns the state of one parse call
pub(crate) struct Assembler<'e> {
    state: SetState,
    env: AssemblyEnv<'e>,
}

impl<'e> Assembler<'e> {
    pub fn new(env: AssemblyEnv<'e>) -> Self {
        Self {
            state: SetState::Empty,
            env,
        }
    }

    /// Feed one slot, handing any finished records to `sink` in order
    pub fn consume(&mut self, slot: &SlotInput<'_>, mut sink: impl FnMut(Finished)) {
        let state = std::mem::take(&mut self.state);
        let step = state.step(slot, &self.env);
        self.state = step.next;

        if let Some(flushed) = step.flushed {
            sink(flushed);
        }
        if let Some(completed) = step.completed {
            sink(completed);
        }
    }

    /// Close any set still open at the end of the buffer
    pub fn finish(self) -> Option<Finished> {
        self.state.flush()
    }

    #[cfg(test)]
    fn state(&self) -> &SetState {
        &self.state
    }
}
