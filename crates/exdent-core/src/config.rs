//! Name reconstruction configuration

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::DentResult;

/// Suffix appended to volume label names so they are not mistaken for files
pub const VOLUME_LABEL_TAG: &str = " (Volume Label Entry)";

/// Maximum UTF-8 name size in bytes, terminator slot included
pub const MAX_NAME_LEN_UTF8: usize = 1024;

/// Number of leading slots that must all be invalid before a directory is treated as corrupt
pub const CORRUPT_PROBE_SLOTS: usize = 4;

/// Tunables for [`crate::fs::exfat::names::ExFatNameParser`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NameParseConfig {
    /// Capacity of a name record in bytes; at most `max_name_bytes - 1` are used
    pub max_name_bytes: usize,
    /// How many leading invalid slots switch the call into strict classification
    pub corrupt_probe_slots: usize,
    /// Suffix for volume label records
    pub volume_label_tag: String,
    /// Replace control characters in decoded names with `^`
    pub replace_control_chars: bool,
}

impl Default for NameParseConfig {
    fn default() -> Self {
        Self {
            max_name_bytes: MAX_NAME_LEN_UTF8,
            corrupt_probe_slots: CORRUPT_PROBE_SLOTS,
            volume_label_tag: VOLUME_LABEL_TAG.to_string(),
            replace_control_chars: true,
        }
    }
}

impl NameParseConfig {
    /// Load a configuration from a JSON file; missing fields take their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> DentResult<Self> {
        let file = File::open(path.as_ref())?;
        let config = serde_json::from_reader(BufReader::new(file))?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> DentResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
