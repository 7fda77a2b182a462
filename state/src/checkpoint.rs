use rcs_master::Revision;

use crate::RcsFileId;

/// One entry in a project revision's manifest body: a file, at a given
/// revision, mapped to the canonical path it lived at in that checkpoint.
#[derive(Debug, Clone)]
pub struct CheckpointEntry {
    pub file: RcsFileId,
    pub revision: Revision,
    pub path: String,
}

/// The full file listing for one project revision (checkpoint).
#[derive(Debug, Clone)]
pub struct CheckpointFileList {
    pub project_revision: Revision,
    pub entries: Vec<CheckpointEntry>,
}

impl CheckpointFileList {
    pub fn entry_for_path(&self, path: &str) -> Option<&CheckpointEntry> {
        self.entries.iter().find(|entry| entry.path == path)
    }

    pub fn entry_for_file(&self, file: RcsFileId) -> Option<&CheckpointEntry> {
        self.entries.iter().find(|entry| entry.file == file)
    }
}
