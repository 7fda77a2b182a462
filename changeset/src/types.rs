use rcs_master::Revision;
use state::RcsFileId;

/// One file's change between two checkpoints, already identity-resolved
/// (never by name — MKSSI files are compared by their arena id).
#[derive(Debug, Clone)]
pub enum FileChange {
    Add {
        file: RcsFileId,
        path: String,
        revision: Revision,
    },
    Update {
        file: RcsFileId,
        path: String,
        old_revision: Revision,
        new_revision: Revision,
    },
    Delete {
        file: RcsFileId,
        path: String,
        revision: Revision,
    },
}

impl FileChange {
    pub fn file(&self) -> RcsFileId {
        match self {
            FileChange::Add { file, .. }
            | FileChange::Update { file, .. }
            | FileChange::Delete { file, .. } => *file,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            FileChange::Add { path, .. }
            | FileChange::Update { path, .. }
            | FileChange::Delete { path, .. } => path,
        }
    }

    pub fn is_revert(&self) -> bool {
        matches!(self, FileChange::Update { old_revision, new_revision, .. } if new_revision < old_revision)
    }
}

/// A rename detected between two checkpoints: either an entire directory
/// (emitted as a single git `R` command, no file identity needed) or one
/// file whose basename alone changed case.
#[derive(Debug, Clone)]
pub enum RenameTarget {
    Directory { old: String, new: String },
    File { file: RcsFileId, old: String, new: String },
}

/// The result of diffing two checkpoints (§4.8), before merging into
/// commits.
#[derive(Debug, Clone, Default)]
pub struct Changeset {
    pub renames: Vec<RenameTarget>,
    pub adds: Vec<FileChange>,
    pub updates: Vec<FileChange>,
    pub deletes: Vec<FileChange>,
}
