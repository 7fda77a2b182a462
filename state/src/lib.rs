//! In-memory state for `mkssi-fast-export`: an arena of RCS files,
//! branches, and project checkpoints, indexed by opaque ID newtypes.
//!
//! The core pipeline is single-threaded and sequential (no suspension
//! points, no cancellation), so unlike the teacher's
//! `Arc<RwLock<..>>`-guarded `Manager` this is a plain owned arena behind
//! `&mut self` calls; there is nothing to guard against.

use std::collections::HashMap;

use rcs_master::Revision;

mod branch;
mod checkpoint;
mod error;
mod project;
mod rcs_file;

pub use branch::Branch;
pub use checkpoint::{CheckpointEntry, CheckpointFileList};
pub use error::Error;
pub use project::{BranchTableEntry, Project};
pub use rcs_file::{DerivedRevisionState, RcsFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RcsFileId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BranchId(usize);

/// The arena owning every `RcsFile`, `Branch`, and project checkpoint
/// discovered over the run.
#[derive(Debug, Default)]
pub struct Manager {
    rcs_files: Vec<RcsFile>,
    /// Keyed by the file's logical path, lowercased, for the
    /// case-insensitive lookups MKSSI project manifests require
    /// (notably finding `project.pj` itself).
    rcs_files_by_path: HashMap<String, RcsFileId>,

    branches: Vec<Branch>,
    branches_by_name: HashMap<String, BranchId>,

    project: Option<Project>,
    checkpoints: HashMap<Revision, CheckpointFileList>,
}

impl Manager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new RCS file (real or dummy) and returns its id.
    ///
    /// If a file was already registered at the same logical path
    /// (case-insensitively), it is replaced in the path index but the old
    /// entry's id remains valid and addressable; this mirrors MKSSI's
    /// first-occurrence-wins case stabilization (`state/checkpoint.rs`
    /// callers are expected to re-resolve by id, not by path, once a file
    /// has been registered).
    pub fn add_rcs_file(&mut self, file: RcsFile) -> RcsFileId {
        let key = file.logical_name.to_string_lossy().to_lowercase();
        let id = RcsFileId(self.rcs_files.len());
        self.rcs_files.push(file);
        self.rcs_files_by_path.insert(key, id);
        id
    }

    pub fn rcs_file(&self, id: RcsFileId) -> Result<&RcsFile, Error> {
        self.rcs_files.get(id.0).ok_or(Error::NoRcsFileForId(id))
    }

    pub fn rcs_file_mut(&mut self, id: RcsFileId) -> Result<&mut RcsFile, Error> {
        self.rcs_files
            .get_mut(id.0)
            .ok_or(Error::NoRcsFileForId(id))
    }

    /// Case-insensitive lookup by logical path, as MKSSI project manifests
    /// require (e.g. finding `project.pj` regardless of case).
    pub fn rcs_file_id_by_path(&self, path: &str) -> Option<RcsFileId> {
        self.rcs_files_by_path.get(&path.to_lowercase()).copied()
    }

    pub fn rcs_file_ids(&self) -> impl Iterator<Item = RcsFileId> {
        (0..self.rcs_files.len()).map(RcsFileId)
    }

    pub fn add_branch(&mut self, branch: Branch) -> Result<BranchId, Error> {
        if self.branches_by_name.contains_key(&branch.name) {
            return Err(Error::DuplicateBranchName(branch.name));
        }

        let id = BranchId(self.branches.len());
        self.branches_by_name.insert(branch.name.clone(), id);
        self.branches.push(branch);
        Ok(id)
    }

    pub fn branch(&self, id: BranchId) -> Result<&Branch, Error> {
        self.branches.get(id.0).ok_or(Error::NoBranchForId(id))
    }

    pub fn branch_mut(&mut self, id: BranchId) -> Result<&mut Branch, Error> {
        self.branches.get_mut(id.0).ok_or(Error::NoBranchForId(id))
    }

    pub fn branch_id_by_name(&self, name: &str) -> Option<BranchId> {
        self.branches_by_name.get(name).copied()
    }

    pub fn branch_ids(&self) -> impl Iterator<Item = BranchId> {
        (0..self.branches.len()).map(BranchId)
    }

    pub fn set_project(&mut self, project: Project) {
        self.project = Some(project);
    }

    pub fn project(&self) -> Option<&Project> {
        self.project.as_ref()
    }

    pub fn add_checkpoint(&mut self, list: CheckpointFileList) {
        self.checkpoints.insert(list.project_revision.clone(), list);
    }

    pub fn checkpoint(&self, revision: &Revision) -> Option<&CheckpointFileList> {
        self.checkpoints.get(revision)
    }

    pub fn checkpoints(&self) -> impl Iterator<Item = &CheckpointFileList> {
        self.checkpoints.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_add_and_lookup_rcs_file() {
        let mut manager = Manager::new();
        let id = manager.add_rcs_file(RcsFile::dummy(PathBuf::from("Foo/Bar.txt")));

        assert_eq!(manager.rcs_file_id_by_path("foo/bar.txt"), Some(id));
        assert_eq!(manager.rcs_file_id_by_path("FOO/BAR.TXT"), Some(id));
        assert!(manager.rcs_file(id).is_ok());
    }

    #[test]
    fn test_duplicate_branch_name_rejected() {
        let mut manager = Manager::new();
        let branch = Branch::new(
            "master".into(),
            Revision::new(vec![1, 1]).unwrap(),
            None,
            std::time::SystemTime::UNIX_EPOCH,
        );
        manager.add_branch(branch.clone()).unwrap();
        assert!(matches!(
            manager.add_branch(branch),
            Err(Error::DuplicateBranchName(_))
        ));
    }
}
