use rcs_master::Revision;

use crate::RcsFileId;

/// One row of a project's `_mks_variant_projects` block: a branch
/// name as of the given project revision.
#[derive(Debug, Clone)]
pub struct BranchTableEntry {
    pub revision: Revision,
    pub name: String,
}

/// The distinguished RCS file representing `project.pj`.
#[derive(Debug, Clone)]
pub struct Project {
    pub file: RcsFileId,
    pub branch_table: Vec<BranchTableEntry>,
}
