use thiserror::Error;

use crate::{BranchId, RcsFileId};

#[derive(Debug, Error)]
pub enum Error {
    #[error("no RCS file registered for id {0:?}")]
    NoRcsFileForId(RcsFileId),

    #[error("no RCS file registered for path {0}")]
    NoRcsFileForPath(String),

    #[error("no branch registered for id {0:?}")]
    NoBranchForId(BranchId),

    #[error("no branch registered for name {0:?}")]
    NoBranchForName(String),

    #[error("branch name {0:?} is already registered")]
    DuplicateBranchName(String),
}
