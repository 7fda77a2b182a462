use std::{collections::HashMap, path::PathBuf};

use git_fast_import::Mark;
use rcs_master::{Id, Patch, Revision, Sym, Version};

/// Per-revision facts that are derived while walking the project tree
/// rather than parsed directly off the master: which blob mark a
/// revision's content was emitted under, whether it's executable,
/// whether any project revision ever checkpointed it, and keyword
/// bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct DerivedRevisionState {
    pub mark: Option<Mark>,
    pub executable: bool,
    pub checkpointed: bool,
    pub has_keywords: bool,
    pub jit: bool,
    /// Set (and propagated to descendants) when this revision's Patch
    /// could not be reconstructed.
    pub missing: bool,
}

/// One on-disk RCS master, or a dummy file that exists only as an entry in
/// a project manifest.
#[derive(Debug, Clone)]
pub struct RcsFile {
    pub logical_name: PathBuf,
    pub master_path: PathBuf,
    pub binary: bool,
    pub corrupt: bool,
    pub reference_subdir: Option<PathBuf>,
    pub head: Option<Revision>,
    pub default_branch: Option<Revision>,
    pub symbols: Vec<(Sym, Revision)>,
    pub locks: HashMap<Id, Revision>,
    pub versions: HashMap<Revision, Version>,
    pub patches: HashMap<Revision, Patch>,
    derived: HashMap<Revision, DerivedRevisionState>,
}

impl RcsFile {
    /// A file that exists only in a project manifest, never as a master
    /// on disk.
    pub fn dummy(logical_name: PathBuf) -> Self {
        Self {
            logical_name,
            master_path: PathBuf::new(),
            binary: false,
            corrupt: false,
            reference_subdir: None,
            head: None,
            default_branch: None,
            symbols: Vec::new(),
            locks: HashMap::new(),
            versions: HashMap::new(),
            patches: HashMap::new(),
            derived: HashMap::new(),
        }
    }

    pub fn from_parsed(logical_name: PathBuf, master_path: PathBuf, file: rcs_master::File) -> Self {
        let derived = file
            .versions
            .keys()
            .map(|revision| (revision.clone(), DerivedRevisionState::default()))
            .collect();

        Self {
            logical_name,
            master_path,
            binary: file.is_binary(),
            corrupt: false,
            reference_subdir: None,
            head: file.admin.head,
            default_branch: file.admin.branch,
            symbols: file.admin.symbols,
            locks: file.admin.locks,
            versions: file.versions,
            patches: file.patches,
            derived,
        }
    }

    /// A corrupt placeholder: retained in the table (so references to it
    /// don't dangle) but carries no usable content.
    pub fn corrupt(logical_name: PathBuf, master_path: PathBuf) -> Self {
        Self {
            corrupt: true,
            ..Self::dummy(logical_name).with_master_path(master_path)
        }
    }

    fn with_master_path(mut self, master_path: PathBuf) -> Self {
        self.master_path = master_path;
        self
    }

    pub fn is_dummy(&self) -> bool {
        self.versions.is_empty() && self.patches.is_empty()
    }

    pub fn derived(&self, revision: &Revision) -> Option<&DerivedRevisionState> {
        self.derived.get(revision)
    }

    pub fn derived_mut(&mut self, revision: &Revision) -> &mut DerivedRevisionState {
        self.derived.entry(revision.clone()).or_default()
    }

    pub fn symbol(&self, sym: &Sym) -> Option<&Revision> {
        self.symbols.iter().find(|(s, _)| s == sym).map(|(_, r)| r)
    }
}
